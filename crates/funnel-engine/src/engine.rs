use std::rc::Rc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{info, warn};

use funnel_spec::{
    AnswerShape, AnswerStore, AnswerValue, FunnelSpec, QuestionId, QuestionSpec, ValidationResult,
    check_definition,
};

use crate::analytics::{AnalyticsTracker, EventKind};
use crate::clock::{Clock, SystemClock, rounded_seconds};
use crate::error::{EngineError, SubmitError};
use crate::navigation::{NavState, Navigator, Transition, next_visible};
use crate::session::SessionId;
use crate::submission::{Submission, build_submission};
use crate::transport::{AnalyticsSink, NullTransport, SubmissionTransport};

/// Collaborators of one execution.
pub struct EngineOptions {
    pub session_id: Option<SessionId>,
    pub clock: Box<dyn Clock>,
    pub analytics: Rc<dyn AnalyticsSink>,
    pub transport: Rc<dyn SubmissionTransport>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        let null = Rc::new(NullTransport);
        Self {
            session_id: None,
            clock: Box::new(SystemClock::new()),
            analytics: null.clone(),
            transport: null,
        }
    }
}

impl EngineOptions {
    /// Uses one value as both analytics sink and submission transport.
    pub fn with_transport<T>(transport: Rc<T>) -> Self
    where
        T: AnalyticsSink + SubmissionTransport + 'static,
    {
        Self {
            analytics: transport.clone(),
            transport,
            ..Self::default()
        }
    }

    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn session(mut self, session_id: SessionId) -> Self {
        self.session_id = Some(session_id);
        self
    }
}

/// Result of a navigation call, as seen by the front-end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// The question at this index is now displayed.
    Question(usize),
    Completed,
    Abandoned,
}

/// Outcome of handing the submission to its transport.
#[derive(Debug)]
pub enum Delivery {
    Sent,
    Failed(SubmitError),
}

impl Delivery {
    pub fn is_sent(&self) -> bool {
        matches!(self, Delivery::Sent)
    }
}

/// Notification passed to observers after each mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    Answer { question_id: QuestionId },
    State(NavState),
}

/// Progress bar counters over the currently visible questions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Progress {
    /// 1-based position of the displayed question.
    pub current: usize,
    pub total: usize,
    pub percent: u8,
}

type Observer<'f> = Box<dyn FnMut(&Change) + 'f>;

/// Per-execution context: answers, navigation, analytics and submission.
///
/// Single-threaded by construction; callers serialize every action.
pub struct Engine<'f> {
    funnel: &'f FunnelSpec,
    store: AnswerStore<'f>,
    navigator: Navigator,
    tracker: AnalyticsTracker,
    transport: Rc<dyn SubmissionTransport>,
    entered_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    submission: Option<Submission>,
    delivery: Option<Delivery>,
    observers: Vec<Observer<'f>>,
}

impl<'f> Engine<'f> {
    /// Checks the definition and prepares a fresh execution.
    pub fn new(funnel: &'f FunnelSpec, options: EngineOptions) -> Result<Self, EngineError> {
        check_definition(funnel)?;
        let session_id = options
            .session_id
            .unwrap_or_else(|| SessionId::for_tracking(&funnel.tracking));
        let tracker = AnalyticsTracker::new(
            session_id,
            funnel.id.clone(),
            funnel.tracking.analytics_enabled,
            options.clock,
            options.analytics,
        );
        Ok(Self {
            funnel,
            store: AnswerStore::new(funnel),
            navigator: Navigator::new(funnel.settings.allow_back),
            tracker,
            transport: options.transport,
            entered_at: None,
            completed_at: None,
            submission: None,
            delivery: None,
            observers: Vec::new(),
        })
    }

    pub fn funnel(&self) -> &'f FunnelSpec {
        self.funnel
    }

    pub fn session_id(&self) -> &SessionId {
        self.tracker.session_id()
    }

    pub fn state(&self) -> NavState {
        self.navigator.state()
    }

    pub fn store(&self) -> &AnswerStore<'f> {
        &self.store
    }

    pub fn tracker(&self) -> &AnalyticsTracker {
        &self.tracker
    }

    pub fn set_analytics_enabled(&mut self, enabled: bool) {
        self.tracker.set_enabled(enabled);
    }

    /// Registers a callback run after every answer change and state transition.
    pub fn on_change(&mut self, observer: impl FnMut(&Change) + 'f) {
        self.observers.push(Box::new(observer));
    }

    pub fn current_question(&self) -> Option<&'f QuestionSpec> {
        self.state()
            .current_index()
            .and_then(|index| self.funnel.questions.get(index))
    }

    /// Inline validation state of the displayed question.
    pub fn current_validation(&self) -> Option<ValidationResult> {
        self.current_question()
            .map(|question| self.store.check_question(question))
    }

    pub fn can_go_back(&self) -> bool {
        let Some(index) = self.state().current_index() else {
            return false;
        };
        let visibility = self.store.visibility();
        self.navigator.allow_back()
            && self.funnel.questions[..index]
                .iter()
                .any(|question| visibility.get(&question.id).copied().unwrap_or(false))
    }

    pub fn start(&mut self) -> Result<Step, EngineError> {
        let transition = self.navigator.start(&self.store)?;
        let mut data = Map::new();
        data.insert("funnelName".into(), Value::String(self.funnel.name.clone()));
        data.insert("questionCount".into(), Value::from(self.funnel.questions.len()));
        self.tracker.record(EventKind::Start, data);
        info!(funnel = %self.funnel.id, session = %self.session_id(), "funnel started");
        Ok(self.apply(transition))
    }

    /// Records an answer.
    ///
    /// Before start any question may be prefilled; afterwards only the displayed
    /// one. With auto-advance on, a satisfying single-choice answer moves on and
    /// the resulting step is returned.
    pub fn set_answer(&mut self, question_id: &str, value: AnswerValue) -> Result<Option<Step>, EngineError> {
        self.ensure_answerable(question_id)?;
        let shape = value.shape();
        if !self.store.set_answer(question_id, value)? {
            return Ok(None);
        }

        let mut data = Map::new();
        data.insert("questionId".into(), Value::String(question_id.to_string()));
        data.insert("answerShape".into(), Value::String(shape.as_str().to_string()));
        self.tracker.record(EventKind::Answer, data);
        self.notify(Change::Answer {
            question_id: question_id.into(),
        });

        let auto = self.funnel.settings.auto_advance
            && shape == AnswerShape::SingleChoice
            && self.current_question().is_some_and(|question| {
                question.id.as_str() == question_id && self.store.is_question_satisfied(question)
            });
        if auto {
            return self.advance().map(Some);
        }
        Ok(None)
    }

    /// [`set_answer`](Self::set_answer) for a raw JSON value.
    pub fn set_answer_json(&mut self, question_id: &str, value: &Value) -> Result<Option<Step>, EngineError> {
        let question = self
            .funnel
            .question(question_id)
            .ok_or_else(|| funnel_spec::AnswerError::UnknownQuestion {
                question_id: question_id.into(),
            })?;
        let value = AnswerValue::from_json(&question.id, question.answer_shape(), value)?;
        self.set_answer(question_id, value)
    }

    /// Answers the displayed question.
    pub fn answer(&mut self, value: AnswerValue) -> Result<Option<Step>, EngineError> {
        let question = self
            .current_question()
            .ok_or(EngineError::InvalidTransition {
                action: "answer",
                state: self.state(),
            })?;
        self.set_answer(question.id.as_str(), value)
    }

    pub fn clear_answer(&mut self, question_id: &str) -> Result<Option<AnswerValue>, EngineError> {
        self.ensure_answerable(question_id)?;
        let previous = self.store.clear_answer(question_id);
        if previous.is_some() {
            self.notify(Change::Answer {
                question_id: question_id.into(),
            });
        }
        Ok(previous)
    }

    pub fn advance(&mut self) -> Result<Step, EngineError> {
        let transition = self.navigator.advance(&self.store)?;
        Ok(self.apply(transition))
    }

    pub fn back(&mut self) -> Result<Step, EngineError> {
        let transition = self.navigator.back(&self.store)?;
        Ok(self.apply(transition))
    }

    pub fn abandon(&mut self) -> Result<Step, EngineError> {
        let transition = self.navigator.abandon()?;
        Ok(self.apply(transition))
    }

    pub fn track_interaction(&mut self, interaction: &str, details: Map<String, Value>) {
        self.tracker.record_interaction(interaction, details);
    }

    /// Builds the submission payload. Only legal once completed.
    pub fn build_submission(&self) -> Result<Submission, EngineError> {
        let completed_at = self
            .completed_at
            .ok_or(EngineError::InvalidState(self.state()))?;
        build_submission(self.state(), &self.store, &self.tracker, completed_at)
    }

    pub fn submission(&self) -> Option<&Submission> {
        self.submission.as_ref()
    }

    pub fn delivery(&self) -> Option<&Delivery> {
        self.delivery.as_ref()
    }

    /// Sends the stored submission again. Never called automatically.
    pub fn retry_submission(&mut self) -> Result<&Delivery, EngineError> {
        let submission = self
            .submission
            .clone()
            .ok_or(EngineError::InvalidState(self.state()))?;
        let delivery = self.deliver(&submission);
        Ok(self.delivery.insert(delivery))
    }

    pub fn progress(&self) -> Progress {
        let visibility = self.store.visibility();
        let shown = |question: &QuestionSpec| visibility.get(&question.id).copied().unwrap_or(false);
        let total = self.funnel.questions.iter().filter(|q| shown(q)).count();
        let current = match self.state() {
            NavState::NotStarted => 0,
            NavState::OnQuestion(index) => self.funnel.questions[..=index]
                .iter()
                .filter(|q| shown(q))
                .count(),
            NavState::Completed => total,
            NavState::Abandoned => 0,
        };
        let percent = if total == 0 {
            100
        } else {
            ((current * 100) / total).min(100) as u8
        };
        Progress {
            current,
            total,
            percent,
        }
    }

    /// Index of the question `advance` would land on, if it succeeded now.
    pub fn peek_next(&self) -> Option<usize> {
        let index = self.state().current_index()?;
        next_visible(self.funnel, &self.store.visibility(), index + 1)
    }

    fn ensure_answerable(&self, question_id: &str) -> Result<(), EngineError> {
        match self.state() {
            NavState::NotStarted => Ok(()),
            NavState::OnQuestion(index)
                if self.funnel.questions[index].id.as_str() == question_id =>
            {
                Ok(())
            }
            NavState::OnQuestion(_) => Err(EngineError::NotCurrentQuestion {
                question_id: question_id.into(),
            }),
            state => Err(EngineError::InvalidTransition {
                action: "change answers",
                state,
            }),
        }
    }

    fn apply(&mut self, transition: Transition) -> Step {
        let step = match transition {
            Transition::Entered { from, to } => {
                self.leave(from);
                self.enter(to);
                Step::Question(to)
            }
            Transition::Completed { from } => {
                self.leave(from);
                self.complete();
                Step::Completed
            }
            Transition::Abandoned { from } => {
                let elapsed = self.tracker.elapsed_seconds();
                self.leave(Some(from));
                let mut data = Map::new();
                data.insert(
                    "questionId".into(),
                    Value::String(self.funnel.questions[from].id.to_string()),
                );
                data.insert("elapsed".into(), Value::from(elapsed));
                self.tracker.record(EventKind::Abandon, data);
                info!(funnel = %self.funnel.id, session = %self.session_id(), "funnel abandoned");
                Step::Abandoned
            }
        };
        self.notify(Change::State(self.state()));
        step
    }

    fn enter(&mut self, index: usize) {
        let question = &self.funnel.questions[index];
        self.entered_at = Some(self.tracker.now());
        let mut data = Map::new();
        data.insert("questionId".into(), Value::String(question.id.to_string()));
        data.insert("position".into(), Value::from(question.position));
        self.tracker.record(EventKind::View, data);
    }

    fn leave(&mut self, from: Option<usize>) {
        let (Some(index), Some(entered)) = (from, self.entered_at.take()) else {
            return;
        };
        let seconds = rounded_seconds(entered, self.tracker.now());
        let question_id = self.funnel.questions[index].id.to_string();
        self.tracker.record_question_timing(&question_id, seconds);
    }

    fn complete(&mut self) {
        let completed_at = self.tracker.now();
        self.completed_at = Some(completed_at);
        let mut data = Map::new();
        data.insert(
            "completionTime".into(),
            Value::from(self.tracker.elapsed_seconds()),
        );
        self.tracker.record(EventKind::Complete, data);

        match build_submission(self.state(), &self.store, &self.tracker, completed_at) {
            Ok(submission) => {
                let delivery = self.deliver(&submission);
                self.submission = Some(submission);
                self.delivery = Some(delivery);
            }
            Err(err) => warn!(error = %err, "submission could not be assembled"),
        }
        info!(funnel = %self.funnel.id, session = %self.session_id(), "funnel completed");
    }

    fn deliver(&self, submission: &Submission) -> Delivery {
        match self.transport.submit(submission) {
            Ok(()) => Delivery::Sent,
            Err(err) => {
                warn!(session = %submission.session_id, error = %err, "submission delivery failed");
                Delivery::Failed(SubmitError::new(err))
            }
        }
    }

    fn notify(&mut self, change: Change) {
        for observer in self.observers.iter_mut() {
            observer(&change);
        }
    }
}
