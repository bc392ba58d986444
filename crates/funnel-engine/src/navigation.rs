use std::fmt;

use serde::Serialize;
use tracing::debug;

use funnel_spec::{AnswerStore, FunnelSpec, VisibilityMap};

use crate::error::EngineError;

/// Position of an execution within its funnel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "index", rename_all = "snake_case")]
pub enum NavState {
    NotStarted,
    OnQuestion(usize),
    Completed,
    Abandoned,
}

impl NavState {
    pub fn as_str(&self) -> &'static str {
        match self {
            NavState::NotStarted => "not_started",
            NavState::OnQuestion(_) => "on_question",
            NavState::Completed => "completed",
            NavState::Abandoned => "abandoned",
        }
    }

    pub fn current_index(&self) -> Option<usize> {
        match self {
            NavState::OnQuestion(index) => Some(*index),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, NavState::Completed | NavState::Abandoned)
    }
}

impl fmt::Display for NavState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NavState::OnQuestion(index) => write!(f, "on question #{}", index),
            other => f.write_str(other.as_str()),
        }
    }
}

/// What a successful navigation call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Entered { from: Option<usize>, to: usize },
    Completed { from: Option<usize> },
    Abandoned { from: usize },
}

/// Walks the visible questions of a funnel.
///
/// Visibility is recomputed from the live answers on every call; nothing about
/// the next or previous index is cached between mutations.
#[derive(Debug, Clone)]
pub struct Navigator {
    state: NavState,
    allow_back: bool,
}

impl Navigator {
    pub fn new(allow_back: bool) -> Self {
        Self {
            state: NavState::NotStarted,
            allow_back,
        }
    }

    pub fn state(&self) -> NavState {
        self.state
    }

    pub fn allow_back(&self) -> bool {
        self.allow_back
    }

    pub fn start(&mut self, store: &AnswerStore<'_>) -> Result<Transition, EngineError> {
        if self.state != NavState::NotStarted {
            return Err(self.invalid("start"));
        }
        let visibility = store.visibility();
        let transition = match next_visible(store.funnel(), &visibility, 0) {
            Some(first) => {
                self.state = NavState::OnQuestion(first);
                Transition::Entered { from: None, to: first }
            }
            None => {
                self.state = NavState::Completed;
                Transition::Completed { from: None }
            }
        };
        debug!(state = %self.state, "funnel started");
        Ok(transition)
    }

    /// Moves past the current question once it is satisfied, or at once if it
    /// has become hidden.
    pub fn advance(&mut self, store: &AnswerStore<'_>) -> Result<Transition, EngineError> {
        let NavState::OnQuestion(index) = self.state else {
            return Err(self.invalid("advance"));
        };
        let funnel = store.funnel();
        let visibility = store.visibility();
        let question = &funnel.questions[index];

        if is_shown(&visibility, funnel, index) {
            let result = store.check_question(question);
            if !result.valid {
                return Err(EngineError::ValidationFailure {
                    question_id: question.id.clone(),
                    errors: result.errors,
                });
            }
        } else {
            debug!(question = %question.id, "current question became hidden");
        }

        let transition = match next_visible(funnel, &visibility, index + 1) {
            Some(next) => {
                self.state = NavState::OnQuestion(next);
                Transition::Entered {
                    from: Some(index),
                    to: next,
                }
            }
            None => {
                self.state = NavState::Completed;
                Transition::Completed { from: Some(index) }
            }
        };
        debug!(from = index, state = %self.state, "advanced");
        Ok(transition)
    }

    pub fn back(&mut self, store: &AnswerStore<'_>) -> Result<Transition, EngineError> {
        let NavState::OnQuestion(index) = self.state else {
            return Err(self.invalid("go back"));
        };
        if !self.allow_back {
            return Err(EngineError::BackDisabled);
        }
        let visibility = store.visibility();
        let previous = (0..index)
            .rev()
            .find(|candidate| is_shown(&visibility, store.funnel(), *candidate))
            .ok_or(EngineError::NoPreviousQuestion)?;
        self.state = NavState::OnQuestion(previous);
        debug!(from = index, to = previous, "went back");
        Ok(Transition::Entered {
            from: Some(index),
            to: previous,
        })
    }

    pub fn abandon(&mut self) -> Result<Transition, EngineError> {
        let NavState::OnQuestion(index) = self.state else {
            return Err(self.invalid("abandon"));
        };
        self.state = NavState::Abandoned;
        Ok(Transition::Abandoned { from: index })
    }

    fn invalid(&self, action: &'static str) -> EngineError {
        EngineError::InvalidTransition {
            action,
            state: self.state,
        }
    }
}

fn is_shown(visibility: &VisibilityMap, funnel: &FunnelSpec, index: usize) -> bool {
    funnel
        .questions
        .get(index)
        .and_then(|question| visibility.get(&question.id).copied())
        .unwrap_or(false)
}

/// First visible index at or after `from`.
pub(crate) fn next_visible(funnel: &FunnelSpec, visibility: &VisibilityMap, from: usize) -> Option<usize> {
    (from..funnel.questions.len()).find(|index| is_shown(visibility, funnel, *index))
}
