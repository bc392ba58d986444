use std::rc::Rc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use funnel_spec::FunnelId;

use crate::clock::{Clock, rounded_seconds};
use crate::session::SessionId;
use crate::transport::AnalyticsSink;

/// Kinds of analytics events, serialized with their wire names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EventKind {
    #[serde(rename = "funnel_start")]
    Start,
    #[serde(rename = "question_view")]
    View,
    #[serde(rename = "question_answer")]
    Answer,
    #[serde(rename = "question_timing")]
    QuestionTiming,
    #[serde(rename = "user_interaction")]
    Interaction,
    #[serde(rename = "funnel_complete")]
    Complete,
    #[serde(rename = "funnel_abandon")]
    Abandon,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Start => "funnel_start",
            EventKind::View => "question_view",
            EventKind::Answer => "question_answer",
            EventKind::QuestionTiming => "question_timing",
            EventKind::Interaction => "user_interaction",
            EventKind::Complete => "funnel_complete",
            EventKind::Abandon => "funnel_abandon",
        }
    }
}

/// One entry of the append-only event log.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub data: Map<String, Value>,
    pub timestamp: DateTime<Utc>,
    pub session_id: SessionId,
}

/// Records timestamped events for one session and forwards them to a sink.
///
/// Sink failures are logged and dropped. Disabling analytics stops recording
/// but keeps the start time, so durations stay available.
pub struct AnalyticsTracker {
    session_id: SessionId,
    funnel_id: FunnelId,
    enabled: bool,
    clock: Box<dyn Clock>,
    sink: Rc<dyn AnalyticsSink>,
    started_at: Option<DateTime<Utc>>,
    events: Vec<AnalyticsEvent>,
}

impl AnalyticsTracker {
    pub fn new(
        session_id: SessionId,
        funnel_id: FunnelId,
        enabled: bool,
        clock: Box<dyn Clock>,
        sink: Rc<dyn AnalyticsSink>,
    ) -> Self {
        Self {
            session_id,
            funnel_id,
            enabled,
            clock,
            sink,
            started_at: None,
            events: Vec::new(),
        }
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// Appends an event. Returns `None` when analytics is disabled.
    pub fn record(&mut self, kind: EventKind, mut data: Map<String, Value>) -> Option<&AnalyticsEvent> {
        let timestamp = self.clock.now();
        if kind == EventKind::Start && self.started_at.is_none() {
            self.started_at = Some(timestamp);
        }
        if !self.enabled {
            return None;
        }

        data.entry("funnelId")
            .or_insert_with(|| Value::String(self.funnel_id.to_string()));
        let event = AnalyticsEvent {
            kind,
            data,
            timestamp,
            session_id: self.session_id.clone(),
        };

        debug!(event = kind.as_str(), session = %self.session_id, "analytics event");
        if let Err(err) = self.sink.send(&event) {
            warn!(event = kind.as_str(), error = %err, "analytics delivery failed");
        }

        self.events.push(event);
        self.events.last()
    }

    pub fn record_question_timing(&mut self, question_id: &str, seconds: u64) -> Option<&AnalyticsEvent> {
        let mut data = Map::new();
        data.insert("questionId".into(), Value::String(question_id.to_string()));
        data.insert("timeSpent".into(), Value::from(seconds));
        self.record(EventKind::QuestionTiming, data)
    }

    pub fn record_interaction(
        &mut self,
        interaction: &str,
        details: Map<String, Value>,
    ) -> Option<&AnalyticsEvent> {
        let mut data = Map::new();
        data.insert("interaction".into(), Value::String(interaction.to_string()));
        data.extend(details);
        self.record(EventKind::Interaction, data)
    }

    /// Seconds since the start event, or zero before it.
    pub fn elapsed_seconds(&self) -> u64 {
        self.started_at
            .map(|start| rounded_seconds(start, self.clock.now()))
            .unwrap_or(0)
    }

    pub fn events(&self) -> &[AnalyticsEvent] {
        &self.events
    }

    /// Fresh iterator over the events of one kind, in recording order.
    pub fn events_of_kind(&self, kind: EventKind) -> impl Iterator<Item = &AnalyticsEvent> + '_ {
        self.events.iter().filter(move |event| event.kind == kind)
    }
}

impl std::fmt::Debug for AnalyticsTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalyticsTracker")
            .field("session_id", &self.session_id)
            .field("funnel_id", &self.funnel_id)
            .field("enabled", &self.enabled)
            .field("started_at", &self.started_at)
            .field("events", &self.events.len())
            .finish()
    }
}
