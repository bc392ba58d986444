use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use funnel_spec::{AnswerSet, AnswerStore, FunnelId, QuestionId};

use crate::analytics::{AnalyticsTracker, EventKind};
use crate::error::EngineError;
use crate::navigation::NavState;
use crate::session::SessionId;

/// Interaction data collected during the execution.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionMetadata {
    pub interactions: Vec<Value>,
    pub question_timings: BTreeMap<QuestionId, u64>,
    pub event_count: usize,
}

/// Payload handed to the submission transport.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub funnel_id: FunnelId,
    pub session_id: SessionId,
    pub answers: AnswerSet,
    pub completed_at: DateTime<Utc>,
    /// Seconds between the start event and completion.
    pub completion_time: u64,
    pub metadata: SubmissionMetadata,
}

/// Assembles the submission of a completed execution.
///
/// Answers of questions hidden at this point are dropped.
pub fn build_submission(
    state: NavState,
    store: &AnswerStore<'_>,
    tracker: &AnalyticsTracker,
    completed_at: DateTime<Utc>,
) -> Result<Submission, EngineError> {
    if state != NavState::Completed {
        return Err(EngineError::InvalidState(state));
    }

    let completion_time = tracker
        .started_at()
        .map(|start| crate::clock::rounded_seconds(start, completed_at))
        .unwrap_or(0);

    Ok(Submission {
        funnel_id: store.funnel().id.clone(),
        session_id: tracker.session_id().clone(),
        answers: store.visible_answers(),
        completed_at,
        completion_time,
        metadata: collect_metadata(tracker),
    })
}

fn collect_metadata(tracker: &AnalyticsTracker) -> SubmissionMetadata {
    let interactions = tracker
        .events_of_kind(EventKind::Interaction)
        .map(|event| Value::Object(event.data.clone()))
        .collect();

    let mut question_timings = BTreeMap::new();
    for event in tracker.events_of_kind(EventKind::QuestionTiming) {
        let question = event.data.get("questionId").and_then(Value::as_str);
        let seconds = event.data.get("timeSpent").and_then(Value::as_u64);
        if let (Some(question), Some(seconds)) = (question, seconds) {
            *question_timings.entry(QuestionId::from(question)).or_insert(0) += seconds;
        }
    }

    SubmissionMetadata {
        interactions,
        question_timings,
        event_count: tracker.events().len(),
    }
}
