use thiserror::Error;

use funnel_spec::{AnswerError, DefinitionError, QuestionId};

use crate::navigation::NavState;

/// Errors raised while driving a funnel.
///
/// Only `ValidationFailure` is meant for the person filling in the funnel; the
/// rest point at a caller bug or a broken definition.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("malformed funnel definition: {0}")]
    MalformedDefinition(#[from] DefinitionError),
    #[error("cannot {action} while {state}")]
    InvalidTransition {
        action: &'static str,
        state: NavState,
    },
    #[error("back navigation is disabled for this funnel")]
    BackDisabled,
    #[error("there is no earlier visible question")]
    NoPreviousQuestion,
    #[error("question '{question_id}' can only be answered while it is displayed")]
    NotCurrentQuestion { question_id: QuestionId },
    #[error("question '{question_id}' is not satisfied: {}", .errors.join("; "))]
    ValidationFailure {
        question_id: QuestionId,
        errors: Vec<String>,
    },
    #[error(transparent)]
    Answer(#[from] AnswerError),
    #[error("a submission can only be built once the funnel is completed (currently {0})")]
    InvalidState(NavState),
}

impl EngineError {
    /// `true` for errors that should be shown inline to the user.
    pub fn is_user_facing(&self) -> bool {
        matches!(self, EngineError::ValidationFailure { .. })
    }
}

/// Failures of an outbound transport call.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: ureq::Error,
    },
    #[error("failed to encode payload: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("transport unavailable: {0}")]
    Unavailable(String),
}

/// Final submission failure. Displays a generic message; the cause stays reachable
/// through [`std::error::Error::source`].
#[derive(Debug, Error)]
#[error("We could not submit your answers. Please try again.")]
pub struct SubmitError {
    #[source]
    source: TransportError,
}

impl SubmitError {
    pub fn new(source: TransportError) -> Self {
        Self { source }
    }

    pub fn cause(&self) -> &TransportError {
        &self.source
    }
}
