use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use funnel_spec::TrackingConfig;

/// Correlates analytics events and the submission of one funnel execution.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Uses the host-provided id when present, otherwise generates one.
    pub fn for_tracking(tracking: &TrackingConfig) -> Self {
        match tracking.session_id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => Self::new(id),
            _ => Self::generate(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
