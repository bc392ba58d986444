use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::spec::id::{FunnelId, empty_as_default};
use crate::spec::question::QuestionSpec;

/// Display settings handed over by the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FunnelSettings {
    #[serde(default = "enabled")]
    pub progress_bar: bool,
    #[serde(default = "enabled")]
    pub allow_back: bool,
    #[serde(default = "default_theme")]
    pub theme: String,
    #[serde(default = "enabled")]
    pub animations: bool,
    #[serde(default)]
    pub auto_advance: bool,
}

impl Default for FunnelSettings {
    fn default() -> Self {
        Self {
            progress_bar: true,
            allow_back: true,
            theme: default_theme(),
            animations: true,
            auto_advance: false,
        }
    }
}

fn enabled() -> bool {
    true
}

fn default_theme() -> String {
    "default".into()
}

/// Endpoint the final submission is posted to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FormEndpoint {
    pub submit_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
}

/// Analytics configuration for one rendered funnel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TrackingConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default = "enabled")]
    pub analytics_enabled: bool,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            session_id: None,
            analytics_enabled: true,
        }
    }
}

/// Top-level funnel definition. Immutable for the duration of one execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FunnelSpec {
    pub id: FunnelId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    pub questions: Vec<QuestionSpec>,
    #[serde(default, deserialize_with = "empty_as_default")]
    #[schemars(with = "FunnelSettings")]
    pub settings: FunnelSettings,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub form: Option<FormEndpoint>,
    #[serde(default, deserialize_with = "empty_as_default")]
    #[schemars(with = "TrackingConfig")]
    pub tracking: TrackingConfig,
}

impl FunnelSpec {
    pub fn question(&self, id: &str) -> Option<&QuestionSpec> {
        self.questions.iter().find(|question| question.id.as_str() == id)
    }

    /// Index of a question in traversal order.
    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.questions
            .iter()
            .position(|question| question.id.as_str() == id)
    }
}
