use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Router / personas (spec §4.4, §6 `router.*`)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RouterConfig {
    #[serde(default)]
    pub personas: Vec<PersonaConfig>,
    /// Name of the persona used for locations with no explicit mapping.
    #[serde(default)]
    pub default_persona: Option<String>,
    /// Side-channel "report-back" fan-in (§4.5, §9 open question: config,
    /// never a literal channel id / webhook URL baked into the binary).
    #[serde(default)]
    pub report_back: Vec<ReportBackEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonaConfig {
    pub name: String,
    #[serde(default)]
    pub channel_ids: Vec<String>,
    #[serde(default = "d_workspace")]
    pub workspace: String,
    #[serde(default)]
    pub prompt_files: Vec<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "d_temperature")]
    pub temperature: f32,
    #[serde(default = "d_max_tokens")]
    pub max_tokens: u32,
    #[serde(default)]
    pub authorized_users: Option<Vec<String>>,
    #[serde(default)]
    pub require_mention: Option<bool>,
}

fn d_workspace() -> String {
    ".".into()
}
fn d_temperature() -> f32 {
    0.7
}
fn d_max_tokens() -> u32 {
    4096
}

/// One entry of the report-back fan-in map: `location` (the originating
/// chat location) → `label` (the human-readable name used in the
/// dispatched summary) + the webhook it's delivered to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportBackEntry {
    pub location: String,
    pub label: String,
    pub webhook_url: String,
}
