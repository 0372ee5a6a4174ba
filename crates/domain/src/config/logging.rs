use serde::{Deserialize, Serialize};

/// `logging.*` — ambient observability config (spec §2 "Ambient stack").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "d_level")]
    pub level: String,
    /// JSON-formatted logs (daemon mode) vs human-readable (interactive CLI).
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: d_level(),
            json: false,
        }
    }
}

fn d_level() -> String {
    "info".into()
}
