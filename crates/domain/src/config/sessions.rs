use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Durable store locations (spec §6 "Persistent stores")
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionsConfig {
    /// Path to the SQLite database backing `SessionStore`, relative to the
    /// config directory unless absolute.
    #[serde(default = "d_sessions_db")]
    pub db_path: String,
    /// Path to the SQLite database backing the cron job/run store.
    #[serde(default = "d_cron_db")]
    pub cron_db_path: String,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            db_path: d_sessions_db(),
            cron_db_path: d_cron_db(),
        }
    }
}

fn d_sessions_db() -> String {
    "sessions.sqlite3".into()
}
fn d_cron_db() -> String {
    "cron.sqlite3".into()
}
