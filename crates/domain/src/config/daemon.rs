use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Process lifecycle (spec §6 `daemon.*`, §6 process lifecycle)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default)]
    pub auto_restart: bool,
    #[serde(default = "d_max_restarts")]
    pub max_restarts: u32,
    /// Rolling window (seconds) `max_restarts` is measured over.
    #[serde(default = "d_restart_window_s")]
    pub restart_window_s: u64,
    /// PID file path, relative to the config directory unless absolute.
    #[serde(default = "d_pid_file")]
    pub pid_file: String,
    /// Log file path for detached (`start --detach`) runs, relative to the
    /// config directory unless absolute. Foreground runs log to stderr only.
    #[serde(default = "d_log_file")]
    pub log_file: String,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            auto_restart: false,
            max_restarts: d_max_restarts(),
            restart_window_s: d_restart_window_s(),
            pid_file: d_pid_file(),
            log_file: d_log_file(),
        }
    }
}

fn d_max_restarts() -> u32 {
    5
}
fn d_restart_window_s() -> u64 {
    300
}
fn d_pid_file() -> String {
    "serialagent.pid".into()
}
fn d_log_file() -> String {
    "serialagent.log".into()
}
