use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Orchestrator / sub-agent pool (spec §6 `agent.*`)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "d_workspace")]
    pub workspace: String,
    #[serde(default)]
    pub system_prompt_files: Vec<String>,
    #[serde(default = "d_exec_timeout")]
    pub exec_timeout: u64,
    #[serde(default = "d_exec_max_output")]
    pub exec_max_output: usize,
    #[serde(default = "d_max_subagents")]
    pub max_subagents: usize,
    /// Bound on tool-calling rounds per turn (§9 open question: fixed at a
    /// single config value rather than the 15/40 split seen across source
    /// revisions).
    #[serde(default = "d_max_tool_rounds")]
    pub max_tool_rounds: usize,
    /// Off by default per §9: keyword-triggered forced continuation is
    /// brittle and model-specific.
    #[serde(default)]
    pub continuation_nudge: bool,
    /// Inter-chunk delivery delay (§4.5 response delivery, §5 O2).
    #[serde(default = "d_chunk_delay_ms")]
    pub chunk_delay_ms: u64,
    /// Tick interval for the scheduler (§4.6).
    #[serde(default = "d_scheduler_tick_s")]
    pub scheduler_tick_s: u64,
    /// Default sub-agent timeout (§5).
    #[serde(default = "d_subagent_timeout_s")]
    pub subagent_timeout_s: u64,
    /// Default cron job payload timeout (§5).
    #[serde(default = "d_cron_timeout_s")]
    pub cron_timeout_s: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            workspace: d_workspace(),
            system_prompt_files: Vec::new(),
            exec_timeout: d_exec_timeout(),
            exec_max_output: d_exec_max_output(),
            max_subagents: d_max_subagents(),
            max_tool_rounds: d_max_tool_rounds(),
            continuation_nudge: false,
            chunk_delay_ms: d_chunk_delay_ms(),
            scheduler_tick_s: d_scheduler_tick_s(),
            subagent_timeout_s: d_subagent_timeout_s(),
            cron_timeout_s: d_cron_timeout_s(),
        }
    }
}

fn d_workspace() -> String {
    ".".into()
}
fn d_exec_timeout() -> u64 {
    30
}
fn d_exec_max_output() -> usize {
    64 * 1024
}
fn d_max_subagents() -> usize {
    5
}
fn d_max_tool_rounds() -> usize {
    25
}
fn d_chunk_delay_ms() -> u64 {
    500
}
fn d_scheduler_tick_s() -> u64 {
    15
}
fn d_subagent_timeout_s() -> u64 {
    300
}
fn d_cron_timeout_s() -> u64 {
    120
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn continuation_nudge_defaults_off() {
        assert!(!AgentConfig::default().continuation_nudge);
    }

    #[test]
    fn max_tool_rounds_is_bounded() {
        let cfg = AgentConfig::default();
        assert!(cfg.max_tool_rounds >= 15 && cfg.max_tool_rounds <= 40);
    }
}
