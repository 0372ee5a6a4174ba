use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Compaction (spec §6 `compaction.*`, algorithm in §4.2)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Token-budget-driven summarization of old conversation history, keeping
/// tool-call/tool-result pairs intact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompactionConfig {
    #[serde(default = "d_true")]
    pub enabled: bool,
    /// Compaction fires once `token_sum(location)` exceeds this.
    #[serde(default = "d_max_context_tokens")]
    pub max_context_tokens: u32,
    /// Compaction walks backward until the retained tail is at or under
    /// this many tokens.
    #[serde(default = "d_target_tokens")]
    pub target_tokens: u32,
    /// Model used to produce the summary. Defaults to `models.primary`
    /// when unset.
    #[serde(default)]
    pub summary_model: Option<String>,
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_context_tokens: d_max_context_tokens(),
            target_tokens: d_target_tokens(),
            summary_model: None,
        }
    }
}

fn d_true() -> bool {
    true
}
fn d_max_context_tokens() -> u32 {
    100_000
}
fn d_target_tokens() -> u32 {
    50_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = CompactionConfig::default();
        assert!(cfg.enabled);
        assert!(cfg.target_tokens < cfg.max_context_tokens);
    }
}
