use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Chat platform admission policy (spec §6 `discord.*`)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Controls which inbound chat-platform events are admitted to the
/// orchestrator. Named `discord` to match the config schema in spec §6;
/// the chat platform itself is an external capability (§6), this is only
/// the admission policy layered on top of it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscordConfig {
    /// Environment variable holding the bot token (never stored directly).
    #[serde(default = "d_token_env")]
    pub token_env: String,
    /// Guild (server) ids the bot is allowed to operate in. Empty means
    /// "any guild" for non-DM admission.
    #[serde(default)]
    pub guild_ids: Vec<String>,
    /// Require an @mention to address the bot in guild channels.
    #[serde(default = "d_true")]
    pub require_mention: bool,
    #[serde(default)]
    pub dm_policy: DmPolicy,
    /// Authors allowed to DM when `dm_policy = allowlist`.
    #[serde(default)]
    pub dm_allowlist: Vec<String>,
    #[serde(default)]
    pub status_message: Option<String>,
    #[serde(default = "d_max_message_length")]
    pub max_message_length: usize,
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            token_env: d_token_env(),
            guild_ids: Vec::new(),
            require_mention: true,
            dm_policy: DmPolicy::default(),
            dm_allowlist: Vec::new(),
            status_message: None,
            max_message_length: d_max_message_length(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DmPolicy {
    #[default]
    Open,
    Allowlist,
}

fn d_token_env() -> String {
    "DISCORD_TOKEN".into()
}
fn d_true() -> bool {
    true
}
fn d_max_message_length() -> usize {
    2000
}
