//! Chat platform capability (spec §6): inbound event admission and the
//! outbound reply/send/fetch_channel surface the orchestrator drives.
//!
//! The concrete chat platform (Discord, Slack, whatever) is an external
//! collaborator out of scope for this core (§1); this module is the seam
//! plus the admission policy layered on top of it, grounded on the
//! teacher's `api::inbound` dedupe/admission shape.

use async_trait::async_trait;
use parking_lot::Mutex;

use sa_domain::config::DiscordConfig;

use crate::router::Router;

/// One inbound chat-platform event (spec §6 "message arrived").
#[derive(Debug, Clone)]
pub struct InboundEvent {
    pub author: String,
    pub is_bot: bool,
    pub is_dm: bool,
    pub guild: Option<String>,
    pub channel_id: String,
    pub content: String,
    pub mentions: Vec<String>,
    pub webhook_id: Option<String>,
}

/// Identifies the message an outbound reply is threaded from.
#[derive(Debug, Clone)]
pub struct MessageRef {
    pub channel_id: String,
    pub message_id: String,
}

/// Outbound chat-platform capability (spec §6): reply/send/fetch_channel,
/// plus the platform's message-length bound.
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    async fn reply(&self, message_ref: &MessageRef, text: &str) -> sa_domain::Result<()>;
    async fn send(&self, channel_id: &str, text: &str) -> sa_domain::Result<()>;
    async fn fetch_channel(&self, id: &str) -> sa_domain::Result<ChannelInfo>;
    fn max_message_length(&self) -> usize;
}

#[derive(Debug, Clone)]
pub struct ChannelInfo {
    pub id: String,
    pub name: Option<String>,
    pub is_dm: bool,
}

/// Admission filter (spec §6): decides whether an inbound event should
/// reach the orchestrator at all. `bot_user_id` is the platform id the
/// bot mentions itself with.
pub fn should_admit(
    event: &InboundEvent,
    discord: &DiscordConfig,
    router: &Router,
    bot_user_id: &str,
) -> bool {
    if event.is_bot {
        return false;
    }

    if event.is_dm {
        return match discord.dm_policy {
            sa_domain::config::DmPolicy::Open => true,
            sa_domain::config::DmPolicy::Allowlist => {
                discord.dm_allowlist.iter().any(|a| a == &event.author)
            }
        };
    }

    let Some(guild) = &event.guild else {
        // Non-DM, non-guild events (malformed or unsupported) are rejected.
        return false;
    };
    if !discord.guild_ids.is_empty() && !discord.guild_ids.contains(guild) {
        return false;
    }

    let mentioned = event.mentions.iter().any(|m| m == bot_user_id);
    let is_webhook = event.webhook_id.is_some();

    if router.is_routed() {
        let Some(persona) = router.route(&event.channel_id) else {
            // Unmapped channel: webhooks into it are still rejected, same
            // as a human message, since there's no persona to address.
            return false;
        };
        if !Router::is_user_authorized(persona, &event.author) {
            return false;
        }
        if persona.require_mention == Some(true) {
            // A shared channel where this persona only answers when
            // explicitly addressed.
            return is_webhook || mentioned;
        }
        // Default routed rule: mentioning the bot here means the message
        // was addressed elsewhere, so it's ignored.
        if mentioned && !is_webhook {
            return false;
        }
        return true;
    }

    if is_webhook {
        return true;
    }
    if discord.require_mention && !mentioned {
        return false;
    }
    true
}

/// Deterministic in-memory mock, used by orchestrator tests and by the
/// interactive `chat` CLI command (which has no real platform to talk to).
#[derive(Default)]
pub struct MockChatPlatform {
    pub replies: Mutex<Vec<(String, String)>>,
    pub sends: Mutex<Vec<(String, String)>>,
    max_length: usize,
}

impl MockChatPlatform {
    pub fn new(max_length: usize) -> Self {
        Self {
            replies: Mutex::new(Vec::new()),
            sends: Mutex::new(Vec::new()),
            max_length,
        }
    }

    pub fn all_sent(&self) -> Vec<String> {
        let mut out: Vec<String> = self.replies.lock().iter().map(|(_, t)| t.clone()).collect();
        out.extend(self.sends.lock().iter().map(|(_, t)| t.clone()));
        out
    }
}

#[async_trait]
impl ChatPlatform for MockChatPlatform {
    async fn reply(&self, message_ref: &MessageRef, text: &str) -> sa_domain::Result<()> {
        self.replies
            .lock()
            .push((message_ref.channel_id.clone(), text.to_string()));
        Ok(())
    }

    async fn send(&self, channel_id: &str, text: &str) -> sa_domain::Result<()> {
        self.sends.lock().push((channel_id.to_string(), text.to_string()));
        Ok(())
    }

    async fn fetch_channel(&self, id: &str) -> sa_domain::Result<ChannelInfo> {
        Ok(ChannelInfo {
            id: id.to_string(),
            name: None,
            is_dm: false,
        })
    }

    fn max_message_length(&self) -> usize {
        if self.max_length == 0 {
            2000
        } else {
            self.max_length
        }
    }
}

/// Reference outbound implementation for the CLI `run`/`chat` commands,
/// which have no real chat platform behind them: replies and sends are
/// printed to stdout, prefixed by location, so a terminal session can
/// drive the orchestrator end to end.
pub struct StdoutChatPlatform {
    max_length: usize,
}

impl StdoutChatPlatform {
    pub fn new(max_length: usize) -> Self {
        Self { max_length }
    }
}

#[async_trait]
impl ChatPlatform for StdoutChatPlatform {
    async fn reply(&self, message_ref: &MessageRef, text: &str) -> sa_domain::Result<()> {
        println!("[{}] {text}", message_ref.channel_id);
        Ok(())
    }

    async fn send(&self, channel_id: &str, text: &str) -> sa_domain::Result<()> {
        println!("[{channel_id}] {text}");
        Ok(())
    }

    async fn fetch_channel(&self, id: &str) -> sa_domain::Result<ChannelInfo> {
        Ok(ChannelInfo {
            id: id.to_string(),
            name: None,
            is_dm: false,
        })
    }

    fn max_message_length(&self) -> usize {
        if self.max_length == 0 {
            2000
        } else {
            self.max_length
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sa_domain::config::{Config, DmPolicy, PersonaConfig, RouterConfig};
    use sa_providers::ProviderChain;
    use std::sync::Arc;

    fn router_with(personas: Vec<PersonaConfig>) -> Router {
        let mut config = Config::default();
        config.router = RouterConfig {
            personas,
            default_persona: None,
            report_back: vec![],
        };
        let chain = Arc::new(ProviderChain::from_providers(vec![], Default::default()));
        Router::new(&config, chain)
    }

    fn event(author: &str, is_dm: bool, guild: Option<&str>, channel: &str) -> InboundEvent {
        InboundEvent {
            author: author.into(),
            is_bot: false,
            is_dm,
            guild: guild.map(String::from),
            channel_id: channel.into(),
            content: "hello".into(),
            mentions: vec![],
            webhook_id: None,
        }
    }

    #[test]
    fn bot_messages_are_never_admitted() {
        let discord = DiscordConfig::default();
        let router = router_with(vec![]);
        let mut e = event("alice", true, None, "c1");
        e.is_bot = true;
        assert!(!should_admit(&e, &discord, &router, "bot-id"));
    }

    #[test]
    fn open_dm_policy_admits_any_dm() {
        let discord = DiscordConfig::default();
        let router = router_with(vec![]);
        let e = event("alice", true, None, "dm-1");
        assert!(should_admit(&e, &discord, &router, "bot-id"));
    }

    #[test]
    fn allowlist_dm_policy_rejects_unknown_author() {
        let mut discord = DiscordConfig::default();
        discord.dm_policy = DmPolicy::Allowlist;
        discord.dm_allowlist = vec!["alice".into()];
        let router = router_with(vec![]);
        assert!(should_admit(&event("alice", true, None, "dm-1"), &discord, &router, "bot-id"));
        assert!(!should_admit(&event("bob", true, None, "dm-1"), &discord, &router, "bot-id"));
    }

    #[test]
    fn unrouted_guild_message_requires_mention_by_default() {
        let discord = DiscordConfig::default();
        let router = router_with(vec![]);
        let mut e = event("alice", false, Some("g1"), "c1");
        assert!(!should_admit(&e, &discord, &router, "bot-id"));
        e.mentions.push("bot-id".into());
        assert!(should_admit(&e, &discord, &router, "bot-id"));
    }

    #[test]
    fn routed_channel_ignores_message_that_mentions_bot() {
        let discord = DiscordConfig::default();
        let persona = PersonaConfig {
            name: "eng".into(),
            channel_ids: vec!["c1".into()],
            workspace: ".".into(),
            prompt_files: vec![],
            model: None,
            base_url: None,
            temperature: 0.7,
            max_tokens: 4096,
            authorized_users: None,
            require_mention: None,
        };
        let router = router_with(vec![persona]);
        let mut e = event("alice", false, Some("g1"), "c1");
        assert!(should_admit(&e, &discord, &router, "bot-id"));
        e.mentions.push("bot-id".into());
        assert!(!should_admit(&e, &discord, &router, "bot-id"));
    }

    #[test]
    fn persona_require_mention_overrides_default_routed_rule() {
        let discord = DiscordConfig::default();
        let persona = PersonaConfig {
            name: "eng".into(),
            channel_ids: vec!["c1".into()],
            workspace: ".".into(),
            prompt_files: vec![],
            model: None,
            base_url: None,
            temperature: 0.7,
            max_tokens: 4096,
            authorized_users: None,
            require_mention: Some(true),
        };
        let router = router_with(vec![persona]);
        let mut e = event("alice", false, Some("g1"), "c1");
        assert!(!should_admit(&e, &discord, &router, "bot-id"), "unmentioned message in a mention-required persona channel must be rejected");
        e.mentions.push("bot-id".into());
        assert!(should_admit(&e, &discord, &router, "bot-id"), "mentioning the bot must admit it when require_mention is set");
    }

    #[test]
    fn unmapped_channel_is_rejected_when_routing_active() {
        let discord = DiscordConfig::default();
        let persona = PersonaConfig {
            name: "eng".into(),
            channel_ids: vec!["c1".into()],
            workspace: ".".into(),
            prompt_files: vec![],
            model: None,
            base_url: None,
            temperature: 0.7,
            max_tokens: 4096,
            authorized_users: None,
            require_mention: None,
        };
        let router = router_with(vec![persona]);
        let e = event("alice", false, Some("g1"), "c-other");
        assert!(!should_admit(&e, &discord, &router, "bot-id"));
    }

    #[test]
    fn guild_whitelist_rejects_other_guilds() {
        let mut discord = DiscordConfig::default();
        discord.guild_ids = vec!["g1".into()];
        discord.require_mention = false;
        let router = router_with(vec![]);
        assert!(should_admit(&event("alice", false, Some("g1"), "c1"), &discord, &router, "bot-id"));
        assert!(!should_admit(&event("alice", false, Some("g2"), "c1"), &discord, &router, "bot-id"));
    }
}
