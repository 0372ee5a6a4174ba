//! The agent loop (spec §4.5): one inbound message in, a bounded
//! tool-calling round-trip with the provider chain, every turn persisted,
//! a chunked reply out.
//!
//! Grounded on the teacher's `runtime/turn.rs` (system-prompt-plus-history
//! assembly feeding a tool-call loop that persists each round before
//! calling the model again), rewritten around `SessionStore` as the sole
//! source of truth for conversation state instead of an in-memory
//! transcript the teacher kept alongside its JSONL writer.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use sa_domain::config::{AgentConfig, LlmConfig};
use sa_domain::error::{Error, Result};
use sa_domain::tokens::TokenCounter;
use sa_domain::tool::{Message, ToolDefinition};
use sa_domain::trace::TraceEvent;
use sa_providers::traits::ChatRequest;
use sa_providers::ProviderChain;
use sa_sessions::SessionStore;
use sa_tools::ToolExecutor;

use crate::chat_platform::{ChatPlatform, MessageRef};
use crate::chunk;
use crate::compact::Compactor;
use crate::router::Router;
use crate::scheduler::{CronJob, PayloadKind, ScheduledJobExecutor};
use crate::session_lock::SessionLockMap;

/// Phrases that, when they're the entirety of a tool-call-free assistant
/// turn, suggest the model announced an action it didn't actually take
/// (spec §4.5 "continuation nudge").
const CONTINUATION_PHRASES: &[&str] = &["let me", "i'll now", "simultaneously", "i will now"];

/// Dispatches a "report-back" summary to a configured webhook (spec §4.5
/// "side channel"). A trait so tests can swap in a recording double.
#[async_trait]
pub trait ReportBackSender: Send + Sync {
    async fn send(&self, webhook_url: &str, label: &str, location: &str, summary: &str);
}

/// Reference sender: a best-effort POST of `{label, location, summary}`.
pub struct HttpReportBackSender {
    client: reqwest::Client,
}

impl Default for HttpReportBackSender {
    fn default() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl ReportBackSender for HttpReportBackSender {
    async fn send(&self, webhook_url: &str, label: &str, location: &str, summary: &str) {
        let body = serde_json::json!({ "label": label, "location": location, "summary": summary });
        if let Err(e) = self.client.post(webhook_url).json(&body).send().await {
            tracing::warn!(webhook_url, error = %e, "report-back dispatch failed");
        }
    }
}

pub struct NoopReportBackSender;

#[async_trait]
impl ReportBackSender for NoopReportBackSender {
    async fn send(&self, _webhook_url: &str, _label: &str, _location: &str, _summary: &str) {}
}

const REPORT_BACK_SUMMARY_CHARS: usize = 1500;

pub struct Orchestrator {
    sessions: Arc<SessionStore>,
    compactor: Arc<Compactor>,
    router: Arc<Router>,
    tools: Arc<dyn ToolExecutor>,
    tool_defs: Vec<ToolDefinition>,
    tokens: TokenCounter,
    agent: AgentConfig,
    llm: LlmConfig,
    global_system_prompt: String,
    pub(crate) session_locks: Arc<SessionLockMap>,
    platform: Arc<dyn ChatPlatform>,
    report_back: Arc<dyn ReportBackSender>,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        sessions: Arc<SessionStore>,
        compactor: Arc<Compactor>,
        router: Arc<Router>,
        tools: Arc<dyn ToolExecutor>,
        tool_defs: Vec<ToolDefinition>,
        agent: AgentConfig,
        llm: LlmConfig,
        global_system_prompt: String,
        session_locks: Arc<SessionLockMap>,
        platform: Arc<dyn ChatPlatform>,
        report_back: Arc<dyn ReportBackSender>,
    ) -> Arc<Self> {
        Arc::new(Self {
            sessions,
            compactor,
            router,
            tools,
            tool_defs,
            tokens: TokenCounter::default(),
            agent,
            llm,
            global_system_prompt,
            session_locks,
            platform,
            report_back,
        })
    }

    /// Entry point for an inbound chat message at `location` (spec §4.5
    /// "concurrency gate"). Drops the message if a turn is already running
    /// for this location rather than queueing it.
    pub async fn handle_inbound(self: &Arc<Self>, location: &str, reply_to: MessageRef, user_text: &str) {
        let Some(_permit) = self.session_locks.try_acquire(location) else {
            tracing::debug!(location, "turn already in progress for location, dropping inbound message");
            return;
        };
        self.process_turn(location, reply_to, user_text).await;
    }

    async fn process_turn(&self, location: &str, reply_to: MessageRef, user_text: &str) {
        let is_new_session = !self.sessions.exists(location).unwrap_or(true);
        TraceEvent::SessionResolved {
            location: location.to_string(),
            session_id: location.to_string(),
            is_new: is_new_session,
        }
        .emit();

        let user_message = Message::user(user_text);
        let user_tokens = self.tokens.count_message(&user_message);
        if let Err(e) = self.sessions.append(location, &user_message, user_tokens) {
            tracing::error!(location, error = %e, "failed to persist inbound message");
            self.deliver_error(&reply_to, "Sorry, I hit a storage error and couldn't record that message.").await;
            return;
        }

        let chain = match self.router.chain_for(location) {
            Ok(c) => c,
            Err(e) => {
                tracing::error!(location, error = %e, "failed to resolve provider chain");
                self.deliver_error(&reply_to, "Sorry, I couldn't reach the configured model for this conversation.").await;
                return;
            }
        };

        if let Err(e) = self.compactor.maybe_compact(location, &chain).await {
            // §7: compaction failure is swallowed; retried on next message.
            tracing::warn!(location, error = %e, "compaction attempt failed, continuing uncompacted");
        }

        let persona = self.router.route(location).cloned();
        TraceEvent::RouteResolved {
            location: location.to_string(),
            persona: persona.as_ref().map(|p| p.name.clone()).unwrap_or_else(|| "default".into()),
            is_default: persona.is_none(),
        }
        .emit();
        let mut system_prompt = self.router.system_prompt_for(persona.as_ref(), location).await;
        if system_prompt.is_empty() {
            system_prompt = self.global_system_prompt.clone();
        }

        let temperature = persona.as_ref().map(|p| p.temperature).unwrap_or(self.llm.temperature);
        let max_tokens = persona.as_ref().map(|p| p.max_tokens).unwrap_or(self.llm.max_tokens);
        let model = persona.as_ref().and_then(|p| p.model.clone());

        match self.run_tool_loop(location, &system_prompt, &chain, temperature, max_tokens, model).await {
            Ok(final_text) => {
                self.deliver_response(&reply_to, &final_text).await;
                self.report_back_if_configured(location, &final_text).await;
            }
            Err(e) => {
                let message = error_class_message(&e, self.llm.proxy.timeout_s);
                tracing::error!(location, error = %e, "orchestrator turn failed");
                self.deliver_error(&reply_to, &message).await;
            }
        }
    }

    /// Spec §4.5 steps 1-6: the bounded tool-calling loop. Rebuilds the
    /// conversation from `SessionStore` at the top of every round so the
    /// store stays the single source of truth (O1).
    #[allow(clippy::too_many_arguments)]
    async fn run_tool_loop(
        &self,
        location: &str,
        system_prompt: &str,
        chain: &ProviderChain,
        temperature: f32,
        max_tokens: u32,
        model: Option<String>,
    ) -> Result<String> {
        let max_rounds = self.agent.max_tool_rounds.max(1);

        for round in 0..max_rounds {
            let mut conversation = vec![Message::system(system_prompt)];
            conversation.extend(
                self.sessions
                    .messages(location, false)?
                    .into_iter()
                    .map(|m| m.message),
            );

            let req = ChatRequest {
                messages: conversation,
                tools: self.tool_defs.clone(),
                temperature: Some(temperature),
                max_tokens: Some(max_tokens),
                json_mode: false,
                model: model.clone(),
            };
            let resp = chain.chat(req).await?;

            let assistant_message = if resp.tool_calls.is_empty() {
                Message::assistant(resp.content.clone())
            } else {
                Message::assistant_with_tool_calls(resp.content.clone(), resp.tool_calls.clone())
            };
            let assistant_tokens = self.tokens.count_message(&assistant_message);
            self.sessions.append(location, &assistant_message, assistant_tokens)?;

            if resp.tool_calls.is_empty() {
                let remaining = max_rounds - round;
                if self.agent.continuation_nudge && remaining > 2 && looks_like_continuation(&resp.content) {
                    let nudge = Message::user("Use your tools now");
                    let nudge_tokens = self.tokens.count_message(&nudge);
                    self.sessions.append(location, &nudge, nudge_tokens)?;
                    continue;
                }
                return Ok(resp.content);
            }

            for call in &resp.tool_calls {
                let started = std::time::Instant::now();
                let result = self.tools.execute(&call.name, &call.arguments).await;
                let ok = !result.trim_start().starts_with("{\"error\"");
                TraceEvent::ToolCallExecuted {
                    session_id: location.to_string(),
                    tool_name: call.name.clone(),
                    duration_ms: started.elapsed().as_millis() as u64,
                    ok,
                }
                .emit();
                let tool_message = Message::tool_result(&call.id, &call.name, result);
                let tool_tokens = self.tokens.count_message(&tool_message);
                self.sessions.append(location, &tool_message, tool_tokens)?;
            }
        }

        Ok("Reached the maximum number of tool-call rounds without a final response.".to_string())
    }

    /// The isolated-turn capability shared by sub-agent spawns (§4.7) and
    /// scheduled agent_turn jobs (§4.6): system prompt + a single user
    /// task, no SessionStore involvement, conversation lives only for the
    /// duration of this call.
    pub async fn run_isolated(&self, task: &str, model: Option<&str>) -> Result<String> {
        let chain = self.router.chain_for(task_scratch_location()).unwrap_or_else(|_| {
            Arc::new(ProviderChain::from_providers(vec![], self.llm.retry.clone()))
        });
        let max_rounds = self.agent.max_tool_rounds.max(1);
        let mut conversation = vec![
            Message::system(&self.global_system_prompt),
            Message::user(task),
        ];

        for _round in 0..max_rounds {
            let req = ChatRequest {
                messages: conversation.clone(),
                tools: self.tool_defs.clone(),
                temperature: Some(self.llm.temperature),
                max_tokens: Some(self.llm.max_tokens),
                json_mode: false,
                model: model.map(str::to_string),
            };
            let resp = chain.chat(req).await?;

            if resp.tool_calls.is_empty() {
                return Ok(resp.content);
            }

            conversation.push(Message::assistant_with_tool_calls(resp.content.clone(), resp.tool_calls.clone()));
            for call in &resp.tool_calls {
                let result = self.tools.execute(&call.name, &call.arguments).await;
                conversation.push(Message::tool_result(&call.id, &call.name, result));
            }
        }

        Ok("Reached the maximum number of tool-call rounds without a final response.".to_string())
    }

    /// Delivers plain text to a location outside the reply-with-reference
    /// path (used by sub-agent delivery and scheduled job output).
    pub async fn deliver_to(&self, location: &str, text: &str) {
        let max_len = self.platform.max_message_length();
        let chunks = chunk::split_message(text, max_len);
        for (i, chunk) in chunks.iter().enumerate() {
            TraceEvent::ChunkEmitted {
                session_id: location.to_string(),
                chunk_index: i,
                chars: chunk.chars().count(),
            }
            .emit();
            if let Err(e) = self.platform.send(location, chunk).await {
                tracing::warn!(location, error = %e, "failed to deliver message");
                return;
            }
            tokio::time::sleep(Duration::from_millis(self.agent.chunk_delay_ms)).await;
        }
    }

    async fn deliver_response(&self, reply_to: &MessageRef, text: &str) {
        let max_len = self.platform.max_message_length();
        let chunks = chunk::split_message(text, max_len);
        for (i, piece) in chunks.iter().enumerate() {
            TraceEvent::ChunkEmitted {
                session_id: reply_to.channel_id.clone(),
                chunk_index: i,
                chars: piece.chars().count(),
            }
            .emit();
            let result = if i == 0 {
                self.platform.reply(reply_to, piece).await
            } else {
                self.platform.send(&reply_to.channel_id, piece).await
            };
            if let Err(e) = result {
                tracing::warn!(location = %reply_to.channel_id, error = %e, "failed to deliver response chunk");
                return;
            }
            if i + 1 < chunks.len() {
                tokio::time::sleep(Duration::from_millis(self.agent.chunk_delay_ms)).await;
            }
        }
    }

    async fn deliver_error(&self, reply_to: &MessageRef, message: &str) {
        if let Err(e) = self.platform.reply(reply_to, message).await {
            tracing::warn!(location = %reply_to.channel_id, error = %e, "failed to deliver error reply");
        }
    }

    async fn report_back_if_configured(&self, location: &str, final_text: &str) {
        let Some(entry) = self.router.report_back_for(location) else {
            return;
        };
        let summary: String = final_text.chars().take(REPORT_BACK_SUMMARY_CHARS).collect();
        self.report_back.send(&entry.webhook_url, &entry.label, location, &summary).await;
    }
}

/// A location key that never collides with a real chat location, used to
/// resolve the default provider chain for isolated turns without routing
/// through any persona.
fn task_scratch_location() -> &'static str {
    "\u{0}__isolated_turn__"
}

fn looks_like_continuation(text: &str) -> bool {
    let lower = text.to_ascii_lowercase();
    CONTINUATION_PHRASES.iter().any(|phrase| lower.contains(phrase))
}

/// Spec §7: "error replies are single short sentences naming the error
/// class... timeouts note the timeout value... rate-limit exhaustion says
/// so explicitly".
fn error_class_message(e: &Error, timeout_s: u64) -> String {
    if e.is_rate_limit() {
        return "Sorry, the configured models are all rate-limited right now; please try again shortly.".into();
    }
    match e {
        Error::Timeout(_) => format!("Sorry, the request to the model timed out after {timeout_s}s."),
        Error::Provider { .. } | Error::Http(_) => {
            "Sorry, the model provider returned an error and no fallback succeeded.".into()
        }
        Error::Storage(_) => "Sorry, I hit a storage error and couldn't complete that.".into(),
        _ => "Sorry, something went wrong handling that message.".into(),
    }
}

/// Adapts [`Orchestrator::run_isolated`] to [`crate::agent_manager::IsolatedTurnRunner`].
pub struct OrchestratorIsolatedRunner(pub Arc<Orchestrator>);

#[async_trait]
impl crate::agent_manager::IsolatedTurnRunner for OrchestratorIsolatedRunner {
    async fn run(&self, task: &str, model: Option<&str>) -> Result<String> {
        self.0.run_isolated(task, model).await
    }
}

/// Adapts [`Orchestrator::deliver_to`] to [`crate::agent_manager::DeliveryCapability`].
pub struct OrchestratorDelivery(pub Arc<Orchestrator>);

#[async_trait]
impl crate::agent_manager::DeliveryCapability for OrchestratorDelivery {
    async fn deliver(&self, target_location: &str, text: &str) {
        self.0.deliver_to(target_location, text).await;
    }
}

/// Adapts the orchestrator to [`ScheduledJobExecutor`] (§4.6): an
/// `agent_turn` payload runs a full isolated turn and delivers its result;
/// a `system_event` payload is delivered to the target location as-is,
/// with no model call.
pub struct OrchestratorScheduledExecutor(pub Arc<Orchestrator>);

#[async_trait]
impl ScheduledJobExecutor for OrchestratorScheduledExecutor {
    async fn execute(&self, job: &CronJob) -> Result<String> {
        match job.payload_kind {
            PayloadKind::AgentTurn => {
                let result = self.0.run_isolated(&job.payload_text, job.payload_model.as_deref()).await?;
                if let Some(location) = &job.target_location {
                    self.0.deliver_to(location, &result).await;
                }
                Ok(result)
            }
            PayloadKind::SystemEvent => {
                if let Some(location) = &job.target_location {
                    self.0.deliver_to(location, &job.payload_text).await;
                }
                Ok(job.payload_text.clone())
            }
        }
    }
}
