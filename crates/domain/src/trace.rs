use serde::Serialize;

/// Structured trace events emitted across all gateway crates. Each variant
/// is logged as a single `tracing::info!` call carrying the serialized
/// event as a field, so a JSON log sink can index on `event`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    RouteResolved {
        location: String,
        persona: String,
        is_default: bool,
    },
    SessionResolved {
        location: String,
        session_id: String,
        is_new: bool,
    },
    SessionCompacted {
        session_id: String,
        tokens_before: u32,
        tokens_after: u32,
        messages_summarized: usize,
        messages_kept: usize,
    },
    LlmRequest {
        provider: String,
        model: String,
        streaming: bool,
        duration_ms: u64,
        prompt_tokens: Option<u32>,
        completion_tokens: Option<u32>,
    },
    LlmFallback {
        from_provider: String,
        from_model: String,
        to_provider: String,
        to_model: String,
        reason: String,
    },
    ToolCallExecuted {
        session_id: String,
        tool_name: String,
        duration_ms: u64,
        ok: bool,
    },
    ChunkEmitted {
        session_id: String,
        chunk_index: usize,
        chars: usize,
    },
    CronFired {
        job_id: String,
        scheduled_for: String,
        late_by_ms: i64,
    },
    SubAgentSpawned {
        parent_session_id: String,
        subagent_id: String,
        task: String,
    },
    SubAgentFinished {
        subagent_id: String,
        duration_ms: u64,
        ok: bool,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "sa_event");
    }
}
