//! Token-budget-driven compaction (spec §4.2), preserving tool-call/
//! tool-result integrity.
//!
//! Grounded on the teacher's `runtime/compact.rs` split → summarize →
//! persist-marker shape and summarization prompt wording, rewritten around
//! `SessionStore` rows (ordering ids, `token_count`, `compacted` flag)
//! instead of transcript JSONL lines.

use std::sync::Arc;

use sa_domain::config::CompactionConfig;
use sa_domain::tool::{Message, Role};
use sa_domain::tokens::TokenCounter;
use sa_domain::trace::TraceEvent;
use sa_providers::traits::ChatRequest;
use sa_providers::ProviderChain;
use sa_sessions::{SessionStore, StoredMessage};

/// Transcript input to the summarizer is capped at this many characters
/// (spec §4.2 step 6: "~80k").
const SUMMARY_INPUT_CHAR_CAP: usize = 80_000;

pub struct Compactor {
    store: Arc<SessionStore>,
    config: CompactionConfig,
    tokens: TokenCounter,
}

impl Compactor {
    pub fn new(store: Arc<SessionStore>, config: CompactionConfig) -> Self {
        Self {
            store,
            config,
            tokens: TokenCounter::default(),
        }
    }

    /// Run the compaction algorithm for `location` if its active token sum
    /// exceeds `max_context_tokens`. Returns `true` if compaction ran.
    ///
    /// Follows spec §4.2 steps 1-8 exactly, including the "tool-call
    /// integrity adjustment" (step 4): the walk-back boundary is never
    /// allowed to land between an assistant's tool calls and their results.
    pub async fn maybe_compact(&self, location: &str, chain: &ProviderChain) -> sa_domain::Result<bool> {
        if !self.config.enabled {
            return Ok(false);
        }

        let token_sum = self.store.token_sum(location)?;
        if token_sum <= self.config.max_context_tokens {
            return Ok(false);
        }

        let active = self.store.messages(location, false)?;
        if active.len() < 4 {
            return Ok(false);
        }

        let Some(keep_from) = self.compute_keep_from(&active) else {
            return Ok(false);
        };
        if keep_from == 0 {
            return Ok(false);
        }

        let to_compact = &active[..keep_from];
        let transcript = build_transcript(to_compact);

        let summary = match self.summarize(chain, &transcript).await {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(location, error = %e, "compaction summarization failed, leaving state unchanged");
                return Ok(false);
            }
        };

        let compact_up_to = active[keep_from - 1].id;
        self.store.mark_compacted(location, compact_up_to)?;

        let summary_text = format!("[Previous conversation summary]\n{summary}");
        let summary_message = Message::system(&summary_text);
        let summary_tokens = self.tokens.count_message(&summary_message);
        self.store.append(location, &summary_message, summary_tokens)?;

        let tokens_after = self.store.token_sum(location).unwrap_or(0);
        TraceEvent::SessionCompacted {
            session_id: location.to_string(),
            tokens_before: token_sum,
            tokens_after,
            messages_summarized: keep_from,
            messages_kept: active.len() - keep_from,
        }
        .emit();

        tracing::info!(
            location,
            compacted_count = keep_from,
            compact_up_to,
            "compaction completed"
        );
        Ok(true)
    }

    /// Spec §4.2 steps 3-4: walk backward accumulating tokens until adding
    /// the next message would exceed `target_tokens`, forcing at least the
    /// last two messages to survive, then adjust backward past any tool
    /// message so a tool result is never kept without its parent assistant.
    fn compute_keep_from(&self, active: &[StoredMessage]) -> Option<usize> {
        let n = active.len();
        let max_keep_from = n.saturating_sub(2);

        let mut acc: u32 = 0;
        let mut keep_from = n;
        for i in (0..n).rev() {
            let next_acc = acc + active[i].token_count;
            if next_acc > self.config.target_tokens && i < max_keep_from {
                keep_from = i + 1;
                break;
            }
            acc = next_acc;
            keep_from = i;
        }
        keep_from = keep_from.min(max_keep_from);

        while keep_from < active.len() && active[keep_from].message.role == Role::Tool {
            if keep_from == 0 {
                return None;
            }
            keep_from -= 1;
        }

        Some(keep_from)
    }

    async fn summarize(&self, chain: &ProviderChain, transcript: &str) -> sa_domain::Result<String> {
        let (transcript, truncated) = if transcript.len() > SUMMARY_INPUT_CHAR_CAP {
            (&transcript[..SUMMARY_INPUT_CHAR_CAP], true)
        } else {
            (transcript, false)
        };
        let truncation_note = if truncated {
            "\n[transcript truncated to fit summarization input bound]"
        } else {
            ""
        };

        let prompt = format!(
            "Summarize the following conversation history densely and factually. \
             Preserve decisions made, identifiers and file paths mentioned, the \
             current state of any in-progress work, and outstanding action items. \
             Omit greetings and pleasantries.\n\nCONVERSATION:\n{transcript}{truncation_note}"
        );

        let req = ChatRequest {
            messages: vec![Message::user(prompt)],
            tools: vec![],
            temperature: Some(0.3),
            max_tokens: Some(2048),
            json_mode: false,
            model: self.config.summary_model.clone(),
        };

        let resp = chain.chat(req).await?;
        Ok(resp.content)
    }
}

fn build_transcript(messages: &[StoredMessage]) -> String {
    let mut buf = String::new();
    for m in messages {
        let label = match m.message.role {
            Role::System => "System",
            Role::User => "User",
            Role::Assistant => "Assistant",
            Role::Tool => "Tool",
        };
        buf.push_str(label);
        buf.push_str(": ");
        buf.push_str(m.message.text());
        if !m.message.tool_calls.is_empty() {
            for call in &m.message.tool_calls {
                buf.push_str(&format!(" [tool_call {}({})]", call.name, call.arguments));
            }
        }
        buf.push('\n');
    }
    buf
}

#[cfg(test)]
mod tests {
    use super::*;
    use sa_domain::tool::ToolCall;

    fn store_with(messages: Vec<(Message, u32)>) -> Arc<SessionStore> {
        let store = Arc::new(SessionStore::open_in_memory().unwrap());
        for (msg, tokens) in messages {
            store.append("loc", &msg, tokens).unwrap();
        }
        store
    }

    #[test]
    fn too_few_messages_is_noop() {
        let store = store_with(vec![
            (Message::user("a"), 10),
            (Message::assistant("b"), 10),
        ]);
        let compactor = Compactor::new(store.clone(), CompactionConfig::default());
        let active = store.messages("loc", false).unwrap();
        assert!(compactor.compute_keep_from(&active).is_some());
        // With < 4 messages maybe_compact would short-circuit before this
        // is even consulted; this test pins compute_keep_from's own
        // behavior on a short list (always keeps everything back to 0).
    }

    #[test]
    fn keep_from_respects_integrity_adjustment() {
        // Mirrors spec §8 S2: tokens [20,20,20,20,20,20,20,10], target=60,
        // message[2]=assistant w/ tool_calls, message[3]=its tool result.
        let call = ToolCall {
            id: "c1".into(),
            name: "exec".into(),
            arguments: serde_json::json!({}),
        };
        let store = store_with(vec![
            (Message::user("m0"), 20),
            (Message::user("m1"), 20),
            (Message::assistant_with_tool_calls("", vec![call]), 20),
            (Message::tool_result("c1", "exec", "result"), 20),
            (Message::user("m4"), 20),
            (Message::user("m5"), 20),
            (Message::user("m6"), 20),
            (Message::user("m7"), 10),
        ]);
        let mut config = CompactionConfig::default();
        config.max_context_tokens = 100;
        config.target_tokens = 60;

        let compactor = Compactor::new(store.clone(), config);
        let active = store.messages("loc", false).unwrap();
        let keep_from = compactor.compute_keep_from(&active).unwrap();
        // Walking back from the tail accumulating to <=60 lands initially
        // on the tool message (index 3); integrity adjustment steps back
        // onto its parent assistant (index 2).
        assert_eq!(keep_from, 2);
    }

    #[tokio::test]
    async fn maybe_compact_noop_when_under_budget() {
        let store = store_with(vec![
            (Message::user("a"), 10),
            (Message::assistant("b"), 10),
            (Message::user("c"), 10),
            (Message::assistant("d"), 10),
        ]);
        let compactor = Compactor::new(store, CompactionConfig::default());
        let chain = ProviderChain::from_providers(vec![], Default::default());
        let ran = compactor.maybe_compact("loc", &chain).await.unwrap();
        assert!(!ran);
    }
}
