//! Approximate token counting (spec §4.9).
//!
//! There is no teacher counterpart for this — it's new, grounded on the
//! cl100k-style "~4 chars per token" heuristic used throughout the
//! LLM-adjacent crates in the retrieval pack when a real tokenizer isn't
//! wired in. A pluggable `Tokenizer` trait keeps the door open for a real
//! BPE implementation without touching call sites.

use crate::tool::Message;

/// Per-message base overhead charged by most chat-completion wire formats
/// (role framing, separators) independent of content length.
const MESSAGE_OVERHEAD_TOKENS: u32 = 4;

/// Something that can estimate the token count of a string.
pub trait Tokenizer: Send + Sync {
    fn count(&self, text: &str) -> u32;
}

/// Fallback tokenizer: `ceil(len(text) / 4)`, the standard cl100k-ish
/// approximation when no real BPE vocabulary is available.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApproxTokenizer;

impl Tokenizer for ApproxTokenizer {
    fn count(&self, text: &str) -> u32 {
        let chars = text.chars().count() as u32;
        chars.div_ceil(4)
    }
}

/// Estimates token counts for whole [`Message`] values.
pub struct TokenCounter<T: Tokenizer = ApproxTokenizer> {
    tokenizer: T,
}

impl Default for TokenCounter<ApproxTokenizer> {
    fn default() -> Self {
        Self {
            tokenizer: ApproxTokenizer,
        }
    }
}

impl<T: Tokenizer> TokenCounter<T> {
    pub fn with_tokenizer(tokenizer: T) -> Self {
        Self { tokenizer }
    }

    /// Count the tokens in a plain string (used for summaries, etc.)
    pub fn count_text(&self, text: &str) -> u32 {
        self.tokenizer.count(text)
    }

    /// Count the tokens a [`Message`] would cost in a chat-completion
    /// request: base overhead + content + (per tool call) name + JSON
    /// arguments + a tag for the call itself.
    pub fn count_message(&self, message: &Message) -> u32 {
        let mut total = MESSAGE_OVERHEAD_TOKENS;
        if let Some(content) = &message.content {
            total += self.tokenizer.count(content);
        }
        for call in &message.tool_calls {
            total += self.tokenizer.count(&call.name);
            let args = serde_json::to_string(&call.arguments).unwrap_or_default();
            total += self.tokenizer.count(&args);
            total += 4; // name-tag / call-id framing
        }
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::ToolCall;

    #[test]
    fn approx_tokenizer_ceils() {
        let t = ApproxTokenizer;
        assert_eq!(t.count(""), 0);
        assert_eq!(t.count("abc"), 1);
        assert_eq!(t.count("abcd"), 1);
        assert_eq!(t.count("abcde"), 2);
    }

    #[test]
    fn count_message_includes_overhead() {
        let counter = TokenCounter::default();
        let m = Message::user("hello");
        assert!(counter.count_message(&m) > counter.count_text("hello"));
    }

    #[test]
    fn count_message_counts_tool_calls() {
        let counter = TokenCounter::default();
        let plain = Message::assistant("");
        let with_call = Message::assistant_with_tool_calls(
            "",
            vec![ToolCall {
                id: "c1".into(),
                name: "list_dir".into(),
                arguments: serde_json::json!({"path": "/tmp"}),
            }],
        );
        assert!(counter.count_message(&with_call) > counter.count_message(&plain));
    }
}
