//! Conversation message types shared by the session store, the provider
//! chain, and the orchestrator.
//!
//! A [`Message`] is a closed sum over four roles (§9 "tagged variants for
//! messages"). Role-specific invariants — a `tool` message always carries a
//! `tool_call_id` and `name`; an `assistant` message with `tool_calls` never
//! carries `tool_call_id` — are enforced at construction rather than left to
//! callers to maintain by convention.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "system" => Ok(Role::System),
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            "tool" => Ok(Role::Tool),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// A tool invocation emitted by the model on an assistant turn.
///
/// `arguments` are stored parsed. If the provider returns arguments that
/// don't parse as JSON, the adapter stores `{"_raw": original_string}` per
/// spec §3 and the tool executor receives that shape unchanged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

impl ToolCall {
    /// Build a `ToolCall` from a raw (possibly malformed) arguments string,
    /// as returned by an OpenAI-compatible wire response.
    pub fn from_raw_arguments(id: impl Into<String>, name: impl Into<String>, raw: &str) -> Self {
        let trimmed = raw.trim();
        let arguments = if trimmed.is_empty() {
            serde_json::json!({})
        } else {
            serde_json::from_str(trimmed)
                .unwrap_or_else(|_| serde_json::json!({ "_raw": raw.to_string() }))
        };
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// Tool schema advertised to the LLM (JSON-schema-style parameters).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// A single conversation turn.
///
/// Construction goes through [`Message::system`]/[`Message::user`]/
/// [`Message::assistant`]/[`Message::assistant_with_tool_calls`]/
/// [`Message::tool_result`] so the role/field invariants always hold;
/// there is no public way to build an ill-formed `Message`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Message {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: Some(text.into()),
            tool_calls: Vec::new(),
            tool_call_id: None,
            name: None,
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: Some(text.into()),
            tool_calls: Vec::new(),
            tool_call_id: None,
            name: None,
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: Some(text.into()),
            tool_calls: Vec::new(),
            tool_call_id: None,
            name: None,
        }
    }

    /// An assistant turn that invoked one or more tools. `text` may be empty
    /// (providers frequently return no prose alongside tool calls).
    pub fn assistant_with_tool_calls(text: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        let text = text.into();
        Self {
            role: Role::Assistant,
            content: if text.is_empty() { None } else { Some(text) },
            tool_calls,
            tool_call_id: None,
            name: None,
        }
    }

    /// A tool-result message. `tool_call_id` must match a `ToolCall::id` on
    /// the preceding assistant turn (I1/I6 in spec §3); the session store
    /// and compactor rely on this for integrity checks, not this type.
    pub fn tool_result(
        tool_call_id: impl Into<String>,
        name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            role: Role::Tool,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: Some(tool_call_id.into()),
            name: Some(name.into()),
        }
    }

    pub fn text(&self) -> &str {
        self.content.as_deref().unwrap_or("")
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_result_carries_required_fields() {
        let m = Message::tool_result("call_1", "list_dir", "ok");
        assert_eq!(m.role, Role::Tool);
        assert_eq!(m.tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(m.name.as_deref(), Some("list_dir"));
    }

    #[test]
    fn assistant_with_empty_text_has_no_content() {
        let m = Message::assistant_with_tool_calls(
            "",
            vec![ToolCall {
                id: "c1".into(),
                name: "exec".into(),
                arguments: serde_json::json!({}),
            }],
        );
        assert!(m.content.is_none());
        assert!(m.has_tool_calls());
    }

    #[test]
    fn from_raw_arguments_parses_valid_json() {
        let tc = ToolCall::from_raw_arguments("c1", "list_dir", r#"{"path":"/tmp"}"#);
        assert_eq!(tc.arguments, serde_json::json!({"path": "/tmp"}));
    }

    #[test]
    fn from_raw_arguments_empty_string_becomes_empty_object() {
        let tc = ToolCall::from_raw_arguments("c1", "noop", "");
        assert_eq!(tc.arguments, serde_json::json!({}));
    }

    #[test]
    fn from_raw_arguments_unparseable_wraps_raw() {
        let tc = ToolCall::from_raw_arguments("c1", "broken", "not json{{{");
        assert_eq!(tc.arguments, serde_json::json!({"_raw": "not json{{{"}));
    }

    #[test]
    fn role_round_trips_through_str() {
        for role in [Role::System, Role::User, Role::Assistant, Role::Tool] {
            let parsed: Role = role.as_str().parse().unwrap();
            assert_eq!(parsed, role);
        }
    }
}
