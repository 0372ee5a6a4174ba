//! Tool executor capability (spec §6): `execute(name, arguments) -> string`.
//!
//! The orchestrator depends only on this trait and on [`TOOL_DEFINITIONS`];
//! it makes no assumption about what a tool actually does. Tool execution
//! failures are captured here and returned as a `{"error": "..."}` JSON
//! string rather than propagated — §7 "tool execution failure never raised
//! to the orchestrator".

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use sa_domain::tool::ToolDefinition;

use crate::exec::{self, ExecRequest};
use crate::file_ops::{
    self, FileAppendRequest, FileDeleteRequest, FileListRequest, FileMoveRequest,
    FileReadRequest, FileWriteRequest,
};

/// Something that can run a named tool against structured arguments and
/// return its result as a string (spec §6 tool executor capability).
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(&self, name: &str, arguments: &Value) -> String;
}

/// The schemas advertised to the LLM for every tool [`DefaultToolExecutor`]
/// implements. Declared once, as a static table, per §4.5/§6.
pub fn tool_definitions() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: "exec".into(),
            description: "Run a shell command in the agent's workspace and return its output."
                .into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "command": {"type": "string"},
                    "workdir": {"type": "string"},
                    "stdin": {"type": "string"}
                },
                "required": ["command"]
            }),
        },
        ToolDefinition {
            name: "read_file".into(),
            description: "Read a text file within the workspace, optionally by line range."
                .into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string"},
                    "offset": {"type": "integer"},
                    "limit": {"type": "integer"}
                },
                "required": ["path"]
            }),
        },
        ToolDefinition {
            name: "write_file".into(),
            description: "Write (overwrite) a text file within the workspace.".into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string"},
                    "content": {"type": "string"}
                },
                "required": ["path", "content"]
            }),
        },
        ToolDefinition {
            name: "append_file".into(),
            description: "Append to a text file within the workspace.".into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string"},
                    "content": {"type": "string"}
                },
                "required": ["path", "content"]
            }),
        },
        ToolDefinition {
            name: "move_file".into(),
            description: "Move or rename a file or directory within the workspace.".into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "source": {"type": "string"},
                    "destination": {"type": "string"}
                },
                "required": ["source", "destination"]
            }),
        },
        ToolDefinition {
            name: "delete_file".into(),
            description: "Delete a file or empty directory within the workspace.".into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string"}
                },
                "required": ["path"]
            }),
        },
        ToolDefinition {
            name: "list_dir".into(),
            description: "List the contents of a directory within the workspace.".into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string"}
                }
            }),
        },
    ]
}

/// Reference [`ToolExecutor`] wiring shell exec + workspace-scoped file
/// tools. Unknown tool names (e.g. MCP/web-fetch/memory-search tools that
/// are out-of-scope external collaborators per spec §1) return a structured
/// error rather than panicking, since this executor only knows its own
/// static table.
pub struct DefaultToolExecutor {
    workspace_root: PathBuf,
    exec_timeout: Duration,
    exec_max_output: usize,
}

impl DefaultToolExecutor {
    pub fn new(workspace_root: impl Into<PathBuf>, exec_timeout: Duration, exec_max_output: usize) -> Self {
        Self {
            workspace_root: workspace_root.into(),
            exec_timeout,
            exec_max_output,
        }
    }

    fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }
}

fn error_json(message: impl std::fmt::Display) -> String {
    serde_json::json!({ "error": message.to_string() }).to_string()
}

fn parse_args<T: serde::de::DeserializeOwned>(arguments: &Value) -> Result<T, String> {
    serde_json::from_value(arguments.clone()).map_err(|e| format!("invalid arguments: {e}"))
}

#[async_trait]
impl ToolExecutor for DefaultToolExecutor {
    async fn execute(&self, name: &str, arguments: &Value) -> String {
        // §7: unparseable tool-call arguments arrive as {"_raw": "..."}.
        // We don't special-case it here — it simply fails the per-tool
        // deserialization below and is reported as a structured error,
        // same as any other malformed argument set.
        let result = match name {
            "exec" => match parse_args::<ExecRequest>(arguments) {
                Ok(req) => exec::exec(
                    self.workspace_root(),
                    req,
                    self.exec_timeout,
                    self.exec_max_output,
                )
                .await
                .map(|s| s),
                Err(e) => Err(e),
            },
            "read_file" => match parse_args::<FileReadRequest>(arguments) {
                Ok(req) => file_ops::file_read(self.workspace_root(), req)
                    .await
                    .map(|v| v.to_string()),
                Err(e) => Err(e),
            },
            "write_file" => match parse_args::<FileWriteRequest>(arguments) {
                Ok(req) => file_ops::file_write(self.workspace_root(), req)
                    .await
                    .map(|v| v.to_string()),
                Err(e) => Err(e),
            },
            "append_file" => match parse_args::<FileAppendRequest>(arguments) {
                Ok(req) => file_ops::file_append(self.workspace_root(), req)
                    .await
                    .map(|v| v.to_string()),
                Err(e) => Err(e),
            },
            "move_file" => match parse_args::<FileMoveRequest>(arguments) {
                Ok(req) => file_ops::file_move(self.workspace_root(), req)
                    .await
                    .map(|v| v.to_string()),
                Err(e) => Err(e),
            },
            "delete_file" => match parse_args::<FileDeleteRequest>(arguments) {
                Ok(req) => file_ops::file_delete(self.workspace_root(), req)
                    .await
                    .map(|v| v.to_string()),
                Err(e) => Err(e),
            },
            "list_dir" => match parse_args::<FileListRequest>(arguments) {
                Ok(req) => file_ops::file_list(self.workspace_root(), req)
                    .await
                    .map(|v| v.to_string()),
                Err(e) => Err(e),
            },
            other => Err(format!("unknown tool '{other}'")),
        };

        match result {
            Ok(s) => s,
            Err(e) => error_json(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn exec_tool_returns_output() {
        let tmp = tempfile::TempDir::new().unwrap();
        let executor = DefaultToolExecutor::new(tmp.path(), Duration::from_secs(5), 4096);
        let out = executor
            .execute("exec", &serde_json::json!({"command": "echo hi"}))
            .await;
        assert!(out.contains("hi"));
    }

    #[tokio::test]
    async fn unknown_tool_returns_error_json() {
        let tmp = tempfile::TempDir::new().unwrap();
        let executor = DefaultToolExecutor::new(tmp.path(), Duration::from_secs(5), 4096);
        let out = executor.execute("nonexistent", &serde_json::json!({})).await;
        let parsed: Value = serde_json::from_str(&out).unwrap();
        assert!(parsed.get("error").is_some());
    }

    #[tokio::test]
    async fn malformed_arguments_become_error_json_not_panic() {
        let tmp = tempfile::TempDir::new().unwrap();
        let executor = DefaultToolExecutor::new(tmp.path(), Duration::from_secs(5), 4096);
        let out = executor
            .execute("read_file", &serde_json::json!({"_raw": "not an object"}))
            .await;
        let parsed: Value = serde_json::from_str(&out).unwrap();
        assert!(parsed.get("error").is_some());
    }

    #[test]
    fn tool_definitions_cover_all_implemented_tools() {
        let defs = tool_definitions();
        let names: Vec<&str> = defs.iter().map(|d| d.name.as_str()).collect();
        for expected in ["exec", "read_file", "write_file", "list_dir"] {
            assert!(names.contains(&expected), "missing tool definition: {expected}");
        }
    }
}
