//! Shell exec tool — run one command to completion with a hard timeout and
//! an output size cap (spec §5 "Timeouts": tool execution has a per-call
//! timeout, default 30s; §6 `agent.exec_max_output`).
//!
//! This is a reference implementation of the tool executor capability
//! (§6): the core only depends on [`crate::executor::ToolExecutor::execute`]
//! returning a string, never on exec semantics specifically.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

#[derive(Debug, Clone, Deserialize)]
pub struct ExecRequest {
    pub command: String,
    #[serde(default)]
    pub workdir: Option<String>,
    #[serde(default)]
    pub stdin: Option<String>,
}

/// Environment variables a sandboxed command must never be allowed to
/// override — doing so could redirect dynamic linking or escape the
/// intended interpreter.
fn is_dangerous_env_var(name: &str) -> bool {
    const BLOCKED: &[&str] = &[
        "LD_PRELOAD", "LD_LIBRARY_PATH", "LD_AUDIT",
        "DYLD_INSERT_LIBRARIES", "DYLD_LIBRARY_PATH", "DYLD_FRAMEWORK_PATH",
        "PATH", "HOME", "SHELL",
    ];
    BLOCKED.contains(&name.to_ascii_uppercase().as_str())
}

/// Run `req.command` under `sh -c`, relative to `workspace_root` joined
/// with `req.workdir` (if given). Kills the process and returns an error
/// string if it doesn't finish within `timeout`. Truncates combined
/// stdout+stderr to `max_output` bytes.
pub async fn exec(
    workspace_root: &Path,
    req: ExecRequest,
    timeout: Duration,
    max_output: usize,
) -> Result<String, String> {
    let cwd = match &req.workdir {
        Some(wd) if !wd.is_empty() => {
            let candidate = workspace_root.join(wd);
            if !candidate.starts_with(workspace_root) {
                return Err(format!("workdir '{wd}' escapes workspace root"));
            }
            candidate
        }
        _ => workspace_root.to_path_buf(),
    };

    let mut cmd = Command::new("sh");
    cmd.arg("-c")
        .arg(&req.command)
        .current_dir(&cwd)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    for (k, _) in std::env::vars() {
        if is_dangerous_env_var(&k) {
            cmd.env_remove(&k);
        }
    }

    let mut child = cmd.spawn().map_err(|e| format!("failed to spawn: {e}"))?;

    if let Some(stdin_data) = &req.stdin {
        if let Some(mut stdin) = child.stdin.take() {
            let _ = stdin.write_all(stdin_data.as_bytes()).await;
        }
    }
    drop(child.stdin.take());

    let wait = async {
        let output = child.wait_with_output().await.map_err(|e| e.to_string())?;
        Ok::<_, String>(output)
    };

    let output = match tokio::time::timeout(timeout, wait).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => return Err(format!("exec failed: {e}")),
        Err(_) => {
            return Err(format!(
                "command timed out after {}s",
                timeout.as_secs()
            ))
        }
    };

    let mut combined = Vec::new();
    combined.extend_from_slice(&output.stdout);
    combined.extend_from_slice(&output.stderr);
    let mut text = String::from_utf8_lossy(&combined).into_owned();
    let truncated = text.len() > max_output;
    if truncated {
        text.truncate(max_output);
        text.push_str("\n[output truncated]");
    }

    Ok(format!(
        "exit_code={}\n{}",
        output.status.code().unwrap_or(-1),
        text
    ))
}
