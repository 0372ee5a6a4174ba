//! `serialagent run` — one-shot execution command.
//!
//! Sends a single message to the agent and prints the response to stdout,
//! then exits. Useful for scripting, piping, and quick CLI interactions.

use std::sync::Arc;

use sa_domain::config::Config;

use crate::bootstrap;
use crate::chat_platform::{ChatPlatform, MessageRef, MockChatPlatform, StdoutChatPlatform};

/// Execute a single agent turn and print the response.
///
/// This is the entry point for `serialagent run "message"`. `model` is
/// currently advisory only: persona-level model overrides (§4.2 routing)
/// take precedence, matching how the orchestrator resolves models for any
/// other inbound turn.
///
/// In plain mode the reply is printed as it's delivered, via
/// [`StdoutChatPlatform`]. In `--json` mode the delivery is captured
/// silently (via [`MockChatPlatform`]) and emitted as one JSON object at
/// the end, so stdout carries nothing but the JSON document.
pub async fn run(
    config: Arc<Config>,
    message: String,
    session_key: String,
    _model: Option<String>,
    json_output: bool,
) -> anyhow::Result<()> {
    let capture = Arc::new(MockChatPlatform::new(0));
    let platform: Arc<dyn ChatPlatform> = if json_output {
        capture.clone()
    } else {
        Arc::new(StdoutChatPlatform::new(0))
    };
    let state = bootstrap::build_app_state(config, platform).await?;

    let reply_to = MessageRef {
        channel_id: session_key.clone(),
        message_id: "cli-run".into(),
    };

    state
        .orchestrator
        .handle_inbound(&session_key, reply_to, &message)
        .await;

    if json_output {
        let response = capture.all_sent().join("");
        let json = serde_json::to_string_pretty(&serde_json::json!({
            "session": session_key,
            "response": response,
        }))?;
        println!("{json}");
    }

    Ok(())
}
