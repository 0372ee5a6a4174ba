//! `serialagent chat` — interactive REPL command.
//!
//! Opens a readline-based loop that sends each line to the agent and
//! prints the response back. Supports slash-commands for session
//! management, model switching, and other REPL conveniences.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use sa_domain::config::Config;

use crate::bootstrap;
use crate::chat_platform::{ChatPlatform, MessageRef, StdoutChatPlatform};
use crate::state::AppState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Public entry point
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Run the interactive chat REPL.
///
/// Boots the full runtime, including background tasks (the scheduler tick
/// loop and periodic sweeps, since chat is long-lived like `serve`), then
/// enters a readline loop that accepts user input and prints agent
/// responses to stdout via [`StdoutChatPlatform`].
pub async fn chat(
    config: Arc<Config>,
    mut session_key: String,
    mut model: Option<String>,
) -> anyhow::Result<()> {
    let platform: Arc<dyn ChatPlatform> = Arc::new(StdoutChatPlatform::new(0));
    let state = bootstrap::build_app_state(config, platform).await?;

    let cancel = CancellationToken::new();
    bootstrap::spawn_background_tasks(&state, cancel.clone());

    // Initialize rustyline editor with persistent history.
    let history_path = dirs::home_dir()
        .unwrap_or_default()
        .join(".serialagent")
        .join("chat_history.txt");
    if let Some(parent) = history_path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    let mut rl = rustyline::DefaultEditor::new()?;
    let _ = rl.load_history(&history_path);

    eprintln!("SerialAgent interactive chat");
    eprintln!("Session: {session_key}  |  Type /help for commands, Ctrl+D to exit");
    eprintln!();

    loop {
        let readline = rl.readline("you> ");

        match readline {
            Ok(line) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }

                rl.add_history_entry(&line).ok();

                // ── Slash commands ────────────────────────────────
                if trimmed.starts_with('/') {
                    if handle_slash_command(trimmed, &mut session_key, &mut model) {
                        break;
                    }
                    continue;
                }

                // ── User message → agent turn ────────────────────
                send_message(&state, &session_key, trimmed).await;
            }
            Err(rustyline::error::ReadlineError::Interrupted) => {
                eprintln!("(Use Ctrl+D or /exit to quit)");
                continue;
            }
            Err(rustyline::error::ReadlineError::Eof) => {
                break;
            }
            Err(e) => {
                eprintln!("\x1B[31mreadline error: {e}\x1B[0m");
                break;
            }
        }
    }

    rl.save_history(&history_path).ok();
    cancel.cancel();

    eprintln!("Goodbye!");
    Ok(())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Slash command handling
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Process a slash command. Returns `true` if the REPL should exit.
///
/// `/model` only affects future `/session` keys' persona resolution if
/// the persona itself has no `model` override (§4.2 precedence); it does
/// not bypass routing.
fn handle_slash_command(input: &str, session_key: &mut String, model: &mut Option<String>) -> bool {
    let parts: Vec<&str> = input.splitn(2, ' ').collect();
    let cmd = parts[0];
    let arg = parts.get(1).map(|s| s.trim());

    match cmd {
        "/exit" | "/quit" => return true,

        "/session" => {
            if let Some(name) = arg.filter(|s| !s.is_empty()) {
                *session_key = name.to_string();
                eprintln!("Session switched to: {session_key}");
            } else {
                eprintln!("Current session: {session_key}");
                eprintln!("Usage: /session <name>");
            }
        }

        "/model" => {
            if let Some(name) = arg.filter(|s| !s.is_empty()) {
                *model = Some(name.to_string());
                eprintln!("Model set to: {name}");
            } else {
                let current = model.as_deref().unwrap_or("(default)");
                eprintln!("Current model: {current}");
                eprintln!("Usage: /model <name>");
            }
        }

        "/clear" => {
            eprint!("\x1B[2J\x1B[1;1H");
        }

        "/reset" => {
            let ts = chrono::Utc::now().timestamp();
            *session_key = format!("{session_key}:{ts}");
            eprintln!("Session reset. New session key: {session_key}");
        }

        "/help" => {
            eprintln!("Commands:");
            eprintln!("  /session <name>  Switch to a named session");
            eprintln!("  /model <name>    Set the model (e.g. openai/gpt-4o)");
            eprintln!("  /clear           Clear the screen");
            eprintln!("  /reset           Start a fresh session (new key)");
            eprintln!("  /exit, /quit     Exit the chat");
            eprintln!("  /help            Show this help");
        }

        other => {
            eprintln!("Unknown command: {other}  (type /help for a list)");
        }
    }

    false
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Message sending
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Drive one orchestrator turn for `user_message` and print the reply.
async fn send_message(state: &AppState, session_key: &str, user_message: &str) {
    let reply_to = MessageRef {
        channel_id: session_key.to_string(),
        message_id: "cli-chat".into(),
    };
    state
        .orchestrator
        .handle_inbound(session_key, reply_to, user_message)
        .await;
    println!();
}
