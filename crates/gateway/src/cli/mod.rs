pub mod chat;
pub mod config;
pub mod cron;
pub mod doctor;
pub mod health;
pub mod init;
pub mod logs;
pub mod pid;
pub mod run;
pub mod sessions;
pub mod systemd;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};

/// SerialAgent — an agentic AI gateway.
#[derive(Debug, Parser)]
#[command(name = "serialagent", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the gateway server (default when no subcommand is given).
    Serve {
        /// Fork a detached background copy of this process and exit
        /// immediately; stdout/stderr go to `daemon.log_file`.
        #[arg(long)]
        detach: bool,
    },
    /// Send SIGTERM to a running detached instance (PID file `daemon.pid_file`).
    Stop,
    /// Stop then start a detached instance.
    Restart,
    /// Report whether a detached instance is running.
    Status,
    /// Run diagnostic checks against the current configuration.
    Doctor,
    /// Report process liveness and store reachability (fast, no network calls).
    Health,
    /// Print the tail of the detached instance's log file.
    Logs {
        /// Number of trailing lines to print.
        #[arg(long, default_value = "50")]
        lines: usize,
        /// Keep printing new lines as they are appended.
        #[arg(long)]
        follow: bool,
    },
    /// Configuration utilities.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Initialize a new SerialAgent project in the current directory.
    Init {
        /// Skip interactive prompts and use sensible defaults (OpenAI provider).
        #[arg(long)]
        defaults: bool,
    },
    /// Send a single message to the agent and print the response.
    Run {
        /// The message to send.
        message: String,
        /// Session key (defaults to "cli:run").
        #[arg(long, default_value = "cli:run")]
        session: String,
        /// Model override (currently advisory; persona routing wins).
        #[arg(long)]
        model: Option<String>,
        /// Output the full response as JSON instead of plain text.
        #[arg(long)]
        json: bool,
    },
    /// Open an interactive chat REPL.
    Chat {
        /// Session key (defaults to "cli:chat").
        #[arg(long, default_value = "cli:chat")]
        session: String,
        /// Model override (currently advisory; persona routing wins).
        #[arg(long)]
        model: Option<String>,
    },
    /// Print version information.
    Version,
    /// Systemd service management.
    #[command(subcommand)]
    Systemd(SystemdCommand),
    /// Inspect and manage durable conversation sessions.
    #[command(subcommand)]
    Sessions(SessionsCommand),
    /// Manage scheduled (cron) jobs.
    #[command(subcommand)]
    Cron(CronCommand),
}

#[derive(Debug, Subcommand)]
pub enum SystemdCommand {
    /// Generate a systemd unit file and print it to stdout.
    Generate {
        /// Linux user to run the service as.
        #[arg(long, default_value = "serialagent")]
        user: String,
        /// Working directory for the service.
        #[arg(long)]
        working_dir: Option<String>,
        /// Path to the config file.
        #[arg(long, default_value = "config.toml")]
        config: String,
    },
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Parse the config file and report any errors.
    Validate,
    /// Dump the resolved configuration (with defaults) as TOML.
    Show,
    /// Store an API key in the OS keychain for a provider.
    SetSecret {
        /// Provider id from `models.proxy.id` or `models.fallback_providers[].id`.
        provider_id: String,
    },
    /// Resolve and display (masked) the API key currently configured for a provider.
    GetSecret {
        /// Provider id from `models.proxy.id` or `models.fallback_providers[].id`.
        provider_id: String,
    },
}

#[derive(Debug, Subcommand)]
pub enum SessionsCommand {
    /// List every known session.
    List,
    /// Print a session's message history.
    View {
        /// Session location key.
        location: String,
        /// Include messages already folded into a compaction summary.
        #[arg(long)]
        include_compacted: bool,
    },
    /// Compact a session's active history without deleting the record.
    Clear {
        /// Session location key.
        location: String,
    },
    /// Delete a session and all its messages outright.
    Delete {
        /// Session location key.
        location: String,
    },
}

#[derive(Debug, Subcommand)]
pub enum CronCommand {
    /// List every cron job.
    List,
    /// Create a new cron job.
    Add {
        /// Human-readable job name.
        name: String,
        /// `at:<unix_epoch_s>`, `every:<milliseconds>`, or a 5-field cron expression.
        schedule: String,
        /// The payload text (a system event message, or an agent task prompt).
        payload: String,
        /// Target location for the payload (required for `system_event`).
        #[arg(long)]
        location: Option<String>,
        /// Run the payload as an isolated agent turn rather than a system event.
        #[arg(long)]
        agent_turn: bool,
        /// Timeout in seconds before the run is recorded as timed out.
        #[arg(long, default_value = "120")]
        timeout_s: i64,
    },
    /// Delete a cron job by id.
    Remove {
        /// Job id.
        id: i64,
    },
    /// Show recent run history for a job.
    Runs {
        /// Job id.
        id: i64,
        /// Maximum number of runs to show.
        #[arg(long, default_value = "20")]
        limit: i64,
    },
}

// ── Config loading helper ─────────────────────────────────────────────

/// Load the configuration from the path specified by `SA_CONFIG` (or
/// `config.toml` by default).  Returns the parsed [`Config`] and the
/// path that was used.
///
/// This is shared by every subcommand that needs a `Config`, so the
/// logic lives in one place.
pub fn load_config() -> anyhow::Result<(sa_domain::config::Config, String)> {
    let config_path = std::env::var("SA_CONFIG").unwrap_or_else(|_| "config.toml".into());

    let config = if std::path::Path::new(&config_path).exists() {
        let raw = std::fs::read_to_string(&config_path)
            .map_err(|e| anyhow::anyhow!("reading {config_path}: {e}"))?;
        toml::from_str(&raw).map_err(|e| anyhow::anyhow!("parsing {config_path}: {e}"))?
    } else {
        sa_domain::config::Config::default()
    };

    Ok((config, config_path))
}

/// Resolve a `daemon.*` path relative to the config file's directory, unless
/// it's already absolute. Shared by `main.rs`'s lifecycle commands and the
/// `health`/`logs` subcommands.
pub fn resolve_daemon_path(config_path: &str, relative: &str) -> PathBuf {
    let candidate = Path::new(relative);
    if candidate.is_absolute() {
        return candidate.to_path_buf();
    }
    Path::new(config_path)
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(candidate)
}
