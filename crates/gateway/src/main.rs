use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use sa_domain::config::Config;
use sa_gateway::chat_platform::{ChatPlatform, StdoutChatPlatform};
use sa_gateway::cli::{pid, resolve_daemon_path, Cli, Command, ConfigCommand, CronCommand, SessionsCommand, SystemdCommand};
use sa_gateway::{bootstrap, scheduler};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        // Default to serve when no subcommand is given.
        None => {
            let (config, config_path) = sa_gateway::cli::load_config()?;
            init_tracing(&config);
            run_foreground(Arc::new(config), &config_path).await
        }
        Some(Command::Serve { detach }) => {
            let (config, config_path) = sa_gateway::cli::load_config()?;
            if detach {
                start_detached(&config, &config_path)
            } else {
                init_tracing(&config);
                run_foreground(Arc::new(config), &config_path).await
            }
        }
        Some(Command::Stop) => {
            let (config, config_path) = sa_gateway::cli::load_config()?;
            stop(&config, &config_path)
        }
        Some(Command::Restart) => {
            let (config, config_path) = sa_gateway::cli::load_config()?;
            let _ = stop(&config, &config_path);
            start_detached(&config, &config_path)
        }
        Some(Command::Status) => {
            let (config, config_path) = sa_gateway::cli::load_config()?;
            status(&config, &config_path)
        }
        Some(Command::Doctor) => {
            let (config, config_path) = sa_gateway::cli::load_config()?;
            let passed = sa_gateway::cli::doctor::run(&config, &config_path).await?;
            if !passed {
                std::process::exit(1);
            }
            Ok(())
        }
        Some(Command::Health) => {
            let (config, config_path) = sa_gateway::cli::load_config()?;
            let healthy = sa_gateway::cli::health::run(&config, &config_path)?;
            if !healthy {
                std::process::exit(1);
            }
            Ok(())
        }
        Some(Command::Logs { lines, follow }) => {
            let (config, config_path) = sa_gateway::cli::load_config()?;
            let log_path = resolve_daemon_path(&config_path, &config.daemon.log_file);
            sa_gateway::cli::logs::run(&log_path, lines, follow)
        }
        Some(Command::Config(ConfigCommand::Validate)) => {
            let (config, config_path) = sa_gateway::cli::load_config()?;
            let valid = sa_gateway::cli::config::validate(&config, &config_path);
            if !valid {
                std::process::exit(1);
            }
            Ok(())
        }
        Some(Command::Config(ConfigCommand::Show)) => {
            let (config, _config_path) = sa_gateway::cli::load_config()?;
            sa_gateway::cli::config::show(&config);
            Ok(())
        }
        Some(Command::Config(ConfigCommand::SetSecret { provider_id })) => {
            let (config, _config_path) = sa_gateway::cli::load_config()?;
            sa_gateway::cli::config::set_secret(&config, &provider_id)
        }
        Some(Command::Config(ConfigCommand::GetSecret { provider_id })) => {
            let (config, _config_path) = sa_gateway::cli::load_config()?;
            sa_gateway::cli::config::get_secret(&config, &provider_id)
        }
        Some(Command::Init { defaults }) => sa_gateway::cli::init::init(defaults),
        Some(Command::Run { message, session, model, json }) => {
            let (config, _config_path) = sa_gateway::cli::load_config()?;
            init_tracing(&config);
            sa_gateway::cli::run::run(Arc::new(config), message, session, model, json).await
        }
        Some(Command::Chat { session, model }) => {
            let (config, _config_path) = sa_gateway::cli::load_config()?;
            init_tracing(&config);
            sa_gateway::cli::chat::chat(Arc::new(config), session, model).await
        }
        Some(Command::Version) => {
            println!("serialagent {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Some(Command::Systemd(SystemdCommand::Generate { user, working_dir, config })) => {
            sa_gateway::cli::systemd::generate(&user, working_dir.as_deref(), &config);
            Ok(())
        }
        Some(Command::Sessions(cmd)) => {
            let (config, _config_path) = sa_gateway::cli::load_config()?;
            let store = sa_sessions::SessionStore::open(Path::new(&config.sessions.db_path))?;
            match cmd {
                SessionsCommand::List => sa_gateway::cli::sessions::list(&store),
                SessionsCommand::View { location, include_compacted } => {
                    sa_gateway::cli::sessions::view(&store, &location, include_compacted)
                }
                SessionsCommand::Clear { location } => sa_gateway::cli::sessions::clear(&store, &location),
                SessionsCommand::Delete { location } => sa_gateway::cli::sessions::delete(&store, &location),
            }
        }
        Some(Command::Cron(cmd)) => {
            let (config, _config_path) = sa_gateway::cli::load_config()?;
            let store = scheduler::CronStore::open(&config.sessions.cron_db_path)?;
            match cmd {
                CronCommand::List => sa_gateway::cli::cron::list(&store),
                CronCommand::Add { name, schedule, payload, location, agent_turn, timeout_s } => {
                    sa_gateway::cli::cron::add(&store, name, schedule, payload, location, agent_turn, timeout_s)
                }
                CronCommand::Remove { id } => sa_gateway::cli::cron::remove(&store, id),
                CronCommand::Runs { id, limit } => sa_gateway::cli::cron::runs(&store, id, limit),
            }
        }
    }
}

/// Initialize tracing per `logging.{level,json}` (spec §6 ambient logging).
fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},sa_gateway=debug", config.logging.level)));

    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    if config.logging.json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

/// Run the gateway in the foreground: acquire the PID-file lock, boot the
/// full `AppState`, spawn background tasks, and block until SIGINT/SIGTERM.
async fn run_foreground(config: Arc<Config>, config_path: &str) -> anyhow::Result<()> {
    tracing::info!("SerialAgent starting");

    let pid_path = resolve_daemon_path(config_path, &config.daemon.pid_file);
    let pid_handle = pid::write_pid_file(&pid_path)?;

    let platform: Arc<dyn ChatPlatform> = Arc::new(StdoutChatPlatform::new(0));
    let state = bootstrap::build_app_state(config, platform).await?;

    let cancel = CancellationToken::new();
    bootstrap::spawn_background_tasks(&state, cancel.clone());

    wait_for_shutdown_signal().await;
    tracing::info!("shutdown signal received, stopping");
    cancel.cancel();

    // Give spawned tasks a moment to observe the cancellation before exit.
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;

    pid::remove_pid_file(&pid_path, pid_handle);
    Ok(())
}

/// Waits for SIGINT (Ctrl+C) or, on Unix, SIGTERM.
async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

/// `serve --detach` / `restart`: spawn a detached foreground process and
/// return immediately, matching spec §6 "start --detach".
fn start_detached(config: &Config, config_path: &str) -> anyhow::Result<()> {
    let pid_path = resolve_daemon_path(config_path, &config.daemon.pid_file);
    if let Some(pid) = pid::probe(&pid_path) {
        anyhow::bail!("SerialAgent is already running (PID {pid})");
    }

    let log_path = resolve_daemon_path(config_path, &config.daemon.log_file);
    let pid = pid::spawn_detached(&["serve".to_string()], &log_path)?;
    println!("Started SerialAgent in the background (PID {pid}). Logs: {}", log_path.display());
    Ok(())
}

/// `serialagent stop`: SIGTERM a detached instance found via the PID file.
fn stop(config: &Config, config_path: &str) -> anyhow::Result<()> {
    let pid_path = resolve_daemon_path(config_path, &config.daemon.pid_file);
    match pid::probe(&pid_path) {
        Some(pid) => {
            pid::terminate(pid)?;
            println!("Sent SIGTERM to PID {pid}.");
            Ok(())
        }
        None => {
            println!("SerialAgent is not running.");
            Ok(())
        }
    }
}

/// `serialagent status`: report whether a detached instance is alive.
fn status(config: &Config, config_path: &str) -> anyhow::Result<()> {
    let pid_path = resolve_daemon_path(config_path, &config.daemon.pid_file);
    match pid::probe(&pid_path) {
        Some(pid) => println!("SerialAgent is running (PID {pid})."),
        None => println!("SerialAgent is not running."),
    }
    Ok(())
}
