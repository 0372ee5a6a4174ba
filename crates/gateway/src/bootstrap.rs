//! `AppState` construction and background-task spawning, shared by every
//! CLI command that drives the gateway (`serve`, `run`, `chat`).
//!
//! Grounded on the teacher's `bootstrap::build_app_state`/
//! `spawn_background_tasks` split: validate config, wire every subsystem in
//! dependency order, hand back a fully-built `AppState`; background tasks
//! (periodic sweeps, the scheduler tick loop) are spawned separately so
//! one-shot commands (`run`) can skip them.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio_util::sync::CancellationToken;

use sa_domain::config::{Config, ConfigSeverity};
use sa_providers::ProviderChain;
use sa_sessions::SessionStore;
use sa_tools::{tool_definitions, DefaultToolExecutor};

use crate::agent_manager::AgentManager;
use crate::chat_platform::ChatPlatform;
use crate::compact::Compactor;
use crate::orchestrator::{
    HttpReportBackSender, Orchestrator, OrchestratorDelivery, OrchestratorIsolatedRunner,
    OrchestratorScheduledExecutor,
};
use crate::router::Router;
use crate::scheduler::{CronStore, Scheduler};
use crate::session_lock::SessionLockMap;
use crate::state::AppState;

/// Validate config and wire every subsystem into a fully-built
/// [`AppState`]. Shared boot path for `serve`, `run`, and `chat` — the only
/// difference between them is whether [`spawn_background_tasks`] is called
/// afterward.
pub async fn build_app_state(
    config: Arc<Config>,
    platform: Arc<dyn ChatPlatform>,
) -> anyhow::Result<AppState> {
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues
                .iter()
                .filter(|i| i.severity == ConfigSeverity::Error)
                .count()
        );
    }

    // ── Durable stores ───────────────────────────────────────────────
    let sessions = Arc::new(
        SessionStore::open(std::path::Path::new(&config.sessions.db_path))
            .context("opening session store")?,
    );
    tracing::info!(path = %config.sessions.db_path, "session store ready");

    let cron = Arc::new(
        CronStore::open(&config.sessions.cron_db_path).context("opening cron store")?,
    );
    tracing::info!(path = %config.sessions.cron_db_path, "cron store ready");

    // ── Provider chain + router ──────────────────────────────────────
    let chain = Arc::new(ProviderChain::from_config(&config.models).context("building provider chain")?);
    let router = Arc::new(Router::new(&config, chain.clone()));
    tracing::info!(
        personas = config.router.personas.len(),
        "router ready"
    );

    // ── Compaction ────────────────────────────────────────────────────
    let compactor = Arc::new(Compactor::new(sessions.clone(), config.compaction.clone()));

    // ── Tool executor ─────────────────────────────────────────────────
    let tools: Arc<dyn sa_tools::ToolExecutor> = Arc::new(DefaultToolExecutor::new(
        config.agent.workspace.clone(),
        Duration::from_secs(config.agent.exec_timeout),
        config.agent.exec_max_output,
    ));
    let tool_defs = tool_definitions();

    // ── Global system prompt ──────────────────────────────────────────
    let global_system_prompt = read_global_system_prompt(&config).await;

    let session_locks = Arc::new(SessionLockMap::new());

    // ── Orchestrator ───────────────────────────────────────────────────
    let orchestrator = Orchestrator::new(
        sessions.clone(),
        compactor.clone(),
        router.clone(),
        tools.clone(),
        tool_defs,
        config.agent.clone(),
        config.models.clone(),
        global_system_prompt,
        session_locks.clone(),
        platform.clone(),
        Arc::new(HttpReportBackSender::default()),
    );

    // ── Sub-agent manager (§4.7) ────────────────────────────────────────
    let agent_manager = AgentManager::new(
        config.agent.max_subagents,
        Arc::new(OrchestratorIsolatedRunner(orchestrator.clone())),
        Arc::new(OrchestratorDelivery(orchestrator.clone())),
    );

    // ── Scheduler (§4.6) ─────────────────────────────────────────────
    let scheduler = Arc::new(
        Scheduler::new(
            cron.clone(),
            Arc::new(OrchestratorScheduledExecutor(orchestrator.clone())),
        )
        .with_tick_interval(Duration::from_secs(config.agent.scheduler_tick_s)),
    );

    Ok(AppState {
        config,
        sessions,
        cron,
        chain,
        router,
        compactor,
        tools,
        session_locks,
        platform,
        orchestrator,
        agent_manager,
        scheduler,
    })
}

/// Reads and concatenates `agent.system_prompt_files` relative to
/// `agent.workspace`, joined the same way [`Router::system_prompt_for`]
/// joins a persona's prompt files. Used as the fallback prompt when a
/// location has no persona (or the persona has no prompt files of its
/// own) and for every isolated sub-agent/scheduled turn.
async fn read_global_system_prompt(config: &Config) -> String {
    let mut sections = Vec::new();
    for file in &config.agent.system_prompt_files {
        let path = std::path::Path::new(&config.agent.workspace).join(file);
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => sections.push(content),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "system prompt file unreadable, skipping");
            }
        }
    }
    sections.join("\n\n---\n\n")
}

/// Spawn the long-running background tasks: the scheduler tick loop, and
/// periodic sweeps of the session-lock map and sub-agent manager. Callers
/// that only need a single turn (`run`) skip this entirely.
pub fn spawn_background_tasks(state: &AppState, cancel: CancellationToken) {
    {
        let scheduler = state.scheduler.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            scheduler.run(cancel).await;
        });
    }

    {
        let session_locks = state.session_locks.clone();
        let agent_manager = state.agent_manager.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(60));
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        tracing::info!("background sweep loop stopping");
                        return;
                    }
                    _ = interval.tick() => {
                        session_locks.prune_idle();
                        agent_manager.cleanup(Duration::from_secs(3600));
                    }
                }
            }
        });
    }

    tracing::info!("background tasks spawned");
}
