//! Shared application state: every long-lived service the CLI commands
//! (`serve`, `run`, `chat`, `doctor`, `sessions`, `cron`) drive.
//!
//! Grounded on the teacher's `AppState` (one struct holding every
//! subsystem, cloned cheaply via `Arc` fields, built once in
//! `bootstrap::build_app_state`), trimmed to the services this core
//! actually has: no memory/skills/MCP/process-manager/node-registry, since
//! those were external collaborators out of scope per spec §1.

use std::sync::Arc;

use sa_domain::config::Config;
use sa_providers::ProviderChain;
use sa_sessions::SessionStore;
use sa_tools::ToolExecutor;

use crate::agent_manager::AgentManager;
use crate::chat_platform::ChatPlatform;
use crate::compact::Compactor;
use crate::orchestrator::Orchestrator;
use crate::router::Router;
use crate::scheduler::{CronStore, Scheduler};
use crate::session_lock::SessionLockMap;

/// Everything a CLI command needs to drive the gateway: config, the
/// durable stores, the provider chain, and the three long-running
/// services (orchestrator, sub-agent manager, scheduler).
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub sessions: Arc<SessionStore>,
    pub cron: Arc<CronStore>,
    pub chain: Arc<ProviderChain>,
    pub router: Arc<Router>,
    pub compactor: Arc<Compactor>,
    pub tools: Arc<dyn ToolExecutor>,
    pub session_locks: Arc<SessionLockMap>,
    pub platform: Arc<dyn ChatPlatform>,
    pub orchestrator: Arc<Orchestrator>,
    pub agent_manager: Arc<AgentManager>,
    pub scheduler: Arc<Scheduler>,
}
