//! Bounded-concurrency, cancellable, isolated sub-agent runs (spec §4.7).
//!
//! Grounded on the teacher's `runtime/agent.rs` (spawn an isolated turn,
//! drain it for a final result, hand the outcome back to the caller) and
//! `runtime/cancel.rs` (per-run cancellation token), rewritten around a
//! `Semaphore`-bounded pool of ephemeral `SubAgent`s (never touching
//! `SessionStore`, per §4.7 "Isolation") instead of the teacher's
//! named-config agent registry.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use sa_domain::error::Result;
use sa_domain::trace::TraceEvent;

pub const DEFAULT_MAX_CONCURRENT: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubAgentStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Timeout,
    Cancelled,
}

/// A runnable isolated conversation: system prompt + a single user task,
/// sharing the process-wide tool executor and provider chain but with no
/// SessionStore involvement (§4.7 "Isolation").
#[async_trait]
pub trait IsolatedTurnRunner: Send + Sync {
    async fn run(&self, task: &str, model: Option<&str>) -> Result<String>;
}

/// Delivers a sub-agent's outcome to its target chat location, best-effort
/// (§4.7 "invoke the delivery capability").
#[async_trait]
pub trait DeliveryCapability: Send + Sync {
    async fn deliver(&self, target_location: &str, text: &str);
}

#[derive(Debug, Clone)]
pub struct SubAgentView {
    pub id: String,
    pub task: String,
    pub target_location: String,
    pub model: Option<String>,
    pub timeout: Duration,
    pub status: SubAgentStatus,
    pub result: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub label: Option<String>,
}

struct SubAgentState {
    view: SubAgentView,
    cancel: CancellationToken,
}

pub struct AgentManager {
    semaphore: Arc<Semaphore>,
    agents: Mutex<HashMap<String, Arc<Mutex<SubAgentState>>>>,
    turn_runner: Arc<dyn IsolatedTurnRunner>,
    delivery: Arc<dyn DeliveryCapability>,
}

impl AgentManager {
    pub fn new(
        max_concurrent: usize,
        turn_runner: Arc<dyn IsolatedTurnRunner>,
        delivery: Arc<dyn DeliveryCapability>,
    ) -> Arc<Self> {
        Arc::new(Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent.max(1))),
            agents: Mutex::new(HashMap::new()),
            turn_runner,
            delivery,
        })
    }

    /// Spawns the agent task and returns its id immediately. The status is
    /// `pending` until the bounded pool admits it (§5: "status must reflect
    /// pending before acquiring the semaphore").
    pub fn spawn(
        self: &Arc<Self>,
        task: String,
        target_location: String,
        model: Option<String>,
        timeout: Duration,
        label: Option<String>,
    ) -> String {
        let id = Uuid::new_v4().to_string();
        let view = SubAgentView {
            id: id.clone(),
            task: task.clone(),
            target_location: target_location.clone(),
            model: model.clone(),
            timeout,
            status: SubAgentStatus::Pending,
            result: None,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            label,
        };
        let cancel = CancellationToken::new();
        let entry = Arc::new(Mutex::new(SubAgentState { view, cancel: cancel.clone() }));
        self.agents.lock().insert(id.clone(), entry.clone());

        TraceEvent::SubAgentSpawned {
            parent_session_id: target_location.clone(),
            subagent_id: id.clone(),
            task: task.clone(),
        }
        .emit();

        let manager = self.clone();
        let run_id = id.clone();
        tokio::spawn(async move {
            manager.drive(run_id, entry, task, target_location, model, timeout, cancel).await;
        });

        id
    }

    async fn drive(
        self: Arc<Self>,
        id: String,
        entry: Arc<Mutex<SubAgentState>>,
        task: String,
        target_location: String,
        model: Option<String>,
        timeout: Duration,
        cancel: CancellationToken,
    ) {
        let permit = tokio::select! {
            _ = cancel.cancelled() => {
                Self::finish(&entry, SubAgentStatus::Cancelled, None, None);
                return;
            }
            permit = self.semaphore.clone().acquire_owned() => permit.ok(),
        };
        let Some(_permit) = permit else { return };

        {
            let mut state = entry.lock();
            state.view.status = SubAgentStatus::Running;
            state.view.started_at = Some(Utc::now());
        }

        let started = std::time::Instant::now();
        let run_fut = self.turn_runner.run(&task, model.as_deref());
        let outcome = tokio::select! {
            _ = cancel.cancelled() => None,
            res = tokio::time::timeout(timeout, run_fut) => Some(res),
        };

        let (status, result, error) = match outcome {
            None => (SubAgentStatus::Cancelled, None, None),
            Some(Err(_elapsed)) => (
                SubAgentStatus::Timeout,
                None,
                Some(format!("sub-agent timed out after {}s", timeout.as_secs())),
            ),
            Some(Ok(Err(e))) => (SubAgentStatus::Failed, None, Some(e.to_string())),
            Some(Ok(Ok(text))) => (SubAgentStatus::Completed, Some(text), None),
        };

        Self::finish(&entry, status, result.clone(), error.clone());
        TraceEvent::SubAgentFinished {
            subagent_id: id.clone(),
            duration_ms: started.elapsed().as_millis() as u64,
            ok: status == SubAgentStatus::Completed,
        }
        .emit();
        // §5 "Cancellation": cancelled sub-agents never deliver an output.
        if status != SubAgentStatus::Cancelled {
            self.deliver_outcome(&target_location, &id, status, result, error).await;
        }
    }

    fn finish(
        entry: &Arc<Mutex<SubAgentState>>,
        status: SubAgentStatus,
        result: Option<String>,
        error: Option<String>,
    ) {
        let mut state = entry.lock();
        state.view.status = status;
        state.view.result = result;
        state.view.error = error;
        state.view.finished_at = Some(Utc::now());
    }

    async fn deliver_outcome(
        &self,
        target_location: &str,
        id: &str,
        status: SubAgentStatus,
        result: Option<String>,
        error: Option<String>,
    ) {
        let text = match status {
            SubAgentStatus::Completed => {
                format!("[sub-agent {id}] {}", result.unwrap_or_default())
            }
            SubAgentStatus::Timeout => format!("[sub-agent {id}] timed out"),
            SubAgentStatus::Failed => {
                format!("[sub-agent {id}] failed: {}", error.unwrap_or_default())
            }
            SubAgentStatus::Pending | SubAgentStatus::Running | SubAgentStatus::Cancelled => return,
        };
        self.delivery.deliver(target_location, &text).await;
    }

    pub fn get(&self, id: &str) -> Option<SubAgentView> {
        self.agents.lock().get(id).map(|e| e.lock().view.clone())
    }

    pub fn list(&self, target_location: Option<&str>) -> Vec<SubAgentView> {
        self.agents
            .lock()
            .values()
            .map(|e| e.lock().view.clone())
            .filter(|v| target_location.is_none_or(|loc| v.target_location == loc))
            .collect()
    }

    pub fn active_count(&self) -> usize {
        self.agents
            .lock()
            .values()
            .filter(|e| {
                matches!(
                    e.lock().view.status,
                    SubAgentStatus::Pending | SubAgentStatus::Running
                )
            })
            .count()
    }

    /// Cancels a running or pending agent. Returns `false` if unknown or
    /// already terminal.
    pub fn cancel(&self, id: &str) -> bool {
        let Some(entry) = self.agents.lock().get(id).cloned() else {
            return false;
        };
        let state = entry.lock();
        if matches!(
            state.view.status,
            SubAgentStatus::Pending | SubAgentStatus::Running
        ) {
            state.cancel.cancel();
            true
        } else {
            false
        }
    }

    pub fn cancel_all(&self) {
        for entry in self.agents.lock().values() {
            entry.lock().cancel.cancel();
        }
    }

    /// Drops terminal agents whose `finished_at` is older than `max_age`.
    pub fn cleanup(&self, max_age: Duration) {
        let cutoff = Utc::now() - chrono::Duration::from_std(max_age).unwrap_or_default();
        self.agents.lock().retain(|_, entry| {
            let state = entry.lock();
            match state.view.finished_at {
                Some(finished) => finished > cutoff,
                None => true,
            }
        });
    }
}

impl Clone for AgentManager {
    fn clone(&self) -> Self {
        Self {
            semaphore: self.semaphore.clone(),
            agents: Mutex::new(self.agents.lock().clone()),
            turn_runner: self.turn_runner.clone(),
            delivery: self.delivery.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::sleep;

    struct EchoRunner {
        delay: Duration,
        fail: bool,
    }

    #[async_trait]
    impl IsolatedTurnRunner for EchoRunner {
        async fn run(&self, task: &str, _model: Option<&str>) -> Result<String> {
            if self.delay > Duration::ZERO {
                sleep(self.delay).await;
            }
            if self.fail {
                Err(sa_domain::error::Error::Other("runner failed".into()))
            } else {
                Ok(format!("echo: {task}"))
            }
        }
    }

    struct CountingDelivery {
        count: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl DeliveryCapability for CountingDelivery {
        async fn deliver(&self, _target_location: &str, _text: &str) {
            self.count.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn spawn_completes_and_delivers() {
        let delivered = Arc::new(AtomicUsize::new(0));
        let manager = AgentManager::new(
            5,
            Arc::new(EchoRunner { delay: Duration::ZERO, fail: false }),
            Arc::new(CountingDelivery { count: delivered.clone() }),
        );
        let id = manager.spawn(
            "do thing".into(),
            "loc-1".into(),
            None,
            Duration::from_secs(5),
            None,
        );

        for _ in 0..50 {
            if manager.get(&id).unwrap().status == SubAgentStatus::Completed {
                break;
            }
            sleep(Duration::from_millis(10)).await;
        }

        let view = manager.get(&id).unwrap();
        assert_eq!(view.status, SubAgentStatus::Completed);
        assert_eq!(view.result.as_deref(), Some("echo: do thing"));
        assert_eq!(delivered.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn spawn_records_failure() {
        let manager = AgentManager::new(
            5,
            Arc::new(EchoRunner { delay: Duration::ZERO, fail: true }),
            Arc::new(CountingDelivery { count: Arc::new(AtomicUsize::new(0)) }),
        );
        let id = manager.spawn("x".into(), "loc-1".into(), None, Duration::from_secs(5), None);

        for _ in 0..50 {
            if manager.get(&id).unwrap().status == SubAgentStatus::Failed {
                break;
            }
            sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(manager.get(&id).unwrap().status, SubAgentStatus::Failed);
    }

    #[tokio::test]
    async fn timeout_is_recorded() {
        let manager = AgentManager::new(
            5,
            Arc::new(EchoRunner { delay: Duration::from_millis(200), fail: false }),
            Arc::new(CountingDelivery { count: Arc::new(AtomicUsize::new(0)) }),
        );
        let id = manager.spawn(
            "x".into(),
            "loc-1".into(),
            None,
            Duration::from_millis(20),
            None,
        );

        for _ in 0..50 {
            let status = manager.get(&id).unwrap().status;
            if status == SubAgentStatus::Timeout {
                break;
            }
            sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(manager.get(&id).unwrap().status, SubAgentStatus::Timeout);
    }

    #[tokio::test]
    async fn cancel_marks_cancelled_without_delivering_output() {
        let delivered = Arc::new(AtomicUsize::new(0));
        let manager = AgentManager::new(
            5,
            Arc::new(EchoRunner { delay: Duration::from_secs(5), fail: false }),
            Arc::new(CountingDelivery { count: delivered.clone() }),
        );
        let id = manager.spawn(
            "x".into(),
            "loc-1".into(),
            None,
            Duration::from_secs(30),
            None,
        );
        sleep(Duration::from_millis(20)).await;
        assert!(manager.cancel(&id));

        for _ in 0..50 {
            if manager.get(&id).unwrap().status == SubAgentStatus::Cancelled {
                break;
            }
            sleep(Duration::from_millis(10)).await;
        }
        let view = manager.get(&id).unwrap();
        assert_eq!(view.status, SubAgentStatus::Cancelled);
        assert!(view.result.is_none());
        sleep(Duration::from_millis(20)).await;
        assert_eq!(delivered.load(Ordering::SeqCst), 0, "cancelled sub-agents must not deliver an output");
    }

    #[tokio::test]
    async fn active_count_excludes_terminal_agents() {
        let manager = AgentManager::new(
            5,
            Arc::new(EchoRunner { delay: Duration::ZERO, fail: false }),
            Arc::new(CountingDelivery { count: Arc::new(AtomicUsize::new(0)) }),
        );
        let id = manager.spawn("x".into(), "loc-1".into(), None, Duration::from_secs(5), None);
        for _ in 0..50 {
            if manager.get(&id).unwrap().status == SubAgentStatus::Completed {
                break;
            }
            sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(manager.active_count(), 0);
    }
}
