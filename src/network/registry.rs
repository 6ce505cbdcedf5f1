//! Session Registry
//!
//! The lobby's bookkeeping: creates named game instances, launches each
//! one's run loop onto a shared task set, answers discovery queries from
//! the bootstrap layer, and reaps instances whose run loops have returned.
//! Sessions share nothing with each other except the score store; the
//! registry only ever reads their public [`SessionInfo`] views.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, Mutex};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::network::session::{GameSession, SessionConfig, SessionError, SessionInfo};
use crate::store::ScoreStore;

/// Faults answering a registry request.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// The named instance is not tracked.
    #[error("no such instance: {0}")]
    NotFound(String),

    /// The instance could not be constructed.
    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Tracks every running game instance in the process.
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, Arc<SessionInfo>>>,
    tasks: Mutex<JoinSet<String>>,
    store: Arc<ScoreStore>,
    config: SessionConfig,
    shutdown_tx: broadcast::Sender<()>,
}

impl SessionRegistry {
    /// A registry whose sessions persist wins through `store`.
    pub fn new(store: Arc<ScoreStore>, config: SessionConfig) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            sessions: Mutex::new(HashMap::new()),
            tasks: Mutex::new(JoinSet::new()),
            store,
            config,
            shutdown_tx,
        }
    }

    /// Create and launch a new instance. Returns false when the name is
    /// already taken; the check and the insert happen under one lock, so
    /// two racing creates cannot both win the same name.
    pub async fn create_instance(&self, name: &str) -> Result<bool, RegistryError> {
        let session = {
            let mut sessions = self.sessions.lock().await;
            if sessions.contains_key(name) {
                info!("rejected duplicate instance name {name}");
                return Ok(false);
            }
            let session = GameSession::bind(
                name,
                self.store.clone(),
                self.config.clone(),
                self.shutdown_tx.subscribe(),
            )
            .await?;
            sessions.insert(name.to_string(), session.info());
            session
        };
        self.tasks.lock().await.spawn(session.run());
        info!("created game instance {name}");
        Ok(true)
    }

    /// Names of instances with at least one connected player. Order is
    /// incidental.
    pub async fn joinable_instances(&self) -> Vec<String> {
        let sessions = self.sessions.lock().await;
        let mut names = Vec::new();
        for (name, info) in sessions.iter() {
            if info.player_count().await > 0 {
                names.push(name.clone());
            }
        }
        names
    }

    /// The two join ports of a named instance.
    pub async fn join_ports(&self, name: &str) -> Result<(u16, u16), RegistryError> {
        self.sessions
            .lock()
            .await
            .get(name)
            .map(|info| info.ports())
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    /// Win totals for every player connected to any tracked instance;
    /// players the store has never seen resolve to 0.
    pub async fn aggregate_scores(&self) -> HashMap<String, i64> {
        let names = {
            let sessions = self.sessions.lock().await;
            let mut all = Vec::new();
            for info in sessions.values() {
                all.extend(info.player_names().await);
            }
            all
        };
        self.store.scores_for(&names).await
    }

    /// Release every instance whose run loop has returned. This is the
    /// only place a tracked session is removed.
    pub async fn reap_finished(&self) -> usize {
        let mut finished = Vec::new();
        {
            let mut tasks = self.tasks.lock().await;
            while let Some(result) = tasks.try_join_next() {
                match result {
                    Ok(name) => finished.push(name),
                    Err(e) => warn!("session task failed: {e}"),
                }
            }
        }
        let mut reaped = 0;
        if !finished.is_empty() {
            let mut sessions = self.sessions.lock().await;
            for name in finished {
                if sessions.remove(&name).is_some() {
                    info!("removed finished instance {name}");
                    reaped += 1;
                }
            }
        }
        reaped
    }

    /// Spawn the fixed-cadence reaper task. It logs and keeps its cadence
    /// no matter what individual polls report.
    pub fn spawn_reaper(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let registry = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                registry.reap_finished().await;
            }
        })
    }

    /// Signal every running session to stop at its next accept poll.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Number of tracked instances, finished-but-unreaped ones included.
    pub async fn instance_count(&self) -> usize {
        self.sessions.lock().await.len()
    }
}
