//! Score Gateway
//!
//! Durable player records: cumulative win counts plus the account
//! credentials the bootstrap layer checks at login. One store is shared by
//! every running session, so the single write lock is what serializes
//! concurrent win updates: `record_win` reads, increments, and writes
//! without ever releasing it, so two sessions naming the same winner in the
//! same instant still land both increments.
//!
//! Durability is a JSON snapshot rewritten after every mutation. A failed
//! write is logged and the in-memory state stays authoritative; a round is
//! never blocked on the disk.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// One player's stored record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlayerRecord {
    /// Login credential; absent for names that only ever won rounds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Cumulative rounds won.
    #[serde(default)]
    pub wins: i64,
}

/// Faults opening a store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The snapshot file could not be read.
    #[error("failed to read score store: {0}")]
    Read(#[source] std::io::Error),

    /// The snapshot file did not decode.
    #[error("score store is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Concurrent-safe durable map of player name to record.
pub struct ScoreStore {
    path: Option<PathBuf>,
    records: RwLock<HashMap<String, PlayerRecord>>,
}

impl ScoreStore {
    /// A store with no backing file. Used by tests.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            records: RwLock::new(HashMap::new()),
        }
    }

    /// Open a file-backed store, loading the snapshot if one exists.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let records = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(StoreError::Read(e)),
        };
        Ok(Self {
            path: Some(path),
            records: RwLock::new(records),
        })
    }

    /// A player's win count; 0 when the name is unknown.
    pub async fn score(&self, name: &str) -> i64 {
        self.records
            .read()
            .await
            .get(name)
            .map(|r| r.wins)
            .unwrap_or(0)
    }

    /// Overwrite a player's win count, creating the record if needed.
    pub async fn set_score(&self, name: &str, wins: i64) {
        let mut records = self.records.write().await;
        records.entry(name.to_string()).or_default().wins = wins;
        self.persist(&records).await;
    }

    /// Increment a player's win count by one, returning the new total.
    pub async fn record_win(&self, name: &str) -> i64 {
        let mut records = self.records.write().await;
        let record = records.entry(name.to_string()).or_default();
        record.wins += 1;
        let wins = record.wins;
        self.persist(&records).await;
        wins
    }

    /// Resolve win counts for a set of names; unknown names default to 0.
    pub async fn scores_for(&self, names: &[String]) -> HashMap<String, i64> {
        let records = self.records.read().await;
        names
            .iter()
            .map(|name| {
                let wins = records.get(name).map(|r| r.wins).unwrap_or(0);
                (name.clone(), wins)
            })
            .collect()
    }

    /// Whether a registered account exists under this name.
    pub async fn exists(&self, name: &str) -> bool {
        self.records
            .read()
            .await
            .get(name)
            .is_some_and(|r| r.password.is_some())
    }

    /// Register an account. Returns false if the name already has a
    /// credential; a score-only record is upgraded in place.
    pub async fn register(&self, name: &str, password: &str) -> bool {
        let mut records = self.records.write().await;
        let record = records.entry(name.to_string()).or_default();
        if record.password.is_some() {
            return false;
        }
        record.password = Some(password.to_string());
        self.persist(&records).await;
        true
    }

    /// Check a login. Names without a stored credential never validate.
    pub async fn validate(&self, name: &str, password: &str) -> bool {
        self.records
            .read()
            .await
            .get(name)
            .and_then(|r| r.password.as_deref())
            .is_some_and(|stored| stored == password)
    }

    /// Rewrite the snapshot. Called with the write lock held so snapshots
    /// are never torn; failures are logged and play continues.
    async fn persist(&self, records: &HashMap<String, PlayerRecord>) {
        let Some(path) = &self.path else {
            return;
        };
        let bytes = match serde_json::to_vec_pretty(records) {
            Ok(b) => b,
            Err(e) => {
                warn!("failed to encode score store: {e}");
                return;
            }
        };
        let tmp = path.with_extension("tmp");
        let result = async {
            tokio::fs::write(&tmp, &bytes).await?;
            tokio::fs::rename(&tmp, path).await
        }
        .await;
        match result {
            Ok(()) => debug!("score store written to {}", path.display()),
            Err(e) => warn!("failed to write score store {}: {e}", path.display()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let store = ScoreStore::in_memory();
        store.set_score("alice", 7).await;
        assert_eq!(store.score("alice").await, 7);
    }

    #[tokio::test]
    async fn unknown_names_score_zero() {
        let store = ScoreStore::in_memory();
        assert_eq!(store.score("nobody").await, 0);
        let scores = store.scores_for(&["nobody".to_string()]).await;
        assert_eq!(scores["nobody"], 0);
    }

    #[tokio::test]
    async fn record_win_increments_by_one() {
        let store = ScoreStore::in_memory();
        assert_eq!(store.record_win("alice").await, 1);
        assert_eq!(store.record_win("alice").await, 2);
        assert_eq!(store.score("alice").await, 2);
    }

    #[tokio::test]
    async fn concurrent_wins_all_land() {
        let store = Arc::new(ScoreStore::in_memory());
        let mut handles = Vec::new();
        for _ in 0..32 {
            let store = store.clone();
            handles.push(tokio::spawn(
                async move { store.record_win("alice").await },
            ));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(store.score("alice").await, 32);
    }

    #[tokio::test]
    async fn accounts_register_and_validate() {
        let store = ScoreStore::in_memory();
        assert!(!store.exists("alice").await);
        assert!(store.register("alice", "hunter2").await);
        assert!(store.exists("alice").await);
        assert!(store.validate("alice", "hunter2").await);
        assert!(!store.validate("alice", "wrong").await);
        assert!(!store.register("alice", "other").await);
    }

    #[tokio::test]
    async fn score_only_records_never_validate() {
        let store = ScoreStore::in_memory();
        store.record_win("alice").await;
        assert!(!store.exists("alice").await);
        assert!(!store.validate("alice", "").await);
        // Registering keeps the accumulated wins.
        assert!(store.register("alice", "hunter2").await);
        assert_eq!(store.score("alice").await, 1);
    }

    #[tokio::test]
    async fn snapshot_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scores.json");

        let store = ScoreStore::open(&path).await.unwrap();
        store.register("alice", "hunter2").await;
        store.record_win("alice").await;
        drop(store);

        let reopened = ScoreStore::open(&path).await.unwrap();
        assert_eq!(reopened.score("alice").await, 1);
        assert!(reopened.validate("alice", "hunter2").await);
    }

    #[tokio::test]
    async fn corrupt_snapshot_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scores.json");
        tokio::fs::write(&path, b"not json").await.unwrap();
        assert!(matches!(
            ScoreStore::open(&path).await,
            Err(StoreError::Corrupt(_))
        ));
    }
}
