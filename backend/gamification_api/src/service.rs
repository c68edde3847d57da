//! Owns the live customer snapshot and sequences engine actions with
//! persistence.
//!
//! Every action runs under one lock: apply to a copy, save the copy, and only
//! then replace the in-memory snapshot. A failed save leaves both the stored
//! and the live state as they were.

use gamification_engine::{storage, Action, DashboardView, Engine, Period, Snapshot};
use sqlx::SqlitePool;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::db;
use crate::errors::Result;

pub struct SnapshotService {
    pool: SqlitePool,
    storage_key: String,
    engine: Engine,
    current: Mutex<Snapshot>,
}

impl SnapshotService {
    /// Load the stored snapshot, starting fresh if it is missing or unreadable.
    pub async fn load(pool: SqlitePool, storage_key: String, engine: Engine) -> Self {
        let raw = match db::load_value(&pool, &storage_key).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Could not read stored snapshot, starting fresh: {e}");
                None
            }
        };
        let snapshot = storage::decode_or_default(raw.as_deref(), engine.now());
        info!(
            key = %storage_key,
            xp = snapshot.xp_total,
            "Snapshot loaded"
        );

        Self {
            pool,
            storage_key,
            engine,
            current: Mutex::new(snapshot),
        }
    }

    pub fn current_period(&self) -> Period {
        self.engine.current_period()
    }

    /// Apply one action and persist the result.
    pub async fn apply(&self, action: Action) -> Result<Snapshot> {
        let mut current = self.current.lock().await;
        let next = self.engine.apply(&current, action)?;
        let raw = storage::encode(&next)?;
        db::save_value(&self.pool, &self.storage_key, &raw).await?;
        *current = next.clone();
        Ok(next)
    }

    #[cfg(test)]
    pub async fn snapshot(&self) -> Snapshot {
        self.current.lock().await.clone()
    }

    /// View for `period`, defaulting to the current month.
    pub async fn dashboard(&self, period: Option<Period>) -> DashboardView {
        let period = period.unwrap_or_else(|| self.current_period());
        let current = self.current.lock().await;
        self.engine.dashboard(&current, &period)
    }
}
