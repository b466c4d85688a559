use mockall::automock;
use sqlx::Row;
use tracing::{debug, info, warn};

use crate::db::{queries, DbPool};

/// Result of reconciling one feed entry against the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Created,
    Updated,
    Unchanged,
}

/// Ledger operations the processing passes depend on.
///
/// Abstracted for easier testing with mocks.
#[automock]
pub trait AlertStore {
    /// Record the given revision token for an alert id.
    ///
    /// Returns `Created` for a previously unseen id, `Updated` when the
    /// stored token differs, and `Unchanged` (no write) when it matches.
    async fn reconcile(&self, id: &str, updated: &str) -> ReconcileOutcome;

    /// Delete the row for an alert id. Absent rows are a no-op.
    async fn remove(&self, id: &str);
}

/// Durable alert id -> last-seen revision token store, one row per alert.
///
/// Every operation runs as its own transaction and reports "no effect" on
/// storage errors instead of propagating them; a revision missed this cycle
/// is picked up again on the next scheduled run.
pub struct AlertLedger {
    pool: DbPool,
}

impl AlertLedger {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Create the alerts table if this is the first run against the database.
    pub async fn initialize(&self) {
        match sqlx::query(queries::CREATE_ALERTS_TABLE)
            .execute(&self.pool)
            .await
        {
            Ok(_) => info!("Alerts table ready"),
            Err(e) => warn!("Could not ensure alerts table exists: {}", e),
        }
    }

    /// Last-seen revision token for an alert id, if any.
    pub async fn lookup(&self, id: &str) -> Option<String> {
        match sqlx::query(queries::SELECT_ALERT_UPDATED)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
        {
            Ok(row) => row.and_then(|r| r.try_get::<Option<String>, _>("updated").ok().flatten()),
            Err(e) => {
                warn!("Ledger lookup failed for {}: {}", id, e);
                None
            }
        }
    }

    async fn try_reconcile(&self, id: &str, updated: &str) -> sqlx::Result<ReconcileOutcome> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(queries::SELECT_ALERT_UPDATED)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;

        let outcome = match row {
            None => {
                sqlx::query(queries::INSERT_ALERT)
                    .bind(id)
                    .bind(updated)
                    .execute(&mut *tx)
                    .await?;
                ReconcileOutcome::Created
            }
            Some(row) => {
                let current: Option<String> = row.try_get("updated")?;
                if current.as_deref() == Some(updated) {
                    ReconcileOutcome::Unchanged
                } else {
                    sqlx::query(queries::UPDATE_ALERT_UPDATED)
                        .bind(id)
                        .bind(updated)
                        .execute(&mut *tx)
                        .await?;
                    ReconcileOutcome::Updated
                }
            }
        };

        tx.commit().await?;
        Ok(outcome)
    }
}

impl AlertStore for AlertLedger {
    async fn reconcile(&self, id: &str, updated: &str) -> ReconcileOutcome {
        match self.try_reconcile(id, updated).await {
            Ok(outcome) => {
                debug!("Reconciled {}: {:?}", id, outcome);
                outcome
            }
            // Rolled back on drop; treated as already-processed so the entry
            // is retried on the next cycle.
            Err(e) => {
                warn!("Ledger reconcile failed for {}: {}", id, e);
                ReconcileOutcome::Unchanged
            }
        }
    }

    async fn remove(&self, id: &str) {
        if let Err(e) = sqlx::query(queries::DELETE_ALERT)
            .bind(id)
            .execute(&self.pool)
            .await
        {
            warn!("Ledger delete failed for {}: {}", id, e);
        }
    }
}
