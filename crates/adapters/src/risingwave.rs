//! RisingWave Change Subscription Source
//!
//! Streams change events off the experiment-run table through a
//! RisingWave subscription cursor. A subscription cursor is a session
//! object, so the adapter pins one pooled connection for the lifetime of
//! a declared cursor; checkpoint reads and writes go through the shared
//! pool.

use std::time::Duration;

use async_trait::async_trait;
use sigex_core::{ChangeEvent, ChangeOperation};
use sigex_ports::{ChangeSubscriptionSource, SubscriptionError, SubscriptionSettings};
use sqlx::pool::PoolConnection;
use sqlx::{PgPool, Postgres, Row};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::db::{CHECKPOINTS_TABLE, EXPERIMENT_RUNS_TABLE, ORCHESTRATION_SCHEMA};

pub struct RisingWaveSubscriptionSource {
    pool: PgPool,
    session: Mutex<Option<PoolConnection<Postgres>>>,
}

impl RisingWaveSubscriptionSource {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            session: Mutex::new(None),
        }
    }

    /// Creates the checkpoint table when missing.
    pub async fn init_schema(&self) -> Result<(), SubscriptionError> {
        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {ORCHESTRATION_SCHEMA}.{CHECKPOINTS_TABLE} (\
             subscription VARCHAR PRIMARY KEY, \
             watermark BIGINT NOT NULL)"
        ))
        .execute(&self.pool)
        .await
        .map_err(|e| SubscriptionError::Checkpoint(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl ChangeSubscriptionSource for RisingWaveSubscriptionSource {
    async fn ensure_subscription(
        &self,
        settings: &SubscriptionSettings,
    ) -> Result<(), SubscriptionError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM rw_catalog.rw_subscriptions WHERE name = $1",
        )
        .bind(&settings.subscription)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| SubscriptionError::Session(e.to_string()))?;

        if count == 0 {
            info!(subscription = %settings.subscription, "creating change subscription");
            // DDL does not take bind parameters.
            sqlx::query(&format!(
                "CREATE SUBSCRIPTION {ORCHESTRATION_SCHEMA}.{} \
                 FROM {ORCHESTRATION_SCHEMA}.{EXPERIMENT_RUNS_TABLE} \
                 WITH (retention = '{}')",
                settings.subscription, settings.retention
            ))
            .execute(&self.pool)
            .await
            .map_err(|e| SubscriptionError::Session(e.to_string()))?;
        }

        Ok(())
    }

    async fn declare_cursor(
        &self,
        settings: &SubscriptionSettings,
        since: Option<u64>,
    ) -> Result<(), SubscriptionError> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| SubscriptionError::Session(e.to_string()))?;

        let position = match since {
            Some(watermark) => format!("SINCE {watermark}"),
            None => "FULL".to_string(),
        };
        info!(cursor = %settings.cursor, position = %position, "declaring subscription cursor");

        sqlx::query(&format!(
            "DECLARE {} SUBSCRIPTION CURSOR FOR {ORCHESTRATION_SCHEMA}.{} {position}",
            settings.cursor, settings.subscription
        ))
        .execute(&mut *conn)
        .await
        .map_err(|e| SubscriptionError::Session(e.to_string()))?;

        // Replacing the session drops any previously declared cursor.
        *self.session.lock().await = Some(conn);
        Ok(())
    }

    async fn fetch_next(
        &self,
        settings: &SubscriptionSettings,
        timeout: Duration,
    ) -> Result<Option<ChangeEvent>, SubscriptionError> {
        let mut guard = self.session.lock().await;
        let conn = guard
            .as_mut()
            .ok_or_else(|| SubscriptionError::Session("cursor not declared".to_string()))?;

        // A timed-out fetch returns an empty result set, not an error, as
        // long as the statement itself is allowed to outlive the cursor
        // wait.
        let row = sqlx::query(&format!(
            "FETCH NEXT FROM {} WITH (timeout = '{}s')",
            settings.cursor,
            timeout.as_secs()
        ))
        .fetch_optional(&mut **conn)
        .await
        .map_err(|e| {
            // A broken session cannot serve further fetches.
            *guard = None;
            SubscriptionError::Session(e.to_string())
        })?;

        let Some(row) = row else {
            return Ok(None);
        };

        let run_id: String = row
            .try_get("id")
            .map_err(|e| SubscriptionError::Malformed(e.to_string()))?;
        let status: String = row
            .try_get("status")
            .map_err(|e| SubscriptionError::Malformed(e.to_string()))?;
        let op: i32 = row
            .try_get("op")
            .map_err(|e| SubscriptionError::Malformed(e.to_string()))?;
        let rw_timestamp: i64 = row
            .try_get("rw_timestamp")
            .map_err(|e| SubscriptionError::Malformed(e.to_string()))?;

        let operation = ChangeOperation::from_code(op)
            .map_err(|e| SubscriptionError::Malformed(e.to_string()))?;

        debug!(run_id, ?operation, watermark = rw_timestamp, "change event fetched");
        Ok(Some(ChangeEvent {
            run_id,
            operation,
            status,
            watermark: rw_timestamp as u64,
        }))
    }

    async fn commit_checkpoint(
        &self,
        subscription: &str,
        watermark: u64,
    ) -> Result<(), SubscriptionError> {
        sqlx::query(&format!(
            "INSERT INTO {ORCHESTRATION_SCHEMA}.{CHECKPOINTS_TABLE} (subscription, watermark) \
             VALUES ($1, $2) \
             ON CONFLICT (subscription) DO UPDATE SET watermark = excluded.watermark \
             WHERE {CHECKPOINTS_TABLE}.watermark < excluded.watermark"
        ))
        .bind(subscription)
        .bind(watermark as i64)
        .execute(&self.pool)
        .await
        .map_err(|e| SubscriptionError::Checkpoint(e.to_string()))?;
        Ok(())
    }

    async fn load_checkpoint(&self, subscription: &str) -> Result<Option<u64>, SubscriptionError> {
        let watermark: Option<i64> = sqlx::query_scalar(&format!(
            "SELECT watermark FROM {ORCHESTRATION_SCHEMA}.{CHECKPOINTS_TABLE} \
             WHERE subscription = $1"
        ))
        .bind(subscription)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| SubscriptionError::Checkpoint(e.to_string()))?;

        Ok(watermark.map(|w| w as u64))
    }
}
