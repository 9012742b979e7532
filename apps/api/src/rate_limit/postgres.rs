//! Postgres-backed [`RateLimitLog`].
//!
//! Records live in `rate_limit_records` (see `migrations/`). Count and append
//! run in one transaction under a transaction-scoped advisory lock keyed on
//! `(namespace, requester)`, so concurrent admissions for the same requester
//! are serialized across every API instance while unrelated requesters never
//! contend.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::{RateLimitLog, WindowDecision};
use crate::store::StoreError;

#[derive(Clone)]
pub struct PgRateLimitLog {
    pool: PgPool,
}

impl PgRateLimitLog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RateLimitLog for PgRateLimitLog {
    async fn record_if_below(
        &self,
        namespace: &str,
        requester: &str,
        window_start: DateTime<Utc>,
        now: DateTime<Utc>,
        max_requests: u32,
    ) -> Result<WindowDecision, StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1 || ':' || $2, 0))")
            .bind(namespace)
            .bind(requester)
            .execute(&mut *tx)
            .await?;

        let (count, oldest): (i64, Option<DateTime<Utc>>) = sqlx::query_as(
            r#"
            SELECT COUNT(*), MIN(recorded_at)
            FROM rate_limit_records
            WHERE namespace = $1 AND requester_id = $2 AND recorded_at >= $3
            "#,
        )
        .bind(namespace)
        .bind(requester)
        .bind(window_start)
        .fetch_one(&mut *tx)
        .await?;

        if count >= i64::from(max_requests) {
            // Nothing was written; rolling back releases the advisory lock.
            tx.rollback().await?;
            return Ok(WindowDecision::Full {
                oldest: oldest.unwrap_or(now),
            });
        }

        sqlx::query(
            "INSERT INTO rate_limit_records (namespace, requester_id, recorded_at) VALUES ($1, $2, $3)",
        )
        .bind(namespace)
        .bind(requester)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(WindowDecision::Recorded)
    }

    async fn compact(&self, before: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM rate_limit_records WHERE recorded_at < $1")
            .bind(before)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
