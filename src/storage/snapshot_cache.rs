use anyhow::Result;
use chrono::{DateTime, Duration, TimeZone, Utc};

use super::schema::Database;
use super::types::SnapshotRow;
use crate::model::AggregateSnapshot;

impl Database {
    // ========================================================================
    // Snapshot Cache Operations
    // ========================================================================

    /// Store `snapshot` under `key`, replacing whatever was there.
    pub async fn put_snapshot(&self, key: &str, snapshot: &AggregateSnapshot) -> Result<()> {
        let payload = serde_json::to_string(snapshot)?;

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO snapshot_cache (cache_key, payload, captured_at, updated_at)
            VALUES (?, ?, ?, datetime('now'))
        "#,
        )
        .bind(key)
        .bind(&payload)
        .bind(snapshot.captured_at.timestamp_millis())
        .execute(&self.pool)
        .await?;

        tracing::debug!(key = %key, items = snapshot.len(), "Snapshot cached");
        Ok(())
    }

    /// Fetch the snapshot stored under `key` if it is at most `ttl` old.
    ///
    /// Missing, stale, unreadable and corrupted entries all come back as
    /// `None`; the last two are logged.
    pub async fn get_snapshot(&self, key: &str, ttl: Duration) -> Option<AggregateSnapshot> {
        self.get_snapshot_at(key, ttl, Utc::now()).await
    }

    /// [`get_snapshot`](Self::get_snapshot) with an explicit clock.
    pub async fn get_snapshot_at(
        &self,
        key: &str,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Option<AggregateSnapshot> {
        let row: Option<SnapshotRow> = match sqlx::query_as(
            "SELECT payload, captured_at FROM snapshot_cache WHERE cache_key = ?",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        {
            Ok(row) => row,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Snapshot cache read failed");
                return None;
            }
        };

        let (payload, captured_millis) = row?;

        let Some(captured_at) = Utc.timestamp_millis_opt(captured_millis).single() else {
            tracing::warn!(key = %key, captured_millis, "Snapshot cache timestamp out of range");
            return None;
        };

        if now - captured_at > ttl {
            tracing::debug!(
                key = %key,
                age_secs = (now - captured_at).num_seconds(),
                "Snapshot cache stale"
            );
            return None;
        }

        match serde_json::from_str::<AggregateSnapshot>(&payload) {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Snapshot cache entry corrupted, ignoring");
                None
            }
        }
    }

    /// Remove the entry stored under `key`. Returns whether one existed.
    pub async fn clear_snapshot(&self, key: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM snapshot_cache WHERE cache_key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
