//! Durable job queue on SQLite
//!
//! Jobs survive process restarts and can be shared by several worker
//! processes on one host. Claiming a job is a single `UPDATE ... RETURNING`
//! that pushes its visibility deadline forward, so two consumers never
//! claim the same delivery at once.

use futures::future::BoxFuture;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::Path;
use std::time::Duration;

use super::{Delivery, DeliveryId, QueueBackend, ReindexJob};
use crate::errors::{SyncError, SyncResult};

/// SQL schema for the job queue database
const SCHEMA_SQL: &str = r#"
-- Pending and in-flight jobs; rows are deleted on ack
CREATE TABLE IF NOT EXISTS reindex_jobs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    entity_type TEXT NOT NULL,
    payload TEXT NOT NULL,
    attempts INTEGER NOT NULL DEFAULT 0,
    visible_at INTEGER NOT NULL,
    enqueued_at INTEGER NOT NULL
);

-- Claim order: oldest visible job first
CREATE INDEX IF NOT EXISTS idx_reindex_jobs_visible ON reindex_jobs(visible_at, id);

-- Named expiring locks
CREATE TABLE IF NOT EXISTS leases (
    key TEXT PRIMARY KEY,
    holder TEXT NOT NULL,
    expires_at INTEGER NOT NULL
);
"#;

/// How often an idle `dequeue` polls the table
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Queue persisted in a SQLite database file
#[derive(Clone)]
pub struct SqliteQueue {
    pool: SqlitePool,
    visibility_timeout: Duration,
}

impl SqliteQueue {
    /// Open an existing queue database or create a new one
    pub async fn open(path: &Path, visibility_timeout: Duration) -> SyncResult<Self> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| SyncError::Queue(format!("{}: {e}", parent.display())))?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        // Idempotent - CREATE IF NOT EXISTS
        sqlx::query(SCHEMA_SQL).execute(&pool).await?;

        log::info!("Opened job queue at {}", path.display());
        Ok(Self {
            pool,
            visibility_timeout,
        })
    }

    async fn claim(&self) -> SyncResult<Option<Delivery>> {
        let now = now_millis();
        let row: Option<(i64, String, i64)> = sqlx::query_as(
            r#"
            UPDATE reindex_jobs
            SET attempts = attempts + 1, visible_at = ?
            WHERE id = (
                SELECT id FROM reindex_jobs
                WHERE visible_at <= ?
                ORDER BY visible_at, id
                LIMIT 1
            )
            RETURNING id, payload, attempts
            "#,
        )
        .bind(now + duration_millis(self.visibility_timeout))
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        let Some((id, payload, attempts)) = row else {
            return Ok(None);
        };

        match ReindexJob::from_json(&payload) {
            Ok(job) => Ok(Some(Delivery {
                id: id as DeliveryId,
                attempt: attempts as u32,
                job,
            })),
            Err(e) => {
                // A payload that cannot be parsed will never succeed
                log::error!("Dropping job {id} with unreadable payload: {e}");
                self.ack(id as DeliveryId).await?;
                Ok(None)
            }
        }
    }
}

impl QueueBackend for SqliteQueue {
    fn enqueue<'a>(&'a self, job: ReindexJob) -> BoxFuture<'a, SyncResult<()>> {
        Box::pin(async move {
            let payload = job.to_json()?;
            let now = now_millis();
            sqlx::query(
                "INSERT INTO reindex_jobs (entity_type, payload, attempts, visible_at, enqueued_at) \
                 VALUES (?, ?, 0, ?, ?)",
            )
            .bind(job.entity_type())
            .bind(&payload)
            .bind(now)
            .bind(job.enqueued_at().timestamp_millis())
            .execute(&self.pool)
            .await?;
            log::debug!("Enqueued {:?} job for {}", job.kind(), job.entity_type());
            Ok(())
        })
    }

    fn dequeue<'a>(&'a self, wait: Duration) -> BoxFuture<'a, SyncResult<Option<Delivery>>> {
        Box::pin(async move {
            let deadline = tokio::time::Instant::now() + wait;
            loop {
                if let Some(delivery) = self.claim().await? {
                    return Ok(Some(delivery));
                }
                let now = tokio::time::Instant::now();
                if now >= deadline {
                    return Ok(None);
                }
                tokio::time::sleep((deadline - now).min(POLL_INTERVAL)).await;
            }
        })
    }

    fn ack<'a>(&'a self, id: DeliveryId) -> BoxFuture<'a, SyncResult<()>> {
        Box::pin(async move {
            sqlx::query("DELETE FROM reindex_jobs WHERE id = ?")
                .bind(id as i64)
                .execute(&self.pool)
                .await?;
            Ok(())
        })
    }

    fn nack<'a>(&'a self, id: DeliveryId, delay: Duration) -> BoxFuture<'a, SyncResult<()>> {
        Box::pin(async move {
            let result = sqlx::query("UPDATE reindex_jobs SET visible_at = ? WHERE id = ?")
                .bind(now_millis() + duration_millis(delay))
                .bind(id as i64)
                .execute(&self.pool)
                .await?;
            if result.rows_affected() == 0 {
                return Err(SyncError::Queue(format!("unknown delivery {id}")));
            }
            Ok(())
        })
    }

    fn len<'a>(&'a self) -> BoxFuture<'a, SyncResult<usize>> {
        Box::pin(async move {
            let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM reindex_jobs")
                .fetch_one(&self.pool)
                .await?;
            Ok(count as usize)
        })
    }

    fn try_acquire_lease<'a>(
        &'a self,
        key: &'a str,
        holder: &'a str,
        ttl: Duration,
    ) -> BoxFuture<'a, SyncResult<bool>> {
        Box::pin(async move {
            let now = now_millis();
            let result = sqlx::query(
                r#"
                INSERT INTO leases (key, holder, expires_at) VALUES (?, ?, ?)
                ON CONFLICT(key) DO UPDATE
                SET holder = excluded.holder, expires_at = excluded.expires_at
                WHERE leases.holder = excluded.holder OR leases.expires_at <= ?
                "#,
            )
            .bind(key)
            .bind(holder)
            .bind(now + duration_millis(ttl))
            .bind(now)
            .execute(&self.pool)
            .await?;
            Ok(result.rows_affected() > 0)
        })
    }

    fn release_lease<'a>(&'a self, key: &'a str, holder: &'a str) -> BoxFuture<'a, SyncResult<()>> {
        Box::pin(async move {
            sqlx::query("DELETE FROM leases WHERE key = ? AND holder = ?")
                .bind(key)
                .bind(holder)
                .execute(&self.pool)
                .await?;
            Ok(())
        })
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn duration_millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX / 2)
}
