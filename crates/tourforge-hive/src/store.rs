use sqlx::{Pool, Row, Sqlite};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::Notify;
use tourforge_core::channel::{Broker, Delivery};
use tourforge_core::error::{TourError, TourResult};

/// Upper bound on a single sleep while long-polling, so leases that expire
/// during a wait are noticed.
const POLL_INTERVAL: Duration = Duration::from_millis(250);

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

fn db_err(e: sqlx::Error) -> TourError {
    TourError::Channel(e.to_string())
}

/// Durable broker backed by SQLite. Messages survive hive restarts; leases
/// are timestamps, so an unacked message becomes ready again once its lease
/// runs out even if the hive was down in between.
pub struct SqliteBroker {
    db: Pool<Sqlite>,
    notify: Notify,
    lease: Duration,
    consumer_ttl: Duration,
}

impl SqliteBroker {
    pub fn new(db: Pool<Sqlite>, lease: Duration, consumer_ttl: Duration) -> Self {
        Self {
            db,
            notify: Notify::new(),
            lease,
            consumer_ttl,
        }
    }

    pub async fn register_node(&self, node_id: &str, cpu_model: &str, cores: usize) -> TourResult<()> {
        sqlx::query(
            "INSERT INTO consumers (id, cpu_model, cores, last_seen) VALUES (?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET cpu_model = excluded.cpu_model, cores = excluded.cores, last_seen = excluded.last_seen",
        )
        .bind(node_id)
        .bind(cpu_model)
        .bind(cores as i64)
        .bind(now_ms())
        .execute(&self.db)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    pub async fn depth(&self, queue: &str) -> TourResult<(u64, u64)> {
        let row = sqlx::query(
            "SELECT
                COALESCE(SUM(CASE WHEN leased_until IS NULL THEN 1 ELSE 0 END), 0) AS ready,
                COALESCE(SUM(CASE WHEN leased_until IS NOT NULL THEN 1 ELSE 0 END), 0) AS leased
             FROM messages WHERE queue = ?",
        )
        .bind(queue)
        .fetch_one(&self.db)
        .await
        .map_err(db_err)?;
        let ready: i64 = row.get("ready");
        let leased: i64 = row.get("leased");
        Ok((ready as u64, leased as u64))
    }

    async fn take(&self, queue: &str, consumer_id: &str, max: usize) -> TourResult<Vec<Delivery>> {
        let now = now_ms();
        let until = now + self.lease.as_millis() as i64;
        let mut tx = self.db.begin().await.map_err(db_err)?;

        sqlx::query(
            "UPDATE messages SET delivery_tag = NULL, consumer_id = NULL, leased_until = NULL
             WHERE queue = ? AND leased_until IS NOT NULL AND leased_until <= ?",
        )
        .bind(queue)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        let rows = sqlx::query(
            "SELECT id, payload, deliveries FROM messages
             WHERE queue = ? AND leased_until IS NULL ORDER BY id LIMIT ?",
        )
        .bind(queue)
        .bind(max as i64)
        .fetch_all(&mut *tx)
        .await
        .map_err(db_err)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let id: i64 = row.get("id");
            let payload: String = row.get("payload");
            let deliveries: i64 = row.get("deliveries");

            let tag: i64 = sqlx::query_scalar(
                "UPDATE broker_meta SET value = value + 1 WHERE key = 'delivery_tag' RETURNING value",
            )
            .fetch_one(&mut *tx)
            .await
            .map_err(db_err)?;

            sqlx::query(
                "UPDATE messages SET deliveries = deliveries + 1, delivery_tag = ?, consumer_id = ?, leased_until = ?
                 WHERE id = ?",
            )
            .bind(tag)
            .bind(consumer_id)
            .bind(until)
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

            out.push(Delivery {
                tag: tag as u64,
                redelivered: deliveries > 0,
                payload,
            });
        }

        sqlx::query(
            "INSERT INTO consumers (id, last_seen) VALUES (?, ?)
             ON CONFLICT(id) DO UPDATE SET last_seen = excluded.last_seen",
        )
        .bind(consumer_id)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;
        Ok(out)
    }
}

impl Broker for SqliteBroker {
    async fn publish(&self, queue: &str, payload: String) -> TourResult<()> {
        sqlx::query("INSERT INTO messages (queue, payload) VALUES (?, ?)")
            .bind(queue)
            .bind(payload)
            .execute(&self.db)
            .await
            .map_err(db_err)?;
        self.notify.notify_waiters();
        Ok(())
    }

    async fn fetch(&self, queue: &str, consumer_id: &str, max: usize, wait: Duration) -> TourResult<Vec<Delivery>> {
        let deadline = tokio::time::Instant::now() + wait;
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let got = self.take(queue, consumer_id, max).await?;
            if !got.is_empty() || max == 0 {
                return Ok(got);
            }

            let now = tokio::time::Instant::now();
            if now >= deadline {
                return Ok(got);
            }
            let nap = (deadline - now).min(POLL_INTERVAL);
            let _ = tokio::time::timeout(nap, notified).await;
        }
    }

    async fn ack(&self, queue: &str, tag: u64) -> TourResult<()> {
        let res = sqlx::query("DELETE FROM messages WHERE queue = ? AND delivery_tag = ?")
            .bind(queue)
            .bind(tag as i64)
            .execute(&self.db)
            .await
            .map_err(db_err)?;
        if res.rows_affected() == 0 {
            return Err(TourError::Channel(format!("unknown delivery tag {} on {}", tag, queue)));
        }
        Ok(())
    }

    async fn nack(&self, queue: &str, tag: u64, requeue: bool) -> TourResult<()> {
        let sql = if requeue {
            "UPDATE messages SET delivery_tag = NULL, consumer_id = NULL, leased_until = NULL
             WHERE queue = ? AND delivery_tag = ?"
        } else {
            "DELETE FROM messages WHERE queue = ? AND delivery_tag = ?"
        };
        let res = sqlx::query(sql)
            .bind(queue)
            .bind(tag as i64)
            .execute(&self.db)
            .await
            .map_err(db_err)?;
        if res.rows_affected() == 0 {
            return Err(TourError::Channel(format!("unknown delivery tag {} on {}", tag, queue)));
        }
        if requeue {
            self.notify.notify_waiters();
        }
        Ok(())
    }

    async fn purge(&self, queue: &str) -> TourResult<u64> {
        let res = sqlx::query("DELETE FROM messages WHERE queue = ? AND leased_until IS NULL")
            .bind(queue)
            .execute(&self.db)
            .await
            .map_err(db_err)?;
        Ok(res.rows_affected())
    }

    async fn register_consumer(&self, consumer_id: &str) -> TourResult<()> {
        sqlx::query(
            "INSERT INTO consumers (id, last_seen) VALUES (?, ?)
             ON CONFLICT(id) DO UPDATE SET last_seen = excluded.last_seen",
        )
        .bind(consumer_id)
        .bind(now_ms())
        .execute(&self.db)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn live_consumers(&self) -> TourResult<Vec<String>> {
        let cutoff = now_ms() - self.consumer_ttl.as_millis() as i64;
        sqlx::query_scalar("SELECT id FROM consumers WHERE last_seen >= ? ORDER BY id")
            .bind(cutoff)
            .fetch_all(&self.db)
            .await
            .map_err(db_err)
    }
}
