//! Pager message storage.
//!
//! The store is the serialization point between overlapping consumers: the
//! attempt counter and the sent flag are only changed through atomic updates,
//! never by writing back a whole row. A consumer claims a message before
//! transmitting it, so a stale copy of a sent or in-flight message is refused
//! here rather than paged again.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Utc};
use sqlx::{Connection, PgConnection, PgPool};
use uuid::Uuid;

use beacon_common::error::AppError;
use beacon_common::types::PagerMessage;

use crate::policy::DeliveryPolicy;

/// Result of trying to claim a message for transmission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Claim {
    Acquired,
    /// The stored row is already sent
    AlreadySent,
    /// Another consumer holds an unexpired claim
    Busy,
}

#[async_trait]
pub trait PagerMessageStore: Send + Sync {
    async fn insert(&self, message: &PagerMessage) -> Result<(), AppError>;

    /// Oldest eligible, unclaimed message for `transport_key` under `policy` at `now`.
    async fn next_eligible(
        &self,
        transport_key: &str,
        now: DateTime<Utc>,
        policy: &DeliveryPolicy,
    ) -> Result<Option<PagerMessage>, AppError>;

    /// Claim an unsent message until `until`. A claim that expired by `now` may be taken over.
    async fn claim(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Claim, AppError>;

    /// Set the terminal sent flag and drop the claim. Returns false if it was already set.
    async fn mark_sent(&self, id: Uuid) -> Result<bool, AppError>;

    /// Increment the attempt counter, drop the claim and return the new count.
    async fn record_failed_attempt(&self, id: Uuid) -> Result<i32, AppError>;
}

#[derive(Debug, Default)]
struct Rows {
    messages: Vec<PagerMessage>,
    claims: HashMap<Uuid, DateTime<Utc>>,
}

impl Rows {
    fn find_mut(&mut self, id: Uuid) -> Result<&mut PagerMessage, AppError> {
        self.messages
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or_else(|| AppError::NotFound(format!("pager message {id}")))
    }

    fn is_claimed(&self, id: Uuid, now: DateTime<Utc>) -> bool {
        self.claims.get(&id).is_some_and(|until| *until > now)
    }
}

/// In-process store, for tests and single-process embedding.
#[derive(Debug, Default)]
pub struct MemoryPagerStore {
    rows: Mutex<Rows>,
}

impl MemoryPagerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: Uuid) -> Option<PagerMessage> {
        self.lock().messages.iter().find(|m| m.id == id).cloned()
    }

    pub fn snapshot(&self) -> Vec<PagerMessage> {
        self.lock().messages.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Rows> {
        // A poisoned lock still holds consistent rows: every update is a single field write.
        self.rows.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl PagerMessageStore for MemoryPagerStore {
    async fn insert(&self, message: &PagerMessage) -> Result<(), AppError> {
        let mut rows = self.lock();
        if rows.messages.iter().any(|m| m.id == message.id) {
            return Err(AppError::Conflict(format!(
                "pager message {} already exists",
                message.id
            )));
        }
        rows.messages.push(message.clone());
        Ok(())
    }

    async fn next_eligible(
        &self,
        transport_key: &str,
        now: DateTime<Utc>,
        policy: &DeliveryPolicy,
    ) -> Result<Option<PagerMessage>, AppError> {
        let rows = self.lock();
        Ok(rows
            .messages
            .iter()
            .filter(|m| m.transport_key == transport_key && policy.is_eligible(m, now))
            .filter(|m| !rows.is_claimed(m.id, now))
            .min_by_key(|m| (m.queued_at, m.id))
            .cloned())
    }

    async fn claim(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Claim, AppError> {
        let mut rows = self.lock();
        if rows.find_mut(id)?.sent {
            return Ok(Claim::AlreadySent);
        }
        if rows.is_claimed(id, now) {
            return Ok(Claim::Busy);
        }
        rows.claims.insert(id, until);
        Ok(Claim::Acquired)
    }

    async fn mark_sent(&self, id: Uuid) -> Result<bool, AppError> {
        let mut rows = self.lock();
        let message = rows.find_mut(id)?;
        let newly_sent = !message.sent;
        message.sent = true;
        rows.claims.remove(&id);
        Ok(newly_sent)
    }

    async fn record_failed_attempt(&self, id: Uuid) -> Result<i32, AppError> {
        let mut rows = self.lock();
        let message = rows.find_mut(id)?;
        message.attempted_to_send += 1;
        let attempts = message.attempted_to_send;
        rows.claims.remove(&id);
        Ok(attempts)
    }
}

/// Postgres-backed store.
#[derive(Debug, Clone)]
pub struct PgPagerStore {
    pool: PgPool,
}

impl PgPagerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Take the process-wide consumer lock for `transport_key`.
    ///
    /// Returns `None` if another consumer already holds it. The lock lives on a
    /// dedicated connection and is released when [`ConsumerLock::release`] runs
    /// or the connection drops.
    pub async fn acquire_consumer_lock(
        &self,
        transport_key: &str,
    ) -> Result<Option<ConsumerLock>, AppError> {
        let mut conn = self.pool.acquire().await?.detach();

        let (acquired,): (bool,) = sqlx::query_as("SELECT pg_try_advisory_lock(hashtext($1))")
            .bind(transport_key)
            .fetch_one(&mut conn)
            .await?;

        if !acquired {
            conn.close().await?;
            return Ok(None);
        }

        tracing::info!(transport_key, "Consumer lock acquired");
        Ok(Some(ConsumerLock {
            conn,
            transport_key: transport_key.to_string(),
        }))
    }
}

#[async_trait]
impl PagerMessageStore for PgPagerStore {
    async fn insert(&self, message: &PagerMessage) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO pager_messages
                (id, transport_key, cap_code, body, priority, queued_at, attempted_to_send, sent)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(message.id)
        .bind(&message.transport_key)
        .bind(&message.cap_code)
        .bind(&message.body)
        .bind(message.priority.to_string())
        .bind(message.queued_at)
        .bind(message.attempted_to_send)
        .bind(message.sent)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::from_insert(e, format!("pager message {}", message.id)))?;

        Ok(())
    }

    async fn next_eligible(
        &self,
        transport_key: &str,
        now: DateTime<Utc>,
        policy: &DeliveryPolicy,
    ) -> Result<Option<PagerMessage>, AppError> {
        let message: Option<PagerMessage> = sqlx::query_as(
            r#"
            SELECT id, transport_key, cap_code, body, priority, queued_at, attempted_to_send, sent
            FROM pager_messages
            WHERE transport_key = $1
              AND sent = false
              AND attempted_to_send < $2
              AND ($3::timestamptz IS NULL OR queued_at > $3)
              AND (claimed_until IS NULL OR claimed_until <= $4)
            ORDER BY queued_at ASC, id ASC
            LIMIT 1
            "#,
        )
        .bind(transport_key)
        .bind(policy.retry_limit)
        .bind(storable_cutoff(policy.age_cutoff(now)))
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        Ok(message)
    }

    async fn claim(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Claim, AppError> {
        let claimed = sqlx::query(
            r#"
            UPDATE pager_messages
            SET claimed_until = $3
            WHERE id = $1
              AND sent = false
              AND (claimed_until IS NULL OR claimed_until <= $2)
            "#,
        )
        .bind(id)
        .bind(now)
        .bind(until)
        .execute(&self.pool)
        .await?;

        if claimed.rows_affected() == 1 {
            return Ok(Claim::Acquired);
        }

        let sent: Option<(bool,)> = sqlx::query_as("SELECT sent FROM pager_messages WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match sent {
            Some((true,)) => Ok(Claim::AlreadySent),
            Some((false,)) => Ok(Claim::Busy),
            None => Err(AppError::NotFound(format!("pager message {id}"))),
        }
    }

    async fn mark_sent(&self, id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE pager_messages
            SET sent = true, claimed_until = NULL
            WHERE id = $1 AND sent = false
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn record_failed_attempt(&self, id: Uuid) -> Result<i32, AppError> {
        let row: Option<(i32,)> = sqlx::query_as(
            r#"
            UPDATE pager_messages
            SET attempted_to_send = attempted_to_send + 1, claimed_until = NULL
            WHERE id = $1
            RETURNING attempted_to_send
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|(attempts,)| attempts)
            .ok_or_else(|| AppError::NotFound(format!("pager message {id}")))
    }
}

/// Postgres cannot store timestamps before 4713 BC; a cutoff that early excludes nothing.
fn storable_cutoff(cutoff: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
    cutoff.filter(|c| c.year() >= 1)
}

/// Session advisory lock marking the single consumer of one transport key.
pub struct ConsumerLock {
    conn: PgConnection,
    transport_key: String,
}

impl ConsumerLock {
    pub async fn release(mut self) -> Result<(), AppError> {
        sqlx::query("SELECT pg_advisory_unlock(hashtext($1))")
            .bind(&self.transport_key)
            .execute(&mut self.conn)
            .await?;
        self.conn.close().await?;

        tracing::info!(transport_key = %self.transport_key, "Consumer lock released");
        Ok(())
    }
}
