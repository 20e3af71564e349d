//! HTTP-layer idempotency: reservation, replay, and conflict detection for
//! `Idempotency-Key`-protected endpoints.
//!
//! The insert against the `key` uniqueness constraint IS the lock: there is no
//! read-then-decide window. `claim` always attempts the insert first and only
//! reads the existing row on a uniqueness violation, which is also the only point
//! that can race two concurrent callers of the same key.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use sqlx::PgPool;

/// TTL after which a reservation is considered expired and may be evicted by a
/// fresh conflicting claim. Default 24 h.
pub const DEFAULT_TTL_HOURS: i64 = 24;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// This call reserved the key; the caller must eventually call
    /// `persist_response` or `release`.
    Claimed,
    /// Another (or the same, not-yet-completed) request holds the reservation with
    /// a matching `(method, path, body_sha)`.
    Locked,
    /// The key is already associated with a different `(method, path, body_sha)`.
    Conflict(&'static str),
    /// The key already completed; replay the stored response verbatim.
    Replay(i32, serde_json::Value),
}

#[derive(Debug, thiserror::Error)]
pub enum IdempotencyError {
    #[error("idempotency store backend failed: {0}")]
    StoreFailed(String),
}

/// HTTP-layer idempotency reservation and response cache, backed by the
/// `idempotency_records` table.
#[derive(Clone)]
pub struct IdempotencyStore {
    pool: PgPool,
    ttl_hours: i64,
}

impl IdempotencyStore {
    pub fn new(pool: PgPool) -> Self {
        Self::with_ttl_hours(pool, DEFAULT_TTL_HOURS)
    }

    pub fn with_ttl_hours(pool: PgPool, ttl_hours: i64) -> Self {
        Self { pool, ttl_hours }
    }

    /// Attempts to reserve `key` for `(method, path, body_sha)`. Evicts an expired
    /// row (if any) before attempting the fresh insert.
    #[tracing::instrument(skip(self, body_sha), fields(key))]
    pub async fn claim(
        &self,
        key: &str,
        method: &str,
        path: &str,
        body_sha: &str,
    ) -> Result<Outcome, IdempotencyError> {
        let cutoff = Utc::now() - ChronoDuration::hours(self.ttl_hours);
        sqlx::query("DELETE FROM idempotency_records WHERE key = $1 AND created_at < $2")
            .bind(key)
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(|e| IdempotencyError::StoreFailed(e.to_string()))?;

        let inserted = sqlx::query(
            "INSERT INTO idempotency_records (key, method, path, body_sha) \
             VALUES ($1, $2, $3, $4) ON CONFLICT (key) DO NOTHING",
        )
        .bind(key)
        .bind(method)
        .bind(path)
        .bind(body_sha)
        .execute(&self.pool)
        .await
        .map_err(|e| IdempotencyError::StoreFailed(e.to_string()))?;

        if inserted.rows_affected() == 1 {
            return Ok(Outcome::Claimed);
        }

        // Someone else holds the row (or held it before TTL eviction raced us);
        // read it and decide the outcome from its content, never from timing.
        let row: (String, String, String, Option<i32>, Option<serde_json::Value>) = sqlx::query_as(
            "SELECT method, path, body_sha, response_status, response_body \
             FROM idempotency_records WHERE key = $1",
        )
        .bind(key)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| IdempotencyError::StoreFailed(e.to_string()))?;

        let (stored_method, stored_path, stored_body_sha, status, body) = row;
        let matches = stored_method == method && stored_path == path && stored_body_sha == body_sha;

        match (matches, status, body) {
            (false, _, _) => Ok(Outcome::Conflict("key_reused_with_different_payload")),
            (true, Some(status), Some(body)) => Ok(Outcome::Replay(status, body)),
            (true, Some(status), None) => Ok(Outcome::Replay(status, serde_json::Value::Null)),
            (true, None, _) => Ok(Outcome::Locked),
        }
    }

    /// Completes a reservation with the response that was (or will be) returned to
    /// the caller, so future same-key requests replay it.
    #[tracing::instrument(skip(self, body))]
    pub async fn persist_response(
        &self,
        key: &str,
        status: u16,
        body: &serde_json::Value,
    ) -> Result<(), IdempotencyError> {
        sqlx::query(
            "UPDATE idempotency_records SET response_status = $2, response_body = $3 WHERE key = $1",
        )
        .bind(key)
        .bind(status as i32)
        .bind(body)
        .execute(&self.pool)
        .await
        .map_err(|e| IdempotencyError::StoreFailed(e.to_string()))?;
        Ok(())
    }

    /// Abandons a reservation that produced no persistable response, so a retry
    /// can claim the key again. Only safe to call when no ledger side effect
    /// occurred under the reservation.
    #[tracing::instrument(skip(self))]
    pub async fn release(&self, key: &str) -> Result<(), IdempotencyError> {
        sqlx::query("DELETE FROM idempotency_records WHERE key = $1 AND response_status IS NULL")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(|e| IdempotencyError::StoreFailed(e.to_string()))?;
        Ok(())
    }
}

#[allow(dead_code)]
fn is_expired(created_at: DateTime<Utc>, ttl_hours: i64) -> bool {
    Utc::now() - created_at > ChronoDuration::hours(ttl_hours)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expiry_math_matches_the_default_ttl() {
        let created_at = Utc::now() - ChronoDuration::hours(DEFAULT_TTL_HOURS) - ChronoDuration::seconds(1);
        assert!(is_expired(created_at, DEFAULT_TTL_HOURS));
    }

    #[test]
    fn fresh_row_is_not_expired() {
        let created_at = Utc::now();
        assert!(!is_expired(created_at, DEFAULT_TTL_HOURS));
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn first_claim_on_an_absent_key_is_claimed(pool: PgPool) {
        let store = IdempotencyStore::new(pool);
        let outcome = store.claim("k1", "POST", "/gateway/deduct", "sha-a").await.unwrap();
        assert_eq!(outcome, Outcome::Claimed);
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn second_claim_on_a_reserved_matching_key_is_locked(pool: PgPool) {
        let store = IdempotencyStore::new(pool);
        store.claim("k1", "POST", "/gateway/deduct", "sha-a").await.unwrap();
        let outcome = store.claim("k1", "POST", "/gateway/deduct", "sha-a").await.unwrap();
        assert_eq!(outcome, Outcome::Locked);
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn second_claim_on_a_reserved_mismatched_key_is_conflict(pool: PgPool) {
        let store = IdempotencyStore::new(pool);
        store.claim("k1", "POST", "/gateway/deduct", "sha-a").await.unwrap();
        let outcome = store.claim("k1", "POST", "/gateway/deduct", "sha-b").await.unwrap();
        assert_eq!(outcome, Outcome::Conflict("key_reused_with_different_payload"));
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn completed_matching_key_replays_the_stored_response(pool: PgPool) {
        let store = IdempotencyStore::new(pool);
        store.claim("k1", "POST", "/gateway/deduct", "sha-a").await.unwrap();
        store
            .persist_response("k1", 200, &serde_json::json!({"ok": true, "new_balance": 95}))
            .await
            .unwrap();

        let outcome = store.claim("k1", "POST", "/gateway/deduct", "sha-a").await.unwrap();
        assert_eq!(
            outcome,
            Outcome::Replay(200, serde_json::json!({"ok": true, "new_balance": 95}))
        );
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn completed_mismatched_key_is_conflict(pool: PgPool) {
        let store = IdempotencyStore::new(pool);
        store.claim("k1", "POST", "/gateway/deduct", "sha-a").await.unwrap();
        store.persist_response("k1", 200, &serde_json::json!({"ok": true})).await.unwrap();

        let outcome = store.claim("k1", "POST", "/gateway/deduct", "sha-b").await.unwrap();
        assert_eq!(outcome, Outcome::Conflict("key_reused_with_different_payload"));
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn release_lets_a_retry_claim_again(pool: PgPool) {
        let store = IdempotencyStore::new(pool);
        store.claim("k1", "POST", "/gateway/deduct", "sha-a").await.unwrap();
        store.release("k1").await.unwrap();

        let outcome = store.claim("k1", "POST", "/gateway/deduct", "sha-a").await.unwrap();
        assert_eq!(outcome, Outcome::Claimed);
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn expired_reservation_is_evicted_and_reclaimed(pool: PgPool) {
        let store = IdempotencyStore::with_ttl_hours(pool.clone(), 24);
        let stale_created_at = Utc::now() - ChronoDuration::hours(24) - ChronoDuration::seconds(1);
        sqlx::query(
            "INSERT INTO idempotency_records (key, method, path, body_sha, created_at) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind("k1")
        .bind("POST")
        .bind("/gateway/deduct")
        .bind("sha-a")
        .bind(stale_created_at)
        .execute(&pool)
        .await
        .unwrap();

        // A fresh, differently-shaped request against the expired key claims
        // cleanly instead of observing a stale conflict.
        let outcome = store.claim("k1", "POST", "/gateway/deduct", "sha-b").await.unwrap();
        assert_eq!(outcome, Outcome::Claimed);
    }
}
