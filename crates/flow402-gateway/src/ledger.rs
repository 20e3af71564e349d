//! Credit/debit engine backing per-tenant-per-user balances.
//!
//! `credit` and `debit` are each one transaction: the ref-level idempotency check,
//! the balance mutation, and the journal insert all commit or abort together. No
//! application-level lock is held across an I/O suspension point — the store's own
//! row-level atomicity (the conditional `UPDATE ... WHERE balance_credits >= $amount`
//! for debit, and the `(tenant_id, ref)` unique index for both) is what serializes
//! concurrent callers.

use rand::RngCore;
use serde_json::Value as Json;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use flow402_types::{Credits, JournalKind};

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("ref must not be empty")]
    RefRequired,
    #[error("ref already used with a different journal kind")]
    RefClassMismatch,
    #[error("balance is insufficient for this debit")]
    InsufficientFunds,
    #[error("failed to read balance: {0}")]
    BalanceLookupFailed(String),
    #[error("failed to commit ledger mutation: {0}")]
    MutationFailed(String),
}

/// Generates a ref for a caller that omitted one: `topup_<random-hex>`.
fn generate_topup_ref() -> String {
    let mut bytes = [0u8; 8];
    rand::rng().fill_bytes(&mut bytes);
    format!("topup_{}", hex::encode(bytes))
}

struct ExistingRef {
    kind: JournalKind,
    balance_credits: i64,
}

async fn find_existing_ref(
    tx: &mut Transaction<'_, Postgres>,
    tenant: Uuid,
    user: Uuid,
    ref_: &str,
) -> Result<Option<ExistingRef>, LedgerError> {
    let row: Option<(JournalKind,)> =
        sqlx::query_as("SELECT kind FROM journal_entries WHERE tenant_id = $1 AND ref = $2")
            .bind(tenant)
            .bind(ref_)
            .fetch_optional(&mut **tx)
            .await
            .map_err(|e| LedgerError::MutationFailed(e.to_string()))?;

    let Some((kind,)) = row else {
        return Ok(None);
    };

    let balance: (i64,) = sqlx::query_as(
        "SELECT balance_credits FROM credit_balances WHERE tenant_id = $1 AND user_id = $2",
    )
    .bind(tenant)
    .bind(user)
    .fetch_optional(&mut **tx)
    .await
    .map_err(|e| LedgerError::BalanceLookupFailed(e.to_string()))?
    .unwrap_or((0,));

    Ok(Some(ExistingRef {
        kind,
        balance_credits: balance.0,
    }))
}

async fn ensure_vendor_user(
    tx: &mut Transaction<'_, Postgres>,
    tenant: Uuid,
    user: Uuid,
) -> Result<(), LedgerError> {
    sqlx::query(
        "INSERT INTO vendor_users (tenant_id, user_id, user_external_id) \
         VALUES ($1, $2, $2::text) ON CONFLICT (tenant_id, user_id) DO NOTHING",
    )
    .bind(tenant)
    .bind(user)
    .execute(&mut **tx)
    .await
    .map_err(|e| LedgerError::MutationFailed(e.to_string()))?;
    sqlx::query(
        "INSERT INTO credit_balances (tenant_id, user_id, balance_credits, currency) \
         VALUES ($1, $2, 0, 'USDC') ON CONFLICT (tenant_id, user_id) DO NOTHING",
    )
    .bind(tenant)
    .bind(user)
    .execute(&mut **tx)
    .await
    .map_err(|e| LedgerError::MutationFailed(e.to_string()))?;
    Ok(())
}

/// Atomic credit/debit mutations against `(tenant_id, user_id)` balances, with an
/// append-only journal.
#[derive(Clone)]
pub struct LedgerEngine {
    pool: PgPool,
}

impl LedgerEngine {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// `credit(tenant, user, amount, kind, ref, metadata) -> new_balance`.
    ///
    /// `kind` must be a credit kind (`topup` or `adjustment`); the caller decides
    /// which, this engine only enforces the split. `adjustment` is schema-legal
    /// but not wired to any HTTP endpoint in this build.
    #[tracing::instrument(skip(self, metadata, ref_))]
    pub async fn credit(
        &self,
        tenant: Uuid,
        user: Uuid,
        amount: Credits,
        kind: JournalKind,
        ref_: Option<String>,
        metadata: Json,
    ) -> Result<u64, LedgerError> {
        debug_assert!(kind.is_credit_kind());
        let ref_ = match ref_ {
            Some(r) if !r.trim().is_empty() => r,
            _ => generate_topup_ref(),
        };

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| LedgerError::MutationFailed(e.to_string()))?;

        if let Some(existing) = find_existing_ref(&mut tx, tenant, user, &ref_).await? {
            if existing.kind.is_credit_kind() {
                tx.commit().await.map_err(|e| LedgerError::MutationFailed(e.to_string()))?;
                return Ok(existing.balance_credits.max(0) as u64);
            }
            return Err(LedgerError::RefClassMismatch);
        }

        ensure_vendor_user(&mut tx, tenant, user).await?;

        let amount_i64: i64 = amount.into();
        let (new_balance,): (i64,) = sqlx::query_as(
            "UPDATE credit_balances SET balance_credits = balance_credits + $3, updated_at = now() \
             WHERE tenant_id = $1 AND user_id = $2 RETURNING balance_credits",
        )
        .bind(tenant)
        .bind(user)
        .bind(amount_i64)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| LedgerError::MutationFailed(e.to_string()))?;

        sqlx::query(
            "INSERT INTO journal_entries (id, tenant_id, user_id, kind, amount_credits, ref, metadata) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(Uuid::new_v4())
        .bind(tenant)
        .bind(user)
        .bind(kind)
        .bind(amount_i64)
        .bind(&ref_)
        .bind(metadata)
        .execute(&mut *tx)
        .await
        .map_err(|e| LedgerError::MutationFailed(e.to_string()))?;

        tx.commit().await.map_err(|e| LedgerError::MutationFailed(e.to_string()))?;
        Ok(new_balance.max(0) as u64)
    }

    /// `debit(tenant, user, amount, ref, metadata) -> new_balance` or
    /// `InsufficientFunds`.
    #[tracing::instrument(skip(self, metadata))]
    pub async fn debit(
        &self,
        tenant: Uuid,
        user: Uuid,
        amount: Credits,
        ref_: String,
        metadata: Json,
    ) -> Result<u64, LedgerError> {
        if ref_.trim().is_empty() {
            return Err(LedgerError::RefRequired);
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| LedgerError::MutationFailed(e.to_string()))?;

        if let Some(existing) = find_existing_ref(&mut tx, tenant, user, &ref_).await? {
            if existing.kind.is_debit_kind() {
                tx.commit().await.map_err(|e| LedgerError::MutationFailed(e.to_string()))?;
                return Ok(existing.balance_credits.max(0) as u64);
            }
            return Err(LedgerError::RefClassMismatch);
        }

        ensure_vendor_user(&mut tx, tenant, user).await?;

        let amount_i64: i64 = amount.into();
        let updated: Option<(i64,)> = sqlx::query_as(
            "UPDATE credit_balances SET balance_credits = balance_credits - $3, updated_at = now() \
             WHERE tenant_id = $1 AND user_id = $2 AND balance_credits >= $3 \
             RETURNING balance_credits",
        )
        .bind(tenant)
        .bind(user)
        .bind(amount_i64)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| LedgerError::MutationFailed(e.to_string()))?;

        let Some((new_balance,)) = updated else {
            // No rows matched: balance was insufficient. Roll back — no journal
            // entry is ever written for a failed debit.
            tx.rollback().await.map_err(|e| LedgerError::MutationFailed(e.to_string()))?;
            return Err(LedgerError::InsufficientFunds);
        };

        sqlx::query(
            "INSERT INTO journal_entries (id, tenant_id, user_id, kind, amount_credits, ref, metadata) \
             VALUES ($1, $2, $3, 'deduct', $4, $5, $6)",
        )
        .bind(Uuid::new_v4())
        .bind(tenant)
        .bind(user)
        .bind(amount_i64)
        .bind(&ref_)
        .bind(metadata)
        .execute(&mut *tx)
        .await
        .map_err(|e| LedgerError::MutationFailed(e.to_string()))?;

        tx.commit().await.map_err(|e| LedgerError::MutationFailed(e.to_string()))?;
        Ok(new_balance.max(0) as u64)
    }

    /// Reads the current balance for `(tenant, user)`, `None` if the user has
    /// never been referenced by a mutation (no `CreditBalance` row exists yet).
    #[tracing::instrument(skip(self))]
    pub async fn balance(&self, tenant: Uuid, user: Uuid) -> Result<Option<u64>, LedgerError> {
        let row: Option<(i64,)> = sqlx::query_as(
            "SELECT balance_credits FROM credit_balances WHERE tenant_id = $1 AND user_id = $2",
        )
        .bind(tenant)
        .bind(user)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| LedgerError::BalanceLookupFailed(e.to_string()))?;
        Ok(row.map(|(b,)| b.max(0) as u64))
    }

    /// Zeroes a balance and writes a `manual_reset` journal entry recording the
    /// prior balance.
    #[tracing::instrument(skip(self))]
    pub async fn reset(&self, tenant: Uuid, user: Uuid) -> Result<(u64, u64), LedgerError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| LedgerError::MutationFailed(e.to_string()))?;

        ensure_vendor_user(&mut tx, tenant, user).await?;

        let (previous,): (i64,) = sqlx::query_as(
            "SELECT balance_credits FROM credit_balances WHERE tenant_id = $1 AND user_id = $2 FOR UPDATE",
        )
        .bind(tenant)
        .bind(user)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| LedgerError::BalanceLookupFailed(e.to_string()))?;

        sqlx::query(
            "UPDATE credit_balances SET balance_credits = 0, updated_at = now() \
             WHERE tenant_id = $1 AND user_id = $2",
        )
        .bind(tenant)
        .bind(user)
        .execute(&mut *tx)
        .await
        .map_err(|e| LedgerError::MutationFailed(e.to_string()))?;

        let previous = previous.max(0) as u64;
        if previous > 0 {
            let ref_ = format!("manual_reset_{}", chrono::Utc::now().timestamp_millis());
            sqlx::query(
                "INSERT INTO journal_entries (id, tenant_id, user_id, kind, amount_credits, ref, metadata) \
                 VALUES ($1, $2, $3, 'manual_reset', $4, $5, '{}'::jsonb)",
            )
            .bind(Uuid::new_v4())
            .bind(tenant)
            .bind(user)
            .bind(previous as i64)
            .bind(&ref_)
            .execute(&mut *tx)
            .await
            .map_err(|e| LedgerError::MutationFailed(e.to_string()))?;
        }

        tx.commit().await.map_err(|e| LedgerError::MutationFailed(e.to_string()))?;
        Ok((previous, 0))
    }
}
