//! Persisted entities.
//!
//! Every type here maps one-to-one onto a table created by the root crate's
//! `migrations/`. They are plain data — no I/O — so that `flow402-gateway`'s store
//! implementations can be the only place that knows these are Postgres rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A vendor project: one isolated tenant of the gateway.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Tenant {
    pub id: Uuid,
    pub slug: String,
    pub name: String,
    pub api_key: String,
    pub signing_secret: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A scoped identity of a caller within a tenant. Created lazily on first balance
/// reference; never deleted independently of its tenant.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct VendorUser {
    pub tenant_id: Uuid,
    pub user_id: Uuid,
    pub user_external_id: String,
    pub eth_address: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The current balance for one `(tenant_id, user_id)`. Invariant: `balance_credits
/// >= 0` at every committed state (enforced by a `CHECK` constraint and by the
/// ledger's conditional-update mutation, never by application-level locking).
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CreditBalance {
    pub tenant_id: Uuid,
    pub user_id: Uuid,
    pub balance_credits: i64,
    pub currency: String,
    pub updated_at: DateTime<Utc>,
}

impl CreditBalance {
    pub fn balance(&self) -> u64 {
        self.balance_credits.max(0) as u64
    }
}

/// The kind of balance mutation a [`JournalEntry`] records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JournalKind {
    /// A caller-initiated top-up.
    Topup,
    /// A vendor-initiated debit.
    Deduct,
    /// An operator-initiated balance reset to zero.
    ManualReset,
    /// A schema-legal correction not exposed by any endpoint today.
    Adjustment,
}

impl JournalKind {
    /// Whether this kind is one `credit` is permitted to write.
    pub fn is_credit_kind(&self) -> bool {
        matches!(self, JournalKind::Topup | JournalKind::Adjustment)
    }

    /// Whether this kind is the one `debit` is permitted to write.
    pub fn is_debit_kind(&self) -> bool {
        matches!(self, JournalKind::Deduct)
    }
}

/// An immutable, append-only audit record of one balance mutation.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct JournalEntry {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub user_id: Uuid,
    pub kind: JournalKind,
    pub amount_credits: i64,
    #[sqlx(rename = "ref")]
    pub ref_: String,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// An HTTP-layer idempotency reservation / response cache.
///
/// `response_status`/`response_body` are `None` while the row is "reserved" (a
/// request claimed the key but has not yet produced a persistable response).
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct IdempotencyRecord {
    pub key: String,
    pub method: String,
    pub path: String,
    pub body_sha: String,
    pub response_status: Option<i32>,
    pub response_body: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}
