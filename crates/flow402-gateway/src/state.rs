//! Shared application state, injected into handlers via axum's `State` extractor.

use sqlx::PgPool;
use uuid::Uuid;

use crate::idempotency::IdempotencyStore;
use crate::ledger::LedgerEngine;
use crate::signature::DEFAULT_SKEW_SECONDS;
use crate::tenant_registry::TenantRegistry;

#[derive(Clone)]
pub struct AppState {
    pub tenant_registry: TenantRegistry,
    pub idempotency_store: IdempotencyStore,
    pub ledger: LedgerEngine,
    /// The one tenant this process is authorized to serve.
    pub scoped_tenant_id: Uuid,
    pub signature_skew_seconds: u64,
}

impl AppState {
    pub fn new(pool: PgPool, scoped_tenant_id: Uuid) -> Self {
        Self {
            tenant_registry: TenantRegistry::new(pool.clone()),
            idempotency_store: IdempotencyStore::new(pool.clone()),
            ledger: LedgerEngine::new(pool),
            scoped_tenant_id,
            signature_skew_seconds: DEFAULT_SKEW_SECONDS,
        }
    }

    pub fn with_signature_skew_seconds(mut self, skew: u64) -> Self {
        self.signature_skew_seconds = skew;
        self
    }

    pub fn with_idempotency_store(mut self, store: IdempotencyStore) -> Self {
        self.idempotency_store = store;
        self
    }
}
