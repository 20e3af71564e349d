//! The Flow402 gateway: signature verification, tenant resolution, the
//! idempotency lane, and the ledger engine, wired together into an Axum router.
//!
//! # Modules
//!
//! - [`signature`] — C1, HMAC verification over `t=…,v1=…` headers.
//! - [`tenant_registry`] — C2, vendor credential -> `(tenant_id, signing_secret)`.
//! - [`idempotency`] — C3, the `Idempotency-Key` claim/replay/conflict lane.
//! - [`ledger`] — C4, atomic credit/debit against `(tenant, user)` balances.
//! - [`pipeline`] — C5, the `/gateway/deduct` orchestration.
//! - [`topup`] — C6, the operator-facing top-up/reset endpoints.
//! - [`handlers`] — the Axum routes binding the above to HTTP.
//! - [`state`] — the shared, cloneable `AppState` injected into every handler.
//! - [`error`] — the per-component errors unified into one curated taxonomy.
//! - [`util`] — process-level helpers (graceful shutdown).

pub mod error;
pub mod handlers;
pub mod idempotency;
pub mod ledger;
pub mod pipeline;
pub mod signature;
pub mod state;
pub mod tenant_registry;
pub mod topup;
pub mod util;

pub use error::GatewayError;
pub use handlers::routes;
pub use state::AppState;
