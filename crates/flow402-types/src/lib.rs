//! Pure data types shared by the Flow402 gateway: persisted entities, wire
//! envelopes, request bodies, and the curated error taxonomy.
//!
//! Nothing in this crate performs I/O — the store and handler logic that uses
//! these types lives entirely in `flow402-gateway`.

pub mod envelope;
pub mod errors;
pub mod model;
pub mod money;
pub mod requests;
pub mod timestamp;

pub use envelope::{BalanceOk, DeductOk, ErrorBody, PaywallEnvelope, ResetOk, TopupOk};
pub use errors::{AsGatewayProblem, ErrorKind, GatewayProblem, SignatureReason};
pub use model::{CreditBalance, IdempotencyRecord, JournalEntry, JournalKind, Tenant, VendorUser};
pub use money::{AmountMustBePositive, Credits};
pub use requests::{DeductRequest, DeductRequestError, TopupRequest, MIN_REF_LEN};
pub use timestamp::UnixTimestamp;
