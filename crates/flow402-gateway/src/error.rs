//! Unifies every component error into the curated taxonomy: components stay
//! free to define their own `thiserror` enums, and this is the single place
//! that decides what a client is allowed to see.

use flow402_types::{AsGatewayProblem, ErrorKind, GatewayProblem};

use crate::idempotency::IdempotencyError;
use crate::ledger::LedgerError;
use crate::signature::SignatureError;
use crate::tenant_registry::TenantLookupError;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("missing x-f402-key header")]
    MissingVendorKey,
    #[error("missing or blank Idempotency-Key header")]
    MissingIdempotencyKey,
    #[error("request body failed validation: {0}")]
    InvalidRequest(String),
    #[error(transparent)]
    Signature(#[from] SignatureError),
    #[error(transparent)]
    TenantLookup(#[from] TenantLookupError),
    #[error("resolved tenant does not match this process's configured scope")]
    VendorMismatch,
    #[error(transparent)]
    Idempotency(#[from] IdempotencyError),
    #[error("idempotency key is reserved by another in-flight request")]
    RequestInProgress,
    #[error("idempotency key already used with a different request")]
    IdempotencyConflict(&'static str),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl AsGatewayProblem for GatewayError {
    fn as_gateway_problem(&self) -> GatewayProblem {
        match self {
            GatewayError::MissingVendorKey => {
                GatewayProblem::new(ErrorKind::MissingVendorKey, self.to_string())
            }
            GatewayError::MissingIdempotencyKey => {
                GatewayProblem::new(ErrorKind::MissingIdempotencyKey, self.to_string())
            }
            GatewayError::InvalidRequest(details) => {
                GatewayProblem::new(ErrorKind::InvalidRequest, details.clone())
            }
            GatewayError::Signature(e) => GatewayProblem::new(ErrorKind::InvalidSignature, e.to_string())
                .with_reason(e.reason()),
            GatewayError::TenantLookup(e) => match e {
                TenantLookupError::ValidationError => {
                    GatewayProblem::new(ErrorKind::InvalidRequest, e.to_string())
                }
                TenantLookupError::VendorNotFound => {
                    GatewayProblem::new(ErrorKind::UnknownVendor, e.to_string())
                }
                TenantLookupError::VendorLookupFailed(_) => {
                    GatewayProblem::new(ErrorKind::VendorLookupFailed, e.to_string())
                }
            },
            GatewayError::VendorMismatch => {
                GatewayProblem::new(ErrorKind::VendorMismatch, self.to_string())
            }
            GatewayError::Idempotency(e) => {
                GatewayProblem::new(ErrorKind::IdempotencyStoreFailed, e.to_string())
            }
            GatewayError::RequestInProgress => {
                GatewayProblem::new(ErrorKind::RequestInProgress, self.to_string())
            }
            GatewayError::IdempotencyConflict(reason) => {
                GatewayProblem::new(ErrorKind::IdempotencyConflict, self.to_string()).with_reason(*reason)
            }
            GatewayError::Ledger(e) => match e {
                LedgerError::RefRequired | LedgerError::RefClassMismatch => {
                    GatewayProblem::new(ErrorKind::RefClassMismatch, e.to_string())
                }
                LedgerError::InsufficientFunds => {
                    // Handled upstream as a 402 paywall, never rendered through
                    // this path, but kept total for completeness.
                    GatewayProblem::new(ErrorKind::MutationFailed, e.to_string())
                }
                LedgerError::BalanceLookupFailed(_) => {
                    GatewayProblem::new(ErrorKind::BalanceLookupFailed, e.to_string())
                }
                LedgerError::MutationFailed(_) => {
                    GatewayProblem::new(ErrorKind::MutationFailed, e.to_string())
                }
            },
        }
    }
}
