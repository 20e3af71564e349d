//! The curated error taxonomy returned to clients.
//!
//! No component in this workspace ever hands a client the store's native error
//! text. Every failure path converts into one of these `ErrorKind` values plus an
//! optional curated `reason`, via [`AsGatewayProblem`], with HTTP status left to
//! the caller — `flow402-gateway` owns the single `IntoResponse` impl that maps
//! a `GatewayProblem` onto a status code.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// The machine-readable `error` field of every error response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    // Validation (400)
    InvalidRequest,
    MissingIdempotencyKey,
    MissingVendorKey,
    // Auth (401)
    InvalidSignature,
    UnknownVendor,
    VendorMismatch,
    // Not found (404)
    UserNotFound,
    // Idempotency (409)
    IdempotencyConflict,
    RequestInProgress,
    // Ledger (409 / 500)
    RefClassMismatch,
    BalanceLookupFailed,
    MutationFailed,
    // Infrastructure (500)
    VendorLookupFailed,
    IdempotencyStoreFailed,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let json = serde_json::to_string(self).map_err(|_| std::fmt::Error)?;
        write!(f, "{}", json.trim_matches('"'))
    }
}

/// Sub-reasons for `ErrorKind::InvalidSignature`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatureReason {
    MissingSignatureHeader,
    InvalidSignatureFormat,
    TimestampOutOfWindow,
    MissingBodyHash,
    BodyHashMismatch,
    SignatureMismatch,
}

impl Display for SignatureReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let json = serde_json::to_string(self).map_err(|_| std::fmt::Error)?;
        write!(f, "{}", json.trim_matches('"'))
    }
}

/// A curated error, ready to serialize as `{ error, reason, request_id }`.
///
/// `details` is for server-side logs only; it is deliberately not part of
/// [`Serialize`] so a handler cannot accidentally leak the store's native
/// error text to a client.
#[derive(Debug, Clone)]
pub struct GatewayProblem {
    kind: ErrorKind,
    reason: Option<String>,
    details: String,
}

impl GatewayProblem {
    pub fn new(kind: ErrorKind, details: impl Into<String>) -> Self {
        Self {
            kind,
            reason: None,
            details: details.into(),
        }
    }

    pub fn with_reason(mut self, reason: impl Display) -> Self {
        self.reason = Some(reason.to_string());
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    pub fn details(&self) -> &str {
        &self.details
    }
}

/// Converts a component-local error into a curated [`GatewayProblem`].
pub trait AsGatewayProblem {
    fn as_gateway_problem(&self) -> GatewayProblem;
}
