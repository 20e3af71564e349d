//! Wire envelopes: the 402 paywall body and the plain success/error shapes.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::ErrorKind;

/// The 402 response body: price, currency, and a top-up URL the caller can
/// send its end user to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaywallEnvelope {
    pub price_credits: u64,
    pub currency: &'static str,
    pub topup_url: String,
}

impl PaywallEnvelope {
    pub fn new(price_credits: u64, user_id: Uuid) -> Self {
        Self {
            price_credits,
            currency: "USDC",
            topup_url: format!("/topup?need={price_credits}&user={user_id}"),
        }
    }
}

/// A successful debit response: `{ ok: true, new_balance }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeductOk {
    pub ok: bool,
    pub new_balance: u64,
}

impl DeductOk {
    pub fn new(new_balance: u64) -> Self {
        Self { ok: true, new_balance }
    }
}

/// A successful top-up response: `{ ok: true }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopupOk {
    pub ok: bool,
}

impl Default for TopupOk {
    fn default() -> Self {
        Self { ok: true }
    }
}

/// A successful reset response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResetOk {
    pub ok: bool,
    pub previous_balance_credits: u64,
    pub new_balance_credits: u64,
}

/// A balance read response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceOk {
    pub balance_credits: u64,
}

/// The curated error body: `{ ok: false, error, reason?, request_id? }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub ok: bool,
    pub error: ErrorKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<Uuid>,
}

impl ErrorBody {
    pub fn new(error: ErrorKind) -> Self {
        Self {
            ok: false,
            error,
            reason: None,
            request_id: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_request_id(mut self, request_id: Uuid) -> Self {
        self.request_id = Some(request_id);
        self
    }
}
