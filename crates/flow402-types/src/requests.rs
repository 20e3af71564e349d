//! Request bodies for the write endpoints.
//!
//! Field casing is mixed on purpose: `userId` is camelCase, `ref` and
//! `amount_credits` are not. This is a property of the wire format, not an
//! inconsistency to "fix" — downstream vendor integrations already depend on it.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::money::Credits;

/// Minimum length of a caller-supplied `ref`.
pub const MIN_REF_LEN: usize = 6;

/// `POST /gateway/deduct` body.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DeductRequest {
    #[serde(rename = "userId")]
    pub user_id: Uuid,
    #[serde(rename = "ref")]
    pub ref_: String,
    pub amount_credits: Credits,
}

/// Reasons [`DeductRequest::validate`] can reject a parsed body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DeductRequestError {
    #[error("ref must be at least {MIN_REF_LEN} characters")]
    RefTooShort,
}

impl DeductRequest {
    /// Validates the fields that JSON deserialization alone cannot enforce
    /// (`amount_credits > 0` is already enforced by [`Credits`]'s `Deserialize`).
    pub fn validate(&self) -> Result<(), DeductRequestError> {
        if self.ref_.trim().len() < MIN_REF_LEN {
            return Err(DeductRequestError::RefTooShort);
        }
        Ok(())
    }
}

/// `POST /topup/mock` body.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TopupRequest {
    #[serde(rename = "userId")]
    pub user_id: Uuid,
    pub amount_credits: Credits,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deduct_request_parses_spec_wire_shape() {
        let json = r#"{"amount_credits":5,"ref":"demo-ref","userId":"9c0383a1-0887-4c0f-98ca-cb71ffc4e76c"}"#;
        let req: DeductRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.ref_, "demo-ref");
        assert_eq!(req.amount_credits.get(), 5);
        assert!(req.validate().is_ok());
    }

    #[test]
    fn deduct_request_rejects_short_ref() {
        let req = DeductRequest {
            user_id: Uuid::nil(),
            ref_: "abc".to_string(),
            amount_credits: Credits::new(1).unwrap(),
        };
        assert_eq!(req.validate(), Err(DeductRequestError::RefTooShort));
    }

    #[test]
    fn deduct_request_rejects_non_positive_amount() {
        let json = r#"{"amount_credits":0,"ref":"demo-ref","userId":"9c0383a1-0887-4c0f-98ca-cb71ffc4e76c"}"#;
        assert!(serde_json::from_str::<DeductRequest>(json).is_err());
    }
}
