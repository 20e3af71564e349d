//! Signature verification for the gateway's signed write endpoints.
//!
//! Verifies the `x-f402-sig` (or legacy `x-flow402-signature`) header against the
//! raw request body and a per-tenant secret, binding both a timestamp window and a
//! body-hash check into one HMAC so neither replay nor body substitution goes
//! undetected.

use flow402_types::{SignatureReason, UnixTimestamp};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Maximum allowed `|now - t|`, in seconds. Configurable at startup.
pub const DEFAULT_SKEW_SECONDS: u64 = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    #[error("missing signature header")]
    MissingSignatureHeader,
    #[error("invalid signature header format")]
    InvalidSignatureFormat,
    #[error("timestamp outside the allowed skew window")]
    TimestampOutOfWindow,
    #[error("missing x-f402-body-sha header")]
    MissingBodyHash,
    #[error("body hash does not match x-f402-body-sha")]
    BodyHashMismatch,
    #[error("signature does not match")]
    SignatureMismatch,
}

impl SignatureError {
    pub fn reason(self) -> SignatureReason {
        match self {
            SignatureError::MissingSignatureHeader => SignatureReason::MissingSignatureHeader,
            SignatureError::InvalidSignatureFormat => SignatureReason::InvalidSignatureFormat,
            SignatureError::TimestampOutOfWindow => SignatureReason::TimestampOutOfWindow,
            SignatureError::MissingBodyHash => SignatureReason::MissingBodyHash,
            SignatureError::BodyHashMismatch => SignatureReason::BodyHashMismatch,
            SignatureError::SignatureMismatch => SignatureReason::SignatureMismatch,
        }
    }
}

/// The `t=…,v1=…` pairs extracted from a signature header.
struct SignaturePairs {
    t: UnixTimestamp,
    v1: String,
}

/// Parses `t=<unix_seconds>,v1=<hex>` tolerating extra pairs, any pair order, and
/// whitespace around commas.
fn parse_signature_header(value: &str) -> Result<SignaturePairs, SignatureError> {
    let mut t = None;
    let mut v1 = None;
    for pair in value.split(',') {
        let pair = pair.trim();
        if pair.is_empty() {
            continue;
        }
        let (k, v) = pair.split_once('=').ok_or(SignatureError::InvalidSignatureFormat)?;
        match k.trim() {
            "t" => t = Some(v.trim()),
            "v1" => v1 = Some(v.trim()),
            _ => {}
        }
    }
    let t = t
        .ok_or(SignatureError::InvalidSignatureFormat)?
        .parse::<UnixTimestamp>()
        .map_err(|_| SignatureError::InvalidSignatureFormat)?;
    let v1 = v1.ok_or(SignatureError::InvalidSignatureFormat)?;
    if v1.is_empty() || !v1.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(SignatureError::InvalidSignatureFormat);
    }
    Ok(SignaturePairs { t, v1: v1.to_lowercase() })
}

/// Computes `SHA256(body)` as lowercase hex.
pub fn body_sha256_hex(body: &[u8]) -> String {
    hex::encode(Sha256::digest(body))
}

/// Computes `HMAC_SHA256(secret, "{t}.{body}")` as lowercase hex.
fn compute_hmac_hex(secret: &str, t: UnixTimestamp, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(t.to_string().as_bytes());
    mac.update(b".");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Verifies a request's `x-f402-sig`/legacy header, `x-f402-body-sha` header, and
/// body against `secret`. Returns the parsed timestamp on success.
///
/// `signature_header` is the value of whichever of `x-f402-sig` /
/// `x-flow402-signature` was present (the former preferred; the latter accepted
/// as a back-compat alias).
pub fn verify(
    signature_header: Option<&str>,
    body_sha_header: Option<&str>,
    body: &[u8],
    secret: &str,
    now: u64,
    skew_seconds: u64,
) -> Result<u64, SignatureError> {
    let header = signature_header.ok_or(SignatureError::MissingSignatureHeader)?;
    let pairs = parse_signature_header(header)?;
    let now = UnixTimestamp::from_secs(now);

    if now.abs_diff(pairs.t) > skew_seconds {
        return Err(SignatureError::TimestampOutOfWindow);
    }

    let claimed_body_sha = body_sha_header.ok_or(SignatureError::MissingBodyHash)?;
    let actual_body_sha = body_sha256_hex(body);
    if claimed_body_sha.to_lowercase() != actual_body_sha {
        return Err(SignatureError::BodyHashMismatch);
    }

    let expected_hex = compute_hmac_hex(secret, pairs.t, body);
    let expected_bytes = hex::decode(&expected_hex).expect("hex::encode output is valid hex");
    let actual_bytes = hex::decode(&pairs.v1).map_err(|_| SignatureError::InvalidSignatureFormat)?;
    if expected_bytes.len() != actual_bytes.len()
        || expected_bytes.ct_eq(&actual_bytes).unwrap_u8() != 1
    {
        return Err(SignatureError::SignatureMismatch);
    }

    Ok(pairs.t.as_secs())
}

/// Signs `body` the way a vendor caller (or an outbound paywall response) would,
/// producing the `x-f402-sig` header value. Used by tests and by C5 when emitting
/// an outbound-signed 402 envelope.
pub fn sign(secret: &str, t: u64, body: &[u8]) -> String {
    let t = UnixTimestamp::from_secs(t);
    format!("t={t},v1={}", compute_hmac_hex(secret, t, body))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "demo-signing-secret";

    #[test]
    fn known_good_signed_debit_vector() {
        let body = br#"{"amount_credits":5,"ref":"demo-ref","userId":"9c0383a1-0887-4c0f-98ca-cb71ffc4e76c"}"#;
        let t = 1729200000u64;
        let body_sha = body_sha256_hex(body);
        assert_eq!(
            body_sha,
            "5a159b6e835fc4d107d0ffd630fe705c1a86c00ebf7d5dad7179ad912d249129"
        );
        let v1 = compute_hmac_hex(SECRET, UnixTimestamp::from_secs(t), body);
        assert_eq!(v1, "6f65904bd1173ac13d5a79d2c038d7db7908513bf50e41509d964ff2ac924ac5");

        let sig_header = format!("t={t},v1={v1}");
        let result = verify(Some(&sig_header), Some(&body_sha), body, SECRET, t, DEFAULT_SKEW_SECONDS);
        assert_eq!(result, Ok(t));

        let expired = verify(
            Some(&sig_header),
            Some(&body_sha),
            body,
            SECRET,
            t + 301,
            DEFAULT_SKEW_SECONDS,
        );
        assert_eq!(expired, Err(SignatureError::TimestampOutOfWindow));
    }

    #[test]
    fn rejects_timestamp_outside_window() {
        let body = b"{}";
        let t = 1729200000u64;
        let body_sha = body_sha256_hex(body);
        let sig_header = sign(SECRET, t, body);
        let result = verify(
            Some(&sig_header),
            Some(&body_sha),
            body,
            SECRET,
            t + 301,
            DEFAULT_SKEW_SECONDS,
        );
        assert_eq!(result, Err(SignatureError::TimestampOutOfWindow));
    }

    #[test]
    fn rejects_tampered_body() {
        let body = b"{\"a\":1}";
        let tampered = b"{\"a\":2}";
        let t = 1729200000u64;
        let body_sha = body_sha256_hex(body);
        let sig_header = sign(SECRET, t, body);
        let result = verify(Some(&sig_header), Some(&body_sha), tampered, SECRET, t, DEFAULT_SKEW_SECONDS);
        assert_eq!(result, Err(SignatureError::BodyHashMismatch));
    }

    #[test]
    fn rejects_wrong_secret() {
        let body = b"{}";
        let t = 1729200000u64;
        let body_sha = body_sha256_hex(body);
        let sig_header = sign(SECRET, t, body);
        let result = verify(Some(&sig_header), Some(&body_sha), body, "wrong-secret", t, DEFAULT_SKEW_SECONDS);
        assert_eq!(result, Err(SignatureError::SignatureMismatch));
    }

    #[test]
    fn rejects_missing_header() {
        let result = verify(None, Some("abc"), b"{}", SECRET, 0, DEFAULT_SKEW_SECONDS);
        assert_eq!(result, Err(SignatureError::MissingSignatureHeader));
    }

    #[test]
    fn tolerates_whitespace_and_extra_pairs() {
        let body = b"{}";
        let t = 1000u64;
        let digest = compute_hmac_hex(SECRET, UnixTimestamp::from_secs(t), body);
        let header = format!("x=ignored, t = {t} , v1 = {digest}");
        let body_sha = body_sha256_hex(body);
        let result = verify(Some(&header), Some(&body_sha), body, SECRET, t, DEFAULT_SKEW_SECONDS);
        assert!(result.is_ok());
    }
}
