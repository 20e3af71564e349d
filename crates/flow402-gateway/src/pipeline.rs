//! The `POST /gateway/deduct` orchestration.
//!
//! Chains vendor-key lookup, tenant scoping, signature verification, and the
//! idempotency lane through to the ledger debit, in a fixed ten-step sequence
//! that short-circuits on the first failure. Each step that can fail returns a
//! [`PipelineOutcome`] rather than throwing, so `handlers.rs` never has to
//! distinguish "the ledger said no" from "the store fell over" by string
//! matching.

use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use flow402_types::{DeductOk, DeductRequest, ErrorBody, JournalKind, PaywallEnvelope};

use crate::error::GatewayError;
use crate::idempotency::Outcome as IdempotencyOutcome;
use crate::ledger::LedgerError;
use crate::signature;
use crate::state::AppState;

/// What the HTTP layer should do with a completed pipeline run.
#[derive(Debug)]
pub enum PipelineOutcome {
    /// Persist `body` at `status` in the idempotency store, then respond with the same.
    Respond { status: u16, body: serde_json::Value },
    /// Respond with `body`/`status` WITHOUT persisting (idempotency `Locked`).
    RespondWithoutPersisting { status: u16, body: serde_json::Value },
    /// The claim itself failed; nothing to release, nothing to persist.
    Rejected { status: u16, body: serde_json::Value },
}

/// Runs the full deduct pipeline. `vendor_key` is the raw `x-f402-key` header
/// value; `signature_header`/`body_sha_header` are the raw HMAC headers;
/// `idempotency_key` is the raw `Idempotency-Key` header; `body` is the exact,
/// unmodified request body bytes.
#[allow(clippy::too_many_arguments)]
pub async fn run_deduct(
    state: &AppState,
    vendor_key: Option<&str>,
    idempotency_key: Option<&str>,
    signature_header: Option<&str>,
    body_sha_header: Option<&str>,
    path: &str,
    body: &[u8],
) -> Result<PipelineOutcome, GatewayError> {
    let request_id = Uuid::new_v4();

    // Step 1: vendor key required.
    let vendor_key = vendor_key
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .ok_or(GatewayError::MissingVendorKey)?;

    // Step 2: idempotency key required.
    let idempotency_key = idempotency_key
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .ok_or(GatewayError::MissingIdempotencyKey)?;

    // Step 3: resolve tenant, enforce the process's configured scope.
    let tenant = state.tenant_registry.resolve(vendor_key).await?;
    if tenant.id != state.scoped_tenant_id {
        return Err(GatewayError::VendorMismatch);
    }

    // Step 4: verify signature.
    let now = Utc::now().timestamp().max(0) as u64;
    signature::verify(
        signature_header,
        body_sha_header,
        body,
        &tenant.signing_secret,
        now,
        state.signature_skew_seconds,
    )?;

    // Step 5: parse and validate body. A parse/validation failure here is still
    // persisted below so retries replay the same 400 instead of re-running the
    // pipeline.
    let parsed: Result<DeductRequest, String> = serde_json::from_slice::<DeductRequest>(body)
        .map_err(|e| e.to_string())
        .and_then(|req| {
            req.validate()
                .map(|_| req)
                .map_err(|e| e.to_string())
        });

    let method = "POST";
    let body_sha = signature::body_sha256_hex(body);

    // Step 6: claim idempotency.
    let claim = state
        .idempotency_store
        .claim(idempotency_key, method, path, &body_sha)
        .await?;

    match claim {
        IdempotencyOutcome::Replay(status, stored_body) => {
            return Ok(PipelineOutcome::RespondWithoutPersisting {
                status: status as u16,
                body: stored_body,
            });
        }
        IdempotencyOutcome::Locked => {
            return Ok(PipelineOutcome::Rejected {
                status: 409,
                body: json!(ErrorBody::new(flow402_types::ErrorKind::RequestInProgress)),
            });
        }
        IdempotencyOutcome::Conflict(reason) => {
            return Ok(PipelineOutcome::Rejected {
                status: 409,
                body: json!(
                    ErrorBody::new(flow402_types::ErrorKind::IdempotencyConflict).with_reason(reason)
                ),
            });
        }
        IdempotencyOutcome::Claimed => {}
    }

    let parsed = match parsed {
        Ok(req) => req,
        Err(details) => {
            let body = json!(
                ErrorBody::new(flow402_types::ErrorKind::InvalidRequest)
                    .with_reason(details)
                    .with_request_id(request_id)
            );
            state.idempotency_store.persist_response(idempotency_key, 400, &body).await?;
            return Ok(PipelineOutcome::Respond { status: 400, body });
        }
    };

    // Step 7: pre-flight balance check (an optimization; the debit's own
    // conditional update below is the authoritative atomic check). A user
    // never referenced by a mutation has an implicit balance of 0.
    let current_balance = state.ledger.balance(tenant.id, parsed.user_id).await?.unwrap_or(0);
    if current_balance < parsed.amount_credits.get() {
        let envelope = PaywallEnvelope::new(parsed.amount_credits.get(), parsed.user_id);
        let body = json!(envelope);
        state.idempotency_store.persist_response(idempotency_key, 402, &body).await?;
        return Ok(PipelineOutcome::Respond { status: 402, body });
    }

    // Step 8: debit.
    let metadata = json!({});
    match state
        .ledger
        .debit(tenant.id, parsed.user_id, parsed.amount_credits, parsed.ref_.clone(), metadata)
        .await
    {
        Ok(new_balance) => {
            // Step 9: success.
            let body = json!(DeductOk::new(new_balance));
            state.idempotency_store.persist_response(idempotency_key, 200, &body).await?;
            Ok(PipelineOutcome::Respond { status: 200, body })
        }
        Err(LedgerError::InsufficientFunds) => {
            let envelope = PaywallEnvelope::new(parsed.amount_credits.get(), parsed.user_id);
            let body = json!(envelope);
            state.idempotency_store.persist_response(idempotency_key, 402, &body).await?;
            Ok(PipelineOutcome::Respond { status: 402, body })
        }
        Err(other) => {
            // Step 10: no ledger effect occurred, safe to release the reservation.
            let _ = state.idempotency_store.release(idempotency_key).await;
            Err(GatewayError::Ledger(other))
        }
    }
}

#[allow(dead_code)]
fn journal_kind_label(kind: JournalKind) -> &'static str {
    match kind {
        JournalKind::Topup => "topup",
        JournalKind::Deduct => "deduct",
        JournalKind::ManualReset => "manual_reset",
        JournalKind::Adjustment => "adjustment",
    }
}
