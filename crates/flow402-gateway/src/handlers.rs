//! HTTP endpoints exposed by the Flow402 gateway.
//!
//! Routes are assembled in one `routes()` function, each handler is thin and
//! delegates to a component module, and error conversion to an HTTP response
//! is centralized in one `IntoResponse` impl rather than scattered across
//! handlers.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tracing::instrument;
use uuid::Uuid;

use flow402_types::{AsGatewayProblem, BalanceOk, ErrorBody, ErrorKind};

use crate::error::GatewayError;
use crate::pipeline::{self, PipelineOutcome};
use crate::state::AppState;
use crate::topup;

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/", get(get_root))
        .route("/gateway/deduct", post(post_deduct))
        .route("/topup/mock", post(post_topup))
        .route("/topup/reset", post(post_reset))
        .route("/balance", get(get_balance))
        .with_state(state)
}

#[instrument(skip_all)]
pub async fn get_root() -> impl IntoResponse {
    (StatusCode::OK, format!("Hello from {}!", env!("CARGO_PKG_NAME")))
}

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::InvalidRequest | ErrorKind::MissingIdempotencyKey | ErrorKind::MissingVendorKey => {
            StatusCode::BAD_REQUEST
        }
        ErrorKind::InvalidSignature | ErrorKind::UnknownVendor | ErrorKind::VendorMismatch => {
            StatusCode::UNAUTHORIZED
        }
        ErrorKind::UserNotFound => StatusCode::NOT_FOUND,
        ErrorKind::IdempotencyConflict
        | ErrorKind::RequestInProgress
        | ErrorKind::RefClassMismatch => StatusCode::CONFLICT,
        ErrorKind::BalanceLookupFailed
        | ErrorKind::MutationFailed
        | ErrorKind::VendorLookupFailed
        | ErrorKind::IdempotencyStoreFailed => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let problem = self.as_gateway_problem();
        tracing::warn!(kind = ?problem.kind(), details = problem.details(), "gateway request failed");
        let status = status_for(problem.kind());
        let request_id = Uuid::new_v4();
        let mut body = ErrorBody::new(problem.kind()).with_request_id(request_id);
        if let Some(reason) = problem.reason() {
            body = body.with_reason(reason);
        }
        (status, Json(body)).into_response()
    }
}

fn outcome_into_response(outcome: PipelineOutcome) -> Response {
    match outcome {
        PipelineOutcome::Respond { status, body }
        | PipelineOutcome::RespondWithoutPersisting { status, body }
        | PipelineOutcome::Rejected { status, body } => {
            let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (status, Json(body)).into_response()
        }
    }
}

/// `POST /gateway/deduct`.
#[instrument(skip_all)]
pub async fn post_deduct(
    State(state): State<AppState>,
    headers: axum::http::HeaderMap,
    body: axum::body::Bytes,
) -> Response {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
    let vendor_key = header("x-f402-key");
    let idempotency_key = header("idempotency-key");
    let signature_header = header("x-f402-sig").or_else(|| header("x-flow402-signature"));
    let body_sha_header = header("x-f402-body-sha");

    match pipeline::run_deduct(
        &state,
        vendor_key,
        idempotency_key,
        signature_header,
        body_sha_header,
        "/gateway/deduct",
        &body,
    )
    .await
    {
        Ok(outcome) => outcome_into_response(outcome),
        Err(error) => {
            tracing::warn!(error = %error, "deduct pipeline failed");
            error.into_response()
        }
    }
}

/// `POST /topup/mock`.
#[instrument(skip_all)]
pub async fn post_topup(
    State(state): State<AppState>,
    headers: axum::http::HeaderMap,
    body: axum::body::Bytes,
) -> Response {
    let idempotency_key = headers.get("idempotency-key").and_then(|v| v.to_str().ok());
    match topup::run_topup(&state, idempotency_key, "/topup/mock", &body).await {
        Ok(outcome) => outcome_into_response(outcome),
        Err(error) => {
            tracing::warn!(error = %error, "topup failed");
            error.into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ResetBody {
    #[serde(rename = "userId")]
    pub user_id: Uuid,
}

/// `POST /topup/reset`.
#[instrument(skip_all)]
pub async fn post_reset(State(state): State<AppState>, Json(body): Json<ResetBody>) -> Response {
    match topup::run_reset(&state, body.user_id).await {
        Ok(body) => (StatusCode::OK, Json(body)).into_response(),
        Err(error) => {
            tracing::warn!(error = %error, "reset failed");
            error.into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct BalanceQuery {
    #[serde(rename = "userId")]
    pub user_id: Uuid,
}

/// `GET /balance?userId=…`. 404s a `userId` never referenced by any mutation
/// (no `CreditBalance` row exists yet) rather than reporting it as a zero
/// balance.
#[instrument(skip_all)]
pub async fn get_balance(State(state): State<AppState>, Query(query): Query<BalanceQuery>) -> Response {
    match state.ledger.balance(state.scoped_tenant_id, query.user_id).await {
        Ok(Some(balance_credits)) => (StatusCode::OK, Json(BalanceOk { balance_credits })).into_response(),
        Ok(None) => {
            let body = ErrorBody::new(ErrorKind::UserNotFound);
            (StatusCode::NOT_FOUND, Json(body)).into_response()
        }
        Err(error) => {
            tracing::warn!(error = %error, "balance lookup failed");
            GatewayError::Ledger(error).into_response()
        }
    }
}

#[allow(dead_code)]
fn describe_error_kind(kind: ErrorKind) -> serde_json::Value {
    json!({ "error": kind })
}

#[cfg(test)]
mod tests {
    use axum::body::to_bytes;
    use sqlx::PgPool;

    use super::*;
    use crate::idempotency::IdempotencyStore;
    use crate::ledger::LedgerEngine;
    use crate::tenant_registry::TenantRegistry;

    #[test]
    fn status_for_matches_spec_taxonomy() {
        assert_eq!(status_for(ErrorKind::MissingVendorKey), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(ErrorKind::InvalidSignature), StatusCode::UNAUTHORIZED);
        assert_eq!(status_for(ErrorKind::UserNotFound), StatusCode::NOT_FOUND);
        assert_eq!(status_for(ErrorKind::RefClassMismatch), StatusCode::CONFLICT);
        assert_eq!(status_for(ErrorKind::MutationFailed), StatusCode::INTERNAL_SERVER_ERROR);
    }

    fn state_for(pool: PgPool, tenant: Uuid) -> AppState {
        AppState {
            tenant_registry: TenantRegistry::new(pool.clone()),
            idempotency_store: IdempotencyStore::new(pool.clone()),
            ledger: LedgerEngine::new(pool),
            scoped_tenant_id: tenant,
            signature_skew_seconds: crate::signature::DEFAULT_SKEW_SECONDS,
        }
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn balance_404s_a_user_never_referenced_by_a_mutation(pool: PgPool) {
        let tenant = Uuid::new_v4();
        let user = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO tenants (id, slug, name, api_key, signing_secret) \
             VALUES ($1, 'acme', 'Acme', 'acme-key', 'secret')",
        )
        .bind(tenant)
        .execute(&pool)
        .await
        .unwrap();

        let state = state_for(pool, tenant);
        let response = get_balance(State(state), Query(BalanceQuery { user_id: user })).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["error"], "user_not_found");
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn balance_returns_200_zero_after_a_topup_then_reset(pool: PgPool) {
        let tenant = Uuid::new_v4();
        let user = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO tenants (id, slug, name, api_key, signing_secret) \
             VALUES ($1, 'acme', 'Acme', 'acme-key', 'secret')",
        )
        .bind(tenant)
        .execute(&pool)
        .await
        .unwrap();

        let state = state_for(pool, tenant);
        state
            .ledger
            .credit(
                tenant,
                user,
                flow402_types::Credits::new(10).unwrap(),
                flow402_types::JournalKind::Topup,
                Some("seed".to_string()),
                serde_json::json!({}),
            )
            .await
            .unwrap();
        state.ledger.reset(tenant, user).await.unwrap();

        let response = get_balance(State(state), Query(BalanceQuery { user_id: user })).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["balance_credits"], 0);
    }
}
