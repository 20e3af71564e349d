//! Operator-facing top-up and balance-reset endpoints.
//!
//! Narrower than the deduct pipeline: idempotency-protected but unsigned, since
//! this path is reached only by operator tooling, not untrusted vendor traffic.

use serde_json::json;
use uuid::Uuid;

use flow402_types::{JournalKind, ResetOk, TopupOk, TopupRequest};

use crate::error::GatewayError;
use crate::idempotency::Outcome as IdempotencyOutcome;
use crate::pipeline::PipelineOutcome;
use crate::state::AppState;

/// `POST /topup/mock`. Claims `idempotency_key`, then delegates to the ledger's
/// `credit` with `kind = topup`.
pub async fn run_topup(
    state: &AppState,
    idempotency_key: Option<&str>,
    path: &str,
    body: &[u8],
) -> Result<PipelineOutcome, GatewayError> {
    let idempotency_key = idempotency_key
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .ok_or(GatewayError::MissingIdempotencyKey)?;

    let body_sha = crate::signature::body_sha256_hex(body);
    let claim = state
        .idempotency_store
        .claim(idempotency_key, "POST", path, &body_sha)
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
                body: json!(flow402_types::ErrorBody::new(
                    flow402_types::ErrorKind::RequestInProgress
                )),
            });
        }
        IdempotencyOutcome::Conflict(reason) => {
            return Ok(PipelineOutcome::Rejected {
                status: 409,
                body: json!(flow402_types::ErrorBody::new(
                    flow402_types::ErrorKind::IdempotencyConflict
                )
                .with_reason(reason)),
            });
        }
        IdempotencyOutcome::Claimed => {}
    }

    let parsed: Result<TopupRequest, String> = serde_json::from_slice(body).map_err(|e| e.to_string());
    let parsed = match parsed {
        Ok(req) => req,
        Err(details) => {
            let body = json!(
                flow402_types::ErrorBody::new(flow402_types::ErrorKind::InvalidRequest)
                    .with_reason(details)
            );
            state.idempotency_store.persist_response(idempotency_key, 400, &body).await?;
            return Ok(PipelineOutcome::Respond { status: 400, body });
        }
    };

    // Any ref choice preserving `(tenant, ref)` uniqueness is acceptable here;
    // the idempotency key doubles as the ref so a replayed top-up request can
    // never mint a second journal entry even if the idempotency row were ever
    // lost.
    let ref_ = format!("dashboard_topup_{idempotency_key}");
    let metadata = json!({});
    match state
        .ledger
        .credit(
            state.scoped_tenant_id,
            parsed.user_id,
            parsed.amount_credits,
            JournalKind::Topup,
            Some(ref_),
            metadata,
        )
        .await
    {
        Ok(_new_balance) => {
            let body = json!(TopupOk::default());
            state.idempotency_store.persist_response(idempotency_key, 200, &body).await?;
            Ok(PipelineOutcome::Respond { status: 200, body })
        }
        Err(other) => {
            let _ = state.idempotency_store.release(idempotency_key).await;
            Err(GatewayError::Ledger(other))
        }
    }
}

/// `POST /topup/reset`. Zeroes a balance and records a `manual_reset` journal
/// entry; not idempotency-protected — resets are operator-invoked and
/// individually audited via the journal itself.
pub async fn run_reset(state: &AppState, user_id: Uuid) -> Result<serde_json::Value, GatewayError> {
    let (previous, new) = state.ledger.reset(state.scoped_tenant_id, user_id).await?;
    Ok(json!(ResetOk {
        ok: true,
        previous_balance_credits: previous,
        new_balance_credits: new,
    }))
}

#[cfg(test)]
mod tests {
    use sqlx::PgPool;

    use super::*;
    use crate::idempotency::IdempotencyStore;
    use crate::ledger::LedgerEngine;
    use crate::tenant_registry::TenantRegistry;

    #[test]
    fn dashboard_topup_ref_embeds_idempotency_key() {
        let key = "idem-123";
        let ref_ = format!("dashboard_topup_{key}");
        assert_eq!(ref_, "dashboard_topup_idem-123");
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
    async fn topup_then_deduct_leaves_one_journal_entry_of_each_kind(pool: PgPool) {
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

        let state = state_for(pool.clone(), tenant);

        let body = json!({ "userId": user, "amount_credits": 500 });
        let body = serde_json::to_vec(&body).unwrap();
        let outcome = run_topup(&state, Some("t1"), "/topup/mock", &body).await.unwrap();
        assert!(matches!(outcome, PipelineOutcome::Respond { status: 200, .. }));
        assert_eq!(state.ledger.balance(tenant, user).await.unwrap(), Some(500));

        // Replay with the same idempotency key does not double-credit.
        let replay = run_topup(&state, Some("t1"), "/topup/mock", &body).await.unwrap();
        assert!(matches!(
            replay,
            PipelineOutcome::RespondWithoutPersisting { status: 200, .. }
        ));
        assert_eq!(state.ledger.balance(tenant, user).await.unwrap(), Some(500));

        let new_balance = state
            .ledger
            .debit(tenant, user, flow402_types::Credits::new(5).unwrap(), "deduct-ref".to_string(), json!({}))
            .await
            .unwrap();
        assert_eq!(new_balance, 495);

        let kinds: Vec<(JournalKind,)> =
            sqlx::query_as("SELECT kind FROM journal_entries WHERE tenant_id = $1 ORDER BY created_at")
                .bind(tenant)
                .fetch_all(&pool)
                .await
                .unwrap();
        assert_eq!(kinds, vec![(JournalKind::Topup,), (JournalKind::Deduct,)]);
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn reset_zeroes_balance_and_is_reflected_immediately(pool: PgPool) {
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
                flow402_types::Credits::new(42).unwrap(),
                JournalKind::Topup,
                Some("seed".to_string()),
                json!({}),
            )
            .await
            .unwrap();

        let result = run_reset(&state, user).await.unwrap();
        assert_eq!(result["previous_balance_credits"], 42);
        assert_eq!(result["new_balance_credits"], 0);
        assert_eq!(state.ledger.balance(tenant, user).await.unwrap(), Some(0));
    }
}
