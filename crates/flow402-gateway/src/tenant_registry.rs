//! Resolves a vendor credential (api key, slug, or UUID) to `(tenant_id,
//! signing_secret)`. Caches hits for a bounded TTL so a hot path doesn't round-trip
//! to the store on every request: an `Arc<DashMap<K, V>>` shared across clones,
//! one entry per key, with its own short-lived staleness window instead of a
//! process-wide invalidation signal.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use sqlx::PgPool;
use uuid::Uuid;

use flow402_types::Tenant;

/// Upper bound on cache entry lifetime.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, thiserror::Error)]
pub enum TenantLookupError {
    #[error("credential must not be empty")]
    ValidationError,
    #[error("no tenant matches the given credential")]
    VendorNotFound,
    #[error("tenant lookup backend failed: {0}")]
    VendorLookupFailed(String),
}

#[derive(Clone)]
struct CachedTenant {
    tenant: Tenant,
    cached_at: Instant,
}

/// Resolves vendor credentials against the `tenants` table, with a small
/// bounded-TTL read cache in front of it.
#[derive(Clone)]
pub struct TenantRegistry {
    pool: PgPool,
    cache: Arc<DashMap<String, CachedTenant>>,
    ttl: Duration,
}

impl TenantRegistry {
    pub fn new(pool: PgPool) -> Self {
        Self::with_ttl(pool, DEFAULT_CACHE_TTL)
    }

    pub fn with_ttl(pool: PgPool, ttl: Duration) -> Self {
        Self {
            pool,
            cache: Arc::new(DashMap::new()),
            ttl,
        }
    }

    /// Resolves `credential` by api key, then slug, then (if it parses as a UUID)
    /// by id — first match wins, whitespace trimmed, case-sensitive.
    #[tracing::instrument(skip(self, credential), fields(credential_len = credential.trim().len()))]
    pub async fn resolve(&self, credential: &str) -> Result<Tenant, TenantLookupError> {
        let credential = credential.trim();
        if credential.is_empty() {
            return Err(TenantLookupError::ValidationError);
        }

        if let Some(entry) = self.cache.get(credential) {
            if entry.cached_at.elapsed() < self.ttl {
                return Ok(entry.tenant.clone());
            }
        }

        let tenant = self.resolve_uncached(credential).await?;
        self.cache.insert(
            credential.to_string(),
            CachedTenant {
                tenant: tenant.clone(),
                cached_at: Instant::now(),
            },
        );
        Ok(tenant)
    }

    async fn resolve_uncached(&self, credential: &str) -> Result<Tenant, TenantLookupError> {
        if let Some(tenant) = self.find_by_api_key(credential).await? {
            return Ok(tenant);
        }
        if let Some(tenant) = self.find_by_slug(credential).await? {
            return Ok(tenant);
        }
        if let Ok(id) = Uuid::parse_str(credential) {
            if let Some(tenant) = self.find_by_id(id).await? {
                return Ok(tenant);
            }
        }
        Err(TenantLookupError::VendorNotFound)
    }

    async fn find_by_api_key(&self, api_key: &str) -> Result<Option<Tenant>, TenantLookupError> {
        sqlx::query_as::<_, Tenant>(
            "SELECT id, slug, name, api_key, signing_secret, created_at, updated_at \
             FROM tenants WHERE api_key = $1",
        )
        .bind(api_key)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| TenantLookupError::VendorLookupFailed(e.to_string()))
    }

    async fn find_by_slug(&self, slug: &str) -> Result<Option<Tenant>, TenantLookupError> {
        sqlx::query_as::<_, Tenant>(
            "SELECT id, slug, name, api_key, signing_secret, created_at, updated_at \
             FROM tenants WHERE slug = $1",
        )
        .bind(slug)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| TenantLookupError::VendorLookupFailed(e.to_string()))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Tenant>, TenantLookupError> {
        sqlx::query_as::<_, Tenant>(
            "SELECT id, slug, name, api_key, signing_secret, created_at, updated_at \
             FROM tenants WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| TenantLookupError::VendorLookupFailed(e.to_string()))
    }

    /// Evicts a cached entry immediately, e.g. after an operator rotates a secret.
    pub fn invalidate(&self, credential: &str) {
        self.cache.remove(credential.trim());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_credential_before_touching_the_store() {
        // `resolve` returns ValidationError synchronously for blank input; exercised
        // here via the trim/empty check in isolation since it requires no pool.
        let credential = "   ";
        assert!(credential.trim().is_empty());
    }

    #[test]
    fn cache_entry_expires_after_ttl() {
        let cached = CachedTenant {
            tenant: Tenant {
                id: Uuid::nil(),
                slug: "acme".to_string(),
                name: "Acme".to_string(),
                api_key: "key".to_string(),
                signing_secret: "secret".to_string(),
                created_at: chrono::Utc::now(),
                updated_at: chrono::Utc::now(),
            },
            cached_at: Instant::now() - Duration::from_secs(61),
        };
        assert!(cached.cached_at.elapsed() >= DEFAULT_CACHE_TTL);
    }
}
