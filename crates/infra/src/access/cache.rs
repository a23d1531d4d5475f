//! Resolved-grant cache.
//!
//! Entries are keyed by everything that can change the resolution outcome:
//! the principal, the requested client and site, and the access intent.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use inspectra_auth::{AccessIntent, EffectiveAccessGrant, IdpId};
use inspectra_core::{ClientId, SiteId};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GrantCacheKey {
    pub idp_id: IdpId,
    pub client_id: Option<ClientId>,
    pub site_id: Option<SiteId>,
    pub intent: AccessIntent,
}

impl GrantCacheKey {
    pub fn new(idp_id: IdpId, client_id: Option<ClientId>, site_id: Option<SiteId>, intent: AccessIntent) -> Self {
        Self {
            idp_id,
            client_id,
            site_id,
            intent,
        }
    }

    /// Every key a change to `principal`'s memberships in `client` may affect.
    ///
    /// Covers each intent crossed with the default tenant, the bare client, and
    /// the client with each of `sites`.
    pub fn variants(principal: &IdpId, client_id: ClientId, sites: &[SiteId]) -> Vec<GrantCacheKey> {
        let mut tenants = Vec::with_capacity(sites.len() + 2);
        tenants.push((None, None));
        tenants.push((Some(client_id), None));
        tenants.extend(sites.iter().map(|site| (Some(client_id), Some(*site))));

        AccessIntent::ALL
            .iter()
            .flat_map(|intent| {
                tenants
                    .iter()
                    .map(move |(client, site)| GrantCacheKey::new(principal.clone(), *client, *site, *intent))
            })
            .collect()
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("grant cache unavailable: {0}")]
pub struct CacheError(pub String);

#[async_trait]
pub trait GrantCache: Send + Sync {
    async fn get(&self, key: &GrantCacheKey) -> Result<Option<EffectiveAccessGrant>, CacheError>;

    async fn insert(&self, key: GrantCacheKey, grant: EffectiveAccessGrant) -> Result<(), CacheError>;

    async fn invalidate(&self, key: &GrantCacheKey) -> Result<(), CacheError>;
}

/// In-process TTL cache.
#[derive(Clone)]
pub struct MokaGrantCache {
    inner: moka::future::Cache<GrantCacheKey, EffectiveAccessGrant>,
}

impl MokaGrantCache {
    pub fn new(ttl: Duration, capacity: u64) -> Self {
        let inner = moka::future::Cache::builder()
            .max_capacity(capacity)
            .time_to_live(ttl)
            .build();
        Self { inner }
    }

    pub fn entry_count(&self) -> u64 {
        self.inner.entry_count()
    }
}

impl core::fmt::Debug for MokaGrantCache {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MokaGrantCache")
            .field("entries", &self.inner.entry_count())
            .finish()
    }
}

#[async_trait]
impl GrantCache for MokaGrantCache {
    async fn get(&self, key: &GrantCacheKey) -> Result<Option<EffectiveAccessGrant>, CacheError> {
        Ok(self.inner.get(key).await)
    }

    async fn insert(&self, key: GrantCacheKey, grant: EffectiveAccessGrant) -> Result<(), CacheError> {
        self.inner.insert(key, grant).await;
        Ok(())
    }

    async fn invalidate(&self, key: &GrantCacheKey) -> Result<(), CacheError> {
        self.inner.invalidate(key).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variants_cover_every_intent_and_tenant() {
        let principal = IdpId::new("auth0|variants");
        let client = ClientId::new();
        let sites = [SiteId::new(), SiteId::new()];

        let keys = GrantCacheKey::variants(&principal, client, &sites);
        assert_eq!(keys.len(), AccessIntent::ALL.len() * 4);

        for intent in AccessIntent::ALL {
            assert!(keys.contains(&GrantCacheKey::new(principal.clone(), None, None, intent)));
            assert!(keys.contains(&GrantCacheKey::new(principal.clone(), Some(client), None, intent)));
            for site in sites {
                assert!(keys.contains(&GrantCacheKey::new(principal.clone(), Some(client), Some(site), intent)));
            }
        }
    }

    #[tokio::test]
    async fn moka_cache_stores_and_forgets() {
        let cache = MokaGrantCache::new(Duration::from_secs(60), 100);
        let key = GrantCacheKey::new(IdpId::new("auth0|c"), None, None, AccessIntent::Normal);
        let grant = EffectiveAccessGrant::ephemeral(None, None);

        assert_eq!(cache.get(&key).await.unwrap(), None);
        cache.insert(key.clone(), grant.clone()).await.unwrap();
        assert_eq!(cache.get(&key).await.unwrap(), Some(grant));
        cache.invalidate(&key).await.unwrap();
        assert_eq!(cache.get(&key).await.unwrap(), None);
    }
}
