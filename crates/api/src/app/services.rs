//! Engine wiring shared by every handler.

use std::sync::Arc;

use inspectra_infra::access::{AccessInvalidation, LocalInvalidation, MembershipStore};
use inspectra_infra::{AccessConfig, AccessResolver, SiteVisibility};

pub struct AppServices {
    pub resolver: Arc<AccessResolver>,
    pub sites: Arc<SiteVisibility>,
    pub invalidation: Arc<dyn AccessInvalidation>,
}

impl AppServices {
    /// Resolver, site visibility and local invalidation over one membership store.
    pub fn new(store: Arc<dyn MembershipStore>, config: &AccessConfig) -> Self {
        let resolver = Arc::new(AccessResolver::from_config(store.clone(), config));
        let sites = Arc::new(SiteVisibility::new(store, config.site_cache_ttl));
        let invalidation = Arc::new(LocalInvalidation::new(resolver.clone(), sites.clone()));
        Self {
            resolver,
            sites,
            invalidation,
        }
    }

    /// Replace the invalidation port, e.g. with one that also fans out to peers.
    pub fn with_invalidation(mut self, invalidation: Arc<dyn AccessInvalidation>) -> Self {
        self.invalidation = invalidation;
        self
    }
}
