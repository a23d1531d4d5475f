//! Site visibility: which sites a resolved grant may read.
//!
//! Client hierarchies are built once per client and cached; per-site
//! descendant lists are cached separately with a TTL so data-access policy
//! construction stays cheap on the hot path.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, error, instrument};

use inspectra_auth::{visible_sites_with, EffectiveAccessGrant, HierarchyError, Scope, SiteHierarchy, SiteNode, VisibleSites};
use inspectra_core::{ClientId, SiteId};

use crate::access::store::{MembershipStore, StoreError};

#[derive(Debug, Error)]
pub enum SiteVisibilityError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("invalid site hierarchy for client {client_id}: {source}")]
    Hierarchy {
        client_id: ClientId,
        #[source]
        source: HierarchyError,
    },

    #[error("grant with scope {scope} has no client")]
    MissingClient { scope: Scope },
}

pub struct SiteVisibility {
    store: Arc<dyn MembershipStore>,
    hierarchies: moka::future::Cache<ClientId, Arc<SiteHierarchy>>,
    descendants: moka::future::Cache<SiteId, Arc<Vec<SiteId>>>,
}

impl SiteVisibility {
    pub fn new(store: Arc<dyn MembershipStore>, descendants_ttl: Duration) -> Self {
        Self {
            store,
            hierarchies: moka::future::Cache::builder()
                .max_capacity(10_000)
                .time_to_live(descendants_ttl)
                .build(),
            descendants: moka::future::Cache::builder()
                .max_capacity(100_000)
                .time_to_live(descendants_ttl)
                .build(),
        }
    }

    /// The (cached) site hierarchy of `client_id`.
    #[instrument(skip_all, fields(client_id = %client_id), err)]
    pub async fn hierarchy(&self, client_id: ClientId) -> Result<Arc<SiteHierarchy>, SiteVisibilityError> {
        if let Some(hit) = self.hierarchies.get(&client_id).await {
            return Ok(hit);
        }

        let sites = self.store.sites_for_client(client_id).await?;
        let nodes: Vec<SiteNode> = sites.iter().map(|s| s.node()).collect();
        let hierarchy = SiteHierarchy::build(&nodes).map_err(|source| {
            error!(client_id = %client_id, error = %source, "site hierarchy is inconsistent");
            SiteVisibilityError::Hierarchy { client_id, source }
        })?;
        debug!(sites = hierarchy.len(), "built site hierarchy");

        let hierarchy = Arc::new(hierarchy);
        self.hierarchies.insert(client_id, hierarchy.clone()).await;
        Ok(hierarchy)
    }

    /// Transitive descendants of `site_id` within `client_id`, excluding the site.
    pub async fn descendants_of(
        &self,
        client_id: ClientId,
        site_id: SiteId,
    ) -> Result<Arc<Vec<SiteId>>, SiteVisibilityError> {
        if let Some(hit) = self.descendants.get(&site_id).await {
            return Ok(hit);
        }
        let hierarchy = self.hierarchy(client_id).await?;
        let list = Arc::new(hierarchy.descendants_of(site_id).to_vec());
        self.descendants.insert(site_id, list.clone()).await;
        Ok(list)
    }

    /// Sites visible to `grant`.
    ///
    /// Grants at CLIENT scope or above resolve to [`VisibleSites::All`] without
    /// touching the store.
    pub async fn visible_site_ids(&self, grant: &EffectiveAccessGrant) -> Result<VisibleSites, SiteVisibilityError> {
        let descendants = match (grant.scope, grant.site_id) {
            (Scope::SiteGroup, Some(site_id)) => {
                let client_id = grant
                    .client_id
                    .ok_or(SiteVisibilityError::MissingClient { scope: grant.scope })?;
                self.descendants_of(client_id, site_id).await?.as_ref().clone()
            }
            _ => Vec::new(),
        };
        Ok(visible_sites_with(grant, move |_| descendants))
    }

    /// Forget cached hierarchy data for `client_id` after its site tree changed.
    pub async fn invalidate_client(&self, client_id: ClientId) {
        let affected = self
            .hierarchies
            .get(&client_id)
            .await
            .map(|h| h.site_ids().collect::<Vec<_>>())
            .unwrap_or_default();

        self.hierarchies.invalidate(&client_id).await;
        for site_id in affected {
            self.descendants.invalidate(&site_id).await;
        }
        // Sites moved in from elsewhere are not in the old hierarchy.
        let current = self.store.sites_for_client(client_id).await;
        if let Ok(sites) = current {
            for site in sites {
                self.descendants.invalidate(&site.id).await;
            }
        }
    }
}

impl core::fmt::Debug for SiteVisibility {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SiteVisibility")
            .field("hierarchies", &self.hierarchies.entry_count())
            .field("descendants", &self.descendants.entry_count())
            .finish()
    }
}
