//! Membership store boundary.
//!
//! The resolver reads role-grant records and tenant activation rows through
//! [`MembershipStore`]. Implementations must return grants ordered
//! primary-first, then oldest-first.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use inspectra_auth::{ClientStatus, IdpId, RoleGrantRecord, SiteNode, SiteStatus};
use inspectra_core::{ClientId, MembershipId, SiteId};

/// A site row, as needed for hierarchy expansion and escalation defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteRecord {
    pub id: SiteId,
    pub client_id: ClientId,
    pub parent_id: Option<SiteId>,
    pub is_primary: bool,
    pub status: SiteStatus,
    pub created_at: DateTime<Utc>,
}

impl SiteRecord {
    pub fn node(&self) -> SiteNode {
        SiteNode {
            id: self.id,
            parent_id: self.parent_id,
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("membership store unavailable: {0}")]
    Unavailable(String),

    #[error("failed to decode {entity}: {message}")]
    Decode { entity: &'static str, message: String },
}

#[async_trait]
pub trait MembershipStore: Send + Sync {
    /// Every membership of `principal`, primary-first then oldest-first.
    async fn grants_for(&self, principal: &IdpId) -> Result<Vec<RoleGrantRecord>, StoreError>;

    async fn client_status(&self, client_id: ClientId) -> Result<Option<ClientStatus>, StoreError>;

    async fn site_status(&self, client_id: ClientId, site_id: SiteId) -> Result<Option<SiteStatus>, StoreError>;

    /// All sites of a client, primary-first then oldest-first.
    async fn sites_for_client(&self, client_id: ClientId) -> Result<Vec<SiteRecord>, StoreError>;
}

#[async_trait]
impl<S> MembershipStore for Arc<S>
where
    S: MembershipStore + ?Sized,
{
    async fn grants_for(&self, principal: &IdpId) -> Result<Vec<RoleGrantRecord>, StoreError> {
        (**self).grants_for(principal).await
    }

    async fn client_status(&self, client_id: ClientId) -> Result<Option<ClientStatus>, StoreError> {
        (**self).client_status(client_id).await
    }

    async fn site_status(&self, client_id: ClientId, site_id: SiteId) -> Result<Option<SiteStatus>, StoreError> {
        (**self).site_status(client_id, site_id).await
    }

    async fn sites_for_client(&self, client_id: ClientId) -> Result<Vec<SiteRecord>, StoreError> {
        (**self).sites_for_client(client_id).await
    }
}

#[derive(Debug, Default)]
struct MembershipState {
    grants: Vec<(IdpId, RoleGrantRecord)>,
    clients: HashMap<ClientId, ClientStatus>,
    sites: HashMap<SiteId, SiteRecord>,
}

/// In-memory membership store for tests/dev.
///
/// Counts reads so tests can observe cache hits and misses.
#[derive(Debug, Default)]
pub struct InMemoryMembershipStore {
    inner: RwLock<MembershipState>,
    grant_reads: AtomicUsize,
    site_reads: AtomicUsize,
}

impl InMemoryMembershipStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert_client(&self, client_id: ClientId, status: ClientStatus) {
        if let Ok(mut state) = self.inner.write() {
            state.clients.insert(client_id, status);
        }
    }

    pub fn upsert_site(&self, site: SiteRecord) {
        if let Ok(mut state) = self.inner.write() {
            state.sites.insert(site.id, site);
        }
    }

    pub fn set_site_status(&self, site_id: SiteId, status: SiteStatus) {
        if let Ok(mut state) = self.inner.write() {
            if let Some(site) = state.sites.get_mut(&site_id) {
                site.status = status;
            }
        }
    }

    pub fn set_site_parent(&self, site_id: SiteId, parent_id: Option<SiteId>) {
        if let Ok(mut state) = self.inner.write() {
            if let Some(site) = state.sites.get_mut(&site_id) {
                site.parent_id = parent_id;
            }
        }
    }

    pub fn add_grant(&self, principal: &IdpId, record: RoleGrantRecord) {
        if let Ok(mut state) = self.inner.write() {
            state.grants.push((principal.clone(), record));
        }
    }

    pub fn remove_grant(&self, membership_id: MembershipId) {
        if let Ok(mut state) = self.inner.write() {
            state.grants.retain(|(_, r)| r.membership_id != membership_id);
        }
    }

    /// Number of `grants_for` calls served so far.
    pub fn grant_reads(&self) -> usize {
        self.grant_reads.load(Ordering::SeqCst)
    }

    /// Number of `sites_for_client` calls served so far.
    pub fn site_reads(&self) -> usize {
        self.site_reads.load(Ordering::SeqCst)
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, MembershipState>, StoreError> {
        self.inner
            .read()
            .map_err(|_| StoreError::Unavailable("membership state lock poisoned".to_string()))
    }
}

#[async_trait]
impl MembershipStore for InMemoryMembershipStore {
    async fn grants_for(&self, principal: &IdpId) -> Result<Vec<RoleGrantRecord>, StoreError> {
        self.grant_reads.fetch_add(1, Ordering::SeqCst);
        let state = self.read()?;
        let mut grants: Vec<RoleGrantRecord> = state
            .grants
            .iter()
            .filter(|(p, _)| p == principal)
            .map(|(_, r)| r.clone())
            .collect();
        grants.sort_by_key(|r| (!r.is_primary, r.created_at));
        Ok(grants)
    }

    async fn client_status(&self, client_id: ClientId) -> Result<Option<ClientStatus>, StoreError> {
        Ok(self.read()?.clients.get(&client_id).copied())
    }

    async fn site_status(&self, client_id: ClientId, site_id: SiteId) -> Result<Option<SiteStatus>, StoreError> {
        Ok(self
            .read()?
            .sites
            .get(&site_id)
            .filter(|s| s.client_id == client_id)
            .map(|s| s.status))
    }

    async fn sites_for_client(&self, client_id: ClientId) -> Result<Vec<SiteRecord>, StoreError> {
        self.site_reads.fetch_add(1, Ordering::SeqCst);
        let state = self.read()?;
        let mut sites: Vec<SiteRecord> = state
            .sites
            .values()
            .filter(|s| s.client_id == client_id)
            .cloned()
            .collect();
        sites.sort_by_key(|s| (!s.is_primary, s.created_at, s.id));
        Ok(sites)
    }
}
