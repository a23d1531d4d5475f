//! Access grant resolution.
//!
//! Turns an authenticated principal plus the tenant they asked for into one
//! [`EffectiveAccessGrant`], or a structured [`Denial`].

use std::collections::HashSet;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

use inspectra_auth::{
    reduce, AccessIntent, Denial, DenialReason, EffectiveAccessGrant, GrantRole, IdpId, PrimaryTenantHint,
    Principal, ReduceError, RequestedTenantContext, RoleGrantRecord, Scope,
};
use inspectra_core::{ClientId, SiteId};

use super::cache::{GrantCache, GrantCacheKey, MokaGrantCache};
use super::store::{MembershipStore, StoreError};
use crate::audit::AUDIT_TARGET;
use crate::config::AccessConfig;

#[derive(Debug, Error)]
pub enum AccessError {
    /// Expected outcome: the principal may not act in the requested tenant.
    #[error(transparent)]
    Denied(#[from] Denial),

    /// Inconsistent stored state (missing status rows and similar).
    #[error("internal access error: {0}")]
    Internal(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl AccessError {
    pub fn denial(&self) -> Option<&Denial> {
        match self {
            AccessError::Denied(denial) => Some(denial),
            _ => None,
        }
    }
}

impl From<ReduceError> for AccessError {
    fn from(err: ReduceError) -> Self {
        AccessError::Internal(err.to_string())
    }
}

pub struct AccessResolver {
    store: Arc<dyn MembershipStore>,
    cache: Arc<dyn GrantCache>,
    bootstrap_admins: HashSet<String>,
}

impl AccessResolver {
    pub fn new(store: Arc<dyn MembershipStore>, cache: Arc<dyn GrantCache>) -> Self {
        Self {
            store,
            cache,
            bootstrap_admins: HashSet::new(),
        }
    }

    pub fn from_config(store: Arc<dyn MembershipStore>, config: &AccessConfig) -> Self {
        let cache = MokaGrantCache::new(config.grant_cache_ttl, config.grant_cache_capacity);
        Self::new(store, Arc::new(cache)).with_bootstrap_admins(config.bootstrap_admins.iter().cloned())
    }

    /// Emails allowed to self-escalate where they hold no membership.
    pub fn with_bootstrap_admins<I, S>(mut self, emails: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.bootstrap_admins = emails
            .into_iter()
            .map(|email| email.as_ref().trim().to_lowercase())
            .filter(|email| !email.is_empty())
            .collect();
        self
    }

    pub fn store(&self) -> &Arc<dyn MembershipStore> {
        &self.store
    }

    /// Resolve the effective grant for one unit of work.
    #[instrument(
        skip_all,
        fields(
            idp_id = %principal.idp_id(),
            client_id = ?requested.client_id,
            site_id = ?requested.site_id,
            intent = requested.intent.as_str()
        )
    )]
    pub async fn resolve(
        &self,
        principal: &Principal,
        requested: &RequestedTenantContext,
    ) -> Result<EffectiveAccessGrant, AccessError> {
        let key = GrantCacheKey::new(
            principal.idp_id().clone(),
            requested.client_id,
            requested.site_id,
            requested.intent,
        );

        match self.cache.get(&key).await {
            Ok(Some(grant)) => {
                debug!("grant cache hit");
                return Ok(grant);
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "grant cache read failed; resolving from store"),
        }

        let outcome = self.compute(principal, requested).await;
        match &outcome {
            Ok(grant) => {
                if let Err(e) = self.cache.insert(key, grant.clone()).await {
                    warn!(error = %e, "failed to cache resolved grant");
                }
            }
            Err(AccessError::Denied(denial)) => {
                info!(reason = denial.reason.as_str(), message = %denial.message, "access denied");
            }
            Err(e) => error!(error = %e, "access resolution failed"),
        }
        outcome
    }

    /// Drop every cached grant of `principal` touching `client_id`.
    ///
    /// The default-tenant keys are dropped too, since a membership change may
    /// move the principal's landing tenant.
    #[instrument(skip_all, fields(idp_id = %principal, client_id = %client_id, sites = sites.len()))]
    pub async fn invalidate(&self, principal: &IdpId, client_id: ClientId, sites: &[SiteId]) {
        for key in GrantCacheKey::variants(principal, client_id, sites) {
            if let Err(e) = self.cache.invalidate(&key).await {
                warn!(error = %e, "failed to invalidate cached grant");
            }
        }
    }

    async fn compute(
        &self,
        principal: &Principal,
        requested: &RequestedTenantContext,
    ) -> Result<EffectiveAccessGrant, AccessError> {
        let mut records = self.store.grants_for(principal.idp_id()).await?;
        // Stores promise this order; a stable sort keeps ties in store order.
        records.sort_by_key(|r| (!r.is_primary, r.created_at));

        let Some(client_id) = requested.client_id else {
            if records.is_empty() {
                return self.without_memberships(principal, requested);
            }
            let grant = reduce(&records)?;
            self.validate_activation(&grant, requested).await?;
            return Ok(grant);
        };

        // A requested site is only honoured when it belongs to the requested client.
        if let Some(site_id) = requested.site_id {
            if self.store.site_status(client_id, site_id).await?.is_none() {
                info!(client_id = %client_id, site_id = %site_id, "requested site is not part of the requested client");
                return Err(request_denied(&records, requested, "requested site does not belong to the requested client"));
            }
        }

        if requested.intent != AccessIntent::Normal && may_escalate(&records, requested.intent) {
            match self.escalation_site(client_id, requested.site_id).await? {
                Some(site_id) => {
                    info!(
                        target: AUDIT_TARGET,
                        idp_id = %principal.idp_id(),
                        client_id = %client_id,
                        site_id = %site_id,
                        intent = requested.intent.as_str(),
                        "ephemeral access escalation"
                    );
                    return Ok(EffectiveAccessGrant::ephemeral(Some(client_id), Some(site_id)));
                }
                None => info!(
                    client_id = %client_id,
                    "escalation target has no sites; resolving from memberships"
                ),
            }
        }

        let matches: Vec<RoleGrantRecord> = records
            .iter()
            .filter_map(|r| matching_record(r, client_id, requested.site_id))
            .collect();

        if matches.is_empty() {
            if self.is_bootstrap_admin(principal) {
                let site_id = self.escalation_site(client_id, requested.site_id).await?;
                info!(
                    target: AUDIT_TARGET,
                    idp_id = %principal.idp_id(),
                    client_id = %client_id,
                    "bootstrap admin escalation"
                );
                return Ok(EffectiveAccessGrant::ephemeral(Some(client_id), site_id));
            }

            return Err(request_denied(
                &records,
                requested,
                "no membership matches the requested client or site",
            ));
        }

        let grant = reduce(&matches)?;
        self.validate_activation(&grant, requested).await?;
        Ok(grant)
    }

    fn without_memberships(
        &self,
        principal: &Principal,
        requested: &RequestedTenantContext,
    ) -> Result<EffectiveAccessGrant, AccessError> {
        if requested.intent != AccessIntent::Normal && self.is_bootstrap_admin(principal) {
            info!(
                target: AUDIT_TARGET,
                idp_id = %principal.idp_id(),
                "bootstrap admin escalation without tenant"
            );
            return Ok(EffectiveAccessGrant::ephemeral(None, None));
        }
        Err(Denial::new(DenialReason::NoAccessGrant, "principal holds no memberships", requested).into())
    }

    /// The requested site, else the client's primary site, else its oldest.
    async fn escalation_site(
        &self,
        client_id: ClientId,
        requested_site: Option<SiteId>,
    ) -> Result<Option<SiteId>, AccessError> {
        if requested_site.is_some() {
            return Ok(requested_site);
        }
        let sites = self.store.sites_for_client(client_id).await?;
        Ok(sites.first().map(|s| s.id))
    }

    async fn validate_activation(
        &self,
        grant: &EffectiveAccessGrant,
        requested: &RequestedTenantContext,
    ) -> Result<(), AccessError> {
        if grant.scope.is_at_least(Scope::Global) {
            return Ok(());
        }

        let client_id = grant
            .client_id
            .ok_or_else(|| AccessError::Internal("stored grant has no client".to_string()))?;

        match self.store.client_status(client_id).await? {
            None => {
                error!(client_id = %client_id, "client status row missing");
                return Err(AccessError::Internal(format!("no status for client {client_id}")));
            }
            Some(status) if !status.is_active() => {
                return Err(Denial::new(
                    DenialReason::ClientInactive,
                    format!("client {client_id} is not active ({status:?})"),
                    requested,
                )
                .into());
            }
            Some(_) => {}
        }

        if grant.scope.is_at_least(Scope::Client) {
            return Ok(());
        }
        let Some(site_id) = grant.site_id else {
            return Ok(());
        };

        match self.store.site_status(client_id, site_id).await? {
            None => {
                error!(client_id = %client_id, site_id = %site_id, "site status row missing");
                Err(AccessError::Internal(format!("no status for site {site_id}")))
            }
            Some(status) if !status.is_active() => Err(Denial::new(
                DenialReason::SiteInactive,
                format!("site {site_id} is not active ({status:?})"),
                requested,
            )
            .into()),
            Some(_) => Ok(()),
        }
    }

    fn is_bootstrap_admin(&self, principal: &Principal) -> bool {
        !self.bootstrap_admins.is_empty() && self.bootstrap_admins.contains(&principal.email().to_lowercase())
    }
}

impl core::fmt::Debug for AccessResolver {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AccessResolver")
            .field("bootstrap_admins", &self.bootstrap_admins.len())
            .finish_non_exhaustive()
    }
}

fn may_escalate(records: &[RoleGrantRecord], intent: AccessIntent) -> bool {
    let required = match intent {
        AccessIntent::Normal => return false,
        AccessIntent::Elevated => Scope::Global,
        AccessIntent::System => Scope::System,
    };
    records.iter().any(|r| r.scope.is_at_least(required))
}

/// `access_grant_request_denied`, hinting at the principal's primary tenant.
fn request_denied(records: &[RoleGrantRecord], requested: &RequestedTenantContext, message: &str) -> AccessError {
    let primary = records.first().map(|r| PrimaryTenantHint {
        client_id: r.client_id,
        site_id: r.site_id,
        role: GrantRole::Stored(r.role_id),
    });
    Denial::new(DenialReason::AccessGrantRequestDenied, message, requested)
        .with_primary(primary)
        .into()
}

/// `record` as it applies to the requested tenant, if it applies at all.
///
/// A client-wide record (no site, scope CLIENT or above) covers any site of
/// its client and is pinned to the requested site. Callers must have checked
/// that the site belongs to `client_id`.
fn matching_record(
    record: &RoleGrantRecord,
    client_id: ClientId,
    site_id: Option<SiteId>,
) -> Option<RoleGrantRecord> {
    if record.client_id != client_id {
        return None;
    }
    match (site_id, record.site_id) {
        (None, _) => Some(record.clone()),
        (Some(wanted), Some(held)) if wanted == held => Some(record.clone()),
        (Some(wanted), None) if record.scope.is_at_least(Scope::Client) => {
            let mut pinned = record.clone();
            pinned.site_id = Some(wanted);
            Some(pinned)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::store::{InMemoryMembershipStore, SiteRecord};
    use crate::access::cache::CacheError;
    use async_trait::async_trait;
    use chrono::{Duration as ChronoDuration, Utc};
    use inspectra_auth::{Capability, CapabilitySet, ClientStatus, SiteStatus};
    use inspectra_core::{MembershipId, RoleId};
    use std::time::Duration;

    struct Fixture {
        store: Arc<InMemoryMembershipStore>,
        resolver: AccessResolver,
        principal: Principal,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryMembershipStore::new());
        let cache = Arc::new(MokaGrantCache::new(Duration::from_secs(300), 1_000));
        let resolver = AccessResolver::new(store.clone(), cache).with_bootstrap_admins(["Root@Example.com"]);
        Fixture {
            store,
            resolver,
            principal: Principal::new("auth0|alice", "alice@example.com", "alice"),
        }
    }

    fn active_client(store: &InMemoryMembershipStore, status: ClientStatus) -> ClientId {
        let id = ClientId::new();
        store.upsert_client(id, status);
        id
    }

    fn site(store: &InMemoryMembershipStore, client_id: ClientId, status: SiteStatus, is_primary: bool) -> SiteId {
        let id = SiteId::new();
        store.upsert_site(SiteRecord {
            id,
            client_id,
            parent_id: None,
            is_primary,
            status,
            created_at: Utc::now(),
        });
        id
    }

    fn record(
        client_id: ClientId,
        site_id: Option<SiteId>,
        scope: Scope,
        caps: &[Capability],
        is_primary: bool,
        age_minutes: i64,
    ) -> RoleGrantRecord {
        RoleGrantRecord {
            membership_id: MembershipId::new(),
            client_id,
            site_id,
            role_id: RoleId::new(),
            role_name: scope.as_str().to_lowercase(),
            scope,
            capabilities: caps.iter().copied().collect(),
            is_primary,
            created_at: Utc::now() - ChronoDuration::minutes(age_minutes),
        }
    }

    #[tokio::test]
    async fn no_memberships_is_denied() {
        let f = fixture();
        let err = f
            .resolver
            .resolve(&f.principal, &RequestedTenantContext::default_tenant())
            .await
            .unwrap_err();
        assert_eq!(err.denial().map(|d| d.reason), Some(DenialReason::NoAccessGrant));
    }

    #[tokio::test]
    async fn default_tenant_prefers_the_broadest_primary_record() {
        let f = fixture();
        let x = active_client(&f.store, ClientStatus::Active);
        let y = active_client(&f.store, ClientStatus::Active);
        let s = site(&f.store, y, SiteStatus::Active, true);

        let primary = record(x, None, Scope::Client, &[Capability::ViewAssets], true, 10);
        let other = record(y, Some(s), Scope::Site, &[Capability::PerformInspections], false, 20);
        f.store.add_grant(f.principal.idp_id(), other);
        f.store.add_grant(f.principal.idp_id(), primary.clone());

        let grant = f
            .resolver
            .resolve(&f.principal, &RequestedTenantContext::default_tenant())
            .await
            .unwrap();
        assert_eq!(grant.scope, Scope::Client);
        assert_eq!(grant.client_id, Some(x));
        assert_eq!(grant.role, GrantRole::Stored(primary.role_id));
        assert_eq!(
            grant.capabilities,
            [Capability::ViewAssets, Capability::PerformInspections].into_iter().collect::<CapabilitySet>()
        );
    }

    #[tokio::test]
    async fn explicit_client_without_membership_carries_primary_hint() {
        let f = fixture();
        let x = active_client(&f.store, ClientStatus::Active);
        let y = active_client(&f.store, ClientStatus::Active);
        let held = record(x, None, Scope::Client, &[Capability::ViewAssets], true, 5);
        f.store.add_grant(f.principal.idp_id(), held.clone());

        let err = f
            .resolver
            .resolve(&f.principal, &RequestedTenantContext::client(y))
            .await
            .unwrap_err();
        let denial = err.denial().unwrap();
        assert_eq!(denial.reason, DenialReason::AccessGrantRequestDenied);
        assert_eq!(denial.requested_client_id, Some(y));
        let hint = denial.primary.as_ref().unwrap();
        assert_eq!(hint.client_id, x);
        assert_eq!(hint.role, GrantRole::Stored(held.role_id));
    }

    #[tokio::test]
    async fn client_wide_record_is_pinned_to_requested_site() {
        let f = fixture();
        let x = active_client(&f.store, ClientStatus::Active);
        let s = site(&f.store, x, SiteStatus::Active, true);
        f.store.add_grant(f.principal.idp_id(), record(x, None, Scope::Client, &[], true, 1));

        let grant = f
            .resolver
            .resolve(&f.principal, &RequestedTenantContext::client(x).with_site(s))
            .await
            .unwrap();
        assert_eq!(grant.site_id, Some(s));
        assert_eq!(grant.client_id, Some(x));
    }

    #[tokio::test]
    async fn site_of_another_client_is_never_pinned() {
        let f = fixture();
        let x = active_client(&f.store, ClientStatus::Active);
        let z = active_client(&f.store, ClientStatus::Active);
        let foreign = site(&f.store, z, SiteStatus::Active, true);
        f.store.add_grant(f.principal.idp_id(), record(x, None, Scope::Client, &[], true, 1));

        let err = f
            .resolver
            .resolve(&f.principal, &RequestedTenantContext::client(x).with_site(foreign))
            .await
            .unwrap_err();
        let denial = err.denial().unwrap();
        assert_eq!(denial.reason, DenialReason::AccessGrantRequestDenied);
        assert_eq!(denial.requested_site_id, Some(foreign));
        assert_eq!(denial.primary.as_ref().map(|p| p.client_id), Some(x));
    }

    #[tokio::test]
    async fn unknown_site_is_denied() {
        let f = fixture();
        let x = active_client(&f.store, ClientStatus::Active);
        site(&f.store, x, SiteStatus::Active, true);
        f.store.add_grant(f.principal.idp_id(), record(x, None, Scope::Client, &[], true, 1));

        let err = f
            .resolver
            .resolve(&f.principal, &RequestedTenantContext::client(x).with_site(SiteId::new()))
            .await
            .unwrap_err();
        assert_eq!(err.denial().map(|d| d.reason), Some(DenialReason::AccessGrantRequestDenied));
    }

    #[tokio::test]
    async fn escalation_never_carries_a_foreign_site() {
        let f = fixture();
        let y = active_client(&f.store, ClientStatus::Active);
        site(&f.store, y, SiteStatus::Active, true);
        let z = active_client(&f.store, ClientStatus::Active);
        let foreign = site(&f.store, z, SiteStatus::Active, true);
        f.store.add_grant(f.principal.idp_id(), record(ClientId::new(), None, Scope::System, &[], true, 1));

        let requested = RequestedTenantContext::client(y)
            .with_site(foreign)
            .with_intent(AccessIntent::Elevated);
        let err = f.resolver.resolve(&f.principal, &requested).await.unwrap_err();
        assert_eq!(err.denial().map(|d| d.reason), Some(DenialReason::AccessGrantRequestDenied));
    }

    #[tokio::test]
    async fn site_record_does_not_cover_other_sites() {
        let f = fixture();
        let x = active_client(&f.store, ClientStatus::Active);
        let a = site(&f.store, x, SiteStatus::Active, true);
        let b = site(&f.store, x, SiteStatus::Active, false);
        f.store.add_grant(f.principal.idp_id(), record(x, Some(a), Scope::Site, &[], true, 1));

        let err = f
            .resolver
            .resolve(&f.principal, &RequestedTenantContext::client(x).with_site(b))
            .await
            .unwrap_err();
        assert_eq!(err.denial().map(|d| d.reason), Some(DenialReason::AccessGrantRequestDenied));
    }

    #[tokio::test]
    async fn elevated_intent_escalates_into_a_foreign_client() {
        let f = fixture();
        let home = active_client(&f.store, ClientStatus::Active);
        let y = active_client(&f.store, ClientStatus::Active);
        let only_site = site(&f.store, y, SiteStatus::Active, false);
        f.store.add_grant(f.principal.idp_id(), record(home, None, Scope::System, &[], true, 1));

        let requested = RequestedTenantContext::client(y).with_intent(AccessIntent::Elevated);
        let grant = f.resolver.resolve(&f.principal, &requested).await.unwrap();

        assert!(grant.is_ephemeral());
        assert_eq!(grant.scope, Scope::System);
        assert_eq!(grant.capabilities, CapabilitySet::full());
        assert_eq!(grant.client_id, Some(y));
        assert_eq!(grant.site_id, Some(only_site));
    }

    #[tokio::test]
    async fn escalation_prefers_the_primary_site() {
        let f = fixture();
        let y = active_client(&f.store, ClientStatus::Active);
        let _older = site(&f.store, y, SiteStatus::Active, false);
        let primary = site(&f.store, y, SiteStatus::Active, true);
        f.store.add_grant(f.principal.idp_id(), record(ClientId::new(), None, Scope::Global, &[], true, 1));

        let requested = RequestedTenantContext::client(y).with_intent(AccessIntent::Elevated);
        let grant = f.resolver.resolve(&f.principal, &requested).await.unwrap();
        assert_eq!(grant.site_id, Some(primary));
    }

    #[tokio::test]
    async fn system_intent_requires_a_system_record() {
        let f = fixture();
        let y = active_client(&f.store, ClientStatus::Active);
        site(&f.store, y, SiteStatus::Active, true);
        f.store.add_grant(f.principal.idp_id(), record(ClientId::new(), None, Scope::Global, &[], true, 1));

        let requested = RequestedTenantContext::client(y).with_intent(AccessIntent::System);
        let err = f.resolver.resolve(&f.principal, &requested).await.unwrap_err();
        assert_eq!(err.denial().map(|d| d.reason), Some(DenialReason::AccessGrantRequestDenied));
    }

    #[tokio::test]
    async fn escalation_into_a_client_without_sites_falls_through() {
        let f = fixture();
        let y = active_client(&f.store, ClientStatus::Active);
        f.store.add_grant(f.principal.idp_id(), record(ClientId::new(), None, Scope::System, &[], true, 1));

        let requested = RequestedTenantContext::client(y).with_intent(AccessIntent::Elevated);
        let err = f.resolver.resolve(&f.principal, &requested).await.unwrap_err();
        assert_eq!(err.denial().map(|d| d.reason), Some(DenialReason::AccessGrantRequestDenied));
    }

    #[tokio::test]
    async fn inactive_site_is_denied_for_site_scope() {
        let f = fixture();
        let x = active_client(&f.store, ClientStatus::Active);
        let s = site(&f.store, x, SiteStatus::Inactive, true);
        f.store.add_grant(f.principal.idp_id(), record(x, Some(s), Scope::Site, &[], true, 1));

        let err = f
            .resolver
            .resolve(&f.principal, &RequestedTenantContext::default_tenant())
            .await
            .unwrap_err();
        assert_eq!(err.denial().map(|d| d.reason), Some(DenialReason::SiteInactive));
    }

    #[tokio::test]
    async fn legacy_client_counts_as_active() {
        let f = fixture();
        let x = active_client(&f.store, ClientStatus::Legacy);
        f.store.add_grant(f.principal.idp_id(), record(x, None, Scope::Client, &[], true, 1));

        let grant = f
            .resolver
            .resolve(&f.principal, &RequestedTenantContext::client(x))
            .await
            .unwrap();
        assert_eq!(grant.client_id, Some(x));
    }

    #[tokio::test]
    async fn suspended_client_is_denied() {
        let f = fixture();
        let x = active_client(&f.store, ClientStatus::Suspended);
        f.store.add_grant(f.principal.idp_id(), record(x, None, Scope::Client, &[], true, 1));

        let err = f
            .resolver
            .resolve(&f.principal, &RequestedTenantContext::default_tenant())
            .await
            .unwrap_err();
        assert_eq!(err.denial().map(|d| d.reason), Some(DenialReason::ClientInactive));
    }

    #[tokio::test]
    async fn missing_client_row_is_internal() {
        let f = fixture();
        let x = ClientId::new();
        f.store.add_grant(f.principal.idp_id(), record(x, None, Scope::Client, &[], true, 1));

        let err = f
            .resolver
            .resolve(&f.principal, &RequestedTenantContext::default_tenant())
            .await
            .unwrap_err();
        assert!(matches!(err, AccessError::Internal(_)));
    }

    #[tokio::test]
    async fn global_scope_skips_activation_checks() {
        let f = fixture();
        let x = ClientId::new();
        f.store.add_grant(f.principal.idp_id(), record(x, None, Scope::Global, &[], true, 1));

        let grant = f
            .resolver
            .resolve(&f.principal, &RequestedTenantContext::default_tenant())
            .await
            .unwrap();
        assert_eq!(grant.scope, Scope::Global);
    }

    #[tokio::test]
    async fn bootstrap_admin_gets_ephemeral_grant_only_with_intent() {
        let f = fixture();
        let root = Principal::new("auth0|root", "root@example.com", "root");

        let normal = f.resolver.resolve(&root, &RequestedTenantContext::default_tenant()).await;
        assert_eq!(
            normal.unwrap_err().denial().map(|d| d.reason),
            Some(DenialReason::NoAccessGrant)
        );

        let elevated = RequestedTenantContext::default_tenant().with_intent(AccessIntent::Elevated);
        let grant = f.resolver.resolve(&root, &elevated).await.unwrap();
        assert!(grant.is_ephemeral());
        assert_eq!(grant.client_id, None);
        assert_eq!(grant.site_id, None);
    }

    #[tokio::test]
    async fn bootstrap_admin_may_enter_any_client() {
        let f = fixture();
        let root = Principal::new("auth0|root", "ROOT@example.com", "root");
        let y = active_client(&f.store, ClientStatus::Active);
        let s = site(&f.store, y, SiteStatus::Active, true);

        let grant = f.resolver.resolve(&root, &RequestedTenantContext::client(y)).await.unwrap();
        assert!(grant.is_ephemeral());
        assert_eq!(grant.client_id, Some(y));
        assert_eq!(grant.site_id, Some(s));
    }

    #[tokio::test]
    async fn successful_grants_are_cached_until_invalidated() {
        let f = fixture();
        let x = active_client(&f.store, ClientStatus::Active);
        f.store.add_grant(f.principal.idp_id(), record(x, None, Scope::Client, &[], true, 1));
        let requested = RequestedTenantContext::client(x);

        f.resolver.resolve(&f.principal, &requested).await.unwrap();
        f.resolver.resolve(&f.principal, &requested).await.unwrap();
        assert_eq!(f.store.grant_reads(), 1);

        f.resolver.invalidate(f.principal.idp_id(), x, &[]).await;
        f.resolver.resolve(&f.principal, &requested).await.unwrap();
        assert_eq!(f.store.grant_reads(), 2);
    }

    #[tokio::test]
    async fn denials_are_not_cached() {
        let f = fixture();
        let requested = RequestedTenantContext::default_tenant();

        assert!(f.resolver.resolve(&f.principal, &requested).await.is_err());
        assert!(f.resolver.resolve(&f.principal, &requested).await.is_err());
        assert_eq!(f.store.grant_reads(), 2);
    }

    struct BrokenCache;

    #[async_trait]
    impl GrantCache for BrokenCache {
        async fn get(&self, _key: &GrantCacheKey) -> Result<Option<EffectiveAccessGrant>, CacheError> {
            Err(CacheError("connection refused".into()))
        }

        async fn insert(&self, _key: GrantCacheKey, _grant: EffectiveAccessGrant) -> Result<(), CacheError> {
            Err(CacheError("connection refused".into()))
        }

        async fn invalidate(&self, _key: &GrantCacheKey) -> Result<(), CacheError> {
            Err(CacheError("connection refused".into()))
        }
    }

    #[tokio::test]
    async fn cache_failures_fail_open() {
        let store = Arc::new(InMemoryMembershipStore::new());
        let resolver = AccessResolver::new(store.clone(), Arc::new(BrokenCache));
        let principal = Principal::new("auth0|bob", "bob@example.com", "bob");
        let x = ClientId::new();
        store.upsert_client(x, ClientStatus::Active);
        store.add_grant(principal.idp_id(), record(x, None, Scope::Client, &[], true, 1));

        let grant = resolver
            .resolve(&principal, &RequestedTenantContext::default_tenant())
            .await
            .unwrap();
        assert_eq!(grant.client_id, Some(x));
        resolver.invalidate(principal.idp_id(), x, &[]).await;
    }
}
