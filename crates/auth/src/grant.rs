//! Role-grant records and their reduction into one effective grant.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use inspectra_core::{ClientId, MembershipId, RoleId, SiteId};

use crate::{Capability, CapabilitySet, GrantRole, Scope};

/// One stored membership: a principal holds `role_id` in `client_id`
/// (optionally pinned to `site_id`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleGrantRecord {
    pub membership_id: MembershipId,
    pub client_id: ClientId,
    pub site_id: Option<SiteId>,
    pub role_id: RoleId,
    pub role_name: String,
    pub scope: Scope,
    pub capabilities: CapabilitySet,
    pub is_primary: bool,
    pub created_at: DateTime<Utc>,
}

/// The reduced access a principal holds for one unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectiveAccessGrant {
    pub scope: Scope,
    pub capabilities: CapabilitySet,
    pub client_id: Option<ClientId>,
    pub site_id: Option<SiteId>,
    pub role: GrantRole,
}

impl EffectiveAccessGrant {
    /// Synthesized grant for privileged principals operating in a tenant they
    /// hold no membership in. Never persisted.
    pub fn ephemeral(client_id: Option<ClientId>, site_id: Option<SiteId>) -> Self {
        Self {
            scope: Scope::System,
            capabilities: CapabilitySet::full(),
            client_id,
            site_id,
            role: GrantRole::Ephemeral,
        }
    }

    pub fn is_ephemeral(&self) -> bool {
        self.role.is_ephemeral()
    }

    pub fn can(&self, capability: Capability) -> bool {
        self.capabilities.has(capability)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReduceError {
    #[error("cannot reduce an empty set of role grants")]
    EmptyInput,
}

/// Fold role-grant records into a single effective grant.
///
/// - The resulting scope is the most permissive scope among `records`.
/// - Client, site and role come from the *first* record carrying that scope;
///   later records with an equal scope never replace it, so input order
///   decides the default tenant of a multi-role principal.
/// - Capabilities are the union over *all* records, whichever scope won.
pub fn reduce(records: &[RoleGrantRecord]) -> Result<EffectiveAccessGrant, ReduceError> {
    let (first, rest) = records.split_first().ok_or(ReduceError::EmptyInput)?;

    let mut grant = EffectiveAccessGrant {
        scope: first.scope,
        capabilities: first.capabilities,
        client_id: Some(first.client_id),
        site_id: first.site_id,
        role: GrantRole::Stored(first.role_id),
    };

    for record in rest {
        if record.scope.is_broader_than(grant.scope) {
            grant.scope = record.scope;
            grant.client_id = Some(record.client_id);
            grant.site_id = record.site_id;
            grant.role = GrantRole::Stored(record.role_id);
        }
        grant.capabilities = grant.capabilities.union(record.capabilities);
    }

    Ok(grant)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn record(scope: Scope, caps: &[Capability], client: ClientId, site: Option<SiteId>) -> RoleGrantRecord {
        RoleGrantRecord {
            membership_id: MembershipId::new(),
            client_id: client,
            site_id: site,
            role_id: RoleId::new(),
            role_name: format!("{scope}-role"),
            scope,
            capabilities: caps.iter().copied().collect(),
            is_primary: false,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn empty_input_is_an_error() {
        assert_eq!(reduce(&[]), Err(ReduceError::EmptyInput));
    }

    #[test]
    fn single_record_passes_through() {
        let client = ClientId::new();
        let site = SiteId::new();
        let r = record(Scope::Site, &[Capability::ViewAssets], client, Some(site));

        let grant = reduce(std::slice::from_ref(&r)).unwrap();
        assert_eq!(grant.scope, Scope::Site);
        assert_eq!(grant.client_id, Some(client));
        assert_eq!(grant.site_id, Some(site));
        assert_eq!(grant.role, GrantRole::Stored(r.role_id));
        assert!(grant.can(Capability::ViewAssets));
    }

    #[test]
    fn broadest_scope_picks_the_tenant() {
        let x = ClientId::new();
        let y = ClientId::new();
        let narrow = record(Scope::Site, &[Capability::PerformInspections], y, Some(SiteId::new()));
        let broad = record(Scope::Client, &[Capability::ViewReports], x, None);

        let grant = reduce(&[narrow.clone(), broad.clone()]).unwrap();
        assert_eq!(grant.scope, Scope::Client);
        assert_eq!(grant.client_id, Some(x));
        assert_eq!(grant.site_id, None);
        assert_eq!(grant.role, GrantRole::Stored(broad.role_id));
        // Capabilities of the losing record still apply.
        assert!(grant.can(Capability::PerformInspections));
        assert!(grant.can(Capability::ViewReports));
    }

    #[test]
    fn ties_keep_the_first_record() {
        let x = ClientId::new();
        let y = ClientId::new();
        let a = record(Scope::Client, &[Capability::ViewAssets], x, None);
        let b = record(Scope::Client, &[Capability::ManageAssets], y, None);

        let ab = reduce(&[a.clone(), b.clone()]).unwrap();
        let ba = reduce(&[b.clone(), a.clone()]).unwrap();

        assert_eq!(ab.client_id, Some(x));
        assert_eq!(ba.client_id, Some(y));
        assert_eq!(ab.capabilities, ba.capabilities);
    }

    #[test]
    fn primary_client_scope_record_wins_over_later_site_record() {
        let x = ClientId::new();
        let y = ClientId::new();
        let mut primary = record(Scope::Client, &[Capability::ViewAssets], x, None);
        primary.is_primary = true;
        let secondary = record(Scope::Site, &[Capability::ManageAssets], y, Some(SiteId::new()));

        let grant = reduce(&[primary, secondary]).unwrap();
        assert_eq!(grant.scope, Scope::Client);
        assert_eq!(grant.client_id, Some(x));
        assert_eq!(
            grant.capabilities,
            [Capability::ViewAssets, Capability::ManageAssets].into_iter().collect()
        );
    }

    #[test]
    fn ephemeral_grant_has_everything() {
        let client = ClientId::new();
        let grant = EffectiveAccessGrant::ephemeral(Some(client), None);
        assert!(grant.is_ephemeral());
        assert_eq!(grant.scope, Scope::System);
        assert_eq!(grant.capabilities, CapabilitySet::full());
        assert_eq!(grant.client_id, Some(client));
    }

    fn arb_records() -> impl Strategy<Value = Vec<RoleGrantRecord>> {
        let clients: Vec<ClientId> = (0..4).map(|_| ClientId::new()).collect();
        prop::collection::vec((0usize..6, any::<u32>(), 0usize..4), 1..12).prop_map(move |raw| {
            raw.into_iter()
                .map(|(scope_idx, mask, client_idx)| {
                    let caps: Vec<Capability> = Capability::ALL
                        .iter()
                        .copied()
                        .enumerate()
                        .filter(|(i, _)| mask & (1 << (i % 32)) != 0)
                        .map(|(_, c)| c)
                        .collect();
                    record(Scope::ALL[scope_idx], &caps, clients[client_idx], None)
                })
                .collect()
        })
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: the capability union does not depend on record order.
        #[test]
        fn capability_union_is_order_independent(records in arb_records()) {
            let forward = reduce(&records).unwrap();
            let mut reversed = records.clone();
            reversed.reverse();
            let backward = reduce(&reversed).unwrap();

            prop_assert_eq!(forward.capabilities, backward.capabilities);
            prop_assert_eq!(forward.scope, backward.scope);
        }

        /// Property: the winner is the first record holding the maximum scope.
        #[test]
        fn tenant_comes_from_first_broadest_record(records in arb_records()) {
            let grant = reduce(&records).unwrap();
            let best = records.iter().map(|r| r.scope).max().unwrap();
            let winner = records.iter().find(|r| r.scope == best).unwrap();

            prop_assert_eq!(grant.scope, best);
            prop_assert_eq!(grant.client_id, Some(winner.client_id));
            prop_assert_eq!(grant.role, GrantRole::Stored(winner.role_id));
        }
    }
}
