//! Structured access denials and capability checks.
//!
//! A denial is an expected outcome, never an error condition: it carries a
//! machine-readable reason plus enough context for the caller to render
//! "you don't have access, but here's what you do have".

use serde::Serialize;
use thiserror::Error;

use inspectra_core::{ClientId, SiteId};

use crate::{Capability, EffectiveAccessGrant, GrantRole, RequestedTenantContext};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialReason {
    /// The principal holds no membership anywhere.
    NoAccessGrant,
    /// The principal asked for a client/site it holds no membership in.
    AccessGrantRequestDenied,
    ClientInactive,
    SiteInactive,
}

impl DenialReason {
    pub fn as_str(self) -> &'static str {
        match self {
            DenialReason::NoAccessGrant => "no_access_grant",
            DenialReason::AccessGrantRequestDenied => "access_grant_request_denied",
            DenialReason::ClientInactive => "client_inactive",
            DenialReason::SiteInactive => "site_inactive",
        }
    }
}

impl core::fmt::Display for DenialReason {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The principal's default landing tenant, returned as a hint on denials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrimaryTenantHint {
    pub client_id: ClientId,
    pub site_id: Option<SiteId>,
    pub role: GrantRole,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[error("{reason}: {message}")]
pub struct Denial {
    pub reason: DenialReason,
    pub message: String,
    pub requested_client_id: Option<ClientId>,
    pub requested_site_id: Option<SiteId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary: Option<PrimaryTenantHint>,
}

impl Denial {
    pub fn new(reason: DenialReason, message: impl Into<String>, requested: &RequestedTenantContext) -> Self {
        Self {
            reason,
            message: message.into(),
            requested_client_id: requested.client_id,
            requested_site_id: requested.site_id,
            primary: None,
        }
    }

    pub fn with_primary(mut self, primary: Option<PrimaryTenantHint>) -> Self {
        self.primary = primary;
        self
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("forbidden: missing capability '{0}'")]
    MissingCapability(Capability),
}

/// Check a capability against the resolved grant.
///
/// - No IO
/// - No panics
pub fn authorize(grant: &EffectiveAccessGrant, required: Capability) -> Result<(), AuthzError> {
    if grant.capabilities.has(required) {
        Ok(())
    } else {
        Err(AuthzError::MissingCapability(required))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CapabilitySet, Scope};
    use inspectra_core::RoleId;

    #[test]
    fn denial_serializes_reason_and_hints() {
        let requested = RequestedTenantContext::client(ClientId::new());
        let primary_client = ClientId::new();
        let denial = Denial::new(DenialReason::AccessGrantRequestDenied, "no membership", &requested)
            .with_primary(Some(PrimaryTenantHint {
                client_id: primary_client,
                site_id: None,
                role: GrantRole::Stored(RoleId::new()),
            }));

        let json = serde_json::to_value(&denial).unwrap();
        assert_eq!(json["reason"], "access_grant_request_denied");
        assert_eq!(json["requested_client_id"], requested.client_id.unwrap().to_string());
        assert_eq!(json["primary"]["client_id"], primary_client.to_string());
        assert_eq!(denial.to_string(), "access_grant_request_denied: no membership");
    }

    #[test]
    fn denial_without_hint_omits_primary() {
        let denial = Denial::new(DenialReason::NoAccessGrant, "nothing", &RequestedTenantContext::default());
        let json = serde_json::to_value(&denial).unwrap();
        assert!(json.get("primary").is_none());
        assert!(json["requested_client_id"].is_null());
    }

    #[test]
    fn authorize_checks_capabilities() {
        let grant = EffectiveAccessGrant {
            scope: Scope::Site,
            capabilities: [Capability::ViewAssets].into_iter().collect::<CapabilitySet>(),
            client_id: Some(ClientId::new()),
            site_id: Some(SiteId::new()),
            role: GrantRole::Stored(RoleId::new()),
        };
        assert_eq!(authorize(&grant, Capability::ViewAssets), Ok(()));
        assert_eq!(
            authorize(&grant, Capability::ManageUsers),
            Err(AuthzError::MissingCapability(Capability::ManageUsers))
        );
    }
}
