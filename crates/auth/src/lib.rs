//! `inspectra-auth`: pure authorization primitives (zero-trust).
//!
//! Scopes, capabilities, grant reduction and site visibility live here. This
//! crate is intentionally decoupled from HTTP and storage: no IO, no async.

pub mod authorize;
pub mod capabilities;
pub mod claims;
pub mod grant;
pub mod hierarchy;
pub mod principal;
pub mod roles;
pub mod scope;
pub mod tenant;

pub use authorize::{authorize, AuthzError, Denial, DenialReason, PrimaryTenantHint};
pub use capabilities::{Capability, CapabilityParseError, CapabilitySet};
pub use claims::{validate_claims, AuthenticationError, IdentityClaims, IdentityVerifier};
pub use grant::{reduce, EffectiveAccessGrant, ReduceError, RoleGrantRecord};
pub use hierarchy::{visible_sites, visible_sites_with, HierarchyError, SiteHierarchy, SiteNode, VisibleSites};
pub use principal::{IdpId, Principal};
pub use roles::{GrantRole, EPHEMERAL_ROLE};
pub use scope::{Scope, ScopeParseError};
pub use tenant::{AccessIntent, ClientStatus, RequestedTenantContext, SiteStatus};
