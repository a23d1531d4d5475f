//! Tenant context requested by a caller, and tenant activation statuses.

use core::str::FromStr;

use serde::{Deserialize, Serialize};

use inspectra_core::{ClientId, DomainError, SiteId};

/// How far the caller wants the resolver to go when computing access.
///
/// Only non-`Normal` intents are ever considered for escalation.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessIntent {
    #[default]
    Normal,
    Elevated,
    System,
}

impl AccessIntent {
    pub const ALL: [AccessIntent; 3] = [AccessIntent::Normal, AccessIntent::Elevated, AccessIntent::System];

    pub fn as_str(self) -> &'static str {
        match self {
            AccessIntent::Normal => "normal",
            AccessIntent::Elevated => "elevated",
            AccessIntent::System => "system",
        }
    }
}

impl core::fmt::Display for AccessIntent {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccessIntent {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "normal" => Ok(AccessIntent::Normal),
            "elevated" => Ok(AccessIntent::Elevated),
            "system" => Ok(AccessIntent::System),
            other => Err(DomainError::validation(format!("unknown access intent '{other}'"))),
        }
    }
}

/// The tenant a caller asked to operate as (tenant switching).
///
/// Built per request from headers; never persisted.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct RequestedTenantContext {
    pub client_id: Option<ClientId>,
    pub site_id: Option<SiteId>,
    pub intent: AccessIntent,
}

impl RequestedTenantContext {
    /// No explicit tenant; land on the principal's default.
    pub fn default_tenant() -> Self {
        Self::default()
    }

    pub fn client(client_id: ClientId) -> Self {
        Self {
            client_id: Some(client_id),
            ..Self::default()
        }
    }

    pub fn with_site(mut self, site_id: SiteId) -> Self {
        self.site_id = Some(site_id);
        self
    }

    pub fn with_intent(mut self, intent: AccessIntent) -> Self {
        self.intent = intent;
        self
    }

    pub fn is_explicit(&self) -> bool {
        self.client_id.is_some()
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientStatus {
    Active,
    /// Migrated from the legacy platform; still fully usable.
    Legacy,
    Pending,
    Inactive,
    Suspended,
}

impl ClientStatus {
    pub fn is_active(self) -> bool {
        matches!(self, ClientStatus::Active | ClientStatus::Legacy)
    }
}

impl FromStr for ClientStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ACTIVE" => Ok(ClientStatus::Active),
            "LEGACY" => Ok(ClientStatus::Legacy),
            "PENDING" => Ok(ClientStatus::Pending),
            "INACTIVE" => Ok(ClientStatus::Inactive),
            "SUSPENDED" => Ok(ClientStatus::Suspended),
            other => Err(DomainError::validation(format!("unknown client status '{other}'"))),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SiteStatus {
    Active,
    Inactive,
    Archived,
}

impl SiteStatus {
    pub fn is_active(self) -> bool {
        matches!(self, SiteStatus::Active)
    }
}

impl FromStr for SiteStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ACTIVE" => Ok(SiteStatus::Active),
            "INACTIVE" => Ok(SiteStatus::Inactive),
            "ARCHIVED" => Ok(SiteStatus::Archived),
            other => Err(DomainError::validation(format!("unknown site status '{other}'"))),
        }
    }
}
