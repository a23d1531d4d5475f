//! Data-access policy inputs pushed into every database session.

use std::sync::Arc;

use tracing::{debug, error};

use inspectra_auth::{EffectiveAccessGrant, Scope, VisibleSites};
use inspectra_core::{ClientId, SiteId};

use super::error::DataAccessError;
use super::session::SessionSetting;
use crate::context::{self, ExecutionMode};
use crate::sites::SiteVisibility;

pub const CURRENT_CLIENT_ID: &str = "app.current_client_id";
pub const CURRENT_SITE_ID: &str = "app.current_site_id";
pub const ALLOWED_SITE_IDS: &str = "app.allowed_site_ids";
pub const CURRENT_SCOPE: &str = "app.current_scope";
pub const BYPASS_RLS: &str = "app.bypass_rls";

/// Allowed-site value meaning "no site restriction".
pub const ALL_SITES: &str = "*";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyInputs {
    pub client_id: Option<ClientId>,
    pub site_id: Option<SiteId>,
    pub allowed_sites: VisibleSites,
    pub scope: Scope,
}

/// What one statement or transaction may see. Built fresh per use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataAccessPolicy {
    Bypass { reason: String },
    Scoped(PolicyInputs),
}

impl DataAccessPolicy {
    pub fn is_bypass(&self) -> bool {
        matches!(self, DataAccessPolicy::Bypass { .. })
    }

    pub fn client_id(&self) -> Option<ClientId> {
        match self {
            DataAccessPolicy::Bypass { .. } => None,
            DataAccessPolicy::Scoped(inputs) => inputs.client_id,
        }
    }

    /// Session settings that enforce this policy.
    ///
    /// Bypass sets only the bypass flag. Scoped policies always set every
    /// input, so a value from an earlier statement can never carry over.
    pub fn settings(&self) -> Vec<SessionSetting> {
        match self {
            DataAccessPolicy::Bypass { .. } => vec![SessionSetting::new(BYPASS_RLS, "on")],
            DataAccessPolicy::Scoped(inputs) => vec![
                SessionSetting::new(BYPASS_RLS, "off"),
                SessionSetting::new(CURRENT_CLIENT_ID, opt_to_string(inputs.client_id)),
                SessionSetting::new(CURRENT_SITE_ID, opt_to_string(inputs.site_id)),
                SessionSetting::new(ALLOWED_SITE_IDS, allowed_sites_value(&inputs.allowed_sites)),
                SessionSetting::new(CURRENT_SCOPE, inputs.scope.as_str()),
            ],
        }
    }
}

fn opt_to_string<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// `*` for unrestricted, otherwise a comma-joined id list (possibly empty).
pub fn allowed_sites_value(sites: &VisibleSites) -> String {
    match sites {
        VisibleSites::All => ALL_SITES.to_string(),
        VisibleSites::Sites(ids) => ids.iter().map(ToString::to_string).collect::<Vec<_>>().join(","),
    }
}

/// Builds the policy for the current unit of work from the ambient context.
#[derive(Debug, Clone)]
pub struct PolicyBuilder {
    sites: Arc<SiteVisibility>,
}

impl PolicyBuilder {
    pub fn new(sites: Arc<SiteVisibility>) -> Self {
        Self { sites }
    }

    pub async fn current(&self) -> Result<DataAccessPolicy, DataAccessError> {
        if let Some(reason) = context::bypass_reason() {
            return Ok(DataAccessPolicy::Bypass {
                reason: reason.to_string(),
            });
        }

        let Some(ctx) = context::current() else {
            error!("statement issued outside any request or job context");
            return Err(DataAccessError::PolicyInputsRequired);
        };

        if let ExecutionMode::Scheduled { job } = ctx.mode() {
            debug!(job = %job, "scheduled job uses bypass data access");
            return Ok(DataAccessPolicy::Bypass {
                reason: context::scheduled_reason(job),
            });
        }

        match ctx.grant() {
            Some(grant) => Ok(DataAccessPolicy::Scoped(self.inputs_for(grant).await?)),
            None => {
                error!("statement issued before the access grant was resolved");
                Err(DataAccessError::PolicyInputsRequired)
            }
        }
    }

    pub async fn inputs_for(&self, grant: &EffectiveAccessGrant) -> Result<PolicyInputs, DataAccessError> {
        let allowed_sites = self.sites.visible_site_ids(grant).await?;
        Ok(PolicyInputs {
            client_id: grant.client_id,
            site_id: grant.site_id,
            allowed_sites,
            scope: grant.scope,
        })
    }
}
