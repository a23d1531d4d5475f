//! Per-unit-of-work request context.
//!
//! A [`RequestContext`] is installed for the duration of one request or job
//! with [`scope`] and read back anywhere downstream with [`current`], without
//! threading it through every call. Tasks spawned with `tokio::spawn` do not
//! inherit it; wrap them in [`scope`] again with the same `Arc`.

use std::future::Future;
use std::sync::{Arc, OnceLock};

use thiserror::Error;
use tracing::Instrument;
use uuid::Uuid;

use inspectra_auth::{EffectiveAccessGrant, Principal, RequestedTenantContext};

use crate::audit;

tokio::task_local! {
    static CURRENT: Arc<RequestContext>;
    static BYPASS: Arc<str>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Driven by an authenticated request.
    Interactive,
    /// Background job with no principal; data access defaults to bypass.
    Scheduled { job: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestMetadata {
    pub request_id: Option<Uuid>,
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
    pub requested_view: Option<String>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ContextError {
    #[error("access grant already resolved for this unit of work")]
    GrantAlreadySet,
}

#[derive(Debug)]
pub struct RequestContext {
    principal: Option<Principal>,
    requested: RequestedTenantContext,
    grant: OnceLock<EffectiveAccessGrant>,
    mode: ExecutionMode,
    metadata: RequestMetadata,
}

impl RequestContext {
    pub fn interactive(principal: Principal, requested: RequestedTenantContext, metadata: RequestMetadata) -> Self {
        Self {
            principal: Some(principal),
            requested,
            grant: OnceLock::new(),
            mode: ExecutionMode::Interactive,
            metadata,
        }
    }

    pub fn scheduled(job: impl Into<String>) -> Self {
        Self {
            principal: None,
            requested: RequestedTenantContext::default(),
            grant: OnceLock::new(),
            mode: ExecutionMode::Scheduled { job: job.into() },
            metadata: RequestMetadata::default(),
        }
    }

    /// Attach the resolved grant. A unit of work resolves exactly once.
    pub fn set_grant(&self, grant: EffectiveAccessGrant) -> Result<(), ContextError> {
        self.grant.set(grant).map_err(|_| ContextError::GrantAlreadySet)
    }

    pub fn with_grant(self, grant: EffectiveAccessGrant) -> Result<Self, ContextError> {
        self.set_grant(grant)?;
        Ok(self)
    }

    pub fn principal(&self) -> Option<&Principal> {
        self.principal.as_ref()
    }

    pub fn requested(&self) -> &RequestedTenantContext {
        &self.requested
    }

    pub fn grant(&self) -> Option<&EffectiveAccessGrant> {
        self.grant.get()
    }

    pub fn mode(&self) -> &ExecutionMode {
        &self.mode
    }

    pub fn metadata(&self) -> &RequestMetadata {
        &self.metadata
    }

    pub fn is_scheduled(&self) -> bool {
        matches!(self.mode, ExecutionMode::Scheduled { .. })
    }
}

/// Run `fut` with `ctx` as the current context.
pub async fn scope<F>(ctx: Arc<RequestContext>, fut: F) -> F::Output
where
    F: Future,
{
    CURRENT.scope(ctx, fut).await
}

/// The context of the enclosing unit of work, if any.
pub fn current() -> Option<Arc<RequestContext>> {
    CURRENT.try_with(Arc::clone).ok()
}

/// Run `fut` with data-access policies disabled.
///
/// Every entry is written to the audit log together with `reason`.
pub async fn with_bypass<F>(reason: &str, fut: F) -> F::Output
where
    F: Future,
{
    audit::policy_bypass(reason, None);
    BYPASS.scope(Arc::from(reason), fut).await
}

/// Reason of the innermost active bypass, if the caller is inside one.
pub fn bypass_reason() -> Option<Arc<str>> {
    BYPASS.try_with(Arc::clone).ok()
}

pub fn is_bypassed() -> bool {
    bypass_reason().is_some()
}

/// Bypass reason of a scheduled job's data access.
pub fn scheduled_reason(job: &str) -> String {
    format!("scheduled job {job}")
}

/// Run a background job under a fresh scheduled context.
pub async fn run_scheduled<F>(job: &str, fut: F) -> F::Output
where
    F: Future,
{
    let span = tracing::info_span!("scheduled_job", job);
    audit::policy_bypass(&scheduled_reason(job), None);
    let ctx = Arc::new(RequestContext::scheduled(job));
    CURRENT.scope(ctx, fut).instrument(span).await
}
