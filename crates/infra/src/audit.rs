//! Audit trail for access escalations and data-access policy bypasses.
//!
//! Every path that turns row policies off (explicit [`with_bypass`], scheduled
//! jobs, the membership store's own reads) reports through
//! [`policy_bypass`], under [`AUDIT_TARGET`].
//!
//! [`with_bypass`]: crate::context::with_bypass

pub use inspectra_observability::AUDIT_TARGET;

use crate::context;

/// Reason recorded for the membership store's own bypassed reads.
pub const MEMBERSHIP_LOOKUP: &str = "membership lookup";

/// Record that data access is about to run with row policies disabled.
pub fn policy_bypass(reason: &str, operation: Option<&str>) {
    let ctx = context::current();
    tracing::info!(
        target: AUDIT_TARGET,
        reason,
        operation,
        idp_id = ctx.as_ref().and_then(|c| c.principal()).map(|p| p.idp_id().as_str()),
        "data access policy bypass"
    );
}
