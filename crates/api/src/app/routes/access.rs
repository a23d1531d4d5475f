use std::sync::Arc;

use axum::{
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use inspectra_auth::{authorize, Capability, Scope};
use inspectra_infra::{access::InvalidationMessage, context};

use crate::app::errors::{internal_error, json_error};
use crate::app::services::AppServices;

/// Sites the caller's grant can see, expanded through the site hierarchy.
pub async fn visible_sites(Extension(services): Extension<Arc<AppServices>>) -> Response {
    let Some(grant) = context::current().and_then(|ctx| ctx.grant().cloned()) else {
        tracing::error!("visible-sites reached without a resolved access context");
        return internal_error();
    };

    match services.sites.visible_site_ids(&grant).await {
        Ok(visible) => Json(visible).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "failed to expand visible sites");
            internal_error()
        }
    }
}

/// Drop cached grants or site trees after an out-of-band membership change.
///
/// Callers below GLOBAL scope may only invalidate their own client.
pub async fn invalidate(
    Extension(services): Extension<Arc<AppServices>>,
    Json(message): Json<InvalidationMessage>,
) -> Response {
    let Some(grant) = context::current().and_then(|ctx| ctx.grant().cloned()) else {
        tracing::error!("invalidation reached without a resolved access context");
        return internal_error();
    };

    if let Err(e) = authorize(&grant, Capability::ManageUsers) {
        return json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    let target = match &message {
        InvalidationMessage::Grants { client_id, .. } | InvalidationMessage::SiteTree { client_id } => *client_id,
    };
    if !grant.scope.is_at_least(Scope::Global) && grant.client_id != Some(target) {
        return json_error(StatusCode::FORBIDDEN, "forbidden", "cannot invalidate another client");
    }

    match message.apply(services.invalidation.as_ref()).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => {
            tracing::error!(error = %e, "invalidation failed");
            internal_error()
        }
    }
}
