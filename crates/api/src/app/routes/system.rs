use std::sync::Arc;

use axum::{
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use inspectra_auth::{EffectiveAccessGrant, IdpId};
use inspectra_infra::RequestContext;

use crate::app::errors::internal_error;

pub async fn health() -> StatusCode {
    StatusCode::OK
}

#[derive(Debug, Serialize)]
struct WhoAmI<'a> {
    idp_id: &'a IdpId,
    email: &'a str,
    display_name: String,
    intent: &'static str,
    requested_view: Option<&'a str>,
    ephemeral: bool,
    grant: &'a EffectiveAccessGrant,
}

pub async fn whoami(Extension(ctx): Extension<Arc<RequestContext>>) -> Response {
    let (Some(principal), Some(grant)) = (ctx.principal(), ctx.grant()) else {
        tracing::error!("whoami reached without a resolved access context");
        return internal_error();
    };

    Json(WhoAmI {
        idp_id: principal.idp_id(),
        email: principal.email(),
        display_name: principal.display_name(),
        intent: ctx.requested().intent.as_str(),
        requested_view: ctx.metadata().requested_view.as_deref(),
        ephemeral: grant.is_ephemeral(),
        grant,
    })
    .into_response()
}
