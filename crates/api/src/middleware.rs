use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use uuid::Uuid;

use inspectra_auth::{AccessIntent, AuthenticationError, IdentityVerifier, RequestedTenantContext};
use inspectra_core::{ClientId, SiteId};
use inspectra_infra::{context, AccessError, AccessResolver, RequestContext, RequestMetadata};

use crate::app::errors::{access_error_to_response, internal_error, json_error};

pub const CLIENT_HEADER: &str = "x-client-id";
pub const SITE_HEADER: &str = "x-site-id";
pub const INTENT_HEADER: &str = "x-access-intent";
pub const VIEW_HEADER: &str = "x-requested-view";
pub const REQUEST_ID_HEADER: &str = "x-request-id";
pub const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

#[derive(Clone)]
pub struct AuthState {
    pub verifier: Arc<dyn IdentityVerifier>,
    pub resolver: Arc<AccessResolver>,
}

/// Authenticate the caller, resolve their grant for the requested tenant and
/// run the rest of the request inside that access context.
pub async fn access_middleware(
    State(state): State<AuthState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, Response> {
    let token = extract_bearer(req.headers())
        .map_err(|e| json_error(StatusCode::UNAUTHORIZED, "unauthorized", e.to_string()))?;

    let principal = state.verifier.verify(token, Utc::now()).map_err(|e| {
        tracing::debug!(error = %e, "bearer token rejected");
        json_error(StatusCode::UNAUTHORIZED, "unauthorized", e.to_string())
    })?;

    let requested = requested_tenant(req.headers())
        .map_err(|message| json_error(StatusCode::BAD_REQUEST, "invalid_tenant_header", message))?;

    let grant = state
        .resolver
        .resolve(&principal, &requested)
        .await
        .map_err(|e: AccessError| access_error_to_response(&e))?;

    let metadata = request_metadata(req.headers());
    let ctx = RequestContext::interactive(principal, requested, metadata)
        .with_grant(grant)
        .map_err(|e| {
            tracing::error!(error = %e, "request context already carries a grant");
            internal_error()
        })?;
    let ctx = Arc::new(ctx);
    req.extensions_mut().insert(ctx.clone());

    Ok(context::scope(ctx, next.run(req)).await)
}

fn extract_bearer(headers: &HeaderMap) -> Result<&str, AuthenticationError> {
    let header = headers
        .get(axum::http::header::AUTHORIZATION)
        .ok_or(AuthenticationError::MissingToken)?;

    let header = header
        .to_str()
        .map_err(|_| AuthenticationError::Malformed("authorization header is not ascii".into()))?;

    let header = header
        .strip_prefix("Bearer ")
        .ok_or_else(|| AuthenticationError::Malformed("expected a bearer token".into()))?;

    let token = header.trim();
    if token.is_empty() {
        return Err(AuthenticationError::MissingToken);
    }

    Ok(token)
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Tenant-switch headers. Absent headers mean "my default tenant".
pub fn requested_tenant(headers: &HeaderMap) -> Result<RequestedTenantContext, String> {
    let client_id = header_str(headers, CLIENT_HEADER)
        .map(|raw| raw.parse::<ClientId>().map_err(|e| format!("{CLIENT_HEADER}: {e}")))
        .transpose()?;
    let site_id = header_str(headers, SITE_HEADER)
        .map(|raw| raw.parse::<SiteId>().map_err(|e| format!("{SITE_HEADER}: {e}")))
        .transpose()?;
    let intent = header_str(headers, INTENT_HEADER)
        .map(|raw| raw.parse::<AccessIntent>().map_err(|e| format!("{INTENT_HEADER}: {e}")))
        .transpose()?
        .unwrap_or_default();

    if site_id.is_some() && client_id.is_none() {
        return Err(format!("{SITE_HEADER} requires {CLIENT_HEADER}"));
    }

    Ok(RequestedTenantContext {
        client_id,
        site_id,
        intent,
    })
}

fn request_metadata(headers: &HeaderMap) -> RequestMetadata {
    RequestMetadata {
        request_id: header_str(headers, REQUEST_ID_HEADER)
            .and_then(|raw| raw.parse::<Uuid>().ok())
            .or_else(|| Some(Uuid::now_v7())),
        client_ip: header_str(headers, FORWARDED_FOR_HEADER)
            .and_then(|raw| raw.split(',').next())
            .map(|ip| ip.trim().to_string()),
        user_agent: header_str(headers, axum::http::header::USER_AGENT.as_str()).map(str::to_string),
        requested_view: header_str(headers, VIEW_HEADER).map(str::to_string),
    }
}
