use axum::{
    routing::{get, post},
    Router,
};

pub mod access;
pub mod system;

/// Router for all authenticated (tenant-scoped) endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .route("/visible-sites", get(access::visible_sites))
        .route("/access/invalidations", post(access::invalidate))
}
