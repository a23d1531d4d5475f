//! HTTP application wiring (Axum router + engine services).
//!
//! - `services.rs`: resolver, site visibility and invalidation wiring
//! - `routes/`: HTTP handlers
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{routing::get, Extension, Router};
use tower::ServiceBuilder;

use crate::middleware;
use crate::verifier::Hs256IdentityVerifier;

pub mod errors;
pub mod routes;
pub mod services;

pub use services::AppServices;

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub fn build_app(jwt_secret: String, services: Arc<AppServices>) -> Router {
    let auth_state = middleware::AuthState {
        verifier: Arc::new(Hs256IdentityVerifier::new(jwt_secret.into_bytes())),
        resolver: services.resolver.clone(),
    };

    // Protected routes: require a verified principal and a resolved grant.
    let protected = routes::router()
        .layer(Extension(services))
        .layer(axum::middleware::from_fn_with_state(
            auth_state,
            middleware::access_middleware,
        ));

    Router::new()
        .route("/health", get(routes::system::health))
        .merge(protected)
        .layer(ServiceBuilder::new())
}
