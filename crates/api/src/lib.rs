//! HTTP entry boundary: token verification, tenant switching and access
//! resolution in front of a small set of routes.

pub mod app;
pub mod middleware;
pub mod verifier;
