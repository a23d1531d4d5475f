//! Infrastructure layer: grant resolution, request context, site visibility
//! and the tenant-scoped database interceptor.

pub mod access;
pub mod audit;
pub mod config;
pub mod context;
pub mod db;
pub mod sites;


pub use access::{AccessError, AccessResolver};
pub use config::{AccessConfig, ConfigError};
pub use context::{ExecutionMode, RequestContext, RequestMetadata};
pub use db::{DataAccessError, ScopedDatabase};
pub use sites::{SiteVisibility, SiteVisibilityError};
