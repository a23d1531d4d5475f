//! Access grant resolution and its supporting stores and caches.

pub mod cache;
pub mod invalidation;
pub mod postgres;
#[cfg(feature = "redis")]
pub mod redis_pubsub;
pub mod resolver;
pub mod store;

pub use cache::{CacheError, GrantCache, GrantCacheKey, MokaGrantCache};
pub use invalidation::{AccessInvalidation, InvalidationError, InvalidationMessage, LocalInvalidation};
pub use postgres::PgMembershipStore;
#[cfg(feature = "redis")]
pub use redis_pubsub::RedisInvalidation;
pub use resolver::{AccessError, AccessResolver};
pub use store::{InMemoryMembershipStore, MembershipStore, SiteRecord, StoreError};
