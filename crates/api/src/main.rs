use std::sync::Arc;

use anyhow::Context;

use inspectra_api::app::{build_app, AppServices};
use inspectra_infra::access::{InMemoryMembershipStore, MembershipStore, PgMembershipStore};
use inspectra_infra::AccessConfig;

const BIND_ADDR: &str = "INSPECTRA_BIND_ADDR";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    inspectra_observability::init();

    let config = AccessConfig::from_env().context("invalid access configuration")?;

    let jwt_secret = std::env::var("JWT_SECRET").unwrap_or_else(|_| {
        tracing::warn!("JWT_SECRET not set; using insecure dev default");
        "dev-secret".to_string()
    });

    let store: Arc<dyn MembershipStore> = match &config.database_url {
        Some(url) => {
            let pool = sqlx::postgres::PgPoolOptions::new()
                .max_connections(10)
                .connect(url)
                .await
                .context("failed to connect to postgres")?;
            Arc::new(PgMembershipStore::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set; using an empty in-memory membership store");
            Arc::new(InMemoryMembershipStore::new())
        }
    };

    let services = AppServices::new(store, &config);
    #[cfg(feature = "redis")]
    let services = with_redis_invalidation(services, &config)?;

    let app = build_app(jwt_secret, Arc::new(services));

    let bind_addr = std::env::var(BIND_ADDR).unwrap_or_else(|_| "0.0.0.0:8080".to_string());
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(feature = "redis")]
fn with_redis_invalidation(services: AppServices, config: &AccessConfig) -> anyhow::Result<AppServices> {
    use inspectra_infra::access::{redis_pubsub::DEFAULT_CHANNEL, LocalInvalidation, RedisInvalidation};

    let Some(url) = &config.redis_url else {
        tracing::warn!("REDIS_URL not set; access invalidations stay local to this process");
        return Ok(services);
    };

    let local = Arc::new(LocalInvalidation::new(services.resolver.clone(), services.sites.clone()));
    let redis = RedisInvalidation::new(url, DEFAULT_CHANNEL, local).context("failed to open redis client")?;
    redis.spawn_listener(tokio::runtime::Handle::current());

    Ok(services.with_invalidation(Arc::new(redis)))
}
