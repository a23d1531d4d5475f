//! Redis pub/sub fan-out for access invalidations (optional).
//!
//! Redis pub/sub is not durable: a peer that is disconnected while a message
//! is published keeps its stale entries until their TTL expires.

use std::sync::Arc;
use std::thread;

use async_trait::async_trait;
use redis::Commands;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use inspectra_auth::IdpId;
use inspectra_core::{ClientId, SiteId};

use super::invalidation::{AccessInvalidation, InvalidationError, InvalidationMessage, LocalInvalidation};

pub const DEFAULT_CHANNEL: &str = "inspectra.access.invalidate";

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    origin: Uuid,
    message: InvalidationMessage,
}

/// Applies invalidations locally, then publishes them to every peer.
#[derive(Debug, Clone)]
pub struct RedisInvalidation {
    client: redis::Client,
    channel: String,
    origin: Uuid,
    local: Arc<LocalInvalidation>,
}

impl RedisInvalidation {
    pub fn new(
        redis_url: impl AsRef<str>,
        channel: impl Into<String>,
        local: Arc<LocalInvalidation>,
    ) -> Result<Self, InvalidationError> {
        let client = redis::Client::open(redis_url.as_ref()).map_err(|e| InvalidationError::Publish(e.to_string()))?;
        Ok(Self {
            client,
            channel: channel.into(),
            origin: Uuid::now_v7(),
            local,
        })
    }

    async fn publish(&self, message: InvalidationMessage) -> Result<(), InvalidationError> {
        let payload = serde_json::to_string(&Envelope {
            origin: self.origin,
            message,
        })
        .map_err(|e| InvalidationError::Encode(e.to_string()))?;

        let client = self.client.clone();
        let channel = self.channel.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = client.get_connection().map_err(|e| InvalidationError::Publish(e.to_string()))?;
            let _: i64 = conn
                .publish(&channel, payload)
                .map_err(|e| InvalidationError::Publish(e.to_string()))?;
            Ok(())
        })
        .await
        .map_err(|e| InvalidationError::Publish(e.to_string()))?
    }

    /// Subscribe on a background thread and apply peers' invalidations locally.
    ///
    /// Messages this instance published itself are skipped.
    pub fn spawn_listener(&self, runtime: tokio::runtime::Handle) -> thread::JoinHandle<()> {
        let client = self.client.clone();
        let channel = self.channel.clone();
        let origin = self.origin;
        let local = self.local.clone();

        thread::spawn(move || {
            let mut conn = match client.get_connection() {
                Ok(c) => c,
                Err(e) => {
                    warn!(error = %e, "invalidation listener could not connect");
                    return;
                }
            };

            let mut pubsub = conn.as_pubsub();
            if let Err(e) = pubsub.subscribe(&channel) {
                warn!(error = %e, channel, "invalidation listener could not subscribe");
                return;
            }

            loop {
                let msg = match pubsub.get_message() {
                    Ok(m) => m,
                    Err(e) => {
                        warn!(error = %e, "invalidation listener disconnected");
                        return;
                    }
                };

                let payload: String = match msg.get_payload() {
                    Ok(p) => p,
                    Err(_) => continue,
                };

                let envelope: Envelope = match serde_json::from_str(&payload) {
                    Ok(e) => e,
                    Err(e) => {
                        warn!(error = %e, "dropping malformed invalidation");
                        continue;
                    }
                };
                if envelope.origin == origin {
                    continue;
                }

                debug!(invalidation = ?envelope.message, "applying peer invalidation");
                if let Err(e) = runtime.block_on(envelope.message.apply(local.as_ref())) {
                    warn!(error = %e, "failed to apply peer invalidation");
                }
            }
        })
    }
}

#[async_trait]
impl AccessInvalidation for RedisInvalidation {
    async fn invalidate_grants(
        &self,
        principal: &IdpId,
        client_id: ClientId,
        sites: &[SiteId],
    ) -> Result<(), InvalidationError> {
        self.local.invalidate_grants(principal, client_id, sites).await?;
        self.publish(InvalidationMessage::Grants {
            idp_id: principal.clone(),
            client_id,
            site_ids: sites.to_vec(),
        })
        .await
    }

    async fn invalidate_site_tree(&self, client_id: ClientId) -> Result<(), InvalidationError> {
        self.local.invalidate_site_tree(client_id).await?;
        self.publish(InvalidationMessage::SiteTree { client_id }).await
    }
}
