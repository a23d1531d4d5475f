//! Explicit cache invalidation port.
//!
//! Membership and site-tree mutations call into [`AccessInvalidation`] after
//! they commit. [`LocalInvalidation`] drops the in-process caches; the Redis
//! adapter (feature `redis`) additionally fans the message out to peers.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use inspectra_auth::IdpId;
use inspectra_core::{ClientId, SiteId};

use super::resolver::AccessResolver;
use crate::sites::SiteVisibility;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InvalidationError {
    #[error("failed to publish invalidation: {0}")]
    Publish(String),

    #[error("failed to encode invalidation: {0}")]
    Encode(String),
}

#[async_trait]
pub trait AccessInvalidation: Send + Sync {
    /// A membership of `principal` in `client_id` was created, changed or removed.
    async fn invalidate_grants(
        &self,
        principal: &IdpId,
        client_id: ClientId,
        sites: &[SiteId],
    ) -> Result<(), InvalidationError>;

    /// Sites of `client_id` were added, removed or re-parented.
    async fn invalidate_site_tree(&self, client_id: ClientId) -> Result<(), InvalidationError>;
}

#[async_trait]
impl<T> AccessInvalidation for Arc<T>
where
    T: AccessInvalidation + ?Sized,
{
    async fn invalidate_grants(
        &self,
        principal: &IdpId,
        client_id: ClientId,
        sites: &[SiteId],
    ) -> Result<(), InvalidationError> {
        (**self).invalidate_grants(principal, client_id, sites).await
    }

    async fn invalidate_site_tree(&self, client_id: ClientId) -> Result<(), InvalidationError> {
        (**self).invalidate_site_tree(client_id).await
    }
}

/// Invalidation of this process's caches.
#[derive(Debug, Clone)]
pub struct LocalInvalidation {
    resolver: Arc<AccessResolver>,
    sites: Arc<SiteVisibility>,
}

impl LocalInvalidation {
    pub fn new(resolver: Arc<AccessResolver>, sites: Arc<SiteVisibility>) -> Self {
        Self { resolver, sites }
    }
}

#[async_trait]
impl AccessInvalidation for LocalInvalidation {
    async fn invalidate_grants(
        &self,
        principal: &IdpId,
        client_id: ClientId,
        sites: &[SiteId],
    ) -> Result<(), InvalidationError> {
        self.resolver.invalidate(principal, client_id, sites).await;
        Ok(())
    }

    async fn invalidate_site_tree(&self, client_id: ClientId) -> Result<(), InvalidationError> {
        debug!(client_id = %client_id, "invalidating site tree");
        self.sites.invalidate_client(client_id).await;
        Ok(())
    }
}

/// Wire form of an invalidation, for cross-process fan-out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InvalidationMessage {
    Grants {
        idp_id: IdpId,
        client_id: ClientId,
        site_ids: Vec<SiteId>,
    },
    SiteTree {
        client_id: ClientId,
    },
}

impl InvalidationMessage {
    pub async fn apply<T>(&self, target: &T) -> Result<(), InvalidationError>
    where
        T: AccessInvalidation + ?Sized,
    {
        match self {
            InvalidationMessage::Grants {
                idp_id,
                client_id,
                site_ids,
            } => target.invalidate_grants(idp_id, *client_id, site_ids).await,
            InvalidationMessage::SiteTree { client_id } => target.invalidate_site_tree(*client_id).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl AccessInvalidation for Recorder {
        async fn invalidate_grants(
            &self,
            principal: &IdpId,
            client_id: ClientId,
            sites: &[SiteId],
        ) -> Result<(), InvalidationError> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("grants:{principal}:{client_id}:{}", sites.len()));
            Ok(())
        }

        async fn invalidate_site_tree(&self, client_id: ClientId) -> Result<(), InvalidationError> {
            self.calls.lock().unwrap().push(format!("tree:{client_id}"));
            Ok(())
        }
    }

    #[tokio::test]
    async fn messages_dispatch_to_the_matching_call() {
        let recorder = Recorder::default();
        let client_id = ClientId::new();

        InvalidationMessage::Grants {
            idp_id: IdpId::new("auth0|m"),
            client_id,
            site_ids: vec![SiteId::new()],
        }
        .apply(&recorder)
        .await
        .unwrap();
        InvalidationMessage::SiteTree { client_id }.apply(&recorder).await.unwrap();

        let calls = recorder.calls.lock().unwrap().clone();
        assert_eq!(calls, vec![format!("grants:auth0|m:{client_id}:1"), format!("tree:{client_id}")]);
    }

    #[test]
    fn wire_format_is_tagged() {
        let client_id = ClientId::new();
        let json = serde_json::to_value(InvalidationMessage::SiteTree { client_id }).unwrap();
        assert_eq!(json["kind"], "site_tree");
        assert_eq!(json["client_id"], client_id.to_string());
    }
}
