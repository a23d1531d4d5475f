//! Change notifications for successful writes.
//!
//! Events are handed to the sink only after the enclosing transaction has
//! committed; rolled-back work never produces notifications.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use inspectra_auth::IdpId;
use inspectra_core::{ClientId, SiteId};

use super::statement::{ResourceKind, WriteOp};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataChangeEvent {
    pub event_id: Uuid,
    pub resource: ResourceKind,
    pub op: WriteOp,
    pub client_id: Option<ClientId>,
    pub site_id: Option<SiteId>,
    /// `None` for scheduled jobs.
    pub actor: Option<IdpId>,
    pub request_id: Option<Uuid>,
    pub rows_affected: u64,
    pub occurred_at: DateTime<Utc>,
}

pub trait DataChangeSink: Send + Sync {
    fn emit(&self, event: DataChangeEvent);
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopDataChangeSink;

impl DataChangeSink for NoopDataChangeSink {
    fn emit(&self, _event: DataChangeEvent) {}
}

/// Lossy in-process fan-out; slow subscribers miss events.
#[derive(Debug, Clone)]
pub struct BroadcastDataChangeSink {
    tx: broadcast::Sender<DataChangeEvent>,
}

impl BroadcastDataChangeSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DataChangeEvent> {
        self.tx.subscribe()
    }
}

impl DataChangeSink for BroadcastDataChangeSink {
    fn emit(&self, event: DataChangeEvent) {
        // No subscribers is fine.
        let _ = self.tx.send(event);
    }
}
