//! Typed notification bus between the pipeline and bundle consumers.
//!
//! Three event kinds flow over one broadcast channel:
//! - `CONTENT_BLOCKER_UPDATE_REQUIRED`: a bundle payload is ready (outbound)
//! - `CONTENT_BLOCKER_UPDATED`: aggregate summary after a run (outbound)
//! - `CONTENT_BLOCKER_EXTENSION_UPDATED`: a consumer applied a bundle (inbound)

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use rulecast_core::{OverviewSummary, PublicationInfo};
use tokio::sync::broadcast;
use tracing::debug;

use crate::error::PublishError;

/// Serialized bundle ready to be applied by its consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleUpdate {
    pub bundle_id: String,
    /// UTF-8 JSON array of rule texts. Shared between subscribers.
    pub payload: Arc<str>,
    pub info: PublicationInfo,
}

/// Acknowledgement sent by a consumer after applying a bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionUpdated {
    pub bundle_id: String,
    pub info: PublicationInfo,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BundleEvent {
    UpdateRequired(BundleUpdate),
    Updated(OverviewSummary),
    ExtensionUpdated(ExtensionUpdated),
}

/// Wire names of the event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    ContentBlockerUpdateRequired,
    ContentBlockerUpdated,
    ContentBlockerExtensionUpdated,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::ContentBlockerUpdateRequired => "CONTENT_BLOCKER_UPDATE_REQUIRED",
            EventKind::ContentBlockerUpdated => "CONTENT_BLOCKER_UPDATED",
            EventKind::ContentBlockerExtensionUpdated => "CONTENT_BLOCKER_EXTENSION_UPDATED",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl BundleEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            BundleEvent::UpdateRequired(_) => EventKind::ContentBlockerUpdateRequired,
            BundleEvent::Updated(_) => EventKind::ContentBlockerUpdated,
            BundleEvent::ExtensionUpdated(_) => EventKind::ContentBlockerExtensionUpdated,
        }
    }
}

/// Destination for events produced by the pipeline.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn emit(&self, event: BundleEvent) -> Result<(), PublishError>;
}

/// Blanket implementation so `Arc<dyn EventSink>` can be used directly.
#[async_trait]
impl<T: EventSink + ?Sized> EventSink for Arc<T> {
    async fn emit(&self, event: BundleEvent) -> Result<(), PublishError> {
        (**self).emit(event).await
    }
}

/// In-process publish/subscribe bus backed by a tokio broadcast channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<BundleEvent>,
    capacity: usize,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Smallest capacity holding one full run for `bundles` bundles: an
    /// update and an acknowledgement per bundle plus the aggregate event.
    pub fn run_capacity(bundles: usize) -> usize {
        2 * bundles + 1
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BundleEvent> {
        self.tx.subscribe()
    }

    /// Broadcast an event, returning how many subscribers it reached.
    ///
    /// Having no subscribers is not a failure: the event is simply dropped.
    pub fn send(&self, event: BundleEvent) -> usize {
        let kind = event.kind();
        match self.tx.send(event) {
            Ok(n) => n,
            Err(_) => {
                debug!(event = %kind, "no subscribers, event dropped");
                0
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[async_trait]
impl EventSink for EventBus {
    async fn emit(&self, event: BundleEvent) -> Result<(), PublishError> {
        self.send(event);
        Ok(())
    }
}
