//! Serializes bundles and announces them on the event sink.
//!
//! Each bundle publication produces a [`PublishOutcome`] value. A failure
//! for one bundle is logged, recorded as `has_error` in its info and in the
//! publication cache, and never stops the remaining bundles.

use std::sync::Arc;

use rulecast_core::{OverviewSummary, PublicationInfo};
use tracing::{error, info};

use crate::cache::PublicationCache;
use crate::error::PublishError;
use crate::events::{BundleEvent, BundleUpdate, EventSink};

/// Encode rule texts as the bundle wire format: a JSON array of strings.
pub fn encode_bundle(texts: &[&str]) -> Result<String, PublishError> {
    Ok(serde_json::to_string(texts)?)
}

/// Result of one bundle publication attempt.
#[derive(Debug)]
pub struct PublishOutcome {
    pub bundle_id: String,
    /// Info as announced, or flagged with `has_error` when the attempt failed.
    pub info: PublicationInfo,
    pub result: Result<(), PublishError>,
}

impl PublishOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

pub struct BundlePublisher {
    sink: Arc<dyn EventSink>,
    cache: Arc<PublicationCache>,
}

impl BundlePublisher {
    pub fn new(sink: Arc<dyn EventSink>, cache: Arc<PublicationCache>) -> Self {
        Self { sink, cache }
    }

    /// Serialize `texts` and emit a `CONTENT_BLOCKER_UPDATE_REQUIRED` event.
    pub async fn publish(
        &self,
        bundle_id: &str,
        texts: &[&str],
        info: PublicationInfo,
    ) -> PublishOutcome {
        info!(bundle_id = %bundle_id, rules = texts.len(), "setting content blocker json");

        let result = match encode_bundle(texts) {
            Ok(payload) => {
                let update = BundleUpdate {
                    bundle_id: bundle_id.to_string(),
                    payload: Arc::from(payload),
                    info: info.clone(),
                };
                self.sink.emit(BundleEvent::UpdateRequired(update)).await
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => PublishOutcome {
                bundle_id: bundle_id.to_string(),
                info,
                result: Ok(()),
            },
            Err(e) => {
                error!(bundle_id = %bundle_id, error = %e, "failed to set content blocker");
                let info = info.failed();
                // no acknowledgement will arrive for this bundle
                self.cache.store(bundle_id, info.clone());
                PublishOutcome {
                    bundle_id: bundle_id.to_string(),
                    info,
                    result: Err(e),
                }
            }
        }
    }

    /// Emit the aggregate `CONTENT_BLOCKER_UPDATED` event.
    pub async fn announce(&self, summary: OverviewSummary) -> Result<(), PublishError> {
        self.sink.emit(BundleEvent::Updated(summary)).await.map_err(|e| {
            error!(error = %e, "failed to announce content blocker overview");
            e
        })
    }
}
