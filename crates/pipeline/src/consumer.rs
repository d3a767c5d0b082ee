//! Reference bundle consumer: applies updates and acknowledges them.
//!
//! A consumer listens for `CONTENT_BLOCKER_UPDATE_REQUIRED`, hands the
//! payload to a [`BundleApplier`] and answers with
//! `CONTENT_BLOCKER_EXTENSION_UPDATED`. The acknowledgement is what feeds
//! the publication cache.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::coalescer::Coalescer;
use crate::error::Result;
use crate::events::{BundleEvent, BundleUpdate, EventBus, ExtensionUpdated};

/// Applies a bundle payload to its runtime destination.
#[async_trait]
pub trait BundleApplier: Send + Sync {
    async fn apply(&self, update: &BundleUpdate) -> Result<()>;

    /// Human-readable name for logs (e.g. "file").
    fn name(&self) -> &str;
}

/// Writes each bundle payload to `<dir>/<bundle_id>.json`.
#[derive(Debug, Clone)]
pub struct FileApplier {
    dir: PathBuf,
}

impl FileApplier {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn bundle_path(&self, bundle_id: &str) -> PathBuf {
        self.dir.join(format!("{bundle_id}.json"))
    }
}

#[async_trait]
impl BundleApplier for FileApplier {
    async fn apply(&self, update: &BundleUpdate) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let final_path = self.bundle_path(&update.bundle_id);
        let tmp_path = self.dir.join(format!(".{}.tmp", update.bundle_id));

        tokio::fs::write(&tmp_path, update.payload.as_bytes()).await?;
        tokio::fs::rename(&tmp_path, &final_path).await?;

        info!(bundle_id = %update.bundle_id, path = %final_path.display(), "wrote bundle");
        Ok(())
    }

    fn name(&self) -> &str {
        "file"
    }
}

/// Spawn a consumer that applies every update and acknowledges it on `bus`.
///
/// A failed apply is still acknowledged, with `has_error` set, so the status
/// view reports the bundle as broken instead of stale. Updates skipped
/// because the consumer lagged are gone from the bus; when `resync` is
/// given, a lag schedules a republish of every bundle.
pub fn spawn_consumer<A>(
    bus: EventBus,
    applier: A,
    resync: Option<Arc<Coalescer>>,
) -> JoinHandle<()>
where
    A: BundleApplier + 'static,
{
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            let update = match rx.recv().await {
                Ok(BundleEvent::UpdateRequired(update)) => update,
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(consumer = applier.name(), skipped, "consumer lagged, updates dropped");
                    if let Some(coalescer) = &resync {
                        coalescer.schedule();
                    }
                    continue;
                }
                Err(RecvError::Closed) => break,
            };

            let mut info = update.info.clone();
            if let Err(e) = applier.apply(&update).await {
                warn!(
                    consumer = applier.name(),
                    bundle_id = %update.bundle_id,
                    error = %e,
                    "failed to apply bundle"
                );
                info.has_error = true;
            }

            bus.send(BundleEvent::ExtensionUpdated(ExtensionUpdated {
                bundle_id: update.bundle_id,
                info,
            }));
        }
    })
}
