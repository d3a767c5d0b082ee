//! Last-known publication state per bundle, and the status query built on it.
//!
//! The cache is written from two places: acknowledgement events sent by
//! bundle consumers (`CONTENT_BLOCKER_EXTENSION_UPDATED`), and the publisher
//! when a bundle could not be published at all. Reads never wait for a run.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::{Arc, RwLock};

use rulecast_core::{BundleCatalog, PublicationInfo};
use serde::Serialize;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::coalescer::Coalescer;
use crate::events::BundleEvent;

/// Display state of one bundle in status views.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BundleStatus {
    /// Nothing recorded yet for this bundle.
    Pending,
    Ready,
    OverLimit,
    Error,
}

impl fmt::Display for BundleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BundleStatus::Pending => "pending",
            BundleStatus::Ready => "ready",
            BundleStatus::OverLimit => "over_limit",
            BundleStatus::Error => "error",
        };
        f.write_str(s)
    }
}

/// One row of the content blockers status view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContentBlockerInfo {
    pub bundle_id: String,
    pub categories: BTreeSet<String>,
    pub rules_info: Option<PublicationInfo>,
}

impl ContentBlockerInfo {
    pub fn status(&self) -> BundleStatus {
        match &self.rules_info {
            None => BundleStatus::Pending,
            Some(info) if info.has_error => BundleStatus::Error,
            Some(info) if info.over_limit => BundleStatus::OverLimit,
            Some(_) => BundleStatus::Ready,
        }
    }
}

/// Bundle id → most recent [`PublicationInfo`], last write wins.
#[derive(Debug, Default)]
pub struct PublicationCache {
    entries: RwLock<HashMap<String, Arc<PublicationInfo>>>,
}

impl PublicationCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store or replace the entry for `bundle_id`.
    pub fn store(&self, bundle_id: &str, info: PublicationInfo) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(bundle_id.to_string(), Arc::new(info));
    }

    pub fn get(&self, bundle_id: &str) -> Option<Arc<PublicationInfo>> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.get(bundle_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Apply an event; only acknowledgements with a bundle id are recorded.
    ///
    /// Returns whether the cache was updated.
    pub fn apply(&self, event: &BundleEvent) -> bool {
        match event {
            BundleEvent::ExtensionUpdated(ack) if !ack.bundle_id.is_empty() => {
                debug!(bundle_id = %ack.bundle_id, rules = ack.info.rule_count, "bundle update acknowledged");
                self.store(&ack.bundle_id, ack.info.clone());
                true
            }
            BundleEvent::ExtensionUpdated(_) => {
                warn!("acknowledgement without bundle id ignored");
                false
            }
            _ => false,
        }
    }

    /// One row per bundle known to the catalog, in catalog order.
    pub fn query(&self, catalog: &BundleCatalog) -> Vec<ContentBlockerInfo> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        catalog
            .bundle_ids()
            .into_iter()
            .map(|bundle_id| ContentBlockerInfo {
                bundle_id: bundle_id.to_string(),
                categories: catalog.categories_for_bundle(bundle_id),
                rules_info: entries.get(bundle_id).map(|i| (**i).clone()),
            })
            .collect()
    }

    /// Feed acknowledgements from the bus into the cache until it closes.
    ///
    /// Skipped acknowledgements cannot be recovered from the bus; when
    /// `resync` is given, a lag schedules a republish so every bundle is
    /// acknowledged again.
    pub fn spawn_listener(
        self: Arc<Self>,
        mut rx: broadcast::Receiver<BundleEvent>,
        resync: Option<Arc<Coalescer>>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        self.apply(&event);
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "publication cache listener lagged, events dropped");
                        if let Some(coalescer) = &resync {
                            coalescer.schedule();
                        }
                    }
                    Err(RecvError::Closed) => {
                        info!("event bus closed, publication cache listener stopping");
                        break;
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{EventBus, ExtensionUpdated};
    use std::time::Duration;

    fn ack(bundle_id: &str, count: usize) -> BundleEvent {
        BundleEvent::ExtensionUpdated(ExtensionUpdated {
            bundle_id: bundle_id.to_string(),
            info: PublicationInfo::count_only(bundle_id, count),
        })
    }

    #[test]
    fn query_lists_every_known_bundle() {
        let catalog = BundleCatalog::builtin();
        let cache = PublicationCache::new();
        let rows = cache.query(&catalog);

        assert_eq!(rows.len(), catalog.bundle_ids().len());
        assert!(rows.iter().all(|r| r.rules_info.is_none()));
        assert!(rows.iter().all(|r| r.status() == BundleStatus::Pending));
        assert!(cache.is_empty());
    }

    #[test]
    fn acknowledgement_overwrites_previous_entry() {
        let catalog = BundleCatalog::builtin();
        let bundle = catalog.bundle_for("privacy").unwrap().to_string();
        let cache = PublicationCache::new();

        assert!(cache.apply(&ack(&bundle, 10)));
        assert!(cache.apply(&ack(&bundle, 20)));

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&bundle).unwrap().rule_count, 20);
        let row = cache
            .query(&catalog)
            .into_iter()
            .find(|r| r.bundle_id == bundle)
            .unwrap();
        assert_eq!(row.status(), BundleStatus::Ready);
        assert!(row.categories.contains("privacy"));
    }

    #[test]
    fn empty_bundle_id_and_other_events_are_ignored() {
        let cache = PublicationCache::new();
        assert!(!cache.apply(&ack("", 1)));
        assert!(!cache.apply(&BundleEvent::Updated(rulecast_core::OverviewSummary {
            rules_count: 1,
            rules_over_limit: false,
            advanced_blocking_rules_count: 1,
        })));
        assert!(cache.is_empty());
    }

    #[test]
    fn status_reflects_error_and_limit_flags() {
        let mut info = PublicationInfo::new("b", 60_000, true, BTreeSet::new());
        let row = ContentBlockerInfo {
            bundle_id: "b".into(),
            categories: BTreeSet::new(),
            rules_info: Some(info.clone()),
        };
        assert_eq!(row.status(), BundleStatus::OverLimit);

        info.has_error = true;
        let row = ContentBlockerInfo {
            rules_info: Some(info),
            ..row
        };
        assert_eq!(row.status(), BundleStatus::Error);
    }

    #[tokio::test]
    async fn listener_records_acknowledgements_from_bus() {
        let bus = EventBus::new(16);
        let cache = Arc::new(PublicationCache::new());
        let handle = Arc::clone(&cache).spawn_listener(bus.subscribe(), None);

        bus.send(ack("x.bundle", 5));

        for _ in 0..50 {
            if cache.get("x.bundle").is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(cache.get("x.bundle").unwrap().rule_count, 5);

        drop(bus);
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn lagging_listener_schedules_a_republish() {
        use crate::coalescer::ReloadTask;
        use async_trait::async_trait;
        use std::sync::atomic::{AtomicUsize, Ordering};

        #[derive(Default)]
        struct Reloads(AtomicUsize);

        #[async_trait]
        impl ReloadTask for Reloads {
            async fn reload(&self) -> crate::error::Result<()> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }

        let reloads = Arc::new(Reloads::default());
        let coalescer = Arc::new(Coalescer::spawn(Duration::from_millis(500), reloads.clone()));
        let bus = EventBus::new(2);
        let cache = Arc::new(PublicationCache::new());
        let handle = Arc::clone(&cache).spawn_listener(bus.subscribe(), Some(coalescer));

        for id in ["a", "b", "c", "d"] {
            bus.send(ack(id, 1));
        }
        tokio::time::sleep(Duration::from_secs(2)).await;

        assert_eq!(reloads.0.load(Ordering::SeqCst), 1);
        // only the retained tail of the burst reached the cache
        assert!(cache.get("a").is_none());
        assert!(cache.get("d").is_some());
        handle.abort();
    }
}
