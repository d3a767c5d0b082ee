//! Long-lived content blocker service wiring the pipeline together.
//!
//! The service owns the event bus, the publication cache and its listener,
//! the pipeline and the coalescer in front of it. Callers signal rule changes
//! with [`ContentBlockerService::update_content_blocker`] and read bundle
//! state with [`ContentBlockerService::get_content_blockers_info`].

use std::path::Path;
use std::sync::Arc;

use rulecast_core::config::PipelineConfig;
use rulecast_core::{BundleCatalog, PublicationInfo};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::assembler::RuleAssembler;
use crate::cache::{ContentBlockerInfo, PublicationCache};
use crate::coalescer::Coalescer;
use crate::consumer::{self, BundleApplier};
use crate::error::Result;
use crate::events::{BundleEvent, EventBus, ExtensionUpdated};
use crate::limit::LimitEnforcer;
use crate::partition::Partitioner;
use crate::pipeline::{BundlePipeline, RunReport};
use crate::sources::{
    AllowListFile, AllowListRepository, FilterDirRepository, KeyValueStore, RuleRepository,
    SettingsProvider, StoreSettings,
};
use crate::watcher::{ALLOWLIST_FILE, FILTERS_DIR, SETTINGS_FILE};

/// The three collaborators the assembler reads from.
#[derive(Clone)]
pub struct Sources {
    pub rules: Arc<dyn RuleRepository>,
    pub allowlist: Arc<dyn AllowListRepository>,
    pub settings: Arc<dyn SettingsProvider>,
}

impl Sources {
    /// File-backed sources under `data_dir`:
    /// `filters/<id>.txt`, `allowlist.txt` and `settings.json`.
    pub fn from_data_dir(data_dir: &Path) -> Result<Self> {
        let store = KeyValueStore::open(data_dir.join(SETTINGS_FILE))?;
        Ok(Self {
            rules: Arc::new(FilterDirRepository::new(data_dir.join(FILTERS_DIR))),
            allowlist: Arc::new(AllowListFile::new(data_dir.join(ALLOWLIST_FILE))),
            settings: Arc::new(StoreSettings::new(Arc::new(store))),
        })
    }
}

pub struct ContentBlockerService {
    bus: EventBus,
    cache: Arc<PublicationCache>,
    catalog: Arc<BundleCatalog>,
    pipeline: Arc<BundlePipeline>,
    coalescer: Arc<Coalescer>,
    listener: JoinHandle<()>,
}

impl ContentBlockerService {
    /// Build and start the service on the current tokio runtime.
    pub fn start(
        config: &PipelineConfig,
        sources: Sources,
        catalog: Arc<BundleCatalog>,
        partitioner: Arc<dyn Partitioner>,
    ) -> Result<Self> {
        let bus = EventBus::new(event_capacity(config, &catalog));
        let cache = Arc::new(PublicationCache::new());
        // subscribe before anything can be published
        let acks = bus.subscribe();

        let assembler = RuleAssembler::new(sources.rules, sources.allowlist, sources.settings);
        let pipeline = Arc::new(BundlePipeline::new(
            assembler,
            partitioner,
            Arc::clone(&catalog),
            LimitEnforcer::new(config.rules_limit),
            Arc::new(bus.clone()),
            Arc::clone(&cache),
        )?);
        let coalescer = Arc::new(Coalescer::spawn(config.debounce(), pipeline.clone()));
        let listener = Arc::clone(&cache).spawn_listener(acks, Some(Arc::clone(&coalescer)));

        info!(
            bundles = catalog.bundle_ids().len(),
            debounce_ms = config.debounce_ms,
            event_capacity = bus.capacity(),
            rules_limit = config.rules_limit,
            "content blocker service started"
        );
        Ok(Self {
            bus,
            cache,
            catalog,
            pipeline,
            coalescer,
            listener,
        })
    }

    /// Signal that rules may have changed. Bursts collapse into one run.
    pub fn update_content_blocker(&self) {
        self.coalescer.schedule();
    }

    /// Run the pipeline immediately, bypassing the debounce window.
    ///
    /// Never overlaps with a coalesced run.
    pub async fn run_now(&self) -> Result<RunReport> {
        self.pipeline.run().await
    }

    /// Current state of every bundle, in catalog order.
    pub fn get_content_blockers_info(&self) -> Vec<ContentBlockerInfo> {
        self.cache.query(&self.catalog)
    }

    /// Record that an out-of-process consumer applied a bundle.
    pub fn acknowledge(&self, bundle_id: &str, info: PublicationInfo) {
        self.bus.send(BundleEvent::ExtensionUpdated(ExtensionUpdated {
            bundle_id: bundle_id.to_string(),
            info,
        }));
    }

    /// Run `applier` against the bus. A lagging consumer triggers a
    /// republish through the coalescer.
    pub fn spawn_consumer<A>(&self, applier: A) -> JoinHandle<()>
    where
        A: BundleApplier + 'static,
    {
        consumer::spawn_consumer(self.bus.clone(), applier, Some(self.coalescer()))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BundleEvent> {
        self.bus.subscribe()
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn catalog(&self) -> &Arc<BundleCatalog> {
        &self.catalog
    }

    pub fn cache(&self) -> &Arc<PublicationCache> {
        &self.cache
    }

    /// Shared handle for schedulers such as the data directory watcher.
    pub fn coalescer(&self) -> Arc<Coalescer> {
        Arc::clone(&self.coalescer)
    }

    /// Flush a pending coalesced run and stop background tasks.
    ///
    /// Handles returned by [`Self::coalescer`] may still be alive; signals
    /// sent through them afterwards are ignored.
    pub async fn shutdown(self) {
        self.coalescer.shutdown().await;
        self.listener.abort();
        info!("content blocker service stopped");
    }
}

/// Configured bus capacity, raised to hold at least one full run.
fn event_capacity(config: &PipelineConfig, catalog: &BundleCatalog) -> usize {
    let needed = EventBus::run_capacity(catalog.bundle_ids().len());
    if config.event_capacity < needed {
        warn!(
            configured = config.event_capacity,
            needed, "event capacity too small for one run, raising it"
        );
        needed
    } else {
        config.event_capacity
    }
}
