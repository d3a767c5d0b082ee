//! In-memory collaborators shared by the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;

use rulecast_core::{BundleCatalog, GroupTarget, RuleRecord};
use rulecast_pipeline::sources::{AllowListRepository, RuleRepository, SettingsProvider};
use rulecast_pipeline::{
    BundleApplier, BundleEvent, BundleUpdate, EventBus, EventSink, PipelineError, PublicationCache,
    PublishError, Result, Sources,
};

pub const TIMEOUT: Duration = Duration::from_secs(5);

pub const BUNDLE_A: &str = "test.a";
pub const BUNDLE_B: &str = "test.b";
pub const BUNDLE_C: &str = "test.c";
pub const ADVANCED: &str = "test.advanced";

/// Three groups: `a` owns list 1, `b` owns list 2, `c` owns list 3 and
/// everything unknown (including allow-list rules).
pub fn catalog() -> Arc<BundleCatalog> {
    let group = |key: &str, bundle: &str, source: i64| GroupTarget {
        key: key.to_string(),
        bundle_id: bundle.to_string(),
        categories: [format!("{key}_category")].into_iter().collect(),
        source_ids: [source].into_iter().collect(),
    };
    let catalog = BundleCatalog::new(
        vec![
            group("a", BUNDLE_A, 1),
            group("b", BUNDLE_B, 2),
            group("c", BUNDLE_C, 3),
        ],
        ADVANCED,
        "c",
    )
    .expect("valid test catalog");
    Arc::new(catalog)
}

// ── Sources ─────────────────────────────────────────────────────────

#[derive(Default)]
pub struct MemoryRules {
    pub rules: Mutex<Vec<RuleRecord>>,
    pub fail: AtomicBool,
}

impl MemoryRules {
    pub fn with(rules: &[(i64, &str)]) -> Arc<Self> {
        let this = Self::default();
        this.set(rules);
        Arc::new(this)
    }

    pub fn set(&self, rules: &[(i64, &str)]) {
        *self.rules.lock().unwrap() = rules.iter().map(|(id, t)| RuleRecord::new(*id, *t)).collect();
    }
}

#[async_trait]
impl RuleRepository for MemoryRules {
    async fn get_rules(&self) -> Result<Vec<RuleRecord>> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(PipelineError::source_failed("rules", "repository offline"));
        }
        Ok(self.rules.lock().unwrap().clone())
    }
}

#[derive(Default)]
pub struct MemoryAllowList {
    pub domains: Mutex<Vec<String>>,
}

impl MemoryAllowList {
    pub fn with(domains: &[&str]) -> Arc<Self> {
        let this = Self::default();
        *this.domains.lock().unwrap() = domains.iter().map(|d| d.to_string()).collect();
        Arc::new(this)
    }
}

#[async_trait]
impl AllowListRepository for MemoryAllowList {
    async fn get_rules(&self) -> Result<Vec<String>> {
        let domains = self.domains.lock().unwrap();
        Ok(domains.iter().map(|d| format!("@@//{d}$document")).collect())
    }

    async fn get_white_list_domains(&self) -> Result<Vec<String>> {
        Ok(self.domains.lock().unwrap().clone())
    }
}

pub struct Switches {
    pub disabled: AtomicBool,
    pub default_mode: AtomicBool,
}

impl Switches {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            disabled: AtomicBool::new(false),
            default_mode: AtomicBool::new(true),
        })
    }
}

impl SettingsProvider for Switches {
    fn is_filtering_disabled(&self) -> bool {
        self.disabled.load(Ordering::SeqCst)
    }

    fn is_default_white_list_mode(&self) -> bool {
        self.default_mode.load(Ordering::SeqCst)
    }
}

pub fn sources(
    rules: Arc<MemoryRules>,
    allowlist: Arc<MemoryAllowList>,
    settings: Arc<Switches>,
) -> Sources {
    Sources {
        rules,
        allowlist,
        settings,
    }
}

// ── Sinks and consumers ─────────────────────────────────────────────

/// Forwards to the bus, except for one bundle whose emission fails.
pub struct FailingFor {
    pub bus: EventBus,
    pub bundle_id: &'static str,
}

#[async_trait]
impl EventSink for FailingFor {
    async fn emit(&self, event: BundleEvent) -> std::result::Result<(), PublishError> {
        if let BundleEvent::UpdateRequired(update) = &event {
            if update.bundle_id == self.bundle_id {
                return Err(PublishError::Emit("consumer rejected bundle".to_string()));
            }
        }
        self.bus.send(event);
        Ok(())
    }
}

/// Keeps the last payload applied for each bundle.
#[derive(Clone, Default)]
pub struct RecordingApplier {
    pub applied: Arc<Mutex<HashMap<String, String>>>,
}

impl RecordingApplier {
    pub fn payload(&self, bundle_id: &str) -> Option<String> {
        self.applied.lock().unwrap().get(bundle_id).cloned()
    }
}

#[async_trait]
impl BundleApplier for RecordingApplier {
    async fn apply(&self, update: &BundleUpdate) -> Result<()> {
        self.applied
            .lock()
            .unwrap()
            .insert(update.bundle_id.clone(), update.payload.to_string());
        Ok(())
    }

    fn name(&self) -> &str {
        "recording"
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

/// Everything already queued on `rx`.
pub fn drain(rx: &mut broadcast::Receiver<BundleEvent>) -> Vec<BundleEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Payloads of the `UpdateRequired` events, keyed by bundle id.
pub fn payloads(events: &[BundleEvent]) -> HashMap<String, String> {
    events
        .iter()
        .filter_map(|e| match e {
            BundleEvent::UpdateRequired(u) => Some((u.bundle_id.clone(), u.payload.to_string())),
            _ => None,
        })
        .collect()
}

/// Wait until the cache holds an entry for every bundle in `ids`.
pub async fn wait_cached(cache: &PublicationCache, ids: &[&str]) {
    tokio::time::timeout(TIMEOUT, async {
        while !ids.iter().all(|id| cache.get(id).is_some()) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("bundles were not acknowledged in time");
}
