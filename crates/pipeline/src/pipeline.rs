//! One reload pass: assemble → partition → check limits → publish → announce.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use rulecast_core::rule::count_non_comment;
use rulecast_core::{BundleCatalog, CoreError, OverviewSummary, PublicationInfo, RuleGroup};
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::assembler::RuleAssembler;
use crate::cache::PublicationCache;
use crate::coalescer::ReloadTask;
use crate::error::{PublishError, Result};
use crate::events::EventSink;
use crate::limit::LimitEnforcer;
use crate::partition::Partitioner;
use crate::publisher::{BundlePublisher, PublishOutcome};

/// What a single pipeline run did.
#[derive(Debug)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Size of the assembled rule snapshot.
    pub rules_total: usize,
    /// Group bundles in partition order, then the advanced bundle.
    pub outcomes: Vec<PublishOutcome>,
    pub summary: OverviewSummary,
    /// Whether the aggregate `CONTENT_BLOCKER_UPDATED` event was emitted.
    pub announced: std::result::Result<(), PublishError>,
}

impl RunReport {
    pub fn failed(&self) -> impl Iterator<Item = &PublishOutcome> {
        self.outcomes.iter().filter(|o| !o.is_ok())
    }

    pub fn outcome(&self, bundle_id: &str) -> Option<&PublishOutcome> {
        self.outcomes.iter().find(|o| o.bundle_id == bundle_id)
    }
}

/// The rule distribution pipeline.
pub struct BundlePipeline {
    assembler: RuleAssembler,
    partitioner: Arc<dyn Partitioner>,
    catalog: Arc<BundleCatalog>,
    limits: LimitEnforcer,
    publisher: BundlePublisher,
    // serialises direct runs with coalesced ones
    run_lock: Mutex<()>,
}

impl BundlePipeline {
    /// Wire a pipeline, checking that the catalog covers every group key the
    /// partitioner can produce.
    pub fn new(
        assembler: RuleAssembler,
        partitioner: Arc<dyn Partitioner>,
        catalog: Arc<BundleCatalog>,
        limits: LimitEnforcer,
        sink: Arc<dyn EventSink>,
        cache: Arc<PublicationCache>,
    ) -> Result<Self> {
        let vocabulary = partitioner.vocabulary();
        catalog.ensure_covers(vocabulary.iter().map(String::as_str))?;
        Ok(Self {
            assembler,
            partitioner,
            catalog,
            limits,
            publisher: BundlePublisher::new(sink, cache),
            run_lock: Mutex::new(()),
        })
    }

    pub fn catalog(&self) -> &Arc<BundleCatalog> {
        &self.catalog
    }

    pub fn limits(&self) -> LimitEnforcer {
        self.limits
    }

    /// Execute one full run on a fresh rule snapshot.
    ///
    /// Collaborator failures and unmapped group keys abort the run before
    /// anything is published. Per-bundle failures are reported in the
    /// returned outcomes and never abort the run.
    pub async fn run(&self) -> Result<RunReport> {
        let _guard = self.run_lock.lock().await;
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!(%run_id, "loading content blocker");

        let rules = self.assembler.assemble().await?;
        let groups = self.partitioner.partition(&rules);
        let targets = self.resolve_targets(groups)?;

        let publishes = targets.iter().map(|(bundle_id, group)| {
            let info = PublicationInfo::new(
                bundle_id.as_str(),
                group.len(),
                self.limits.check(group),
                group.target_categories.clone(),
            );
            async move {
                let texts = group.texts();
                self.publisher.publish(bundle_id, &texts, info).await
            }
        });
        let mut outcomes = join_all(publishes).await;

        let rules_over_limit = targets.iter().any(|(_, g)| self.limits.check(g));

        let advanced_id = self.catalog.advanced_bundle_id();
        let all_texts: Vec<&str> = rules.iter().map(|r| r.text()).collect();
        let advanced = self
            .publisher
            .publish(
                advanced_id,
                &all_texts,
                PublicationInfo::count_only(advanced_id, all_texts.len()),
            )
            .await;
        outcomes.push(advanced);

        let summary = OverviewSummary {
            rules_count: count_non_comment(&rules),
            rules_over_limit,
            advanced_blocking_rules_count: all_texts.len(),
        };
        // the overview is announced regardless of per-bundle failures
        let announced = self.publisher.announce(summary).await;

        let report = RunReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            rules_total: rules.len(),
            outcomes,
            summary,
            announced,
        };

        let failed = report.failed().count();
        if failed > 0 {
            warn!(%run_id, failed, "some content blockers failed to publish");
        }
        info!(
            %run_id,
            rules = summary.rules_count,
            over_limit = summary.rules_over_limit,
            bundles = report.outcomes.len(),
            announced = report.announced.is_ok(),
            elapsed_ms = (report.finished_at - report.started_at).num_milliseconds(),
            "content blocker run complete"
        );
        Ok(report)
    }

    /// Map every group to its bundle before anything is emitted.
    fn resolve_targets(&self, groups: Vec<RuleGroup>) -> Result<Vec<(String, RuleGroup)>> {
        groups
            .into_iter()
            .map(|g| {
                let bundle_id = self.catalog.bundle_for(&g.key)?.to_string();
                Ok::<_, CoreError>((bundle_id, g))
            })
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }
}

#[async_trait]
impl ReloadTask for BundlePipeline {
    async fn reload(&self) -> Result<()> {
        self.run().await.map(|_| ())
    }

    fn name(&self) -> &str {
        "content-blocker"
    }
}
