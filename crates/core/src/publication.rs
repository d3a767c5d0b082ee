use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Metadata describing one bundle publication.
///
/// One instance is produced per bundle per pipeline run. The publication
/// cache keeps only the most recent one for each bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicationInfo {
    pub bundle_id: String,
    pub rule_count: usize,
    pub over_limit: bool,
    #[serde(default)]
    pub source_categories: BTreeSet<String>,
    #[serde(default)]
    pub has_error: bool,
}

impl PublicationInfo {
    pub fn new(
        bundle_id: impl Into<String>,
        rule_count: usize,
        over_limit: bool,
        source_categories: BTreeSet<String>,
    ) -> Self {
        Self {
            bundle_id: bundle_id.into(),
            rule_count,
            over_limit,
            source_categories,
            has_error: false,
        }
    }

    /// Info carrying only a rule count (used for the advanced bundle).
    pub fn count_only(bundle_id: impl Into<String>, rule_count: usize) -> Self {
        Self::new(bundle_id, rule_count, false, BTreeSet::new())
    }

    /// Copy of this info flagged as failed.
    pub fn failed(mut self) -> Self {
        self.has_error = true;
        self
    }
}

/// Aggregate summary emitted once per run after every bundle was attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverviewSummary {
    /// Rules in the assembled set, `!` comments excluded.
    pub rules_count: usize,
    /// Whether any partitioned group exceeded the per-bundle limit.
    pub rules_over_limit: bool,
    /// Entries serialized into the advanced bundle.
    pub advanced_blocking_rules_count: usize,
}
