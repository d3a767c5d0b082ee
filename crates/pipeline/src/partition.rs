//! Group partitioning contract and the catalog-driven implementation.

use std::sync::Arc;

use indexmap::IndexMap;
use rulecast_core::{BundleCatalog, RuleGroup, RuleRecord};

/// Classifies an assembled rule sequence into keyed groups.
///
/// Implementations must be pure functions of their input: every rule lands
/// in exactly one group, and every key returned is part of
/// [`vocabulary`](Partitioner::vocabulary).
pub trait Partitioner: Send + Sync {
    /// Every group key this partitioner can produce.
    fn vocabulary(&self) -> Vec<String>;

    fn partition(&self, rules: &[RuleRecord]) -> Vec<RuleGroup>;
}

/// Partitions by filter list id using the ownership table of a catalog.
///
/// Every catalog group is returned on every call, empty or not, so that each
/// bundle is republished and stale content is cleared.
pub struct CatalogPartitioner {
    catalog: Arc<BundleCatalog>,
}

impl CatalogPartitioner {
    pub fn new(catalog: Arc<BundleCatalog>) -> Self {
        Self { catalog }
    }
}

impl Partitioner for CatalogPartitioner {
    fn vocabulary(&self) -> Vec<String> {
        self.catalog.keys().map(String::from).collect()
    }

    fn partition(&self, rules: &[RuleRecord]) -> Vec<RuleGroup> {
        let mut buckets: IndexMap<&str, Vec<RuleRecord>> =
            self.catalog.keys().map(|k| (k, Vec::new())).collect();

        for rule in rules {
            let key = self.catalog.group_for_source(rule.source_id()).key.as_str();
            buckets.entry(key).or_default().push(rule.clone());
        }

        buckets
            .into_iter()
            .map(|(key, rules)| {
                let categories = self
                    .catalog
                    .group(key)
                    .map(|g| g.categories.clone())
                    .unwrap_or_default();
                RuleGroup::new(key, rules, categories)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn partitioner() -> CatalogPartitioner {
        CatalogPartitioner::new(Arc::new(BundleCatalog::builtin()))
    }

    #[test]
    fn every_vocabulary_group_is_emitted() {
        let p = partitioner();
        let groups = p.partition(&[]);
        let keys: Vec<_> = groups.iter().map(|g| g.key.clone()).collect();
        assert_eq!(keys, p.vocabulary());
        assert!(groups.iter().all(RuleGroup::is_empty));
    }

    #[test]
    fn rules_routed_by_source_id() {
        let rules = vec![
            RuleRecord::new(2, "base"),
            RuleRecord::new(3, "privacy"),
            RuleRecord::new(0, "@@//a.com$document"),
            RuleRecord::new(4242, "unknown list"),
        ];
        let groups = partitioner().partition(&rules);
        let by_key: HashMap<&str, Vec<&str>> = groups
            .iter()
            .map(|g| (g.key.as_str(), g.texts()))
            .collect();

        assert_eq!(by_key["general"], vec!["base"]);
        assert_eq!(by_key["privacy"], vec!["privacy"]);
        assert_eq!(by_key["custom"], vec!["@@//a.com$document", "unknown list"]);
    }

    #[test]
    fn partition_is_exhaustive_and_disjoint() {
        let rules: Vec<RuleRecord> = (0..500)
            .map(|i| RuleRecord::new(i % 25, format!("rule-{i}")))
            .collect();
        let groups = partitioner().partition(&rules);

        let mut seen: Vec<&RuleRecord> = groups.iter().flat_map(|g| g.rules.iter()).collect();
        assert_eq!(seen.len(), rules.len());
        seen.sort_by(|a, b| a.text().cmp(b.text()));
        seen.dedup();
        assert_eq!(seen.len(), rules.len());
    }

    #[test]
    fn group_order_is_preserved() {
        let rules = vec![RuleRecord::new(2, "b"), RuleRecord::new(1, "a"), RuleRecord::new(2, "c")];
        let groups = partitioner().partition(&rules);
        let general = groups.iter().find(|g| g.key == "general").unwrap();
        assert_eq!(general.texts(), vec!["b", "a", "c"]);
        assert!(general.target_categories.contains("ad_blocking"));
    }
}
