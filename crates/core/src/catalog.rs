//! Static bundle targets: which group is published to which bundle.
//!
//! The catalog is loaded once at startup (built-in defaults or a YAML file)
//! and is read-only afterwards. Every group key the partitioner can produce
//! must have exactly one entry here; [`BundleCatalog::validate`] enforces the
//! structural invariants before the pipeline is wired.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fs;
use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{CoreError, Result};

/// One group key mapped to its bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupTarget {
    pub key: String,
    pub bundle_id: String,
    /// Filter categories feeding this group.
    #[serde(default)]
    pub categories: BTreeSet<String>,
    /// Filter list ids whose rules belong to this group.
    #[serde(default)]
    pub source_ids: BTreeSet<i64>,
}

/// On-disk shape of a catalog file.
#[derive(Debug, Deserialize)]
struct CatalogFile {
    advanced_bundle_id: String,
    fallback_group: String,
    groups: Vec<GroupTarget>,
}

/// Group key → bundle vocabulary plus the advanced bundle.
#[derive(Debug, Clone)]
pub struct BundleCatalog {
    groups: IndexMap<String, GroupTarget>,
    advanced_bundle_id: String,
    fallback_group: String,
}

const BUNDLE_PREFIX: &str = "com.adguard.safari.AdGuard";

impl BundleCatalog {
    /// Build and validate a catalog.
    pub fn new(
        groups: Vec<GroupTarget>,
        advanced_bundle_id: impl Into<String>,
        fallback_group: impl Into<String>,
    ) -> Result<Self> {
        let mut map = IndexMap::with_capacity(groups.len());
        for group in groups {
            if map.contains_key(&group.key) {
                return Err(CoreError::Catalog(format!(
                    "duplicate group key '{}'",
                    group.key
                )));
            }
            map.insert(group.key.clone(), group);
        }
        let catalog = Self {
            groups: map,
            advanced_bundle_id: advanced_bundle_id.into(),
            fallback_group: fallback_group.into(),
        };
        catalog.validate()?;
        Ok(catalog)
    }

    /// The Safari content blocker extension set.
    pub fn builtin() -> Self {
        let group = |key: &str, suffix: &str, categories: &[&str], source_ids: &[i64]| GroupTarget {
            key: key.to_string(),
            bundle_id: format!("{BUNDLE_PREFIX}.{suffix}"),
            categories: categories.iter().map(|c| c.to_string()).collect(),
            source_ids: source_ids.iter().copied().collect(),
        };
        let groups: IndexMap<String, GroupTarget> = [
            group(
                "general",
                "BlockerExtension",
                &["ad_blocking", "language_specific"],
                &[1, 2, 6, 7, 8, 9, 13, 16, 224],
            ),
            group("privacy", "BlockerPrivacy", &["privacy"], &[3, 17, 118]),
            group(
                "socialWidgetsAndAnnoyances",
                "BlockerSocial",
                &["social", "annoyances"],
                &[4, 14, 18, 19, 20, 21, 22],
            ),
            group("security", "BlockerSecurity", &["security"], &[12, 207, 208]),
            group("other", "BlockerOther", &["other"], &[10, 11]),
            group("custom", "BlockerCustom", &["custom"], &[]),
        ]
        .into_iter()
        .map(|g| (g.key.clone(), g))
        .collect();

        Self {
            groups,
            advanced_bundle_id: format!("{BUNDLE_PREFIX}.AdvancedBlocking"),
            fallback_group: "custom".to_string(),
        }
    }

    /// Parse a catalog from YAML text.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let file: CatalogFile = serde_yaml::from_str(yaml)?;
        Self::new(file.groups, file.advanced_bundle_id, file.fallback_group)
    }

    /// Read a catalog file, or fall back to [`BundleCatalog::builtin`].
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let contents = fs::read_to_string(path)?;
                let catalog = Self::from_yaml_str(&contents)?;
                info!(path = %path.display(), groups = catalog.groups.len(), "loaded bundle catalog");
                Ok(catalog)
            }
            None => Ok(Self::builtin()),
        }
    }

    /// Check the structural invariants of the catalog.
    pub fn validate(&self) -> Result<()> {
        if self.groups.is_empty() {
            return Err(CoreError::Catalog("catalog has no groups".to_string()));
        }
        if self.advanced_bundle_id.is_empty() {
            return Err(CoreError::Catalog(
                "advanced bundle id must not be empty".to_string(),
            ));
        }
        if !self.groups.contains_key(&self.fallback_group) {
            return Err(CoreError::Catalog(format!(
                "fallback group '{}' is not defined",
                self.fallback_group
            )));
        }

        let mut bundle_ids: HashSet<&str> = HashSet::new();
        bundle_ids.insert(&self.advanced_bundle_id);
        let mut owners: HashMap<i64, &str> = HashMap::new();

        for group in self.groups.values() {
            if group.key.is_empty() {
                return Err(CoreError::Catalog("group key must not be empty".to_string()));
            }
            if group.bundle_id.is_empty() {
                return Err(CoreError::Catalog(format!(
                    "group '{}' has an empty bundle id",
                    group.key
                )));
            }
            if !bundle_ids.insert(&group.bundle_id) {
                return Err(CoreError::Catalog(format!(
                    "bundle id '{}' is used more than once",
                    group.bundle_id
                )));
            }
            for id in &group.source_ids {
                if let Some(other) = owners.insert(*id, &group.key) {
                    return Err(CoreError::Catalog(format!(
                        "source id {} is claimed by both '{}' and '{}'",
                        id, other, group.key
                    )));
                }
            }
        }
        Ok(())
    }

    /// Bundle id for a group key.
    pub fn bundle_for(&self, key: &str) -> Result<&str> {
        self.groups
            .get(key)
            .map(|g| g.bundle_id.as_str())
            .ok_or_else(|| CoreError::UnmappedGroup(key.to_string()))
    }

    /// Group owning a source id; unknown ids map to the fallback group.
    pub fn group_for_source(&self, source_id: i64) -> &GroupTarget {
        self.groups
            .values()
            .find(|g| g.source_ids.contains(&source_id))
            .unwrap_or_else(|| self.fallback())
    }

    pub fn fallback(&self) -> &GroupTarget {
        // validate() guarantees the fallback key exists
        &self.groups[self.fallback_group.as_str()]
    }

    pub fn group(&self, key: &str) -> Option<&GroupTarget> {
        self.groups.get(key)
    }

    /// Groups in catalog order.
    pub fn groups(&self) -> impl Iterator<Item = &GroupTarget> {
        self.groups.values()
    }

    /// Group keys in catalog order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.groups.keys().map(String::as_str)
    }

    pub fn advanced_bundle_id(&self) -> &str {
        &self.advanced_bundle_id
    }

    /// Every known bundle id: group bundles in catalog order, then advanced.
    pub fn bundle_ids(&self) -> Vec<&str> {
        self.groups
            .values()
            .map(|g| g.bundle_id.as_str())
            .chain(std::iter::once(self.advanced_bundle_id.as_str()))
            .collect()
    }

    /// Categories of the group published to `bundle_id` (empty for advanced).
    pub fn categories_for_bundle(&self, bundle_id: &str) -> BTreeSet<String> {
        self.groups
            .values()
            .find(|g| g.bundle_id == bundle_id)
            .map(|g| g.categories.clone())
            .unwrap_or_default()
    }

    /// Ensure every key in `keys` has a bundle target.
    pub fn ensure_covers<'a>(&self, keys: impl IntoIterator<Item = &'a str>) -> Result<()> {
        for key in keys {
            self.bundle_for(key)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATALOG_YAML: &str = r#"
advanced_bundle_id: test.advanced
fallback_group: misc
groups:
  - key: ads
    bundle_id: test.ads
    categories: [ad_blocking]
    source_ids: [1, 2]
  - key: misc
    bundle_id: test.misc
"#;

    #[test]
    fn builtin_catalog_is_valid() {
        let catalog = BundleCatalog::builtin();
        catalog.validate().unwrap();
        assert_eq!(catalog.bundle_ids().len(), 7);
        assert_eq!(
            catalog.advanced_bundle_id(),
            "com.adguard.safari.AdGuard.AdvancedBlocking"
        );
    }

    #[test]
    fn parse_yaml_catalog() {
        let catalog = BundleCatalog::from_yaml_str(CATALOG_YAML).unwrap();
        assert_eq!(catalog.keys().collect::<Vec<_>>(), vec!["ads", "misc"]);
        assert_eq!(catalog.bundle_for("ads").unwrap(), "test.ads");
        assert_eq!(
            catalog.bundle_ids(),
            vec!["test.ads", "test.misc", "test.advanced"]
        );
    }

    #[test]
    fn unknown_source_falls_back() {
        let catalog = BundleCatalog::from_yaml_str(CATALOG_YAML).unwrap();
        assert_eq!(catalog.group_for_source(2).key, "ads");
        assert_eq!(catalog.group_for_source(0).key, "misc");
        assert_eq!(catalog.group_for_source(999).key, "misc");
    }

    #[test]
    fn unmapped_group_is_an_error() {
        let catalog = BundleCatalog::builtin();
        let err = catalog.ensure_covers(["general", "nope"]).unwrap_err();
        assert!(matches!(err, CoreError::UnmappedGroup(ref k) if k == "nope"));
    }

    #[test]
    fn duplicate_bundle_id_rejected() {
        let yaml = CATALOG_YAML.replace("test.misc", "test.ads");
        let err = BundleCatalog::from_yaml_str(&yaml).unwrap_err();
        assert!(err.to_string().contains("used more than once"));
    }

    #[test]
    fn missing_fallback_rejected() {
        let yaml = CATALOG_YAML.replace("fallback_group: misc", "fallback_group: absent");
        assert!(BundleCatalog::from_yaml_str(&yaml).is_err());
    }

    #[test]
    fn source_claimed_twice_rejected() {
        let groups = vec![
            GroupTarget {
                key: "a".into(),
                bundle_id: "x.a".into(),
                categories: BTreeSet::new(),
                source_ids: [1].into_iter().collect(),
            },
            GroupTarget {
                key: "b".into(),
                bundle_id: "x.b".into(),
                categories: BTreeSet::new(),
                source_ids: [1].into_iter().collect(),
            },
        ];
        assert!(BundleCatalog::new(groups, "x.adv", "a").is_err());
    }

    #[test]
    fn categories_lookup_by_bundle() {
        let catalog = BundleCatalog::from_yaml_str(CATALOG_YAML).unwrap();
        assert!(catalog.categories_for_bundle("test.ads").contains("ad_blocking"));
        assert!(catalog.categories_for_bundle("test.advanced").is_empty());
    }
}
