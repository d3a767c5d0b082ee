use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Source id reserved for rules synthesized from the allow-list.
pub const ALLOWLIST_SOURCE_ID: i64 = 0;

/// Marker that starts a comment line in filter lists.
pub const COMMENT_MARKER: char = '!';

/// A single filtering rule together with the filter list it came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RuleRecord {
    source_id: i64,
    text: String,
}

impl RuleRecord {
    pub fn new(source_id: i64, text: impl Into<String>) -> Self {
        Self {
            source_id,
            text: text.into(),
        }
    }

    /// A rule derived from the allow-list (`source_id` 0).
    pub fn allowlist(text: impl Into<String>) -> Self {
        Self::new(ALLOWLIST_SOURCE_ID, text)
    }

    pub fn source_id(&self) -> i64 {
        self.source_id
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn is_comment(&self) -> bool {
        self.text.starts_with(COMMENT_MARKER)
    }
}

/// Rules classified into one group, destined for a single bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleGroup {
    pub key: String,
    pub rules: Vec<RuleRecord>,
    /// Filter categories feeding this group (reporting only).
    pub target_categories: BTreeSet<String>,
}

impl RuleGroup {
    pub fn new(
        key: impl Into<String>,
        rules: Vec<RuleRecord>,
        target_categories: BTreeSet<String>,
    ) -> Self {
        Self {
            key: key.into(),
            rules,
            target_categories,
        }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Rule texts in group order.
    pub fn texts(&self) -> Vec<&str> {
        self.rules.iter().map(RuleRecord::text).collect()
    }
}

/// Number of rules that are not `!` comments.
pub fn count_non_comment(rules: &[RuleRecord]) -> usize {
    rules.iter().filter(|r| !r.is_comment()).count()
}
