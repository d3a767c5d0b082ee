//! Builds the effective rule set from the filter lists and the allow-list.

use std::sync::Arc;

use rulecast_core::RuleRecord;
use tracing::info;

use crate::error::Result;
use crate::sources::{AllowListRepository, RuleRepository, SettingsProvider};

/// Prefix of the rule that exempts every document in inverted allow-list mode.
pub const INVERTED_ALLOWLIST_PREFIX: &str = "@@||*$document";

/// Rule exempting every domain except the listed ones.
///
/// `["a.com", "b.com"]` becomes `@@||*$document,domain=~a.com|~b.com`;
/// an empty list yields the bare prefix.
pub fn inverted_allowlist_rule<S: AsRef<str>>(domains: &[S]) -> String {
    if domains.is_empty() {
        return INVERTED_ALLOWLIST_PREFIX.to_string();
    }
    let negated: Vec<String> = domains.iter().map(|d| format!("~{}", d.as_ref())).collect();
    format!("{INVERTED_ALLOWLIST_PREFIX},domain={}", negated.join("|"))
}

/// Assembles one flat, ordered rule sequence per pipeline run.
#[derive(Clone)]
pub struct RuleAssembler {
    rules: Arc<dyn RuleRepository>,
    allowlist: Arc<dyn AllowListRepository>,
    settings: Arc<dyn SettingsProvider>,
}

impl RuleAssembler {
    pub fn new(
        rules: Arc<dyn RuleRepository>,
        allowlist: Arc<dyn AllowListRepository>,
        settings: Arc<dyn SettingsProvider>,
    ) -> Self {
        Self {
            rules,
            allowlist,
            settings,
        }
    }

    /// Repository rules first, allow-list derived rules last.
    ///
    /// Returns an empty sequence when filtering is disabled.
    pub async fn assemble(&self) -> Result<Vec<RuleRecord>> {
        if self.settings.is_filtering_disabled() {
            info!("filtering disabled, assembling empty rule set");
            return Ok(Vec::new());
        }

        let mut rules = self.rules.get_rules().await?;
        let base = rules.len();

        if self.settings.is_default_white_list_mode() {
            let allow = self.allowlist.get_rules().await?;
            rules.extend(allow.into_iter().map(RuleRecord::allowlist));
        } else {
            let domains = self.allowlist.get_white_list_domains().await?;
            rules.push(RuleRecord::allowlist(inverted_allowlist_rule(&domains)));
        }

        info!(
            base_rules = base,
            allowlist_rules = rules.len() - base,
            "rules assembled"
        );
        Ok(rules)
    }
}
