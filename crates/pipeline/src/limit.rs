use rulecast_core::config::DEFAULT_RULES_LIMIT;
use rulecast_core::RuleGroup;

/// Advisory per-bundle capacity check. Groups are never truncated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitEnforcer {
    ceiling: usize,
}

impl LimitEnforcer {
    pub fn new(ceiling: usize) -> Self {
        Self { ceiling }
    }

    pub fn ceiling(&self) -> usize {
        self.ceiling
    }

    /// `true` when the group holds more rules than the ceiling.
    pub fn check(&self, group: &RuleGroup) -> bool {
        group.len() > self.ceiling
    }

    /// `true` when any group of the run is over the ceiling.
    pub fn any_over(&self, groups: &[RuleGroup]) -> bool {
        groups.iter().any(|g| self.check(g))
    }
}

impl Default for LimitEnforcer {
    fn default() -> Self {
        Self::new(DEFAULT_RULES_LIMIT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rulecast_core::RuleRecord;
    use std::collections::BTreeSet;

    fn group_of(n: usize) -> RuleGroup {
        let rules = (0..n).map(|i| RuleRecord::new(1, format!("r{i}"))).collect();
        RuleGroup::new("g", rules, BTreeSet::new())
    }

    #[test]
    fn exactly_at_limit_is_not_over() {
        let limits = LimitEnforcer::default();
        assert!(!limits.check(&group_of(50_000)));
        assert!(limits.check(&group_of(50_001)));
    }

    #[test]
    fn any_over_across_groups() {
        let limits = LimitEnforcer::new(2);
        assert!(!limits.any_over(&[group_of(1), group_of(2)]));
        assert!(limits.any_over(&[group_of(1), group_of(3), group_of(0)]));
        assert!(!limits.any_over(&[]));
    }
}
