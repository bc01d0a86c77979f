//! Active dynamic-rule snapshot shared between scoring and refresh

use crate::types::rule::Rule;
use anyhow::{Context, Result};
use parking_lot::RwLock;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Holds the current rule set.
///
/// Scoring takes an `Arc` snapshot so each decision sees one consistent
/// set; `replace` swaps the whole set atomically.
#[derive(Default)]
pub struct RuleBook {
    rules: RwLock<Arc<Vec<Rule>>>,
}

impl RuleBook {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self {
            rules: RwLock::new(Arc::new(rules)),
        }
    }

    /// Current rule set
    pub fn snapshot(&self) -> Arc<Vec<Rule>> {
        self.rules.read().clone()
    }

    /// Swap in a new rule set, returning the previous one
    pub fn replace(&self, rules: Vec<Rule>) -> Arc<Vec<Rule>> {
        std::mem::replace(&mut *self.rules.write(), Arc::new(rules))
    }

    pub fn len(&self) -> usize {
        self.rules.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.read().is_empty()
    }

    pub fn active_count(&self) -> usize {
        self.rules.read().iter().filter(|r| r.is_active()).count()
    }

    /// Read a JSON array of rules.
    ///
    /// Only an unreadable file or a document that is not an array is an
    /// error. Entries that do not decode as a rule are logged and skipped.
    pub fn read_rules_file<P: AsRef<Path>>(path: P) -> Result<Vec<Rule>> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read rules file {}", path.display()))?;
        let entries: Vec<serde_json::Value> = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse rules file {}", path.display()))?;

        let rules = entries
            .into_iter()
            .enumerate()
            .filter_map(|(index, entry)| match serde_json::from_value::<Rule>(entry) {
                Ok(rule) => Some(rule),
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        index,
                        error = %e,
                        "Skipping undecodable rule"
                    );
                    None
                }
            })
            .collect();
        Ok(rules)
    }

    /// Reload from disk. On error the current set stays in place.
    pub fn reload_from<P: AsRef<Path>>(&self, path: P) -> Result<usize> {
        let rules = Self::read_rules_file(path.as_ref())?;
        let count = rules.len();
        self.replace(rules);
        info!(
            path = %path.as_ref().display(),
            rules = count,
            active = self.active_count(),
            "Rule book refreshed"
        );
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::rule::RuleStatus;
    use std::io::Write;

    #[test]
    fn test_snapshot_survives_replace() {
        let book = RuleBook::new(vec![Rule::new("1", "Large amount", "amount > 10000")]);
        let before = book.snapshot();

        book.replace(vec![
            Rule::new("2", "Very large", "amount > 50000"),
            Rule::new("3", "Disabled", "amount > 1").with_status(RuleStatus::Inactive),
        ]);

        assert_eq!(before.len(), 1);
        assert_eq!(before[0].name, "Large amount");
        assert_eq!(book.len(), 2);
        assert_eq!(book.active_count(), 1);
    }

    #[test]
    fn test_reload_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[
                {{"id": "r1", "name": "Over ten thousand", "condition": "amount > 10000", "status": "Active"}},
                {{"id": "r2", "name": "Risky user", "condition": "user_risk_score >= 70", "weight": 30}}
            ]"#
        )
        .unwrap();

        let book = RuleBook::default();
        assert!(book.is_empty());
        assert_eq!(book.reload_from(file.path()).unwrap(), 2);

        let rules = book.snapshot();
        assert_eq!(rules[1].weight, Some(30));
        assert!(rules[1].is_active());
    }

    #[test]
    fn test_undecodable_entries_are_skipped() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[
                {{"id": "r1", "name": "Over ten thousand", "condition": "amount > 10000"}},
                {{"id": "r2", "name": "Paused", "condition": "amount > 1", "status": "Paused"}},
                {{"id": "r3", "name": "Bad weight", "condition": "amount > 1", "weight": "heavy"}},
                {{"id": "r4", "condition": "amount > 1"}},
                42
            ]"#
        )
        .unwrap();

        let book = RuleBook::default();
        assert_eq!(book.reload_from(file.path()).unwrap(), 1);
        assert_eq!(book.snapshot()[0].name, "Over ten thousand");
    }

    #[test]
    fn test_bad_file_keeps_current_rules() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();

        let book = RuleBook::new(vec![Rule::new("1", "Large amount", "amount > 10000")]);
        assert!(book.reload_from(file.path()).is_err());
        assert_eq!(book.len(), 1);
        assert!(RuleBook::read_rules_file("/nonexistent/rules.json").is_err());
    }
}
