//! Pattern search methods on CardSync.

use tokio::task::JoinHandle;

use crate::error::Result;
use crate::index::{PatternCacheEntry, PatternMatchRecord};
use crate::pattern::{PatternRule, PatternRunOutcome};
use crate::CardSync;

impl CardSync {
    /// Evaluate `rules` over a library and wait for the result.
    pub async fn run_patterns(
        &self,
        library_id: &str,
        rules: &[PatternRule],
    ) -> Result<PatternRunOutcome> {
        self.patterns.run(library_id, rules).await
    }

    /// Start a run in the background; returns the rule-set hash to poll.
    pub fn start_patterns(
        &self,
        library_id: &str,
        rules: Vec<PatternRule>,
    ) -> (String, JoinHandle<Result<PatternRunOutcome>>) {
        self.patterns.start(library_id, rules)
    }

    pub fn pattern_status(&self, rule_set_hash: &str) -> Result<Option<PatternCacheEntry>> {
        self.patterns.status(rule_set_hash)
    }

    pub fn pattern_matches(&self, rule_set_hash: &str) -> Result<Vec<PatternMatchRecord>> {
        self.patterns.matches(rule_set_hash)
    }
}
