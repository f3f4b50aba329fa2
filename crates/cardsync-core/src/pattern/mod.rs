//! Regex rule search over indexed card text.
//!
//! A rule set is identified by [`rule_set_hash`], so editing any rule starts
//! a fresh cache entry while re-running an unchanged set rebuilds the
//! existing one.

mod runner;

pub use runner::{PatternRunOutcome, PatternRunner};

use crate::config::PatternConfig;
use crate::identity::content_hash;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;

/// Flags with a meaning here; anything else is dropped during normalization.
pub const SUPPORTED_FLAGS: &str = "imsxUu";

/// One user-defined search rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternRule {
    pub id: String,
    pub pattern: String,
    #[serde(default)]
    pub flags: String,
}

impl PatternRule {
    pub fn new(id: impl Into<String>, pattern: impl Into<String>, flags: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            pattern: pattern.into(),
            flags: flags.into(),
        }
    }

    /// Supported flags, de-duplicated, in a fixed order.
    pub fn normalized_flags(&self) -> String {
        SUPPORTED_FLAGS
            .chars()
            .filter(|flag| self.flags.contains(*flag))
            .collect()
    }

    /// Build the matcher for this rule.
    ///
    /// `i` case-insensitive, `m` multi-line anchors, `s` dot matches newline,
    /// `x` verbose, `U` swap greed. Matching is always Unicode-aware, so `u`
    /// only affects the hash.
    pub fn compile(&self) -> Result<Regex, regex::Error> {
        let flags = self.normalized_flags();
        RegexBuilder::new(&self.pattern)
            .case_insensitive(flags.contains('i'))
            .multi_line(flags.contains('m'))
            .dot_matches_new_line(flags.contains('s'))
            .ignore_whitespace(flags.contains('x'))
            .swap_greed(flags.contains('U'))
            .unicode(true)
            .size_limit(PatternConfig::REGEX_SIZE_LIMIT)
            .build()
    }
}

/// Identity of a rule set, independent of rule order and flag spelling.
pub fn rule_set_hash(rules: &[PatternRule]) -> String {
    let mut tuples: Vec<(&str, &str, String)> = rules
        .iter()
        .map(|rule| (rule.id.as_str(), rule.pattern.as_str(), rule.normalized_flags()))
        .collect();
    tuples.sort();
    content_hash(&json!(tuples))
}

pub(crate) struct CompiledRule {
    pub id: String,
    pub regex: Regex,
}

/// Compile every rule that can be compiled. Failures are logged and the
/// rule is left out of the run.
pub(crate) fn compile_rules(rules: &[PatternRule]) -> Vec<CompiledRule> {
    rules
        .iter()
        .filter_map(|rule| match rule.compile() {
            Ok(regex) => Some(CompiledRule {
                id: rule.id.clone(),
                regex,
            }),
            Err(e) => {
                warn!("Pattern rule {} failed to compile: {}", rule.id, e);
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_normalization() {
        assert_eq!(PatternRule::new("r", "a", "gmiim").normalized_flags(), "im");
        assert_eq!(PatternRule::new("r", "a", "Uu").normalized_flags(), "Uu");
        assert_eq!(PatternRule::new("r", "a", "").normalized_flags(), "");
    }

    #[test]
    fn test_hash_ignores_order_and_flag_spelling() {
        let a = vec![
            PatternRule::new("r1", "dragon", "mi"),
            PatternRule::new("r2", "elf", ""),
        ];
        let b = vec![
            PatternRule::new("r2", "elf", "g"),
            PatternRule::new("r1", "dragon", "im"),
        ];
        assert_eq!(rule_set_hash(&a), rule_set_hash(&b));

        let c = vec![PatternRule::new("r1", "dragons", "im")];
        assert_ne!(rule_set_hash(&a), rule_set_hash(&c));
        assert_ne!(rule_set_hash(&[]), rule_set_hash(&c));
    }

    #[test]
    fn test_flags_change_matching() {
        let text = "The Dragon\nsleeps";
        assert!(!PatternRule::new("r", "dragon", "").compile().unwrap().is_match(text));
        assert!(PatternRule::new("r", "dragon", "i").compile().unwrap().is_match(text));
        assert!(!PatternRule::new("r", "Dragon.sleeps", "").compile().unwrap().is_match(text));
        assert!(PatternRule::new("r", "Dragon.sleeps", "s").compile().unwrap().is_match(text));
        assert!(PatternRule::new("r", "^sleeps$", "m").compile().unwrap().is_match(text));
        assert!(PatternRule::new("r", "Dra gon # comment", "x").compile().unwrap().is_match(text));
    }

    #[test]
    fn test_bad_rules_are_left_out() {
        let compiled = compile_rules(&[
            PatternRule::new("bad", "(unclosed", ""),
            PatternRule::new("good", "ok", ""),
        ]);
        assert_eq!(compiled.len(), 1);
        assert_eq!(compiled[0].id, "good");
    }
}
