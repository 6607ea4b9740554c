//! Noise removal and JSON parsing of raw engine stdout.

use regex::{Regex, RegexBuilder};
use serde_json::Value;

use crate::error::EngineError;

/// Ordered list of multiline patterns whose matches are deleted from stdout
/// before it is parsed.
#[derive(Debug, Clone, Default)]
pub struct Sanitizer {
    rules: Vec<Regex>,
}

impl Sanitizer {
    /// Compile every rule; the first invalid pattern is an error.
    pub fn new(patterns: &[String]) -> Result<Self, EngineError> {
        let rules = patterns
            .iter()
            .map(|pattern| compile(pattern))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { rules })
    }

    /// Compile every rule, skipping (and logging) invalid patterns.
    pub fn lenient(patterns: &[String]) -> Self {
        let rules = patterns
            .iter()
            .filter_map(|pattern| match compile(pattern) {
                Ok(rule) => Some(rule),
                Err(err) => {
                    tracing::warn!(error = %err, "skipping sanitize rule");
                    None
                }
            })
            .collect();
        Self { rules }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Apply every rule in order as a global replace-with-empty.
    pub fn apply(&self, stdout: &str) -> String {
        let mut text = stdout.to_string();
        for rule in &self.rules {
            text = rule.replace_all(&text, "").into_owned();
        }
        text
    }
}

fn compile(pattern: &str) -> Result<Regex, EngineError> {
    RegexBuilder::new(pattern)
        .multi_line(true)
        .build()
        .map_err(|source| EngineError::Regex {
            pattern: pattern.to_string(),
            source,
        })
}

/// Parse sanitized stdout as JSON.
pub fn parse_output(stdout: &str) -> Result<Value, serde_json::Error> {
    serde_json::from_str(stdout)
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn rules(patterns: &[&str]) -> Vec<String> {
        patterns.iter().map(|p| (*p).to_string()).collect()
    }

    #[test]
    fn strips_warning_lines_before_json() {
        let sanitizer = Sanitizer::new(&rules(&[r"^\[WARNING\].*$"])).expect("compile");
        let raw = "[WARNING]: No inventory was parsed\n{\"plays\": []}\n[WARNING]: again\n";
        let clean = sanitizer.apply(raw);
        assert!(parse_output(&clean).is_ok(), "got: {clean}");
        assert!(!clean.contains("WARNING"));
    }

    #[test]
    fn rules_apply_in_configured_order() {
        let sanitizer = Sanitizer::new(&rules(&["ab", "^c"])).expect("compile");
        // "abc" -> "c" after the first rule, which the second then removes.
        assert_eq!(sanitizer.apply("abc\nxc"), "\nxc");
    }

    #[test]
    fn invalid_rule_is_an_error_in_strict_mode() {
        let err = Sanitizer::new(&rules(&["(unclosed"])).unwrap_err();
        assert!(matches!(err, EngineError::Regex { .. }));
    }

    #[test]
    fn invalid_rule_is_skipped_in_lenient_mode() {
        let sanitizer = Sanitizer::lenient(&rules(&["(unclosed", "noise"]));
        assert_eq!(sanitizer.len(), 1);
        assert_eq!(sanitizer.apply("noise{}"), "{}");
    }

    #[rstest]
    #[case::banner("PLAY [all] ****", false)]
    #[case::empty("", false)]
    #[case::trailing_noise("{\"plays\": []}\nok=1", false)]
    #[case::object("{\"plays\": []}", true)]
    #[case::surrounding_whitespace("\n  {\"plays\": []}\n", true)]
    fn parse_output_accepts_only_json(#[case] stdout: &str, #[case] ok: bool) {
        assert_eq!(parse_output(stdout).is_ok(), ok);
    }
}
