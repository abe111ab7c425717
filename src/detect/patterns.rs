use regex::Regex;

use super::SensitiveSpan;
use crate::error::{PseudonymError, Result};

/// Named pattern definition
#[derive(Debug, Clone)]
pub struct NamedPattern {
    pub name: &'static str,
    pub pattern: &'static str,
    pub description: &'static str,
}

/// Builtin detection rules, applied in the order listed
pub mod builtin {
    use super::NamedPattern;

    /// Anything shaped like local@domain
    pub const EMAIL: &str = r"[\w.-]+@[\w.-]+";

    /// Ten-digit phone numbers separated by dashes or dots
    pub const PHONE: &str = r"\b\d{3}[-.]\d{3}[-.]\d{4}\b";

    /// US Social Security Number
    pub const SSN: &str = r"\b\d{3}-\d{2}-\d{4}\b";

    /// 13 to 16 digits, optionally grouped with spaces or dashes
    pub const CREDIT_CARD: &str = r"\b(?:\d[ -]*?){13,16}\b";

    /// All builtin patterns with names. The name doubles as the token label.
    pub const ALL_NAMED: &[NamedPattern] = &[
        NamedPattern {
            name: "email",
            pattern: EMAIL,
            description: "Email addresses",
        },
        NamedPattern {
            name: "phone",
            pattern: PHONE,
            description: "Phone numbers (555-123-4567, 555.123.4567)",
        },
        NamedPattern {
            name: "ssn",
            pattern: SSN,
            description: "US Social Security Numbers",
        },
        NamedPattern {
            name: "cc",
            pattern: CREDIT_CARD,
            description: "Credit card numbers",
        },
    ];
}

/// Compiled pattern with name for labelling
#[derive(Debug, Clone)]
struct CompiledPattern {
    name: String,
    regex: Regex,
}

/// Regex rule set that finds literal sensitive spans
#[derive(Debug, Clone)]
pub struct PatternDetector {
    patterns: Vec<CompiledPattern>,
}

impl PatternDetector {
    /// Create a detector with all builtin patterns
    pub fn default_patterns() -> Self {
        let patterns = builtin::ALL_NAMED
            .iter()
            .filter_map(|np| {
                Regex::new(np.pattern).ok().map(|regex| CompiledPattern {
                    name: np.name.to_string(),
                    regex,
                })
            })
            .collect();

        Self { patterns }
    }

    /// Create a detector with all builtins except the named ones
    pub fn without_builtins(excluded_names: &[&str]) -> Self {
        let mut detector = Self::default_patterns();
        detector
            .patterns
            .retain(|cp| !excluded_names.contains(&cp.name.as_str()));
        detector
    }

    /// Create a detector with no patterns
    pub fn none() -> Self {
        Self {
            patterns: Vec::new(),
        }
    }

    /// Append a rule. It runs after every rule already present.
    pub fn add_named_pattern(&mut self, name: &str, pattern: &str) -> Result<()> {
        let regex = Regex::new(pattern).map_err(|source| PseudonymError::InvalidPattern {
            name: name.to_string(),
            source,
        })?;
        self.patterns.push(CompiledPattern {
            name: name.to_string(),
            regex,
        });
        Ok(())
    }

    /// Every non-overlapping match of every rule, rule by rule.
    ///
    /// A literal matched by two rules is reported twice; the earlier rule's
    /// report comes first, which is what decides its label downstream.
    pub fn detect(&self, text: &str) -> Vec<SensitiveSpan> {
        self.patterns
            .iter()
            .flat_map(|cp| {
                cp.regex
                    .find_iter(text)
                    .map(|m| SensitiveSpan::new(m.as_str(), &cp.name))
            })
            .collect()
    }

    /// Check if text contains anything a rule would flag
    pub fn contains_sensitive(&self, text: &str) -> bool {
        self.patterns.iter().any(|cp| cp.regex.is_match(text))
    }

    /// Get names of all loaded patterns
    pub fn pattern_names(&self) -> Vec<&str> {
        self.patterns.iter().map(|cp| cp.name.as_str()).collect()
    }

    pub fn pattern_count(&self) -> usize {
        self.patterns.len()
    }
}

impl Default for PatternDetector {
    fn default() -> Self {
        Self::default_patterns()
    }
}
