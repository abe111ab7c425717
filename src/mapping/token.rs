//! Token format and minting
//!
//! A token looks like `[[[PERSON_3]]]`: a fixed opening marker, the uppercased
//! label, an underscore, a uniqueness suffix, and a fixed closing marker.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Opening token delimiter
pub const TOKEN_OPEN: &str = "[[[";

/// Closing token delimiter
pub const TOKEN_CLOSE: &str = "]]]";

/// Number of hex characters used for random token suffixes
pub const RANDOM_SUFFIX_LEN: usize = 6;

/// Build a token from a label and a suffix
pub fn format_token(label: &str, suffix: impl std::fmt::Display) -> String {
    format!("{}{}_{}{}", TOKEN_OPEN, normalize_label(label), suffix, TOKEN_CLOSE)
}

/// Uppercase a label and collapse whitespace to underscores so it stays one word
pub fn normalize_label(label: &str) -> String {
    label
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .to_uppercase()
}

/// Split a token into its label and suffix, if it is well-formed
pub fn parse_token(token: &str) -> Option<(&str, &str)> {
    let inner = token.strip_prefix(TOKEN_OPEN)?.strip_suffix(TOKEN_CLOSE)?;
    let (label, suffix) = inner.rsplit_once('_')?;
    if label.is_empty() || suffix.is_empty() {
        return None;
    }
    Some((label, suffix))
}

/// Sequence number of a counter-minted token
pub fn sequence_of(token: &str) -> Option<u64> {
    parse_token(token).and_then(|(_, suffix)| suffix.parse().ok())
}

/// Regex matching any well-formed token in text
pub fn token_regex() -> &'static Regex {
    static TOKEN_RE: OnceLock<Regex> = OnceLock::new();
    TOKEN_RE.get_or_init(|| {
        let pattern = format!(
            r"{}[^\[\]\s]+_[0-9A-Za-z]+{}",
            regex::escape(TOKEN_OPEN),
            regex::escape(TOKEN_CLOSE)
        );
        Regex::new(&pattern).expect("token pattern is built from constants")
    })
}

/// How a token's uniqueness suffix is produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MintStrategy {
    /// Session counter; used for detector-driven entries
    Sequential,
    /// Random hex suffix; used for manual entries so they need no counter coordination
    Random,
}

/// Produces tokens for new mapping entries
#[derive(Debug, Clone, Default)]
pub struct TokenMinter {
    counter: u64,
}

impl TokenMinter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resume from a persisted counter value
    pub fn with_counter(counter: u64) -> Self {
        Self { counter }
    }

    /// Mint a token for `label` using `strategy`.
    ///
    /// Sequential minting consumes one counter value per call. Random minting
    /// never touches the counter.
    pub fn mint(&mut self, label: &str, strategy: MintStrategy) -> String {
        match strategy {
            MintStrategy::Sequential => {
                let token = format_token(label, self.counter);
                self.counter += 1;
                token
            }
            MintStrategy::Random => {
                let hex = uuid::Uuid::new_v4().simple().to_string();
                format_token(label, &hex[..RANDOM_SUFFIX_LEN])
            }
        }
    }

    /// Next sequence number a sequential mint will use
    pub fn counter(&self) -> u64 {
        self.counter
    }

    pub(crate) fn set_counter(&mut self, counter: u64) {
        self.counter = counter;
    }

    pub fn reset(&mut self) {
        self.counter = 0;
    }
}
