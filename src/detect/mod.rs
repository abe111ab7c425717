//! Candidate span detection
//!
//! Two independent sources feed the mapping: a fixed set of regex rules and
//! an entity recognizer behind the [`EntityDetector`] capability.

pub mod entity;
pub mod patterns;

use serde::{Deserialize, Serialize};

pub use entity::{
    select_entities, AllowList, CommandDetector, CompositeDetector, EntityDetector, Gazetteer,
    NoEntities, DEFAULT_ALLOW_LIST,
};
pub use patterns::{NamedPattern, PatternDetector};

/// A literal flagged as sensitive and the category that flagged it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensitiveSpan {
    pub text: String,
    pub label: String,
}

impl SensitiveSpan {
    pub fn new(text: &str, label: &str) -> Self {
        Self {
            text: text.to_string(),
            label: label.to_string(),
        }
    }
}
