//! Entity recognition capability
//!
//! The core never looks behind this trait. It only filters what comes back
//! against an allow-list and orders it so longer spans claim their mapping
//! slot before any of their sub-spans.

use std::io::Write;
use std::process::{Command, Stdio};

use regex::Regex;
use serde::Deserialize;
use tracing::debug;

use super::SensitiveSpan;
use crate::error::{PseudonymError, Result};

/// Entity categories kept by default
pub const DEFAULT_ALLOW_LIST: &[&str] = &[
    "PERSON",
    "GPE",
    "ORG",
    "TIME",
    "MONEY",
    "FAC",
    "NORP",
    "WORK_OF_ART",
    "EVENT",
];

/// Something that can find named entities in text
pub trait EntityDetector: Send {
    /// Short name used in logs and errors
    fn name(&self) -> &str;

    /// Find entities in `text`, as (span text, label) pairs in any order
    fn detect_entities(&self, text: &str) -> Result<Vec<SensitiveSpan>>;
}

/// Entity labels that are allowed into the mapping
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowList {
    labels: Vec<String>,
}

impl AllowList {
    pub fn new<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            labels: labels.into_iter().map(Into::into).collect(),
        }
    }

    /// Labels compare ASCII case-insensitively
    pub fn allows(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l.eq_ignore_ascii_case(label))
    }
}

impl Default for AllowList {
    fn default() -> Self {
        Self::new(DEFAULT_ALLOW_LIST.iter().copied())
    }
}

/// Drop disallowed or empty entities and order the rest longest text first.
///
/// Entities of equal length keep the order the detector reported them in.
pub fn select_entities(raw: Vec<SensitiveSpan>, allow: &AllowList) -> Vec<SensitiveSpan> {
    let mut kept: Vec<SensitiveSpan> = raw
        .into_iter()
        .filter(|e| !e.text.is_empty() && allow.allows(&e.label))
        .collect();
    kept.sort_by_key(|e| std::cmp::Reverse(e.text.chars().count()));
    kept
}

/// Detector that never finds anything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoEntities;

impl EntityDetector for NoEntities {
    fn name(&self) -> &str {
        "none"
    }

    fn detect_entities(&self, _text: &str) -> Result<Vec<SensitiveSpan>> {
        Ok(Vec::new())
    }
}

/// Fixed term lists per label; reports every whole-word occurrence of each term
#[derive(Debug, Clone, Default)]
pub struct Gazetteer {
    terms: Vec<(String, Regex)>,
}

impl Gazetteer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `terms` under `label`
    pub fn add_terms<I, S>(&mut self, label: &str, terms: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for term in terms {
            let term = term.as_ref();
            if term.is_empty() {
                continue;
            }
            let regex = Regex::new(&whole_word(term)).map_err(|source| {
                PseudonymError::InvalidPattern {
                    name: format!("{}:{}", label, term),
                    source,
                }
            })?;
            self.terms.push((label.to_string(), regex));
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

/// Escape `term`, adding word boundaries only where the term starts or ends with a word char
fn whole_word(term: &str) -> String {
    let is_word = |c: char| c.is_alphanumeric() || c == '_';
    let lead = if term.starts_with(is_word) { r"\b" } else { "" };
    let tail = if term.ends_with(is_word) { r"\b" } else { "" };
    format!("{}{}{}", lead, regex::escape(term), tail)
}

impl EntityDetector for Gazetteer {
    fn name(&self) -> &str {
        "gazetteer"
    }

    fn detect_entities(&self, text: &str) -> Result<Vec<SensitiveSpan>> {
        Ok(self
            .terms
            .iter()
            .flat_map(|(label, regex)| {
                regex
                    .find_iter(text)
                    .map(move |m| SensitiveSpan::new(m.as_str(), label))
            })
            .collect())
    }
}

/// Entity as reported by an external recognizer
#[derive(Debug, Deserialize)]
struct RawEntity {
    text: String,
    label: String,
}

/// Runs an external recognizer process.
///
/// The text is written to the child's stdin; stdout must be a JSON array of
/// `{"text": ..., "label": ...}` objects.
#[derive(Debug, Clone)]
pub struct CommandDetector {
    program: String,
    args: Vec<String>,
}

impl CommandDetector {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    fn fail(&self, message: impl std::fmt::Display) -> PseudonymError {
        PseudonymError::detection(self.name(), format!("{}: {}", self.program, message))
    }
}

impl EntityDetector for CommandDetector {
    fn name(&self) -> &str {
        "command"
    }

    fn detect_entities(&self, text: &str) -> Result<Vec<SensitiveSpan>> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| self.fail(format!("failed to spawn: {}", e)))?;

        // Feed stdin from a separate thread so a chatty child can't fill its
        // stdout pipe while we are still writing.
        let writer = child.stdin.take().map(|mut stdin| {
            let input = text.to_string();
            std::thread::spawn(move || stdin.write_all(input.as_bytes()))
        });

        let output = child
            .wait_with_output()
            .map_err(|e| self.fail(format!("failed to wait: {}", e)))?;

        let written = writer.map(|handle| handle.join());

        // A child that exits early stops reading, so its exit status and
        // stderr take precedence over a broken pipe on our side
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(self.fail(format!("exited with {}: {}", output.status, stderr.trim())));
        }

        match written {
            None | Some(Ok(Ok(()))) => {}
            Some(Ok(Err(e))) => return Err(self.fail(format!("failed to write input: {}", e))),
            Some(Err(_)) => return Err(self.fail("input writer panicked")),
        }

        let raw: Vec<RawEntity> = serde_json::from_slice(&output.stdout)
            .map_err(|e| self.fail(format!("unreadable output: {}", e)))?;

        debug!(count = raw.len(), program = %self.program, "External recognizer returned entities");

        Ok(raw
            .into_iter()
            .map(|e| SensitiveSpan {
                text: e.text,
                label: e.label,
            })
            .collect())
    }
}

/// Runs several detectors and concatenates their results; any failure fails the whole
#[derive(Default)]
pub struct CompositeDetector {
    detectors: Vec<Box<dyn EntityDetector>>,
}

impl CompositeDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, detector: Box<dyn EntityDetector>) {
        self.detectors.push(detector);
    }

    pub fn len(&self) -> usize {
        self.detectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detectors.is_empty()
    }
}

impl EntityDetector for CompositeDetector {
    fn name(&self) -> &str {
        "composite"
    }

    fn detect_entities(&self, text: &str) -> Result<Vec<SensitiveSpan>> {
        let mut all = Vec::new();
        for detector in &self.detectors {
            all.extend(detector.detect_entities(text)?);
        }
        Ok(all)
    }
}
