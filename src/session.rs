//! A pseudonymization session: one mapping, one token counter, and the
//! detectors that feed them.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::detect::{
    select_entities, AllowList, EntityDetector, NoEntities, PatternDetector, SensitiveSpan,
};
use crate::error::Result;
use crate::mapping::{MappingStore, MintStrategy};
use crate::storage::snapshot::{Snapshot, SNAPSHOT_VERSION};
use crate::substitute;

/// Label used for manual entries when none is given
pub const DEFAULT_MANUAL_LABEL: &str = "CUSTOM";

/// Where a session is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No entries
    #[default]
    Empty,
    /// Entries came from the detectors
    Populated,
    /// Entries were changed by hand
    Edited,
}

/// A literal that received a new token during detection
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewEntry {
    pub literal: String,
    pub label: String,
    pub token: String,
}

/// Outcome of running both detectors over a text
#[derive(Debug, Default)]
pub struct PopulateReport {
    /// Spans reported by the pattern rules
    pub pattern_spans: usize,
    /// Allowed spans reported by the entity detector
    pub entity_spans: usize,
    /// Entries minted by this run, in insertion order
    pub new_entries: Vec<NewEntry>,
    /// Entity detection failure; pattern results are kept regardless
    pub entity_error: Option<crate::PseudonymError>,
}

impl PopulateReport {
    pub fn is_complete(&self) -> bool {
        self.entity_error.is_none()
    }
}

/// One pseudonymization session
pub struct Session {
    store: MappingStore,
    patterns: PatternDetector,
    entities: Box<dyn EntityDetector>,
    allow_list: AllowList,
    plain_text: String,
    pseudonymized_text: String,
    state: SessionState,
}

impl Session {
    pub fn new(
        patterns: PatternDetector,
        entities: Box<dyn EntityDetector>,
        allow_list: AllowList,
    ) -> Self {
        Self {
            store: MappingStore::new(),
            patterns,
            entities,
            allow_list,
            plain_text: String::new(),
            pseudonymized_text: String::new(),
            state: SessionState::Empty,
        }
    }

    /// Builtin pattern rules only, no entity recognition
    pub fn patterns_only() -> Self {
        Self::new(
            PatternDetector::default_patterns(),
            Box::new(NoEntities),
            AllowList::default(),
        )
    }

    /// Run the pattern rules over `text` and map every new literal.
    pub fn apply_patterns(&mut self, text: &str) -> (usize, Vec<NewEntry>) {
        let spans = self.patterns.detect(text);
        debug!(count = spans.len(), "Pattern rules matched");
        let count = spans.len();
        (count, self.admit(spans))
    }

    /// Run the entity detector over `text` and map every new allowed literal.
    ///
    /// Nothing is inserted unless the detector succeeds.
    pub fn apply_entities(&mut self, text: &str) -> Result<(usize, Vec<NewEntry>)> {
        let selected = self.detect_entities(text)?;
        let count = selected.len();
        Ok((count, self.admit(selected)))
    }

    /// Allowed entities in `text`, longest first, without touching the mapping
    pub fn detect_entities(&self, text: &str) -> Result<Vec<SensitiveSpan>> {
        let raw = self.entities.detect_entities(text)?;
        let selected = select_entities(raw, &self.allow_list);
        debug!(
            detector = self.entities.name(),
            count = selected.len(),
            "Entity detector matched"
        );
        Ok(selected)
    }

    /// Run both detectors over `text`.
    ///
    /// Pattern rules run first, so a literal both sources flag carries the
    /// pattern label. The two are separate steps: an entity detector failure
    /// is reported but does not undo the pattern results.
    pub fn populate(&mut self, text: &str) -> PopulateReport {
        let mut report = PopulateReport::default();

        let (pattern_spans, mut new_entries) = self.apply_patterns(text);
        report.pattern_spans = pattern_spans;

        match self.apply_entities(text) {
            Ok((entity_spans, entity_entries)) => {
                report.entity_spans = entity_spans;
                new_entries.extend(entity_entries);
            }
            Err(e) => {
                warn!(error = %e, "Entity detection failed; keeping pattern results");
                report.entity_error = Some(e);
            }
        }

        if !new_entries.is_empty() || (self.state == SessionState::Empty && !self.store.is_empty())
        {
            self.state = SessionState::Populated;
        }
        report.new_entries = new_entries;
        report
    }

    /// Replace every mapped literal in `text` with its token
    pub fn pseudonymize(&mut self, text: &str) -> String {
        self.store.normalize_order();
        substitute::pseudonymize(text, self.store.mapping())
    }

    /// Replace every mapped token in `text` with its literal; unknown tokens pass through
    pub fn depseudonymize(&self, text: &str) -> String {
        substitute::depseudonymize(text, self.store.mapping())
    }

    /// Take new plain text: detect, then pseudonymize it with the updated mapping
    pub fn process_plain(&mut self, text: &str) -> PopulateReport {
        let report = self.populate(text);
        self.plain_text = text.to_string();
        self.pseudonymized_text = self.pseudonymize(text);
        report
    }

    /// Re-pseudonymize the held plain text against the current mapping
    pub fn refresh(&mut self) -> &str {
        let plain = std::mem::take(&mut self.plain_text);
        self.pseudonymized_text = self.pseudonymize(&plain);
        self.plain_text = plain;
        &self.pseudonymized_text
    }

    /// Take pseudonymized text and recover the plain text from it
    pub fn restore(&mut self, pseudonymized: &str) -> &str {
        self.plain_text = self.depseudonymize(pseudonymized);
        self.pseudonymized_text = pseudonymized.to_string();
        &self.plain_text
    }

    /// Map `literal` by hand, overwriting any existing entry for it.
    ///
    /// The token gets a random suffix so it never competes with the counter.
    pub fn add_manual_entry(&mut self, literal: &str, label: &str) -> Result<String> {
        let label = if label.trim().is_empty() {
            DEFAULT_MANUAL_LABEL
        } else {
            label
        };
        let token = self
            .store
            .upsert_minted(literal, label, MintStrategy::Random)?;
        info!(token = %token, "Added manual mapping entry");
        self.state = SessionState::Edited;
        self.refresh();
        Ok(token)
    }

    /// Replace the whole mapping with a parsed document; on error nothing changes
    pub fn replace_document(&mut self, document: &str) -> Result<()> {
        self.store.replace_document(document)?;
        info!(entries = self.store.len(), "Replaced mapping");
        self.mark_edited();
        self.refresh();
        Ok(())
    }

    /// Add or overwrite specific entries; on error nothing changes
    pub fn merge<I>(&mut self, entries: I) -> Result<()>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        self.store.merge(entries)?;
        self.mark_edited();
        self.refresh();
        Ok(())
    }

    /// Move the token counter past every sequential token in the mapping
    pub fn resync_counter(&mut self) -> u64 {
        self.store.resync_counter()
    }

    /// Empty the mapping and zero the counter
    pub fn reset(&mut self) {
        self.store.reset();
        self.state = SessionState::Empty;
        info!("Session reset");
    }

    /// The mapping as a human-editable document, longest literal first
    pub fn mapping_document(&mut self) -> String {
        self.store.normalize_order();
        self.store.serialize()
    }

    pub fn store(&self) -> &MappingStore {
        &self.store
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn plain_text(&self) -> &str {
        &self.plain_text
    }

    pub fn pseudonymized_text(&self) -> &str {
        &self.pseudonymized_text
    }

    pub fn pattern_detector(&self) -> &PatternDetector {
        &self.patterns
    }

    /// Capture everything needed to resume this session later
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            version: SNAPSHOT_VERSION,
            saved_at: chrono::Utc::now().to_rfc3339(),
            counter: self.store.counter(),
            state: self.state,
            mapping: self.store.mapping().clone(),
            plain_text: self.plain_text.clone(),
            pseudonymized_text: self.pseudonymized_text.clone(),
        }
    }

    /// Resume from a snapshot, keeping this session's detectors
    pub fn load_snapshot(&mut self, snapshot: Snapshot) {
        self.store = MappingStore::from_parts(snapshot.mapping, snapshot.counter);
        self.state = if self.store.is_empty() {
            SessionState::Empty
        } else {
            snapshot.state
        };
        self.plain_text = snapshot.plain_text;
        self.pseudonymized_text = snapshot.pseudonymized_text;
    }

    /// Insert detected spans first-writer-wins, collecting the ones that were new
    fn admit(&mut self, spans: Vec<SensitiveSpan>) -> Vec<NewEntry> {
        let mut new_entries = Vec::new();
        for span in spans {
            if self.store.mapping().contains_literal(&span.text) {
                continue;
            }
            // A token showing up in the input is never mapped to another token
            if self.store.mapping().contains_token(&span.text) {
                continue;
            }
            match self.store.insert_if_absent(&span.text, &span.label) {
                Ok(token) => new_entries.push(NewEntry {
                    literal: span.text,
                    label: span.label,
                    token,
                }),
                Err(e) => debug!(error = %e, "Skipping span"),
            }
        }
        new_entries
    }

    fn mark_edited(&mut self) {
        self.state = if self.store.is_empty() {
            SessionState::Empty
        } else {
            SessionState::Edited
        };
    }
}

/// A session behind one lock, for hosts that serve it from several threads
#[derive(Clone)]
pub struct SharedSession {
    inner: Arc<Mutex<Session>>,
}

impl SharedSession {
    pub fn new(session: Session) -> Self {
        Self {
            inner: Arc::new(Mutex::new(session)),
        }
    }

    /// Run `f` with exclusive access to the session
    pub fn with<R>(&self, f: impl FnOnce(&mut Session) -> R) -> R {
        let mut guard = self.inner.lock();
        f(&mut guard)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::Gazetteer;
    use crate::PseudonymError;

    fn gazetteer_session(label: &str, terms: &[&str]) -> Session {
        let mut gazetteer = Gazetteer::new();
        gazetteer.add_terms(label, terms).unwrap();
        Session::new(
            PatternDetector::default_patterns(),
            Box::new(gazetteer),
            AllowList::default(),
        )
    }

    struct Unavailable;

    impl EntityDetector for Unavailable {
        fn name(&self) -> &str {
            "unavailable"
        }

        fn detect_entities(&self, _text: &str) -> Result<Vec<SensitiveSpan>> {
            Err(PseudonymError::detection("unavailable", "model not loaded"))
        }
    }

    #[test]
    fn test_reach_me_example() {
        let mut session = Session::patterns_only();
        let text = "Reach me at sam@example.com or 555-123-4567.";

        let report = session.process_plain(text);
        assert!(report.is_complete());
        assert_eq!(report.new_entries.len(), 2);
        assert_eq!(report.new_entries[0].label, "email");
        assert_eq!(report.new_entries[1].label, "phone");

        let pseudo = session.pseudonymized_text();
        assert!(!pseudo.contains("sam@example.com"));
        assert!(!pseudo.contains("555-123-4567"));
        assert_eq!(session.depseudonymize(pseudo), text);
        assert_eq!(session.state(), SessionState::Populated);
    }

    #[test]
    fn test_longer_entity_claims_slot_first() {
        let mut session = gazetteer_session("PERSON", &["Tyler", "Tyler Jensen"]);

        session.process_plain("Tyler Jensen called Tyler");

        assert_eq!(
            session.store().mapping().token_for("Tyler Jensen"),
            Some("[[[PERSON_0]]]")
        );
        assert_eq!(
            session.store().mapping().token_for("Tyler"),
            Some("[[[PERSON_1]]]")
        );
        assert_eq!(
            session.pseudonymized_text(),
            "[[[PERSON_0]]] called [[[PERSON_1]]]"
        );
    }

    #[test]
    fn test_pattern_label_wins_over_entity() {
        let mut session = gazetteer_session("ORG", &["sam@example.com"]);
        session.process_plain("Write to sam@example.com");

        let token = session.store().mapping().token_for("sam@example.com");
        assert_eq!(token, Some("[[[EMAIL_0]]]"));
        assert_eq!(session.store().len(), 1);
    }

    #[test]
    fn test_disallowed_entities_ignored() {
        let mut session = gazetteer_session("DATE", &["January 3"]);
        session.process_plain("Date: January 3");
        assert!(session.store().is_empty());
        assert_eq!(session.state(), SessionState::Empty);
    }

    #[test]
    fn test_entity_failure_keeps_patterns() {
        let mut session = Session::new(
            PatternDetector::default_patterns(),
            Box::new(Unavailable),
            AllowList::default(),
        );

        let report = session.process_plain("Mail sam@example.com today");

        assert!(!report.is_complete());
        assert!(report
            .entity_error
            .as_ref()
            .is_some_and(|e| e.is_detection_error()));
        assert_eq!(session.store().len(), 1);
        assert_eq!(session.pseudonymized_text(), "Mail [[[EMAIL_0]]] today");
    }

    #[test]
    fn test_populating_pseudonymized_text_is_stable() {
        let mut session = Session::patterns_only();
        session.process_plain("sam@example.com");
        let pseudo = session.pseudonymized_text().to_string();

        session.populate(&pseudo);
        assert_eq!(session.store().len(), 1);
        assert_eq!(session.pseudonymize(&pseudo), pseudo);
    }

    #[test]
    fn test_manual_entry_repseudonymizes() {
        let mut session = Session::patterns_only();
        session.process_plain("Dana wrote The Shepherd of Hollow Hill");

        let token = session
            .add_manual_entry("The Shepherd of Hollow Hill", "work of art")
            .unwrap();

        assert!(token.starts_with("[[[WORK_OF_ART_"));
        assert_eq!(session.pseudonymized_text(), format!("Dana wrote {}", token));
        assert_eq!(session.state(), SessionState::Edited);
        assert_eq!(session.store().counter(), 0);
    }

    #[test]
    fn test_manual_entry_defaults_label() {
        let mut session = Session::patterns_only();
        let token = session.add_manual_entry("Biscuit", " ").unwrap();
        assert!(token.starts_with("[[[CUSTOM_"));
    }

    #[test]
    fn test_manual_entry_overwrites() {
        let mut session = Session::patterns_only();
        session.process_plain("sam@example.com");

        let token = session.add_manual_entry("sam@example.com", "PERSON").unwrap();
        assert_eq!(
            session.store().mapping().token_for("sam@example.com"),
            Some(token.as_str())
        );
        assert_eq!(session.store().len(), 1);
    }

    #[test]
    fn test_manual_entry_rejects_empty_literal() {
        let mut session = Session::patterns_only();
        let err = session.add_manual_entry("", "PERSON").unwrap_err();
        assert!(matches!(err, PseudonymError::EmptyLiteral));
        assert_eq!(session.state(), SessionState::Empty);
    }

    #[test]
    fn test_replace_document_refreshes() {
        let mut session = Session::patterns_only();
        session.process_plain("Mark and Rachel");

        session
            .replace_document(r#"{"Rachel": "[[[PERSON_r]]]", "Mark": "[[[PERSON_m]]]"}"#)
            .unwrap();

        assert_eq!(session.pseudonymized_text(), "[[[PERSON_m]]] and [[[PERSON_r]]]");
        assert_eq!(session.state(), SessionState::Edited);
    }

    #[test]
    fn test_bad_document_changes_nothing() {
        let mut session = Session::patterns_only();
        session.process_plain("sam@example.com");
        let before_doc = session.mapping_document();
        let before_text = session.pseudonymized_text().to_string();

        assert!(session.replace_document("{ nope").is_err());

        assert_eq!(session.mapping_document(), before_doc);
        assert_eq!(session.pseudonymized_text(), before_text);
        assert_eq!(session.state(), SessionState::Populated);
    }

    #[test]
    fn test_merge_keeps_other_entries() {
        let mut session = Session::patterns_only();
        session.process_plain("sam@example.com or 555-123-4567");

        session
            .merge(vec![("Sam".to_string(), "[[[PERSON_s]]]".to_string())])
            .unwrap();

        assert_eq!(session.store().len(), 3);
        let literals: Vec<_> = session
            .store()
            .mapping()
            .iter()
            .map(|e| e.literal.as_str())
            .collect();
        assert_eq!(literals, vec!["sam@example.com", "555-123-4567", "Sam"]);
    }

    #[test]
    fn test_reset_zeroes_counter() {
        let mut session = Session::patterns_only();
        session.process_plain("a@b.org c@d.org 555-123-4567");
        assert_eq!(session.store().counter(), 3);

        session.reset();
        assert!(session.store().is_empty());
        assert_eq!(session.state(), SessionState::Empty);

        session.process_plain("e@f.org");
        assert_eq!(
            session.store().mapping().token_for("e@f.org"),
            Some("[[[EMAIL_0]]]")
        );
    }

    #[test]
    fn test_restore_passes_unknown_tokens() {
        let mut session = Session::patterns_only();
        session.process_plain("sam@example.com");

        let plain = session.restore("[[[EMAIL_0]]] and [[[PERSON_99]]]").to_string();
        assert_eq!(plain, "sam@example.com and [[[PERSON_99]]]");
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let mut session = Session::patterns_only();
        session.process_plain("Call 555-123-4567");
        let snapshot = session.snapshot();

        let mut resumed = Session::patterns_only();
        resumed.load_snapshot(snapshot);

        assert_eq!(resumed.store().counter(), 1);
        assert_eq!(resumed.state(), SessionState::Populated);
        assert_eq!(resumed.plain_text(), "Call 555-123-4567");
        assert_eq!(resumed.pseudonymized_text(), "Call [[[PHONE_0]]]");

        resumed.process_plain("Or 555-987-6543");
        assert_eq!(
            resumed.store().mapping().token_for("555-987-6543"),
            Some("[[[PHONE_1]]]")
        );
    }

    #[test]
    fn test_shared_session_across_threads() {
        let shared = SharedSession::new(Session::patterns_only());

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let shared = shared.clone();
                std::thread::spawn(move || {
                    shared.with(|s| {
                        s.populate(&format!("user{}@example.com", i));
                    })
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        shared.with(|s| {
            assert_eq!(s.store().len(), 4);
            assert_eq!(s.store().counter(), 4);
        });
    }
}
