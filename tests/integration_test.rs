use std::thread;

use tempfile::TempDir;

use pseudonymizer::detect::{AllowList, EntityDetector, Gazetteer, PatternDetector, SensitiveSpan};
use pseudonymizer::storage::SnapshotStore;
use pseudonymizer::{
    depseudonymize, pseudonymize, Mapping, MappingStore, PseudonymError, Session, SessionState,
    SharedSession,
};

fn people(terms: &[&str]) -> Box<dyn EntityDetector> {
    let mut gazetteer = Gazetteer::new();
    gazetteer.add_terms("PERSON", terms.iter().copied()).unwrap();
    Box::new(gazetteer)
}

fn session_with_people(terms: &[&str]) -> Session {
    Session::new(
        PatternDetector::default_patterns(),
        people(terms),
        AllowList::default(),
    )
}

struct Unreachable;

impl EntityDetector for Unreachable {
    fn name(&self) -> &str {
        "unreachable"
    }

    fn detect_entities(&self, _text: &str) -> pseudonymizer::Result<Vec<SensitiveSpan>> {
        Err(PseudonymError::Detection {
            detector: "unreachable".to_string(),
            message: "model not loaded".to_string(),
        })
    }
}

/// Detect, pseudonymize, restore, and get the original back
#[test]
fn test_full_roundtrip() {
    let mut session = session_with_people(&["Tyler Jensen", "Rachel"]);
    let text = "Tyler Jensen wrote to Rachel at rachel@example.org about 555-867-5309.\n\
                Rachel forwarded it. Tyler Jensen replied.";

    let report = session.process_plain(text);
    assert!(report.is_complete());
    assert_eq!(session.state(), SessionState::Populated);

    let pseudo = session.pseudonymized_text().to_string();
    assert!(!pseudo.contains("Tyler Jensen"));
    assert!(!pseudo.contains("rachel@example.org"));
    assert!(!pseudo.contains("555-867-5309"));
    assert_eq!(pseudo.matches("[[[PERSON_").count(), 4);

    assert_eq!(session.restore(&pseudo), text);
}

#[test]
fn test_reach_me_example() {
    let mut session = Session::patterns_only();
    session.process_plain("Reach me at sam@example.com or 555-123-4567.");

    assert_eq!(
        session.pseudonymized_text(),
        "Reach me at [[[EMAIL_0]]] or [[[PHONE_1]]]."
    );
    assert_eq!(session.store().counter(), 2);
}

/// A literal contained in a longer literal never breaks the longer one
#[test]
fn test_longest_literal_wins() {
    let mapping = Mapping::from_pairs(vec![
        ("Tyler".to_string(), "[[[PERSON_1]]]".to_string()),
        ("Tyler Jensen".to_string(), "[[[PERSON_0]]]".to_string()),
    ])
    .unwrap();

    let text = "Tyler Jensen and Tyler";
    let pseudo = pseudonymize(text, &mapping);
    assert_eq!(pseudo, "[[[PERSON_0]]] and [[[PERSON_1]]]");
    assert_eq!(depseudonymize(&pseudo, &mapping), text);

    let lengths: Vec<usize> = mapping
        .iter()
        .map(|e| e.literal.chars().count())
        .collect();
    assert!(lengths.windows(2).all(|w| w[0] >= w[1]));
}

/// Detection never overwrites an existing entry
#[test]
fn test_first_writer_wins() {
    let mut session = session_with_people(&["sam@example.com"]);
    session.process_plain("sam@example.com");

    assert_eq!(
        session.store().mapping().token_for("sam@example.com"),
        Some("[[[EMAIL_0]]]")
    );

    session.process_plain("again sam@example.com");
    assert_eq!(session.store().len(), 1);
    assert_eq!(session.store().counter(), 1);
}

#[test]
fn test_unknown_tokens_pass_through() {
    let mut session = Session::patterns_only();
    session.process_plain("sam@example.com");

    let restored = session
        .restore("[[[EMAIL_0]]] cc [[[EMAIL_9]]] and [[[ ]]]")
        .to_string();
    assert_eq!(restored, "sam@example.com cc [[[EMAIL_9]]] and [[[ ]]]");
}

#[test]
fn test_entity_failure_keeps_pattern_results() {
    let mut session = Session::new(
        PatternDetector::default_patterns(),
        Box::new(Unreachable),
        AllowList::default(),
    );

    let report = session.process_plain("SSN 123-45-6789");
    assert!(!report.is_complete());
    assert!(report.entity_error.as_ref().unwrap().is_detection_error());
    assert_eq!(session.pseudonymized_text(), "SSN [[[SSN_0]]]");
}

#[test]
fn test_malformed_document_leaves_state_intact() {
    let mut session = Session::patterns_only();
    session.process_plain("Call 555-123-4567");
    let before = session.mapping_document();

    for bad in [
        "not json",
        r#"["555-123-4567"]"#,
        r#"{"a": "[[[X_0]]]", "b": "[[[X_0]]]"}"#,
        r#"{"": "[[[X_0]]]"}"#,
        r#"{"a": 1}"#,
    ] {
        let err = session.replace_document(bad).unwrap_err();
        assert!(err.is_parse_error(), "{bad} should fail to parse");
    }

    assert_eq!(session.mapping_document(), before);
    assert_eq!(session.pseudonymized_text(), "Call [[[PHONE_0]]]");
}

/// Hand edits are applied to the held text right away
#[test]
fn test_edit_then_refresh() {
    let mut session = Session::patterns_only();
    session.process_plain("Call 555-123-4567, ask for Dana");

    let token = session.add_manual_entry("Dana", "person").unwrap();
    assert!(token.starts_with("[[[PERSON_"));
    assert_eq!(session.state(), SessionState::Edited);
    assert_eq!(
        session.pseudonymized_text(),
        format!("Call [[[PHONE_0]]], ask for {}", token)
    );

    session
        .replace_document(r#"{"555-123-4567": "[[[PHONE_0]]]"}"#)
        .unwrap();
    assert_eq!(session.pseudonymized_text(), "Call [[[PHONE_0]]], ask for Dana");
}

#[test]
fn test_reset_restarts_numbering() {
    let mut session = Session::patterns_only();
    session.process_plain("a@b.io c@d.io");
    assert_eq!(session.store().counter(), 2);

    session.reset();
    assert!(session.store().is_empty());
    assert_eq!(session.state(), SessionState::Empty);

    session.process_plain("e@f.io");
    assert_eq!(session.pseudonymized_text(), "[[[EMAIL_0]]]");
}

#[test]
fn test_store_merge_is_atomic() {
    let mut store = MappingStore::new();
    store.insert_if_absent("Dana", "PERSON").unwrap();

    let result = store.merge(vec![
        ("Rachel".to_string(), "[[[PERSON_5]]]".to_string()),
        ("Tyler".to_string(), "[[[PERSON_0]]]".to_string()),
    ]);
    assert!(result.is_err());
    assert_eq!(store.len(), 1);
    assert!(!store.mapping().contains_literal("Rachel"));
}

#[test]
fn test_snapshot_resume() {
    let dir = TempDir::new().unwrap();
    let snapshots = SnapshotStore::in_dir(dir.path());

    let mut session = session_with_people(&["Tyler Jensen"]);
    session.process_plain("Tyler Jensen, 555-123-4567");
    snapshots.save(&session.snapshot()).unwrap();

    let mut resumed = session_with_people(&["Tyler Jensen"]);
    resumed.load_snapshot(snapshots.load().unwrap().unwrap());

    assert_eq!(resumed.store().counter(), session.store().counter());
    assert_eq!(resumed.state(), SessionState::Populated);
    assert_eq!(
        resumed.restore(session.pseudonymized_text()),
        "Tyler Jensen, 555-123-4567"
    );

    resumed.process_plain("sam@example.com");
    assert_eq!(resumed.pseudonymized_text(), "[[[EMAIL_2]]]");
}

#[test]
fn test_shared_session_across_threads() {
    let shared = SharedSession::new(Session::patterns_only());

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let shared = shared.clone();
            thread::spawn(move || {
                shared.with(|s| {
                    s.process_plain(&format!("user{}@example.com", i));
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
        let mut tokens: Vec<&str> = s.store().mapping().iter().map(|e| e.token.as_str()).collect();
        tokens.sort();
        tokens.dedup();
        assert_eq!(tokens.len(), 4);
    });
}
