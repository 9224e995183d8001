//! Integration tests for the syntax provider against the testdata
//! contracts.

use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use stylus_scan::parser::{ParseSession, RustSyntaxProvider, SyntaxProvider};

fn read_fixture(name: &str) -> String {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("testdata")
        .join(name);
    std::fs::read_to_string(&path).expect("fixture should be readable")
}

#[test]
fn test_contract_fixtures_parse_cleanly() {
    let provider = RustSyntaxProvider::shared();
    let mut session = provider.new_session().expect("session should open");

    for name in [
        "clean.rs",
        "encode_packed.rs",
        "locked_ether.rs",
        "termination.rs",
        "unchecked_transfer.rs",
        "unsafe_transfer.rs",
    ] {
        let outcome = session.parse(&read_fixture(name));
        assert!(outcome.success, "{} should parse: {:?}", name, outcome.error);
        let tree = outcome.tree.expect("clean parse has a tree");
        assert_eq!(tree.root_node().kind(), "source_file");
    }
}

#[test]
fn test_malformed_fixture_yields_partial_tree() {
    let mut session = RustSyntaxProvider::new().open().unwrap();
    let outcome = session.parse(&read_fixture("malformed.rs"));

    assert!(!outcome.success);
    assert!(outcome.tree.is_some());
    let diagnostic = outcome.error.expect("diagnostic for malformed source");
    assert!(diagnostic.line.is_some(), "got {}", diagnostic);
}

#[test]
fn test_sessions_are_independent_across_threads() {
    let provider = RustSyntaxProvider::new();
    let text = read_fixture("clean.rs");
    let expected = {
        let mut session = provider.new_session().unwrap();
        session
            .parse(&text)
            .tree
            .unwrap()
            .root_node()
            .to_sexp()
    };

    thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|_| {
                scope.spawn(|| {
                    let mut session = provider.new_session().unwrap();
                    let mut trees = Vec::new();
                    for _ in 0..5 {
                        let outcome = session.parse(&text);
                        trees.push(outcome.tree.unwrap().root_node().to_sexp());
                    }
                    trees
                })
            })
            .collect();
        for handle in handles {
            for tree in handle.join().unwrap() {
                assert_eq!(tree, expected);
            }
        }
    });
}

#[test]
fn test_session_timeout_still_parses_small_units() {
    let mut session = RustSyntaxProvider::new().new_session().unwrap();
    session.set_timeout(Some(Duration::from_secs(5)));
    assert!(session.parse(&read_fixture("locked_ether.rs")).success);
}

#[test]
fn test_session_timeout_on_oversized_unit() {
    let mut session = RustSyntaxProvider::shared().new_session().unwrap();
    session.set_timeout(Some(Duration::from_micros(1)));
    let text = read_fixture("clean.rs").repeat(2_000);

    let outcome = session.parse(&text);
    assert!(outcome.tree.is_none());
    let diagnostic = outcome.error.expect("timed-out parse has a diagnostic");
    assert!(diagnostic.timed_out, "got {}", diagnostic);
}
