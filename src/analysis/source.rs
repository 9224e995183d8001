//! Source units and the read-only view handed to detectors.

use std::fmt;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::parser::{ParseDiagnostic, ParseSession};

/// One (path, text) pair supplied by file discovery.
#[derive(Debug, Clone)]
pub enum SourceInput {
    /// Text is available.
    Text { path: String, text: String },
    /// The path could not be read.
    Unreadable { path: String, error: String },
}

impl SourceInput {
    pub fn new(path: impl Into<String>, text: impl Into<String>) -> Self {
        SourceInput::Text {
            path: path.into(),
            text: text.into(),
        }
    }

    /// Read a file from disk. Read failures are kept as data, not returned.
    pub fn load<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        let display = path.to_string_lossy().to_string();
        match fs::read_to_string(path) {
            Ok(text) => SourceInput::Text {
                path: display,
                text,
            },
            Err(e) => SourceInput::Unreadable {
                path: display,
                error: e.to_string(),
            },
        }
    }

    pub fn path(&self) -> &str {
        match self {
            SourceInput::Text { path, .. } | SourceInput::Unreadable { path, .. } => path,
        }
    }
}

/// Lifecycle of a unit inside one run.
///
/// `Loaded -> Parsed | ParseFailed -> DetectorsRun -> Aggregated`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitState {
    Loaded,
    Parsed,
    ParseFailed,
    DetectorsRun,
    Aggregated,
}

impl fmt::Display for UnitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UnitState::Loaded => "loaded",
            UnitState::Parsed => "parsed",
            UnitState::ParseFailed => "parse_failed",
            UnitState::DetectorsRun => "detectors_run",
            UnitState::Aggregated => "aggregated",
        };
        write!(f, "{}", s)
    }
}

/// One file under analysis.
///
/// The tree is built at most once; later parse requests are ignored.
pub struct SourceUnit {
    path: String,
    text: String,
    tree: Option<tree_sitter::Tree>,
    parse_ok: bool,
    parse_error: Option<ParseDiagnostic>,
    state: UnitState,
}

impl SourceUnit {
    pub fn new(path: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            text: text.into(),
            tree: None,
            parse_ok: false,
            parse_error: None,
            state: UnitState::Loaded,
        }
    }

    /// Parse the unit with `session`.
    ///
    /// A partial tree moves the unit to `ParseFailed` unless
    /// `tolerate_syntax_errors` is set, in which case it is kept as `Parsed`
    /// with the diagnostic still recorded.
    pub fn parse_with(
        &mut self,
        session: &mut dyn ParseSession,
        tolerate_syntax_errors: bool,
    ) -> UnitState {
        if self.state != UnitState::Loaded {
            return self.state;
        }

        let outcome = session.parse(&self.text);
        self.parse_ok = outcome.success;
        self.parse_error = outcome.error;
        self.tree = outcome.tree;

        self.state = match (&self.tree, self.parse_ok) {
            (Some(_), true) => UnitState::Parsed,
            (Some(_), false) if tolerate_syntax_errors => UnitState::Parsed,
            _ => UnitState::ParseFailed,
        };
        if self.state == UnitState::ParseFailed && self.parse_error.is_none() {
            self.parse_error = Some(ParseDiagnostic::no_tree("unknown parser failure"));
        }
        self.state
    }

    pub(crate) fn advance(&mut self, next: UnitState) {
        self.state = next;
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn state(&self) -> UnitState {
        self.state
    }

    pub fn parse_ok(&self) -> bool {
        self.parse_ok
    }

    pub fn parse_error(&self) -> Option<&ParseDiagnostic> {
        self.parse_error.as_ref()
    }

    /// Read-only view for detectors. `None` until a tree exists.
    pub fn view(&self) -> Option<SourceView<'_>> {
        self.tree.as_ref().map(|tree| SourceView {
            path: &self.path,
            text: &self.text,
            tree,
        })
    }
}

/// Borrowed tree and text of a parsed unit.
#[derive(Clone, Copy)]
pub struct SourceView<'a> {
    path: &'a str,
    text: &'a str,
    tree: &'a tree_sitter::Tree,
}

impl<'a> SourceView<'a> {
    pub fn new(path: &'a str, text: &'a str, tree: &'a tree_sitter::Tree) -> Self {
        Self { path, text, tree }
    }

    pub fn path(&self) -> &'a str {
        self.path
    }

    pub fn text(&self) -> &'a str {
        self.text
    }

    pub fn root(&self) -> tree_sitter::Node<'a> {
        self.tree.root_node()
    }

    /// Get text for a tree-sitter node.
    pub fn node_text(&self, node: tree_sitter::Node) -> &'a str {
        node.utf8_text(self.text.as_bytes()).unwrap_or("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{ParseOutcome, RustSyntaxProvider};
    use tempfile::TempDir;

    struct NoTreeSession;

    impl ParseSession for NoTreeSession {
        fn parse(&mut self, _text: &str) -> ParseOutcome {
            ParseOutcome::failed(ParseDiagnostic::no_tree("test"))
        }
    }

    #[test]
    fn test_parse_transitions() {
        let mut session = RustSyntaxProvider::new().open().unwrap();

        let mut unit = SourceUnit::new("ok.rs", "fn a() {}");
        assert_eq!(unit.state(), UnitState::Loaded);
        assert_eq!(unit.parse_with(&mut session, false), UnitState::Parsed);
        assert!(unit.view().is_some());

        let mut broken = SourceUnit::new("bad.rs", "fn a( {");
        assert_eq!(broken.parse_with(&mut session, false), UnitState::ParseFailed);
        assert!(broken.parse_error().is_some());

        let mut tolerated = SourceUnit::new("bad.rs", "fn a( {");
        assert_eq!(tolerated.parse_with(&mut session, true), UnitState::Parsed);
        assert!(!tolerated.parse_ok());
        assert!(tolerated.parse_error().is_some());
    }

    #[test]
    fn test_parse_only_once() {
        let mut session = RustSyntaxProvider::new().open().unwrap();
        let mut unit = SourceUnit::new("ok.rs", "fn a() {}");
        unit.parse_with(&mut session, false);

        // A second request with a failing session must not replace the tree.
        let mut failing = NoTreeSession;
        assert_eq!(unit.parse_with(&mut failing, false), UnitState::Parsed);
        assert!(unit.view().is_some());
    }

    #[test]
    fn test_no_tree_is_parse_failed() {
        let mut unit = SourceUnit::new("x.rs", "fn a() {}");
        assert_eq!(unit.parse_with(&mut NoTreeSession, true), UnitState::ParseFailed);
        assert!(unit.view().is_none());
    }

    #[test]
    fn test_load_missing_file() {
        let temp = TempDir::new().unwrap();
        let input = SourceInput::load(temp.path().join("missing.rs"));
        assert!(matches!(input, SourceInput::Unreadable { .. }));
        assert!(input.path().ends_with("missing.rs"));
    }

    #[test]
    fn test_load_existing_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("lib.rs");
        fs::write(&path, "fn a() {}").unwrap();
        match SourceInput::load(&path) {
            SourceInput::Text { text, .. } => assert_eq!(text, "fn a() {}"),
            other => panic!("expected text, got {:?}", other),
        }
    }
}
