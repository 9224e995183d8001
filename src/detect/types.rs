//! Core types for detection results.

use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::analysis::SourceView;

/// Maximum snippet length kept on a finding.
const MAX_SNIPPET_CHARS: usize = 200;

/// Severity levels for findings, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Informational,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// All severities, most severe first.
    pub const ALL: [Severity; 5] = [
        Severity::Critical,
        Severity::High,
        Severity::Medium,
        Severity::Low,
        Severity::Informational,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
            Severity::Informational => "informational",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Critical => write!(f, "Critical"),
            Severity::High => write!(f, "High"),
            Severity::Medium => write!(f, "Medium"),
            Severity::Low => write!(f, "Low"),
            Severity::Informational => write!(f, "Informational"),
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "critical" => Ok(Severity::Critical),
            "high" => Ok(Severity::High),
            "medium" => Ok(Severity::Medium),
            "low" => Ok(Severity::Low),
            "informational" | "info" => Ok(Severity::Informational),
            _ => Err(format!("unknown severity: {}", s)),
        }
    }
}

/// A single reported issue.
///
/// Fields are fixed by the constructor; consumers read them through accessors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    detector_name: String,
    severity: Severity,
    message: String,
    file_path: String,
    start_line: usize,
    start_column: usize,
    end_line: usize,
    end_column: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    snippet: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    recommendation: Option<String>,
    #[serde(skip)]
    byte_range: Range<usize>,
}

impl Finding {
    /// Create a finding spanning `node`, with the node text as snippet.
    pub fn at_node(
        detector_name: &str,
        severity: Severity,
        message: impl Into<String>,
        source: &SourceView<'_>,
        node: tree_sitter::Node,
    ) -> Self {
        let start = node.start_position();
        let end = node.end_position();
        Self {
            detector_name: detector_name.to_string(),
            severity,
            message: message.into(),
            file_path: source.path().to_string(),
            start_line: start.row + 1,
            start_column: start.column + 1,
            end_line: end.row + 1,
            end_column: end.column + 1,
            snippet: Some(truncate_snippet(source.node_text(node))),
            recommendation: None,
            byte_range: node.start_byte()..node.end_byte(),
        }
    }

    /// Attach a remediation hint. Only used while the finding is being built.
    pub fn with_recommendation(mut self, recommendation: impl Into<String>) -> Self {
        self.recommendation = Some(recommendation.into());
        self
    }

    pub fn detector_name(&self) -> &str {
        &self.detector_name
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn file_path(&self) -> &str {
        &self.file_path
    }

    pub fn start_line(&self) -> usize {
        self.start_line
    }

    pub fn start_column(&self) -> usize {
        self.start_column
    }

    pub fn end_line(&self) -> usize {
        self.end_line
    }

    pub fn end_column(&self) -> usize {
        self.end_column
    }

    pub fn snippet(&self) -> Option<&str> {
        self.snippet.as_deref()
    }

    pub fn recommendation(&self) -> Option<&str> {
        self.recommendation.as_deref()
    }

    /// Byte offsets into the unit's text (not serialized).
    pub fn byte_range(&self) -> Range<usize> {
        self.byte_range.clone()
    }
}

fn truncate_snippet(text: &str) -> String {
    if text.chars().count() <= MAX_SNIPPET_CHARS {
        return text.to_string();
    }
    let mut out: String = text.chars().take(MAX_SNIPPET_CHARS).collect();
    out.push_str("...");
    out
}
