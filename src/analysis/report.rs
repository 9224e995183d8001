//! Aggregated result of one analysis run.

use serde::{Deserialize, Serialize};

use crate::detect::{Finding, Severity};
use crate::parser::ParseDiagnostic;

/// Terminal status of one unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitStatus {
    /// Detectors ran (possibly on a tolerated partial tree).
    Analyzed,
    /// The unit was excluded after a fatal parse failure.
    ParseFailed,
    /// The path could not be read.
    Unreadable,
}

impl UnitStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitStatus::Analyzed => "analyzed",
            UnitStatus::ParseFailed => "parse_failed",
            UnitStatus::Unreadable => "unreadable",
        }
    }
}

/// Category of a recorded, non-fatal failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Parse,
    Detector,
    Timeout,
    Io,
    Configuration,
}

/// A failure contained during the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEntry {
    pub kind: ErrorKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detector: Option<String>,
    pub message: String,
}

impl ErrorEntry {
    pub fn parse(path: &str, diagnostic: &ParseDiagnostic) -> Self {
        Self {
            kind: ErrorKind::Parse,
            path: Some(path.to_string()),
            detector: None,
            message: diagnostic.to_string(),
        }
    }

    pub fn detector(path: &str, detector: &str, message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Detector,
            path: Some(path.to_string()),
            detector: Some(detector.to_string()),
            message: message.into(),
        }
    }

    pub fn timeout(path: &str, detector: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Timeout,
            path: Some(path.to_string()),
            detector: detector.map(str::to_string),
            message: message.into(),
        }
    }

    pub fn io(path: &str, message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Io,
            path: Some(path.to_string()),
            detector: None,
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Configuration,
            path: None,
            detector: None,
            message: message.into(),
        }
    }
}

/// Wall-clock time one detector spent on one unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectorTiming {
    pub detector: String,
    pub elapsed_us: u64,
}

/// Per-unit outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitResult {
    pub path: String,
    pub status: UnitStatus,
    pub findings: Vec<Finding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parse_error: Option<ParseDiagnostic>,
    pub elapsed_us: u64,
    #[serde(default)]
    pub detector_timings: Vec<DetectorTiming>,
}

/// Finding totals per severity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityCounts {
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub informational: usize,
}

impl SeverityCounts {
    pub fn add(&mut self, severity: Severity) {
        match severity {
            Severity::Critical => self.critical += 1,
            Severity::High => self.high += 1,
            Severity::Medium => self.medium += 1,
            Severity::Low => self.low += 1,
            Severity::Informational => self.informational += 1,
        }
    }

    pub fn get(&self, severity: Severity) -> usize {
        match severity {
            Severity::Critical => self.critical,
            Severity::High => self.high,
            Severity::Medium => self.medium,
            Severity::Low => self.low,
            Severity::Informational => self.informational,
        }
    }

    pub fn total(&self) -> usize {
        Severity::ALL.iter().map(|s| self.get(*s)).sum()
    }

    /// Number of findings at `threshold` or above.
    pub fn at_or_above(&self, threshold: Severity) -> usize {
        Severity::ALL
            .iter()
            .filter(|s| **s >= threshold)
            .map(|s| self.get(*s))
            .sum()
    }
}

/// The complete, serializable result of one run.
///
/// Units appear in input order. Within a unit, findings are grouped by
/// detector in run order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub version: String,
    /// Detectors that ran, in run order.
    pub detectors: Vec<String>,
    pub units: Vec<UnitResult>,
    pub summary: SeverityCounts,
    pub errors: Vec<ErrorEntry>,
    pub elapsed_us: u64,
}

impl AnalysisReport {
    /// All findings across units, in report order.
    pub fn findings(&self) -> impl Iterator<Item = &Finding> {
        self.units.iter().flat_map(|u| u.findings.iter())
    }

    pub fn finding_count(&self) -> usize {
        self.units.iter().map(|u| u.findings.len()).sum()
    }

    pub fn errors_of(&self, kind: ErrorKind) -> impl Iterator<Item = &ErrorEntry> {
        self.errors.iter().filter(move |e| e.kind == kind)
    }

    pub fn unit(&self, path: &str) -> Option<&UnitResult> {
        self.units.iter().find(|u| u.path == path)
    }

    /// Highest severity present, if any.
    pub fn max_severity(&self) -> Option<Severity> {
        self.findings().map(|f| f.severity()).max()
    }
}
