//! Output formatting for analysis reports.
//!
//! Supports two output formats:
//! - Pretty: colored terminal output for human readability
//! - JSON: the serialized `AnalysisReport` for programmatic consumption

use std::io::Write;

use colored::*;

use crate::analysis::{AnalysisReport, ErrorEntry, ErrorKind, UnitStatus};
use crate::detect::{Finding, Severity};

// =============================================================================
// JSON Format
// =============================================================================

/// Write the report as pretty-printed JSON.
pub fn write_json<W: Write>(out: &mut W, report: &AnalysisReport) -> anyhow::Result<()> {
    serde_json::to_writer_pretty(&mut *out, report)?;
    writeln!(out)?;
    Ok(())
}

// =============================================================================
// Pretty Format
// =============================================================================

/// Write the report in human-readable form.
pub fn write_pretty<W: Write>(
    out: &mut W,
    path: &str,
    report: &AnalysisReport,
) -> anyhow::Result<()> {
    // Header
    writeln!(out)?;
    writeln!(
        out,
        "  {} v{}",
        "stylus-scan".cyan().bold(),
        env!("CARGO_PKG_VERSION")
    )?;
    writeln!(out)?;
    writeln!(out, "  {}{}", "Scanning:  ".dimmed(), path)?;
    writeln!(out, "  {}{}", "Detectors: ".dimmed(), report.detectors.join(", "))?;
    writeln!(out)?;

    write_result_summary(out, report)?;
    writeln!(out)?;

    let findings: Vec<&Finding> = report.findings().collect();
    if !findings.is_empty() {
        write_findings(out, &findings)?;
    }

    if !report.errors.is_empty() {
        write_errors(out, &report.errors)?;
    }

    let analyzed = report
        .units
        .iter()
        .filter(|u| u.status == UnitStatus::Analyzed)
        .count();
    writeln!(
        out,
        "  {}",
        format!(
            "Analyzed {} of {} file(s) in {:.1}ms",
            analyzed,
            report.units.len(),
            report.elapsed_us as f64 / 1000.0
        )
        .dimmed()
    )?;
    writeln!(out)?;
    Ok(())
}

fn write_result_summary<W: Write>(out: &mut W, report: &AnalysisReport) -> anyhow::Result<()> {
    let total = report.summary.total();
    if total == 0 {
        write!(out, "  {}", "✓ No findings".green())?;
    } else {
        write!(
            out,
            "  {}",
            format!("✗ {} finding{}", total, if total == 1 { "" } else { "s" }).red()
        )?;
        let parts: Vec<String> = Severity::ALL
            .iter()
            .filter(|s| report.summary.get(**s) > 0)
            .map(|s| format!("{} {}", report.summary.get(*s), s.as_str()))
            .collect();
        write!(out, "  ({})", parts.join(", "))?;
    }

    if !report.errors.is_empty() {
        write!(
            out,
            "  {}",
            format!("({} error(s) recorded)", report.errors.len()).yellow()
        )?;
    }
    writeln!(out)?;
    Ok(())
}

fn write_findings<W: Write>(out: &mut W, findings: &[&Finding]) -> anyhow::Result<()> {
    writeln!(out, "  {} ({}):", "Findings".bold(), findings.len())?;
    writeln!(out)?;

    for f in findings {
        write!(out, "    {} ", severity_tag(f.severity()))?;
        write!(out, "  {:<22}", f.detector_name().dimmed())?;
        write!(out, "{}", f.file_path().blue())?;
        writeln!(
            out,
            "{}",
            format!(":{}:{}", f.start_line(), f.start_column()).dimmed()
        )?;

        // Message and context on following lines, indented
        writeln!(out, "             {}", f.message())?;
        if let Some(snippet) = f.snippet() {
            let first_line = snippet.lines().next().unwrap_or("");
            writeln!(out, "             {} {}", ">".dimmed(), first_line.dimmed())?;
        }
        if let Some(fix) = f.recommendation() {
            writeln!(out, "             {} {}", "fix:".green(), fix)?;
        }
        writeln!(out)?;
    }
    Ok(())
}

fn severity_tag(severity: Severity) -> ColoredString {
    match severity {
        Severity::Critical => "CRIT ".red().bold(),
        Severity::High => "HIGH ".red(),
        Severity::Medium => "MED  ".yellow(),
        Severity::Low => "LOW  ".blue(),
        Severity::Informational => "INFO ".normal(),
    }
}

fn write_errors<W: Write>(out: &mut W, errors: &[ErrorEntry]) -> anyhow::Result<()> {
    writeln!(out, "  {} ({}):", "Errors".bold(), errors.len())?;
    writeln!(out)?;

    for e in errors {
        let tag = match e.kind {
            ErrorKind::Parse => "PARSE   ",
            ErrorKind::Detector => "DETECTOR",
            ErrorKind::Timeout => "TIMEOUT ",
            ErrorKind::Io => "IO      ",
            ErrorKind::Configuration => "CONFIG  ",
        };
        write!(out, "    {} ", tag.yellow())?;
        if let Some(path) = &e.path {
            write!(out, " {}", path.blue())?;
        }
        if let Some(detector) = &e.detector {
            write!(out, " {}", format!("[{}]", detector).dimmed())?;
        }
        writeln!(out)?;
        writeln!(out, "             {}", e.message)?;
    }
    writeln!(out)?;
    Ok(())
}
