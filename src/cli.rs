//! Command-line interface for stylus-scan.

use std::io;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use globset::GlobSet;
use walkdir::WalkDir;

use crate::analysis::{AnalysisReport, ErrorKind, Orchestrator};
use crate::config::Config;
use crate::detect::{DetectorRegistry, DetectorSettings, Severity};
use crate::parser::RustSyntaxProvider;
use crate::report;

/// Exit codes.
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILED: i32 = 1;
pub const EXIT_ERROR: i32 = 2;

/// Directories never descended into.
const SKIPPED_DIRS: &[&str] = &["target", "node_modules", "vendor"];

/// Static analyzer for Stylus smart contracts.
///
/// Parses each contract source file once and runs a set of detectors for
/// unchecked transfers, panicking code paths, collision-prone packed
/// encodings, unvalidated recipients and locked value.
#[derive(Parser)]
#[command(name = "stylus-scan")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Log progress to stderr (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Analyze contract sources
    #[command(visible_alias = "check")]
    Lint(LintArgs),
    /// List available detectors
    Detectors,
}

/// Arguments for the lint command.
#[derive(Parser)]
pub struct LintArgs {
    /// Path to analyze (file or directory)
    pub path: PathBuf,

    /// Path to config YAML file (default: auto-discover)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Output format: pretty or json
    #[arg(short, long, default_value = "pretty")]
    pub format: String,

    /// Comma-separated detector names to run (overrides config)
    #[arg(short, long, value_delimiter = ',')]
    pub detectors: Option<Vec<String>>,

    /// Lowest severity that fails the run (overrides config; default: low)
    #[arg(long)]
    pub fail_on: Option<String>,

    /// Analyze files one at a time
    #[arg(long)]
    pub sequential: bool,

    /// Run detectors on files with syntax errors
    #[arg(long)]
    pub tolerate_syntax_errors: bool,
}

/// Collect `.rs` files under `root`, sorted by path.
pub fn collect_files(root: &Path, exclusions: &GlobSet) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for entry in WalkDir::new(root)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            if e.depth() == 0 || !e.file_type().is_dir() {
                return true;
            }
            let name = e.file_name().to_string_lossy();
            // Skip hidden and build directories
            !name.starts_with('.') && !SKIPPED_DIRS.contains(&name.as_ref())
        })
    {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("rs") {
            continue;
        }
        let relative = path.strip_prefix(root).unwrap_or(path);
        if exclusions.is_match(relative) || exclusions.is_match(path) {
            tracing::debug!(path = %path.display(), "excluded by config");
            continue;
        }
        files.push(path.to_path_buf());
    }

    Ok(files)
}

/// Exit code for a finished run.
///
/// Findings at or above `fail_on` win over recorded errors.
pub fn exit_code(report: &AnalysisReport, fail_on: Severity) -> i32 {
    if report.summary.at_or_above(fail_on) > 0 {
        return EXIT_FAILED;
    }
    let has_errors = report
        .errors
        .iter()
        .any(|e| e.kind != ErrorKind::Configuration);
    if has_errors {
        EXIT_ERROR
    } else {
        EXIT_SUCCESS
    }
}

/// Run the lint command.
pub fn run_lint(args: &LintArgs) -> anyhow::Result<i32> {
    // Validate format
    if args.format != "pretty" && args.format != "json" {
        eprintln!(
            "Error: invalid format {:?}, must be 'pretty' or 'json'",
            args.format
        );
        return Ok(EXIT_ERROR);
    }

    // Check path exists
    let metadata = match std::fs::metadata(&args.path) {
        Ok(m) => m,
        Err(e) => {
            eprintln!("Error: cannot access path {:?}: {}", args.path, e);
            return Ok(EXIT_ERROR);
        }
    };
    let root = if metadata.is_dir() {
        args.path.clone()
    } else {
        args.path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    };

    let mut config = match Config::load(args.config.as_deref(), &root) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            return Ok(EXIT_ERROR);
        }
    };

    // Command-line flags override the config file
    if args.detectors.is_some() {
        config.detectors = args.detectors.clone();
    }
    if args.fail_on.is_some() {
        config.fail_on = args.fail_on.clone();
    }
    if args.sequential {
        config.parallel = false;
    }
    if args.tolerate_syntax_errors {
        config.tolerate_syntax_errors = true;
    }
    if let Err(e) = config.validate() {
        eprintln!("Error: {}", e);
        return Ok(EXIT_ERROR);
    }
    let fail_on = config.fail_on_severity()?.unwrap_or(Severity::Low);

    // Collect files to scan
    let files = if metadata.is_dir() {
        collect_files(&args.path, &config.exclusions()?)?
    } else {
        vec![args.path.clone()]
    };
    if files.is_empty() {
        eprintln!("Warning: no Rust sources to analyze");
        return Ok(EXIT_SUCCESS);
    }
    tracing::info!(files = files.len(), root = %root.display(), "collected sources");

    let registry = DetectorRegistry::builtin(&config.detector_settings());
    let provider = RustSyntaxProvider::new();
    let orchestrator = Orchestrator::new(&provider, &registry, config.analysis_options());
    let report = orchestrator.analyze_paths(&files)?;

    let path_str = args.path.to_string_lossy().to_string();
    let stdout = io::stdout();
    let mut out = stdout.lock();
    match args.format.as_str() {
        "json" => report::write_json(&mut out, &report)?,
        _ => report::write_pretty(&mut out, &path_str, &report)?,
    }

    Ok(exit_code(&report, fail_on))
}

/// Run the detectors command.
pub fn run_detectors() -> anyhow::Result<i32> {
    let registry = DetectorRegistry::builtin(&DetectorSettings::default());
    println!("Available detectors:");
    println!();
    for descriptor in registry.descriptors() {
        println!("  {:<22} {}", descriptor.name(), descriptor.description());
    }
    println!();
    Ok(EXIT_SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{ErrorEntry, SeverityCounts};
    use globset::{Glob, GlobSetBuilder};
    use std::fs;
    use tempfile::TempDir;

    fn report_with(summary: SeverityCounts, errors: Vec<ErrorEntry>) -> AnalysisReport {
        AnalysisReport {
            version: "0".to_string(),
            detectors: Vec::new(),
            units: Vec::new(),
            summary,
            errors,
            elapsed_us: 0,
        }
    }

    #[test]
    fn test_exit_code() {
        let clean = report_with(SeverityCounts::default(), Vec::new());
        assert_eq!(exit_code(&clean, Severity::Low), EXIT_SUCCESS);

        let mut medium = SeverityCounts::default();
        medium.add(Severity::Medium);
        let report = report_with(medium, Vec::new());
        assert_eq!(exit_code(&report, Severity::Medium), EXIT_FAILED);
        assert_eq!(exit_code(&report, Severity::High), EXIT_SUCCESS);

        let errored = report_with(
            SeverityCounts::default(),
            vec![ErrorEntry::io("a.rs", "denied")],
        );
        assert_eq!(exit_code(&errored, Severity::Low), EXIT_ERROR);

        let misconfigured = report_with(
            SeverityCounts::default(),
            vec![ErrorEntry::configuration("unknown detector 'x'")],
        );
        assert_eq!(exit_code(&misconfigured, Severity::Low), EXIT_SUCCESS);
    }

    #[test]
    fn test_collect_files() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        for dir in ["src", "src/tests", "target/debug", ".git"] {
            fs::create_dir_all(root.join(dir)).unwrap();
        }
        for file in [
            "src/lib.rs",
            "src/b.rs",
            "src/tests/helper.rs",
            "src/notes.md",
            "target/debug/gen.rs",
            ".git/hook.rs",
        ] {
            fs::write(root.join(file), "fn a() {}").unwrap();
        }

        let mut builder = GlobSetBuilder::new();
        builder.add(Glob::new("**/tests/**").unwrap());
        let exclusions = builder.build().unwrap();

        let files: Vec<_> = collect_files(root, &exclusions)
            .unwrap()
            .into_iter()
            .map(|p| p.strip_prefix(root).unwrap().to_string_lossy().replace('\\', "/"))
            .collect();
        assert_eq!(files, vec!["src/b.rs", "src/lib.rs"]);
    }
}
