//! Runs the selected detectors over a batch of source units.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use std::time::{Duration, Instant};

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::detect::{DetectorDescriptor, DetectorRegistry, Finding};
use crate::error::{AnalysisError, Result};
use crate::parser::{ParseDiagnostic, ParseSession, SyntaxProvider};

use super::report::{
    AnalysisReport, DetectorTiming, ErrorEntry, SeverityCounts, UnitResult, UnitStatus,
};
use super::source::{SourceInput, SourceUnit, UnitState};

/// Run options.
#[derive(Debug, Clone)]
pub struct AnalysisOptions {
    /// Detector names to run; `None` runs the whole registry.
    pub detectors: Option<Vec<String>>,
    /// Analyze units on the rayon pool.
    pub parallel: bool,
    /// Run detectors on partial trees instead of excluding the unit.
    pub tolerate_syntax_errors: bool,
    /// Per-unit wall-clock budget: the parse timeout of every session the run
    /// opens, and checked again between detectors.
    pub unit_budget: Option<Duration>,
    /// Per-detector wall-clock budget; overrunning discards that detector's findings.
    pub detector_budget: Option<Duration>,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            detectors: None,
            parallel: true,
            tolerate_syntax_errors: false,
            unit_budget: None,
            detector_budget: None,
        }
    }
}

/// What one unit contributes to the report.
struct UnitOutcome {
    result: UnitResult,
    errors: Vec<ErrorEntry>,
}

type SessionSlot = anyhow::Result<Box<dyn ParseSession>>;

/// Parses each unit once and runs every selected detector against it.
pub struct Orchestrator<'a> {
    provider: &'a dyn SyntaxProvider,
    registry: &'a DetectorRegistry,
    options: AnalysisOptions,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        provider: &'a dyn SyntaxProvider,
        registry: &'a DetectorRegistry,
        options: AnalysisOptions,
    ) -> Self {
        Self {
            provider,
            registry,
            options,
        }
    }

    /// Load `paths` from disk and analyze them. Unreadable paths are
    /// reported, not returned as errors.
    pub fn analyze_paths<P: AsRef<Path>>(&self, paths: &[P]) -> Result<AnalysisReport> {
        let inputs = paths.iter().map(SourceInput::load).collect();
        self.analyze(inputs)
    }

    /// Analyze a batch. Units appear in the report in input order.
    ///
    /// Fails only when no detector can run or the parser cannot start;
    /// everything else is recorded in the report.
    pub fn analyze(&self, inputs: Vec<SourceInput>) -> Result<AnalysisReport> {
        let started = Instant::now();

        let resolution = self.registry.resolve(self.options.detectors.as_deref());
        let mut errors: Vec<ErrorEntry> = resolution
            .unknown
            .iter()
            .map(|name| {
                warn!(detector = %name, "unknown detector requested");
                ErrorEntry::configuration(format!("unknown detector '{}'", name))
            })
            .collect();

        let selected = resolution.selected;
        if selected.is_empty() {
            let requested = match &self.options.detectors {
                Some(names) => names.join(", "),
                None => "all".to_string(),
            };
            return Err(AnalysisError::NoDetectors { requested });
        }

        // Open one session up front so a broken grammar fails the run, not every unit.
        let first_session = self.open_session().map_err(AnalysisError::Parser)?;

        let detector_names: Vec<String> = selected.iter().map(|d| d.name().to_string()).collect();
        debug!(
            units = inputs.len(),
            detectors = ?detector_names,
            parallel = self.options.parallel,
            "starting analysis"
        );

        let outcomes: Vec<UnitOutcome> = if self.options.parallel {
            drop(first_session);
            inputs
                .into_par_iter()
                .map_init(
                    || self.open_session(),
                    |session, input| self.run_input(session, input, &selected),
                )
                .collect()
        } else {
            let mut session: SessionSlot = Ok(first_session);
            inputs
                .into_iter()
                .map(|input| self.run_input(&mut session, input, &selected))
                .collect()
        };

        let mut units = Vec::with_capacity(outcomes.len());
        let mut summary = SeverityCounts::default();
        for outcome in outcomes {
            for finding in &outcome.result.findings {
                summary.add(finding.severity());
            }
            errors.extend(outcome.errors);
            units.push(outcome.result);
        }

        let report = AnalysisReport {
            version: env!("CARGO_PKG_VERSION").to_string(),
            detectors: detector_names,
            units,
            summary,
            errors,
            elapsed_us: micros(started.elapsed()),
        };

        info!(
            units = report.units.len(),
            findings = report.finding_count(),
            errors = report.errors.len(),
            elapsed_us = report.elapsed_us,
            "analysis complete"
        );
        Ok(report)
    }

    /// A session whose parses are bounded by the unit budget.
    fn open_session(&self) -> SessionSlot {
        let mut session = self.provider.new_session()?;
        session.set_timeout(self.options.unit_budget);
        Ok(session)
    }

    fn run_input(
        &self,
        session: &mut SessionSlot,
        input: SourceInput,
        selected: &[DetectorDescriptor],
    ) -> UnitOutcome {
        match input {
            SourceInput::Unreadable { path, error } => {
                warn!(path = %path, error = %error, "unreadable source");
                UnitOutcome {
                    errors: vec![ErrorEntry::io(&path, error)],
                    result: UnitResult {
                        path,
                        status: UnitStatus::Unreadable,
                        findings: Vec::new(),
                        parse_error: None,
                        elapsed_us: 0,
                        detector_timings: Vec::new(),
                    },
                }
            }
            SourceInput::Text { path, text } => {
                let mut unit = SourceUnit::new(path, text);
                self.run_unit(session, &mut unit, selected)
            }
        }
    }

    fn run_unit(
        &self,
        session: &mut SessionSlot,
        unit: &mut SourceUnit,
        selected: &[DetectorDescriptor],
    ) -> UnitOutcome {
        let started = Instant::now();
        let path = unit.path().to_string();
        let mut errors = Vec::new();

        let state = match session {
            Ok(session) => unit.parse_with(&mut **session, self.options.tolerate_syntax_errors),
            Err(e) => {
                let diagnostic =
                    ParseDiagnostic::no_tree(&format!("parser session unavailable: {:#}", e));
                errors.push(ErrorEntry::parse(&path, &diagnostic));
                return UnitOutcome {
                    errors,
                    result: UnitResult {
                        path,
                        status: UnitStatus::ParseFailed,
                        findings: Vec::new(),
                        parse_error: Some(diagnostic),
                        elapsed_us: micros(started.elapsed()),
                        detector_timings: Vec::new(),
                    },
                };
            }
        };
        debug!(path = %path, state = %state, "parsed unit");

        if let Some(diagnostic) = unit.parse_error() {
            if diagnostic.timed_out {
                warn!(path = %path, "parse timed out");
                errors.push(ErrorEntry::timeout(&path, None, diagnostic.to_string()));
            } else {
                errors.push(ErrorEntry::parse(&path, diagnostic));
            }
        }

        let view = match (state, unit.view()) {
            (UnitState::Parsed, Some(view)) => view,
            _ => {
                warn!(path = %path, "excluding unit after parse failure");
                return UnitOutcome {
                    errors,
                    result: UnitResult {
                        path,
                        status: UnitStatus::ParseFailed,
                        findings: Vec::new(),
                        parse_error: unit.parse_error().cloned(),
                        elapsed_us: micros(started.elapsed()),
                        detector_timings: Vec::new(),
                    },
                };
            }
        };

        let mut findings: Vec<Finding> = Vec::new();
        let mut timings = Vec::with_capacity(selected.len());

        for (index, descriptor) in selected.iter().enumerate() {
            if let Some(budget) = self.options.unit_budget {
                if started.elapsed() > budget {
                    let skipped: Vec<&str> = selected[index..].iter().map(|d| d.name()).collect();
                    warn!(path = %path, skipped = ?skipped, "unit budget exhausted");
                    errors.push(ErrorEntry::timeout(
                        &path,
                        None,
                        format!(
                            "unit budget of {}ms exhausted; skipped {}",
                            budget.as_millis(),
                            skipped.join(", ")
                        ),
                    ));
                    break;
                }
            }

            let name = descriptor.name();
            let detector = descriptor.instantiate();
            let detector_started = Instant::now();
            let outcome = catch_unwind(AssertUnwindSafe(|| detector.detect(&view)));
            let elapsed = detector_started.elapsed();
            timings.push(DetectorTiming {
                detector: name.to_string(),
                elapsed_us: micros(elapsed),
            });

            let mut produced = match outcome {
                Ok(Ok(produced)) => produced,
                Ok(Err(e)) => {
                    warn!(path = %path, detector = name, error = %e, "detector failed");
                    errors.push(ErrorEntry::detector(&path, name, format!("{:#}", e)));
                    continue;
                }
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    warn!(path = %path, detector = name, panic = %message, "detector panicked");
                    errors.push(ErrorEntry::detector(
                        &path,
                        name,
                        format!("detector panicked: {}", message),
                    ));
                    continue;
                }
            };

            if let Some(budget) = self.options.detector_budget {
                if elapsed > budget {
                    warn!(
                        path = %path,
                        detector = name,
                        elapsed_us = micros(elapsed),
                        "detector over budget"
                    );
                    errors.push(ErrorEntry::timeout(
                        &path,
                        Some(name),
                        format!(
                            "detector exceeded its {}ms budget; {} finding(s) discarded",
                            budget.as_millis(),
                            produced.len()
                        ),
                    ));
                    continue;
                }
            }

            produced.sort_by(|a, b| {
                let (ra, rb) = (a.byte_range(), b.byte_range());
                (ra.start, ra.end)
                    .cmp(&(rb.start, rb.end))
                    .then_with(|| a.message().cmp(b.message()))
            });
            debug!(
                path = %path,
                detector = name,
                findings = produced.len(),
                elapsed_us = micros(elapsed),
                "detector finished"
            );
            findings.extend(produced);
        }

        unit.advance(UnitState::DetectorsRun);
        debug!(path = %path, state = %unit.state(), findings = findings.len(), "unit done");

        let result = UnitResult {
            path,
            status: UnitStatus::Analyzed,
            findings,
            parse_error: unit.parse_error().cloned(),
            elapsed_us: micros(started.elapsed()),
            detector_timings: timings,
        };
        unit.advance(UnitState::Aggregated);

        UnitOutcome { result, errors }
    }
}

fn micros(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{ErrorKind, SourceView};
    use crate::detect::{
        Detector, DetectorDescriptor, DetectorSettings, Severity, UnsafeTerminationDetector,
    };
    use crate::parser::RustSyntaxProvider;

    #[derive(Default)]
    struct Exploding;

    impl Detector for Exploding {
        fn name(&self) -> &'static str {
            "exploding"
        }

        fn description(&self) -> &'static str {
            "Panics on every unit"
        }

        fn detect(&self, _source: &SourceView<'_>) -> anyhow::Result<Vec<Finding>> {
            panic!("boom");
        }
    }

    #[derive(Default)]
    struct Failing;

    impl Detector for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn description(&self) -> &'static str {
            "Returns an error on every unit"
        }

        fn detect(&self, _source: &SourceView<'_>) -> anyhow::Result<Vec<Finding>> {
            anyhow::bail!("cannot inspect")
        }
    }

    /// Emits findings out of location order.
    #[derive(Default)]
    struct Unordered;

    impl Detector for Unordered {
        fn name(&self) -> &'static str {
            "unordered"
        }

        fn description(&self) -> &'static str {
            "Emits findings in reverse order"
        }

        fn detect(&self, source: &SourceView<'_>) -> anyhow::Result<Vec<Finding>> {
            let root = source.root();
            let first = root.named_child(0).unwrap();
            let second = root.named_child(1).unwrap();
            Ok(vec![
                Finding::at_node("unordered", Severity::Low, "z", source, second),
                Finding::at_node("unordered", Severity::Low, "b", source, first),
                Finding::at_node("unordered", Severity::Low, "a", source, first),
            ])
        }
    }

    /// Opens tree-sitter sessions that ignore parse timeouts, so only the
    /// between-detector budget check applies.
    struct UnboundedProvider;

    struct UnboundedSession(crate::parser::TreeSitterSession);

    impl ParseSession for UnboundedSession {
        fn parse(&mut self, text: &str) -> crate::parser::ParseOutcome {
            self.0.parse(text)
        }
    }

    impl SyntaxProvider for UnboundedProvider {
        fn language(&self) -> &str {
            "rust"
        }

        fn new_session(&self) -> anyhow::Result<Box<dyn ParseSession>> {
            Ok(Box::new(UnboundedSession(RustSyntaxProvider::new().open()?)))
        }
    }

    fn registry_with(extra: Vec<DetectorDescriptor>) -> DetectorRegistry {
        let mut registry = DetectorRegistry::builtin(&DetectorSettings::default());
        for descriptor in extra {
            registry.register(descriptor).unwrap();
        }
        registry
    }

    fn sequential() -> AnalysisOptions {
        AnalysisOptions {
            parallel: false,
            ..AnalysisOptions::default()
        }
    }

    #[test]
    fn test_detector_failures_are_contained() {
        let registry = registry_with(vec![
            DetectorDescriptor::of::<Exploding>(),
            DetectorDescriptor::of::<Failing>(),
        ]);
        let provider = RustSyntaxProvider::new();
        let orchestrator = Orchestrator::new(&provider, &registry, sequential());

        let report = orchestrator
            .analyze(vec![SourceInput::new("a.rs", "fn f() { x.unwrap(); }")])
            .unwrap();

        assert_eq!(report.units[0].status, UnitStatus::Analyzed);
        assert_eq!(report.units[0].findings.len(), 1);
        assert_eq!(report.units[0].detector_timings.len(), 7);
        let failed: Vec<_> = report
            .errors
            .iter()
            .filter_map(|e| e.detector.as_deref())
            .collect();
        assert_eq!(failed, vec!["exploding", "failing"]);
        assert!(report.errors[0].message.contains("boom"));
    }

    #[test]
    fn test_findings_sorted_per_detector() {
        let registry = {
            let mut r = DetectorRegistry::new();
            r.register(DetectorDescriptor::of::<Unordered>()).unwrap();
            r
        };
        let provider = RustSyntaxProvider::new();
        let orchestrator = Orchestrator::new(&provider, &registry, sequential());
        let report = orchestrator
            .analyze(vec![SourceInput::new("a.rs", "fn a() {}\nfn b() {}\n")])
            .unwrap();
        let messages: Vec<_> = report.units[0]
            .findings
            .iter()
            .map(|f| f.message())
            .collect();
        assert_eq!(messages, vec!["a", "b", "z"]);
    }

    #[test]
    fn test_unknown_detectors() {
        let registry = registry_with(Vec::new());
        let provider = RustSyntaxProvider::new();

        let options = AnalysisOptions {
            detectors: Some(vec!["unsafe_termination".into(), "bogus".into()]),
            ..sequential()
        };
        let report = Orchestrator::new(&provider, &registry, options)
            .analyze(vec![SourceInput::new("a.rs", "fn f() {}")])
            .unwrap();
        assert_eq!(report.detectors, vec!["unsafe_termination"]);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].kind, ErrorKind::Configuration);

        let options = AnalysisOptions {
            detectors: Some(vec!["bogus".into()]),
            ..sequential()
        };
        let err = Orchestrator::new(&provider, &registry, options)
            .analyze(Vec::new())
            .unwrap_err();
        assert!(matches!(err, AnalysisError::NoDetectors { .. }));
    }

    #[test]
    fn test_detector_budget_discards_findings() {
        let mut registry = DetectorRegistry::new();
        registry
            .register(DetectorDescriptor::of::<UnsafeTerminationDetector>())
            .unwrap();
        let provider = RustSyntaxProvider::new();
        let options = AnalysisOptions {
            detector_budget: Some(Duration::ZERO),
            ..sequential()
        };
        let report = Orchestrator::new(&provider, &registry, options)
            .analyze(vec![SourceInput::new("a.rs", "fn f() { x.unwrap(); }")])
            .unwrap();
        assert_eq!(report.finding_count(), 0);
        assert_eq!(report.errors[0].kind, ErrorKind::Timeout);
        assert_eq!(report.errors[0].detector.as_deref(), Some("unsafe_termination"));
    }

    #[test]
    fn test_unit_budget_skips_remaining_detectors() {
        let registry = registry_with(Vec::new());
        let options = AnalysisOptions {
            unit_budget: Some(Duration::ZERO),
            ..sequential()
        };
        let report = Orchestrator::new(&UnboundedProvider, &registry, options)
            .analyze(vec![SourceInput::new("a.rs", "fn f() { x.unwrap(); }")])
            .unwrap();

        let unit = &report.units[0];
        assert_eq!(unit.status, UnitStatus::Analyzed);
        assert!(unit.findings.is_empty());
        assert!(unit.detector_timings.is_empty());
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].kind, ErrorKind::Timeout);
        assert_eq!(report.errors[0].detector, None);
        assert!(report.errors[0].message.contains("skipped unchecked_transfer"));
    }

    #[test]
    fn test_parse_timeout_is_a_timeout_entry() {
        let registry = registry_with(Vec::new());
        let provider = RustSyntaxProvider::new();
        let options = AnalysisOptions {
            unit_budget: Some(Duration::from_micros(1)),
            ..sequential()
        };
        let text = "fn f() { let x = 1; }\n".repeat(50_000);
        let report = Orchestrator::new(&provider, &registry, options)
            .analyze(vec![SourceInput::new("big.rs", text)])
            .unwrap();

        let unit = &report.units[0];
        assert_eq!(unit.status, UnitStatus::ParseFailed);
        assert!(unit.parse_error.as_ref().is_some_and(|d| d.timed_out));
        assert_eq!(report.errors_of(ErrorKind::Timeout).count(), 1);
        assert_eq!(report.errors_of(ErrorKind::Parse).count(), 0);
        assert_eq!(report.errors[0].path.as_deref(), Some("big.rs"));
    }

    #[test]
    fn test_tolerated_partial_tree() {
        let registry = registry_with(Vec::new());
        let provider = RustSyntaxProvider::new();
        let text = "fn ok() { x.unwrap(); }\nfn broken( {";

        let strict = Orchestrator::new(&provider, &registry, sequential())
            .analyze(vec![SourceInput::new("a.rs", text)])
            .unwrap();
        assert_eq!(strict.units[0].status, UnitStatus::ParseFailed);
        assert_eq!(strict.finding_count(), 0);

        let options = AnalysisOptions {
            tolerate_syntax_errors: true,
            ..sequential()
        };
        let tolerant = Orchestrator::new(&provider, &registry, options)
            .analyze(vec![SourceInput::new("a.rs", text)])
            .unwrap();
        assert_eq!(tolerant.units[0].status, UnitStatus::Analyzed);
        assert!(tolerant.units[0].parse_error.is_some());
        assert_eq!(tolerant.errors_of(ErrorKind::Parse).count(), 1);
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("static");
        assert_eq!(panic_message(payload.as_ref()), "static");
        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(payload.as_ref()), "owned");
    }
}
