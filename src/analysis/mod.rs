//! Analysis core: source units, the orchestrator and the report model.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌───────────────┐
//! │ SourceInput  │────▶│ SourceUnit   │────▶│ SourceView    │
//! │ (path, text) │     │ (parse once) │     │ (tree + text) │
//! └──────────────┘     └──────────────┘     └───────────────┘
//!                                                   │
//!                                                   ▼
//!                      ┌──────────────┐     ┌───────────────┐
//!                      │AnalysisReport│◀────│ Detectors     │
//!                      │ (aggregated) │     │ (registry)    │
//!                      └──────────────┘     └───────────────┘
//! ```
//!
//! The `Orchestrator` drives the flow: one parse per unit, every selected
//! detector against the same tree, failures recorded instead of raised.

mod orchestrator;
mod report;
mod source;

pub use orchestrator::{AnalysisOptions, Orchestrator};
pub use report::{
    AnalysisReport, DetectorTiming, ErrorEntry, ErrorKind, SeverityCounts, UnitResult, UnitStatus,
};
pub use source::{SourceInput, SourceUnit, SourceView, UnitState};
