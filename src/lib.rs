//! stylus-scan - static analysis for Stylus smart contracts.
//!
//! Stylus contracts are Rust compiled to WASM for an EVM-compatible chain.
//! stylus-scan parses each contract source once with tree-sitter and runs a
//! set of independent, stateless detectors over the tree: unchecked value
//! transfers, panicking code paths, collision-prone packed encodings,
//! unvalidated transfer recipients and value that can never leave.
//!
//! # Architecture
//!
//! - `parser`: tree-sitter syntax provider and parse sessions
//! - `detect`: the `Detector` trait, built-in detectors, and the registry
//! - `analysis`: source units, the orchestrator, and the report model
//! - `config`: YAML configuration
//! - `report`: output formatting (pretty, JSON)
//! - `cli`: command-line front end
//!
//! # Adding a Detector
//!
//! Implement `Detector` and register a `DetectorDescriptor` with the
//! `DetectorRegistry` before building the `Orchestrator`.

pub mod analysis;
pub mod cli;
pub mod config;
pub mod detect;
pub mod error;
pub mod parser;
pub mod report;

pub use analysis::{AnalysisOptions, AnalysisReport, Orchestrator, SourceInput};
pub use config::Config;
pub use detect::{Detector, DetectorDescriptor, DetectorRegistry, Finding, Severity};
pub use error::AnalysisError;
pub use parser::{RustSyntaxProvider, SyntaxProvider};
