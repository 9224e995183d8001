//! The detector contract.

use crate::analysis::SourceView;

use super::Finding;

/// A stateless rule for one vulnerability class.
///
/// `detect` takes `&self`, so nothing can carry over from one unit to the
/// next. Implementations only traverse the tree and text; they perform no
/// I/O and never look at other detectors' output.
///
/// Returning `Err` (or panicking) is contained by the orchestrator and
/// recorded as a detector-level error.
pub trait Detector: Send + Sync {
    /// Stable identifier used in reports and configuration (e.g., "unchecked_transfer").
    fn name(&self) -> &'static str;

    /// One-line description for listings.
    fn description(&self) -> &'static str;

    /// Inspect one parsed unit.
    fn detect(&self, source: &SourceView<'_>) -> anyhow::Result<Vec<Finding>>;
}
