//! Detectors, their registry, and the finding model.

mod classify;
mod encode_packed;
mod locked_ether;
mod registry;
mod syntax;
mod termination;
mod traits;
mod types;
mod unchecked_transfer;
mod unsafe_transfer;

pub use classify::{ArgClass, ArgumentClassifier, Binding, DefaultClassifier, Scope};
pub use encode_packed::UnsafeEncodePackedDetector;
pub use locked_ether::LockedEtherDetector;
pub use registry::{
    DetectorDescriptor, DetectorFactory, DetectorRegistry, DetectorSettings, Resolution,
};
pub use termination::UnsafeTerminationDetector;
pub use traits::Detector;
pub use types::{Finding, Severity};
pub use unchecked_transfer::UncheckedTransferDetector;
pub use unsafe_transfer::UnsafeTransferDetector;
