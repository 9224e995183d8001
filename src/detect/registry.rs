//! Ordered catalogue of available detectors.

use std::fmt;
use std::sync::Arc;

use crate::error::AnalysisError;

use super::classify::{ArgumentClassifier, DefaultClassifier};
use super::{
    Detector, LockedEtherDetector, UncheckedTransferDetector, UnsafeEncodePackedDetector,
    UnsafeTerminationDetector, UnsafeTransferDetector,
};

/// Builds a fresh detector instance.
pub type DetectorFactory = Arc<dyn Fn() -> Box<dyn Detector> + Send + Sync>;

/// A registry entry. Holds no analysis state.
#[derive(Clone)]
pub struct DetectorDescriptor {
    name: &'static str,
    description: &'static str,
    factory: DetectorFactory,
}

impl DetectorDescriptor {
    pub fn new<F>(name: &'static str, description: &'static str, factory: F) -> Self
    where
        F: Fn() -> Box<dyn Detector> + Send + Sync + 'static,
    {
        Self {
            name,
            description,
            factory: Arc::new(factory),
        }
    }

    /// Descriptor for a detector with no settings.
    pub fn of<D: Detector + Default + 'static>() -> Self {
        let sample = D::default();
        Self::new(sample.name(), sample.description(), || Box::new(D::default()))
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn description(&self) -> &'static str {
        self.description
    }

    /// Instantiate the detector.
    pub fn instantiate(&self) -> Box<dyn Detector> {
        (self.factory)()
    }
}

impl fmt::Debug for DetectorDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DetectorDescriptor")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

/// Settings the built-in detectors are constructed with.
#[derive(Clone)]
pub struct DetectorSettings {
    /// Extra call names treated as fallible transfers.
    pub transfer_calls: Vec<String>,
    pub classifier: Arc<dyn ArgumentClassifier>,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            transfer_calls: Vec::new(),
            classifier: Arc::new(DefaultClassifier::new()),
        }
    }
}

/// Result of resolving requested detector names.
#[derive(Debug, Default)]
pub struct Resolution {
    /// Matching descriptors, in registry order.
    pub selected: Vec<DetectorDescriptor>,
    /// Requested names with no registered detector.
    pub unknown: Vec<String>,
}

/// Detector catalogue; registration order is run order.
#[derive(Debug, Default, Clone)]
pub struct DetectorRegistry {
    descriptors: Vec<DetectorDescriptor>,
}

impl DetectorRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in detector set.
    pub fn builtin(settings: &DetectorSettings) -> Self {
        let transfer_calls = settings.transfer_calls.clone();
        let classifier = Arc::clone(&settings.classifier);

        let descriptors = vec![
            DetectorDescriptor::new(
                UncheckedTransferDetector::NAME,
                UncheckedTransferDetector::DESCRIPTION,
                move || Box::new(UncheckedTransferDetector::with_extra_calls(&transfer_calls)),
            ),
            DetectorDescriptor::of::<UnsafeTerminationDetector>(),
            DetectorDescriptor::new(
                UnsafeEncodePackedDetector::NAME,
                UnsafeEncodePackedDetector::DESCRIPTION,
                move || Box::new(UnsafeEncodePackedDetector::new(Arc::clone(&classifier))),
            ),
            DetectorDescriptor::of::<UnsafeTransferDetector>(),
            DetectorDescriptor::of::<LockedEtherDetector>(),
        ];
        Self { descriptors }
    }

    /// Append a descriptor. Names must be unique.
    pub fn register(&mut self, descriptor: DetectorDescriptor) -> Result<(), AnalysisError> {
        if self.get(descriptor.name()).is_some() {
            return Err(AnalysisError::Configuration(format!(
                "detector '{}' is already registered",
                descriptor.name()
            )));
        }
        self.descriptors.push(descriptor);
        Ok(())
    }

    pub fn descriptors(&self) -> &[DetectorDescriptor] {
        &self.descriptors
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.descriptors.iter().map(|d| d.name()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&DetectorDescriptor> {
        self.descriptors.iter().find(|d| d.name() == name)
    }

    /// Select detectors by name, or all of them for `None`.
    ///
    /// Selection keeps registry order regardless of request order.
    pub fn resolve(&self, requested: Option<&[String]>) -> Resolution {
        let Some(requested) = requested else {
            return Resolution {
                selected: self.descriptors.clone(),
                unknown: Vec::new(),
            };
        };

        let selected = self
            .descriptors
            .iter()
            .filter(|d| requested.iter().any(|r| r == d.name()))
            .cloned()
            .collect();

        let mut unknown: Vec<String> = Vec::new();
        for name in requested {
            if self.get(name).is_none() && !unknown.contains(name) {
                unknown.push(name.clone());
            }
        }

        Resolution { selected, unknown }
    }
}
