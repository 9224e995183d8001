//! Project configuration for stylus-scan.
//!
//! Read from `stylus-scan.yaml` (or `.stylus-scan.yaml`) at the scan root,
//! or from an explicit `--config` path. Every field is optional.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};

use crate::analysis::AnalysisOptions;
use crate::detect::{DefaultClassifier, DetectorSettings, Severity};
use crate::error::{AnalysisError, Result};

/// File names tried, in order, when no config path is given.
pub const CONFIG_FILE_NAMES: &[&str] = &["stylus-scan.yaml", ".stylus-scan.yaml"];

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Detector subset to run (default: all registered detectors).
    #[serde(default)]
    pub detectors: Option<Vec<String>>,
    /// Glob patterns for paths to skip (e.g., "**/tests/**").
    #[serde(default)]
    pub exclude: Vec<String>,
    /// Analyze files in parallel (default: true).
    #[serde(default = "default_true")]
    pub parallel: bool,
    /// Run detectors on files with syntax errors (default: false).
    #[serde(default)]
    pub tolerate_syntax_errors: bool,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    /// Extra call names treated as fallible transfers.
    #[serde(default)]
    pub transfer_calls: Vec<String>,
    #[serde(default)]
    pub packed_encoding: PackedEncodingConfig,
    /// Lowest severity that makes the run fail (default: low).
    #[serde(default)]
    pub fail_on: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            detectors: None,
            exclude: Vec::new(),
            parallel: true,
            tolerate_syntax_errors: false,
            timeouts: TimeoutConfig::default(),
            transfer_calls: Vec::new(),
            packed_encoding: PackedEncodingConfig::default(),
            fail_on: None,
        }
    }
}

/// Wall-clock budgets in milliseconds. Absent means unbounded.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TimeoutConfig {
    #[serde(default)]
    pub unit_ms: Option<u64>,
    #[serde(default)]
    pub detector_ms: Option<u64>,
}

/// Extra type names for packed-encoding classification.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PackedEncodingConfig {
    #[serde(default)]
    pub variable_types: Vec<String>,
    #[serde(default)]
    pub fixed_types: Vec<String>,
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Parse and validate a config file.
    pub fn parse_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        Self::from_yaml(&content).map_err(|e| match e {
            AnalysisError::Configuration(msg) => {
                AnalysisError::Configuration(format!("{}: {}", path.display(), msg))
            }
            other => other,
        })
    }

    /// Parse and validate YAML text. Empty text is the default config.
    pub fn from_yaml(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Config = serde_yaml::from_str(content)
            .map_err(|e| AnalysisError::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// First config file found directly under `dir`.
    pub fn discover(dir: &Path) -> Option<PathBuf> {
        CONFIG_FILE_NAMES
            .iter()
            .map(|name| dir.join(name))
            .find(|candidate| candidate.is_file())
    }

    /// Load `explicit` if given, else a discovered file under `root`, else defaults.
    pub fn load(explicit: Option<&Path>, root: &Path) -> Result<Self> {
        match explicit.map(Path::to_path_buf).or_else(|| Self::discover(root)) {
            Some(path) => {
                tracing::debug!(path = %path.display(), "loading config");
                Self::parse_file(path)
            }
            None => Ok(Self::default()),
        }
    }

    /// Reject values that would make the run meaningless.
    pub fn validate(&self) -> Result<()> {
        if self.timeouts.unit_ms == Some(0) {
            return Err(AnalysisError::Configuration(
                "timeouts.unit_ms must be greater than zero".to_string(),
            ));
        }
        if self.timeouts.detector_ms == Some(0) {
            return Err(AnalysisError::Configuration(
                "timeouts.detector_ms must be greater than zero".to_string(),
            ));
        }
        if let Some(detectors) = &self.detectors {
            if detectors.is_empty() {
                return Err(AnalysisError::Configuration(
                    "detectors must name at least one detector when present".to_string(),
                ));
            }
        }
        self.fail_on_severity()?;
        self.exclusions()?;
        Ok(())
    }

    /// Compiled `exclude` patterns.
    pub fn exclusions(&self) -> Result<GlobSet> {
        let mut builder = GlobSetBuilder::new();
        for pattern in &self.exclude {
            let glob = Glob::new(pattern).map_err(|e| {
                AnalysisError::Configuration(format!(
                    "invalid exclude pattern {:?}: {}",
                    pattern, e
                ))
            })?;
            builder.add(glob);
        }
        builder
            .build()
            .map_err(|e| AnalysisError::Configuration(format!("invalid exclude patterns: {}", e)))
    }

    /// The `fail_on` threshold, if set.
    pub fn fail_on_severity(&self) -> Result<Option<Severity>> {
        self.fail_on
            .as_deref()
            .map(|s| {
                s.parse::<Severity>()
                    .map_err(|e| AnalysisError::Configuration(format!("fail_on: {}", e)))
            })
            .transpose()
    }

    pub fn unit_budget(&self) -> Option<Duration> {
        self.timeouts.unit_ms.map(Duration::from_millis)
    }

    pub fn detector_budget(&self) -> Option<Duration> {
        self.timeouts.detector_ms.map(Duration::from_millis)
    }

    /// Settings for the built-in detectors.
    pub fn detector_settings(&self) -> DetectorSettings {
        DetectorSettings {
            transfer_calls: self.transfer_calls.clone(),
            classifier: Arc::new(DefaultClassifier::with_types(
                self.packed_encoding.variable_types.clone(),
                self.packed_encoding.fixed_types.clone(),
            )),
        }
    }

    pub fn analysis_options(&self) -> AnalysisOptions {
        AnalysisOptions {
            detectors: self.detectors.clone(),
            parallel: self.parallel,
            tolerate_syntax_errors: self.tolerate_syntax_errors,
            unit_budget: self.unit_budget(),
            detector_budget: self.detector_budget(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_config() {
        let yaml = r#"
detectors: [unchecked_transfer, unsafe_termination]
exclude: ["**/tests/**"]
parallel: false
timeouts:
  unit_ms: 10000
  detector_ms: 2000
transfer_calls: [safe_transfer]
packed_encoding:
  variable_types: [MyBytes]
fail_on: high
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.detectors.as_ref().map(Vec::len), Some(2));
        assert!(!config.parallel);
        assert_eq!(config.unit_budget(), Some(Duration::from_secs(10)));
        assert_eq!(config.fail_on_severity().unwrap(), Some(Severity::High));
        assert!(config
            .exclusions()
            .unwrap()
            .is_match("contracts/tests/helper.rs"));

        let options = config.analysis_options();
        assert_eq!(options.detector_budget, Some(Duration::from_secs(2)));
        assert_eq!(config.detector_settings().transfer_calls, vec!["safe_transfer"]);
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_yaml("").unwrap();
        assert!(config.parallel);
        assert!(config.detectors.is_none());
        assert!(config.unit_budget().is_none());
        assert_eq!(config.fail_on_severity().unwrap(), None);
    }

    #[test]
    fn test_validation_errors() {
        for yaml in [
            "timeouts: { unit_ms: 0 }",
            "timeouts: { detector_ms: 0 }",
            "fail_on: catastrophic",
            "exclude: [\"a/{b\"]",
            "detectors: []",
        ] {
            let err = Config::from_yaml(yaml).unwrap_err();
            assert!(
                matches!(err, AnalysisError::Configuration(_)),
                "expected configuration error for {:?}",
                yaml
            );
        }
    }

    #[test]
    fn test_discover_and_load() {
        let temp = TempDir::new().unwrap();
        assert!(Config::discover(temp.path()).is_none());
        assert!(Config::load(None, temp.path()).unwrap().parallel);

        fs::write(temp.path().join(".stylus-scan.yaml"), "parallel: false\n").unwrap();
        let found = Config::discover(temp.path()).unwrap();
        assert!(found.ends_with(".stylus-scan.yaml"));
        assert!(!Config::load(None, temp.path()).unwrap().parallel);

        let explicit = temp.path().join("custom.yaml");
        fs::write(&explicit, "tolerate_syntax_errors: true\n").unwrap();
        let config = Config::load(Some(&explicit), temp.path()).unwrap();
        assert!(config.tolerate_syntax_errors);
        assert!(config.parallel);
    }

    #[test]
    fn test_missing_explicit_file() {
        let temp = TempDir::new().unwrap();
        let err = Config::load(Some(&temp.path().join("nope.yaml")), temp.path()).unwrap_err();
        assert!(matches!(err, AnalysisError::Io(_)));
    }
}
