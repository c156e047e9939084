//! Harness configuration.
//!
//! Every knob the harness reads lives here as plain data so each component
//! can be built and tested from an explicit value. A TOML file may supply
//! any subset of fields; missing fields take the defaults below.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{HarnessError, Result};
use crate::judge::TolerancePolicy;

/// Models known to be numerically unstable or to ship broken data fixtures.
const KNOWN_BAD_MODELS: &[&str] = &[
    "examples/example-models/ARM/Ch.21/finite_populations.stan",
    "examples/example-models/ARM/Ch.21/multiple_comparison.stan",
    "examples/example-models/ARM/Ch.21/r_sqr.stan",
    "examples/example-models/ARM/Ch.23/electric_1a.stan",
    "examples/example-models/ARM/Ch.23/educational_subsidy.stan",
    "examples/example-models/bugs_examples/vol2/pines/pines-3.stan",
    "examples/example-models/bugs_examples/vol3/fire/fire.stan",
    "examples/example-models/ARM/Ch.10/ideo_two_pred.stan",
    "examples/example-models/ARM/Ch.16/radon.1.stan",
    "examples/example-models/ARM/Ch.16/radon.2.stan",
    "examples/example-models/ARM/Ch.16/radon.2a.stan",
    "examples/example-models/ARM/Ch.16/radon.2b.stan",
    "examples/example-models/ARM/Ch.16/radon.3.stan",
    "examples/example-models/ARM/Ch.16/radon.nopooling.stan",
    "examples/example-models/ARM/Ch.16/radon.pooling.stan",
    "examples/example-models/ARM/Ch.18/radon.1.stan",
    "examples/example-models/ARM/Ch.18/radon.2.stan",
    "examples/example-models/ARM/Ch.18/radon.nopooling.stan",
    "examples/example-models/ARM/Ch.18/radon.pooling.stan",
    "examples/example-models/ARM/Ch.19/item_response.stan",
    "examples/example-models/bugs_examples/vol1/dogs/dogs.stan",
    "examples/example-models/bugs_examples/vol1/rats/rats_stanified.stan",
    "examples/example-models/bugs_examples/vol2/pines/pines-4.stan",
];

/// Settings for model discovery and data pairing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LocatorConfig {
    /// File-name glob selecting model sources.
    pub model_glob: String,

    /// File-name glob selecting data files next to a model.
    pub data_glob: String,

    /// Regex a model's file name must match to be kept.
    pub name_pattern: String,

    /// Model identifiers that are never run.
    pub excluded: BTreeSet<String>,

    /// Reject similarity-paired data files scoring below this (0.0–1.0).
    pub min_similarity: Option<f64>,
}

impl Default for LocatorConfig {
    fn default() -> Self {
        Self {
            model_glob: "*.stan".to_string(),
            data_glob: "*.data.R".to_string(),
            name_pattern: r"^[A-Za-z_][^/\\]+$".to_string(),
            excluded: KNOWN_BAD_MODELS.iter().map(|s| s.to_string()).collect(),
            min_similarity: None,
        }
    }
}

/// Settings for the build phase.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BuildConfig {
    /// Build tool program.
    pub program: String,

    /// Prefix stripped from model identifiers before they become targets.
    pub source_root_prefix: Option<String>,

    /// Extension stripped from model identifiers (including the dot).
    pub model_extension: String,

    /// Maximum number of targets per build-tool invocation.
    pub batch_size: usize,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            program: "make".to_string(),
            source_root_prefix: None,
            model_extension: ".stan".to_string(),
            batch_size: if cfg!(windows) { 20 } else { 200 },
        }
    }
}

/// Upper bound for `run.parallelism`.
pub const MAX_PARALLELISM: usize = 1024;

/// Settings for the run phase.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RunConfig {
    /// Seed passed to every model executable.
    pub seed: u64,

    /// Executions per model; timing is averaged over them.
    pub runs: u32,

    /// Worker pool size, also forwarded to the build tool as `-j`.
    pub parallelism: usize,

    /// Directory holding gold records and per-model draw files.
    pub gold_dir: PathBuf,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            seed: 1234,
            runs: 1,
            parallelism: 4,
            gold_dir: PathBuf::from("tests/golds"),
        }
    }
}

/// Complete harness configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HarnessConfig {
    pub locator: LocatorConfig,
    pub build: BuildConfig,
    pub run: RunConfig,
    pub tolerance: TolerancePolicy,
}

impl HarnessConfig {
    /// Parse a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| HarnessError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a TOML file.
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Reject settings the harness cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.build.batch_size == 0 {
            return Err(HarnessError::InvalidConfig(
                "build.batch_size must be at least 1".to_string(),
            ));
        }
        if self.run.runs == 0 {
            return Err(HarnessError::InvalidConfig(
                "run.runs must be at least 1".to_string(),
            ));
        }
        if !(1..=MAX_PARALLELISM).contains(&self.run.parallelism) {
            return Err(HarnessError::InvalidConfig(format!(
                "run.parallelism must be within 1..={}, got {}",
                MAX_PARALLELISM, self.run.parallelism
            )));
        }
        if let Some(min) = self.locator.min_similarity {
            if !(0.0..=1.0).contains(&min) {
                return Err(HarnessError::InvalidConfig(format!(
                    "locator.min_similarity must be within 0.0..=1.0, got {}",
                    min
                )));
            }
        }
        regex::Regex::new(&self.locator.name_pattern).map_err(|e| {
            HarnessError::InvalidConfig(format!("locator.name_pattern: {}", e))
        })?;
        glob::Pattern::new(&self.locator.model_glob)
            .map_err(|e| HarnessError::InvalidConfig(format!("locator.model_glob: {}", e)))?;
        glob::Pattern::new(&self.locator.data_glob)
            .map_err(|e| HarnessError::InvalidConfig(format!("locator.data_glob: {}", e)))?;
        self.tolerance.validate()
    }
}
