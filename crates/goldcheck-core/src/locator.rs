//! Model discovery and data-file pairing.
//!
//! Walks the root directories for model sources, keeps those with a valid
//! file name that are not excluded, and pairs each with a data file from
//! its own directory. A model with no data file is still returned; callers
//! decide what to do with it.

use std::path::{Path, PathBuf};

use glob::Pattern;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::config::LocatorConfig;
use crate::error::{HarnessError, Result};
use crate::similarity::{LcsRatio, SimilarityStrategy};

/// A discovered model source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Model {
    /// Path-like identifier, `/`-separated, relative to how roots were given.
    pub id: String,
    pub path: PathBuf,
}

impl Model {
    pub fn from_path(path: &Path) -> Self {
        Self {
            id: path_id(path),
            path: path.to_path_buf(),
        }
    }

    /// Directory holding the model source.
    pub fn dir(&self) -> &Path {
        match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        }
    }
}

/// A model together with the data file it will be run against.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiscoveredModel {
    pub model: Model,
    pub data: Option<PathBuf>,
}

/// Finds models and their data files.
pub struct ModelLocator {
    config: LocatorConfig,
    name_re: Regex,
    model_glob: Pattern,
    data_glob: Pattern,
    similarity: Box<dyn SimilarityStrategy>,
}

impl ModelLocator {
    /// Locator using the LCS-ratio matcher.
    pub fn new(config: LocatorConfig) -> Result<Self> {
        Self::with_similarity(config, Box::new(LcsRatio))
    }

    pub fn with_similarity(
        config: LocatorConfig,
        similarity: Box<dyn SimilarityStrategy>,
    ) -> Result<Self> {
        let name_re = Regex::new(&config.name_pattern)
            .map_err(|e| HarnessError::InvalidConfig(format!("name pattern: {}", e)))?;
        let model_glob = Pattern::new(&config.model_glob)
            .map_err(|e| HarnessError::InvalidConfig(format!("model glob: {}", e)))?;
        let data_glob = Pattern::new(&config.data_glob)
            .map_err(|e| HarnessError::InvalidConfig(format!("data glob: {}", e)))?;
        Ok(Self {
            config,
            name_re,
            model_glob,
            data_glob,
            similarity,
        })
    }

    /// All valid, non-excluded models under `roots`, root order first and
    /// file-name order within a root.
    pub fn find_models(&self, roots: &[PathBuf]) -> Vec<Model> {
        let mut models = Vec::new();
        for root in roots {
            for path in matching_files(root, &self.model_glob, None) {
                let model = Model::from_path(&path);
                if !self.valid_name(&path) {
                    debug!(model = %model.id, "Skipping model with invalid name");
                    continue;
                }
                if self.config.excluded.contains(&model.id) {
                    debug!(model = %model.id, "Skipping excluded model");
                    continue;
                }
                models.push(model);
            }
        }
        models
    }

    fn valid_name(&self, path: &Path) -> bool {
        path.file_name()
            .and_then(|n| n.to_str())
            .map(|n| self.name_re.is_match(n))
            .unwrap_or(false)
    }

    /// Pick the data file for `model` from its directory.
    ///
    /// A lone candidate always wins. Among several, the one most similar to
    /// the model identifier wins; ties go to the first in file-name order.
    pub fn find_data(&self, model: &Model) -> Option<PathBuf> {
        let candidates = matching_files(model.dir(), &self.data_glob, Some(1));
        match candidates.len() {
            0 => None,
            1 => candidates.into_iter().next(),
            _ => self.closest(model, candidates),
        }
    }

    fn closest(&self, model: &Model, candidates: Vec<PathBuf>) -> Option<PathBuf> {
        let mut best: Option<(f64, PathBuf)> = None;
        for candidate in candidates {
            let score = self.similarity.score(&path_id(&candidate), &model.id);
            if best.as_ref().map_or(true, |(s, _)| score > *s) {
                best = Some((score, candidate));
            }
        }

        let (score, path) = best?;
        if let Some(min) = self.config.min_similarity {
            if score < min {
                warn!(
                    model = %model.id,
                    candidate = %path.display(),
                    score,
                    min,
                    "Best data file is below the similarity cutoff"
                );
                return None;
            }
        }
        debug!(model = %model.id, data = %path.display(), score, "Paired data file by similarity");
        Some(path)
    }

    /// Find models under `roots` and pair each with its data file.
    pub fn discover(&self, roots: &[PathBuf]) -> Vec<DiscoveredModel> {
        self.find_models(roots)
            .into_iter()
            .map(|model| {
                let data = self.find_data(&model);
                DiscoveredModel { model, data }
            })
            .collect()
    }
}

/// Files under `root` whose name matches `pattern`, sorted by name per
/// directory. Unreadable entries are skipped.
fn matching_files(root: &Path, pattern: &Pattern, max_depth: Option<usize>) -> Vec<PathBuf> {
    let mut walker = WalkDir::new(root).sort_by_file_name();
    if let Some(depth) = max_depth {
        walker = walker.max_depth(depth);
    }
    walker
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| e.file_name().to_str().is_some_and(|n| pattern.matches(n)))
        .map(|e| e.into_path())
        .collect()
}

fn path_id(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}
