//! Gold baseline storage.
//!
//! One flat text file per model, one `<param> <mean> <stdev>` line per
//! parameter. Files are named after the model executable with path
//! separators flattened to `_`:
//!
//! ```text
//! <gold_dir>/examples_bernoulli_bernoulli.gold
//! ```
//!
//! Writes go through a temporary file in the same directory that is then
//! renamed over the record, so an interrupted write leaves the previous
//! baseline intact.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::{HarnessError, Result};
use crate::summary::Summary;

/// Directory of gold records and per-model scratch files.
#[derive(Debug, Clone)]
pub struct GoldStore {
    dir: PathBuf,
}

impl GoldStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Flattened file stem shared by the record and draws paths. Distinct
    /// executables can flatten to the same stem (`a/b_c`, `a_b/c`).
    pub fn stem(executable: &str) -> String {
        executable.replace(['/', '\\'], "_")
    }

    /// Path of the gold record for `executable`.
    pub fn record_path(&self, executable: &str) -> PathBuf {
        self.dir.join(format!("{}.gold", Self::stem(executable)))
    }

    /// Path the model's draws are written to during a run.
    pub fn draws_path(&self, executable: &str) -> PathBuf {
        self.dir.join(format!("{}.draws.csv", Self::stem(executable)))
    }

    /// Read the gold record for `executable`.
    pub fn read(&self, executable: &str) -> Result<Summary> {
        let path = self.record_path(executable);
        let text = fs::read_to_string(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                HarnessError::GoldNotFound(path.clone())
            } else {
                HarnessError::Io(e)
            }
        })?;
        parse_summary(&text, &path)
    }

    /// Create or replace the gold record for `executable`.
    pub fn write(&self, executable: &str, summary: &Summary) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let path = self.record_path(executable);

        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(format_summary(summary).as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path).map_err(|e| e.error)?;

        debug!(path = %path.display(), params = summary.len(), "Wrote gold record");
        Ok(path)
    }
}

/// Render a summary in gold-record format.
pub fn format_summary(summary: &Summary) -> String {
    let mut out = String::new();
    for (param, stats) in summary.iter() {
        out.push_str(&format!("{} {} {}\n", param, stats.mean, stats.stdev));
    }
    out
}

/// Parse gold-record text. `path` is only used in error messages.
pub fn parse_summary(text: &str, path: &Path) -> Result<Summary> {
    let malformed = |line: usize, reason: String| HarnessError::MalformedGold {
        path: path.to_path_buf(),
        line,
        reason,
    };

    let mut summary = Summary::new();
    for (index, line) in text.lines().enumerate() {
        let lineno = index + 1;
        if line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        let &[param, mean, stdev] = fields.as_slice() else {
            return Err(malformed(
                lineno,
                format!("expected 3 fields, found {}", fields.len()),
            ));
        };
        let mean: f64 = mean
            .parse()
            .map_err(|_| malformed(lineno, format!("bad mean {:?}", mean)))?;
        let stdev: f64 = stdev
            .parse()
            .map_err(|_| malformed(lineno, format!("bad stdev {:?}", stdev)))?;
        summary.insert(param, mean, stdev);
    }
    Ok(summary)
}
