//! Timing tables and run-to-run performance comparison.
//!
//! A timing table is a headerless two-column CSV of `model,seconds`, one
//! row per executed model in report order. Two tables from different
//! builds are compared row by row; the result is the per-model ratio and
//! the geometric mean of all ratios.

use std::path::Path;

use serde::Serialize;

use crate::error::{HarnessError, Result};
use crate::report::RunOutcome;

/// Write `model,seconds` rows for every executed outcome.
pub fn write_timings_csv(path: &Path, outcomes: &[RunOutcome]) -> Result<()> {
    let mut w = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)
        .map_err(|e| HarnessError::Report(e.to_string()))?;
    for outcome in outcomes.iter().filter(|o| !o.is_skipped()) {
        let secs = outcome.elapsed_secs.to_string();
        w.write_record([outcome.model.as_str(), secs.as_str()])
            .map_err(|e| HarnessError::Report(e.to_string()))?;
    }
    w.flush()?;
    Ok(())
}

/// Read a timing table.
pub fn read_timings_csv(path: &Path) -> Result<Vec<(String, f64)>> {
    let malformed = |line: usize, reason: String| HarnessError::MalformedTimings {
        path: path.to_path_buf(),
        line,
        reason,
    };

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| malformed(0, e.to_string()))?;

    let mut rows = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let line = index + 1;
        let record = record.map_err(|e| malformed(line, e.to_string()))?;
        if record.len() < 2 {
            return Err(malformed(line, format!("expected 2 fields, found {}", record.len())));
        }
        let secs: f64 = record[1]
            .parse()
            .map_err(|_| malformed(line, format!("bad time {:?}", &record[1])))?;
        rows.push((record[0].to_string(), secs));
    }
    Ok(rows)
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TimingRatio {
    pub model: String,
    /// `baseline / candidate`; above 1.0 means the candidate is faster.
    pub ratio: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TimingComparison {
    pub ratios: Vec<TimingRatio>,
    pub geometric_mean: f64,
}

/// Compare two timing tables that list the same models in the same order.
pub fn compare_timings(
    baseline: &[(String, f64)],
    candidate: &[(String, f64)],
) -> Result<TimingComparison> {
    if baseline.len() != candidate.len() {
        return Err(HarnessError::TimingMismatch(format!(
            "{} rows vs {} rows",
            baseline.len(),
            candidate.len()
        )));
    }

    let mut ratios = Vec::with_capacity(baseline.len());
    for ((name_a, time_a), (name_b, time_b)) in baseline.iter().zip(candidate) {
        if name_a != name_b {
            return Err(HarnessError::TimingMismatch(format!(
                "row {} is {} in one table and {} in the other",
                ratios.len() + 1,
                name_a,
                name_b
            )));
        }
        ratios.push(TimingRatio {
            model: name_a.clone(),
            ratio: time_a / time_b,
        });
    }

    let geometric_mean = if ratios.is_empty() {
        f64::NAN
    } else {
        let log_sum: f64 = ratios.iter().map(|r| r.ratio.ln()).sum();
        (log_sum / ratios.len() as f64).exp()
    };

    Ok(TimingComparison {
        ratios,
        geometric_mean,
    })
}

/// Render a comparison the way it is printed on the console.
pub fn render_comparison(comparison: &TimingComparison) -> String {
    let mut out = String::new();
    for r in &comparison.ratios {
        out.push_str(&format!("{} {:.2}\n", r.model, r.ratio));
    }
    out.push_str(&format!("{}\n", comparison.geometric_mean));
    out
}
