//! Draw-table summarization.
//!
//! A model run writes one CSV row per draw and one column per parameter.
//! Lines starting with `#` carry sampler comments and may appear before the
//! header or between data rows. Each column is reduced to its mean and
//! sample standard deviation in a single pass (Welford's update), so the
//! table never has to be held in memory.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{DrawTableError, HarnessError, Result};

/// Columns ending in this suffix are sampler bookkeeping, not parameters.
pub const DIAGNOSTIC_SUFFIX: &str = "__";

/// Mean and sample standard deviation of one parameter.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ParamStats {
    pub mean: f64,
    /// Sample stdev over N-1 degrees of freedom; `0.0` when N < 2.
    pub stdev: f64,
}

/// Per-parameter statistics of one run, ordered by parameter name.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Summary {
    params: BTreeMap<String, ParamStats>,
}

impl Summary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, param: impl Into<String>, mean: f64, stdev: f64) {
        self.params.insert(param.into(), ParamStats { mean, stdev });
    }

    pub fn get(&self, param: &str) -> Option<&ParamStats> {
        self.params.get(param)
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Iterate parameters in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamStats)> {
        self.params.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl FromIterator<(String, f64, f64)> for Summary {
    fn from_iter<I: IntoIterator<Item = (String, f64, f64)>>(iter: I) -> Self {
        let mut summary = Summary::new();
        for (param, mean, stdev) in iter {
            summary.insert(param, mean, stdev);
        }
        summary
    }
}

/// Running mean / sum-of-squares accumulator for one column.
#[derive(Debug, Default, Clone, Copy)]
struct Accumulator {
    count: u64,
    mean: f64,
    m2: f64,
}

impl Accumulator {
    fn push(&mut self, x: f64) {
        self.count += 1;
        let delta = x - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (x - self.mean);
    }

    fn finish(self) -> ParamStats {
        let stdev = if self.count < 2 {
            0.0
        } else {
            (self.m2 / (self.count - 1) as f64).max(0.0).sqrt()
        };
        ParamStats {
            mean: self.mean,
            stdev,
        }
    }
}

/// Summarize a draw table read from `reader`.
///
/// An empty table (header only) yields a summary with every parameter at
/// mean `0.0`, stdev `0.0`.
pub fn summarize_reader<R: Read>(reader: R) -> std::result::Result<Summary, DrawTableError> {
    let mut csv = csv::ReaderBuilder::new()
        .comment(Some(b'#'))
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);
    summarize_csv(&mut csv)
}

/// Summarize the draw table at `path`.
pub fn summarize_file(path: &Path) -> Result<Summary> {
    let draws = |source: DrawTableError| HarnessError::Draws {
        path: path.to_path_buf(),
        source,
    };
    let mut csv = csv::ReaderBuilder::new()
        .comment(Some(b'#'))
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| draws(e.into()))?;
    summarize_csv(&mut csv).map_err(draws)
}

fn summarize_csv<R: Read>(
    csv: &mut csv::Reader<R>,
) -> std::result::Result<Summary, DrawTableError> {
    let headers = csv.headers()?.clone();
    if headers.is_empty() || headers.iter().all(str::is_empty) {
        return Err(DrawTableError::MissingHeader);
    }

    let kept: Vec<(usize, &str)> = headers
        .iter()
        .enumerate()
        .filter(|(_, name)| !name.ends_with(DIAGNOSTIC_SUFFIX))
        .collect();
    let mut accumulators = vec![Accumulator::default(); kept.len()];

    let mut record = csv::StringRecord::new();
    while csv.read_record(&mut record)? {
        let row = record
            .position()
            .map(|p| p.line() as usize)
            .unwrap_or_default();
        if record.len() != headers.len() {
            return Err(DrawTableError::RaggedRow {
                row,
                expected: headers.len(),
                found: record.len(),
            });
        }
        for ((index, name), acc) in kept.iter().zip(accumulators.iter_mut()) {
            let cell = &record[*index];
            let value: f64 = cell.parse().map_err(|_| DrawTableError::NotANumber {
                row,
                column: name.to_string(),
                value: cell.to_string(),
            })?;
            acc.push(value);
        }
    }

    Ok(kept
        .into_iter()
        .zip(accumulators)
        .map(|((_, name), acc)| {
            let stats = acc.finish();
            (name.to_string(), stats.mean, stats.stdev)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-12
    }

    #[test]
    fn test_mean_and_sample_stdev() {
        let table = "theta,sigma\n1,10\n2,10\n3,10\n4,10\n";
        let summary = summarize_reader(table.as_bytes()).expect("summarize");

        let theta = summary.get("theta").expect("theta");
        assert!(approx(theta.mean, 2.5));
        // Sample variance of 1..4 is 5/3.
        assert!(approx(theta.stdev, (5.0f64 / 3.0).sqrt()));

        let sigma = summary.get("sigma").expect("sigma");
        assert!(approx(sigma.mean, 10.0));
        assert_eq!(sigma.stdev, 0.0);
    }

    #[test]
    fn test_comments_skipped_anywhere() {
        let table = "# model = bernoulli\n# seed = 1234\nlp__,theta\n\
                     # Adaptation terminated\n-7.1,0.2\n-7.3,0.4\n# Elapsed Time: 0.01s\n";
        let summary = summarize_reader(table.as_bytes()).expect("summarize");
        assert_eq!(summary.len(), 1);
        assert!(approx(summary.get("theta").expect("theta").mean, 0.3));
    }

    #[test]
    fn test_diagnostic_columns_dropped() {
        let table = "lp__,accept_stat__,stepsize__,mu,tau\n1,0.9,0.1,0.5,1.5\n2,0.8,0.1,0.7,1.1\n";
        let summary = summarize_reader(table.as_bytes()).expect("summarize");
        let names: Vec<&str> = summary.iter().map(|(k, _)| k).collect();
        assert_eq!(names, vec!["mu", "tau"]);
    }

    #[test]
    fn test_single_row_has_zero_stdev() {
        let summary = summarize_reader("a,b\n3.5,-1\n".as_bytes()).expect("summarize");
        let a = summary.get("a").expect("a");
        assert_eq!(a.mean, 3.5);
        assert_eq!(a.stdev, 0.0);
    }

    #[test]
    fn test_header_only_table() {
        let summary = summarize_reader("a,b\n".as_bytes()).expect("summarize");
        assert_eq!(summary.get("b").map(|s| s.stdev), Some(0.0));
    }

    #[test]
    fn test_missing_header_is_error() {
        let err = summarize_reader("# only comments\n".as_bytes()).unwrap_err();
        assert!(matches!(err, DrawTableError::MissingHeader));
    }

    #[test]
    fn test_ragged_row_is_error() {
        let err = summarize_reader("a,b\n1,2\n3\n".as_bytes()).unwrap_err();
        assert!(matches!(
            err,
            DrawTableError::RaggedRow {
                expected: 2,
                found: 1,
                ..
            }
        ));
    }

    #[test]
    fn test_non_numeric_cell_is_error() {
        let err = summarize_reader("a,b\n1,oops\n".as_bytes()).unwrap_err();
        match err {
            DrawTableError::NotANumber { column, value, .. } => {
                assert_eq!(column, "b");
                assert_eq!(value, "oops");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_summarize_file_missing_path() {
        let dir = tempfile::tempdir().unwrap();
        let err = summarize_file(&dir.path().join("nope.csv")).unwrap_err();
        assert!(matches!(err, HarnessError::Draws { .. }));
    }

    #[test]
    fn test_summary_from_iter_orders_by_name() {
        let summary: Summary = vec![
            ("zeta".to_string(), 1.0, 0.1),
            ("alpha".to_string(), 2.0, 0.2),
        ]
        .into_iter()
        .collect();
        let names: Vec<&str> = summary.iter().map(|(k, _)| k).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }
}
