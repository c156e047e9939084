//! Tolerance judge.
//!
//! Compares a fresh [`Summary`] with a gold [`Summary`] and produces a
//! [`Verdict`]: the parameters whose mean drifted beyond tolerance, plus the
//! gold parameters the fresh run no longer reports at all.
//!
//! Gold parameters whose recorded stdev is at or below
//! [`TolerancePolicy::epsilon`] are exempt from the mean check in every
//! mode. A quantity with no historical variance has nothing to be judged
//! relative to.

use serde::{Deserialize, Serialize};

use crate::error::{HarnessError, Result};
use crate::summary::Summary;

/// Constants used by the comparison modes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TolerancePolicy {
    /// Gold stdev at or below this skips the parameter.
    pub epsilon: f64,

    /// Loose mode: absolute error must exceed this to count.
    pub absolute_floor: f64,

    /// Loose mode: error / gold stdev must exceed this to count.
    pub ratio_threshold: f64,
}

impl Default for TolerancePolicy {
    fn default() -> Self {
        Self {
            epsilon: 0.00001,
            absolute_floor: 0.0001,
            ratio_threshold: 0.5,
        }
    }
}

impl TolerancePolicy {
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("epsilon", self.epsilon),
            ("absolute_floor", self.absolute_floor),
            ("ratio_threshold", self.ratio_threshold),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(HarnessError::InvalidConfig(format!(
                    "tolerance.{} must be a non-negative number, got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }
}

/// How fresh means are compared with gold means.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ComparisonMode {
    /// Error must clear both the absolute floor and the stdev ratio.
    Loose,
    /// Error must stay within a fixed absolute tolerance.
    Exact { tolerance: f64 },
}

impl Default for ComparisonMode {
    fn default() -> Self {
        ComparisonMode::Loose
    }
}

/// A parameter whose observed mean fell outside tolerance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Mismatch {
    pub param: String,
    pub gold_mean: f64,
    pub gold_stdev: f64,
    pub observed_mean: f64,
}

impl Mismatch {
    /// Human-readable line used in reports.
    pub fn describe(&self) -> String {
        format!(
            "param {} got mean {}, gold has mean {} and stdev {}",
            self.param, self.observed_mean, self.gold_mean, self.gold_stdev
        )
    }
}

/// Outcome of comparing one fresh summary against its gold record.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Verdict {
    pub mismatches: Vec<Mismatch>,

    /// Gold parameters absent from the fresh summary.
    pub missing: Vec<String>,
}

impl Verdict {
    pub fn passed(&self) -> bool {
        self.mismatches.is_empty() && self.missing.is_empty()
    }
}

/// Compare `fresh` with `gold` under `mode`.
///
/// Parameters are visited in gold order so the verdict is deterministic.
/// Parameters present only in `fresh` are ignored.
pub fn judge(
    fresh: &Summary,
    gold: &Summary,
    mode: ComparisonMode,
    policy: &TolerancePolicy,
) -> Verdict {
    let mut verdict = Verdict::default();

    for (param, gold_stats) in gold.iter() {
        let Some(observed) = fresh.get(param) else {
            verdict.missing.push(param.to_string());
            continue;
        };
        if gold_stats.stdev <= policy.epsilon {
            continue;
        }

        let err = (observed.mean - gold_stats.mean).abs();
        let out_of_tolerance = match mode {
            ComparisonMode::Exact { tolerance } => err > tolerance,
            ComparisonMode::Loose => {
                err > policy.absolute_floor && err / gold_stats.stdev > policy.ratio_threshold
            }
        };

        if out_of_tolerance {
            verdict.mismatches.push(Mismatch {
                param: param.to_string(),
                gold_mean: gold_stats.mean,
                gold_stdev: gold_stats.stdev,
                observed_mean: observed.mean,
            });
        }
    }

    verdict
}
