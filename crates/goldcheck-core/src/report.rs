//! Per-model outcomes and the suite report built from them.
//!
//! [`SuiteReport::from_outcomes`] is pure: it only reshapes outcomes into
//! the record CI consumes. [`render_junit`] and [`write_json`] serialize it.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use xml::writer::{EmitterConfig, EventWriter, XmlEvent};

use crate::error::{HarnessError, Result};
use crate::judge::{Mismatch, Verdict};

/// Result of running and checking one model.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RunOutcome {
    /// Model identifier.
    pub model: String,

    /// Mean wall-clock time of one execution, in seconds.
    pub elapsed_secs: f64,

    pub mismatches: Vec<Mismatch>,

    /// Gold parameters missing from the fresh output.
    pub missing: Vec<String>,

    /// Execution errors (non-zero exit, unreadable output, bad gold file).
    pub errors: Vec<String>,

    /// Set when the model was never executed.
    pub skip_reason: Option<String>,
}

impl RunOutcome {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Self::default()
        }
    }

    /// Outcome for a model that was discovered but not executed.
    pub fn skipped(model: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            skip_reason: Some(reason.into()),
            ..Self::default()
        }
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.errors.push(error.into());
        self
    }

    pub fn apply_verdict(&mut self, verdict: Verdict) {
        self.mismatches.extend(verdict.mismatches);
        self.missing.extend(verdict.missing);
    }

    pub fn is_skipped(&self) -> bool {
        self.skip_reason.is_some()
    }

    /// Any regression finding (mismatch or missing parameter).
    pub fn has_failures(&self) -> bool {
        !self.mismatches.is_empty() || !self.missing.is_empty()
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn passed(&self) -> bool {
        !self.is_skipped() && !self.has_failures() && !self.has_errors()
    }
}

/// Kind of a failure entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    ParamMismatch,
    MissingParam,
}

impl FailureKind {
    pub fn label(&self) -> &'static str {
        match self {
            FailureKind::ParamMismatch => "param mismatch",
            FailureKind::MissingParam => "missing param",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FailureEntry {
    pub kind: FailureKind,
    pub message: String,
}

/// One model's entry in the suite report.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CaseReport {
    pub name: String,
    pub time_secs: f64,
    pub failures: Vec<FailureEntry>,
    pub errors: Vec<String>,
    pub skipped: Option<String>,
}

impl From<&RunOutcome> for CaseReport {
    fn from(outcome: &RunOutcome) -> Self {
        let failures = outcome
            .mismatches
            .iter()
            .map(|m| FailureEntry {
                kind: FailureKind::ParamMismatch,
                message: m.describe(),
            })
            .chain(outcome.missing.iter().map(|p| FailureEntry {
                kind: FailureKind::MissingParam,
                message: format!("param {} missing from output", p),
            }))
            .collect();

        Self {
            name: outcome.model.clone(),
            time_secs: outcome.elapsed_secs,
            failures,
            errors: outcome.errors.clone(),
            skipped: outcome.skip_reason.clone(),
        }
    }
}

/// Aggregated suite record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SuiteReport {
    pub name: String,
    pub generated_at: DateTime<Utc>,
    pub tests: usize,
    /// Cases with at least one mismatch or missing parameter.
    pub failures: usize,
    /// Cases with at least one execution error.
    pub errors: usize,
    pub skipped: usize,
    /// Sum of per-case times.
    pub time_secs: f64,
    pub cases: Vec<CaseReport>,
}

impl SuiteReport {
    /// Build the report. Case order follows `outcomes`.
    pub fn from_outcomes(name: impl Into<String>, outcomes: &[RunOutcome]) -> Self {
        Self {
            name: name.into(),
            generated_at: Utc::now(),
            tests: outcomes.len(),
            failures: outcomes.iter().filter(|o| o.has_failures()).count(),
            errors: outcomes.iter().filter(|o| o.has_errors()).count(),
            skipped: outcomes.iter().filter(|o| o.is_skipped()).count(),
            time_secs: outcomes.iter().map(|o| o.elapsed_secs).sum(),
            cases: outcomes.iter().map(CaseReport::from).collect(),
        }
    }

    pub fn passed_count(&self) -> usize {
        self.cases
            .iter()
            .filter(|c| c.failures.is_empty() && c.errors.is_empty() && c.skipped.is_none())
            .count()
    }
}

fn xml_err(e: xml::writer::Error) -> HarnessError {
    HarnessError::Report(e.to_string())
}

/// Render the report as a JUnit-style `<testsuite>` document.
pub fn render_junit(report: &SuiteReport) -> Result<String> {
    let mut output = Vec::new();
    let mut writer = EmitterConfig::new()
        .perform_indent(true)
        .create_writer(&mut output);

    writer
        .write(XmlEvent::StartDocument {
            version: xml::common::XmlVersion::Version10,
            encoding: Some("UTF-8"),
            standalone: None,
        })
        .map_err(xml_err)?;

    writer
        .write(
            XmlEvent::start_element("testsuite")
                .attr("name", &report.name)
                .attr("tests", &report.tests.to_string())
                .attr("failures", &report.failures.to_string())
                .attr("errors", &report.errors.to_string())
                .attr("skipped", &report.skipped.to_string())
                .attr("time", &format!("{:.3}", report.time_secs))
                .attr("timestamp", &report.generated_at.to_rfc3339()),
        )
        .map_err(xml_err)?;

    for case in &report.cases {
        write_case(&mut writer, case)?;
    }

    writer.write(XmlEvent::end_element()).map_err(xml_err)?;

    String::from_utf8(output).map_err(|e| HarnessError::Report(e.to_string()))
}

fn write_case(writer: &mut EventWriter<&mut Vec<u8>>, case: &CaseReport) -> Result<()> {
    writer
        .write(
            XmlEvent::start_element("testcase")
                .attr("classname", &case.name)
                .attr("name", &case.name)
                .attr("time", &format!("{:.3}", case.time_secs)),
        )
        .map_err(xml_err)?;

    if let Some(reason) = &case.skipped {
        writer
            .write(XmlEvent::start_element("skipped").attr("message", reason))
            .map_err(xml_err)?;
        writer.write(XmlEvent::end_element()).map_err(xml_err)?;
    }

    for failure in &case.failures {
        writer
            .write(
                XmlEvent::start_element("failure")
                    .attr("type", failure.kind.label())
                    .attr("message", &failure.message),
            )
            .map_err(xml_err)?;
        writer
            .write(XmlEvent::characters(&failure.message))
            .map_err(xml_err)?;
        writer.write(XmlEvent::end_element()).map_err(xml_err)?;
    }

    for error in &case.errors {
        writer
            .write(
                XmlEvent::start_element("error")
                    .attr("type", "ExecutionError")
                    .attr("message", error),
            )
            .map_err(xml_err)?;
        writer.write(XmlEvent::characters(error)).map_err(xml_err)?;
        writer.write(XmlEvent::end_element()).map_err(xml_err)?;
    }

    writer.write(XmlEvent::end_element()).map_err(xml_err)?;
    Ok(())
}

/// Write the JUnit document to `path`.
pub fn write_junit(path: &Path, report: &SuiteReport) -> Result<()> {
    std::fs::write(path, render_junit(report)?)?;
    Ok(())
}

/// Write the report as pretty JSON to `path`.
pub fn write_json(path: &Path, report: &SuiteReport) -> Result<()> {
    let content = serde_json::to_string_pretty(report)?;
    std::fs::write(path, content)?;
    Ok(())
}
