//! Build/run orchestration.
//!
//! [`Orchestrator::execute`] runs two phases in order:
//!
//! 1. **Build**: every discovered model becomes a [`BuildTarget`]; targets
//!    are handed to the build tool in bounded batches. The first failing
//!    batch aborts the whole run with [`HarnessError::BuildFailed`] before
//!    any model executes.
//! 2. **Run**: each model with a data file is executed, summarized and
//!    checked on a worker pool bounded by the configured parallelism.
//!    Failures here are recorded on the model's [`RunOutcome`] and never
//!    stop the other models.
//!
//! Outcomes come back in discovery order whatever order workers finish in.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use goldcheck_core::{
    judge, summarize_file, ComparisonMode, DiscoveredModel, GoldStore, HarnessConfig,
    HarnessError, Result, RunOutcome, MAX_PARALLELISM,
};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::command::{CommandRunner, CommandSpec};
use crate::target::{batched_build_commands, shell_escape, BuildTarget};

/// What to do with a fresh summary once it is computed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum GoldAction {
    /// Only record timings.
    TimeOnly,
    /// Compare against the existing gold record.
    Check { mode: ComparisonMode },
    /// Replace the gold record with the fresh summary.
    Overwrite,
}

/// One model scheduled for the run phase.
#[derive(Debug, Clone)]
struct ModelJob {
    target: BuildTarget,
    data: PathBuf,
}

/// Result of the build phase.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildReport {
    pub targets: usize,
    pub batches: usize,
    pub elapsed: Duration,
}

enum Slot {
    Done(RunOutcome),
    Running(String, JoinHandle<RunOutcome>),
}

/// Drives the build and run phases.
#[derive(Clone)]
pub struct Orchestrator {
    runner: Arc<dyn CommandRunner>,
    config: Arc<HarnessConfig>,
    action: GoldAction,
}

impl Orchestrator {
    pub fn new(runner: Arc<dyn CommandRunner>, config: HarnessConfig, action: GoldAction) -> Self {
        Self {
            runner,
            config: Arc::new(config),
            action,
        }
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Build phase. Blocks until every batch has finished or one fails.
    pub fn build(&self, targets: &[BuildTarget]) -> Result<BuildReport> {
        let start = Instant::now();
        let commands = batched_build_commands(
            &self.config.build,
            targets,
            Some(self.config.run.parallelism),
        );

        for (index, command) in commands.iter().enumerate() {
            let line = command.line();
            info!(
                batch = index + 1,
                batches = commands.len(),
                command = %line,
                "Building batch"
            );
            let output = self.runner.run(command)?;
            if !output.success() {
                warn!(command = %line, exit_code = output.exit_code, "Build failed");
                return Err(HarnessError::BuildFailed {
                    command: line,
                    code: output.exit_code,
                });
            }
        }

        let elapsed = start.elapsed();
        info!(
            targets = targets.len(),
            elapsed_secs = elapsed.as_secs_f64(),
            "Build phase complete"
        );
        Ok(BuildReport {
            targets: targets.len(),
            batches: commands.len(),
            elapsed,
        })
    }

    /// Build every model, then run those that have data.
    pub async fn execute(&self, discovered: Vec<DiscoveredModel>) -> Result<Vec<RunOutcome>> {
        self.build_phase(&discovered).await?;
        Ok(self.run_phase(discovered).await)
    }

    /// Build phase on the blocking pool.
    pub async fn build_phase(&self, discovered: &[DiscoveredModel]) -> Result<BuildReport> {
        let targets: Vec<BuildTarget> = discovered
            .iter()
            .map(|d| BuildTarget::from_model(&d.model.id, &self.config.build))
            .collect();
        let this = self.clone();
        tokio::task::spawn_blocking(move || this.build(&targets))
            .await
            .map_err(|e| HarnessError::Worker(e.to_string()))?
    }

    /// Run phase: execute, summarize and check each model with data.
    pub async fn run_phase(&self, discovered: Vec<DiscoveredModel>) -> Vec<RunOutcome> {
        let permits = self.config.run.parallelism.clamp(1, MAX_PARALLELISM);
        let semaphore = Arc::new(Semaphore::new(permits));
        let store = GoldStore::new(&self.config.run.gold_dir);

        let mut slots = Vec::with_capacity(discovered.len());
        let mut claimed: HashMap<String, String> = HashMap::new();
        for DiscoveredModel { model, data } in discovered {
            let Some(data) = data else {
                info!(model = %model.id, "No data file, skipping");
                slots.push(Slot::Done(RunOutcome::skipped(model.id, "no data file")));
                continue;
            };

            let job = ModelJob {
                target: BuildTarget::from_model(&model.id, &self.config.build),
                data,
            };
            let stem = GoldStore::stem(&job.target.name);
            if let Some(owner) = claimed.get(&stem) {
                warn!(model = %model.id, other = %owner, "Gold file name collision");
                let message = format!(
                    "gold file {} is already used by {}",
                    store.record_path(&job.target.name).display(),
                    owner
                );
                slots.push(Slot::Done(RunOutcome::new(model.id).with_error(message)));
                continue;
            }
            claimed.insert(stem, model.id.clone());
            let runner = Arc::clone(&self.runner);
            let config = Arc::clone(&self.config);
            let store = store.clone();
            let action = self.action;
            let semaphore = Arc::clone(&semaphore);

            let handle = tokio::spawn(async move {
                let model_id = job.target.model_id.clone();
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(e) => return RunOutcome::new(model_id).with_error(e.to_string()),
                };
                tokio::task::spawn_blocking(move || {
                    run_model(runner.as_ref(), &config, &store, action, &job)
                })
                .await
                .unwrap_or_else(|e| RunOutcome::new(model_id).with_error(e.to_string()))
            });
            slots.push(Slot::Running(model.id, handle));
        }

        let outcomes = join_all(slots.into_iter().map(|slot| async move {
            match slot {
                Slot::Done(outcome) => outcome,
                Slot::Running(model_id, handle) => handle.await.unwrap_or_else(|e| {
                    RunOutcome::new(model_id).with_error(format!("worker failed: {}", e))
                }),
            }
        }))
        .await;

        let failed = outcomes.iter().filter(|o| !o.passed() && !o.is_skipped()).count();
        info!(models = outcomes.len(), failed, "Run phase complete");
        outcomes
    }
}

/// Model executable invocation writing draws to `output`.
pub fn run_command(target: &BuildTarget, data: &Path, seed: u64, output: &Path) -> CommandSpec {
    CommandSpec::new(
        target.invocation(),
        vec![
            "sample".to_string(),
            "data".to_string(),
            format!("file={}", shell_escape(&data.to_string_lossy())),
            "random".to_string(),
            format!("seed={}", seed),
            "output".to_string(),
            format!("file={}", shell_escape(&output.to_string_lossy())),
        ],
    )
}

/// Delete a leftover draws file so a silent executable cannot be judged on
/// an earlier run's output.
fn remove_stale(draws: &Path) -> std::io::Result<()> {
    match std::fs::remove_file(draws) {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

/// Execute, summarize and check one model. Never fails: every problem is
/// recorded on the returned outcome.
fn run_model(
    runner: &dyn CommandRunner,
    config: &HarnessConfig,
    store: &GoldStore,
    action: GoldAction,
    job: &ModelJob,
) -> RunOutcome {
    let mut outcome = RunOutcome::new(job.target.model_id.clone());
    let exe = job.target.name.as_str();

    if let Err(e) = std::fs::create_dir_all(store.dir()) {
        return outcome.with_error(format!("cannot create {}: {}", store.dir().display(), e));
    }

    let draws = store.draws_path(exe);
    if let Err(e) = remove_stale(&draws) {
        return outcome.with_error(format!("cannot remove {}: {}", draws.display(), e));
    }
    let command = run_command(&job.target, &job.data, config.run.seed, &draws);
    let runs = config.run.runs.max(1);
    let mut total = Duration::ZERO;

    for i in 0..runs {
        info!(model = %outcome.model, run = i + 1, runs, "Running model");
        let start = Instant::now();
        let result = runner.run(&command);
        total += start.elapsed();

        match result {
            Ok(output) if output.success() => {}
            Ok(output) => {
                outcome.elapsed_secs = total.as_secs_f64() / f64::from(i + 1);
                let mut message = format!(
                    "exit code {} from '{}'",
                    output.exit_code,
                    command.line()
                );
                if let Some(tail) = output.stderr_tail() {
                    message.push_str(": ");
                    message.push_str(tail);
                }
                warn!(model = %outcome.model, exit_code = output.exit_code, "Model execution failed");
                return outcome.with_error(message);
            }
            Err(e) => {
                outcome.elapsed_secs = total.as_secs_f64() / f64::from(i + 1);
                warn!(model = %outcome.model, error = %e, "Model execution failed");
                return outcome.with_error(e.to_string());
            }
        }
    }
    outcome.elapsed_secs = total.as_secs_f64() / f64::from(runs);

    let summary = summarize_file(&draws);
    if let Err(e) = remove_stale(&draws) {
        warn!(path = %draws.display(), error = %e, "Could not remove draws file");
    }
    let summary = match summary {
        Ok(summary) => summary,
        Err(e) => return outcome.with_error(e.to_string()),
    };

    match action {
        GoldAction::TimeOnly => {}
        GoldAction::Overwrite => {
            if let Err(e) = store.write(exe, &summary) {
                return outcome.with_error(e.to_string());
            }
            info!(model = %outcome.model, params = summary.len(), "Recorded gold");
        }
        GoldAction::Check { mode } => match store.read(exe) {
            Ok(gold) => {
                let verdict = judge(&summary, &gold, mode, &config.tolerance);
                for m in &verdict.mismatches {
                    warn!(model = %outcome.model, "FAIL: {}", m.describe());
                }
                for p in &verdict.missing {
                    warn!(model = %outcome.model, param = %p, "FAIL: param missing from output");
                }
                outcome.apply_verdict(verdict);
            }
            Err(e) => return outcome.with_error(e.to_string()),
        },
    }

    info!(
        model = %outcome.model,
        elapsed_secs = outcome.elapsed_secs,
        passed = outcome.passed(),
        "Model finished"
    );
    outcome
}
