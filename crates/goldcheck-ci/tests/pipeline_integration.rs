//! Integration tests for the build/run pipeline with a scripted sampler.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use goldcheck_ci::{CommandOutput, CommandRunner, CommandSpec, GoldAction, Orchestrator};
use goldcheck_core::{
    ComparisonMode, GoldStore, HarnessConfig, HarnessError, LocatorConfig, ModelLocator,
    SuiteReport,
};

/// Pretends to be both the build tool and every model executable.
///
/// A model invocation writes the draws registered for the first key found
/// in its program path, after an optional delay.
#[derive(Default)]
struct ScriptedSampler {
    draws: Mutex<HashMap<String, (String, Duration)>>,
    exit_codes: Mutex<HashMap<String, i32>>,
    silent: Mutex<HashSet<String>>,
    log: Mutex<Vec<String>>,
}

impl ScriptedSampler {
    fn set_draws(&self, key: &str, csv: &str, delay: Duration) {
        self.draws
            .lock()
            .unwrap()
            .insert(key.to_string(), (csv.to_string(), delay));
    }

    fn set_exit_code(&self, key: &str, code: i32) {
        self.exit_codes.lock().unwrap().insert(key.to_string(), code);
    }

    /// Exit 0 without writing any output.
    fn set_silent(&self, key: &str) {
        self.silent.lock().unwrap().insert(key.to_string());
    }

    fn finished(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }
}

impl CommandRunner for ScriptedSampler {
    fn run(&self, command: &CommandSpec) -> goldcheck_core::Result<CommandOutput> {
        if command.program == "make" {
            let code = self
                .exit_codes
                .lock()
                .unwrap()
                .get("make")
                .copied()
                .unwrap_or(0);
            return Ok(CommandOutput {
                exit_code: code,
                ..CommandOutput::default()
            });
        }

        let output = command
            .args
            .iter()
            .rev()
            .find_map(|a| a.strip_prefix("file="))
            .map(|a| PathBuf::from(a.replace('\\', "")))
            .expect("output file argument");

        let entry = {
            let draws = self.draws.lock().unwrap();
            draws
                .iter()
                .find(|(key, _)| command.program.contains(key.as_str()))
                .map(|(key, value)| (key.clone(), value.clone()))
        };
        let Some((key, (csv, delay))) = entry else {
            return Ok(CommandOutput {
                exit_code: 127,
                stderr: "no such model".to_string(),
                ..CommandOutput::default()
            });
        };

        std::thread::sleep(delay);
        let code = self.exit_codes.lock().unwrap().get(&key).copied().unwrap_or(0);
        let silent = self.silent.lock().unwrap().contains(&key);
        if code == 0 && !silent {
            fs::write(&output, csv).unwrap();
        }
        self.log.lock().unwrap().push(key);
        Ok(CommandOutput {
            exit_code: code,
            stderr: if code == 0 { String::new() } else { "sampler crashed".to_string() },
            ..CommandOutput::default()
        })
    }
}

const ALPHA_DRAWS: &str = "# alpha\nlp__,theta\n-1,1.9\n-1,2.0\n-1,2.1\n";
const ALPHA_DRIFTED: &str = "# alpha\nlp__,theta\n-1,2.4\n-1,2.5\n-1,2.6\n";
const BETA_DRAWS: &str = "lp__,mu,sigma\n-2,0.0,1.0\n-2,1.0,1.0\n";

fn touch(path: &Path) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, "").unwrap();
}

/// Two models with data, one without.
fn workspace() -> (tempfile::TempDir, HarnessConfig, Vec<PathBuf>) {
    let dir = tempfile::tempdir().unwrap();
    let models = dir.path().join("models");
    touch(&models.join("alpha/alpha.stan"));
    touch(&models.join("alpha/alpha.data.R"));
    touch(&models.join("beta/beta.stan"));
    touch(&models.join("beta/beta.data.R"));
    touch(&models.join("gamma/gamma.stan"));

    let mut config = HarnessConfig::default();
    config.locator = LocatorConfig {
        excluded: Default::default(),
        ..LocatorConfig::default()
    };
    config.run.gold_dir = dir.path().join("golds");
    config.run.parallelism = 2;

    (dir, config, vec![models])
}

async fn run(
    runner: Arc<ScriptedSampler>,
    config: &HarnessConfig,
    roots: &[PathBuf],
    action: GoldAction,
) -> goldcheck_core::Result<Vec<goldcheck_core::RunOutcome>> {
    let locator = ModelLocator::new(config.locator.clone()).unwrap();
    let discovered = locator.discover(roots);
    Orchestrator::new(runner, config.clone(), action)
        .execute(discovered)
        .await
}

fn check(mode: ComparisonMode) -> GoldAction {
    GoldAction::Check { mode }
}

#[tokio::test]
async fn test_record_then_check_passes() {
    let (_dir, config, roots) = workspace();
    let runner = Arc::new(ScriptedSampler::default());
    runner.set_draws("alpha/alpha", ALPHA_DRAWS, Duration::ZERO);
    runner.set_draws("beta/beta", BETA_DRAWS, Duration::ZERO);

    let recorded = run(runner.clone(), &config, &roots, GoldAction::Overwrite)
        .await
        .expect("record run");
    assert_eq!(recorded.len(), 3);
    assert!(recorded[0].passed(), "{:?}", recorded[0]);
    assert!(recorded[1].passed(), "{:?}", recorded[1]);
    assert!(recorded[2].is_skipped());

    let checked = run(runner, &config, &roots, check(ComparisonMode::Loose))
        .await
        .expect("check run");
    let report = SuiteReport::from_outcomes("Performance Tests", &checked);
    assert_eq!(report.tests, 3);
    assert_eq!(report.failures, 0);
    assert_eq!(report.errors, 0);
    assert_eq!(report.skipped, 1);
}

#[tokio::test]
async fn test_drifted_mean_fails_loose_but_passes_wide_exact() {
    let (_dir, config, roots) = workspace();
    let runner = Arc::new(ScriptedSampler::default());
    runner.set_draws("alpha/alpha", ALPHA_DRAWS, Duration::ZERO);
    runner.set_draws("beta/beta", BETA_DRAWS, Duration::ZERO);
    run(runner.clone(), &config, &roots, GoldAction::Overwrite)
        .await
        .unwrap();

    runner.set_draws("alpha/alpha", ALPHA_DRIFTED, Duration::ZERO);

    let loose = run(runner.clone(), &config, &roots, check(ComparisonMode::Loose))
        .await
        .unwrap();
    assert_eq!(loose[0].mismatches.len(), 1);
    let m = &loose[0].mismatches[0];
    assert_eq!(m.param, "theta");
    assert!((m.gold_mean - 2.0).abs() < 1e-12);
    assert!((m.observed_mean - 2.5).abs() < 1e-12);
    assert!(loose[1].passed());

    let exact = run(
        runner,
        &config,
        &roots,
        check(ComparisonMode::Exact { tolerance: 1.0 }),
    )
    .await
    .unwrap();
    assert!(exact[0].passed());
}

#[tokio::test]
async fn test_report_keeps_discovery_order() {
    let (_dir, config, roots) = workspace();
    let runner = Arc::new(ScriptedSampler::default());
    runner.set_draws("alpha/alpha", ALPHA_DRAWS, Duration::from_millis(300));
    runner.set_draws("beta/beta", BETA_DRAWS, Duration::ZERO);

    let outcomes = run(runner.clone(), &config, &roots, GoldAction::TimeOnly)
        .await
        .unwrap();

    assert_eq!(runner.finished(), vec!["beta/beta", "alpha/alpha"]);
    let names: Vec<&str> = outcomes
        .iter()
        .map(|o| o.model.rsplit('/').next().unwrap())
        .collect();
    assert_eq!(names, vec!["alpha.stan", "beta.stan", "gamma.stan"]);
    assert!(outcomes[0].elapsed_secs >= 0.3);
}

#[tokio::test]
async fn test_execution_error_does_not_stop_other_models() {
    let (_dir, config, roots) = workspace();
    let runner = Arc::new(ScriptedSampler::default());
    runner.set_draws("alpha/alpha", ALPHA_DRAWS, Duration::ZERO);
    runner.set_draws("beta/beta", BETA_DRAWS, Duration::ZERO);
    runner.set_exit_code("alpha/alpha", 70);

    let outcomes = run(runner, &config, &roots, GoldAction::Overwrite)
        .await
        .unwrap();

    assert_eq!(outcomes[0].errors.len(), 1);
    assert!(outcomes[0].errors[0].contains("exit code 70"));
    assert!(outcomes[0].errors[0].contains("sampler crashed"));
    assert!(outcomes[1].passed());

    let store = GoldStore::new(&config.run.gold_dir);
    assert!(store.record_path(&outcomes[1].model.replace(".stan", "")).exists());
}

#[tokio::test]
async fn test_build_failure_is_fatal() {
    let (_dir, config, roots) = workspace();
    let runner = Arc::new(ScriptedSampler::default());
    runner.set_draws("alpha/alpha", ALPHA_DRAWS, Duration::ZERO);
    runner.set_exit_code("make", 2);

    let result = run(runner.clone(), &config, &roots, GoldAction::TimeOnly).await;
    match result {
        Err(HarnessError::BuildFailed { command, code }) => {
            assert!(command.starts_with("make -j2"));
            assert_eq!(code, 2);
        }
        other => panic!("expected build failure, got {:?}", other),
    }
    assert!(runner.finished().is_empty());
}

#[tokio::test]
async fn test_missing_and_malformed_gold_are_errors() {
    let (_dir, config, roots) = workspace();
    let runner = Arc::new(ScriptedSampler::default());
    runner.set_draws("alpha/alpha", ALPHA_DRAWS, Duration::ZERO);
    runner.set_draws("beta/beta", BETA_DRAWS, Duration::ZERO);

    // Only beta gets a gold record, and it is corrupt.
    let store = GoldStore::new(&config.run.gold_dir);
    fs::create_dir_all(store.dir()).unwrap();
    let beta_exe = roots[0].join("beta/beta").to_string_lossy().into_owned();
    fs::write(store.record_path(&beta_exe), "mu 0.5\n").unwrap();

    let outcomes = run(runner, &config, &roots, check(ComparisonMode::Loose))
        .await
        .unwrap();

    assert!(outcomes[0].errors[0].contains("no gold record"));
    assert!(outcomes[1].errors[0].contains("malformed gold record"));
    assert!(outcomes[0].mismatches.is_empty());
}

#[tokio::test]
async fn test_shape_drift_is_reported() {
    let (_dir, config, roots) = workspace();
    let runner = Arc::new(ScriptedSampler::default());
    runner.set_draws("alpha/alpha", ALPHA_DRAWS, Duration::ZERO);
    runner.set_draws("beta/beta", BETA_DRAWS, Duration::ZERO);
    run(runner.clone(), &config, &roots, GoldAction::Overwrite)
        .await
        .unwrap();

    runner.set_draws("beta/beta", "lp__,mu\n-2,0.0\n-2,1.0\n", Duration::ZERO);
    let outcomes = run(runner, &config, &roots, check(ComparisonMode::Loose))
        .await
        .unwrap();

    assert_eq!(outcomes[1].missing, vec!["sigma".to_string()]);
    let report = SuiteReport::from_outcomes("s", &outcomes);
    assert_eq!(report.failures, 1);
}

#[tokio::test]
async fn test_repeated_runs_invoke_each_model_n_times() {
    let (_dir, mut config, roots) = workspace();
    config.run.runs = 3;
    let runner = Arc::new(ScriptedSampler::default());
    runner.set_draws("alpha/alpha", ALPHA_DRAWS, Duration::ZERO);
    runner.set_draws("beta/beta", BETA_DRAWS, Duration::ZERO);

    run(runner.clone(), &config, &roots, GoldAction::TimeOnly)
        .await
        .unwrap();

    let finished = runner.finished();
    assert_eq!(finished.iter().filter(|k| *k == "alpha/alpha").count(), 3);
    assert_eq!(finished.iter().filter(|k| *k == "beta/beta").count(), 3);
}

#[tokio::test]
async fn test_silent_executable_is_not_judged_on_old_draws() {
    let (_dir, config, roots) = workspace();
    let runner = Arc::new(ScriptedSampler::default());
    runner.set_draws("alpha/alpha", ALPHA_DRAWS, Duration::ZERO);
    runner.set_draws("beta/beta", BETA_DRAWS, Duration::ZERO);
    run(runner.clone(), &config, &roots, GoldAction::Overwrite)
        .await
        .unwrap();

    let store = GoldStore::new(&config.run.gold_dir);
    let alpha_exe = roots[0].join("alpha/alpha").to_string_lossy().into_owned();
    assert!(store.record_path(&alpha_exe).exists());
    assert!(!store.draws_path(&alpha_exe).exists());

    // A leftover draws file from an interrupted run must not be picked up.
    fs::write(store.draws_path(&alpha_exe), ALPHA_DRAWS).unwrap();
    runner.set_silent("alpha/alpha");

    let outcomes = run(runner, &config, &roots, check(ComparisonMode::Loose))
        .await
        .unwrap();

    assert!(!outcomes[0].passed());
    assert_eq!(outcomes[0].errors.len(), 1);
    assert!(outcomes[0].errors[0].contains("failed to read draws"));
    assert!(outcomes[1].passed());
}

#[tokio::test]
async fn test_colliding_gold_names_are_reported() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("pair");
    touch(&root.join("a/b_c.stan"));
    touch(&root.join("a/b_c.data.R"));
    touch(&root.join("a_b/c.stan"));
    touch(&root.join("a_b/c.data.R"));

    let mut config = HarnessConfig::default();
    config.locator.excluded = Default::default();
    config.run.gold_dir = dir.path().join("golds");

    let runner = Arc::new(ScriptedSampler::default());
    runner.set_draws("a/b_c", BETA_DRAWS, Duration::ZERO);
    runner.set_draws("a_b/c", ALPHA_DRAWS, Duration::ZERO);

    let outcomes = run(runner.clone(), &config, &[root], GoldAction::Overwrite)
        .await
        .unwrap();

    assert_eq!(outcomes.len(), 2);
    assert!(outcomes[0].passed(), "{:?}", outcomes[0]);
    assert!(outcomes[0].model.ends_with("a/b_c.stan"));
    assert_eq!(outcomes[1].errors.len(), 1);
    assert!(outcomes[1].errors[0].contains("already used by"));
    assert!(outcomes[1].errors[0].contains("a/b_c.stan"));
    assert_eq!(runner.finished(), vec!["a/b_c"]);
}
