//! Suite runner: schedules cases, enforces the retry budget, and builds
//! the run report.

use crate::action::Action;
use crate::baseline::{sanitize_name, BaselineStore};
use crate::capture::{load_capture, Capture};
use crate::controller::ControlPlane;
use crate::diff::{diff, DiffOptions};
use crate::driver::{CasePlan, PageDriver};
use crate::env::EnvSignature;
use crate::error::{ErrorCategory, HarnessError, Result};
use crate::report::{CaseReport, CaseVerdict, RunReport, RunSummary, VRT_OUTPUT_VERSION};
use crate::suite::{Suite, TestCase};
use futures::stream::{self, StreamExt};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Callback invoked with human-readable progress lines.
pub type ProgressCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Scheduling and verdict options for one suite run.
#[derive(Clone)]
pub struct RunnerOptions {
    /// Number of cases allowed to run concurrently.
    pub workers: usize,
    /// Accept candidates as new baselines instead of failing.
    pub update_baselines: bool,
    /// Overrides every case's declared retry budget when set.
    pub retries_override: Option<u32>,
    /// Root directory for per-attempt captures and diff images.
    pub artifacts_dir: PathBuf,
    /// Keep artifacts of passing cases instead of deleting them.
    pub keep_artifacts: bool,
    /// Pixel threshold and default aggregate budget for comparisons.
    pub diff: DiffOptions,
    /// Optional progress callback for logging.
    pub progress: Option<ProgressCallback>,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            workers: 1,
            update_baselines: false,
            retries_override: None,
            artifacts_dir: PathBuf::from("vrt-artifacts"),
            keep_artifacts: false,
            diff: DiffOptions::default(),
            progress: None,
        }
    }
}

/// Lifecycle of one case inside a run.
///
/// A case is `Pending` until the scheduler picks it up, `Running` during an
/// attempt, and `FlakyRetrying` between a failed attempt and the next one.
/// `Passed`/`Failed` are the terminal verdicts; `Done` marks that teardown
/// has finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaseState {
    Pending,
    Running,
    FlakyRetrying,
    Passed,
    Failed,
    Done,
}

impl fmt::Display for CaseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            CaseState::Pending => "pending",
            CaseState::Running => "running",
            CaseState::FlakyRetrying => "flaky-retrying",
            CaseState::Passed => "passed",
            CaseState::Failed => "failed",
            CaseState::Done => "done",
        };
        write!(f, "{}", label)
    }
}

/// What one attempt concluded.
#[derive(Debug)]
pub(crate) enum AttemptOutcome {
    /// Comparison passed, or the candidate was accepted as the new baseline.
    Passed {
        distance: Option<f64>,
        baseline_updated: bool,
    },
    /// Comparison ran but the distance exceeded the budget.
    Mismatch {
        distance: f64,
        diff_path: Option<PathBuf>,
    },
    /// The attempt never produced a comparable capture.
    Errored(HarnessError),
}

struct AttemptRun {
    outcome: AttemptOutcome,
    unstable: bool,
    capture_path: Option<PathBuf>,
}

impl AttemptRun {
    fn errored(err: HarnessError) -> Self {
        Self {
            outcome: AttemptOutcome::Errored(err),
            unstable: false,
            capture_path: None,
        }
    }
}

/// Decides the state after one finished attempt.
///
/// Visual mismatches and retryable errors burn a retry when budget remains;
/// everything else is terminal.
pub(crate) fn next_state(outcome: &AttemptOutcome, attempt: u32, max_attempts: u32) -> CaseState {
    match outcome {
        AttemptOutcome::Passed { .. } => CaseState::Passed,
        AttemptOutcome::Mismatch { .. } if attempt < max_attempts => CaseState::FlakyRetrying,
        AttemptOutcome::Mismatch { .. } => CaseState::Failed,
        AttemptOutcome::Errored(err) if err.is_retryable() && attempt < max_attempts => {
            CaseState::FlakyRetrying
        }
        AttemptOutcome::Errored(_) => CaseState::Failed,
    }
}

fn describe_outcome(outcome: &AttemptOutcome) -> String {
    match outcome {
        AttemptOutcome::Passed { .. } => "passed".to_string(),
        AttemptOutcome::Mismatch { distance, .. } => {
            format!("distance {:.6} over budget", distance)
        }
        AttemptOutcome::Errored(err) => err.to_string(),
    }
}

/// Runs suites: hooks once per suite, cases through a bounded worker pool in
/// declared order, attempts strictly sequential within a case.
pub struct Runner {
    driver: PageDriver,
    store: Arc<BaselineStore>,
    control: Arc<dyn ControlPlane>,
    env: EnvSignature,
    options: RunnerOptions,
}

impl Runner {
    pub fn new(
        driver: PageDriver,
        store: Arc<BaselineStore>,
        control: Arc<dyn ControlPlane>,
        env: EnvSignature,
        options: RunnerOptions,
    ) -> Self {
        Self {
            driver,
            store,
            control,
            env,
            options,
        }
    }

    /// Executes every case of the suite and reports the results in declared
    /// order. Failures are folded into the report rather than returned.
    pub async fn run(&self, suite: &Suite) -> RunReport {
        let start = Instant::now();
        let workers = self.options.workers.max(1);
        self.log(&format!(
            "Running suite '{}' ({} cases, {} workers, env {})",
            suite.name,
            suite.cases.len(),
            workers,
            self.env
        ));

        let mut prepared = Vec::with_capacity(suite.cases.len());
        for case in &suite.cases {
            match resolve_case_actions(suite, case) {
                Ok(actions) => prepared.push((case, actions)),
                Err(err) => return self.aborted_report(suite, err, start),
            }
        }

        if let Err(err) = self.run_suite_setup(suite).await {
            self.run_suite_teardown(suite).await;
            return self.aborted_report(suite, err, start);
        }

        let cancel = CancellationToken::new();
        let reports: Vec<CaseReport> = stream::iter(prepared)
            .map(|(case, actions)| {
                let cancel = cancel.clone();
                async move {
                    if cancel.is_cancelled() {
                        return self.skipped_report(case);
                    }
                    let report = self.run_case_to_report(case, &actions).await;
                    if report_is_internal(&report) {
                        self.log(&format!(
                            "case {}: internal error, aborting remaining cases",
                            case.name
                        ));
                        cancel.cancel();
                    }
                    report
                }
            })
            .buffered(workers)
            .collect()
            .await;

        self.run_suite_teardown(suite).await;

        let error = reports.iter().find_map(|case| {
            case.error
                .clone()
                .filter(|payload| matches!(payload.category, ErrorCategory::Internal))
        });

        RunReport {
            version: VRT_OUTPUT_VERSION.to_string(),
            suite: suite.name.clone(),
            env: self.env.to_string(),
            summary: RunSummary::tally(&reports),
            cases: reports,
            error,
            elapsed_ms: start.elapsed().as_millis() as u64,
        }
    }

    async fn run_suite_setup(&self, suite: &Suite) -> Result<()> {
        for step in &suite.setup {
            self.log(&format!("suite setup: {}", step.describe()));
            self.control.run_step(step).await?;
        }
        Ok(())
    }

    async fn run_suite_teardown(&self, suite: &Suite) {
        for step in &suite.teardown {
            self.log(&format!("suite teardown: {}", step.describe()));
            if let Err(err) = self.control.run_step(step).await {
                self.log(&format!(
                    "suite teardown step '{}' failed: {}",
                    step.describe(),
                    err
                ));
            }
        }
    }

    async fn run_case_to_report(&self, case: &TestCase, actions: &[Action]) -> CaseReport {
        let start = Instant::now();
        let max_attempts = self.options.retries_override.unwrap_or(case.retries) + 1;
        let max_distance = case.max_distance.unwrap_or(self.options.diff.max_distance);

        let mut attempt = 1u32;
        let mut state;
        let mut final_run = loop {
            self.log(&format!(
                "case {}: running (attempt {}/{})",
                case.name, attempt, max_attempts
            ));
            let run = self.run_attempt(case, actions, attempt, max_distance).await;
            state = next_state(&run.outcome, attempt, max_attempts);
            if state != CaseState::FlakyRetrying {
                break run;
            }
            self.log(&format!(
                "case {}: flaky-retrying ({})",
                case.name,
                describe_outcome(&run.outcome)
            ));
            attempt += 1;
        };

        // Teardown runs exactly once, whatever the attempts concluded.
        let mut teardown_error = None;
        for step in &case.teardown {
            self.log(&format!("case {}: teardown {}", case.name, step.describe()));
            if let Err(err) = self.control.run_step(step).await {
                self.log(&format!(
                    "case {}: teardown step '{}' failed: {}",
                    case.name,
                    step.describe(),
                    err
                ));
                teardown_error = Some(err);
                break;
            }
        }
        if let Some(err) = teardown_error {
            if state == CaseState::Passed {
                state = CaseState::Failed;
                final_run.outcome = AttemptOutcome::Errored(err);
            }
        }

        let mut capture_path = final_run.capture_path;
        let (verdict, distance, baseline_updated, error, diff_path) = match final_run.outcome {
            AttemptOutcome::Passed {
                distance,
                baseline_updated,
            } => (CaseVerdict::Passed, distance, baseline_updated, None, None),
            AttemptOutcome::Mismatch {
                distance,
                diff_path,
            } => (
                CaseVerdict::Failed,
                Some(distance),
                false,
                None,
                diff_path,
            ),
            AttemptOutcome::Errored(err) => {
                (CaseVerdict::Failed, None, false, Some(err.to_payload()), None)
            }
        };

        let mut diff_path = diff_path;
        if verdict == CaseVerdict::Passed && !self.options.keep_artifacts {
            let dir = self.options.artifacts_dir.join(sanitize_name(&case.name));
            let _ = std::fs::remove_dir_all(&dir);
            capture_path = None;
            diff_path = None;
        }

        self.log(&format!(
            "case {}: {} after {} attempt(s) in {:.1}s",
            case.name,
            state,
            attempt,
            start.elapsed().as_secs_f32()
        ));
        self.log(&format!("case {}: {}", case.name, CaseState::Done));

        CaseReport {
            name: case.name.clone(),
            verdict,
            attempts: attempt,
            flaky: verdict == CaseVerdict::Passed && attempt > 1,
            unstable: final_run.unstable,
            baseline_updated,
            distance,
            max_distance,
            error,
            capture_path,
            diff_path,
            elapsed_ms: start.elapsed().as_millis() as u64,
        }
    }

    async fn run_attempt(
        &self,
        case: &TestCase,
        actions: &[Action],
        attempt: u32,
        max_distance: f64,
    ) -> AttemptRun {
        if attempt == 1 || case.reset_per_attempt {
            for step in &case.setup {
                self.log(&format!("case {}: setup {}", case.name, step.describe()));
                if let Err(err) = self.control.run_step(step).await {
                    return AttemptRun::errored(err);
                }
            }
        }

        let attempt_dir = self.attempt_dir(case, attempt);
        let capture_path = attempt_dir.join("capture.png");
        let plan = CasePlan {
            name: case.name.clone(),
            attempt,
            actions: actions.to_vec(),
            capture: case.capture.clone(),
            capture_path: capture_path.clone(),
        };

        let outcome = match self.driver.run_case(&plan).await {
            Ok(outcome) => outcome,
            Err(err) => return AttemptRun::errored(err),
        };
        if outcome.unstable {
            self.log(&format!(
                "case {}: page never went quiet, capture flagged unstable",
                case.name
            ));
        }

        let capture = match load_capture(&outcome.capture_path, self.env.clone(), outcome.unstable)
        {
            Ok(capture) => capture,
            Err(err) => {
                return AttemptRun {
                    outcome: AttemptOutcome::Errored(err),
                    unstable: outcome.unstable,
                    capture_path: Some(capture_path),
                }
            }
        };

        let outcome_verdict = self
            .judge(case, &capture, &attempt_dir, max_distance)
            .await;
        AttemptRun {
            outcome: outcome_verdict,
            unstable: outcome.unstable,
            capture_path: Some(capture_path),
        }
    }

    /// Compares the capture against the stored baseline and turns the result
    /// into an attempt outcome.
    async fn judge(
        &self,
        case: &TestCase,
        capture: &Capture,
        attempt_dir: &Path,
        max_distance: f64,
    ) -> AttemptOutcome {
        let options = DiffOptions {
            pixel_threshold: self.options.diff.pixel_threshold,
            max_distance,
        };

        let baseline = match self.store.load(&case.name, &self.env).await {
            Ok(baseline) => baseline,
            Err(err @ HarnessError::BaselineMissing { .. }) => {
                if self.options.update_baselines {
                    return self.accept_candidate(case, capture).await;
                }
                return AttemptOutcome::Errored(err);
            }
            Err(err) => return AttemptOutcome::Errored(err),
        };

        match diff(&baseline.image, &capture.image, &options) {
            Ok(result) if result.passed => AttemptOutcome::Passed {
                distance: Some(result.distance),
                baseline_updated: false,
            },
            Ok(result) => {
                if self.options.update_baselines {
                    return self.accept_candidate(case, capture).await;
                }
                let diff_path = attempt_dir.join("diff.png");
                let diff_path = match &result.diff_image {
                    Some(image) => match image.save(&diff_path) {
                        Ok(()) => Some(diff_path),
                        Err(err) => {
                            self.log(&format!(
                                "case {}: failed to write diff image: {}",
                                case.name, err
                            ));
                            None
                        }
                    },
                    None => None,
                };
                AttemptOutcome::Mismatch {
                    distance: result.distance,
                    diff_path,
                }
            }
            Err(err) => {
                if matches!(err, HarnessError::DimensionMismatch { .. })
                    && self.options.update_baselines
                {
                    return self.accept_candidate(case, capture).await;
                }
                AttemptOutcome::Errored(err)
            }
        }
    }

    async fn accept_candidate(&self, case: &TestCase, capture: &Capture) -> AttemptOutcome {
        match self
            .store
            .accept(&case.name, &self.env, &capture.image)
            .await
        {
            Ok(path) => {
                self.log(&format!(
                    "case {}: baseline updated at {}",
                    case.name,
                    path.display()
                ));
                AttemptOutcome::Passed {
                    distance: None,
                    baseline_updated: true,
                }
            }
            Err(err) => AttemptOutcome::Errored(err),
        }
    }

    fn attempt_dir(&self, case: &TestCase, attempt: u32) -> PathBuf {
        self.options
            .artifacts_dir
            .join(sanitize_name(&case.name))
            .join(format!("attempt-{}", attempt))
    }

    fn skipped_report(&self, case: &TestCase) -> CaseReport {
        CaseReport {
            name: case.name.clone(),
            verdict: CaseVerdict::Skipped,
            attempts: 0,
            flaky: false,
            unstable: false,
            baseline_updated: false,
            distance: None,
            max_distance: case.max_distance.unwrap_or(self.options.diff.max_distance),
            error: None,
            capture_path: None,
            diff_path: None,
            elapsed_ms: 0,
        }
    }

    fn aborted_report(&self, suite: &Suite, err: HarnessError, start: Instant) -> RunReport {
        self.log(&format!("run aborted: {}", err));
        let cases: Vec<CaseReport> = suite
            .cases
            .iter()
            .map(|case| self.skipped_report(case))
            .collect();
        RunReport {
            version: VRT_OUTPUT_VERSION.to_string(),
            suite: suite.name.clone(),
            env: self.env.to_string(),
            summary: RunSummary::tally(&cases),
            cases,
            error: Some(err.to_payload()),
            elapsed_ms: start.elapsed().as_millis() as u64,
        }
    }

    fn log(&self, message: &str) {
        if let Some(cb) = &self.options.progress {
            cb(message);
        }
    }
}

fn report_is_internal(report: &CaseReport) -> bool {
    report
        .error
        .as_ref()
        .is_some_and(|payload| matches!(payload.category, ErrorCategory::Internal))
}

fn resolve_case_actions(suite: &Suite, case: &TestCase) -> Result<Vec<Action>> {
    case.actions
        .iter()
        .map(|action| match action {
            Action::Navigate { url, timeout } => Ok(Action::Navigate {
                url: suite.resolve_url(url)?,
                timeout: *timeout,
            }),
            other => Ok(other.clone()),
        })
        .collect()
}
