//! Page driver for coordinating scripted browser sessions.
//!
//! This module provides the `PageDriver` struct for replaying a case's
//! action plan in a headless browser, with semaphore-based limiting of
//! concurrent sessions.

use crate::action::Action;
use crate::capture::{CaptureTarget, StabilityPolicy};
use crate::env::Viewport;
use crate::error::{HarnessError, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::sync::Semaphore;
use tokio::time::timeout;

use super::script::{
    encode_plan, ensure_node_available, ensure_playwright_available, is_mock_capture_enabled,
    is_mock_unstable, map_driver_error, map_spawn_error, mock_capture_dir, DriverOutput,
    StepTiming, DRIVER_SCRIPT,
};

/// Default timeout for page navigation.
pub const DEFAULT_NAVIGATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Default timeout for element interactions.
pub const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(10);

/// Default timeout for an entire driver process.
pub const DEFAULT_PROCESS_TIMEOUT: Duration = Duration::from_secs(90);

/// Configuration options for page sessions.
#[derive(Debug, Clone)]
pub struct DriverOptions {
    /// The Node.js command to use (default: "node").
    pub node_command: String,
    /// Browser engine to launch: "chromium", "firefox" or "webkit".
    pub browser: String,
    /// Viewport dimensions for the browser.
    pub viewport: Viewport,
    /// Whether to run in headless mode.
    pub headless: bool,
    /// Timeout for page navigation.
    pub navigation_timeout: Duration,
    /// Timeout for element interactions.
    pub step_timeout: Duration,
    /// Timeout for the entire driver process.
    pub process_timeout: Duration,
    /// Quiet-window policy applied before every capture.
    pub stability: StabilityPolicy,
    /// Maximum number of concurrent page sessions.
    pub max_concurrent_sessions: usize,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            node_command: "node".to_string(),
            browser: "chromium".to_string(),
            viewport: Viewport::default(),
            headless: true,
            navigation_timeout: DEFAULT_NAVIGATION_TIMEOUT,
            step_timeout: DEFAULT_STEP_TIMEOUT,
            process_timeout: DEFAULT_PROCESS_TIMEOUT,
            stability: StabilityPolicy::default(),
            max_concurrent_sessions: 1,
        }
    }
}

/// Everything the driver needs to replay one attempt of a case.
#[derive(Debug, Clone)]
pub struct CasePlan {
    /// Case name; also the lookup key for mock captures.
    pub name: String,
    /// Attempt number, starting at 1.
    pub attempt: u32,
    /// Steps to replay in declared order.
    pub actions: Vec<Action>,
    /// What to screenshot once the page is quiet.
    pub capture: CaptureTarget,
    /// Where the screenshot lands.
    pub capture_path: PathBuf,
}

/// Result of replaying a plan.
#[derive(Debug, Clone)]
pub struct DriveOutcome {
    /// Path to the saved capture.
    pub capture_path: PathBuf,
    /// Capture width in pixels.
    pub width: u32,
    /// Capture height in pixels.
    pub height: u32,
    /// True when the quiet window never arrived before its deadline.
    pub unstable: bool,
    /// Per-step timings reported by the driver.
    pub steps: Vec<StepTiming>,
    /// Time taken for the whole session.
    pub elapsed: Duration,
}

/// Replays case plans in headless browser sessions, limiting concurrency
/// with a semaphore.
#[derive(Debug, Clone)]
pub struct PageDriver {
    options: DriverOptions,
    semaphore: Arc<Semaphore>,
}

impl PageDriver {
    /// Creates a new PageDriver with the given options.
    pub fn new(options: DriverOptions) -> Self {
        let permits = options.max_concurrent_sessions.max(1);
        Self {
            options,
            semaphore: Arc::new(Semaphore::new(permits)),
        }
    }

    /// Options this driver was built with.
    pub fn options(&self) -> &DriverOptions {
        &self.options
    }

    /// Verifies node and Playwright are usable before any session starts.
    /// Mock capture mode spawns no process, so it skips both checks.
    pub async fn preflight(&self) -> Result<()> {
        if is_mock_capture_enabled() {
            return Ok(());
        }
        ensure_node_available(&self.options.node_command).await?;
        ensure_playwright_available(&self.options.node_command).await
    }

    /// Replays one case attempt and captures its screenshot.
    pub async fn run_case(&self, plan: &CasePlan) -> Result<DriveOutcome> {
        if let Some(dir) = mock_capture_dir() {
            return self.run_mock_capture(&dir, plan);
        }

        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| HarnessError::internal("Driver session pool closed"))?;

        self.run_driver(plan).await
    }

    async fn run_driver(&self, plan: &CasePlan) -> Result<DriveOutcome> {
        if let Some(parent) = plan.capture_path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                HarnessError::internal(format!("Failed to create capture dir: {}", e))
            })?;
        }

        let encoded = encode_plan(
            &self.options,
            &plan.actions,
            &plan.capture,
            &plan.capture_path,
        )?;

        let mut cmd = Command::new(&self.options.node_command);
        cmd.arg("-e")
            .arg(DRIVER_SCRIPT)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let start = Instant::now();
        let mut child = cmd
            .spawn()
            .map_err(|err| map_spawn_error(err, &self.options.node_command))?;

        let stdout_pipe = child.stdout.take();
        let stderr_pipe = child.stderr.take();

        let stdout_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            if let Some(mut out) = stdout_pipe {
                let _ = out.read_to_end(&mut buf).await;
            }
            buf
        });

        let stderr_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            if let Some(mut err) = stderr_pipe {
                let _ = err.read_to_end(&mut buf).await;
            }
            buf
        });

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(encoded.as_bytes()).await?;
            stdin.shutdown().await?;
        }

        let status = match timeout(self.options.process_timeout, child.wait()).await {
            Ok(Ok(status)) => status,
            Ok(Err(err)) => return Err(HarnessError::Io(err)),
            Err(_) => {
                let _ = child.kill().await;
                let _ = child.wait().await;
                return Err(HarnessError::timeout(
                    format!("driver process for '{}'", plan.name),
                    self.options.process_timeout.as_millis() as u64,
                ));
            }
        };

        let stdout = stdout_task.await.unwrap_or_else(|_| Vec::new());
        let stderr = stderr_task.await.unwrap_or_else(|_| Vec::new());

        if !status.success() {
            let stderr = String::from_utf8_lossy(&stderr);
            return Err(map_driver_error(status.to_string(), &stderr));
        }

        let stdout = String::from_utf8_lossy(&stdout);
        let output: DriverOutput = serde_json::from_str(&stdout).map_err(|_| {
            HarnessError::internal(format!("Unexpected driver output: {}", stdout.trim()))
        })?;

        if output.status != "ok" {
            let detail = output.message.as_deref().unwrap_or("no additional details");
            return Err(HarnessError::internal(format!(
                "Driver returned non-ok status {}: {}",
                output.status, detail
            )));
        }

        let (width, height) = image::image_dimensions(&plan.capture_path)?;

        Ok(DriveOutcome {
            capture_path: plan.capture_path.clone(),
            width,
            height,
            unstable: output.unstable,
            steps: output.steps,
            elapsed: start.elapsed(),
        })
    }

    /// Serves a pre-rendered capture instead of launching a browser.
    ///
    /// Looks for `{name}.attempt{n}.png` first so tests can vary what a
    /// retry attempt sees, then falls back to `{name}.png`.
    fn run_mock_capture(&self, dir: &Path, plan: &CasePlan) -> Result<DriveOutcome> {
        let start = Instant::now();
        let key = crate::baseline::sanitize_name(&plan.name);
        let candidates = [
            dir.join(format!("{}.attempt{}.png", key, plan.attempt)),
            dir.join(format!("{}.png", key)),
        ];
        let source = candidates
            .iter()
            .find(|path| path.is_file())
            .ok_or_else(|| {
                HarnessError::internal(format!(
                    "Mock capture for '{}' not found under {}",
                    plan.name,
                    dir.display()
                ))
            })?;

        if let Some(parent) = plan.capture_path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                HarnessError::internal(format!("Failed to create capture dir: {}", e))
            })?;
        }
        fs::copy(source, &plan.capture_path)?;
        let (width, height) = image::image_dimensions(&plan.capture_path)?;

        Ok(DriveOutcome {
            capture_path: plan.capture_path.clone(),
            width,
            height,
            unstable: is_mock_unstable(),
            steps: Vec::new(),
            elapsed: start.elapsed(),
        })
    }
}
