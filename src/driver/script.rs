//! Playwright integration for scripted page sessions.
//!
//! This module contains the inline driver script, the wire types exchanged
//! with it, error mapping, and availability checks for Node.js and Playwright.

use crate::action::Action;
use crate::capture::{CaptureTarget, StabilityPolicy};
use crate::error::{HarnessError, Result};
use crate::locator::Locator;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use super::session::DriverOptions;

/// Driver script executed via `node -e`.
///
/// The script reads one JSON plan from stdin, replays its steps against a
/// fresh browser context, waits for the page to go quiet, writes the
/// screenshot to the path named in the plan, and prints one JSON document
/// to stdout. Failures are printed to stderr with a machine-readable `kind`.
pub(crate) const DRIVER_SCRIPT: &str = r#"
const fs = require('fs');

class StepFailure extends Error {
  constructor(kind, message, extra) {
    super(message);
    this.kind = kind;
    Object.assign(this, extra || {});
  }
}

function describeLocator(locator) {
  if (locator.css !== undefined) return 'css=' + locator.css;
  if (locator.text !== undefined) return 'text=' + locator.text;
  if (locator.role !== undefined) return 'role=' + locator.role;
  return JSON.stringify(locator);
}

function describeStep(step) {
  if (step.locator) return step.type + ' ' + describeLocator(step.locator);
  if (step.url) return step.type + ' ' + step.url;
  return step.type;
}

function resolveTarget(page, locator) {
  if (locator.css !== undefined) return page.locator(locator.css);
  if (locator.text !== undefined) return page.getByText(locator.text);
  if (locator.role !== undefined) return page.getByRole(locator.role);
  throw new StepFailure('internal', 'Unsupported locator: ' + JSON.stringify(locator));
}

async function locate(page, locator, timeoutMs, index) {
  const target = resolveTarget(page, locator).first();
  try {
    await target.waitFor({ state: 'attached', timeout: timeoutMs });
  } catch (err) {
    throw new StepFailure('element-not-found', 'No element matched ' + describeLocator(locator), {
      step: index,
      locator: describeLocator(locator),
      waitedMs: timeoutMs
    });
  }
  return target;
}

async function runStep(page, step, index) {
  switch (step.type) {
    case 'navigate':
      await page.goto(step.url, { waitUntil: 'load', timeout: step.timeoutMs });
      return;
    case 'click': {
      const target = await locate(page, step.locator, step.timeoutMs, index);
      await target.click({ timeout: step.timeoutMs });
      return;
    }
    case 'move-to': {
      const target = await locate(page, step.locator, step.timeoutMs, index);
      await target.hover({ timeout: step.timeoutMs });
      if (step.pauseMs) await page.waitForTimeout(step.pauseMs);
      return;
    }
    case 'type-text': {
      const target = await locate(page, step.locator, step.timeoutMs, index);
      await target.type(step.text, { timeout: step.timeoutMs });
      return;
    }
    case 'evaluate':
      try {
        const fn = new Function('args', step.script);
        await page.evaluate(fn, step.args === undefined ? null : step.args);
      } catch (err) {
        const message = err && err.message ? err.message : String(err);
        throw new StepFailure('script-error', message, { step: index });
      }
      if (step.pauseMs) await page.waitForTimeout(step.pauseMs);
      return;
    default:
      throw new StepFailure('internal', 'Unsupported step type: ' + step.type, { step: index });
  }
}

async function waitForQuiet(page, network, quietMs, timeoutMs) {
  const deadline = Date.now() + timeoutMs;
  for (;;) {
    const lastMutation = await page.evaluate(() => window.__vrtLastMutation || 0).catch(() => 0);
    const lastActivity = Math.max(lastMutation, network.lastActivity);
    if (network.inflight === 0 && Date.now() - lastActivity >= quietMs) return false;
    if (Date.now() >= deadline) return true;
    await page.waitForTimeout(Math.min(50, quietMs));
  }
}

async function captureScreenshot(page, capture) {
  if (capture.scope) {
    const described = describeLocator(capture.scope);
    const matches = resolveTarget(page, capture.scope);
    if (await matches.count() === 0) {
      throw new StepFailure('scope-not-visible', 'Capture scope matched no elements', { locator: described });
    }
    const target = matches.first();
    if (!(await target.isVisible())) {
      throw new StepFailure('scope-not-visible', 'Capture scope is hidden', { locator: described });
    }
    const box = await target.boundingBox();
    if (!box || box.width < 1 || box.height < 1) {
      throw new StepFailure('scope-not-visible', 'Capture scope has an empty bounding box', { locator: described });
    }
    await target.screenshot({ path: capture.path });
  } else {
    await page.screenshot({ path: capture.path, fullPage: false });
  }
}

async function run() {
  const plan = JSON.parse(fs.readFileSync(0, 'utf8'));
  let browser;
  let currentStep = null;
  try {
    const playwright = require('playwright');
    const engine = playwright[plan.browser];
    if (!engine) {
      throw new StepFailure('internal', 'Unsupported browser engine: ' + plan.browser);
    }
    browser = await engine.launch({ headless: plan.headless });
    const context = await browser.newContext({ viewport: plan.viewport });
    const page = await context.newPage();

    const network = { inflight: 0, lastActivity: Date.now() };
    page.on('request', () => { network.inflight += 1; network.lastActivity = Date.now(); });
    const settle = () => { network.inflight = Math.max(0, network.inflight - 1); network.lastActivity = Date.now(); };
    page.on('requestfinished', settle);
    page.on('requestfailed', settle);

    await page.addInitScript(() => {
      window.__vrtLastMutation = Date.now();
      const observer = new MutationObserver(() => { window.__vrtLastMutation = Date.now(); });
      const start = () => observer.observe(document.documentElement, {
        subtree: true, childList: true, attributes: true, characterData: true
      });
      if (document.documentElement) start(); else document.addEventListener('DOMContentLoaded', start);
    });

    const timings = [];
    for (let i = 0; i < plan.steps.length; i += 1) {
      currentStep = i;
      const step = plan.steps[i];
      const started = Date.now();
      try {
        await runStep(page, step, i);
      } catch (err) {
        if (err instanceof StepFailure) throw err;
        if (err && err.name === 'TimeoutError') {
          throw new StepFailure('timeout', describeStep(step) + ' did not complete in time', {
            step: i,
            waitedMs: step.timeoutMs || 0
          });
        }
        const message = err && err.message ? err.message : String(err);
        throw new StepFailure('script-error', message, { step: i });
      }
      timings.push({ index: i, elapsedMs: Date.now() - started });
    }
    currentStep = null;

    const unstable = await waitForQuiet(page, network, plan.stability.quietMs, plan.stability.timeoutMs);
    await captureScreenshot(page, plan.capture);

    console.log(JSON.stringify({ status: 'ok', unstable, steps: timings }));
  } catch (err) {
    const failure = {
      status: 'error',
      kind: err instanceof StepFailure ? err.kind : (err && err.name === 'TimeoutError' ? 'timeout' : 'internal'),
      message: err && err.message ? err.message : String(err)
    };
    if (err && err.step !== undefined) failure.step = err.step;
    else if (currentStep !== null) failure.step = currentStep;
    if (err && err.locator !== undefined) failure.locator = err.locator;
    if (err && err.waitedMs !== undefined) failure.waitedMs = err.waitedMs;
    console.error(JSON.stringify(failure));
    process.exitCode = 1;
  } finally {
    if (browser) {
      await browser.close();
    }
  }
}

run();
"#;

/// Timeout for checking node/playwright availability.
pub(crate) const NODE_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// Script to check if Playwright is installed.
const PLAYWRIGHT_CHECK_SCRIPT: &str = "require('playwright'); process.stdout.write('ok');";

/// Plan document piped to the driver script over stdin.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WirePlan<'a> {
    pub browser: &'a str,
    pub headless: bool,
    pub viewport: crate::env::Viewport,
    pub steps: Vec<WireStep<'a>>,
    pub capture: WireCapture<'a>,
    pub stability: WireStability,
}

/// One step of the plan, with timeouts resolved to milliseconds.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub(crate) enum WireStep<'a> {
    #[serde(rename_all = "camelCase")]
    Navigate { url: &'a str, timeout_ms: u64 },
    #[serde(rename_all = "camelCase")]
    Click { locator: &'a Locator, timeout_ms: u64 },
    #[serde(rename_all = "camelCase")]
    MoveTo {
        locator: &'a Locator,
        timeout_ms: u64,
        pause_ms: u64,
    },
    #[serde(rename_all = "camelCase")]
    TypeText {
        locator: &'a Locator,
        text: &'a str,
        timeout_ms: u64,
    },
    #[serde(rename_all = "camelCase")]
    Evaluate {
        script: &'a str,
        #[serde(skip_serializing_if = "Option::is_none")]
        args: Option<&'a serde_json::Value>,
        pause_ms: u64,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WireCapture<'a> {
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<&'a Locator>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WireStability {
    pub quiet_ms: u64,
    pub timeout_ms: u64,
}

/// Success document printed by the driver script on stdout.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DriverOutput {
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub unstable: bool,
    #[serde(default)]
    pub steps: Vec<StepTiming>,
}

/// Failure document printed by the driver script on stderr.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DriverFailure {
    pub status: String,
    #[serde(default)]
    pub kind: Option<String>,
    pub message: String,
    #[serde(default)]
    pub step: Option<usize>,
    #[serde(default)]
    pub locator: Option<String>,
    #[serde(default)]
    pub waited_ms: Option<u64>,
}

/// Wall-clock timing for one executed step.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepTiming {
    pub index: usize,
    pub elapsed_ms: u64,
}

/// Serializes the plan for one page session.
pub(crate) fn encode_plan(
    options: &DriverOptions,
    actions: &[Action],
    capture: &CaptureTarget,
    capture_path: &Path,
) -> Result<String> {
    let steps = actions
        .iter()
        .map(|action| wire_step(action, options))
        .collect();
    let plan = WirePlan {
        browser: &options.browser,
        headless: options.headless,
        viewport: options.viewport,
        steps,
        capture: WireCapture {
            path: capture_path.to_string_lossy().to_string(),
            scope: capture.scope.as_ref(),
        },
        stability: WireStability {
            quiet_ms: duration_ms(options.stability.quiet_period),
            timeout_ms: duration_ms(options.stability.timeout),
        },
    };
    Ok(serde_json::to_string(&plan)?)
}

fn wire_step<'a>(action: &'a Action, options: &DriverOptions) -> WireStep<'a> {
    match action {
        Action::Navigate { url, timeout } => WireStep::Navigate {
            url,
            timeout_ms: duration_ms(timeout.unwrap_or(options.navigation_timeout)),
        },
        Action::Click { locator, timeout } => WireStep::Click {
            locator,
            timeout_ms: duration_ms(timeout.unwrap_or(options.step_timeout)),
        },
        Action::MoveTo { locator, pause } => WireStep::MoveTo {
            locator,
            timeout_ms: duration_ms(options.step_timeout),
            pause_ms: duration_ms(pause.unwrap_or(Duration::ZERO)),
        },
        Action::TypeText { locator, text } => WireStep::TypeText {
            locator,
            text,
            timeout_ms: duration_ms(options.step_timeout),
        },
        Action::Evaluate {
            script,
            args,
            pause,
        } => WireStep::Evaluate {
            script,
            args: args.as_ref(),
            pause_ms: duration_ms(pause.unwrap_or(Duration::ZERO)),
        },
    }
}

fn duration_ms(duration: Duration) -> u64 {
    duration.as_millis().min(u64::MAX as u128) as u64
}

/// Maps a spawn error to an appropriate HarnessError.
pub(crate) fn map_spawn_error(err: io::Error, command: &str) -> HarnessError {
    if err.kind() == io::ErrorKind::NotFound {
        HarnessError::Config(format!(
            "Unable to spawn the page driver; '{}' was not found on PATH",
            command
        ))
    } else {
        HarnessError::Io(err)
    }
}

/// Maps driver stderr output to an appropriate HarnessError.
///
/// Structured failures carry a `kind` naming one of the step-level error
/// categories; anything else is treated as an environment or harness problem.
pub(crate) fn map_driver_error(status_text: impl Into<String>, stderr: &str) -> HarnessError {
    if let Ok(failure) = serde_json::from_str::<DriverFailure>(stderr) {
        return map_driver_failure(failure);
    }

    if stderr
        .to_ascii_lowercase()
        .contains("cannot find module 'playwright'")
    {
        return HarnessError::Config(
            "Playwright npm package is missing; install with `npm install playwright`.".to_string(),
        );
    }

    HarnessError::internal(format!(
        "Driver exited with status {}: {}",
        status_text.into(),
        stderr.trim()
    ))
}

/// Maps a structured driver failure to the matching error variant.
pub(crate) fn map_driver_failure(failure: DriverFailure) -> HarnessError {
    let step = failure.step.unwrap_or(0);
    let locator = failure
        .locator
        .unwrap_or_else(|| "<unknown locator>".to_string());
    match failure.kind.as_deref() {
        Some("element-not-found") => HarnessError::ElementNotFound { locator, step },
        Some("timeout") => HarnessError::Timeout {
            what: failure.message,
            waited_ms: failure.waited_ms.unwrap_or(0),
        },
        Some("script-error") => HarnessError::ScriptError {
            message: failure.message,
            step,
        },
        Some("scope-not-visible") => HarnessError::ScopeNotVisible {
            locator,
            reason: failure.message,
        },
        _ => {
            if failure
                .message
                .to_ascii_lowercase()
                .contains("cannot find module 'playwright'")
            {
                HarnessError::Config(
                    "Playwright npm package is missing; install with `npm install playwright`."
                        .to_string(),
                )
            } else {
                HarnessError::internal(format!(
                    "Driver failed (status {}): {}",
                    failure.status, failure.message
                ))
            }
        }
    }
}

/// Checks if mock captures are enabled via environment variables.
pub(crate) fn is_mock_capture_enabled() -> bool {
    mock_capture_dir().is_some()
}

/// Directory holding pre-rendered captures, when mock mode is active.
pub(crate) fn mock_capture_dir() -> Option<PathBuf> {
    std::env::var_os("VRT_MOCK_CAPTURE_DIR").map(PathBuf::from)
}

/// Whether mock captures should be flagged as unstable.
pub(crate) fn is_mock_unstable() -> bool {
    std::env::var("VRT_MOCK_UNSTABLE").is_ok_and(|value| value == "1")
}

/// Ensures Node.js is available on the system.
pub(crate) async fn ensure_node_available(node_command: &str) -> Result<()> {
    let mut cmd = Command::new(node_command);
    cmd.arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null());

    let status = tokio::time::timeout(NODE_CHECK_TIMEOUT, cmd.status())
        .await
        .map_err(|_| {
            HarnessError::Config(format!(
                "Timed out checking node availability after {:?}",
                NODE_CHECK_TIMEOUT
            ))
        })?
        .map_err(|err| map_spawn_error(err, node_command))?;

    if !status.success() {
        return Err(HarnessError::Config(format!(
            "Node command {:?} is not available (exit {})",
            node_command, status
        )));
    }

    Ok(())
}

/// Ensures the Playwright npm package is installed.
pub(crate) async fn ensure_playwright_available(node_command: &str) -> Result<()> {
    if is_mock_capture_enabled() {
        return Ok(());
    }

    let mut cmd = Command::new(node_command);
    cmd.arg("-e")
        .arg(PLAYWRIGHT_CHECK_SCRIPT)
        .stdout(Stdio::null())
        .stderr(Stdio::piped());

    let output = tokio::time::timeout(NODE_CHECK_TIMEOUT, cmd.output())
        .await
        .map_err(|_| {
            HarnessError::Config(format!(
                "Timed out checking Playwright availability after {:?}",
                NODE_CHECK_TIMEOUT
            ))
        })?
        .map_err(|err| map_spawn_error(err, node_command))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(map_driver_error(format!("{:?}", output.status), &stderr));
    }

    Ok(())
}
