//! Visual Regression Tester (VRT) Library
//!
//! A library for running scripted browser flows and comparing the resulting
//! screenshots against stored baselines. Suites are YAML files; captures are
//! taken by a Playwright-backed Node.js driver once the page has stopped
//! mutating; baselines are keyed by OS, browser, and viewport.
//!
//! # Module Overview
//!
//! - [`suite`] - YAML suite model (cases, actions, environment hooks)
//! - [`driver`] - Playwright-backed browser driver and capture sessions
//! - [`capture`] - Capture model and the pre-capture stability policy
//! - [`baseline`] - Baseline storage keyed by test name and environment
//! - [`diff`] - Pixel comparison and diff-image rendering
//! - [`runner`] - Case scheduling, retries, hooks, and report assembly
//! - [`controller`] - HTTP client for the test-environment controller
//! - [`config`] - `vrt.toml` configuration support
//! - [`report`] - JSON report schemas
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! use vrt_lib::{
//!     load_suite, BaselineStore, DriverOptions, EnvSignature, PageDriver, Runner,
//!     RunnerOptions, UnconfiguredController, Viewport,
//! };
//!
//! # async fn example() -> vrt_lib::Result<()> {
//! let suite = load_suite(Path::new("dashboard.yaml"))?;
//!
//! let driver = PageDriver::new(DriverOptions::default());
//! driver.preflight().await?;
//!
//! let runner = Runner::new(
//!     driver,
//!     Arc::new(BaselineStore::new("vrt-baselines")),
//!     Arc::new(UnconfiguredController),
//!     EnvSignature::detect("chromium", Viewport::default()),
//!     RunnerOptions::default(),
//! );
//! let report = runner.run(&suite).await;
//! println!("{} cases, success: {}", report.summary.total, report.is_success());
//! # Ok(())
//! # }
//! ```

pub mod action;
pub mod baseline;
pub mod capture;
pub mod config;
pub mod controller;
pub mod diff;
pub mod driver;
pub mod env;
pub mod error;
pub mod locator;
pub mod report;
pub mod runner;
pub mod suite;

pub use action::Action;
pub use baseline::{Baseline, BaselineStore};
pub use capture::{load_capture, Capture, CaptureTarget, StabilityPolicy};
pub use config::{
    BrowserConfig, ControllerConfig, HarnessConfig, PathConfig, RunnerConfig, TimeoutConfig,
    DEFAULT_CONFIG_FILE,
};
pub use controller::{ControlPlane, EnvController, UnconfiguredController};
pub use diff::{diff, DiffOptions, DiffResult};
// Driver module re-exports
pub use driver::{
    CasePlan, DriveOutcome, DriverOptions, PageDriver, StepTiming, DEFAULT_NAVIGATION_TIMEOUT,
    DEFAULT_PROCESS_TIMEOUT, DEFAULT_STEP_TIMEOUT,
};
pub use env::{EnvSignature, Viewport};
pub use error::{ErrorCategory, ErrorPayload, HarnessError, Result};
pub use locator::Locator;
// Report module re-exports
pub use report::{CaseReport, CaseVerdict, RunReport, RunSummary, VRT_OUTPUT_VERSION};
pub use runner::{CaseState, ProgressCallback, Runner, RunnerOptions};
pub use suite::{load_suite, EnvStep, Suite, TestCase};
