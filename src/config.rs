//! Harness configuration loaded from `vrt.toml`.
//!
//! Every section is optional and falls back to the same defaults the
//! driver, diff, and runner use, so an absent file is a valid config.
//! CLI flags override these values; that merge lives in the binary's
//! settings module.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::capture::StabilityPolicy;
use crate::diff::DiffOptions;
use crate::driver::{DEFAULT_NAVIGATION_TIMEOUT, DEFAULT_PROCESS_TIMEOUT, DEFAULT_STEP_TIMEOUT};
use crate::env::Viewport;
use crate::error::{HarnessError, Result};

/// File name probed in the working directory when no `--config` is given.
pub const DEFAULT_CONFIG_FILE: &str = "vrt.toml";

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct HarnessConfig {
    /// Browser window size, written as `WIDTHxHEIGHT`.
    #[serde(with = "viewport_string")]
    pub viewport: Viewport,
    pub browser: BrowserConfig,
    /// Quiet period the driver waits out before every capture.
    pub stability: StabilityPolicy,
    pub timeouts: TimeoutConfig,
    pub diff: DiffOptions,
    pub paths: PathConfig,
    pub runner: RunnerConfig,
    pub controller: ControllerConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct BrowserConfig {
    /// Engine the driver launches (chromium, firefox, webkit).
    pub name: String,
    /// Command used to spawn the Node.js driver process.
    pub node_command: String,
    pub headless: bool,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            name: "chromium".to_string(),
            node_command: "node".to_string(),
            headless: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct TimeoutConfig {
    /// Budget for each navigate step.
    #[serde(with = "humantime_serde")]
    pub navigation: Duration,
    /// Budget for each interaction step (click, moveTo, typeText, evaluate).
    #[serde(with = "humantime_serde")]
    pub step: Duration,
    /// Hard wall for one driver process; hitting it kills the browser.
    #[serde(with = "humantime_serde")]
    pub process: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            navigation: DEFAULT_NAVIGATION_TIMEOUT,
            step: DEFAULT_STEP_TIMEOUT,
            process: DEFAULT_PROCESS_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct PathConfig {
    /// Root of the baseline tree, `{root}/{test}/{env}.png`.
    pub baseline_root: PathBuf,
    /// Where per-attempt captures and diff images land.
    pub artifacts_dir: PathBuf,
}

impl Default for PathConfig {
    fn default() -> Self {
        Self {
            baseline_root: PathBuf::from("vrt-baselines"),
            artifacts_dir: PathBuf::from("vrt-artifacts"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct RunnerConfig {
    /// Cases allowed to run concurrently.
    pub workers: usize,
    /// Retry budget applied to every case, overriding per-case values.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retries: Option<u32>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            retries: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct ControllerConfig {
    /// Test-environment controller endpoint. Suites with setup/teardown
    /// steps refuse to run without one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            request_timeout: Duration::from_secs(15),
        }
    }
}

impl HarnessConfig {
    /// Loads from an explicit path, or from `./vrt.toml` when that file
    /// exists, or falls back to defaults. An explicit path must exist.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::from_file(p),
            None => {
                let fallback = Path::new(DEFAULT_CONFIG_FILE);
                if fallback.exists() {
                    Self::from_file(fallback)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            HarnessError::Config(format!("Failed to read config {}: {}", path.display(), e))
        })?;
        toml::from_str(&raw).map_err(|e| {
            HarnessError::Config(format!("Failed to parse config {}: {}", path.display(), e))
        })
    }

    /// Rejects values that would make a run meaningless.
    pub fn validate(&self) -> Result<()> {
        if self.runner.workers == 0 {
            return Err(HarnessError::Config(
                "runner.workers must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.diff.pixel_threshold) {
            return Err(HarnessError::Config(format!(
                "diff.pixel-threshold must be within 0..=1, got {}",
                self.diff.pixel_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.diff.max_distance) {
            return Err(HarnessError::Config(format!(
                "diff.max-distance must be within 0..=1, got {}",
                self.diff.max_distance
            )));
        }
        if self.stability.quiet_period > self.stability.timeout {
            return Err(HarnessError::Config(format!(
                "stability.quiet-period ({:?}) exceeds stability.timeout ({:?})",
                self.stability.quiet_period, self.stability.timeout
            )));
        }
        if self.browser.node_command.trim().is_empty() {
            return Err(HarnessError::Config(
                "browser.node-command must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

mod viewport_string {
    use super::Viewport;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        viewport: &Viewport,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&viewport.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Viewport, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse::<Viewport>().map_err(serde::de::Error::custom)
    }
}
