//! Capture model and the stability policy applied before screenshots.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use image::RgbaImage;
use serde::{Deserialize, Serialize};

use crate::env::EnvSignature;
use crate::error::{HarnessError, Result};
use crate::locator::Locator;

/// Quiet-period policy the driver enforces before taking a screenshot: no
/// DOM mutations and no in-flight network requests for `quiet_period`,
/// bounded by `timeout`. Exceeding the bound still captures but marks the
/// result unstable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct StabilityPolicy {
    #[serde(with = "humantime_serde")]
    pub quiet_period: Duration,
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for StabilityPolicy {
    fn default() -> Self {
        Self {
            quiet_period: Duration::from_millis(250),
            timeout: Duration::from_secs(8),
        }
    }
}

/// What a case screenshots: the whole viewport, or one visible element.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CaptureTarget {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<Locator>,
}

impl CaptureTarget {
    pub fn viewport() -> Self {
        Self { scope: None }
    }

    pub fn scoped(locator: Locator) -> Self {
        Self {
            scope: Some(locator),
        }
    }
}

/// A screenshot taken by the driver, decoded for diffing. Immutable once
/// taken.
#[derive(Debug, Clone)]
pub struct Capture {
    pub image: RgbaImage,
    pub taken_at: SystemTime,
    pub env: EnvSignature,
    pub unstable: bool,
    /// Artifact file the image was decoded from.
    pub path: PathBuf,
}

impl Capture {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Decodes a driver-written screenshot into a [`Capture`].
pub fn load_capture(path: &Path, env: EnvSignature, unstable: bool) -> Result<Capture> {
    if !path.exists() {
        return Err(HarnessError::internal(format!(
            "Capture file missing after driver run: {}",
            path.display()
        )));
    }
    let image = image::open(path)?.to_rgba8();
    Ok(Capture {
        image,
        taken_at: SystemTime::now(),
        env,
        unstable,
        path: path.to_path_buf(),
    })
}
