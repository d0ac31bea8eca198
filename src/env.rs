//! Viewport geometry and the environment signature used to key baselines.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1440,
            height: 900,
        }
    }
}

#[derive(Debug, Error)]
pub enum ViewportParseError {
    #[error("Invalid viewport format: expected WIDTHxHEIGHT (e.g., 1440x900)")]
    InvalidFormat,
    #[error("Invalid width: {0}")]
    InvalidWidth(String),
    #[error("Invalid height: {0}")]
    InvalidHeight(String),
    #[error("Width must be positive")]
    ZeroWidth,
    #[error("Height must be positive")]
    ZeroHeight,
}

impl FromStr for Viewport {
    type Err = ViewportParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('x').collect();
        if parts.len() != 2 {
            return Err(ViewportParseError::InvalidFormat);
        }

        let width: u32 = parts[0]
            .trim()
            .parse()
            .map_err(|_| ViewportParseError::InvalidWidth(parts[0].to_string()))?;

        let height: u32 = parts[1]
            .trim()
            .parse()
            .map_err(|_| ViewportParseError::InvalidHeight(parts[1].to_string()))?;

        if width == 0 {
            return Err(ViewportParseError::ZeroWidth);
        }
        if height == 0 {
            return Err(ViewportParseError::ZeroHeight);
        }

        Ok(Viewport { width, height })
    }
}

impl std::fmt::Display for Viewport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Disambiguates baselines across OS/browser/viewport combinations.
///
/// Rendered as `{os}-{browser}-{width}x{height}` and used verbatim as the
/// baseline file stem, so every component must stay path-safe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvSignature {
    pub os: String,
    pub browser: String,
    pub viewport: Viewport,
}

impl EnvSignature {
    /// Builds a signature for the host OS and the given browser/viewport.
    pub fn detect(browser: impl Into<String>, viewport: Viewport) -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            browser: browser.into(),
            viewport,
        }
    }
}

impl std::fmt::Display for EnvSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}-{}", self.os, self.browser, self.viewport)
    }
}

#[derive(Debug, Error)]
#[error("Invalid environment signature: expected os-browser-WIDTHxHEIGHT (e.g., linux-chromium-1440x900)")]
pub struct EnvSignatureParseError;

impl FromStr for EnvSignature {
    type Err = EnvSignatureParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.splitn(3, '-').collect();
        if parts.len() != 3 {
            return Err(EnvSignatureParseError);
        }
        let viewport = parts[2]
            .parse::<Viewport>()
            .map_err(|_| EnvSignatureParseError)?;
        if parts[0].is_empty() || parts[1].is_empty() {
            return Err(EnvSignatureParseError);
        }
        Ok(EnvSignature {
            os: parts[0].to_string(),
            browser: parts[1].to_string(),
            viewport,
        })
    }
}
