use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::ParseError;

/// Error taxonomy for the harness.
///
/// The first six variants are case-scoped: they fail the affected test case
/// and are recorded in its report entry. The remaining variants are
/// harness-internal; any of them aborts the whole run because subsequent
/// results could not be trusted.
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("Element not found for {locator} (step {step})")]
    ElementNotFound { locator: String, step: usize },

    #[error("Timed out after {waited_ms}ms: {what}")]
    Timeout { what: String, waited_ms: u64 },

    #[error("Injected script failed at step {step}: {message}")]
    ScriptError { message: String, step: usize },

    #[error("Capture scope {locator} is not capturable: {reason}")]
    ScopeNotVisible { locator: String, reason: String },

    #[error(
        "Image dimensions differ: baseline {}x{}, candidate {}x{}",
        baseline.0, baseline.1, candidate.0, candidate.1
    )]
    DimensionMismatch {
        baseline: (u32, u32),
        candidate: (u32, u32),
    },

    #[error("No baseline named '{name}' for environment '{env}'")]
    BaselineMissing { name: String, env: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] ParseError),

    #[error("Controller error (status: {status:?}): {message}")]
    Controller {
        status: Option<StatusCode>,
        message: String,
    },

    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl HarnessError {
    pub fn element_not_found(locator: impl Into<String>, step: usize) -> Self {
        HarnessError::ElementNotFound {
            locator: locator.into(),
            step,
        }
    }

    pub fn timeout(what: impl Into<String>, waited_ms: u64) -> Self {
        HarnessError::Timeout {
            what: what.into(),
            waited_ms,
        }
    }

    pub fn controller(status: Option<StatusCode>, message: impl Into<String>) -> Self {
        HarnessError::Controller {
            status,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        HarnessError::Internal(message.into())
    }

    /// True for errors that invalidate the whole run (exit code 2) rather
    /// than a single case.
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            HarnessError::Io(_)
                | HarnessError::Network(_)
                | HarnessError::InvalidUrl(_)
                | HarnessError::Controller { .. }
                | HarnessError::Image(_)
                | HarnessError::Serialization(_)
                | HarnessError::Config(_)
                | HarnessError::Internal(_)
        )
    }

    /// True for errors the retry budget may absorb. Everything else is a
    /// deterministic outcome and fails the case on the first attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, HarnessError::Timeout { .. })
    }

    pub fn to_payload(&self) -> ErrorPayload {
        match self {
            HarnessError::ElementNotFound { .. } => ErrorPayload::new(
                ErrorCategory::ElementNotFound,
                self.to_string(),
                "Check the locator against the rendered page; if the element appears late, raise the step timeout.",
            ),
            HarnessError::Timeout { .. } => ErrorPayload::new(
                ErrorCategory::Timeout,
                self.to_string(),
                "Raise [timeouts] in vrt.toml or give the case a retry budget if the page settles slowly.",
            ),
            HarnessError::ScriptError { .. } => ErrorPayload::new(
                ErrorCategory::ScriptError,
                self.to_string(),
                "Inspect the evaluate step's script; rerun with --verbose to see the page-side error.",
            ),
            HarnessError::ScopeNotVisible { .. } => ErrorPayload::new(
                ErrorCategory::ScopeNotVisible,
                self.to_string(),
                "Make sure the capture scope is visible and non-empty at capture time, adding actions to reveal it if needed.",
            ),
            HarnessError::DimensionMismatch { .. } => ErrorPayload::new(
                ErrorCategory::DimensionMismatch,
                self.to_string(),
                "Captures are never resized; if the viewport or layout changed on purpose, re-record with --update-baselines.",
            ),
            HarnessError::BaselineMissing { .. } => ErrorPayload::new(
                ErrorCategory::BaselineMissing,
                self.to_string(),
                "Run with --update-baselines to record the current capture as the baseline.",
            ),
            HarnessError::Io(e) => ErrorPayload::new(
                ErrorCategory::Internal,
                e.to_string(),
                "Check file paths/permissions for the baseline and artifact directories.",
            ),
            HarnessError::Network(e) => ErrorPayload::new(
                ErrorCategory::Network,
                e.to_string(),
                "Check the controller base URL is reachable and the test server is running.",
            ),
            HarnessError::InvalidUrl(e) => ErrorPayload::new(
                ErrorCategory::Config,
                e.to_string(),
                "Verify URL/format (e.g., https://example.com).",
            ),
            HarnessError::Controller { status, message } => ErrorPayload::new(
                ErrorCategory::Network,
                format!("Controller error (status {:?}): {}", status, message),
                "Check the test-environment controller is up and accepts the configured base URL.",
            ),
            HarnessError::Image(e) => ErrorPayload::new(
                ErrorCategory::Internal,
                e.to_string(),
                "Verify the baseline/capture files are readable PNG images.",
            ),
            HarnessError::Serialization(e) => ErrorPayload::new(
                ErrorCategory::Internal,
                e.to_string(),
                "Check suite/report serialization inputs; run with --verbose for details.",
            ),
            HarnessError::Config(msg) => {
                let lower = msg.to_ascii_lowercase();
                if lower.contains("playwright npm package is missing") {
                    ErrorPayload::new(
                        ErrorCategory::Config,
                        msg.to_string(),
                        "Install Playwright (e.g., `npm install playwright` and `npx playwright install chromium`).",
                    )
                } else if lower.contains("chromium executable") {
                    ErrorPayload::new(
                        ErrorCategory::Config,
                        msg.to_string(),
                        "Run `npx playwright install chromium` (or `playwright install chromium`) to download the browser.",
                    )
                } else if lower.contains("spawn playwright helper")
                    || lower.contains("node command")
                    || lower.contains("not found on path")
                {
                    ErrorPayload::new(
                        ErrorCategory::Config,
                        msg.to_string(),
                        "Install Node.js and ensure the node binary is on PATH; rerun after installing Playwright if needed.",
                    )
                } else if lower.contains("suite file") {
                    ErrorPayload::new(
                        ErrorCategory::Config,
                        msg.to_string(),
                        "Pass --suite with a path to a readable YAML suite file.",
                    )
                } else {
                    ErrorPayload::new(
                        ErrorCategory::Config,
                        msg.to_string(),
                        "Check flags/paths (e.g., --viewport WIDTHxHEIGHT) and vrt.toml values.",
                    )
                }
            }
            HarnessError::Internal(msg) => ErrorPayload::new(
                ErrorCategory::Internal,
                msg.to_string(),
                "Re-run with --verbose; file an issue if persistent.",
            ),
        }
    }
}

pub type Result<T> = std::result::Result<T, HarnessError>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCategory {
    ElementNotFound,
    Timeout,
    ScriptError,
    ScopeNotVisible,
    DimensionMismatch,
    BaselineMissing,
    Config,
    Network,
    Internal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    pub category: ErrorCategory,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,
}

impl ErrorPayload {
    pub fn new(category: ErrorCategory, message: String, remediation: impl Into<String>) -> Self {
        Self {
            category,
            message,
            remediation: Some(remediation.into()),
        }
    }
}
