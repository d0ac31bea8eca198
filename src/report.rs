use crate::error::ErrorPayload;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Schema version for run reports.
pub const VRT_OUTPUT_VERSION: &str = "0.1.0";

/// Verdict for one case after all attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CaseVerdict {
    Passed,
    Failed,
    /// Never ran because an earlier internal error aborted the run.
    Skipped,
}

/// Per-case entry in the run report.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseReport {
    pub name: String,
    pub verdict: CaseVerdict,
    /// Attempts consumed, including the final one.
    pub attempts: u32,
    /// Passed only after at least one failed attempt.
    pub flaky: bool,
    /// Final attempt's capture was taken before the page went quiet.
    pub unstable: bool,
    /// Baseline was written or replaced during this run.
    pub baseline_updated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance: Option<f64>,
    pub max_distance: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorPayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capture_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff_path: Option<PathBuf>,
    pub elapsed_ms: u64,
}

/// Aggregate counts over all cases in a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub total: u32,
    pub passed: u32,
    pub failed: u32,
    pub skipped: u32,
    pub flaky: u32,
}

impl RunSummary {
    /// Tallies verdicts from finished case reports.
    pub fn tally(cases: &[CaseReport]) -> Self {
        let mut summary = Self {
            total: cases.len() as u32,
            ..Self::default()
        };
        for case in cases {
            match case.verdict {
                CaseVerdict::Passed => summary.passed += 1,
                CaseVerdict::Failed => summary.failed += 1,
                CaseVerdict::Skipped => summary.skipped += 1,
            }
            if case.flaky {
                summary.flaky += 1;
            }
        }
        summary
    }
}

/// Top-level run report.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub version: String,
    pub suite: String,
    /// Environment signature the baselines were keyed under.
    pub env: String,
    pub summary: RunSummary,
    pub cases: Vec<CaseReport>,
    /// Error that aborted the run before all cases finished, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorPayload>,
    pub elapsed_ms: u64,
}

impl RunReport {
    /// True when every case passed and nothing aborted the run.
    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.summary.failed == 0 && self.summary.skipped == 0
    }
}
