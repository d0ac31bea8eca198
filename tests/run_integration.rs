//! End-to-end runs through the `vrt` binary with pre-rendered captures.
//!
//! `VRT_MOCK_CAPTURE_DIR` replaces the browser driver with PNG fixtures, so
//! these tests exercise the full pipeline (suite parsing, scheduling,
//! baseline store, diff, report) without Node or Playwright installed.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use image::{Rgba, RgbaImage};
use serde_json::Value;
use tempfile::TempDir;

const GREEN: [u8; 4] = [12, 190, 60, 255];
const RED: [u8; 4] = [200, 30, 30, 255];

fn write_png(path: &Path, width: u32, height: u32, color: [u8; 4]) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    RgbaImage::from_pixel(width, height, Rgba(color))
        .save(path)
        .unwrap();
}

fn write_suite(dir: &Path, yaml: &str) {
    fs::write(dir.join("suite.yaml"), yaml).unwrap();
}

fn single_case_suite(name: &str) -> String {
    format!(
        r#"
name: dashboard
base-url: "http://localhost:8080/"
cases:
  - name: {name}
    actions:
      - navigate: {{ url: "?module=Widgetize&action=index" }}
"#
    )
}

/// Runs `vrt run` inside `dir` with mock captures served from `mock_dir`.
fn vrt_run(dir: &Path, mock_dir: &Path, extra: &[&str]) -> Output {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_vrt"));
    cmd.current_dir(dir)
        .env("VRT_MOCK_CAPTURE_DIR", mock_dir)
        .env_remove("VRT_MOCK_UNSTABLE")
        .args([
            "run",
            "--suite",
            "suite.yaml",
            "--baseline-dir",
            "baselines",
            "--artifacts-dir",
            "artifacts",
            "--format",
            "json",
        ])
        .args(extra);
    cmd.output().expect("failed to run vrt binary")
}

fn parse_report(output: &Output) -> Value {
    serde_json::from_slice(&output.stdout).unwrap_or_else(|e| {
        panic!(
            "stdout was not a JSON report ({e}): {}",
            String::from_utf8_lossy(&output.stdout)
        )
    })
}

fn exit_code(output: &Output) -> i32 {
    output.status.code().expect("process terminated by signal")
}

#[test]
fn update_baselines_records_capture_and_passes() {
    let dir = TempDir::new().unwrap();
    let mocks = TempDir::new().unwrap();
    write_suite(dir.path(), &single_case_suite("loaded"));
    write_png(&mocks.path().join("loaded.png"), 4, 4, GREEN);

    let output = vrt_run(dir.path(), mocks.path(), &["--update-baselines"]);
    let report = parse_report(&output);

    assert_eq!(exit_code(&output), 0, "report: {report}");
    assert_eq!(report["summary"]["passed"], 1);
    assert_eq!(report["cases"][0]["verdict"], "passed");
    assert_eq!(report["cases"][0]["baselineUpdated"], true);

    let baseline_case_dir = dir.path().join("baselines").join("loaded");
    let entries: Vec<_> = fs::read_dir(&baseline_case_dir)
        .expect("baseline case dir should exist")
        .collect();
    assert_eq!(entries.len(), 1, "expected one baseline per environment");
}

#[test]
fn matching_capture_passes_and_cleans_artifacts() {
    let dir = TempDir::new().unwrap();
    let mocks = TempDir::new().unwrap();
    write_suite(dir.path(), &single_case_suite("loaded"));
    write_png(&mocks.path().join("loaded.png"), 4, 4, GREEN);

    let seed = vrt_run(dir.path(), mocks.path(), &["--update-baselines"]);
    assert_eq!(exit_code(&seed), 0);

    let output = vrt_run(dir.path(), mocks.path(), &[]);
    let report = parse_report(&output);

    assert_eq!(exit_code(&output), 0, "report: {report}");
    assert_eq!(report["cases"][0]["verdict"], "passed");
    let distance = report["cases"][0]["distance"].as_f64().unwrap();
    assert!(distance <= 0.001, "expected distance in budget, got {distance}");
    assert!(
        report["cases"][0].get("capturePath").is_none(),
        "passing case should have its artifacts removed"
    );
    assert!(
        !dir.path().join("artifacts").join("loaded").exists(),
        "artifact dir for a passing case should be deleted"
    );
}

#[test]
fn keep_artifacts_retains_passing_captures() {
    let dir = TempDir::new().unwrap();
    let mocks = TempDir::new().unwrap();
    write_suite(dir.path(), &single_case_suite("loaded"));
    write_png(&mocks.path().join("loaded.png"), 4, 4, GREEN);
    vrt_run(dir.path(), mocks.path(), &["--update-baselines"]);

    let output = vrt_run(dir.path(), mocks.path(), &["--keep-artifacts"]);
    let report = parse_report(&output);

    assert_eq!(exit_code(&output), 0);
    let capture = report["cases"][0]["capturePath"]
        .as_str()
        .expect("capturePath should be reported with --keep-artifacts");
    assert!(
        dir.path().join(capture).is_file(),
        "expected capture on disk at {capture}"
    );
}

#[test]
fn missing_baseline_fails_case_with_remediation() {
    let dir = TempDir::new().unwrap();
    let mocks = TempDir::new().unwrap();
    write_suite(dir.path(), &single_case_suite("loaded"));
    write_png(&mocks.path().join("loaded.png"), 4, 4, GREEN);

    let output = vrt_run(dir.path(), mocks.path(), &[]);
    let report = parse_report(&output);

    assert_eq!(exit_code(&output), 1, "report: {report}");
    assert_eq!(report["summary"]["failed"], 1);
    let case = &report["cases"][0];
    assert_eq!(case["verdict"], "failed");
    assert_eq!(case["error"]["category"], "baseline-missing");
    let remediation = case["error"]["remediation"].as_str().unwrap_or_default();
    assert!(
        remediation.contains("--update-baselines"),
        "expected remediation to mention --update-baselines, got: {remediation}"
    );
    assert!(
        report.get("error").is_none(),
        "a missing baseline fails the case, not the run"
    );
}

#[test]
fn mismatch_fails_case_and_writes_diff_artifact() {
    let dir = TempDir::new().unwrap();
    let mocks = TempDir::new().unwrap();
    write_suite(dir.path(), &single_case_suite("loaded"));
    write_png(&mocks.path().join("loaded.png"), 4, 4, GREEN);
    vrt_run(dir.path(), mocks.path(), &["--update-baselines"]);

    // The page now renders differently from the recorded baseline.
    write_png(&mocks.path().join("loaded.png"), 4, 4, RED);
    let output = vrt_run(dir.path(), mocks.path(), &[]);
    let report = parse_report(&output);

    assert_eq!(exit_code(&output), 1, "report: {report}");
    let case = &report["cases"][0];
    assert_eq!(case["verdict"], "failed");
    let distance = case["distance"].as_f64().unwrap();
    assert!(
        distance > 0.001,
        "expected distance over budget, got {distance}"
    );
    assert!(
        case.get("error").is_none(),
        "a visual mismatch carries a distance, not an error payload"
    );
    let diff = case["diffPath"]
        .as_str()
        .expect("failed comparison should report a diff image");
    assert!(
        dir.path().join(diff).is_file(),
        "expected diff image on disk at {diff}"
    );
}

#[test]
fn dimension_change_fails_without_resizing() {
    let dir = TempDir::new().unwrap();
    let mocks = TempDir::new().unwrap();
    write_suite(dir.path(), &single_case_suite("loaded"));
    write_png(&mocks.path().join("loaded.png"), 4, 4, GREEN);
    vrt_run(dir.path(), mocks.path(), &["--update-baselines"]);

    write_png(&mocks.path().join("loaded.png"), 8, 8, GREEN);
    let output = vrt_run(dir.path(), mocks.path(), &[]);
    let report = parse_report(&output);

    assert_eq!(exit_code(&output), 1);
    let case = &report["cases"][0];
    assert_eq!(case["error"]["category"], "dimension-mismatch");
    let message = case["error"]["message"].as_str().unwrap_or_default();
    assert!(
        message.contains("4x4") && message.contains("8x8"),
        "expected both sizes in message, got: {message}"
    );
}

#[test]
fn flaky_case_passes_within_retry_budget() {
    let dir = TempDir::new().unwrap();
    let mocks = TempDir::new().unwrap();
    write_suite(
        dir.path(),
        r#"
name: dashboard
base-url: "http://localhost:8080/"
cases:
  - name: refresh
    retries: 1
    actions:
      - navigate: { url: "?module=Widgetize&action=index" }
"#,
    );
    write_png(&mocks.path().join("refresh.png"), 4, 4, GREEN);
    vrt_run(dir.path(), mocks.path(), &["--update-baselines"]);

    // First attempt renders differently, the retry settles on the baseline.
    write_png(&mocks.path().join("refresh.attempt1.png"), 4, 4, RED);
    let output = vrt_run(dir.path(), mocks.path(), &[]);
    let report = parse_report(&output);

    assert_eq!(exit_code(&output), 0, "report: {report}");
    let case = &report["cases"][0];
    assert_eq!(case["verdict"], "passed");
    assert_eq!(case["attempts"], 2);
    assert_eq!(case["flaky"], true);
    assert_eq!(report["summary"]["flaky"], 1);
}

#[test]
fn exhausted_retries_report_final_failure() {
    let dir = TempDir::new().unwrap();
    let mocks = TempDir::new().unwrap();
    write_suite(
        dir.path(),
        r#"
name: dashboard
base-url: "http://localhost:8080/"
cases:
  - name: refresh
    retries: 1
    actions:
      - navigate: { url: "?module=Widgetize&action=index" }
"#,
    );
    write_png(&mocks.path().join("refresh.png"), 4, 4, GREEN);
    vrt_run(dir.path(), mocks.path(), &["--update-baselines"]);

    // Every attempt renders the same wrong pixels.
    write_png(&mocks.path().join("refresh.png"), 4, 4, RED);
    let output = vrt_run(dir.path(), mocks.path(), &[]);
    let report = parse_report(&output);

    assert_eq!(exit_code(&output), 1);
    let case = &report["cases"][0];
    assert_eq!(case["verdict"], "failed");
    assert_eq!(case["attempts"], 2, "budget of 1 retry means 2 attempts");
    assert_eq!(case["flaky"], false);
}

#[test]
fn unstable_capture_is_flagged_in_report() {
    let dir = TempDir::new().unwrap();
    let mocks = TempDir::new().unwrap();
    write_suite(dir.path(), &single_case_suite("loaded"));
    write_png(&mocks.path().join("loaded.png"), 4, 4, GREEN);
    vrt_run(dir.path(), mocks.path(), &["--update-baselines"]);

    let mut cmd = Command::new(env!("CARGO_BIN_EXE_vrt"));
    cmd.current_dir(dir.path())
        .env("VRT_MOCK_CAPTURE_DIR", mocks.path())
        .env("VRT_MOCK_UNSTABLE", "1")
        .args([
            "run",
            "--suite",
            "suite.yaml",
            "--baseline-dir",
            "baselines",
            "--artifacts-dir",
            "artifacts",
            "--format",
            "json",
        ]);
    let output = cmd.output().expect("failed to run vrt binary");
    let report = parse_report(&output);

    assert_eq!(exit_code(&output), 0, "an unstable capture can still pass");
    assert_eq!(report["cases"][0]["unstable"], true);
}

#[test]
fn filter_runs_matching_cases_only() {
    let dir = TempDir::new().unwrap();
    let mocks = TempDir::new().unwrap();
    write_suite(
        dir.path(),
        r#"
name: dashboard
base-url: "http://localhost:8080/"
cases:
  - name: widget-move
    actions:
      - navigate: { url: "?module=Widgetize&action=index" }
  - name: sidebar
    actions:
      - navigate: { url: "?module=CoreHome&action=index" }
"#,
    );
    write_png(&mocks.path().join("widget-move.png"), 4, 4, GREEN);
    write_png(&mocks.path().join("sidebar.png"), 4, 4, GREEN);
    vrt_run(dir.path(), mocks.path(), &["--update-baselines"]);

    let output = vrt_run(dir.path(), mocks.path(), &["--filter", "widget"]);
    let report = parse_report(&output);

    assert_eq!(exit_code(&output), 0, "report: {report}");
    assert_eq!(report["summary"]["total"], 1);
    assert_eq!(report["cases"][0]["name"], "widget-move");
}

#[test]
fn concurrent_workers_preserve_declared_order() {
    let dir = TempDir::new().unwrap();
    let mocks = TempDir::new().unwrap();
    write_suite(
        dir.path(),
        r#"
name: dashboard
base-url: "http://localhost:8080/"
cases:
  - name: first
    actions:
      - navigate: { url: "?page=1" }
  - name: second
    actions:
      - navigate: { url: "?page=2" }
  - name: third
    actions:
      - navigate: { url: "?page=3" }
"#,
    );
    for name in ["first", "second", "third"] {
        write_png(&mocks.path().join(format!("{name}.png")), 4, 4, GREEN);
    }
    vrt_run(dir.path(), mocks.path(), &["--update-baselines", "--workers", "3"]);

    let output = vrt_run(dir.path(), mocks.path(), &["--workers", "3"]);
    let report = parse_report(&output);

    assert_eq!(exit_code(&output), 0, "report: {report}");
    let names: Vec<&str> = report["cases"]
        .as_array()
        .unwrap()
        .iter()
        .map(|case| case["name"].as_str().unwrap())
        .collect();
    assert_eq!(
        names,
        ["first", "second", "third"],
        "report order must follow suite declaration order"
    );
}

#[test]
fn per_case_max_distance_loosens_the_budget() {
    let dir = TempDir::new().unwrap();
    let mocks = TempDir::new().unwrap();
    write_suite(
        dir.path(),
        r#"
name: dashboard
base-url: "http://localhost:8080/"
cases:
  - name: noisy
    max-distance: 1.0
    actions:
      - navigate: { url: "?module=Widgetize&action=index" }
"#,
    );
    write_png(&mocks.path().join("noisy.png"), 4, 4, GREEN);
    vrt_run(dir.path(), mocks.path(), &["--update-baselines"]);

    // Every pixel differs, but the case tolerates any distance.
    write_png(&mocks.path().join("noisy.png"), 4, 4, RED);
    let output = vrt_run(dir.path(), mocks.path(), &[]);
    let report = parse_report(&output);

    assert_eq!(exit_code(&output), 0, "report: {report}");
    assert_eq!(report["cases"][0]["verdict"], "passed");
    let distance = report["cases"][0]["distance"].as_f64().unwrap();
    assert!(distance > 0.9, "expected a large distance, got {distance}");
}

#[test]
fn missing_mock_capture_aborts_run_as_internal() {
    let dir = TempDir::new().unwrap();
    let mocks = TempDir::new().unwrap();
    write_suite(dir.path(), &single_case_suite("loaded"));
    // No fixture for "loaded": the driver cannot produce a capture at all.

    let output = vrt_run(dir.path(), mocks.path(), &[]);
    let report = parse_report(&output);

    assert_eq!(exit_code(&output), 2, "report: {report}");
    assert_eq!(report["error"]["category"], "internal");
    assert_eq!(report["cases"][0]["verdict"], "failed");
}

#[test]
fn report_envelope_carries_version_and_env() {
    let dir = TempDir::new().unwrap();
    let mocks = TempDir::new().unwrap();
    write_suite(dir.path(), &single_case_suite("loaded"));
    write_png(&mocks.path().join("loaded.png"), 4, 4, GREEN);

    let output = vrt_run(dir.path(), mocks.path(), &["--update-baselines"]);
    let report = parse_report(&output);

    assert_eq!(report["version"], "0.1.0");
    assert_eq!(report["suite"], "dashboard");
    let env = report["env"].as_str().unwrap_or_default();
    assert!(
        env.contains("chromium") && env.contains("1440x900"),
        "expected environment signature, got: {env}"
    );
    assert!(report["elapsedMs"].as_u64().is_some());
}
