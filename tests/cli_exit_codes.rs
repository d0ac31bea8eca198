//! Exit-code contract and CLI surface checks for the `vrt` binary.
//!
//! Code 0 is a clean pass, 1 means at least one case failed or was skipped,
//! and 2 is reserved for errors in the harness itself (bad flags, broken
//! config, unusable environment).

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use image::{Rgba, RgbaImage};
use serde_json::Value;
use tempfile::TempDir;

fn write_png(path: &Path, color: [u8; 4]) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    RgbaImage::from_pixel(4, 4, Rgba(color)).save(path).unwrap();
}

fn write_suite(dir: &Path, yaml: &str) {
    fs::write(dir.join("suite.yaml"), yaml).unwrap();
}

const PLAIN_SUITE: &str = r#"
name: dashboard
base-url: "http://localhost:8080/"
cases:
  - name: loaded
    actions:
      - navigate: { url: "?module=Widgetize&action=index" }
"#;

/// Command scoped to `dir` with a clean mock environment.
fn vrt_cmd(dir: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_vrt"));
    cmd.current_dir(dir)
        .env_remove("VRT_MOCK_CAPTURE_DIR")
        .env_remove("VRT_MOCK_UNSTABLE");
    cmd
}

fn parse_stdout(output: &Output) -> Value {
    serde_json::from_slice(&output.stdout).unwrap_or_else(|e| {
        panic!(
            "stdout was not JSON ({e}): {}",
            String::from_utf8_lossy(&output.stdout)
        )
    })
}

fn exit_code(output: &Output) -> i32 {
    output.status.code().expect("process terminated by signal")
}

#[test]
fn missing_suite_file_is_fatal() {
    let dir = TempDir::new().unwrap();
    let mocks = TempDir::new().unwrap();

    let output = vrt_cmd(dir.path())
        .env("VRT_MOCK_CAPTURE_DIR", mocks.path())
        .args(["run", "--suite", "missing.yaml"])
        .output()
        .expect("failed to run vrt binary");

    assert_eq!(exit_code(&output), 2);
    let report = parse_stdout(&output);
    assert_eq!(report["error"]["category"], "config");
    let message = report["error"]["message"].as_str().unwrap_or_default();
    assert!(
        message.contains("Suite file not found"),
        "expected missing-suite message, got: {message}"
    );
    let remediation = report["error"]["remediation"].as_str().unwrap_or_default();
    assert!(
        remediation.contains("--suite"),
        "expected remediation to mention --suite, got: {remediation}"
    );
}

#[test]
fn invalid_config_value_is_fatal() {
    let dir = TempDir::new().unwrap();
    let mocks = TempDir::new().unwrap();
    write_suite(dir.path(), PLAIN_SUITE);
    fs::write(dir.path().join("vrt.toml"), "[runner]\nworkers = 0\n").unwrap();

    let output = vrt_cmd(dir.path())
        .env("VRT_MOCK_CAPTURE_DIR", mocks.path())
        .args(["run", "--suite", "suite.yaml"])
        .output()
        .expect("failed to run vrt binary");

    assert_eq!(exit_code(&output), 2);
    let report = parse_stdout(&output);
    assert_eq!(report["error"]["category"], "config");
    let message = report["error"]["message"].as_str().unwrap_or_default();
    assert!(
        message.contains("workers must be at least 1"),
        "expected validation failure, got: {message}"
    );
}

#[test]
fn explicit_config_path_appears_in_error() {
    let dir = TempDir::new().unwrap();
    let mocks = TempDir::new().unwrap();
    write_suite(dir.path(), PLAIN_SUITE);
    fs::write(dir.path().join("team.toml"), "[diff]\npixel-threshold = 7.0\n").unwrap();

    let output = vrt_cmd(dir.path())
        .env("VRT_MOCK_CAPTURE_DIR", mocks.path())
        .args(["run", "--config", "team.toml", "--suite", "suite.yaml"])
        .output()
        .expect("failed to run vrt binary");

    assert_eq!(exit_code(&output), 2);
    let report = parse_stdout(&output);
    let message = report["error"]["message"].as_str().unwrap_or_default();
    assert!(
        message.contains("team.toml") && message.contains("pixel-threshold"),
        "expected config path and offending key, got: {message}"
    );
}

#[test]
fn env_steps_without_controller_are_fatal() {
    let dir = TempDir::new().unwrap();
    let mocks = TempDir::new().unwrap();
    write_suite(
        dir.path(),
        r#"
name: dashboard
base-url: "http://localhost:8080/"
setup:
  - override-config: { section: General, key: live_widget_refresh_after_seconds, value: 1000000 }
  - save
cases:
  - name: loaded
    actions:
      - navigate: { url: "?module=Widgetize&action=index" }
"#,
    );

    let output = vrt_cmd(dir.path())
        .env("VRT_MOCK_CAPTURE_DIR", mocks.path())
        .args(["run", "--suite", "suite.yaml"])
        .output()
        .expect("failed to run vrt binary");

    assert_eq!(exit_code(&output), 2);
    let report = parse_stdout(&output);
    assert_eq!(report["error"]["category"], "config");
    let message = report["error"]["message"].as_str().unwrap_or_default();
    assert!(
        message.contains("controller.base-url"),
        "expected controller hint, got: {message}"
    );
}

#[test]
fn filter_matching_nothing_is_fatal() {
    let dir = TempDir::new().unwrap();
    let mocks = TempDir::new().unwrap();
    write_suite(dir.path(), PLAIN_SUITE);
    write_png(&mocks.path().join("loaded.png"), [12, 190, 60, 255]);

    let output = vrt_cmd(dir.path())
        .env("VRT_MOCK_CAPTURE_DIR", mocks.path())
        .args(["run", "--suite", "suite.yaml", "--filter", "nonexistent"])
        .output()
        .expect("failed to run vrt binary");

    assert_eq!(exit_code(&output), 2);
    let report = parse_stdout(&output);
    let message = report["error"]["message"].as_str().unwrap_or_default();
    assert!(
        message.contains("matched no cases"),
        "expected empty-filter message, got: {message}"
    );
}

#[test]
fn case_failures_use_code_one_not_two() {
    let dir = TempDir::new().unwrap();
    let mocks = TempDir::new().unwrap();
    write_suite(dir.path(), PLAIN_SUITE);
    write_png(&mocks.path().join("loaded.png"), [12, 190, 60, 255]);

    // No baseline recorded yet: the case fails, the harness is fine.
    let failing = vrt_cmd(dir.path())
        .env("VRT_MOCK_CAPTURE_DIR", mocks.path())
        .args([
            "run",
            "--suite",
            "suite.yaml",
            "--baseline-dir",
            "baselines",
        ])
        .output()
        .expect("failed to run vrt binary");
    assert_eq!(exit_code(&failing), 1);

    let seeding = vrt_cmd(dir.path())
        .env("VRT_MOCK_CAPTURE_DIR", mocks.path())
        .args([
            "run",
            "--suite",
            "suite.yaml",
            "--baseline-dir",
            "baselines",
            "--update-baselines",
        ])
        .output()
        .expect("failed to run vrt binary");
    assert_eq!(exit_code(&seeding), 0);
}

#[test]
fn pretty_format_piped_falls_back_to_json() {
    let dir = TempDir::new().unwrap();
    let mocks = TempDir::new().unwrap();
    write_suite(dir.path(), PLAIN_SUITE);
    write_png(&mocks.path().join("loaded.png"), [12, 190, 60, 255]);

    // stdout is a pipe here, so the human renderer must not engage.
    let output = vrt_cmd(dir.path())
        .env("VRT_MOCK_CAPTURE_DIR", mocks.path())
        .args([
            "run",
            "--suite",
            "suite.yaml",
            "--update-baselines",
            "--format",
            "pretty",
        ])
        .output()
        .expect("failed to run vrt binary");

    assert_eq!(exit_code(&output), 0);
    let report = parse_stdout(&output);
    assert_eq!(report["suite"], "dashboard");
}

#[test]
fn output_flag_writes_report_to_file() {
    let dir = TempDir::new().unwrap();
    let mocks = TempDir::new().unwrap();
    write_suite(dir.path(), PLAIN_SUITE);
    write_png(&mocks.path().join("loaded.png"), [12, 190, 60, 255]);

    let output = vrt_cmd(dir.path())
        .env("VRT_MOCK_CAPTURE_DIR", mocks.path())
        .args([
            "run",
            "--suite",
            "suite.yaml",
            "--update-baselines",
            "--output",
            "report.json",
        ])
        .output()
        .expect("failed to run vrt binary");

    assert_eq!(exit_code(&output), 0);
    assert!(
        output.stdout.is_empty(),
        "report should go to the file, not stdout: {}",
        String::from_utf8_lossy(&output.stdout)
    );
    let raw = fs::read_to_string(dir.path().join("report.json")).expect("report file");
    let report: Value = serde_json::from_str(&raw).expect("report file should be JSON");
    assert_eq!(report["suite"], "dashboard");
    assert_eq!(report["summary"]["passed"], 1);
}

#[test]
fn verbose_logs_progress_to_stderr_only() {
    let dir = TempDir::new().unwrap();
    let mocks = TempDir::new().unwrap();
    write_suite(dir.path(), PLAIN_SUITE);
    write_png(&mocks.path().join("loaded.png"), [12, 190, 60, 255]);

    let output = vrt_cmd(dir.path())
        .env("VRT_MOCK_CAPTURE_DIR", mocks.path())
        .args([
            "run",
            "--verbose",
            "--suite",
            "suite.yaml",
            "--update-baselines",
        ])
        .output()
        .expect("failed to run vrt binary");

    assert_eq!(exit_code(&output), 0);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("Effective config"),
        "expected effective config line on stderr, got: {stderr}"
    );
    assert!(
        stderr.contains("Running suite 'dashboard'"),
        "expected progress lines on stderr, got: {stderr}"
    );
    // stdout stays machine-readable even with verbose logging.
    let report = parse_stdout(&output);
    assert_eq!(report["summary"]["total"], 1);
}

#[test]
fn broken_node_command_is_a_config_error() {
    let dir = TempDir::new().unwrap();
    write_suite(dir.path(), PLAIN_SUITE);
    fs::write(
        dir.path().join("vrt.toml"),
        "[browser]\nnode-command = \"vrt-test-no-such-node\"\n",
    )
    .unwrap();

    // No mock captures: the preflight check actually probes for Node here.
    let output = vrt_cmd(dir.path())
        .args(["run", "--suite", "suite.yaml"])
        .output()
        .expect("failed to run vrt binary");

    assert_eq!(exit_code(&output), 2);
    let report = parse_stdout(&output);
    assert_eq!(report["error"]["category"], "config");
    let message = report["error"]["message"].as_str().unwrap_or_default();
    assert!(
        message.contains("not found on PATH"),
        "expected spawn failure message, got: {message}"
    );
    let remediation = report["error"]["remediation"].as_str().unwrap_or_default();
    assert!(
        remediation.contains("Node.js"),
        "expected Node install hint, got: {remediation}"
    );
}
