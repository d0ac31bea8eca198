use std::fmt::Write as FmtWrite;
use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use vrt_lib::report::VRT_OUTPUT_VERSION;
use vrt_lib::{CaseVerdict, HarnessError, RunReport, RunSummary};

use crate::cli::OutputFormat;

/// Write the run report in the requested format.
pub fn write_report(
    report: &RunReport,
    format: OutputFormat,
    output: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    match format {
        OutputFormat::Json => write_json_report(report, output.as_deref())?,
        OutputFormat::Pretty => write_pretty_report(report, output.as_deref())?,
    };
    Ok(())
}

/// Render an error that prevented the run from producing a report, and
/// return the fatal exit code.
pub fn render_error(err: HarnessError, format: OutputFormat, output: Option<PathBuf>) -> ExitCode {
    let report = RunReport {
        version: VRT_OUTPUT_VERSION.to_string(),
        suite: String::new(),
        env: String::new(),
        summary: RunSummary::default(),
        cases: Vec::new(),
        error: Some(err.to_payload()),
        elapsed_ms: 0,
    };

    match format {
        OutputFormat::Json => {
            let content = serde_json::to_string(&report).unwrap_or_else(|_| "{}".into());
            if let Some(path) = output {
                if let Err(write_err) = std::fs::write(&path, &content) {
                    eprintln!("Failed to write error output: {}", write_err);
                    println!("{content}");
                }
            } else {
                println!("{content}");
            }
        }
        OutputFormat::Pretty => {
            if let Err(write_err) = write_pretty_report(&report, output.as_deref()) {
                eprintln!("Failed to write error output: {}", write_err);
            }
        }
    };

    // Reserve exit code 2 for harness errors; case failures use 1.
    ExitCode::from(2)
}

/// Write JSON report to file or stdout.
fn write_json_report(report: &RunReport, output: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let content = serde_json::to_string(report)?;
    if let Some(path) = output {
        std::fs::write(path, content)?;
    } else {
        println!("{content}");
    }
    Ok(())
}

/// Write pretty report to file or stdout.
fn write_pretty_report(report: &RunReport, output: Option<&Path>) -> io::Result<()> {
    let stdout_is_tty = std::io::stdout().is_terminal();
    let use_human = output.is_none() && stdout_is_tty;

    if use_human {
        let content = format_pretty(report, true);
        println!("{content}");
        return Ok(());
    }

    // Non-tty or file output: keep JSON shape for pipelines/files.
    let content = serde_json::to_string_pretty(report).unwrap_or_else(|_| "{}".to_string());
    if let Some(path) = output {
        std::fs::write(path, &content)?;
    } else {
        println!("{content}");
    }
    Ok(())
}

/// Format a run report for human consumption in a terminal.
pub fn format_pretty(report: &RunReport, colorize: bool) -> String {
    let mut buf = String::new();

    let status = if report.error.is_some() {
        color("ERROR", "31", colorize)
    } else if report.is_success() {
        color("PASS", "32", colorize)
    } else {
        color("FAIL", "31", colorize)
    };
    if report.suite.is_empty() {
        writeln!(buf, "{} Visual regression run", status).ok();
    } else {
        writeln!(
            buf,
            "{} Visual regression run '{}' ({})",
            status, report.suite, report.env
        )
        .ok();
    }

    if let Some(error) = &report.error {
        writeln!(buf, "Error: {}", error.message).ok();
        if let Some(remediation) = &error.remediation {
            writeln!(buf, "Hint: {}", remediation).ok();
        }
    }

    if !report.cases.is_empty() {
        let s = &report.summary;
        writeln!(
            buf,
            "Cases: {} total, {} passed, {} failed, {} skipped, {} flaky",
            s.total, s.passed, s.failed, s.skipped, s.flaky
        )
        .ok();
        for case in &report.cases {
            let label = match case.verdict {
                CaseVerdict::Passed => color("pass", "32", colorize),
                CaseVerdict::Failed => color("fail", "31", colorize),
                CaseVerdict::Skipped => color("skip", "33", colorize),
            };
            let mut notes: Vec<String> = Vec::new();
            if case.attempts > 1 {
                notes.push(format!("{} attempts", case.attempts));
            }
            if case.flaky {
                notes.push("flaky".to_string());
            }
            if case.unstable {
                notes.push("unstable capture".to_string());
            }
            if case.baseline_updated {
                notes.push("baseline updated".to_string());
            }
            if let Some(distance) = case.distance {
                let text = format!("distance {:.6} (max {:.6})", distance, case.max_distance);
                let code = if distance <= case.max_distance { "32" } else { "31" };
                notes.push(color(&text, code, colorize));
            }
            let suffix = if notes.is_empty() {
                String::new()
            } else {
                format!("  [{}]", notes.join(", "))
            };
            writeln!(buf, "- {:28} {}{}", case.name, label, suffix).ok();
            if let Some(error) = &case.error {
                writeln!(buf, "    {}", error.message).ok();
                if let Some(remediation) = &error.remediation {
                    writeln!(buf, "    Hint: {}", remediation).ok();
                }
            }
            if let Some(diff) = &case.diff_path {
                writeln!(buf, "    diff: {}", diff.display()).ok();
            }
        }
    }

    writeln!(buf, "Elapsed: {:.1}s", report.elapsed_ms as f64 / 1000.0).ok();
    buf
}

/// Apply ANSI color codes when enabled.
fn color(text: &str, code: &str, colorize: bool) -> String {
    if colorize {
        format!("\x1b[{}m{}\x1b[0m", code, text)
    } else {
        text.to_string()
    }
}

/// Determine exit code for a finished run: 2 when the harness itself
/// errored, 1 when any case failed or was skipped, 0 otherwise.
pub fn exit_code_for_report(report: &RunReport) -> ExitCode {
    if report.error.is_some() {
        ExitCode::from(2)
    } else if report.summary.failed > 0 || report.summary.skipped > 0 {
        ExitCode::from(1)
    } else {
        ExitCode::SUCCESS
    }
}
