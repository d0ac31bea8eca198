use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "vrt")]
#[command(
    version,
    about = "Visual Regression Tester - Drive a browser through scripted flows and diff screenshots against baselines",
    long_about = "Visual Regression Tester (VRT)\n\nRuns YAML test suites: each case drives a Playwright-backed browser through scripted interactions, waits for the page to stop mutating, captures a screenshot, and compares it against the stored baseline for the current OS/browser/viewport.\n\nExit codes: 0 all cases passed, 1 at least one case failed or was skipped, 2 the harness itself errored.\n\nUse --help on the run subcommand for details."
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, global = true, help = "Enable verbose progress output on stderr")]
    pub verbose: bool,

    #[arg(
        long,
        global = true,
        value_name = "PATH",
        help = "Optional config file (TOML) to set defaults for viewport/browser/stability/timeouts/diff/paths; CLI flags override config"
    )]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a suite of visual regression cases
    Run {
        #[arg(long, value_name = "PATH", help = "YAML suite file describing the cases to run")]
        suite: PathBuf,

        #[arg(
            long,
            value_name = "SUBSTR",
            help = "Only run cases whose name contains this substring"
        )]
        filter: Option<String>,

        #[arg(
            long,
            value_name = "N",
            help = "Override every case's retry budget (extra attempts after the first)"
        )]
        retries: Option<u32>,

        #[arg(
            long,
            default_value = "1",
            value_name = "N",
            help = "Number of cases to run concurrently"
        )]
        workers: usize,

        #[arg(
            long,
            help = "Record current captures as baselines instead of failing on mismatch or missing baseline"
        )]
        update_baselines: bool,

        #[arg(
            long,
            value_name = "PATH",
            help = "Root directory of the baseline tree ({root}/{test}/{env}.png)"
        )]
        baseline_dir: Option<PathBuf>,

        #[arg(
            long,
            value_name = "PATH",
            help = "Directory for per-attempt captures and diff images; created if missing"
        )]
        artifacts_dir: Option<PathBuf>,

        #[arg(
            long,
            help = "Keep capture artifacts for passing cases; otherwise only failures retain theirs"
        )]
        keep_artifacts: bool,

        #[arg(long, value_enum, default_value = "json", help = "Output format")]
        format: OutputFormat,

        #[arg(long, short, help = "Report file path (stdout if omitted)")]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Json,
    Pretty,
}

pub fn parse() -> Cli {
    Cli::parse()
}
