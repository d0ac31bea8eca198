use std::path::{Path, PathBuf};

use vrt_lib::{HarnessConfig, HarnessError};

/// Tracks which CLI flags were explicitly provided vs. defaulted.
#[derive(Debug, Default)]
pub struct RunFlagSources {
    pub workers: bool,
}

impl RunFlagSources {
    pub fn from_args(args: &[String]) -> Self {
        Self {
            workers: flag_present(args, "--workers"),
        }
    }
}

/// Checks if a flag was present in the command-line arguments.
pub fn flag_present(args: &[String], flag: &str) -> bool {
    args.iter()
        .any(|arg| arg == flag || arg.starts_with(&format!("{flag}=")))
}

/// Settings where a CLI flag and a config value cover the same knob,
/// resolved in favor of the flag when it was actually given.
#[derive(Debug, Clone)]
pub struct ResolvedRunSettings {
    pub workers: usize,
    /// Retry budget forced onto every case; `None` keeps per-case values.
    pub retries_override: Option<u32>,
    pub baseline_root: PathBuf,
    pub artifacts_dir: PathBuf,
}

/// Merge CLI arguments with config file, preferring CLI when flags are present.
pub fn resolve_run_settings(
    cli_workers: usize,
    cli_retries: Option<u32>,
    cli_baseline_dir: Option<PathBuf>,
    cli_artifacts_dir: Option<PathBuf>,
    config: &HarnessConfig,
    flags: &RunFlagSources,
) -> ResolvedRunSettings {
    ResolvedRunSettings {
        workers: if flags.workers {
            cli_workers
        } else {
            config.runner.workers
        },
        retries_override: cli_retries.or(config.runner.retries),
        baseline_root: cli_baseline_dir.unwrap_or_else(|| config.paths.baseline_root.clone()),
        artifacts_dir: cli_artifacts_dir.unwrap_or_else(|| config.paths.artifacts_dir.clone()),
    }
}

/// Load config from a TOML file or return defaults.
/// Priority: explicit path > ./vrt.toml > defaults
pub fn load_config(path: Option<&Path>) -> Result<HarnessConfig, HarnessError> {
    let cfg = HarnessConfig::load(path)?;
    cfg.validate().map_err(|e| {
        let detail = match e {
            HarnessError::Config(msg) => msg,
            other => other.to_string(),
        };
        let message = match path {
            Some(p) => format!("Invalid config ({}): {}", p.display(), detail),
            None => format!("Invalid config: {}", detail),
        };
        HarnessError::Config(message)
    })?;
    Ok(cfg)
}

/// Format effective config as a single-line string.
pub fn format_effective_config(
    config: &HarnessConfig,
    resolved: &ResolvedRunSettings,
    config_source: Option<&Path>,
) -> String {
    let source = config_source
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "defaults".to_string());
    let retries = resolved
        .retries_override
        .map(|n| n.to_string())
        .unwrap_or_else(|| "per-case".to_string());
    format!(
        "Effective config [{source}]: viewport={}, browser={} (headless={}), workers={}, retries={retries}, stability: quiet={:?} timeout={:?}, timeouts: nav={:?} step={:?} process={:?}, diff: pixel-threshold={:.2} max-distance={}, baselines={}, artifacts={}",
        config.viewport,
        config.browser.name,
        config.browser.headless,
        resolved.workers,
        config.stability.quiet_period,
        config.stability.timeout,
        config.timeouts.navigation,
        config.timeouts.step,
        config.timeouts.process,
        config.diff.pixel_threshold,
        config.diff.max_distance,
        resolved.baseline_root.display(),
        resolved.artifacts_dir.display(),
    )
}
