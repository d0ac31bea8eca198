use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use vrt_lib::{
    load_suite, BaselineStore, ControlPlane, DriverOptions, EnvController, EnvSignature,
    HarnessError, PageDriver, ProgressCallback, Runner, RunnerOptions, UnconfiguredController,
};

use crate::cli::OutputFormat;
use crate::formatting::{exit_code_for_report, render_error, write_report};
use crate::settings::{format_effective_config, load_config, resolve_run_settings, RunFlagSources};

/// Run the run command.
#[allow(clippy::too_many_arguments)]
pub async fn run_suite(
    raw_args: &[String],
    config_path: Option<PathBuf>,
    verbose: bool,
    suite_path: PathBuf,
    filter: Option<String>,
    retries: Option<u32>,
    workers: usize,
    update_baselines: bool,
    baseline_dir: Option<PathBuf>,
    artifacts_dir: Option<PathBuf>,
    keep_artifacts: bool,
    format: OutputFormat,
    output: Option<PathBuf>,
) -> ExitCode {
    let config = match load_config(config_path.as_deref()) {
        Ok(cfg) => cfg,
        Err(err) => return render_error(err, format, output.clone()),
    };
    let flag_sources = RunFlagSources::from_args(raw_args);
    let resolved = resolve_run_settings(
        workers,
        retries,
        baseline_dir,
        artifacts_dir,
        &config,
        &flag_sources,
    );

    if verbose {
        eprintln!(
            "{}",
            format_effective_config(&config, &resolved, config_path.as_deref())
        );
    }

    let mut suite = match load_suite(&suite_path) {
        Ok(suite) => suite,
        Err(err) => return render_error(err, format, output.clone()),
    };
    if let Err(err) = suite.validate() {
        return render_error(err, format, output.clone());
    }

    if let Some(needle) = &filter {
        suite.cases.retain(|case| case.name.contains(needle.as_str()));
        if suite.cases.is_empty() {
            return render_error(
                HarnessError::Config(format!(
                    "--filter '{}' matched no cases in suite '{}'",
                    needle, suite.name
                )),
                format,
                output.clone(),
            );
        }
    }

    // Suite-level browser/viewport/stability win over config defaults.
    let browser = suite
        .browser
        .clone()
        .unwrap_or_else(|| config.browser.name.clone());
    let viewport = suite.viewport.unwrap_or(config.viewport);
    let stability = suite.stability.unwrap_or(config.stability);
    let env = EnvSignature::detect(browser.as_str(), viewport);

    let control: Arc<dyn ControlPlane> = match &config.controller.base_url {
        Some(base_url) => {
            match EnvController::new(base_url, config.controller.request_timeout) {
                Ok(controller) => Arc::new(controller),
                Err(err) => return render_error(err, format, output.clone()),
            }
        }
        None if suite.has_env_steps() => {
            return render_error(
                HarnessError::Config(format!(
                    "Suite '{}' declares setup/teardown steps but no controller.base-url is configured",
                    suite.name
                )),
                format,
                output.clone(),
            )
        }
        None => Arc::new(UnconfiguredController),
    };

    let driver = PageDriver::new(DriverOptions {
        node_command: config.browser.node_command.clone(),
        browser,
        viewport,
        headless: config.browser.headless,
        navigation_timeout: config.timeouts.navigation,
        step_timeout: config.timeouts.step,
        process_timeout: config.timeouts.process,
        stability,
        max_concurrent_sessions: resolved.workers,
    });
    if let Err(err) = driver.preflight().await {
        return render_error(err, format, output.clone());
    }

    let progress: Option<ProgressCallback> = if verbose {
        Some(Arc::new(|msg: &str| eprintln!("{msg}")))
    } else {
        None
    };

    let runner = Runner::new(
        driver,
        Arc::new(BaselineStore::new(resolved.baseline_root.clone())),
        control,
        env,
        RunnerOptions {
            workers: resolved.workers,
            update_baselines,
            retries_override: resolved.retries_override,
            artifacts_dir: resolved.artifacts_dir.clone(),
            keep_artifacts,
            diff: config.diff,
            progress,
        },
    );
    let report = runner.run(&suite).await;

    if let Err(err) = write_report(&report, format, output.clone()) {
        return render_error(HarnessError::Config(err.to_string()), format, output);
    }

    exit_code_for_report(&report)
}
