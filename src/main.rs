mod cli;
mod commands;
mod formatting;
mod settings;

use std::process::ExitCode;

use cli::Commands;
use commands::run_suite;

#[tokio::main]
async fn main() -> ExitCode {
    run().await
}

async fn run() -> ExitCode {
    let raw_args: Vec<String> = std::env::args().collect();
    let args = cli::parse();

    match args.command {
        Commands::Run {
            suite,
            filter,
            retries,
            workers,
            update_baselines,
            baseline_dir,
            artifacts_dir,
            keep_artifacts,
            format,
            output,
        } => {
            run_suite(
                &raw_args,
                args.config,
                args.verbose,
                suite,
                filter,
                retries,
                workers,
                update_baselines,
                baseline_dir,
                artifacts_dir,
                keep_artifacts,
                format,
                output,
            )
            .await
        }
    }
}
