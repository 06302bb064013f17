use std::process::ExitCode;

use clap::Parser;
use codec_registry_gen::{
    CliArgs, GeneratorConfig, LoggingConfig, RunMode, generate, init_logging,
};

fn main() -> anyhow::Result<ExitCode> {
    let logging_config = LoggingConfig::from_env();
    let _guard = init_logging(logging_config)?;

    let cli = CliArgs::parse();
    let mode = cli.mode();
    let config = GeneratorConfig::from_args(&cli)?;

    // Fail fast before touching the source tree.
    config.validate()?;

    let report = generate(config, mode)?;

    if mode == RunMode::DryRun {
        if let Some(source) = report.rendered.as_deref() {
            print!("{source}");
        }
    }
    if cli.report_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    if report.outcome.is_stale() {
        tracing::error!("generated registry is out of date; rerun without --check");
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}
