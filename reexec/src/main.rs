//! reexec: run local and remote (rsync + ssh) builds as one streamed,
//! cancellable pipeline.

#![forbid(unsafe_code)]

mod cli;
mod commands;
mod terminal;

use clap::Parser;
use cli::{Cli, Commands};
use colored::Colorize;
use reexec_common::config::EnvError;
use reexec_common::logging::{LogConfig, init_logging};
use reexec_common::{
    Cataloged, ConfigError, DescriptorError, EnvOverrides, PipelineError, PlanError,
};
use std::process::ExitCode;
use tracing::warn;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let (env, env_errors) = EnvOverrides::from_env();
    let log_config = LogConfig::from_env(&env, cli.verbose);
    if let Err(err) = init_logging(&log_config) {
        eprintln!("{} {}", err.catalog_entry().format_brief().red(), err);
    }
    for err in &env_errors {
        warn!(code = %err.error_code().code_string(), "{err}");
    }

    match dispatch(cli, &env, &env_errors).await {
        Ok(code) => code,
        Err(err) => {
            report(&err);
            ExitCode::FAILURE
        }
    }
}

async fn dispatch(cli: Cli, env: &EnvOverrides, env_errors: &[EnvError]) -> anyhow::Result<ExitCode> {
    let config = cli.config.as_deref();
    match cli.command {
        Commands::Run(args) => commands::run(&args, config, env).await,
        Commands::Plan(args) => commands::plan(&args, config, env),
        Commands::Servers { json } => commands::servers(config, env, json),
        Commands::Check => commands::check(config, env, env_errors),
    }
}

/// Print `err` with its catalog code when it has one.
fn report(err: &anyhow::Error) {
    let entry = err
        .downcast_ref::<ConfigError>()
        .map(Cataloged::catalog_entry)
        .or_else(|| err.downcast_ref::<DescriptorError>().map(Cataloged::catalog_entry))
        .or_else(|| err.downcast_ref::<PlanError>().map(Cataloged::catalog_entry))
        .or_else(|| err.downcast_ref::<PipelineError>().map(Cataloged::catalog_entry));

    match entry {
        Some(entry) => {
            eprintln!("{} {}", "error:".red().bold(), entry.format_brief());
            eprintln!("  {err:#}");
        }
        None => eprintln!("{} {err:#}", "error:".red().bold()),
    }
}
