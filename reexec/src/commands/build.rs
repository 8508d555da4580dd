//! `run` and `plan`.

use super::load_settings;
use crate::cli::BuildArgs;
use crate::terminal::{TerminalSink, TerminalStatus};
use anyhow::Result;
use colored::Colorize;
use reexec_common::{BuildOutcome, BuildRequest, BuildResult, BuildRunner, EnvOverrides};
use std::path::Path;
use std::process::ExitCode;
use tracing::{debug, info};

/// Run the build described by `args`, streaming its output.
pub async fn run(args: &BuildArgs, config: Option<&Path>, env: &EnvOverrides) -> Result<ExitCode> {
    let settings = load_settings(config, env)?;
    let descriptor = args.descriptor()?;
    let active = args.active_context()?;

    let plan = match descriptor.prepare(&settings, &active, env.encoding.value)? {
        BuildRequest::Cancel => {
            // Each invocation owns its build; nothing else can be running.
            info!("cancel requested with no build running");
            return Ok(ExitCode::SUCCESS);
        }
        BuildRequest::Build(plan) => plan,
    };

    let mut runner = BuildRunner::new(TerminalSink::stdout(), TerminalStatus::stderr());
    runner.controller_mut().set_build_env(settings.build_env.clone());

    let cancel = async {
        if tokio::signal::ctrl_c().await.is_err() {
            debug!("Ctrl-C handler unavailable");
            std::future::pending::<()>().await;
        }
    };
    let outcome = runner.run(plan.context, plan.commands, cancel).await?;

    let (mut sink, _status) = runner.into_parts();
    sink.finish_line();
    debug!(base_dir = ?sink.settings().base_dir, "build output complete");
    Ok(outcome.as_ref().map_or(ExitCode::SUCCESS, exit_code))
}

/// Print the commands `args` would run, one per line.
pub fn plan(args: &BuildArgs, config: Option<&Path>, env: &EnvOverrides) -> Result<ExitCode> {
    let settings = load_settings(config, env)?;
    let descriptor = args.descriptor()?;
    let active = args.active_context()?;

    let plan = match descriptor.prepare(&settings, &active, env.encoding.value)? {
        BuildRequest::Cancel => {
            println!("{}", "# cancel the running build".dimmed());
            return Ok(ExitCode::SUCCESS);
        }
        BuildRequest::Build(plan) => plan,
    };

    if let Some(remote) = &plan.remote {
        println!("{}", format!("# sync {} -> {}", remote.source, remote.destination).dimmed());
    }
    if let Some(dir) = &plan.context.working_dir {
        println!("{}", format!("# in {}", dir.display()).dimmed());
    }
    for command in &plan.commands {
        println!("{}", command.display_line());
    }
    Ok(ExitCode::SUCCESS)
}

/// Process exit status for a finished build.
pub fn exit_code(outcome: &BuildOutcome) -> ExitCode {
    match outcome.result {
        BuildResult::Succeeded => ExitCode::SUCCESS,
        BuildResult::Failed(code) => ExitCode::from(u8::try_from(code).ok().filter(|c| *c != 0).unwrap_or(1)),
        BuildResult::Cancelled => ExitCode::from(130),
        BuildResult::SpawnFailed => ExitCode::from(127),
        BuildResult::NothingToRun => ExitCode::from(2),
    }
}
