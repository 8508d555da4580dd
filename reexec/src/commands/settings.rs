//! `servers` and `check`.

use super::{load_settings, settings_path};
use anyhow::Result;
use colored::Colorize;
use reexec_common::config::{EnvError, Sourced};
use reexec_common::{Cataloged, EnvOverrides, ReexecSettings};
use serde::Serialize;
use std::path::Path;
use std::process::ExitCode;

#[derive(Serialize)]
struct ServerSummary<'a> {
    name: &'a str,
    destination: String,
    port: Option<&'a str>,
    root_directory: &'a str,
    remote_cmd: Option<&'a str>,
}

/// List the configured server profiles.
pub fn servers(config: Option<&Path>, env: &EnvOverrides, json: bool) -> Result<ExitCode> {
    let settings = load_settings(config, env)?;
    let summaries: Vec<ServerSummary<'_>> = settings
        .servers
        .iter()
        .map(|server| ServerSummary {
            name: &server.name,
            destination: server.destination(),
            port: server.port.as_deref(),
            root_directory: &server.root_directory,
            remote_cmd: server.remote_cmd.as_deref(),
        })
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
        return Ok(ExitCode::SUCCESS);
    }

    if summaries.is_empty() {
        println!("No servers configured.");
        return Ok(ExitCode::SUCCESS);
    }
    for server in &summaries {
        let port = server.port.map(|p| format!(":{p}")).unwrap_or_default();
        println!(
            "{}  {}{}  {}",
            server.name.bold(),
            server.destination,
            port,
            server.root_directory.dimmed()
        );
    }
    Ok(ExitCode::SUCCESS)
}

/// Validate the settings and report where each value came from.
pub fn check(config: Option<&Path>, env: &EnvOverrides, env_errors: &[EnvError]) -> Result<ExitCode> {
    let mut problems = 0usize;

    for err in env_errors {
        problems += 1;
        println!("{} {}", "✗".red(), err.catalog_entry().format_brief());
        println!("    {err}");
    }

    let path = settings_path(config, env).or_else(ReexecSettings::default_path);
    match &path {
        Some(path) if path.exists() => println!("{} settings: {}", "✓".green(), path.display()),
        Some(path) => println!("{} settings: {} (not found, using defaults)", "-".dimmed(), path.display()),
        None => println!("{} settings: no config directory, using defaults", "-".dimmed()),
    }

    let settings = match load_settings(config, env) {
        Ok(settings) => settings,
        Err(err) => {
            let brief = err
                .downcast_ref::<reexec_common::ConfigError>()
                .map(|e| e.catalog_entry().format_brief())
                .unwrap_or_else(|| "settings could not be loaded".to_string());
            println!("{} {brief}", "✗".red());
            println!("    {err}");
            return Ok(ExitCode::FAILURE);
        }
    };

    println!("{} {} server(s) configured", "✓".green(), settings.servers.len());
    for (label, tool) in [("ssh", &settings.ssh_path), ("rsync", &settings.rsync_path)] {
        if !report_tool(label, tool) {
            problems += 1;
        }
    }

    if problems == 0 {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

/// Whether `tool` resolves to an executable.
fn report_tool(label: &str, tool: &Sourced<String>) -> bool {
    match which::which(&tool.value) {
        Ok(found) => {
            println!(
                "{} {label}: {} [{}]",
                "✓".green(),
                found.display(),
                tool.source
            );
            true
        }
        Err(_) => {
            let entry = reexec_common::ErrorCode::RemoteToolMissing.entry();
            println!("{} {label}: {} [{}]", "✗".red(), tool.value, tool.source);
            println!("    {}", entry.format_brief());
            false
        }
    }
}
