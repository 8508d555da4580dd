//! Command-line definition and descriptor assembly.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use regex::Regex;
use reexec_common::{ActiveContext, BuildDescriptor};
use std::path::PathBuf;
use std::sync::LazyLock;

static ENV_KEY: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").ok());

#[derive(Parser)]
#[command(name = "reexec")]
#[command(author, version, about = "Run local and remote (rsync + ssh) builds as one streamed pipeline")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Settings file (defaults to REEXEC_CONFIG, then the user config dir)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a build and stream its output
    Run(BuildArgs),

    /// Print the commands a build would run, without running them
    Plan(BuildArgs),

    /// List configured server profiles
    Servers {
        /// Print the profiles as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate the settings file and the tools it names
    Check,
}

#[derive(Args, Debug, Default)]
pub struct BuildArgs {
    /// JSON build descriptor; flags given alongside override its fields
    #[arg(short, long, value_name = "FILE")]
    pub descriptor: Option<PathBuf>,

    /// Result pattern; group 1 must capture the file path
    #[arg(long)]
    pub file_regex: Option<String>,

    #[arg(long)]
    pub line_regex: Option<String>,

    /// Working directory (defaults to the directory of --file)
    #[arg(short = 'C', long)]
    pub working_dir: Option<PathBuf>,

    /// Output encoding: utf-8, ascii or latin-1
    #[arg(long)]
    pub encoding: Option<String>,

    /// Extra environment variable, KEY=VALUE (repeatable)
    #[arg(short, long = "env", value_name = "KEY=VALUE", value_parser = parse_env_pair)]
    pub env: Vec<(String, String)>,

    /// Replacement PATH for the build's processes
    #[arg(long)]
    pub path: Option<String>,

    /// Suppress progress markers
    #[arg(short, long)]
    pub quiet: bool,

    /// Server profile to build on
    #[arg(short = 's', long)]
    pub remote_server: Option<String>,

    /// Command to run in the synced directory on the server
    #[arg(long)]
    pub remote_cmd: Option<String>,

    /// rsync exclude pattern (repeatable)
    #[arg(long = "exclude", value_name = "PATTERN")]
    pub excludes: Vec<String>,

    /// Local directory to sync instead of the project
    #[arg(long)]
    pub local_sync_root: Option<PathBuf>,

    /// Remote directory to sync into instead of the server root
    #[arg(long)]
    pub remote_sync_root: Option<String>,

    /// Project file; its directory is synced and its name locates the
    /// project under the server root
    #[arg(long, value_name = "FILE")]
    pub project: Option<PathBuf>,

    /// File being built
    #[arg(long, value_name = "FILE")]
    pub file: Option<PathBuf>,

    /// Shell command to run locally
    #[arg(last = true, value_name = "COMMAND")]
    pub command: Vec<String>,
}

impl BuildArgs {
    /// Descriptor from `--descriptor`, with every given flag applied on top.
    pub fn descriptor(&self) -> Result<BuildDescriptor> {
        let mut descriptor = match &self.descriptor {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read descriptor {}", path.display()))?;
                BuildDescriptor::from_json(&text)?
            }
            None => BuildDescriptor::default(),
        };

        if !self.command.is_empty() {
            descriptor.cmd = None;
            descriptor.shell_cmd = Some(serde_json::Value::String(self.command.join(" ")));
        }
        if self.file_regex.is_some() {
            descriptor.file_regex = self.file_regex.clone();
        }
        if self.line_regex.is_some() {
            descriptor.line_regex = self.line_regex.clone();
        }
        if self.working_dir.is_some() {
            descriptor.working_dir = self.working_dir.clone();
        }
        if let Some(encoding) = &self.encoding {
            descriptor.encoding = Some(encoding.parse()?);
        }
        descriptor.env.extend(self.env.iter().cloned());
        if self.path.is_some() {
            descriptor.path = self.path.clone();
        }
        descriptor.quiet |= self.quiet;
        if self.remote_server.is_some() {
            descriptor.remote_server = self.remote_server.clone();
        }
        if self.remote_cmd.is_some() {
            descriptor.remote_cmd = self.remote_cmd.clone();
        }
        descriptor.excludes.extend(self.excludes.iter().cloned());
        if let Some(root) = &self.local_sync_root {
            descriptor.local_sync_root = Some(root.to_string_lossy().into_owned());
        }
        if self.remote_sync_root.is_some() {
            descriptor.remote_sync_root = self.remote_sync_root.clone();
        }
        Ok(descriptor)
    }

    /// What is "open": the project and the file being built, made absolute.
    pub fn active_context(&self) -> Result<ActiveContext> {
        Ok(ActiveContext {
            project_file: self.project.as_deref().map(std::path::absolute).transpose()?,
            current_file: self.file.as_deref().map(std::path::absolute).transpose()?,
        })
    }
}

fn parse_env_pair(pair: &str) -> Result<(String, String), String> {
    let Some((key, value)) = pair.split_once('=') else {
        return Err(format!("expected KEY=VALUE, got '{pair}'"));
    };
    if !ENV_KEY.as_ref().is_some_and(|re| re.is_match(key)) {
        return Err(format!("invalid environment variable name '{key}'"));
    }
    Ok((key.to_string(), value.to_string()))
}
