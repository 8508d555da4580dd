//! Build descriptors: the build-system style description of one build.

use crate::config::ReexecSettings;
use crate::diagnostics::DiagnosticPatterns;
use crate::encoding::TextEncoding;
use crate::pipeline::{BuildContext, PathRewrite};
use crate::process::{Command, FinishPolicy, ProcessError};
use crate::remote::{ActiveContext, PlanError, RemotePlan, RemoteRequest, RemoteSyncPlanner};
use crate::sink::DisplaySettings;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum DescriptorError {
    #[error("invalid build descriptor: {0}")]
    Parse(#[from] serde_json::Error),

    #[error(transparent)]
    Command(#[from] ProcessError),

    #[error("invalid diagnostic pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error(transparent)]
    Plan(#[from] PlanError),
}

/// One build, as written in a build system file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BuildDescriptor {
    /// Program and arguments, run without a shell unless `shell` is set.
    pub cmd: Option<Vec<String>>,
    /// Command line for the platform shell. Must be a string.
    pub shell_cmd: Option<serde_json::Value>,
    pub file_regex: Option<String>,
    pub line_regex: Option<String>,
    /// Defaults to the directory of the current file.
    pub working_dir: Option<PathBuf>,
    pub encoding: Option<TextEncoding>,
    pub env: BTreeMap<String, String>,
    /// Replacement `PATH` for the build's processes.
    pub path: Option<String>,
    pub shell: bool,
    pub quiet: bool,
    /// Cancel the running build instead of starting one.
    pub kill: bool,
    pub word_wrap: bool,
    pub finish_policy: FinishPolicy,
    pub remote_server: Option<String>,
    pub remote_cmd: Option<String>,
    pub excludes: Vec<String>,
    #[serde(alias = "local_rsync_root")]
    pub local_sync_root: Option<String>,
    #[serde(alias = "remote_rsync_root")]
    pub remote_sync_root: Option<String>,
}

impl Default for BuildDescriptor {
    fn default() -> Self {
        Self {
            cmd: None,
            shell_cmd: None,
            file_regex: None,
            line_regex: None,
            working_dir: None,
            encoding: None,
            env: BTreeMap::new(),
            path: None,
            shell: false,
            quiet: false,
            kill: false,
            word_wrap: true,
            finish_policy: FinishPolicy::default(),
            remote_server: None,
            remote_cmd: None,
            excludes: Vec::new(),
            local_sync_root: None,
            remote_sync_root: None,
        }
    }
}

/// What a descriptor asks for.
#[derive(Debug)]
pub enum BuildRequest {
    /// Cancel the running build.
    Cancel,
    Build(BuildPlan),
}

/// Everything needed to start a build.
#[derive(Debug, Clone)]
pub struct BuildPlan {
    pub context: BuildContext,
    /// Local command first (if any), then the remote commands.
    pub commands: Vec<Command>,
    pub remote: Option<RemotePlan>,
}

impl BuildDescriptor {
    pub fn from_json(text: &str) -> Result<Self, DescriptorError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Whether `cmd` or `shell_cmd` names something to run locally.
    pub fn has_local_command(&self) -> bool {
        let has_cmd = self.cmd.as_ref().is_some_and(|cmd| !cmd.is_empty());
        let has_shell_cmd = match &self.shell_cmd {
            None | Some(serde_json::Value::Null) => false,
            Some(serde_json::Value::String(line)) => !line.is_empty(),
            Some(_) => true,
        };
        has_cmd || has_shell_cmd
    }

    /// The explicit local command, if any.
    pub fn local_command(&self) -> Result<Option<Command>, DescriptorError> {
        if !self.has_local_command() {
            return Ok(None);
        }
        let command = Command::from_parts(self.cmd.as_deref(), self.shell_cmd.as_ref(), self.shell)?;
        Ok(Some(command))
    }

    pub fn remote_request(&self) -> Option<RemoteRequest> {
        let server = self.remote_server.as_deref().filter(|s| !s.is_empty())?;
        Some(RemoteRequest {
            server: server.to_string(),
            remote_cmd: self.remote_cmd.clone(),
            excludes: self.excludes.clone(),
            local_sync_root: self.local_sync_root.clone(),
            remote_sync_root: self.remote_sync_root.clone(),
        })
    }

    /// Resolve the descriptor against the settings and what is open.
    pub fn prepare(
        &self,
        settings: &ReexecSettings,
        active: &ActiveContext,
        default_encoding: TextEncoding,
    ) -> Result<BuildRequest, DescriptorError> {
        if self.kill {
            return Ok(BuildRequest::Cancel);
        }

        let patterns =
            DiagnosticPatterns::new(self.file_regex.as_deref(), self.line_regex.as_deref())?;
        let local = self.local_command()?;
        let remote = match self.remote_request() {
            Some(request) => Some(RemoteSyncPlanner::new(settings).plan(&request, active)?),
            None => None,
        };

        let working_dir = self.working_dir.clone().or_else(|| {
            active
                .current_file
                .as_deref()
                .and_then(Path::parent)
                .map(Path::to_path_buf)
        });

        let mut commands: Vec<Command> = local.into_iter().collect();
        if let Some(plan) = &remote {
            commands.extend(plan.commands.iter().cloned());
        }
        debug!(
            commands = commands.len(),
            remote = remote.is_some(),
            working_dir = ?working_dir,
            "build descriptor prepared"
        );

        let context = BuildContext {
            encoding: self.encoding.unwrap_or(default_encoding),
            quiet: self.quiet,
            patterns,
            rewrite: remote.as_ref().map(|plan| PathRewrite::native(plan.anchor.clone())),
            env: self.env.clone(),
            path: self.path.clone(),
            working_dir: working_dir.clone(),
            finish_policy: self.finish_policy,
            display: DisplaySettings {
                file_regex: self.file_regex.clone(),
                line_regex: self.line_regex.clone(),
                base_dir: working_dir,
                word_wrap: self.word_wrap,
            },
        };

        Ok(BuildRequest::Build(BuildPlan {
            context,
            commands,
            remote,
        }))
    }
}
