//! Remote build planning: synthesize the mkdir / rsync / ssh commands that
//! mirror a local project onto a server and build it there.

use crate::config::{ReexecSettings, ServerProfile};
use crate::path_translate::to_cygwin_path;
use crate::process::Command;
use regex::Regex;
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use thiserror::Error;
use tracing::debug;

/// rsync options used when neither the server nor the settings name any.
pub const DEFAULT_RSYNC_OPTIONS: &str = "-avr";

/// Keeps ordinary files from becoming executable when syncing from Windows.
pub const WINDOWS_CHMOD_OPTION: &str = "--chmod=Du=rwX,Dgo=rX,Fu=rw,Fgo=r,Fugo-x";

/// `~`, `~user`, `$VAR` or `${VAR}` at the start of a remote path.
static EXPANDABLE_PREFIX: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"^(~[A-Za-z0-9._-]*|\$[A-Za-z_][A-Za-z0-9_]*|\$\{[A-Za-z_][A-Za-z0-9_]*\})(/|$)").ok()
});

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlanError {
    #[error("unknown remote server \"{0}\"")]
    UnknownServer(String),

    #[error("no active project or current file not saved yet")]
    NoActiveContext,
}

/// Platform the local side runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Unix,
    /// Paths handed to rsync and ssh are cygwinized.
    Windows,
}

impl Platform {
    pub const fn current() -> Self {
        if cfg!(windows) { Self::Windows } else { Self::Unix }
    }

    pub fn default_rsync_options(self) -> String {
        match self {
            Self::Unix => DEFAULT_RSYNC_OPTIONS.to_string(),
            Self::Windows => format!("{DEFAULT_RSYNC_OPTIONS} {WINDOWS_CHMOD_OPTION}"),
        }
    }

    fn tool_path(self, path: &str) -> String {
        match self {
            Self::Unix => path.to_string(),
            Self::Windows => to_cygwin_path(path),
        }
    }
}

/// What the editor (or the caller) has open.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActiveContext {
    /// Project file; its directory is the project root and its stem the
    /// project name.
    pub project_file: Option<PathBuf>,
    pub current_file: Option<PathBuf>,
}

/// Remote part of a build request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteRequest {
    pub server: String,
    /// Command to run on the server after syncing.
    pub remote_cmd: Option<String>,
    pub excludes: Vec<String>,
    pub local_sync_root: Option<String>,
    pub remote_sync_root: Option<String>,
}

/// Commands for one remote build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemotePlan {
    pub commands: Vec<Command>,
    /// rsync source argument.
    pub source: String,
    /// Remote directory the project is synced into.
    pub destination: String,
    /// Local directory diagnostic paths are re-rooted onto.
    pub anchor: String,
}

/// Builds [`RemotePlan`]s from validated settings.
#[derive(Debug, Clone, Copy)]
pub struct RemoteSyncPlanner<'a> {
    settings: &'a ReexecSettings,
    platform: Platform,
}

impl<'a> RemoteSyncPlanner<'a> {
    pub fn new(settings: &'a ReexecSettings) -> Self {
        Self::for_platform(settings, Platform::current())
    }

    pub fn for_platform(settings: &'a ReexecSettings, platform: Platform) -> Self {
        Self { settings, platform }
    }

    pub fn plan(
        &self,
        request: &RemoteRequest,
        context: &ActiveContext,
    ) -> Result<RemotePlan, PlanError> {
        let server = self
            .settings
            .server(&request.server)
            .ok_or_else(|| PlanError::UnknownServer(request.server.clone()))?;

        let remote_root = request
            .remote_sync_root
            .clone()
            .unwrap_or_else(|| server.root_directory.clone());
        let (source, destination, anchor) =
            self.sync_roots(request.local_sync_root.as_deref(), remote_root, context)?;

        let ssh = self.settings.ssh_path.value.as_str();
        let rsync = self.settings.rsync_path.value.as_str();
        let ssh_options = self.ssh_options(server);
        let mut rsync_options = server
            .rsync_options
            .clone()
            .or_else(|| self.settings.rsync_options.clone())
            .unwrap_or_else(|| self.platform.default_rsync_options());
        for exclude in &request.excludes {
            rsync_options.push_str(&format!(" --exclude=\"{exclude}\""));
        }

        let target = server.destination();
        let dst = remote_path_arg(&destination);
        let ssh_invocation = join_args([ssh, ssh_options.as_str()]);

        let mut lines = vec![
            join_args([ssh_invocation.as_str(), target.as_str(), "mkdir -p", dst.as_str()]),
            join_args([
                rsync,
                rsync_options.as_str(),
                &format!("-e \"{ssh_invocation}\""),
                source.as_str(),
                &format!("{target}:{dst}"),
            ]),
        ];

        let remote_cmd = request
            .remote_cmd
            .as_deref()
            .or(server.remote_cmd.as_deref())
            .filter(|cmd| !cmd.trim().is_empty());
        if let Some(remote_cmd) = remote_cmd {
            lines.push(join_args([
                ssh_invocation.as_str(),
                target.as_str(),
                &format!("\"cd {dst} && {remote_cmd}\""),
            ]));
        }

        debug!(
            server = %server.name,
            source = %source,
            destination = %destination,
            commands = lines.len(),
            "remote build planned"
        );

        Ok(RemotePlan {
            commands: lines.into_iter().map(Command::Shell).collect(),
            source,
            destination,
            anchor,
        })
    }

    /// ssh options of `server`, with port and identity appended.
    fn ssh_options(&self, server: &ServerProfile) -> String {
        let mut options = server
            .ssh_options
            .clone()
            .or_else(|| self.settings.ssh_options.clone())
            .unwrap_or_default();
        if let Some(port) = server.port.as_deref().filter(|p| !p.is_empty()) {
            options.push_str(&format!(" -p {port}"));
        }
        if let Some(key) = server.private_key.as_deref().filter(|k| !k.is_empty()) {
            let key = shellexpand::tilde(key);
            options.push_str(&format!(" -i {}", self.platform.tool_path(&key)));
        }
        options.trim().to_string()
    }

    /// rsync source, remote destination and local anchor.
    fn sync_roots(
        &self,
        local_override: Option<&str>,
        remote_root: String,
        context: &ActiveContext,
    ) -> Result<(String, String, String), PlanError> {
        if let Some(local) = local_override.filter(|l| !l.is_empty()) {
            return Ok((self.platform.tool_path(local), remote_root, local.to_string()));
        }

        if let Some(project_dir) = context.project_file.as_deref().and_then(Path::parent) {
            let project_name = context
                .project_file
                .as_deref()
                .and_then(Path::file_stem)
                .map(|stem| stem.to_string_lossy().into_owned());
            let anchor = project_dir.to_string_lossy().into_owned();

            let mut source = self.platform.tool_path(&anchor);
            if !source.ends_with('/') {
                source.push('/');
            }
            let relative = relative_project_path(project_dir, project_name.as_deref());
            return Ok((source, posix_join(&remote_root, &relative), anchor));
        }

        if let Some(file) = &context.current_file {
            let file = file.to_string_lossy().into_owned();
            return Ok((self.platform.tool_path(&file), remote_root, file));
        }

        Err(PlanError::NoActiveContext)
    }
}

/// Path of `project_dir` relative to its ancestor named `project_name`,
/// `/`-separated and including that ancestor. Falls back to the final
/// directory name when no ancestor matches or no name is given.
pub fn relative_project_path(project_dir: &Path, project_name: Option<&str>) -> String {
    let names: Vec<String> = project_dir
        .components()
        .filter_map(|component| match component {
            std::path::Component::Normal(name) => Some(name.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    let last = names.last().cloned().unwrap_or_default();

    let Some(project_name) = project_name.filter(|n| !n.is_empty()) else {
        return last;
    };
    match names.iter().rposition(|name| name == project_name) {
        Some(start) => names[start..].join("/"),
        None => last,
    }
}

/// Quote a remote path for the shell while leaving a leading `~` or `$VAR`
/// bare, so the server's shell still expands it.
fn remote_path_arg(path: &str) -> String {
    let prefix = EXPANDABLE_PREFIX
        .as_ref()
        .and_then(|re| re.captures(path))
        .and_then(|caps| caps.get(1))
        .map_or("", |prefix| prefix.as_str());
    let rest = &path[prefix.len()..];
    if prefix.is_empty() {
        return shell_escape::unix::escape(Cow::from(rest)).into_owned();
    }

    let Some(tail) = rest.strip_prefix('/') else {
        return prefix.to_string();
    };
    if tail.is_empty() {
        return format!("{prefix}/");
    }
    format!("{prefix}/{}", shell_escape::unix::escape(Cow::from(tail)))
}

/// Join `rel` onto `base` with POSIX rules (an absolute `rel` replaces it).
fn posix_join(base: &str, rel: &str) -> String {
    if rel.is_empty() {
        base.to_string()
    } else if rel.starts_with('/') || base.is_empty() {
        rel.to_string()
    } else if base.ends_with('/') {
        format!("{base}{rel}")
    } else {
        format!("{base}/{rel}")
    }
}

fn join_args<'s>(parts: impl IntoIterator<Item = &'s str>) -> String {
    parts
        .into_iter()
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
