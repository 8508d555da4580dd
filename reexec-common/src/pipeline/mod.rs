//! Sequential multi-command build pipeline.
//!
//! [`PipelineController`] runs an ordered list of commands one at a time as
//! a single build. Every event of the running process is handed back to the
//! controller by the task that owns it (see [`runner`]); the controller
//! decodes, normalizes and rewrites output, forwards it to the display sink
//! and launches the next command when the current one finishes.

pub mod runner;

use crate::diagnostics::DiagnosticPatterns;
use crate::encoding::{TextEncoding, normalize_newlines};
use crate::path_translate::PathConvention;
use crate::process::{AsyncProcess, Command, FinishPolicy, ProcessListener, SpawnOptions};
use crate::sink::{DisplaySettings, DisplaySink, StatusSink};
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

pub use runner::BuildRunner;

/// Shown when a build has neither a local command nor a remote server.
pub const NOTHING_TO_RUN: &str =
    "[Nothing to run: set cmd, shell_cmd or remote_server in the build settings]\n";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PipelineError {
    #[error("a build is already running; cancel it before starting another")]
    Busy,
}

/// Re-rooting of foreign paths found in diagnostic lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathRewrite {
    /// Local directory that matched paths are re-rooted onto.
    pub anchor: String,
    pub foreign: PathConvention,
    pub local: PathConvention,
}

impl PathRewrite {
    /// POSIX remote output rewritten onto a native local anchor.
    pub fn native(anchor: impl Into<String>) -> Self {
        Self {
            anchor: anchor.into(),
            foreign: PathConvention::Posix,
            local: PathConvention::native(),
        }
    }
}

/// Per-build settings shared by every command of the pipeline.
#[derive(Debug, Clone, Default)]
pub struct BuildContext {
    pub encoding: TextEncoding,
    pub quiet: bool,
    pub patterns: DiagnosticPatterns,
    /// Set for remote builds; diagnostic paths are only rewritten then.
    pub rewrite: Option<PathRewrite>,
    /// Caller environment overlay.
    pub env: BTreeMap<String, String>,
    /// Replacement `PATH` for the spawned processes.
    pub path: Option<String>,
    pub working_dir: Option<PathBuf>,
    pub finish_policy: FinishPolicy,
    pub display: DisplaySettings,
}

/// Where the controller is in its build.
#[derive(Debug)]
pub enum PipelineState {
    /// No build, or the last one finished.
    Idle,
    /// Command `index` (0-based) of the build is running as `current`.
    Running {
        index: usize,
        current: AsyncProcess,
        /// Set after a decode failure; further output of `current` is dropped.
        untrusted: bool,
    },
    /// The last command finished and completion is being reported.
    Finishing,
    /// The build was killed.
    Cancelled,
}

impl PipelineState {
    /// Whether a new build may start from this state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Idle | Self::Cancelled)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running { .. } => "running",
            Self::Finishing => "finishing",
            Self::Cancelled => "cancelled",
        }
    }
}

/// How a build ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildResult {
    /// Last command exited with 0, or its exit code is unknown.
    Succeeded,
    /// Last command exited with a non-zero code.
    Failed(i32),
    Cancelled,
    /// A command could not be started.
    SpawnFailed,
    /// No command was supplied.
    NothingToRun,
}

impl fmt::Display for BuildResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed(code) => write!(f, "failed with exit code {code}"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::SpawnFailed => write!(f, "failed to start"),
            Self::NothingToRun => write!(f, "nothing to run"),
        }
    }
}

/// Summary of a finished build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOutcome {
    pub result: BuildResult,
    pub commands_started: usize,
    pub elapsed: Duration,
    /// Diagnostic results counted in the display at completion.
    pub error_count: usize,
}

/// Drives one build at a time through its commands.
pub struct PipelineController<D, S> {
    display: D,
    status: S,
    listener: Arc<dyn ProcessListener>,
    build_env: BTreeMap<String, String>,
    state: PipelineState,
    context: BuildContext,
    pending: VecDeque<Command>,
    supplied: bool,
    commands_started: usize,
    started_at: Option<Instant>,
    debug_text: String,
    last_outcome: Option<BuildOutcome>,
}

impl<D: DisplaySink, S: StatusSink> PipelineController<D, S> {
    /// `listener` is attached to every process the controller starts; it
    /// must route events back into [`Self::on_data`] and
    /// [`Self::on_finished`].
    pub fn new(display: D, status: S, listener: Arc<dyn ProcessListener>) -> Self {
        Self {
            display,
            status,
            listener,
            build_env: BTreeMap::new(),
            state: PipelineState::Idle,
            context: BuildContext::default(),
            pending: VecDeque::new(),
            supplied: false,
            commands_started: 0,
            started_at: None,
            debug_text: String::new(),
            last_outcome: None,
        }
    }

    /// Per-view environment overrides; the caller's build environment wins
    /// over these.
    pub fn set_build_env(&mut self, build_env: BTreeMap<String, String>) {
        self.build_env = build_env;
    }

    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    /// Whether a build is in progress.
    pub fn is_active(&self) -> bool {
        !self.state.is_terminal()
    }

    pub fn display(&self) -> &D {
        &self.display
    }

    pub fn status_sink(&self) -> &S {
        &self.status
    }

    pub fn last_outcome(&self) -> Option<&BuildOutcome> {
        self.last_outcome.as_ref()
    }

    /// Commands still waiting to run.
    pub fn pending(&self) -> impl Iterator<Item = &Command> {
        self.pending.iter()
    }

    pub fn current(&self) -> Option<&AsyncProcess> {
        match &self.state {
            PipelineState::Running { current, .. } => Some(current),
            _ => None,
        }
    }

    pub fn into_parts(self) -> (D, S) {
        (self.display, self.status)
    }

    /// Configure the build and run its first command.
    pub fn begin(
        &mut self,
        context: BuildContext,
        commands: impl IntoIterator<Item = Command>,
    ) -> Result<(), PipelineError> {
        if !self.state.is_terminal() {
            return Err(PipelineError::Busy);
        }
        self.display.configure(&context.display);
        self.context = context;
        self.enqueue_all(commands)?;
        self.start_next();
        Ok(())
    }

    /// Replace the queue with `commands`. Only allowed between builds.
    pub fn enqueue_all(
        &mut self,
        commands: impl IntoIterator<Item = Command>,
    ) -> Result<(), PipelineError> {
        if !self.state.is_terminal() {
            return Err(PipelineError::Busy);
        }
        self.pending = commands.into_iter().collect();
        self.supplied = !self.pending.is_empty();
        self.commands_started = 0;
        self.started_at = None;
        self.last_outcome = None;
        debug!(commands = self.pending.len(), "build queued");
        Ok(())
    }

    /// Launch the next queued command.
    pub fn start_next(&mut self) {
        let Some(command) = self.pending.pop_front() else {
            if !self.supplied {
                warn!("build has no command to run");
                self.display.append(NOTHING_TO_RUN, true, true);
                self.complete(BuildResult::NothingToRun);
            }
            return;
        };

        self.started_at.get_or_insert_with(Instant::now);
        let options = self.spawn_options();
        self.debug_text = self.debug_block(&command, &options);

        if !self.context.quiet {
            info!(command = %command, "Running {}", command);
            self.status.status("Building");
        }

        match AsyncProcess::start(command, &options, Arc::clone(&self.listener)) {
            Ok(process) => {
                self.state = PipelineState::Running {
                    index: self.commands_started,
                    current: process,
                    untrusted: false,
                };
                self.commands_started += 1;
            }
            Err(err) => {
                warn!(error = %err, "failed to start build command");
                self.pending.clear();
                let message = format!("{err}\n");
                self.display.append(&message, true, true);
                let debug_text = format!("{}\n", self.debug_text);
                self.display.append(&debug_text, true, true);
                if !self.context.quiet {
                    self.display.append("[Finished]", true, true);
                }
                self.complete(BuildResult::SpawnFailed);
            }
        }
    }

    /// Output chunk of `process`.
    pub fn on_data(&mut self, process: &AsyncProcess, data: &[u8]) {
        let PipelineState::Running {
            current, untrusted, ..
        } = &mut self.state
        else {
            Self::discard_stale(process);
            return;
        };
        if current.id() != process.id() {
            Self::discard_stale(process);
            return;
        }
        if *untrusted {
            return;
        }

        let text = match self.context.encoding.decode(data) {
            Ok(text) => text,
            Err(err) => {
                debug!(process = %process.id(), error = %err, "undecodable output");
                *untrusted = true;
                format!("[Decode error - output not {}]\n", self.context.encoding)
            }
        };

        let mut text = normalize_newlines(&text);
        if let Some(rewrite) = &self.context.rewrite
            && let Some(rewritten) =
                self.context
                    .patterns
                    .rewrite_paths(&text, &rewrite.anchor, rewrite.foreign, rewrite.local)
        {
            text = rewritten;
        }

        self.display.append(&text, true, true);
    }

    /// Completion of `process`.
    pub fn on_finished(&mut self, process: &AsyncProcess) {
        if self.current() != Some(process) {
            Self::discard_stale(process);
            return;
        }

        if !self.pending.is_empty() {
            debug!(process = %process.id(), remaining = self.pending.len(), "command finished");
            self.start_next();
            return;
        }

        self.state = PipelineState::Finishing;
        let elapsed = self.elapsed().as_secs_f64();
        let exit_code = process.exit_code();
        let result = match exit_code {
            None | Some(0) => BuildResult::Succeeded,
            Some(code) => BuildResult::Failed(code),
        };

        if !self.context.quiet {
            match exit_code {
                None | Some(0) => {
                    let line = format!("[Finished in {elapsed:.1}s]");
                    self.display.append(&line, true, true);
                }
                Some(code) => {
                    let line = format!("[Finished in {elapsed:.1}s with exit code {code}]\n");
                    self.display.append(&line, true, true);
                    let debug_text = self.debug_text.clone();
                    self.display.append(&debug_text, true, true);
                }
            }
        }

        self.complete(result);
    }

    /// Cancel the build. Only acts while the current process is alive.
    /// Returns whether anything was cancelled.
    pub fn kill(&mut self) -> bool {
        let Some(current) = self.current() else {
            return false;
        };
        if !current.poll() {
            return false;
        }

        current.kill();
        info!(process = %current.id(), "build cancelled");
        self.pending.clear();
        self.display.append("[Cancelled]", true, true);
        self.last_outcome = Some(BuildOutcome {
            result: BuildResult::Cancelled,
            commands_started: self.commands_started,
            elapsed: self.elapsed(),
            error_count: 0,
        });
        self.state = PipelineState::Cancelled;
        true
    }

    fn discard_stale(process: &AsyncProcess) {
        debug!(process = %process.id(), "discarding event of stale process");
        if !process.is_killed() {
            process.kill();
        }
    }

    fn elapsed(&self) -> Duration {
        self.started_at.map(|t| t.elapsed()).unwrap_or_default()
    }

    fn complete(&mut self, result: BuildResult) {
        let error_count = self.display.count_matches(&self.context.patterns);
        if error_count == 0 {
            self.status.status("Build finished");
        } else {
            self.status
                .status(&format!("Build finished with {error_count} errors"));
        }

        let outcome = BuildOutcome {
            result,
            commands_started: self.commands_started,
            elapsed: self.elapsed(),
            error_count,
        };
        info!(
            result = %outcome.result,
            commands = outcome.commands_started,
            elapsed_ms = outcome.elapsed.as_millis() as u64,
            errors = outcome.error_count,
            "build finished"
        );
        self.last_outcome = Some(outcome);
        self.state = PipelineState::Idle;
    }

    fn spawn_options(&self) -> SpawnOptions {
        let mut env = self.build_env.clone();
        env.extend(
            self.context
                .env
                .iter()
                .map(|(key, value)| (key.clone(), value.clone())),
        );
        SpawnOptions {
            env,
            path: self.context.path.clone(),
            working_dir: self.context.working_dir.clone(),
            finish_policy: self.context.finish_policy,
        }
    }

    fn debug_block(&self, command: &Command, options: &SpawnOptions) -> String {
        let dir = options
            .working_dir
            .clone()
            .or_else(|| std::env::current_dir().ok())
            .map(|dir| dir.display().to_string())
            .unwrap_or_default();
        let path = options
            .path
            .clone()
            .or_else(|| options.env.get("PATH").cloned())
            .or_else(|| std::env::var("PATH").ok())
            .unwrap_or_default();
        format!("{}\n[dir: {dir}]\n[path: {path}]", command.debug_line())
    }
}

impl<D, S> fmt::Debug for PipelineController<D, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineController")
            .field("state", &self.state.name())
            .field("pending", &self.pending.len())
            .field("commands_started", &self.commands_started)
            .finish()
    }
}
