//! Asynchronous external process wrapper.
//!
//! An [`AsyncProcess`] owns one OS process whose stdout and stderr are each
//! drained by a dedicated reader thread. Chunks and completion are delivered
//! to a [`ProcessListener`]; the listener is detached on [`AsyncProcess::kill`]
//! so callbacks already in flight become no-ops.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Stdio};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, LazyLock};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

/// Size of a single blocking read on an output stream.
pub const READ_CHUNK_SIZE: usize = 32 * 1024;

/// Upper bound on how long a reader waits for the process to exit after its
/// stream closed, so the exit status is known when completion is reported.
const REAP_GRACE: Duration = Duration::from_secs(2);
const REAP_POLL_INTERVAL: Duration = Duration::from_millis(5);

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

static NEXT_PROCESS_ID: AtomicU64 = AtomicU64::new(1);

#[cfg(unix)]
static UNIX_SHELL: LazyLock<PathBuf> = LazyLock::new(|| {
    let bash = Path::new("/bin/bash");
    if bash.exists() {
        return bash.to_path_buf();
    }
    which::which("bash").unwrap_or_else(|_| PathBuf::from("/bin/sh"))
});

/// Errors raised while starting a process.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The command description is unusable; nothing was spawned.
    #[error("invalid command: {0}")]
    InvalidArgument(String),

    /// The OS refused to create the process.
    #[error("failed to start '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    /// An output reader thread could not be started.
    #[error("failed to start output reader: {0}")]
    Reader(#[source] io::Error),
}

/// A command to launch: an argument vector or a shell command line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    /// Program plus arguments, executed without shell interpretation.
    Argv(Vec<String>),
    /// Full command line handed to the platform shell.
    Shell(String),
}

impl Command {
    /// Argument-vector command. Fails on an empty vector or empty program.
    pub fn argv<I, S>(args: I) -> Result<Self, ProcessError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let args: Vec<String> = args.into_iter().map(Into::into).collect();
        match args.first() {
            Some(program) if !program.is_empty() => Ok(Self::Argv(args)),
            _ => Err(ProcessError::InvalidArgument(
                "cmd must name a program".to_string(),
            )),
        }
    }

    /// Shell command line. Fails on an empty string.
    pub fn shell(line: impl Into<String>) -> Result<Self, ProcessError> {
        let line = line.into();
        if line.trim().is_empty() {
            return Err(ProcessError::InvalidArgument(
                "shell_cmd must not be empty".to_string(),
            ));
        }
        Ok(Self::Shell(line))
    }

    /// Build a command from the loosely-typed `cmd` / `shell_cmd` pair of a
    /// build descriptor. A non-empty `shell_cmd` wins; it must be a string.
    /// With `shell` set, an argument vector is quoted into one shell line.
    pub fn from_parts(
        cmd: Option<&[String]>,
        shell_cmd: Option<&serde_json::Value>,
        shell: bool,
    ) -> Result<Self, ProcessError> {
        match shell_cmd {
            Some(serde_json::Value::String(line)) if !line.is_empty() => {
                return Self::shell(line.clone());
            }
            Some(serde_json::Value::Null) | None => {}
            Some(serde_json::Value::String(_)) => {}
            Some(other) => {
                return Err(ProcessError::InvalidArgument(format!(
                    "shell_cmd must be a string, got {other}"
                )));
            }
        }

        match cmd {
            Some(args) if !args.is_empty() => {
                if shell {
                    Self::shell(shell_words::join(args))
                } else {
                    Self::argv(args.iter().cloned())
                }
            }
            _ => Err(ProcessError::InvalidArgument(
                "shell_cmd or cmd is required".to_string(),
            )),
        }
    }

    /// Human-readable command line.
    pub fn display_line(&self) -> String {
        match self {
            Self::Argv(args) => args.join(" "),
            Self::Shell(line) => line.clone(),
        }
    }

    /// First line of the debug context block shown after a failed build.
    pub fn debug_line(&self) -> String {
        match self {
            Self::Argv(args) => format!("[cmd: {args:?}]"),
            Self::Shell(line) => format!("[shell_cmd: {line}]"),
        }
    }

    pub fn is_shell(&self) -> bool {
        matches!(self, Self::Shell(_))
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_line())
    }
}

/// Receives output and completion of an [`AsyncProcess`].
///
/// Called from reader threads; implementations hand the event over to the
/// context that owns display state instead of touching it directly.
pub trait ProcessListener: Send + Sync {
    fn on_data(&self, process: &AsyncProcess, data: &[u8]);
    fn on_finished(&self, process: &AsyncProcess);
}

/// When a process counts as finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishPolicy {
    /// Finished as soon as stdout reaches end-of-stream. Late stderr output
    /// can arrive after completion.
    #[default]
    StdoutEof,
    /// Finished once both stdout and stderr reached end-of-stream.
    AllStreams,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamKind {
    Stdout,
    Stderr,
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stdout => write!(f, "stdout"),
            Self::Stderr => write!(f, "stderr"),
        }
    }
}

/// Identity of a started process, unique within this program run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProcessId(u64);

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Launch parameters besides the command itself.
#[derive(Debug, Clone, Default)]
pub struct SpawnOptions {
    /// Variables merged over the inherited environment (these win).
    pub env: BTreeMap<String, String>,
    /// Replacement `PATH` for the spawned process only.
    pub path: Option<String>,
    pub working_dir: Option<PathBuf>,
    pub finish_policy: FinishPolicy,
}

/// Expand `~`, `$VAR` and `${VAR}` in an environment value. Unknown
/// variables are left as written.
pub fn expand_env_value(value: &str, path_override: Option<&str>) -> String {
    let expanded = shellexpand::env_with_context_no_errors(value, |var: &str| match (var, path_override) {
        ("PATH", Some(path)) => Some(path.to_string()),
        _ => std::env::var(var).ok(),
    });
    shellexpand::tilde(expanded.as_ref()).into_owned()
}

struct ProcessInner {
    id: ProcessId,
    pid: u32,
    command: Command,
    started_at: Instant,
    finish_policy: FinishPolicy,
    killed: AtomicBool,
    open_streams: AtomicUsize,
    child: Mutex<Child>,
    listener: Mutex<Option<Arc<dyn ProcessListener>>>,
}

/// Handle to a running (or finished) external process. Clones share the
/// same process.
#[derive(Clone)]
pub struct AsyncProcess {
    inner: Arc<ProcessInner>,
}

impl AsyncProcess {
    /// Spawn `command` and start both output readers.
    pub fn start(
        command: Command,
        options: &SpawnOptions,
        listener: Arc<dyn ProcessListener>,
    ) -> Result<Self, ProcessError> {
        let mut os_command = os_command(&command);

        let path_override = options
            .path
            .as_deref()
            .map(|path| expand_env_value(path, None));
        if let Some(path) = &path_override {
            os_command.env("PATH", path);
        }
        for (key, value) in &options.env {
            os_command.env(key, expand_env_value(value, path_override.as_deref()));
        }
        if let Some(dir) = &options.working_dir {
            os_command.current_dir(dir);
        }
        os_command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = os_command.spawn().map_err(|source| ProcessError::Spawn {
            command: command.display_line(),
            source,
        })?;
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let pid = child.id();

        let process = Self {
            inner: Arc::new(ProcessInner {
                id: ProcessId(NEXT_PROCESS_ID.fetch_add(1, Ordering::Relaxed)),
                pid,
                command,
                started_at: Instant::now(),
                finish_policy: options.finish_policy,
                killed: AtomicBool::new(false),
                open_streams: AtomicUsize::new(2),
                child: Mutex::new(child),
                listener: Mutex::new(Some(listener)),
            }),
        };
        debug!(process = %process.id(), pid, command = %process.command(), "process started");

        let readers = [
            stdout.map(|s| process.spawn_reader(s, StreamKind::Stdout)),
            stderr.map(|s| process.spawn_reader(s, StreamKind::Stderr)),
        ];
        for reader in readers.into_iter().flatten() {
            if let Err(err) = reader {
                process.kill();
                return Err(ProcessError::Reader(err));
            }
        }

        Ok(process)
    }

    pub fn id(&self) -> ProcessId {
        self.inner.id
    }

    /// OS process id.
    pub fn pid(&self) -> u32 {
        self.inner.pid
    }

    pub fn command(&self) -> &Command {
        &self.inner.command
    }

    pub fn started_at(&self) -> Instant {
        self.inner.started_at
    }

    pub fn is_killed(&self) -> bool {
        self.inner.killed.load(Ordering::SeqCst)
    }

    /// Whether the process is still running.
    pub fn poll(&self) -> bool {
        matches!(self.inner.child.lock().try_wait(), Ok(None))
    }

    fn has_exited(&self) -> bool {
        matches!(self.inner.child.lock().try_wait(), Ok(Some(_)))
    }

    /// Exit code once the process has exited. `None` while running, and
    /// when the process was terminated by a signal.
    pub fn exit_code(&self) -> Option<i32> {
        self.inner
            .child
            .lock()
            .try_wait()
            .ok()
            .flatten()
            .and_then(|status| status.code())
    }

    /// Terminate the process and detach the listener. Only the first call
    /// has any effect.
    pub fn kill(&self) {
        if self.inner.killed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.listener.lock().take();

        // Once reaped, the pid and its process group may belong to someone else.
        if self.has_exited() {
            debug!(process = %self.id(), pid = self.pid(), "process already exited");
            return;
        }

        debug!(process = %self.id(), pid = self.pid(), "killing process");
        if let Err(err) = self.terminate() {
            warn!(process = %self.id(), pid = self.pid(), "failed to kill process: {}", err);
        }
    }

    #[cfg(unix)]
    fn terminate(&self) -> io::Result<()> {
        if self.inner.command.is_shell() {
            // The shell runs in its own process group; signalling the group
            // also reaches the commands it started.
            let status = std::process::Command::new("kill")
                .arg("-TERM")
                .arg("--")
                .arg(format!("-{}", self.pid()))
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status();
            if matches!(status, Ok(status) if status.success()) {
                return Ok(());
            }
        }
        self.kill_child()
    }

    #[cfg(windows)]
    fn terminate(&self) -> io::Result<()> {
        use std::os::windows::process::CommandExt;

        if self.inner.command.is_shell() {
            // Killing cmd.exe alone would leave its child running.
            let status = std::process::Command::new("taskkill")
                .args(["/T", "/F", "/PID"])
                .arg(self.pid().to_string())
                .creation_flags(CREATE_NO_WINDOW)
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status();
            if matches!(status, Ok(status) if status.success()) {
                return Ok(());
            }
        }
        self.kill_child()
    }

    fn kill_child(&self) -> io::Result<()> {
        let mut child = self.inner.child.lock();
        match child.kill() {
            Ok(()) => Ok(()),
            // Already exited.
            Err(err) if err.kind() == io::ErrorKind::InvalidInput => Ok(()),
            Err(err) => Err(err),
        }
    }

    fn listener(&self) -> Option<Arc<dyn ProcessListener>> {
        self.inner.listener.lock().clone()
    }

    fn spawn_reader<R>(&self, stream: R, kind: StreamKind) -> io::Result<()>
    where
        R: Read + Send + 'static,
    {
        let process = self.clone();
        thread::Builder::new()
            .name(format!("reexec-{kind}-{}", self.inner.id.0))
            .spawn(move || process.pump(stream, kind))
            .map(|_| ())
    }

    fn pump<R: Read>(&self, mut stream: R, kind: StreamKind) {
        let mut buf = vec![0u8; READ_CHUNK_SIZE];
        loop {
            match stream.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    if let Some(listener) = self.listener() {
                        listener.on_data(self, &buf[..n]);
                    }
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    debug!(process = %self.id(), stream = %kind, "read failed: {}", err);
                    break;
                }
            }
        }
        drop(stream);
        self.stream_closed(kind);
    }

    fn stream_closed(&self, kind: StreamKind) {
        let remaining = self.inner.open_streams.fetch_sub(1, Ordering::SeqCst) - 1;
        let finished = match self.inner.finish_policy {
            FinishPolicy::StdoutEof => kind == StreamKind::Stdout,
            FinishPolicy::AllStreams => remaining == 0,
        };
        if !finished || self.is_killed() {
            return;
        }

        self.reap();
        if let Some(listener) = self.listener() {
            listener.on_finished(self);
        }
    }

    /// Wait briefly for the exit status so it is available to listeners.
    fn reap(&self) {
        let deadline = Instant::now() + REAP_GRACE;
        while Instant::now() < deadline {
            if !self.poll() {
                return;
            }
            thread::sleep(REAP_POLL_INTERVAL);
        }
        debug!(process = %self.id(), "output closed but process still running");
    }
}

impl PartialEq for AsyncProcess {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for AsyncProcess {}

impl fmt::Debug for AsyncProcess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncProcess")
            .field("id", &self.inner.id)
            .field("pid", &self.inner.pid)
            .field("command", &self.inner.command)
            .field("killed", &self.is_killed())
            .finish()
    }
}

#[cfg(unix)]
fn os_command(command: &Command) -> std::process::Command {
    use std::os::unix::process::CommandExt;

    let mut os_command = match command {
        Command::Argv(args) => {
            let mut c = std::process::Command::new(&args[0]);
            c.args(&args[1..]);
            c
        }
        Command::Shell(line) => {
            let mut c = std::process::Command::new(UNIX_SHELL.as_path());
            // A login shell on macOS so the user's profile sets up PATH.
            if cfg!(target_os = "macos") {
                c.arg("-l");
            }
            c.arg("-c").arg(line);
            c
        }
    };
    os_command.process_group(0);
    os_command
}

#[cfg(windows)]
fn os_command(command: &Command) -> std::process::Command {
    use std::os::windows::process::CommandExt;

    let mut os_command = match command {
        Command::Argv(args) => {
            let mut c = std::process::Command::new(&args[0]);
            c.args(&args[1..]);
            c
        }
        Command::Shell(line) => {
            let mut c = std::process::Command::new("cmd");
            c.raw_arg("/C").raw_arg(line);
            c
        }
    };
    os_command.creation_flags(CREATE_NO_WINDOW);
    os_command
}
