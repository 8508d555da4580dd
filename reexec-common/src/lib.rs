//! Core of reexec: run a sequence of local and remote (rsync + ssh)
//! commands as one streamed, cancellable build.
//!
//! - [`process`]: one external process, drained by two reader threads
//! - [`pipeline`]: the build state machine and its event loop
//! - [`remote`]: mkdir / rsync / ssh command synthesis
//! - [`path_translate`] and [`diagnostics`]: re-rooting remote paths in
//!   compiler output onto the local checkout

pub mod config;
pub mod descriptor;
pub mod diagnostics;
pub mod dispatch;
pub mod encoding;
pub mod errors;
pub mod logging;
pub mod path_translate;
pub mod pipeline;
pub mod process;
pub mod remote;
pub mod sink;

pub use config::{ConfigError, EnvOverrides, ReexecSettings, ServerProfile, SettingsStore};
pub use descriptor::{BuildDescriptor, BuildPlan, BuildRequest, DescriptorError};
pub use diagnostics::DiagnosticPatterns;
pub use dispatch::{ChannelListener, ProcessEvent};
pub use encoding::TextEncoding;
pub use errors::{Cataloged, ErrorCategory, ErrorCode, ErrorEntry};
pub use path_translate::{PathConvention, translate};
pub use pipeline::{
    BuildContext, BuildOutcome, BuildResult, BuildRunner, PipelineController, PipelineError,
    PipelineState,
};
pub use process::{AsyncProcess, Command, FinishPolicy, ProcessError, ProcessListener, SpawnOptions};
pub use remote::{ActiveContext, Platform, PlanError, RemotePlan, RemoteRequest, RemoteSyncPlanner};
pub use sink::{BufferSink, DisplaySettings, DisplaySink, StatusLog, StatusSink};
