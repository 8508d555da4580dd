//! Configuration for reexec.
//!
//! - Settings file with server profiles and tool paths
//! - `REEXEC_*` environment variables with type safety
//! - Source tracking for debugging

pub mod env;
pub mod settings;
pub mod source;

pub use env::{EnvError, EnvOverrides, EnvParser};
pub use settings::{ConfigError, ReexecSettings, ServerProfile, SettingsStore, TomlSettingsStore};
pub use source::{ConfigSource, Sourced};
