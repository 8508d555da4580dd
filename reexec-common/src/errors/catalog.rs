//! Error Catalog for reexec
//!
//! Every failure the tool reports carries:
//! - A unique code (RX-E001 through RX-E599)
//! - A human-readable message
//! - Remediation steps
//!
//! # Error Code Ranges
//!
//! | Range      | Category    | Description                              |
//! |------------|-------------|------------------------------------------|
//! | E001-E099  | Config      | Settings file, environment, descriptors  |
//! | E100-E199  | Remote      | Remote build planning                    |
//! | E200-E299  | Process     | Starting and running build commands      |
//! | E300-E399  | Output      | Decoding process output                  |
//! | E500-E599  | Internal    | Internal/unexpected errors               |

use serde::{Deserialize, Serialize};
use std::fmt;

/// Error code enumeration covering all reexec error scenarios.
///
/// Each variant maps to a unique error code in the RX-Exxx format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[non_exhaustive]
pub enum ErrorCode {
    // =========================================================================
    // Config Errors (E001-E099)
    // =========================================================================
    /// Settings file not found
    ConfigNotFound,
    /// Settings file could not be read
    ConfigReadError,
    /// Settings file contains invalid TOML syntax
    ConfigParseError,
    /// A server profile lacks a required parameter
    ConfigMissingParameter,
    /// A server profile has an empty required parameter
    ConfigEmptyParameter,
    /// Two server profiles share a name
    ConfigDuplicateServer,
    /// ssh_path or rsync_path is empty
    ConfigEmptyToolPath,
    /// A setting has the wrong type
    ConfigInvalidValue,
    /// Environment variable has invalid value
    ConfigEnvError,
    /// Build descriptor is not valid JSON or has unknown fields
    DescriptorParseError,
    /// file_regex or line_regex does not compile
    DescriptorInvalidPattern,

    // =========================================================================
    // Remote Errors (E100-E199)
    // =========================================================================
    /// No server profile with the requested name
    RemoteUnknownServer,
    /// Nothing to sync: no project, file or local root
    RemoteNoActiveContext,
    /// ssh or rsync executable not found
    RemoteToolMissing,

    // =========================================================================
    // Process Errors (E200-E299)
    // =========================================================================
    /// Command description is unusable
    ProcessInvalidCommand,
    /// The OS refused to start the command
    ProcessSpawnFailed,
    /// Output reader thread could not be started
    ProcessReaderFailed,
    /// A build is already running
    ProcessBuildBusy,

    // =========================================================================
    // Output Errors (E300-E399)
    // =========================================================================
    /// Output is not valid in the configured encoding
    OutputDecodeError,
    /// Unsupported encoding label
    OutputUnknownEncoding,

    // =========================================================================
    // Internal Errors (E500-E599)
    // =========================================================================
    /// Async runtime could not be created
    InternalRuntime,
    /// Logging could not be initialized
    InternalLogging,
}

impl ErrorCode {
    /// Numeric part of the code.
    #[must_use]
    pub const fn code_number(&self) -> u16 {
        match self {
            // Config (001-099)
            Self::ConfigNotFound => 1,
            Self::ConfigReadError => 2,
            Self::ConfigParseError => 3,
            Self::ConfigMissingParameter => 4,
            Self::ConfigEmptyParameter => 5,
            Self::ConfigDuplicateServer => 6,
            Self::ConfigEmptyToolPath => 7,
            Self::ConfigInvalidValue => 8,
            Self::ConfigEnvError => 9,
            Self::DescriptorParseError => 20,
            Self::DescriptorInvalidPattern => 21,

            // Remote (100-199)
            Self::RemoteUnknownServer => 100,
            Self::RemoteNoActiveContext => 101,
            Self::RemoteToolMissing => 102,

            // Process (200-299)
            Self::ProcessInvalidCommand => 200,
            Self::ProcessSpawnFailed => 201,
            Self::ProcessReaderFailed => 202,
            Self::ProcessBuildBusy => 203,

            // Output (300-399)
            Self::OutputDecodeError => 300,
            Self::OutputUnknownEncoding => 301,

            // Internal (500-599)
            Self::InternalRuntime => 500,
            Self::InternalLogging => 501,
        }
    }

    /// Code in the `RX-Exxx` format.
    #[must_use]
    pub fn code_string(&self) -> String {
        format!("RX-E{:03}", self.code_number())
    }

    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self.code_number() {
            1..=99 => ErrorCategory::Config,
            100..=199 => ErrorCategory::Remote,
            200..=299 => ErrorCategory::Process,
            300..=399 => ErrorCategory::Output,
            _ => ErrorCategory::Internal,
        }
    }

    /// Full catalog entry.
    #[must_use]
    pub fn entry(&self) -> ErrorEntry {
        ErrorEntry {
            code: self.code_string(),
            category: self.category(),
            message: self.message().to_string(),
            remediation: self
                .remediation()
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
        }
    }

    #[must_use]
    pub const fn message(&self) -> &'static str {
        match self {
            Self::ConfigNotFound => "Settings file not found",
            Self::ConfigReadError => "Settings file could not be read",
            Self::ConfigParseError => "Settings file is not valid TOML",
            Self::ConfigMissingParameter => "Server profile is missing a required parameter",
            Self::ConfigEmptyParameter => "Server profile has an empty required parameter",
            Self::ConfigDuplicateServer => "Duplicate server name",
            Self::ConfigEmptyToolPath => "ssh_path and rsync_path must not be empty",
            Self::ConfigInvalidValue => "Setting has an invalid value",
            Self::ConfigEnvError => "Environment variable has an invalid value",
            Self::DescriptorParseError => "Build descriptor could not be parsed",
            Self::DescriptorInvalidPattern => "Diagnostic pattern does not compile",

            Self::RemoteUnknownServer => "Unknown remote server",
            Self::RemoteNoActiveContext => "No active project or saved file to sync",
            Self::RemoteToolMissing => "ssh or rsync executable not found",

            Self::ProcessInvalidCommand => "Build command is invalid",
            Self::ProcessSpawnFailed => "Build command could not be started",
            Self::ProcessReaderFailed => "Output reader could not be started",
            Self::ProcessBuildBusy => "A build is already running",

            Self::OutputDecodeError => "Build output is not valid in the configured encoding",
            Self::OutputUnknownEncoding => "Unsupported output encoding",

            Self::InternalRuntime => "Async runtime could not be started",
            Self::InternalLogging => "Logging could not be initialized",
        }
    }

    #[must_use]
    pub const fn remediation(&self) -> &'static [&'static str] {
        match self {
            Self::ConfigNotFound => &[
                "Check the path given with --config or REEXEC_CONFIG",
                "Run 'reexec check' to print the default settings location",
            ],
            Self::ConfigReadError => &[
                "Check the file permissions of the settings file",
                "Make sure the path points to a file, not a directory",
            ],
            Self::ConfigParseError => &[
                "Fix the TOML syntax error reported above",
                "Server profiles are written as [[servers]] tables",
            ],
            Self::ConfigMissingParameter => &[
                "Every [[servers]] entry needs name, host and root_directory",
            ],
            Self::ConfigEmptyParameter => &[
                "Give name, host and root_directory a non-empty value",
            ],
            Self::ConfigDuplicateServer => &[
                "Rename one of the servers; names select profiles and must be unique",
            ],
            Self::ConfigEmptyToolPath => &[
                "Remove ssh_path/rsync_path to use the defaults",
                "Or set them to the executables to run",
            ],
            Self::ConfigInvalidValue => &[
                "Options and paths are strings; build_env values are strings",
                "servers is an array of tables",
            ],
            Self::ConfigEnvError => &[
                "Check the REEXEC_* variables in your environment",
                "Unset the variable to fall back to the default",
            ],
            Self::DescriptorParseError => &[
                "Check the JSON syntax of the descriptor",
                "Field names are those of a build system (cmd, shell_cmd, file_regex, ...)",
            ],
            Self::DescriptorInvalidPattern => &[
                "Fix the regular expression; group 1 must capture the file path",
            ],

            Self::RemoteUnknownServer => &[
                "Run 'reexec servers' to list the configured profiles",
                "Server names are matched exactly",
            ],
            Self::RemoteNoActiveContext => &[
                "Pass --project or --file, or set local_sync_root",
            ],
            Self::RemoteToolMissing => &[
                "Install OpenSSH and rsync",
                "Or point ssh_path/rsync_path at the executables",
            ],

            Self::ProcessInvalidCommand => &[
                "Supply cmd (argument list) or shell_cmd (string)",
                "shell_cmd must be a string",
            ],
            Self::ProcessSpawnFailed => &[
                "Check that the program exists and is executable",
                "Check the path override and the working directory",
            ],
            Self::ProcessReaderFailed => &[
                "The system may be out of threads or file descriptors; retry",
            ],
            Self::ProcessBuildBusy => &[
                "Cancel the running build before starting another",
            ],

            Self::OutputDecodeError => &[
                "Set encoding to match the tool's output, for example latin-1",
            ],
            Self::OutputUnknownEncoding => &["Use utf-8, ascii or latin-1"],

            Self::InternalRuntime => &["Retry; report the issue if it persists"],
            Self::InternalLogging => &["Check REEXEC_LOG_LEVEL and REEXEC_LOG_JSON"],
        }
    }

    /// Every code, in catalog order.
    #[must_use]
    pub const fn all() -> &'static [ErrorCode] {
        &[
            Self::ConfigNotFound,
            Self::ConfigReadError,
            Self::ConfigParseError,
            Self::ConfigMissingParameter,
            Self::ConfigEmptyParameter,
            Self::ConfigDuplicateServer,
            Self::ConfigEmptyToolPath,
            Self::ConfigInvalidValue,
            Self::ConfigEnvError,
            Self::DescriptorParseError,
            Self::DescriptorInvalidPattern,
            Self::RemoteUnknownServer,
            Self::RemoteNoActiveContext,
            Self::RemoteToolMissing,
            Self::ProcessInvalidCommand,
            Self::ProcessSpawnFailed,
            Self::ProcessReaderFailed,
            Self::ProcessBuildBusy,
            Self::OutputDecodeError,
            Self::OutputUnknownEncoding,
            Self::InternalRuntime,
            Self::InternalLogging,
        ]
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code_string(), self.message())
    }
}

/// Error category for grouping related errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    /// Settings, environment and descriptor errors (E001-E099)
    Config,
    /// Remote build planning errors (E100-E199)
    Remote,
    /// Command start and execution errors (E200-E299)
    Process,
    /// Output decoding errors (E300-E399)
    Output,
    /// Internal/unexpected errors (E500-E599)
    Internal,
}

impl ErrorCategory {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Config => "Configuration",
            Self::Remote => "Remote",
            Self::Process => "Process",
            Self::Output => "Output",
            Self::Internal => "Internal",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Complete error entry with all metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEntry {
    /// Error code string (e.g., "RX-E001")
    pub code: String,
    pub category: ErrorCategory,
    pub message: String,
    pub remediation: Vec<String>,
}

impl ErrorEntry {
    /// Formats the error for display with full remediation steps.
    #[must_use]
    pub fn format_full(&self) -> String {
        let mut output = format!("[{}] {}\n", self.code, self.message);

        if !self.remediation.is_empty() {
            output.push_str("\nRemediation steps:\n");
            for (i, step) in self.remediation.iter().enumerate() {
                output.push_str(&format!("  {}. {}\n", i + 1, step));
            }
        }

        output
    }

    /// Formats the error as a single line.
    #[must_use]
    pub fn format_brief(&self) -> String {
        format!("[{}] {}", self.code, self.message)
    }
}

impl fmt::Display for ErrorEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format_brief())
    }
}
