//! Error catalog and code mapping for reexec.
//!
//! Every subsystem error maps onto a catalog [`ErrorCode`] so the CLI can
//! print a stable code with remediation steps.
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

pub mod catalog;

pub use catalog::{ErrorCategory, ErrorCode, ErrorEntry};

use crate::config::{ConfigError, EnvError};
use crate::descriptor::DescriptorError;
use crate::encoding::{DecodeError, UnknownEncoding};
use crate::logging::LoggingError;
use crate::pipeline::PipelineError;
use crate::process::ProcessError;
use crate::remote::PlanError;

/// An error with a catalog code.
pub trait Cataloged {
    fn error_code(&self) -> ErrorCode;

    fn catalog_entry(&self) -> ErrorEntry {
        self.error_code().entry()
    }
}

impl Cataloged for ConfigError {
    fn error_code(&self) -> ErrorCode {
        match self {
            Self::Read { source, .. } if source.kind() == std::io::ErrorKind::NotFound => {
                ErrorCode::ConfigNotFound
            }
            Self::Read { .. } => ErrorCode::ConfigReadError,
            Self::Parse { .. } => ErrorCode::ConfigParseError,
            Self::MissingParameter { .. } => ErrorCode::ConfigMissingParameter,
            Self::EmptyParameter { .. } => ErrorCode::ConfigEmptyParameter,
            Self::DuplicateServer(_) => ErrorCode::ConfigDuplicateServer,
            Self::EmptySetting(_) => ErrorCode::ConfigEmptyToolPath,
            Self::InvalidValue { .. } => ErrorCode::ConfigInvalidValue,
        }
    }
}

impl Cataloged for EnvError {
    fn error_code(&self) -> ErrorCode {
        ErrorCode::ConfigEnvError
    }
}

impl Cataloged for PlanError {
    fn error_code(&self) -> ErrorCode {
        match self {
            Self::UnknownServer(_) => ErrorCode::RemoteUnknownServer,
            Self::NoActiveContext => ErrorCode::RemoteNoActiveContext,
        }
    }
}

impl Cataloged for ProcessError {
    fn error_code(&self) -> ErrorCode {
        match self {
            Self::InvalidArgument(_) => ErrorCode::ProcessInvalidCommand,
            Self::Spawn { .. } => ErrorCode::ProcessSpawnFailed,
            Self::Reader(_) => ErrorCode::ProcessReaderFailed,
        }
    }
}

impl Cataloged for PipelineError {
    fn error_code(&self) -> ErrorCode {
        match self {
            Self::Busy => ErrorCode::ProcessBuildBusy,
        }
    }
}

impl Cataloged for DescriptorError {
    fn error_code(&self) -> ErrorCode {
        match self {
            Self::Parse(_) => ErrorCode::DescriptorParseError,
            Self::Pattern(_) => ErrorCode::DescriptorInvalidPattern,
            Self::Command(err) => err.error_code(),
            Self::Plan(err) => err.error_code(),
        }
    }
}

impl Cataloged for LoggingError {
    fn error_code(&self) -> ErrorCode {
        ErrorCode::InternalLogging
    }
}

impl Cataloged for DecodeError {
    fn error_code(&self) -> ErrorCode {
        ErrorCode::OutputDecodeError
    }
}

impl Cataloged for UnknownEncoding {
    fn error_code(&self) -> ErrorCode {
        ErrorCode::OutputUnknownEncoding
    }
}
