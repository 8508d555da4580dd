//! Environment variable parsing with type safety.
//!
//! Reads `REEXEC_*` variables, collecting every problem so they can be
//! reported together, and records where each value came from.

use super::source::{ConfigSource, Sourced};
use crate::encoding::TextEncoding;
use std::env;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during environment variable parsing.
#[derive(Debug, Error)]
pub enum EnvError {
    /// Invalid value for a variable.
    #[error("Invalid value for {var}: expected {expected}, got '{value}'")]
    InvalidValue {
        var: String,
        expected: String,
        value: String,
    },

    /// Path does not exist.
    #[error("Path not found for {var}: {path}")]
    PathNotFound { var: String, path: PathBuf },

    /// Invalid log level.
    #[error("Invalid log level for {var}: {value}")]
    InvalidLogLevel { var: String, value: String },
}

/// Type-safe environment variable parser.
pub struct EnvParser {
    prefix: &'static str,
    errors: Vec<EnvError>,
}

impl EnvParser {
    /// Create a new parser with the REEXEC_ prefix.
    pub fn new() -> Self {
        Self {
            prefix: "REEXEC_",
            errors: Vec::new(),
        }
    }

    pub fn errors(&self) -> &[EnvError] {
        &self.errors
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn take_errors(&mut self) -> Vec<EnvError> {
        std::mem::take(&mut self.errors)
    }

    fn var_name(&self, name: &str) -> String {
        format!("{}{}", self.prefix, name)
    }

    /// Get a boolean value with default.
    ///
    /// Accepts: 1, true, yes, on (for true)
    ///          0, false, no, off, "" (for false)
    pub fn get_bool(&mut self, name: &str, default: bool) -> Sourced<bool> {
        let var_name = self.var_name(name);
        match env::var(&var_name) {
            Ok(value) => {
                let parsed = match value.to_lowercase().as_str() {
                    "1" | "true" | "yes" | "on" => true,
                    "0" | "false" | "no" | "off" | "" => false,
                    _ => {
                        self.errors.push(EnvError::InvalidValue {
                            var: var_name.clone(),
                            expected: "boolean (true/false/1/0/yes/no)".to_string(),
                            value: value.clone(),
                        });
                        default
                    }
                };
                Sourced::from_env(parsed, var_name)
            }
            Err(_) => Sourced::default_value(default),
        }
    }

    /// Get an optional path with `~` expansion (None if not set or empty).
    ///
    /// If `must_exist` is true, records an error if the path doesn't exist.
    pub fn get_optional_path(&mut self, name: &str, must_exist: bool) -> Sourced<Option<PathBuf>> {
        let var_name = self.var_name(name);
        let value = match env::var(&var_name) {
            Ok(value) if value.is_empty() => return Sourced::from_env(None, var_name),
            Ok(value) => value,
            Err(_) => return Sourced::default_value(None),
        };

        let expanded = PathBuf::from(shellexpand::tilde(&value).as_ref());
        if must_exist && !expanded.exists() {
            self.errors.push(EnvError::PathNotFound {
                var: var_name.clone(),
                path: expanded.clone(),
            });
        }
        Sourced::from_env(Some(expanded), var_name)
    }

    /// Get a log level value with validation.
    pub fn get_log_level(&mut self, name: &str, default: &str) -> Sourced<String> {
        let var_name = self.var_name(name);
        match env::var(&var_name) {
            Ok(value) => {
                let lower = value.to_lowercase();
                match lower.as_str() {
                    "trace" | "debug" | "info" | "warn" | "error" | "off" => {
                        Sourced::from_env(lower, var_name)
                    }
                    _ => {
                        self.errors.push(EnvError::InvalidLogLevel {
                            var: var_name.clone(),
                            value: value.clone(),
                        });
                        Sourced::from_env(default.to_string(), var_name)
                    }
                }
            }
            Err(_) => Sourced::default_value(default.to_string()),
        }
    }

    /// Get an optional string (None if not set or empty).
    pub fn get_optional_string(&mut self, name: &str) -> Sourced<Option<String>> {
        let var_name = self.var_name(name);
        match env::var(&var_name) {
            Ok(value) if value.is_empty() => Sourced::from_env(None, var_name),
            Ok(value) => Sourced::from_env(Some(value), var_name),
            Err(_) => Sourced::default_value(None),
        }
    }

    /// Get an output encoding label.
    pub fn get_encoding(&mut self, name: &str, default: TextEncoding) -> Sourced<TextEncoding> {
        let var_name = self.var_name(name);
        match env::var(&var_name) {
            Ok(value) => match value.parse::<TextEncoding>() {
                Ok(encoding) => Sourced::from_env(encoding, var_name),
                Err(_) => {
                    self.errors.push(EnvError::InvalidValue {
                        var: var_name.clone(),
                        expected: "utf-8, ascii or latin-1".to_string(),
                        value,
                    });
                    Sourced::from_env(default, var_name)
                }
            },
            Err(_) => Sourced::default_value(default),
        }
    }
}

impl Default for EnvParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Every `REEXEC_*` variable the tool understands.
#[derive(Debug, Clone)]
pub struct EnvOverrides {
    /// `REEXEC_CONFIG`: settings file location.
    pub config: Sourced<Option<PathBuf>>,
    pub ssh_path: Sourced<Option<String>>,
    pub rsync_path: Sourced<Option<String>>,
    pub log_level: Sourced<String>,
    pub log_json: Sourced<bool>,
    /// Default output encoding when a build does not name one.
    pub encoding: Sourced<TextEncoding>,
}

impl EnvOverrides {
    /// Read all variables. Invalid values fall back to their defaults and
    /// are returned alongside.
    pub fn from_env() -> (Self, Vec<EnvError>) {
        let mut parser = EnvParser::new();
        let overrides = Self {
            config: parser.get_optional_path("CONFIG", true),
            ssh_path: parser.get_optional_string("SSH_PATH"),
            rsync_path: parser.get_optional_string("RSYNC_PATH"),
            log_level: parser.get_log_level("LOG_LEVEL", "info"),
            log_json: parser.get_bool("LOG_JSON", false),
            encoding: parser.get_encoding("ENCODING", TextEncoding::default()),
        };
        (overrides, parser.take_errors())
    }

    /// Whether any variable was set.
    pub fn any_set(&self) -> bool {
        [
            &self.config.source,
            &self.ssh_path.source,
            &self.rsync_path.source,
            &self.log_level.source,
            &self.log_json.source,
            &self.encoding.source,
        ]
        .into_iter()
        .any(|source| *source != ConfigSource::Default)
    }
}
