//! Settings file: server profiles, tool paths and build environment.

use super::env::EnvOverrides;
use super::source::{ConfigSource, Sourced};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Parameters every server profile must define, non-empty.
const REQUIRED_SERVER_PARAMS: [&str; 3] = ["name", "root_directory", "host"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read settings file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse settings file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("\"{param}\" parameter is required (server #{index})")]
    MissingParameter { index: usize, param: &'static str },

    #[error("\"{param}\" parameter must not be empty (server #{index})")]
    EmptyParameter { index: usize, param: &'static str },

    #[error("duplicate \"{0}\" servers")]
    DuplicateServer(String),

    #[error("{0} must not be empty")]
    EmptySetting(&'static str),

    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Key-value view of the settings a build consults.
pub trait SettingsStore {
    fn get(&self, key: &str) -> Option<toml::Value>;

    /// File the settings were read from, if any.
    fn origin(&self) -> Option<&Path> {
        None
    }
}

/// Settings backed by a parsed TOML document.
#[derive(Debug, Clone, Default)]
pub struct TomlSettingsStore {
    table: toml::Table,
    path: Option<PathBuf>,
}

impl TomlSettingsStore {
    pub fn from_table(table: toml::Table) -> Self {
        Self { table, path: None }
    }

    /// Parse TOML text that did not come from a file.
    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        Self::parse_at(contents, PathBuf::from("<inline>")).map(|mut store| {
            store.path = None;
            store
        })
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse_at(&contents, path.to_path_buf())
    }

    fn parse_at(contents: &str, path: PathBuf) -> Result<Self, ConfigError> {
        match toml::from_str::<toml::Table>(contents) {
            Ok(table) => Ok(Self {
                table,
                path: Some(path),
            }),
            Err(source) => Err(ConfigError::Parse { path, source }),
        }
    }
}

impl SettingsStore for TomlSettingsStore {
    fn get(&self, key: &str) -> Option<toml::Value> {
        self.table.get(key).cloned()
    }

    fn origin(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

/// A named remote build target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerProfile {
    pub name: String,
    pub root_directory: String,
    pub host: String,
    #[serde(default, deserialize_with = "deserialize_port")]
    pub port: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub private_key: Option<String>,
    /// Replaces the global `ssh_options` for this server.
    #[serde(default)]
    pub ssh_options: Option<String>,
    /// Replaces the global (or default) `rsync_options` for this server.
    #[serde(default)]
    pub rsync_options: Option<String>,
    /// Used when a build does not supply its own remote command.
    #[serde(default)]
    pub remote_cmd: Option<String>,
}

impl ServerProfile {
    pub fn new(
        name: impl Into<String>,
        host: impl Into<String>,
        root_directory: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            root_directory: root_directory.into(),
            host: host.into(),
            port: None,
            user: None,
            private_key: None,
            ssh_options: None,
            rsync_options: None,
            remote_cmd: None,
        }
    }

    /// `user@host`, or just the host.
    pub fn destination(&self) -> String {
        match self.user.as_deref().filter(|user| !user.is_empty()) {
            Some(user) => format!("{user}@{}", self.host),
            None => self.host.clone(),
        }
    }
}

fn deserialize_port<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Port {
        Number(u16),
        Text(String),
    }

    Ok(match Option::<Port>::deserialize(deserializer)? {
        Some(Port::Number(port)) => Some(port.to_string()),
        Some(Port::Text(port)) if !port.is_empty() => Some(port),
        _ => None,
    })
}

/// Validated settings.
#[derive(Debug, Clone)]
pub struct ReexecSettings {
    pub ssh_path: Sourced<String>,
    pub rsync_path: Sourced<String>,
    /// Global ssh options, used by servers without their own.
    pub ssh_options: Option<String>,
    /// Global rsync options; the platform default applies when unset.
    pub rsync_options: Option<String>,
    pub servers: Vec<ServerProfile>,
    /// Environment overrides applied to every build.
    pub build_env: BTreeMap<String, String>,
    /// Settings file, when one was read.
    pub origin: Option<PathBuf>,
}

impl Default for ReexecSettings {
    fn default() -> Self {
        Self {
            ssh_path: Sourced::default_value("ssh".to_string()),
            rsync_path: Sourced::default_value("rsync".to_string()),
            ssh_options: None,
            rsync_options: None,
            servers: Vec::new(),
            build_env: BTreeMap::new(),
            origin: None,
        }
    }
}

impl ReexecSettings {
    /// Standard settings file location (`<config_dir>/reexec/settings.toml`).
    pub fn default_path() -> Option<PathBuf> {
        directories::BaseDirs::new().map(|dirs| dirs.config_dir().join("reexec").join("settings.toml"))
    }

    /// Load settings from `path`, or from the standard location. A missing
    /// file at the standard location yields the defaults; an explicit path
    /// must exist.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let store = match path {
            Some(path) => TomlSettingsStore::load(path)?,
            None => match Self::default_path() {
                Some(path) if path.exists() => TomlSettingsStore::load(&path)?,
                _ => {
                    debug!("no settings file, using defaults");
                    return Ok(Self::default());
                }
            },
        };
        Self::from_store(&store)
    }

    /// Read and validate every setting from `store`.
    pub fn from_store(store: &dyn SettingsStore) -> Result<Self, ConfigError> {
        let source = match store.origin() {
            Some(path) => ConfigSource::File(path.to_path_buf()),
            None => ConfigSource::Default,
        };

        let ssh_path = tool_path(store, "ssh_path", "ssh", &source)?;
        let rsync_path = tool_path(store, "rsync_path", "rsync", &source)?;
        let ssh_options = optional_string(store, "ssh_options")?;
        let rsync_options = optional_string(store, "rsync_options")?;
        let build_env = string_table(store, "build_env")?;
        let servers = servers(store)?;

        debug!(
            servers = servers.len(),
            origin = ?store.origin(),
            "settings loaded"
        );
        Ok(Self {
            ssh_path,
            rsync_path,
            ssh_options,
            rsync_options,
            servers,
            build_env,
            origin: store.origin().map(Path::to_path_buf),
        })
    }

    /// Apply `REEXEC_SSH_PATH` / `REEXEC_RSYNC_PATH`.
    pub fn apply_env(&mut self, overrides: &EnvOverrides) {
        if let (Some(path), Some(var)) = (&overrides.ssh_path.value, &overrides.ssh_path.env_var) {
            self.ssh_path = Sourced::from_env(path.clone(), var.clone());
        }
        if let (Some(path), Some(var)) = (&overrides.rsync_path.value, &overrides.rsync_path.env_var) {
            self.rsync_path = Sourced::from_env(path.clone(), var.clone());
        }
    }

    /// Profile with exactly this name.
    pub fn server(&self, name: &str) -> Option<&ServerProfile> {
        self.servers.iter().find(|server| server.name == name)
    }
}

fn tool_path(
    store: &dyn SettingsStore,
    key: &'static str,
    default: &str,
    source: &ConfigSource,
) -> Result<Sourced<String>, ConfigError> {
    match optional_string(store, key)? {
        Some(path) if path.trim().is_empty() => Err(ConfigError::EmptySetting(key)),
        Some(path) => Ok(Sourced {
            value: path,
            source: source.clone(),
            env_var: None,
        }),
        None => Ok(Sourced::default_value(default.to_string())),
    }
}

fn optional_string(store: &dyn SettingsStore, key: &str) -> Result<Option<String>, ConfigError> {
    match store.get(key) {
        None => Ok(None),
        Some(toml::Value::String(value)) => Ok(Some(value)),
        Some(other) => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected a string, got {}", other.type_str()),
        }),
    }
}

fn string_table(
    store: &dyn SettingsStore,
    key: &str,
) -> Result<BTreeMap<String, String>, ConfigError> {
    let Some(value) = store.get(key) else {
        return Ok(BTreeMap::new());
    };
    let toml::Value::Table(table) = value else {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected a table, got {}", value.type_str()),
        });
    };

    table
        .into_iter()
        .map(|(name, value)| match value {
            toml::Value::String(value) => Ok((name, value)),
            other => Err(ConfigError::InvalidValue {
                key: format!("{key}.{name}"),
                message: format!("expected a string, got {}", other.type_str()),
            }),
        })
        .collect()
}

fn servers(store: &dyn SettingsStore) -> Result<Vec<ServerProfile>, ConfigError> {
    let entries = match store.get("servers") {
        None => return Ok(Vec::new()),
        Some(toml::Value::Array(entries)) => entries,
        Some(other) => {
            return Err(ConfigError::InvalidValue {
                key: "servers".to_string(),
                message: format!("expected an array, got {}", other.type_str()),
            });
        }
    };

    let mut names = HashSet::new();
    let mut servers = Vec::with_capacity(entries.len());
    for (index, entry) in entries.into_iter().enumerate() {
        let Some(table) = entry.as_table() else {
            return Err(ConfigError::InvalidValue {
                key: format!("servers[{index}]"),
                message: format!("expected a table, got {}", entry.type_str()),
            });
        };
        for param in REQUIRED_SERVER_PARAMS {
            match table.get(param) {
                None => return Err(ConfigError::MissingParameter { index, param }),
                Some(toml::Value::String(value)) if value.is_empty() => {
                    return Err(ConfigError::EmptyParameter { index, param });
                }
                _ => {}
            }
        }

        let server: ServerProfile =
            entry.try_into().map_err(|err: toml::de::Error| ConfigError::InvalidValue {
                key: format!("servers[{index}]"),
                message: err.to_string().trim().to_string(),
            })?;
        if !names.insert(server.name.clone()) {
            return Err(ConfigError::DuplicateServer(server.name));
        }
        servers.push(server);
    }
    Ok(servers)
}
