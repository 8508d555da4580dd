//! Subcommand handlers.

mod build;
mod settings;

pub use build::{plan, run};
pub use settings::{check, servers};

use anyhow::Result;
use reexec_common::{EnvOverrides, ReexecSettings};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Settings file selection: `--config`, then `REEXEC_CONFIG`, then the
/// standard location.
pub fn settings_path(cli_config: Option<&Path>, env: &EnvOverrides) -> Option<PathBuf> {
    cli_config
        .map(Path::to_path_buf)
        .or_else(|| env.config.value.clone())
}

/// Load the settings and apply the `REEXEC_*` tool overrides.
pub fn load_settings(cli_config: Option<&Path>, env: &EnvOverrides) -> Result<ReexecSettings> {
    let path = settings_path(cli_config, env);
    debug!(path = ?path, "loading settings");
    let mut settings = ReexecSettings::load(path.as_deref())?;
    settings.apply_env(env);
    Ok(settings)
}
