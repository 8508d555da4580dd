use std::fs;
use std::path::PathBuf;
use std::process::Command;
use tempfile::TempDir;

const REEXEC_VARS: [&str; 6] = [
    "REEXEC_CONFIG",
    "REEXEC_SSH_PATH",
    "REEXEC_RSYNC_PATH",
    "REEXEC_LOG_LEVEL",
    "REEXEC_LOG_JSON",
    "REEXEC_ENCODING",
];

/// The reexec binary with a clean `REEXEC_*` environment.
pub fn reexec() -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_reexec"));
    for var in REEXEC_VARS {
        command.env_remove(var);
    }
    command.env("REEXEC_LOG_LEVEL", "warn").env("NO_COLOR", "1");
    command
}

/// A settings file in its own temporary directory.
pub struct SettingsFile {
    pub dir: TempDir,
    pub path: PathBuf,
}

impl SettingsFile {
    pub fn new(contents: &str) -> Self {
        crate::test_log!("FIXTURE: Creating settings file");

        let dir = TempDir::new().expect("Failed to create temp dir");
        let path = dir.path().join("settings.toml");
        fs::write(&path, contents).expect("Failed to write settings");
        Self { dir, path }
    }

    pub fn path_arg(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }
}
