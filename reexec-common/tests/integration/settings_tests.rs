use super::common::init_test_logging;
use reexec_common::{
    ActiveContext, BuildDescriptor, BuildRequest, Cataloged, ConfigError, ErrorCode,
    ReexecSettings, TextEncoding,
};
use std::path::PathBuf;

const SETTINGS: &str = r#"
ssh_options = "-o BatchMode=yes"
rsync_options = "-az"

[build_env]
CC = "clang"

[[servers]]
name = "linux"
host = "build.example.org"
user = "ci"
port = 2222
root_directory = "/srv/build"
remote_cmd = "make -j8"
"#;

fn write_settings(contents: &str) -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("settings.toml");
    std::fs::write(&path, contents).unwrap();
    (dir, path)
}

#[cfg(unix)]
#[test]
fn test_settings_file_drives_remote_plan() {
    init_test_logging();
    crate::test_log!("TEST START: test_settings_file_drives_remote_plan");

    let (_dir, path) = write_settings(SETTINGS);
    let settings = ReexecSettings::load(Some(&path)).unwrap();
    assert_eq!(settings.origin.as_deref(), Some(path.as_path()));

    let descriptor = BuildDescriptor::from_json(
        r#"{"remote_server": "linux", "file_regex": "^(..[^:]*):([0-9]+):?([0-9]+)?:? (.*)$"}"#,
    )
    .unwrap();
    let active = ActiveContext {
        project_file: Some(PathBuf::from("/home/u/proj/proj.sublime-project")),
        current_file: Some(PathBuf::from("/home/u/proj/src/main.c")),
    };

    let BuildRequest::Build(plan) = descriptor
        .prepare(&settings, &active, TextEncoding::Utf8)
        .unwrap()
    else {
        panic!("expected a build");
    };

    let lines: Vec<String> = plan.commands.iter().map(|c| c.display_line()).collect();
    assert_eq!(
        lines,
        vec![
            "ssh -o BatchMode=yes -p 2222 ci@build.example.org mkdir -p /srv/build/proj",
            "rsync -az -e \"ssh -o BatchMode=yes -p 2222\" /home/u/proj/ ci@build.example.org:/srv/build/proj",
            "ssh -o BatchMode=yes -p 2222 ci@build.example.org \"cd /srv/build/proj && make -j8\"",
        ]
    );
    let rewrite = plan.context.rewrite.expect("remote builds rewrite paths");
    assert_eq!(rewrite.anchor, "/home/u/proj");
    assert!(plan.context.patterns.has_file_pattern());

    crate::test_log!("TEST PASS: test_settings_file_drives_remote_plan");
}

#[cfg(unix)]
#[test]
fn test_local_command_precedes_remote_commands() {
    init_test_logging();

    let (_dir, path) = write_settings(SETTINGS);
    let settings = ReexecSettings::load(Some(&path)).unwrap();
    let descriptor = BuildDescriptor::from_json(
        r#"{"shell_cmd": "make dist", "remote_server": "linux", "remote_cmd": "make check"}"#,
    )
    .unwrap();
    let active = ActiveContext {
        project_file: None,
        current_file: Some(PathBuf::from("/home/u/notes/a.c")),
    };

    let BuildRequest::Build(plan) = descriptor
        .prepare(&settings, &active, TextEncoding::Utf8)
        .unwrap()
    else {
        panic!("expected a build");
    };

    assert_eq!(plan.commands.len(), 4);
    assert_eq!(plan.commands[0].display_line(), "make dist");
    assert!(plan.commands[3].display_line().ends_with("\"cd /srv/build && make check\""));
    assert_eq!(plan.context.working_dir, Some(PathBuf::from("/home/u/notes")));
}

#[test]
fn test_duplicate_servers_are_rejected() {
    init_test_logging();

    let (_dir, path) = write_settings(
        r#"
        [[servers]]
        name = "x"
        host = "a"
        root_directory = "/r"

        [[servers]]
        name = "x"
        host = "b"
        root_directory = "/s"
        "#,
    );
    let err = ReexecSettings::load(Some(&path)).unwrap_err();
    assert!(matches!(&err, ConfigError::DuplicateServer(name) if name == "x"));
    assert_eq!(err.to_string(), "duplicate \"x\" servers");
    assert_eq!(err.error_code(), ErrorCode::ConfigDuplicateServer);
}

#[test]
fn test_missing_server_parameter_names_the_entry() {
    init_test_logging();

    let (_dir, path) = write_settings(
        r#"
        [[servers]]
        name = "x"
        root_directory = "/r"
        "#,
    );
    let err = ReexecSettings::load(Some(&path)).unwrap_err();
    assert!(matches!(
        err,
        ConfigError::MissingParameter {
            index: 0,
            param: "host"
        }
    ));
}

#[test]
fn test_explicit_settings_path_must_exist() {
    init_test_logging();

    let dir = tempfile::tempdir().unwrap();
    let err = ReexecSettings::load(Some(&dir.path().join("missing.toml"))).unwrap_err();
    assert!(matches!(err, ConfigError::Read { .. }));
    assert_eq!(err.error_code(), ErrorCode::ConfigNotFound);
}

#[test]
fn test_malformed_settings_report_parse_error() {
    init_test_logging();

    let (_dir, path) = write_settings("servers = [");
    let err = ReexecSettings::load(Some(&path)).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }));
    assert_eq!(err.error_code().code_string(), "RX-E003");
}
