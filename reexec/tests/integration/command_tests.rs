use crate::common::{SettingsFile, assert_contains, reexec};

const SERVERS: &str = r#"
[[servers]]
name = "linux"
host = "build.example.org"
user = "ci"
port = 2222
root_directory = "/srv/build"

[[servers]]
name = "mac"
host = "mini.local"
root_directory = "/Users/ci/build"
remote_cmd = "make"
"#;

#[test]
fn test_reexec_help_includes_description() {
    crate::test_log!("TEST START: test_reexec_help_includes_description");

    let output = reexec().arg("--help").output().expect("Failed to run reexec --help");

    assert!(output.status.success(), "reexec --help failed");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_contains(&stdout, "streamed pipeline");
    for command in ["run", "plan", "servers", "check"] {
        assert_contains(&stdout, command);
    }
    crate::test_log!("TEST PASS: test_reexec_help_includes_description");
}

#[cfg(unix)]
#[test]
fn test_run_streams_output_and_finishes() {
    crate::test_log!("TEST START: test_run_streams_output_and_finishes");

    let settings = SettingsFile::new("");
    let output = reexec()
        .args(["--config", &settings.path_arg(), "run", "--", "echo", "hello"])
        .output()
        .expect("Failed to run reexec run");

    assert!(output.status.success(), "{output:?}");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("hello\n[Finished in "), "{stdout}");
    assert!(stdout.ends_with("s]\n"), "{stdout}");

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert_contains(&stderr, "reexec: Building");
    assert_contains(&stderr, "reexec: Build finished");
    crate::test_log!("TEST PASS: test_run_streams_output_and_finishes");
}

#[cfg(unix)]
#[test]
fn test_run_exit_code_mirrors_last_command() {
    let settings = SettingsFile::new("");
    let output = reexec()
        .args(["--config", &settings.path_arg(), "run", "-C"])
        .arg(settings.dir.path())
        .args(["--", "echo", "bad;", "exit", "3"])
        .output()
        .expect("Failed to run reexec run");

    assert_eq!(output.status.code(), Some(3));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_contains(&stdout, "with exit code 3]\n[shell_cmd: echo bad; exit 3]\n[dir: ");
    assert_contains(&stdout, &format!("[dir: {}]", settings.dir.path().display()));
}

#[cfg(unix)]
#[test]
fn test_run_applies_env_and_build_env() {
    let settings = SettingsFile::new(
        r#"
        [build_env]
        REEXEC_TEST_GREETING = "from-settings"
        REEXEC_TEST_TARGET = "from-settings"
        "#,
    );
    let output = reexec()
        .args(["--config", &settings.path_arg(), "run", "-q"])
        .args(["-e", "REEXEC_TEST_GREETING=from-flag"])
        .args(["--", "echo", "$REEXEC_TEST_GREETING", "$REEXEC_TEST_TARGET"])
        .output()
        .expect("Failed to run reexec run");

    assert!(output.status.success(), "{output:?}");
    assert_eq!(String::from_utf8_lossy(&output.stdout), "from-flag from-settings\n");
}

#[test]
fn test_run_without_command_reports_nothing_to_run() {
    let settings = SettingsFile::new("");
    let output = reexec()
        .args(["--config", &settings.path_arg(), "run"])
        .output()
        .expect("Failed to run reexec run");

    assert_eq!(output.status.code(), Some(2));
    assert_contains(&String::from_utf8_lossy(&output.stdout), "[Nothing to run:");
}

#[cfg(unix)]
#[test]
fn test_plan_prints_remote_commands() {
    crate::test_log!("TEST START: test_plan_prints_remote_commands");

    let settings = SettingsFile::new(SERVERS);
    let project_dir = settings.dir.path().join("proj");
    std::fs::create_dir(&project_dir).unwrap();
    let project = project_dir.join("proj.sublime-project");

    let output = reexec()
        .args(["--config", &settings.path_arg(), "plan", "-s", "mac", "--exclude", ".git"])
        .arg("--project")
        .arg(&project)
        .output()
        .expect("Failed to run reexec plan");

    assert!(output.status.success(), "{output:?}");
    let stdout = String::from_utf8_lossy(&output.stdout);
    let commands: Vec<&str> = stdout.lines().filter(|l| !l.starts_with('#')).collect();
    assert_eq!(commands.len(), 3, "{stdout}");
    assert_eq!(commands[0], "ssh mini.local mkdir -p /Users/ci/build/proj");
    assert!(commands[1].starts_with("rsync -avr --exclude=\".git\" -e \"ssh\" "), "{stdout}");
    assert!(commands[1].ends_with("/proj/ mini.local:/Users/ci/build/proj"), "{stdout}");
    assert_eq!(commands[2], "ssh mini.local \"cd /Users/ci/build/proj && make\"");
    crate::test_log!("TEST PASS: test_plan_prints_remote_commands");
}

#[test]
fn test_plan_unknown_server_is_cataloged() {
    let settings = SettingsFile::new(SERVERS);
    let output = reexec()
        .args(["--config", &settings.path_arg(), "plan", "-s", "nope", "--file", "main.c"])
        .output()
        .expect("Failed to run reexec plan");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert_contains(&stderr, "[RX-E100]");
    assert_contains(&stderr, "unknown remote server \"nope\"");
}

#[test]
fn test_servers_lists_profiles_as_json() {
    let settings = SettingsFile::new(SERVERS);
    let output = reexec()
        .args(["--config", &settings.path_arg(), "servers", "--json"])
        .output()
        .expect("Failed to run reexec servers");

    assert!(output.status.success(), "{output:?}");
    let servers: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(servers[0]["name"], "linux");
    assert_eq!(servers[0]["destination"], "ci@build.example.org");
    assert_eq!(servers[0]["port"], "2222");
    assert_eq!(servers[1]["remote_cmd"], "make");
}

#[test]
fn test_duplicate_servers_fail_to_load() {
    let settings = SettingsFile::new(
        r#"
        [[servers]]
        name = "x"
        host = "a"
        root_directory = "/r"

        [[servers]]
        name = "x"
        host = "b"
        root_directory = "/r"
        "#,
    );
    let output = reexec()
        .args(["--config", &settings.path_arg(), "servers"])
        .output()
        .expect("Failed to run reexec servers");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert_contains(&stderr, "[RX-E006]");
    assert_contains(&stderr, "duplicate \"x\" servers");
}

#[cfg(unix)]
#[test]
fn test_check_resolves_configured_tools() {
    let settings = SettingsFile::new("ssh_path = \"sh\"\nrsync_path = \"sh\"\n");
    let output = reexec()
        .args(["--config", &settings.path_arg(), "check"])
        .output()
        .expect("Failed to run reexec check");

    assert!(output.status.success(), "{output:?}");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_contains(&stdout, "0 server(s) configured");
    assert_contains(&stdout, &format!("[file {}]", settings.path.display()));
}

#[test]
fn test_check_reports_missing_tool() {
    let settings = SettingsFile::new("ssh_path = \"reexec-no-such-ssh\"\n");
    let output = reexec()
        .args(["--config", &settings.path_arg(), "check"])
        .output()
        .expect("Failed to run reexec check");

    assert!(!output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_contains(&stdout, "ssh: reexec-no-such-ssh");
    assert_contains(&stdout, "[RX-E102]");
}
