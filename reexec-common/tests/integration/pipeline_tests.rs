use super::common::{BUILD_TIMEOUT, assert_contains, init_test_logging, run_build, shell};
use regex::Regex;
use reexec_common::pipeline::PathRewrite;
use reexec_common::{
    ActiveContext, AsyncProcess, BufferSink, BuildContext, BuildDescriptor, BuildRequest,
    BuildResult, BuildRunner, ChannelListener, DiagnosticPatterns, PathConvention, PipelineError,
    PipelineState, ProcessEvent, ReexecSettings, SpawnOptions, StatusLog, TextEncoding,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

const GCC_REGEX: &str = r"^(..[^:]*):([0-9]+):?([0-9]+)?:? (.*)$";

#[tokio::test]
async fn test_commands_run_sequentially_with_one_report() {
    init_test_logging();
    crate::test_log!("TEST START: test_commands_run_sequentially_with_one_report");

    let dir = tempfile::tempdir().unwrap();
    let journal = dir.path().join("journal");
    let journal = journal.display();
    let commands = (1..=3)
        .map(|i| shell(&format!("echo start-{i} >> {journal}; sleep 0.1; echo end-{i} >> {journal}; echo out-{i}")))
        .collect();

    let (display, status, outcome) = run_build(BuildContext::default(), commands).await;
    let outcome = outcome.expect("outcome");

    let journal = std::fs::read_to_string(dir.path().join("journal")).unwrap();
    assert_eq!(
        journal,
        "start-1\nend-1\nstart-2\nend-2\nstart-3\nend-3\n",
        "commands overlapped"
    );
    assert_eq!(outcome.commands_started, 3);
    assert_eq!(outcome.result, BuildResult::Succeeded);

    let text = display.contents();
    assert!(text.starts_with("out-1\nout-2\nout-3\n"), "{text}");
    assert_eq!(text.matches("[Finished in ").count(), 1);
    let finished = Regex::new(r"\[Finished in \d+\.\ds\]$").unwrap();
    assert!(finished.is_match(text), "{text}");

    assert_eq!(status.messages().iter().filter(|m| *m == "Building").count(), 3);
    assert_eq!(status.last(), Some("Build finished"));

    crate::test_log!("TEST PASS: test_commands_run_sequentially_with_one_report");
}

#[tokio::test]
async fn test_cancel_stops_build_and_skips_queue() {
    init_test_logging();
    crate::test_log!("TEST START: test_cancel_stops_build_and_skips_queue");

    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("second-ran");
    let commands = vec![
        shell("echo started; sleep 30"),
        shell(&format!("touch {}", marker.display())),
    ];

    let mut runner = BuildRunner::new(BufferSink::new(), StatusLog::new());
    let outcome = tokio::time::timeout(
        BUILD_TIMEOUT,
        runner.run(
            BuildContext::default(),
            commands,
            tokio::time::sleep(Duration::from_millis(300)),
        ),
    )
    .await
    .expect("cancelled in time")
    .unwrap()
    .expect("outcome");

    assert_eq!(outcome.result, BuildResult::Cancelled);
    assert!(matches!(runner.controller().state(), PipelineState::Cancelled));
    assert_eq!(runner.controller().pending().count(), 0);

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(!marker.exists(), "queued command started after cancel");

    let text = runner.controller().display().contents();
    assert_eq!(text.matches("[Cancelled]").count(), 1);
    assert!(!text.contains("[Finished"));

    // A cancelled controller accepts the next build.
    let outcome = runner
        .run(BuildContext::default(), vec![shell("echo again")], std::future::pending())
        .await
        .unwrap()
        .expect("outcome");
    assert_eq!(outcome.result, BuildResult::Succeeded);
    assert_contains(runner.controller().display().contents(), "again\n");

    crate::test_log!("TEST PASS: test_cancel_stops_build_and_skips_queue");
}

#[tokio::test]
async fn test_decode_failure_does_not_stop_pipeline() {
    init_test_logging();

    let commands = vec![shell(r"printf '\377\376\n'"), shell("echo after")];
    let (display, _status, outcome) = run_build(BuildContext::default(), commands).await;

    let text = display.contents();
    assert!(
        text.starts_with("[Decode error - output not utf-8]\nafter\n"),
        "{text}"
    );
    assert_eq!(outcome.expect("outcome").result, BuildResult::Succeeded);
}

#[tokio::test]
async fn test_latin1_output_is_decoded() {
    init_test_logging();

    let context = BuildContext {
        encoding: TextEncoding::Latin1,
        ..Default::default()
    };
    let (display, _status, _) = run_build(context, vec![shell(r"printf 'caf\351\n'")]).await;
    assert!(display.contents().starts_with("café\n"));
}

#[tokio::test]
async fn test_failure_reports_exit_code_and_debug_context() {
    init_test_logging();

    let dir = tempfile::tempdir().unwrap();
    let context = BuildContext {
        working_dir: Some(dir.path().to_path_buf()),
        path: Some("/usr/bin:/bin".to_string()),
        ..Default::default()
    };
    let (display, _status, outcome) = run_build(context, vec![shell("echo failing; exit 3")]).await;

    assert_eq!(outcome.expect("outcome").result, BuildResult::Failed(3));
    let expected = Regex::new(&format!(
        r"^failing\n\[Finished in \d+\.\ds with exit code 3\]\n\[shell_cmd: echo failing; exit 3\]\n\[dir: {}\]\n\[path: /usr/bin:/bin\]$",
        regex::escape(&dir.path().display().to_string())
    ))
    .unwrap();
    assert!(expected.is_match(display.contents()), "{}", display.contents());
}

#[tokio::test]
async fn test_crlf_output_is_normalized() {
    init_test_logging();

    let (display, _status, _) = run_build(BuildContext::default(), vec![shell(r"printf 'a\r\nb\rc\n'")]).await;
    assert!(display.contents().starts_with("a\nb\nc\n"));
}

#[tokio::test]
async fn test_diagnostic_paths_are_rewritten_and_counted() {
    init_test_logging();

    let context = BuildContext {
        patterns: DiagnosticPatterns::new(Some(GCC_REGEX), None).unwrap(),
        rewrite: Some(PathRewrite {
            anchor: "/home/u/proj".to_string(),
            foreign: PathConvention::Posix,
            local: PathConvention::Posix,
        }),
        ..Default::default()
    };
    let commands = vec![shell(
        "echo 'compiling'; echo 'proj/src/main.c:3:1: error: boom'; echo '/srv/b/proj/lib/a.c:9: warning: w'",
    )];
    let (display, status, outcome) = run_build(context, commands).await;

    let text = display.contents();
    assert_contains(text, "compiling\n/home/u/proj/src/main.c:3:1: error: boom\n");
    assert_contains(text, "/home/u/proj/lib/a.c:9: warning: w\n");
    assert_eq!(outcome.expect("outcome").error_count, 2);
    assert_eq!(status.last(), Some("Build finished with 2 errors"));
}

#[tokio::test]
async fn test_paths_untouched_without_rewrite_anchor() {
    init_test_logging();

    let context = BuildContext {
        patterns: DiagnosticPatterns::new(Some(GCC_REGEX), None).unwrap(),
        ..Default::default()
    };
    let (display, _status, _) =
        run_build(context, vec![shell("echo 'proj/src/main.c:3:1: error: boom'")]).await;
    assert!(display.contents().starts_with("proj/src/main.c:3:1: error: boom\n"));
}

#[tokio::test]
async fn test_quiet_build_reports_no_markers() {
    init_test_logging();

    let context = BuildContext {
        quiet: true,
        ..Default::default()
    };
    let (display, status, _) = run_build(context, vec![shell("echo quiet; exit 2")]).await;
    assert_eq!(display.contents(), "quiet\n");
    assert!(!status.messages().iter().any(|m| m == "Building"));
    assert_eq!(status.last(), Some("Build finished"));
}

#[tokio::test]
async fn test_environment_overlay_and_build_env() {
    init_test_logging();

    let mut runner = BuildRunner::new(BufferSink::new(), StatusLog::new());
    runner.controller_mut().set_build_env(BTreeMap::from([
        ("REEXEC_TEST_A".to_string(), "view".to_string()),
        ("REEXEC_TEST_B".to_string(), "view".to_string()),
    ]));
    let context = BuildContext {
        env: BTreeMap::from([
            ("REEXEC_TEST_A".to_string(), "caller".to_string()),
            ("REEXEC_TEST_C".to_string(), "${REEXEC_TEST_SURELY_UNSET}".to_string()),
        ]),
        ..Default::default()
    };
    runner
        .run(
            context,
            vec![shell(r#"echo "$REEXEC_TEST_A $REEXEC_TEST_B $REEXEC_TEST_C""#)],
            std::future::pending(),
        )
        .await
        .unwrap();

    assert!(
        runner
            .controller()
            .display()
            .contents()
            .starts_with("caller view ${REEXEC_TEST_SURELY_UNSET}\n")
    );
}

#[tokio::test]
async fn test_second_build_while_running_is_rejected() {
    init_test_logging();

    let mut runner = BuildRunner::new(BufferSink::new(), StatusLog::new());
    runner
        .controller_mut()
        .begin(BuildContext::default(), vec![shell("sleep 30")])
        .unwrap();

    let err = runner
        .controller_mut()
        .begin(BuildContext::default(), vec![shell("echo other")])
        .unwrap_err();
    assert_eq!(err, PipelineError::Busy);

    assert!(runner.controller_mut().kill());
    assert!(!runner.controller_mut().kill(), "second kill is a no-op");
    assert_eq!(runner.controller().display().contents(), "[Cancelled]");
}

#[tokio::test]
async fn test_spawn_failure_mid_pipeline_finishes_build() {
    init_test_logging();

    let commands = vec![
        shell("echo first"),
        reexec_common::Command::argv(["reexec-definitely-not-a-program"]).unwrap(),
        shell("echo never"),
    ];
    let (display, _status, outcome) = run_build(BuildContext::default(), commands).await;

    let outcome = outcome.expect("outcome");
    assert_eq!(outcome.result, BuildResult::SpawnFailed);
    assert_eq!(outcome.commands_started, 1);
    let text = display.contents();
    assert!(text.starts_with("first\n"));
    assert!(text.ends_with("[Finished]"));
    assert!(!text.contains("never"));
}

#[tokio::test]
async fn test_signalled_command_reports_plain_finish() {
    init_test_logging();

    let (display, _status, outcome) =
        run_build(BuildContext::default(), vec![shell("echo dying; kill -9 $$")]).await;

    assert_eq!(outcome.expect("outcome").result, BuildResult::Succeeded);
    let text = display.contents();
    let finished = Regex::new(r"^dying\n\[Finished in \d+\.\ds\]$").unwrap();
    assert!(finished.is_match(text), "{text}");
    assert!(!text.contains("with exit code"));
    assert!(!text.contains("[shell_cmd:"));
}

#[tokio::test]
async fn test_output_of_stale_process_is_discarded() {
    init_test_logging();
    crate::test_log!("TEST START: test_output_of_stale_process_is_discarded");

    let (foreign_listener, _foreign_events) = ChannelListener::channel();
    let stale = AsyncProcess::start(
        shell("sleep 30"),
        &SpawnOptions::default(),
        Arc::new(foreign_listener),
    )
    .expect("spawn stale process");

    let mut runner = BuildRunner::new(BufferSink::new(), StatusLog::new());
    runner
        .controller_mut()
        .begin(BuildContext::default(), vec![shell("sleep 30")])
        .unwrap();

    runner.dispatch(ProcessEvent::Data {
        process: stale.clone(),
        data: b"stale output\n".to_vec(),
    });
    runner.dispatch(ProcessEvent::Finished { process: stale.clone() });

    assert!(stale.is_killed());
    assert!(runner.controller().is_active(), "stale completion ended the build");
    assert!(!runner.controller().display().contents().contains("stale output"));

    assert!(runner.controller_mut().kill());
    assert_eq!(runner.controller().display().contents(), "[Cancelled]");
    crate::test_log!("TEST PASS: test_output_of_stale_process_is_discarded");
}

#[tokio::test]
async fn test_remote_build_runs_in_home_relative_root() {
    init_test_logging();
    crate::test_log!("TEST START: test_remote_build_runs_in_home_relative_root");

    let dir = tempfile::tempdir().unwrap();
    let home = dir.path().join("home");
    std::fs::create_dir(&home).unwrap();

    // Stands in for ssh: drops the host and runs the remote command locally.
    let fake_ssh = dir.path().join("fake-ssh");
    std::fs::write(&fake_ssh, "shift\nexec sh -c \"$*\"\n").unwrap();

    let settings_path = dir.path().join("settings.toml");
    std::fs::write(
        &settings_path,
        format!(
            "ssh_path = 'sh {}'\nrsync_path = 'true'\n\n[[servers]]\nname = \"box\"\nhost = \"h\"\nroot_directory = \"~/builds/proj\"\nremote_cmd = \"pwd\"\n",
            fake_ssh.display()
        ),
    )
    .unwrap();
    let settings = ReexecSettings::load(Some(&settings_path)).unwrap();

    let descriptor = BuildDescriptor::from_json(
        &serde_json::json!({
            "remote_server": "box",
            "local_sync_root": dir.path().join("src").display().to_string(),
            "env": {"HOME": home.display().to_string()},
        })
        .to_string(),
    )
    .unwrap();
    let BuildRequest::Build(plan) = descriptor
        .prepare(&settings, &ActiveContext::default(), TextEncoding::Utf8)
        .unwrap()
    else {
        panic!("expected a build");
    };
    assert_eq!(plan.commands.len(), 3);

    let (display, _status, outcome) = run_build(plan.context, plan.commands).await;

    let text = display.contents();
    assert_eq!(outcome.expect("outcome").result, BuildResult::Succeeded, "{text}");
    assert!(
        text.starts_with(&format!("{}/builds/proj\n[Finished in ", home.display())),
        "{text}"
    );
    assert!(home.join("builds/proj").is_dir());
    crate::test_log!("TEST PASS: test_remote_build_runs_in_home_relative_root");
}
