use reexec_common::{BufferSink, BuildContext, BuildOutcome, BuildRunner, Command, StatusLog};
use std::time::Duration;

pub const BUILD_TIMEOUT: Duration = Duration::from_secs(30);

pub fn shell(line: &str) -> Command {
    Command::shell(line).expect("non-empty shell command")
}

/// Run a build to completion and return what the sinks received.
pub async fn run_build(
    context: BuildContext,
    commands: Vec<Command>,
) -> (BufferSink, StatusLog, Option<BuildOutcome>) {
    let mut runner = BuildRunner::new(BufferSink::new(), StatusLog::new());
    let outcome = tokio::time::timeout(
        BUILD_TIMEOUT,
        runner.run(context, commands, std::future::pending()),
    )
    .await
    .expect("build finished in time")
    .expect("runner was idle");
    let (display, status) = runner.into_parts();
    (display, status, outcome)
}
