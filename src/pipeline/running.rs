use crate::{
    core::{
        domain::{ExecutionLimits, ExecutionResult, FailureKind},
        traits::runner::{RunError, Runner},
    },
    native::workspace::Workspace,
};

/// Runs the compiled workspace artifact and classifies the outcome.
pub(super) async fn run_workspace(
    runner: &dyn Runner,
    workspace: &Workspace,
    limits: &ExecutionLimits,
) -> ExecutionResult {
    tracing::debug!("Start running");
    let run_result = runner
        .run(workspace.executable(), workspace.input(), limits)
        .await;
    tracing::debug!("Run result: {:?}", run_result);

    match run_result {
        Ok(result) => ExecutionResult::Success {
            output: normalize_output(&result.stdout),
        },
        Err(RunError::Crash { msg, .. }) => {
            ExecutionResult::failure(FailureKind::RuntimeError, workspace.redact(&msg))
        }
        // Timeouts carry no detail beyond their kind.
        Err(RunError::TimeLimitExceeded { .. }) => {
            ExecutionResult::failure(FailureKind::Timeout, "")
        }
        Err(e @ (RunError::OutputLimitExceeded { .. } | RunError::DetachedProcess)) => {
            ExecutionResult::failure(FailureKind::RuntimeError, e.to_string())
        }
        Err(RunError::Internal { msg }) => {
            tracing::error!("Internal error while running: {}", msg);
            ExecutionResult::failure(FailureKind::InternalError, "executable could not be run")
        }
    }
}

/// Surrounding whitespace is not part of the answer; this makes `"5\n"` and
/// `"5\r\n"` compare equal on every platform.
fn normalize_output(stdout: &str) -> String {
    stdout.trim().to_string()
}
