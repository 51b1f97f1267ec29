use crate::{
    core::{
        domain::{CompilationLimits, ExecutionResult, FailureKind, Language},
        traits::compiler::{CompileError, Compiler},
    },
    native::workspace::Workspace,
};

/// Compiles the workspace source. `Err` carries the result to hand back to
/// the caller when there is nothing to run.
pub(super) async fn compile_workspace(
    compiler: &dyn Compiler,
    workspace: &Workspace,
    language: Language,
    limits: &CompilationLimits,
) -> Result<(), ExecutionResult> {
    tracing::debug!("Start compiling");
    let compilation_result = compiler
        .compile(
            workspace.source(),
            workspace.executable(),
            &language,
            limits,
        )
        .await;
    tracing::debug!("Compilation result: {:?}", compilation_result);

    compilation_result.map_err(|e| match e {
        CompileError::CompilationFailed { msg } => {
            ExecutionResult::failure(FailureKind::CompileError, workspace.redact(&msg))
        }
        e @ CompileError::TimeLimitExceeded { .. } => {
            ExecutionResult::failure(FailureKind::CompileError, e.to_string())
        }
        CompileError::Internal { msg } => {
            tracing::error!("Internal error while compiling: {}", msg);
            ExecutionResult::failure(FailureKind::InternalError, "compiler unavailable")
        }
    })
}
