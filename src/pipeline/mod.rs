use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::FutureExt;

use crate::{
    config::Config,
    core::{
        domain::{
            CompilationLimits, ExecutionLimits, ExecutionResult, FailureKind, Language,
            Submission, SubmissionError,
        },
        traits::{compiler::Compiler, runner::Runner},
    },
    native::{
        compiler::NativeCompiler,
        runner::NativeRunner,
        toolchain::Toolchains,
        workspace::{Workspace, WorkspaceError, WorkspaceManager},
    },
};

mod compiling;
pub mod in_flight;
mod running;

use compiling::compile_workspace;
use in_flight::InFlight;
use running::run_workspace;

/// Compile-and-run pipeline: one workspace, one compile attempt and one run
/// attempt per submission.
///
/// Cheap to clone; clones share the in-flight registry.
#[derive(Clone, Debug)]
pub struct Pipeline {
    workspaces: WorkspaceManager,
    compiler: Arc<dyn Compiler>,
    runner: Arc<dyn Runner>,
    compilation_limits: CompilationLimits,
    execution_limits: ExecutionLimits,
    in_flight: InFlight,
}

impl Pipeline {
    pub fn new(
        workspaces: WorkspaceManager,
        compiler: Arc<dyn Compiler>,
        runner: Arc<dyn Runner>,
        compilation_limits: CompilationLimits,
        execution_limits: ExecutionLimits,
    ) -> Self {
        Self {
            workspaces,
            compiler,
            runner,
            compilation_limits,
            execution_limits,
            in_flight: InFlight::new(),
        }
    }

    /// Native toolchain and runner wired from configuration.
    pub fn from_config(config: &Config) -> Result<Self, WorkspaceError> {
        let toolchains = Toolchains::gnu(&config.gnucpp_path, &config.gnuc_path);

        Ok(Self::new(
            WorkspaceManager::new(&config.scratch_root)?,
            Arc::new(NativeCompiler::new(toolchains)),
            Arc::new(NativeRunner::new()),
            config.compilation_limits(),
            config.execution_limits(),
        ))
    }

    /// Number of `execute` calls currently in progress.
    pub fn in_flight(&self) -> usize {
        self.in_flight.count()
    }

    /// Start time of the longest-running `execute` call, if any.
    pub fn oldest_in_flight(&self) -> Option<DateTime<Utc>> {
        self.in_flight.oldest()
    }

    /// Entry point for callers holding raw request fields.
    pub async fn execute_source(
        &self,
        code: &str,
        stdin: &str,
        language: Language,
    ) -> ExecutionResult {
        match Submission::new(code, stdin, language) {
            Ok(submission) => self.execute(&submission).await,
            Err(e @ SubmissionError::EmptySource) => {
                ExecutionResult::failure(FailureKind::CompileError, e.to_string())
            }
        }
    }

    #[tracing::instrument(skip_all, fields(language = %submission.language()))]
    pub async fn execute(&self, submission: &Submission) -> ExecutionResult {
        let _ticket = self.in_flight.enter();

        let mut workspace = match self.workspaces.allocate(submission.language()).await {
            Ok(workspace) => workspace,
            Err(e) => {
                tracing::error!("Failed to allocate workspace: {}", e);
                return ExecutionResult::failure(
                    FailureKind::InternalError,
                    "failed to allocate workspace",
                );
            }
        };

        let result = AssertUnwindSafe(self.execute_in(&workspace, submission))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| {
                tracing::error!("Pipeline panicked in workspace {}", workspace.id());
                ExecutionResult::failure(FailureKind::InternalError, "internal fault")
            });

        workspace.release().await;

        match &result {
            ExecutionResult::Success { output } => {
                tracing::info!("Execution succeeded with {} bytes of output", output.len())
            }
            ExecutionResult::Failure { kind, .. } => tracing::info!("Execution failed: {}", kind),
        }
        result
    }

    async fn execute_in(&self, workspace: &Workspace, submission: &Submission) -> ExecutionResult {
        let written = async {
            workspace.write_source(submission.code()).await?;
            workspace.write_input(submission.stdin()).await
        };
        if let Err(e) = written.await {
            tracing::error!("Failed to prepare workspace {}: {}", workspace.id(), e);
            return ExecutionResult::failure(
                FailureKind::InternalError,
                "failed to write submission to workspace",
            );
        }

        if let Err(result) = compile_workspace(
            self.compiler.as_ref(),
            workspace,
            submission.language(),
            &self.compilation_limits,
        )
        .await
        {
            return result;
        }

        run_workspace(self.runner.as_ref(), workspace, &self.execution_limits).await
    }
}
