use std::path::Path;

use crate::core::domain::ExecutionLimits;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunResult {
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
    pub execution_time_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RunError {
    /// Non-zero exit; `msg` is stderr or, when that is empty, a description
    /// of how the process ended.
    #[error("runtime error: {msg}")]
    Crash { status: Option<i32>, msg: String },
    #[error("execution exceeded {limit_ms} ms")]
    TimeLimitExceeded { limit_ms: u64 },
    #[error("{stream} exceeded {limit_bytes} bytes")]
    OutputLimitExceeded {
        stream: &'static str,
        limit_bytes: u64,
    },
    /// A descendant left the process group and was still running after the
    /// program exited.
    #[error("a child process outlived the program")]
    DetachedProcess,
    #[error("internal runner error: {msg}")]
    Internal { msg: String },
}

#[mockall::automock]
#[async_trait::async_trait]
pub trait Runner: std::fmt::Debug + Send + Sync {
    /// Runs `executable` with the contents of `stdin` redirected to its
    /// standard input.
    async fn run(
        &self,
        executable: &Path,
        stdin: &Path,
        limits: &ExecutionLimits,
    ) -> Result<RunResult, RunError>;
}
