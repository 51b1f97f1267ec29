use std::path::Path;

use crate::core::domain::{CompilationLimits, Language};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompileError {
    /// The toolchain rejected the source; `msg` is its diagnostic stream.
    #[error("compilation failed: {msg}")]
    CompilationFailed { msg: String },
    #[error("compilation exceeded {limit_ms} ms")]
    TimeLimitExceeded { limit_ms: u64 },
    #[error("internal compiler error: {msg}")]
    Internal { msg: String },
}

#[mockall::automock]
#[async_trait::async_trait]
pub trait Compiler: std::fmt::Debug + Send + Sync {
    /// Compiles `source` into an executable at `output`.
    async fn compile(
        &self,
        source: &Path,
        output: &Path,
        language: &Language,
        limits: &CompilationLimits,
    ) -> Result<(), CompileError>;
}
