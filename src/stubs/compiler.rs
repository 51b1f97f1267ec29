use std::path::Path;
use std::time::Duration;

use crate::core::{
    domain::{CompilationLimits, Language},
    traits::compiler::{CompileError, Compiler},
};

/// Answers every compilation with a fixed result after a fixed delay.
#[derive(Debug, Clone)]
pub struct CompilerStub {
    result: Result<(), CompileError>,
    delay: Duration,
}

impl CompilerStub {
    pub fn new(result: Result<(), CompileError>, delay: Duration) -> Self {
        Self { result, delay }
    }
}

#[async_trait::async_trait]
impl Compiler for CompilerStub {
    #[tracing::instrument]
    async fn compile(
        &self,
        source: &Path,
        output: &Path,
        language: &Language,
        limits: &CompilationLimits,
    ) -> Result<(), CompileError> {
        tracing::debug!(
            "Start compilation: source={:?}, output={:?}, language={:?}, limits={:?}",
            source,
            output,
            language,
            limits
        );
        tokio::time::sleep(self.delay).await;
        tracing::debug!("Compilation result: {:?}", self.result);

        self.result.clone()
    }
}
