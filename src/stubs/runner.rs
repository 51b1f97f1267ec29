use std::path::Path;
use std::time::Duration;

use crate::core::{
    domain::ExecutionLimits,
    traits::runner::{RunError, RunResult, Runner},
};

/// Answers every run with a fixed result after a fixed delay.
#[derive(Debug, Clone)]
pub struct RunnerStub {
    result: Result<RunResult, RunError>,
    delay: Duration,
}

impl RunnerStub {
    pub fn new(result: Result<RunResult, RunError>, delay: Duration) -> Self {
        Self { result, delay }
    }
}

#[async_trait::async_trait]
impl Runner for RunnerStub {
    #[tracing::instrument]
    async fn run(
        &self,
        executable: &Path,
        stdin: &Path,
        limits: &ExecutionLimits,
    ) -> Result<RunResult, RunError> {
        tracing::debug!(
            "Start execution: executable={:?}, stdin={:?}, limits={:?}",
            executable,
            stdin,
            limits
        );
        tokio::time::sleep(self.delay).await;
        tracing::debug!("Execution result: {:?}", self.result);

        self.result.clone()
    }
}
