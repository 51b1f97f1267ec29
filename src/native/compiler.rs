use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

use crate::core::{
    domain::{CompilationLimits, Language},
    traits::compiler::{CompileError, Compiler},
};
use crate::native::process::{ProcessLimits, Termination, describe_exit, supervise};
use crate::native::toolchain::Toolchains;

/// Runs a host toolchain (g++, gcc, ...) as a supervised child process.
#[derive(Clone, Debug)]
pub struct NativeCompiler {
    toolchains: Toolchains,
}

impl NativeCompiler {
    pub fn new(toolchains: Toolchains) -> Self {
        NativeCompiler { toolchains }
    }
}

#[async_trait::async_trait]
impl Compiler for NativeCompiler {
    #[tracing::instrument(skip(self, limits))]
    async fn compile(
        &self,
        source: &Path,
        output: &Path,
        language: &Language,
        limits: &CompilationLimits,
    ) -> Result<(), CompileError> {
        let toolchain = self
            .toolchains
            .get(language)
            .ok_or_else(|| CompileError::Internal {
                msg: format!("no toolchain configured for {}", language),
            })?;

        let mut cmd = Command::new(&toolchain.program);
        cmd.args(toolchain.render_args(source, output))
            .stdin(Stdio::null());
        if let Some(dir) = source.parent() {
            cmd.current_dir(dir);
        }

        let diagnostics_bytes = limits.diagnostics_size_bytes as usize;
        let process_limits = ProcessLimits {
            wall_time: Duration::from_millis(limits.time_ms),
            cpu_time: None,
            memory_bytes: limits.memory_bytes,
            pids_count: None,
            stdout_bytes: diagnostics_bytes,
            stderr_bytes: diagnostics_bytes,
        };

        let outcome = supervise(&mut cmd, &process_limits)
            .await
            .map_err(|e| CompileError::Internal {
                msg: format!("failed to run {}: {}", toolchain.program.display(), e),
            })?;
        tracing::debug!(
            "Toolchain finished in {} ms: {:?}",
            outcome.elapsed.as_millis(),
            outcome.termination
        );

        let fallback = match outcome.termination {
            Termination::Exited(status) if status.success() => None,
            Termination::TimedOut => {
                return Err(CompileError::TimeLimitExceeded {
                    limit_ms: limits.time_ms,
                });
            }
            Termination::Escaped => {
                return Err(CompileError::Internal {
                    msg: "toolchain left processes running".to_string(),
                });
            }
            Termination::Exited(status) => Some(describe_exit(status)),
            Termination::OutputLimitExceeded(stream) => Some(format!(
                "{} exceeded {} bytes",
                stream.name(),
                limits.diagnostics_size_bytes
            )),
        };

        if let Some(fallback) = fallback {
            let stderr = String::from_utf8_lossy(&outcome.stderr).to_string();
            let msg = if stderr.trim().is_empty() {
                fallback
            } else {
                stderr
            };
            return Err(CompileError::CompilationFailed { msg });
        }

        if !tokio::fs::try_exists(output).await.unwrap_or(false) {
            return Err(CompileError::Internal {
                msg: "toolchain reported success but produced no executable".to_string(),
            });
        }

        Ok(())
    }
}
