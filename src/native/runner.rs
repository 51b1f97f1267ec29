use std::os::unix::process::ExitStatusExt;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use nix::sys::signal::Signal;
use tokio::process::Command;

use crate::core::{
    domain::ExecutionLimits,
    traits::runner::{RunError, RunResult, Runner},
};
use crate::native::process::{ProcessLimits, Stream, Termination, describe_exit, supervise};

/// Runs compiled artifacts directly on the host, one process group each.
#[derive(Clone, Debug, Default)]
pub struct NativeRunner;

impl NativeRunner {
    pub fn new() -> Self {
        NativeRunner
    }
}

#[async_trait::async_trait]
impl Runner for NativeRunner {
    #[tracing::instrument(skip(self, limits))]
    async fn run(
        &self,
        executable: &Path,
        stdin: &Path,
        limits: &ExecutionLimits,
    ) -> Result<RunResult, RunError> {
        let input = std::fs::File::open(stdin).map_err(|e| RunError::Internal {
            msg: format!("failed to open input: {}", e),
        })?;

        let mut cmd = Command::new(executable);
        cmd.stdin(Stdio::from(input)).env_clear();
        if let Some(dir) = executable.parent() {
            cmd.current_dir(dir);
        }

        let process_limits = ProcessLimits {
            wall_time: Duration::from_millis(limits.time_ms),
            cpu_time: limits.cpu_time_ms.map(Duration::from_millis),
            memory_bytes: limits.memory_bytes,
            pids_count: limits.pids_count,
            stdout_bytes: limits.stdout_size_bytes as usize,
            stderr_bytes: limits.stderr_size_bytes as usize,
        };

        let outcome = supervise(&mut cmd, &process_limits)
            .await
            .map_err(|e| RunError::Internal {
                msg: format!("failed to launch executable: {}", e),
            })?;
        let execution_time_ms = outcome.elapsed.as_millis() as u64;
        tracing::debug!(
            "Execution finished in {} ms: {:?}",
            execution_time_ms,
            outcome.termination
        );

        let status = match outcome.termination {
            Termination::Exited(status) => status,
            Termination::TimedOut => {
                return Err(RunError::TimeLimitExceeded {
                    limit_ms: limits.time_ms,
                });
            }
            Termination::OutputLimitExceeded(stream) => {
                let limit_bytes = match stream {
                    Stream::Stdout => limits.stdout_size_bytes,
                    Stream::Stderr => limits.stderr_size_bytes,
                };
                return Err(RunError::OutputLimitExceeded {
                    stream: stream.name(),
                    limit_bytes,
                });
            }
            Termination::Escaped => return Err(RunError::DetachedProcess),
        };

        // CPU ceiling reached; the kernel signals it with SIGXCPU.
        if status.signal() == Some(Signal::SIGXCPU as i32) {
            return Err(RunError::TimeLimitExceeded {
                limit_ms: limits.cpu_time_ms.unwrap_or(limits.time_ms),
            });
        }

        let stdout = String::from_utf8_lossy(&outcome.stdout).to_string();
        let stderr = String::from_utf8_lossy(&outcome.stderr).to_string();

        if !status.success() {
            let msg = if stderr.trim().is_empty() {
                describe_exit(status)
            } else {
                stderr
            };
            return Err(RunError::Crash {
                status: status.code(),
                msg,
            });
        }

        Ok(RunResult {
            status: 0,
            stdout,
            stderr,
            execution_time_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::os::unix::fs::PermissionsExt;
    use std::path::PathBuf;

    use tokio::fs;
    use uuid::Uuid;

    use super::*;

    fn limits() -> ExecutionLimits {
        ExecutionLimits {
            time_ms: 5000,
            cpu_time_ms: None,
            memory_bytes: None,
            pids_count: None,
            stdout_size_bytes: 1024 * 1024,
            stderr_size_bytes: 1024 * 1024,
        }
    }

    /// Writes a shell script standing in for a compiled artifact.
    async fn artifact(script: &str, stdin: &str) -> (PathBuf, PathBuf) {
        let dir = PathBuf::from(format!("/tmp/coderunner_{}", Uuid::new_v4()));
        fs::create_dir_all(&dir).await.unwrap();

        let executable = dir.join("main.out");
        fs::write(&executable, format!("#!/bin/sh\n{}\n", script))
            .await
            .unwrap();
        fs::set_permissions(&executable, std::fs::Permissions::from_mode(0o755))
            .await
            .unwrap();

        let input = dir.join("main.input");
        fs::write(&input, stdin).await.unwrap();

        (executable, input)
    }

    #[tokio::test]
    async fn test_stdin_is_fed_from_input_file() {
        let (executable, input) = artifact("read a b; echo $((a + b))", "2 3").await;

        let result = NativeRunner::new()
            .run(&executable, &input, &limits())
            .await
            .unwrap();

        assert_eq!(result.status, 0);
        assert_eq!(result.stdout, "5\n");
        assert!(result.stderr.is_empty());
    }

    #[tokio::test]
    async fn test_non_zero_exit_carries_stderr() {
        let (executable, input) = artifact("echo boom >&2; exit 4", "").await;

        let result = NativeRunner::new().run(&executable, &input, &limits()).await;

        assert_eq!(
            result,
            Err(RunError::Crash {
                status: Some(4),
                msg: "boom\n".to_string(),
            })
        );
    }

    #[tokio::test]
    async fn test_silent_crash_is_described() {
        let (executable, input) = artifact("kill -s FPE $$", "").await;

        let result = NativeRunner::new().run(&executable, &input, &limits()).await;

        assert_eq!(
            result,
            Err(RunError::Crash {
                status: None,
                msg: "terminated by signal SIGFPE".to_string(),
            })
        );
    }

    #[tokio::test]
    async fn test_time_limit() {
        let (executable, input) = artifact("while :; do :; done", "").await;
        let limits = ExecutionLimits {
            time_ms: 300,
            ..limits()
        };

        let result = NativeRunner::new().run(&executable, &input, &limits).await;

        assert_eq!(result, Err(RunError::TimeLimitExceeded { limit_ms: 300 }));
    }

    #[tokio::test]
    async fn test_cpu_time_limit_is_time_limit() {
        let (executable, input) = artifact("while :; do :; done", "").await;
        let limits = ExecutionLimits {
            time_ms: 10_000,
            cpu_time_ms: Some(1000),
            ..limits()
        };

        let started = std::time::Instant::now();
        let result = NativeRunner::new().run(&executable, &input, &limits).await;

        assert_eq!(result, Err(RunError::TimeLimitExceeded { limit_ms: 1000 }));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_process_limit_forbids_forking() {
        // The kernel exempts privileged users from RLIMIT_NPROC.
        if nix::unistd::geteuid().is_root() {
            return;
        }

        let (executable, input) = artifact("/bin/true && echo forked", "").await;
        let limits = ExecutionLimits {
            pids_count: Some(1),
            ..limits()
        };

        let result = NativeRunner::new().run(&executable, &input, &limits).await;

        assert!(matches!(result, Err(RunError::Crash { .. })));
    }

    #[tokio::test]
    async fn test_detached_descendant_is_reported() {
        let marker = format!("/tmp/coderunner_marker_{}", Uuid::new_v4());
        let (executable, input) = artifact(
            &format!(
                "export PATH=/usr/bin:/bin; echo 5; setsid sh -c 'sleep 2; touch {}; sleep 30' & exit 0",
                marker
            ),
            "",
        )
        .await;

        let result = NativeRunner::new().run(&executable, &input, &limits()).await;

        assert_eq!(result, Err(RunError::DetachedProcess));
        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert!(!std::path::Path::new(&marker).exists());
    }

    #[tokio::test]
    async fn test_stdout_size_limit() {
        let (executable, input) = artifact("while :; do echo y; done", "").await;
        let limits = ExecutionLimits {
            stdout_size_bytes: 1024,
            ..limits()
        };

        let result = NativeRunner::new().run(&executable, &input, &limits).await;

        assert_eq!(
            result,
            Err(RunError::OutputLimitExceeded {
                stream: "stdout",
                limit_bytes: 1024,
            })
        );
    }

    #[tokio::test]
    async fn test_environment_is_cleared() {
        let (executable, input) = artifact("echo \"[$HOME]\"", "").await;

        let result = NativeRunner::new()
            .run(&executable, &input, &limits())
            .await
            .unwrap();

        assert_eq!(result.stdout, "[]\n");
    }

    #[tokio::test]
    async fn test_missing_executable_is_internal() {
        let (executable, input) = artifact("true", "").await;
        fs::remove_file(&executable).await.unwrap();

        let result = NativeRunner::new().run(&executable, &input, &limits()).await;

        assert!(matches!(result, Err(RunError::Internal { .. })));
    }
}
