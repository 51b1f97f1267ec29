use std::path::PathBuf;

use crate::core::domain::{CompilationLimits, ExecutionLimits};

const DEFAULT_COMPILE_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_RUN_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_MAX_OUTPUT_BYTES: u64 = 1024 * 1024;
const DEFAULT_MEMORY_LIMIT_BYTES: u64 = 256 * 1024 * 1024;
const DEFAULT_MAX_PROCESSES: u64 = 1;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{key} must be a non-negative integer, got {value:?}")]
    NotANumber { key: &'static str, value: String },
    #[error("{key} must be greater than zero")]
    Zero { key: &'static str },
}

/// Pipeline configuration.
/// Provides defaults with environment variable overrides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub scratch_root: PathBuf,
    pub compile_timeout_ms: u64,
    pub run_timeout_ms: u64,
    pub max_output_bytes: u64,
    /// `None` leaves the address space of submissions unbounded.
    pub memory_limit_bytes: Option<u64>,
    /// `RLIMIT_NPROC` for submissions; `None` leaves forking unrestricted.
    pub max_processes: Option<u64>,
    pub gnucpp_path: PathBuf,
    pub gnuc_path: PathBuf,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let number = |key: &'static str, default: u64| -> Result<u64, ConfigError> {
            match lookup(key) {
                Some(value) => value
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::NotANumber { key, value }),
                None => Ok(default),
            }
        };
        let positive = |key: &'static str, default: u64| -> Result<u64, ConfigError> {
            match number(key, default)? {
                0 => Err(ConfigError::Zero { key }),
                value => Ok(value),
            }
        };

        let memory_limit_bytes = match number(
            "CODERUNNER_MEMORY_LIMIT_BYTES",
            DEFAULT_MEMORY_LIMIT_BYTES,
        )? {
            0 => None,
            bytes => Some(bytes),
        };
        let max_processes = match number("CODERUNNER_MAX_PROCESSES", DEFAULT_MAX_PROCESSES)? {
            0 => None,
            count => Some(count),
        };

        Ok(Self {
            scratch_root: lookup("CODERUNNER_SCRATCH_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|| std::env::temp_dir().join("coderunner")),
            compile_timeout_ms: positive(
                "CODERUNNER_COMPILE_TIMEOUT_MS",
                DEFAULT_COMPILE_TIMEOUT_MS,
            )?,
            run_timeout_ms: positive("CODERUNNER_RUN_TIMEOUT_MS", DEFAULT_RUN_TIMEOUT_MS)?,
            max_output_bytes: positive("CODERUNNER_MAX_OUTPUT_BYTES", DEFAULT_MAX_OUTPUT_BYTES)?,
            memory_limit_bytes,
            max_processes,
            gnucpp_path: lookup("GNUCPP_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("g++")),
            gnuc_path: lookup("GNUC_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("gcc")),
        })
    }

    pub fn compilation_limits(&self) -> CompilationLimits {
        CompilationLimits {
            time_ms: self.compile_timeout_ms,
            memory_bytes: None,
            diagnostics_size_bytes: self.max_output_bytes,
        }
    }

    /// The CPU ceiling tracks the wall-clock one, so a busy loop is stopped
    /// by the kernel even if the supervisor falls behind.
    pub fn execution_limits(&self) -> ExecutionLimits {
        ExecutionLimits {
            time_ms: self.run_timeout_ms,
            cpu_time_ms: Some(self.run_timeout_ms),
            memory_bytes: self.memory_limit_bytes,
            pids_count: self.max_processes,
            stdout_size_bytes: self.max_output_bytes,
            stderr_size_bytes: self.max_output_bytes,
        }
    }
}
