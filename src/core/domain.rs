use std::fmt;
use std::str::FromStr;

/// One (source, input, language) triple handed to the pipeline.
///
/// Immutable once built; the source is guaranteed to be non-empty.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Submission {
    code: String,
    stdin: String,
    language: Language,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmissionError {
    #[error("source code is empty")]
    EmptySource,
}

impl Submission {
    pub fn new(
        code: impl Into<String>,
        stdin: impl Into<String>,
        language: Language,
    ) -> Result<Self, SubmissionError> {
        let code = code.into();
        if code.trim().is_empty() {
            return Err(SubmissionError::EmptySource);
        }

        Ok(Self {
            code,
            stdin: stdin.into(),
            language,
        })
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn stdin(&self) -> &str {
        &self.stdin
    }

    pub fn language(&self) -> Language {
        self.language
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Language {
    GnuCpp,
    GnuC,
}

impl Language {
    pub fn source_extension(&self) -> &'static str {
        match self {
            Language::GnuCpp => "cpp",
            Language::GnuC => "c",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Language::GnuCpp => write!(f, "gnu_cpp"),
            Language::GnuC => write!(f, "gnu_c"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported language: {0}")]
pub struct LanguageParseError(pub String);

impl FromStr for Language {
    type Err = LanguageParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cpp" | "c++" | "cxx" | "gnu_cpp" => Ok(Language::GnuCpp),
            "c" | "gnu_c" => Ok(Language::GnuC),
            other => Err(LanguageParseError(other.to_string())),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompilationLimits {
    pub time_ms: u64,
    pub memory_bytes: Option<u64>,
    pub diagnostics_size_bytes: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExecutionLimits {
    pub time_ms: u64,
    pub cpu_time_ms: Option<u64>,
    pub memory_bytes: Option<u64>,
    /// Process ceiling for the submission's user; `Some(1)` forbids forking.
    pub pids_count: Option<u64>,
    pub stdout_size_bytes: u64,
    pub stderr_size_bytes: u64,
}

/// The only value the pipeline ever hands back to its caller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExecutionResult {
    Success { output: String },
    Failure { kind: FailureKind, detail: String },
}

impl ExecutionResult {
    pub fn failure(kind: FailureKind, detail: impl Into<String>) -> Self {
        ExecutionResult::Failure {
            kind,
            detail: detail.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionResult::Success { .. })
    }

    /// `None` for a successful run.
    pub fn kind(&self) -> Option<FailureKind> {
        match self {
            ExecutionResult::Success { .. } => None,
            ExecutionResult::Failure { kind, .. } => Some(*kind),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FailureKind {
    CompileError,
    RuntimeError,
    Timeout,
    InternalError,
}

impl FailureKind {
    /// Only host-level failures may be retried with the same submission.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FailureKind::InternalError)
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FailureKind::CompileError => "compile error",
            FailureKind::RuntimeError => "runtime error",
            FailureKind::Timeout => "timeout",
            FailureKind::InternalError => "internal error",
        };
        write!(f, "{}", label)
    }
}
