//! Compiles untrusted C and C++ submissions, runs them against a single
//! input, and reports a normalized verdict.

pub mod config;
pub mod core;
pub mod native;
pub mod pipeline;

#[cfg(test)]
mod stubs;

pub use crate::config::{Config, ConfigError};
pub use crate::core::domain::{ExecutionResult, FailureKind, Language, Submission};
pub use crate::pipeline::Pipeline;
