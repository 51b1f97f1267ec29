/// Native module contains implementations of core traits
/// that drive the host toolchain and run artifacts as plain
/// child processes, using syscalls directly for isolation.
pub mod compiler;
mod orphans;
mod process;
pub mod runner;
pub mod toolchain;
pub mod workspace;
