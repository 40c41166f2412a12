//! I/O adapters for pipeline stages.

pub mod completion;
pub mod config;
pub mod git;
pub mod hosting;
pub mod lease;
pub mod lint;
pub mod process;
pub mod prompt;
pub mod sandbox;
pub mod workspace;
