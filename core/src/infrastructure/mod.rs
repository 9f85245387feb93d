//! Process execution for the external tools.
//!
//! Provides the `CommandRunner` trait with a process-spawning implementation
//! (production) and a scripted mock (testing), plus the argument splitting the
//! non-shell form relies on.

pub mod args;
pub mod mock;
pub mod runner;

pub use mock::MockRunner;
pub use runner::{CommandRunner, ProcessRunner, RunOptions};
