//! Error types for swarm provisioning.
//!
//! Every component returns `Result<T, Error>`. Nothing below the CLI exits the
//! process; the orchestrator decides per call site whether an error aborts the
//! run or is recorded against a single host. `Error::is_fatal` separates setup
//! problems from plain command failures when the CLI reports an aborted run.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::node::NodeRole;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for swarm operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// An external program exited non-zero
    #[error("command error {}: {output}", code_label(.code))]
    Command {
        /// Program that was invoked
        program: String,
        /// Exit code, `None` when killed by a signal
        code: Option<i32>,
        /// Captured output
        output: String,
    },

    /// An external program could not be started at all
    #[error("failed to execute {program}: {source}")]
    Spawn {
        /// Program that was invoked
        program: String,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// A required external tool is not installed
    #[error("{tool} not found! {hint}")]
    ToolNotFound {
        /// Tool name
        tool: String,
        /// Hint for how to install it
        hint: String,
    },

    /// The machine driver is not in the supported list
    #[error("machine driver not supported/valid: {0}")]
    UnsupportedDriver(String),

    /// No node of the given role was configured
    #[error("no swarm {0} configured. Please add at least one node with type: {0}")]
    NoNodes(NodeRole),

    /// Creating a machine or recording its addresses failed
    #[error("failed to create machine {node}: {source}")]
    Provision {
        /// Node name
        node: String,
        /// What went wrong
        #[source]
        source: Box<Error>,
    },

    /// A node has not had its addresses recorded yet
    #[error("addresses of {0} are not known yet")]
    AddressUnknown(String),

    /// The persisted host config file does not exist
    #[error("machine config (config.json) not found: {}", .0.display())]
    HostConfigMissing(PathBuf),

    /// The persisted host config exists but could not be read or written
    #[error("machine config {}: {message}", .path.display())]
    HostConfig {
        /// File involved
        path: PathBuf,
        /// Error message
        message: String,
    },

    /// The cluster configuration is invalid
    #[error("configuration error: {0}")]
    Config(String),

    /// A discovery template could not be rendered
    #[error("template {name}: {source}")]
    Template {
        /// Template file name
        name: String,
        /// Syntax or undefined-variable error
        #[source]
        source: minijinja::Error,
    },

    /// I/O error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a configuration error with the given message
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a host config error for the given file
    pub fn host_config(path: impl Into<PathBuf>, msg: impl Into<String>) -> Self {
        Self::HostConfig {
            path: path.into(),
            message: msg.into(),
        }
    }

    /// Wrap an error raised while creating `node`
    pub fn provision(node: impl Into<String>, source: Error) -> Self {
        Self::Provision {
            node: node.into(),
            source: Box::new(source),
        }
    }

    /// Whether this error must abort the whole run.
    ///
    /// Process failures on their own are recoverable: the call site decides
    /// whether a particular command matters enough to stop. Everything that
    /// leaves the inventory or a host record in an unknown shape is fatal.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Error::Command { .. } | Error::Spawn { .. })
    }
}

fn code_label(code: &Option<i32>) -> String {
    match code {
        Some(c) => c.to_string(),
        None => "signal".to_string(),
    }
}
