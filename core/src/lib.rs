//! Swarm Creator core: brings up a Docker Swarm cluster with Consul
//! discovery from a declarative `dsc.yaml`.
//!
//! All work on hosts goes through the external `docker-machine`,
//! `docker-compose` and `docker` tools, invoked via a [`CommandRunner`] so
//! the whole pipeline can be driven by a mock in tests.
//!
//! # Modules
//!
//! - [`error`]: crate error type and fatal/non-fatal classification
//! - [`infrastructure`]: process runner, argument splitting, mock runner
//! - [`install`]: config directory bootstrap and `dsc.yaml` loading
//! - [`swarm`]: inspection, provisioning, merging, discovery, orchestration
//! - [`tools`]: locating the external binaries
//! - [`types`]: cluster config, nodes, persisted host config

pub mod error;
pub mod infrastructure;
pub mod install;
pub mod swarm;
pub mod tools;
pub mod types;

pub use error::{Error, Result};
pub use infrastructure::{CommandRunner, MockRunner, ProcessRunner, RunOptions};
pub use swarm::{ListPolicy, RunReport, RunStage, SwarmOrchestrator};
