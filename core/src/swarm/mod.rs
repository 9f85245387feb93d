//! Swarm provisioning: host inspection, machine creation, config merging,
//! discovery setup and the orchestrator driving them.

pub mod discovery;
pub mod inspector;
pub mod machine;
pub mod merger;
pub mod orchestrator;
pub mod provisioner;

pub use merger::ListPolicy;
pub use orchestrator::{RunReport, RunStage, SwarmOrchestrator};
