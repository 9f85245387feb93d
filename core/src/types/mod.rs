//! Data model: cluster configuration, nodes, and persisted host records.

pub mod config;
pub mod host_config;
pub mod node;
