//! Swarm node model.
//!
//! A `Node` is one cluster member built from a `NodeSpec` in the cluster
//! configuration. It is mutated in place as provisioning proceeds and is
//! discarded at the end of the run; only its side effects persist.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::config::NodeSpec;


// ---------------------------------------------------------------------------
// NodeRole
// ---------------------------------------------------------------------------

/// Role of a node in the swarm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    Master,
    Worker,
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeRole::Master => write!(f, "master"),
            NodeRole::Worker => write!(f, "worker"),
        }
    }
}


// ---------------------------------------------------------------------------
// LifecycleState
// ---------------------------------------------------------------------------

/// Coarse readiness of a host, in increasing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// No machine record exists.
    New,
    /// The machine exists but its engine did not answer.
    Bare,
    /// The engine answers on the direct port.
    Running,
    /// The host config is swarm-enabled; membership unconfirmed.
    SwarmConfigured,
    /// Swarm membership confirmed (or inferred, for workers).
    SwarmRunning,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LifecycleState::New => "NEW",
            LifecycleState::Bare => "BARE",
            LifecycleState::Running => "RUNNING",
            LifecycleState::SwarmConfigured => "SWARM_CONFIGURED",
            LifecycleState::SwarmRunning => "SWARM_RUNNING",
        };
        f.write_str(label)
    }
}


// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

/// One swarm member.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    /// Fully-qualified name, `{shortname}.{domain}`.
    pub name: String,
    pub shortname: String,
    pub domain: String,
    pub role: NodeRole,
    /// True for the first declared master only.
    pub is_primary: bool,
    pub public_ip: Option<String>,
    pub cluster_ip: Option<String>,
    pub cluster_iface: String,
    pub driver: String,
    pub driver_opts: Option<String>,
    pub engine_opts: Option<String>,
    pub state: LifecycleState,
    /// Directory holding this host's docker-machine records.
    pub machine_path: PathBuf,
}

impl Node {
    /// Build a node from its declaration.
    ///
    /// `default_iface` is used when the declaration names no cluster interface;
    /// `machine_storage` is the directory that holds one record directory per
    /// machine.
    pub fn new(
        shortname: &str,
        domain: &str,
        role: NodeRole,
        spec: &NodeSpec,
        default_iface: &str,
        machine_storage: &Path,
    ) -> Self {
        let name = format!("{}.{}", shortname, domain);
        let machine_path = machine_storage.join(&name);
        Node {
            name,
            shortname: shortname.to_string(),
            domain: domain.to_string(),
            role,
            is_primary: false,
            public_ip: None,
            cluster_ip: None,
            cluster_iface: spec
                .cluster_interface
                .clone()
                .unwrap_or_else(|| default_iface.to_string()),
            driver: spec.machine_driver.clone(),
            driver_opts: spec.driver_opts.clone(),
            engine_opts: spec.engine_opts.clone(),
            state: LifecycleState::New,
            machine_path,
        }
    }

    pub fn is_master(&self) -> bool {
        self.role == NodeRole::Master
    }

    /// Path of the persisted docker-machine config for this host.
    pub fn config_path(&self) -> PathBuf {
        self.machine_path.join("config.json")
    }

    /// Cluster address, failing if the provisioner has not recorded it.
    pub fn require_cluster_ip(&self) -> crate::error::Result<&str> {
        self.cluster_ip
            .as_deref()
            .ok_or_else(|| crate::error::Error::AddressUnknown(self.name.clone()))
    }

    /// Public address, failing if the provisioner has not recorded it.
    pub fn require_public_ip(&self) -> crate::error::Result<&str> {
        self.public_ip
            .as_deref()
            .ok_or_else(|| crate::error::Error::AddressUnknown(self.name.clone()))
    }
}
