//! docker-machine command builder and the tool facade.
//!
//! `MachineCommands` builds docker-machine argument strings without running
//! them. `Toolbox` pairs a `CommandRunner` with the resolved tool paths so the
//! swarm components can say `tools.machine(...)` instead of threading both
//! around.

use std::path::Path;

use crate::error::Result;
use crate::infrastructure::runner::{CommandRunner, RunOptions};
use crate::types::config::ToolPaths;
use crate::types::node::Node;

/// Drivers docker-machine ships with.
pub const MACHINE_DRIVERS: &[&str] = &[
    "amazonec2",
    "azure",
    "digitalocean",
    "exoscale",
    "generic",
    "google",
    "hyperv",
    "openstack",
    "rackspace",
    "softlayer",
    "virtualbox",
    "vmwarevcloudair",
    "vmwarefusion",
    "vmwarevsphere",
];

/// Docker engine TLS port.
pub const ENGINE_PORT: u16 = 2376;

/// Swarm manager port.
pub const SWARM_PORT: u16 = 3376;

pub fn is_supported_driver(driver: &str) -> bool {
    MACHINE_DRIVERS.contains(&driver)
}

/// Consul service address used as the discovery backend for `domain`.
pub fn discovery_url(domain: &str) -> String {
    format!("consul://consul.service.{}:8500", domain)
}

/// Environment that points docker/docker-compose at `node`.
///
/// Empty when the public address is not known yet.
pub fn runtime_env(node: &Node, swarm: bool) -> Vec<(String, String)> {
    let Some(public_ip) = node.public_ip.as_deref() else {
        return Vec::new();
    };
    let port = if swarm { SWARM_PORT } else { ENGINE_PORT };
    vec![
        ("DOCKER_TLS_VERIFY".to_string(), "1".to_string()),
        ("DOCKER_HOST".to_string(), format!("tcp://{}:{}", public_ip, port)),
        ("DOCKER_CERT_PATH".to_string(), node.machine_path.display().to_string()),
        ("DOCKER_MACHINE_NAME".to_string(), node.name.clone()),
    ]
}


// ---------------------------------------------------------------------------
// Command builder
// ---------------------------------------------------------------------------

/// Builds docker-machine argument strings.
pub struct MachineCommands;

impl MachineCommands {
    /// `create -d <driver> <driver-opts> <engine-opts> <name>`
    pub fn create(node: &Node) -> String {
        format!(
            "create -d {} {} {} {}",
            node.driver,
            node.driver_opts.as_deref().unwrap_or(""),
            node.engine_opts.as_deref().unwrap_or(""),
            node.name
        )
    }

    /// `ip <name>`
    pub fn ip(name: &str) -> String {
        format!("ip {}", name)
    }

    /// `ssh <name> '<remote>'`
    pub fn ssh(name: &str, remote: &str) -> String {
        format!("ssh {} '{}'", name, remote)
    }

    /// `scp <src> <name>:<dst>`
    pub fn scp(src: &Path, name: &str, dst: &str) -> String {
        format!("scp {} {}:{}", src.display(), name, dst)
    }

    /// `provision <name>`
    pub fn provision(name: &str) -> String {
        format!("provision {}", name)
    }

    /// Address of `iface` on the host, in shell form (the `$2` is escaped for
    /// the local shell).
    pub fn interface_address(name: &str, iface: &str) -> String {
        format!(
            "ssh {} \"ip addr sh {} | awk '/inet / {{ print \\$2 }}'\"",
            name, iface
        )
    }
}


// ---------------------------------------------------------------------------
// Toolbox
// ---------------------------------------------------------------------------

/// The runner together with the paths of the tools it should invoke.
#[derive(Clone, Copy)]
pub struct Toolbox<'a> {
    pub runner: &'a dyn CommandRunner,
    pub paths: &'a ToolPaths,
}

impl<'a> Toolbox<'a> {
    pub fn new(runner: &'a dyn CommandRunner, paths: &'a ToolPaths) -> Self {
        Toolbox { runner, paths }
    }

    pub fn machine(&self, args: &str, opts: &RunOptions) -> Result<String> {
        self.runner.run(&self.paths.machine, args, opts)
    }

    pub fn compose(&self, args: &str, opts: &RunOptions) -> Result<String> {
        self.runner.run(&self.paths.compose, args, opts)
    }

    pub fn runtime(&self, args: &str, opts: &RunOptions) -> Result<String> {
        self.runner.run(&self.paths.runtime, args, opts)
    }
}
