//! Machine creation and address discovery.

use std::sync::OnceLock;

use regex::Regex;
use tracing::info;

use crate::error::{Error, Result};
use crate::infrastructure::runner::RunOptions;
use crate::types::node::{LifecycleState, Node};

use super::inspector::HostInspector;
use super::machine::{is_supported_driver, MachineCommands, Toolbox};

/// Strip a trailing `/<prefix-length>` from an interface address.
pub fn strip_prefix_len(addr: &str) -> String {
    static PREFIX: OnceLock<Regex> = OnceLock::new();
    let re = PREFIX.get_or_init(|| Regex::new(r"/[0-9]+$").expect("static pattern"));
    re.replace(addr, "").into_owned()
}

pub struct MachineProvisioner<'a> {
    tools: Toolbox<'a>,
}

impl<'a> MachineProvisioner<'a> {
    pub fn new(tools: Toolbox<'a>) -> Self {
        MachineProvisioner { tools }
    }

    /// Create the machine for `node` if it does not exist yet, then record its
    /// public and cluster addresses. Every failure here is fatal for the run.
    pub fn create(&self, node: &mut Node) -> Result<()> {
        if !is_supported_driver(&node.driver) {
            return Err(Error::UnsupportedDriver(node.driver.clone()));
        }
        info!("* create {}: {}", node.name, node.driver);

        node.state = HostInspector::new(self.tools).inspect(node);
        info!("+ current state: {}", node.state);

        if node.state == LifecycleState::New {
            self.tools
                .machine(&MachineCommands::create(node), &RunOptions::default())
                .map_err(|e| Error::provision(&node.name, e))?;
            node.state = LifecycleState::Bare;
        }

        self.record_addresses(node)
            .map_err(|e| Error::provision(&node.name, e))?;
        info!(
            "+ public IP: {}, cluster IP: {}",
            node.public_ip.as_deref().unwrap_or("-"),
            node.cluster_ip.as_deref().unwrap_or("-")
        );
        Ok(())
    }

    fn record_addresses(&self, node: &mut Node) -> Result<()> {
        let public = self
            .tools
            .machine(&MachineCommands::ip(&node.name), &RunOptions::quiet())?;
        node.public_ip = Some(first_line(&public));

        let raw = self.tools.machine(
            &MachineCommands::interface_address(&node.name, &node.cluster_iface),
            &RunOptions::quiet().shell(),
        )?;
        let cluster = strip_prefix_len(&first_line(&raw));
        if cluster.is_empty() {
            return Err(Error::AddressUnknown(format!(
                "{} (no address on {})",
                node.name, node.cluster_iface
            )));
        }
        node.cluster_ip = Some(cluster);
        Ok(())
    }
}

fn first_line(output: &str) -> String {
    output.lines().next().unwrap_or("").trim().to_string()
}
