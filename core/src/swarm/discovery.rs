//! Consul discovery agent setup.
//!
//! Ships the engine TLS material and the Consul agent config to a host,
//! renders the compose file for its role and starts the agent. Masters run a
//! Consul server, workers a client agent; both are told which masters to
//! join on startup.

use std::path::{Path, PathBuf};

use minijinja::{context, Environment, UndefinedBehavior, Value};
use tracing::info;

use crate::error::{Error, Result};
use crate::infrastructure::runner::RunOptions;
use crate::install::TEMPLATE_DIR;
use crate::types::node::{LifecycleState, Node};

use super::machine::{runtime_env, MachineCommands, Toolbox};

/// TLS files docker-machine generated for the host, relative to its record.
pub const CERT_FILES: [&str; 3] = ["ca.pem", "server.pem", "server-key.pem"];

pub const SERVER_COMPOSE_FILE: &str = "consul-server.yml";
pub const AGENT_COMPOSE_FILE: &str = "consul-agent.yml";

const RETRY_INTERVAL: &str = "-retry-interval 10s";
const RETRY_MAX: &str = "-retry-max 3";


/// Retry-join arguments for the Consul agent on `node`.
///
/// A master joins every other master and gives up after three attempts; a
/// lone master joins nobody. A worker keeps retrying against all masters.
pub fn retry_join(node: &Node, masters: &[Node]) -> Result<String> {
    let mut params: Vec<String> = Vec::new();
    if node.is_master() {
        if masters.len() <= 1 {
            return Ok(String::new());
        }
        params.push(RETRY_INTERVAL.to_string());
        params.push(RETRY_MAX.to_string());
        for master in masters.iter().filter(|m| m.name != node.name) {
            params.push(format!("--retry-join {}", master.require_cluster_ip()?));
        }
    } else {
        params.push(RETRY_INTERVAL.to_string());
        for master in masters {
            params.push(format!("--retry-join {}", master.require_cluster_ip()?));
        }
    }
    Ok(params.join(" "))
}

/// Render `template` with `ctx`. Any variable the context does not define is
/// an error, so a misspelled placeholder never reaches a host.
pub fn render(name: &str, template: &str, ctx: Value) -> Result<String> {
    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Strict);
    env.set_keep_trailing_newline(true);
    env.render_str(template, ctx).map_err(|source| Error::Template {
        name: name.to_string(),
        source,
    })
}


pub struct DiscoveryInstaller<'a> {
    tools: Toolbox<'a>,
    template_dir: PathBuf,
}

impl<'a> DiscoveryInstaller<'a> {
    /// `config_dir` is the directory holding `consul/server.yml`,
    /// `consul/agent.yml` and `consul/config/consul.json`.
    pub fn new(tools: Toolbox<'a>, config_dir: &Path) -> Self {
        DiscoveryInstaller {
            tools,
            template_dir: config_dir.join(TEMPLATE_DIR),
        }
    }

    /// Install and start the Consul agent on `node`. `node.state` decides
    /// between a restart (already part of the swarm) and a bring-up.
    pub fn install(&self, node: &Node, masters: &[Node]) -> Result<()> {
        info!("+ setup consul");
        self.copy_certificates(node)?;
        self.copy_agent_config(node)?;
        let compose_file = self.write_compose_file(node, masters)?;
        self.start(node, &compose_file, node.state == LifecycleState::SwarmRunning)
    }

    fn copy_certificates(&self, node: &Node) -> Result<()> {
        for file in CERT_FILES {
            let src = node.machine_path.join(file);
            self.tools
                .machine(&MachineCommands::scp(&src, &node.name, "/tmp/"), &RunOptions::default())?;
        }
        self.tools.machine(
            &MachineCommands::ssh(&node.name, "sudo mv /tmp/*.pem /etc/docker/"),
            &RunOptions::default(),
        )?;
        Ok(())
    }

    fn copy_agent_config(&self, node: &Node) -> Result<()> {
        let consul_config = self.template_dir.join("config").join("consul.json");
        self.tools.machine(
            &MachineCommands::scp(&consul_config, &node.name, "/tmp/"),
            &RunOptions::default(),
        )?;
        self.tools.machine(
            &MachineCommands::ssh(
                &node.name,
                "sudo mkdir -p /etc/consul/ && sudo mv /tmp/consul.json /etc/consul/",
            ),
            &RunOptions::default(),
        )?;
        Ok(())
    }

    /// Render the role's template into the node's machine directory.
    pub fn write_compose_file(&self, node: &Node, masters: &[Node]) -> Result<PathBuf> {
        let (template_name, file_name) = if node.is_master() {
            ("server.yml", SERVER_COMPOSE_FILE)
        } else {
            ("agent.yml", AGENT_COMPOSE_FILE)
        };
        let template_path = self.template_dir.join(template_name);
        let template = std::fs::read_to_string(&template_path).map_err(|e| {
            Error::config(format!("cannot read {}: {}", template_path.display(), e))
        })?;

        let ctx = context! {
            master_count => masters.len(),
            cluster_ip => node.require_cluster_ip()?,
            domain => &node.domain,
            nodename => &node.shortname,
            retry_join => retry_join(node, masters)?,
        };
        let rendered = render(template_name, &template, ctx)?;
        let compose_file = node.machine_path.join(file_name);
        std::fs::write(&compose_file, rendered)?;
        Ok(compose_file)
    }

    fn start(&self, node: &Node, compose_file: &Path, restart: bool) -> Result<()> {
        info!("+ start consul");
        let action = if restart { "restart" } else { "up -d" };
        let args = format!("-f {} {}", compose_file.display(), action);
        self.tools.compose(
            &args,
            &RunOptions::default().with_env(runtime_env(node, false)),
        )?;
        Ok(())
    }
}
