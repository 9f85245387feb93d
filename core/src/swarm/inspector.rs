//! Host state inspection.
//!
//! Queries a host through its local machine record and the docker engine and
//! derives a coarse `LifecycleState`. Query failures are the normal signal
//! for "not there yet" and only ever lower the reported state.

use tracing::debug;

use crate::error::Error;
use crate::infrastructure::runner::RunOptions;
use crate::types::host_config::HostConfig;
use crate::types::node::{LifecycleState, Node, NodeRole};

use super::machine::{runtime_env, Toolbox};

pub struct HostInspector<'a> {
    tools: Toolbox<'a>,
}

impl<'a> HostInspector<'a> {
    pub fn new(tools: Toolbox<'a>) -> Self {
        HostInspector { tools }
    }

    /// Current lifecycle state of `node`. Never fails.
    pub fn inspect(&self, node: &Node) -> LifecycleState {
        if !node.machine_path.is_dir() {
            return LifecycleState::New;
        }
        let mut state = LifecycleState::Bare;

        if self.engine_answers(node, false) {
            state = LifecycleState::Running;
        }

        match HostConfig::load(&node.config_path()) {
            Ok(config) if config.host_options.swarm_options.is_swarm => {}
            Ok(_) => return state,
            Err(Error::HostConfigMissing(_)) => return state,
            Err(e) => {
                debug!(node = %node.name, error = %e, "unreadable machine config");
                return state;
            }
        }

        // Without a live engine the swarm port cannot answer either.
        if state < LifecycleState::Running {
            return LifecycleState::SwarmConfigured;
        }

        // Workers have no swarm endpoint to ask, so a running, swarm-enabled
        // worker is assumed to have joined.
        if node.role == NodeRole::Worker {
            return LifecycleState::SwarmRunning;
        }

        if self.engine_answers(node, true) {
            LifecycleState::SwarmRunning
        } else {
            LifecycleState::SwarmConfigured
        }
    }

    fn engine_answers(&self, node: &Node, swarm: bool) -> bool {
        let env = runtime_env(node, swarm);
        if env.is_empty() {
            return false;
        }
        match self.tools.runtime("info", &RunOptions::quiet().with_env(env)) {
            Ok(_) => true,
            Err(e) => {
                debug!(node = %node.name, swarm, error = %e, "docker info failed");
                false
            }
        }
    }
}
