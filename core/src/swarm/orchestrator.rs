//! End-to-end cluster bring-up.
//!
//! Builds the node inventory from the cluster configuration, then runs four
//! sequential passes: create masters, create workers, configure masters,
//! configure workers. Fatal errors abort the run and come back as `Err`;
//! per-host problems that do not invalidate the cluster are collected in the
//! `RunReport` and the run carries on.

use std::fmt;

use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::infrastructure::runner::{CommandRunner, RunOptions};
use crate::types::config::{ClusterConfig, NodeEntry};
use crate::types::node::{LifecycleState, Node, NodeRole};

use super::discovery::DiscoveryInstaller;
use super::inspector::HostInspector;
use super::machine::{MachineCommands, Toolbox};
use super::merger::{ConfigMerger, ListPolicy};
use super::provisioner::MachineProvisioner;


// ---------------------------------------------------------------------------
// Report types
// ---------------------------------------------------------------------------

/// How far a run got. Stages only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RunStage {
    InventoryBuilt,
    MastersCreated,
    WorkersCreated,
    MastersConfigured,
    WorkersConfigured,
    Done,
}

impl fmt::Display for RunStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStage::InventoryBuilt => "inventory-built",
            RunStage::MastersCreated => "masters-created",
            RunStage::WorkersCreated => "workers-created",
            RunStage::MastersConfigured => "masters-configured",
            RunStage::WorkersConfigured => "workers-configured",
            RunStage::Done => "done",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    Create,
    Configure,
}

/// One create or configure step, in execution order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub kind: StepKind,
    pub node: String,
}

/// Something that went wrong on a host without stopping the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostIssue {
    pub node: String,
    /// Short name of the failed action, e.g. `"discovery"`.
    pub action: &'static str,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeSummary {
    pub name: String,
    pub role: NodeRole,
    pub is_primary: bool,
    pub state: LifecycleState,
    pub public_ip: Option<String>,
    pub cluster_ip: Option<String>,
}

impl NodeSummary {
    fn of(node: &Node) -> Self {
        NodeSummary {
            name: node.name.clone(),
            role: node.role,
            is_primary: node.is_primary,
            state: node.state,
            public_ip: node.public_ip.clone(),
            cluster_ip: node.cluster_ip.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub steps: Vec<Step>,
    pub stage: RunStage,
    pub issues: Vec<HostIssue>,
    /// Masters first, then workers, each in declaration order.
    pub nodes: Vec<NodeSummary>,
}

impl RunReport {
    fn new() -> Self {
        RunReport {
            steps: Vec::new(),
            stage: RunStage::InventoryBuilt,
            issues: Vec::new(),
            nodes: Vec::new(),
        }
    }

    fn issue(&mut self, node: &Node, action: &'static str, err: &Error) {
        warn!(node = %node.name, action, "{}", err);
        self.issues.push(HostIssue {
            node: node.name.clone(),
            action,
            message: err.to_string(),
        });
    }

    pub fn count(&self, kind: StepKind) -> usize {
        self.steps.iter().filter(|s| s.kind == kind).count()
    }
}


// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct SwarmOrchestrator<'a> {
    config: &'a ClusterConfig,
    tools: Toolbox<'a>,
    merger: ConfigMerger,
}

impl<'a> SwarmOrchestrator<'a> {
    pub fn new(config: &'a ClusterConfig, runner: &'a dyn CommandRunner) -> Self {
        SwarmOrchestrator {
            config,
            tools: Toolbox::new(runner, &config.tools),
            merger: ConfigMerger::default(),
        }
    }

    pub fn with_policy(mut self, policy: ListPolicy) -> Self {
        self.merger = ConfigMerger::new(policy);
        self
    }

    /// Masters and workers in declaration order, the first master primary.
    ///
    /// Fails before anything touches a host when either role has no nodes or
    /// the cluster domain is not configured.
    pub fn build_inventory(&self) -> Result<(Vec<Node>, Vec<Node>)> {
        let master_entries: Vec<_> = self.config.nodes_with_role(NodeRole::Master).collect();
        if master_entries.is_empty() {
            return Err(Error::NoNodes(NodeRole::Master));
        }
        let worker_entries: Vec<_> = self.config.nodes_with_role(NodeRole::Worker).collect();
        if worker_entries.is_empty() {
            return Err(Error::NoNodes(NodeRole::Worker));
        }

        let domain = self.config.cluster_domain()?;
        let iface = self.config.default_interface();
        let storage = &self.config.machine_storage;
        let build = |role: NodeRole, entries: Vec<&NodeEntry>| -> Vec<Node> {
            entries
                .into_iter()
                .map(|e| Node::new(&e.shortname, domain, role, &e.spec, iface, storage))
                .collect()
        };

        let mut masters = build(NodeRole::Master, master_entries);
        let workers = build(NodeRole::Worker, worker_entries);
        masters[0].is_primary = true;
        Ok((masters, workers))
    }

    /// Bring the whole cluster up.
    pub fn run(&self) -> Result<RunReport> {
        let (mut masters, mut workers) = self.build_inventory()?;
        let mut report = RunReport::new();
        info!(
            "cluster {}: {} master(s), {} worker(s)",
            self.config.cluster_domain()?,
            masters.len(),
            workers.len()
        );

        let provisioner = MachineProvisioner::new(self.tools);
        for node in masters.iter_mut() {
            report.steps.push(Step { kind: StepKind::Create, node: node.name.clone() });
            provisioner.create(node)?;
        }
        report.stage = RunStage::MastersCreated;

        for node in workers.iter_mut() {
            report.steps.push(Step { kind: StepKind::Create, node: node.name.clone() });
            provisioner.create(node)?;
        }
        report.stage = RunStage::WorkersCreated;

        for i in 0..masters.len() {
            masters[i].state = self.reinspect(&masters[i]);
            report.steps.push(Step { kind: StepKind::Configure, node: masters[i].name.clone() });
            self.configure(&masters[i], &masters, &mut report)?;
        }
        report.stage = RunStage::MastersConfigured;

        for worker in workers.iter_mut() {
            worker.state = self.reinspect(worker);
            report.steps.push(Step { kind: StepKind::Configure, node: worker.name.clone() });
            self.configure(worker, &masters, &mut report)?;
        }
        report.stage = RunStage::WorkersConfigured;

        report.nodes = masters
            .iter()
            .chain(workers.iter())
            .map(NodeSummary::of)
            .collect();
        report.stage = RunStage::Done;
        info!("cluster is up");
        Ok(report)
    }

    fn reinspect(&self, node: &Node) -> LifecycleState {
        info!("* configure {}: {}", node.name, node.driver);
        let state = HostInspector::new(self.tools).inspect(node);
        info!("+ current state: {}", state);
        state
    }

    /// Configure one host whose state has just been re-inspected.
    fn configure(&self, node: &Node, masters: &[Node], report: &mut RunReport) -> Result<()> {
        let discovery = DiscoveryInstaller::new(self.tools, &self.config.config_dir);
        if let Err(e) = discovery.install(node, masters) {
            report.issue(node, "discovery", &e);
        }

        if let Err(e) = self.setup_dns(node) {
            report.issue(node, "dns", &e);
        }

        if node.state == LifecycleState::SwarmRunning {
            return Ok(());
        }

        self.merger.merge(node)?;

        let restart = "sudo systemctl start docker || sudo /etc/init.d/docker start";
        self.best_effort(node, restart, "restart", report);

        // Re-provisioning fails while Consul containers still run on hosts
        // other than the primary master.
        if !node.is_primary {
            self.best_effort(node, "docker stop consul-agent-server consul-agent", "stop", report);
        }

        info!("+ provision {}", node.name);
        if let Err(e) = self
            .tools
            .machine(&MachineCommands::provision(&node.name), &RunOptions::default())
        {
            report.issue(node, "provision", &e);
        }
        Ok(())
    }

    /// Point the host's resolver at its own Consul agent.
    fn setup_dns(&self, node: &Node) -> Result<()> {
        info!("+ setup DNS");
        let remote = format!(
            "sudo rm -f /etc/resolv.conf && echo \"nameserver {}\" | sudo tee /etc/resolv.conf",
            node.require_cluster_ip()?
        );
        self.tools
            .machine(&MachineCommands::ssh(&node.name, &remote), &RunOptions::default())?;
        Ok(())
    }

    /// Run `remote` on the host; a failure is recorded against the host and
    /// the configure step carries on.
    fn best_effort(&self, node: &Node, remote: &str, action: &'static str, report: &mut RunReport) {
        let opts = RunOptions::quiet();
        if let Err(e) = self.tools.machine(&MachineCommands::ssh(&node.name, remote), &opts) {
            report.issue(node, action, &e);
        }
    }
}
