//! Full orchestrator runs against a scripted runner.
//!
//! The mock plays docker-machine: `create -d` materialises the machine
//! record directory with a minimal `config.json` and TLS files, `ip` and the
//! interface query answer with fixed addresses, everything else succeeds.

use std::path::{Path, PathBuf};

use swarm_creator_core::install::{ensure_config_dir, load_cluster_config};
use swarm_creator_core::swarm::orchestrator::StepKind;
use swarm_creator_core::types::config::ToolPaths;
use swarm_creator_core::types::host_config::HostConfig;
use swarm_creator_core::types::node::LifecycleState;
use swarm_creator_core::{Error, ListPolicy, MockRunner, RunStage, SwarmOrchestrator};

const CLUSTER: &str = r#"
nodes:
  m1:
    type: master
    machine-driver: generic
    driver-opts: --generic-ip-address 203.0.113.1
  w1:
    type: worker
    machine-driver: generic
  w2:
    type: worker
    machine-driver: generic
network:
  cluster-domain: swarm.local
  cluster-interface: eth1
"#;

const RECORD: &str = r#"{
  "ConfigVersion": 3,
  "Driver": {"SwarmMaster": false, "SwarmDiscovery": ""},
  "DriverName": "generic",
  "HostOptions": {
    "EngineOptions": {"ArbitraryFlags": []},
    "SwarmOptions": {"IsSwarm": false, "Discovery": "", "Master": false, "ArbitraryFlags": []},
    "AuthOptions": {"ServerCertSANs": []}
  }
}"#;

fn tools() -> ToolPaths {
    ToolPaths {
        machine: "docker-machine".into(),
        compose: "docker-compose".into(),
        runtime: "docker".into(),
    }
}

struct Fixture {
    _config: tempfile::TempDir,
    storage: tempfile::TempDir,
    cluster: swarm_creator_core::types::config::ClusterConfig,
}

fn fixture(yaml: &str) -> Fixture {
    let config = tempfile::tempdir().unwrap();
    let storage = tempfile::tempdir().unwrap();
    ensure_config_dir(config.path(), config.path()).unwrap();
    std::fs::write(config.path().join("dsc.yaml"), yaml).unwrap();
    let cluster = load_cluster_config(config.path(), tools(), storage.path().to_path_buf()).unwrap();
    Fixture { _config: config, storage, cluster }
}

/// docker-machine stand-in rooted at `storage`.
fn machine_mock(storage: &Path) -> MockRunner {
    let storage: PathBuf = storage.to_path_buf();
    let mut mock = MockRunner::new().with_hook(move |inv| {
        if !inv.args.starts_with("create -d") {
            return;
        }
        let name = inv.args.split_whitespace().last().unwrap();
        let dir = storage.join(name);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("config.json"), RECORD).unwrap();
        for pem in ["ca.pem", "server.pem", "server-key.pem"] {
            std::fs::write(dir.join(pem), "pem").unwrap();
        }
    });
    for (i, short) in ["m1", "w1", "w2"].iter().enumerate() {
        let name = format!("{}.swarm.local", short);
        mock = mock
            .on(&format!("ip {}", name), Ok(format!("203.0.113.{}\n", i + 1)))
            .on(&format!("ssh {} \"ip addr", name), Ok(format!("10.0.0.{}/24\n", i + 1)));
    }
    mock
}

fn positions(lines: &[String], pattern: &str) -> Vec<usize> {
    lines
        .iter()
        .enumerate()
        .filter(|(_, l)| l.contains(pattern))
        .map(|(i, _)| i)
        .collect()
}

#[test]
fn fresh_cluster_creates_then_configures_masters_first() {
    let fx = fixture(CLUSTER);
    let mock = machine_mock(fx.storage.path());
    let report = SwarmOrchestrator::new(&fx.cluster, &mock).run().unwrap();

    assert_eq!(report.stage, RunStage::Done);
    assert_eq!(report.count(StepKind::Create), 3);
    assert_eq!(report.count(StepKind::Configure), 3);
    let order: Vec<(StepKind, &str)> = report
        .steps
        .iter()
        .map(|s| (s.kind, s.node.as_str()))
        .collect();
    assert_eq!(
        order,
        vec![
            (StepKind::Create, "m1.swarm.local"),
            (StepKind::Create, "w1.swarm.local"),
            (StepKind::Create, "w2.swarm.local"),
            (StepKind::Configure, "m1.swarm.local"),
            (StepKind::Configure, "w1.swarm.local"),
            (StepKind::Configure, "w2.swarm.local"),
        ]
    );
    assert!(report.issues.is_empty(), "{:?}", report.issues);

    let lines = mock.command_lines();
    assert_eq!(mock.count_matching("create -d generic"), 3);
    assert_eq!(mock.count_matching("provision "), 3);
    let creates = positions(&lines, "create -d");
    let provisions = positions(&lines, "provision ");
    assert!(creates.iter().max() < provisions.iter().min());
    assert!(lines[provisions[0]].ends_with("m1.swarm.local"));
    assert!(lines[creates[0]].contains("--generic-ip-address 203.0.113.1"));

    // Consul containers are only stopped on hosts other than the primary.
    let stops = positions(&lines, "docker stop consul-agent-server consul-agent");
    assert_eq!(stops.len(), 2);
    assert!(lines[stops[0]].contains("w1.swarm.local"));

    assert!(lines.iter().any(|l| l.contains("nameserver 10.0.0.2")));
    assert_eq!(positions(&lines, "up -d").len(), 3);
}

#[test]
fn fresh_cluster_records_addresses_and_merges() {
    let fx = fixture(CLUSTER);
    let mock = machine_mock(fx.storage.path());
    let report = SwarmOrchestrator::new(&fx.cluster, &mock).run().unwrap();

    let m1 = &report.nodes[0];
    assert!(m1.is_primary);
    assert_eq!(m1.public_ip.as_deref(), Some("203.0.113.1"));
    assert_eq!(m1.cluster_ip.as_deref(), Some("10.0.0.1"));
    assert_eq!(report.nodes.iter().filter(|n| n.is_primary).count(), 1);

    let master_dir = fx.storage.path().join("m1.swarm.local");
    let master = HostConfig::load(&master_dir.join("config.json")).unwrap();
    assert!(master.host_options.swarm_options.is_swarm);
    assert!(master.host_options.swarm_options.master);
    assert!(master
        .host_options
        .engine_options
        .arbitrary_flags
        .contains(&"cluster-advertise=10.0.0.1:2376".to_string()));
    assert!(master_dir.join("consul-server.yml").is_file());

    let worker_dir = fx.storage.path().join("w2.swarm.local");
    let worker = HostConfig::load(&worker_dir.join("config.json")).unwrap();
    assert!(!worker.host_options.swarm_options.master);
    let agent = std::fs::read_to_string(worker_dir.join("consul-agent.yml")).unwrap();
    assert!(agent.contains("-retry-interval 10s --retry-join 10.0.0.1"));
    assert!(agent.contains("-node w2"));
}

#[test]
fn second_run_restarts_discovery_and_skips_merge() {
    let fx = fixture(CLUSTER);
    let first = machine_mock(fx.storage.path());
    SwarmOrchestrator::new(&fx.cluster, &first).run().unwrap();
    let before = std::fs::read_to_string(fx.storage.path().join("w1.swarm.local/config.json")).unwrap();

    let second = machine_mock(fx.storage.path());
    let report = SwarmOrchestrator::new(&fx.cluster, &second).run().unwrap();

    assert_eq!(second.count_matching("create -d"), 0);
    assert_eq!(second.count_matching("provision "), 0);
    assert_eq!(second.count_matching("restart"), 3);
    assert!(report.nodes.iter().all(|n| n.state == LifecycleState::SwarmRunning));
    let after = std::fs::read_to_string(fx.storage.path().join("w1.swarm.local/config.json")).unwrap();
    assert_eq!(before, after);
}

#[test]
fn discovery_failures_do_not_stop_the_run() {
    let fx = fixture(CLUSTER);
    let mock = machine_mock(fx.storage.path()).on("docker-compose", Err("pull failed".into()));
    let report = SwarmOrchestrator::new(&fx.cluster, &mock)
        .with_policy(ListPolicy::Union)
        .run()
        .unwrap();

    assert_eq!(report.stage, RunStage::Done);
    let failed: Vec<_> = report
        .issues
        .iter()
        .filter(|i| i.action == "discovery")
        .map(|i| i.node.as_str())
        .collect();
    assert_eq!(failed, vec!["m1.swarm.local", "w1.swarm.local", "w2.swarm.local"]);
    assert_eq!(mock.count_matching("provision "), 3);
}

fn issue_nodes<'r>(report: &'r swarm_creator_core::RunReport, action: &str) -> Vec<&'r str> {
    report
        .issues
        .iter()
        .filter(|i| i.action == action)
        .map(|i| i.node.as_str())
        .collect()
}

#[test]
fn failed_restart_and_stop_are_recorded() {
    let fx = fixture(CLUSTER);
    let mock = machine_mock(fx.storage.path())
        .on("systemctl start docker", Err("Failed to start docker.service".into()))
        .on("docker stop consul", Err("No such container: consul-agent".into()));
    let report = SwarmOrchestrator::new(&fx.cluster, &mock).run().unwrap();

    assert_eq!(report.stage, RunStage::Done);
    assert_eq!(
        issue_nodes(&report, "restart"),
        vec!["m1.swarm.local", "w1.swarm.local", "w2.swarm.local"]
    );
    assert_eq!(issue_nodes(&report, "stop"), vec!["w1.swarm.local", "w2.swarm.local"]);
    let stop = report.issues.iter().find(|i| i.action == "stop").unwrap();
    assert!(stop.message.contains("No such container"));
    assert_eq!(mock.count_matching("provision "), 3);
}

#[test]
fn failed_reprovision_does_not_stop_later_hosts() {
    let fx = fixture(CLUSTER);
    let mock = machine_mock(fx.storage.path()).on("provision ", Err("ssh: handshake failed".into()));
    let report = SwarmOrchestrator::new(&fx.cluster, &mock).run().unwrap();

    assert_eq!(report.stage, RunStage::Done);
    assert_eq!(report.count(StepKind::Configure), 3);
    assert_eq!(
        issue_nodes(&report, "provision"),
        vec!["m1.swarm.local", "w1.swarm.local", "w2.swarm.local"]
    );
    let w2 = HostConfig::load(&fx.storage.path().join("w2.swarm.local/config.json")).unwrap();
    assert!(w2.host_options.swarm_options.is_swarm);
}

#[test]
fn failed_dns_setup_does_not_stop_later_hosts() {
    let fx = fixture(CLUSTER);
    let mock = machine_mock(fx.storage.path()).on("nameserver", Err("tee: permission denied".into()));
    let report = SwarmOrchestrator::new(&fx.cluster, &mock).run().unwrap();

    assert_eq!(report.stage, RunStage::Done);
    assert_eq!(
        issue_nodes(&report, "dns"),
        vec!["m1.swarm.local", "w1.swarm.local", "w2.swarm.local"]
    );
    assert_eq!(mock.count_matching("provision "), 3);
    let w2 = HostConfig::load(&fx.storage.path().join("w2.swarm.local/config.json")).unwrap();
    assert!(w2.host_options.swarm_options.is_swarm);
}

#[test]
fn zero_masters_abort_before_provisioning() {
    let yaml = "nodes:\n  w1:\n    type: worker\nnetwork:\n  cluster-domain: swarm.local\n";
    let fx = fixture(yaml);
    let mock = machine_mock(fx.storage.path());
    let err = SwarmOrchestrator::new(&fx.cluster, &mock).run().unwrap_err();
    assert!(matches!(err, Error::NoNodes(_)));
    assert!(err.is_fatal());
    assert!(mock.invocations().is_empty());
}

#[test]
fn missing_machine_record_is_fatal() {
    let fx = fixture(CLUSTER);
    // The machine tool "succeeds" without writing any record.
    let mut mock = MockRunner::new();
    for (i, short) in ["m1", "w1", "w2"].iter().enumerate() {
        let name = format!("{}.swarm.local", short);
        mock = mock
            .on(&format!("ip {}", name), Ok(format!("203.0.113.{}", i + 1)))
            .on(&format!("ssh {} \"ip addr", name), Ok(format!("10.0.0.{}/24", i + 1)));
    }
    let err = SwarmOrchestrator::new(&fx.cluster, &mock).run().unwrap_err();
    assert!(matches!(err, Error::HostConfigMissing(_)));
    assert_eq!(mock.count_matching("provision "), 0);
}
