//! Swarm wiring merged into a host's docker-machine record.
//!
//! The rules below are applied in a fixed order to the typed `HostConfig`.
//! Scalar fields are plain assignments and therefore stable under
//! re-application. List fields follow the merger's `ListPolicy`: with
//! `Append` a second merge of the same host duplicates every list entry it
//! adds; `Union` skips entries that are already present.

use std::collections::HashSet;

use tracing::{info, warn};

use crate::error::Result;
use crate::types::host_config::HostConfig;
use crate::types::node::Node;

use super::machine::{discovery_url, ENGINE_PORT, SWARM_PORT};

/// How list fields receive new entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListPolicy {
    /// Always append.
    #[default]
    Append,
    /// Append only entries not already in the list.
    Union,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ConfigMerger {
    pub policy: ListPolicy,
}

impl ConfigMerger {
    pub fn new(policy: ListPolicy) -> Self {
        ConfigMerger { policy }
    }

    /// Load the node's record, merge the swarm settings and write it back.
    ///
    /// A missing record means the host was never created by docker-machine
    /// and is reported as `Error::HostConfigMissing`.
    pub fn merge(&self, node: &Node) -> Result<()> {
        let path = node.config_path();
        let mut config = HostConfig::load(&path)?;

        let dupes = duplicate_entries(&config);
        if !dupes.is_empty() {
            warn!(node = %node.name, entries = ?dupes, "machine config already holds duplicated swarm entries");
        }

        self.apply(&mut config, node)?;
        config.save(&path)?;
        info!("+ updated machine config {}", path.display());
        Ok(())
    }

    /// Apply the merge rules to an in-memory record.
    pub fn apply(&self, config: &mut HostConfig, node: &Node) -> Result<()> {
        let cluster_ip = node.require_cluster_ip()?.to_string();
        let public_ip = node.require_public_ip()?.to_string();
        let discovery = discovery_url(&node.domain);

        let engine_flags = [
            format!("cluster-advertise={}:{}", cluster_ip, ENGINE_PORT),
            format!("cluster-store={}", discovery),
            format!("dns={}", cluster_ip),
            format!("dns-search={}", node.domain),
        ];
        self.extend(&mut config.host_options.engine_options.arbitrary_flags, engine_flags);

        config.driver.swarm_discovery = Some(Some(discovery.clone()));

        let swarm = &mut config.host_options.swarm_options;
        swarm.discovery = Some(Some(discovery));
        swarm.is_swarm = true;

        let mut sans = vec![node.shortname.clone(), cluster_ip.clone()];
        if public_ip != cluster_ip {
            sans.push(public_ip);
        }
        self.extend(&mut config.host_options.auth_options.server_cert_sans, sans);

        if node.is_master() {
            config.driver.swarm_master = Some(Some(true));
            config.host_options.swarm_options.master = true;
            let master_flags = [
                "replication=true".to_string(),
                format!("advertise={}:{}", cluster_ip, SWARM_PORT),
            ];
            self.extend(&mut config.host_options.swarm_options.arbitrary_flags, master_flags);
        }
        Ok(())
    }

    fn extend(&self, list: &mut Vec<String>, entries: impl IntoIterator<Item = String>) {
        for entry in entries {
            if self.policy == ListPolicy::Union && list.contains(&entry) {
                continue;
            }
            list.push(entry);
        }
    }
}

/// Entries that occur more than once in any list field the merger writes.
pub fn duplicate_entries(config: &HostConfig) -> Vec<String> {
    let lists = [
        &config.host_options.engine_options.arbitrary_flags,
        &config.host_options.swarm_options.arbitrary_flags,
        &config.host_options.auth_options.server_cert_sans,
    ];
    let mut dupes = Vec::new();
    for list in lists {
        let mut seen = HashSet::new();
        for entry in list {
            if !seen.insert(entry) && !dupes.contains(entry) {
                dupes.push(entry.clone());
            }
        }
    }
    dupes
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::types::config::NodeSpec;
    use crate::types::node::NodeRole;
    use std::path::Path;

    const RECORD: &str = r#"{
        "ConfigVersion": 3,
        "Driver": {"IPAddress": "203.0.113.10", "SwarmMaster": false, "SwarmDiscovery": ""},
        "DriverName": "generic",
        "HostOptions": {
            "EngineOptions": {"ArbitraryFlags": ["log-level=debug"], "TlsVerify": true},
            "SwarmOptions": {"IsSwarm": false, "Discovery": "", "Master": false,
                             "ArbitraryFlags": [], "Strategy": "spread"},
            "AuthOptions": {"ServerCertSANs": null, "CertDir": "/certs"}
        }
    }"#;

    fn node(role: NodeRole, public_ip: &str) -> Node {
        let spec = NodeSpec {
            role: Some(role),
            machine_driver: "generic".into(),
            ..NodeSpec::default()
        };
        let mut n = Node::new("n1", "swarm.local", role, &spec, "eth1", Path::new("/m"));
        n.public_ip = Some(public_ip.into());
        n.cluster_ip = Some("10.0.0.5".into());
        n
    }

    fn merged(policy: ListPolicy, node: &Node, times: usize) -> HostConfig {
        let mut config = HostConfig::parse(RECORD).unwrap();
        let merger = ConfigMerger::new(policy);
        for _ in 0..times {
            merger.apply(&mut config, node).unwrap();
        }
        config
    }

    #[test]
    fn worker_merge_sets_discovery_and_flags() {
        let n = node(NodeRole::Worker, "203.0.113.10");
        let cfg = merged(ListPolicy::Append, &n, 1);
        let url = "consul://consul.service.swarm.local:8500";

        assert_eq!(
            cfg.host_options.engine_options.arbitrary_flags,
            vec![
                "log-level=debug".to_string(),
                "cluster-advertise=10.0.0.5:2376".to_string(),
                format!("cluster-store={}", url),
                "dns=10.0.0.5".to_string(),
                "dns-search=swarm.local".to_string(),
            ]
        );
        assert_eq!(cfg.driver.swarm_discovery, Some(Some(url.to_string())));
        assert_eq!(cfg.host_options.swarm_options.discovery, Some(Some(url.to_string())));
        assert!(cfg.host_options.swarm_options.is_swarm);
        assert!(!cfg.host_options.swarm_options.master);
        assert_eq!(cfg.driver.swarm_master, Some(Some(false)));
        assert!(cfg.host_options.swarm_options.arbitrary_flags.is_empty());
        assert_eq!(
            cfg.host_options.auth_options.server_cert_sans,
            vec!["n1", "10.0.0.5", "203.0.113.10"]
        );
    }

    #[test]
    fn master_merge_marks_master() {
        let n = node(NodeRole::Master, "203.0.113.10");
        let cfg = merged(ListPolicy::Append, &n, 1);
        assert_eq!(cfg.driver.swarm_master, Some(Some(true)));
        assert!(cfg.host_options.swarm_options.master);
        assert_eq!(
            cfg.host_options.swarm_options.arbitrary_flags,
            vec!["replication=true", "advertise=10.0.0.5:3376"]
        );
    }

    #[test]
    fn public_ip_san_skipped_when_equal() {
        let n = node(NodeRole::Worker, "10.0.0.5");
        let cfg = merged(ListPolicy::Append, &n, 1);
        assert_eq!(cfg.host_options.auth_options.server_cert_sans, vec!["n1", "10.0.0.5"]);
    }

    #[test]
    fn append_twice_duplicates_lists_but_not_scalars() {
        let n = node(NodeRole::Master, "203.0.113.10");
        let once = merged(ListPolicy::Append, &n, 1);
        let twice = merged(ListPolicy::Append, &n, 2);

        assert_eq!(twice.host_options.engine_options.arbitrary_flags.len(), 1 + 2 * 4);
        assert_eq!(twice.host_options.auth_options.server_cert_sans.len(), 2 * 3);
        assert_eq!(twice.host_options.swarm_options.arbitrary_flags.len(), 2 * 2);

        assert_eq!(twice.host_options.swarm_options.is_swarm, once.host_options.swarm_options.is_swarm);
        assert_eq!(twice.host_options.swarm_options.discovery, once.host_options.swarm_options.discovery);
        assert_eq!(twice.host_options.swarm_options.master, once.host_options.swarm_options.master);
        assert_eq!(twice.driver.swarm_master, once.driver.swarm_master);
        assert_eq!(twice.driver.swarm_discovery, once.driver.swarm_discovery);

        assert!(duplicate_entries(&once).is_empty());
        let dupes = duplicate_entries(&twice);
        assert!(dupes.contains(&"dns=10.0.0.5".to_string()));
        assert!(dupes.contains(&"replication=true".to_string()));
    }

    #[test]
    fn union_is_idempotent() {
        let n = node(NodeRole::Master, "203.0.113.10");
        let once = merged(ListPolicy::Union, &n, 1);
        let twice = merged(ListPolicy::Union, &n, 2);
        assert_eq!(once, twice);
    }

    #[test]
    fn unknown_fields_preserved() {
        let n = node(NodeRole::Worker, "203.0.113.10");
        let cfg = merged(ListPolicy::Append, &n, 1);
        let value = serde_json::to_value(&cfg).unwrap();
        assert_eq!(value["ConfigVersion"], 3);
        assert_eq!(value["DriverName"], "generic");
        assert_eq!(value["Driver"]["IPAddress"], "203.0.113.10");
        assert_eq!(value["HostOptions"]["SwarmOptions"]["Strategy"], "spread");
        assert_eq!(value["HostOptions"]["AuthOptions"]["CertDir"], "/certs");
        assert_eq!(value["HostOptions"]["EngineOptions"]["TlsVerify"], true);
    }

    #[test]
    fn merge_requires_addresses() {
        let mut n = node(NodeRole::Worker, "203.0.113.10");
        n.cluster_ip = None;
        let mut cfg = HostConfig::parse(RECORD).unwrap();
        let err = ConfigMerger::default().apply(&mut cfg, &n).unwrap_err();
        assert!(matches!(err, Error::AddressUnknown(_)));
    }

    #[test]
    fn merge_rewrites_file() {
        let dir = tempfile::tempdir().unwrap();
        let spec = NodeSpec {
            role: Some(NodeRole::Worker),
            machine_driver: "generic".into(),
            ..NodeSpec::default()
        };
        let mut n = Node::new("w1", "swarm.local", NodeRole::Worker, &spec, "eth1", dir.path());
        n.public_ip = Some("203.0.113.20".into());
        n.cluster_ip = Some("10.0.0.6".into());
        std::fs::create_dir_all(&n.machine_path).unwrap();
        std::fs::write(n.config_path(), RECORD).unwrap();

        ConfigMerger::default().merge(&n).unwrap();
        let back = HostConfig::load(&n.config_path()).unwrap();
        assert!(back.host_options.swarm_options.is_swarm);
        assert!(back.host_options.auth_options.server_cert_sans.contains(&"w1".to_string()));
    }

    #[test]
    fn merge_without_record_is_missing() {
        let dir = tempfile::tempdir().unwrap();
        let spec = NodeSpec::default();
        let n = Node::new("w1", "swarm.local", NodeRole::Worker, &spec, "eth1", dir.path());
        let err = ConfigMerger::default().merge(&n).unwrap_err();
        assert!(matches!(err, Error::HostConfigMissing(_)));
        assert!(err.is_fatal());
    }
}
