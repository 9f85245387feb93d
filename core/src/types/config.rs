use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};
use tracing::warn;

use crate::error::{Error, Result};

use super::node::NodeRole;

/// Name of the cluster configuration file inside the config directory.
pub const CONFIG_FILENAME: &str = "dsc.yaml";

/// Cluster interface used when neither the node nor the network names one.
pub const DEFAULT_CLUSTER_INTERFACE: &str = "eth1";


/// Per-node declaration under `nodes:` in `dsc.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct NodeSpec {
    /// `None` when the type is missing or names neither role.
    #[serde(
        rename = "type",
        default,
        deserialize_with = "known_role",
        skip_serializing_if = "Option::is_none"
    )]
    pub role: Option<NodeRole>,
    #[serde(default)]
    pub machine_driver: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver_opts: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine_opts: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_interface: Option<String>,
    /// Driver-specific keys, kept as declared.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NodeEntry {
    pub shortname: String,
    pub spec: NodeSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct NetworkConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_interface: Option<String>,
}


/// The parsed contents of `dsc.yaml`, nodes in declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClusterFile {
    pub nodes: Vec<NodeEntry>,
    pub network: NetworkConfig,
}

#[derive(Deserialize)]
struct RawClusterFile {
    #[serde(default, deserialize_with = "null_as_default")]
    nodes: serde_yaml::Mapping,
    #[serde(default, deserialize_with = "null_as_default")]
    network: NetworkConfig,
}

fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn known_role<'de, D>(deserializer: D) -> std::result::Result<Option<NodeRole>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_yaml::Value>::deserialize(deserializer)?;
    Ok(match value.as_ref().and_then(|v| v.as_str()) {
        Some("master") => Some(NodeRole::Master),
        Some("worker") => Some(NodeRole::Worker),
        _ => None,
    })
}

impl ClusterFile {
    /// Parse a cluster file. An empty document yields an empty cluster; a
    /// document whose top level is not a mapping is rejected.
    pub fn parse(content: &str) -> Result<ClusterFile> {
        let doc: serde_yaml::Value = if content.trim().is_empty() {
            serde_yaml::Value::Null
        } else {
            serde_yaml::from_str(content)
                .map_err(|e| Error::config(format!("invalid YAML: {}", e)))?
        };
        if doc.is_null() {
            return Ok(ClusterFile::default());
        }
        if !doc.is_mapping() {
            return Err(Error::config("the configuration file does not contain a dictionary"));
        }

        let raw: RawClusterFile = serde_yaml::from_value(doc)
            .map_err(|e| Error::config(e.to_string()))?;

        let mut nodes = Vec::with_capacity(raw.nodes.len());
        for (key, value) in raw.nodes {
            let shortname = match key {
                serde_yaml::Value::String(s) => s,
                serde_yaml::Value::Number(n) => n.to_string(),
                other => {
                    return Err(Error::config(format!("invalid node name: {:?}", other)));
                }
            };
            let spec: NodeSpec = if value.is_null() {
                NodeSpec::default()
            } else {
                serde_yaml::from_value(value)
                    .map_err(|e| Error::config(format!("node '{}': {}", shortname, e)))?
            };
            if spec.role.is_none() {
                warn!(node = %shortname, "node has no master/worker type, ignoring it");
            }
            nodes.push(NodeEntry { shortname, spec });
        }

        Ok(ClusterFile {
            nodes,
            network: raw.network,
        })
    }

    /// Read and parse a cluster file from disk.
    pub fn load(path: &Path) -> Result<ClusterFile> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::parse(&content)
    }
}


/// Absolute paths of the three external tools.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolPaths {
    pub machine: PathBuf,
    pub compose: PathBuf,
    pub runtime: PathBuf,
}


/// Run configuration, built once at startup and read-only afterwards.
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    pub nodes: Vec<NodeEntry>,
    pub network: NetworkConfig,
    pub tools: ToolPaths,
    /// Directory holding `dsc.yaml` and the discovery templates.
    pub config_dir: PathBuf,
    /// Directory with one docker-machine record directory per host.
    pub machine_storage: PathBuf,
}

impl ClusterConfig {
    pub fn new(
        file: ClusterFile,
        tools: ToolPaths,
        config_dir: PathBuf,
        machine_storage: PathBuf,
    ) -> Self {
        ClusterConfig {
            nodes: file.nodes,
            network: file.network,
            tools,
            config_dir,
            machine_storage,
        }
    }

    /// Join `parts` onto the config directory.
    pub fn path<I, P>(&self, parts: I) -> PathBuf
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut path = self.config_dir.clone();
        for part in parts {
            path.push(part);
        }
        path
    }

    pub fn cluster_domain(&self) -> Result<&str> {
        match self.network.cluster_domain.as_deref() {
            Some(d) if !d.trim().is_empty() => Ok(d),
            _ => Err(Error::config("network.cluster-domain is not set")),
        }
    }

    pub fn default_interface(&self) -> &str {
        self.network
            .cluster_interface
            .as_deref()
            .unwrap_or(DEFAULT_CLUSTER_INTERFACE)
    }

    /// Declared nodes of the given role, in declaration order.
    pub fn nodes_with_role(&self, role: NodeRole) -> impl Iterator<Item = &NodeEntry> {
        self.nodes
            .iter()
            .filter(move |entry| entry.spec.role == Some(role))
    }
}


/// Default machine storage: `~/.docker/machine/machines`.
pub fn default_machine_storage() -> PathBuf {
    home_dir()
        .unwrap_or_else(|| PathBuf::from("/root"))
        .join(".docker")
        .join("machine")
        .join("machines")
}

fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}
