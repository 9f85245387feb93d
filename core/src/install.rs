//! Config directory bootstrap and cluster config loading.
//!
//! `ensure_config_dir` creates the default config directory when it is
//! missing (a user-specified directory must already exist) and seeds the
//! Consul templates the discovery installer renders. Existing files are never
//! overwritten, so operators can edit the templates in place.
//! `load_cluster_config` reads `dsc.yaml` and builds the run configuration.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::types::config::{ClusterConfig, ClusterFile, ToolPaths, CONFIG_FILENAME};

/// Directory under the config dir that holds the discovery templates.
pub const TEMPLATE_DIR: &str = "consul";

const SERVER_TEMPLATE: &str = include_str!("../assets/consul/server.yml");
const AGENT_TEMPLATE: &str = include_str!("../assets/consul/agent.yml");
const CONSUL_CONFIG: &str = include_str!("../assets/consul/config/consul.json");

/// Result of a config directory check.
#[derive(Debug, PartialEq)]
pub enum InstallStatus {
    /// Directory and templates were already in place.
    Current,
    /// The default directory was created.
    Created,
    /// The directory existed but some templates had to be written.
    Seeded { written: Vec<PathBuf> },
}

/// `<cwd>/config`.
pub fn default_config_dir() -> PathBuf {
    std::env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join("config")
}

/// Make sure `config_dir` exists and holds the discovery templates.
///
/// Only `default_dir` is created on demand; any other missing directory is a
/// configuration error.
pub fn ensure_config_dir(config_dir: &Path, default_dir: &Path) -> Result<InstallStatus> {
    let mut created = false;
    if !config_dir.is_dir() {
        if config_dir != default_dir {
            return Err(Error::config(format!(
                "specified configuration directory does not exist {}",
                config_dir.display()
            )));
        }
        std::fs::create_dir_all(config_dir).map_err(|e| {
            Error::config(format!(
                "unable to create default configuration directory {}: {}",
                config_dir.display(),
                e
            ))
        })?;
        info!(dir = %config_dir.display(), "created configuration directory");
        created = true;
    }

    let written = write_default_templates(config_dir)?;
    Ok(if created {
        InstallStatus::Created
    } else if written.is_empty() {
        InstallStatus::Current
    } else {
        InstallStatus::Seeded { written }
    })
}

/// Write any missing template files, returning the paths written.
fn write_default_templates(config_dir: &Path) -> Result<Vec<PathBuf>> {
    let base = config_dir.join(TEMPLATE_DIR);
    let files = [
        (base.join("server.yml"), SERVER_TEMPLATE),
        (base.join("agent.yml"), AGENT_TEMPLATE),
        (base.join("config").join("consul.json"), CONSUL_CONFIG),
    ];

    let mut written = Vec::new();
    for (path, content) in files {
        if path.exists() {
            continue;
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, content)?;
        written.push(path);
    }
    Ok(written)
}

/// Load `dsc.yaml` from `config_dir` and build the run configuration.
///
/// A missing file is treated as an empty cluster (the orchestrator then
/// refuses to run for lack of masters). The config directory is normalised
/// to the absolute directory that holds the file.
pub fn load_cluster_config(
    config_dir: &Path,
    tools: ToolPaths,
    machine_storage: PathBuf,
) -> Result<ClusterConfig> {
    let config_path = config_dir.join(CONFIG_FILENAME);
    let file = if config_path.is_file() {
        ClusterFile::load(&config_path)?
    } else {
        warn!(path = %config_path.display(), "configuration file not found");
        ClusterFile::default()
    };

    let normalized = config_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| config_dir.to_path_buf());
    let normalized = std::fs::canonicalize(&normalized).unwrap_or(normalized);

    Ok(ClusterConfig::new(file, tools, normalized, machine_storage))
}
