//! Typed view of a docker-machine host record (`<machine_path>/config.json`).
//!
//! Only the sections the swarm wiring touches are named. Every other field,
//! at any nesting level this type descends into, lands in a flattened
//! `extra` map and is written back unchanged.
//!
//! Nullable named keys are `Option<Option<T>>`: the outer `None` means the key
//! was absent and stays absent, `Some(None)` is an explicit `null` and is
//! written back as one. Named keys are serialized ahead of the `extra` keys,
//! which keep their relative order.

use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct HostConfig {
    #[serde(default)]
    pub driver: DriverSection,
    #[serde(default)]
    pub host_options: HostOptions,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DriverSection {
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub swarm_discovery: Option<Option<String>>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub swarm_master: Option<Option<bool>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct HostOptions {
    #[serde(default)]
    pub engine_options: EngineOptions,
    #[serde(default)]
    pub swarm_options: SwarmOptions,
    #[serde(default)]
    pub auth_options: AuthOptions,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EngineOptions {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub arbitrary_flags: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SwarmOptions {
    #[serde(default)]
    pub is_swarm: bool,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub discovery: Option<Option<String>>,
    #[serde(default)]
    pub master: bool,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub arbitrary_flags: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthOptions {
    #[serde(rename = "ServerCertSANs", default, deserialize_with = "null_as_empty")]
    pub server_cert_sans: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Only called when the key is present, so `null` becomes `Some(None)`.
fn present<'de, D, T>(deserializer: D) -> std::result::Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Some(Option::<T>::deserialize(deserializer)?))
}

/// Go writes nil slices as `null`.
fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

impl HostConfig {
    /// Read a host record. A missing file is reported as
    /// `Error::HostConfigMissing` so callers can tell "never created" apart
    /// from a corrupt record.
    pub fn load(path: &Path) -> Result<HostConfig> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::HostConfigMissing(path.to_path_buf()));
            }
            Err(e) => return Err(Error::host_config(path, e.to_string())),
        };
        Self::parse(&content).map_err(|e| Error::host_config(path, e))
    }

    pub fn parse(content: &str) -> std::result::Result<HostConfig, String> {
        serde_json::from_str(content).map_err(|e| format!("invalid JSON: {}", e))
    }

    /// Overwrite the record at `path`.
    pub fn save(&self, path: &Path) -> Result<()> {
        let data = serde_json::to_string_pretty(self)
            .map_err(|e| Error::host_config(path, format!("failed to serialize: {}", e)))?;
        std::fs::write(path, data)
            .map_err(|e| Error::host_config(path, format!("failed to write: {}", e)))
    }
}
