//! Locating the external tools.
//!
//! The search list is built explicitly from `PATH` plus `/usr/local/bin`
//! and handed to `discover`; nothing here modifies the process environment.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Error, Result};
use crate::types::config::ToolPaths;

pub const MACHINE_BIN: &str = "docker-machine";
pub const COMPOSE_BIN: &str = "docker-compose";
pub const RUNTIME_BIN: &str = "docker";

const EXTRA_SEARCH_DIR: &str = "/usr/local/bin";

/// Directories to search: `PATH` entries followed by `/usr/local/bin`.
pub fn search_dirs() -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = std::env::var_os("PATH")
        .map(|p| std::env::split_paths(&p).collect())
        .unwrap_or_default();
    let extra = PathBuf::from(EXTRA_SEARCH_DIR);
    if !dirs.contains(&extra) {
        dirs.push(extra);
    }
    dirs
}

/// First executable file called `name` in `dirs`.
pub fn find_binary(name: &str, dirs: &[PathBuf]) -> Option<PathBuf> {
    dirs.iter()
        .map(|dir| dir.join(name))
        .find(|candidate| is_executable(candidate))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Resolve all three tools, failing on the first one that is missing.
pub fn discover(dirs: &[PathBuf]) -> Result<ToolPaths> {
    let locate = |name: &str, label: &str| {
        let found = find_binary(name, dirs).ok_or_else(|| Error::ToolNotFound {
            tool: label.to_string(),
            hint: "Refer to the Docker manual on how to install it for your platform.".to_string(),
        })?;
        debug!(tool = name, path = %found.display(), "found tool");
        Ok::<_, Error>(found)
    };
    Ok(ToolPaths {
        machine: locate(MACHINE_BIN, "Docker Machine")?,
        compose: locate(COMPOSE_BIN, "Docker Compose")?,
        runtime: locate(RUNTIME_BIN, "Docker")?,
    })
}
