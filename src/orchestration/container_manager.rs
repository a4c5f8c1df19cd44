use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::{NodeError, Result};

const DOCKER_HOST: &str = "host.docker.internal";
const LOCAL_HOST: &str = "localhost";

/// On-disk shape of the container manager config file: a flat map from container
/// name to the TCP port it listens on, the same shape `DeploymentArtifact` loads
/// its deployment JSON from.
#[derive(Debug, Clone, Deserialize)]
struct RawContainerConfig {
    #[serde(flatten)]
    ports: HashMap<String, u16>,
}

/// Read-only port map, built once at startup. Host resolution happens here too,
/// from the `RUNTIME` environment variable, and is never re-evaluated per
/// request.
#[derive(Debug, Clone)]
pub struct ContainerManager {
    ports: HashMap<String, u16>,
    host: String,
}

impl ContainerManager {
    /// Loads a container name → port map from a JSON config file, the way
    /// `DeploymentArtifact::load` loads deployment JSON.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .map_err(|e| NodeError::Config(format!("failed to read container config {}: {e}", path.display())))?;
        let config: RawContainerConfig = serde_json::from_str(&raw)
            .map_err(|e| NodeError::Config(format!("failed to parse container config {}: {e}", path.display())))?;

        Ok(Self { ports: config.ports, host: resolve_host() })
    }

    pub fn from_ports(ports: HashMap<String, u16>) -> Self {
        Self { ports, host: resolve_host() }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port_of(&self, container: &str) -> Result<u16> {
        self.ports
            .get(container)
            .copied()
            .ok_or_else(|| NodeError::Config(format!("no port configured for container '{container}'")))
    }

    pub fn base_url(&self, container: &str) -> Result<String> {
        let port = self.port_of(container)?;
        Ok(format!("http://{}:{}", self.host, port))
    }

    pub fn container_names(&self) -> Vec<String> {
        self.ports.keys().cloned().collect()
    }
}

fn resolve_host() -> String {
    match std::env::var("RUNTIME") {
        Ok(value) if value == "docker" => DOCKER_HOST.to_string(),
        _ => LOCAL_HOST.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ports() -> HashMap<String, u16> {
        HashMap::from([("a".to_string(), 8001), ("b".to_string(), 8002)])
    }

    #[test]
    fn resolves_localhost_by_default() {
        std::env::remove_var("RUNTIME");
        let manager = ContainerManager::from_ports(ports());
        assert_eq!(manager.host(), "localhost");
        assert_eq!(manager.base_url("a").unwrap(), "http://localhost:8001");
    }

    #[test]
    fn resolves_docker_internal_host_under_runtime_docker() {
        std::env::set_var("RUNTIME", "docker");
        let manager = ContainerManager::from_ports(ports());
        assert_eq!(manager.host(), "host.docker.internal");
        std::env::remove_var("RUNTIME");
    }

    #[test]
    fn unknown_container_is_a_config_error() {
        let manager = ContainerManager::from_ports(ports());
        assert!(manager.port_of("missing").is_err());
    }
}
