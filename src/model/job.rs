use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::location::Location;

/// Initial input to the first container in a chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobInput {
    pub source: Location,
    pub destination: Location,
    pub data: Value,
}

/// Request body posted to a container's `/service_output` endpoint.
///
/// Destination rule: for position `i` in a chain of length `n`, destination is the
/// job's final destination if `i == n - 1`, otherwise `Offchain`. Source: the first
/// container uses the job's source; every subsequent container uses `Offchain`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerInput {
    pub source: Location,
    pub destination: Location,
    pub data: Value,
    pub requires_proof: bool,
}

/// Outcome of invoking a single container.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum ContainerResult {
    Success { container_id: String, output: Value },
    Error { container_id: String, message: String },
}

impl ContainerResult {
    pub fn container_id(&self) -> &str {
        match self {
            ContainerResult::Success { container_id, .. } => container_id,
            ContainerResult::Error { container_id, .. } => container_id,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ContainerResult::Success { .. })
    }
}

/// Raw off-chain job submitted through the external HTTP API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OffchainJobMessage {
    pub id: String,
    pub containers: Vec<String>,
    pub data: Value,
    pub requires_proof: bool,
}
