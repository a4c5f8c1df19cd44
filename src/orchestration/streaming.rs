use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::Client;
use tracing::warn;

use crate::error::{NodeError, Result};
use crate::model::{ContainerInput, ContainerResult, Location, OffchainJobMessage};
use crate::orchestration::container_manager::ContainerManager;
use crate::orchestration::store::{ContainerStatus, DataStore};

/// Streams a single container's chunked `/service_output` response back to the
/// caller while simultaneously buffering it for the final `DataStore` record.
///
/// Only `message.containers[0]` is used; additional entries are ignored by
/// design (a streaming job is, by definition, a single-container pipeline).
pub struct StreamingPipeline {
    containers: Arc<ContainerManager>,
    store: Arc<dyn DataStore>,
    http: Client,
}

/// State threaded through the `futures::stream::unfold` that drives
/// `run_stream`'s returned stream.
struct StreamState {
    upstream: Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>,
    buffer: Vec<u8>,
    job_id: String,
    container_id: String,
    store: Arc<dyn DataStore>,
    done: bool,
}

impl StreamingPipeline {
    pub fn new(containers: Arc<ContainerManager>, store: Arc<dyn DataStore>) -> Self {
        Self { containers, store, http: Client::new() }
    }

    /// Returns a byte stream of the container's response body. The returned
    /// stream also drives the bookkeeping side effects (DataStore transitions)
    /// as it is polled — nothing happens until the caller consumes it.
    pub async fn run_stream(
        &self,
        message: &OffchainJobMessage,
    ) -> Result<Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>> {
        let container_id = message
            .containers
            .first()
            .ok_or_else(|| NodeError::Precondition("streaming job requires at least one container".to_string()))?
            .clone();

        self.store.set_running(&message.id).await;

        let input = ContainerInput {
            source: Location::Offchain,
            destination: Location::Stream,
            data: message.data.clone(),
            requires_proof: message.requires_proof,
        };

        let url = self.containers.base_url(&container_id)? + "/service_output";

        let response = match self.http.post(&url).json(&input).send().await {
            Ok(response) => response,
            Err(err) => {
                self.fail(&message.id, &container_id, err.to_string()).await;
                return Err(NodeError::ContainerIo { container_id, message: err.to_string() });
            }
        };

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let message_text = format!("http {status}: {body}");
            self.fail(&message.id, &container_id, message_text.clone()).await;
            return Err(NodeError::ContainerIo { container_id, message: message_text });
        }

        let state = StreamState {
            upstream: Box::pin(response.bytes_stream()),
            buffer: Vec::new(),
            job_id: message.id.clone(),
            container_id,
            store: self.store.clone(),
            done: false,
        };

        let stream = futures::stream::unfold(state, |mut state| async move {
            if state.done {
                return None;
            }

            match state.upstream.next().await {
                Some(Ok(bytes)) => {
                    state.buffer.extend_from_slice(&bytes);
                    Some((Ok(bytes), state))
                }
                Some(Err(err)) => {
                    let message_text = err.to_string();
                    state.store.track_container_status(&state.job_id, &state.container_id, ContainerStatus::Failed).await;
                    state
                        .store
                        .set_failed(
                            &state.job_id,
                            &[ContainerResult::Error { container_id: state.container_id.clone(), message: message_text.clone() }],
                        )
                        .await;
                    warn!(job_id = %state.job_id, container_id = %state.container_id, error = %message_text, "stream read failed");
                    state.done = true;
                    Some((Err(NodeError::ContainerIo { container_id: state.container_id.clone(), message: message_text }), state))
                }
                None => {
                    let text = String::from_utf8_lossy(&state.buffer).to_string();
                    state.store.track_container_status(&state.job_id, &state.container_id, ContainerStatus::Success).await;
                    state
                        .store
                        .set_success(
                            &state.job_id,
                            &[ContainerResult::Success {
                                container_id: state.container_id.clone(),
                                output: serde_json::json!({ "output": text }),
                            }],
                        )
                        .await;
                    None
                }
            }
        });

        Ok(Box::pin(stream))
    }

    async fn fail(&self, job_id: &str, container_id: &str, message: String) {
        self.store.track_container_status(job_id, container_id, ContainerStatus::Failed).await;
        self.store
            .set_failed(job_id, &[ContainerResult::Error { container_id: container_id.to_string(), message }])
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[tokio::test]
    async fn rejects_empty_container_list() {
        let containers = Arc::new(ContainerManager::from_ports(HashMap::new()));
        let store: Arc<dyn DataStore> = Arc::new(crate::orchestration::store::InMemoryDataStore::new());
        let pipeline = StreamingPipeline::new(containers, store);
        let message = OffchainJobMessage {
            id: "job-1".to_string(),
            containers: Vec::new(),
            data: serde_json::Value::Null,
            requires_proof: false,
        };
        assert!(pipeline.run_stream(&message).await.is_err());
    }
}
