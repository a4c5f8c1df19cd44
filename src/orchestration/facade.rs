use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use futures::Stream;
use serde_json::Value;

use crate::error::Result;
use crate::model::{ContainerResult, JobInput, Location, OffchainJobMessage};
use crate::orchestration::container_manager::ContainerManager;
use crate::orchestration::pipeline::ContainerPipeline;
use crate::orchestration::resource_probe::ResourceProbe;
use crate::orchestration::store::DataStore;
use crate::orchestration::streaming::StreamingPipeline;

/// Single entry point callers (an HTTP API, a CLI, or the integration tests) use
/// to dispatch work into the container execution layer. Each method is a thin
/// wrapper over one of `ContainerPipeline`, `StreamingPipeline`, or
/// `ResourceProbe` — the facade itself holds no execution logic of its own.
pub struct Orchestrator {
    pipeline: ContainerPipeline,
    streaming: StreamingPipeline,
    probe: ResourceProbe,
}

impl Orchestrator {
    pub fn new(containers: Arc<ContainerManager>, store: Arc<dyn DataStore>) -> Self {
        Self {
            pipeline: ContainerPipeline::new(containers.clone(), store.clone()),
            streaming: StreamingPipeline::new(containers.clone(), store),
            probe: ResourceProbe::new(containers),
        }
    }

    /// Dispatches a job originating from the chain listener/reconciler path:
    /// there is no `OffchainJobMessage` backing it, only a job id and input
    /// already assembled by the caller.
    pub async fn process_chain_processor_job(
        &self,
        job_id: &str,
        job_input: JobInput,
        containers: &[String],
        requires_proof: bool,
    ) -> Result<Vec<ContainerResult>> {
        self.pipeline.run(job_id, job_input, containers, requires_proof).await
    }

    /// Dispatches a job submitted through the external HTTP API, synthesizing a
    /// `JobInput` with both source and destination set to `Offchain`.
    pub async fn process_offchain_job(&self, message: &OffchainJobMessage) -> Result<Vec<ContainerResult>> {
        let job_input = JobInput {
            source: Location::Offchain,
            destination: Location::Offchain,
            data: message.data.clone(),
        };
        self.pipeline.run(&message.id, job_input, &message.containers, message.requires_proof).await
    }

    /// Dispatches a streaming job to the single-container streaming pipeline.
    pub async fn process_streaming_job(
        &self,
        message: &OffchainJobMessage,
    ) -> Result<Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>> {
        self.streaming.run_stream(message).await
    }

    /// Fans a resource probe out to every configured container.
    pub async fn probe_resources(&self, model_id: Option<&str>) -> HashMap<String, Value> {
        self.probe.probe(model_id).await
    }
}
