use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::model::ContainerResult;

/// Job-level status as tracked by a `DataStore`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Running,
    Success,
    Failed,
}

/// Container-level status as tracked by a `DataStore`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerStatus {
    Success,
    Failed,
}

/// Opaque status sink the pipelines report into. Operations are assumed atomic
/// and thread-safe — the only shared mutable resource in the crate, so every
/// concrete implementation must internally synchronize.
#[async_trait]
pub trait DataStore: Send + Sync {
    async fn set_running(&self, job_id: &str);
    async fn set_success(&self, job_id: &str, results: &[ContainerResult]);
    async fn set_failed(&self, job_id: &str, results: &[ContainerResult]);
    async fn track_container_status(&self, job_id: &str, container_id: &str, status: ContainerStatus);
}

#[derive(Debug, Clone)]
struct JobRecord {
    status: JobStatus,
    results: Vec<ContainerResult>,
}

/// In-memory `DataStore`, the crate's concrete default. A real deployment is
/// expected to back this trait with something durable (e.g. Redis); this
/// implementation exists so the crate runs end to end without one.
#[derive(Default)]
pub struct InMemoryDataStore {
    jobs: Mutex<HashMap<String, JobRecord>>,
    container_statuses: Mutex<HashMap<(String, String), ContainerStatus>>,
}

impl InMemoryDataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn job_status(&self, job_id: &str) -> Option<JobStatus> {
        self.jobs.lock().expect("jobs mutex poisoned").get(job_id).map(|r| r.status)
    }

    pub fn container_status(&self, job_id: &str, container_id: &str) -> Option<ContainerStatus> {
        self.container_statuses
            .lock()
            .expect("container statuses mutex poisoned")
            .get(&(job_id.to_string(), container_id.to_string()))
            .copied()
    }
}

#[async_trait]
impl DataStore for InMemoryDataStore {
    async fn set_running(&self, job_id: &str) {
        self.jobs
            .lock()
            .expect("jobs mutex poisoned")
            .insert(job_id.to_string(), JobRecord { status: JobStatus::Running, results: Vec::new() });
    }

    async fn set_success(&self, job_id: &str, results: &[ContainerResult]) {
        self.jobs
            .lock()
            .expect("jobs mutex poisoned")
            .insert(job_id.to_string(), JobRecord { status: JobStatus::Success, results: results.to_vec() });
    }

    async fn set_failed(&self, job_id: &str, results: &[ContainerResult]) {
        self.jobs
            .lock()
            .expect("jobs mutex poisoned")
            .insert(job_id.to_string(), JobRecord { status: JobStatus::Failed, results: results.to_vec() });
    }

    async fn track_container_status(&self, job_id: &str, container_id: &str, status: ContainerStatus) {
        self.container_statuses
            .lock()
            .expect("container statuses mutex poisoned")
            .insert((job_id.to_string(), container_id.to_string()), status);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_job_and_container_transitions() {
        let store = InMemoryDataStore::new();
        store.set_running("job-1").await;
        assert_eq!(store.job_status("job-1"), Some(JobStatus::Running));

        store.track_container_status("job-1", "a", ContainerStatus::Success).await;
        store.track_container_status("job-1", "b", ContainerStatus::Failed).await;
        assert_eq!(store.container_status("job-1", "a"), Some(ContainerStatus::Success));
        assert_eq!(store.container_status("job-1", "b"), Some(ContainerStatus::Failed));

        store.set_failed("job-1", &[]).await;
        assert_eq!(store.job_status("job-1"), Some(JobStatus::Failed));
    }
}
