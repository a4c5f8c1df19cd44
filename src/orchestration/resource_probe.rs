use std::collections::HashMap;
use std::sync::Arc;

use futures::{stream, StreamExt};
use reqwest::Client;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::warn;

use crate::orchestration::container_manager::ContainerManager;

/// Fans out a capability probe to every configured container in parallel.
/// Individual failures are swallowed and logged; the result map simply omits
/// whichever containers failed to respond.
pub struct ResourceProbe {
    containers: Arc<ContainerManager>,
    http: Client,
}

impl ResourceProbe {
    pub fn new(containers: Arc<ContainerManager>) -> Self {
        Self { containers, http: Client::new() }
    }

    /// Queries `GET /service-resources[?model_id=<id>]` on every configured
    /// container, unbounded concurrency (mirroring the reference keeper's
    /// `collect_due` fan-out, but without a concurrency cap since the container
    /// set is small and local).
    pub async fn probe(&self, model_id: Option<&str>) -> HashMap<String, Value> {
        let results = Arc::new(Mutex::new(HashMap::new()));
        let names = self.containers.container_names();

        stream::iter(names)
            .for_each_concurrent(None, |container_id| {
                let results = results.clone();
                let http = self.http.clone();
                let base_url = self.containers.base_url(&container_id);
                let model_id = model_id.map(str::to_string);
                async move {
                    let base_url = match base_url {
                        Ok(url) => url,
                        Err(err) => {
                            warn!(container_id, %err, "no port configured; skipping resource probe");
                            return;
                        }
                    };

                    let mut url = format!("{base_url}/service-resources");
                    if let Some(model_id) = &model_id {
                        url = format!("{url}?model_id={model_id}");
                    }

                    match http.get(&url).send().await {
                        Ok(response) if response.status().is_success() => match response.json::<Value>().await {
                            Ok(body) => {
                                results.lock().await.insert(container_id, body);
                            }
                            Err(err) => warn!(container_id, %err, "resource probe returned unparseable body"),
                        },
                        Ok(response) => {
                            warn!(container_id, status = %response.status(), "resource probe returned non-success status");
                        }
                        Err(err) => warn!(container_id, %err, "resource probe request failed"),
                    }
                }
            })
            .await;

        Arc::try_unwrap(results).expect("no outstanding references after for_each_concurrent join").into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn excludes_containers_with_no_configured_port() {
        let containers = Arc::new(ContainerManager::from_ports(HashMap::new()));
        let probe = ResourceProbe::new(containers);
        let result = probe.probe(None).await;
        assert!(result.is_empty());
    }
}
