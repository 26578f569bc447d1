//! Pod inventory: the runtime's view regrouped by pod.

use std::collections::HashMap;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::debug;

use pkg_cri::types::{
    Container, ContainerFilter, ContainerState, PodSandbox, PodSandboxFilter, SandboxState,
};

use crate::labels::parse_container_labels;
use crate::manager::RuntimeManager;
use crate::status::PodStatus;

/// One pod as materialized from runtime listings: sandbox incarnations
/// (newest first) and the containers grouped under the pod's UID.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunningPod {
    pub uid: String,
    pub name: String,
    pub namespace: String,
    pub sandboxes: Vec<PodSandbox>,
    pub containers: Vec<Container>,
}

impl RunningPod {
    /// Containers that still need stopping: anything not yet exited.
    pub fn active_containers(&self) -> impl Iterator<Item = &Container> {
        self.containers
            .iter()
            .filter(|c| c.state != ContainerState::Exited)
    }

    /// Build the kill-path view out of an assembled [`PodStatus`], for
    /// callers that already fetched one.
    pub fn from_status(status: &PodStatus) -> Self {
        Self {
            uid: status.uid.clone(),
            name: status.name.clone(),
            namespace: status.namespace.clone(),
            sandboxes: status
                .sandbox_statuses
                .iter()
                .map(|s| PodSandbox {
                    id: s.id.clone(),
                    metadata: s.metadata.clone(),
                    state: s.state,
                    created_at: s.created_at,
                    labels: s.labels.clone(),
                    annotations: s.annotations.clone(),
                })
                .collect(),
            containers: status
                .container_statuses
                .iter()
                .map(|s| Container {
                    id: s.id.clone(),
                    sandbox_id: String::new(),
                    metadata: s.metadata.clone(),
                    image: s.image.clone(),
                    state: s.state,
                    created_at: s.created_at,
                    labels: s.labels.clone(),
                    annotations: s.annotations.clone(),
                })
                .collect(),
        }
    }
}

impl RuntimeManager {
    /// List pods as the runtime sees them, grouped by pod UID recovered
    /// from sandbox metadata or container labels. `include_dead` widens the
    /// listing to not-ready sandboxes and exited containers.
    ///
    /// The result is unordered; callers that need an order must sort.
    pub async fn get_pods(&self, include_dead: bool) -> Result<Vec<RunningPod>> {
        let sandbox_filter = if include_dead {
            None
        } else {
            Some(PodSandboxFilter {
                state: Some(SandboxState::Ready),
                ..Default::default()
            })
        };
        let sandboxes = self.runtime.list_pod_sandbox(sandbox_filter.as_ref()).await?;

        let mut pods: HashMap<String, RunningPod> = HashMap::new();
        for sandbox in sandboxes {
            if sandbox.metadata.uid.is_empty() {
                debug!("sandbox {} carries no pod UID, dropping", sandbox.id);
                continue;
            }
            let pod = pods
                .entry(sandbox.metadata.uid.clone())
                .or_insert_with(|| RunningPod {
                    uid: sandbox.metadata.uid.clone(),
                    name: sandbox.metadata.name.clone(),
                    namespace: sandbox.metadata.namespace.clone(),
                    ..Default::default()
                });
            pod.sandboxes.push(sandbox);
        }

        let container_filter = if include_dead {
            None
        } else {
            Some(ContainerFilter {
                state: Some(ContainerState::Running),
                ..Default::default()
            })
        };
        let containers = self.runtime.list_containers(container_filter.as_ref()).await?;
        for container in containers {
            let Some(labels) = parse_container_labels(&container.labels) else {
                debug!("container {} carries malformed labels, dropping", container.id);
                continue;
            };
            let pod = pods
                .entry(labels.pod_uid.clone())
                .or_insert_with(|| RunningPod {
                    uid: labels.pod_uid.clone(),
                    name: labels.pod_name.clone(),
                    namespace: labels.pod_namespace.clone(),
                    ..Default::default()
                });
            pod.containers.push(container);
        }

        let mut pods: Vec<RunningPod> = pods.into_values().collect();
        for pod in &mut pods {
            pod.sandboxes.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        }
        Ok(pods)
    }
}

// ─── Tests ─────────────────────────────────────────────────────────────────
