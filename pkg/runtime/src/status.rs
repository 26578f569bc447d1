//! Observed pod status and its assembler.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use tracing::{error, warn};

use pkg_cri::types::{
    ContainerFilter, ContainerStatus, PodSandboxFilter, PodSandboxStatus, SandboxState,
};

use crate::manager::RuntimeManager;

/// Everything the runtime reports about one pod: sandbox incarnations
/// (newest first), container statuses (newest first), and the derived pod
/// IPs (primary first).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PodStatus {
    pub uid: String,
    pub name: String,
    pub namespace: String,
    pub ips: Vec<String>,
    pub sandbox_statuses: Vec<PodSandboxStatus>,
    pub container_statuses: Vec<ContainerStatus>,
}

impl PodStatus {
    pub fn new(uid: &str, name: &str, namespace: &str) -> Self {
        Self {
            uid: uid.to_string(),
            name: name.to_string(),
            namespace: namespace.to_string(),
            ..Default::default()
        }
    }

    /// The authoritative pod IP — first of the derived list.
    pub fn primary_ip(&self) -> Option<&str> {
        self.ips.first().map(String::as_str)
    }

    /// Most recent status for the named container, relying on
    /// `container_statuses` being sorted newest first.
    pub fn find_container(&self, name: &str) -> Option<&ContainerStatus> {
        self.container_statuses
            .iter()
            .find(|s| s.metadata.name == name)
    }

    /// The newest sandbox, if any.
    pub fn newest_sandbox(&self) -> Option<&PodSandboxStatus> {
        self.sandbox_statuses.first()
    }
}

/// IPs for a pod given its newest ready sandbox. Host-network sandboxes
/// take the node's addresses; otherwise the sandbox-reported IPs with IPv4
/// preferred first. Unparseable entries are dropped with a warning.
pub(crate) fn determine_pod_ips(node_ips: &[String], status: &PodSandboxStatus) -> Vec<String> {
    use pkg_cri::types::NamespaceMode;

    if status.network.namespace_mode == NamespaceMode::Node {
        return node_ips.to_vec();
    }

    let mut v4 = Vec::new();
    let mut v6 = Vec::new();
    for raw in &status.network.ips {
        match raw.parse::<IpAddr>() {
            Ok(IpAddr::V4(_)) => v4.push(raw.clone()),
            Ok(IpAddr::V6(_)) => v6.push(raw.clone()),
            Err(e) => warn!("sandbox {} reported invalid IP {:?}: {}", status.id, raw, e),
        }
    }
    v4.extend(v6);
    v4
}

impl RuntimeManager {
    /// Assemble the observed status of one pod.
    ///
    /// Sandbox-status failures fail the whole call. Container-status
    /// failures also fail the call, but are only logged when the
    /// log-reduction filter permits, so a persistently broken runtime emits
    /// one line per minute per pod instead of one per sync.
    pub async fn get_pod_status(&self, uid: &str, name: &str, namespace: &str) -> Result<PodStatus> {
        let mut status = PodStatus::new(uid, name, namespace);

        let sandbox_filter = PodSandboxFilter {
            label_selector: [(
                pkg_constants::labels::LABEL_POD_UID.to_string(),
                uid.to_string(),
            )]
            .into(),
            ..Default::default()
        };
        let mut sandboxes = self.runtime.list_pod_sandbox(Some(&sandbox_filter)).await?;
        sandboxes.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        for (i, sandbox) in sandboxes.iter().enumerate() {
            let sandbox_status = self.runtime.pod_sandbox_status(&sandbox.id).await?;
            if i == 0 && sandbox_status.state == SandboxState::Ready {
                status.ips = determine_pod_ips(&self.config.node_ips, &sandbox_status);
            }
            status.sandbox_statuses.push(sandbox_status);
        }

        let container_filter = ContainerFilter {
            label_selector: [(
                pkg_constants::labels::LABEL_POD_UID.to_string(),
                uid.to_string(),
            )]
            .into(),
            ..Default::default()
        };
        let containers = self.runtime.list_containers(Some(&container_filter)).await?;
        for container in containers {
            match self.runtime.container_status(&container.id).await {
                Ok(container_status) => status.container_statuses.push(container_status),
                Err(e) => {
                    if self.log_reducer.should_print(uid, &e.to_string()) {
                        error!(
                            "[pod:{}/{}] getting status of container {} failed: {}",
                            namespace, name, container.id, e
                        );
                    }
                    return Err(e);
                }
            }
        }
        self.log_reducer.clear(uid);

        status
            .container_statuses
            .sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(status)
    }
}

// ─── Tests ─────────────────────────────────────────────────────────────────
