//! Per-operation instrumentation for a [`RuntimeService`].
//!
//! Wraps any runtime client and records invocation count, error count, and
//! latency for every CRI operation into a shared [`MetricsRegistry`].

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use async_trait::async_trait;
use pkg_metrics::MetricsRegistry;

use crate::client::RuntimeService;
use crate::types::{
    Container, ContainerConfig, ContainerFilter, ContainerStatus, NetworkConfig, PodSandbox,
    PodSandboxConfig, PodSandboxFilter, PodSandboxStatus, RuntimeStatus, VersionInfo,
};

/// All instrumented operation names, matching the trait surface.
const OPERATIONS: &[&str] = &[
    "version",
    "status",
    "list_pod_sandbox",
    "run_pod_sandbox",
    "stop_pod_sandbox",
    "pod_sandbox_status",
    "list_containers",
    "container_status",
    "create_container",
    "start_container",
    "stop_container",
    "remove_container",
    "update_runtime_config",
];

fn total_metric(op: &str) -> String {
    format!("cri_operation_{op}_total")
}

fn errors_metric(op: &str) -> String {
    format!("cri_operation_{op}_errors_total")
}

fn duration_metric(op: &str) -> String {
    format!("cri_operation_{op}_duration")
}

/// Decorator that forwards to an inner runtime client and records metrics.
pub struct InstrumentedRuntime<T> {
    inner: T,
    metrics: Arc<MetricsRegistry>,
}

impl<T: RuntimeService> InstrumentedRuntime<T> {
    pub fn new(inner: T, metrics: Arc<MetricsRegistry>) -> Self {
        for op in OPERATIONS {
            metrics.register_counter(&total_metric(op), "CRI operation invocations");
            metrics.register_counter(&errors_metric(op), "CRI operation failures");
            metrics.register_duration(&duration_metric(op), "CRI operation latency");
        }
        Self { inner, metrics }
    }

    fn observe(&self, op: &str, started: Instant, ok: bool) {
        self.metrics.counter_inc(&total_metric(op));
        if !ok {
            self.metrics.counter_inc(&errors_metric(op));
        }
        self.metrics
            .observe_duration(&duration_metric(op), started.elapsed());
    }
}

macro_rules! instrumented {
    ($self:ident, $op:literal, $call:expr) => {{
        let started = Instant::now();
        let result = $call.await;
        $self.observe($op, started, result.is_ok());
        result
    }};
}

#[async_trait]
impl<T: RuntimeService> RuntimeService for InstrumentedRuntime<T> {
    async fn version(&self, api_version: &str) -> Result<VersionInfo> {
        instrumented!(self, "version", self.inner.version(api_version))
    }

    async fn status(&self) -> Result<RuntimeStatus> {
        instrumented!(self, "status", self.inner.status())
    }

    async fn list_pod_sandbox(
        &self,
        filter: Option<&PodSandboxFilter>,
    ) -> Result<Vec<PodSandbox>> {
        instrumented!(self, "list_pod_sandbox", self.inner.list_pod_sandbox(filter))
    }

    async fn run_pod_sandbox(
        &self,
        config: &PodSandboxConfig,
        runtime_handler: &str,
    ) -> Result<String> {
        instrumented!(
            self,
            "run_pod_sandbox",
            self.inner.run_pod_sandbox(config, runtime_handler)
        )
    }

    async fn stop_pod_sandbox(&self, id: &str) -> Result<()> {
        instrumented!(self, "stop_pod_sandbox", self.inner.stop_pod_sandbox(id))
    }

    async fn pod_sandbox_status(&self, id: &str) -> Result<PodSandboxStatus> {
        instrumented!(
            self,
            "pod_sandbox_status",
            self.inner.pod_sandbox_status(id)
        )
    }

    async fn list_containers(&self, filter: Option<&ContainerFilter>) -> Result<Vec<Container>> {
        instrumented!(self, "list_containers", self.inner.list_containers(filter))
    }

    async fn container_status(&self, id: &str) -> Result<ContainerStatus> {
        instrumented!(self, "container_status", self.inner.container_status(id))
    }

    async fn create_container(
        &self,
        sandbox_id: &str,
        config: &ContainerConfig,
        sandbox_config: &PodSandboxConfig,
    ) -> Result<String> {
        instrumented!(
            self,
            "create_container",
            self.inner.create_container(sandbox_id, config, sandbox_config)
        )
    }

    async fn start_container(&self, id: &str) -> Result<()> {
        instrumented!(self, "start_container", self.inner.start_container(id))
    }

    async fn stop_container(&self, id: &str, grace_seconds: i64) -> Result<()> {
        instrumented!(
            self,
            "stop_container",
            self.inner.stop_container(id, grace_seconds)
        )
    }

    async fn remove_container(&self, id: &str) -> Result<()> {
        instrumented!(self, "remove_container", self.inner.remove_container(id))
    }

    async fn update_runtime_config(&self, network: &NetworkConfig) -> Result<()> {
        instrumented!(
            self,
            "update_runtime_config",
            self.inner.update_runtime_config(network)
        )
    }
}

// ─── Tests ─────────────────────────────────────────────────────────────────
