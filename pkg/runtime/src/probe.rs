//! Liveness oracle consumed by the planner.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeResult {
    Success,
    Failure,
    Unknown,
}

/// External oracle mapping a container id to its latest liveness verdict.
/// `None` means no probe is registered for the container — treated as a
/// pass.
pub trait LivenessManager: Send + Sync {
    fn result(&self, container_id: &str) -> Option<ProbeResult>;
}

/// Liveness manager with no registered probes.
pub struct NoProbes;

impl LivenessManager for NoProbes {
    fn result(&self, _container_id: &str) -> Option<ProbeResult> {
        None
    }
}
