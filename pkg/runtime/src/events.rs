//! Event recording.
//!
//! The reconciler emits events through a sink capability; it neither owns
//! nor discovers subscribers.

use pkg_types::pod::Pod;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    Normal,
    Warning,
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventType::Normal => write!(f, "Normal"),
            EventType::Warning => write!(f, "Warning"),
        }
    }
}

/// Stable event reason strings.
pub mod reasons {
    pub const FAILED_CREATE_POD_SANDBOX: &str = "FailedCreatePodSandBox";
    pub const BACK_OFF: &str = "BackOff";
    pub const PULLED: &str = "Pulled";
    pub const CREATED: &str = "Created";
    pub const STARTED: &str = "Started";
    pub const KILLING: &str = "Killing";
    pub const FAILED: &str = "Failed";
}

pub trait EventRecorder: Send + Sync {
    fn event(&self, pod: &Pod, event_type: EventType, reason: &str, message: String);
}

/// Recorder that forwards events to the log stream. The default when no
/// event sink is wired in.
pub struct LogEventRecorder;

impl EventRecorder for LogEventRecorder {
    fn event(&self, pod: &Pod, event_type: EventType, reason: &str, message: String) {
        info!(
            "[pod:{}/{}] {} {}: {}",
            pod.namespace, pod.name, event_type, reason, message
        );
    }
}
