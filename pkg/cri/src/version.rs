//! TTL-bounded memoization of the runtime's reported version.

use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::Mutex;

use crate::client::RuntimeService;
use crate::types::VersionInfo;

#[derive(Debug, Error)]
pub enum VersionError {
    /// The runtime does not speak the CRI API version this reconciler
    /// requires. Fatal at construction.
    #[error("runtime API version {got:?} is not supported, need {want:?}")]
    NotSupported { got: String, want: String },

    #[error("version query failed: {0}")]
    Upstream(anyhow::Error),
}

struct Slot {
    info: VersionInfo,
    fetched_at: Instant,
}

/// Single-entry cache of the typed `Version` response, keyed by machine
/// identity. Concurrent misses coalesce to one upstream call: the slot lock
/// is held across the fetch, so late arrivals find a fresh entry.
pub struct VersionCache {
    machine_id: String,
    ttl: Duration,
    slot: Mutex<Option<Slot>>,
}

impl VersionCache {
    pub fn new(machine_id: impl Into<String>) -> Self {
        Self::with_ttl(
            machine_id,
            Duration::from_secs(pkg_constants::runtime::VERSION_CACHE_TTL_SECONDS),
        )
    }

    pub fn with_ttl(machine_id: impl Into<String>, ttl: Duration) -> Self {
        Self {
            machine_id: machine_id.into(),
            ttl,
            slot: Mutex::new(None),
        }
    }

    pub fn machine_id(&self) -> &str {
        &self.machine_id
    }

    /// Cached version info, refreshed through `runtime` on miss or expiry.
    ///
    /// Validates that the runtime advertises the required API version and
    /// refuses to cache anything else.
    pub async fn get(&self, runtime: &dyn RuntimeService) -> Result<VersionInfo, VersionError> {
        let mut slot = self.slot.lock().await;
        if let Some(cached) = slot.as_ref()
            && cached.fetched_at.elapsed() < self.ttl
        {
            return Ok(cached.info.clone());
        }

        let want = pkg_constants::runtime::RUNTIME_API_VERSION;
        let info = runtime
            .version(want)
            .await
            .map_err(VersionError::Upstream)?;
        if info.version != want {
            return Err(VersionError::NotSupported {
                got: info.version,
                want: want.to_string(),
            });
        }

        *slot = Some(Slot {
            info: info.clone(),
            fetched_at: Instant::now(),
        });
        Ok(info)
    }

    /// Drop the cached entry so the next `get` refetches.
    pub async fn invalidate(&self) {
        *self.slot.lock().await = None;
    }
}

// ─── Tests ─────────────────────────────────────────────────────────────────
