//! Image pulling as seen by the sync loop.
//!
//! The reconciler only needs one capability: "make sure this image exists
//! and give me its ref". `CriImagePuller` implements it over the narrow CRI
//! image calls, with pull serialization, QPS limiting, and per-image
//! back-off. Alternative pullers (pre-fetched caches, test fakes) implement
//! the same trait.

use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use pkg_cri::client::{ImageAuth, ImageService};

use crate::backoff::Backoff;
use crate::config::RuntimeConfig;
use crate::error::SyncError;

#[async_trait]
pub trait ImagePuller: Send + Sync {
    /// Ensure `image` is present in the runtime; returns the ref it is
    /// stored under. Credentials are tried in order.
    async fn ensure_image(&self, image: &str, auths: &[ImageAuth]) -> Result<String, SyncError>;
}

/// Token bucket for sustained-rate pull admission.
struct PullTokens {
    tokens: f32,
    refilled_at: Instant,
}

/// `ImagePuller` backed by the CRI image service.
pub struct CriImagePuller {
    images: Arc<dyn ImageService>,
    /// Held across the whole pull when pulls are serialized.
    serialize_lock: Option<Mutex<()>>,
    qps: f32,
    burst: f32,
    tokens: Mutex<PullTokens>,
    backoff: Backoff,
}

impl CriImagePuller {
    pub fn new(images: Arc<dyn ImageService>, config: &RuntimeConfig) -> Self {
        let burst = (config.image_pull_burst as f32).max(1.0);
        Self {
            images,
            serialize_lock: config.serialize_image_pulls.then(|| Mutex::new(())),
            qps: config.image_pull_qps,
            burst,
            tokens: Mutex::new(PullTokens {
                tokens: burst,
                refilled_at: Instant::now(),
            }),
            backoff: Backoff::with_params(config.image_backoff_initial, config.image_backoff_cap),
        }
    }

    /// Take one pull token, refilled at the configured QPS up to the burst
    /// size. Returns false when the bucket is empty.
    async fn admit(&self) -> bool {
        if self.qps <= 0.0 {
            return true;
        }
        let mut bucket = self.tokens.lock().await;
        let elapsed = bucket.refilled_at.elapsed().as_secs_f32();
        bucket.tokens = (bucket.tokens + elapsed * self.qps).min(self.burst);
        bucket.refilled_at = Instant::now();
        if bucket.tokens < 1.0 {
            return false;
        }
        bucket.tokens -= 1.0;
        true
    }
}

#[async_trait]
impl ImagePuller for CriImagePuller {
    async fn ensure_image(&self, image: &str, auths: &[ImageAuth]) -> Result<String, SyncError> {
        // Present already? No pull, no rate limiting.
        match self.images.image_status(image).await {
            Ok(Some(image_ref)) => {
                debug!("image {} already present as {}", image, image_ref);
                return Ok(image_ref);
            }
            Ok(None) => {}
            Err(e) => {
                return Err(SyncError::ImageInspect {
                    image: image.to_string(),
                    source: e,
                });
            }
        }

        if self.backoff.is_in_backoff(image) {
            return Err(SyncError::ImagePullBackOff {
                image: image.to_string(),
            });
        }
        if !self.admit().await {
            warn!("image pull of {} rejected: QPS limit exceeded", image);
            return Err(SyncError::ImagePullBackOff {
                image: image.to_string(),
            });
        }

        let _serialized = match &self.serialize_lock {
            Some(lock) => Some(lock.lock().await),
            None => None,
        };

        info!("pulling image: {}", image);
        match self.images.pull_image(image, auths.first()).await {
            Ok(image_ref) => {
                self.backoff.reset(image);
                info!("pulled image {} as {}", image, image_ref);
                Ok(image_ref)
            }
            Err(e) => {
                self.backoff.next(image, Utc::now());
                Err(SyncError::ImagePull {
                    image: image.to_string(),
                    source: e,
                })
            }
        }
    }
}

// ─── Tests ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Result, anyhow};
    use dashmap::DashMap;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FakeImages {
        present: DashMap<String, String>,
        fail_pulls: bool,
        pulls: AtomicU32,
    }

    impl FakeImages {
        fn new(fail_pulls: bool) -> Self {
            Self {
                present: DashMap::new(),
                fail_pulls,
                pulls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl ImageService for FakeImages {
        async fn pull_image(&self, image: &str, _auth: Option<&ImageAuth>) -> Result<String> {
            self.pulls.fetch_add(1, Ordering::SeqCst);
            if self.fail_pulls {
                return Err(anyhow!("registry said no"));
            }
            let image_ref = format!("sha256:{image}");
            self.present.insert(image.to_string(), image_ref.clone());
            Ok(image_ref)
        }

        async fn image_status(&self, image: &str) -> Result<Option<String>> {
            Ok(self.present.get(image).map(|r| r.clone()))
        }

        async fn remove_image(&self, image: &str) -> Result<()> {
            self.present.remove(image);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_present_image_is_not_pulled() {
        let images = Arc::new(FakeImages::new(false));
        images
            .present
            .insert("nginx:latest".to_string(), "sha256:abc".to_string());
        let puller = CriImagePuller::new(images.clone(), &RuntimeConfig::default());

        let image_ref = puller.ensure_image("nginx:latest", &[]).await.unwrap();
        assert_eq!(image_ref, "sha256:abc");
        assert_eq!(images.pulls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_missing_image_is_pulled() {
        let images = Arc::new(FakeImages::new(false));
        let puller = CriImagePuller::new(images.clone(), &RuntimeConfig::default());

        let image_ref = puller.ensure_image("nginx:latest", &[]).await.unwrap();
        assert_eq!(image_ref, "sha256:nginx:latest");
        assert_eq!(images.pulls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_pull_enters_backoff() {
        let images = Arc::new(FakeImages::new(true));
        let puller = CriImagePuller::new(images.clone(), &RuntimeConfig::default());

        match puller.ensure_image("nginx:latest", &[]).await {
            Err(SyncError::ImagePull { image, .. }) => assert_eq!(image, "nginx:latest"),
            other => panic!("expected ImagePull, got {other:?}"),
        }
        // Second attempt inside the back-off window is refused without
        // touching the registry again.
        match puller.ensure_image("nginx:latest", &[]).await {
            Err(SyncError::ImagePullBackOff { image }) => assert_eq!(image, "nginx:latest"),
            other => panic!("expected ImagePullBackOff, got {other:?}"),
        }
        assert_eq!(images.pulls.load(Ordering::SeqCst), 1);
    }
}
