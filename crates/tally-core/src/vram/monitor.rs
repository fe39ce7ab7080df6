//! VRAM polling and low-memory notification

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::types::{VramConfig, VramInfo};
use crate::error::TallyResult;

/// Source of VRAM readings (driver query, sidecar, fixed value)
#[async_trait]
pub trait VramProvider: Send + Sync {
    async fn get_info(&self) -> TallyResult<VramInfo>;
}

/// Provider returning a settable fixed reading
#[derive(Debug, Default)]
pub struct FixedVramProvider {
    info: RwLock<VramInfo>,
}

impl FixedVramProvider {
    pub fn new(info: VramInfo) -> Self {
        Self {
            info: RwLock::new(info),
        }
    }

    pub fn cpu_only() -> Self {
        Self::new(VramInfo::cpu_only())
    }

    /// Replace the reading returned by later polls
    pub fn set(&self, info: VramInfo) {
        *self.info.write() = info;
    }
}

#[async_trait]
impl VramProvider for FixedVramProvider {
    async fn get_info(&self) -> TallyResult<VramInfo> {
        Ok(*self.info.read())
    }
}

/// Callback fired when available memory crosses below the threshold
pub type LowMemoryCallback = Arc<dyn Fn(VramInfo) + Send + Sync>;

/// Callback fired with every successful reading
pub type ReadingCallback = Arc<dyn Fn(VramInfo) + Send + Sync>;

struct MonitorInner {
    provider: Arc<dyn VramProvider>,
    threshold: f64,
    latest: RwLock<Option<VramInfo>>,
    low: AtomicBool,
    callbacks: RwLock<Vec<LowMemoryCallback>>,
    readers: RwLock<Vec<ReadingCallback>>,
}

impl MonitorInner {
    async fn poll(&self) -> TallyResult<VramInfo> {
        let info = self.provider.get_info().await?;
        *self.latest.write() = Some(info);
        let readers = self.readers.read().clone();
        for reader in readers {
            reader(info);
        }

        let is_low = !info.is_cpu_only() && info.available_fraction() < self.threshold;
        if is_low {
            // Edge-triggered: fire once per crossing, re-arm after recovery
            if !self.low.swap(true, Ordering::SeqCst) {
                tracing::warn!(
                    "Low VRAM: {} of {} bytes available ({:.1}%)",
                    info.available,
                    info.total,
                    info.available_fraction() * 100.0
                );
                let callbacks = self.callbacks.read().clone();
                for callback in callbacks {
                    callback(info);
                }
            }
        } else if self.low.swap(false, Ordering::SeqCst) {
            tracing::info!("VRAM recovered: {} bytes available", info.available);
        }

        Ok(info)
    }
}

/// Polls a [`VramProvider`] and raises low-memory callbacks
pub struct VramMonitor {
    inner: Arc<MonitorInner>,
    task: Mutex<Option<CancellationToken>>,
}

impl VramMonitor {
    pub fn new(provider: Arc<dyn VramProvider>, config: &VramConfig) -> Self {
        Self {
            inner: Arc::new(MonitorInner {
                provider,
                threshold: config.low_memory_threshold,
                latest: RwLock::new(None),
                low: AtomicBool::new(false),
                callbacks: RwLock::new(Vec::new()),
                readers: RwLock::new(Vec::new()),
            }),
            task: Mutex::new(None),
        }
    }

    /// Query the provider now
    pub async fn get_info(&self) -> TallyResult<VramInfo> {
        self.inner.poll().await
    }

    /// Most recent reading, if any poll has completed
    pub fn latest(&self) -> Option<VramInfo> {
        *self.inner.latest.read()
    }

    /// Whether the last reading was below the threshold
    pub fn is_low(&self) -> bool {
        self.inner.low.load(Ordering::SeqCst)
    }

    pub fn on_low_memory(&self, callback: LowMemoryCallback) {
        self.inner.callbacks.write().push(callback);
    }

    /// Register a consumer of every reading, foreground or background.
    ///
    /// Runs before the low-memory check of the same poll.
    pub fn on_reading(&self, callback: ReadingCallback) {
        self.inner.readers.write().push(callback);
    }

    /// Start background polling. Must be called from within a tokio runtime.
    ///
    /// Calling it while monitoring is already running is a no-op.
    pub fn start_monitoring(&self, interval: Duration) {
        let mut task = self.task.lock();
        if task.is_some() {
            return;
        }

        let token = CancellationToken::new();
        let child = token.clone();
        let inner = self.inner.clone();
        let period = interval.max(Duration::from_millis(10));

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = child.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = inner.poll().await {
                            tracing::warn!("VRAM poll failed: {}", e);
                        }
                    }
                }
            }
            tracing::debug!("VRAM monitoring stopped");
        });

        tracing::debug!("VRAM monitoring started every {:?}", period);
        *task = Some(token);
    }

    pub fn stop_monitoring(&self) {
        if let Some(token) = self.task.lock().take() {
            token.cancel();
        }
    }

    pub fn is_monitoring(&self) -> bool {
        self.task.lock().is_some()
    }
}

impl Drop for VramMonitor {
    fn drop(&mut self) {
        self.stop_monitoring();
    }
}
