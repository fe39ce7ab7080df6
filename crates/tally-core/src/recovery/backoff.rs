//! Backoff strategies for retry operations

use std::time::Duration;

/// Configuration for backoff behavior
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Initial delay before first retry
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub multiplier: f64,
    /// Add random jitter to prevent thundering herd
    pub jitter: bool,
    /// Maximum jitter ratio (0.0 - 1.0)
    pub jitter_ratio: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
            multiplier: 2.0,
            jitter: true,
            jitter_ratio: 0.2,
        }
    }
}

/// Backoff strategy trait
pub trait BackoffStrategy: Send + Sync {
    /// Get the delay for the given attempt number (0-indexed)
    fn delay_for_attempt(&self, attempt: u32) -> Duration;
}

/// Exponential backoff capped at `max_delay`
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    config: BackoffConfig,
}

impl ExponentialBackoff {
    pub fn new() -> Self {
        Self::with_config(BackoffConfig::default())
    }

    pub fn with_config(config: BackoffConfig) -> Self {
        Self { config }
    }

    fn add_jitter(&self, delay: Duration) -> Duration {
        if !self.config.jitter {
            return delay;
        }

        let jitter_range = delay.as_secs_f64() * self.config.jitter_ratio;
        let jittered = delay.as_secs_f64() + rand_jitter(jitter_range);

        Duration::from_secs_f64(jittered.max(0.0))
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new()
    }
}

impl BackoffStrategy for ExponentialBackoff {
    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base_delay = self.config.initial_delay.as_secs_f64()
            * self.config.multiplier.powi(attempt.min(i32::MAX as u32) as i32);
        let capped = base_delay.min(self.config.max_delay.as_secs_f64());

        self.add_jitter(Duration::from_secs_f64(capped.max(0.0)))
    }
}

/// Cheap time-seeded jitter in `[0, range)`
fn rand_jitter(range: f64) -> f64 {
    use std::time::SystemTime;

    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);

    let hash = nanos.wrapping_mul(2654435761);
    let normalized = (hash as f64) / (u32::MAX as f64);

    normalized * range
}
