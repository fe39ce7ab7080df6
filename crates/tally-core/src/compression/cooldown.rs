//! Debounce for automatic summarization

use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Prevents automatic summarization from re-triggering while one is running or
/// shortly after one started.
#[derive(Debug)]
pub struct SummaryCooldown {
    cooldown: Duration,
    last_started: Mutex<Option<Instant>>,
    in_flight: Arc<AtomicBool>,
}

/// Held while an automatic summarization runs. Dropping it releases the
/// in-flight flag, whether the run succeeded, failed or was cancelled.
#[derive(Debug)]
pub struct CooldownGuard {
    in_flight: Arc<AtomicBool>,
}

impl Drop for CooldownGuard {
    fn drop(&mut self) {
        self.in_flight.store(false, Ordering::SeqCst);
    }
}

impl SummaryCooldown {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last_started: Mutex::new(None),
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Start a run if none is in flight and the cooldown has elapsed
    pub fn try_acquire(&self) -> Option<CooldownGuard> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::debug!("Auto-summary already in flight");
            return None;
        }

        let mut last = self.last_started.lock();
        if let Some(started) = *last {
            if started.elapsed() < self.cooldown {
                self.in_flight.store(false, Ordering::SeqCst);
                tracing::debug!(
                    "Auto-summary cooling down, {:?} remaining",
                    self.cooldown - started.elapsed().min(self.cooldown)
                );
                return None;
            }
        }
        *last = Some(Instant::now());

        Some(CooldownGuard {
            in_flight: self.in_flight.clone(),
        })
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Time left before another run may start
    pub fn remaining(&self) -> Duration {
        self.last_started
            .lock()
            .map(|started| self.cooldown.saturating_sub(started.elapsed()))
            .unwrap_or(Duration::ZERO)
    }

    pub fn set_cooldown(&mut self, cooldown: Duration) {
        self.cooldown = cooldown;
    }

    /// Forget the last run so the next acquire succeeds immediately
    pub fn reset(&self) {
        *self.last_started.lock() = None;
    }
}
