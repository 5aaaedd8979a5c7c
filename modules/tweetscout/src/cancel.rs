use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Longest uninterrupted nap taken by [`CancelFlag::sleep`].
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Cooperative cancellation shared between a running job and whoever
/// started it. Checked at the top of the page loop and before every
/// blocking call.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    /// Sleep for `duration`, waking early on cancellation.
    /// Returns `false` if the flag was raised.
    pub async fn sleep(&self, duration: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + duration;
        loop {
            if self.is_cancelled() {
                return false;
            }
            let now = tokio::time::Instant::now();
            if now >= deadline {
                return true;
            }
            tokio::time::sleep((deadline - now).min(POLL_INTERVAL)).await;
        }
    }
}
