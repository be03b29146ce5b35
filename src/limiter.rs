use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// Serializes request spacing for one provider. The mutex is held across
/// the spacing sleep so concurrent workers sharing a client cannot
/// compress the inter-request interval.
pub struct RateGate {
    min_interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl RateGate {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last: Mutex::new(None),
        }
    }

    /// Blocks until the provider minimum interval has elapsed since the
    /// previous call through this gate, then claims the current slot.
    pub async fn wait(&self) {
        let mut last = self.last.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.min_interval {
                let pause = self.min_interval - elapsed;
                debug!(pause_ms = pause.as_millis() as u64, "rate gate sleeping");
                tokio::time::sleep(pause).await;
            }
        }
        *last = Some(Instant::now());
    }
}

/// Backoff before retry number `attempt` (0-based) after an HTTP 429:
/// exponential, `2^attempt + 1` seconds.
pub fn retry_after_429(attempt: u32) -> Duration {
    Duration::from_secs((1u64 << attempt) + 1)
}

/// Backoff before retry number `attempt` (0-based) after any other
/// retryable failure (5xx, network error): linear, `1 + attempt/2` seconds.
pub fn retry_after_error(attempt: u32) -> Duration {
    Duration::from_millis(1000 + u64::from(attempt) * 500)
}
