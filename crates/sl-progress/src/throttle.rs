//! Minimum-interval gate for remote scheduler status queries.

use std::sync::Once;
use std::time::Duration;
use tokio::time::Instant;
use tracing::warn;

use sl_types::REFRESH_INTERVAL_FLOOR;

static BELOW_FLOOR_WARNING: Once = Once::new();

/// Allows one remote refresh per `interval`, measured from construction or
/// the last permitted refresh.
#[derive(Debug, Clone)]
pub struct StatusThrottle {
    interval: Duration,
    last: Instant,
    permitted: u64,
}

impl StatusThrottle {
    pub fn new(interval: Duration) -> Self {
        if interval < REFRESH_INTERVAL_FLOOR {
            BELOW_FLOOR_WARNING.call_once(|| {
                warn!(
                    interval_secs = interval.as_secs_f64(),
                    floor_secs = REFRESH_INTERVAL_FLOOR.as_secs_f64(),
                    "refresh interval is below the recommended floor; the scheduler will be queried often"
                );
            });
        }
        Self {
            interval,
            last: Instant::now(),
            permitted: 0,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Returns `true`, and restarts the interval, when a refresh is due.
    pub fn ready(&mut self) -> bool {
        let now = Instant::now();
        if now.duration_since(self.last) >= self.interval {
            self.last = now;
            self.permitted += 1;
            true
        } else {
            false
        }
    }

    /// Number of refreshes permitted so far.
    pub fn permitted(&self) -> u64 {
        self.permitted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn permits_once_per_interval() {
        let mut throttle = StatusThrottle::new(Duration::from_secs(15));
        assert!(!throttle.ready());

        tokio::time::advance(Duration::from_secs(14)).await;
        assert!(!throttle.ready());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(throttle.ready());
        assert!(!throttle.ready());

        tokio::time::advance(Duration::from_secs(20)).await;
        assert!(throttle.ready());
        assert_eq!(throttle.permitted(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn interval_restarts_from_last_permit() {
        let mut throttle = StatusThrottle::new(Duration::from_secs(15));
        tokio::time::advance(Duration::from_secs(20)).await;
        assert!(throttle.ready());

        // 10s after the permit at t=20, not 10s after the t=15 boundary.
        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(!throttle.ready());
    }
}
