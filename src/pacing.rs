use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;
use tracing::debug;

/// Delay between consecutive page loads: a fixed base plus random jitter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pacing {
    pub base: Duration,
    pub jitter: Duration,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(1000),
            jitter: Duration::from_millis(1000),
        }
    }
}

impl Pacing {
    pub fn none() -> Self {
        Self {
            base: Duration::ZERO,
            jitter: Duration::ZERO,
        }
    }

    /// `base + U[0, jitter]`.
    pub fn next_delay(&self) -> Duration {
        let jitter_ms = self.jitter.as_millis() as u64;
        let extra = if jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=jitter_ms)
        };
        self.base + Duration::from_millis(extra)
    }

    pub async fn wait(&self) {
        let delay = self.next_delay();
        if delay.is_zero() {
            return;
        }
        debug!("pacing: sleeping {:.1}s", delay.as_secs_f64());
        sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_stays_within_bounds() {
        let pacing = Pacing {
            base: Duration::from_millis(500),
            jitter: Duration::from_millis(250),
        };
        for _ in 0..200 {
            let d = pacing.next_delay();
            assert!(d >= Duration::from_millis(500));
            assert!(d <= Duration::from_millis(750));
        }
    }

    #[test]
    fn no_pacing_is_zero() {
        assert_eq!(Pacing::none().next_delay(), Duration::ZERO);
    }
}
