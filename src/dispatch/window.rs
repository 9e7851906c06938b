use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

/// Length of the sliding window the RPM ceiling applies to.
pub const RATE_WINDOW: Duration = Duration::from_secs(60);

/// Added to every computed wait so the oldest call has left the window on wake-up.
const ADMISSION_SLACK: Duration = Duration::from_millis(50);

/// Timestamps of recent call attempts, newest at the back.
///
/// Entries are pruned lazily on each admission check.
#[derive(Debug)]
pub struct CallWindow {
    limit: usize,
    calls: VecDeque<Instant>,
}

impl CallWindow {
    pub fn new(rpm: u32) -> Self {
        let limit = rpm.max(1) as usize;
        Self {
            limit,
            calls: VecDeque::with_capacity(limit),
        }
    }

    fn prune(&mut self, now: Instant) {
        while let Some(&oldest) = self.calls.front() {
            if now.saturating_duration_since(oldest) >= RATE_WINDOW {
                self.calls.pop_front();
            } else {
                break;
            }
        }
    }

    /// How long a call arriving at `now` must wait, or `None` if it may go now.
    pub fn admission_delay(&mut self, now: Instant) -> Option<Duration> {
        self.prune(now);
        if self.calls.len() < self.limit {
            return None;
        }
        let oldest = *self.calls.front()?;
        let elapsed = now.saturating_duration_since(oldest);
        Some(RATE_WINDOW.saturating_sub(elapsed) + ADMISSION_SLACK)
    }

    pub fn record(&mut self, now: Instant) {
        self.calls.push_back(now);
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn admits_until_limit_then_waits_for_oldest() {
        let mut window = CallWindow::new(2);
        let t0 = Instant::now();

        assert_eq!(window.admission_delay(t0), None);
        window.record(t0);
        assert_eq!(window.admission_delay(t0), None);
        window.record(t0);

        let delay = window.admission_delay(t0).unwrap();
        assert_eq!(delay, RATE_WINDOW + ADMISSION_SLACK);

        let later = t0 + Duration::from_secs(45);
        let delay = window.admission_delay(later).unwrap();
        assert_eq!(delay, Duration::from_secs(15) + ADMISSION_SLACK);
    }

    #[tokio::test(start_paused = true)]
    async fn prunes_entries_older_than_window() {
        let mut window = CallWindow::new(2);
        let t0 = Instant::now();
        window.record(t0);
        window.record(t0 + Duration::from_secs(30));
        assert_eq!(window.len(), 2);

        // The first call is exactly 60 s old and leaves the window.
        let t1 = t0 + RATE_WINDOW;
        assert_eq!(window.admission_delay(t1), None);
        assert_eq!(window.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_rpm_is_treated_as_one() {
        let mut window = CallWindow::new(0);
        let t0 = Instant::now();
        assert_eq!(window.admission_delay(t0), None);
        window.record(t0);
        assert!(window.admission_delay(t0).is_some());
    }
}
