//! Sliding-window throughput measurement

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

/// Per-tick traffic delta stamped with its observation time
#[derive(Debug, Clone, Copy)]
struct Sample {
    at: Instant,
    up: u64,
    down: u64,
}

/// Sliding window of traffic deltas for instantaneous speed.
///
/// Uses `tokio::time::Instant` so paused-clock tests see the same
/// timeline as the aggregator's tick interval.
#[derive(Debug)]
pub struct SpeedWindow {
    window: Duration,
    samples: VecDeque<Sample>,
}

impl SpeedWindow {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            samples: VecDeque::new(),
        }
    }

    /// Record one tick's upload/download deltas at `now`, evicting
    /// samples older than the window.
    pub fn push(&mut self, now: Instant, up: u64, down: u64) {
        self.samples.push_back(Sample { at: now, up, down });
        self.prune(now);
    }

    fn prune(&mut self, now: Instant) {
        while let Some(front) = self.samples.front() {
            if now.duration_since(front.at) > self.window {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }

    /// Instantaneous (upload, download) speed in bytes per second:
    /// window totals divided by the span from oldest sample to `now`.
    /// Zero when the span is empty.
    pub fn throughput(&self, now: Instant) -> (u64, u64) {
        let oldest = match self.samples.front() {
            Some(front) => front.at,
            None => return (0, 0),
        };
        let span = now.duration_since(oldest).as_secs_f64();
        if span <= 0.0 {
            return (0, 0);
        }
        let (up, down) = self.totals();
        (
            (up as f64 / span) as u64,
            (down as f64 / span) as u64,
        )
    }

    /// Sum of deltas currently inside the window
    pub fn totals(&self) -> (u64, u64) {
        self.samples
            .iter()
            .fold((0, 0), |(u, d), s| (u + s.up, d + s.down))
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_expired_samples_leave_window() {
        let mut window = SpeedWindow::new(Duration::from_millis(5000));
        let start = Instant::now();

        window.push(start, 1000, 0);
        tokio::time::advance(Duration::from_millis(1000)).await;
        window.push(Instant::now(), 2000, 0);

        // At t=6000 the t=0 sample is 6 s old and falls out; the t=1000
        // sample is exactly 5 s old and stays.
        tokio::time::advance(Duration::from_millis(5000)).await;
        let now = Instant::now();
        window.push(now, 500, 0);

        assert_eq!(window.len(), 2);
        assert_eq!(window.totals(), (2500, 0));

        // Span is 5 s (oldest sample at t=1000, now t=6000)
        let (up, _) = window.throughput(now);
        assert_eq!(up, 500);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_sample_has_zero_span() {
        let mut window = SpeedWindow::new(Duration::from_millis(5000));
        let now = Instant::now();
        window.push(now, 4096, 1024);
        assert_eq!(window.throughput(now), (0, 0));
        assert_eq!(window.totals(), (4096, 1024));
    }

    #[tokio::test(start_paused = true)]
    async fn test_steady_rate() {
        let mut window = SpeedWindow::new(Duration::from_millis(5000));
        for _ in 0..4 {
            window.push(Instant::now(), 1000, 3000);
            tokio::time::advance(Duration::from_millis(1000)).await;
        }
        let now = Instant::now();
        window.push(now, 1000, 3000);

        // 5 samples over a 4 s span
        let (up, down) = window.throughput(now);
        assert_eq!(up, 1250);
        assert_eq!(down, 3750);
    }

    #[test]
    fn test_empty_window() {
        let window = SpeedWindow::new(Duration::from_millis(5000));
        assert!(window.is_empty());
    }
}
