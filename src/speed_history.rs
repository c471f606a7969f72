use std::collections::VecDeque;

use crate::config::MAX_DETECTOR_WINDOW;

/// Rolling record of the most recently observed speeds
///
/// With a window of 1 this holds a single value, the last observed speed.
/// With a window of K it keeps the last `2K - 1` speeds so that, together
/// with an incoming sample, it can produce two adjacent K-sample averages:
/// the "prior" window (before the recent samples) and the "recent" window
/// (ending with the incoming sample). Slots that have not been filled yet
/// count as zero speed. The window is clamped to `1..=MAX_DETECTOR_WINDOW`.
#[derive(Debug, Clone)]
pub struct SpeedHistory {
    speeds: VecDeque<f64>,
    window: usize,
    capacity: usize,
}

impl SpeedHistory {
    pub fn new(window: usize) -> Self {
        let window = window.clamp(1, MAX_DETECTOR_WINDOW);
        let capacity = 2 * window - 1;
        SpeedHistory {
            speeds: VecDeque::with_capacity(capacity),
            window,
            capacity,
        }
    }

    /// Forget everything; the next comparison starts from zero speed
    pub fn reset(&mut self) {
        self.speeds.clear();
    }

    /// Last observed speed (0 when nothing has been observed)
    pub fn last(&self) -> f64 {
        self.speeds.back().copied().unwrap_or(0.0)
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn len(&self) -> usize {
        self.speeds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.speeds.is_empty()
    }

    /// Overwrite the history with a newly observed speed
    pub fn record(&mut self, speed: f64) {
        self.speeds.push_back(speed);
        while self.speeds.len() > self.capacity {
            self.speeds.pop_front();
        }
    }

    /// Average of the prior window and of the recent window ending in `current`.
    ///
    /// Does not record `current`.
    pub fn window_averages(&self, current: f64) -> (f64, f64) {
        let missing = self.capacity - self.speeds.len();
        let padded: Vec<f64> = std::iter::repeat(0.0)
            .take(missing)
            .chain(self.speeds.iter().copied())
            .collect();

        let k = self.window as f64;
        let prior = padded[..self.window].iter().sum::<f64>() / k;
        let recent = (padded[self.window..].iter().sum::<f64>() + current) / k;
        (prior, recent)
    }
}

impl Default for SpeedHistory {
    fn default() -> Self {
        Self::new(1)
    }
}
