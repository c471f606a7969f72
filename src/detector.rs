//! Park detection from a stream of location samples.
//!
//! The detector watches for a drop in speed: once the vehicle has been
//! moving faster than the high threshold and the next reading falls below
//! the low threshold, the driver is assumed to have parked at that
//! reading's position. With the default window of one sample this is a
//! plain two-sample edge; a wider window compares averages instead, so a
//! single noisy reading near a stoplight is not enough to fire.
//!
//! A detector fires at most once. It is created `Armed` for every tracking
//! session and becomes `Fired` on the first detected park.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::config::DetectorConfig;
use crate::speed_history::SpeedHistory;
use crate::types::{LocationSample, ParkedEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DetectorState {
    /// Watching samples, nothing detected yet
    Armed,
    /// A park has been emitted; terminal
    Fired,
}

pub struct ParkingDetector {
    config: DetectorConfig,
    state: DetectorState,
}

impl ParkingDetector {
    pub fn new(config: DetectorConfig) -> Self {
        Self {
            config,
            state: DetectorState::Armed,
        }
    }

    pub fn state(&self) -> DetectorState {
        self.state
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Feed one sample.
    ///
    /// The comparison uses the history as it was before this sample; the
    /// sample's speed is recorded afterwards whichever way the comparison
    /// goes. Once fired, samples are ignored and the history is left alone.
    pub fn observe(
        &mut self,
        sample: &LocationSample,
        history: &mut SpeedHistory,
    ) -> Option<ParkedEvent> {
        if self.state == DetectorState::Fired {
            return None;
        }

        let current = sample.speed;
        let (prior, recent) = history.window_averages(current);
        history.record(current);

        if prior > self.config.high_speed_threshold && recent < self.config.low_speed_threshold {
            self.state = DetectorState::Fired;
            log::info!(
                "Park detected at ({:.6}, {:.6}): speed {:.2} -> {:.2} m/s",
                sample.coordinates.latitude,
                sample.coordinates.longitude,
                prior,
                recent
            );
            return Some(ParkedEvent {
                coordinates: sample.coordinates,
                detected_at: Utc::now(),
            });
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(i: usize, speed: f64) -> LocationSample {
        LocationSample::new(40.0 + i as f64 * 0.001, -3.0, speed)
    }

    /// Runs speeds through a fresh detector, returning (index, event) of each firing
    fn run(config: DetectorConfig, speeds: &[f64]) -> Vec<(usize, ParkedEvent)> {
        let mut history = SpeedHistory::new(config.window);
        let mut detector = ParkingDetector::new(config);
        speeds
            .iter()
            .enumerate()
            .filter_map(|(i, &speed)| {
                detector
                    .observe(&sample(i, speed), &mut history)
                    .map(|event| (i, event))
            })
            .collect()
    }

    #[test]
    fn test_fires_on_drop_after_fast() {
        let fired = run(DetectorConfig::default(), &[6.0, 0.5]);
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].0, 1);
        assert_eq!(fired[0].1.coordinates, sample(1, 0.5).coordinates);
    }

    #[test]
    fn test_no_fire_when_still_rolling() {
        // 2 is not below the low threshold
        assert!(run(DetectorConfig::default(), &[6.0, 2.0]).is_empty());
    }

    #[test]
    fn test_fires_only_on_third_sample() {
        let fired = run(DetectorConfig::default(), &[0.5, 6.0, 0.5]);
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].0, 2);
    }

    #[test]
    fn test_never_fires_below_high_threshold() {
        assert!(run(DetectorConfig::default(), &[3.0, 0.2]).is_empty());
        assert!(run(DetectorConfig::default(), &[5.0, 0.0]).is_empty());
    }

    #[test]
    fn test_first_sample_compares_against_zero() {
        // History starts at zero, so a lone slow sample never fires
        assert!(run(DetectorConfig::default(), &[0.0]).is_empty());
    }

    #[test]
    fn test_fires_at_most_once() {
        let speeds = [6.0, 0.5, 7.0, 0.1, 9.0, 0.0];
        let fired = run(DetectorConfig::default(), &speeds);
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].0, 1);
    }

    #[test]
    fn test_fired_detector_leaves_history_alone() {
        let mut history = SpeedHistory::new(1);
        let mut detector = ParkingDetector::new(DetectorConfig::default());

        detector.observe(&sample(0, 6.0), &mut history);
        assert!(detector.observe(&sample(1, 0.5), &mut history).is_some());
        assert_eq!(detector.state(), DetectorState::Fired);

        detector.observe(&sample(2, 12.0), &mut history);
        assert_eq!(history.last(), 0.5);
    }

    #[test]
    fn test_history_updated_on_every_sample() {
        let mut history = SpeedHistory::new(1);
        let mut detector = ParkingDetector::new(DetectorConfig::default());

        detector.observe(&sample(0, 3.0), &mut history);
        assert_eq!(history.last(), 3.0);
        detector.observe(&sample(1, 8.0), &mut history);
        assert_eq!(history.last(), 8.0);
    }

    #[test]
    fn test_custom_thresholds() {
        let config = DetectorConfig {
            high_speed_threshold: 2.5,
            low_speed_threshold: 0.3,
            window: 1,
        };
        assert_eq!(run(config.clone(), &[3.0, 0.2]).len(), 1);
        assert!(run(config, &[3.0, 0.5]).is_empty());
    }

    #[test]
    fn test_windowed_ignores_single_dip() {
        let config = DetectorConfig {
            window: 2,
            ..DetectorConfig::default()
        };
        // Red light: one slow reading between fast ones
        assert!(run(config, &[6.0, 7.0, 0.5, 6.0, 7.0]).is_empty());
    }

    #[test]
    fn test_windowed_fires_on_sustained_stop() {
        let config = DetectorConfig {
            window: 2,
            ..DetectorConfig::default()
        };
        let fired = run(config, &[6.0, 7.0, 0.5, 0.2]);
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].0, 3);
    }
}
