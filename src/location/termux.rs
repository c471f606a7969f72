use async_trait::async_trait;
use std::collections::HashMap;
use std::io::{BufReader, Read};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

use super::{FixReceiver, FixUpdate, LocationProvider, RawFix, WatchId};
use crate::config::{Accuracy, WatchOptions};
use crate::error::{TrackerError, TrackerResult};
use crate::types::Coordinates;

/// Location provider backed by Termux:API's `termux-location`
///
/// # Requests
/// - `current_fix`: `termux-location -p gps -r once`
/// - `watch`: `termux-location -p <provider> -r updates`, a stream of JSON
///   objects on stdout read by a dedicated thread
///
/// `termux-location` has no interval or distance options, so the reader
/// thread drops fixes that arrive sooner than `min_interval_ms` or closer
/// than `min_distance_m` to the last delivered one.
pub struct TermuxLocationProvider {
    program: String,
    next_id: AtomicU64,
    children: Mutex<HashMap<WatchId, Child>>,
}

impl TermuxLocationProvider {
    pub fn new() -> Self {
        Self::with_program("termux-location")
    }

    pub fn with_program(program: &str) -> Self {
        TermuxLocationProvider {
            program: program.to_string(),
            next_id: AtomicU64::new(0),
            children: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for TermuxLocationProvider {
    fn default() -> Self {
        Self::new()
    }
}

fn provider_name(accuracy: Accuracy) -> &'static str {
    match accuracy {
        Accuracy::High => "gps",
        Accuracy::Balanced => "network",
        Accuracy::Low => "passive",
    }
}

fn parse_fix(output: &str) -> TrackerResult<RawFix> {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        return Err(TrackerError::LocationUnavailable(
            "termux-location returned no fix".to_string(),
        ));
    }
    serde_json::from_str(trimmed).map_err(|e| {
        TrackerError::LocationUnavailable(format!("unreadable termux-location output: {}", e))
    })
}

/// Emulates the platform's interval and distance filters
struct FixFilter {
    min_interval: Duration,
    min_distance_m: f64,
    last: Option<(Instant, Coordinates)>,
}

impl FixFilter {
    fn new(options: &WatchOptions) -> Self {
        FixFilter {
            min_interval: options.min_interval(),
            min_distance_m: options.min_distance_m,
            last: None,
        }
    }

    fn accept(&mut self, fix: &RawFix, now: Instant) -> bool {
        let here = Coordinates::new(fix.latitude, fix.longitude);
        if let Some((at, previous)) = self.last {
            if now.duration_since(at) < self.min_interval
                || previous.distance_m(&here) < self.min_distance_m
            {
                return false;
            }
        }
        self.last = Some((now, here));
        true
    }
}

fn pump_updates<R: Read>(
    stdout: R,
    mut filter: FixFilter,
    tx: mpsc::UnboundedSender<FixUpdate>,
) {
    let stream =
        serde_json::Deserializer::from_reader(BufReader::new(stdout)).into_iter::<RawFix>();

    for item in stream {
        let update = match item {
            Ok(fix) => {
                if !filter.accept(&fix, Instant::now()) {
                    continue;
                }
                Ok(fix)
            }
            Err(e) => Err(TrackerError::LocationUnavailable(format!(
                "termux-location stream broken: {}",
                e
            ))),
        };
        let failed = update.is_err();
        if tx.send(update).is_err() || failed {
            break;
        }
    }
    // Dropping tx closes the watch
}

#[async_trait]
impl LocationProvider for TermuxLocationProvider {
    async fn current_fix(&self) -> TrackerResult<RawFix> {
        let output = tokio::process::Command::new(&self.program)
            .args(["-p", "gps", "-r", "once"])
            .output()
            .await
            .map_err(|e| {
                TrackerError::LocationUnavailable(format!("failed to run {}: {}", self.program, e))
            })?;

        if !output.status.success() {
            return Err(TrackerError::LocationUnavailable(format!(
                "{} exited with {}",
                self.program, output.status
            )));
        }

        parse_fix(&String::from_utf8_lossy(&output.stdout))
    }

    fn watch(&self, options: &WatchOptions) -> TrackerResult<(WatchId, FixReceiver)> {
        let mut child = Command::new(&self.program)
            .args(["-p", provider_name(options.accuracy), "-r", "updates"])
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                TrackerError::LocationUnavailable(format!("failed to run {}: {}", self.program, e))
            })?;

        let stdout = child.stdout.take().ok_or_else(|| {
            TrackerError::LocationUnavailable("termux-location stdout unavailable".to_string())
        })?;

        let (tx, rx) = mpsc::unbounded_channel();
        let filter = FixFilter::new(options);
        std::thread::spawn(move || pump_updates(stdout, filter, tx));

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.children
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, child);

        log::info!("Started {} watch {} ({:?})", self.program, id, options.accuracy);
        Ok((id, rx))
    }

    fn clear_watch(&self, id: WatchId) {
        let child = self
            .children
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);

        if let Some(mut child) = child {
            if let Err(e) = child.kill() {
                log::warn!("Failed to stop {} watch {}: {}", self.program, id, e);
            }
            if let Err(e) = child.wait() {
                log::debug!("Failed to reap {} watch {}: {}", self.program, id, e);
            }
        }
    }
}
