use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;

use super::{FixReceiver, FixUpdate, LocationProvider, RawFix, WatchId};
use crate::config::WatchOptions;
use crate::error::{TrackerError, TrackerResult};

#[derive(Default)]
struct FeedState {
    next_id: WatchId,
    watchers: HashMap<WatchId, mpsc::UnboundedSender<FixUpdate>>,
    last_fix: Option<RawFix>,
    watch_rejection: Option<String>,
    watches_opened: usize,
}

/// In-process location provider fed by its owner
///
/// Whoever holds a clone pushes fixes (parsed from stdin, replayed from a
/// log, scripted in a test); every open watch receives them. The last
/// pushed fix answers single-shot requests.
#[derive(Clone, Default)]
pub struct FixFeed {
    state: Arc<Mutex<FeedState>>,
}

impl FixFeed {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, FeedState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Deliver a fix to every open watch; returns how many received it
    pub fn push(&self, fix: RawFix) -> usize {
        let mut state = self.lock();
        state.last_fix = Some(fix.clone());
        state
            .watchers
            .retain(|_, tx| tx.send(Ok(fix.clone())).is_ok());
        state.watchers.len()
    }

    /// Report a provider failure to every open watch
    pub fn fail(&self, reason: &str) -> usize {
        let mut state = self.lock();
        let error = TrackerError::LocationUnavailable(reason.to_string());
        state
            .watchers
            .retain(|_, tx| tx.send(Err(error.clone())).is_ok());
        state.watchers.len()
    }

    /// End every open watch stream
    pub fn close(&self) {
        self.lock().watchers.clear();
    }

    /// Make subsequent `watch` calls fail (`None` accepts them again)
    pub fn reject_watches(&self, reason: Option<&str>) {
        self.lock().watch_rejection = reason.map(str::to_string);
    }

    pub fn active_watches(&self) -> usize {
        self.lock().watchers.len()
    }

    /// Number of watches ever opened on this feed
    pub fn watches_opened(&self) -> usize {
        self.lock().watches_opened
    }
}

#[async_trait]
impl LocationProvider for FixFeed {
    async fn current_fix(&self) -> TrackerResult<RawFix> {
        let fix = self.lock().last_fix.clone();
        fix.ok_or_else(|| TrackerError::LocationUnavailable("no fix received yet".to_string()))
    }

    fn watch(&self, _options: &WatchOptions) -> TrackerResult<(WatchId, FixReceiver)> {
        let mut state = self.lock();
        if let Some(reason) = &state.watch_rejection {
            return Err(TrackerError::LocationUnavailable(reason.clone()));
        }

        let id = state.next_id;
        state.next_id += 1;
        state.watches_opened += 1;

        let (tx, rx) = mpsc::unbounded_channel();
        state.watchers.insert(id, tx);
        Ok((id, rx))
    }

    fn clear_watch(&self, id: WatchId) {
        self.lock().watchers.remove(&id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_push_reaches_all_watches() {
        let feed = FixFeed::new();
        let (_, mut rx_a) = feed.watch(&WatchOptions::default()).unwrap();
        let (_, mut rx_b) = feed.watch(&WatchOptions::default()).unwrap();

        assert_eq!(feed.push(RawFix::new(1.0, 2.0, Some(3.0))), 2);
        assert_eq!(rx_a.recv().await.unwrap().unwrap().speed, Some(3.0));
        assert_eq!(rx_b.recv().await.unwrap().unwrap().speed, Some(3.0));
    }

    #[tokio::test]
    async fn test_dropped_receiver_is_pruned() {
        let feed = FixFeed::new();
        let (_, rx) = feed.watch(&WatchOptions::default()).unwrap();
        drop(rx);

        assert_eq!(feed.push(RawFix::new(1.0, 2.0, None)), 0);
        assert_eq!(feed.active_watches(), 0);
    }

    #[tokio::test]
    async fn test_last_fix_answers_current_fix() {
        let feed = FixFeed::new();
        feed.push(RawFix::new(1.0, 2.0, None));
        feed.push(RawFix::new(3.0, 4.0, None));

        let fix = feed.current_fix().await.unwrap();
        assert_eq!((fix.latitude, fix.longitude), (3.0, 4.0));
    }

    #[test]
    fn test_reject_watches() {
        let feed = FixFeed::new();
        feed.reject_watches(Some("permission denied"));
        assert!(feed.watch(&WatchOptions::default()).is_err());
        assert_eq!(feed.watches_opened(), 0);

        feed.reject_watches(None);
        assert!(feed.watch(&WatchOptions::default()).is_ok());
        assert_eq!(feed.watches_opened(), 1);
    }

    #[tokio::test]
    async fn test_close_ends_streams() {
        let feed = FixFeed::new();
        let (_, mut rx) = feed.watch(&WatchOptions::default()).unwrap();
        feed.close();
        assert!(rx.recv().await.is_none());
    }
}
