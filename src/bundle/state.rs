//! # Bundle State
//!
//! Mutable lifecycle state of the current bundle. The open flag is only ever
//! changed through compare-and-set so that the ingestion path and the timer
//! task can race to open or close without double-starting or double-finishing
//! a bundle. The remaining fields are only written by whichever caller won the
//! most recent transition.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};

use super::types::Watermark;

#[derive(Debug)]
pub struct BundleState {
    open: AtomicBool,
    item_count: AtomicUsize,
    last_close_millis: AtomicI64,
    held_watermark: Mutex<Option<Watermark>>,
}

impl BundleState {
    pub fn new(now_millis: i64) -> Self {
        Self {
            open: AtomicBool::new(false),
            item_count: AtomicUsize::new(0),
            last_close_millis: AtomicI64::new(now_millis),
            held_watermark: Mutex::new(None),
        }
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Closed → open. Returns `true` only for the caller that performed the transition.
    pub fn try_open(&self) -> bool {
        self.open
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Open → closed. Returns `true` only for the caller that performed the transition.
    pub fn try_begin_close(&self) -> bool {
        self.open
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Count one more item in the open bundle and return the new total
    pub fn record_item(&self) -> usize {
        self.item_count.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn item_count(&self) -> usize {
        self.item_count.load(Ordering::Acquire)
    }

    pub fn last_close_millis(&self) -> i64 {
        self.last_close_millis.load(Ordering::Acquire)
    }

    /// Milliseconds since the last close, as seen at `now_millis`
    pub fn age_millis(&self, now_millis: i64) -> i64 {
        now_millis.saturating_sub(self.last_close_millis())
    }

    /// Reset counters after a completed close (or at start)
    pub fn reset(&self, now_millis: i64) {
        self.item_count.store(0, Ordering::Release);
        self.last_close_millis.store(now_millis, Ordering::Release);
    }

    /// Hold a watermark until the open bundle closes. Returns the hold it replaced.
    pub fn hold_watermark(&self, watermark: Watermark) -> Option<Watermark> {
        self.held_watermark.lock().replace(watermark)
    }

    pub fn take_held_watermark(&self) -> Option<Watermark> {
        self.held_watermark.lock().take()
    }

    pub fn held_watermark(&self) -> Option<Watermark> {
        *self.held_watermark.lock()
    }

    /// Drop the open flag without finishing, used once the execution unit is released
    pub fn force_closed(&self) -> bool {
        self.open.swap(false, Ordering::AcqRel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_open_close_transitions_are_exclusive() {
        let state = BundleState::new(0);
        assert!(!state.is_open());

        assert!(state.try_open());
        assert!(!state.try_open());
        assert!(state.is_open());

        assert!(state.try_begin_close());
        assert!(!state.try_begin_close());
        assert!(!state.is_open());
    }

    #[test]
    fn test_concurrent_close_has_one_winner() {
        let state = Arc::new(BundleState::new(0));
        assert!(state.try_open());

        let winners: usize = (0..8)
            .map(|_| {
                let state = Arc::clone(&state);
                std::thread::spawn(move || state.try_begin_close())
            })
            .collect::<Vec<_>>()
            .into_iter()
            .map(|handle| handle.join().unwrap() as usize)
            .sum();

        assert_eq!(winners, 1);
    }

    #[test]
    fn test_item_count_and_reset() {
        let state = BundleState::new(100);
        assert_eq!(state.record_item(), 1);
        assert_eq!(state.record_item(), 2);
        assert_eq!(state.age_millis(150), 50);

        state.reset(400);
        assert_eq!(state.item_count(), 0);
        assert_eq!(state.last_close_millis(), 400);
        assert_eq!(state.age_millis(400), 0);
    }

    #[test]
    fn test_latest_held_watermark_wins() {
        let state = BundleState::new(0);
        assert_eq!(state.hold_watermark(Watermark::new(1)), None);
        assert_eq!(
            state.hold_watermark(Watermark::new(5)),
            Some(Watermark::new(1))
        );
        assert_eq!(state.held_watermark(), Some(Watermark::new(5)));
        assert_eq!(state.take_held_watermark(), Some(Watermark::new(5)));
        assert_eq!(state.take_held_watermark(), None);
    }
}
