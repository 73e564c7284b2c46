//! # Bundle Metrics
//!
//! Lock-free counters describing how a coordinator has been cutting bundles and
//! moving watermarks. Snapshots are serializable for health endpoints and logs.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

use super::types::CloseTrigger;

/// Point-in-time view of a coordinator's counters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleMetricsSnapshot {
    pub coordinator_id: Uuid,
    /// When this snapshot was taken (Unix timestamp)
    pub collected_at: u64,

    pub bundles_started: u64,
    pub bundles_finished: u64,
    pub items_processed: u64,
    pub results_emitted: u64,
    /// Average items per finished bundle
    pub avg_bundle_size: f64,

    // Closes by trigger
    pub closed_by_item_count: u64,
    pub closed_by_bundle_age: u64,
    pub closed_by_end_of_input: u64,
    pub closed_by_checkpoint: u64,
    pub closed_by_terminal_watermark: u64,
    pub closed_by_stop: u64,

    // Watermarks
    pub watermarks_forwarded: u64,
    pub watermarks_held: u64,
    /// Held watermarks replaced by a newer one before release
    pub watermarks_superseded: u64,
}

/// Counter set owned by one coordinator
#[derive(Debug)]
pub struct BundleMetrics {
    coordinator_id: Uuid,
    bundles_started: AtomicU64,
    bundles_finished: AtomicU64,
    items_processed: AtomicU64,
    items_in_finished_bundles: AtomicU64,
    results_emitted: AtomicU64,
    closed_by_item_count: AtomicU64,
    closed_by_bundle_age: AtomicU64,
    closed_by_end_of_input: AtomicU64,
    closed_by_checkpoint: AtomicU64,
    closed_by_terminal_watermark: AtomicU64,
    closed_by_stop: AtomicU64,
    watermarks_forwarded: AtomicU64,
    watermarks_held: AtomicU64,
    watermarks_superseded: AtomicU64,
}

impl BundleMetrics {
    pub fn new(coordinator_id: Uuid) -> Self {
        Self {
            coordinator_id,
            bundles_started: AtomicU64::new(0),
            bundles_finished: AtomicU64::new(0),
            items_processed: AtomicU64::new(0),
            items_in_finished_bundles: AtomicU64::new(0),
            results_emitted: AtomicU64::new(0),
            closed_by_item_count: AtomicU64::new(0),
            closed_by_bundle_age: AtomicU64::new(0),
            closed_by_end_of_input: AtomicU64::new(0),
            closed_by_checkpoint: AtomicU64::new(0),
            closed_by_terminal_watermark: AtomicU64::new(0),
            closed_by_stop: AtomicU64::new(0),
            watermarks_forwarded: AtomicU64::new(0),
            watermarks_held: AtomicU64::new(0),
            watermarks_superseded: AtomicU64::new(0),
        }
    }

    pub fn record_bundle_started(&self) {
        self.bundles_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_item_processed(&self) {
        self.items_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_bundle_finished(&self, trigger: CloseTrigger, items: usize, results: usize) {
        self.bundles_finished.fetch_add(1, Ordering::Relaxed);
        self.items_in_finished_bundles
            .fetch_add(items as u64, Ordering::Relaxed);
        self.results_emitted
            .fetch_add(results as u64, Ordering::Relaxed);

        self.close_counter(trigger).fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_watermark_forwarded(&self) {
        self.watermarks_forwarded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_watermark_held(&self, superseded: bool) {
        self.watermarks_held.fetch_add(1, Ordering::Relaxed);
        if superseded {
            self.watermarks_superseded.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Closes recorded for one trigger
    pub fn closes_for(&self, trigger: CloseTrigger) -> u64 {
        self.close_counter(trigger).load(Ordering::Relaxed)
    }

    fn close_counter(&self, trigger: CloseTrigger) -> &AtomicU64 {
        match trigger {
            CloseTrigger::ItemCount => &self.closed_by_item_count,
            CloseTrigger::BundleAge => &self.closed_by_bundle_age,
            CloseTrigger::EndOfInput => &self.closed_by_end_of_input,
            CloseTrigger::CheckpointBarrier => &self.closed_by_checkpoint,
            CloseTrigger::TerminalWatermark => &self.closed_by_terminal_watermark,
            CloseTrigger::Stop => &self.closed_by_stop,
        }
    }

    pub fn snapshot(&self) -> BundleMetricsSnapshot {
        let bundles_finished = self.bundles_finished.load(Ordering::Relaxed);
        let finished_items = self.items_in_finished_bundles.load(Ordering::Relaxed);

        BundleMetricsSnapshot {
            coordinator_id: self.coordinator_id,
            collected_at: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
            bundles_started: self.bundles_started.load(Ordering::Relaxed),
            bundles_finished,
            items_processed: self.items_processed.load(Ordering::Relaxed),
            results_emitted: self.results_emitted.load(Ordering::Relaxed),
            avg_bundle_size: if bundles_finished > 0 {
                finished_items as f64 / bundles_finished as f64
            } else {
                0.0
            },
            closed_by_item_count: self.closed_by_item_count.load(Ordering::Relaxed),
            closed_by_bundle_age: self.closed_by_bundle_age.load(Ordering::Relaxed),
            closed_by_end_of_input: self.closed_by_end_of_input.load(Ordering::Relaxed),
            closed_by_checkpoint: self.closed_by_checkpoint.load(Ordering::Relaxed),
            closed_by_terminal_watermark: self
                .closed_by_terminal_watermark
                .load(Ordering::Relaxed),
            closed_by_stop: self.closed_by_stop.load(Ordering::Relaxed),
            watermarks_forwarded: self.watermarks_forwarded.load(Ordering::Relaxed),
            watermarks_held: self.watermarks_held.load(Ordering::Relaxed),
            watermarks_superseded: self.watermarks_superseded.load(Ordering::Relaxed),
        }
    }
}
