mod common;

use bundler_core::bundle::Watermark;
use bundler_core::testing::JournalEntry;
use common::strategies::*;
use common::*;
use proptest::prelude::*;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("test runtime")
}

proptest! {
    /// Property: N items with a size limit of k produce ceil(N/k) bundles,
    /// none larger than k, covering every item exactly once in order
    #[test]
    fn count_threshold_bundle_law(item_count in 0usize..200, max_items in max_items_strategy()) {
        let (bundles, emitted) = runtime().block_on(async {
            let harness = started_harness::<usize>(max_items, 3_600_000).await;
            for item in 0..item_count {
                harness.coordinator.submit(item).await.unwrap();
            }
            harness.coordinator.end_input().await.unwrap();
            harness.coordinator.stop().await.unwrap();
            (harness.journal.bundles(), harness.journal.emitted())
        });

        let k = max_items as usize;
        prop_assert_eq!(bundles.len(), (item_count + k - 1) / k);
        prop_assert!(bundles.iter().all(|bundle| !bundle.is_empty() && bundle.len() <= k));
        prop_assert_eq!(bundles.concat(), (0..item_count).collect::<Vec<_>>());
        prop_assert_eq!(emitted, (0..item_count).collect::<Vec<_>>());
    }

    /// Property: a forwarded watermark is never ahead of a processed item's result,
    /// and forwarded watermarks never go backwards
    #[test]
    fn watermarks_never_overtake_results(
        events in stream_strategy(),
        max_items in max_items_strategy(),
    ) {
        let entries = runtime().block_on(async {
            let harness = started_harness::<u32>(max_items, 3_600_000).await;
            for (checkpoint_id, event) in events.iter().enumerate() {
                match event {
                    StreamEvent::Item(item) => harness.coordinator.submit(*item).await.unwrap(),
                    StreamEvent::Watermark(timestamp) => harness
                        .coordinator
                        .process_watermark(Watermark::new(*timestamp))
                        .await
                        .unwrap(),
                    StreamEvent::Checkpoint => harness
                        .coordinator
                        .prepare_snapshot_pre_barrier(checkpoint_id as u64)
                        .await
                        .unwrap(),
                }
            }
            harness.coordinator.process_watermark(Watermark::MAX).await.unwrap();
            harness.coordinator.stop().await.unwrap();
            harness.journal.entries()
        });

        let mut processed = 0usize;
        let mut emitted = 0usize;
        let mut last_watermark: Option<Watermark> = None;
        for entry in &entries {
            match entry {
                JournalEntry::Processed(_) => processed += 1,
                JournalEntry::Emitted(_) => emitted += 1,
                JournalEntry::WatermarkForwarded(watermark) => {
                    prop_assert_eq!(processed, emitted);
                    if let Some(previous) = last_watermark {
                        prop_assert!(previous <= *watermark);
                    }
                    last_watermark = Some(*watermark);
                }
                _ => {}
            }
        }

        let item_count = events
            .iter()
            .filter(|event| matches!(event, StreamEvent::Item(_)))
            .count();
        prop_assert_eq!(emitted, item_count);
        prop_assert_eq!(last_watermark, Some(Watermark::MAX));
    }
}
