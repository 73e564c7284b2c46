use proptest::prelude::*;

/// One ingestion-path event
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Item(u32),
    Watermark(i64),
    Checkpoint,
}

/// Strategy for a bundle size limit
pub fn max_items_strategy() -> impl Strategy<Value = i64> {
    1i64..=16
}

/// Strategy for a stream of items, watermarks and checkpoint barriers.
///
/// Watermark timestamps are non-decreasing, as upstream guarantees.
pub fn stream_strategy() -> impl Strategy<Value = Vec<StreamEvent>> {
    prop::collection::vec(
        prop_oneof![
            6 => any::<u32>().prop_map(StreamEvent::Item),
            2 => (0i64..10).prop_map(StreamEvent::Watermark),
            1 => Just(StreamEvent::Checkpoint),
        ],
        0..120,
    )
    .prop_map(|events| {
        let mut watermark = 0i64;
        events
            .into_iter()
            .map(|event| match event {
                StreamEvent::Watermark(step) => {
                    watermark += step;
                    StreamEvent::Watermark(watermark)
                }
                other => other,
            })
            .collect()
    })
}
