//! # Bundling
//!
//! Bundle lifecycle management between an item stream and an
//! [`ExecutionUnit`].
//!
//! ## Components
//!
//! - [`BundlingCoordinator`] decides when bundles open and close, and holds
//!   watermarks back until the bundle they arrived during has emitted its results
//! - [`BundleState`] is the compare-and-set state shared by the ingestion path
//!   and the age timer
//! - [`ExecutionUnit`] and [`DownstreamSink`] are the collaborator contracts
//! - [`ChannelSink`] is a ready-made sink over a bounded tokio channel
//! - [`BundleMetrics`] counts bundles, closes per trigger and watermark handling
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use bundler_core::bundle::{BundlingCoordinator, ChannelSink, Watermark};
//! use bundler_core::config::ThresholdPolicy;
//! use bundler_core::timer::TokioTimerSource;
//! # use async_trait::async_trait;
//! # use bundler_core::bundle::ExecutionUnit;
//! # use bundler_core::BundleResult;
//! # #[derive(Default)]
//! # struct Doubler { results: Vec<u64> }
//! # #[async_trait]
//! # impl ExecutionUnit for Doubler {
//! #     type Input = u64;
//! #     type Output = u64;
//! #     async fn open(&mut self) -> BundleResult<()> { Ok(()) }
//! #     async fn start_bundle(&mut self) -> BundleResult<()> { Ok(()) }
//! #     async fn process(&mut self, item: u64) -> BundleResult<()> {
//! #         self.results.push(item * 2);
//! #         Ok(())
//! #     }
//! #     async fn finish_bundle(&mut self) -> BundleResult<()> { Ok(()) }
//! #     async fn drain_results(&mut self) -> BundleResult<Vec<u64>> {
//! #         Ok(std::mem::take(&mut self.results))
//! #     }
//! #     async fn close(&mut self) -> BundleResult<()> { Ok(()) }
//! # }
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let policy = ThresholdPolicy::validate(100, 500).policy;
//! let (sink, mut downstream) = ChannelSink::channel(1024);
//! let unit = Doubler::default();
//!
//! let coordinator = Arc::new(BundlingCoordinator::new(
//!     policy,
//!     unit,
//!     sink,
//!     Arc::new(TokioTimerSource::new()),
//! ));
//! coordinator.start().await?;
//!
//! coordinator.submit(1).await?;
//! coordinator.process_watermark(Watermark::new(10)).await?;
//! coordinator.end_input().await?;
//! coordinator.stop().await?;
//!
//! while let Ok(message) = downstream.try_recv() {
//!     println!("{message:?}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod coordinator;
pub mod metrics;
pub mod sink;
pub mod state;
pub mod traits;
pub mod types;

pub use coordinator::BundlingCoordinator;
pub use metrics::{BundleMetrics, BundleMetricsSnapshot};
pub use sink::{ChannelSink, SinkMessage};
pub use state::BundleState;
pub use traits::{DownstreamSink, ExecutionUnit};
pub use types::{CloseTrigger, CoordinatorPhase, Watermark};
