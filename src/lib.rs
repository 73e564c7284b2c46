#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Bundler Core Rust
//!
//! Bundling coordinator for stream operators that hand items to an external,
//! batch-oriented execution unit.
//!
//! ## Overview
//!
//! Sending items to an external worker one at a time is expensive, so items
//! are grouped into **bundles**. A bundle closes when it reaches a maximum
//! item count, when it reaches a maximum age, or when the surrounding stream
//! engine needs a consistent point (checkpoint barrier, end of input,
//! terminal watermark, shutdown). Watermarks that arrive while a bundle is in
//! flight are held back and forwarded only after every result of that bundle
//! has been emitted.
//!
//! ## Key Features
//!
//! - **Exactly-once close**: count, age and forced triggers race into one
//!   idempotent close guarded by compare-and-set
//! - **Watermark hold-back**: downstream never sees a watermark ahead of the
//!   results it could invalidate
//! - **Forgiving configuration**: invalid thresholds fall back to defaults with
//!   a warning instead of failing startup
//! - **Pluggable collaborators**: execution unit, sink and timer are traits
//!
//! ## Module Organization
//!
//! - [`bundle`] - Coordinator, bundle state, collaborator traits, metrics
//! - [`timer`] - Periodic timer abstraction and tokio implementation
//! - [`config`] - Threshold configuration and loading
//! - [`error`] - Structured error handling
//! - [`logging`] - Structured logging setup
//! - `testing` - Recording collaborators and a manual timer (`test-utils` feature)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use async_trait::async_trait;
//! use bundler_core::bundle::{BundlingCoordinator, ChannelSink, ExecutionUnit};
//! use bundler_core::config::BundleConfig;
//! use bundler_core::timer::TokioTimerSource;
//! use bundler_core::BundleResult;
//!
//! /// Upper-cases every item once its bundle finishes
//! #[derive(Default)]
//! struct Uppercase {
//!     buffered: Vec<String>,
//!     results: Vec<String>,
//! }
//!
//! #[async_trait]
//! impl ExecutionUnit for Uppercase {
//!     type Input = String;
//!     type Output = String;
//!
//!     async fn open(&mut self) -> BundleResult<()> { Ok(()) }
//!     async fn start_bundle(&mut self) -> BundleResult<()> { Ok(()) }
//!     async fn process(&mut self, item: String) -> BundleResult<()> {
//!         self.buffered.push(item);
//!         Ok(())
//!     }
//!     async fn finish_bundle(&mut self) -> BundleResult<()> {
//!         let buffered = std::mem::take(&mut self.buffered);
//!         self.results.extend(buffered.into_iter().map(|s| s.to_uppercase()));
//!         Ok(())
//!     }
//!     async fn drain_results(&mut self) -> BundleResult<Vec<String>> {
//!         Ok(std::mem::take(&mut self.results))
//!     }
//!     async fn close(&mut self) -> BundleResult<()> { Ok(()) }
//! }
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! bundler_core::logging::init_structured_logging();
//!
//! let config = BundleConfig::load(None)?;
//! let (sink, _downstream) = ChannelSink::channel(256);
//! let coordinator = Arc::new(BundlingCoordinator::with_config(
//!     &config,
//!     Uppercase::default(),
//!     sink,
//!     Arc::new(TokioTimerSource::new()),
//! ));
//!
//! coordinator.start().await?;
//! coordinator.submit("hello".to_string()).await?;
//! coordinator.stop().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Testing
//!
//! ```bash
//! cargo test --lib    # Unit tests
//! cargo test          # Unit, integration and property tests
//! ```

pub mod bundle;
pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
#[cfg(any(test, feature = "test-utils"))]
pub mod testing;
pub mod timer;

pub use bundle::{
    BundleMetricsSnapshot, BundlingCoordinator, ChannelSink, CloseTrigger, CoordinatorPhase,
    DownstreamSink, ExecutionUnit, SinkMessage, Watermark,
};
pub use config::{BundleConfig, ThresholdPolicy, ThresholdWarning, ValidatedThresholds};
pub use error::{BundleError, BundleResult};
pub use timer::{TimerCallback, TimerRegistration, TimerSource, TokioTimerSource};
