//! # Collaborator Traits
//!
//! Contracts the coordinator consumes. The coordinator owns its execution unit
//! and sink exclusively and never calls them concurrently.

use async_trait::async_trait;

use super::types::Watermark;
use crate::error::BundleResult;

/// Opaque worker that runs user logic over a bundle of items.
///
/// Calls arrive in the order `open`, then any number of
/// `start_bundle` / `process`... / `finish_bundle` / `drain_results` cycles,
/// then `close`. Failures are fatal to the surrounding task; the coordinator
/// does not retry.
#[async_trait]
pub trait ExecutionUnit: Send + 'static {
    type Input: Send + 'static;
    type Output: Send + 'static;

    /// Acquire resources. A failure aborts coordinator startup.
    async fn open(&mut self) -> BundleResult<()>;

    async fn start_bundle(&mut self) -> BundleResult<()>;

    /// Hand one item to the unit. Results may be produced asynchronously.
    async fn process(&mut self, item: Self::Input) -> BundleResult<()>;

    /// Block until every item since `start_bundle` has produced its results or failed
    async fn finish_bundle(&mut self) -> BundleResult<()>;

    /// Take all results produced so far, in production order
    async fn drain_results(&mut self) -> BundleResult<Vec<Self::Output>>;

    async fn close(&mut self) -> BundleResult<()>;
}

/// Receiver of bundle results and forwarded watermarks
#[async_trait]
pub trait DownstreamSink<T>: Send + 'static {
    async fn emit(&mut self, result: T) -> BundleResult<()>;

    async fn forward_watermark(&mut self, watermark: Watermark) -> BundleResult<()>;
}
