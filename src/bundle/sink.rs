//! # Channel Sink
//!
//! [`DownstreamSink`] that hands results and watermarks to a bounded tokio
//! channel. Ordering on the channel is exactly the order the coordinator
//! emitted them, so a consumer sees every result of a bundle before the
//! watermark that was held behind it.

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::mpsc;

use super::traits::DownstreamSink;
use super::types::Watermark;
use crate::error::{BundleError, BundleResult};

/// Message delivered to the channel consumer
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum SinkMessage<T> {
    Result(T),
    Watermark(Watermark),
}

impl<T> SinkMessage<T> {
    pub fn is_watermark(&self) -> bool {
        matches!(self, SinkMessage::Watermark(_))
    }
}

#[derive(Debug, Clone)]
pub struct ChannelSink<T> {
    sender: mpsc::Sender<SinkMessage<T>>,
}

impl<T: Send + 'static> ChannelSink<T> {
    pub fn new(sender: mpsc::Sender<SinkMessage<T>>) -> Self {
        Self { sender }
    }

    /// Create a sink together with the receiving half of a channel of `capacity` messages
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<SinkMessage<T>>) {
        let (sender, receiver) = mpsc::channel(capacity);
        (Self::new(sender), receiver)
    }

    /// Waits for capacity; a full channel applies backpressure to the coordinator
    async fn send(&self, message: SinkMessage<T>) -> BundleResult<()> {
        self.sender
            .send(message)
            .await
            .map_err(|_| BundleError::Sink("Downstream receiver has been dropped".to_string()))
    }
}

#[async_trait]
impl<T: Send + 'static> DownstreamSink<T> for ChannelSink<T> {
    async fn emit(&mut self, result: T) -> BundleResult<()> {
        self.send(SinkMessage::Result(result)).await
    }

    async fn forward_watermark(&mut self, watermark: Watermark) -> BundleResult<()> {
        self.send(SinkMessage::Watermark(watermark)).await
    }
}
