use std::{pin::Pin, task::Poll};

use futures_util::Stream;
use tokio::sync::mpsc;

use crate::message::Delivery;

/// Deliveries of one consumer.
///
/// The reader task queues deliveries without waiting on the application. The stream ends when
/// the consumer is cancelled, by either side, or when the channel closes. Dropping it does not
/// cancel the consumer on the broker.
#[derive(Debug)]
pub struct Consumer {
    tag: String,
    rx: mpsc::UnboundedReceiver<Delivery>,
}

impl Consumer {
    pub(crate) fn new(tag: String, rx: mpsc::UnboundedReceiver<Delivery>) -> Self {
        Self { tag, rx }
    }

    /// The consumer tag, as confirmed by the broker
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Waits for the next delivery
    pub async fn recv(&mut self) -> Option<Delivery> {
        self.rx.recv().await
    }
}

impl Stream for Consumer {
    type Item = Delivery;

    fn poll_next(
        mut self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}
