//! Notifications raised by the engine

use std::{pin::Pin, task::Poll};

use amqp091_types::definitions::Exception;
use futures_util::Stream;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::{message::Returned, CloseReason};

/// Events raised on a channel
#[derive(Debug, Clone)]
pub enum ChannelEvent {
    /// The channel is closed, always the last event
    Close(CloseReason),

    /// The channel failed with an exception, raised by the broker or by a misuse detected
    /// locally, followed by [`ChannelEvent::Close`].
    ///
    /// A failing connection does not raise this event.
    Error(Exception),

    /// A mandatory publish could not be routed
    Return(Returned),

    /// The write buffer drained below the low-water mark after a publish reported back-pressure
    Drain,
}

/// Events raised on a connection
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    /// The connection is closed, always the last event
    Close(CloseReason),

    /// The connection closed for any reason other than the application asking for it,
    /// followed by [`ConnectionEvent::Close`]
    Error(CloseReason),

    /// The broker stopped reading from publishers, e.g. because of a resource alarm
    Blocked(String),

    /// The broker resumed reading
    Unblocked,
}

/// Stream of events of one channel or connection.
///
/// Events are queued until read, none are dropped. Nothing follows the closing event.
#[derive(Debug)]
pub struct Events<E> {
    rx: mpsc::UnboundedReceiver<E>,
}

impl<E> Events<E> {
    /// Waits for the next event, `None` once the source is gone and all events were read
    pub async fn recv(&mut self) -> Option<E> {
        self.rx.recv().await
    }

    /// Returns a queued event without waiting
    pub fn try_recv(&mut self) -> Option<E> {
        self.rx.try_recv().ok()
    }
}

impl<E> Stream for Events<E> {
    type Item = E;

    fn poll_next(
        mut self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// The receiving end of an event queue, handed out at most once
#[derive(Debug)]
pub(crate) struct EventSlot<E> {
    rx: Mutex<Option<mpsc::UnboundedReceiver<E>>>,
}

impl<E> EventSlot<E> {
    pub fn take(&self) -> Option<Events<E>> {
        self.rx.lock().take().map(|rx| Events { rx })
    }
}

pub(crate) fn event_queue<E>() -> (mpsc::UnboundedSender<E>, EventSlot<E>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        tx,
        EventSlot {
            rx: Mutex::new(Some(rx)),
        },
    )
}
