//! Implements the AMQP 0-9-1 connection.
//!
//! An open connection runs two tasks. The reader decodes frames and routes them to the channel
//! state machines, the writer drains the outgoing queue and sends heartbeats.

use std::{sync::Arc, time::Duration};

use parking_lot::Mutex;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::{mpsc, oneshot, Notify},
};

use crate::{
    channel::{inner::ChannelInner, Channel, ConfirmChannel},
    event::{event_queue, ConnectionEvent, EventSlot, Events},
    flow::WritePressure,
    transport::Transport,
    CloseReason,
};

mod builder;
pub use builder::*;

mod error;
pub use error::Error;

mod handshake;
pub use handshake::Tuning;

pub(crate) mod heartbeat;
mod mux;
mod reader;
pub(crate) mod writer;

use self::{
    heartbeat::HeartBeat,
    mux::ChannelMux,
    reader::ConnectionEngine,
    writer::{FrameSender, Writer},
};

#[derive(Debug, Default)]
struct Status {
    /// Set once, when the connection is gone
    closed: Option<CloseReason>,
    /// `connection.close` was sent by the application
    closing: bool,
    waiters: Vec<oneshot::Sender<CloseReason>>,
}

/// State shared by the connection handle, the reader task and the writer task
#[derive(Debug)]
pub(crate) struct ConnectionShared {
    mux: Mutex<ChannelMux<Arc<Mutex<ChannelInner>>>>,
    sender: FrameSender,
    status: Mutex<Status>,
    events: mpsc::UnboundedSender<ConnectionEvent>,
    stop: Notify,
    tuning: Tuning,
}

impl ConnectionShared {
    fn is_closing(&self) -> bool {
        let status = self.status.lock();
        status.closing || status.closed.is_some()
    }

    /// Tears the connection down. Only the first call has an effect.
    ///
    /// Every channel fails with [`crate::channel::Error::ConnectionClosed`] and the tasks stop
    /// once the writer flushed what is queued.
    pub(crate) fn shutdown(&self, reason: CloseReason) {
        let waiters = {
            let mut status = self.status.lock();
            if status.closed.is_some() {
                return;
            }
            status.closed = Some(reason.clone());
            std::mem::take(&mut status.waiters)
        };

        match reason.is_graceful() {
            true => {
                #[cfg(feature = "tracing")]
                tracing::info!(%reason, "Connection closed");
                #[cfg(feature = "log")]
                log::info!("Connection closed: {}", reason);
            }
            false => {
                #[cfg(feature = "tracing")]
                tracing::error!(%reason, "Connection closed");
                #[cfg(feature = "log")]
                log::error!("Connection closed: {}", reason);
            }
        }

        let channels: Vec<_> = self.mux.lock().drain().map(|(_, c)| c).collect();
        for channel in channels {
            channel.lock().on_connection_closed(&reason);
        }

        if !matches!(reason, CloseReason::Requested) {
            let _ = self.events.send(ConnectionEvent::Error(reason.clone()));
        }
        let _ = self.events.send(ConnectionEvent::Close(reason.clone()));
        for waiter in waiters {
            let _ = waiter.send(reason.clone());
        }

        self.sender.shutdown();
        self.stop.notify_one();
    }
}

/// An open connection.
///
/// Dropping the connection closes it, which also closes every channel created from it.
#[derive(Debug)]
pub struct Connection {
    shared: Arc<ConnectionShared>,
    events: EventSlot<ConnectionEvent>,
}

impl Connection {
    /// Creates a builder with default configuration
    pub fn builder() -> Builder {
        Builder::new()
    }

    pub(crate) fn spawn<Io>(
        mut transport: Transport<Io>,
        tuning: Tuning,
        high_water_mark: usize,
        low_water_mark: usize,
    ) -> Self
    where
        Io: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        transport.set_idle_timeout(Duration::from_secs(u64::from(tuning.heartbeat)));
        let codec = *transport.codec();
        let (reader, writer) = transport.into_split();

        let pressure = Arc::new(WritePressure::new(high_water_mark, low_water_mark));
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
        let (events_tx, events) = event_queue();
        let shared = Arc::new(ConnectionShared {
            mux: Mutex::new(ChannelMux::new(tuning.channel_max)),
            sender: FrameSender::new(codec, outgoing_tx, pressure.clone()),
            status: Mutex::new(Status::default()),
            events: events_tx,
            stop: Notify::new(),
            tuning,
        });

        let heartbeat = HeartBeat::for_negotiated(tuning.heartbeat);
        Writer::new(writer, outgoing_rx, heartbeat, pressure, shared.clone()).spawn();
        ConnectionEngine::new(reader, shared.clone()).spawn();

        Self { shared, events }
    }

    /// Parameters agreed with the broker
    pub fn tuning(&self) -> Tuning {
        self.shared.tuning
    }

    /// Whether the connection is gone
    pub fn is_closed(&self) -> bool {
        self.shared.status.lock().closed.is_some()
    }

    /// Takes the event stream. Only the first call returns `Some`.
    pub fn take_events(&self) -> Option<Events<ConnectionEvent>> {
        self.events.take()
    }

    fn allocate_channel(&self) -> Result<Channel, Error> {
        let mut mux = self.shared.mux.lock();
        {
            let status = self.shared.status.lock();
            if let Some(reason) = &status.closed {
                return Err(Error::Closed(reason.clone()));
            }
            if status.closing {
                return Err(Error::Closed(CloseReason::Requested));
            }
        }

        let id = mux
            .allocate()
            .ok_or_else(|| Error::ChannelLimitExceeded(mux.channel_max()))?;
        let (events_tx, events) = event_queue();
        let inner = Arc::new(Mutex::new(ChannelInner::new(
            id,
            self.shared.sender.clone(),
            events_tx,
        )));
        mux.insert(id, inner.clone());
        Ok(Channel::new(id, inner, events))
    }

    /// Opens a new channel on the smallest free channel number
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    pub async fn create_channel(&self) -> Result<Channel, Error> {
        let channel = self.allocate_channel()?;
        channel.open().await?;

        #[cfg(feature = "tracing")]
        tracing::debug!(channel = channel.id(), "Channel open");
        #[cfg(feature = "log")]
        log::debug!("Channel {} open", channel.id());

        Ok(channel)
    }

    /// Opens a new channel and puts it into publisher confirm mode
    pub async fn create_confirm_channel(&self) -> Result<ConfirmChannel, Error> {
        let channel = self.create_channel().await?;
        channel.confirm_select().await?;
        Ok(ConfirmChannel::new(channel))
    }

    /// Marks the connection as closing and sends `connection.close`, unless that already
    /// happened
    fn begin_close(&self) -> Option<oneshot::Receiver<CloseReason>> {
        let mut status = self.shared.status.lock();
        if status.closed.is_some() {
            return None;
        }
        let (tx, rx) = oneshot::channel();
        status.waiters.push(tx);
        if !status.closing {
            status.closing = true;
            if self
                .shared
                .sender
                .send_method(0, handshake::goodbye())
                .is_err()
            {
                drop(status);
                self.shared.shutdown(CloseReason::engine_stopped());
            }
        }
        Some(rx)
    }

    /// Closes the connection and waits for the broker to confirm.
    ///
    /// Every channel is closed with it.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    pub async fn close(&self) -> Result<(), Error> {
        let reason = match self.begin_close() {
            Some(rx) => rx.await.unwrap_or_else(|_| CloseReason::engine_stopped()),
            None => match &self.shared.status.lock().closed {
                Some(reason) => reason.clone(),
                None => CloseReason::engine_stopped(),
            },
        };
        match reason {
            CloseReason::Requested => Ok(()),
            reason => Err(Error::Closed(reason)),
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        let _ = self.begin_close();
    }
}
