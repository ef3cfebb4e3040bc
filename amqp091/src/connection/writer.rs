//! The writer task and the handle every channel uses to queue frames for it

use std::{io, sync::Arc};

use amqp091_types::{methods::Method, properties::BasicProperties};
use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use tokio::{
    io::{AsyncWrite, AsyncWriteExt},
    sync::mpsc,
};

use super::{heartbeat::HeartBeat, ConnectionShared};
use crate::{
    channel::Error,
    event::ChannelEvent,
    flow::WritePressure,
    frames::{Frame, FrameCodec},
    util::Running,
    CloseReason,
};

const HEARTBEAT_FRAME: [u8; 8] = [8, 0, 0, 0, 0, 0, 0, 0xCE];

#[derive(Debug)]
pub(crate) enum WriterCommand {
    /// One or more complete frames, written without interleaving
    Write(Bytes),
    /// Flush what is queued before this and close the write half
    Shutdown,
}

/// Encodes frames on the caller's side and queues them for the writer task.
///
/// Queuing never blocks. Frames queued from one channel are written in the order they were
/// queued.
#[derive(Debug, Clone)]
pub(crate) struct FrameSender {
    codec: FrameCodec,
    tx: mpsc::UnboundedSender<WriterCommand>,
    pressure: Arc<WritePressure>,
}

impl FrameSender {
    pub fn new(
        codec: FrameCodec,
        tx: mpsc::UnboundedSender<WriterCommand>,
        pressure: Arc<WritePressure>,
    ) -> Self {
        Self {
            codec,
            tx,
            pressure,
        }
    }

    pub fn send_method(&self, channel: u16, method: impl Into<Method>) -> Result<(), Error> {
        let mut buf = BytesMut::new();
        self.codec
            .encode_frame(&Frame::method(channel, method), &mut buf)?;
        self.pressure.enqueue(buf.len());
        self.queue(buf.freeze())
    }

    /// Encodes a publish without queuing it, so nothing is consumed when it is rejected
    pub fn encode_content(
        &self,
        channel: u16,
        method: impl Into<Method>,
        properties: BasicProperties,
        body: &Bytes,
    ) -> Result<Bytes, Error> {
        let mut buf = BytesMut::new();
        self.codec
            .encode_content(channel, method.into(), properties, body, &mut buf)?;
        Ok(buf.freeze())
    }

    /// Queues an encoded publish. Returns `false` when the publisher should pause until the
    /// channel raises [`ChannelEvent::Drain`].
    pub fn send_publish(
        &self,
        channel: u16,
        frames: Bytes,
        events: &mpsc::UnboundedSender<ChannelEvent>,
    ) -> Result<bool, Error> {
        let keep_going = self
            .pressure
            .enqueue_publish(frames.len(), channel, events);
        self.queue(frames)?;
        Ok(keep_going)
    }

    /// Drops the pending drain of a channel that is going away
    pub fn forget_paused(&self, channel: u16) {
        self.pressure.forget(channel);
    }

    pub fn shutdown(&self) {
        let _ = self.tx.send(WriterCommand::Shutdown);
    }

    fn queue(&self, frames: Bytes) -> Result<(), Error> {
        self.tx
            .send(WriterCommand::Write(frames))
            .map_err(|_| Error::ConnectionClosed(CloseReason::engine_stopped()))
    }
}

/// Owns the write half of the transport
#[derive(Debug)]
pub(crate) struct Writer<W> {
    io: W,
    rx: mpsc::UnboundedReceiver<WriterCommand>,
    heartbeat: HeartBeat,
    pressure: Arc<WritePressure>,
    shared: Arc<ConnectionShared>,
}

impl<W> Writer<W>
where
    W: AsyncWrite + Send + Unpin + 'static,
{
    pub fn new(
        io: W,
        rx: mpsc::UnboundedReceiver<WriterCommand>,
        heartbeat: HeartBeat,
        pressure: Arc<WritePressure>,
        shared: Arc<ConnectionShared>,
    ) -> Self {
        Self {
            io,
            rx,
            heartbeat,
            pressure,
            shared,
        }
    }

    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.event_loop())
    }

    /// Writes the given frames and everything else already queued, then flushes once
    async fn write_batch(&mut self, first: Bytes) -> io::Result<Running> {
        let mut written = first.len();
        self.io.write_all(&first).await?;

        let mut running = Running::Continue;
        while let Ok(command) = self.rx.try_recv() {
            match command {
                WriterCommand::Write(frames) => {
                    self.io.write_all(&frames).await?;
                    written += frames.len();
                }
                WriterCommand::Shutdown => {
                    running = Running::Stop;
                    break;
                }
            }
        }

        self.io.flush().await?;
        self.pressure.written(written);
        Ok(running)
    }

    async fn on_heartbeat(&mut self) -> io::Result<Running> {
        self.io.write_all(&HEARTBEAT_FRAME).await?;
        self.io.flush().await?;
        Ok(Running::Continue)
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    async fn event_loop(mut self) {
        loop {
            let result = tokio::select! {
                command = self.rx.recv() => match command {
                    Some(WriterCommand::Write(frames)) => self.write_batch(frames).await,
                    Some(WriterCommand::Shutdown) | None => Ok(Running::Stop),
                },
                _ = self.heartbeat.next() => self.on_heartbeat().await,
            };

            match result {
                Ok(Running::Continue) => {}
                Ok(Running::Stop) => break,
                Err(err) => {
                    #[cfg(feature = "tracing")]
                    tracing::error!(error = ?err, "Failed to write to transport");
                    #[cfg(feature = "log")]
                    log::error!("Failed to write to transport: {:?}", err);

                    self.shared.shutdown(CloseReason::from(err));
                    return;
                }
            }
        }

        let _ = self.io.shutdown().await;
    }
}
