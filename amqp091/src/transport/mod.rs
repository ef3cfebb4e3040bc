//! Frame transport over any byte stream

use std::{task::Poll, time::Duration};

use amqp091_types::constants::PROTOCOL_HEADER;
use futures_util::{Future, Sink, Stream};
use pin_project_lite::pin_project;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio_util::codec::{Framed, FramedParts};

use crate::{
    frames::{Frame, FrameCodec},
    util::IdleTimeout,
};

mod error;
pub use error::Error;

pin_project! {
    /// Frame level transport.
    ///
    /// Reading resets the idle timeout. Once the timeout elapses the stream yields
    /// [`Error::IdleTimeout`].
    #[derive(Debug)]
    pub struct Transport<Io> {
        #[pin]
        framed: Framed<Io, FrameCodec>,
        #[pin]
        idle_timeout: Option<IdleTimeout>,
    }
}

impl<Io> Transport<Io>
where
    Io: AsyncRead + AsyncWrite + Unpin,
{
    /// Binds a stream. Frame-max stays at `frame_max` until tuning changes it.
    pub fn bind(io: Io, frame_max: u32) -> Self {
        Self {
            framed: Framed::new(io, FrameCodec::new(frame_max)),
            idle_timeout: None,
        }
    }

    /// Writes `AMQP 0 0 9 1`, the first bytes a client sends
    pub async fn send_protocol_header(&mut self) -> Result<(), Error> {
        let io = self.framed.get_mut();
        io.write_all(&PROTOCOL_HEADER).await?;
        io.flush().await?;
        Ok(())
    }

    /// Splits into a frame reader and the raw write half.
    ///
    /// Bytes that were already read but not decoded stay with the reader.
    pub fn into_split(self) -> (Transport<ReadHalf<Io>>, WriteHalf<Io>) {
        let parts = self.framed.into_parts();
        let (reader, writer) = tokio::io::split(parts.io);
        let mut read_parts = FramedParts::new::<Frame>(reader, parts.codec);
        read_parts.read_buf = parts.read_buf;

        let reader = Transport {
            framed: Framed::from_parts(read_parts),
            idle_timeout: self.idle_timeout,
        };
        (reader, writer)
    }
}

impl<Io> Transport<Io> {
    /// The codec in use
    pub fn codec(&self) -> &FrameCodec {
        self.framed.codec()
    }

    /// Changes frame-max once tuning is agreed
    pub fn set_frame_max(&mut self, frame_max: u32) -> &mut Self {
        self.framed.codec_mut().set_frame_max(frame_max);
        self
    }

    /// Sets the idle timeout, a zero duration disables it
    pub fn set_idle_timeout(&mut self, duration: Duration) -> &mut Self {
        self.idle_timeout = match duration.is_zero() {
            true => None,
            false => Some(IdleTimeout::new(duration)),
        };
        self
    }
}

impl<Io> Sink<Frame> for Transport<Io>
where
    Io: AsyncWrite + Unpin,
{
    type Error = Error;

    fn poll_ready(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> Poll<Result<(), Self::Error>> {
        let this = self.project();
        this.framed.poll_ready(cx).map_err(Into::into)
    }

    fn start_send(self: std::pin::Pin<&mut Self>, item: Frame) -> Result<(), Self::Error> {
        let this = self.project();
        this.framed.start_send(item).map_err(Into::into)
    }

    fn poll_flush(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> Poll<Result<(), Self::Error>> {
        let this = self.project();
        this.framed.poll_flush(cx).map_err(Into::into)
    }

    fn poll_close(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> Poll<Result<(), Self::Error>> {
        let this = self.project();
        this.framed.poll_close(cx).map_err(Into::into)
    }
}

impl<Io> Stream for Transport<Io>
where
    Io: AsyncRead + Unpin,
{
    type Item = Result<Frame, Error>;

    fn poll_next(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> Poll<Option<Self::Item>> {
        let this = self.project();

        match this.framed.poll_next(cx) {
            Poll::Ready(next) => {
                if let Some(mut delay) = this.idle_timeout.as_pin_mut() {
                    delay.reset();
                }
                Poll::Ready(next.map(|item| item.map_err(Into::into)))
            }
            Poll::Pending => {
                if let Some(delay) = this.idle_timeout.as_pin_mut() {
                    if let Poll::Ready(()) = delay.poll(cx) {
                        return Poll::Ready(Some(Err(Error::IdleTimeout)));
                    }
                }
                Poll::Pending
            }
        }
    }
}
