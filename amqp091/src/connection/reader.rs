//! The reader task, the only place inbound frames are demultiplexed

use std::{io, sync::Arc};

use amqp091_types::{
    constants::{CHANNEL_ERROR, COMMAND_INVALID, FRAME_ERROR, UNEXPECTED_FRAME},
    definitions::Exception,
    methods::{connection, Method},
};
use futures_util::StreamExt;
use tokio::io::AsyncRead;

use super::{handshake::close_for, ConnectionShared};
use crate::{
    channel::inner::Disposition,
    event::ConnectionEvent,
    frames::{self, Frame, FrameBody},
    transport::{self, Transport},
    util::Running,
    CloseReason,
};

#[derive(Debug)]
pub(crate) struct ConnectionEngine<R> {
    transport: Transport<R>,
    shared: Arc<ConnectionShared>,
}

impl<R> ConnectionEngine<R>
where
    R: AsyncRead + Send + Unpin + 'static,
{
    pub fn new(transport: Transport<R>, shared: Arc<ConnectionShared>) -> Self {
        Self { transport, shared }
    }

    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.event_loop())
    }

    fn on_incoming(&mut self, incoming: Option<Result<Frame, transport::Error>>) -> Running {
        match incoming {
            Some(Ok(frame)) => self.on_frame(frame),
            Some(Err(err)) => self.on_transport_error(err),
            None => {
                let reason = match self.shared.is_closing() {
                    true => CloseReason::Requested,
                    false => CloseReason::from(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "broker closed the stream",
                    )),
                };
                self.shared.shutdown(reason);
                Running::Stop
            }
        }
    }

    fn on_frame(&mut self, frame: Frame) -> Running {
        let Frame { channel, body } = frame;
        let result = match (channel, body) {
            (0, FrameBody::Heartbeat) => Ok(Running::Continue),
            (0, FrameBody::Method(method)) => self.on_connection_method(method),
            (0, body) => Err(Exception::new(
                UNEXPECTED_FRAME,
                format!("frame of type {} on channel 0", body.frame_type()),
            )),
            (channel, FrameBody::Heartbeat) => Err(Exception::new(
                FRAME_ERROR,
                format!("heartbeat frame on channel {}", channel),
            )),
            (channel, body) => self.on_channel_frame(channel, body),
        };

        match result {
            Ok(running) => running,
            Err(exception) => self.on_violation(exception),
        }
    }

    fn on_connection_method(&mut self, method: Method) -> Result<Running, Exception> {
        match method {
            Method::ConnectionClose(close) => {
                let exception = Exception {
                    reply_code: close.reply_code,
                    reply_text: close.reply_text,
                    class_id: close.class_id,
                    method_id: close.method_id,
                };
                let _ = self.shared.sender.send_method(0, connection::CloseOk);
                let reason = match self.shared.is_closing() && exception.is_success() {
                    true => CloseReason::Requested,
                    false => CloseReason::Remote(exception),
                };
                self.shared.shutdown(reason);
                Ok(Running::Stop)
            }
            Method::ConnectionCloseOk(_) if self.shared.is_closing() => {
                self.shared.shutdown(CloseReason::Requested);
                Ok(Running::Stop)
            }
            Method::ConnectionBlocked(blocked) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(reason = %blocked.reason, "Connection blocked by broker");
                #[cfg(feature = "log")]
                log::warn!("Connection blocked by broker: {}", blocked.reason);

                let _ = self
                    .shared
                    .events
                    .send(ConnectionEvent::Blocked(blocked.reason));
                Ok(Running::Continue)
            }
            Method::ConnectionUnblocked(_) => {
                #[cfg(feature = "tracing")]
                tracing::info!("Connection unblocked by broker");
                #[cfg(feature = "log")]
                log::info!("Connection unblocked by broker");

                let _ = self.shared.events.send(ConnectionEvent::Unblocked);
                Ok(Running::Continue)
            }
            other => Err(Exception::new(
                COMMAND_INVALID,
                format!("unexpected method {} on channel 0", other.id()),
            )
            .caused_by(other.id())),
        }
    }

    fn on_channel_frame(&mut self, id: u16, body: FrameBody) -> Result<Running, Exception> {
        // Once connection.close is sent only close and close-ok matter
        if self.shared.is_closing() {
            return Ok(Running::Continue);
        }

        let channel = self.shared.mux.lock().get(id).cloned().ok_or_else(|| {
            Exception::new(CHANNEL_ERROR, format!("frame on unknown channel {}", id))
        })?;
        let disposition = channel.lock().on_frame(body)?;
        if disposition == Disposition::Release {
            self.shared.mux.lock().remove(id);
        }
        Ok(Running::Continue)
    }

    fn on_transport_error(&mut self, err: transport::Error) -> Running {
        match err {
            transport::Error::IdleTimeout => {
                self.shared.shutdown(CloseReason::HeartbeatTimeout);
                Running::Stop
            }
            transport::Error::Frame(frames::Error::Io(err)) => {
                self.shared.shutdown(CloseReason::from(err));
                Running::Stop
            }
            transport::Error::Frame(err) => {
                let exception = err
                    .to_exception()
                    .unwrap_or_else(|| Exception::new(FRAME_ERROR, err.to_string()));
                self.on_violation(exception)
            }
        }
    }

    /// Closes the connection with `exception` without waiting for `close-ok`
    fn on_violation(&mut self, exception: Exception) -> Running {
        #[cfg(feature = "tracing")]
        tracing::error!(%exception, "Protocol violation");
        #[cfg(feature = "log")]
        log::error!("Protocol violation: {}", exception);

        let _ = self
            .shared
            .sender
            .send_method(0, close_for(exception.clone()));
        self.shared.shutdown(CloseReason::Local(exception));
        Running::Stop
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    async fn event_loop(mut self) {
        loop {
            let running = tokio::select! {
                _ = self.shared.stop.notified() => Running::Stop,
                incoming = self.transport.next() => self.on_incoming(incoming),
            };

            if let Running::Stop = running {
                break;
            }
        }
    }
}
