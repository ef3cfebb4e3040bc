//! Opening handshake, from the protocol header to `connection.open-ok`

use std::io;

use amqp091_types::{
    constants::{FRAME_MIN_SIZE, REPLY_SUCCESS},
    definitions::Exception,
    methods::{connection, Method},
};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};

use super::{Builder, Error};
use crate::{
    frames::{Frame, FrameBody},
    transport::Transport,
    CloseReason,
};

/// Parameters agreed with the broker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tuning {
    /// Highest channel number, never 0
    pub channel_max: u16,

    /// Largest frame in bytes, 0 means no limit
    pub frame_max: u32,

    /// Heartbeat interval in seconds, 0 means disabled
    pub heartbeat: u16,
}

/// A 0 on either side lets the other side decide, otherwise the lower value wins
fn negotiate<T>(client: T, server: T) -> T
where
    T: Ord + Default,
{
    let zero = T::default();
    if client == zero || server == zero {
        client.max(server)
    } else {
        client.min(server)
    }
}

impl Tuning {
    pub(crate) fn negotiate(builder: &Builder, tune: &connection::Tune) -> Self {
        let channel_max = match negotiate(builder.channel_max, tune.channel_max) {
            0 => u16::MAX,
            max => max,
        };
        let frame_max = match negotiate(builder.frame_max, tune.frame_max) {
            0 => 0,
            max => max.max(FRAME_MIN_SIZE),
        };
        Self {
            channel_max,
            frame_max,
            heartbeat: negotiate(builder.heartbeat, tune.heartbeat),
        }
    }
}

async fn recv_method<Io>(transport: &mut Transport<Io>) -> Result<Method, Error>
where
    Io: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        let frame = match transport.next().await {
            Some(frame) => frame?,
            None => {
                return Err(Error::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "broker closed the stream during handshake",
                )))
            }
        };

        match frame {
            Frame {
                body: FrameBody::Heartbeat,
                ..
            } => continue,
            Frame {
                channel: 0,
                body: FrameBody::Method(Method::ConnectionClose(close)),
            } => {
                let _ = transport
                    .send(Frame::method(0, connection::CloseOk))
                    .await;
                let exception = Exception {
                    reply_code: close.reply_code,
                    reply_text: close.reply_text,
                    class_id: close.class_id,
                    method_id: close.method_id,
                };
                return Err(Error::Closed(CloseReason::Remote(exception)));
            }
            Frame {
                channel: 0,
                body: FrameBody::Method(method),
            } => return Ok(method),
            Frame { channel, body } => {
                return Err(Error::UnexpectedFrame {
                    channel,
                    frame_type: body.frame_type(),
                })
            }
        }
    }
}

/// Runs the handshake on a transport that has just sent the protocol header
#[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
pub(crate) async fn handshake<Io>(
    transport: &mut Transport<Io>,
    builder: &Builder,
) -> Result<Tuning, Error>
where
    Io: AsyncRead + AsyncWrite + Unpin,
{
    let start = match recv_method(transport).await? {
        Method::ConnectionStart(start) => start,
        other => return Err(Error::UnexpectedMethod(other.id())),
    };

    #[cfg(feature = "tracing")]
    tracing::debug!(mechanisms = %start.mechanisms, "Received connection.start");
    #[cfg(feature = "log")]
    log::debug!("Received connection.start, mechanisms: {}", start.mechanisms);

    let mechanism = builder.sasl_profile.mechanism();
    if !start.mechanisms.split_whitespace().any(|m| m == mechanism) {
        return Err(Error::UnsupportedMechanism {
            mechanism,
            offered: start.mechanisms,
        });
    }

    let start_ok = connection::StartOk {
        client_properties: builder.client_properties.clone(),
        mechanism: mechanism.to_string(),
        response: builder.sasl_profile.response(),
        locale: builder.locale.clone(),
    };
    transport.send(Frame::method(0, start_ok)).await?;

    let tune = match recv_method(transport).await? {
        Method::ConnectionTune(tune) => tune,
        other => return Err(Error::UnexpectedMethod(other.id())),
    };
    let tuning = Tuning::negotiate(builder, &tune);

    #[cfg(feature = "tracing")]
    tracing::debug!(?tune, ?tuning, "Negotiated tuning");
    #[cfg(feature = "log")]
    log::debug!("Broker proposed {:?}, negotiated {:?}", tune, tuning);

    let tune_ok = connection::TuneOk {
        channel_max: tuning.channel_max,
        frame_max: tuning.frame_max,
        heartbeat: tuning.heartbeat,
    };
    transport.send(Frame::method(0, tune_ok)).await?;
    transport.set_frame_max(tuning.frame_max);

    let open = connection::Open {
        virtual_host: builder.vhost.clone(),
    };
    transport.send(Frame::method(0, open)).await?;

    match recv_method(transport).await? {
        Method::ConnectionOpenOk(_) => {}
        other => return Err(Error::UnexpectedMethod(other.id())),
    }

    #[cfg(feature = "tracing")]
    tracing::debug!(vhost = %builder.vhost, "Connection open");
    #[cfg(feature = "log")]
    log::debug!("Connection open on vhost {:?}", builder.vhost);

    Ok(tuning)
}

/// `connection.close` sent by the application
pub(crate) fn goodbye() -> connection::Close {
    connection::Close {
        reply_code: REPLY_SUCCESS,
        reply_text: String::from("Goodbye"),
        class_id: 0,
        method_id: 0,
    }
}

pub(crate) fn close_for(exception: Exception) -> connection::Close {
    connection::Close {
        reply_code: exception.reply_code,
        reply_text: exception.reply_text,
        class_id: exception.class_id,
        method_id: exception.method_id,
    }
}
