#![allow(dead_code)]

use std::time::Duration;

use amqp091::{
    frames::{Frame, FrameBody},
    transport::Transport,
    types::{
        constants::PROTOCOL_HEADER,
        methods::{channel, connection, Method},
        primitives::FieldTable,
        properties::{BasicProperties, ContentHeader},
    },
    Builder, Channel, Connection,
};
use bytes::{Bytes, BytesMut};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, DuplexStream};

/// A publish as seen by the broker
#[derive(Debug)]
pub struct Published {
    pub channel: u16,
    pub method: Method,
    pub properties: BasicProperties,
    pub body: Bytes,
    pub body_frames: usize,
}

/// Plays the broker side of a connection from a script
pub struct Broker {
    pub transport: Transport<DuplexStream>,
    pub start_ok: connection::StartOk,
    pub open: connection::Open,
}

impl Broker {
    pub async fn accept(mut io: DuplexStream, tune: connection::Tune) -> Self {
        let mut header = [0u8; 8];
        io.read_exact(&mut header).await.unwrap();
        assert_eq!(header, PROTOCOL_HEADER);

        let mut transport = Transport::bind(io, 0);
        let start = connection::Start {
            version_major: 0,
            version_minor: 9,
            server_properties: FieldTable::new().with("product", "scripted"),
            mechanisms: String::from("AMQPLAIN PLAIN"),
            locales: String::from("en_US"),
        };
        transport.send(Frame::method(0, start)).await.unwrap();

        let start_ok = match next_method(&mut transport).await {
            (0, Method::ConnectionStartOk(start_ok)) => start_ok,
            other => panic!("expected start-ok, got {:?}", other),
        };
        transport.send(Frame::method(0, tune)).await.unwrap();

        let tune_ok = match next_method(&mut transport).await {
            (0, Method::ConnectionTuneOk(tune_ok)) => tune_ok,
            other => panic!("expected tune-ok, got {:?}", other),
        };
        transport.set_frame_max(tune_ok.frame_max);

        let open = match next_method(&mut transport).await {
            (0, Method::ConnectionOpen(open)) => open,
            other => panic!("expected open, got {:?}", other),
        };
        transport
            .send(Frame::method(0, connection::OpenOk))
            .await
            .unwrap();

        Self {
            transport,
            start_ok,
            open,
        }
    }

    /// Next frame other than a heartbeat
    pub async fn recv(&mut self) -> Frame {
        loop {
            let frame = self.transport.next().await.unwrap().unwrap();
            if frame.body != FrameBody::Heartbeat {
                return frame;
            }
        }
    }

    pub async fn recv_method(&mut self) -> (u16, Method) {
        next_method(&mut self.transport).await
    }

    /// Expects a method on `channel`
    pub async fn expect(&mut self, channel: u16) -> Method {
        let (ch, method) = self.recv_method().await;
        assert_eq!(ch, channel, "method {:?} on the wrong channel", method);
        method
    }

    /// Asserts that nothing arrives for a while
    pub async fn expect_silence(&mut self) {
        let next = tokio::time::timeout(Duration::from_millis(50), self.recv()).await;
        assert!(next.is_err(), "unexpected frame {:?}", next);
    }

    pub async fn send(&mut self, channel: u16, method: impl Into<Method>) {
        self.transport
            .send(Frame::method(channel, method))
            .await
            .unwrap();
    }

    /// Sends a content carrying method with its header and a single body frame
    pub async fn send_content(
        &mut self,
        channel: u16,
        method: impl Into<Method>,
        properties: BasicProperties,
        body: &'static [u8],
    ) {
        self.send(channel, method).await;
        let header = ContentHeader::basic(body.len() as u64, properties);
        self.transport
            .send(Frame {
                channel,
                body: FrameBody::Header(header),
            })
            .await
            .unwrap();
        if !body.is_empty() {
            self.transport
                .send(Frame {
                    channel,
                    body: FrameBody::Body(Bytes::from_static(body)),
                })
                .await
                .unwrap();
        }
    }

    /// Reads a publish and reassembles its body
    pub async fn recv_publish(&mut self) -> Published {
        let (channel, method) = self.recv_method().await;
        assert!(matches!(method, Method::BasicPublish(_)), "{:?}", method);

        let header = match self.recv().await {
            Frame {
                body: FrameBody::Header(header),
                ..
            } => header,
            other => panic!("expected content header, got {:?}", other),
        };

        let mut body = BytesMut::new();
        let mut body_frames = 0;
        while (body.len() as u64) < header.body_size {
            match self.recv().await {
                Frame {
                    channel: ch,
                    body: FrameBody::Body(chunk),
                } if ch == channel => {
                    body.extend_from_slice(&chunk);
                    body_frames += 1;
                }
                other => panic!("expected body frame, got {:?}", other),
            }
        }

        Published {
            channel,
            method,
            properties: header.properties,
            body: body.freeze(),
            body_frames,
        }
    }
}

async fn next_method(transport: &mut Transport<DuplexStream>) -> (u16, Method) {
    loop {
        match transport.next().await.unwrap().unwrap() {
            Frame {
                body: FrameBody::Heartbeat,
                ..
            } => continue,
            Frame {
                channel,
                body: FrameBody::Method(method),
            } => return (channel, method),
            other => panic!("expected a method, got {:?}", other),
        }
    }
}

pub fn rabbit_tune() -> connection::Tune {
    connection::Tune {
        channel_max: 2047,
        frame_max: 131_072,
        heartbeat: 0,
    }
}

pub async fn connect_with(builder: Builder, tune: connection::Tune) -> (Connection, Broker) {
    let (client, server) = tokio::io::duplex(1024 * 1024);
    let (connection, broker) = tokio::join!(
        builder.open_with_stream(client),
        Broker::accept(server, tune)
    );
    (connection.unwrap(), broker)
}

pub async fn connect() -> (Connection, Broker) {
    connect_with(Builder::new(), rabbit_tune()).await
}

/// Opens the next channel, which the broker expects on `id`
pub async fn open_channel(connection: &Connection, broker: &mut Broker, id: u16) -> Channel {
    let (channel, ()) = tokio::join!(connection.create_channel(), async {
        assert_eq!(broker.expect(id).await, Method::ChannelOpen(channel::Open));
        broker.send(id, channel::OpenOk).await;
    });
    let channel = channel.unwrap();
    assert_eq!(channel.id(), id);
    channel
}
