//! AMQP 0-9-1 frames and the codec translating them to and from bytes
//!
//! ```text
//! 0      1         3         7                  size+7 size+8
//! +------+---------+---------+ +-------------+ +-----------+
//! | type | channel |  size   | |   payload   | | frame-end |
//! +------+---------+---------+ +-------------+ +-----------+
//!  octet   short     long       'size' octets      0xCE
//! ```

use amqp091_types::{
    constants::{
        FRAME_BODY, FRAME_END, FRAME_HEADER, FRAME_HEADER_SIZE, FRAME_HEARTBEAT, FRAME_METHOD,
        FRAME_OVERHEAD,
    },
    methods::Method,
    properties::{BasicProperties, ContentHeader},
};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

mod error;
pub use error::Error;

/// A single frame on a channel
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Channel number, 0 for the connection itself
    pub channel: u16,

    /// Frame payload
    pub body: FrameBody,
}

impl Frame {
    /// A method frame
    pub fn method(channel: u16, method: impl Into<Method>) -> Self {
        Self {
            channel,
            body: FrameBody::Method(method.into()),
        }
    }

    /// A heartbeat frame, always on channel 0
    pub fn heartbeat() -> Self {
        Self {
            channel: 0,
            body: FrameBody::Heartbeat,
        }
    }
}

/// Payload of a [`Frame`]
#[derive(Debug, Clone, PartialEq)]
pub enum FrameBody {
    /// Method frame
    Method(Method),

    /// Content header frame
    Header(ContentHeader),

    /// Content body frame
    Body(Bytes),

    /// Heartbeat frame
    Heartbeat,
}

impl FrameBody {
    /// The frame type octet
    pub fn frame_type(&self) -> u8 {
        match self {
            FrameBody::Method(_) => FRAME_METHOD,
            FrameBody::Header(_) => FRAME_HEADER,
            FrameBody::Body(_) => FRAME_BODY,
            FrameBody::Heartbeat => FRAME_HEARTBEAT,
        }
    }
}

/// Translates frames to and from bytes, enforcing the negotiated frame-max in both directions.
///
/// The codec carries no state besides frame-max and may be cloned freely.
#[derive(Debug, Clone, Copy)]
pub struct FrameCodec {
    frame_max: usize,
}

impl FrameCodec {
    /// Creates a codec, a `frame_max` of 0 means no limit
    pub fn new(frame_max: u32) -> Self {
        Self {
            frame_max: frame_max as usize,
        }
    }

    /// Negotiated frame-max, 0 means no limit
    pub fn frame_max(&self) -> u32 {
        self.frame_max as u32
    }

    /// Changes frame-max once tuning is agreed
    pub fn set_frame_max(&mut self, frame_max: u32) {
        self.frame_max = frame_max as usize;
    }

    /// Largest body chunk that fits in a single body frame
    pub fn max_body_chunk(&self) -> usize {
        match self.frame_max {
            0 => usize::MAX,
            max => max.saturating_sub(FRAME_OVERHEAD).max(1),
        }
    }

    fn check_size(&self, payload_size: usize) -> Result<(), Error> {
        let size = payload_size + FRAME_OVERHEAD;
        if self.frame_max != 0 && size > self.frame_max {
            return Err(Error::FrameTooLarge {
                size,
                max: self.frame_max,
            });
        }
        Ok(())
    }

    /// Appends the encoded frame to `dst`. Nothing is written when the frame is rejected.
    pub fn encode_frame(&self, frame: &Frame, dst: &mut BytesMut) -> Result<(), Error> {
        let start = dst.len();
        dst.put_u8(frame.body.frame_type());
        dst.put_u16(frame.channel);
        dst.put_u32(0); // size, filled in below

        let result = match &frame.body {
            FrameBody::Method(method) => method.encode(dst).map_err(Into::into),
            FrameBody::Header(header) => header.encode(dst).map_err(Into::into),
            FrameBody::Body(body) => {
                dst.put_slice(body);
                Ok(())
            }
            FrameBody::Heartbeat => Ok(()),
        };
        let size = dst.len() - start - FRAME_HEADER_SIZE;
        if let Err(err) = result.and_then(|_| self.check_size(size)) {
            dst.truncate(start);
            return Err(err);
        }

        dst[start + 3..start + FRAME_HEADER_SIZE].copy_from_slice(&(size as u32).to_be_bytes());
        dst.put_u8(FRAME_END);
        Ok(())
    }

    /// Appends a method carrying content, its header and as many body frames as frame-max
    /// requires. An empty body produces no body frame.
    pub fn encode_content(
        &self,
        channel: u16,
        method: Method,
        properties: BasicProperties,
        body: &Bytes,
        dst: &mut BytesMut,
    ) -> Result<(), Error> {
        let start = dst.len();
        let header = ContentHeader::basic(body.len() as u64, properties);
        let result = self
            .encode_frame(&Frame::method(channel, method), dst)
            .and_then(|_| {
                let header = Frame {
                    channel,
                    body: FrameBody::Header(header),
                };
                self.encode_frame(&header, dst)
            });
        if let Err(err) = result {
            dst.truncate(start);
            return Err(err);
        }

        dst.reserve(body.len() + FRAME_OVERHEAD * body_frame_count(body.len(), self));
        for chunk in split_body(body, self.max_body_chunk()) {
            let frame = Frame {
                channel,
                body: FrameBody::Body(chunk),
            };
            self.encode_frame(&frame, dst)?;
        }
        Ok(())
    }
}

fn body_frame_count(len: usize, codec: &FrameCodec) -> usize {
    match codec.max_body_chunk() {
        usize::MAX => usize::from(len > 0),
        chunk => len.div_ceil(chunk),
    }
}

/// Splits a body into chunks of at most `max_chunk` bytes without copying
pub fn split_body(body: &Bytes, max_chunk: usize) -> impl Iterator<Item = Bytes> + '_ {
    let max_chunk = max_chunk.max(1);
    (0..body.len())
        .step_by(max_chunk)
        .map(move |start| body.slice(start..(start + max_chunk).min(body.len())))
}

impl Encoder<Frame> for FrameCodec {
    type Error = Error;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        self.encode_frame(&item, dst)
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // A server that does not accept our version answers with its own protocol header
        if src.first() == Some(&b'A') {
            if src.len() < 8 {
                return Ok(None);
            }
            let mut header = [0u8; 8];
            header.copy_from_slice(&src[..8]);
            src.advance(8);
            return Err(Error::ProtocolHeaderMismatch(header));
        }

        if src.len() < FRAME_HEADER_SIZE {
            return Ok(None);
        }
        let frame_type = src[0];
        let channel = u16::from_be_bytes([src[1], src[2]]);
        let size = u32::from_be_bytes([src[3], src[4], src[5], src[6]]) as usize;
        self.check_size(size)?;

        let total = size + FRAME_OVERHEAD;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        src.advance(FRAME_HEADER_SIZE);
        let mut payload = src.split_to(size).freeze();
        let frame_end = src.get_u8();
        if frame_end != FRAME_END {
            return Err(Error::MissingFrameEnd(frame_end));
        }

        let body = match frame_type {
            FRAME_METHOD => FrameBody::Method(Method::decode(&mut payload)?),
            FRAME_HEADER => FrameBody::Header(ContentHeader::decode(&mut payload)?),
            FRAME_BODY => FrameBody::Body(payload),
            FRAME_HEARTBEAT => FrameBody::Heartbeat,
            other => return Err(Error::UnknownFrameType(other)),
        };
        Ok(Some(Frame { channel, body }))
    }
}
