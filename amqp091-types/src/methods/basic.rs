//! Methods of the `basic` class (class-id 60)

use bytes::{BufMut, Bytes, BytesMut};

use super::{empty_method, MethodFields};
use crate::{
    definitions::MethodId,
    primitives::{
        bit, get_short_str, get_short_str_lossy, get_u16, get_u32, get_u64, get_u8, pack_bits,
        put_short_str, FieldTable,
    },
    properties::BASIC_CLASS_ID as CLASS_ID,
    Error,
};

/// Limits the unacknowledged deliveries the server pushes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Qos {
    /// Window size in octets, 0 means no limit
    pub prefetch_size: u32,
    /// Window size in messages, 0 means no limit
    pub prefetch_count: u16,
    /// Apply to the whole connection instead of each consumer
    pub global: bool,
}

impl MethodFields for Qos {
    const ID: MethodId = MethodId::new(CLASS_ID, 10);

    fn encode(&self, dst: &mut BytesMut) -> Result<(), Error> {
        dst.put_u32(self.prefetch_size);
        dst.put_u16(self.prefetch_count);
        dst.put_u8(self.global as u8);
        Ok(())
    }

    fn decode(src: &mut Bytes) -> Result<Self, Error> {
        Ok(Self {
            prefetch_size: get_u32(src)?,
            prefetch_count: get_u16(src)?,
            global: bit(get_u8(src)?, 0),
        })
    }
}

empty_method!(
    /// Confirms a [`Qos`]
    QosOk,
    CLASS_ID,
    11
);

/// Starts a consumer on a queue
#[derive(Debug, Clone, PartialEq)]
pub struct Consume {
    /// Queue name
    pub queue: String,
    /// Consumer tag, empty to let the server pick one
    pub consumer_tag: String,
    /// Do not deliver messages published on this connection
    pub no_local: bool,
    /// Deliveries are settled on send
    pub no_ack: bool,
    /// Be the only consumer of the queue
    pub exclusive: bool,
    /// Do not send a [`ConsumeOk`]
    pub no_wait: bool,
    /// Extension arguments
    pub arguments: FieldTable,
}

impl MethodFields for Consume {
    const ID: MethodId = MethodId::new(CLASS_ID, 20);

    fn encode(&self, dst: &mut BytesMut) -> Result<(), Error> {
        dst.put_u16(0);
        put_short_str(dst, &self.queue)?;
        put_short_str(dst, &self.consumer_tag)?;
        dst.put_u8(pack_bits(&[
            self.no_local,
            self.no_ack,
            self.exclusive,
            self.no_wait,
        ]));
        self.arguments.encode(dst)
    }

    fn decode(src: &mut Bytes) -> Result<Self, Error> {
        let _ticket = get_u16(src)?;
        let queue = get_short_str(src)?;
        let consumer_tag = get_short_str(src)?;
        let bits = get_u8(src)?;
        Ok(Self {
            queue,
            consumer_tag,
            no_local: bit(bits, 0),
            no_ack: bit(bits, 1),
            exclusive: bit(bits, 2),
            no_wait: bit(bits, 3),
            arguments: FieldTable::decode(src)?,
        })
    }
}

macro_rules! consumer_tag_method {
    ($(#[$attr:meta])* $name:ident, $method_id:expr) => {
        $(#[$attr])*
        #[derive(Debug, Clone, PartialEq, Eq)]
        pub struct $name {
            /// Consumer tag
            pub consumer_tag: String,
        }

        impl MethodFields for $name {
            const ID: MethodId = MethodId::new(CLASS_ID, $method_id);

            fn encode(&self, dst: &mut BytesMut) -> Result<(), Error> {
                put_short_str(dst, &self.consumer_tag)
            }

            fn decode(src: &mut Bytes) -> Result<Self, Error> {
                Ok(Self {
                    consumer_tag: get_short_str(src)?,
                })
            }
        }
    };
}

consumer_tag_method!(
    /// Reply to [`Consume`], carries the effective tag
    ConsumeOk,
    21
);

/// Ends a consumer. Also sent by the server when the queue goes away.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cancel {
    /// Consumer tag
    pub consumer_tag: String,
    /// Do not send a [`CancelOk`]
    pub no_wait: bool,
}

impl MethodFields for Cancel {
    const ID: MethodId = MethodId::new(CLASS_ID, 30);

    fn encode(&self, dst: &mut BytesMut) -> Result<(), Error> {
        put_short_str(dst, &self.consumer_tag)?;
        dst.put_u8(self.no_wait as u8);
        Ok(())
    }

    fn decode(src: &mut Bytes) -> Result<Self, Error> {
        Ok(Self {
            consumer_tag: get_short_str(src)?,
            no_wait: bit(get_u8(src)?, 0),
        })
    }
}

consumer_tag_method!(
    /// Confirms a [`Cancel`]
    CancelOk,
    31
);

/// Publishes a message, followed by content
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publish {
    /// Exchange name, empty for the default exchange
    pub exchange: String,
    /// Routing key
    pub routing_key: String,
    /// Return the message when it cannot be routed
    pub mandatory: bool,
    /// Return the message when it cannot be delivered right away
    pub immediate: bool,
}

impl MethodFields for Publish {
    const ID: MethodId = MethodId::new(CLASS_ID, 40);

    fn encode(&self, dst: &mut BytesMut) -> Result<(), Error> {
        dst.put_u16(0);
        put_short_str(dst, &self.exchange)?;
        put_short_str(dst, &self.routing_key)?;
        dst.put_u8(pack_bits(&[self.mandatory, self.immediate]));
        Ok(())
    }

    fn decode(src: &mut Bytes) -> Result<Self, Error> {
        let _ticket = get_u16(src)?;
        let exchange = get_short_str(src)?;
        let routing_key = get_short_str(src)?;
        let bits = get_u8(src)?;
        Ok(Self {
            exchange,
            routing_key,
            mandatory: bit(bits, 0),
            immediate: bit(bits, 1),
        })
    }
}

/// An undeliverable message sent back to the publisher, followed by content
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Return {
    /// Why the message came back, e.g. 312 NO_ROUTE
    pub reply_code: u16,
    /// Human readable reason
    pub reply_text: String,
    /// Exchange the message was published to
    pub exchange: String,
    /// Routing key used for the publish
    pub routing_key: String,
}

impl MethodFields for Return {
    const ID: MethodId = MethodId::new(CLASS_ID, 50);

    fn encode(&self, dst: &mut BytesMut) -> Result<(), Error> {
        dst.put_u16(self.reply_code);
        put_short_str(dst, &self.reply_text)?;
        put_short_str(dst, &self.exchange)?;
        put_short_str(dst, &self.routing_key)
    }

    fn decode(src: &mut Bytes) -> Result<Self, Error> {
        Ok(Self {
            reply_code: get_u16(src)?,
            reply_text: get_short_str_lossy(src)?,
            exchange: get_short_str_lossy(src)?,
            routing_key: get_short_str_lossy(src)?,
        })
    }
}

/// A message pushed to a consumer, followed by content
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deliver {
    /// Consumer the message is for
    pub consumer_tag: String,
    /// Channel scoped delivery tag
    pub delivery_tag: u64,
    /// The message may have been delivered before
    pub redelivered: bool,
    /// Exchange the message was published to
    pub exchange: String,
    /// Routing key used for the publish
    pub routing_key: String,
}

impl MethodFields for Deliver {
    const ID: MethodId = MethodId::new(CLASS_ID, 60);

    fn encode(&self, dst: &mut BytesMut) -> Result<(), Error> {
        put_short_str(dst, &self.consumer_tag)?;
        dst.put_u64(self.delivery_tag);
        dst.put_u8(self.redelivered as u8);
        put_short_str(dst, &self.exchange)?;
        put_short_str(dst, &self.routing_key)
    }

    fn decode(src: &mut Bytes) -> Result<Self, Error> {
        Ok(Self {
            consumer_tag: get_short_str(src)?,
            delivery_tag: get_u64(src)?,
            redelivered: bit(get_u8(src)?, 0),
            exchange: get_short_str_lossy(src)?,
            routing_key: get_short_str_lossy(src)?,
        })
    }
}

/// Fetches a single message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Get {
    /// Queue name
    pub queue: String,
    /// The message is settled on send
    pub no_ack: bool,
}

impl MethodFields for Get {
    const ID: MethodId = MethodId::new(CLASS_ID, 70);

    fn encode(&self, dst: &mut BytesMut) -> Result<(), Error> {
        dst.put_u16(0);
        put_short_str(dst, &self.queue)?;
        dst.put_u8(self.no_ack as u8);
        Ok(())
    }

    fn decode(src: &mut Bytes) -> Result<Self, Error> {
        let _ticket = get_u16(src)?;
        Ok(Self {
            queue: get_short_str(src)?,
            no_ack: bit(get_u8(src)?, 0),
        })
    }
}

/// Reply to [`Get`] with a message, followed by content
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetOk {
    /// Channel scoped delivery tag
    pub delivery_tag: u64,
    /// The message may have been delivered before
    pub redelivered: bool,
    /// Exchange the message was published to
    pub exchange: String,
    /// Routing key used for the publish
    pub routing_key: String,
    /// Messages still ready in the queue
    pub message_count: u32,
}

impl MethodFields for GetOk {
    const ID: MethodId = MethodId::new(CLASS_ID, 71);

    fn encode(&self, dst: &mut BytesMut) -> Result<(), Error> {
        dst.put_u64(self.delivery_tag);
        dst.put_u8(self.redelivered as u8);
        put_short_str(dst, &self.exchange)?;
        put_short_str(dst, &self.routing_key)?;
        dst.put_u32(self.message_count);
        Ok(())
    }

    fn decode(src: &mut Bytes) -> Result<Self, Error> {
        Ok(Self {
            delivery_tag: get_u64(src)?,
            redelivered: bit(get_u8(src)?, 0),
            exchange: get_short_str_lossy(src)?,
            routing_key: get_short_str_lossy(src)?,
            message_count: get_u32(src)?,
        })
    }
}

/// Reply to [`Get`] when the queue is empty
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GetEmpty;

impl MethodFields for GetEmpty {
    const ID: MethodId = MethodId::new(CLASS_ID, 72);

    fn encode(&self, dst: &mut BytesMut) -> Result<(), Error> {
        put_short_str(dst, "") // cluster-id, reserved
    }

    fn decode(src: &mut Bytes) -> Result<Self, Error> {
        let _cluster_id = get_short_str(src)?;
        Ok(Self)
    }
}

/// Acknowledges one delivery, or every delivery up to the tag with `multiple`.
///
/// The server sends it on a confirm channel to confirm publishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack {
    /// Delivery tag, 0 with `multiple` means all outstanding
    pub delivery_tag: u64,
    /// Covers every tag up to and including `delivery_tag`
    pub multiple: bool,
}

impl MethodFields for Ack {
    const ID: MethodId = MethodId::new(CLASS_ID, 80);

    fn encode(&self, dst: &mut BytesMut) -> Result<(), Error> {
        dst.put_u64(self.delivery_tag);
        dst.put_u8(self.multiple as u8);
        Ok(())
    }

    fn decode(src: &mut Bytes) -> Result<Self, Error> {
        Ok(Self {
            delivery_tag: get_u64(src)?,
            multiple: bit(get_u8(src)?, 0),
        })
    }
}

/// Rejects a single delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reject {
    /// Delivery tag
    pub delivery_tag: u64,
    /// Put the message back into the queue
    pub requeue: bool,
}

impl MethodFields for Reject {
    const ID: MethodId = MethodId::new(CLASS_ID, 90);

    fn encode(&self, dst: &mut BytesMut) -> Result<(), Error> {
        dst.put_u64(self.delivery_tag);
        dst.put_u8(self.requeue as u8);
        Ok(())
    }

    fn decode(src: &mut Bytes) -> Result<Self, Error> {
        Ok(Self {
            delivery_tag: get_u64(src)?,
            requeue: bit(get_u8(src)?, 0),
        })
    }
}

/// Asks the server to redeliver all unacknowledged messages of the channel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Recover {
    /// Requeue instead of redelivering to the same consumer
    pub requeue: bool,
}

impl MethodFields for Recover {
    const ID: MethodId = MethodId::new(CLASS_ID, 110);

    fn encode(&self, dst: &mut BytesMut) -> Result<(), Error> {
        dst.put_u8(self.requeue as u8);
        Ok(())
    }

    fn decode(src: &mut Bytes) -> Result<Self, Error> {
        Ok(Self {
            requeue: bit(get_u8(src)?, 0),
        })
    }
}

empty_method!(
    /// Confirms a [`Recover`]
    RecoverOk,
    CLASS_ID,
    111
);

/// Negative acknowledgement, the multi-message form of [`Reject`].
///
/// The server sends it on a confirm channel when it could not take a publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Nack {
    /// Delivery tag, 0 with `multiple` means all outstanding
    pub delivery_tag: u64,
    /// Covers every tag up to and including `delivery_tag`
    pub multiple: bool,
    /// Put the messages back into the queue
    pub requeue: bool,
}

impl MethodFields for Nack {
    const ID: MethodId = MethodId::new(CLASS_ID, 120);

    fn encode(&self, dst: &mut BytesMut) -> Result<(), Error> {
        dst.put_u64(self.delivery_tag);
        dst.put_u8(pack_bits(&[self.multiple, self.requeue]));
        Ok(())
    }

    fn decode(src: &mut Bytes) -> Result<Self, Error> {
        let delivery_tag = get_u64(src)?;
        let bits = get_u8(src)?;
        Ok(Self {
            delivery_tag,
            multiple: bit(bits, 0),
            requeue: bit(bits, 1),
        })
    }
}
