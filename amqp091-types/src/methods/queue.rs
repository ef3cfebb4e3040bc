//! Methods of the `queue` class (class-id 50)

use bytes::{BufMut, Bytes, BytesMut};

use super::{empty_method, MethodFields};
use crate::{
    definitions::MethodId,
    primitives::{
        bit, get_short_str, get_u16, get_u32, get_u8, pack_bits, put_short_str, FieldTable,
    },
    Error,
};

/// Class id of `queue`
pub const CLASS_ID: u16 = 50;

/// Creates a queue, or checks that it exists with `passive`
#[derive(Debug, Clone, PartialEq)]
pub struct Declare {
    /// Queue name, empty to let the server pick one
    pub queue: String,
    /// Only check for existence
    pub passive: bool,
    /// Survive a broker restart
    pub durable: bool,
    /// Only usable by this connection
    pub exclusive: bool,
    /// Delete once the last consumer is gone
    pub auto_delete: bool,
    /// Do not send a [`DeclareOk`]
    pub no_wait: bool,
    /// Extension arguments
    pub arguments: FieldTable,
}

impl MethodFields for Declare {
    const ID: MethodId = MethodId::new(CLASS_ID, 10);

    fn encode(&self, dst: &mut BytesMut) -> Result<(), Error> {
        dst.put_u16(0);
        put_short_str(dst, &self.queue)?;
        dst.put_u8(pack_bits(&[
            self.passive,
            self.durable,
            self.exclusive,
            self.auto_delete,
            self.no_wait,
        ]));
        self.arguments.encode(dst)
    }

    fn decode(src: &mut Bytes) -> Result<Self, Error> {
        let _ticket = get_u16(src)?;
        let queue = get_short_str(src)?;
        let bits = get_u8(src)?;
        Ok(Self {
            queue,
            passive: bit(bits, 0),
            durable: bit(bits, 1),
            exclusive: bit(bits, 2),
            auto_delete: bit(bits, 3),
            no_wait: bit(bits, 4),
            arguments: FieldTable::decode(src)?,
        })
    }
}

/// Reply to [`Declare`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclareOk {
    /// Queue name, as chosen by the server for an empty request
    pub queue: String,
    /// Messages ready in the queue
    pub message_count: u32,
    /// Active consumers of the queue
    pub consumer_count: u32,
}

impl MethodFields for DeclareOk {
    const ID: MethodId = MethodId::new(CLASS_ID, 11);

    fn encode(&self, dst: &mut BytesMut) -> Result<(), Error> {
        put_short_str(dst, &self.queue)?;
        dst.put_u32(self.message_count);
        dst.put_u32(self.consumer_count);
        Ok(())
    }

    fn decode(src: &mut Bytes) -> Result<Self, Error> {
        Ok(Self {
            queue: get_short_str(src)?,
            message_count: get_u32(src)?,
            consumer_count: get_u32(src)?,
        })
    }
}

/// Binds a queue to an exchange
#[derive(Debug, Clone, PartialEq)]
pub struct Bind {
    /// Queue name
    pub queue: String,
    /// Exchange name
    pub exchange: String,
    /// Binding key
    pub routing_key: String,
    /// Do not send a [`BindOk`]
    pub no_wait: bool,
    /// Extension arguments
    pub arguments: FieldTable,
}

impl MethodFields for Bind {
    const ID: MethodId = MethodId::new(CLASS_ID, 20);

    fn encode(&self, dst: &mut BytesMut) -> Result<(), Error> {
        dst.put_u16(0);
        put_short_str(dst, &self.queue)?;
        put_short_str(dst, &self.exchange)?;
        put_short_str(dst, &self.routing_key)?;
        dst.put_u8(self.no_wait as u8);
        self.arguments.encode(dst)
    }

    fn decode(src: &mut Bytes) -> Result<Self, Error> {
        let _ticket = get_u16(src)?;
        Ok(Self {
            queue: get_short_str(src)?,
            exchange: get_short_str(src)?,
            routing_key: get_short_str(src)?,
            no_wait: bit(get_u8(src)?, 0),
            arguments: FieldTable::decode(src)?,
        })
    }
}

empty_method!(
    /// Confirms a [`Bind`]
    BindOk,
    CLASS_ID,
    21
);

/// Removes all ready messages from a queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Purge {
    /// Queue name
    pub queue: String,
    /// Do not send a [`PurgeOk`]
    pub no_wait: bool,
}

impl MethodFields for Purge {
    const ID: MethodId = MethodId::new(CLASS_ID, 30);

    fn encode(&self, dst: &mut BytesMut) -> Result<(), Error> {
        dst.put_u16(0);
        put_short_str(dst, &self.queue)?;
        dst.put_u8(self.no_wait as u8);
        Ok(())
    }

    fn decode(src: &mut Bytes) -> Result<Self, Error> {
        let _ticket = get_u16(src)?;
        Ok(Self {
            queue: get_short_str(src)?,
            no_wait: bit(get_u8(src)?, 0),
        })
    }
}

/// Carries the count of messages removed by [`Purge`] or [`Delete`]
macro_rules! count_method {
    ($(#[$attr:meta])* $name:ident, $method_id:expr) => {
        $(#[$attr])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub struct $name {
            /// Number of messages removed
            pub message_count: u32,
        }

        impl MethodFields for $name {
            const ID: MethodId = MethodId::new(CLASS_ID, $method_id);

            fn encode(&self, dst: &mut BytesMut) -> Result<(), Error> {
                dst.put_u32(self.message_count);
                Ok(())
            }

            fn decode(src: &mut Bytes) -> Result<Self, Error> {
                Ok(Self {
                    message_count: get_u32(src)?,
                })
            }
        }
    };
}

count_method!(
    /// Reply to [`Purge`]
    PurgeOk,
    31
);

/// Deletes a queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delete {
    /// Queue name
    pub queue: String,
    /// Only delete when it has no consumers
    pub if_unused: bool,
    /// Only delete when it holds no messages
    pub if_empty: bool,
    /// Do not send a [`DeleteOk`]
    pub no_wait: bool,
}

impl MethodFields for Delete {
    const ID: MethodId = MethodId::new(CLASS_ID, 40);

    fn encode(&self, dst: &mut BytesMut) -> Result<(), Error> {
        dst.put_u16(0);
        put_short_str(dst, &self.queue)?;
        dst.put_u8(pack_bits(&[self.if_unused, self.if_empty, self.no_wait]));
        Ok(())
    }

    fn decode(src: &mut Bytes) -> Result<Self, Error> {
        let _ticket = get_u16(src)?;
        let queue = get_short_str(src)?;
        let bits = get_u8(src)?;
        Ok(Self {
            queue,
            if_unused: bit(bits, 0),
            if_empty: bit(bits, 1),
            no_wait: bit(bits, 2),
        })
    }
}

count_method!(
    /// Reply to [`Delete`]
    DeleteOk,
    41
);

/// Removes a queue binding
#[derive(Debug, Clone, PartialEq)]
pub struct Unbind {
    /// Queue name
    pub queue: String,
    /// Exchange name
    pub exchange: String,
    /// Binding key
    pub routing_key: String,
    /// Extension arguments
    pub arguments: FieldTable,
}

impl MethodFields for Unbind {
    const ID: MethodId = MethodId::new(CLASS_ID, 50);

    fn encode(&self, dst: &mut BytesMut) -> Result<(), Error> {
        dst.put_u16(0);
        put_short_str(dst, &self.queue)?;
        put_short_str(dst, &self.exchange)?;
        put_short_str(dst, &self.routing_key)?;
        self.arguments.encode(dst)
    }

    fn decode(src: &mut Bytes) -> Result<Self, Error> {
        let _ticket = get_u16(src)?;
        Ok(Self {
            queue: get_short_str(src)?,
            exchange: get_short_str(src)?,
            routing_key: get_short_str(src)?,
            arguments: FieldTable::decode(src)?,
        })
    }
}

empty_method!(
    /// Confirms an [`Unbind`]
    UnbindOk,
    CLASS_ID,
    51
);
