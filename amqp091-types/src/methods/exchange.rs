//! Methods of the `exchange` class (class-id 40)

use bytes::{BufMut, Bytes, BytesMut};

use super::{empty_method, MethodFields};
use crate::{
    definitions::MethodId,
    primitives::{bit, get_short_str, get_u16, get_u8, pack_bits, put_short_str, FieldTable},
    Error,
};

/// Class id of `exchange`
pub const CLASS_ID: u16 = 40;

/// Creates an exchange, or checks that it exists with `passive`
#[derive(Debug, Clone, PartialEq)]
pub struct Declare {
    /// Exchange name
    pub exchange: String,
    /// Exchange type, e.g. `direct` or `topic`
    pub kind: String,
    /// Only check for existence
    pub passive: bool,
    /// Survive a broker restart
    pub durable: bool,
    /// Delete once the last binding is removed
    pub auto_delete: bool,
    /// Clients may not publish directly to it
    pub internal: bool,
    /// Do not send a [`DeclareOk`]
    pub no_wait: bool,
    /// Extension arguments
    pub arguments: FieldTable,
}

impl MethodFields for Declare {
    const ID: MethodId = MethodId::new(CLASS_ID, 10);

    fn encode(&self, dst: &mut BytesMut) -> Result<(), Error> {
        dst.put_u16(0);
        put_short_str(dst, &self.exchange)?;
        put_short_str(dst, &self.kind)?;
        dst.put_u8(pack_bits(&[
            self.passive,
            self.durable,
            self.auto_delete,
            self.internal,
            self.no_wait,
        ]));
        self.arguments.encode(dst)
    }

    fn decode(src: &mut Bytes) -> Result<Self, Error> {
        let _ticket = get_u16(src)?;
        let exchange = get_short_str(src)?;
        let kind = get_short_str(src)?;
        let bits = get_u8(src)?;
        Ok(Self {
            exchange,
            kind,
            passive: bit(bits, 0),
            durable: bit(bits, 1),
            auto_delete: bit(bits, 2),
            internal: bit(bits, 3),
            no_wait: bit(bits, 4),
            arguments: FieldTable::decode(src)?,
        })
    }
}

empty_method!(
    /// Confirms a [`Declare`]
    DeclareOk,
    CLASS_ID,
    11
);

/// Deletes an exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delete {
    /// Exchange name
    pub exchange: String,
    /// Only delete when it has no bindings
    pub if_unused: bool,
    /// Do not send a [`DeleteOk`]
    pub no_wait: bool,
}

impl MethodFields for Delete {
    const ID: MethodId = MethodId::new(CLASS_ID, 20);

    fn encode(&self, dst: &mut BytesMut) -> Result<(), Error> {
        dst.put_u16(0);
        put_short_str(dst, &self.exchange)?;
        dst.put_u8(pack_bits(&[self.if_unused, self.no_wait]));
        Ok(())
    }

    fn decode(src: &mut Bytes) -> Result<Self, Error> {
        let _ticket = get_u16(src)?;
        let exchange = get_short_str(src)?;
        let bits = get_u8(src)?;
        Ok(Self {
            exchange,
            if_unused: bit(bits, 0),
            no_wait: bit(bits, 1),
        })
    }
}

empty_method!(
    /// Confirms a [`Delete`]
    DeleteOk,
    CLASS_ID,
    21
);

macro_rules! binding_method {
    ($(#[$attr:meta])* $name:ident, $method_id:expr) => {
        $(#[$attr])*
        #[derive(Debug, Clone, PartialEq)]
        pub struct $name {
            /// Exchange receiving the routed messages
            pub destination: String,
            /// Exchange the messages are routed from
            pub source: String,
            /// Binding key
            pub routing_key: String,
            /// Do not wait for the reply
            pub no_wait: bool,
            /// Extension arguments
            pub arguments: FieldTable,
        }

        impl MethodFields for $name {
            const ID: MethodId = MethodId::new(CLASS_ID, $method_id);

            fn encode(&self, dst: &mut BytesMut) -> Result<(), Error> {
                dst.put_u16(0);
                put_short_str(dst, &self.destination)?;
                put_short_str(dst, &self.source)?;
                put_short_str(dst, &self.routing_key)?;
                dst.put_u8(self.no_wait as u8);
                self.arguments.encode(dst)
            }

            fn decode(src: &mut Bytes) -> Result<Self, Error> {
                let _ticket = get_u16(src)?;
                Ok(Self {
                    destination: get_short_str(src)?,
                    source: get_short_str(src)?,
                    routing_key: get_short_str(src)?,
                    no_wait: bit(get_u8(src)?, 0),
                    arguments: FieldTable::decode(src)?,
                })
            }
        }
    };
}

binding_method!(
    /// Binds an exchange to another exchange
    Bind,
    30
);
empty_method!(
    /// Confirms a [`Bind`]
    BindOk,
    CLASS_ID,
    31
);
binding_method!(
    /// Removes an exchange to exchange binding
    Unbind,
    40
);
empty_method!(
    /// Confirms an [`Unbind`]
    UnbindOk,
    CLASS_ID,
    51
);
