//! Methods of the `channel` class (class-id 20)

use bytes::{BufMut, Bytes, BytesMut};

use super::{empty_method, MethodFields};
use crate::{
    definitions::MethodId,
    primitives::{bit, get_long_bytes, get_short_str, get_u16, get_u8, put_long_str, put_short_str},
    Error,
};

/// Class id of `channel`
pub const CLASS_ID: u16 = 20;

/// Opens a channel
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Open;

impl MethodFields for Open {
    const ID: MethodId = MethodId::new(CLASS_ID, 10);

    fn encode(&self, dst: &mut BytesMut) -> Result<(), Error> {
        put_short_str(dst, "") // out-of-band, reserved
    }

    fn decode(src: &mut Bytes) -> Result<Self, Error> {
        let _out_of_band = get_short_str(src)?;
        Ok(Self)
    }
}

/// Signals that the channel is ready
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OpenOk;

impl MethodFields for OpenOk {
    const ID: MethodId = MethodId::new(CLASS_ID, 11);

    fn encode(&self, dst: &mut BytesMut) -> Result<(), Error> {
        put_long_str(dst, b""); // channel-id, reserved
        Ok(())
    }

    fn decode(src: &mut Bytes) -> Result<Self, Error> {
        let _channel_id = get_long_bytes(src)?;
        Ok(Self)
    }
}

macro_rules! flow_method {
    ($(#[$attr:meta])* $name:ident, $method_id:expr) => {
        $(#[$attr])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub struct $name {
            /// Whether content may flow
            pub active: bool,
        }

        impl MethodFields for $name {
            const ID: MethodId = MethodId::new(CLASS_ID, $method_id);

            fn encode(&self, dst: &mut BytesMut) -> Result<(), Error> {
                dst.put_u8(self.active as u8);
                Ok(())
            }

            fn decode(src: &mut Bytes) -> Result<Self, Error> {
                Ok(Self {
                    active: bit(get_u8(src)?, 0),
                })
            }
        }
    };
}

flow_method!(
    /// Asks the peer to pause or resume sending content
    Flow,
    20
);
flow_method!(
    /// Confirms a [`Flow`]
    FlowOk,
    21
);

/// Requests a channel shutdown, carrying the reason
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Close {
    /// Reply code, 200 for a normal shutdown
    pub reply_code: u16,
    /// Human readable reason
    pub reply_text: String,
    /// Class of the method that caused the failure, 0 if none
    pub class_id: u16,
    /// Method that caused the failure, 0 if none
    pub method_id: u16,
}

impl MethodFields for Close {
    const ID: MethodId = MethodId::new(CLASS_ID, 40);

    fn encode(&self, dst: &mut BytesMut) -> Result<(), Error> {
        dst.put_u16(self.reply_code);
        put_short_str(dst, &self.reply_text)?;
        dst.put_u16(self.class_id);
        dst.put_u16(self.method_id);
        Ok(())
    }

    fn decode(src: &mut Bytes) -> Result<Self, Error> {
        Ok(Self {
            reply_code: get_u16(src)?,
            reply_text: get_short_str(src)?,
            class_id: get_u16(src)?,
            method_id: get_u16(src)?,
        })
    }
}

empty_method!(
    /// Confirms a [`Close`]
    CloseOk,
    CLASS_ID,
    41
);
