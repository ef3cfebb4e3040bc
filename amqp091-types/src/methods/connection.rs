//! Methods of the `connection` class (class-id 10)

use bytes::{BufMut, Bytes, BytesMut};

use super::{empty_method, MethodFields};
use crate::{
    definitions::MethodId,
    primitives::{
        get_long_bytes, get_long_str, get_short_str, get_u16, get_u32, get_u8, put_long_str,
        put_short_str, FieldTable,
    },
    Error,
};

/// Class id of `connection`
pub const CLASS_ID: u16 = 10;

/// Opens the handshake, sent by the server right after the protocol header
#[derive(Debug, Clone, PartialEq)]
pub struct Start {
    /// Protocol major version, 0
    pub version_major: u8,
    /// Protocol minor version, 9
    pub version_minor: u8,
    /// Properties describing the server
    pub server_properties: FieldTable,
    /// Space separated list of SASL mechanisms
    pub mechanisms: String,
    /// Space separated list of locales
    pub locales: String,
}

impl MethodFields for Start {
    const ID: MethodId = MethodId::new(CLASS_ID, 10);

    fn encode(&self, dst: &mut BytesMut) -> Result<(), Error> {
        dst.put_u8(self.version_major);
        dst.put_u8(self.version_minor);
        self.server_properties.encode(dst)?;
        put_long_str(dst, self.mechanisms.as_bytes());
        put_long_str(dst, self.locales.as_bytes());
        Ok(())
    }

    fn decode(src: &mut Bytes) -> Result<Self, Error> {
        Ok(Self {
            version_major: get_u8(src)?,
            version_minor: get_u8(src)?,
            server_properties: FieldTable::decode(src)?,
            mechanisms: get_long_str(src)?,
            locales: get_long_str(src)?,
        })
    }
}

/// Client answer to [`Start`] with the selected mechanism and its initial response
#[derive(Debug, Clone, PartialEq)]
pub struct StartOk {
    /// Properties describing the client
    pub client_properties: FieldTable,
    /// The selected SASL mechanism
    pub mechanism: String,
    /// Mechanism specific response, opaque binary data
    pub response: Bytes,
    /// The selected locale
    pub locale: String,
}

impl MethodFields for StartOk {
    const ID: MethodId = MethodId::new(CLASS_ID, 11);

    fn encode(&self, dst: &mut BytesMut) -> Result<(), Error> {
        self.client_properties.encode(dst)?;
        put_short_str(dst, &self.mechanism)?;
        put_long_str(dst, &self.response);
        put_short_str(dst, &self.locale)
    }

    fn decode(src: &mut Bytes) -> Result<Self, Error> {
        Ok(Self {
            client_properties: FieldTable::decode(src)?,
            mechanism: get_short_str(src)?,
            response: get_long_bytes(src)?,
            locale: get_short_str(src)?,
        })
    }
}

/// SASL challenge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Secure {
    /// Opaque challenge data
    pub challenge: Bytes,
}

impl MethodFields for Secure {
    const ID: MethodId = MethodId::new(CLASS_ID, 20);

    fn encode(&self, dst: &mut BytesMut) -> Result<(), Error> {
        put_long_str(dst, &self.challenge);
        Ok(())
    }

    fn decode(src: &mut Bytes) -> Result<Self, Error> {
        Ok(Self {
            challenge: get_long_bytes(src)?,
        })
    }
}

/// SASL response to a [`Secure`] challenge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecureOk {
    /// Opaque response data
    pub response: Bytes,
}

impl MethodFields for SecureOk {
    const ID: MethodId = MethodId::new(CLASS_ID, 21);

    fn encode(&self, dst: &mut BytesMut) -> Result<(), Error> {
        put_long_str(dst, &self.response);
        Ok(())
    }

    fn decode(src: &mut Bytes) -> Result<Self, Error> {
        Ok(Self {
            response: get_long_bytes(src)?,
        })
    }
}

macro_rules! tuning_method {
    ($(#[$attr:meta])* $name:ident, $method_id:expr) => {
        $(#[$attr])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub struct $name {
            /// Highest channel number, 0 means no limit
            pub channel_max: u16,
            /// Largest frame size including overhead, 0 means no limit
            pub frame_max: u32,
            /// Heartbeat interval in seconds, 0 disables heartbeats
            pub heartbeat: u16,
        }

        impl MethodFields for $name {
            const ID: MethodId = MethodId::new(CLASS_ID, $method_id);

            fn encode(&self, dst: &mut BytesMut) -> Result<(), Error> {
                dst.put_u16(self.channel_max);
                dst.put_u32(self.frame_max);
                dst.put_u16(self.heartbeat);
                Ok(())
            }

            fn decode(src: &mut Bytes) -> Result<Self, Error> {
                Ok(Self {
                    channel_max: get_u16(src)?,
                    frame_max: get_u32(src)?,
                    heartbeat: get_u16(src)?,
                })
            }
        }
    };
}

tuning_method!(
    /// Limits proposed by the server
    Tune,
    30
);
tuning_method!(
    /// Limits agreed by the client
    TuneOk,
    31
);

/// Opens a connection to a virtual host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Open {
    /// Name of the virtual host
    pub virtual_host: String,
}

impl MethodFields for Open {
    const ID: MethodId = MethodId::new(CLASS_ID, 40);

    fn encode(&self, dst: &mut BytesMut) -> Result<(), Error> {
        put_short_str(dst, &self.virtual_host)?;
        put_short_str(dst, "")?; // capabilities, reserved
        dst.put_u8(0); // insist, reserved
        Ok(())
    }

    fn decode(src: &mut Bytes) -> Result<Self, Error> {
        let virtual_host = get_short_str(src)?;
        let _capabilities = get_short_str(src)?;
        let _insist = get_u8(src)?;
        Ok(Self { virtual_host })
    }
}

/// Signals that the connection is ready
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OpenOk;

impl MethodFields for OpenOk {
    const ID: MethodId = MethodId::new(CLASS_ID, 41);

    fn encode(&self, dst: &mut BytesMut) -> Result<(), Error> {
        put_short_str(dst, "") // known-hosts, reserved
    }

    fn decode(src: &mut Bytes) -> Result<Self, Error> {
        let _known_hosts = get_short_str(src)?;
        Ok(Self)
    }
}

/// Requests a connection shutdown, carrying the reason
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
    const ID: MethodId = MethodId::new(CLASS_ID, 50);

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
    51
);

/// The server stopped reading from publishers of this connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blocked {
    /// Why the connection got blocked, e.g. a memory alarm
    pub reason: String,
}

impl MethodFields for Blocked {
    const ID: MethodId = MethodId::new(CLASS_ID, 60);

    fn encode(&self, dst: &mut BytesMut) -> Result<(), Error> {
        put_short_str(dst, &self.reason)
    }

    fn decode(src: &mut Bytes) -> Result<Self, Error> {
        Ok(Self {
            reason: get_short_str(src)?,
        })
    }
}

empty_method!(
    /// The server resumed reading
    Unblocked,
    CLASS_ID,
    61
);
