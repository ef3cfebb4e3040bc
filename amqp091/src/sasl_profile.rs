//! SASL profiles offered in `connection.start-ok`

use amqp091_types::primitives::FieldTable;
use bytes::{BufMut, Bytes, BytesMut};
use percent_encoding::percent_decode_str;
use url::Url;

/// Mechanism name of [`SaslProfile::Plain`]
pub const PLAIN: &str = "PLAIN";

/// Mechanism name of [`SaslProfile::AmqPlain`]
pub const AMQPLAIN: &str = "AMQPLAIN";

/// Mechanism name of [`SaslProfile::External`]
pub const EXTERNAL: &str = "EXTERNAL";

/// Credentials presented during the handshake.
///
/// The engine only needs the mechanism name and the initial response; challenges are not
/// supported by any of these profiles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaslProfile {
    /// `PLAIN`, RFC 4616
    Plain {
        /// User name
        username: String,
        /// Password
        password: String,
    },

    /// `AMQPLAIN`, the RabbitMQ specific field table form
    AmqPlain {
        /// User name
        username: String,
        /// Password
        password: String,
    },

    /// `EXTERNAL`, the identity comes from the transport, e.g. a client certificate
    External,
}

impl Default for SaslProfile {
    fn default() -> Self {
        SaslProfile::Plain {
            username: String::from("guest"),
            password: String::from("guest"),
        }
    }
}

/// Decodes a percent-encoded url component, invalid UTF-8 is replaced
pub(crate) fn decode_component(component: &str) -> String {
    percent_decode_str(component).decode_utf8_lossy().into_owned()
}

impl<'a> TryFrom<&'a Url> for SaslProfile {
    type Error = ();

    fn try_from(value: &'a Url) -> Result<Self, Self::Error> {
        match (value.username(), value.password()) {
            ("", _) => Err(()),
            (username, password) => Ok(SaslProfile::Plain {
                username: decode_component(username),
                password: decode_component(password.unwrap_or_default()),
            }),
        }
    }
}

impl SaslProfile {
    /// Mechanism name as listed in `connection.start`
    pub fn mechanism(&self) -> &'static str {
        match self {
            SaslProfile::Plain { .. } => PLAIN,
            SaslProfile::AmqPlain { .. } => AMQPLAIN,
            SaslProfile::External => EXTERNAL,
        }
    }

    /// The response sent along with the selected mechanism
    pub fn response(&self) -> Bytes {
        match self {
            SaslProfile::Plain { username, password } => {
                let mut buf = BytesMut::with_capacity(username.len() + password.len() + 2);
                buf.put_u8(0);
                buf.put_slice(username.as_bytes());
                buf.put_u8(0);
                buf.put_slice(password.as_bytes());
                buf.freeze()
            }
            SaslProfile::AmqPlain { username, password } => {
                let table = FieldTable::new()
                    .with("LOGIN", username.as_str())
                    .with("PASSWORD", password.as_str());
                let mut buf = BytesMut::new();
                // Both keys are fixed short strings, values are long strings
                match table.encode_entries(&mut buf) {
                    Ok(()) => buf.freeze(),
                    Err(_) => Bytes::new(),
                }
            }
            SaslProfile::External => Bytes::new(),
        }
    }
}
