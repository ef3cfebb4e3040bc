//! Content header and the `basic` class properties

use bytes::{BufMut, Bytes, BytesMut};

use crate::{
    primitives::{get_short_str_lossy, get_u16, get_u64, get_u8, put_short_str, FieldTable},
    Error,
};

/// Class id of `basic`, the only class that carries content in 0-9-1
pub const BASIC_CLASS_ID: u16 = 60;

const CONTENT_TYPE: u16 = 1 << 15;
const CONTENT_ENCODING: u16 = 1 << 14;
const HEADERS: u16 = 1 << 13;
const DELIVERY_MODE: u16 = 1 << 12;
const PRIORITY: u16 = 1 << 11;
const CORRELATION_ID: u16 = 1 << 10;
const REPLY_TO: u16 = 1 << 9;
const EXPIRATION: u16 = 1 << 8;
const MESSAGE_ID: u16 = 1 << 7;
const TIMESTAMP: u16 = 1 << 6;
const TYPE: u16 = 1 << 5;
const USER_ID: u16 = 1 << 4;
const APP_ID: u16 = 1 << 3;
const CLUSTER_ID: u16 = 1 << 2;
const CONTINUATION: u16 = 1;

/// Delivery mode for transient messages
pub const DELIVERY_MODE_TRANSIENT: u8 = 1;

/// Delivery mode for persistent messages
pub const DELIVERY_MODE_PERSISTENT: u8 = 2;

/// Properties of a `basic` content
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BasicProperties {
    /// MIME content type
    pub content_type: Option<String>,

    /// MIME content encoding
    pub content_encoding: Option<String>,

    /// Application headers
    pub headers: Option<FieldTable>,

    /// 1 for transient, 2 for persistent
    pub delivery_mode: Option<u8>,

    /// Message priority, 0 to 9
    pub priority: Option<u8>,

    /// Application correlation identifier
    pub correlation_id: Option<String>,

    /// Address to reply to
    pub reply_to: Option<String>,

    /// Message expiration, in milliseconds as a string
    pub expiration: Option<String>,

    /// Application message identifier
    pub message_id: Option<String>,

    /// Message timestamp, seconds since the epoch
    pub timestamp: Option<u64>,

    /// Message type name
    pub message_type: Option<String>,

    /// Creating user id
    pub user_id: Option<String>,

    /// Creating application id
    pub app_id: Option<String>,

    /// Deprecated cluster id
    pub cluster_id: Option<String>,
}

impl BasicProperties {
    fn flags(&self) -> u16 {
        let mut flags = 0;
        let mut set = |present: bool, flag: u16| {
            if present {
                flags |= flag;
            }
        };
        set(self.content_type.is_some(), CONTENT_TYPE);
        set(self.content_encoding.is_some(), CONTENT_ENCODING);
        set(self.headers.is_some(), HEADERS);
        set(self.delivery_mode.is_some(), DELIVERY_MODE);
        set(self.priority.is_some(), PRIORITY);
        set(self.correlation_id.is_some(), CORRELATION_ID);
        set(self.reply_to.is_some(), REPLY_TO);
        set(self.expiration.is_some(), EXPIRATION);
        set(self.message_id.is_some(), MESSAGE_ID);
        set(self.timestamp.is_some(), TIMESTAMP);
        set(self.message_type.is_some(), TYPE);
        set(self.user_id.is_some(), USER_ID);
        set(self.app_id.is_some(), APP_ID);
        set(self.cluster_id.is_some(), CLUSTER_ID);
        flags
    }

    /// Writes the property flags followed by the present properties
    pub fn encode(&self, dst: &mut BytesMut) -> Result<(), Error> {
        dst.put_u16(self.flags());

        fn put_opt_str(dst: &mut BytesMut, value: &Option<String>) -> Result<(), Error> {
            match value {
                Some(value) => put_short_str(dst, value),
                None => Ok(()),
            }
        }

        put_opt_str(dst, &self.content_type)?;
        put_opt_str(dst, &self.content_encoding)?;
        if let Some(headers) = &self.headers {
            headers.encode(dst)?;
        }
        if let Some(mode) = self.delivery_mode {
            dst.put_u8(mode);
        }
        if let Some(priority) = self.priority {
            dst.put_u8(priority);
        }
        put_opt_str(dst, &self.correlation_id)?;
        put_opt_str(dst, &self.reply_to)?;
        put_opt_str(dst, &self.expiration)?;
        put_opt_str(dst, &self.message_id)?;
        if let Some(timestamp) = self.timestamp {
            dst.put_u64(timestamp);
        }
        put_opt_str(dst, &self.message_type)?;
        put_opt_str(dst, &self.user_id)?;
        put_opt_str(dst, &self.app_id)?;
        put_opt_str(dst, &self.cluster_id)?;
        Ok(())
    }

    /// Reads the property flags followed by the present properties
    pub fn decode(src: &mut Bytes) -> Result<Self, Error> {
        let flags = get_u16(src)?;
        if flags & CONTINUATION != 0 {
            return Err(Error::PropertyFlagsContinuation);
        }

        let opt_str = |src: &mut Bytes, flag: u16| -> Result<Option<String>, Error> {
            if flags & flag != 0 {
                get_short_str_lossy(src).map(Some)
            } else {
                Ok(None)
            }
        };

        let content_type = opt_str(src, CONTENT_TYPE)?;
        let content_encoding = opt_str(src, CONTENT_ENCODING)?;
        let headers = match flags & HEADERS {
            0 => None,
            _ => Some(FieldTable::decode(src)?),
        };
        let delivery_mode = match flags & DELIVERY_MODE {
            0 => None,
            _ => Some(get_u8(src)?),
        };
        let priority = match flags & PRIORITY {
            0 => None,
            _ => Some(get_u8(src)?),
        };
        let correlation_id = opt_str(src, CORRELATION_ID)?;
        let reply_to = opt_str(src, REPLY_TO)?;
        let expiration = opt_str(src, EXPIRATION)?;
        let message_id = opt_str(src, MESSAGE_ID)?;
        let timestamp = match flags & TIMESTAMP {
            0 => None,
            _ => Some(get_u64(src)?),
        };
        let message_type = opt_str(src, TYPE)?;
        let user_id = opt_str(src, USER_ID)?;
        let app_id = opt_str(src, APP_ID)?;
        let cluster_id = opt_str(src, CLUSTER_ID)?;

        Ok(Self {
            content_type,
            content_encoding,
            headers,
            delivery_mode,
            priority,
            correlation_id,
            reply_to,
            expiration,
            message_id,
            timestamp,
            message_type,
            user_id,
            app_id,
            cluster_id,
        })
    }
}

/// Payload of a content header frame
#[derive(Debug, Clone, PartialEq)]
pub struct ContentHeader {
    /// Class of the method that announced the content
    pub class_id: u16,

    /// Total size of the body frames that follow
    pub body_size: u64,

    /// Content properties
    pub properties: BasicProperties,
}

impl ContentHeader {
    /// Creates a header for a `basic` content
    pub fn basic(body_size: u64, properties: BasicProperties) -> Self {
        Self {
            class_id: BASIC_CLASS_ID,
            body_size,
            properties,
        }
    }

    /// Writes the header payload
    pub fn encode(&self, dst: &mut BytesMut) -> Result<(), Error> {
        dst.put_u16(self.class_id);
        dst.put_u16(0); // weight, unused
        dst.put_u64(self.body_size);
        self.properties.encode(dst)
    }

    /// Reads the header payload
    pub fn decode(src: &mut Bytes) -> Result<Self, Error> {
        let class_id = get_u16(src)?;
        let _weight = get_u16(src)?;
        let body_size = get_u64(src)?;
        let properties = BasicProperties::decode(src)?;
        Ok(Self {
            class_id,
            body_size,
            properties,
        })
    }
}
