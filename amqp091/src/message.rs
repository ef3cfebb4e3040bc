//! Messages handed to the application

use amqp091_types::{methods::basic, properties::BasicProperties};
use bytes::Bytes;

/// A message delivered to a consumer or fetched with `get`
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    /// Channel scoped tag used to acknowledge the message
    pub delivery_tag: u64,

    /// The broker may have delivered this message before
    pub redelivered: bool,

    /// Exchange the message was published to
    pub exchange: String,

    /// Routing key used for the publish
    pub routing_key: String,

    /// Consumer the message was delivered to, empty for `get`
    pub consumer_tag: String,

    /// Messages left in the queue, only known for `get`
    pub message_count: Option<u32>,

    /// Content properties
    pub properties: BasicProperties,

    /// Message body
    pub body: Bytes,
}

impl Delivery {
    pub(crate) fn from_deliver(
        deliver: basic::Deliver,
        properties: BasicProperties,
        body: Bytes,
    ) -> Self {
        Self {
            delivery_tag: deliver.delivery_tag,
            redelivered: deliver.redelivered,
            exchange: deliver.exchange,
            routing_key: deliver.routing_key,
            consumer_tag: deliver.consumer_tag,
            message_count: None,
            properties,
            body,
        }
    }

    pub(crate) fn from_get_ok(get_ok: basic::GetOk, properties: BasicProperties, body: Bytes) -> Self {
        Self {
            delivery_tag: get_ok.delivery_tag,
            redelivered: get_ok.redelivered,
            exchange: get_ok.exchange,
            routing_key: get_ok.routing_key,
            consumer_tag: String::new(),
            message_count: Some(get_ok.message_count),
            properties,
            body,
        }
    }
}

/// A mandatory publish the broker could not route
#[derive(Debug, Clone, PartialEq)]
pub struct Returned {
    /// Why the message came back, e.g. 312 NO_ROUTE
    pub reply_code: u16,

    /// Human readable reason
    pub reply_text: String,

    /// Exchange the message was published to
    pub exchange: String,

    /// Routing key used for the publish
    pub routing_key: String,

    /// Content properties
    pub properties: BasicProperties,

    /// Message body
    pub body: Bytes,
}

impl Returned {
    pub(crate) fn new(ret: basic::Return, properties: BasicProperties, body: Bytes) -> Self {
        Self {
            reply_code: ret.reply_code,
            reply_text: ret.reply_text,
            exchange: ret.exchange,
            routing_key: ret.routing_key,
            properties,
            body,
        }
    }
}
