//! Options of the channel operations.
//!
//! Convenience fields fold into the broker's `x-` arguments when the method is built. An entry
//! already present in `arguments` is overwritten by the matching convenience field.

use amqp091_types::{
    primitives::{FieldTable, FieldValue},
    properties::BasicProperties,
};

/// Persistent delivery mode
pub const PERSISTENT: u8 = 2;

fn put_opt(table: &mut FieldTable, key: &str, value: Option<impl Into<FieldValue>>) {
    if let Some(value) = value {
        table.insert(key, value);
    }
}

/// Options of [`Channel::assert_queue`](crate::Channel::assert_queue)
#[derive(Debug, Clone)]
pub struct AssertQueueOptions {
    /// Only the declaring connection may use the queue
    pub exclusive: bool,

    /// Survive a broker restart. Defaults to `true`
    pub durable: bool,

    /// Delete the queue once its last consumer is gone
    pub auto_delete: bool,

    /// Extra arguments
    pub arguments: FieldTable,

    /// `x-message-ttl` in milliseconds
    pub message_ttl: Option<u32>,

    /// `x-expires` in milliseconds
    pub expires: Option<u32>,

    /// `x-dead-letter-exchange`
    pub dead_letter_exchange: Option<String>,

    /// `x-dead-letter-routing-key`
    pub dead_letter_routing_key: Option<String>,

    /// `x-max-length`
    pub max_length: Option<u32>,

    /// `x-max-priority`
    pub max_priority: Option<u8>,
}

impl Default for AssertQueueOptions {
    fn default() -> Self {
        Self {
            exclusive: false,
            durable: true,
            auto_delete: false,
            arguments: FieldTable::new(),
            message_ttl: None,
            expires: None,
            dead_letter_exchange: None,
            dead_letter_routing_key: None,
            max_length: None,
            max_priority: None,
        }
    }
}

impl AssertQueueOptions {
    pub(crate) fn to_arguments(&self) -> FieldTable {
        let mut table = self.arguments.clone();
        put_opt(&mut table, "x-message-ttl", self.message_ttl.map(i64::from));
        put_opt(&mut table, "x-expires", self.expires.map(i64::from));
        put_opt(
            &mut table,
            "x-dead-letter-exchange",
            self.dead_letter_exchange.clone(),
        );
        put_opt(
            &mut table,
            "x-dead-letter-routing-key",
            self.dead_letter_routing_key.clone(),
        );
        put_opt(&mut table, "x-max-length", self.max_length.map(i64::from));
        put_opt(&mut table, "x-max-priority", self.max_priority.map(i64::from));
        table
    }
}

/// Options of [`Channel::delete_queue`](crate::Channel::delete_queue)
#[derive(Debug, Clone, Default)]
pub struct DeleteQueueOptions {
    /// Only delete the queue if it has no consumers
    pub if_unused: bool,

    /// Only delete the queue if it has no messages
    pub if_empty: bool,
}

/// Type of an exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExchangeType {
    /// `direct`
    Direct,

    /// `fanout`
    Fanout,

    /// `topic`
    Topic,

    /// `headers`
    Headers,

    /// `match`, an alias of `headers` on some brokers
    Match,

    /// Any other type provided by a broker plugin
    Custom(String),
}

impl ExchangeType {
    /// Name of the type on the wire
    pub fn as_str(&self) -> &str {
        match self {
            ExchangeType::Direct => "direct",
            ExchangeType::Fanout => "fanout",
            ExchangeType::Topic => "topic",
            ExchangeType::Headers => "headers",
            ExchangeType::Match => "match",
            ExchangeType::Custom(kind) => kind,
        }
    }
}

impl From<&str> for ExchangeType {
    fn from(kind: &str) -> Self {
        match kind {
            "direct" => ExchangeType::Direct,
            "fanout" => ExchangeType::Fanout,
            "topic" => ExchangeType::Topic,
            "headers" => ExchangeType::Headers,
            "match" => ExchangeType::Match,
            other => ExchangeType::Custom(other.to_string()),
        }
    }
}

/// Options of [`Channel::assert_exchange`](crate::Channel::assert_exchange)
#[derive(Debug, Clone)]
pub struct AssertExchangeOptions {
    /// Survive a broker restart. Defaults to `true`
    pub durable: bool,

    /// Only reachable through exchange-to-exchange bindings
    pub internal: bool,

    /// Delete the exchange once its last binding is gone
    pub auto_delete: bool,

    /// `alternate-exchange`, receives what this exchange cannot route
    pub alternate_exchange: Option<String>,

    /// Extra arguments
    pub arguments: FieldTable,
}

impl Default for AssertExchangeOptions {
    fn default() -> Self {
        Self {
            durable: true,
            internal: false,
            auto_delete: false,
            alternate_exchange: None,
            arguments: FieldTable::new(),
        }
    }
}

impl AssertExchangeOptions {
    pub(crate) fn to_arguments(&self) -> FieldTable {
        let mut table = self.arguments.clone();
        put_opt(
            &mut table,
            "alternate-exchange",
            self.alternate_exchange.clone(),
        );
        table
    }
}

/// Options of [`Channel::delete_exchange`](crate::Channel::delete_exchange)
#[derive(Debug, Clone, Default)]
pub struct DeleteExchangeOptions {
    /// Only delete the exchange if it has no bindings
    pub if_unused: bool,
}

/// Options of [`Channel::publish`](crate::Channel::publish)
#[derive(Debug, Clone, Default)]
pub struct PublishOptions {
    /// Return the message if it cannot be routed to any queue
    pub mandatory: bool,

    /// Sets delivery mode 2 unless `properties` already carries a delivery mode
    pub persistent: bool,

    /// Extra routing keys, sent as the `CC` header
    pub cc: Vec<String>,

    /// Extra routing keys, sent as the `BCC` header which the broker strips
    pub bcc: Vec<String>,

    /// Message properties
    pub properties: BasicProperties,
}

impl PublishOptions {
    pub(crate) fn into_properties(self) -> BasicProperties {
        let mut properties = self.properties;
        if self.persistent && properties.delivery_mode.is_none() {
            properties.delivery_mode = Some(PERSISTENT);
        }

        let mut headers = properties.headers.take().unwrap_or_default();
        for (key, keys) in [("CC", self.cc), ("BCC", self.bcc)] {
            if !keys.is_empty() {
                let keys = keys.into_iter().map(FieldValue::from).collect::<Vec<_>>();
                headers.insert(key, keys);
            }
        }
        properties.headers = (!headers.is_empty()).then_some(headers);
        properties
    }
}

/// Options of [`Channel::consume`](crate::Channel::consume)
#[derive(Debug, Clone, Default)]
pub struct ConsumeOptions {
    /// Tag of the consumer, the broker generates one when empty
    pub consumer_tag: String,

    /// Do not receive messages published on this connection
    pub no_local: bool,

    /// Deliveries are settled as soon as the broker sends them
    pub no_ack: bool,

    /// Be the only consumer of the queue
    pub exclusive: bool,

    /// `x-priority`
    pub priority: Option<i32>,

    /// Extra arguments
    pub arguments: FieldTable,
}

impl ConsumeOptions {
    pub(crate) fn to_arguments(&self) -> FieldTable {
        let mut table = self.arguments.clone();
        put_opt(&mut table, "x-priority", self.priority);
        table
    }
}

/// Options of [`Channel::get`](crate::Channel::get)
#[derive(Debug, Clone, Default)]
pub struct GetOptions {
    /// The message is settled as soon as the broker sends it
    pub no_ack: bool,
}
