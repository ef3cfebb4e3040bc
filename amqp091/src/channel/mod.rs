//! Channels multiplexed over a connection

use std::sync::Arc;

use amqp091_types::{
    methods::{basic, channel, confirm, exchange, queue, Method},
    primitives::FieldTable,
};
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;

mod consumer;
mod error;
pub(crate) mod inner;
pub(crate) mod rpc;

pub use consumer::Consumer;
pub use error::Error;
pub use inner::ChannelState;

use self::{
    inner::{ChannelInner, Hook},
    rpc::RpcReply,
};
use crate::{
    event::{ChannelEvent, EventSlot, Events},
    flow::Prefetch,
    ledger::PublishConfirm,
    message::Delivery,
    options::{
        AssertExchangeOptions, AssertQueueOptions, ConsumeOptions, DeleteExchangeOptions,
        DeleteQueueOptions, ExchangeType, GetOptions, PublishOptions,
    },
    CloseReason,
};

macro_rules! expect_reply {
    ($reply:expr, $variant:ident) => {
        match $reply {
            RpcReply::Method(Method::$variant(ok)) => Ok(ok),
            other => Err(Error::ProtocolViolation(format!(
                "unexpected reply {:?}",
                other
            ))),
        }
    };
}

/// A channel on an open connection.
///
/// Synchronous operations on one channel are queued and sent one at a time, so a channel can be
/// cloned and shared freely. Asynchronous operations (`publish`, `ack`, `nack`, `reject`) are
/// written right away.
#[derive(Debug, Clone)]
pub struct Channel {
    id: u16,
    inner: Arc<Mutex<ChannelInner>>,
    events: Arc<EventSlot<ChannelEvent>>,
}

impl Channel {
    pub(crate) fn new(
        id: u16,
        inner: Arc<Mutex<ChannelInner>>,
        events: EventSlot<ChannelEvent>,
    ) -> Self {
        Self {
            id,
            inner,
            events: Arc::new(events),
        }
    }

    /// Channel number
    pub fn id(&self) -> u16 {
        self.id
    }

    /// Current state
    pub fn state(&self) -> ChannelState {
        self.inner.lock().state()
    }

    /// Takes the event stream. Only the first call returns `Some`.
    pub fn take_events(&self) -> Option<Events<ChannelEvent>> {
        self.events.take()
    }

    /// Delivery tags received but not yet settled, in increasing order
    pub fn outstanding_deliveries(&self) -> Vec<u64> {
        self.inner.lock().outstanding_deliveries()
    }

    /// Deliveries the broker may still push to the whole channel before reaching the global
    /// prefetch count, `None` when unlimited
    pub fn prefetch_credit(&self) -> Option<u16> {
        self.inner.lock().prefetch_credit()
    }

    /// Deliveries the broker may still push to one consumer before reaching the per-consumer
    /// prefetch count it started with, `None` when unlimited or unknown
    pub fn consumer_prefetch_credit(&self, consumer_tag: &str) -> Option<u16> {
        self.inner.lock().consumer_prefetch_credit(consumer_tag)
    }

    async fn call(&self, method: impl Into<Method>, hook: Hook) -> Result<RpcReply, Error> {
        let rx = self.inner.lock().submit(method.into(), hook)?;
        match rx.await {
            Ok(result) => result,
            Err(_) => Err(Error::ConnectionClosed(CloseReason::engine_stopped())),
        }
    }

    pub(crate) async fn open(&self) -> Result<(), Error> {
        let reply = self.call(channel::Open, Hook::Open).await?;
        expect_reply!(reply, ChannelOpenOk).map(|_| ())
    }

    pub(crate) async fn confirm_select(&self) -> Result<(), Error> {
        let select = confirm::Select { no_wait: false };
        let reply = self.call(select, Hook::ConfirmSelect).await?;
        expect_reply!(reply, ConfirmSelectOk).map(|_| ())
    }

    /// Closes the channel and waits for the broker to confirm.
    ///
    /// Pending synchronous operations fail with [`Error::ChannelClosed`].
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all, fields(channel = self.id)))]
    pub async fn close(&self) -> Result<(), Error> {
        let rx = self.inner.lock().close()?;
        match rx.await {
            Ok(result) => result,
            Err(_) => Err(Error::ConnectionClosed(CloseReason::engine_stopped())),
        }
    }

    /* ---------------------------------- queues ----------------------------------- */

    /// Declares a queue, an empty name lets the broker choose one
    pub async fn assert_queue(
        &self,
        queue: &str,
        options: AssertQueueOptions,
    ) -> Result<queue::DeclareOk, Error> {
        let declare = queue::Declare {
            queue: queue.to_string(),
            passive: false,
            durable: options.durable,
            exclusive: options.exclusive,
            auto_delete: options.auto_delete,
            no_wait: false,
            arguments: options.to_arguments(),
        };
        let reply = self.call(declare, Hook::None).await?;
        expect_reply!(reply, QueueDeclareOk)
    }

    /// Checks that a queue exists. The broker closes the channel if it does not.
    pub async fn check_queue(&self, queue: &str) -> Result<queue::DeclareOk, Error> {
        let declare = queue::Declare {
            queue: queue.to_string(),
            passive: true,
            durable: false,
            exclusive: false,
            auto_delete: false,
            no_wait: false,
            arguments: FieldTable::new(),
        };
        let reply = self.call(declare, Hook::None).await?;
        expect_reply!(reply, QueueDeclareOk)
    }

    pub async fn delete_queue(
        &self,
        queue: &str,
        options: DeleteQueueOptions,
    ) -> Result<queue::DeleteOk, Error> {
        let delete = queue::Delete {
            queue: queue.to_string(),
            if_unused: options.if_unused,
            if_empty: options.if_empty,
            no_wait: false,
        };
        let reply = self.call(delete, Hook::None).await?;
        expect_reply!(reply, QueueDeleteOk)
    }

    pub async fn purge_queue(&self, queue: &str) -> Result<queue::PurgeOk, Error> {
        let purge = queue::Purge {
            queue: queue.to_string(),
            no_wait: false,
        };
        let reply = self.call(purge, Hook::None).await?;
        expect_reply!(reply, QueuePurgeOk)
    }

    pub async fn bind_queue(
        &self,
        queue: &str,
        source: &str,
        pattern: &str,
        arguments: FieldTable,
    ) -> Result<(), Error> {
        let bind = queue::Bind {
            queue: queue.to_string(),
            exchange: source.to_string(),
            routing_key: pattern.to_string(),
            no_wait: false,
            arguments,
        };
        let reply = self.call(bind, Hook::None).await?;
        expect_reply!(reply, QueueBindOk).map(|_| ())
    }

    pub async fn unbind_queue(
        &self,
        queue: &str,
        source: &str,
        pattern: &str,
        arguments: FieldTable,
    ) -> Result<(), Error> {
        let unbind = queue::Unbind {
            queue: queue.to_string(),
            exchange: source.to_string(),
            routing_key: pattern.to_string(),
            arguments,
        };
        let reply = self.call(unbind, Hook::None).await?;
        expect_reply!(reply, QueueUnbindOk).map(|_| ())
    }

    /* --------------------------------- exchanges --------------------------------- */

    pub async fn assert_exchange(
        &self,
        exchange: &str,
        kind: impl Into<ExchangeType>,
        options: AssertExchangeOptions,
    ) -> Result<(), Error> {
        let declare = exchange::Declare {
            exchange: exchange.to_string(),
            kind: kind.into().as_str().to_string(),
            passive: false,
            durable: options.durable,
            auto_delete: options.auto_delete,
            internal: options.internal,
            no_wait: false,
            arguments: options.to_arguments(),
        };
        let reply = self.call(declare, Hook::None).await?;
        expect_reply!(reply, ExchangeDeclareOk).map(|_| ())
    }

    /// Checks that an exchange exists. The broker closes the channel if it does not.
    pub async fn check_exchange(&self, exchange: &str) -> Result<(), Error> {
        let declare = exchange::Declare {
            exchange: exchange.to_string(),
            kind: String::new(),
            passive: true,
            durable: false,
            auto_delete: false,
            internal: false,
            no_wait: false,
            arguments: FieldTable::new(),
        };
        let reply = self.call(declare, Hook::None).await?;
        expect_reply!(reply, ExchangeDeclareOk).map(|_| ())
    }

    pub async fn delete_exchange(
        &self,
        exchange: &str,
        options: DeleteExchangeOptions,
    ) -> Result<(), Error> {
        let delete = exchange::Delete {
            exchange: exchange.to_string(),
            if_unused: options.if_unused,
            no_wait: false,
        };
        let reply = self.call(delete, Hook::None).await?;
        expect_reply!(reply, ExchangeDeleteOk).map(|_| ())
    }

    pub async fn bind_exchange(
        &self,
        destination: &str,
        source: &str,
        pattern: &str,
        arguments: FieldTable,
    ) -> Result<(), Error> {
        let bind = exchange::Bind {
            destination: destination.to_string(),
            source: source.to_string(),
            routing_key: pattern.to_string(),
            no_wait: false,
            arguments,
        };
        let reply = self.call(bind, Hook::None).await?;
        expect_reply!(reply, ExchangeBindOk).map(|_| ())
    }

    pub async fn unbind_exchange(
        &self,
        destination: &str,
        source: &str,
        pattern: &str,
        arguments: FieldTable,
    ) -> Result<(), Error> {
        let unbind = exchange::Unbind {
            destination: destination.to_string(),
            source: source.to_string(),
            routing_key: pattern.to_string(),
            no_wait: false,
            arguments,
        };
        let reply = self.call(unbind, Hook::None).await?;
        expect_reply!(reply, ExchangeUnbindOk).map(|_| ())
    }

    /* --------------------------------- messages ---------------------------------- */

    fn publish_inner(
        &self,
        exchange: &str,
        routing_key: &str,
        body: Bytes,
        options: PublishOptions,
    ) -> Result<(bool, Option<PublishConfirm>), Error> {
        let publish = basic::Publish {
            exchange: exchange.to_string(),
            routing_key: routing_key.to_string(),
            mandatory: options.mandatory,
            immediate: false,
        };
        self.inner
            .lock()
            .publish(publish, options.into_properties(), &body)
    }

    /// Publishes a message without waiting.
    ///
    /// Returns `false` when the connection's write buffer is above the high-water mark. The
    /// caller should then hold off until the channel raises [`ChannelEvent::Drain`].
    pub fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        body: impl Into<Bytes>,
        options: PublishOptions,
    ) -> Result<bool, Error> {
        self.publish_inner(exchange, routing_key, body.into(), options)
            .map(|(keep_going, _)| keep_going)
    }

    /// Publishes to `queue` through the default exchange
    pub fn send_to_queue(
        &self,
        queue: &str,
        body: impl Into<Bytes>,
        options: PublishOptions,
    ) -> Result<bool, Error> {
        self.publish("", queue, body, options)
    }

    /// Starts a consumer on `queue`
    pub async fn consume(&self, queue: &str, options: ConsumeOptions) -> Result<Consumer, Error> {
        let (tx, rx) = mpsc::unbounded_channel();
        let consume = basic::Consume {
            queue: queue.to_string(),
            consumer_tag: options.consumer_tag.clone(),
            no_local: options.no_local,
            no_ack: options.no_ack,
            exclusive: options.exclusive,
            no_wait: false,
            arguments: options.to_arguments(),
        };
        let hook = Hook::Consume {
            deliveries: tx,
            no_ack: options.no_ack,
        };
        let reply = self.call(consume, hook).await?;
        let ok = expect_reply!(reply, BasicConsumeOk)?;
        Ok(Consumer::new(ok.consumer_tag, rx))
    }

    /// Cancels a consumer, its stream ends once the broker confirms
    pub async fn cancel(&self, consumer_tag: &str) -> Result<basic::CancelOk, Error> {
        let cancel = basic::Cancel {
            consumer_tag: consumer_tag.to_string(),
            no_wait: false,
        };
        let reply = self.call(cancel, Hook::Cancel).await?;
        expect_reply!(reply, BasicCancelOk)
    }

    /// Fetches a single message, `None` if the queue is empty
    pub async fn get(&self, queue: &str, options: GetOptions) -> Result<Option<Delivery>, Error> {
        let get = basic::Get {
            queue: queue.to_string(),
            no_ack: options.no_ack,
        };
        let hook = Hook::Get {
            no_ack: options.no_ack,
        };
        match self.call(get, hook).await? {
            RpcReply::Delivery(delivery) => Ok(Some(delivery)),
            RpcReply::Method(Method::BasicGetEmpty(_)) => Ok(None),
            other => Err(Error::ProtocolViolation(format!(
                "unexpected reply {:?}",
                other
            ))),
        }
    }

    /// Acknowledges `delivery_tag`, and with `all_up_to` every outstanding tag below it.
    ///
    /// An unknown tag closes the channel with `PRECONDITION_FAILED`.
    pub fn ack(&self, delivery_tag: u64, all_up_to: bool) -> Result<(), Error> {
        let ack = basic::Ack {
            delivery_tag,
            multiple: all_up_to,
        };
        self.inner.lock().settle(delivery_tag, all_up_to, ack.into())
    }

    /// Acknowledges every outstanding delivery
    pub fn ack_all(&self) -> Result<(), Error> {
        let ack = basic::Ack {
            delivery_tag: 0,
            multiple: true,
        };
        self.inner.lock().settle_all(ack.into())
    }

    /// Rejects `delivery_tag`, and with `all_up_to` every outstanding tag below it
    pub fn nack(&self, delivery_tag: u64, all_up_to: bool, requeue: bool) -> Result<(), Error> {
        let nack = basic::Nack {
            delivery_tag,
            multiple: all_up_to,
            requeue,
        };
        self.inner.lock().settle(delivery_tag, all_up_to, nack.into())
    }

    /// Rejects every outstanding delivery
    pub fn nack_all(&self, requeue: bool) -> Result<(), Error> {
        let nack = basic::Nack {
            delivery_tag: 0,
            multiple: true,
            requeue,
        };
        self.inner.lock().settle_all(nack.into())
    }

    /// Rejects a single delivery
    pub fn reject(&self, delivery_tag: u64, requeue: bool) -> Result<(), Error> {
        let reject = basic::Reject {
            delivery_tag,
            requeue,
        };
        self.inner.lock().settle(delivery_tag, false, reject.into())
    }

    /// Limits the unacknowledged deliveries of each new consumer, or of the whole channel with
    /// `global`. A count of 0 means unlimited.
    pub async fn prefetch(&self, count: u16, global: bool) -> Result<(), Error> {
        let qos = basic::Qos {
            prefetch_size: 0,
            prefetch_count: count,
            global,
        };
        let reply = self.call(qos, Hook::Qos(Prefetch { count, global })).await?;
        expect_reply!(reply, BasicQosOk).map(|_| ())
    }

    /// Asks the broker to redeliver every unacknowledged delivery of this channel.
    ///
    /// Deliveries outstanding when the request goes out are forgotten once the broker confirms.
    pub async fn recover(&self) -> Result<(), Error> {
        let recover = basic::Recover { requeue: true };
        let reply = self.call(recover, Hook::Recover { up_to: 0 }).await?;
        expect_reply!(reply, BasicRecoverOk).map(|_| ())
    }
}

/// A channel in publisher confirm mode.
///
/// Every publish gets a sequence number, starting at 1, which the broker acknowledges.
/// Everything else works like on [`Channel`].
#[derive(Debug, Clone)]
pub struct ConfirmChannel {
    channel: Channel,
}

impl ConfirmChannel {
    pub(crate) fn new(channel: Channel) -> Self {
        Self { channel }
    }

    /// Publishes a message, returning the back-pressure flag of [`Channel::publish`] and a
    /// future resolving once the broker confirms the message
    pub fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        body: impl Into<Bytes>,
        options: PublishOptions,
    ) -> Result<(bool, PublishConfirm), Error> {
        let (keep_going, confirm) =
            self.channel
                .publish_inner(exchange, routing_key, body.into(), options)?;
        let confirm = confirm.ok_or_else(|| {
            Error::ProtocolViolation(String::from("channel is not in confirm mode"))
        })?;
        Ok((keep_going, confirm))
    }

    /// Publishes to `queue` through the default exchange
    pub fn send_to_queue(
        &self,
        queue: &str,
        body: impl Into<Bytes>,
        options: PublishOptions,
    ) -> Result<(bool, PublishConfirm), Error> {
        self.publish("", queue, body, options)
    }

    /// Resolves once every publish made so far is confirmed, with
    /// [`Confirmation::Nacked`](crate::Confirmation::Nacked) if any of them was rejected
    pub async fn wait_for_confirms(&self) -> Result<crate::Confirmation, Error> {
        let all = self.channel.inner.lock().wait_for_confirms()?;
        all.await
    }

    /// Publishes not yet confirmed
    pub fn unconfirmed(&self) -> usize {
        self.channel.inner.lock().unconfirmed()
    }
}

impl std::ops::Deref for ConfirmChannel {
    type Target = Channel;

    fn deref(&self) -> &Self::Target {
        &self.channel
    }
}
