//! Per channel protocol state, shared between the [`Channel`](super::Channel) handle and the
//! connection's reader task.
//!
//! Every transition happens under the channel's own lock and never waits, so the reader task is
//! not held up by the application and channels never lock each other.

use std::collections::HashMap;

use amqp091_types::{
    constants::{COMMAND_INVALID, FRAME_ERROR, PRECONDITION_FAILED, REPLY_SUCCESS, UNEXPECTED_FRAME},
    definitions::Exception,
    methods::{basic, channel, Method, MethodFields},
    properties::BasicProperties,
};
use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};

use super::{
    rpc::{RpcCorrelator, RpcReply},
    Error,
};
use crate::{
    connection::writer::FrameSender,
    content::{Assembled, AssemblyError, ContentAssembler, ContentMethod},
    event::ChannelEvent,
    flow::{self, Prefetch},
    frames::FrameBody,
    ledger::{Confirmation, ConfirmLedger, DeliveryLedger, PublishConfirm, UnknownTag},
    message::Delivery,
    CloseReason,
};

/// Lifecycle of a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// `channel.open` sent, waiting for `open-ok`
    Opening,

    /// Ready for use
    Open,

    /// `channel.close` sent, waiting for `close-ok`
    Closing,

    /// Closed normally, or because the connection closed
    Closed,

    /// Closed by a channel exception
    Error,
}

/// Bookkeeping to apply when the reply of a synchronous request arrives, under the same lock
/// that routes the frames after it
#[derive(Debug)]
pub(crate) enum Hook {
    None,
    Open,
    Consume {
        deliveries: mpsc::UnboundedSender<Delivery>,
        no_ack: bool,
    },
    Cancel,
    Qos(Prefetch),
    /// Deliveries up to this tag are redelivered, it is set once the request is written
    Recover {
        up_to: u64,
    },
    ConfirmSelect,
    Get {
        no_ack: bool,
    },
}

/// Whether the multiplexer keeps routing frames to the channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Disposition {
    Keep,
    Release,
}

#[derive(Debug)]
struct ConsumerEntry {
    deliveries: mpsc::UnboundedSender<Delivery>,
    no_ack: bool,
    /// Non-global prefetch count in effect when the consumer started
    prefetch: u16,
}

#[derive(Debug)]
pub(crate) struct ChannelInner {
    id: u16,
    state: ChannelState,
    /// What callers get once the channel is no longer usable
    closed: Option<Error>,
    sender: FrameSender,
    events: mpsc::UnboundedSender<ChannelEvent>,
    rpc: RpcCorrelator<Hook>,
    assembler: ContentAssembler,
    ledger: DeliveryLedger,
    confirms: Option<ConfirmLedger>,
    consumers: HashMap<String, ConsumerEntry>,
    /// Limit shared by the whole channel
    channel_prefetch: u16,
    /// Limit applied to each consumer started from now on
    consumer_prefetch: u16,
    close_waiters: Vec<oneshot::Sender<Result<(), Error>>>,
}

fn unexpected_frame(err: AssemblyError) -> Exception {
    Exception::new(UNEXPECTED_FRAME, err.to_string())
}

impl ChannelInner {
    pub fn new(id: u16, sender: FrameSender, events: mpsc::UnboundedSender<ChannelEvent>) -> Self {
        Self {
            id,
            state: ChannelState::Opening,
            closed: None,
            sender,
            events,
            rpc: RpcCorrelator::default(),
            assembler: ContentAssembler::default(),
            ledger: DeliveryLedger::default(),
            confirms: None,
            consumers: HashMap::new(),
            channel_prefetch: 0,
            consumer_prefetch: 0,
            close_waiters: Vec::new(),
        }
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    pub fn outstanding_deliveries(&self) -> Vec<u64> {
        self.ledger.tags()
    }

    pub fn prefetch_credit(&self) -> Option<u16> {
        flow::credit(self.channel_prefetch, self.ledger.len())
    }

    /// `None` for an unknown consumer or one without a limit
    pub fn consumer_prefetch_credit(&self, consumer_tag: &str) -> Option<u16> {
        let entry = self.consumers.get(consumer_tag)?;
        flow::credit(entry.prefetch, self.ledger.outstanding_for(consumer_tag))
    }

    pub fn unconfirmed(&self) -> usize {
        self.confirms.as_ref().map_or(0, ConfirmLedger::pending_len)
    }

    fn closed_error(&self) -> Error {
        self.closed
            .clone()
            .unwrap_or_else(|| Error::ChannelClosed(CloseReason::engine_stopped()))
    }

    fn ensure_open(&self) -> Result<(), Error> {
        match self.state {
            ChannelState::Opening | ChannelState::Open => Ok(()),
            _ => Err(self.closed_error()),
        }
    }

    /* ----------------------------- application side ----------------------------- */

    /// Queues a synchronous request, it is written as soon as no other request is in flight
    pub fn submit(
        &mut self,
        method: Method,
        hook: Hook,
    ) -> Result<oneshot::Receiver<Result<RpcReply, Error>>, Error> {
        self.ensure_open()?;
        let (tx, rx) = oneshot::channel();
        if let Some(method) = self.rpc.submit(method, hook, tx) {
            self.write_request(method);
        }
        Ok(rx)
    }

    fn write_request(&mut self, mut method: Method) {
        loop {
            match self.sender.send_method(self.id, method) {
                Ok(()) => {
                    if let Some(Hook::Recover { up_to }) = self.rpc.active_context_mut() {
                        *up_to = self.ledger.last();
                    }
                    return;
                }
                Err(err) => {
                    if let Some((_, responder)) = self.rpc.take_active() {
                        let _ = responder.send(Err(err));
                    }
                    match self.rpc.dispatch_next() {
                        Some(next) => method = next,
                        None => return,
                    }
                }
            }
        }
    }

    /// Writes a publish right away, regardless of pending synchronous requests
    pub fn publish(
        &mut self,
        method: basic::Publish,
        properties: BasicProperties,
        body: &Bytes,
    ) -> Result<(bool, Option<PublishConfirm>), Error> {
        self.ensure_open()?;
        let frames = self
            .sender
            .encode_content(self.id, method, properties, body)?;
        let confirm = self.confirms.as_mut().map(|confirms| confirms.register().1);
        let keep_going = self.sender.send_publish(self.id, frames, &self.events)?;
        Ok((keep_going, confirm))
    }

    pub fn wait_for_confirms(&mut self) -> Result<PublishConfirm, Error> {
        self.ensure_open()?;
        match &mut self.confirms {
            Some(confirms) => Ok(confirms.wait_all()),
            None => Err(Error::ProtocolViolation(String::from(
                "channel is not in confirm mode",
            ))),
        }
    }

    /// Settles `delivery_tag` with `ack`, `nack` or `reject`.
    ///
    /// An unknown tag closes the channel with `PRECONDITION_FAILED`, the way the broker would.
    pub fn settle(&mut self, delivery_tag: u64, multiple: bool, method: Method) -> Result<(), Error> {
        self.ensure_open()?;
        if let Err(UnknownTag(tag)) = self.ledger.settle(delivery_tag, multiple) {
            let exception = Exception::new(
                PRECONDITION_FAILED,
                format!("PRECONDITION_FAILED - unknown delivery tag {}", tag),
            )
            .caused_by(method.id());
            return Err(self.fail_locally(exception));
        }
        self.sender.send_method(self.id, method)
    }

    /// Settles every outstanding delivery, `method` carries tag 0 with `multiple` set
    pub fn settle_all(&mut self, method: Method) -> Result<(), Error> {
        self.ensure_open()?;
        self.ledger.settle_all();
        self.sender.send_method(self.id, method)
    }

    /// Starts closing the channel. The receiver resolves on `close-ok`.
    pub fn close(&mut self) -> Result<oneshot::Receiver<Result<(), Error>>, Error> {
        match self.state {
            ChannelState::Closed | ChannelState::Error => return Err(self.closed_error()),
            ChannelState::Closing => {}
            ChannelState::Opening | ChannelState::Open => self.begin_close(
                Exception::new(REPLY_SUCCESS, "Goodbye"),
                CloseReason::Requested,
            ),
        }
        let (tx, rx) = oneshot::channel();
        self.close_waiters.push(tx);
        Ok(rx)
    }

    fn fail_locally(&mut self, exception: Exception) -> Error {
        #[cfg(feature = "tracing")]
        tracing::error!(channel = self.id, %exception, "Closing channel");
        #[cfg(feature = "log")]
        log::error!("Closing channel {}: {}", self.id, exception);

        let _ = self.events.send(ChannelEvent::Error(exception.clone()));
        let reason = CloseReason::Local(exception.clone());
        self.begin_close(exception, reason.clone());
        Error::ChannelClosed(reason)
    }

    fn begin_close(&mut self, exception: Exception, reason: CloseReason) {
        self.state = ChannelState::Closing;
        self.teardown(Error::ChannelClosed(reason));

        let close = channel::Close {
            reply_code: exception.reply_code,
            reply_text: exception.reply_text,
            class_id: exception.class_id,
            method_id: exception.method_id,
        };
        // A failure means the connection is gone, which closes this channel anyway
        let _ = self.sender.send_method(self.id, close);
    }

    /// Rejects everything that waits on the channel and forgets its deliveries
    fn teardown(&mut self, err: Error) {
        self.rpc.fail_all(&err);
        if let Some(confirms) = &mut self.confirms {
            confirms.fail_all(&err);
        }
        self.consumers.clear();
        self.assembler.reset();
        self.ledger.settle_all();
        self.sender.forget_paused(self.id);
        self.closed = Some(err);
    }

    fn finish(&mut self, state: ChannelState, reason: CloseReason) -> Disposition {
        self.state = state;
        for waiter in self.close_waiters.drain(..) {
            let _ = waiter.send(Ok(()));
        }
        let _ = self.events.send(ChannelEvent::Close(reason));
        Disposition::Release
    }

    /// The connection is gone, nothing is written anymore
    pub fn on_connection_closed(&mut self, reason: &CloseReason) {
        if matches!(self.state, ChannelState::Closed | ChannelState::Error) {
            return;
        }

        let err = Error::ConnectionClosed(reason.clone());
        self.teardown(err.clone());
        self.state = ChannelState::Closed;
        for waiter in self.close_waiters.drain(..) {
            let result = match reason {
                CloseReason::Requested => Ok(()),
                _ => Err(err.clone()),
            };
            let _ = waiter.send(result);
        }
        let _ = self.events.send(ChannelEvent::Close(reason.clone()));
    }

    /* -------------------------------- reader side -------------------------------- */

    /// Handles a frame routed to this channel. An `Err` is a protocol violation that closes the
    /// connection.
    pub fn on_frame(&mut self, body: FrameBody) -> Result<Disposition, Exception> {
        let assembled = match body {
            FrameBody::Method(method) => return self.on_method(method),
            // After sending close only close and close-ok matter
            FrameBody::Header(_) | FrameBody::Body(_) if self.state == ChannelState::Closing => {
                return Ok(Disposition::Keep)
            }
            FrameBody::Header(header) => self.assembler.on_header(header),
            FrameBody::Body(chunk) => self.assembler.on_body(chunk),
            FrameBody::Heartbeat => {
                return Err(Exception::new(
                    FRAME_ERROR,
                    format!("heartbeat frame on channel {}", self.id),
                ))
            }
        };

        match assembled.map_err(unexpected_frame)? {
            None => Ok(Disposition::Keep),
            Some(Assembled::Deliver(delivery)) => {
                self.on_delivery(delivery);
                Ok(Disposition::Keep)
            }
            Some(Assembled::GetOk(delivery)) => self.resolve(RpcReply::Delivery(delivery)),
            Some(Assembled::Return(returned)) => {
                let _ = self.events.send(ChannelEvent::Return(returned));
                Ok(Disposition::Keep)
            }
        }
    }

    fn on_method(&mut self, method: Method) -> Result<Disposition, Exception> {
        if self.state == ChannelState::Closing {
            return Ok(match method {
                Method::ChannelClose(_) => {
                    // Both sides closed at the same time, the broker still answers ours
                    let _ = self.sender.send_method(self.id, channel::CloseOk);
                    Disposition::Keep
                }
                Method::ChannelCloseOk(_) => self.on_close_ok(),
                _ => Disposition::Keep,
            });
        }
        if self.assembler.is_assembling() {
            return Err(unexpected_frame(AssemblyError::Interrupted).caused_by(method.id()));
        }

        match method {
            Method::ChannelClose(close) => Ok(self.on_remote_close(close)),
            Method::ChannelFlow(flow) => {
                let flow_ok = channel::FlowOk {
                    active: flow.active,
                };
                let _ = self.sender.send_method(self.id, flow_ok);
                Ok(Disposition::Keep)
            }
            Method::BasicDeliver(deliver) => self.start_content(ContentMethod::Deliver(deliver)),
            Method::BasicReturn(ret) => self.start_content(ContentMethod::Return(ret)),
            Method::BasicGetOk(get_ok) if self.rpc.expects(basic::GetOk::ID) => {
                self.start_content(ContentMethod::GetOk(get_ok))
            }
            Method::BasicAck(ack) => {
                self.on_confirm(ack.delivery_tag, ack.multiple, Confirmation::Acked);
                Ok(Disposition::Keep)
            }
            Method::BasicNack(nack) => {
                self.on_confirm(nack.delivery_tag, nack.multiple, Confirmation::Nacked);
                Ok(Disposition::Keep)
            }
            Method::BasicCancel(cancel) => {
                self.on_consumer_cancelled(cancel);
                Ok(Disposition::Keep)
            }
            other if self.rpc.expects(other.id()) => self.resolve(RpcReply::Method(other)),
            other => Err(Exception::new(
                COMMAND_INVALID,
                format!("unexpected method {} on channel {}", other.id(), self.id),
            )
            .caused_by(other.id())),
        }
    }

    fn start_content(&mut self, method: ContentMethod) -> Result<Disposition, Exception> {
        self.assembler.start(method).map_err(unexpected_frame)?;
        Ok(Disposition::Keep)
    }

    fn resolve(&mut self, reply: RpcReply) -> Result<Disposition, Exception> {
        let (hook, responder) = self.rpc.take_active().ok_or_else(|| {
            Exception::new(
                COMMAND_INVALID,
                format!("reply without a request on channel {}", self.id),
            )
        })?;
        self.apply_hook(hook, &reply);
        let _ = responder.send(Ok(reply));

        if let Some(next) = self.rpc.dispatch_next() {
            self.write_request(next);
        }
        Ok(Disposition::Keep)
    }

    fn apply_hook(&mut self, hook: Hook, reply: &RpcReply) {
        match (hook, reply) {
            (Hook::Open, _) => self.state = ChannelState::Open,
            (
                Hook::Consume { deliveries, no_ack },
                RpcReply::Method(Method::BasicConsumeOk(ok)),
            ) => {
                let entry = ConsumerEntry {
                    deliveries,
                    no_ack,
                    prefetch: self.consumer_prefetch,
                };
                self.consumers.insert(ok.consumer_tag.clone(), entry);
            }
            (Hook::Cancel, RpcReply::Method(Method::BasicCancelOk(ok))) => {
                self.consumers.remove(&ok.consumer_tag);
            }
            (Hook::Qos(prefetch), _) => match prefetch.global {
                true => self.channel_prefetch = prefetch.count,
                false => self.consumer_prefetch = prefetch.count,
            },
            (Hook::Recover { up_to }, _) => {
                // Redeliveries carry new tags, those that arrived before recover-ok stay
                self.ledger.forget_up_to(up_to);
            }
            (Hook::ConfirmSelect, _) => {
                self.confirms.get_or_insert_with(ConfirmLedger::default);
            }
            (Hook::Get { no_ack: false }, RpcReply::Delivery(delivery)) => {
                self.ledger.record(delivery.delivery_tag, "")
            }
            _ => {}
        }
    }

    fn on_delivery(&mut self, delivery: Delivery) {
        match self.consumers.get(&delivery.consumer_tag) {
            Some(entry) => {
                if !entry.no_ack {
                    self.ledger
                        .record(delivery.delivery_tag, &delivery.consumer_tag);
                }
                if entry.deliveries.send(delivery).is_err() {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(channel = self.id, "Consumer stream dropped, delivery discarded");
                    #[cfg(feature = "log")]
                    log::debug!("Consumer stream dropped on channel {}, delivery discarded", self.id);
                }
            }
            None => {
                // Still counts as unacknowledged on the broker
                self.ledger
                    .record(delivery.delivery_tag, &delivery.consumer_tag);

                #[cfg(feature = "tracing")]
                tracing::warn!(
                    channel = self.id,
                    consumer_tag = %delivery.consumer_tag,
                    "Delivery for unknown consumer"
                );
                #[cfg(feature = "log")]
                log::warn!(
                    "Delivery for unknown consumer {:?} on channel {}",
                    delivery.consumer_tag,
                    self.id
                );
            }
        }
    }

    fn on_confirm(&mut self, delivery_tag: u64, multiple: bool, outcome: Confirmation) {
        let resolved = match &mut self.confirms {
            Some(confirms) => confirms.resolve(delivery_tag, multiple, outcome),
            None => Vec::new(),
        };
        if resolved.is_empty() {
            #[cfg(feature = "tracing")]
            tracing::debug!(channel = self.id, delivery_tag, ?outcome, "Ignored confirm");
            #[cfg(feature = "log")]
            log::debug!(
                "Ignored {:?} for tag {} on channel {}",
                outcome,
                delivery_tag,
                self.id
            );
        }
    }

    fn on_consumer_cancelled(&mut self, cancel: basic::Cancel) {
        #[cfg(feature = "tracing")]
        tracing::info!(channel = self.id, consumer_tag = %cancel.consumer_tag, "Consumer cancelled by broker");
        #[cfg(feature = "log")]
        log::info!(
            "Consumer {:?} cancelled by broker on channel {}",
            cancel.consumer_tag,
            self.id
        );

        self.consumers.remove(&cancel.consumer_tag);
        if !cancel.no_wait {
            let cancel_ok = basic::CancelOk {
                consumer_tag: cancel.consumer_tag,
            };
            let _ = self.sender.send_method(self.id, cancel_ok);
        }
    }

    fn on_remote_close(&mut self, close: channel::Close) -> Disposition {
        let exception = Exception {
            reply_code: close.reply_code,
            reply_text: close.reply_text,
            class_id: close.class_id,
            method_id: close.method_id,
        };

        #[cfg(feature = "tracing")]
        tracing::info!(channel = self.id, %exception, "Channel closed by broker");
        #[cfg(feature = "log")]
        log::info!("Channel {} closed by broker: {}", self.id, exception);

        let _ = self.sender.send_method(self.id, channel::CloseOk);
        let reason = CloseReason::Remote(exception.clone());
        self.teardown(Error::ChannelClosed(reason.clone()));

        let state = match exception.is_success() {
            true => ChannelState::Closed,
            false => {
                let _ = self.events.send(ChannelEvent::Error(exception));
                ChannelState::Error
            }
        };
        self.finish(state, reason)
    }

    fn on_close_ok(&mut self) -> Disposition {
        let reason = match self.closed.as_ref().and_then(Error::close_reason) {
            Some(reason) => reason.clone(),
            None => CloseReason::Requested,
        };
        let state = match &reason {
            CloseReason::Local(exception) if !exception.is_success() => ChannelState::Error,
            _ => ChannelState::Closed,
        };
        self.finish(state, reason)
    }
}
