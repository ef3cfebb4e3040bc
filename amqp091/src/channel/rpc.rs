//! Correlation of synchronous requests with their replies.
//!
//! A channel carries at most one synchronous request at a time. Later requests wait in FIFO
//! order and are written only once the slot frees up, so replies always resolve callers in the
//! order the requests went out.

use std::collections::VecDeque;

use amqp091_types::{definitions::MethodId, methods::Method};
use tokio::sync::oneshot;

use super::Error;
use crate::message::Delivery;

/// What resolves a synchronous request
#[derive(Debug)]
pub(crate) enum RpcReply {
    Method(Method),
    /// `basic.get-ok` together with its content
    Delivery(Delivery),
}

pub(crate) type Responder = oneshot::Sender<Result<RpcReply, Error>>;

#[derive(Debug)]
struct Queued<T> {
    method: Method,
    context: T,
    responder: Responder,
}

#[derive(Debug)]
enum Slot<T> {
    Idle,
    Awaiting {
        expects: &'static [MethodId],
        context: T,
        responder: Responder,
    },
}

/// `T` is what the caller needs back when the reply arrives
#[derive(Debug)]
pub(crate) struct RpcCorrelator<T> {
    slot: Slot<T>,
    queue: VecDeque<Queued<T>>,
}

impl<T> Default for RpcCorrelator<T> {
    fn default() -> Self {
        Self {
            slot: Slot::Idle,
            queue: VecDeque::new(),
        }
    }
}

impl<T> RpcCorrelator<T> {
    /// Returns the method when it may be written right away
    pub fn submit(&mut self, method: Method, context: T, responder: Responder) -> Option<Method> {
        match self.slot {
            Slot::Idle => {
                self.slot = Slot::Awaiting {
                    expects: method.replies(),
                    context,
                    responder,
                };
                Some(method)
            }
            Slot::Awaiting { .. } => {
                self.queue.push_back(Queued {
                    method,
                    context,
                    responder,
                });
                None
            }
        }
    }

    /// Whether the active request waits for this reply
    pub fn expects(&self, id: MethodId) -> bool {
        match &self.slot {
            Slot::Idle => false,
            Slot::Awaiting { expects, .. } => expects.contains(&id),
        }
    }

    /// Context of the request in flight
    pub fn active_context_mut(&mut self) -> Option<&mut T> {
        match &mut self.slot {
            Slot::Idle => None,
            Slot::Awaiting { context, .. } => Some(context),
        }
    }

    /// Frees the slot, handing back the active request
    pub fn take_active(&mut self) -> Option<(T, Responder)> {
        match std::mem::replace(&mut self.slot, Slot::Idle) {
            Slot::Idle => None,
            Slot::Awaiting {
                context, responder, ..
            } => Some((context, responder)),
        }
    }

    /// Moves the oldest queued request into a free slot and returns the method to write
    pub fn dispatch_next(&mut self) -> Option<Method> {
        if let Slot::Awaiting { .. } = self.slot {
            return None;
        }
        let next = self.queue.pop_front()?;
        self.slot = Slot::Awaiting {
            expects: next.method.replies(),
            context: next.context,
            responder: next.responder,
        };
        Some(next.method)
    }

    /// Rejects the active request and then every queued one, in the order they were issued.
    ///
    /// Returns their contexts in that same order.
    pub fn fail_all(&mut self, err: &Error) -> Vec<T> {
        let mut contexts = Vec::with_capacity(self.queue.len() + 1);
        if let Some((context, responder)) = self.take_active() {
            let _ = responder.send(Err(err.clone()));
            contexts.push(context);
        }
        for queued in self.queue.drain(..) {
            let _ = queued.responder.send(Err(err.clone()));
            contexts.push(queued.context);
        }
        contexts
    }

    #[cfg(test)]
    pub fn is_idle(&self) -> bool {
        matches!(self.slot, Slot::Idle) && self.queue.is_empty()
    }
}
