//! Bookkeeping of unacknowledged deliveries and unconfirmed publishes

use std::{
    collections::BTreeMap,
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use tokio::sync::oneshot;

use crate::{channel::Error, CloseReason};

/// Acknowledging a tag the channel does not hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Unknown delivery tag {0}")]
pub(crate) struct UnknownTag(pub u64);

/// Outstanding delivery tags of one channel, with the consumer each one went to
#[derive(Debug, Default)]
pub(crate) struct DeliveryLedger {
    /// Consumer tag per delivery tag, empty for `basic.get`
    outstanding: BTreeMap<u64, String>,
}

impl DeliveryLedger {
    pub fn record(&mut self, delivery_tag: u64, consumer_tag: &str) {
        self.outstanding
            .insert(delivery_tag, consumer_tag.to_string());
    }

    /// Removes `delivery_tag`, and with `multiple` every outstanding tag below it.
    ///
    /// Returns the number of settled deliveries.
    pub fn settle(&mut self, delivery_tag: u64, multiple: bool) -> Result<usize, UnknownTag> {
        if !self.outstanding.contains_key(&delivery_tag) {
            return Err(UnknownTag(delivery_tag));
        }
        if !multiple {
            self.outstanding.remove(&delivery_tag);
            return Ok(1);
        }
        Ok(self.forget_up_to(delivery_tag))
    }

    /// Forgets every outstanding tag up to and including `delivery_tag`, never fails
    pub fn forget_up_to(&mut self, delivery_tag: u64) -> usize {
        let rest = match delivery_tag.checked_add(1) {
            Some(next) => self.outstanding.split_off(&next),
            None => BTreeMap::new(),
        };
        std::mem::replace(&mut self.outstanding, rest).len()
    }

    /// Forgets every outstanding tag, never fails
    pub fn settle_all(&mut self) -> usize {
        std::mem::take(&mut self.outstanding).len()
    }

    pub fn len(&self) -> usize {
        self.outstanding.len()
    }

    /// Highest outstanding tag, 0 if there is none
    pub fn last(&self) -> u64 {
        self.outstanding.keys().next_back().copied().unwrap_or(0)
    }

    /// Outstanding deliveries that went to `consumer_tag`
    pub fn outstanding_for(&self, consumer_tag: &str) -> usize {
        self.outstanding
            .values()
            .filter(|tag| tag.as_str() == consumer_tag)
            .count()
    }

    pub fn tags(&self) -> Vec<u64> {
        self.outstanding.keys().copied().collect()
    }
}

/// How the broker resolved a publish on a confirm channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    /// The broker took responsibility for the message
    Acked,

    /// The broker could not take the message
    Nacked,
}

type ConfirmResponder = oneshot::Sender<Result<Confirmation, Error>>;

/// Resolves once the broker confirms the publish, or fails with the reason the channel closed
/// while the outcome was still unknown
#[derive(Debug)]
pub struct PublishConfirm {
    rx: oneshot::Receiver<Result<Confirmation, Error>>,
}

impl Future for PublishConfirm {
    type Output = Result<Confirmation, Error>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx).map(|result| match result {
            Ok(outcome) => outcome,
            Err(_) => Err(Error::ConnectionClosed(CloseReason::engine_stopped())),
        })
    }
}

#[derive(Debug)]
struct ConfirmWaiter {
    up_to: u64,
    nacked: bool,
    responder: ConfirmResponder,
}

/// Publish sequence numbers of a confirm channel, assigned from 1 in publish order
#[derive(Debug)]
pub(crate) struct ConfirmLedger {
    next_seq: u64,
    pending: BTreeMap<u64, ConfirmResponder>,
    waiters: Vec<ConfirmWaiter>,
}

impl Default for ConfirmLedger {
    fn default() -> Self {
        Self {
            next_seq: 1,
            pending: BTreeMap::new(),
            waiters: Vec::new(),
        }
    }
}

impl ConfirmLedger {
    /// Assigns the next sequence number
    pub fn register(&mut self) -> (u64, PublishConfirm) {
        let seq = self.next_seq;
        self.next_seq += 1;
        let (tx, rx) = oneshot::channel();
        self.pending.insert(seq, tx);
        (seq, PublishConfirm { rx })
    }

    #[cfg(test)]
    pub fn is_pending(&self, seq: u64) -> bool {
        self.pending.contains_key(&seq)
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Applies a broker `ack` or `nack`. Returns the sequence numbers it resolved, tags that
    /// are no longer pending resolve nothing.
    pub fn resolve(&mut self, delivery_tag: u64, multiple: bool, outcome: Confirmation) -> Vec<u64> {
        let resolved: Vec<(u64, ConfirmResponder)> = if multiple {
            let rest = match delivery_tag {
                0 => BTreeMap::new(),
                tag => match tag.checked_add(1) {
                    Some(next) => self.pending.split_off(&next),
                    None => BTreeMap::new(),
                },
            };
            std::mem::replace(&mut self.pending, rest).into_iter().collect()
        } else {
            self.pending
                .remove_entry(&delivery_tag)
                .into_iter()
                .collect()
        };

        let mut seqs = Vec::with_capacity(resolved.len());
        for (seq, responder) in resolved {
            let _ = responder.send(Ok(outcome));
            if outcome == Confirmation::Nacked {
                for waiter in self.waiters.iter_mut().filter(|w| w.up_to >= seq) {
                    waiter.nacked = true;
                }
            }
            seqs.push(seq);
        }
        self.wake_waiters();
        seqs
    }

    /// Resolves once every publish made so far is confirmed, with `Nacked` if any of them was
    pub fn wait_all(&mut self) -> PublishConfirm {
        let (tx, rx) = oneshot::channel();
        let up_to = self.next_seq - 1;
        self.waiters.push(ConfirmWaiter {
            up_to,
            nacked: false,
            responder: tx,
        });
        self.wake_waiters();
        PublishConfirm { rx }
    }

    /// Rejects everything still pending, in sequence order
    pub fn fail_all(&mut self, err: &Error) {
        for (_, responder) in std::mem::take(&mut self.pending) {
            let _ = responder.send(Err(err.clone()));
        }
        for waiter in self.waiters.drain(..) {
            let _ = waiter.responder.send(Err(err.clone()));
        }
    }

    fn wake_waiters(&mut self) {
        let lowest_pending = self.pending.keys().next().copied();
        let (done, waiting) = std::mem::take(&mut self.waiters)
            .into_iter()
            .partition(|waiter| match lowest_pending {
                Some(seq) => waiter.up_to < seq,
                None => true,
            });
        self.waiters = waiting;

        for waiter in done {
            let outcome = match waiter.nacked {
                true => Confirmation::Nacked,
                false => Confirmation::Acked,
            };
            let _ = waiter.responder.send(Ok(outcome));
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::{Confirmation, ConfirmLedger, DeliveryLedger, UnknownTag};
    use crate::{channel::Error, CloseReason};

    #[test]
    fn ack_up_to_leaves_later_tags() {
        let mut ledger = DeliveryLedger::default();
        for tag in 1..=3 {
            ledger.record(tag, "c");
        }
        assert_eq!(ledger.settle(2, true), Ok(2));
        assert_eq!(ledger.tags(), vec![3]);
    }

    #[test]
    fn deliveries_are_counted_per_consumer() {
        let mut ledger = DeliveryLedger::default();
        ledger.record(1, "a");
        ledger.record(2, "b");
        ledger.record(3, "a");
        ledger.record(4, "");
        assert_eq!(ledger.outstanding_for("a"), 2);
        assert_eq!(ledger.outstanding_for("b"), 1);
        assert_eq!(ledger.last(), 4);

        assert_eq!(ledger.settle(2, true), Ok(2));
        assert_eq!(ledger.outstanding_for("a"), 1);
        assert_eq!(ledger.outstanding_for("b"), 0);
    }

    #[test]
    fn forget_up_to_keeps_later_tags() {
        let mut ledger = DeliveryLedger::default();
        assert_eq!(ledger.last(), 0);
        assert_eq!(ledger.forget_up_to(0), 0);

        ledger.record(1, "c");
        ledger.record(5, "c");
        assert_eq!(ledger.forget_up_to(3), 1);
        assert_eq!(ledger.tags(), vec![5]);
    }

    #[test]
    fn unknown_tag_is_rejected_and_nothing_changes() {
        let mut ledger = DeliveryLedger::default();
        ledger.record(1, "c");
        ledger.record(3, "c");
        assert_eq!(ledger.settle(2, true), Err(UnknownTag(2)));
        assert_eq!(ledger.settle(2, false), Err(UnknownTag(2)));
        assert_eq!(ledger.tags(), vec![1, 3]);
    }

    #[test]
    fn settle_all_never_fails() {
        let mut ledger = DeliveryLedger::default();
        assert_eq!(ledger.settle_all(), 0);
        ledger.record(u64::MAX, "");
        assert_eq!(ledger.settle(u64::MAX, true), Ok(1));
        assert_eq!(ledger.len(), 0);
    }

    proptest! {
        #[test]
        fn ack_up_to_removes_everything_below_the_highest_tag(
            tags in proptest::collection::btree_set(1u64..500, 1..60),
            picks in proptest::collection::vec(any::<prop::sample::Index>(), 1..20),
        ) {
            let tags: Vec<u64> = tags.into_iter().collect();
            let mut ledger = DeliveryLedger::default();
            for tag in &tags {
                ledger.record(*tag, "c");
            }

            let acked: Vec<u64> = picks.iter().map(|index| *index.get(&tags)).collect();
            for tag in &acked {
                // tags already covered by an earlier ack are unknown by now
                let _ = ledger.settle(*tag, true);
            }

            let highest = acked.iter().copied().max().unwrap_or(0);
            let expected: Vec<u64> = tags.iter().copied().filter(|t| *t > highest).collect();
            prop_assert_eq!(ledger.tags(), expected);
        }
    }

    #[tokio::test]
    async fn ack_covering_four_leaves_the_fifth_pending() {
        let mut ledger = ConfirmLedger::default();
        let confirms: Vec<_> = (0..5).map(|_| ledger.register()).collect();
        assert_eq!(
            confirms.iter().map(|(seq, _)| *seq).collect::<Vec<_>>(),
            vec![1, 2, 3, 4, 5]
        );

        assert_eq!(ledger.resolve(4, true, Confirmation::Acked), vec![1, 2, 3, 4]);
        assert!(ledger.is_pending(5));
        assert_eq!(ledger.pending_len(), 1);

        let mut confirms = confirms.into_iter();
        for (_, confirm) in confirms.by_ref().take(4) {
            assert_eq!(confirm.await.unwrap(), Confirmation::Acked);
        }

        let (_, fifth) = confirms.next().unwrap();
        ledger.fail_all(&Error::ChannelClosed(CloseReason::Requested));
        assert!(matches!(
            fifth.await,
            Err(Error::ChannelClosed(CloseReason::Requested))
        ));
    }

    #[tokio::test]
    async fn wait_all_reports_any_nack() {
        let mut ledger = ConfirmLedger::default();
        let _ = ledger.register();
        let _ = ledger.register();

        let waiter = ledger.wait_all();
        assert!(ledger.resolve(2, false, Confirmation::Nacked) == vec![2]);
        assert!(ledger.resolve(1, false, Confirmation::Acked) == vec![1]);
        assert_eq!(waiter.await.unwrap(), Confirmation::Nacked);

        // nothing pending resolves right away
        assert_eq!(ledger.wait_all().await.unwrap(), Confirmation::Acked);
    }

    #[test]
    fn stale_confirm_resolves_nothing() {
        let mut ledger = ConfirmLedger::default();
        let _ = ledger.register();
        assert_eq!(ledger.resolve(1, false, Confirmation::Acked), vec![1]);
        assert!(ledger.resolve(1, false, Confirmation::Acked).is_empty());
        assert!(ledger.resolve(7, true, Confirmation::Acked).is_empty());
    }
}
