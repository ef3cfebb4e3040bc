//! Flow control: connection write pressure and channel prefetch credit

use std::collections::BTreeMap;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::event::ChannelEvent;

/// Default high-water mark of queued but unwritten bytes
pub const DEFAULT_HIGH_WATER_MARK: usize = 64 * 1024;

/// Default low-water mark at which paused publishers are told to resume
pub const DEFAULT_LOW_WATER_MARK: usize = 16 * 1024;

#[derive(Debug, Default)]
struct PressureState {
    queued: usize,
    /// Channels that were told to pause since the last drain
    paused: BTreeMap<u16, mpsc::UnboundedSender<ChannelEvent>>,
}

/// Tracks bytes handed to the writer task but not yet written to the transport.
///
/// Publishing never blocks. A publish that leaves the queue above the high-water mark reports
/// back-pressure, and the publishing channel gets exactly one [`ChannelEvent::Drain`] once the
/// queue falls below the low-water mark.
#[derive(Debug)]
pub(crate) struct WritePressure {
    high_water_mark: usize,
    low_water_mark: usize,
    state: Mutex<PressureState>,
}

impl WritePressure {
    pub fn new(high_water_mark: usize, low_water_mark: usize) -> Self {
        Self {
            high_water_mark,
            low_water_mark: low_water_mark.min(high_water_mark),
            state: Mutex::new(PressureState::default()),
        }
    }

    /// Accounts bytes that are not subject to back-pressure, e.g. acks
    pub fn enqueue(&self, len: usize) {
        self.state.lock().queued += len;
    }

    /// Accounts a publish. Returns `false` when the publisher should pause.
    pub fn enqueue_publish(
        &self,
        len: usize,
        channel: u16,
        events: &mpsc::UnboundedSender<ChannelEvent>,
    ) -> bool {
        let mut state = self.state.lock();
        state.queued += len;
        if state.queued > self.high_water_mark {
            state.paused.insert(channel, events.clone());
            false
        } else {
            true
        }
    }

    /// Accounts bytes the writer flushed. Returns the number of channels told to resume.
    ///
    /// Events are sent under the lock, so a channel that called [`forget`](Self::forget) never
    /// sees a drain afterwards.
    pub fn written(&self, len: usize) -> usize {
        let mut state = self.state.lock();
        state.queued = state.queued.saturating_sub(len);
        if state.queued >= self.low_water_mark || state.paused.is_empty() {
            return 0;
        }
        std::mem::take(&mut state.paused)
            .into_values()
            .filter(|events| events.send(ChannelEvent::Drain).is_ok())
            .count()
    }

    /// Stops tracking a channel that is closing, its number may be reused
    pub fn forget(&self, channel: u16) {
        self.state.lock().paused.remove(&channel);
    }

    #[cfg(test)]
    pub fn queued(&self) -> usize {
        self.state.lock().queued
    }
}

/// Prefetch limit announced to the broker with `basic.qos`.
///
/// The client does not throttle on its own, it only exposes the remaining credit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Prefetch {
    pub count: u16,
    /// Shared by all consumers of the channel rather than applied to each new one
    pub global: bool,
}

/// Remaining credit under `limit` given the number of unacknowledged deliveries, `None` if
/// unlimited
pub(crate) fn credit(limit: u16, outstanding: usize) -> Option<u16> {
    match limit {
        0 => None,
        limit => Some(limit.saturating_sub(outstanding.min(u16::MAX as usize) as u16)),
    }
}
