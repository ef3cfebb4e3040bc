//! Channel number allocation and routing table

use std::collections::BTreeMap;

/// Maps channel numbers to channel state.
///
/// A number becomes free again only once its channel is removed, which happens after the close
/// handshake of the channel completed.
#[derive(Debug)]
pub(crate) struct ChannelMux<T> {
    channel_max: u16,
    channels: BTreeMap<u16, T>,
}

impl<T> ChannelMux<T> {
    /// `channel_max` as negotiated, 0 means 65535
    pub fn new(channel_max: u16) -> Self {
        let channel_max = match channel_max {
            0 => u16::MAX,
            max => max,
        };
        Self {
            channel_max,
            channels: BTreeMap::new(),
        }
    }

    pub fn channel_max(&self) -> u16 {
        self.channel_max
    }

    /// Smallest free number in `1..=channel_max`
    pub fn allocate(&self) -> Option<u16> {
        let mut candidate = 1u16;
        for &id in self.channels.keys() {
            if id != candidate {
                break;
            }
            candidate = candidate.checked_add(1)?;
        }
        (candidate <= self.channel_max).then_some(candidate)
    }

    pub fn insert(&mut self, id: u16, value: T) {
        self.channels.insert(id, value);
    }

    pub fn get(&self, id: u16) -> Option<&T> {
        self.channels.get(&id)
    }

    pub fn remove(&mut self, id: u16) -> Option<T> {
        self.channels.remove(&id)
    }

    /// Removes every channel, in increasing number
    pub fn drain(&mut self) -> impl Iterator<Item = (u16, T)> {
        std::mem::take(&mut self.channels).into_iter()
    }
}
