//! Methods of the `confirm` class (class-id 85)

use bytes::{BufMut, Bytes, BytesMut};

use super::{empty_method, MethodFields};
use crate::{
    definitions::MethodId,
    primitives::{bit, get_u8},
    Error,
};

/// Class id of `confirm`
pub const CLASS_ID: u16 = 85;

/// Puts the channel into publisher confirm mode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Select {
    /// Do not send a [`SelectOk`]
    pub no_wait: bool,
}

impl MethodFields for Select {
    const ID: MethodId = MethodId::new(CLASS_ID, 10);

    fn encode(&self, dst: &mut BytesMut) -> Result<(), Error> {
        dst.put_u8(self.no_wait as u8);
        Ok(())
    }

    fn decode(src: &mut Bytes) -> Result<Self, Error> {
        Ok(Self {
            no_wait: bit(get_u8(src)?, 0),
        })
    }
}

empty_method!(
    /// Confirms a [`Select`]
    SelectOk,
    CLASS_ID,
    11
);
