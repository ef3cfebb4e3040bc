//! Primitive domains of the wire format
//!
//! Decoding reads from a [`Bytes`] that holds exactly one frame payload; every reader checks the
//! remaining length first so a truncated payload surfaces as [`Error::UnexpectedEof`] instead of
//! a panic inside `bytes`.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::Error;

mod value;
pub use value::*;

macro_rules! checked_get {
    ($(#[$attr:meta])* $name:ident, $ty:ty) => {
        $(#[$attr])*
        pub fn $name(src: &mut Bytes) -> Result<$ty, Error> {
            if src.remaining() < std::mem::size_of::<$ty>() {
                return Err(Error::UnexpectedEof);
            }
            Ok(src.$name())
        }
    };
}

checked_get!(
    /// Reads an octet
    get_u8, u8
);
checked_get!(
    /// Reads a signed octet
    get_i8, i8
);
checked_get!(
    /// Reads a big endian short
    get_u16, u16
);
checked_get!(
    /// Reads a big endian signed short
    get_i16, i16
);
checked_get!(
    /// Reads a big endian long
    get_u32, u32
);
checked_get!(
    /// Reads a big endian signed long
    get_i32, i32
);
checked_get!(
    /// Reads a big endian long long
    get_u64, u64
);
checked_get!(
    /// Reads a big endian signed long long
    get_i64, i64
);
checked_get!(
    /// Reads a big endian IEEE-754 single
    get_f32, f32
);
checked_get!(
    /// Reads a big endian IEEE-754 double
    get_f64, f64
);

/// Splits `len` bytes off the front of `src`
pub fn get_bytes(src: &mut Bytes, len: usize) -> Result<Bytes, Error> {
    if src.remaining() < len {
        return Err(Error::UnexpectedEof);
    }
    Ok(src.split_to(len))
}

/// Reads a short string (length octet followed by at most 255 bytes)
pub fn get_short_str(src: &mut Bytes) -> Result<String, Error> {
    let len = get_u8(src)? as usize;
    let buf = get_bytes(src, len)?;
    String::from_utf8(buf.to_vec()).map_err(|_| Error::InvalidUtf8)
}

/// Reads a short string, replacing invalid UTF-8 sequences.
///
/// For fields another publisher sets, such as routing keys, property strings and table keys,
/// where one odd message must not fail the whole frame.
pub fn get_short_str_lossy(src: &mut Bytes) -> Result<String, Error> {
    let len = get_u8(src)? as usize;
    let buf = get_bytes(src, len)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Writes a short string
pub fn put_short_str(dst: &mut BytesMut, value: &str) -> Result<(), Error> {
    let len = value.len();
    if len > u8::MAX as usize {
        return Err(Error::ShortStringTooLong(len));
    }
    dst.put_u8(len as u8);
    dst.put_slice(value.as_bytes());
    Ok(())
}

/// Reads a long string as raw bytes
pub fn get_long_bytes(src: &mut Bytes) -> Result<Bytes, Error> {
    let len = get_u32(src)? as usize;
    get_bytes(src, len)
}

/// Reads a long string that must be valid UTF-8
pub fn get_long_str(src: &mut Bytes) -> Result<String, Error> {
    let buf = get_long_bytes(src)?;
    String::from_utf8(buf.to_vec()).map_err(|_| Error::InvalidUtf8)
}

/// Writes a long string
pub fn put_long_str(dst: &mut BytesMut, value: &[u8]) {
    dst.put_u32(value.len() as u32);
    dst.put_slice(value);
}

/// Packs consecutive bit fields into one octet, least significant bit first
pub fn pack_bits(bits: &[bool]) -> u8 {
    debug_assert!(bits.len() <= 8);
    bits.iter()
        .enumerate()
        .fold(0u8, |acc, (i, set)| if *set { acc | (1 << i) } else { acc })
}

/// Reads bit `index` from a packed octet
pub fn bit(packed: u8, index: u8) -> bool {
    packed & (1 << index) != 0
}

#[cfg(test)]
mod tests {
    use bytes::{Bytes, BytesMut};

    use super::*;

    #[test]
    fn short_str_rejects_more_than_255_bytes() {
        let mut dst = BytesMut::new();
        let long = "x".repeat(256);
        assert_eq!(
            put_short_str(&mut dst, &long),
            Err(Error::ShortStringTooLong(256))
        );

        let max = "y".repeat(255);
        put_short_str(&mut dst, &max).unwrap();
        assert_eq!(dst.len(), 256);
    }

    #[test]
    fn truncated_input_is_eof() {
        let mut src = Bytes::from_static(&[0x05, b'a', b'b']);
        assert_eq!(get_short_str(&mut src), Err(Error::UnexpectedEof));

        let mut src = Bytes::from_static(&[0x00, 0x01]);
        assert_eq!(get_u32(&mut src), Err(Error::UnexpectedEof));
    }

    #[test]
    fn lossy_short_str_accepts_any_octets() {
        let mut src = Bytes::from_static(&[0x03, b'a', 0xff, b'b']);
        assert_eq!(get_short_str_lossy(&mut src).unwrap(), "a\u{fffd}b");
        assert!(src.is_empty());

        let mut src = Bytes::from_static(&[0x03, b'a', 0xff, b'b']);
        assert_eq!(get_short_str(&mut src), Err(Error::InvalidUtf8));
    }

    #[test]
    fn bits_are_packed_lsb_first() {
        let packed = pack_bits(&[true, false, true, true]);
        assert_eq!(packed, 0b0000_1101);
        assert!(bit(packed, 0));
        assert!(!bit(packed, 1));
        assert!(bit(packed, 2));
        assert!(bit(packed, 3));
        assert!(!bit(packed, 4));
    }

    proptest::proptest! {
        #[test]
        fn packed_bits_read_back(bits in proptest::collection::vec(proptest::bool::ANY, 0..=8)) {
            let packed = pack_bits(&bits);
            for (i, set) in bits.iter().enumerate() {
                proptest::prop_assert_eq!(bit(packed, i as u8), *set);
            }
            for i in bits.len()..8 {
                proptest::prop_assert!(!bit(packed, i as u8));
            }
        }
    }
}
