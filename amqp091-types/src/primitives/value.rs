use std::collections::{btree_map, BTreeMap};

use bytes::{BufMut, Bytes, BytesMut};

use crate::Error;

use super::{
    get_bytes, get_f32, get_f64, get_i16, get_i32, get_i64, get_i8, get_long_bytes,
    get_short_str_lossy, get_u16, get_u32, get_u64, get_u8, put_long_str, put_short_str,
};

/// A decimal value: `value / 10^scale`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decimal {
    /// Number of decimal digits
    pub scale: u8,

    /// Unscaled value
    pub value: u32,
}

/// A value inside a field table or field array
///
/// Type tags follow the RabbitMQ/Qpid interpretation of the 0-9-1 errata, which is what
/// every broker in practice speaks.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// `t`
    Boolean(bool),

    /// `b`
    ShortShortInt(i8),

    /// `B`
    ShortShortUInt(u8),

    /// `s`
    ShortInt(i16),

    /// `u`
    ShortUInt(u16),

    /// `I`
    LongInt(i32),

    /// `i`
    LongUInt(u32),

    /// `l`
    LongLongInt(i64),

    /// `f`
    Float(f32),

    /// `d`
    Double(f64),

    /// `D`
    Decimal(Decimal),

    /// `S`, raw octets which are usually but not necessarily UTF-8
    LongString(Bytes),

    /// `A`
    FieldArray(Vec<FieldValue>),

    /// `T`, seconds since the epoch
    Timestamp(u64),

    /// `F`
    FieldTable(FieldTable),

    /// `V`
    Void,

    /// `x`
    ByteArray(Bytes),
}

impl FieldValue {
    fn tag(&self) -> u8 {
        match self {
            FieldValue::Boolean(_) => b't',
            FieldValue::ShortShortInt(_) => b'b',
            FieldValue::ShortShortUInt(_) => b'B',
            FieldValue::ShortInt(_) => b's',
            FieldValue::ShortUInt(_) => b'u',
            FieldValue::LongInt(_) => b'I',
            FieldValue::LongUInt(_) => b'i',
            FieldValue::LongLongInt(_) => b'l',
            FieldValue::Float(_) => b'f',
            FieldValue::Double(_) => b'd',
            FieldValue::Decimal(_) => b'D',
            FieldValue::LongString(_) => b'S',
            FieldValue::FieldArray(_) => b'A',
            FieldValue::Timestamp(_) => b'T',
            FieldValue::FieldTable(_) => b'F',
            FieldValue::Void => b'V',
            FieldValue::ByteArray(_) => b'x',
        }
    }

    /// Writes the type tag followed by the value
    pub fn encode(&self, dst: &mut BytesMut) -> Result<(), Error> {
        dst.put_u8(self.tag());
        match self {
            FieldValue::Boolean(v) => dst.put_u8(*v as u8),
            FieldValue::ShortShortInt(v) => dst.put_i8(*v),
            FieldValue::ShortShortUInt(v) => dst.put_u8(*v),
            FieldValue::ShortInt(v) => dst.put_i16(*v),
            FieldValue::ShortUInt(v) => dst.put_u16(*v),
            FieldValue::LongInt(v) => dst.put_i32(*v),
            FieldValue::LongUInt(v) => dst.put_u32(*v),
            FieldValue::LongLongInt(v) => dst.put_i64(*v),
            FieldValue::Float(v) => dst.put_f32(*v),
            FieldValue::Double(v) => dst.put_f64(*v),
            FieldValue::Decimal(v) => {
                dst.put_u8(v.scale);
                dst.put_u32(v.value);
            }
            FieldValue::LongString(v) => put_long_str(dst, v),
            FieldValue::FieldArray(values) => {
                let mut buf = BytesMut::new();
                for value in values {
                    value.encode(&mut buf)?;
                }
                put_long_str(dst, &buf);
            }
            FieldValue::Timestamp(v) => dst.put_u64(*v),
            FieldValue::FieldTable(table) => table.encode(dst)?,
            FieldValue::Void => {}
            FieldValue::ByteArray(v) => put_long_str(dst, v),
        }
        Ok(())
    }

    /// Reads a type tag followed by the value
    pub fn decode(src: &mut Bytes) -> Result<Self, Error> {
        let value = match get_u8(src)? {
            b't' => FieldValue::Boolean(get_u8(src)? != 0),
            b'b' => FieldValue::ShortShortInt(get_i8(src)?),
            b'B' => FieldValue::ShortShortUInt(get_u8(src)?),
            b's' => FieldValue::ShortInt(get_i16(src)?),
            b'u' => FieldValue::ShortUInt(get_u16(src)?),
            b'I' => FieldValue::LongInt(get_i32(src)?),
            b'i' => FieldValue::LongUInt(get_u32(src)?),
            b'l' => FieldValue::LongLongInt(get_i64(src)?),
            b'f' => FieldValue::Float(get_f32(src)?),
            b'd' => FieldValue::Double(get_f64(src)?),
            b'D' => FieldValue::Decimal(Decimal {
                scale: get_u8(src)?,
                value: get_u32(src)?,
            }),
            b'S' => FieldValue::LongString(get_long_bytes(src)?),
            b'A' => {
                let mut buf = get_long_bytes(src)?;
                let mut values = Vec::new();
                while !buf.is_empty() {
                    values.push(FieldValue::decode(&mut buf)?);
                }
                FieldValue::FieldArray(values)
            }
            b'T' => FieldValue::Timestamp(get_u64(src)?),
            b'F' => FieldValue::FieldTable(FieldTable::decode(src)?),
            b'V' => FieldValue::Void,
            b'x' => FieldValue::ByteArray(get_long_bytes(src)?),
            other => return Err(Error::UnknownFieldType(other)),
        };
        Ok(value)
    }

    /// Returns the string if this is a long string holding valid UTF-8
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::LongString(s) => std::str::from_utf8(s).ok(),
            _ => None,
        }
    }

    /// Returns the octets if this is a long string or a byte array
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            FieldValue::LongString(b) | FieldValue::ByteArray(b) => Some(b),
            _ => None,
        }
    }

    /// Returns the boolean if this is a boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Boolean(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        FieldValue::LongInt(value)
    }
}

impl From<u32> for FieldValue {
    fn from(value: u32) -> Self {
        FieldValue::LongUInt(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::LongLongInt(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::LongString(Bytes::copy_from_slice(value.as_bytes()))
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::LongString(Bytes::from(value))
    }
}

impl From<FieldTable> for FieldValue {
    fn from(value: FieldTable) -> Self {
        FieldValue::FieldTable(value)
    }
}

impl From<Vec<FieldValue>> for FieldValue {
    fn from(value: Vec<FieldValue>) -> Self {
        FieldValue::FieldArray(value)
    }
}

/// A field table, used for arguments, headers and connection properties
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldTable(BTreeMap<String, FieldValue>);

impl FieldTable {
    /// Creates an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a value, returning the previous value under the same key
    pub fn insert(
        &mut self,
        key: impl Into<String>,
        value: impl Into<FieldValue>,
    ) -> Option<FieldValue> {
        self.0.insert(key.into(), value.into())
    }

    /// Builder style [`insert`](Self::insert)
    pub fn with(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.insert(key, value);
        self
    }

    /// Gets a value by key
    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.0.get(key)
    }

    /// Removes a value by key
    pub fn remove(&mut self, key: &str) -> Option<FieldValue> {
        self.0.remove(key)
    }

    /// Whether the key is present
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the table has no entries
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over the entries in key order
    pub fn iter(&self) -> btree_map::Iter<'_, String, FieldValue> {
        self.0.iter()
    }

    /// Writes the entries without the leading length
    pub fn encode_entries(&self, dst: &mut BytesMut) -> Result<(), Error> {
        for (key, value) in &self.0 {
            put_short_str(dst, key)?;
            value.encode(dst)?;
        }
        Ok(())
    }

    /// Writes the table with its leading length
    pub fn encode(&self, dst: &mut BytesMut) -> Result<(), Error> {
        let mut buf = BytesMut::new();
        self.encode_entries(&mut buf)?;
        put_long_str(dst, &buf);
        Ok(())
    }

    /// Reads a table with its leading length
    pub fn decode(src: &mut Bytes) -> Result<Self, Error> {
        let len = get_u32(src)? as usize;
        let mut buf = get_bytes(src, len)?;
        let mut table = BTreeMap::new();
        while !buf.is_empty() {
            let key = get_short_str_lossy(&mut buf)?;
            let value = FieldValue::decode(&mut buf)?;
            table.insert(key, value);
        }
        Ok(Self(table))
    }
}

impl FromIterator<(String, FieldValue)> for FieldTable {
    fn from_iter<T: IntoIterator<Item = (String, FieldValue)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a FieldTable {
    type Item = (&'a String, &'a FieldValue);
    type IntoIter = btree_map::Iter<'a, String, FieldValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use bytes::{Bytes, BytesMut};

    use super::{Decimal, FieldTable, FieldValue};
    use crate::Error;

    #[test]
    fn nested_table_survives_the_wire() {
        let inner = FieldTable::new()
            .with("publisher_confirms", true)
            .with("basic.nack", true);
        let table = FieldTable::new()
            .with("product", "amqp091")
            .with("capabilities", inner)
            .with("x-max-length", 10_i32)
            .with("x-expires", 60_000_u32)
            .with(
                "CC",
                vec![FieldValue::from("a"), FieldValue::from("b")],
            )
            .with(
                "price",
                FieldValue::Decimal(Decimal {
                    scale: 2,
                    value: 1999,
                }),
            )
            .with("raw", FieldValue::ByteArray(Bytes::from_static(b"\x00\x01")))
            .with("nothing", FieldValue::Void);

        let mut dst = BytesMut::new();
        table.encode(&mut dst).unwrap();
        let mut src = dst.freeze();
        let decoded = FieldTable::decode(&mut src).unwrap();
        assert!(src.is_empty());
        assert_eq!(decoded, table);
    }

    #[test]
    fn empty_table_is_four_zero_bytes() {
        let mut dst = BytesMut::new();
        FieldTable::new().encode(&mut dst).unwrap();
        assert_eq!(&dst[..], &[0, 0, 0, 0]);
    }

    #[test]
    fn long_string_keeps_non_utf8_octets() {
        let mut src = Bytes::from_static(&[b'S', 0, 0, 0, 2, 0xff, 0xfe]);
        let value = FieldValue::decode(&mut src).unwrap();
        assert_eq!(value, FieldValue::LongString(Bytes::from_static(&[0xff, 0xfe])));
        assert_eq!(value.as_str(), None);
        assert_eq!(value.as_bytes(), Some(&[0xff, 0xfe][..]));

        let mut dst = BytesMut::new();
        value.encode(&mut dst).unwrap();
        assert_eq!(&dst[..], &[b'S', 0, 0, 0, 2, 0xff, 0xfe]);

        assert_eq!(FieldValue::from("dlx").as_str(), Some("dlx"));
    }

    #[test]
    fn unknown_tag_is_rejected() {
        // key "k", tag '?'
        let mut src = Bytes::from_static(&[0, 0, 0, 3, 1, b'k', b'?']);
        assert_eq!(
            FieldTable::decode(&mut src),
            Err(Error::UnknownFieldType(b'?'))
        );
    }
}
