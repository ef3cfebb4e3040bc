/// Errors raised while translating AMQP 0-9-1 values to and from bytes
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// The input ended before the value was complete
    #[error("Unexpected end of input")]
    UnexpectedEof,

    /// The (class-id, method-id) pair is not known to this implementation
    #[error("Unknown method (class {class_id}, method {method_id})")]
    UnknownMethod {
        /// Class id found on the wire
        class_id: u16,
        /// Method id found on the wire
        method_id: u16,
    },

    /// The field value type octet is not known
    #[error("Unknown field value type {0:#04x}")]
    UnknownFieldType(u8),

    /// A string field is not valid UTF-8
    #[error("String field is not valid UTF-8")]
    InvalidUtf8,

    /// Short strings are limited to 255 octets
    #[error("Short string is {0} bytes long, which exceeds 255")]
    ShortStringTooLong(usize),

    /// The property flags require a continuation word, which no 0-9-1 class uses
    #[error("Property flags continuation is not supported")]
    PropertyFlagsContinuation,
}
