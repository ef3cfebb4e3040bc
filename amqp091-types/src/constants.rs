//! Protocol constants

/// Protocol header sent by the client before anything else
pub const PROTOCOL_HEADER: [u8; 8] = [b'A', b'M', b'Q', b'P', 0, 0, 9, 1];

/// Method frame type
pub const FRAME_METHOD: u8 = 1;

/// Content header frame type
pub const FRAME_HEADER: u8 = 2;

/// Content body frame type
pub const FRAME_BODY: u8 = 3;

/// Heartbeat frame type
pub const FRAME_HEARTBEAT: u8 = 8;

/// Every frame is terminated by this octet
pub const FRAME_END: u8 = 0xCE;

/// Size of the frame header: type (1) + channel (2) + size (4)
pub const FRAME_HEADER_SIZE: usize = 7;

/// Frame header plus the frame-end octet
pub const FRAME_OVERHEAD: usize = FRAME_HEADER_SIZE + 1;

/// Smallest frame-max a peer may negotiate
pub const FRAME_MIN_SIZE: u32 = 4096;

/* ------------------------------- Reply codes ------------------------------ */

/// Indicates that the method completed successfully
pub const REPLY_SUCCESS: u16 = 200;

/// The client attempted to transfer content larger than the server could accept
pub const CONTENT_TOO_LARGE: u16 = 311;

/// A mandatory message could not be routed
pub const NO_ROUTE: u16 = 312;

/// An immediate message could not be delivered
pub const NO_CONSUMERS: u16 = 313;

/// An operator intervened to close the connection
pub const CONNECTION_FORCED: u16 = 320;

/// The client tried to work with an unknown virtual host
pub const INVALID_PATH: u16 = 402;

/// The client attempted to work with a server entity it has no access to
pub const ACCESS_REFUSED: u16 = 403;

/// The client asked for a specific entity which does not exist
pub const NOT_FOUND: u16 = 404;

/// The client attempted to work with an entity that is locked by another client
pub const RESOURCE_LOCKED: u16 = 405;

/// The client requested a method that was not allowed because some precondition failed
pub const PRECONDITION_FAILED: u16 = 406;

/// The sender sent a malformed frame
pub const FRAME_ERROR: u16 = 501;

/// The sender sent a frame that contained illegal values for one or more fields
pub const SYNTAX_ERROR: u16 = 502;

/// The client sent an invalid sequence of frames
pub const COMMAND_INVALID: u16 = 503;

/// The client attempted to work with a channel that had not been correctly opened
pub const CHANNEL_ERROR: u16 = 504;

/// The peer sent a frame that was not expected
pub const UNEXPECTED_FRAME: u16 = 505;

/// The server could not complete the method because it lacked sufficient resources
pub const RESOURCE_ERROR: u16 = 506;

/// The client tried to work with some entity in a manner that is prohibited
pub const NOT_ALLOWED: u16 = 530;

/// The client tried to use functionality that is not implemented in the server
pub const NOT_IMPLEMENTED: u16 = 540;

/// The server could not complete the method because of an internal error
pub const INTERNAL_ERROR: u16 = 541;

/// Returns the symbolic name of a reply code
pub fn reply_code_name(code: u16) -> &'static str {
    match code {
        REPLY_SUCCESS => "REPLY_SUCCESS",
        CONTENT_TOO_LARGE => "CONTENT_TOO_LARGE",
        NO_ROUTE => "NO_ROUTE",
        NO_CONSUMERS => "NO_CONSUMERS",
        CONNECTION_FORCED => "CONNECTION_FORCED",
        INVALID_PATH => "INVALID_PATH",
        ACCESS_REFUSED => "ACCESS_REFUSED",
        NOT_FOUND => "NOT_FOUND",
        RESOURCE_LOCKED => "RESOURCE_LOCKED",
        PRECONDITION_FAILED => "PRECONDITION_FAILED",
        FRAME_ERROR => "FRAME_ERROR",
        SYNTAX_ERROR => "SYNTAX_ERROR",
        COMMAND_INVALID => "COMMAND_INVALID",
        CHANNEL_ERROR => "CHANNEL_ERROR",
        UNEXPECTED_FRAME => "UNEXPECTED_FRAME",
        RESOURCE_ERROR => "RESOURCE_ERROR",
        NOT_ALLOWED => "NOT_ALLOWED",
        NOT_IMPLEMENTED => "NOT_IMPLEMENTED",
        INTERNAL_ERROR => "INTERNAL_ERROR",
        _ => "UNKNOWN",
    }
}
