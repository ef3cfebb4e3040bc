#![deny(missing_docs, missing_debug_implementations)]

//! Implements the AMQP 0-9-1 wire types as defined in the
//! [specification](https://www.rabbitmq.com/resources/specs/amqp0-9-1.pdf).
//!
//! Everything in this crate is a pure translation between Rust values and bytes. There is no
//! runtime and no connection state here; the `amqp091` crate builds the protocol engine on top.

pub mod constants;
pub mod definitions;
pub mod methods;
pub mod primitives;
pub mod properties;

mod error;
pub use error::Error;
