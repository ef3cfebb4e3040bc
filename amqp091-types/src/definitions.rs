//! Definitions shared by the method classes

use std::fmt;

use crate::constants::{reply_code_name, REPLY_SUCCESS};

/// Identifies a method on the wire by its (class-id, method-id) pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MethodId {
    /// Class id
    pub class_id: u16,

    /// Method id within the class
    pub method_id: u16,
}

impl MethodId {
    /// Creates a new method id
    pub const fn new(class_id: u16, method_id: u16) -> Self {
        Self {
            class_id,
            method_id,
        }
    }
}

impl fmt::Display for MethodId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.class_id, self.method_id)
    }
}

/// The reason carried by `connection.close` and `channel.close`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exception {
    /// Reply code, see [`crate::constants`]
    pub reply_code: u16,

    /// Human readable reply text
    pub reply_text: String,

    /// Class of the method that caused the exception, zero if none
    pub class_id: u16,

    /// Method that caused the exception, zero if none
    pub method_id: u16,
}

impl Exception {
    /// Creates an exception that is not tied to a failing method
    pub fn new(reply_code: u16, reply_text: impl Into<String>) -> Self {
        Self {
            reply_code,
            reply_text: reply_text.into(),
            class_id: 0,
            method_id: 0,
        }
    }

    /// Records the method that caused the exception
    pub fn caused_by(mut self, method: MethodId) -> Self {
        self.class_id = method.class_id;
        self.method_id = method.method_id;
        self
    }

    /// Whether the reply code reports a normal shutdown rather than a failure
    pub fn is_success(&self) -> bool {
        self.reply_code == REPLY_SUCCESS
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}) {:?}",
            self.reply_code,
            reply_code_name(self.reply_code),
            self.reply_text
        )?;
        if self.class_id != 0 {
            write!(f, " caused by {}.{}", self.class_id, self.method_id)?;
        }
        Ok(())
    }
}
