//! Recoverable errors.
//!
//! Contract violations (setting a `Final` entry, clearing referenced
//! entries, dereferencing an unavailable resource, ...) panic instead.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceError {
    /// The manager was built without a store for this payload type.
    UnregisteredType { type_name: &'static str },
    /// Another manager already holds this thread's default-instance slot.
    InstanceExists,
}

impl fmt::Display for ResourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceError::UnregisteredType { type_name } => {
                write!(f, "type {type_name} is not managed by this resource manager")
            }
            ResourceError::InstanceExists => {
                write!(f, "another resource manager instance already exists")
            }
        }
    }
}

impl std::error::Error for ResourceError {}
