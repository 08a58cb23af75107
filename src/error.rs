//! Errors from the library.

use core::{error, fmt};

/// Errors returned by this library.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SharedError {
    /// The `SharedPtr` is empty, there is nothing to dereference.
    NullDereference,
    /// No memory could be allocated, for either the payload or the control block.
    MemoryExhausted,
}

impl fmt::Display for SharedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "{:?}", self)
    }
}

impl error::Error for SharedError {}

// mod tests
