//! Error type for the fallible `try_*` operations.
//!
//! Each `try_xxx` method has an `xxx` counterpart that treats the same
//! condition as a contract violation and panics with the error message.
//! Allocation failure never surfaces here; it is fatal.

use thiserror::Error;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Error)]
pub enum Error {
    /// Hash map capacities must be zero or a power of two.
    #[error("capacity {0} is not a power of two")]
    NotPowerOfTwo(usize),
    /// The requested capacity cannot hold the live entries.
    #[error("capacity {capacity} cannot hold {count} entries")]
    CapacityTooSmall { capacity: usize, count: usize },
    /// Ownership can only be released from the last owner.
    #[error("pointer is not unique (use count {0})")]
    NotUnique(usize),
}

pub type Result<T> = core::result::Result<T, Error>;
