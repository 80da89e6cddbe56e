use crate::reference::Reference;
use crate::region::RegionError;

/// Error type for mold operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid reference {reference}: {reason}")]
    InvalidReference {
        reference: Reference,
        reason: String,
    },
    #[error("unsupported node: {0}")]
    UnsupportedNode(&'static str),
    #[error("region is read-only")]
    ReadOnlyViolation,
    #[error("corrupt header: {0}")]
    CorruptHeader(String),
    #[error("capacity overflow: requested {requested} bytes with {available} bytes addressable")]
    CapacityOverflow { requested: u64, available: u64 },
    #[error("index {index} out of bounds for length {length}")]
    IndexOutOfBounds { index: usize, length: usize },
    #[error(transparent)]
    Region(#[from] RegionError),
}

impl Error {
    pub(crate) fn invalid(reference: Reference, reason: impl Into<String>) -> Self {
        Error::InvalidReference {
            reference,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
