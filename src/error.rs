use core::fmt;

/// The error type for heap operations.
///
/// A failed operation never leaves partial side effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum AllocError {
    /// The requested size is zero or exceeds [`MAX_REQUEST`].
    ///
    /// [`MAX_REQUEST`]: crate::MAX_REQUEST
    InvalidRequest,
    /// No group has a free block large enough.
    OutOfMemory,
    /// The heap has no group, either because discovery did not run yet or
    /// because it found no RAM bank.
    Uninitialized,
    /// Discovery was already performed for this heap.
    AlreadyInitialized,
    /// The address is not the payload start of any block of this heap.
    ForeignAddress,
    /// The block is already free.
    DoubleRelease,
    /// The handle refers to a block that was released.
    StaleHandle,
}

impl fmt::Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::InvalidRequest => "invalid allocation size",
            Self::OutOfMemory => "out of memory",
            Self::Uninitialized => "heap has no RAM bank",
            Self::AlreadyInitialized => "heap is already initialized",
            Self::ForeignAddress => "address was not returned by this heap",
            Self::DoubleRelease => "block is already free",
            Self::StaleHandle => "handle refers to a released block",
        })
    }
}

#[rustversion::since(1.81)]
impl core::error::Error for AllocError {}
