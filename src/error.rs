//! Defines error types.
use thiserror::Error;

/// Why a value could not be enqueued. The rejected value is handed back to
/// the caller in every case, so a failed push never loses data.
#[derive(Error, Debug, Eq, PartialEq)]
pub enum PushError<T> {
    /// No slot was available and the queue was not allowed to allocate.
    #[error("queue is full")]
    Full(T),
    /// The deadline passed while waiting for a free slot.
    #[error("timed out waiting for a free slot")]
    Timeout(T),
    /// A new block could not be allocated.
    #[error("block allocation failed")]
    Alloc(T),
}

impl<T> PushError<T> {
    /// Recover the value that could not be enqueued.
    #[inline]
    pub fn into_inner(self) -> T {
        match self {
            PushError::Full(value) => value,
            PushError::Timeout(value) => value,
            PushError::Alloc(value) => value,
        }
    }
}

#[cold]
#[inline(never)]
pub(crate) fn full<T>(value: T) -> PushError<T> {
    PushError::Full(value)
}

#[cold]
#[inline(never)]
pub(crate) fn timeout<T>(value: T) -> PushError<T> {
    PushError::Timeout(value)
}

#[cold]
#[inline(never)]
pub(crate) fn alloc<T>(value: T) -> PushError<T> {
    PushError::Alloc(value)
}
