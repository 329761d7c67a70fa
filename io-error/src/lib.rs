//! # IO Error
//!
//! Error taxonomy shared by the handle crates.
//!
//! Three families matter to callers: resource faults (the underlying file
//! or stream failed, possibly recoverable by the caller), contract
//! violations (the handle was driven outside its state machine, a caller
//! bug), and [`HandleError::Restart`], the transfer checkpoint fault that
//! only the transfer loop is allowed to recover from.

use core::fmt;

use thiserror::Error;

use io_range::{Length, Offset};

pub type Result<T> = std::result::Result<T, HandleError>;

#[derive(Error, Debug)]
pub enum HandleError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}: cannot be opened: {1}")]
    Open(String, #[source] std::io::Error),

    #[error("read error on {0}: {1}")]
    Read(String, #[source] std::io::Error),

    #[error("write error on {0}: {1}")]
    Write(String, #[source] std::io::Error),

    /// Operation not provided by this handle kind.
    #[error("{0} is not supported by {1}")]
    Unsupported(&'static str, String),

    /// The handle was used outside its contract; this is a caller bug.
    #[error("handle contract violated: {0}")]
    Contract(String),

    /// A transfer moved a different byte count than the source announced.
    #[error("transferred {actual} bytes, expected {expected}")]
    SizeMismatch { expected: Length, actual: Length },

    /// Recoverable transfer interruption; resume from the carried offset.
    #[error("transfer restart requested from offset {0}")]
    Restart(Offset),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl HandleError {
    /// Builds the error for an operation a handle does not implement.
    pub fn unsupported<H>(operation: &'static str, handle: &H) -> Self
    where
        H: fmt::Display + ?Sized,
    {
        HandleError::Unsupported(operation, handle.to_string())
    }

    /// The resume checkpoint, if this is a restart fault.
    ///
    /// Transfer loops use this to distinguish the one recoverable fault
    /// from everything fatal.
    pub fn restart_offset(&self) -> Option<Offset> {
        match self {
            HandleError::Restart(offset) => Some(*offset),
            _ => None,
        }
    }
}
