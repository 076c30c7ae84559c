//! Error types shared by every layer of the core.

use core::fmt::Display;

use num_enum::TryFromPrimitiveError;

use crate::{pdt::Region, transport::TransportError};

// region: Error Types

/// Errors returned by the bus core to its callers.
///
/// Lookup misses ([Rmi4Error::NoSuchFunction]) are ordinary results for optional
/// functions and are not logged as errors by the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rmi4Error {
    /// The register accessor failed or transferred fewer bytes than requested.
    Transport(TransportError),
    /// The register accessor gave up waiting for the device.
    Timeout,
    /// A directory scan finished without discovering a single function.
    NoFunctionsFound,
    /// The function is not present in the catalog or the registry.
    NoSuchFunction { func_id: u8 },
    /// `free_irq` found nothing to release for this function.
    NotSubscribed { func_id: u8 },
    /// Memory could not be reserved while building registry state.
    Alloc,
    /// A caller-supplied value is out of range.
    InvalidArgument { info: &'static str },
    /// The function bus refused to (un)register one of the function's records.
    Registration { func_id: u8 },
    /// The attention line collaborator failed.
    Platform { info: &'static str },
}

impl From<TransportError> for Rmi4Error {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Timeout => Rmi4Error::Timeout,
            err => Rmi4Error::Transport(err),
        }
    }
}

impl From<TryFromPrimitiveError<Region>> for Rmi4Error {
    fn from(_: TryFromPrimitiveError<Region>) -> Self {
        Rmi4Error::InvalidArgument {
            info: "invalid register region selector",
        }
    }
}

impl From<alloc::collections::TryReserveError> for Rmi4Error {
    fn from(_: alloc::collections::TryReserveError) -> Self {
        Rmi4Error::Alloc
    }
}

impl Display for Rmi4Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Rmi4Error::Transport(err) => write!(f, "transport error: {}", err),
            Rmi4Error::Timeout => f.write_str("register access timed out"),
            Rmi4Error::NoFunctionsFound => f.write_str("no functions found in PDT"),
            Rmi4Error::NoSuchFunction { func_id } => write!(f, "function F{:02X} not found", func_id),
            Rmi4Error::NotSubscribed { func_id } => {
                write!(f, "no IRQ subscription to free for F{:02X}", func_id)
            }
            Rmi4Error::Alloc => f.write_str("out of memory"),
            Rmi4Error::InvalidArgument { info } => write!(f, "invalid argument: {}", info),
            Rmi4Error::Registration { func_id } => {
                write!(f, "failed to (un)register function F{:02X}", func_id)
            }
            Rmi4Error::Platform { info } => write!(f, "platform error: {}", info),
        }
    }
}

impl core::error::Error for Rmi4Error {}

// endregion
