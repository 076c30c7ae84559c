//! Bus enumeration and interrupt demultiplexing for RMI4 devices.
//!
//! A device describes its functions in a paged table (the PDT). [Rmi4Core::probe]
//! scans that table, creates one function object per discovered function, and
//! routes the device's single attention interrupt to the subscribers of each
//! function.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

mod attrs;
pub mod catalog;
pub mod driver;
pub mod error;
pub mod function;
pub mod irq;
pub mod logging;
pub mod notify;
pub mod pdt;
pub mod platform;
pub mod registry;
mod reset;
pub mod scanner;
pub mod transport;

#[cfg(test)]
mod testing;

pub use catalog::{Catalog, CatalogEntry, IrqReadLen};
pub use driver::{FunctionHandle, Rmi4Core};
pub use error::Rmi4Error;
pub use function::{FunctionData, FunctionInfo, FunctionRecord};
pub use irq::{DemuxState, Dispatch, IrqHandler, IrqMask, IrqToken};
pub use notify::{NotificationEvent, NotificationHandler, NotifyToken};
pub use pdt::{PdtEntry, PdtProperties, Region};
pub use platform::{AttentionHandler, AttentionLine, PlatformData, TriggerFlags};
pub use registry::{FunctionBus, FunctionRegistry};
pub use transport::{RegisterAccessor, TransportError};
