#![cfg_attr(not(test), no_std)]

pub mod counter;
pub mod macros;

pub use counter::DisableCounter;

#[doc(hidden)]
pub use log as __log;
