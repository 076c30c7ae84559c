//! Configurations for the RMI4 core.
//! The constants are generated by `build.rs` from `flags.json`, grouped by the
//! register block they describe.

#![no_std]
#![deny(missing_docs)]

#[allow(missing_docs)]
mod build_flags {
    include!(concat!(env!("OUT_DIR"), "/build_flags.rs"));
}

pub use build_flags::*;
