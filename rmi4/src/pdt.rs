//! This module describes the on-device Page Description Table (PDT)

use bitflags::bitflags;
use config::pdt::PDT_ENTRY_SIZE;
use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Raw PDT entry as stored on the device, in ascending address order.
///
/// Entries within a page are laid out downwards from the page's scan start, so the
/// scanner reads them from high to low addresses.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PdtEntry {
    pub query_base_addr: u8,
    pub command_base_addr: u8,
    pub control_base_addr: u8,
    pub data_base_addr: u8,
    /// Interrupt source count (bits 0-2), reserved (bits 3-4),
    /// function version (bits 5-6), reserved (bit 7).
    pub info: u8,
    pub function_number: u8,
}

impl PdtEntry {
    const IRQ_COUNT_MASK: u8 = 0b0000_0111;
    const VERSION_SHIFT: u8 = 5;
    const VERSION_MASK: u8 = 0b0000_0011;

    /// Decode an entry from its on-wire bytes.
    pub const fn from_bytes(raw: &[u8; PDT_ENTRY_SIZE]) -> PdtEntry {
        PdtEntry {
            query_base_addr: raw[0],
            command_base_addr: raw[1],
            control_base_addr: raw[2],
            data_base_addr: raw[3],
            info: raw[4],
            function_number: raw[5],
        }
    }

    /// Encode the entry into its on-wire bytes.
    pub const fn to_bytes(&self) -> [u8; PDT_ENTRY_SIZE] {
        [
            self.query_base_addr,
            self.command_base_addr,
            self.control_base_addr,
            self.data_base_addr,
            self.info,
            self.function_number,
        ]
    }

    /// Number of interrupt sources (0-7) this function owns in the status register.
    pub const fn interrupt_source_count(&self) -> u8 {
        self.info & Self::IRQ_COUNT_MASK
    }

    pub const fn function_version(&self) -> u8 {
        (self.info >> Self::VERSION_SHIFT) & Self::VERSION_MASK
    }

    /// Whether this entry terminates the directory of its page.
    pub const fn is_end_of_pdt(&self) -> bool {
        self.function_number == 0x00 || self.function_number == 0xFF
    }

    /// Base address of one of the four register regions, relative to the page.
    pub const fn base_addr(&self, region: Region) -> u8 {
        match region {
            Region::Query => self.query_base_addr,
            Region::Command => self.command_base_addr,
            Region::Control => self.control_base_addr,
            Region::Data => self.data_base_addr,
        }
    }
}

/// The four register windows every function exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum Region {
    Query = 0,
    Command = 1,
    Control = 2,
    Data = 3,
}

bitflags! {
    /// Device-global PDT properties register.
    pub struct PdtProperties: u8 {
        /// The device implements a bank-select register.
        const HAS_BSR       = 0x20;
        /// The PDT layout deviates from the standard one.
        const NON_STANDARD  = 0x40;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_info_byte() {
        // irqs = 5, reserved bits set, version = 2, bit 7 set
        let entry = PdtEntry::from_bytes(&[0x10, 0x20, 0x30, 0x40, 0b1101_1101, 0x11]);
        assert_eq!(entry.interrupt_source_count(), 5);
        assert_eq!(entry.function_version(), 2);
        assert_eq!(entry.base_addr(Region::Query), 0x10);
        assert_eq!(entry.base_addr(Region::Command), 0x20);
        assert_eq!(entry.base_addr(Region::Control), 0x30);
        assert_eq!(entry.base_addr(Region::Data), 0x40);
        assert_eq!(entry.function_number, 0x11);
        assert!(!entry.is_end_of_pdt());
    }

    #[test]
    fn terminators() {
        let mut raw = [0u8; PDT_ENTRY_SIZE];
        assert!(PdtEntry::from_bytes(&raw).is_end_of_pdt());
        raw[5] = 0xFF;
        assert!(PdtEntry::from_bytes(&raw).is_end_of_pdt());
        raw[5] = 0x01;
        assert!(!PdtEntry::from_bytes(&raw).is_end_of_pdt());
    }

    #[test]
    fn region_selector_from_raw() {
        assert_eq!(Region::try_from(2u8).ok(), Some(Region::Control));
        assert!(Region::try_from(4u8).is_err());
        assert_eq!(u8::from(Region::Data), 3);
    }
}
