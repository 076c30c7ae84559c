//! The function catalog built by a PDT scan.

use alloc::vec::Vec;
use config::{
    f01::F01_FUNCTION_ID,
    irq::MAX_IRQ_READ_LEN,
    pdt::PAGE_SIZE,
};

use crate::{
    error::Rmi4Error,
    pdt::{PdtEntry, Region},
};

/// How many status bytes to read for a given number of interrupt sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IrqReadLen {
    /// One byte per started group of eight sources.
    #[default]
    Exact,
    /// `total / 9 + 1`, as computed by earlier drivers for this bus.
    Legacy,
}

impl IrqReadLen {
    /// Number of status bytes for `total` interrupt sources, clamped to `1..=MAX_IRQ_READ_LEN`.
    pub fn bytes_for(&self, total: usize) -> usize {
        let len = match self {
            IrqReadLen::Exact => total.div_ceil(8),
            IrqReadLen::Legacy => total / 9 + 1,
        };
        len.clamp(1, MAX_IRQ_READ_LEN)
    }
}

/// One discovered function and the page it was found on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogEntry {
    pub bank: u8,
    pub pdt: PdtEntry,
}

impl CatalogEntry {
    pub const fn function_number(&self) -> u8 {
        self.pdt.function_number
    }

    /// Absolute address of `offset` inside `region`: `bank * 256 + base + offset`.
    pub fn address(&self, region: Region, offset: u16) -> Result<u16, Rmi4Error> {
        (self.bank as u16)
            .checked_mul(PAGE_SIZE)
            .and_then(|page| page.checked_add(self.pdt.base_addr(region) as u16))
            .and_then(|base| base.checked_add(offset))
            .ok_or(Rmi4Error::InvalidArgument {
                info: "register address out of range",
            })
    }
}

/// Ordered collection of discovered functions.
///
/// Entries keep discovery order, and function numbers are unique within one catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalog {
    entries: Vec<CatalogEntry>,
    irq_count: usize,
    irq_read_len: usize,
}

impl Catalog {
    pub const fn new() -> Catalog {
        Catalog {
            entries: Vec::new(),
            irq_count: 0,
            irq_read_len: 0,
        }
    }

    /// Append an entry unless its function number is already present.
    ///
    /// Return `false` for a duplicate, leaving the catalog untouched.
    pub(crate) fn insert(&mut self, entry: CatalogEntry, policy: IrqReadLen) -> bool {
        if self.contains(entry.function_number()) {
            return false;
        }
        self.irq_count += entry.pdt.interrupt_source_count() as usize;
        self.irq_read_len = policy.bytes_for(self.irq_count);
        self.entries.push(entry);
        true
    }

    pub fn get(&self, func_id: u8) -> Option<&CatalogEntry> {
        self.entries.iter().find(|e| e.function_number() == func_id)
    }

    pub fn contains(&self, func_id: u8) -> bool {
        self.get(func_id).is_some()
    }

    /// The always-present device control function (F01).
    pub fn base_function(&self) -> Option<&CatalogEntry> {
        self.get(F01_FUNCTION_ID)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CatalogEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total interrupt sources across all functions.
    pub fn irq_count(&self) -> usize {
        self.irq_count
    }

    /// Width of the interrupt status and enable registers in bytes.
    pub fn irq_read_len(&self) -> usize {
        self.irq_read_len.max(1)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.irq_count = 0;
        self.irq_read_len = 0;
    }
}
