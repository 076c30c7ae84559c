//! Walk the paged register space and build a [Catalog] from the PDT.

use config::pdt::{MAX_PAGE, PAGE_SIZE, PDT_END_SCAN_LOCATION, PDT_ENTRY_SIZE, PDT_START_SCAN_LOCATION};
use log::{error, info};
use utils::debug_ex;

use crate::{
    catalog::{Catalog, CatalogEntry, IrqReadLen},
    error::Rmi4Error,
    pdt::PdtEntry,
    transport::RegisterAccessor,
};

/// Reader over the PDT of one device.
pub struct PdtScanner<'a> {
    accessor: &'a dyn RegisterAccessor,
    policy: IrqReadLen,
    catalog: Catalog,
}

/// Basic Reader Functions
impl<'a> PdtScanner<'a> {
    pub fn new(accessor: &'a dyn RegisterAccessor, policy: IrqReadLen) -> PdtScanner<'a> {
        PdtScanner {
            accessor,
            policy,
            catalog: Catalog::new(),
        }
    }

    /// Read one entry at `addr`. A short read is an error for the whole scan.
    fn read_entry(&self, addr: u16) -> Result<PdtEntry, Rmi4Error> {
        let mut raw = [0u8; PDT_ENTRY_SIZE];
        self.accessor.read_exact(addr, &mut raw).inspect_err(|err| {
            error!("Read PDT entry at {:#06x} failed: {}", addr, err);
        })?;
        Ok(PdtEntry::from_bytes(&raw))
    }

    /// Scan a single page from its scan start downwards until a terminator.
    fn read_page(&mut self, page: u8) -> Result<(), Rmi4Error> {
        let page_start = page as u16 * PAGE_SIZE;
        let pdt_end = page_start + PDT_END_SCAN_LOCATION;
        let mut addr = page_start + PDT_START_SCAN_LOCATION;

        while addr >= pdt_end {
            let entry = self.read_entry(addr)?;
            if entry.is_end_of_pdt() {
                debug_ex!("End of PDT on page {:#04x}", page);
                break;
            }

            let func = entry.function_number;
            if self.catalog.insert(CatalogEntry { bank: page, pdt: entry }, self.policy) {
                debug_ex!(
                    "Adding F{:02X} at bank {:#04x}: {:02x?}",
                    func,
                    page,
                    entry.to_bytes()
                );
                info!("Chip supports function F{:02X}", func);
            } else {
                debug_ex!("F{:02X} already registered", func);
            }

            match addr.checked_sub(PDT_ENTRY_SIZE as u16) {
                Some(next) => addr = next,
                None => break,
            }
        }
        Ok(())
    }

    fn read_internal(&mut self) -> Result<Catalog, Rmi4Error> {
        for page in 0..=MAX_PAGE {
            self.read_page(page)?;
        }
        if self.catalog.is_empty() {
            error!("No functions found. Aborting!");
            return Err(Rmi4Error::NoFunctionsFound);
        }
        debug_ex!(
            "PDT scan successful: {} functions, {} irqs, {} status bytes",
            self.catalog.len(),
            self.catalog.irq_count(),
            self.catalog.irq_read_len()
        );
        Ok(core::mem::take(&mut self.catalog))
    }

    /// Scan pages `0..=MAX_PAGE` and return the discovered catalog.
    ///
    /// The scan always starts from an empty catalog, and nothing discovered so far is
    /// kept when it fails.
    pub fn scan(&mut self) -> Result<Catalog, Rmi4Error> {
        self.catalog.clear();
        self.read_internal().inspect_err(|_| {
            error!("PDT scan failed");
            self.catalog.clear();
        })
    }
}

/// Scan the PDT behind `accessor` with the given status read-length policy.
pub fn scan(accessor: &dyn RegisterAccessor, policy: IrqReadLen) -> Result<Catalog, Rmi4Error> {
    PdtScanner::new(accessor, policy).scan()
}
