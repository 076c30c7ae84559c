//! Interrupt status and enable registers, and the attention demultiplexer.
//!
//! Every function owns a contiguous run of bits in the device-global interrupt
//! status register. The attention handler reads that register once and hands the
//! event to the subscribers of every function whose bits are all pending.

use core::sync::atomic::{AtomicU8, Ordering};

use config::{
    f01::{F01_FUNCTION_ID, F01_IRQ_ADDR_OFFSET, F01_IRQ_CONTROL_OFFSET},
    irq::MAX_IRQ_READ_LEN,
};
use log::{error, warn};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use utils::debug_ex;

use crate::{
    catalog::{Catalog, CatalogEntry},
    error::Rmi4Error,
    pdt::Region,
    registry::FunctionRegistry,
    transport::RegisterAccessor,
};

const MASK_BITS: usize = u32::BITS as usize;

utils::define_struct!(bits, IrqMask, u32);

impl IrqMask {
    /// Mask of `count` bits starting at bit `first`. Bits past 31 are dropped.
    pub fn from_range(first: usize, count: usize) -> IrqMask {
        let inner = (first..first.saturating_add(count))
            .take_while(|bit| *bit < MASK_BITS)
            .fold(0u32, |acc, bit| acc | (1 << bit));
        IrqMask { inner }
    }

    /// Decode a little-endian register value of up to four bytes.
    pub fn from_le_bytes(raw: &[u8]) -> IrqMask {
        let inner = raw
            .iter()
            .take(MAX_IRQ_READ_LEN)
            .enumerate()
            .fold(0u32, |acc, (i, byte)| acc | (*byte as u32) << (8 * i));
        IrqMask { inner }
    }

    pub const fn to_le_bytes(&self) -> [u8; MAX_IRQ_READ_LEN] {
        self.inner.to_le_bytes()
    }

    /// All bits of a register `len` bytes wide.
    pub const fn full(len: usize) -> IrqMask {
        let inner = if len >= MAX_IRQ_READ_LEN {
            u32::MAX
        } else {
            (1u32 << (8 * len)) - 1
        };
        IrqMask { inner }
    }
}

/// A per-function interrupt consumer.
///
/// Handlers run on the attention path with no core lock held, so they may call
/// back into the core (for example to read their data registers).
pub trait IrqHandler: Send + Sync {
    fn handle_irq(&self, func_id: u8);
}

/// Identifies one subscription returned by `request_irq`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IrqToken(pub(crate) usize);

/// Observable state of the attention demultiplexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum DemuxState {
    Idle = 0,
    ReadStatus = 1,
    Dispatch = 2,
}

/// Access to the F01 interrupt enable and status registers.
///
/// Holds a copy of the F01 catalog entry so no catalog lock is needed while the
/// registers are touched.
pub(crate) struct IrqControl<'a> {
    accessor: &'a dyn RegisterAccessor,
    f01: CatalogEntry,
    read_len: usize,
}

impl<'a> IrqControl<'a> {
    pub fn new(accessor: &'a dyn RegisterAccessor, catalog: &Catalog) -> Result<IrqControl<'a>, Rmi4Error> {
        let Some(f01) = catalog.base_function() else {
            error!("F{:02X} not present, interrupts unavailable", F01_FUNCTION_ID);
            return Err(Rmi4Error::NoSuchFunction {
                func_id: F01_FUNCTION_ID,
            });
        };
        Ok(IrqControl {
            accessor,
            f01: *f01,
            read_len: catalog.irq_read_len(),
        })
    }

    pub fn read_len(&self) -> usize {
        self.read_len
    }

    fn enable_addr(&self) -> Result<u16, Rmi4Error> {
        self.f01.address(Region::Control, F01_IRQ_CONTROL_OFFSET)
    }

    fn status_addr(&self) -> Result<u16, Rmi4Error> {
        self.f01.address(Region::Data, F01_IRQ_ADDR_OFFSET)
    }

    /// Read and decode the interrupt status register. Reading also clears it.
    pub fn read_status(&self) -> Result<IrqMask, Rmi4Error> {
        let addr = self.status_addr()?;
        let mut raw = [0u8; MAX_IRQ_READ_LEN];
        self.accessor
            .read_exact(addr, &mut raw[..self.read_len])
            .inspect_err(|err| error!("Failed to read IRQ status at {:#06x}: {}", addr, err))?;
        Ok(IrqMask::from_le_bytes(&raw[..self.read_len]))
    }

    /// Set or clear `mask` in the enable register, leaving the other bits alone.
    pub fn set_state(&self, func_id: u8, mask: IrqMask, enable: bool) -> Result<(), Rmi4Error> {
        let addr = self.enable_addr()?;
        let mut raw = [0u8; MAX_IRQ_READ_LEN];
        self.accessor
            .read_exact(addr, &mut raw[..self.read_len])
            .inspect_err(|err| error!("Failed to read IRQ enable register: {}", err))?;

        let current = IrqMask::from_le_bytes(&raw[..self.read_len]);
        let updated = if enable { current | mask } else { current & !mask };
        debug_ex!(
            "{} F{:02X} irqs {:#x}: {:#x} -> {:#x}",
            if enable { "Enable" } else { "Disable" },
            func_id,
            *mask,
            *current,
            *updated
        );

        self.accessor
            .write_all(addr, &updated.to_le_bytes()[..self.read_len])
            .inspect_err(|err| error!("Failed to write IRQ enable register: {}", err))?;
        Ok(())
    }

    /// Clear the whole enable register, then read status to drop anything pending.
    pub fn disable_all(&self) -> Result<(), Rmi4Error> {
        let addr = self.enable_addr()?;
        let zero = [0u8; MAX_IRQ_READ_LEN];
        self.accessor
            .write_all(addr, &zero[..self.read_len])
            .inspect_err(|err| error!("Failed to disable all IRQs: {}", err))?;
        self.read_status().map(|_| ())
    }
}

/// Outcome of one pass through the demultiplexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dispatch {
    pub status: IrqMask,
    /// Number of functions whose subscribers were invoked.
    pub functions: usize,
}

/// Demultiplexer state shared between the attention path and observers.
pub(crate) struct Demux {
    state: AtomicU8,
}

impl Demux {
    pub const fn new() -> Demux {
        Demux {
            state: AtomicU8::new(DemuxState::Idle as u8),
        }
    }

    pub fn state(&self) -> DemuxState {
        DemuxState::try_from(self.state.load(Ordering::Acquire)).unwrap_or(DemuxState::Idle)
    }

    fn enter(&self, state: DemuxState) {
        self.state.store(state.into(), Ordering::Release);
    }

    /// Read the status register and invoke the subscribers of every pending function.
    pub fn run(&self, ctl: &IrqControl, registry: &FunctionRegistry) -> Result<Dispatch, Rmi4Error> {
        self.enter(DemuxState::ReadStatus);
        let status = match ctl.read_status() {
            Ok(status) => status,
            Err(err) => {
                self.enter(DemuxState::Idle);
                return Err(err);
            }
        };

        let full = IrqMask::full(ctl.read_len());
        if status.is_empty() || status == full {
            warn!("Suspicious IRQ status {:#x}, possible communication failure", *status);
        }

        self.enter(DemuxState::Dispatch);
        let pending = registry.pending(status);
        let mut functions = 0;
        let mut last = None;
        for (func_id, handler) in pending.iter() {
            if last != Some(*func_id) {
                functions += 1;
                last = Some(*func_id);
            }
            handler.handle_irq(*func_id);
        }
        self.enter(DemuxState::Idle);

        Ok(Dispatch { status, functions })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockDevice, PdtImage};

    fn catalog_for(dev: &MockDevice) -> Catalog {
        crate::scanner::scan(dev, crate::catalog::IrqReadLen::Exact).unwrap()
    }

    #[test]
    fn mask_ranges() {
        assert_eq!(*IrqMask::from_range(0, 2), 0b11);
        assert_eq!(*IrqMask::from_range(2, 1), 0b100);
        assert!(IrqMask::from_range(5, 0).is_empty());
        assert_eq!(*IrqMask::from_range(30, 5), 0xC000_0000);
        assert!(IrqMask::from_range(40, 3).is_empty());
        assert!(IrqMask::from_range(1, 2).is_subset_of(&IrqMask::from(0b111)));
        assert!(!IrqMask::from_range(1, 2).is_subset_of(&IrqMask::from(0b011)));
    }

    #[test]
    fn little_endian_status() {
        assert_eq!(*IrqMask::from_le_bytes(&[0x01, 0x02]), 0x0201);
        assert_eq!(IrqMask::from(0x0403_0201).to_le_bytes(), [1, 2, 3, 4]);
        assert_eq!(*IrqMask::full(1), 0xFF);
        assert_eq!(*IrqMask::full(4), u32::MAX);
    }

    #[test]
    fn control_requires_base_function() {
        let dev = PdtImage::new().function(0, 0x11, 1).build();
        let catalog = catalog_for(&dev);
        assert!(matches!(
            IrqControl::new(&dev, &catalog),
            Err(Rmi4Error::NoSuchFunction { func_id: 0x01 })
        ));
    }

    #[test]
    fn set_state_is_read_modify_write() {
        let dev = PdtImage::new().function(0, 0x01, 2).function(0, 0x11, 7).build();
        let catalog = catalog_for(&dev);
        let ctl = IrqControl::new(&dev, &catalog).unwrap();
        assert_eq!(ctl.read_len(), 2);

        let enable = PdtImage::ENABLE_REG;
        dev.poke(enable, &[0x01, 0x00]);
        ctl.set_state(0x11, IrqMask::from_range(2, 7), true).unwrap();
        assert_eq!(dev.peek(enable, 2), vec![0xFD, 0x01]);

        ctl.set_state(0x11, IrqMask::from_range(2, 7), false).unwrap();
        assert_eq!(dev.peek(enable, 2), vec![0x01, 0x00]);
    }

    #[test]
    fn disable_all_clears_and_reads_status() {
        let dev = PdtImage::new().function(0, 0x01, 3).build();
        let catalog = catalog_for(&dev);
        let ctl = IrqControl::new(&dev, &catalog).unwrap();
        dev.poke(PdtImage::ENABLE_REG, &[0x07]);
        dev.clear_log();

        ctl.disable_all().unwrap();
        assert_eq!(dev.peek(PdtImage::ENABLE_REG, 1), vec![0x00]);
        assert!(dev.reads().contains(&(PdtImage::STATUS_REG, 1)));
    }

    #[test]
    fn status_read_failure_returns_to_idle() {
        let dev = PdtImage::new().function(0, 0x01, 1).build();
        let catalog = catalog_for(&dev);
        let registry = FunctionRegistry::new(Vec::new());
        registry.populate(&catalog).unwrap();
        let ctl = IrqControl::new(&dev, &catalog).unwrap();
        let demux = Demux::new();

        dev.fail_reads(Some(crate::transport::TransportError::Bus));
        assert!(demux.run(&ctl, &registry).is_err());
        assert_eq!(demux.state(), DemuxState::Idle);
    }
}
