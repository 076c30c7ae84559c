//! The `bsr` attribute over the PDT properties register.

use alloc::{format, string::String};

use config::pdt::PDT_PROPERTIES_ADDR;
use log::error;

use crate::{driver::Rmi4Core, error::Rmi4Error, pdt::PdtProperties};

impl Rmi4Core {
    fn read_properties(&self) -> Result<u8, Rmi4Error> {
        let mut raw = [0u8; 1];
        self.accessor
            .read_exact(PDT_PROPERTIES_ADDR, &mut raw)
            .inspect_err(|err| error!("{}: failed to read PDT properties: {}", self.name(), err))?;
        Ok(raw[0])
    }

    fn write_properties(&self, raw: u8) -> Result<(), Rmi4Error> {
        self.accessor
            .write_all(PDT_PROPERTIES_ADDR, &[raw])
            .inspect_err(|err| error!("{}: failed to write PDT properties: {}", self.name(), err))?;
        Ok(())
    }

    pub fn has_bsr(&self) -> Result<bool, Rmi4Error> {
        let _guard = self.props_lock.lock();
        let props = PdtProperties::from_bits_truncate(self.read_properties()?);
        Ok(props.contains(PdtProperties::HAS_BSR))
    }

    /// Set or clear the bank-select bit, preserving the rest of the register.
    pub fn set_has_bsr(&self, enable: bool) -> Result<(), Rmi4Error> {
        let _guard = self.props_lock.lock();
        self.update_bsr(enable)
    }

    fn update_bsr(&self, enable: bool) -> Result<(), Rmi4Error> {
        let raw = self.read_properties()?;
        let bit = PdtProperties::HAS_BSR.bits();
        self.write_properties(if enable { raw | bit } else { raw & !bit })
    }

    /// `"0\n"` or `"1\n"`.
    pub fn bsr_show(&self) -> Result<String, Rmi4Error> {
        let has_bsr = self.has_bsr()?;
        Ok(format!("{}\n", has_bsr as u8))
    }

    /// Parse a decimal `0` or `1` and write it to the bank-select bit.
    /// Return the number of bytes consumed.
    pub fn bsr_store(&self, buf: &str) -> Result<usize, Rmi4Error> {
        let _guard = self.props_lock.lock();
        let value: u32 = buf.trim().parse().map_err(|_| {
            error!("{}: invalid value '{}' written to BSR", self.name(), buf.trim());
            Rmi4Error::InvalidArgument {
                info: "bsr expects a decimal number",
            }
        })?;
        if value > 1 {
            error!("{}: invalid value {}, accepted are 0 and 1", self.name(), value);
            return Err(Rmi4Error::InvalidArgument {
                info: "bsr accepts 0 or 1",
            });
        }
        self.update_bsr(value == 1)?;
        Ok(buf.len())
    }
}
