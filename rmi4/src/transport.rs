//! Register accessor abstraction.
//!
//! The core never talks to a physical bus directly. Every register read or write goes
//! through a [RegisterAccessor] supplied by the platform (I2C, SPI, or a test double).
//!
//! Notes:
//! - Accessors are called from the attention handler as well as from control paths,
//!   so implementations must not suspend and should bound every transfer in time,
//!   reporting [TransportError::Timeout] instead of stalling the caller.
//! - Addresses are 16 bits wide: `page * 256 + offset`.

use core::fmt::Display;

/// Failures reported by a [RegisterAccessor].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    /// The bus reported a generic I/O failure.
    Bus,
    /// The device did not acknowledge the transfer.
    Nack,
    /// The transfer did not complete within the accessor's deadline.
    Timeout,
    /// Fewer bytes than requested were transferred.
    ShortTransfer {
        addr: u16,
        expected: usize,
        actual: usize,
    },
}

impl Display for TransportError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            TransportError::Bus => f.write_str("bus error"),
            TransportError::Nack => f.write_str("device did not acknowledge"),
            TransportError::Timeout => f.write_str("timed out"),
            TransportError::ShortTransfer {
                addr,
                expected,
                actual,
            } => write!(
                f,
                "short transfer at {:#06x}: {} of {} bytes",
                addr, actual, expected
            ),
        }
    }
}

/// Synchronous access to the device's register space.
pub trait RegisterAccessor: Send + Sync {
    /// Read up to `buf.len()` bytes starting at `addr`. Return the number of bytes read.
    fn read(&self, addr: u16, buf: &mut [u8]) -> Result<usize, TransportError>;

    /// Write `data` starting at `addr`. Return the number of bytes written.
    fn write(&self, addr: u16, data: &[u8]) -> Result<usize, TransportError>;

    /// Read exactly `buf.len()` bytes or fail with [TransportError::ShortTransfer].
    fn read_exact(&self, addr: u16, buf: &mut [u8]) -> Result<(), TransportError> {
        let actual = self.read(addr, buf)?;
        if actual != buf.len() {
            return Err(TransportError::ShortTransfer {
                addr,
                expected: buf.len(),
                actual,
            });
        }
        Ok(())
    }

    /// Write all of `data` or fail with [TransportError::ShortTransfer].
    fn write_all(&self, addr: u16, data: &[u8]) -> Result<(), TransportError> {
        let actual = self.write(addr, data)?;
        if actual != data.len() {
            return Err(TransportError::ShortTransfer {
                addr,
                expected: data.len(),
                actual,
            });
        }
        Ok(())
    }
}
