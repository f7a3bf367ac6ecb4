//! Register-level transport abstraction
//!
//! A [`RegisterBus`] moves single bytes to and from addressed sensor
//! registers. Implementations bracket every transaction with their
//! device's select line through [`selected`], which releases the line on
//! every exit path.

use crate::error::Result;
use crate::registers::Register;

#[cfg(feature = "mpsse")]
mod mpsse;
#[cfg(feature = "mpsse")]
pub use mpsse::{GpioSelect, I2cSelectBus, MpsseChannel, SpiBus};

#[cfg(test)]
pub(crate) mod mock;

/// Physical interface behind a bus
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusInterface {
    I2c,
    Spi,
}

/// Addressed byte-level register access
pub trait RegisterBus {
    /// Read one register
    fn read(&mut self, register: Register) -> Result<u8>;

    /// Write one register
    fn write(&mut self, register: Register, value: u8) -> Result<()>;

    /// Read `count` bytes from `register`
    ///
    /// Buses without a burst transfer fall back to `count` single-byte reads,
    /// which is correct for auto-incrementing or streaming registers such as
    /// FIFO_R_W but costs one transaction per byte.
    fn bulk_read(&mut self, register: Register, count: usize) -> Result<Vec<u8>> {
        (0..count).map(|_| self.read(register)).collect()
    }

    /// Interface kind, used by the device to pick its start-up sequence
    fn interface(&self) -> BusInterface;
}

impl<B: RegisterBus + ?Sized> RegisterBus for Box<B> {
    fn read(&mut self, register: Register) -> Result<u8> {
        (**self).read(register)
    }

    fn write(&mut self, register: Register, value: u8) -> Result<()> {
        (**self).write(register, value)
    }

    fn bulk_read(&mut self, register: Register, count: usize) -> Result<Vec<u8>> {
        (**self).bulk_read(register, count)
    }

    fn interface(&self) -> BusInterface {
        (**self).interface()
    }
}

/// Per-device select line shared bus arbitration relies on
pub trait SelectLine {
    fn assert_line(&mut self) -> Result<()>;
    fn deassert_line(&mut self) -> Result<()>;
}

/// Holds a select line asserted until dropped
struct SelectGuard<'a, S: SelectLine + ?Sized> {
    line: &'a mut S,
    released: bool,
}

impl<'a, S: SelectLine + ?Sized> SelectGuard<'a, S> {
    fn acquire(line: &'a mut S) -> Result<Self> {
        line.assert_line()?;
        Ok(Self { line, released: false })
    }

    fn release(mut self) -> Result<()> {
        self.released = true;
        self.line.deassert_line()
    }
}

impl<S: SelectLine + ?Sized> Drop for SelectGuard<'_, S> {
    fn drop(&mut self) {
        if !self.released {
            if let Err(e) = self.line.deassert_line() {
                log::warn!("Failed to release select line: {}", e);
            }
        }
    }
}

/// Run `op` with `line` asserted, de-asserting afterwards even when `op` fails
///
/// The bus error from `op` takes precedence over a release failure.
pub fn selected<S, T, F>(line: &mut S, op: F) -> Result<T>
where
    S: SelectLine + ?Sized,
    F: FnOnce() -> Result<T>,
{
    let guard = SelectGuard::acquire(line)?;
    let result = op();
    match result {
        Ok(value) => {
            guard.release()?;
            Ok(value)
        }
        // Guard drop releases the line
        Err(e) => Err(e),
    }
}
