//! Sub-byte fields of an 8-bit port.
//!
//! A [`BitField`] names a run of adjacent lines, e.g. a 4-bit data bus on
//! D4..D7, and reads or writes just those bits through anything that
//! implements [`PortAccess`].
//!
//! Writes are read-modify-write on the whole port and are not atomic. Two
//! fields on the same port written from different threads need external
//! locking around the port owner.

use crate::bitbang::BitBangDevice;
use crate::error::{Error, Result};

/// Whole-port read and write.
pub trait PortAccess {
    fn port(&mut self) -> Result<u8>;
    fn set_port(&mut self, value: u8) -> Result<()>;
}

impl PortAccess for BitBangDevice {
    fn port(&mut self) -> Result<u8> {
        BitBangDevice::port(self)
    }

    fn set_port(&mut self, value: u8) -> Result<()> {
        BitBangDevice::set_port(self, value)
    }
}

impl PortAccess for u8 {
    fn port(&mut self) -> Result<u8> {
        Ok(*self)
    }

    fn set_port(&mut self, value: u8) -> Result<()> {
        *self = value;
        Ok(())
    }
}

/// `width` adjacent bits starting at bit `offset`.
///
/// # Examples
///
/// ```
/// use ftdi_link::{BitField, PortAccess};
///
/// let nibble = BitField::new(4, 4)?;
/// let mut port = 0x0Fu8;
/// nibble.set(&mut port, 0xA)?;
/// assert_eq!(port, 0xAF);
/// assert_eq!(nibble.get(&mut port)?, 0xA);
/// # Ok::<(), ftdi_link::Error>(())
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitField {
    offset: u8,
    width: u8,
}

impl BitField {
    /// Fails unless `width >= 1` and the field fits within 8 bits.
    pub fn new(offset: u8, width: u8) -> Result<Self> {
        if width == 0 || u16::from(offset) + u16::from(width) > 8 {
            return Err(Error::ArgumentOutOfRange(format!(
                "bit field offset {} width {} does not fit in 8 bits",
                offset, width
            )));
        }
        Ok(BitField { offset, width })
    }

    pub fn offset(&self) -> u8 {
        self.offset
    }

    pub fn width(&self) -> u8 {
        self.width
    }

    /// Unshifted value mask, `(1 << width) - 1`.
    #[inline]
    pub fn mask(&self) -> u8 {
        ((1u16 << self.width) - 1) as u8
    }

    /// Reads the field.
    pub fn get<P: PortAccess + ?Sized>(&self, port: &mut P) -> Result<u8> {
        Ok((port.port()? >> self.offset) & self.mask())
    }

    /// Writes the field, leaving the other bits of the port as they were.
    /// Bits of `value` beyond the field width are ignored.
    pub fn set<P: PortAccess + ?Sized>(&self, port: &mut P, value: u8) -> Result<()> {
        let mask = self.mask();
        let current = port.port()?;
        let cleared = current & !(mask << self.offset);
        port.set_port(cleared | ((value & mask) << self.offset))
    }
}
