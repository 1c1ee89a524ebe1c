//! Bit-bang mode: the eight data lines as individually directed GPIO.
//!
//! A [`BitBangDevice`] keeps two pieces of state on top of its session:
//! the direction mask (bit set = output) and the output latch, the last
//! value deliberately written to the port. Reads of the port return latch
//! bits for outputs and freshly sampled bits for inputs, so read-modify-write
//! sequences such as `port | 0x10` behave as expected even though output
//! pins are never read back from hardware.

use crate::consts;
use crate::device::{Device, DeviceIdentity, SessionOptions};
use crate::driver::Driver;
use crate::error::{Error, Result};
use crate::library::BitMode;
use crate::text::Mode;
use log::{debug, trace};

impl Device {
    /// Samples the data lines directly, bypassing the read buffer.
    pub fn read_pins(&self) -> Result<u8> {
        let ctx = self.context("read_pins")?;
        let mut pins = 0u8;
        let res = self.driver.library().read_pins(ctx, &mut pins);
        self.check(ctx, res)?;
        trace!("read_pins -> {:#04X}", pins);
        Ok(pins)
    }

    /// Programs the hardware mode and pin directions.
    pub fn set_bitmode(&self, mask: u8, mode: BitMode) -> Result<()> {
        let ctx = self.context("set_bitmode")?;
        let res = self.driver.library().set_bitmode(ctx, mask, mode.raw());
        self.check(ctx, res)
    }
}

fn validate_direction(direction: u32) -> Result<u8> {
    u8::try_from(direction).map_err(|_| {
        Error::ArgumentOutOfRange(format!(
            "invalid direction bitmask {:#X} (must be 0x00-0xFF)",
            direction
        ))
    })
}

/// A session in bit-bang mode.
#[derive(Debug)]
pub struct BitBangDevice {
    device: Device,
    direction: u8,
    last_set_direction: Option<u8>,
    latch: Option<u8>,
}

impl BitBangDevice {
    /// Creates a bit-bang session with the given direction mask and, unless
    /// `options.lazy_open` is set, opens it. The session is always binary.
    pub fn new(
        driver: &Driver,
        identity: DeviceIdentity,
        direction: u32,
        options: SessionOptions,
    ) -> Result<Self> {
        let direction = validate_direction(direction)?;
        let lazy = options.lazy_open;
        let device = Device::unopened(driver, identity, options.with_mode(Mode::Binary));
        let mut bb = BitBangDevice {
            device,
            direction,
            last_set_direction: None,
            latch: None,
        };
        if !lazy {
            bb.open()?;
        }
        Ok(bb)
    }

    /// Opens the first device found with every line an output.
    pub fn open_first(driver: &Driver) -> Result<Self> {
        Self::new(
            driver,
            DeviceIdentity::any(),
            u32::from(consts::ALL_OUTPUTS),
            SessionOptions::default(),
        )
    }

    /// Opens the session and programs the bit-bang mode with the current
    /// direction. The latch is re-seeded from the pins on next use.
    pub fn open(&mut self) -> Result<()> {
        if !self.device.is_open() {
            self.device.open()?;
            self.last_set_direction = None;
            self.latch = None;
        }
        if self.last_set_direction != Some(self.direction) {
            self.apply_direction(self.direction)?;
        }
        Ok(())
    }

    pub fn close(&mut self) {
        self.device.close();
    }

    pub fn is_open(&self) -> bool {
        self.device.is_open()
    }

    // --- Direction ---

    /// Direction mask; bit set = output. LSB is D0.
    pub fn direction(&self) -> u8 {
        self.direction
    }

    /// Changes the direction mask. Values above 0xFF are rejected before
    /// anything changes. On an open session the hardware is reprogrammed
    /// immediately.
    pub fn set_direction(&mut self, direction: u32) -> Result<()> {
        let direction = validate_direction(direction)?;
        if self.device.is_open() {
            self.apply_direction(direction)?;
        }
        self.direction = direction;
        Ok(())
    }

    fn apply_direction(&mut self, direction: u8) -> Result<()> {
        let mode = self.device.options.bitbang_mode;
        self.device.set_bitmode(direction, mode)?;
        debug!("Bit-bang direction {:#04X} ({:?})", direction, mode);
        self.last_set_direction = Some(direction);
        Ok(())
    }

    /// The direction currently programmed in hardware, if any.
    pub fn applied_direction(&self) -> Option<u8> {
        self.last_set_direction
    }

    // --- Port ---

    pub fn sync(&self) -> bool {
        self.device.options.sync
    }

    pub fn set_sync(&mut self, sync: bool) {
        self.device.options.sync = sync;
    }

    /// The output latch. Seeded on first use from the pins, masked to the
    /// output lines, and only changed by writes afterwards.
    pub fn latch(&mut self) -> Result<u8> {
        match self.latch {
            Some(latch) => Ok(latch),
            None => {
                let latch = self.device.read_pins()? & self.direction;
                trace!("Latch seeded as {:#04X}", latch);
                self.latch = Some(latch);
                Ok(latch)
            }
        }
    }

    /// Same as [`set_port`](Self::set_port).
    pub fn set_latch(&mut self, value: u8) -> Result<()> {
        self.set_port(value)
    }

    /// Current port value: input bits sampled now, output bits from the
    /// latch. With every line an output no hardware access is made, but the
    /// session must still be open.
    pub fn port(&mut self) -> Result<u8> {
        self.device.context("port")?;
        if self.direction == consts::ALL_OUTPUTS {
            return self.latch();
        }
        let sampled = if self.sync() {
            self.device.read_pins()?
        } else {
            match self.device.read_bytes(1)?.first() {
                Some(&byte) => byte,
                None => return Err(Error::Timeout),
            }
        };
        let latch = self.latch()?;
        Ok((sampled & !self.direction) | (latch & self.direction))
    }

    /// Writes the whole port and records it as the latch. Bits of input
    /// lines are kept in the latch but have no physical effect. In sync mode
    /// queued output is purged first so the write is not delayed behind it.
    /// A write that fails or transfers nothing leaves the latch as it was.
    pub fn set_port(&mut self, value: u8) -> Result<()> {
        if self.sync() {
            self.device.flush_output()?;
        }
        trace!("Port <- {:#04X}", value);
        let written = self.device.write_bytes(&[value])?;
        if written == 0 {
            return Err(Error::Timeout);
        }
        self.latch = Some(value);
        Ok(())
    }

    /// Samples the pins directly.
    pub fn read_pins(&self) -> Result<u8> {
        self.device.read_pins()
    }

    // --- Session access ---

    pub fn device(&self) -> &Device {
        &self.device
    }

    /// The underlying session, e.g. to change the baudrate (which sets the
    /// bit-bang clock).
    pub fn device_mut(&mut self) -> &mut Device {
        &mut self.device
    }

    pub fn into_device(self) -> Device {
        self.device
    }
}
