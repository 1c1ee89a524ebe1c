//! Shows the eight port bits, continuously updated. Every line is an input.

use ftdi_link::{BitBangDevice, DeviceIdentity, Driver, Result, SessionOptions, ALL_INPUTS};
use std::io::Write;
use std::{thread, time::Duration};

fn main() -> Result<()> {
    env_logger::init();
    let driver = Driver::load()?;
    let mut bb = BitBangDevice::new(&driver, DeviceIdentity::any(), u32::from(ALL_INPUTS), SessionOptions::default())?;

    let mut stdout = std::io::stdout();
    loop {
        thread::sleep(Duration::from_millis(10));
        let value = bb.port()?;
        let bits: String = (0..8)
            .rev()
            .map(|n| if value & (1 << n) != 0 { "1 " } else { "0 " })
            .collect();
        write!(stdout, "\r{}  ({}/{:#04X})", bits, value, value)?;
        stdout.flush()?;
    }
}
