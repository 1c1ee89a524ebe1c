use ftdi_link::{BitBangDevice, DeviceIdentity, Driver, Result, SessionOptions};
use std::{thread, time::Duration};

// LED on D0 (TXD on most FT232R breakouts)
const LED_MASK: u8 = 0x01;

fn main() -> Result<()> {
    env_logger::init();
    let driver = Driver::load()?;

    let identity = match std::env::args().nth(1) {
        Some(serial) => DeviceIdentity::any().with_serial(serial),
        None => DeviceIdentity::any(),
    };
    println!("Opening device in bit-bang mode...");
    let mut bb = BitBangDevice::new(&driver, identity, u32::from(LED_MASK), SessionOptions::default())?;
    println!("Device opened, direction {:#04X}.", bb.direction());

    println!("Flashing D0 (Press Ctrl+C to stop)");
    loop {
        let port = bb.port()?;
        bb.set_port(port ^ LED_MASK)?;
        thread::sleep(Duration::from_millis(500));
    }
    // Note: Loop runs forever, the device is closed when the process exits
}
