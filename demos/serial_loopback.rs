//! Writes random-length messages and checks they come back. Wire TXD to RXD
//! before running.

use ftdi_link::{Device, DeviceIdentity, Driver, Encoding, Flush, ReadPump, Result, SessionOptions};
use std::time::{Duration, Instant};

const BAUDRATE: u32 = 115_200;
const ROUNDS: usize = 20;

fn main() -> Result<()> {
    env_logger::init();
    let driver = Driver::load()?;

    // Line-oriented check in text mode.
    let options = SessionOptions::default().with_text(Encoding::Latin1);
    let mut dev = Device::new(&driver, DeviceIdentity::any(), options)?;
    dev.set_baudrate(BAUDRATE)?;
    dev.flush(Flush::Both)?;

    dev.writelines(["Hello", " World\n", "Bye\n"])?;
    std::thread::sleep(Duration::from_millis(50));
    for line in dev.lines() {
        print!("< {}", line?);
    }
    dev.close();

    // Binary check through the background reader.
    let options = SessionOptions::default().with_chunk_size(256);
    let mut dev = Device::new(&driver, DeviceIdentity::any(), options)?;
    dev.set_baudrate(BAUDRATE)?;
    dev.flush(Flush::Both)?;

    let mut seed = 0x2545_F491u32;
    let mut failures = 0;
    let mut pump = ReadPump::start(dev)?;
    for round in 0..ROUNDS {
        // xorshift, no need for a rand dependency here
        seed ^= seed << 13;
        seed ^= seed >> 17;
        seed ^= seed << 5;
        let len = 1 + (seed % 1024) as usize;
        let message: Vec<u8> = (0..len).map(|i| (i as u32 ^ seed) as u8).collect();

        let mut dev = pump.stop()?;
        let written = dev.write_bytes(&message)?;
        pump = ReadPump::start(dev)?;

        let deadline = Instant::now() + Duration::from_secs(2);
        let mut echo = Vec::with_capacity(written);
        while echo.len() < written && Instant::now() < deadline {
            echo.extend(pump.read(written - echo.len()));
        }
        if echo == message[..written] {
            println!("Round {:2}: {} bytes OK", round, written);
        } else {
            failures += 1;
            println!("Round {:2}: sent {} bytes, got {} back (mismatch)", round, written, echo.len());
        }
    }
    pump.stop()?;

    println!("{} of {} rounds failed", failures, ROUNDS);
    Ok(())
}
