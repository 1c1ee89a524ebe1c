use ftdi_link::{Driver, Result};

fn main() -> Result<()> {
    env_logger::init();
    let driver = Driver::load()?;
    println!("libftdi version {}", driver.library_version());

    // Optional extra VID:PID from the command line, e.g. `1234:ABCD`
    if let Some(arg) = std::env::args().nth(1) {
        match arg.split_once(':').map(|(v, p)| {
            (u16::from_str_radix(v, 16), u16::from_str_radix(p, 16))
        }) {
            Some((Ok(vid), Ok(pid))) => driver.add_custom_vid_pid(&[vid], &[pid]),
            _ => {
                eprintln!("Expected VID:PID in hex, got '{}'", arg);
                return Ok(());
            }
        }
    }

    let (vids, pids) = driver.candidate_ids();
    println!(
        "Searching for devices (VIDs {:04X?}, PIDs {:04X?})...",
        vids, pids
    );
    let devices = driver.list_devices()?;

    if devices.is_empty() {
        println!("No devices found.");
        return Ok(());
    }

    println!("Found {} device(s):", devices.len());
    for (i, entry) in devices.iter().enumerate() {
        println!(
            "  {}: VID=0x{:04X}, PID=0x{:04X}, Manufacturer='{}', Description='{}', Serial='{}'",
            i, entry.vid, entry.pid, entry.manufacturer, entry.description, entry.serial
        );
    }
    Ok(())
}
