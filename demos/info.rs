//! Reports the libraries ftdi-link runs on, for bug reports.

use ftdi_link::{DeviceLibrary, NativeLibrary};

fn row(key: &str, value: impl std::fmt::Display) {
    println!("{:22}: {}", key, value);
}

fn main() {
    env_logger::init();
    row("ftdi-link version", env!("CARGO_PKG_VERSION"));
    match NativeLibrary::load() {
        Ok(lib) => {
            row("libftdi version", lib.library_version());
            row("libftdi library name", lib.library_name());
            match lib.libusb_version() {
                Ok(version) => row("libusb version", format_args!("{} ({})", version, version.describe)),
                Err(e) => row("libusb version", format_args!("unavailable ({})", e)),
            }
            match lib.libusb_name() {
                Some(name) => row("libusb library name", name),
                None => row("libusb library", "Missing"),
            }
        }
        Err(_) => row("libftdi library", "Missing"),
    }
    row("OS platform", format_args!("{}-{}", std::env::consts::OS, std::env::consts::ARCH));
}
