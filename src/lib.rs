//! # ftdi-link
//!
//! A Rust crate for talking to FTDI USB adapters (FT232R, FT2232, FT4232H,
//! FT232H, FT-X series) through the `libftdi` driver, either as a byte
//! stream (UART) or as eight individually controlled GPIO lines ("bit-bang"
//! mode).
//!
//! `libftdi` is loaded at runtime with the `libloading` crate, so nothing
//! needs to be linked at build time; a missing library is reported as
//! [`Error::LibraryMissing`] when the [`Driver`] is loaded.
//!
//! ## Features
//!
//! *   Device enumeration without opening anything ([`Driver::list_devices`]).
//! *   Flexible device selection ([`DeviceIdentity`]):
//!     *   By serial number, with automatic fallback to matching the
//!         product description.
//!     *   By index among matching devices, or by position in the
//!         enumeration list.
//!     *   Interface selection on multi-port chips ([`Interface`]).
//!     *   Custom vendor/product IDs, per session or driver-wide
//!         ([`Driver::add_custom_vid_pid`]).
//! *   Helpful diagnostics when an open fails (device not found, permission
//!     problems, kernel driver claiming the device), tailored to the host OS.
//! *   Stream I/O ([`Device`]):
//!     *   Binary or text mode with latin-1, UTF-8 or ASCII encoding.
//!     *   Optional chunking of long transfers.
//!     *   Line reading (`readline`, `readlines`, `lines`) in text mode.
//!     *   `std::io::Read` and `std::io::Write` implementations.
//!     *   Buffer purges ([`Flush`]) and baudrate negotiation.
//!     *   Modem lines: DTR/RTS outputs, CTS/DSR/RI inputs ([`ModemStatus`]).
//! *   Bit-bang GPIO ([`BitBangDevice`]):
//!     *   Direction mask, output latch and port read/write with correct
//!         read-modify-write semantics on mixed input/output ports.
//!     *   Synchronous mode (live pin sampling) or buffered asynchronous mode.
//!     *   Sub-byte fields with [`BitField`].
//! *   A thread-safe byte FIFO ([`FifoBuffer`]) and a background reader
//!     ([`ReadPump`]) for decoupling device reads from a slow consumer.
//!
//! ## Installation
//!
//! Add the following to your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! ftdi-link = "0.1.0" # Replace with the latest version
//! log = "0.4"         # Optional, for logging
//!
//! [dev-dependencies]  # For demos/tests
//! env_logger = "0.11"
//! ```
//!
//! You also need `libftdi` (1.x recommended) installed on your system, e.g.
//! `apt install libftdi1-2` on Debian/Ubuntu or `brew install libftdi` on
//! macOS. Kernel-driver auto-detach additionally uses `libusb-1.0`, which
//! `libftdi` depends on anyway.
//!
//! ## Basic Usage
//!
//! ```no_run
//! use ftdi_link::{Device, DeviceIdentity, Driver, Encoding, Result, SessionOptions};
//!
//! fn main() -> Result<()> {
//!     // Optional: Initialize logging
//!     // env_logger::init();
//!
//!     let driver = Driver::load()?;
//!
//!     for entry in driver.list_devices()? {
//!         println!("{}", entry);
//!     }
//!
//!     let mut dev = Device::new(
//!         &driver,
//!         DeviceIdentity::any(),
//!         SessionOptions::default().with_text(Encoding::Latin1),
//!     )?;
//!     dev.set_baudrate(115_200)?;
//!     dev.write_text("Hello World\n")?;
//!     let line = dev.readline(0)?;
//!     println!("got {:?}", line);
//!     Ok(())
//! }
//! ```
//!
//! ## Bit-bang Mode
//!
//! ```no_run
//! use ftdi_link::{BitBangDevice, BitField, Driver, Result};
//!
//! fn main() -> Result<()> {
//!     let driver = Driver::load()?;
//!     let mut bb = BitBangDevice::open_first(&driver)?;
//!
//!     // Upper nibble outputs, lower nibble inputs.
//!     bb.set_direction(0xF0)?;
//!     let value = bb.port()?;
//!     bb.set_port(value | 0x10)?;
//!
//!     let high_nibble = BitField::new(4, 4)?;
//!     high_nibble.set(&mut bb, 0b1010)?;
//!     Ok(())
//! }
//! ```
//!
//! ## Hardware Setup Notes
//!
//! *   **Linux udev Rules:** Grant user permission to the USB devices. Create
//!     `/etc/udev/rules.d/99-ftdi.rules`:
//!     ```udev
//!     SUBSYSTEM=="usb", ATTRS{idVendor}=="0403", MODE="0666", GROUP="plugdev"
//!     ```
//!     Reload: `sudo udevadm control --reload-rules && sudo udevadm trigger`
//! *   **Kernel serial drivers:** `ftdi_sio` (Linux) or the Apple/FTDI VCP
//!     drivers (macOS) may claim the device. With libftdi 1.0 or later the
//!     Linux driver is detached automatically for the session
//!     ([`SessionOptions::auto_detach`]).
//! *   **Modem lines** are usually active-low on the wire; values are passed
//!     through unmodified.
//!
//! ## License
//!
//! This project is licensed under the WTFPL - see the [LICENSE](LICENSE) file for details.

mod consts;
mod error;

pub mod bitbang;
pub mod bus;
pub mod device;
pub mod driver;
pub mod fifo;
pub mod library;
#[doc(hidden)]
pub mod mock;
pub mod native;
pub mod pump;
pub mod serial;
pub mod stream;
pub mod text;

pub use bitbang::BitBangDevice;
pub use bus::{BitField, PortAccess};
pub use device::{Device, DeviceIdentity, SessionOptions};
pub use driver::{DeviceEntry, Driver};
pub use error::{Error, Result};
pub use fifo::FifoBuffer;
pub use library::{
    BitMode, ContextHandle, DeviceLibrary, DeviceList, DeviceNode, DeviceStrings, Interface,
    LibraryId, LibraryVersion, LibusbVersion,
};
pub use native::NativeLibrary;
pub use pump::ReadPump;
pub use serial::ModemStatus;
pub use stream::{Flush, Lines};
pub use text::{Encoding, Mode};

// Re-export the public constants
pub use consts::{
    ALL_INPUTS, ALL_OUTPUTS, DEFAULT_BAUDRATE, DEFAULT_PIDS, FT2232_PID, FT232H_PID, FT232R_PID,
    FT4232H_PID, FTDI_VID, FT_X_PID,
};
