use crate::consts;
use thiserror::Error;

/// Errors that can occur when using FTDI devices.
///
/// This enum covers library loading, argument validation, failures reported
/// by native calls, and use of a session in the wrong lifecycle state.
#[derive(Error, Debug)]
pub enum Error {
    /// The native driver library could not be located or a required symbol
    /// is missing from it.
    #[error("{0}")]
    LibraryMissing(String),
    /// Function argument is outside the valid range. Raised before any
    /// hardware interaction.
    #[error("Argument out of range: {0}")]
    ArgumentOutOfRange(String),
    /// A native call returned a failure status.
    #[error("{message} ({code}){}", help_suffix(.help))]
    Device {
        /// Raw status code returned by the native call.
        code: i32,
        /// Diagnostic string reported by the driver.
        message: String,
        /// Remediation hint, only set for failed opens.
        help: Option<&'static str>,
    },
    /// An operation was attempted on a session that has been closed.
    #[error("{operation} on closed device")]
    UseAfterClose {
        /// Name of the rejected operation.
        operation: &'static str,
    },
    /// An operation was attempted on a session that was never opened.
    #[error("{operation} on unopened device")]
    NotOpen {
        /// Name of the rejected operation.
        operation: &'static str,
    },
    /// No enumerated device exists at the requested list position.
    #[error("Device not found at index {index}: {message}")]
    DeviceNotFoundByIndex {
        /// The index that was requested.
        index: usize,
        /// Additional error details.
        message: String,
    },
    /// A text-only operation was called on a binary-mode session.
    #[error("{0}() only works in text mode")]
    TextModeRequired(&'static str),
    /// A port sample returned no data.
    #[error("Timeout waiting for device response")]
    Timeout,
    /// General I/O error (thread spawn, `std::io` adapters).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for FTDI operations.
///
/// This is a convenience alias for `std::result::Result<T, Error>` used
/// throughout the crate to reduce boilerplate.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Returns the native status code for errors raised by a native call.
    pub fn native_code(&self) -> Option<i32> {
        match self {
            Error::Device { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// True when a native open reported that no matching device exists.
    pub fn is_device_not_found(&self) -> bool {
        self.native_code() == Some(consts::ERR_DEVICE_NOT_FOUND)
    }
}

const HELP_NOT_FOUND: &str = "No device matching the given serial, description or index could be found.
Is the device connected?

Try listing attached devices (e.g. the `list_devices` demo) to see if the
device is visible to libftdi.";

const HELP_LINUX_OPEN: &str = "Could not access the FTDI device - this could be a permissions
issue accessing the device.

If the program works when run with root privileges (i.e. sudo)
this is likely to be the issue. Running as a normal user should
be possible by setting appropriate udev rules on the device.";

const HELP_CLAIM: &str = "Could not claim the FTDI USB device - either the device is
already open, or another driver is preventing libftdi from
claiming the device.";

const HELP_LINUX_CLAIM: &str = "Could not claim the FTDI USB device - either the device is
already open, or another driver is preventing libftdi from
claiming the device.

The Linux `ftdi_sio` driver is often the culprit here, and may be
unloaded with `sudo rmmod ftdi_sio`. With libftdi 1.0 or later this
should not be necessary, as the kernel driver is detached for the
lifetime of the session unless auto-detach is disabled.";

const HELP_MACOS_CLAIM: &str = "Could not claim the FTDI USB device - either the device is
already open, or another driver is preventing libftdi from
claiming the device.

The following commands may be attempted in the terminal to unload
the builtin drivers:

    sudo kextunload -bundle-id com.apple.driver.AppleUSBFTDI
    sudo kextunload -bundle-id com.FTDI.driver.FTDIUSBSerialDriver

Reload these with 'kextload' in place of 'kextunload'.";

/// Picks the remediation hint for a failed open, by native code and host OS.
pub(crate) fn open_error_help(code: i32) -> Option<&'static str> {
    match code {
        consts::ERR_DEVICE_NOT_FOUND => Some(HELP_NOT_FOUND),
        consts::ERR_OPEN_FAILED if cfg!(target_os = "linux") => Some(HELP_LINUX_OPEN),
        consts::ERR_CLAIM_FAILED => Some(if cfg!(target_os = "linux") {
            HELP_LINUX_CLAIM
        } else if cfg!(target_os = "macos") {
            HELP_MACOS_CLAIM
        } else {
            HELP_CLAIM
        }),
        _ => None,
    }
}

fn help_suffix(help: &Option<&'static str>) -> String {
    help.map(|h| format!("\n{h}")).unwrap_or_default()
}

// Helpers for building native-call errors
pub(crate) fn native(code: i32, message: impl Into<String>) -> Error {
    Error::Device {
        code,
        message: message.into(),
        help: None,
    }
}

pub(crate) fn open_failed(code: i32, message: impl Into<String>) -> Error {
    Error::Device {
        code,
        message: message.into(),
        help: open_error_help(code),
    }
}
