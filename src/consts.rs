//! Internal constants: USB identifiers, native status codes and mode values.

// Default Vendor/Product IDs
/// FTDI vendor ID.
pub const FTDI_VID: u16 = 0x0403;

// Default Product IDs tried when opening or enumerating
/// FT232R / FT245R.
pub const FT232R_PID: u16 = 0x6001;
/// FT2232C/D/H (dual interface).
pub const FT2232_PID: u16 = 0x6010;
/// FT4232H (quad interface).
pub const FT4232H_PID: u16 = 0x6011;
/// FT232H.
pub const FT232H_PID: u16 = 0x6014;
/// FT-X series (FT230X, FT231X, ...).
pub const FT_X_PID: u16 = 0x6015;

/// Product IDs tried by default, in order.
pub const DEFAULT_PIDS: [u16; 5] = [FT232R_PID, FT2232_PID, FT4232H_PID, FT232H_PID, FT_X_PID];

// --- Native status codes (libftdi) ---
/// `ftdi_usb_open_desc_index`: no device matched.
pub const ERR_DEVICE_NOT_FOUND: i32 = -3;
/// `ftdi_usb_open_desc_index`: unable to open the USB device.
pub const ERR_OPEN_FAILED: i32 = -4;
/// `ftdi_usb_open_desc_index`: unable to claim the interface.
pub const ERR_CLAIM_FAILED: i32 = -5;
/// `ftdi_usb_get_strings`: manufacturer string unreadable.
pub const ERR_STRING_MANUFACTURER: i32 = -7;
/// `ftdi_usb_get_strings`: description string unreadable.
pub const ERR_STRING_DESCRIPTION: i32 = -8;
/// `ftdi_usb_get_strings`: serial string unreadable.
pub const ERR_STRING_SERIAL: i32 = -9;

// --- Session defaults ---
/// Baud rate every freshly opened device is reset to.
pub const DEFAULT_BAUDRATE: u32 = 9600;
/// Latency timer in ms (device default; kernel drivers may leave 1 ms).
pub const DEFAULT_LATENCY_MS: u8 = 16;
/// `ftdi_setflowctrl` value for "no flow control".
pub const FLOW_CONTROL_DISABLE: i32 = 0;

/// Size of the buffers handed to `ftdi_usb_get_strings`.
pub const STRING_BUFFER_LEN: usize = 128;

// --- Modem status word (ftdi_poll_modem_status) ---
pub mod modem {
    /// Clear To Send.
    pub const CTS_MASK: u16 = 1 << 4;
    /// Data Set Ready.
    pub const DSR_MASK: u16 = 1 << 5;
    /// Ring Indicator.
    pub const RI_MASK: u16 = 1 << 6;
}

// --- Bit-bang direction presets ---
/// Direction mask with every line an output.
pub const ALL_OUTPUTS: u8 = 0xFF;
/// Direction mask with every line an input.
pub const ALL_INPUTS: u8 = 0x00;
