//! The native driver capability: a typed table of every libftdi call this
//! crate makes.
//!
//! Every method mirrors one native function. The driver context is passed
//! explicitly at each call site, status codes are returned untouched, and it
//! is up to the session layer to turn them into [`crate::Error`] values.
//! [`crate::native::NativeLibrary`] binds the table to libftdi loaded at
//! runtime; [`crate::mock::MockLibrary`] implements it in memory for tests.

use std::ffi::CStr;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Identity of one [`DeviceLibrary`] instance. Every handle records the
/// library that issued it, and implementations refuse handles issued by
/// another instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LibraryId(u64);

impl LibraryId {
    /// Allocates an identity no other library instance in the process holds.
    pub fn new() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        LibraryId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for LibraryId {
    fn default() -> Self {
        Self::new()
    }
}

/// Opaque handle to one initialised driver context.
///
/// Neither `Clone` nor `Copy`, and only constructible through an `unsafe`
/// constructor: the owner hands it back to [`DeviceLibrary::deinit`] by
/// value, so a context is released exactly once.
///
/// ```compile_fail
/// use ftdi_link::{ContextHandle, LibraryId};
/// let forged = ContextHandle::from_raw(LibraryId::new(), 0x1000);
/// ```
///
/// ```compile_fail
/// fn duplicate(ctx: &ftdi_link::ContextHandle) -> ftdi_link::ContextHandle {
///     ctx.clone()
/// }
/// ```
#[derive(PartialEq, Eq, Hash)]
pub struct ContextHandle {
    owner: LibraryId,
    raw: usize,
}

impl ContextHandle {
    /// Wraps a raw context token produced by a [`DeviceLibrary`]
    /// implementation.
    ///
    /// # Safety
    ///
    /// `raw` must be a live context allocated by the library identified by
    /// `owner`, and no other `ContextHandle` for it may exist. Releasing it
    /// is the job of whoever receives the handle.
    pub unsafe fn from_raw(owner: LibraryId, raw: usize) -> Self {
        ContextHandle { owner, raw }
    }

    /// Returns the raw token.
    pub fn as_raw(&self) -> usize {
        self.raw
    }

    /// The library instance that issued this handle.
    pub fn owner(&self) -> LibraryId {
        self.owner
    }
}

impl fmt::Debug for ContextHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContextHandle({:#x})", self.raw)
    }
}

/// One node of a native device list, as returned by
/// [`DeviceLibrary::find_all`]. Only reachable by reference through its
/// [`DeviceList`], so it cannot outlive the list.
#[derive(Debug, PartialEq, Eq)]
pub struct DeviceNode(usize);

impl DeviceNode {
    /// Wraps a raw node token.
    ///
    /// # Safety
    ///
    /// `raw` must be a device of the list it is stored into with
    /// [`DeviceList::from_raw`].
    pub unsafe fn from_raw(raw: usize) -> Self {
        DeviceNode(raw)
    }

    /// Returns the raw token.
    pub fn as_raw(&self) -> usize {
        self.0
    }
}

/// A native device list. Must be handed back to
/// [`DeviceLibrary::list_free`] once traversal is done.
#[derive(Debug, PartialEq, Eq)]
pub struct DeviceList {
    owner: LibraryId,
    head: usize,
    nodes: Vec<DeviceNode>,
}

impl DeviceList {
    /// Builds a list from its raw head token and the nodes in native order.
    ///
    /// # Safety
    ///
    /// `head` must be a live list allocated by the library identified by
    /// `owner`, `nodes` must be its entries, and no other `DeviceList` for
    /// it may exist.
    pub unsafe fn from_raw(owner: LibraryId, head: usize, nodes: Vec<DeviceNode>) -> Self {
        DeviceList { owner, head, nodes }
    }

    /// Raw head token, needed to free the list.
    pub fn head(&self) -> usize {
        self.head
    }

    /// The library instance that issued this list.
    pub fn owner(&self) -> LibraryId {
        self.owner
    }

    /// Nodes in native enumeration order.
    pub fn nodes(&self) -> &[DeviceNode] {
        &self.nodes
    }
}

/// Descriptor strings of one device. Fields the driver could not read stay
/// empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceStrings {
    pub manufacturer: String,
    pub description: String,
    pub serial: String,
}

/// Version of the loaded native library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryVersion {
    pub major: i32,
    pub minor: i32,
    pub micro: i32,
    pub version_str: String,
    pub snapshot_str: String,
}

impl LibraryVersion {
    /// The value reported by libraries older than 1.0, which cannot be asked.
    pub fn pre_1_0() -> Self {
        LibraryVersion {
            major: 0,
            minor: 0,
            micro: 0,
            version_str: "< 1.0 - no ftdi_get_library_version()".to_string(),
            snapshot_str: "unknown".to_string(),
        }
    }
}

impl fmt::Display for LibraryVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{} ({})", self.major, self.minor, self.micro, self.version_str)
    }
}

/// Version of the libusb runtime underneath libftdi.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibusbVersion {
    pub major: u16,
    pub minor: u16,
    pub micro: u16,
    pub nano: u16,
    /// Release candidate suffix, empty for final releases.
    pub rc: String,
    pub describe: String,
}

impl fmt::Display for LibusbVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}.{}{}", self.major, self.minor, self.micro, self.nano, self.rc)
    }
}

/// Interface selector for multi-port chips (FT2232, FT4232).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Interface {
    #[default]
    Any,
    A,
    B,
    C,
    D,
}

impl Interface {
    /// Native `enum ftdi_interface` value.
    pub fn raw(self) -> i32 {
        match self {
            Interface::Any => 0,
            Interface::A => 1,
            Interface::B => 2,
            Interface::C => 3,
            Interface::D => 4,
        }
    }
}

impl TryFrom<u8> for Interface {
    type Error = crate::Error;

    fn try_from(value: u8) -> crate::Result<Self> {
        match value {
            0 => Ok(Interface::Any),
            1 => Ok(Interface::A),
            2 => Ok(Interface::B),
            3 => Ok(Interface::C),
            4 => Ok(Interface::D),
            _ => Err(crate::Error::ArgumentOutOfRange(format!(
                "interface selector {} out of range (0-4)",
                value
            ))),
        }
    }
}

/// Hardware mode programmed with `ftdi_set_bitmode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitMode {
    Reset,
    BitBang,
    Mpsse,
    SyncBitBang,
    Mcu,
    Opto,
    CBus,
    SyncFf,
}

impl BitMode {
    /// Native mode byte.
    pub fn raw(self) -> u8 {
        match self {
            BitMode::Reset => 0x00,
            BitMode::BitBang => 0x01,
            BitMode::Mpsse => 0x02,
            BitMode::SyncBitBang => 0x04,
            BitMode::Mcu => 0x08,
            BitMode::Opto => 0x10,
            BitMode::CBus => 0x20,
            BitMode::SyncFf => 0x40,
        }
    }
}

/// The native driver, one method per libftdi entry point.
///
/// Implementations must be shareable between threads: a single loaded
/// library serves every session in the process. Calls on one context are
/// never made concurrently by this crate.
pub trait DeviceLibrary: Send + Sync {
    /// `ftdi_init`: allocates and initialises a context.
    fn init(&self) -> Result<ContextHandle, i32>;
    /// `ftdi_deinit`: releases a context.
    fn deinit(&self, ctx: ContextHandle);
    /// `ftdi_set_interface`.
    fn set_interface(&self, ctx: &ContextHandle, interface: Interface) -> i32;
    /// `ftdi_usb_open_desc_index`.
    fn open_desc_index(
        &self,
        ctx: &ContextHandle,
        vid: u16,
        pid: u16,
        description: Option<&CStr>,
        serial: Option<&CStr>,
        index: u32,
    ) -> i32;
    /// `ftdi_usb_close`.
    fn close(&self, ctx: &ContextHandle) -> i32;
    /// `ftdi_set_baudrate`.
    fn set_baudrate(&self, ctx: &ContextHandle, baudrate: u32) -> i32;
    /// `ftdi_setflowctrl`.
    fn set_flow_control(&self, ctx: &ContextHandle, flow: i32) -> i32;
    /// `ftdi_set_latency_timer`.
    fn set_latency_timer(&self, ctx: &ContextHandle, latency_ms: u8) -> i32;
    /// `ftdi_set_bitmode`.
    fn set_bitmode(&self, ctx: &ContextHandle, mask: u8, mode: u8) -> i32;
    /// `ftdi_read_data`: byte count, or a negative status.
    fn read_data(&self, ctx: &ContextHandle, buf: &mut [u8]) -> i32;
    /// `ftdi_write_data`: byte count, or a negative status.
    fn write_data(&self, ctx: &ContextHandle, data: &[u8]) -> i32;
    /// `ftdi_usb_purge_rx_buffer`.
    fn purge_rx(&self, ctx: &ContextHandle) -> i32;
    /// `ftdi_usb_purge_tx_buffer`.
    fn purge_tx(&self, ctx: &ContextHandle) -> i32;
    /// `ftdi_usb_purge_buffers`.
    fn purge_both(&self, ctx: &ContextHandle) -> i32;
    /// `ftdi_read_pins`.
    fn read_pins(&self, ctx: &ContextHandle, pins: &mut u8) -> i32;
    /// `ftdi_poll_modem_status`.
    fn poll_modem_status(&self, ctx: &ContextHandle, status: &mut u16) -> i32;
    /// `ftdi_setdtr`.
    fn set_dtr(&self, ctx: &ContextHandle, state: bool) -> i32;
    /// `ftdi_setrts`.
    fn set_rts(&self, ctx: &ContextHandle, state: bool) -> i32;
    /// `ftdi_get_error_string`.
    fn error_string(&self, ctx: &ContextHandle) -> String;
    /// `ftdi_usb_find_all`: the list of matching devices, or a negative status.
    fn find_all(&self, ctx: &ContextHandle, vid: u16, pid: u16) -> Result<DeviceList, i32>;
    /// `ftdi_usb_get_strings`: fills whatever fields could be read.
    fn get_strings(&self, ctx: &ContextHandle, node: &DeviceNode, out: &mut DeviceStrings) -> i32;
    /// `ftdi_list_free`.
    fn list_free(&self, list: DeviceList);
    /// `ftdi_get_library_version`.
    fn library_version(&self) -> LibraryVersion;
    /// `libusb_get_version` of the libusb libftdi runs on.
    fn libusb_version(&self) -> crate::Result<LibusbVersion>;
    /// `libusb_set_auto_detach_kernel_driver` on the context's USB handle.
    fn set_auto_detach(&self, ctx: &ContextHandle, enable: bool) -> i32;
}
