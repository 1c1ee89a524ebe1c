//! libftdi loaded at runtime, bound once into a table of typed function
//! pointers.
//!
//! The library is located by trying a list of names (bare names are expanded
//! to the platform file name, versioned sonames and full paths are used as
//! given). libusb is only needed for kernel-driver auto-detach and its
//! version query, and is loaded lazily the first time either is requested.

use crate::error::{Error, Result};
use crate::library::{
    ContextHandle, DeviceLibrary, DeviceList, DeviceNode, DeviceStrings, Interface, LibraryId,
    LibraryVersion, LibusbVersion,
};
use crate::consts;
use libloading::{Library, Symbol};
use log::{debug, trace, warn};
use std::ffi::{c_char, c_int, c_uchar, c_uint, c_ushort, c_void, CStr};
use std::ptr;
use std::sync::OnceLock;

/// Library names tried for libftdi, in order.
pub const DEFAULT_FTDI_SEARCH: &[&str] = &[
    "ftdi1",
    "libftdi1",
    "ftdi",
    "libftdi",
    "libftdi1.so.2",
    "libftdi.so.1",
];

/// Library names tried for libusb, in order.
pub const DEFAULT_LIBUSB_SEARCH: &[&str] = &["usb-1.0", "libusb-1.0", "libusb-1.0.so.0"];

// struct ftdi_context is well under this size on every supported platform.
const CONTEXT_STORAGE_WORDS: usize = 128;
type ContextStorage = [u64; CONTEXT_STORAGE_WORDS];

// Status returned when libusb itself could not be loaded.
const LIBUSB_UNAVAILABLE: i32 = -99;
// Status returned for a handle issued by another library instance.
const FOREIGN_HANDLE: i32 = -100;

type Ctx = *mut c_void;

#[repr(C)]
struct FtdiDeviceList {
    next: *mut FtdiDeviceList,
    dev: *mut c_void,
}

#[repr(C)]
struct FtdiVersionInfo {
    major: c_int,
    minor: c_int,
    micro: c_int,
    version_str: *const c_char,
    snapshot_str: *const c_char,
}

#[repr(C)]
struct LibusbVersionInfo {
    major: u16,
    minor: u16,
    micro: u16,
    nano: u16,
    rc: *const c_char,
    describe: *const c_char,
}

// Leading members of struct ftdi_context (libftdi 1.x layout).
#[repr(C)]
struct FtdiContextHead {
    usb_ctx: *mut c_void,
    usb_dev: *mut c_void,
}

struct FtdiFunctions {
    init: unsafe extern "C" fn(Ctx) -> c_int,
    deinit: unsafe extern "C" fn(Ctx),
    set_interface: unsafe extern "C" fn(Ctx, c_int) -> c_int,
    usb_open_desc_index:
        unsafe extern "C" fn(Ctx, c_int, c_int, *const c_char, *const c_char, c_uint) -> c_int,
    usb_close: unsafe extern "C" fn(Ctx) -> c_int,
    set_baudrate: unsafe extern "C" fn(Ctx, c_int) -> c_int,
    setflowctrl: unsafe extern "C" fn(Ctx, c_int) -> c_int,
    set_latency_timer: unsafe extern "C" fn(Ctx, c_uchar) -> c_int,
    set_bitmode: unsafe extern "C" fn(Ctx, c_uchar, c_uchar) -> c_int,
    read_data: unsafe extern "C" fn(Ctx, *mut c_uchar, c_int) -> c_int,
    write_data: unsafe extern "C" fn(Ctx, *const c_uchar, c_int) -> c_int,
    usb_purge_rx_buffer: unsafe extern "C" fn(Ctx) -> c_int,
    usb_purge_tx_buffer: unsafe extern "C" fn(Ctx) -> c_int,
    usb_purge_buffers: unsafe extern "C" fn(Ctx) -> c_int,
    read_pins: unsafe extern "C" fn(Ctx, *mut c_uchar) -> c_int,
    poll_modem_status: unsafe extern "C" fn(Ctx, *mut c_ushort) -> c_int,
    setdtr: unsafe extern "C" fn(Ctx, c_int) -> c_int,
    setrts: unsafe extern "C" fn(Ctx, c_int) -> c_int,
    get_error_string: unsafe extern "C" fn(Ctx) -> *const c_char,
    usb_find_all: unsafe extern "C" fn(Ctx, *mut *mut FtdiDeviceList, c_int, c_int) -> c_int,
    usb_get_strings: unsafe extern "C" fn(
        Ctx,
        *mut c_void,
        *mut c_char,
        c_int,
        *mut c_char,
        c_int,
        *mut c_char,
        c_int,
    ) -> c_int,
    list_free: unsafe extern "C" fn(*mut *mut FtdiDeviceList),
    // Absent before libftdi 1.0.
    get_library_version: Option<unsafe extern "C" fn() -> FtdiVersionInfo>,
}

struct LibusbFunctions {
    name: String,
    // Absent before libusb 1.0.16.
    set_auto_detach_kernel_driver: Option<unsafe extern "C" fn(*mut c_void, c_int) -> c_int>,
    // Absent before libusb 1.0.13.
    get_version: Option<unsafe extern "C" fn() -> *const LibusbVersionInfo>,
    _lib: Library,
}

/// libftdi loaded from the host system.
///
/// Create one per process and share it between sessions through
/// [`crate::Driver`].
pub struct NativeLibrary {
    id: LibraryId,
    name: String,
    fns: FtdiFunctions,
    libusb_search: Vec<String>,
    libusb: OnceLock<Option<LibusbFunctions>>,
    // Declared last so the function table is dropped before the library.
    _ftdi: Library,
}

impl std::fmt::Debug for NativeLibrary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeLibrary")
            .field("name", &self.name)
            .field("libusb_search", &self.libusb_search)
            .finish_non_exhaustive()
    }
}

impl NativeLibrary {
    /// Loads libftdi using the default search list.
    pub fn load() -> Result<Self> {
        Self::load_with(DEFAULT_FTDI_SEARCH, DEFAULT_LIBUSB_SEARCH)
    }

    /// Loads libftdi trying each entry of `ftdi_search` in turn. Entries may
    /// be bare library names or paths. `libusb_search` is remembered for a
    /// later auto-detach request.
    pub fn load_with(ftdi_search: &[&str], libusb_search: &[&str]) -> Result<Self> {
        let (lib, name) = open_first("libftdi", ftdi_search)?;
        let fns = unsafe { bind_ftdi(&lib)? };
        Ok(NativeLibrary {
            id: LibraryId::new(),
            name,
            fns,
            libusb_search: libusb_search.iter().map(|s| s.to_string()).collect(),
            libusb: OnceLock::new(),
            _ftdi: lib,
        })
    }

    /// The search entry libftdi was loaded from.
    pub fn library_name(&self) -> &str {
        &self.name
    }

    /// The search entry libusb was loaded from, loading it if needed.
    pub fn libusb_name(&self) -> Option<&str> {
        self.libusb().map(|libusb| libusb.name.as_str())
    }

    fn libusb(&self) -> Option<&LibusbFunctions> {
        self.libusb
            .get_or_init(|| {
                let search: Vec<&str> = self.libusb_search.iter().map(String::as_str).collect();
                match open_first("libusb", &search) {
                    Ok((lib, name)) => {
                        let set_auto_detach_kernel_driver =
                            unsafe { symbol(&lib, "libusb_set_auto_detach_kernel_driver") }.ok();
                        let get_version = unsafe { symbol(&lib, "libusb_get_version") }.ok();
                        Some(LibusbFunctions {
                            name,
                            set_auto_detach_kernel_driver,
                            get_version,
                            _lib: lib,
                        })
                    }
                    Err(e) => {
                        warn!("{}", e);
                        None
                    }
                }
            })
            .as_ref()
    }

    /// The raw context pointer, or `None` for a handle issued elsewhere.
    fn ctx_ptr(&self, ctx: &ContextHandle) -> Option<Ctx> {
        if ctx.owner() == self.id {
            Some(ctx.as_raw() as Ctx)
        } else {
            warn!("Rejecting {:?} issued by another library instance", ctx);
            None
        }
    }

    /// Runs `f` on the context pointer of a handle this library issued.
    fn call(&self, ctx: &ContextHandle, f: impl FnOnce(Ctx) -> c_int) -> c_int {
        match self.ctx_ptr(ctx) {
            Some(raw) => f(raw),
            None => FOREIGN_HANDLE,
        }
    }
}

fn open_first(name: &str, search: &[&str]) -> Result<(Library, String)> {
    for candidate in search {
        // Try the name as given first: dlopen/LoadLibrary resolve it through
        // the normal search path, and this covers full paths and sonames.
        if let Ok(lib) = unsafe { Library::new(candidate) } {
            debug!("Loaded {} as '{}'", name, candidate);
            return Ok((lib, candidate.to_string()));
        }
        let file_name = libloading::library_filename(candidate);
        if let Ok(lib) = unsafe { Library::new(&file_name) } {
            debug!("Loaded {} as {:?}", name, file_name);
            return Ok((lib, file_name.to_string_lossy().into_owned()));
        }
        trace!("{} not found as '{}'", name, candidate);
    }
    Err(Error::LibraryMissing(format!(
        "{} library not found (search: {:?})",
        name, search
    )))
}

unsafe fn symbol<T: Copy>(lib: &Library, name: &str) -> Result<T> {
    let mut c_name = name.as_bytes().to_vec();
    c_name.push(0);
    let sym: Symbol<T> = unsafe { lib.get(&c_name) }
        .map_err(|e| Error::LibraryMissing(format!("symbol {} not found: {}", name, e)))?;
    Ok(*sym)
}

unsafe fn bind_ftdi(lib: &Library) -> Result<FtdiFunctions> {
    unsafe {
        Ok(FtdiFunctions {
            init: symbol(lib, "ftdi_init")?,
            deinit: symbol(lib, "ftdi_deinit")?,
            set_interface: symbol(lib, "ftdi_set_interface")?,
            usb_open_desc_index: symbol(lib, "ftdi_usb_open_desc_index")?,
            usb_close: symbol(lib, "ftdi_usb_close")?,
            set_baudrate: symbol(lib, "ftdi_set_baudrate")?,
            setflowctrl: symbol(lib, "ftdi_setflowctrl")?,
            set_latency_timer: symbol(lib, "ftdi_set_latency_timer")?,
            set_bitmode: symbol(lib, "ftdi_set_bitmode")?,
            read_data: symbol(lib, "ftdi_read_data")?,
            write_data: symbol(lib, "ftdi_write_data")?,
            usb_purge_rx_buffer: symbol(lib, "ftdi_usb_purge_rx_buffer")?,
            usb_purge_tx_buffer: symbol(lib, "ftdi_usb_purge_tx_buffer")?,
            usb_purge_buffers: symbol(lib, "ftdi_usb_purge_buffers")?,
            read_pins: symbol(lib, "ftdi_read_pins")?,
            poll_modem_status: symbol(lib, "ftdi_poll_modem_status")?,
            setdtr: symbol(lib, "ftdi_setdtr")?,
            setrts: symbol(lib, "ftdi_setrts")?,
            get_error_string: symbol(lib, "ftdi_get_error_string")?,
            usb_find_all: symbol(lib, "ftdi_usb_find_all")?,
            usb_get_strings: symbol(lib, "ftdi_usb_get_strings")?,
            list_free: symbol(lib, "ftdi_list_free")?,
            get_library_version: symbol(lib, "ftdi_get_library_version").ok(),
        })
    }
}

fn c_string(p: *const c_char) -> String {
    if p.is_null() {
        String::new()
    } else {
        unsafe { CStr::from_ptr(p) }.to_string_lossy().into_owned()
    }
}

fn clamp_len(len: usize) -> c_int {
    len.min(c_int::MAX as usize) as c_int
}

impl DeviceLibrary for NativeLibrary {
    fn init(&self) -> std::result::Result<ContextHandle, i32> {
        let storage: Box<ContextStorage> = Box::new([0u64; CONTEXT_STORAGE_WORDS]);
        let raw = Box::into_raw(storage);
        let res = unsafe { (self.fns.init)(raw as Ctx) };
        if res != 0 {
            drop(unsafe { Box::from_raw(raw) });
            return Err(res);
        }
        trace!("ftdi_init -> {:p}", raw);
        // SAFETY: `raw` was just allocated and initialised here and is owned
        // by the returned handle alone.
        Ok(unsafe { ContextHandle::from_raw(self.id, raw as usize) })
    }

    fn deinit(&self, ctx: ContextHandle) {
        let Some(raw) = self.ctx_ptr(&ctx) else {
            return;
        };
        let raw = raw as *mut ContextStorage;
        trace!("ftdi_deinit({:p})", raw);
        // SAFETY: the handle came from `init` on this instance and is consumed
        // here, so the storage is freed exactly once.
        unsafe {
            (self.fns.deinit)(raw as Ctx);
            drop(Box::from_raw(raw));
        }
    }

    fn set_interface(&self, ctx: &ContextHandle, interface: Interface) -> i32 {
        self.call(ctx, |raw| unsafe { (self.fns.set_interface)(raw, interface.raw()) })
    }

    fn open_desc_index(
        &self,
        ctx: &ContextHandle,
        vid: u16,
        pid: u16,
        description: Option<&CStr>,
        serial: Option<&CStr>,
        index: u32,
    ) -> i32 {
        let description = description.map_or(ptr::null(), CStr::as_ptr);
        let serial = serial.map_or(ptr::null(), CStr::as_ptr);
        self.call(ctx, |raw| unsafe {
            (self.fns.usb_open_desc_index)(
                raw,
                c_int::from(vid),
                c_int::from(pid),
                description,
                serial,
                index,
            )
        })
    }

    fn close(&self, ctx: &ContextHandle) -> i32 {
        self.call(ctx, |raw| unsafe { (self.fns.usb_close)(raw) })
    }

    fn set_baudrate(&self, ctx: &ContextHandle, baudrate: u32) -> i32 {
        let baudrate = c_int::try_from(baudrate).unwrap_or(c_int::MAX);
        self.call(ctx, |raw| unsafe { (self.fns.set_baudrate)(raw, baudrate) })
    }

    fn set_flow_control(&self, ctx: &ContextHandle, flow: i32) -> i32 {
        self.call(ctx, |raw| unsafe { (self.fns.setflowctrl)(raw, flow) })
    }

    fn set_latency_timer(&self, ctx: &ContextHandle, latency_ms: u8) -> i32 {
        self.call(ctx, |raw| unsafe { (self.fns.set_latency_timer)(raw, latency_ms) })
    }

    fn set_bitmode(&self, ctx: &ContextHandle, mask: u8, mode: u8) -> i32 {
        self.call(ctx, |raw| unsafe { (self.fns.set_bitmode)(raw, mask, mode) })
    }

    fn read_data(&self, ctx: &ContextHandle, buf: &mut [u8]) -> i32 {
        self.call(ctx, |raw| unsafe {
            (self.fns.read_data)(raw, buf.as_mut_ptr(), clamp_len(buf.len()))
        })
    }

    fn write_data(&self, ctx: &ContextHandle, data: &[u8]) -> i32 {
        self.call(ctx, |raw| unsafe {
            (self.fns.write_data)(raw, data.as_ptr(), clamp_len(data.len()))
        })
    }

    fn purge_rx(&self, ctx: &ContextHandle) -> i32 {
        self.call(ctx, |raw| unsafe { (self.fns.usb_purge_rx_buffer)(raw) })
    }

    fn purge_tx(&self, ctx: &ContextHandle) -> i32 {
        self.call(ctx, |raw| unsafe { (self.fns.usb_purge_tx_buffer)(raw) })
    }

    fn purge_both(&self, ctx: &ContextHandle) -> i32 {
        self.call(ctx, |raw| unsafe { (self.fns.usb_purge_buffers)(raw) })
    }

    fn read_pins(&self, ctx: &ContextHandle, pins: &mut u8) -> i32 {
        self.call(ctx, |raw| unsafe { (self.fns.read_pins)(raw, pins as *mut u8) })
    }

    fn poll_modem_status(&self, ctx: &ContextHandle, status: &mut u16) -> i32 {
        self.call(ctx, |raw| unsafe { (self.fns.poll_modem_status)(raw, status as *mut u16) })
    }

    fn set_dtr(&self, ctx: &ContextHandle, state: bool) -> i32 {
        self.call(ctx, |raw| unsafe { (self.fns.setdtr)(raw, c_int::from(state)) })
    }

    fn set_rts(&self, ctx: &ContextHandle, state: bool) -> i32 {
        self.call(ctx, |raw| unsafe { (self.fns.setrts)(raw, c_int::from(state)) })
    }

    fn error_string(&self, ctx: &ContextHandle) -> String {
        match self.ctx_ptr(ctx) {
            Some(raw) => c_string(unsafe { (self.fns.get_error_string)(raw) }),
            None => "context handle belongs to another library instance".to_string(),
        }
    }

    fn find_all(&self, ctx: &ContextHandle, vid: u16, pid: u16) -> std::result::Result<DeviceList, i32> {
        let mut head: *mut FtdiDeviceList = ptr::null_mut();
        let res = self.call(ctx, |raw| unsafe {
            (self.fns.usb_find_all)(raw, &mut head, c_int::from(vid), c_int::from(pid))
        });
        if res < 0 {
            return Err(res);
        }
        let mut nodes = Vec::new();
        let mut cursor = head;
        while !cursor.is_null() {
            let entry = unsafe { &*cursor };
            // SAFETY: every node is an entry of the list wrapped below.
            nodes.push(unsafe { DeviceNode::from_raw(entry.dev as usize) });
            cursor = entry.next;
        }
        // SAFETY: `head` was just allocated by `ftdi_usb_find_all` on this
        // instance and is owned by the returned list alone.
        Ok(unsafe { DeviceList::from_raw(self.id, head as usize, nodes) })
    }

    fn get_strings(&self, ctx: &ContextHandle, node: &DeviceNode, out: &mut DeviceStrings) -> i32 {
        let mut manufacturer = [0 as c_char; consts::STRING_BUFFER_LEN];
        let mut description = [0 as c_char; consts::STRING_BUFFER_LEN];
        let mut serial = [0 as c_char; consts::STRING_BUFFER_LEN];
        // One byte short of the buffer so the zero fill always terminates.
        let len = (consts::STRING_BUFFER_LEN - 1) as c_int;
        let res = self.call(ctx, |raw| unsafe {
            (self.fns.usb_get_strings)(
                raw,
                node.as_raw() as *mut c_void,
                manufacturer.as_mut_ptr(),
                len,
                description.as_mut_ptr(),
                len,
                serial.as_mut_ptr(),
                len,
            )
        });
        out.manufacturer = c_string(manufacturer.as_ptr());
        out.description = c_string(description.as_ptr());
        out.serial = c_string(serial.as_ptr());
        res
    }

    fn list_free(&self, list: DeviceList) {
        if list.owner() != self.id {
            warn!("Rejecting device list issued by another library instance");
            return;
        }
        let mut head = list.head() as *mut FtdiDeviceList;
        unsafe { (self.fns.list_free)(&mut head) }
    }

    fn library_version(&self) -> LibraryVersion {
        match self.fns.get_library_version {
            Some(f) => {
                let info = unsafe { f() };
                LibraryVersion {
                    major: info.major,
                    minor: info.minor,
                    micro: info.micro,
                    version_str: c_string(info.version_str),
                    snapshot_str: c_string(info.snapshot_str),
                }
            }
            None => LibraryVersion::pre_1_0(),
        }
    }

    fn libusb_version(&self) -> Result<LibusbVersion> {
        let libusb = self
            .libusb()
            .ok_or_else(|| Error::LibraryMissing("libusb library not found".to_string()))?;
        let get_version = libusb.get_version.ok_or_else(|| {
            Error::LibraryMissing(format!("libusb_get_version not found in '{}'", libusb.name))
        })?;
        let info = unsafe { get_version() };
        if info.is_null() {
            return Err(Error::LibraryMissing("libusb_get_version returned nothing".to_string()));
        }
        // SAFETY: libusb returns a pointer to a static struct.
        let info = unsafe { &*info };
        Ok(LibusbVersion {
            major: info.major,
            minor: info.minor,
            micro: info.micro,
            nano: info.nano,
            rc: c_string(info.rc),
            describe: c_string(info.describe),
        })
    }

    fn set_auto_detach(&self, ctx: &ContextHandle, enable: bool) -> i32 {
        let Some(raw) = self.ctx_ptr(ctx) else {
            return FOREIGN_HANDLE;
        };
        let head = unsafe { &*(raw as *const FtdiContextHead) };
        if head.usb_dev.is_null() {
            trace!("No USB handle in context {:?} (usb_ctx={:p})", ctx, head.usb_ctx);
            return 0;
        }
        match self.libusb().and_then(|libusb| libusb.set_auto_detach_kernel_driver) {
            Some(f) => unsafe { f(head.usb_dev, c_int::from(enable)) },
            None => LIBUSB_UNAVAILABLE,
        }
    }
}
