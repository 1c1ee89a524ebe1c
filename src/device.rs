//! Device sessions: identity, options, acquisition and lifecycle.

use crate::consts;
use crate::driver::{Driver, ScopedContext};
use crate::error::{self, Error, Result};
use crate::library::{BitMode, ContextHandle, DeviceLibrary, Interface};
use crate::text::{Decoder, Encoding, Mode};
use log::{debug, trace, warn};
use std::ffi::CString;

/// Which device a session should open.
///
/// With no serial or description set, the first device matching the
/// VID/PID candidates (at `device_index`) is opened.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub(crate) serial: Option<String>,
    pub(crate) description: Option<String>,
    pub(crate) device_index: u32,
    pub(crate) list_index: Option<usize>,
    pub(crate) vids: Vec<u16>,
    pub(crate) pids: Vec<u16>,
    pub(crate) interface: Option<Interface>,
}

impl DeviceIdentity {
    /// Matches any device.
    pub fn any() -> Self {
        Self::default()
    }

    /// Matches the device with this serial number. If no serial matches,
    /// the string is tried as a description instead.
    pub fn with_serial(mut self, serial: impl Into<String>) -> Self {
        self.serial = Some(serial.into());
        self
    }

    /// Matches the device with this product description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Picks the n-th device among those matching the other criteria for a
    /// given VID/PID pair. Counting restarts at 0 for every pair.
    pub fn with_device_index(mut self, index: u32) -> Self {
        self.device_index = index;
        self
    }

    /// Opens entry `index` of [`Driver::list_devices`], by its serial
    /// number. Ignored when a serial or description is set.
    pub fn with_list_index(mut self, index: usize) -> Self {
        self.list_index = Some(index);
        self
    }

    /// Tries these vendor and product IDs after the driver-wide candidates.
    pub fn with_vid_pid(mut self, vids: &[u16], pids: &[u16]) -> Self {
        self.vids.extend_from_slice(vids);
        self.pids.extend_from_slice(pids);
        self
    }

    /// Selects one interface of a multi-port chip.
    pub fn with_interface(mut self, interface: Interface) -> Self {
        self.interface = Some(interface);
        self
    }

    pub fn serial(&self) -> Option<&str> {
        self.serial.as_deref()
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn device_index(&self) -> u32 {
        self.device_index
    }

    pub fn interface(&self) -> Option<Interface> {
        self.interface
    }
}

/// Session behaviour fixed at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    /// Binary (bytes) or text (decoded with an encoding).
    pub mode: Mode,
    /// Split reads and writes into native transfers of at most this many
    /// bytes. 0 means one transfer per call.
    pub chunk_size: usize,
    /// Ask libusb to detach a kernel driver (e.g. `ftdi_sio`) for the
    /// lifetime of the session. Needs libftdi 1.0 or later.
    pub auto_detach: bool,
    /// Leave the session unopened until [`Device::open`] is called.
    pub lazy_open: bool,
    /// Bit-bang sessions only: make port reads sample live pins and port
    /// writes purge queued output first.
    pub sync: bool,
    /// Bit-bang sessions only: hardware mode programmed with the direction.
    pub bitbang_mode: BitMode,
}

impl Default for SessionOptions {
    fn default() -> Self {
        SessionOptions {
            mode: Mode::Binary,
            chunk_size: 0,
            auto_detach: true,
            lazy_open: false,
            sync: true,
            bitbang_mode: BitMode::BitBang,
        }
    }
}

impl SessionOptions {
    /// Text mode with the given encoding.
    pub fn with_text(mut self, encoding: Encoding) -> Self {
        self.mode = Mode::Text(encoding);
        self
    }

    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_auto_detach(mut self, auto_detach: bool) -> Self {
        self.auto_detach = auto_detach;
        self
    }

    pub fn with_lazy_open(mut self, lazy_open: bool) -> Self {
        self.lazy_open = lazy_open;
        self
    }

    pub fn with_sync(mut self, sync: bool) -> Self {
        self.sync = sync;
        self
    }

    pub fn with_bitbang_mode(mut self, mode: BitMode) -> Self {
        self.bitbang_mode = mode;
        self
    }
}

#[derive(Debug)]
pub(crate) enum SessionState {
    Unopened,
    Open(ContextHandle),
    Closed,
}

/// A session with one FTDI device.
///
/// The session owns its driver context exclusively and releases it exactly
/// once, on [`close`](Device::close) or when dropped. Calls on one session
/// must be serialized by the caller; the type is `Send` but not `Sync`.
#[derive(Debug)]
pub struct Device {
    pub(crate) driver: Driver,
    pub(crate) identity: DeviceIdentity,
    pub(crate) options: SessionOptions,
    pub(crate) state: SessionState,
    pub(crate) baudrate: u32,
    pub(crate) decoder: Decoder,
    pub(crate) dtr: Option<bool>,
    pub(crate) rts: Option<bool>,
}

impl Device {
    // --- Constructors ---

    /// Creates a session and, unless `options.lazy_open` is set, opens it.
    pub fn new(driver: &Driver, identity: DeviceIdentity, options: SessionOptions) -> Result<Self> {
        let lazy = options.lazy_open;
        let mut device = Self::unopened(driver, identity, options);
        if !lazy {
            device.open()?;
        }
        Ok(device)
    }

    /// Opens the first device found with default options.
    pub fn open_first(driver: &Driver) -> Result<Self> {
        Self::new(driver, DeviceIdentity::any(), SessionOptions::default())
    }

    /// Opens the device with the given serial number (or description).
    pub fn open_by_serial(driver: &Driver, serial: &str) -> Result<Self> {
        Self::new(driver, DeviceIdentity::any().with_serial(serial), SessionOptions::default())
    }

    pub(crate) fn unopened(driver: &Driver, identity: DeviceIdentity, options: SessionOptions) -> Self {
        let encoding = match options.mode {
            Mode::Text(encoding) => encoding,
            Mode::Binary => Encoding::default(),
        };
        Device {
            driver: driver.clone(),
            identity,
            options,
            state: SessionState::Unopened,
            baudrate: consts::DEFAULT_BAUDRATE,
            decoder: Decoder::new(encoding),
            dtr: None,
            rts: None,
        }
    }

    // --- Lifecycle ---

    /// Acquires the device. A no-op when already open; a closed session is
    /// re-acquired with a fresh context.
    ///
    /// Every VID/PID candidate pair is tried (vendor outer, product inner)
    /// until the native open reports anything other than "device not
    /// found". On failure the context is released, the session stays
    /// unopened and the error carries the native code plus a hint.
    pub fn open(&mut self) -> Result<()> {
        if self.is_open() {
            return Ok(());
        }
        self.resolve_list_index()?;

        let lib = self.driver.library();
        let scope = ScopedContext::new(lib)?;
        let handle = scope.handle()?;

        if let Some(interface) = self.identity.interface {
            let res = lib.set_interface(handle, interface);
            if res != 0 {
                return Err(error::native(res, lib.error_string(handle)));
            }
        }

        let res = self.open_device(lib, handle)?;
        if res != 0 {
            let message = lib.error_string(handle);
            debug!("Open failed ({}): {}", res, message);
            return Err(error::open_failed(res, message));
        }
        let ctx = scope.into_inner()?;

        if self.options.auto_detach && self.driver.library_version().major > 0 {
            let res = lib.set_auto_detach(&ctx, true);
            if res != 0 {
                warn!("Could not enable kernel driver auto-detach ({})", res);
            }
        }

        // Known serial baseline.
        check_setup("set_bitmode", lib.set_bitmode(&ctx, 0, BitMode::Reset.raw()));
        check_setup("setflowctrl", lib.set_flow_control(&ctx, consts::FLOW_CONTROL_DISABLE));
        let res = lib.set_baudrate(&ctx, consts::DEFAULT_BAUDRATE);
        if res == 0 {
            self.baudrate = consts::DEFAULT_BAUDRATE;
        } else {
            warn!("Default baudrate not accepted ({})", res);
        }
        check_setup("set_latency_timer", lib.set_latency_timer(&ctx, consts::DEFAULT_LATENCY_MS));

        debug!("Device opened ({:?})", ctx);
        self.decoder.reset();
        self.dtr = None;
        self.rts = None;
        self.state = SessionState::Open(ctx);
        Ok(())
    }

    fn resolve_list_index(&mut self) -> Result<()> {
        let Some(index) = self.identity.list_index else {
            return Ok(());
        };
        if self.identity.serial.is_some() || self.identity.description.is_some() {
            return Ok(());
        }
        let devices = self.driver.list_devices()?;
        match devices.get(index) {
            Some(entry) => {
                debug!("List index {} resolves to serial '{}'", index, entry.serial);
                self.identity.serial = Some(entry.serial.clone());
                Ok(())
            }
            None => Err(Error::DeviceNotFoundByIndex {
                index,
                message: format!("Index out of range (found {} devices)", devices.len()),
            }),
        }
    }

    fn open_device(&self, lib: &dyn DeviceLibrary, ctx: &ContextHandle) -> Result<i32> {
        let serial = c_string(self.identity.serial.as_deref())?;
        let description = c_string(self.identity.description.as_deref())?;
        let index = self.identity.device_index;
        let mut res = consts::ERR_DEVICE_NOT_FOUND;

        for (vid, pid) in self
            .driver
            .vid_pid_pairs(&self.identity.vids, &self.identity.pids)
        {
            trace!("Trying {:04X}:{:04X} index {}", vid, pid, index);
            if serial.is_none() && description.is_none() {
                res = lib.open_desc_index(ctx, vid, pid, None, None, index);
            } else {
                res = lib.open_desc_index(ctx, vid, pid, description.as_deref(), serial.as_deref(), index);
                if res != 0 {
                    // Retry with the strings swapped: a serial given by the
                    // caller may really be a description, and vice versa.
                    res = lib.open_desc_index(ctx, vid, pid, serial.as_deref(), description.as_deref(), index);
                }
            }
            if res != consts::ERR_DEVICE_NOT_FOUND {
                break;
            }
        }
        Ok(res)
    }

    /// Releases the device. Calling it again is a no-op.
    pub fn close(&mut self) {
        if let SessionState::Open(ctx) = std::mem::replace(&mut self.state, SessionState::Closed) {
            let lib = self.driver.library();
            let res = lib.close(&ctx);
            if res != 0 {
                warn!("ftdi_usb_close returned {}", res);
            }
            lib.deinit(ctx);
            debug!("Device closed");
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state, SessionState::Open(_))
    }

    /// True once [`close`](Device::close) has been called.
    pub fn is_closed(&self) -> bool {
        matches!(self.state, SessionState::Closed)
    }

    /// The context of an open session, or the lifecycle error for
    /// `operation`.
    pub(crate) fn context(&self, operation: &'static str) -> Result<&ContextHandle> {
        match &self.state {
            SessionState::Open(ctx) => Ok(ctx),
            SessionState::Unopened => Err(Error::NotOpen { operation }),
            SessionState::Closed => Err(Error::UseAfterClose { operation }),
        }
    }

    /// Turns a non-zero native status into an error carrying the driver's
    /// message.
    pub(crate) fn check(&self, ctx: &ContextHandle, res: i32) -> Result<()> {
        if res == 0 {
            Ok(())
        } else {
            Err(error::native(res, self.driver.library().error_string(ctx)))
        }
    }

    // --- Settings ---

    /// The last baudrate the driver accepted.
    pub fn baudrate(&self) -> u32 {
        self.baudrate
    }

    /// Negotiates a new baudrate. The stored value only changes if the
    /// driver accepts it.
    pub fn set_baudrate(&mut self, baudrate: u32) -> Result<()> {
        let ctx = self.context("set_baudrate")?;
        let res = self.driver.library().set_baudrate(ctx, baudrate);
        self.check(ctx, res)?;
        trace!("Baudrate set to {}", baudrate);
        self.baudrate = baudrate;
        Ok(())
    }

    pub fn mode(&self) -> Mode {
        self.options.mode
    }

    /// Switches between binary and text mode. Any partially decoded input
    /// is discarded.
    pub fn set_mode(&mut self, mode: Mode) {
        self.options.mode = mode;
        if let Mode::Text(encoding) = mode {
            self.decoder = Decoder::new(encoding);
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.options.chunk_size
    }

    pub fn set_chunk_size(&mut self, chunk_size: usize) {
        self.options.chunk_size = chunk_size;
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    pub fn driver(&self) -> &Driver {
        &self.driver
    }

    /// Runs `f` with the native library and this session's context, for
    /// native calls this crate does not wrap.
    ///
    /// ```no_run
    /// # fn main() -> ftdi_link::Result<()> {
    /// let driver = ftdi_link::Driver::load()?;
    /// let dev = ftdi_link::Device::open_first(&driver)?;
    /// let status = dev.with_context(|lib, ctx| lib.set_latency_timer(ctx, 2))?;
    /// assert_eq!(status, 0);
    /// # Ok(())
    /// # }
    /// ```
    pub fn with_context<T>(&self, f: impl FnOnce(&dyn DeviceLibrary, &ContextHandle) -> T) -> Result<T> {
        let ctx = self.context("with_context")?;
        Ok(f(self.driver.library(), ctx))
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        self.close();
    }
}

fn check_setup(call: &str, res: i32) {
    if res != 0 {
        warn!("{} during open returned {}", call, res);
    }
}

fn c_string(s: Option<&str>) -> Result<Option<CString>> {
    s.map(|s| {
        CString::new(s).map_err(|_| {
            Error::ArgumentOutOfRange(format!("device string {:?} contains a NUL byte", s))
        })
    })
    .transpose()
}
