//! The shared driver handle and device enumeration.

use crate::consts;
use crate::error::{self, Error, Result};
use crate::library::{
    ContextHandle, DeviceLibrary, DeviceList, DeviceNode, DeviceStrings, LibraryVersion,
    LibusbVersion,
};
use crate::native::NativeLibrary;
use log::{debug, trace, warn};
use std::fmt;
use std::sync::{Arc, RwLock};

/// One attached device as reported by enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceEntry {
    /// USB vendor ID the device was found under.
    pub vid: u16,
    /// USB product ID the device was found under.
    pub pid: u16,
    pub manufacturer: String,
    pub description: String,
    /// Serial number; usable as [`crate::DeviceIdentity::with_serial`].
    pub serial: String,
}

impl fmt::Display for DeviceEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.manufacturer, self.description, self.serial)
    }
}

#[derive(Debug)]
struct IdTable {
    vids: Vec<u16>,
    pids: Vec<u16>,
}

fn push_unique(list: &mut Vec<u16>, ids: &[u16]) {
    for &id in ids {
        if !list.contains(&id) {
            list.push(id);
        }
    }
}

/// Shared handle to the native library plus the VID/PID candidate table.
///
/// Cheap to clone; every clone refers to the same loaded library and the same
/// table, so IDs added through one clone are seen by all sessions.
#[derive(Clone)]
pub struct Driver {
    lib: Arc<dyn DeviceLibrary>,
    ids: Arc<RwLock<IdTable>>,
}

impl fmt::Debug for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (vids, pids) = self.candidate_ids();
        f.debug_struct("Driver")
            .field("vids", &format_args!("{:04X?}", vids))
            .field("pids", &format_args!("{:04X?}", pids))
            .finish_non_exhaustive()
    }
}

impl Driver {
    /// Loads libftdi from the host with the default search list.
    pub fn load() -> Result<Self> {
        let lib = NativeLibrary::load()?;
        debug!("libftdi loaded, version {}", lib.library_version());
        Ok(Self::new(Arc::new(lib)))
    }

    /// Wraps an already loaded library (native or mock).
    pub fn new(lib: Arc<dyn DeviceLibrary>) -> Self {
        Driver {
            lib,
            ids: Arc::new(RwLock::new(IdTable {
                vids: vec![consts::FTDI_VID],
                pids: consts::DEFAULT_PIDS.to_vec(),
            })),
        }
    }

    /// The underlying native library.
    pub fn library(&self) -> &dyn DeviceLibrary {
        self.lib.as_ref()
    }

    /// Version of the loaded native library.
    pub fn library_version(&self) -> LibraryVersion {
        self.lib.library_version()
    }

    /// Version of the libusb runtime libftdi sits on, or
    /// [`Error::LibraryMissing`] when libusb cannot be loaded.
    pub fn libusb_version(&self) -> Result<LibusbVersion> {
        self.lib.libusb_version()
    }

    /// Adds vendor and product IDs to the candidates tried by open and
    /// enumeration. IDs already present are not repeated.
    pub fn add_custom_vid_pid(&self, vids: &[u16], pids: &[u16]) {
        let mut table = self.ids.write().unwrap_or_else(|p| p.into_inner());
        push_unique(&mut table.vids, vids);
        push_unique(&mut table.pids, pids);
        debug!(
            "VID/PID candidates now {:04X?} x {:04X?}",
            table.vids, table.pids
        );
    }

    /// Current vendor and product ID candidates, in the order tried.
    pub fn candidate_ids(&self) -> (Vec<u16>, Vec<u16>) {
        let table = self.ids.read().unwrap_or_else(|p| p.into_inner());
        (table.vids.clone(), table.pids.clone())
    }

    /// All (vid, pid) pairs to try: vendor list outer, product list inner,
    /// with session-specific extras appended to each list.
    pub(crate) fn vid_pid_pairs(&self, extra_vids: &[u16], extra_pids: &[u16]) -> Vec<(u16, u16)> {
        let (mut vids, mut pids) = self.candidate_ids();
        push_unique(&mut vids, extra_vids);
        push_unique(&mut pids, extra_pids);
        vids.iter()
            .flat_map(|&vid| pids.iter().map(move |&pid| (vid, pid)))
            .collect()
    }

    /// Lists every attached device matching the candidate IDs, without
    /// opening any of them.
    ///
    /// Entries are in native enumeration order. A descriptor string the
    /// driver cannot read comes back empty rather than failing the scan.
    pub fn list_devices(&self) -> Result<Vec<DeviceEntry>> {
        let scope = ScopedContext::new(self.library())?;
        let ctx = scope.handle()?;
        let mut devices = Vec::new();
        for (vid, pid) in self.vid_pid_pairs(&[], &[]) {
            let list = match self.lib.find_all(ctx, vid, pid) {
                Ok(list) => ScopedList::new(self.library(), list),
                Err(code) => return Err(error::native(code, self.lib.error_string(ctx))),
            };
            trace!("find_all {:04X}:{:04X} -> {} device(s)", vid, pid, list.nodes().len());
            for node in list.nodes() {
                let mut strings = DeviceStrings::default();
                let res = self.lib.get_strings(ctx, node, &mut strings);
                match res {
                    consts::ERR_STRING_MANUFACTURER
                    | consts::ERR_STRING_DESCRIPTION
                    | consts::ERR_STRING_SERIAL => {
                        warn!(
                            "Incomplete descriptor strings for {:04X}:{:04X} ({}): {:?}",
                            vid, pid, res, strings
                        );
                    }
                    code if code < 0 => {
                        return Err(error::native(code, self.lib.error_string(ctx)));
                    }
                    _ => {}
                }
                debug!(
                    "Found device {:04X}:{:04X} {}:{}:{}",
                    vid, pid, strings.manufacturer, strings.description, strings.serial
                );
                devices.push(DeviceEntry {
                    vid,
                    pid,
                    manufacturer: strings.manufacturer,
                    description: strings.description,
                    serial: strings.serial,
                });
            }
        }
        Ok(devices)
    }
}

/// A driver context released on drop unless handed on with `into_inner`.
pub(crate) struct ScopedContext<'a> {
    lib: &'a dyn DeviceLibrary,
    ctx: Option<ContextHandle>,
}

impl<'a> ScopedContext<'a> {
    pub(crate) fn new(lib: &'a dyn DeviceLibrary) -> Result<Self> {
        match lib.init() {
            Ok(ctx) => Ok(ScopedContext { lib, ctx: Some(ctx) }),
            Err(code) => Err(error::native(code, "ftdi_init failed")),
        }
    }

    pub(crate) fn handle(&self) -> Result<&ContextHandle> {
        self.ctx.as_ref().ok_or(Error::UseAfterClose { operation: "context" })
    }

    /// Keeps the context alive past the guard.
    pub(crate) fn into_inner(mut self) -> Result<ContextHandle> {
        self.ctx.take().ok_or(Error::UseAfterClose { operation: "context" })
    }
}

impl Drop for ScopedContext<'_> {
    fn drop(&mut self) {
        if let Some(ctx) = self.ctx.take() {
            self.lib.deinit(ctx);
        }
    }
}

/// A native device list freed on drop.
struct ScopedList<'a> {
    lib: &'a dyn DeviceLibrary,
    list: Option<DeviceList>,
}

impl<'a> ScopedList<'a> {
    fn new(lib: &'a dyn DeviceLibrary, list: DeviceList) -> Self {
        ScopedList { lib, list: Some(list) }
    }

    fn nodes(&self) -> &[DeviceNode] {
        match &self.list {
            Some(list) => list.nodes(),
            None => &[],
        }
    }
}

impl Drop for ScopedList<'_> {
    fn drop(&mut self) {
        if let Some(list) = self.list.take() {
            self.lib.list_free(list);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockLibrary;

    #[test]
    fn default_candidates_are_ftdi_ids() {
        let driver = Driver::new(Arc::new(MockLibrary::new()));
        let pairs = driver.vid_pid_pairs(&[], &[]);
        assert_eq!(pairs.len(), 5);
        assert_eq!(pairs[0], (0x0403, 0x6001));
        assert_eq!(pairs[4], (0x0403, 0x6015));
    }

    #[test]
    fn custom_ids_extend_without_duplicates() {
        let driver = Driver::new(Arc::new(MockLibrary::new()));
        driver.add_custom_vid_pid(&[0x0403, 0x1234], &[0x6001, 0xABCD]);
        let (vids, pids) = driver.candidate_ids();
        assert_eq!(vids, vec![0x0403, 0x1234]);
        assert_eq!(pids.len(), 6);
        assert_eq!(pids.last(), Some(&0xABCD));

        // Vendor outer, product inner.
        let pairs = driver.vid_pid_pairs(&[], &[]);
        assert_eq!(pairs.len(), 12);
        assert_eq!(pairs[6], (0x1234, 0x6001));

        // Clones share the table.
        let clone = driver.clone();
        clone.add_custom_vid_pid(&[0x9999], &[]);
        assert_eq!(driver.candidate_ids().0.len(), 3);
    }

    #[test]
    fn session_extras_are_appended() {
        let driver = Driver::new(Arc::new(MockLibrary::new()));
        let pairs = driver.vid_pid_pairs(&[0x1111], &[0x2222]);
        assert_eq!(pairs.len(), 12);
        assert_eq!(pairs.last(), Some(&(0x1111, 0x2222)));
    }

    #[test]
    fn scoped_context_releases_on_drop() {
        let lib = MockLibrary::new();
        {
            let _ctx = ScopedContext::new(&lib).unwrap();
            assert_eq!(lib.live_contexts(), 1);
        }
        assert_eq!(lib.live_contexts(), 0);
    }
}
