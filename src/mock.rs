//! In-memory [`DeviceLibrary`] for unit and integration tests.
//!
//! Always compiled, hidden from public docs. Every native entry point appends
//! its libftdi function name to a call log, so tests can assert the exact
//! sequence of native calls an operation makes. Behaviour is scripted through
//! the setter methods; by default every call succeeds.

use crate::consts;
use crate::library::{
    ContextHandle, DeviceLibrary, DeviceList, DeviceNode, DeviceStrings, Interface, LibraryId,
    LibraryVersion, LibusbVersion,
};
use crate::{Error, Result as CrateResult};
use log::warn;
use std::collections::{HashSet, VecDeque};
use std::ffi::CStr;
use std::sync::{Mutex, MutexGuard};

/// Arguments of one `ftdi_usb_open_desc_index` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenRequest {
    pub vid: u16,
    pub pid: u16,
    pub description: Option<String>,
    pub serial: Option<String>,
    pub index: u32,
}

/// One simulated attached device.
#[derive(Debug, Clone)]
pub struct MockDeviceEntry {
    pub vid: u16,
    pub pid: u16,
    pub strings: DeviceStrings,
    /// Status returned by `ftdi_usb_get_strings` for this device.
    pub strings_status: i32,
}

#[derive(Debug)]
struct MockState {
    calls: Vec<&'static str>,
    next_token: usize,
    contexts: HashSet<usize>,
    lists: HashSet<usize>,
    rejected_handles: usize,
    init_result: i32,
    open_results: VecDeque<i32>,
    open_requests: Vec<OpenRequest>,
    interface: Option<Interface>,
    baudrate_result: i32,
    baudrates: Vec<u32>,
    flow_control: Option<i32>,
    latency_ms: Option<u8>,
    bitmodes: Vec<(u8, u8)>,
    loopback: bool,
    rx: VecDeque<u8>,
    written: Vec<u8>,
    write_capacity: Option<usize>,
    read_error: Option<i32>,
    write_error: Option<i32>,
    purge_result: i32,
    pins: u8,
    modem_status: u16,
    dtr: Option<bool>,
    rts: Option<bool>,
    devices: Vec<MockDeviceEntry>,
    find_all_result: i32,
    version: LibraryVersion,
    libusb_version: Option<LibusbVersion>,
    auto_detach_requests: Vec<bool>,
    error_message: String,
}

/// Scriptable in-memory native library.
#[derive(Debug)]
pub struct MockLibrary {
    id: LibraryId,
    state: Mutex<MockState>,
}

impl Default for MockLibrary {
    fn default() -> Self {
        Self::new()
    }
}

impl MockLibrary {
    pub fn new() -> Self {
        MockLibrary {
            id: LibraryId::new(),
            state: Mutex::new(MockState {
                calls: Vec::new(),
                next_token: 0x1000,
                contexts: HashSet::new(),
                lists: HashSet::new(),
                rejected_handles: 0,
                init_result: 0,
                open_results: VecDeque::new(),
                open_requests: Vec::new(),
                interface: None,
                baudrate_result: 0,
                baudrates: Vec::new(),
                flow_control: None,
                latency_ms: None,
                bitmodes: Vec::new(),
                loopback: false,
                rx: VecDeque::new(),
                written: Vec::new(),
                write_capacity: None,
                read_error: None,
                write_error: None,
                purge_result: 0,
                pins: 0,
                modem_status: 0,
                dtr: None,
                rts: None,
                devices: Vec::new(),
                find_all_result: 0,
                version: LibraryVersion {
                    major: 1,
                    minor: 2,
                    micro: 3,
                    version_str: "1.2.3".to_string(),
                    snapshot_str: "mock".to_string(),
                },
                libusb_version: Some(LibusbVersion {
                    major: 1,
                    minor: 0,
                    micro: 26,
                    nano: 11724,
                    rc: String::new(),
                    describe: "https://libusb.info".to_string(),
                }),
                auto_detach_requests: Vec::new(),
                error_message: "mock error".to_string(),
            }),
        }
    }

    /// A library whose writes become readable, like a wired TX→RX loop.
    pub fn loopback() -> Self {
        let lib = Self::new();
        lib.set_loopback(true);
        lib
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn record(&self, name: &'static str) -> MutexGuard<'_, MockState> {
        let mut state = self.state();
        state.calls.push(name);
        state
    }

    // --- Call log ---

    /// Returns the recorded native calls and clears the log.
    pub fn take_calls(&self) -> Vec<&'static str> {
        std::mem::take(&mut self.state().calls)
    }

    /// Returns a copy of the recorded native calls.
    pub fn calls(&self) -> Vec<&'static str> {
        self.state().calls.clone()
    }

    pub fn reset_calls(&self) {
        self.state().calls.clear();
    }

    // --- Scripting ---

    pub fn set_init_result(&self, code: i32) {
        self.state().init_result = code;
    }

    /// Queues results for successive open calls. Once the queue is empty,
    /// opens succeed.
    pub fn push_open_results(&self, codes: &[i32]) {
        self.state().open_results.extend(codes.iter().copied());
    }

    pub fn set_baudrate_result(&self, code: i32) {
        self.state().baudrate_result = code;
    }

    pub fn set_loopback(&self, enabled: bool) {
        self.state().loopback = enabled;
    }

    /// Makes bytes available to the next reads.
    pub fn push_rx(&self, data: &[u8]) {
        self.state().rx.extend(data.iter().copied());
    }

    /// Limits the total number of bytes writes will accept; after that,
    /// writes report 0 bytes transferred.
    pub fn set_write_capacity(&self, capacity: Option<usize>) {
        self.state().write_capacity = capacity;
    }

    pub fn set_read_error(&self, code: Option<i32>) {
        self.state().read_error = code;
    }

    pub fn set_write_error(&self, code: Option<i32>) {
        self.state().write_error = code;
    }

    pub fn set_purge_result(&self, code: i32) {
        self.state().purge_result = code;
    }

    /// Value returned by `ftdi_read_pins`.
    pub fn set_pins(&self, pins: u8) {
        self.state().pins = pins;
    }

    pub fn set_modem_status(&self, status: u16) {
        self.state().modem_status = status;
    }

    pub fn set_version(&self, version: LibraryVersion) {
        self.state().version = version;
    }

    /// Value reported by `libusb_get_version`; `None` behaves as if libusb
    /// could not be loaded.
    pub fn set_libusb_version(&self, version: Option<LibusbVersion>) {
        self.state().libusb_version = version;
    }

    pub fn set_error_message(&self, message: &str) {
        self.state().error_message = message.to_string();
    }

    pub fn set_find_all_result(&self, code: i32) {
        self.state().find_all_result = code;
    }

    /// Attaches a device with the default FTDI VID/PID (0x0403:0x6001).
    pub fn add_device(&self, manufacturer: &str, description: &str, serial: &str) {
        self.add_device_with(consts::FTDI_VID, consts::FT232R_PID, manufacturer, description, serial, 0);
    }

    /// Attaches a device with explicit IDs and a `get_strings` status. For a
    /// failing status, only the fields before the failing one are filled,
    /// as libftdi does.
    pub fn add_device_with(
        &self,
        vid: u16,
        pid: u16,
        manufacturer: &str,
        description: &str,
        serial: &str,
        strings_status: i32,
    ) {
        self.state().devices.push(MockDeviceEntry {
            vid,
            pid,
            strings: DeviceStrings {
                manufacturer: manufacturer.to_string(),
                description: description.to_string(),
                serial: serial.to_string(),
            },
            strings_status,
        });
    }

    // --- Inspection ---

    pub fn open_requests(&self) -> Vec<OpenRequest> {
        self.state().open_requests.clone()
    }

    /// Bytes passed to `ftdi_write_data`, in order.
    pub fn written(&self) -> Vec<u8> {
        self.state().written.clone()
    }

    pub fn bitmodes(&self) -> Vec<(u8, u8)> {
        self.state().bitmodes.clone()
    }

    pub fn baudrates(&self) -> Vec<u32> {
        self.state().baudrates.clone()
    }

    pub fn flow_control(&self) -> Option<i32> {
        self.state().flow_control
    }

    pub fn latency_ms(&self) -> Option<u8> {
        self.state().latency_ms
    }

    pub fn interface(&self) -> Option<Interface> {
        self.state().interface
    }

    pub fn dtr(&self) -> Option<bool> {
        self.state().dtr
    }

    pub fn rts(&self) -> Option<bool> {
        self.state().rts
    }

    /// Contexts initialised and not yet released.
    pub fn live_contexts(&self) -> usize {
        self.state().contexts.len()
    }

    /// Device lists returned by `find_all` and not yet freed.
    pub fn live_lists(&self) -> usize {
        self.state().lists.len()
    }

    /// Contexts and lists handed back for release that this instance did
    /// not issue or had already released.
    pub fn rejected_handles(&self) -> usize {
        self.state().rejected_handles
    }

    /// Kernel-driver auto-detach requests (libusb, not part of the call log).
    pub fn auto_detach_requests(&self) -> Vec<bool> {
        self.state().auto_detach_requests.clone()
    }
}

fn owned(s: Option<&CStr>) -> Option<String> {
    s.map(|s| s.to_string_lossy().into_owned())
}

impl DeviceLibrary for MockLibrary {
    fn init(&self) -> Result<ContextHandle, i32> {
        let mut state = self.record("ftdi_init");
        if state.init_result != 0 {
            return Err(state.init_result);
        }
        state.next_token += 0x10;
        let token = state.next_token;
        state.contexts.insert(token);
        // SAFETY: tokens are never reused, so this is the only handle for it.
        Ok(unsafe { ContextHandle::from_raw(self.id, token) })
    }

    fn deinit(&self, ctx: ContextHandle) {
        let mut state = self.record("ftdi_deinit");
        if ctx.owner() != self.id || !state.contexts.remove(&ctx.as_raw()) {
            warn!("Rejecting release of unknown {:?}", ctx);
            state.rejected_handles += 1;
        }
    }

    fn set_interface(&self, _ctx: &ContextHandle, interface: Interface) -> i32 {
        self.record("ftdi_set_interface").interface = Some(interface);
        0
    }

    fn open_desc_index(
        &self,
        _ctx: &ContextHandle,
        vid: u16,
        pid: u16,
        description: Option<&CStr>,
        serial: Option<&CStr>,
        index: u32,
    ) -> i32 {
        let mut state = self.record("ftdi_usb_open_desc_index");
        state.open_requests.push(OpenRequest {
            vid,
            pid,
            description: owned(description),
            serial: owned(serial),
            index,
        });
        state.open_results.pop_front().unwrap_or(0)
    }

    fn close(&self, _ctx: &ContextHandle) -> i32 {
        drop(self.record("ftdi_usb_close"));
        0
    }

    fn set_baudrate(&self, _ctx: &ContextHandle, baudrate: u32) -> i32 {
        let mut state = self.record("ftdi_set_baudrate");
        state.baudrates.push(baudrate);
        state.baudrate_result
    }

    fn set_flow_control(&self, _ctx: &ContextHandle, flow: i32) -> i32 {
        self.record("ftdi_setflowctrl").flow_control = Some(flow);
        0
    }

    fn set_latency_timer(&self, _ctx: &ContextHandle, latency_ms: u8) -> i32 {
        self.record("ftdi_set_latency_timer").latency_ms = Some(latency_ms);
        0
    }

    fn set_bitmode(&self, _ctx: &ContextHandle, mask: u8, mode: u8) -> i32 {
        self.record("ftdi_set_bitmode").bitmodes.push((mask, mode));
        0
    }

    fn read_data(&self, _ctx: &ContextHandle, buf: &mut [u8]) -> i32 {
        let mut state = self.record("ftdi_read_data");
        if let Some(code) = state.read_error {
            return code;
        }
        let n = buf.len().min(state.rx.len());
        for (slot, byte) in buf.iter_mut().zip(state.rx.drain(..n)) {
            *slot = byte;
        }
        n as i32
    }

    fn write_data(&self, _ctx: &ContextHandle, data: &[u8]) -> i32 {
        let mut state = self.record("ftdi_write_data");
        if let Some(code) = state.write_error {
            return code;
        }
        let n = match state.write_capacity {
            Some(capacity) => {
                let n = data.len().min(capacity);
                state.write_capacity = Some(capacity - n);
                n
            }
            None => data.len(),
        };
        state.written.extend_from_slice(&data[..n]);
        if state.loopback {
            state.rx.extend(data[..n].iter().copied());
        }
        n as i32
    }

    fn purge_rx(&self, _ctx: &ContextHandle) -> i32 {
        let mut state = self.record("ftdi_usb_purge_rx_buffer");
        if state.purge_result == 0 {
            state.rx.clear();
        }
        state.purge_result
    }

    fn purge_tx(&self, _ctx: &ContextHandle) -> i32 {
        self.record("ftdi_usb_purge_tx_buffer").purge_result
    }

    fn purge_both(&self, _ctx: &ContextHandle) -> i32 {
        let mut state = self.record("ftdi_usb_purge_buffers");
        if state.purge_result == 0 {
            state.rx.clear();
        }
        state.purge_result
    }

    fn read_pins(&self, _ctx: &ContextHandle, pins: &mut u8) -> i32 {
        *pins = self.record("ftdi_read_pins").pins;
        0
    }

    fn poll_modem_status(&self, _ctx: &ContextHandle, status: &mut u16) -> i32 {
        *status = self.record("ftdi_poll_modem_status").modem_status;
        0
    }

    fn set_dtr(&self, _ctx: &ContextHandle, state: bool) -> i32 {
        self.record("ftdi_setdtr").dtr = Some(state);
        0
    }

    fn set_rts(&self, _ctx: &ContextHandle, state: bool) -> i32 {
        self.record("ftdi_setrts").rts = Some(state);
        0
    }

    fn error_string(&self, _ctx: &ContextHandle) -> String {
        self.record("ftdi_get_error_string").error_message.clone()
    }

    fn find_all(&self, _ctx: &ContextHandle, vid: u16, pid: u16) -> Result<DeviceList, i32> {
        let mut state = self.record("ftdi_usb_find_all");
        if state.find_all_result < 0 {
            return Err(state.find_all_result);
        }
        let nodes: Vec<DeviceNode> = state
            .devices
            .iter()
            .enumerate()
            .filter(|(_, d)| d.vid == vid && d.pid == pid)
            // SAFETY: node tokens are device indices, stored into the list below.
            .map(|(i, _)| unsafe { DeviceNode::from_raw(i + 1) })
            .collect();
        state.next_token += 0x10;
        let token = state.next_token;
        state.lists.insert(token);
        // SAFETY: tokens are never reused, so this is the only list for it.
        Ok(unsafe { DeviceList::from_raw(self.id, token, nodes) })
    }

    fn get_strings(&self, _ctx: &ContextHandle, node: &DeviceNode, out: &mut DeviceStrings) -> i32 {
        let state = self.record("ftdi_usb_get_strings");
        let Some(entry) = node.as_raw().checked_sub(1).and_then(|i| state.devices.get(i)) else {
            return -1;
        };
        // libftdi fills the strings in order and stops at the first failure.
        let filled = match entry.strings_status {
            consts::ERR_STRING_MANUFACTURER => 0,
            consts::ERR_STRING_DESCRIPTION => 1,
            consts::ERR_STRING_SERIAL => 2,
            s if s < 0 => 0,
            _ => 3,
        };
        *out = DeviceStrings::default();
        if filled > 0 {
            out.manufacturer = entry.strings.manufacturer.clone();
        }
        if filled > 1 {
            out.description = entry.strings.description.clone();
        }
        if filled > 2 {
            out.serial = entry.strings.serial.clone();
        }
        entry.strings_status
    }

    fn list_free(&self, list: DeviceList) {
        let mut state = self.record("ftdi_list_free");
        if list.owner() != self.id || !state.lists.remove(&list.head()) {
            warn!("Rejecting release of unknown device list {:#x}", list.head());
            state.rejected_handles += 1;
        }
    }

    fn library_version(&self) -> LibraryVersion {
        self.state().version.clone()
    }

    fn libusb_version(&self) -> CrateResult<LibusbVersion> {
        self.state()
            .libusb_version
            .clone()
            .ok_or_else(|| Error::LibraryMissing("libusb library not found".to_string()))
    }

    fn set_auto_detach(&self, _ctx: &ContextHandle, enable: bool) -> i32 {
        self.state().auto_detach_requests.push(enable);
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loopback_returns_written_bytes() {
        let lib = MockLibrary::loopback();
        let ctx = lib.init().unwrap();
        assert_eq!(lib.write_data(&ctx, b"abc"), 3);
        let mut buf = [0u8; 8];
        assert_eq!(lib.read_data(&ctx, &mut buf), 3);
        assert_eq!(&buf[..3], b"abc");
        lib.deinit(ctx);
        assert_eq!(
            lib.take_calls(),
            vec!["ftdi_init", "ftdi_write_data", "ftdi_read_data", "ftdi_deinit"]
        );
        assert_eq!(lib.live_contexts(), 0);
    }

    #[test]
    fn write_capacity_runs_dry() {
        let lib = MockLibrary::new();
        lib.set_write_capacity(Some(4));
        let ctx = lib.init().unwrap();
        assert_eq!(lib.write_data(&ctx, b"abc"), 3);
        assert_eq!(lib.write_data(&ctx, b"def"), 1);
        assert_eq!(lib.write_data(&ctx, b"ghi"), 0);
        assert_eq!(lib.written(), b"abcd");
        lib.deinit(ctx);
    }

    #[test]
    fn serial_failure_keeps_earlier_strings() {
        let lib = MockLibrary::new();
        lib.add_device_with(
            consts::FTDI_VID,
            consts::FT232R_PID,
            "FTDI",
            "UM232R",
            "FTE4FFVQ",
            consts::ERR_STRING_SERIAL,
        );
        let ctx = lib.init().unwrap();
        let list = lib.find_all(&ctx, consts::FTDI_VID, consts::FT232R_PID).unwrap();
        assert_eq!(list.nodes().len(), 1);
        let mut strings = DeviceStrings::default();
        assert_eq!(lib.get_strings(&ctx, &list.nodes()[0], &mut strings), -9);
        assert_eq!(strings.manufacturer, "FTDI");
        assert_eq!(strings.description, "UM232R");
        assert_eq!(strings.serial, "");
        lib.list_free(list);
        assert_eq!(lib.live_lists(), 0);
        lib.deinit(ctx);
    }

    #[test]
    fn release_of_foreign_handles_is_rejected() {
        let issuer = MockLibrary::new();
        let other = MockLibrary::new();
        let ctx = issuer.init().unwrap();
        let list = issuer.find_all(&ctx, consts::FTDI_VID, consts::FT232R_PID).unwrap();
        other.list_free(list);
        other.deinit(ctx);
        assert_eq!(other.rejected_handles(), 2);
        assert_eq!(other.live_contexts(), 0);
        // Still owned by the issuer, which never saw a release.
        assert_eq!(issuer.live_contexts(), 1);
        assert_eq!(issuer.live_lists(), 1);
        assert_eq!(issuer.rejected_handles(), 0);
    }

    #[test]
    fn default_libusb_version_is_reported() {
        let lib = MockLibrary::new();
        let version = lib.libusb_version().unwrap();
        assert_eq!(version.to_string(), "1.0.26.11724");
        lib.set_libusb_version(None);
        assert!(matches!(lib.libusb_version(), Err(Error::LibraryMissing(_))));
    }
}
