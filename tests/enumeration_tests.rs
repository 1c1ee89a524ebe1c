//! Device enumeration and candidate IDs against the in-memory library.

use ftdi_link::mock::MockLibrary;
use ftdi_link::{Driver, Error, DEFAULT_PIDS, FTDI_VID};
use std::sync::Arc;

fn setup() -> (Arc<MockLibrary>, Driver) {
    let _ = env_logger::builder().is_test(true).try_init();
    let lib = Arc::new(MockLibrary::new());
    let driver = Driver::new(lib.clone());
    (lib, driver)
}

#[test]
fn test_no_devices() {
    let (lib, driver) = setup();
    assert!(driver.list_devices().unwrap().is_empty());
    let calls = lib.calls();
    assert_eq!(calls.first(), Some(&"ftdi_init"));
    assert_eq!(calls.last(), Some(&"ftdi_deinit"));
    assert_eq!(
        calls.iter().filter(|&&c| c == "ftdi_usb_find_all").count(),
        DEFAULT_PIDS.len()
    );
    assert_eq!(lib.live_lists(), 0);
    assert_eq!(lib.live_contexts(), 0);
}

#[test]
fn test_lists_devices_in_order() {
    let (lib, driver) = setup();
    lib.add_device("FTDI", "UM232R USB <-> Serial", "FTE4FFVQ");
    lib.add_device_with(FTDI_VID, 0x6014, "FTDI", "C232HM-DDHSL-0", "FTVQX1AB", 0);
    lib.add_device("FTDI", "UM245R", "FTE00P4L");

    let devices = driver.list_devices().unwrap();
    let serials: Vec<&str> = devices.iter().map(|d| d.serial.as_str()).collect();
    assert_eq!(serials, vec!["FTE4FFVQ", "FTE00P4L", "FTVQX1AB"]);
    assert_eq!(devices[2].pid, 0x6014);
    assert_eq!(devices[0].to_string(), "FTDI:UM232R USB <-> Serial:FTE4FFVQ");
    assert_eq!(lib.live_lists(), 0);
}

#[test]
fn test_unreadable_serial_is_empty() {
    let (lib, driver) = setup();
    lib.add_device_with(FTDI_VID, 0x6001, "FTDI", "FT232R", "HIDDEN", -9);
    let devices = driver.list_devices().unwrap();
    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0].manufacturer, "FTDI");
    assert_eq!(devices[0].description, "FT232R");
    assert_eq!(devices[0].serial, "");
}

#[test]
fn test_unreadable_manufacturer_keeps_scanning() {
    let (lib, driver) = setup();
    lib.add_device_with(FTDI_VID, 0x6001, "FTDI", "FT232R", "A", -7);
    lib.add_device("FTDI", "FT232R", "B");
    let devices = driver.list_devices().unwrap();
    assert_eq!(devices.len(), 2);
    assert_eq!(devices[0].manufacturer, "");
    assert_eq!(devices[0].serial, "");
    assert_eq!(devices[1].serial, "B");
}

#[test]
fn test_other_string_failure_is_an_error() {
    let (lib, driver) = setup();
    lib.add_device_with(FTDI_VID, 0x6001, "FTDI", "FT232R", "A", -1);
    lib.set_error_message("libusb_open() failed");
    let err = driver.list_devices().unwrap_err();
    assert_eq!(err.native_code(), Some(-1));
    assert!(err.to_string().contains("libusb_open() failed"));
    assert_eq!(lib.live_lists(), 0, "List freed on the error path");
    assert_eq!(lib.live_contexts(), 0);
}

#[test]
fn test_find_all_failure() {
    let (lib, driver) = setup();
    lib.set_find_all_result(-3);
    let err = driver.list_devices().unwrap_err();
    assert_eq!(err.native_code(), Some(-3));
    assert_eq!(lib.live_contexts(), 0);
}

#[test]
fn test_init_failure() {
    let (lib, driver) = setup();
    lib.set_init_result(-1);
    assert!(driver.list_devices().is_err());
    assert_eq!(lib.calls(), vec!["ftdi_init"]);
}

#[test]
fn test_custom_vid_pid() {
    let (lib, driver) = setup();
    lib.add_device_with(0x1234, 0xABCD, "Acme", "Widget", "W1", 0);
    assert!(driver.list_devices().unwrap().is_empty());

    driver.add_custom_vid_pid(&[0x1234], &[0xABCD]);
    driver.add_custom_vid_pid(&[0x1234], &[]);
    let (vids, pids) = driver.candidate_ids();
    assert_eq!(vids, vec![FTDI_VID, 0x1234]);
    assert_eq!(pids.len(), DEFAULT_PIDS.len() + 1);

    let devices = driver.list_devices().unwrap();
    assert_eq!(devices.len(), 1);
    assert_eq!((devices[0].vid, devices[0].pid), (0x1234, 0xABCD));

    // Clones share the ID table.
    let clone = driver.clone();
    assert_eq!(clone.candidate_ids().0.len(), 2);
}

#[test]
fn test_library_version() {
    let (_lib, driver) = setup();
    let version = driver.library_version();
    assert_eq!((version.major, version.minor, version.micro), (1, 2, 3));
    assert_eq!(version.version_str, "1.2.3");
}

#[test]
fn test_libusb_version() {
    let (lib, driver) = setup();
    let version = driver.libusb_version().unwrap();
    assert_eq!((version.major, version.minor, version.micro, version.nano), (1, 0, 26, 11724));
    assert_eq!(version.rc, "");
    assert_eq!(version.describe, "https://libusb.info");
    assert!(lib.calls().is_empty(), "Version queries make no libftdi calls");

    lib.set_libusb_version(None);
    assert!(matches!(driver.libusb_version(), Err(Error::LibraryMissing(_))));
}
