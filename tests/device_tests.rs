//! Session lifecycle, acquisition and stream I/O against the in-memory
//! library. No hardware required.

use ftdi_link::mock::MockLibrary;
use ftdi_link::{
    Device, DeviceIdentity, DeviceLibrary, Driver, Error, Flush, LibraryVersion, SessionOptions,
};
use std::io::{Read, Write};
use std::sync::Arc;

fn setup() -> (Arc<MockLibrary>, Driver) {
    let _ = env_logger::builder().is_test(true).try_init();
    let lib = Arc::new(MockLibrary::new());
    let driver = Driver::new(lib.clone());
    (lib, driver)
}

fn lazy() -> SessionOptions {
    SessionOptions::default().with_lazy_open(true)
}

#[test]
fn test_open_close_call_sequence() {
    let (lib, driver) = setup();
    {
        let _dev = Device::open_first(&driver).unwrap();
    }
    assert_eq!(
        lib.take_calls(),
        vec![
            "ftdi_init",
            "ftdi_usb_open_desc_index",
            "ftdi_set_bitmode",
            "ftdi_setflowctrl",
            "ftdi_set_baudrate",
            "ftdi_set_latency_timer",
            "ftdi_usb_close",
            "ftdi_deinit",
        ]
    );
    assert_eq!(lib.live_contexts(), 0);
}

#[test]
fn test_open_resets_serial_baseline() {
    let (lib, driver) = setup();
    let dev = Device::open_first(&driver).unwrap();
    assert_eq!(lib.bitmodes(), vec![(0x00, 0x00)]);
    assert_eq!(lib.flow_control(), Some(0));
    assert_eq!(lib.baudrates(), vec![9600]);
    assert_eq!(lib.latency_ms(), Some(16));
    assert_eq!(dev.baudrate(), 9600);
}

#[test]
fn test_lazy_open_makes_no_calls_until_opened() {
    let (lib, driver) = setup();
    let mut dev = Device::new(&driver, DeviceIdentity::any(), lazy()).unwrap();
    assert!(lib.calls().is_empty());
    assert!(matches!(dev.read_bytes(1), Err(Error::NotOpen { .. })));
    dev.open().unwrap();
    assert!(dev.is_open());
    assert!(lib.calls().contains(&"ftdi_usb_open_desc_index"));
}

#[test]
fn test_close_twice_is_noop() {
    let (lib, driver) = setup();
    let mut dev = Device::open_first(&driver).unwrap();
    lib.reset_calls();
    dev.close();
    assert_eq!(lib.take_calls(), vec!["ftdi_usb_close", "ftdi_deinit"]);
    dev.close();
    assert!(lib.take_calls().is_empty());
    drop(dev);
    assert!(lib.take_calls().is_empty());
}

#[test]
fn test_io_after_close_is_rejected() {
    let (lib, driver) = setup();
    let mut dev = Device::open_first(&driver).unwrap();
    dev.close();
    lib.reset_calls();

    match dev.read_bytes(10) {
        Err(Error::UseAfterClose { operation }) => assert_eq!(operation, "read"),
        other => panic!("Expected UseAfterClose, got: {:?}", other),
    }
    assert!(matches!(dev.write_bytes(b"x"), Err(Error::UseAfterClose { .. })));
    assert!(matches!(dev.flush(Flush::Both), Err(Error::UseAfterClose { .. })));
    assert!(matches!(dev.set_baudrate(19200), Err(Error::UseAfterClose { .. })));
    assert!(lib.calls().is_empty(), "No native calls after close");
}

#[test]
fn test_reopen_after_close() {
    let (lib, driver) = setup();
    let mut dev = Device::open_first(&driver).unwrap();
    dev.close();
    assert!(dev.is_closed());
    dev.open().unwrap();
    assert!(dev.is_open());
    assert_eq!(lib.live_contexts(), 1);
}

#[test]
fn test_serial_tried_then_swapped_to_description() {
    let (lib, driver) = setup();
    // First pair: serial misses, description misses. Second pair: serial hits.
    lib.push_open_results(&[-3, -3, 0]);
    let _dev = Device::open_by_serial(&driver, "FTE4FFVQ").unwrap();

    let requests = lib.open_requests();
    assert_eq!(requests.len(), 3);
    assert_eq!(requests[0].serial.as_deref(), Some("FTE4FFVQ"));
    assert_eq!(requests[0].description, None);
    assert_eq!(requests[1].serial, None);
    assert_eq!(requests[1].description.as_deref(), Some("FTE4FFVQ"));
    assert_eq!((requests[0].vid, requests[0].pid), (0x0403, 0x6001));
    assert_eq!((requests[2].vid, requests[2].pid), (0x0403, 0x6010));
}

#[test]
fn test_specific_error_stops_probing() {
    let (lib, driver) = setup();
    lib.push_open_results(&[-5]);
    lib.set_error_message("unable to claim usb device");

    let err = Device::open_first(&driver).unwrap_err();
    assert_eq!(err.native_code(), Some(-5));
    let text = err.to_string();
    assert!(text.starts_with("unable to claim usb device (-5)\n"));
    assert!(text.contains("Could not claim the FTDI USB device"));

    assert_eq!(lib.open_requests().len(), 1, "No further pairs after -5");
    assert_eq!(lib.live_contexts(), 0, "Context released on failure");
    assert_eq!(
        lib.calls(),
        vec![
            "ftdi_init",
            "ftdi_usb_open_desc_index",
            "ftdi_get_error_string",
            "ftdi_deinit",
        ]
    );
}

#[test]
fn test_not_found_everywhere() {
    let (lib, driver) = setup();
    lib.push_open_results(&[-3; 5]);
    let mut dev = Device::new(&driver, DeviceIdentity::any(), lazy()).unwrap();

    let err = dev.open().unwrap_err();
    assert!(err.is_device_not_found());
    assert!(err.to_string().contains("Is the device connected?"));
    assert_eq!(lib.open_requests().len(), 5);
    assert!(!dev.is_open());
    assert!(!dev.is_closed());
    assert_eq!(lib.live_contexts(), 0);
}

#[test]
fn test_identity_ids_are_tried_last() {
    let (lib, driver) = setup();
    lib.push_open_results(&[-3; 11]);
    let identity = DeviceIdentity::any().with_vid_pid(&[0x1234], &[0x5678]);
    let _dev = Device::new(&driver, identity, SessionOptions::default()).unwrap();

    let requests = lib.open_requests();
    assert_eq!(requests.len(), 12);
    let last = requests.last().unwrap();
    assert_eq!((last.vid, last.pid), (0x1234, 0x5678));
}

#[test]
fn test_device_index_is_passed_through() {
    let (lib, driver) = setup();
    let identity = DeviceIdentity::any().with_device_index(2);
    let _dev = Device::new(&driver, identity, SessionOptions::default()).unwrap();
    assert_eq!(lib.open_requests()[0].index, 2);
}

#[test]
fn test_list_index_resolves_serial() {
    let (lib, driver) = setup();
    lib.add_device("FTDI", "UM232R USB <-> Serial", "FTE4FFVQ");
    lib.add_device("FTDI", "UM245R", "FTE00P4L");

    let identity = DeviceIdentity::any().with_list_index(1);
    let _dev = Device::new(&driver, identity, SessionOptions::default()).unwrap();
    assert_eq!(lib.open_requests()[0].serial.as_deref(), Some("FTE00P4L"));

    let identity = DeviceIdentity::any().with_list_index(5);
    match Device::new(&driver, identity, SessionOptions::default()) {
        Err(Error::DeviceNotFoundByIndex { index, .. }) => assert_eq!(index, 5),
        other => panic!("Expected DeviceNotFoundByIndex, got: {:?}", other),
    }
}

#[test]
fn test_auto_detach_depends_on_library_version() {
    let (lib, driver) = setup();
    let _dev = Device::open_first(&driver).unwrap();
    assert_eq!(lib.auto_detach_requests(), vec![true]);

    let (lib, driver) = setup();
    lib.set_version(LibraryVersion::pre_1_0());
    let _dev = Device::open_first(&driver).unwrap();
    assert!(lib.auto_detach_requests().is_empty());

    let (lib, driver) = setup();
    let options = SessionOptions::default().with_auto_detach(false);
    let _dev = Device::new(&driver, DeviceIdentity::any(), options).unwrap();
    assert!(lib.auto_detach_requests().is_empty());
}

#[test]
fn test_baudrate_kept_only_when_accepted() {
    let (lib, driver) = setup();
    let mut dev = Device::open_first(&driver).unwrap();

    dev.set_baudrate(115_200).unwrap();
    assert_eq!(dev.baudrate(), 115_200);

    lib.set_baudrate_result(-1);
    let err = dev.set_baudrate(3_000_001).unwrap_err();
    assert_eq!(err.native_code(), Some(-1));
    assert_eq!(dev.baudrate(), 115_200);
}

#[test]
fn test_flush_selects_purge_call() {
    let (lib, driver) = setup();
    let mut dev = Device::open_first(&driver).unwrap();
    lib.reset_calls();
    dev.flush(Flush::Both).unwrap();
    dev.flush_input().unwrap();
    dev.flush_output().unwrap();
    assert_eq!(
        lib.take_calls(),
        vec![
            "ftdi_usb_purge_buffers",
            "ftdi_usb_purge_rx_buffer",
            "ftdi_usb_purge_tx_buffer",
        ]
    );

    lib.set_purge_result(-1);
    assert_eq!(dev.flush(Flush::Output).unwrap_err().native_code(), Some(-1));
}

#[test]
fn test_chunked_read_matches_single_read() {
    let (lib, driver) = setup();
    let data: Vec<u8> = (0u8..10).collect();
    let mut dev = Device::open_first(&driver).unwrap();

    lib.push_rx(&data);
    let unchunked = dev.read_bytes(data.len()).unwrap();
    assert_eq!(unchunked, data);

    for chunk_size in 1..=data.len() + 1 {
        dev.set_chunk_size(chunk_size);
        lib.push_rx(&data);
        lib.reset_calls();
        assert_eq!(dev.read_bytes(data.len()).unwrap(), unchunked, "chunk size {}", chunk_size);
        assert_eq!(lib.calls().len(), data.len().div_ceil(chunk_size), "chunk size {}", chunk_size);
    }
}

#[test]
fn test_chunked_write_matches_single_write() {
    let (lib, driver) = setup();
    let data: Vec<u8> = (0u8..10).collect();
    let mut dev = Device::open_first(&driver).unwrap();

    for chunk_size in 1..=data.len() + 1 {
        dev.set_chunk_size(chunk_size);
        let before = lib.written().len();
        assert_eq!(dev.write_bytes(&data).unwrap(), data.len(), "chunk size {}", chunk_size);
        assert_eq!(&lib.written()[before..], &data[..], "chunk size {}", chunk_size);
    }
}

#[test]
fn test_chunked_read_stops_when_data_runs_out() {
    let (lib, driver) = setup();
    let options = SessionOptions::default().with_chunk_size(4);
    let mut dev = Device::new(&driver, DeviceIdentity::any(), options).unwrap();
    lib.push_rx(b"abcdef");
    lib.reset_calls();
    assert_eq!(dev.read_bytes(100).unwrap(), b"abcdef");
    assert_eq!(lib.calls().len(), 2);
}

#[test]
fn test_chunked_write_stops_on_stall() {
    let (lib, driver) = setup();
    let options = SessionOptions::default().with_chunk_size(3);
    let mut dev = Device::new(&driver, DeviceIdentity::any(), options).unwrap();
    lib.set_write_capacity(Some(4));
    lib.reset_calls();
    assert_eq!(dev.write_bytes(b"0123456789").unwrap(), 4);
    assert_eq!(lib.written(), b"0123");
    // 3 bytes, then 1 of 3, then 0: stop.
    assert_eq!(lib.calls().len(), 3);
}

#[test]
fn test_negative_transfer_is_device_error() {
    let (lib, driver) = setup();
    let mut dev = Device::open_first(&driver).unwrap();
    lib.set_error_message("usb bulk read failed");
    lib.set_read_error(Some(-1));
    let err = dev.read_bytes(4).unwrap_err();
    assert_eq!(err.to_string(), "usb bulk read failed (-1)");

    lib.set_write_error(Some(-1));
    assert!(matches!(dev.write_bytes(b"x"), Err(Error::Device { code: -1, .. })));
}

#[test]
fn test_modem_lines() {
    let (lib, driver) = setup();
    let mut dev = Device::open_first(&driver).unwrap();
    assert_eq!(dev.dtr(), None);
    lib.reset_calls();

    dev.set_dtr(true).unwrap();
    dev.set_dtr(true).unwrap();
    dev.set_rts(false).unwrap();
    assert_eq!(lib.take_calls(), vec!["ftdi_setdtr", "ftdi_setrts"]);
    assert_eq!(dev.dtr(), Some(true));
    assert_eq!(lib.rts(), Some(false));

    lib.set_modem_status(1 << 5);
    assert!(!dev.cts().unwrap());
    assert!(dev.dsr().unwrap());
    assert!(!dev.ri().unwrap());
}

#[test]
fn test_with_context_reaches_native_calls() {
    let (lib, driver) = setup();
    let dev = Device::open_first(&driver).unwrap();
    let status = dev.with_context(|lib, ctx| lib.set_latency_timer(ctx, 2)).unwrap();
    assert_eq!(status, 0);
    assert_eq!(lib.latency_ms(), Some(2));

    let lazy_dev = Device::new(&driver, DeviceIdentity::any(), lazy()).unwrap();
    assert!(lazy_dev.with_context(|_, _| ()).is_err());
}

#[test]
fn test_session_context_is_released_exactly_once() {
    let (lib, driver) = setup();
    let mut dev = Device::open_first(&driver).unwrap();
    let message = dev.with_context(|lib, ctx| lib.error_string(ctx)).unwrap();
    assert_eq!(message, "mock error");
    dev.close();
    dev.close();
    drop(dev);

    let calls = lib.take_calls();
    assert_eq!(calls.iter().filter(|&&c| c == "ftdi_deinit").count(), 1);
    assert_eq!(calls.iter().filter(|&&c| c == "ftdi_usb_close").count(), 1);
    assert_eq!(lib.live_contexts(), 0);
    assert_eq!(lib.rejected_handles(), 0);
}

#[test]
fn test_context_from_another_library_is_not_released() {
    let (lib, driver) = setup();
    let other = MockLibrary::new();
    let dev = Device::open_first(&driver).unwrap();
    // Issued by another instance.
    let foreign = other.init().unwrap();
    lib.deinit(foreign);
    assert_eq!(lib.rejected_handles(), 1);
    assert_eq!(lib.live_contexts(), 1);
    assert_eq!(other.live_contexts(), 1);
    drop(dev);
    assert_eq!(lib.live_contexts(), 0);
}

#[test]
fn test_std_io_traits() {
    let _ = env_logger::builder().is_test(true).try_init();
    let lib = Arc::new(MockLibrary::loopback());
    let driver = Driver::new(lib.clone());
    let mut dev = Device::open_first(&driver).unwrap();

    dev.write_all(b"ping").unwrap();
    Write::flush(&mut dev).unwrap();
    let mut buf = [0u8; 8];
    let n = Read::read(&mut dev, &mut buf).unwrap();
    assert_eq!(&buf[..n], b"ping");

    dev.close();
    let err = Read::read(&mut dev, &mut buf).unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::NotConnected);
}
