//! Text mode, line reading and the background reader over a simulated
//! TX→RX loopback.

use ftdi_link::mock::MockLibrary;
use ftdi_link::{
    Device, DeviceIdentity, Driver, Encoding, Error, Mode, ReadPump, Result, SessionOptions,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn loopback(options: SessionOptions) -> Result<(Arc<MockLibrary>, Device)> {
    let _ = env_logger::builder().is_test(true).try_init();
    let lib = Arc::new(MockLibrary::loopback());
    let driver = Driver::new(lib.clone());
    let dev = Device::new(&driver, DeviceIdentity::any(), options)?;
    Ok((lib, dev))
}

fn text_session() -> Result<(Arc<MockLibrary>, Device)> {
    loopback(SessionOptions::default().with_text(Encoding::Latin1))
}

#[test]
fn test_readline_joins_writes() -> Result<()> {
    for chunk_size in [0, 3] {
        let options = SessionOptions::default()
            .with_text(Encoding::Latin1)
            .with_chunk_size(chunk_size);
        let (_lib, mut dev) = loopback(options)?;
        dev.write_text("Hello")?;
        dev.write_text(" World\n")?;
        dev.write_text("Bye")?;
        assert_eq!(dev.readline(0)?, "Hello World\n", "chunk size {}", chunk_size);
        assert_eq!(dev.readline(0)?, "Bye", "chunk size {}", chunk_size);
        assert_eq!(dev.readline(0)?, "");
    }
    Ok(())
}

#[test]
fn test_readline_size_limit() -> Result<()> {
    let (_lib, mut dev) = text_session()?;
    dev.write_text("abcdef\n")?;
    assert_eq!(dev.readline(4)?, "abcd");
    assert_eq!(dev.readline(0)?, "ef\n");
    Ok(())
}

#[test]
fn test_text_operations_need_text_mode() -> Result<()> {
    let (_lib, mut dev) = loopback(SessionOptions::default())?;
    assert!(matches!(dev.readline(0), Err(Error::TextModeRequired("readline"))));
    assert!(matches!(dev.readlines(None), Err(Error::TextModeRequired(_))));
    assert!(matches!(dev.write_text("x"), Err(Error::TextModeRequired(_))));
    assert!(matches!(dev.writelines(["x"]), Err(Error::TextModeRequired(_))));

    dev.set_mode(Mode::text());
    dev.write_text("ok\n")?;
    assert_eq!(dev.readline(0)?, "ok\n");
    Ok(())
}

#[test]
fn test_readlines_and_lines() -> Result<()> {
    let (_lib, mut dev) = text_session()?;
    dev.write_text("a\nb\nc")?;
    assert_eq!(dev.readlines(None)?, vec!["a\n", "b\n", "c"]);

    dev.write_text("one\ntwo\nthree\n")?;
    assert_eq!(dev.readlines(Some(8))?, vec!["one\n", "two\n", "three\n"]);

    dev.write_text("x\ny\n")?;
    let lines: Vec<String> = dev.lines().collect::<Result<_>>()?;
    assert_eq!(lines, vec!["x\n", "y\n"]);
    Ok(())
}

#[test]
fn test_writelines() -> Result<()> {
    let (lib, mut dev) = text_session()?;
    dev.writelines(["first\n", "second\n"])?;
    assert_eq!(lib.written(), b"first\nsecond\n");
    assert_eq!(dev.readlines(None)?, vec!["first\n", "second\n"]);
    Ok(())
}

#[test]
fn test_encodings() -> Result<()> {
    let (lib, mut dev) = text_session()?;
    dev.write_text("caf\u{e9}")?;
    assert_eq!(lib.written(), vec![b'c', b'a', b'f', 0xE9]);
    assert_eq!(dev.read_text(10)?, "caf\u{e9}");
    assert!(matches!(dev.write_text("\u{20ac}"), Err(Error::ArgumentOutOfRange(_))));

    dev.set_mode(Mode::Text(Encoding::Ascii));
    assert!(dev.write_text("\u{e9}").is_err());
    Ok(())
}

#[test]
fn test_utf8_character_split_across_reads() -> Result<()> {
    let (_lib, mut dev) = loopback(SessionOptions::default().with_text(Encoding::Utf8))?;
    dev.write_text("\u{e9}!")?;
    assert_eq!(dev.read_text(1)?, "");
    assert_eq!(dev.read_text(1)?, "\u{e9}");
    assert_eq!(dev.read_text(1)?, "!");
    Ok(())
}

#[test]
fn test_read_pump_drains_device() -> Result<()> {
    let (lib, mut dev) = loopback(SessionOptions::default())?;
    dev.write_bytes(b"pump data")?;

    let pump = ReadPump::start(dev)?;
    let deadline = Instant::now() + Duration::from_secs(5);
    let mut got = Vec::new();
    while got.len() < 9 && Instant::now() < deadline {
        got.extend(pump.read(9 - got.len()));
    }
    assert_eq!(got, b"pump data");
    assert!(pump.is_running());

    let dev = pump.stop()?;
    assert!(dev.is_open());
    drop(dev);
    assert_eq!(lib.live_contexts(), 0);
    Ok(())
}

#[test]
fn test_read_pump_stops_on_error() -> Result<()> {
    let (lib, dev) = loopback(SessionOptions::default())?;
    let pump = ReadPump::start(dev)?;
    lib.set_read_error(Some(-1));

    let deadline = Instant::now() + Duration::from_secs(5);
    while pump.is_running() && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(1));
    }
    assert!(!pump.is_running());
    // A stopped reader with nothing buffered does not block.
    assert!(pump.read(4).is_empty());
    let err = pump.stop().unwrap_err();
    assert_eq!(err.native_code(), Some(-1));
    assert_eq!(lib.live_contexts(), 0, "Session closed with the failed reader");
    Ok(())
}

#[test]
fn test_read_pump_needs_open_session() {
    let (_lib, dev) = loopback(SessionOptions::default().with_lazy_open(true)).unwrap();
    assert!(matches!(ReadPump::start(dev), Err(Error::NotOpen { .. })));
}
