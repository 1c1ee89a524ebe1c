//! Stream I/O on an open session: chunked transfers, text mode, line
//! reading, buffer purges and the `std::io` adapters.

use crate::device::Device;
use crate::error::{self, Error, Result};
use crate::library::{ContextHandle, DeviceLibrary};
use log::{trace, warn};
use std::io;

/// Which device FIFO(s) [`Device::flush`] purges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Flush {
    #[default]
    Both,
    /// The receive buffer only.
    Input,
    /// The transmit buffer only.
    Output,
}

fn read_once(lib: &dyn DeviceLibrary, ctx: &ContextHandle, len: usize) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; len];
    let n = lib.read_data(ctx, &mut buf);
    if n < 0 {
        return Err(error::native(n, lib.error_string(ctx)));
    }
    buf.truncate(n as usize);
    trace!("read {} of {} bytes: {:02X?}", buf.len(), len, buf);
    Ok(buf)
}

fn write_once(lib: &dyn DeviceLibrary, ctx: &ContextHandle, data: &[u8]) -> Result<usize> {
    let n = lib.write_data(ctx, data);
    if n < 0 {
        return Err(error::native(n, lib.error_string(ctx)));
    }
    trace!("wrote {} of {} bytes", n, data.len());
    Ok(n as usize)
}

impl Device {
    // --- Raw bytes ---

    /// Reads up to `len` bytes.
    ///
    /// With a chunk size set, the read is split into native transfers of at
    /// most that size, stopping at the first short or empty transfer.
    pub fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>> {
        let ctx = self.context("read")?;
        let lib = self.driver.library();
        let chunk_size = self.options.chunk_size;
        if chunk_size == 0 {
            return read_once(lib, ctx, len);
        }
        let mut data = Vec::with_capacity(len);
        while data.len() < len {
            let want = chunk_size.min(len - data.len());
            let chunk = read_once(lib, ctx, want)?;
            let short = chunk.len() < want;
            data.extend_from_slice(&chunk);
            if short {
                break;
            }
        }
        Ok(data)
    }

    /// Writes `data`, returning how many bytes the device accepted.
    ///
    /// With a chunk size set, the data goes out in chunks; a chunk that
    /// transfers nothing ends the write early so a stalled link cannot spin.
    pub fn write_bytes(&mut self, data: &[u8]) -> Result<usize> {
        let ctx = self.context("write")?;
        let lib = self.driver.library();
        let chunk_size = self.options.chunk_size;
        if chunk_size == 0 {
            return write_once(lib, ctx, data);
        }
        let mut written = 0;
        while written < data.len() {
            let end = data.len().min(written + chunk_size);
            let n = write_once(lib, ctx, &data[written..end])?;
            if n == 0 {
                warn!("Write stalled after {} of {} bytes", written, data.len());
                break;
            }
            written += n;
        }
        Ok(written)
    }

    // --- Text ---

    fn require_text(&self, operation: &'static str) -> Result<crate::text::Encoding> {
        match self.options.mode {
            crate::text::Mode::Text(encoding) => Ok(encoding),
            crate::text::Mode::Binary => Err(Error::TextModeRequired(operation)),
        }
    }

    /// Reads up to `len` bytes and decodes them. Bytes of a character split
    /// across reads are kept until the rest arrives.
    pub fn read_text(&mut self, len: usize) -> Result<String> {
        self.require_text("read_text")?;
        let raw = self.read_bytes(len)?;
        Ok(self.decoder.decode(&raw))
    }

    /// Encodes and writes `text`, returning the number of bytes written.
    pub fn write_text(&mut self, text: &str) -> Result<usize> {
        let encoding = self.require_text("write_text")?;
        let data = encoding.encode(text)?;
        self.write_bytes(&data)
    }

    /// Reads one line, including its `\n`. Stops early when no more data
    /// is available, or after `size` characters if `size` is non-zero.
    /// Returns an empty string when nothing could be read.
    pub fn readline(&mut self, size: usize) -> Result<String> {
        self.require_text("readline")?;
        let mut line = String::new();
        let mut chars = 0;
        loop {
            if size > 0 && chars >= size {
                break;
            }
            let raw = self.read_bytes(1)?;
            if raw.is_empty() {
                break;
            }
            let decoded = self.decoder.decode(&raw);
            chars += decoded.chars().count();
            line.push_str(&decoded);
            if line.ends_with('\n') {
                break;
            }
        }
        Ok(line)
    }

    /// Reads lines until no more data is available.
    ///
    /// With a `sizehint`, that many bytes are read up front and split into
    /// lines before line-by-line reading continues.
    pub fn readlines(&mut self, sizehint: Option<usize>) -> Result<Vec<String>> {
        self.require_text("readlines")?;
        let mut lines = Vec::new();
        if let Some(hint) = sizehint {
            let blob = self.read_text(hint)?;
            lines.extend(blob.split_inclusive('\n').map(str::to_string));
        }
        loop {
            let line = self.readline(0)?;
            if line.is_empty() {
                break;
            }
            lines.push(line);
        }
        Ok(lines)
    }

    /// Iterator over lines; ends when a read returns nothing.
    pub fn lines(&mut self) -> Lines<'_> {
        Lines { device: self }
    }

    /// Writes each string in turn.
    pub fn writelines<I, S>(&mut self, lines: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.require_text("writelines")?;
        for line in lines {
            self.write_text(line.as_ref())?;
        }
        Ok(())
    }

    // --- Buffers ---

    /// Purges the device's receive and/or transmit FIFO.
    pub fn flush(&mut self, which: Flush) -> Result<()> {
        let ctx = self.context("flush")?;
        let lib = self.driver.library();
        let res = match which {
            Flush::Both => lib.purge_both(ctx),
            Flush::Input => lib.purge_rx(ctx),
            Flush::Output => lib.purge_tx(ctx),
        };
        trace!("flush {:?} -> {}", which, res);
        self.check(ctx, res)
    }

    pub fn flush_input(&mut self) -> Result<()> {
        self.flush(Flush::Input)
    }

    pub fn flush_output(&mut self) -> Result<()> {
        self.flush(Flush::Output)
    }
}

/// Lines read from a text-mode session. See [`Device::lines`].
#[derive(Debug)]
pub struct Lines<'a> {
    device: &'a mut Device,
}

impl Iterator for Lines<'_> {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.device.readline(0) {
            Ok(line) if line.is_empty() => None,
            other => Some(other),
        }
    }
}

impl From<Error> for io::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Io(e) => e,
            Error::NotOpen { .. } | Error::UseAfterClose { .. } => {
                io::Error::new(io::ErrorKind::NotConnected, err)
            }
            Error::ArgumentOutOfRange(_) => io::Error::new(io::ErrorKind::InvalidInput, err),
            Error::Timeout => io::Error::new(io::ErrorKind::TimedOut, err),
            other => io::Error::other(other),
        }
    }
}

/// Raw bytes regardless of mode.
impl io::Read for Device {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let data = self.read_bytes(buf.len())?;
        buf[..data.len()].copy_from_slice(&data);
        Ok(data.len())
    }
}

/// Raw bytes regardless of mode. `flush` is a no-op: writes are handed to
/// the driver immediately, and purging would discard data.
impl io::Write for Device {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(self.write_bytes(buf)?)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
