//! Background reading into a [`FifoBuffer`].
//!
//! A [`ReadPump`] moves an open session onto a reader thread that keeps
//! draining the device into a shared FIFO, so a slow consumer does not
//! leave data sitting in the chip's small receive buffer.

use crate::device::Device;
use crate::error::{Error, Result};
use crate::fifo::FifoBuffer;
use log::{debug, warn};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Bytes requested per read on the reader thread.
pub const DEFAULT_BLOCK_SIZE: usize = 512;
/// Pause after a read that returned nothing.
pub const DEFAULT_IDLE: Duration = Duration::from_millis(1);

/// A session being read on a background thread.
#[derive(Debug)]
pub struct ReadPump {
    fifo: Arc<FifoBuffer>,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<Result<Device>>>,
}

impl ReadPump {
    /// Starts reading `device` in blocks of [`DEFAULT_BLOCK_SIZE`].
    pub fn start(device: Device) -> Result<Self> {
        Self::start_with(device, DEFAULT_BLOCK_SIZE, DEFAULT_IDLE, Arc::new(FifoBuffer::new()))
    }

    /// Starts reading `device` into `fifo`, `block_size` bytes at a time,
    /// sleeping `idle` whenever the device has nothing to give.
    pub fn start_with(
        mut device: Device,
        block_size: usize,
        idle: Duration,
        fifo: Arc<FifoBuffer>,
    ) -> Result<Self> {
        device.context("ReadPump::start")?;
        if block_size == 0 {
            return Err(Error::ArgumentOutOfRange("read pump block size must be non-zero".to_string()));
        }
        let running = Arc::new(AtomicBool::new(true));
        let running_flag = running.clone();
        let sink = fifo.clone();
        let handle = thread::Builder::new()
            .name("ftdi-read-pump".to_string())
            .spawn(move || {
                debug!("Read pump started ({} byte blocks)", block_size);
                while running_flag.load(Ordering::SeqCst) {
                    match device.read_bytes(block_size) {
                        Ok(data) if data.is_empty() => thread::sleep(idle),
                        Ok(data) => sink.insert(data),
                        Err(e) => {
                            warn!("Read pump stopped by error: {}", e);
                            running_flag.store(false, Ordering::SeqCst);
                            return Err(e);
                        }
                    }
                }
                debug!("Read pump stopped");
                Ok(device)
            })?;
        Ok(ReadPump {
            fifo,
            running,
            handle: Some(handle),
        })
    }

    /// Takes up to `len` buffered bytes, waiting for data while the reader
    /// runs. Returns empty once the reader has stopped and the FIFO is
    /// drained.
    pub fn read(&self, len: usize) -> Vec<u8> {
        self.fifo.extract_while(len, || self.running.load(Ordering::SeqCst))
    }

    /// Takes up to `len` buffered bytes without waiting.
    pub fn try_read(&self, len: usize) -> Vec<u8> {
        self.fifo.extract(len, false)
    }

    /// Bytes currently buffered.
    pub fn available(&self) -> usize {
        self.fifo.len()
    }

    /// The shared FIFO the reader fills.
    pub fn fifo(&self) -> &Arc<FifoBuffer> {
        &self.fifo
    }

    /// False once the reader has stopped, by request or by a read error.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Stops the reader and returns the session, or the read error that
    /// stopped it. Buffered data stays in the FIFO.
    pub fn stop(mut self) -> Result<Device> {
        self.running.store(false, Ordering::SeqCst);
        match self.handle.take() {
            Some(handle) => handle
                .join()
                .unwrap_or_else(|_| Err(Error::Io(io::Error::other("read pump thread panicked")))),
            None => Err(Error::Io(io::Error::other("read pump already stopped"))),
        }
    }
}

impl Drop for ReadPump {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            // The session is closed when the returned Device drops here.
            let _ = handle.join();
        }
    }
}
