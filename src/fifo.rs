//! Unbounded, thread-safe FIFO of byte chunks.
//!
//! Producers append whole chunks; consumers take up to a requested number of
//! bytes from the front. A chunk that is only partly consumed keeps its tail
//! at the front of the queue, so bytes come out exactly once and in order.

use log::trace;
use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::Duration;

/// How long each wait of a blocking [`FifoBuffer::extract`] lasts by default.
pub const DEFAULT_WAIT: Duration = Duration::from_millis(100);

/// Thread-safe byte FIFO decoupling a producer thread from a consumer.
///
/// # Examples
///
/// ```
/// use ftdi_link::FifoBuffer;
///
/// let fifo = FifoBuffer::new();
/// fifo.insert(b"123".to_vec());
/// fifo.insert(b"456".to_vec());
/// assert_eq!(fifo.extract(4, false), b"1234");
/// assert_eq!(fifo.len(), 2);
/// ```
#[derive(Debug)]
pub struct FifoBuffer {
    chunks: Mutex<VecDeque<Vec<u8>>>,
    available: Condvar,
    wait: Duration,
}

impl Default for FifoBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl FifoBuffer {
    pub fn new() -> Self {
        Self::with_wait_timeout(DEFAULT_WAIT)
    }

    /// A buffer whose blocking extracts wake up every `wait` to recheck
    /// their stop condition.
    pub fn with_wait_timeout(wait: Duration) -> Self {
        FifoBuffer {
            chunks: Mutex::new(VecDeque::new()),
            available: Condvar::new(),
            wait,
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Vec<u8>>> {
        // A panicking producer cannot leave the queue half-updated: every
        // mutation is a single push or pop.
        self.chunks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Appends a chunk and wakes a waiting consumer. Empty chunks are dropped.
    pub fn insert(&self, chunk: impl Into<Vec<u8>>) {
        let chunk = chunk.into();
        if chunk.is_empty() {
            return;
        }
        trace!("fifo insert {} bytes", chunk.len());
        self.lock().push_back(chunk);
        self.available.notify_one();
    }

    /// Takes up to `len` bytes from the front.
    ///
    /// With `block` set, waits until at least one byte is there; the result
    /// is only empty for `len == 0`. Without it, returns whatever is buffered.
    pub fn extract(&self, len: usize, block: bool) -> Vec<u8> {
        if block {
            self.extract_while(len, || true)
        } else {
            Self::take(&mut self.lock(), len)
        }
    }

    /// Blocking extract that gives up once `keep_waiting` returns false.
    /// The condition is checked after every wait interval, so the call
    /// returns within one interval of it turning false.
    pub fn extract_while(&self, len: usize, keep_waiting: impl Fn() -> bool) -> Vec<u8> {
        let mut chunks = self.lock();
        while chunks.is_empty() && len > 0 && keep_waiting() {
            chunks = match self.available.wait_timeout(chunks, self.wait) {
                Ok((guard, _)) => guard,
                Err(e) => e.into_inner().0,
            };
        }
        Self::take(&mut chunks, len)
    }

    /// Waits once, at most `wait`, for data. The result may be empty.
    pub fn extract_timeout(&self, len: usize, wait: Duration) -> Vec<u8> {
        let mut chunks = self.lock();
        if chunks.is_empty() && len > 0 {
            chunks = match self.available.wait_timeout(chunks, wait) {
                Ok((guard, _)) => guard,
                Err(e) => e.into_inner().0,
            };
        }
        Self::take(&mut chunks, len)
    }

    fn take(chunks: &mut VecDeque<Vec<u8>>, len: usize) -> Vec<u8> {
        let mut out = Vec::with_capacity(len.min(4096));
        while out.len() < len {
            let Some(mut chunk) = chunks.pop_front() else {
                break;
            };
            let wanted = len - out.len();
            if chunk.len() > wanted {
                let excess = chunk.split_off(wanted);
                chunks.push_front(excess);
            }
            out.extend_from_slice(&chunk);
        }
        out
    }

    /// Total number of buffered bytes.
    pub fn len(&self) -> usize {
        self.lock().iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Discards everything buffered.
    pub fn clear(&self) {
        self.lock().clear();
    }
}
