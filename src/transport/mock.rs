//! Mock transport for testing without hardware.
//!
//! Simulates a serial device whose data arrives in timed bursts: bytes
//! enqueued with a delay only become readable once that much time has passed
//! since the mock was created, which lets tests exercise the timed receive
//! loop against realistic partial-arrival behavior. Also supports short-write
//! limits, injected I/O failures, and a simulated closed handle.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use super::{read_until_deadline, Transport};
use crate::error::{Error, Result};
use crate::params::PortConfig;

#[derive(Debug)]
struct MockState {
    /// Bursts of receivable data, each visible once `delay` has elapsed.
    bursts: VecDeque<(Duration, VecDeque<u8>)>,
    /// Every chunk of bytes the mock "accepted" from write calls.
    write_log: Vec<Vec<u8>>,
    /// Cap on how many bytes one write call accepts (simulates short writes).
    short_write_limit: Option<usize>,
    /// When set, the next read or write fails with an I/O error.
    fail_next_io: bool,
    /// Number of times the input buffer was flushed.
    flush_count: usize,
    /// Simulates a handle that has been closed out from under the caller.
    closed: bool,
    config: PortConfig,
    opened_at: Instant,
}

/// In-memory [`Transport`] implementation.
///
/// Cloning shares the underlying state, so a test can hand one clone to a
/// [`SerialPort`](crate::SerialPort) and keep the other to feed data in and
/// inspect what was written.
///
/// # Example
/// ```
/// use miniserial::transport::{MockTransport, Transport};
/// use std::time::Duration;
///
/// let mut mock = MockTransport::new("MOCK0");
/// mock.enqueue_read(b"hello");
///
/// let mut buffer = Vec::new();
/// mock.read_into(&mut buffer, Duration::ZERO).unwrap();
/// assert_eq!(buffer, b"hello");
///
/// mock.write(b"ack").unwrap();
/// assert_eq!(mock.write_log(), vec![b"ack".to_vec()]);
/// ```
#[derive(Clone)]
pub struct MockTransport {
    name: String,
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    /// Create a mock port with the given name and default configuration.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Arc::new(Mutex::new(MockState {
                bursts: VecDeque::new(),
                write_log: Vec::new(),
                short_write_limit: None,
                fail_next_io: false,
                flush_count: 0,
                closed: false,
                config: PortConfig::default(),
                opened_at: Instant::now(),
            })),
        }
    }

    /// Enqueue bytes that are immediately readable.
    pub fn enqueue_read(&mut self, data: &[u8]) {
        self.enqueue_read_after(Duration::ZERO, data);
    }

    /// Enqueue bytes that become readable once `delay` has elapsed since the
    /// mock was created.
    pub fn enqueue_read_after(&mut self, delay: Duration, data: &[u8]) {
        let mut state = self.state.lock().unwrap();
        state.bursts.push_back((delay, data.iter().copied().collect()));
    }

    /// Accept at most `limit` bytes per write call.
    pub fn set_short_write_limit(&mut self, limit: usize) {
        self.state.lock().unwrap().short_write_limit = Some(limit);
    }

    /// Make the next read or write fail with an I/O error.
    pub fn fail_next_io(&mut self) {
        self.state.lock().unwrap().fail_next_io = true;
    }

    /// Simulate the handle being closed; subsequent operations fail with
    /// [`Error::NotOpen`].
    pub fn set_closed(&mut self) {
        self.state.lock().unwrap().closed = true;
    }

    /// Every chunk of bytes accepted by write calls, in order.
    pub fn write_log(&self) -> Vec<Vec<u8>> {
        self.state.lock().unwrap().write_log.clone()
    }

    /// How many times `flush` was called.
    pub fn flush_count(&self) -> usize {
        self.state.lock().unwrap().flush_count
    }

    fn check_io(state: &mut MockState) -> Result<()> {
        if state.closed {
            return Err(Error::NotOpen);
        }
        if state.fail_next_io {
            state.fail_next_io = false;
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "injected failure",
            )));
        }
        Ok(())
    }

    /// Move bytes whose delay has elapsed into `scratch`, front first.
    fn take_ready(state: &mut MockState, scratch: &mut [u8]) -> usize {
        let elapsed = state.opened_at.elapsed();
        let mut taken = 0;
        while taken < scratch.len() {
            match state.bursts.front_mut() {
                Some((_, data)) if data.is_empty() => {
                    state.bursts.pop_front();
                }
                Some((delay, data)) if *delay <= elapsed => {
                    scratch[taken] = data.pop_front().unwrap();
                    taken += 1;
                }
                _ => break,
            }
        }
        taken
    }
}

impl Transport for MockTransport {
    fn name(&self) -> &str {
        &self.name
    }

    fn config(&self) -> PortConfig {
        self.state.lock().unwrap().config
    }

    fn reconfigure(&mut self, config: PortConfig) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.closed {
            return Err(Error::NotOpen);
        }
        state.config = config;
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        let mut state = self.state.lock().unwrap();
        Self::check_io(&mut state)?;
        let accepted = state.short_write_limit.unwrap_or(data.len()).min(data.len());
        state.write_log.push(data[..accepted].to_vec());
        Ok(accepted)
    }

    fn read_into(&mut self, buffer: &mut Vec<u8>, timeout: Duration) -> Result<()> {
        let shared = Arc::clone(&self.state);
        read_until_deadline(buffer, timeout, |scratch| {
            let mut state = shared.lock().unwrap();
            Self::check_io(&mut state)?;
            Ok(Self::take_ready(&mut state, scratch))
        })
    }

    fn flush(&mut self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.closed {
            return Err(Error::NotOpen);
        }
        // Only bytes already "in the driver buffer" are discarded; bursts
        // still in flight stay queued.
        let elapsed = state.opened_at.elapsed();
        state.bursts.retain(|(delay, _)| *delay > elapsed);
        state.flush_count += 1;
        Ok(())
    }

    fn available(&self) -> Result<usize> {
        let state = self.state.lock().unwrap();
        if state.closed {
            return Err(Error::NotOpen);
        }
        let elapsed = state.opened_at.elapsed();
        Ok(state
            .bursts
            .iter()
            .filter(|(delay, _)| *delay <= elapsed)
            .map(|(_, data)| data.len())
            .sum())
    }
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransport")
            .field("name", &self.name)
            .finish()
    }
}
