//! Platform transport layer.
//!
//! One implementation of [`Transport`] per host OS, selected at build time,
//! plus an in-memory [`mock::MockTransport`] for tests. Each transport owns
//! its device handle exclusively and translates [`PortConfig`] into the
//! native control-block format.

use std::time::{Duration, Instant};

use crate::error::Result;
use crate::params::PortConfig;

pub mod mock;

pub use mock::MockTransport;

#[cfg(unix)]
pub mod posix;

#[cfg(windows)]
pub mod windows;

/// The transport implementation for the compilation target.
#[cfg(unix)]
pub type NativeTransport = posix::PosixTransport;

/// The transport implementation for the compilation target.
#[cfg(windows)]
pub type NativeTransport = windows::WindowsTransport;

/// Per-platform serial transport.
///
/// The surface is identical across platforms; the internals diverge. All
/// methods operate on an exclusively owned device handle, and every
/// configuration commit leaves the OS control block fully consistent before
/// returning.
pub trait Transport: Send + std::fmt::Debug {
    /// The identifier this transport was opened with.
    fn name(&self) -> &str;

    /// The last configuration committed to the OS.
    fn config(&self) -> PortConfig;

    /// Apply all four line parameters and the timeout in one commit.
    fn reconfigure(&mut self, config: PortConfig) -> Result<()>;

    /// Write bytes with a single OS call, returning the OS's reported count.
    ///
    /// Short writes are surfaced to the caller, never retried internally.
    fn write(&mut self, data: &[u8]) -> Result<usize>;

    /// Append bytes arriving within `timeout` to `buffer`, in arrival order.
    ///
    /// Returns after at most `timeout` (a zero timeout returns immediately
    /// with whatever is already buffered). Receiving nothing before the
    /// deadline is the normal empty outcome, not an error.
    fn read_into(&mut self, buffer: &mut Vec<u8>, timeout: Duration) -> Result<()>;

    /// Discard unread input buffered by the OS driver. Never blocks.
    fn flush(&mut self) -> Result<()>;

    /// Number of bytes buffered by the OS, without consuming them.
    fn available(&self) -> Result<usize>;
}

/// Scratch-region size for one OS read attempt.
pub(crate) const READ_CHUNK: usize = 512;

/// Sleep granularity between empty read attempts in the polled receive loop.
const POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Timed receive loop over a non-blocking read primitive.
///
/// Issues at least one read attempt, appends whatever each attempt returns,
/// and keeps polling until `timeout` has elapsed. `read_chunk` must return
/// `Ok(0)` when no data is currently available rather than blocking or
/// erroring. Shared by the POSIX and mock transports; the Windows transport
/// uses the driver's native total-timeout read instead.
pub(crate) fn read_until_deadline<F>(
    buffer: &mut Vec<u8>,
    timeout: Duration,
    mut read_chunk: F,
) -> Result<()>
where
    F: FnMut(&mut [u8]) -> Result<usize>,
{
    let start = Instant::now();
    let mut scratch = [0u8; READ_CHUNK];

    loop {
        let n = read_chunk(&mut scratch)?;
        buffer.extend_from_slice(&scratch[..n]);

        let elapsed = start.elapsed();
        if elapsed >= timeout {
            return Ok(());
        }
        if n == 0 {
            // Nothing pending; yield the CPU but never oversleep the deadline.
            std::thread::sleep(POLL_INTERVAL.min(timeout - elapsed));
        }
    }
}
