//! Windows serial transport.
//!
//! Owns a COM-port `HANDLE` and translates [`PortConfig`] into a DCB plus
//! COMMTIMEOUTS. The driver's read call already blocks with a total timeout
//! and an inter-byte interval, so the timed receive collapses into a single
//! `ReadFile` with equivalent semantics instead of the polled loop the POSIX
//! transport uses.

use std::io;
use std::ptr;
use std::time::Duration;

use tracing::{debug, trace};
use winapi::shared::minwindef::{DWORD, MAXDWORD};
use winapi::um::commapi::{
    ClearCommError, GetCommState, GetCommTimeouts, PurgeComm, SetCommState, SetCommTimeouts,
};
use winapi::um::fileapi::{CreateFileW, ReadFile, WriteFile, OPEN_EXISTING};
use winapi::um::handleapi::{CloseHandle, INVALID_HANDLE_VALUE};
use winapi::um::winbase::{
    COMMTIMEOUTS, COMSTAT, DCB, EVENPARITY, MARKPARITY, NOPARITY, ODDPARITY, ONE5STOPBITS,
    ONESTOPBIT, PURGE_RXCLEAR, RTS_CONTROL_DISABLE, SPACEPARITY, TWOSTOPBITS,
};
use winapi::um::winnt::{FILE_ATTRIBUTE_NORMAL, GENERIC_READ, GENERIC_WRITE, HANDLE};

use super::{Transport, READ_CHUNK};
use crate::error::{Error, Result};
use crate::params::{DataBits, Parity, PortConfig, StopBits};

/// Owned COM-port handle; closed exactly once on drop.
struct ComHandle(HANDLE);

// The handle is used from at most one thread at a time (&mut receivers).
unsafe impl Send for ComHandle {}

impl Drop for ComHandle {
    fn drop(&mut self) {
        unsafe { CloseHandle(self.0) };
    }
}

/// Serial transport backed by a Windows COM-port handle.
pub struct WindowsTransport {
    handle: ComHandle,
    name: String,
    config: PortConfig,
    /// Inter-byte gap that ends a `ReadFile` early, derived from the baud
    /// rate (one character time, floored at 50 ms).
    inter_byte_timeout: Duration,
    /// Read timeout last committed via `SetCommTimeouts`.
    committed_read_timeout: Duration,
}

impl WindowsTransport {
    /// Open `name` (a port name such as `COM3`) and commit `config` to it.
    ///
    /// Names whose numeric suffix exceeds the short-name range (`COM10` and
    /// up) are rewritten to the `\\.\` extended form before `CreateFileW`.
    /// If configuration fails after the handle was acquired, the handle is
    /// closed before the error propagates.
    pub fn open(name: &str, config: PortConfig) -> Result<Self> {
        let device = extended_port_name(name);
        let wide: Vec<u16> = device.encode_utf16().chain(std::iter::once(0)).collect();

        let raw = unsafe {
            CreateFileW(
                wide.as_ptr(),
                GENERIC_READ | GENERIC_WRITE,
                0,
                ptr::null_mut(),
                OPEN_EXISTING,
                FILE_ATTRIBUTE_NORMAL,
                ptr::null_mut(),
            )
        };
        if raw == INVALID_HANDLE_VALUE {
            return Err(Error::open(name, io::Error::last_os_error()));
        }
        // From here on every exit path closes the handle.
        let handle = ComHandle(raw);

        let inter_byte_timeout = inter_byte_timeout(config.baud_rate.as_u32());
        apply_line_params(handle.0, &config)?;
        apply_timeouts(handle.0, config.timeout, inter_byte_timeout)?;
        discard_input(handle.0)?;

        debug!(port = name, ?config, "opened serial port");
        Ok(Self {
            handle,
            name: name.to_string(),
            committed_read_timeout: config.timeout,
            inter_byte_timeout,
            config,
        })
    }
}

impl Transport for WindowsTransport {
    fn name(&self) -> &str {
        &self.name
    }

    fn config(&self) -> PortConfig {
        self.config
    }

    fn reconfigure(&mut self, config: PortConfig) -> Result<()> {
        let inter_byte = inter_byte_timeout(config.baud_rate.as_u32());
        apply_line_params(self.handle.0, &config)?;
        apply_timeouts(self.handle.0, config.timeout, inter_byte)?;
        self.inter_byte_timeout = inter_byte;
        self.committed_read_timeout = config.timeout;
        self.config = config;
        debug!(port = %self.name, ?config, "reconfigured serial port");
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        let mut written: DWORD = 0;
        let ok = unsafe {
            WriteFile(
                self.handle.0,
                data.as_ptr().cast(),
                data.len() as DWORD,
                &mut written,
                ptr::null_mut(),
            )
        };
        if ok == 0 {
            return Err(Error::Io(io::Error::last_os_error()));
        }
        trace!(port = %self.name, requested = data.len(), written, "write");
        Ok(written as usize)
    }

    fn read_into(&mut self, buffer: &mut Vec<u8>, timeout: Duration) -> Result<()> {
        if timeout != self.committed_read_timeout {
            apply_timeouts(self.handle.0, timeout, self.inter_byte_timeout)?;
            self.committed_read_timeout = timeout;
        }

        // The driver enforces the total timeout and the inter-byte gap, so a
        // single call observes the same contract as the polled loop.
        let mut scratch = [0u8; READ_CHUNK];
        let mut received: DWORD = 0;
        let ok = unsafe {
            ReadFile(
                self.handle.0,
                scratch.as_mut_ptr().cast(),
                scratch.len() as DWORD,
                &mut received,
                ptr::null_mut(),
            )
        };
        if ok == 0 {
            return Err(Error::Io(io::Error::last_os_error()));
        }
        buffer.extend_from_slice(&scratch[..received as usize]);
        trace!(port = %self.name, received, "read");
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        discard_input(self.handle.0)
    }

    fn available(&self) -> Result<usize> {
        let mut comstat: COMSTAT = unsafe { std::mem::zeroed() };
        let ok = unsafe { ClearCommError(self.handle.0, ptr::null_mut(), &mut comstat) };
        if ok == 0 {
            return Err(Error::Io(io::Error::last_os_error()));
        }
        Ok(comstat.cbInQue as usize)
    }
}

impl std::fmt::Debug for WindowsTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WindowsTransport")
            .field("name", &self.name)
            .field("config", &self.config)
            .finish()
    }
}

/// Rewrite `COM10` and up to the `\\.\COMxx` extended form; `COM1`..`COM9`
/// and already-extended names pass through untouched.
fn extended_port_name(name: &str) -> String {
    if name.starts_with("COM") && name.len() > 4 {
        format!(r"\\.\{name}")
    } else {
        name.to_string()
    }
}

/// Inter-byte gap scaled from the byte rate, floored at 50 ms.
fn inter_byte_timeout(baud: u32) -> Duration {
    let bytes_per_sec = (baud / 8).max(1);
    let gap_ms = (1200 / bytes_per_sec).max(50);
    Duration::from_millis(u64::from(gap_ms))
}

/// Clamp to the widest representable COMMTIMEOUTS value. `MAXDWORD` itself
/// is the immediate-return sentinel and must never be produced by clamping.
fn millis_capped(duration: Duration) -> DWORD {
    duration.as_millis().min(u128::from(MAXDWORD - 1)) as DWORD
}

fn discard_input(handle: HANDLE) -> Result<()> {
    if unsafe { PurgeComm(handle, PURGE_RXCLEAR) } == 0 {
        return Err(Error::Io(io::Error::last_os_error()));
    }
    Ok(())
}

/// Read the current DCB, rewrite every line parameter, and commit it whole.
fn apply_line_params(handle: HANDLE, config: &PortConfig) -> Result<()> {
    let mut dcb: DCB = unsafe { std::mem::zeroed() };
    dcb.DCBlength = std::mem::size_of::<DCB>() as DWORD;
    if unsafe { GetCommState(handle, &mut dcb) } == 0 {
        return Err(Error::config(format!(
            "GetCommState failed: {}",
            io::Error::last_os_error()
        )));
    }

    // Fixed handshake policy: no CTS/RTS flow, no XON/XOFF.
    dcb.set_fOutxCtsFlow(0);
    dcb.set_fRtsControl(RTS_CONTROL_DISABLE);
    dcb.set_fOutX(0);
    dcb.set_fInX(0);

    dcb.BaudRate = config.baud_rate.as_u32() as DWORD;
    dcb.ByteSize = byte_size(config.data_bits);
    dcb.Parity = parity_constant(config.parity);
    dcb.StopBits = stop_bits_constant(config.stop_bits);

    if unsafe { SetCommState(handle, &mut dcb) } == 0 {
        return Err(Error::config(format!(
            "SetCommState failed: {}",
            io::Error::last_os_error()
        )));
    }
    Ok(())
}

/// Read the current COMMTIMEOUTS, rewrite the read-side fields, and commit.
///
/// A zero total timeout uses the documented immediate-return combination
/// (`ReadIntervalTimeout = MAXDWORD`, both totals zero).
fn apply_timeouts(handle: HANDLE, total: Duration, inter_byte: Duration) -> Result<()> {
    let mut timeouts: COMMTIMEOUTS = unsafe { std::mem::zeroed() };
    if unsafe { GetCommTimeouts(handle, &mut timeouts) } == 0 {
        return Err(Error::config(format!(
            "GetCommTimeouts failed: {}",
            io::Error::last_os_error()
        )));
    }

    if total.is_zero() {
        timeouts.ReadIntervalTimeout = MAXDWORD;
        timeouts.ReadTotalTimeoutConstant = 0;
        timeouts.ReadTotalTimeoutMultiplier = 0;
    } else {
        timeouts.ReadIntervalTimeout = millis_capped(inter_byte);
        timeouts.ReadTotalTimeoutConstant = millis_capped(total);
        timeouts.ReadTotalTimeoutMultiplier = 0;
    }

    if unsafe { SetCommTimeouts(handle, &mut timeouts) } == 0 {
        return Err(Error::config(format!(
            "SetCommTimeouts failed: {}",
            io::Error::last_os_error()
        )));
    }
    Ok(())
}

fn byte_size(bits: DataBits) -> u8 {
    match bits {
        DataBits::Five => 5,
        DataBits::Six => 6,
        DataBits::Seven => 7,
        DataBits::Eight => 8,
    }
}

fn parity_constant(parity: Parity) -> u8 {
    match parity {
        Parity::None => NOPARITY as u8,
        Parity::Odd => ODDPARITY as u8,
        Parity::Even => EVENPARITY as u8,
        Parity::Mark => MARKPARITY as u8,
        Parity::Space => SPACEPARITY as u8,
    }
}

fn stop_bits_constant(bits: StopBits) -> u8 {
    match bits {
        StopBits::One => ONESTOPBIT as u8,
        StopBits::OnePointFive => ONE5STOPBITS as u8,
        StopBits::Two => TWOSTOPBITS as u8,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_com_names_pass_through() {
        assert_eq!(extended_port_name("COM1"), "COM1");
        assert_eq!(extended_port_name("COM9"), "COM9");
    }

    #[test]
    fn test_long_com_names_get_extended_prefix() {
        assert_eq!(extended_port_name("COM10"), r"\\.\COM10");
        assert_eq!(extended_port_name("COM255"), r"\\.\COM255");
    }

    #[test]
    fn test_non_com_names_pass_through() {
        assert_eq!(extended_port_name(r"\\.\COM12"), r"\\.\COM12");
    }

    #[test]
    fn test_inter_byte_timeout_floor() {
        assert_eq!(inter_byte_timeout(115_200), Duration::from_millis(50));
        assert_eq!(inter_byte_timeout(9600), Duration::from_millis(50));
        assert_eq!(inter_byte_timeout(110), Duration::from_millis(92));
    }

    #[test]
    fn test_millis_capped_saturates_below_sentinel() {
        assert_eq!(millis_capped(Duration::from_millis(500)), 500);
        assert_eq!(millis_capped(Duration::from_secs(u64::MAX)), MAXDWORD - 1);
    }

    #[test]
    fn test_parity_and_stop_constants() {
        assert_eq!(parity_constant(Parity::Mark), MARKPARITY as u8);
        assert_eq!(stop_bits_constant(StopBits::OnePointFive), ONE5STOPBITS as u8);
        assert_eq!(byte_size(DataBits::Seven), 7);
    }
}
