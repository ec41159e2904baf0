//! POSIX serial transport (Linux and macOS).
//!
//! Owns a non-blocking file descriptor for the tty device and translates
//! [`PortConfig`] into a termios control block. Reads poll the descriptor in
//! the shared timed loop; `VMIN`/`VTIME` are zero so each `read(2)` returns
//! immediately with whatever the driver has buffered.
//!
//! The two termios dialects differ in spots: Linux has no `B14400` constant,
//! macOS has no `CMSPAR` for mark/space parity. Those combinations are
//! rejected with a configuration error rather than silently substituted.

use std::ffi::CString;
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::time::Duration;

use tracing::{debug, trace};

use super::{read_until_deadline, Transport};
use crate::error::{Error, Result};
use crate::params::{BaudRate, DataBits, Parity, PortConfig, StopBits};

/// Serial transport backed by a POSIX tty file descriptor.
pub struct PosixTransport {
    /// Exclusively owned descriptor; closed exactly once on drop.
    fd: OwnedFd,
    name: String,
    config: PortConfig,
}

impl PosixTransport {
    /// Open `name` (a device path such as `/dev/ttyUSB0`) and commit
    /// `config` to it.
    ///
    /// If configuration fails after the descriptor was acquired, the
    /// descriptor is closed before the error propagates.
    pub fn open(name: &str, config: PortConfig) -> Result<Self> {
        let path = CString::new(name).map_err(|_| {
            Error::open(
                name,
                io::Error::new(io::ErrorKind::InvalidInput, "device name contains NUL"),
            )
        })?;

        // Non-blocking so the timed receive loop can poll without stalling.
        let raw = unsafe { libc::open(path.as_ptr(), libc::O_RDWR | libc::O_NOCTTY | libc::O_NONBLOCK) };
        if raw < 0 {
            return Err(Error::open(name, io::Error::last_os_error()));
        }
        // From here on every exit path closes the descriptor.
        let fd = unsafe { OwnedFd::from_raw_fd(raw) };

        apply_config(fd.as_raw_fd(), &config)?;
        discard_input(fd.as_raw_fd())?;

        debug!(port = name, ?config, "opened serial port");
        Ok(Self {
            fd,
            name: name.to_string(),
            config,
        })
    }
}

impl Transport for PosixTransport {
    fn name(&self) -> &str {
        &self.name
    }

    fn config(&self) -> PortConfig {
        self.config
    }

    fn reconfigure(&mut self, config: PortConfig) -> Result<()> {
        apply_config(self.fd.as_raw_fd(), &config)?;
        self.config = config;
        debug!(port = %self.name, ?config, "reconfigured serial port");
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        let n = unsafe {
            libc::write(
                self.fd.as_raw_fd(),
                data.as_ptr() as *const libc::c_void,
                data.len(),
            )
        };
        if n < 0 {
            return Err(Error::Io(io::Error::last_os_error()));
        }
        trace!(port = %self.name, requested = data.len(), written = n, "write");
        Ok(n as usize)
    }

    fn read_into(&mut self, buffer: &mut Vec<u8>, timeout: Duration) -> Result<()> {
        let fd = self.fd.as_raw_fd();
        let before = buffer.len();
        read_until_deadline(buffer, timeout, |scratch| read_chunk(fd, scratch))?;
        trace!(port = %self.name, received = buffer.len() - before, "read");
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        discard_input(self.fd.as_raw_fd())
    }

    fn available(&self) -> Result<usize> {
        let mut pending: libc::c_int = 0;
        let rc = unsafe { libc::ioctl(self.fd.as_raw_fd(), libc::FIONREAD, &mut pending) };
        if rc < 0 {
            return Err(Error::Io(io::Error::last_os_error()));
        }
        Ok(pending as usize)
    }
}

impl std::fmt::Debug for PosixTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PosixTransport")
            .field("name", &self.name)
            .field("fd", &self.fd.as_raw_fd())
            .field("config", &self.config)
            .finish()
    }
}

/// One non-blocking read attempt; `Ok(0)` when nothing is buffered.
fn read_chunk(fd: RawFd, scratch: &mut [u8]) -> Result<usize> {
    let n = unsafe { libc::read(fd, scratch.as_mut_ptr() as *mut libc::c_void, scratch.len()) };
    if n < 0 {
        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::WouldBlock {
            return Ok(0);
        }
        return Err(Error::Io(err));
    }
    Ok(n as usize)
}

fn discard_input(fd: RawFd) -> Result<()> {
    if unsafe { libc::tcflush(fd, libc::TCIFLUSH) } != 0 {
        return Err(Error::Io(io::Error::last_os_error()));
    }
    Ok(())
}

/// Build the termios block from scratch and commit it in one `tcsetattr`.
fn apply_config(fd: RawFd, config: &PortConfig) -> Result<()> {
    let mut tios: libc::termios = unsafe { std::mem::zeroed() };

    // Raw mode: no parity-error marking passthrough, no CR/NL translation,
    // no echo, no output processing. The payload is byte-transparent.
    tios.c_iflag = libc::IGNPAR;
    tios.c_oflag = 0;
    tios.c_lflag = 0;

    // Receiver on, modem control lines ignored, RTS/CTS handshake fixed on.
    tios.c_cflag = libc::CREAD | libc::CLOCAL | libc::CRTSCTS;
    tios.c_cflag |= char_size_flag(config.data_bits);
    tios.c_cflag |= parity_flags(config.parity)?;
    tios.c_cflag |= stop_bits_flag(config.stop_bits)?;

    // Poll semantics: read(2) returns immediately with whatever is buffered.
    tios.c_cc[libc::VMIN] = 0;
    tios.c_cc[libc::VTIME] = 0;

    let speed = baud_constant(config.baud_rate)?;
    if unsafe { libc::cfsetispeed(&mut tios, speed) } != 0
        || unsafe { libc::cfsetospeed(&mut tios, speed) } != 0
    {
        return Err(Error::config(format!(
            "failed to set baud rate {}",
            config.baud_rate
        )));
    }

    if unsafe { libc::tcsetattr(fd, libc::TCSANOW, &tios) } != 0 {
        return Err(Error::config(format!(
            "tcsetattr failed: {}",
            io::Error::last_os_error()
        )));
    }
    Ok(())
}

fn baud_constant(baud: BaudRate) -> Result<libc::speed_t> {
    match baud {
        BaudRate::Baud110 => Ok(libc::B110),
        BaudRate::Baud300 => Ok(libc::B300),
        BaudRate::Baud600 => Ok(libc::B600),
        BaudRate::Baud1200 => Ok(libc::B1200),
        BaudRate::Baud2400 => Ok(libc::B2400),
        BaudRate::Baud4800 => Ok(libc::B4800),
        BaudRate::Baud9600 => Ok(libc::B9600),
        #[cfg(target_os = "macos")]
        BaudRate::Baud14400 => Ok(libc::B14400),
        #[cfg(not(target_os = "macos"))]
        BaudRate::Baud14400 => Err(Error::config(
            "14400 baud has no termios constant on this platform",
        )),
        BaudRate::Baud19200 => Ok(libc::B19200),
        BaudRate::Baud38400 => Ok(libc::B38400),
        BaudRate::Baud115200 => Ok(libc::B115200),
    }
}

fn char_size_flag(bits: DataBits) -> libc::tcflag_t {
    match bits {
        DataBits::Five => libc::CS5,
        DataBits::Six => libc::CS6,
        DataBits::Seven => libc::CS7,
        DataBits::Eight => libc::CS8,
    }
}

fn parity_flags(parity: Parity) -> Result<libc::tcflag_t> {
    match parity {
        Parity::None => Ok(0),
        Parity::Even => Ok(libc::PARENB),
        Parity::Odd => Ok(libc::PARENB | libc::PARODD),
        #[cfg(target_os = "linux")]
        Parity::Mark => Ok(libc::PARENB | libc::CMSPAR | libc::PARODD),
        #[cfg(target_os = "linux")]
        Parity::Space => Ok(libc::PARENB | libc::CMSPAR),
        #[cfg(not(target_os = "linux"))]
        Parity::Mark => Err(Error::config("mark parity is not supported on this platform")),
        #[cfg(not(target_os = "linux"))]
        Parity::Space => Err(Error::config("space parity is not supported on this platform")),
    }
}

fn stop_bits_flag(bits: StopBits) -> Result<libc::tcflag_t> {
    match bits {
        StopBits::One => Ok(0),
        StopBits::OnePointFive => Err(Error::config("1.5 stop bits are not expressible in termios")),
        StopBits::Two => Ok(libc::CSTOPB),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_baud_constants_cover_listed_rates() {
        assert_eq!(baud_constant(BaudRate::Baud110).unwrap(), libc::B110);
        assert_eq!(baud_constant(BaudRate::Baud9600).unwrap(), libc::B9600);
        assert_eq!(baud_constant(BaudRate::Baud115200).unwrap(), libc::B115200);
    }

    #[cfg(not(target_os = "macos"))]
    #[test]
    fn test_baud_14400_fails_closed() {
        let err = baud_constant(BaudRate::Baud14400).unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn test_char_size_flags() {
        assert_eq!(char_size_flag(DataBits::Five), libc::CS5);
        assert_eq!(char_size_flag(DataBits::Eight), libc::CS8);
    }

    #[test]
    fn test_parity_flags() {
        assert_eq!(parity_flags(Parity::None).unwrap(), 0);
        assert_eq!(parity_flags(Parity::Even).unwrap(), libc::PARENB);
        assert_eq!(
            parity_flags(Parity::Odd).unwrap(),
            libc::PARENB | libc::PARODD
        );
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_mark_space_parity_use_cmspar() {
        assert_eq!(
            parity_flags(Parity::Mark).unwrap(),
            libc::PARENB | libc::CMSPAR | libc::PARODD
        );
        assert_eq!(
            parity_flags(Parity::Space).unwrap(),
            libc::PARENB | libc::CMSPAR
        );
    }

    #[test]
    fn test_one_point_five_stop_bits_fail_closed() {
        let err = stop_bits_flag(StopBits::OnePointFive).unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
        assert_eq!(stop_bits_flag(StopBits::Two).unwrap(), libc::CSTOPB);
    }

    #[test]
    fn test_open_nonexistent_device_fails_with_open_error() {
        let result = PosixTransport::open("/dev/tty_miniserial_nonexistent", PortConfig::default());
        assert!(matches!(result, Err(Error::Open { .. })));
    }
}
