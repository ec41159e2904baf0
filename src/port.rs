//! The platform-independent serial port handle.

use std::time::Duration;

use crate::error::Result;
use crate::params::{BaudRate, DataBits, Parity, PortConfig, StopBits};
use crate::transport::Transport;

#[cfg(any(unix, windows))]
use crate::transport::NativeTransport;

/// Callback invoked with the payload of a completed transfer.
pub type Listener = Box<dyn FnMut(&[u8]) + Send>;

/// A serial port.
///
/// The single object applications hold: owns one platform transport for its
/// lifetime, forwards every operation to it, and runs the optional
/// per-direction listener hooks after each completed transfer. The device
/// handle is released when the `SerialPort` is dropped.
///
/// Operations are synchronous; only reads block, bounded by the supplied
/// timeout. One instance must not be shared with another live instance for
/// the same device — the library does not arbitrate contention.
///
/// # Example
/// ```no_run
/// use miniserial::{PortConfig, SerialPort};
/// use std::time::Duration;
///
/// let mut port = SerialPort::open("/dev/ttyUSB0", PortConfig::default())?;
/// port.write(&[0x2f, 0x3f, 0x21, 0x0d, 0x0a])?;
/// let reply = port.read(Duration::from_millis(500))?;
/// println!("RX: {reply:02x?}");
/// # Ok::<(), miniserial::Error>(())
/// ```
pub struct SerialPort {
    transport: Box<dyn Transport>,
    rx_listener: Option<Listener>,
    tx_listener: Option<Listener>,
}

impl SerialPort {
    /// Open the named device and commit `config` to it.
    ///
    /// `name` is the OS device identifier: a path such as `/dev/ttyUSB0` on
    /// Unix, a port name such as `COM3` on Windows (`COM10` and up are
    /// rewritten to the `\\.\` extended form automatically).
    ///
    /// # Errors
    /// [`Error::Open`](crate::Error::Open) if the device cannot be acquired,
    /// [`Error::Config`](crate::Error::Config) if it rejects the parameters.
    /// A configuration failure after the handle opened does not leak it.
    #[cfg(any(unix, windows))]
    pub fn open(name: &str, config: PortConfig) -> Result<Self> {
        Ok(Self::from_transport(Box::new(NativeTransport::open(
            name, config,
        )?)))
    }

    /// Open with the default configuration (9600 baud, 8N1, 2 s timeout).
    #[cfg(any(unix, windows))]
    pub fn open_default(name: &str) -> Result<Self> {
        Self::open(name, PortConfig::default())
    }

    /// Wrap an already-constructed transport.
    ///
    /// Dependency-injection seam: tests hand in a
    /// [`MockTransport`](crate::transport::MockTransport) to drive the full
    /// facade without hardware.
    pub fn from_transport(transport: Box<dyn Transport>) -> Self {
        Self {
            transport,
            rx_listener: None,
            tx_listener: None,
        }
    }

    /// The identifier this port was opened with.
    pub fn name(&self) -> &str {
        self.transport.name()
    }

    /// The last configuration committed to the OS.
    pub fn config(&self) -> PortConfig {
        self.transport.config()
    }

    /// Apply all four line parameters and the timeout in one commit.
    pub fn reconfigure(&mut self, config: PortConfig) -> Result<()> {
        self.transport.reconfigure(config)
    }

    /// Change only the baud rate, recommitting the full configuration.
    pub fn set_baud(&mut self, baud_rate: BaudRate) -> Result<()> {
        let mut config = self.transport.config();
        config.baud_rate = baud_rate;
        self.transport.reconfigure(config)
    }

    /// Change only the parity mode, recommitting the full configuration.
    pub fn set_parity(&mut self, parity: Parity) -> Result<()> {
        let mut config = self.transport.config();
        config.parity = parity;
        self.transport.reconfigure(config)
    }

    /// Change only the data bits, recommitting the full configuration.
    pub fn set_data_bits(&mut self, data_bits: DataBits) -> Result<()> {
        let mut config = self.transport.config();
        config.data_bits = data_bits;
        self.transport.reconfigure(config)
    }

    /// Change only the stop bits, recommitting the full configuration.
    pub fn set_stop_bits(&mut self, stop_bits: StopBits) -> Result<()> {
        let mut config = self.transport.config();
        config.stop_bits = stop_bits;
        self.transport.reconfigure(config)
    }

    /// Change only the default receive timeout, recommitting the full
    /// configuration.
    pub fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
        let mut config = self.transport.config();
        config.timeout = timeout;
        self.transport.reconfigure(config)
    }

    /// Write bytes with a single OS call and return the accepted count.
    ///
    /// The OS may accept fewer bytes than supplied; the caller decides
    /// whether to retry the remainder. The transmit listener, if installed,
    /// is invoked with exactly the accepted prefix.
    pub fn write(&mut self, data: &[u8]) -> Result<usize> {
        let written = self.transport.write(data)?;
        if let Some(listener) = &mut self.tx_listener {
            listener(&data[..written]);
        }
        Ok(written)
    }

    /// Read whatever arrives within `timeout` and return it.
    ///
    /// A zero timeout returns immediately with whatever the driver already
    /// buffered. An empty result means nothing arrived before the deadline;
    /// it is not an error. The receive listener, if installed, is invoked
    /// with exactly the returned bytes (empty included).
    pub fn read(&mut self, timeout: Duration) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        self.read_into(&mut buffer, timeout)?;
        Ok(buffer)
    }

    /// Read using the configured default timeout.
    pub fn read_default(&mut self) -> Result<Vec<u8>> {
        self.read(self.transport.config().timeout)
    }

    /// Buffer-filling form of [`read`](Self::read): appends to `buffer`,
    /// preserving arrival order. The receive listener sees only the bytes
    /// appended by this call.
    pub fn read_into(&mut self, buffer: &mut Vec<u8>, timeout: Duration) -> Result<()> {
        let before = buffer.len();
        self.transport.read_into(buffer, timeout)?;
        if let Some(listener) = &mut self.rx_listener {
            listener(&buffer[before..]);
        }
        Ok(())
    }

    /// Discard unread input buffered by the OS driver. Never blocks.
    pub fn flush(&mut self) -> Result<()> {
        self.transport.flush()
    }

    /// Number of bytes buffered by the OS, without consuming them.
    pub fn available(&self) -> Result<usize> {
        self.transport.available()
    }

    /// Install the receive listener, replacing any previous one.
    ///
    /// Invoked synchronously on the calling thread after every completed
    /// read, with exactly the bytes that read returned.
    pub fn install_rx_listener(&mut self, listener: impl FnMut(&[u8]) + Send + 'static) {
        self.rx_listener = Some(Box::new(listener));
    }

    /// Install the transmit listener, replacing any previous one.
    ///
    /// Invoked synchronously on the calling thread after every completed
    /// write, with exactly the bytes the OS accepted.
    pub fn install_tx_listener(&mut self, listener: impl FnMut(&[u8]) + Send + 'static) {
        self.tx_listener = Some(Box::new(listener));
    }

    /// Close the port, releasing the device handle.
    ///
    /// Dropping the port has the same effect; this form makes the intent
    /// explicit at call sites.
    pub fn close(self) {}
}

impl std::fmt::Debug for SerialPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialPort")
            .field("transport", &self.transport)
            .field("rx_listener", &self.rx_listener.is_some())
            .field("tx_listener", &self.tx_listener.is_some())
            .finish()
    }
}
