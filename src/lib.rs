//! A small cross-platform serial port library.
//!
//! Open a named port, configure its line parameters (baud rate, parity, data
//! bits, stop bits), write bytes, and read bytes with a bounded wait. The
//! payload is byte-transparent: no framing, no interpretation, no translation.
//!
//! # Modules
//!
//! - `params`: portable line-parameter types and the [`PortConfig`] bundle
//! - `transport`: the per-OS transport engine plus a mock for tests
//! - `port`: the [`SerialPort`] facade applications hold
//! - `error`: the [`Error`] type
//!
//! # Example
//! ```no_run
//! use miniserial::{BaudRate, Parity, PortConfig, SerialPort};
//! use std::time::Duration;
//!
//! let config = PortConfig {
//!     baud_rate: BaudRate::Baud19200,
//!     parity: Parity::Even,
//!     ..PortConfig::default()
//! };
//! let mut port = SerialPort::open("/dev/ttyUSB0", config)?;
//!
//! port.install_tx_listener(|bytes| eprintln!("TX {bytes:02x?}"));
//! port.write(b"AT\r\n")?;
//!
//! let reply = port.read(Duration::from_millis(200))?;
//! # Ok::<(), miniserial::Error>(())
//! ```
//!
//! Reads never fail just because nothing arrived: an empty buffer after the
//! timeout is the normal quiet-line outcome. Concurrent use of one port from
//! several threads requires external synchronization; every operation takes
//! `&mut self`.

pub mod error;
pub mod params;
pub mod port;
pub mod transport;

// Re-export the types applications touch directly.
pub use error::{Error, Result};
pub use params::{BaudRate, DataBits, Parity, PortConfig, StopBits};
pub use port::{Listener, SerialPort};
pub use transport::Transport;
