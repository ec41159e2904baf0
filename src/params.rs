//! Portable line-parameter types.
//!
//! These are pure value types: every platform transport translates them into
//! its native control-block format (termios on Unix, DCB on Windows). A
//! combination a platform cannot express is rejected with a configuration
//! error at commit time rather than silently substituted.

use std::fmt;
use std::time::Duration;

/// Baud rate in bits per second.
///
/// Only the listed standard rates are legal; each maps 1:1 to a platform
/// rate constant. Use [`BaudRate::try_from`] to go from a raw `u32`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BaudRate {
    Baud110,
    Baud300,
    Baud600,
    Baud1200,
    Baud2400,
    Baud4800,
    Baud9600,
    Baud14400,
    Baud19200,
    Baud38400,
    Baud115200,
}

impl BaudRate {
    /// The rate in bits per second.
    pub fn as_u32(self) -> u32 {
        match self {
            BaudRate::Baud110 => 110,
            BaudRate::Baud300 => 300,
            BaudRate::Baud600 => 600,
            BaudRate::Baud1200 => 1200,
            BaudRate::Baud2400 => 2400,
            BaudRate::Baud4800 => 4800,
            BaudRate::Baud9600 => 9600,
            BaudRate::Baud14400 => 14400,
            BaudRate::Baud19200 => 19200,
            BaudRate::Baud38400 => 38400,
            BaudRate::Baud115200 => 115_200,
        }
    }
}

impl TryFrom<u32> for BaudRate {
    type Error = crate::Error;

    fn try_from(bps: u32) -> Result<Self, Self::Error> {
        match bps {
            110 => Ok(BaudRate::Baud110),
            300 => Ok(BaudRate::Baud300),
            600 => Ok(BaudRate::Baud600),
            1200 => Ok(BaudRate::Baud1200),
            2400 => Ok(BaudRate::Baud2400),
            4800 => Ok(BaudRate::Baud4800),
            9600 => Ok(BaudRate::Baud9600),
            14400 => Ok(BaudRate::Baud14400),
            19200 => Ok(BaudRate::Baud19200),
            38400 => Ok(BaudRate::Baud38400),
            115_200 => Ok(BaudRate::Baud115200),
            other => Err(crate::Error::config(format!(
                "unsupported baud rate: {other}"
            ))),
        }
    }
}

impl fmt::Display for BaudRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u32())
    }
}

/// Parity checking mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Parity {
    None,
    Odd,
    Even,
    Mark,
    Space,
}

/// Number of data bits per character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataBits {
    Five,
    Six,
    Seven,
    Eight,
}

/// Number of stop bits.
///
/// `OnePointFive` is only expressible on Windows; termios rejects it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StopBits {
    One,
    OnePointFive,
    Two,
}

/// Full configuration for a serial port.
///
/// The four line parameters plus the receive timeout used by reads that do
/// not supply their own. Committed to the OS as a whole: the transports never
/// push a partially updated control block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortConfig {
    /// Baud rate in bits per second.
    pub baud_rate: BaudRate,

    /// Parity checking mode.
    pub parity: Parity,

    /// Number of data bits (5, 6, 7, or 8).
    pub data_bits: DataBits,

    /// Number of stop bits.
    pub stop_bits: StopBits,

    /// Default receive timeout.
    pub timeout: Duration,
}

impl Default for PortConfig {
    fn default() -> Self {
        Self {
            baud_rate: BaudRate::Baud9600,
            parity: Parity::None,
            data_bits: DataBits::Eight,
            stop_bits: StopBits::One,
            timeout: Duration::from_secs(2),
        }
    }
}
