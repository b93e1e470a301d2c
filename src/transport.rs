//! Collaborators the engine drives but does not own: the serial byte stream,
//! the half-duplex direction line and a monotonic clock.

use std::io;
use std::time::{Duration, Instant};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DataBits {
    Seven,
    Eight,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Parity {
    None,
    Even,
    Odd,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StopBits {
    One,
    Two,
}

/// Character framing on the serial line.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SerialConfig {
    pub data_bits: DataBits,
    pub parity: Parity,
    pub stop_bits: StopBits,
}

impl Default for SerialConfig {
    fn default() -> Self {
        SerialConfig {
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
        }
    }
}

impl SerialConfig {
    /// Bits on the wire for one character, start bit included.
    pub fn bits_per_char(&self) -> u32 {
        let data = match self.data_bits {
            DataBits::Seven => 7,
            DataBits::Eight => 8,
        };
        let parity = match self.parity {
            Parity::None => 0,
            Parity::Even | Parity::Odd => 1,
        };
        let stop = match self.stop_bits {
            StopBits::One => 1,
            StopBits::Two => 2,
        };
        1 + data + parity + stop
    }
}

/// Serial byte stream.
///
/// `read` must never block when `available` reported bytes; `flush` must return only
/// once every written byte has left the wire.
pub trait Transport: io::Read + io::Write {
    /// Opens or reconfigures the port.
    fn configure(&mut self, baud_rate: u32, config: SerialConfig) -> io::Result<()>;

    /// Bytes that can be read right now without consuming them.
    fn available(&mut self) -> io::Result<usize>;
}

/// Switches a half-duplex transceiver between receiving and transmitting.
///
/// `set_transmit` returns only after the driver has settled.
pub trait LineDirection {
    fn set_receive(&mut self);
    fn set_transmit(&mut self);
}

/// Direction control for full-duplex links (RS-232, USB adapters): does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoDirection;

impl LineDirection for NoDirection {
    fn set_receive(&mut self) {}
    fn set_transmit(&mut self) {}
}

/// Monotonic time source; only differences between readings are meaningful.
pub trait Clock {
    fn now(&self) -> Duration;
}

pub struct MonotonicClock {
    origin: Instant,
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl MonotonicClock {
    pub fn new() -> Self {
        MonotonicClock {
            origin: Instant::now(),
        }
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bits_per_char() {
        assert_eq!(SerialConfig::default().bits_per_char(), 10);

        let even = SerialConfig {
            parity: Parity::Even,
            ..SerialConfig::default()
        };
        assert_eq!(even.bits_per_char(), 11);

        let two_stop = SerialConfig {
            stop_bits: StopBits::Two,
            ..SerialConfig::default()
        };
        assert_eq!(two_stop.bits_per_char(), 11);
    }

    #[test]
    fn test_monotonic_clock_does_not_go_back() {
        let clock = MonotonicClock::new();
        let first = clock.now();
        let second = clock.now();
        assert!(second >= first);
    }
}
