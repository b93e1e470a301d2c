use std::time::Duration;

use crate::transport::SerialConfig;

/// Floor for the inter-frame silence above 19200 baud.
const MIN_SILENCE_US: u64 = 1750;

/// Silence that ends a frame: 3.5 character times at `baud_rate`, never below 1.75 ms.
pub fn silence_interval(baud_rate: u32, config: SerialConfig) -> Duration {
    let bits = config.bits_per_char() as u64;
    let micros = (bits * 3_500_000)
        .checked_div(baud_rate as u64)
        .unwrap_or(0);
    Duration::from_micros(micros.max(MIN_SILENCE_US))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delimit {
    /// Nothing has arrived.
    Empty,
    /// Bytes are arriving or the line has not been quiet long enough.
    Pending,
    /// The line went quiet with this many bytes waiting.
    Complete(usize),
}

/// Finds frame ends from inter-character silence.
///
/// Fed the transport's available-byte count on every call; keeps the last count and
/// when it last changed between calls, so it never has to wait on the line.
#[derive(Debug)]
pub struct FrameDelimiter {
    silence: Duration,
    last_count: usize,
    last_change: Duration,
}

impl FrameDelimiter {
    pub fn new(silence: Duration) -> Self {
        FrameDelimiter {
            silence,
            last_count: 0,
            last_change: Duration::ZERO,
        }
    }

    pub fn silence(&self) -> Duration {
        self.silence
    }

    pub fn set_silence(&mut self, silence: Duration) {
        self.silence = silence;
    }

    pub fn reset(&mut self) {
        self.last_count = 0;
        self.last_change = Duration::ZERO;
    }

    pub fn observe(&mut self, available: usize, now: Duration) -> Delimit {
        if available == 0 {
            self.last_count = 0;
            return Delimit::Empty;
        }

        if available != self.last_count {
            self.last_count = available;
            self.last_change = now;
            return Delimit::Pending;
        }

        if now.saturating_sub(self.last_change) < self.silence {
            return Delimit::Pending;
        }

        self.last_count = 0;
        Delimit::Complete(available)
    }
}
