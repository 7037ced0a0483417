//! Collaborators the readout driver talks through.
//!
//! The driver never touches hardware directly: byte I/O goes through a
//! [`SerialTransport`] and every elapsed-time check through a [`Clock`], so a
//! test can swap both for scripted fakes.

use super::Iec62056Error;
use std::time::{Duration, Instant};

/// Character framing of the optical link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameFormat {
    /// 7 data bits, even parity, 1 stop bit
    SevenEvenOne,
}

/// Why a line read returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineEnd {
    /// The terminator was seen; it is not part of the buffer
    Terminator,
    /// `max_length` bytes were read without seeing the terminator
    Truncated,
    /// No byte arrived within the timeout
    TimedOut,
}

pub trait SerialTransport {
    fn configure(&mut self, baud_rate: u32, format: FrameFormat) -> Result<(), Iec62056Error>;

    fn write(&mut self, data: &[u8]) -> Result<(), Iec62056Error>;

    fn flush(&mut self) -> Result<(), Iec62056Error>;

    /// Returns a byte only when one is already buffered
    fn read_byte_nonblocking(&mut self) -> Result<Option<u8>, Iec62056Error>;

    /// Reads into `buf` (cleared first) until `terminator`, `max_length` bytes
    /// or a gap of `timeout` between two bytes.
    fn read_line(
        &mut self,
        terminator: u8,
        timeout: Duration,
        max_length: usize,
        buf: &mut Vec<u8>,
    ) -> Result<LineEnd, Iec62056Error>;

    /// Reads up to `n` bytes; a shorter result means the timeout hit first
    fn read_exact(&mut self, n: usize, timeout: Duration) -> Result<Vec<u8>, Iec62056Error>;
}

pub trait Clock {
    fn now(&self) -> Instant;

    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}
