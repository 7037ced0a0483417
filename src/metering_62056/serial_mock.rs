//! Scripted transport and clock for driving `MeterReader` without hardware.
//!
//! The mock plays the meter: bytes queued with [`MockTransport::queue_stale`]
//! are in the receive buffer before the cycle starts, each entry queued with
//! [`MockTransport::reply_on_write`] is released when the driver writes
//! something. Reads that run dry advance the shared [`MockClock`] by their
//! timeout, the way a real port would block.

use super::transport::{Clock, FrameFormat, LineEnd, SerialTransport};
use super::Iec62056Error;
use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

#[derive(Clone)]
pub struct MockClock {
    base: Instant,
    offset: Arc<Mutex<Duration>>,
}

impl MockClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Arc::new(Mutex::new(Duration::ZERO)),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.offset.lock().unwrap() += by;
    }

    pub fn elapsed(&self) -> Duration {
        *self.offset.lock().unwrap()
    }
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        self.base + self.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}

#[derive(Default)]
struct MockState {
    rx: VecDeque<u8>,
    replies: VecDeque<Vec<u8>>,
    tx: Vec<u8>,
    writes: Vec<Vec<u8>>,
    configured: Vec<(u32, FrameFormat)>,
    endless_rx: Option<u8>,
    fail_writes: bool,
}

#[derive(Clone)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
    clock: MockClock,
}

impl MockTransport {
    pub fn new(clock: MockClock) -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::default())),
            clock,
        }
    }

    /// Bytes already sitting in the receive buffer
    pub fn queue_stale(&self, data: &[u8]) {
        self.state.lock().unwrap().rx.extend(data);
    }

    /// Released into the receive buffer by the next write not yet answered
    pub fn reply_on_write(&self, data: &[u8]) {
        self.state.lock().unwrap().replies.push_back(data.to_vec());
    }

    /// Simulates a meter stuck in an endless transmission loop
    pub fn set_endless_rx(&self, byte: Option<u8>) {
        self.state.lock().unwrap().endless_rx = byte;
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.state.lock().unwrap().fail_writes = fail;
    }

    pub fn get_tx_data(&self) -> Vec<u8> {
        self.state.lock().unwrap().tx.clone()
    }

    pub fn get_writes(&self) -> Vec<Vec<u8>> {
        self.state.lock().unwrap().writes.clone()
    }

    pub fn get_configured(&self) -> Vec<(u32, FrameFormat)> {
        self.state.lock().unwrap().configured.clone()
    }

    pub fn pending_rx(&self) -> usize {
        self.state.lock().unwrap().rx.len()
    }

    fn next_byte(&self) -> Option<u8> {
        let mut state = self.state.lock().unwrap();
        match state.rx.pop_front() {
            Some(b) => Some(b),
            None => state.endless_rx,
        }
    }
}

impl SerialTransport for MockTransport {
    fn configure(&mut self, baud_rate: u32, format: FrameFormat) -> Result<(), Iec62056Error> {
        self.state.lock().unwrap().configured.push((baud_rate, format));
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> Result<(), Iec62056Error> {
        let mut state = self.state.lock().unwrap();
        if state.fail_writes {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "reading head unplugged").into());
        }
        state.tx.extend_from_slice(data);
        state.writes.push(data.to_vec());
        if let Some(reply) = state.replies.pop_front() {
            state.rx.extend(reply);
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), Iec62056Error> {
        Ok(())
    }

    fn read_byte_nonblocking(&mut self) -> Result<Option<u8>, Iec62056Error> {
        Ok(self.next_byte())
    }

    fn read_line(
        &mut self,
        terminator: u8,
        timeout: Duration,
        max_length: usize,
        buf: &mut Vec<u8>,
    ) -> Result<LineEnd, Iec62056Error> {
        buf.clear();
        while buf.len() < max_length {
            match self.next_byte() {
                Some(b) if b == terminator => return Ok(LineEnd::Terminator),
                Some(b) => buf.push(b),
                None => {
                    self.clock.advance(timeout);
                    return Ok(LineEnd::TimedOut);
                }
            }
        }
        Ok(LineEnd::Truncated)
    }

    fn read_exact(&mut self, n: usize, timeout: Duration) -> Result<Vec<u8>, Iec62056Error> {
        let mut data = Vec::with_capacity(n);
        while data.len() < n {
            match self.next_byte() {
                Some(b) => data.push(b),
                None => {
                    self.clock.advance(timeout);
                    break;
                }
            }
        }
        Ok(data)
    }
}
