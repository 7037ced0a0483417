//! IEC 62056-21 readout (mode A/B/C) over an optical link.
//!
//! [`MeterReader`] is a cooperative state machine: `start_reading()` begins a
//! cycle, every `poll()` advances it by one step, and the cycle ends in one of
//! the terminal [`ReaderStatus`] values which stays until `acknowledge()`.
//!
//! ```text
//! Ready -> Busy(Started) -> RequestSent -> IdentificationRead -> InData* -> AfterData -> Ok
//!                                   \-> IdentificationError / IdentificationMismatch
//!                                                                          \-> ProtocolError / ChecksumError
//! any busy step -> TimeoutError once the cycle exceeds `max_cycle_secs`
//! ```
//!
//! Values of monitored objects are committed while the data lines arrive. A
//! checksum failure at the end of the frame does not roll them back, so callers
//! always see the best-effort latest value.

use crate::config::ReaderConfig;
use crate::obis_utils;
use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use thiserror::Error;

pub mod obis_parser;
pub mod structs;
pub mod transport;
pub mod utils;

#[cfg(feature = "serial")]
pub mod serial;

#[cfg(test)]
pub(crate) mod serial_mock;

use structs::*;
use transport::{Clock, FrameFormat, LineEnd, SerialTransport};
use utils::{ETX, STX};

pub use structs::{MeterIdentification, ReaderStatus, ReadoutCounters, Step};

/// `/AAAbi...i\r`
pub const MAX_IDENTIFICATION_LENGTH: usize = 5 + 16 + 1;
pub const MAX_LINE_LENGTH: usize = 78;
/// Shorter identifications cannot carry the mode character
pub const MIN_IDENTIFICATION_LENGTH: usize = 6;

const LINE_TERMINATOR: u8 = b'\n';
const END_OF_DATA: u8 = b'!';

#[derive(Error, Debug)]
pub enum Iec62056Error {
    #[error("Serial I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serial port error: {0}")]
    Serial(String),
    #[error("Serial port used before it was configured")]
    NotConfigured,
    #[error("Unsupported baud rate {0}")]
    UnsupportedBaudRate(u32),
    #[error("Invalid identification line {0:?}")]
    InvalidIdentification(String),
}

#[cfg(feature = "serial")]
impl From<serialport::Error> for Iec62056Error {
    fn from(e: serialport::Error) -> Self {
        Iec62056Error::Serial(e.to_string())
    }
}

pub struct MeterReader<T: SerialTransport, C: Clock> {
    transport: T,
    clock: C,
    config: ReaderConfig,
    state: ReaderState,
    checksum: u8,
    cycle_start: Instant,
    last_identification: String,
    identification: Option<MeterIdentification>,
    negotiated_baud: Option<u32>,
    counters: ReadoutCounters,
    values: HashMap<String, String>,
    line: Vec<u8>,
}

impl<T: SerialTransport, C: Clock> MeterReader<T, C> {
    pub fn new(transport: T, clock: C, config: ReaderConfig) -> Self {
        let cycle_start = clock.now();
        Self {
            transport,
            clock,
            config,
            state: ReaderState::Ready,
            checksum: STX,
            cycle_start,
            last_identification: String::new(),
            identification: None,
            negotiated_baud: None,
            counters: ReadoutCounters::default(),
            values: HashMap::new(),
            line: Vec::with_capacity(MAX_LINE_LENGTH),
        }
    }

    /// Start monitoring an object. Adding an object that is already monitored
    /// succeeds and keeps its value. Refused while a readout is running.
    pub fn start_monitoring(&mut self, obis: &str) -> bool {
        if self.is_busy() {
            return false;
        }

        if !obis_utils::validate_obis_code(obis) {
            warn!("{:?} does not look like an OBIS code, monitoring it anyway", obis);
        }

        self.values.entry(obis.to_string()).or_default();
        true
    }

    /// Stop monitoring an object. Returns false when it was not monitored or a
    /// readout is running.
    pub fn stop_monitoring(&mut self, obis: &str) -> bool {
        if self.is_busy() {
            return false;
        }

        self.values.remove(obis).is_some()
    }

    pub fn start_reading(&mut self) {
        /* Don't allow starting a read when one is already in progress */
        if self.is_busy() {
            return;
        }

        self.state = ReaderState::Busy(Step::Started);
        self.cycle_start = self.clock.now();
        self.negotiated_baud = None;

        if let Err(e) = self.transport.configure(self.config.initial_baud_rate, FrameFormat::SevenEvenOne) {
            return self.fail_on_transport(e);
        }

        // Some meters (Elster AS 3000) get stuck sending the readout in an
        // endless loop, so the drain needs its own bound
        debug!("Clear serial buffer");
        let mut drained = 0usize;
        loop {
            match self.transport.read_byte_nonblocking() {
                Ok(Some(_)) => {
                    drained += 1;
                    if self.elapsed() > self.config.drain_timeout() {
                        error!("Receive buffer did not run dry after {} bytes", drained);
                        return self.change_status(ReaderStatus::TimeoutError);
                    }
                    self.clock.sleep(self.config.drain_poll());
                }
                Ok(None) => break,
                Err(e) => return self.fail_on_transport(e),
            }
        }

        if drained > 0 {
            debug!("Dropped {} stale bytes", drained);
        }
    }

    /// Advances a running readout by one step. Must be called frequently,
    /// does nothing when no readout is running.
    pub fn poll(&mut self) {
        let step = match self.state {
            ReaderState::Busy(step) => step,
            _ => return,
        };

        if self.elapsed() > self.config.max_cycle() {
            error!("Readout took longer than {:?} (step {:?})", self.config.max_cycle(), step);
            return self.change_status(ReaderStatus::TimeoutError);
        }

        let result = match step {
            Step::Started => self.send_request(),
            Step::RequestSent => self.read_identification(),
            Step::IdentificationRead { mode_char } => self.switch_baud(mode_char),
            Step::InData => self.read_line(),
            Step::AfterData => self.verify_checksum(),
        };

        if let Err(e) = result {
            self.fail_on_transport(e);
        }
    }

    /// Call this after `status()` returned `Ok` or an error to get back to `Ready`
    pub fn acknowledge(&mut self) {
        if self.status().is_terminal() {
            self.state = ReaderState::Ready;
        }
    }

    pub fn status(&self) -> ReaderStatus {
        self.state.status()
    }

    pub fn step(&self) -> Option<Step> {
        match self.state {
            ReaderState::Busy(step) => Some(step),
            _ => None,
        }
    }

    pub fn values(&self) -> &HashMap<String, String> {
        &self.values
    }

    pub fn errors(&self) -> usize {
        self.counters.errors
    }

    pub fn checksum_errors(&self) -> usize {
        self.counters.checksum_errors
    }

    pub fn successes(&self) -> usize {
        self.counters.successes
    }

    pub fn counters(&self) -> ReadoutCounters {
        self.counters
    }

    pub fn last_identification_text(&self) -> &str {
        &self.last_identification
    }

    pub fn identification(&self) -> Option<&MeterIdentification> {
        self.identification.as_ref()
    }

    /// Rate used for the data part of the last readout
    pub fn negotiated_baud_rate(&self) -> Option<u32> {
        self.negotiated_baud
    }

    pub fn config(&self) -> &ReaderConfig {
        &self.config
    }

    fn is_busy(&self) -> bool {
        matches!(self.state, ReaderState::Busy(_))
    }

    fn elapsed(&self) -> Duration {
        self.clock.now().saturating_duration_since(self.cycle_start)
    }

    fn send_request(&mut self) -> Result<(), Iec62056Error> {
        debug!("Step -> send_request");
        let request = utils::build_request(self.config.device_address.as_deref());
        self.transport.write(&request)?;
        self.transport.flush()?;

        self.state = ReaderState::Busy(Step::RequestSent);
        Ok(())
    }

    fn read_identification(&mut self) -> Result<(), Iec62056Error> {
        debug!("Step -> read_identification");
        let end = self.transport.read_line(
            LINE_TERMINATOR,
            self.config.identification_timeout(),
            MAX_IDENTIFICATION_LENGTH,
            &mut self.line,
        )?;

        if self.line.is_empty() && end == LineEnd::TimedOut {
            error!("No identification received within {:?}", self.config.identification_timeout());
            self.change_status(ReaderStatus::TimeoutError);
            return Ok(());
        }

        let text = String::from_utf8_lossy(&self.line).trim_end_matches('\r').to_string();
        debug!("identification={}", text);
        self.last_identification = text;

        let len = self.line.len();
        if len < MIN_IDENTIFICATION_LENGTH {
            error!("ident too short ({} chars)", len);
            self.change_status(ReaderStatus::IdentificationError);
            return Ok(());
        }

        if let Some(expected) = self.config.expected_identifier.as_deref().filter(|e| !e.is_empty()) {
            if !self.last_identification.contains(expected) {
                error!("identification not matched: {} (expected {})", self.last_identification, expected);
                self.change_status(ReaderStatus::IdentificationMismatch);
                return Ok(());
            }
        }

        match utils::parse_identification_line(&self.last_identification) {
            Ok(identification) => self.identification = Some(identification),
            Err(e) => {
                warn!("{}", e);
                self.identification = None;
            }
        }

        let mode_char = match self.config.mode_override {
            Some(c) => c as u8,
            None => self.line[utils::MODE_CHAR_OFFSET],
        };
        info!("Meter {} offers mode {:?}", self.last_identification, mode_char as char);

        self.state = ReaderState::Busy(Step::IdentificationRead { mode_char });
        self.clock.sleep(self.config.identification_settle());
        Ok(())
    }

    fn switch_baud(&mut self, mode_char: u8) -> Result<(), Iec62056Error> {
        debug!("Step -> switch_baud");
        let params = utils::baud_char_to_params(mode_char);

        if params.send_acknowledgement {
            self.transport.write(&utils::build_acknowledgement(mode_char))?;
            self.transport.flush()?;
            self.clock.sleep(self.config.ack_settle());
        }

        let baud = params.new_baud.unwrap_or(self.config.initial_baud_rate);
        info!("switching to {} bps", baud);
        self.transport.configure(baud, FrameFormat::SevenEvenOne)?;
        self.negotiated_baud = Some(baud);

        self.state = ReaderState::Busy(Step::InData);
        /* Start with checksum=STX so the STX leading the first line cancels out */
        self.checksum = STX;
        Ok(())
    }

    fn read_line(&mut self) -> Result<(), Iec62056Error> {
        let end = self.transport.read_line(
            LINE_TERMINATOR,
            self.config.read_timeout(),
            MAX_LINE_LENGTH,
            &mut self.line,
        )?;

        let len = self.line.len();
        if end == LineEnd::Truncated {
            warn!("probably truncated a line, expect a checksum error");
        } else if len < 2 {
            /* A valid line will never be shorter than this */
            warn!("read short line or timed out");
            return Ok(());
        }

        /* The terminator is not part of the buffer, fold it in separately */
        self.checksum = utils::xor_fold(self.checksum, &self.line) ^ LINE_TERMINATOR;

        if self.line[len - 2] == END_OF_DATA {
            debug!("End of data, ETX and checksum follow");
            self.state = ReaderState::Busy(Step::AfterData);
            return Ok(());
        }

        let line = String::from_utf8_lossy(&self.line).into_owned();
        let text = line.trim_end_matches('\r');
        /* The first data line starts with an STX */
        let text = text.strip_prefix(STX as char).unwrap_or(text);
        debug!("line: {}", text);

        match obis_parser::split_data_line(text) {
            Some((obis, value)) => self.handle_object(obis, value),
            None => warn!("improper data line format: {:?}", text),
        }
        Ok(())
    }

    fn handle_object(&mut self, obis: String, value: String) {
        if let Some(entry) = self.values.get_mut(&obis) {
            if let Some(value) = obis_parser::postprocess_value(value, self.config.strip_unit, &self.config.value_allowed_chars) {
                debug!("{} = {}", obis, value);
                *entry = value;
            }
        }
    }

    fn verify_checksum(&mut self) -> Result<(), Iec62056Error> {
        if !self.config.verify_checksum {
            self.change_status(ReaderStatus::Ok);
            return Ok(());
        }

        /* Expecting ETX and then the checksum */
        let trailer = self.transport.read_exact(2, self.config.read_timeout())?;
        if trailer.len() != 2 || trailer[0] != ETX {
            error!("failed to read checksum (got {:02x?})", trailer);
            self.change_status(ReaderStatus::ProtocolError);
            return Ok(());
        }

        self.checksum ^= ETX;
        if self.checksum != trailer[1] {
            error!("checksum mismatch: {:02x} != {:02x}", self.checksum, trailer[1]);
            self.change_status(ReaderStatus::ChecksumError);
            return Ok(());
        }

        self.change_status(ReaderStatus::Ok); /* Data readout successful */
        Ok(())
    }

    fn fail_on_transport(&mut self, e: Iec62056Error) {
        error!("Serial transport failed: {}", e);
        self.change_status(ReaderStatus::ProtocolError);
    }

    fn change_status(&mut self, to: ReaderStatus) {
        self.counters.record(to);
        self.state = ReaderState::Finished(to);
        debug!("Status -> {}", to);
    }
}
