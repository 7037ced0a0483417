use serde::Serialize;
use std::fmt;

/// Outcome of the current or last readout cycle.
///
/// Everything except `Ready` and `Busy` is terminal for a cycle. Terminal values
/// stay until `MeterReader::acknowledge` is called or the next cycle starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ReaderStatus {
    Ready,
    Busy,
    Ok,
    TimeoutError,
    IdentificationError,
    IdentificationMismatch,
    ProtocolError,
    ChecksumError,
}

impl ReaderStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ReaderStatus::Ready | ReaderStatus::Busy)
    }

    pub fn is_error(&self) -> bool {
        self.is_terminal() && *self != ReaderStatus::Ok
    }

    /// Short label that fits a small display line
    pub fn short_label(&self) -> &'static str {
        match self {
            ReaderStatus::Ready => "Ready",
            ReaderStatus::Busy => "Busy",
            ReaderStatus::Ok => "Ok",
            ReaderStatus::TimeoutError => "Timeout",
            ReaderStatus::IdentificationError => "Err-Idn-1",
            ReaderStatus::IdentificationMismatch => "Err-Idn-2",
            ReaderStatus::ProtocolError => "Err-Prot",
            ReaderStatus::ChecksumError => "Err-Chk",
        }
    }
}

impl fmt::Display for ReaderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReaderStatus::Ready => "ready",
            ReaderStatus::Busy => "busy",
            ReaderStatus::Ok => "ok",
            ReaderStatus::TimeoutError => "timeout",
            ReaderStatus::IdentificationError => "identification error",
            ReaderStatus::IdentificationMismatch => "identification mismatch",
            ReaderStatus::ProtocolError => "protocol error",
            ReaderStatus::ChecksumError => "checksum error",
        };
        f.write_str(name)
    }
}

/// Position inside a busy cycle. Each variant names what has already happened,
/// the next `poll()` call performs the action that follows it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Started,
    RequestSent,
    IdentificationRead { mode_char: u8 },
    InData,
    AfterData,
}

/// Driver state as a sum type: a step only exists while a cycle is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReaderState {
    Ready,
    Busy(Step),
    Finished(ReaderStatus),
}

impl ReaderState {
    pub(crate) fn status(&self) -> ReaderStatus {
        match self {
            ReaderState::Ready => ReaderStatus::Ready,
            ReaderState::Busy(_) => ReaderStatus::Busy,
            ReaderState::Finished(status) => *status,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BaudSwitchParameters {
    pub send_acknowledgement: bool,
    /// `None` keeps (or returns to) the initial rate
    pub new_baud: Option<u32>,
}

/// Lifetime counters, one bucket per class of terminal status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReadoutCounters {
    pub errors: usize,
    pub checksum_errors: usize,
    pub successes: usize,
}

impl ReadoutCounters {
    pub(crate) fn record(&mut self, status: ReaderStatus) {
        match status {
            ReaderStatus::TimeoutError
            | ReaderStatus::IdentificationError
            | ReaderStatus::IdentificationMismatch
            | ReaderStatus::ProtocolError => self.errors += 1,
            ReaderStatus::ChecksumError => self.checksum_errors += 1,
            ReaderStatus::Ok => self.successes += 1,
            ReaderStatus::Ready | ReaderStatus::Busy => {}
        }
    }

    pub fn total(&self) -> usize {
        self.errors + self.checksum_errors + self.successes
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MeterIdentification {
    pub manufacturer: String,
    pub mode_char: char,
    pub identification: String,
}
