//! Optical readout of electricity meters speaking IEC 62056-21
//!
//! This library drives the readout state machine over a serial transport and
//! keeps the latest values of a configurable set of OBIS objects.

pub mod config;
pub mod metering_62056;
pub mod models;
pub mod obis_utils;
pub mod retry;

// Re-export common types for easier access
pub use config::{AppConfig, ReaderConfig};
pub use metering_62056::transport::{Clock, SerialTransport, SystemClock};
pub use metering_62056::{Iec62056Error, MeterReader, ReaderStatus};
pub use models::MeterReading;
pub use retry::{RetryDecision, RetryPolicy, RetryReason};

#[cfg(feature = "serial")]
pub use metering_62056::serial::SerialPortTransport;
