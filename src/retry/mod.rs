//! Host-side backoff between failed readouts.
//!
//! The delay grows by `multiplier` for every consecutive failure with the same
//! reason and starts over when the reason changes. Once it would exceed
//! `max_secs` the policy resets and asks the host to restart instead.

use crate::config::RetryConfig;
use log::{info, warn};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryReason {
    None,
    MeterError,
    TransmitError,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RetryDecision {
    Wait(Duration),
    /// Backoff exhausted, reopen everything
    Restart,
}

pub struct RetryPolicy {
    config: RetryConfig,
    last_reason: RetryReason,
    delay_secs: f64,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        let delay_secs = config.initial_secs;
        Self {
            config,
            last_reason: RetryReason::None,
            delay_secs,
        }
    }

    pub fn next(&mut self, reason: RetryReason) -> RetryDecision {
        if self.last_reason != reason {
            self.delay_secs = self.config.initial_secs;
        }
        self.last_reason = reason;
        self.delay_secs *= self.config.multiplier;

        if self.delay_secs > self.config.max_secs {
            warn!("Enough retries ({:?}), restarting", reason);
            self.reset();
            return RetryDecision::Restart;
        }

        info!("Retrying in {:.1} seconds ({:?})", self.delay_secs, reason);
        RetryDecision::Wait(Duration::from_secs_f64(self.delay_secs))
    }

    pub fn reset(&mut self) {
        self.last_reason = RetryReason::None;
        self.delay_secs = self.config.initial_secs;
    }
}
