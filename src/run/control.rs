//! Stop-condition evaluation for one orchestrator run
//!
//! Pure counter/threshold bookkeeping, no I/O. Counters are scoped to one
//! run and never persisted.

use serde_json::{json, Value};
use std::time::Instant;

/// Configured quotas; `None` disables the corresponding check
#[derive(Debug, Clone, Copy, Default)]
pub struct RunLimits {
    /// Stop after this many records passed the gate
    pub limit_gated: Option<u32>,
    /// Stop after this many minutes of wall time
    pub stop_after_minutes: Option<u64>,
    /// Stop after this many total errors
    pub max_errors: Option<u32>,
    /// Stop after this many errors in a row with no success between
    pub max_consecutive_errors: Option<u32>,
    /// Stop after this many 403 responses
    pub max_403: Option<u32>,
    /// Stop after this many 429 responses
    pub max_429: Option<u32>,
    /// Re-raise per-id errors instead of absorbing them
    pub fail_fast: bool,
}

/// The first stop condition that triggered
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    GatedLimit(u32),
    TimeLimit(u64),
    ErrorLimit(u32),
    ConsecutiveErrors(u32),
    TooMany403(u32),
    TooMany429(u32),
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopReason::GatedLimit(n) => write!(f, "reached limit-gated={n}"),
            StopReason::TimeLimit(m) => write!(f, "reached stop-after-minutes={m}"),
            StopReason::ErrorLimit(n) => write!(f, "reached max-errors={n}"),
            StopReason::ConsecutiveErrors(n) => write!(f, "reached max-consecutive-errors={n}"),
            StopReason::TooMany403(n) => write!(f, "reached max-403={n}"),
            StopReason::TooMany429(n) => write!(f, "reached max-429={n}"),
        }
    }
}

/// Counter state and quota evaluation
#[derive(Debug)]
pub struct RunControl {
    limits: RunLimits,
    started_at: Instant,
    gated_count: u32,
    error_count: u32,
    consecutive_errors: u32,
    error_403_count: u32,
    error_429_count: u32,
}

impl RunControl {
    pub fn new(limits: RunLimits) -> Self {
        Self {
            limits,
            started_at: Instant::now(),
            gated_count: 0,
            error_count: 0,
            consecutive_errors: 0,
            error_403_count: 0,
            error_429_count: 0,
        }
    }

    pub fn fail_fast(&self) -> bool {
        self.limits.fail_fast
    }

    /// Checks each quota independently and returns the first triggered one.
    pub fn should_stop(&self) -> Option<StopReason> {
        if let Some(limit) = self.limits.limit_gated {
            if self.gated_count >= limit {
                return Some(StopReason::GatedLimit(limit));
            }
        }
        if let Some(minutes) = self.limits.stop_after_minutes {
            if self.started_at.elapsed().as_secs() >= minutes * 60 {
                return Some(StopReason::TimeLimit(minutes));
            }
        }
        if let Some(limit) = self.limits.max_errors {
            if self.error_count >= limit {
                return Some(StopReason::ErrorLimit(limit));
            }
        }
        if let Some(limit) = self.limits.max_consecutive_errors {
            if self.consecutive_errors >= limit {
                return Some(StopReason::ConsecutiveErrors(limit));
            }
        }
        if let Some(limit) = self.limits.max_403 {
            if self.error_403_count >= limit {
                return Some(StopReason::TooMany403(limit));
            }
        }
        if let Some(limit) = self.limits.max_429 {
            if self.error_429_count >= limit {
                return Some(StopReason::TooMany429(limit));
            }
        }
        None
    }

    /// Records a record that passed the gate; counts as a success for the
    /// consecutive-error streak.
    pub fn record_gated(&mut self) {
        self.gated_count += 1;
        self.consecutive_errors = 0;
    }

    pub fn record_error(&mut self, status_code: Option<u16>) {
        self.error_count += 1;
        self.consecutive_errors += 1;
        match status_code {
            Some(403) => self.error_403_count += 1,
            Some(429) => self.error_429_count += 1,
            _ => {}
        }
    }

    /// A success resets the consecutive-error streak.
    pub fn record_success(&mut self) {
        self.consecutive_errors = 0;
    }

    pub fn summary(&self) -> Value {
        json!({
            "elapsed_minutes": self.started_at.elapsed().as_secs_f64() / 60.0,
            "gated_count": self.gated_count,
            "error_count": self.error_count,
            "consecutive_errors": self.consecutive_errors,
            "error_403_count": self.error_403_count,
            "error_429_count": self.error_429_count,
        })
    }

    pub fn gated_count(&self) -> u32 {
        self.gated_count
    }

    pub fn error_403_count(&self) -> u32 {
        self.error_403_count
    }

    pub fn error_429_count(&self) -> u32 {
        self.error_429_count
    }
}
