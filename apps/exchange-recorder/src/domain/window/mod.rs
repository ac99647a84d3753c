//! Lookback windows for incremental polling streams.
//!
//! The first cycle of a stream asks for a wide window of history; every later
//! cycle asks only for a short recent window. The switch happens once, after
//! the first cycle attempt completes, whether or not it succeeded.
//!
//! A failed first cycle therefore leaves history between the wide and the
//! narrow window uncollected until the stream is rebuilt.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

/// Default lookback for the first cycle (5 hours).
pub const DEFAULT_FIRST_RUN_LOOKBACK: Duration = Duration::from_secs(5 * 60 * 60);

/// Default lookback for every later cycle.
pub const DEFAULT_STEADY_LOOKBACK: Duration = Duration::from_secs(120);

/// Lookback durations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowConfig {
    /// Lookback for the first cycle.
    pub first_run_lookback: Duration,
    /// Lookback for steady-state cycles.
    pub steady_lookback: Duration,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            first_run_lookback: DEFAULT_FIRST_RUN_LOOKBACK,
            steady_lookback: DEFAULT_STEADY_LOOKBACK,
        }
    }
}

/// Per-stream cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamState {
    /// True until the first cycle attempt completes.
    pub is_first_run: bool,
    /// Start of the most recently requested window.
    pub last_window_start: Option<DateTime<Utc>>,
}

impl Default for StreamState {
    fn default() -> Self {
        Self {
            is_first_run: true,
            last_window_start: None,
        }
    }
}

/// Computes window starts for one stream.
#[derive(Debug, Clone)]
pub struct WindowTracker {
    first_run_lookback: TimeDelta,
    steady_lookback: TimeDelta,
    state: StreamState,
}

impl WindowTracker {
    /// Create a tracker in its first-run state.
    #[must_use]
    pub fn new(config: WindowConfig) -> Self {
        Self {
            first_run_lookback: to_delta(config.first_run_lookback),
            steady_lookback: to_delta(config.steady_lookback),
            state: StreamState::default(),
        }
    }

    /// Window start for a cycle beginning at `now`.
    pub fn next_window_start(&mut self, now: DateTime<Utc>) -> DateTime<Utc> {
        let lookback = if self.state.is_first_run {
            self.first_run_lookback
        } else {
            self.steady_lookback
        };
        let start = now
            .checked_sub_signed(lookback)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        self.state.last_window_start = Some(start);
        start
    }

    /// Mark a cycle attempt as complete, leaving first-run mode.
    pub const fn complete_cycle(&mut self) {
        self.state.is_first_run = false;
    }

    /// Current cursor.
    #[must_use]
    pub const fn state(&self) -> &StreamState {
        &self.state
    }
}

fn to_delta(duration: Duration) -> TimeDelta {
    TimeDelta::from_std(duration).unwrap_or(TimeDelta::MAX)
}
