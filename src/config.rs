//! Kernel configuration
//!
//! Compile-time constants plus the small runtime [`Config`] handed to
//! [`crate::init`] and to the primitives that have a tunable behavior.

use log::LevelFilter;

use crate::types::Ticks;

/// Approximate number of ticks between two timer interrupts
pub const TIMER_PERIOD: Ticks = 500;

/// Bytes of console output retained in memory
pub const CONSOLE_CAPACITY: usize = 4096;

/// Longest single log line; longer records are truncated
pub const LOG_LINE_CAPACITY: usize = 256;

/// How a communicator pairs a speaker with a listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HandoffMode {
    /// `speak` returns only once a listener has withdrawn the word
    #[default]
    Rendezvous,
    /// `speak` returns as soon as the word sits in the free slot
    Slot,
}

/// Runtime configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Ticks added by each timer interrupt on the host machine
    pub timer_period: Ticks,
    /// Default handoff mode for new communicators
    pub handoff: HandoffMode,
    /// Maximum level forwarded to the console logger
    pub log_level: LevelFilter,
}

impl Config {
    /// Default configuration
    pub const fn new() -> Self {
        Self {
            timer_period: TIMER_PERIOD,
            handoff: HandoffMode::Rendezvous,
            log_level: LevelFilter::Info,
        }
    }

    /// Same configuration with a different timer period
    pub const fn with_timer_period(mut self, period: Ticks) -> Self {
        self.timer_period = period;
        self
    }

    /// Same configuration with a different handoff mode
    pub const fn with_handoff(mut self, handoff: HandoffMode) -> Self {
        self.handoff = handoff;
        self
    }

    /// Same configuration with a different log level
    pub const fn with_log_level(mut self, level: LevelFilter) -> Self {
        self.log_level = level;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.timer_period, 500);
        assert_eq!(config.handoff, HandoffMode::Rendezvous);
        assert_eq!(config.log_level, LevelFilter::Info);
    }

    #[test]
    fn test_builders() {
        let config = Config::new()
            .with_timer_period(100)
            .with_handoff(HandoffMode::Slot)
            .with_log_level(LevelFilter::Trace);
        assert_eq!(config.timer_period, 100);
        assert_eq!(config.handoff, HandoffMode::Slot);
        assert_eq!(config.log_level, LevelFilter::Trace);
    }
}
