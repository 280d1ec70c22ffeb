//! Application-level configuration section

use crate::validation::{ConfigSection, ValidationError, Validator};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Log level for application logging
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Error => write!(f, "error"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Trace => write!(f, "trace"),
        }
    }
}

/// Loop timing and run-mode settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// Log level for application output
    pub log_level: LogLevel,

    /// Verbose logging; fatal errors surface with full context
    pub debug: bool,

    /// Test mode (no destructive on-complete actions unless configured)
    pub test: bool,

    /// Stop after this many cycles (test harness only)
    pub max_loops: Option<u32>,

    /// Sleep between cycles, in seconds
    pub sleep_time_secs: u64,

    /// A directory modified within this many seconds is still being copied
    pub wait_time_secs: u64,

    /// Poll interval while waiting for the inbox to settle, in milliseconds
    pub settle_poll_ms: u64,
}

impl AppConfig {
    pub fn sleep_time(&self) -> Duration {
        Duration::from_secs(self.sleep_time_secs)
    }

    pub fn wait_time(&self) -> Duration {
        Duration::from_secs(self.wait_time_secs)
    }

    pub fn settle_poll(&self) -> Duration {
        Duration::from_millis(self.settle_poll_ms)
    }

    /// Effective log filter, `debug` wins over the configured level
    pub fn effective_log_level(&self) -> LogLevel {
        if self.debug && self.log_level != LogLevel::Trace {
            LogLevel::Debug
        } else {
            self.log_level
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            debug: false,
            test: false,
            max_loops: None,
            sleep_time_secs: 10,
            wait_time_secs: 5,
            settle_poll_ms: 500,
        }
    }
}

impl ConfigSection for AppConfig {
    fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut results = vec![
            Validator::in_range(self.sleep_time_secs, 0, 24 * 60 * 60, "app.sleep_time_secs"),
            Validator::in_range(self.wait_time_secs, 0, 60 * 60, "app.wait_time_secs"),
            Validator::in_range(self.settle_poll_ms, 10, 60_000, "app.settle_poll_ms"),
        ];

        if self.max_loops == Some(0) {
            results.push(Err(ValidationError::new(
                "app.max_loops",
                "must be at least 1 when set",
            )));
        }

        Validator::collect_errors(results)
    }

    fn merge(&mut self, other: Self) {
        self.log_level = other.log_level;
        self.debug = other.debug;
        self.test = other.test;
        self.max_loops = other.max_loops;
        self.sleep_time_secs = other.sleep_time_secs;
        self.wait_time_secs = other.wait_time_secs;
        self.settle_poll_ms = other.settle_poll_ms;
    }

    fn section_name(&self) -> &'static str {
        "app"
    }
}
