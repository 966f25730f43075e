// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Logging output backends (console and user callback).
//!
//! [`LogLevel`] and [`Output`] are compiled unconditionally: the device
//! manager's log-callback slot and the backend adapter contract both carry
//! levels even when the `logging` feature (and thus the macros and the
//! global logger) is disabled.

use std::io::{self, Write};

/// Log level enumeration for filtering and display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    /// Debug: detailed development information
    Debug = 0,
    /// Info: general information about normal operation
    Info = 1,
    /// Warning: potentially harmful situations
    Warning = 2,
    /// Error: error conditions
    Error = 3,
}

impl LogLevel {
    /// Returns the string representation of the log level.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO ",
            Self::Warning => "WARN ",
            Self::Error => "ERROR",
        }
    }
}

/// Output destination trait for log messages.
///
/// Implementations must be thread-safe: log entries can originate from
/// control threads and from backend audio threads (error containment path).
pub trait Output: Send + Sync {
    /// Write a formatted log message to the output.
    fn write(&self, level: LogLevel, message: &str) -> io::Result<()>;

    /// Flush any buffered output.
    fn flush(&self) -> io::Result<()>;
}

/// Console output implementation.
///
/// Writes directly to stderr with a level prefix and newline.
pub struct ConsoleOutput {
    level_filter: LogLevel,
}

impl ConsoleOutput {
    /// Create a new console output with the specified minimum level.
    pub fn new(level_filter: LogLevel) -> Self {
        Self { level_filter }
    }
}

impl Output for ConsoleOutput {
    fn write(&self, level: LogLevel, message: &str) -> io::Result<()> {
        if level < self.level_filter {
            return Ok(());
        }
        eprint!("[{}] {}\n", level.as_str(), message);
        Ok(())
    }

    fn flush(&self) -> io::Result<()> {
        io::stderr().flush()
    }
}

/// Callback output implementation.
///
/// Forwards every entry to an application-supplied closure. This is how the
/// global logger can be routed into the same sink as
/// `DeviceManager::set_log_callback`.
pub struct CallbackOutput {
    callback: Box<dyn Fn(LogLevel, &str) + Send + Sync>,
}

impl CallbackOutput {
    /// Create a callback output from a closure.
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(LogLevel, &str) + Send + Sync + 'static,
    {
        Self {
            callback: Box::new(callback),
        }
    }
}

impl Output for CallbackOutput {
    fn write(&self, level: LogLevel, message: &str) -> io::Result<()> {
        (self.callback)(level, message);
        Ok(())
    }

    fn flush(&self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_log_level_ordering() {
        assert!(LogLevel::Debug < LogLevel::Info);
        assert!(LogLevel::Info < LogLevel::Warning);
        assert!(LogLevel::Warning < LogLevel::Error);
    }

    #[test]
    fn test_log_level_str() {
        assert_eq!(LogLevel::Debug.as_str(), "DEBUG");
        assert_eq!(LogLevel::Error.as_str(), "ERROR");
    }

    #[test]
    fn test_console_output_creation() {
        let output = ConsoleOutput::new(LogLevel::Info);
        assert!(output.write(LogLevel::Error, "test").is_ok());
        assert!(output.flush().is_ok());
    }

    #[test]
    fn test_callback_output_receives_entries() {
        let count = Arc::new(AtomicU32::new(0));
        let count_clone = count.clone();
        let output = CallbackOutput::new(move |_level, _message| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });

        output.write(LogLevel::Info, "one").expect("write failed");
        output.write(LogLevel::Error, "two").expect("write failed");
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }
}
