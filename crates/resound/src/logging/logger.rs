// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Global logger instance and initialization.
//!
//! Thread-safe singleton with lazy initialization; the logging macros are
//! no-ops until [`init_logger`] installs an output.

use super::output::{LogLevel, Output};
use parking_lot::Mutex;
use std::io;
use std::sync::{Arc, OnceLock};

static LOGGER: OnceLock<Arc<Mutex<GlobalLogger>>> = OnceLock::new();

/// Global logger state.
///
/// Manages the active output destination and log level filtering.
pub struct GlobalLogger {
    output: Option<Arc<dyn Output>>,
    level_filter: LogLevel,
}

impl GlobalLogger {
    fn new() -> Self {
        Self {
            output: None,
            level_filter: LogLevel::Info,
        }
    }

    /// Write a log message if logging is enabled and the level matches.
    fn log(&self, level: LogLevel, message: &str) -> io::Result<()> {
        if level < self.level_filter {
            return Ok(());
        }
        if let Some(ref output) = self.output {
            output.write(level, message)?;
        }
        Ok(())
    }

    fn flush(&self) -> io::Result<()> {
        if let Some(ref output) = self.output {
            output.flush()?;
        }
        Ok(())
    }
}

/// Initialize the global logger with the given output.
///
/// This function can only be called once. Subsequent calls are ignored.
/// Call this early in your application startup, before any logging macros.
///
/// # Example
/// ```ignore
/// use resound::logging::{init_logger, ConsoleOutput, LogLevel};
/// use std::sync::Arc;
///
/// init_logger(Arc::new(ConsoleOutput::new(LogLevel::Debug)), LogLevel::Debug);
/// ```
pub fn init_logger(output: Arc<dyn Output>, level: LogLevel) {
    let _ = LOGGER.get_or_init(|| {
        let mut logger = GlobalLogger::new();
        logger.output = Some(output);
        logger.level_filter = level;
        Arc::new(Mutex::new(logger))
    });
}

#[inline]
fn get_logger() -> Option<Arc<Mutex<GlobalLogger>>> {
    LOGGER.get().cloned()
}

/// Internal: execute a log operation with the global logger.
///
/// If the logger is not initialized this is a silent no-op. Called by the
/// logging macros; not part of the public API.
#[doc(hidden)]
#[inline]
pub fn log_message(level: LogLevel, message: &str) -> io::Result<()> {
    match get_logger() {
        Some(logger) => logger.lock().log(level, message),
        None => Ok(()),
    }
}

/// Flush the global logger's output.
///
/// Safe to call even if the logger was never initialized.
pub fn flush_logger() -> io::Result<()> {
    match get_logger() {
        Some(logger) => logger.lock().flush(),
        None => Ok(()),
    }
}
