// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error types for resound operations.
//!
//! Control-thread operations report errors synchronously through [`Result`].
//! Errors raised on a backend audio thread never cross the trampoline
//! boundary: they are converted to log entries and the affected buffer is
//! silenced instead.

use crate::device::Role;

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by resound operations.
///
/// # Example
///
/// ```rust,no_run
/// use resound::{DeviceManager, Error, Role};
/// use resound::backend::null::NullBackend;
///
/// let manager = DeviceManager::new(Box::new(NullBackend::new()));
///
/// match manager.start_role(Role::Playback) {
///     Err(Error::NotInitialised(role)) => println!("{} not initialised", role),
///     Err(e) => println!("Other error: {}", e),
///     Ok(()) => println!("Running"),
/// }
/// ```
#[derive(Debug)]
pub enum Error {
    // ========================================================================
    // Initialisation Errors
    // ========================================================================
    /// Backend driver context could not be created or is unusable.
    BackendInitFailed(String),
    /// Requested device identifier does not match any enumerated device.
    DeviceNotFound(String),
    /// Backend rejected the requested sample rate / channel layout.
    FormatUnsupported(String),
    /// Invalid device-manager configuration (e.g. neither input nor output
    /// device supplied, oversized device identifier).
    InvalidConfiguration(String),

    // ========================================================================
    // Lifecycle Errors
    // ========================================================================
    /// Reconfiguration attempted while the role is running.
    AlreadyRunning(Role),
    /// Start requested on a role that has not been initialised.
    NotInitialised(Role),

    // ========================================================================
    // Resource Errors
    // ========================================================================
    /// Out of memory during version clone or reader registration.
    OutOfMemory,
    /// Subscriber `prepare` rejected the stream parameters; the subscriber
    /// was not added to the set.
    SubscriberPrepareFailed(String),

    // ========================================================================
    // Runtime Errors
    // ========================================================================
    /// Backend runtime failure, surfaced as a notification and logged.
    BackendRuntime(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            // Initialisation
            Error::BackendInitFailed(msg) => write!(f, "Backend init failed: {}", msg),
            Error::DeviceNotFound(msg) => write!(f, "Device not found: {}", msg),
            Error::FormatUnsupported(msg) => write!(f, "Format unsupported: {}", msg),
            Error::InvalidConfiguration(msg) => write!(f, "Invalid configuration: {}", msg),
            // Lifecycle
            Error::AlreadyRunning(role) => {
                write!(f, "Role {} is running; stop it before reconfiguring", role)
            }
            Error::NotInitialised(role) => write!(f, "Role {} is not initialised", role),
            // Resource
            Error::OutOfMemory => write!(f, "Out of memory"),
            Error::SubscriberPrepareFailed(msg) => {
                write!(f, "Subscriber prepare failed: {}", msg)
            }
            // Runtime
            Error::BackendRuntime(msg) => write!(f, "Backend runtime error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}
