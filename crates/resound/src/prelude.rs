// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Prelude module for convenient imports.
//!
//! ```rust
//! use resound::prelude::*;
//! ```

pub use crate::backend::{AudioBackend, BackendDevice};
pub use crate::config::StreamConfig;
pub use crate::core::rcu::Rcu;
pub use crate::device::{
    AudioDeviceInfo, AudioSubscriber, ClosureSubscriber, DeviceId, DeviceKind, DeviceManager,
    DeviceNotificationType, Role, SubscriberHandle, SubscriberSet,
};
pub use crate::error::{Error, Result};
pub use crate::logging::LogLevel;
