// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Backend-neutral device descriptors.

use crate::config::DEVICE_ID_CAP;
use crate::error::{Error, Result};

/// Direction a device can serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    /// Output-only device.
    Playback,
    /// Input-only device.
    Capture,
    /// Device usable for simultaneous input and output.
    Duplex,
}

impl DeviceKind {
    /// True if the device can produce output.
    pub fn has_output(self) -> bool {
        matches!(self, Self::Playback | Self::Duplex)
    }

    /// True if the device can consume input.
    pub fn has_input(self) -> bool {
        matches!(self, Self::Capture | Self::Duplex)
    }
}

/// Opaque, bounded backend device identifier.
///
/// Backends stash whatever they need to re-open a device (GUID, port path,
/// object id) as an uninterpreted blob of at most
/// [`DEVICE_ID_CAP`](crate::config::DEVICE_ID_CAP) bytes.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct DeviceId {
    len: u16,
    bytes: [u8; DEVICE_ID_CAP],
}

impl DeviceId {
    /// Wrap an identifier blob.
    ///
    /// Fails with `InvalidConfiguration` when `bytes` exceeds the cap.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() > DEVICE_ID_CAP {
            return Err(Error::InvalidConfiguration(format!(
                "device id blob of {} bytes exceeds cap of {}",
                bytes.len(),
                DEVICE_ID_CAP
            )));
        }
        let mut id = Self {
            len: bytes.len() as u16,
            bytes: [0; DEVICE_ID_CAP],
        };
        id.bytes[..bytes.len()].copy_from_slice(bytes);
        Ok(id)
    }

    /// The identifier blob.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }
}

impl std::fmt::Debug for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DeviceId({} bytes", self.len)?;
        for byte in self.as_bytes().iter().take(8) {
            write!(f, " {:02x}", byte)?;
        }
        if self.len > 8 {
            write!(f, " ..")?;
        }
        write!(f, ")")
    }
}

/// Backend-neutral device descriptor returned by enumeration.
#[derive(Debug, Clone)]
pub struct AudioDeviceInfo {
    /// Display name (UTF-8).
    pub name: String,
    /// Direction the device serves.
    pub kind: DeviceKind,
    /// Every sample rate the backend reports as supported.
    pub sample_rates: Vec<u32>,
    /// Opaque identifier to hand back to `initialise`.
    pub id: DeviceId,
}

impl AudioDeviceInfo {
    /// True if the backend supports `rate` on this device.
    pub fn supports_rate(&self, rate: u32) -> bool {
        self.sample_rates.contains(&rate)
    }
}
