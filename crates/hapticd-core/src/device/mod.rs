//! Device capability interface and the registry of connected devices.

mod manager;
mod record;

pub use manager::DeviceManager;
pub use record::DeviceRecord;

use std::fmt;

use futures_util::future::BoxFuture;
use hapticd_types::{DeviceCommand, DeviceMessages, Message};

use crate::error::DeviceError;

/// Backend-scoped identity of a physical device (address, serial path, ...).
///
/// Two announcements with the same identity refer to the same hardware.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceIdentity(String);

impl DeviceIdentity {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceIdentity {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for DeviceIdentity {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// What the hub needs from a connected device.
///
/// Implementations own their transport. `handle_command` receives commands
/// that already passed capability and feature-range checks.
pub trait HapticDevice: Send + Sync + 'static {
    fn name(&self) -> &str;

    /// Supported command tags with per-command attributes.
    fn allowed_commands(&self) -> DeviceMessages;

    fn display_name(&self) -> Option<String> {
        None
    }

    fn message_timing_gap_ms(&self) -> u32 {
        0
    }

    fn handle_command(&self, command: DeviceCommand) -> BoxFuture<'_, Result<Message, DeviceError>>;

    fn disconnect(&self) -> BoxFuture<'_, ()>;
}
