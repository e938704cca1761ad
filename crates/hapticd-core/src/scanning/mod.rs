//! Scan backends and the coordinator that aggregates them.
//!
//! Backends never touch hub state directly. They report through a
//! [`BackendEventSender`], and a single pump task applies the events.

mod coordinator;

pub use coordinator::ScanCoordinator;

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::device::{DeviceIdentity, HapticDevice};
use crate::error::ScanError;

/// A pluggable source of devices (BLE adapter, serial ports, ...).
pub trait ScanBackend: Send + Sync + 'static {
    fn name(&self) -> &str;

    /// Called once when the backend is registered.
    fn attach(&self, events: BackendEventSender);

    /// Begin discovery. Found devices and the end of the scan are reported
    /// through the attached sender.
    ///
    /// # Errors
    ///
    /// Returns an error if discovery cannot start.
    fn start_scanning(&self) -> Result<(), ScanError>;

    /// # Errors
    ///
    /// Returns an error if discovery cannot be stopped.
    fn stop_scanning(&self) -> Result<(), ScanError>;

    fn is_scanning(&self) -> bool;
}

pub enum BackendEvent {
    DeviceFound {
        identity: DeviceIdentity,
        device: Arc<dyn HapticDevice>,
    },
    DeviceRemoved {
        identity: DeviceIdentity,
    },
    ScanningFinished,
}

impl fmt::Debug for BackendEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendEvent::DeviceFound { identity, device } => f
                .debug_struct("DeviceFound")
                .field("identity", identity)
                .field("name", &device.name())
                .finish(),
            BackendEvent::DeviceRemoved { identity } => f
                .debug_struct("DeviceRemoved")
                .field("identity", identity)
                .finish(),
            BackendEvent::ScanningFinished => f.write_str("ScanningFinished"),
        }
    }
}

/// An event tagged with the backend that raised it.
#[derive(Debug)]
pub struct BackendMessage {
    pub backend: usize,
    pub event: BackendEvent,
}

pub type BackendEventReceiver = mpsc::UnboundedReceiver<BackendMessage>;

/// Handle a backend uses to report events. Sends fail once the server is gone.
#[derive(Debug, Clone)]
pub struct BackendEventSender {
    backend: usize,
    tx: mpsc::UnboundedSender<BackendMessage>,
}

impl BackendEventSender {
    pub(crate) fn new(backend: usize, tx: mpsc::UnboundedSender<BackendMessage>) -> Self {
        Self { backend, tx }
    }

    /// Returns false if the receiving server has shut down.
    pub fn send(&self, event: BackendEvent) -> bool {
        self.tx
            .send(BackendMessage {
                backend: self.backend,
                event,
            })
            .is_ok()
    }

    pub fn device_found(
        &self,
        identity: impl Into<DeviceIdentity>,
        device: Arc<dyn HapticDevice>,
    ) -> bool {
        self.send(BackendEvent::DeviceFound {
            identity: identity.into(),
            device,
        })
    }

    pub fn device_removed(&self, identity: impl Into<DeviceIdentity>) -> bool {
        self.send(BackendEvent::DeviceRemoved {
            identity: identity.into(),
        })
    }

    pub fn scanning_finished(&self) -> bool {
        self.send(BackendEvent::ScanningFinished)
    }
}
