//! Session engine for the hapticd device hub.
//!
//! [`HapticServer`] owns one client session: it gates traffic on the
//! handshake, routes commands to devices, aggregates scan backends and
//! enforces the ping interval.

pub mod config;
pub mod device;
pub mod scanning;
pub mod simulated;

mod error;
mod events;
mod ping;
mod server;
mod session;

#[cfg(test)]
mod tests;

pub use device::{DeviceIdentity, DeviceManager, DeviceRecord, HapticDevice};
pub use error::{DeviceError, Error, HandshakeError, Result, ScanError};
pub use events::{EventBus, EventReceiver, ServerEvent};
pub use ping::{Liveness, PingSupervisor};
pub use scanning::{BackendEvent, BackendEventSender, ScanBackend, ScanCoordinator};
pub use server::HapticServer;
pub use session::{HandshakeState, Session, TeardownReason};

pub use hapticd_types::*;
