//! Observer surface: every subscriber gets its own unbounded channel.

use std::sync::{Arc, Mutex};

use hapticd_types::{ErrorCode, LogLevel, Message};
use tokio::sync::mpsc;
use tracing::trace;

use crate::device::DeviceRecord;

/// Something that happened inside a server.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    ClientConnected {
        client_name: String,
        schema_version: u32,
    },
    MessageReceived(Message),
    DeviceAdded(DeviceRecord),
    DeviceRemoved {
        index: u32,
    },
    ScanningFinished,
    PingTimeout,
    Log {
        level: LogLevel,
        message: String,
    },
    ErrorRaised {
        code: ErrorCode,
        message: String,
    },
}

pub type EventReceiver = mpsc::UnboundedReceiver<ServerEvent>;

/// Fan-out of [`ServerEvent`]s. Clones share the same subscriber list.
#[derive(Debug, Clone, Default)]
pub struct EventBus {
    subscribers: Arc<Mutex<Vec<mpsc::UnboundedSender<ServerEvent>>>>,
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> EventReceiver {
        let (tx, rx) = mpsc::unbounded_channel();
        if let Ok(mut subscribers) = self.subscribers.lock() {
            subscribers.push(tx);
        }
        rx
    }

    /// Deliver `event` to every live subscriber, dropping closed ones.
    pub fn emit(&self, event: ServerEvent) {
        let Ok(mut subscribers) = self.subscribers.lock() else {
            return;
        };
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
        trace!("Event delivered to {} subscribers", subscribers.len());
    }

    pub fn log(&self, level: LogLevel, message: impl Into<String>) {
        self.emit(ServerEvent::Log {
            level,
            message: message.into(),
        });
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().map_or(0, |s| s.len())
    }
}
