//! The server facade: wire text in, wire text out.
//!
//! Inbound batches are serialized by an async gate. Session, device and scan
//! state each sit behind their own short synchronous lock, so backend events
//! and the ping watchdog never wait on a batch in progress.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use hapticd_proto::{CURRENT_SCHEMA_VERSION, codec, registry};
use hapticd_types::{
    DeviceCommand, DeviceList, ErrorCode, LogLevel, Message, MessageKind, SYSTEM_MESSAGE_ID,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{PingResetPolicy, ServerConfig};
use crate::device::DeviceManager;
use crate::error::{Error, Result, ScanError};
use crate::events::{EventBus, EventReceiver, ServerEvent};
use crate::ping::{Liveness, PingSupervisor};
use crate::scanning::{ScanBackend, ScanCoordinator};
use crate::session::{Session, TeardownReason};

struct Inner {
    config: ServerConfig,
    gate: tokio::sync::Mutex<()>,
    session: Mutex<Session>,
    devices: Arc<DeviceManager>,
    scanning: Arc<ScanCoordinator>,
    events: EventBus,
    liveness: Liveness,
    ping: Mutex<Option<PingSupervisor>>,
    cancel: CancellationToken,
    closed: AtomicBool,
}

/// One client session over any number of scan backends.
#[derive(Clone)]
pub struct HapticServer {
    inner: Arc<Inner>,
}

impl HapticServer {
    /// Build a server and start its backend event pump.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime, or if the schema registry
    /// is inconsistent.
    #[must_use]
    pub fn new(config: ServerConfig) -> Self {
        debug!("Schema registry holds {} shapes", registry().len());

        let events = EventBus::new();
        let cancel = CancellationToken::new();
        let devices = Arc::new(DeviceManager::new(events.clone(), cancel.clone()));
        let (scanning, backend_rx) = ScanCoordinator::new(events.clone());
        let scanning = Arc::new(scanning);

        tokio::spawn(Arc::clone(&scanning).run_pump(
            backend_rx,
            Arc::clone(&devices),
            cancel.clone(),
        ));

        Self {
            inner: Arc::new(Inner {
                config,
                gate: tokio::sync::Mutex::new(()),
                session: Mutex::new(Session::new()),
                devices,
                scanning,
                events,
                liveness: Liveness::new(),
                ping: Mutex::new(None),
                cancel,
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub fn add_backend(&self, backend: Arc<dyn ScanBackend>) -> usize {
        self.inner.scanning.register_backend(backend)
    }

    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn devices(&self) -> &DeviceManager {
        &self.inner.devices
    }

    #[must_use]
    pub fn is_scanning(&self) -> bool {
        self.inner.scanning.is_scanning()
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.inner.session().is_ready()
    }

    #[must_use]
    pub fn negotiated_version(&self) -> Option<u32> {
        self.inner.session().negotiated_version()
    }

    #[must_use]
    pub fn session(&self) -> Session {
        self.inner.session().clone()
    }

    pub fn subscribe(&self) -> EventReceiver {
        self.inner.events.subscribe()
    }

    /// Handle one wire payload and return the replies, one per element.
    pub async fn process_text(&self, text: &str) -> String {
        let _gate = self.inner.gate.lock().await;

        let mut replies = Vec::new();
        for decoded in codec::deserialize(text) {
            let reply = match decoded {
                Ok(message) => self.inner.handle(message).await,
                Err(e) => {
                    warn!("Rejected inbound element: {e}");
                    self.inner.raise(e.error_code(), e.to_string());
                    e.to_message()
                }
            };
            replies.push(reply);
        }

        self.inner.encode_replies(replies)
    }

    /// Handle one already-decoded message.
    pub async fn process_message(&self, message: Message) -> Message {
        let _gate = self.inner.gate.lock().await;
        self.inner.handle(message).await
    }

    /// Wire text for an unsolicited event at the negotiated version.
    ///
    /// Returns `None` before the handshake, for events without a wire form,
    /// and for log records below the client's requested level.
    #[must_use]
    pub fn encode_event(&self, event: &ServerEvent) -> Option<String> {
        let (version, log_level) = {
            let session = self.inner.session();
            (session.negotiated_version()?, session.log_level())
        };

        let message: Message = match event {
            ServerEvent::DeviceAdded(record) => hapticd_types::DeviceAdded::from_info(
                SYSTEM_MESSAGE_ID,
                record.filtered_for(version).to_info(),
            )
            .into(),
            ServerEvent::DeviceRemoved { index } => hapticd_types::DeviceRemoved {
                id: SYSTEM_MESSAGE_ID,
                device_index: *index,
            }
            .into(),
            ServerEvent::ScanningFinished => hapticd_types::ScanningFinished {
                id: SYSTEM_MESSAGE_ID,
            }
            .into(),
            ServerEvent::PingTimeout => Error::PingTimeout.to_message(SYSTEM_MESSAGE_ID),
            ServerEvent::Log { level, message } if log_level.allows(*level) => {
                hapticd_types::Log {
                    id: SYSTEM_MESSAGE_ID,
                    log_level: *level,
                    log_message: message.clone(),
                }
                .into()
            }
            _ => return None,
        };

        let batch = codec::serialize(&[message], version);
        if let Some(failure) = batch.failures.first() {
            warn!("Cannot send event at schema {version}: {failure}");
            return None;
        }
        Some(batch.text)
    }

    /// Stop everything this server started. Safe to call more than once.
    pub async fn shutdown(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Shutting down server");

        let ping = self.inner.ping().take();
        if let Some(ping) = ping {
            ping.stop();
        }
        self.inner.session().tear_down(TeardownReason::Shutdown);
        self.inner.halt().await;
        self.inner.devices.disconnect_all().await;
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        // Stops the backend pump when the last handle goes away.
        self.cancel.cancel();
    }
}

impl Inner {
    fn session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ping(&self) -> MutexGuard<'_, Option<PingSupervisor>> {
        self.ping.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn raise(&self, code: ErrorCode, message: String) {
        self.events.emit(ServerEvent::ErrorRaised { code, message });
    }

    async fn handle(self: &Arc<Self>, message: Message) -> Message {
        let id = message.id();
        let kind = message.kind();
        debug!("Received {kind} (id {id})");
        self.events
            .emit(ServerEvent::MessageReceived(message.clone()));

        match self.route(message).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!("[{kind} {id}] {e}");
                self.raise(e.error_code(), e.to_string());
                e.to_message(id)
            }
        }
    }

    async fn route(self: &Arc<Self>, message: Message) -> Result<Message> {
        let id = message.id();
        let kind = message.kind();
        let is_handshake = matches!(
            kind,
            MessageKind::RequestServerInfo | MessageKind::RequestServerInfoV0
        );

        // State gates come first: ERROR_INIT before the handshake, the
        // teardown error after it.
        let version = {
            let session = self.session();
            session.check_open()?;
            if !is_handshake {
                session.require_ready()?;
            }
            session.wire_version()
        };

        if !codec::accepts_from_client(kind) {
            return Err(Error::ServerOnly(kind.tag()));
        }
        if id == SYSTEM_MESSAGE_ID {
            return Err(Error::ReservedId);
        }

        if kind == MessageKind::Ping
            || self.config.ping_reset_policy == PingResetPolicy::AnyMessage
        {
            self.liveness.touch();
        }

        let required = registry().schema_version(kind);
        if !is_handshake && required > version {
            return Err(Error::VersionTooNew {
                tag: kind.tag(),
                required,
                negotiated: version,
            });
        }

        match message {
            // No MessageVersion: the client takes whatever the server speaks.
            Message::RequestServerInfoV0(m) => {
                self.handshake(id, &m.client_name, CURRENT_SCHEMA_VERSION)
            }
            Message::RequestServerInfo(m) => {
                self.handshake(id, &m.client_name, m.message_version)
            }
            Message::Ping(_) => Ok(Message::ok(id)),
            Message::Test(m) => Ok(Message::Test(m)),
            Message::RequestLog(m) => {
                self.session().set_log_level(m.log_level);
                Ok(Message::ok(id))
            }
            Message::StartScanning(_) => {
                self.scanning.start_scanning_all()?;
                Ok(Message::ok(id))
            }
            Message::StopScanning(_) => {
                self.scanning.stop_scanning_all()?;
                Ok(Message::ok(id))
            }
            Message::RequestDeviceList(_) => {
                let devices = self
                    .devices
                    .list_devices()
                    .iter()
                    .map(|record| record.filtered_for(version).to_info())
                    .collect();
                Ok(DeviceList { id, devices }.into())
            }
            Message::StopAllDevices(_) => {
                self.devices.stop_all_devices().await?;
                Ok(Message::ok(id))
            }
            other => match DeviceCommand::try_from(other) {
                Ok(command) => Ok(self.devices.dispatch(command).await?),
                Err(other) => Err(Error::UnexpectedMessage(other.kind().tag())),
            },
        }
    }

    fn handshake(self: &Arc<Self>, id: u32, client_name: &str, requested: u32) -> Result<Message> {
        let info = self
            .session()
            .handshake(id, client_name, requested, &self.config)?;
        let schema_version = info.message_version;
        info!("Client {client_name} connected at schema {schema_version}");

        if self.config.max_ping_time_ms > 0 {
            self.arm_ping();
        }

        self.events.emit(ServerEvent::ClientConnected {
            client_name: client_name.to_string(),
            schema_version,
        });
        self.events.log(
            LogLevel::Info,
            format!("Client {client_name} connected"),
        );
        Ok(info.into())
    }

    fn arm_ping(self: &Arc<Self>) {
        self.liveness.touch();
        let max = Duration::from_millis(u64::from(self.config.max_ping_time_ms));
        let weak = Arc::downgrade(self);
        let supervisor = PingSupervisor::spawn(max, self.liveness.clone(), move || {
            if let Some(inner) = weak.upgrade() {
                inner.on_ping_timeout();
            }
        });
        if let Some(previous) = self.ping().replace(supervisor) {
            previous.stop();
        }
        debug!("Ping watchdog armed at {}ms", max.as_millis());
    }

    fn on_ping_timeout(self: Arc<Self>) {
        if !self.session().tear_down(TeardownReason::PingTimeout) {
            return;
        }
        error!("Ping timeout, tearing down session");
        self.events.emit(ServerEvent::PingTimeout);
        self.raise(ErrorCode::Ping, Error::PingTimeout.to_string());

        tokio::spawn(async move {
            self.halt().await;
        });
    }

    /// Stop scanning, cancel in-flight work, then stop every device.
    ///
    /// Backends are stopped before the pump is cancelled so their finishes
    /// are still queued when it settles.
    async fn halt(&self) {
        match self.scanning.stop_scanning_all() {
            Ok(()) | Err(ScanError::NoBackends) => {}
            Err(e) => warn!("Failed to stop scanning: {e}"),
        }
        self.cancel.cancel();

        if let Err(e) = self.devices.stop_all_devices().await {
            warn!("{e}");
        }
    }

    fn encode_replies(&self, replies: Vec<Message>) -> String {
        let version = self.session().wire_version();
        let replies: Vec<Message> = replies
            .into_iter()
            .map(|reply| {
                codec::downgrade(reply, version).unwrap_or_else(|e| {
                    warn!("Reply not representable at schema {version}: {e}");
                    e.to_message()
                })
            })
            .collect();
        codec::serialize(&replies, version).text
    }
}
