//! In-process backend and device used for tests and `--simulate` mode.
//!
//! Devices accept every command their capabilities list, remember what they
//! received, and answer readings with fixed values.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use hapticd_types::{
    BatteryLevelReading, DeviceCommand, DeviceMessages, Message, MessageAttributes, MessageKind,
    RssiLevelReading,
};
use tracing::debug;

use crate::config::{SimulatedDeviceConfig, SimulationConfig};
use crate::device::{DeviceIdentity, HapticDevice};
use crate::error::{DeviceError, ScanError};
use crate::scanning::{BackendEventSender, ScanBackend};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug)]
pub struct SimulatedDevice {
    name: String,
    display_name: Option<String>,
    message_timing_gap_ms: u32,
    commands: DeviceMessages,
    battery_level: f64,
    rssi_level: i32,
    latency: Option<Duration>,
    received: Mutex<Vec<DeviceCommand>>,
    failing: AtomicBool,
    connected: AtomicBool,
}

impl SimulatedDevice {
    /// A device that only understands `StopDeviceCmd`.
    #[must_use]
    pub fn new(name: &str) -> Self {
        let mut commands = DeviceMessages::new();
        commands.insert(
            MessageKind::StopDeviceCmd.tag().to_string(),
            MessageAttributes::default(),
        );
        Self {
            name: name.to_string(),
            display_name: None,
            message_timing_gap_ms: 0,
            commands,
            battery_level: 1.0,
            rssi_level: -50,
            latency: None,
            received: Mutex::new(Vec::new()),
            failing: AtomicBool::new(false),
            connected: AtomicBool::new(true),
        }
    }

    #[must_use]
    pub fn from_config(config: &SimulatedDeviceConfig) -> Self {
        let mut device = Self::new(&config.name)
            .with_vibrators(config.vibrators)
            .with_rotators(config.rotators)
            .with_linears(config.linears)
            .with_timing_gap(config.message_timing_gap_ms);
        device.display_name.clone_from(&config.display_name);
        if config.battery {
            device = device.with_battery(0.9);
        }
        if config.rssi {
            device = device.with_rssi(-60);
        }
        device
    }

    #[must_use]
    pub fn with_command(mut self, tag: &str, attributes: MessageAttributes) -> Self {
        self.commands.insert(tag.to_string(), attributes);
        self
    }

    fn with_features(self, kind: MessageKind, count: u32) -> Self {
        if count == 0 {
            return self;
        }
        self.with_command(kind.tag(), MessageAttributes::with_features(count))
    }

    #[must_use]
    pub fn with_vibrators(self, count: u32) -> Self {
        self.with_features(MessageKind::VibrateCmd, count)
    }

    #[must_use]
    pub fn with_rotators(self, count: u32) -> Self {
        self.with_features(MessageKind::RotateCmd, count)
    }

    #[must_use]
    pub fn with_linears(self, count: u32) -> Self {
        self.with_features(MessageKind::LinearCmd, count)
    }

    #[must_use]
    pub fn with_battery(mut self, level: f64) -> Self {
        self.battery_level = level;
        self.with_command(
            MessageKind::BatteryLevelCmd.tag(),
            MessageAttributes::default(),
        )
    }

    #[must_use]
    pub fn with_rssi(mut self, level: i32) -> Self {
        self.rssi_level = level;
        self.with_command(MessageKind::RssiLevelCmd.tag(), MessageAttributes::default())
    }

    #[must_use]
    pub fn with_display_name(mut self, name: &str) -> Self {
        self.display_name = Some(name.to_string());
        self
    }

    #[must_use]
    pub fn with_timing_gap(mut self, gap_ms: u32) -> Self {
        self.message_timing_gap_ms = gap_ms;
        self
    }

    /// Delay every command reply by `latency`.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Commands accepted so far, oldest first.
    #[must_use]
    pub fn received(&self) -> Vec<DeviceCommand> {
        lock(&self.received).clone()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn reply(&self, command: &DeviceCommand) -> Result<Message, DeviceError> {
        match command {
            DeviceCommand::BatteryLevel(cmd) => {
                BatteryLevelReading::new(cmd.id, cmd.device_index, self.battery_level)
                    .map(Message::from)
                    .map_err(|e| DeviceError::Failed(e.to_string()))
            }
            DeviceCommand::RssiLevel(cmd) => Ok(RssiLevelReading {
                id: cmd.id,
                device_index: cmd.device_index,
                rssi_level: self.rssi_level,
            }
            .into()),
            other => Ok(Message::ok(other.id())),
        }
    }
}

impl HapticDevice for SimulatedDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn allowed_commands(&self) -> DeviceMessages {
        self.commands.clone()
    }

    fn display_name(&self) -> Option<String> {
        self.display_name.clone()
    }

    fn message_timing_gap_ms(&self) -> u32 {
        self.message_timing_gap_ms
    }

    fn handle_command(&self, command: DeviceCommand) -> BoxFuture<'_, Result<Message, DeviceError>> {
        async move {
            if let Some(latency) = self.latency {
                tokio::time::sleep(latency).await;
            }
            if !self.is_connected() {
                return Err(DeviceError::Disconnected(command.device_index()));
            }
            if self.failing.load(Ordering::SeqCst) {
                return Err(DeviceError::Failed(format!(
                    "{} rejected {}",
                    self.name,
                    command.tag()
                )));
            }

            let reply = self.reply(&command)?;
            lock(&self.received).push(command);
            Ok(reply)
        }
        .boxed()
    }

    fn disconnect(&self) -> BoxFuture<'_, ()> {
        async move {
            self.connected.store(false, Ordering::SeqCst);
            debug!("[sim] {} disconnected", self.name);
        }
        .boxed()
    }
}

/// Backend that "discovers" a fixed set of simulated devices on every scan.
pub struct SimulatedBackend {
    name: String,
    devices: Mutex<Vec<(DeviceIdentity, Arc<SimulatedDevice>)>>,
    sender: Mutex<Option<BackendEventSender>>,
    scanning: AtomicBool,
    finish_after_discovery: bool,
    fail_start: AtomicBool,
}

impl SimulatedBackend {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            devices: Mutex::new(Vec::new()),
            sender: Mutex::new(None),
            scanning: AtomicBool::new(false),
            finish_after_discovery: false,
            fail_start: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn from_config(name: &str, config: &SimulationConfig) -> Self {
        let backend = Self::new(name);
        for device in &config.devices {
            backend.add_device(
                device.identity.as_str(),
                Arc::new(SimulatedDevice::from_config(device)),
            );
        }
        backend
    }

    #[must_use]
    pub fn with_device(self, identity: &str, device: Arc<SimulatedDevice>) -> Self {
        self.add_device(identity, device);
        self
    }

    /// Report `ScanningFinished` right after announcing devices.
    #[must_use]
    pub fn finishing_after_discovery(mut self) -> Self {
        self.finish_after_discovery = true;
        self
    }

    /// Make a device discoverable on the next scan.
    pub fn add_device(&self, identity: &str, device: Arc<SimulatedDevice>) {
        lock(&self.devices).push((DeviceIdentity::new(identity), device));
    }

    pub fn set_fail_start(&self, fail: bool) {
        self.fail_start.store(fail, Ordering::SeqCst);
    }

    fn sender(&self) -> Option<BackendEventSender> {
        lock(&self.sender).clone()
    }

    /// End the current scan as if the hardware timed out.
    pub fn finish_scan(&self) {
        if self.scanning.swap(false, Ordering::SeqCst) {
            if let Some(sender) = self.sender() {
                sender.scanning_finished();
            }
        }
    }

    /// Drop a device as if it went out of range. Returns false if unknown.
    pub fn disconnect_device(&self, identity: &str) -> bool {
        let identity = DeviceIdentity::new(identity);
        let removed = {
            let mut devices = lock(&self.devices);
            let position = devices.iter().position(|(id, _)| *id == identity);
            position.map(|i| devices.remove(i))
        };
        let Some((identity, device)) = removed else {
            return false;
        };

        device.connected.store(false, Ordering::SeqCst);
        if let Some(sender) = self.sender() {
            sender.device_removed(identity);
        }
        true
    }
}

impl ScanBackend for SimulatedBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn attach(&self, events: BackendEventSender) {
        *lock(&self.sender) = Some(events);
    }

    fn start_scanning(&self) -> Result<(), ScanError> {
        let backend_error = |reason: &str| ScanError::Backend {
            backend: self.name.clone(),
            reason: reason.to_string(),
        };
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(backend_error("adapter unavailable"));
        }
        let Some(sender) = self.sender() else {
            return Err(backend_error("not attached"));
        };
        if self.scanning.swap(true, Ordering::SeqCst) {
            return Err(ScanError::AlreadyScanning);
        }

        let devices = lock(&self.devices).clone();
        debug!("[backend {}] Announcing {} devices", self.name, devices.len());
        for (identity, device) in devices {
            sender.device_found(identity, device);
        }

        if self.finish_after_discovery {
            self.finish_scan();
        }
        Ok(())
    }

    fn stop_scanning(&self) -> Result<(), ScanError> {
        self.finish_scan();
        Ok(())
    }

    fn is_scanning(&self) -> bool {
        self.scanning.load(Ordering::SeqCst)
    }
}
