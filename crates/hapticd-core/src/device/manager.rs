use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use hapticd_types::{
    DeviceCommand, LogLevel, Message, MessageAttributes, MessageKind, SYSTEM_MESSAGE_ID,
    SingleMotorVibrateCmd, SpeedSubcommand, StopDeviceCmd, VibrateCmd,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{DeviceIdentity, DeviceRecord, HapticDevice};
use crate::error::DeviceError;
use crate::events::{EventBus, ServerEvent};

struct Entry {
    record: DeviceRecord,
    device: Arc<dyn HapticDevice>,
    /// `SingleMotorVibrateCmd` is served by converting to `VibrateCmd`.
    upgrade_single_motor: bool,
}

#[derive(Default)]
struct DeviceTable {
    next_index: u32,
    entries: BTreeMap<u32, Entry>,
    live: HashMap<DeviceIdentity, u32>,
}

/// Authoritative table of devices for one server.
///
/// Mutations happen under a short lock that is never held across an await;
/// commands are forwarded to the device after the lock is released.
pub struct DeviceManager {
    table: Mutex<DeviceTable>,
    events: EventBus,
    cancel: CancellationToken,
}

impl DeviceManager {
    #[must_use]
    pub fn new(events: EventBus, cancel: CancellationToken) -> Self {
        Self {
            table: Mutex::new(DeviceTable::default()),
            events,
            cancel,
        }
    }

    fn table(&self) -> MutexGuard<'_, DeviceTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a device, or return the index it already has.
    pub fn add_device(&self, identity: DeviceIdentity, device: Arc<dyn HapticDevice>) -> u32 {
        let record = {
            let mut table = self.table();
            if let Some(&index) = table.live.get(&identity) {
                debug!("[device {index}] {identity} already registered");
                return index;
            }

            let index = table.next_index;
            table.next_index += 1;

            let mut capabilities = device.allowed_commands();
            let vibrate = MessageKind::VibrateCmd.tag();
            let single = MessageKind::SingleMotorVibrateCmd.tag();
            let upgrade_single_motor =
                capabilities.contains_key(vibrate) && !capabilities.contains_key(single);
            if upgrade_single_motor {
                capabilities.insert(single.to_string(), MessageAttributes::default());
            }

            let record = DeviceRecord {
                index,
                identity: identity.clone(),
                name: device.name().to_string(),
                display_name: device.display_name(),
                message_timing_gap_ms: device.message_timing_gap_ms(),
                capabilities,
                connected: true,
            };
            table.live.insert(identity, index);
            table.entries.insert(
                index,
                Entry {
                    record: record.clone(),
                    device,
                    upgrade_single_motor,
                },
            );
            record
        };

        let index = record.index;
        info!("[device {index}] Added {} ({})", record.name, record.identity);
        self.events.log(
            LogLevel::Info,
            format!("Device {index} added: {}", record.name),
        );
        self.events.emit(ServerEvent::DeviceAdded(record));
        index
    }

    /// Mark a device disconnected. Returns its index, or `None` if unknown.
    pub fn remove_device(&self, identity: &DeviceIdentity) -> Option<u32> {
        let index = {
            let mut table = self.table();
            let Some(index) = table.live.remove(identity) else {
                debug!("Ignoring removal of unknown device {identity}");
                return None;
            };
            if let Some(entry) = table.entries.get_mut(&index) {
                entry.record.connected = false;
            }
            index
        };

        info!("[device {index}] Removed ({identity})");
        self.events
            .log(LogLevel::Info, format!("Device {index} removed"));
        self.events.emit(ServerEvent::DeviceRemoved { index });
        Some(index)
    }

    /// Validate `command` against the target's capabilities and forward it.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::UnknownDevice`], [`DeviceError::UnsupportedCommand`]
    /// or [`DeviceError::FeatureOutOfRange`] when the command cannot be routed,
    /// [`DeviceError::SessionClosed`] if the server is torn down before the
    /// device answers, and any failure the device reports.
    pub async fn dispatch(&self, command: DeviceCommand) -> Result<Message, DeviceError> {
        if self.cancel.is_cancelled() {
            return Err(DeviceError::SessionClosed);
        }

        let index = command.device_index();
        let id = command.id();
        let (device, command) = {
            let table = self.table();
            let entry = table
                .entries
                .get(&index)
                .filter(|entry| entry.record.connected)
                .ok_or(DeviceError::UnknownDevice(index))?;
            check_command(&entry.record, &command)?;

            let command = match command {
                DeviceCommand::SingleMotorVibrate(cmd) if entry.upgrade_single_motor => {
                    let features = entry.record.feature_count(MessageKind::VibrateCmd.tag());
                    upgrade_single_motor(cmd, features.unwrap_or(1))?
                }
                other => other,
            };
            (Arc::clone(&entry.device), command)
        };

        debug!("[device {index}] Forwarding {}", command.tag());
        let result = tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(DeviceError::SessionClosed),
            result = device.handle_command(command) => result,
        };

        result.map(|mut reply| {
            reply.set_id(id);
            reply
        })
    }

    /// Send `StopDeviceCmd` to every connected device.
    ///
    /// Runs even after the server is cancelled so teardown can halt hardware.
    ///
    /// # Errors
    ///
    /// Returns one [`DeviceError::Failed`] summarizing every device that
    /// failed to stop.
    pub async fn stop_all_devices(&self) -> Result<(), DeviceError> {
        let targets = self.connected_devices();
        let mut failures = Vec::new();

        for (index, device) in targets {
            let stop = DeviceCommand::Stop(StopDeviceCmd {
                id: SYSTEM_MESSAGE_ID,
                device_index: index,
            });
            if let Err(e) = device.handle_command(stop).await {
                warn!("[device {index}] Failed to stop: {e}");
                failures.push(format!("device {index}: {e}"));
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(DeviceError::Failed(format!(
                "Failed to stop {}",
                failures.join(", ")
            )))
        }
    }

    /// Disconnect every device and report each as removed.
    pub async fn disconnect_all(&self) {
        let targets: Vec<_> = {
            let mut table = self.table();
            table.live.clear();
            table
                .entries
                .iter_mut()
                .filter(|(_, entry)| entry.record.connected)
                .map(|(&index, entry)| {
                    entry.record.connected = false;
                    (index, Arc::clone(&entry.device))
                })
                .collect()
        };

        for (index, device) in targets {
            device.disconnect().await;
            debug!("[device {index}] Disconnected");
            self.events.emit(ServerEvent::DeviceRemoved { index });
        }
    }

    /// Connected devices in index order.
    #[must_use]
    pub fn list_devices(&self) -> Vec<DeviceRecord> {
        self.table()
            .entries
            .values()
            .filter(|entry| entry.record.connected)
            .map(|entry| entry.record.clone())
            .collect()
    }

    #[must_use]
    pub fn record(&self, index: u32) -> Option<DeviceRecord> {
        self.table()
            .entries
            .get(&index)
            .map(|entry| entry.record.clone())
    }

    fn connected_devices(&self) -> Vec<(u32, Arc<dyn HapticDevice>)> {
        self.table()
            .entries
            .iter()
            .filter(|(_, entry)| entry.record.connected)
            .map(|(&index, entry)| (index, Arc::clone(&entry.device)))
            .collect()
    }
}

fn check_command(record: &DeviceRecord, command: &DeviceCommand) -> Result<(), DeviceError> {
    let tag = command.tag();
    if !record.supports(tag) {
        return Err(DeviceError::UnsupportedCommand {
            index: record.index,
            tag,
        });
    }

    if let Some(count) = record.feature_count(tag) {
        if let Some(feature) = command
            .feature_indices()
            .into_iter()
            .find(|&feature| feature >= count)
        {
            return Err(DeviceError::FeatureOutOfRange {
                index: record.index,
                tag,
                feature,
                count,
            });
        }
    }
    Ok(())
}

/// Drive every vibration feature at the legacy single speed.
fn upgrade_single_motor(
    cmd: SingleMotorVibrateCmd,
    features: u32,
) -> Result<DeviceCommand, DeviceError> {
    let speeds = (0..features.max(1))
        .map(|index| SpeedSubcommand {
            index,
            speed: cmd.speed,
        })
        .collect();
    VibrateCmd::new(cmd.id, cmd.device_index, speeds)
        .map(DeviceCommand::Vibrate)
        .map_err(|e| DeviceError::Failed(e.to_string()))
}
