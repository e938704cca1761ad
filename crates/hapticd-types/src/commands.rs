//! Device command messages and their readings.
//!
//! Commands with numeric constraints deserialize through a private raw struct
//! and are validated by the same constructor that in-process callers use, so
//! an out-of-range value can never exist as a typed message.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::{Message, MessageKind, ValidationError, check_unit_range};

fn check_unique_indices(indices: impl Iterator<Item = u32>) -> Result<(), ValidationError> {
    let mut seen = HashSet::new();
    for index in indices {
        if !seen.insert(index) {
            return Err(ValidationError::DuplicateIndex(index));
        }
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct StopDeviceCmd {
    pub id: u32,
    pub device_index: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct StopAllDevices {
    pub id: u32,
}

/// Schema 0 vibration: one speed for every motor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", try_from = "SingleMotorVibrateCmdRaw")]
pub struct SingleMotorVibrateCmd {
    pub id: u32,
    pub device_index: u32,
    pub speed: f64,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
struct SingleMotorVibrateCmdRaw {
    id: u32,
    device_index: u32,
    speed: f64,
}

impl SingleMotorVibrateCmd {
    /// # Errors
    ///
    /// Returns an error if `speed` is outside `0.0..=1.0`.
    pub fn new(id: u32, device_index: u32, speed: f64) -> Result<Self, ValidationError> {
        check_unit_range("Speed", speed)?;
        Ok(Self {
            id,
            device_index,
            speed,
        })
    }
}

impl TryFrom<SingleMotorVibrateCmdRaw> for SingleMotorVibrateCmd {
    type Error = ValidationError;

    fn try_from(raw: SingleMotorVibrateCmdRaw) -> Result<Self, Self::Error> {
        Self::new(raw.id, raw.device_index, raw.speed)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct SpeedSubcommand {
    pub index: u32,
    pub speed: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", try_from = "VibrateCmdRaw")]
pub struct VibrateCmd {
    pub id: u32,
    pub device_index: u32,
    pub speeds: Vec<SpeedSubcommand>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
struct VibrateCmdRaw {
    id: u32,
    device_index: u32,
    speeds: Vec<SpeedSubcommand>,
}

impl VibrateCmd {
    /// # Errors
    ///
    /// Returns an error if `speeds` is empty, repeats a feature index, or
    /// holds a speed outside `0.0..=1.0`.
    pub fn new(
        id: u32,
        device_index: u32,
        speeds: Vec<SpeedSubcommand>,
    ) -> Result<Self, ValidationError> {
        if speeds.is_empty() {
            return Err(ValidationError::Empty("Speeds"));
        }
        for sub in &speeds {
            check_unit_range("Speed", sub.speed)?;
        }
        check_unique_indices(speeds.iter().map(|s| s.index))?;
        Ok(Self {
            id,
            device_index,
            speeds,
        })
    }
}

impl TryFrom<VibrateCmdRaw> for VibrateCmd {
    type Error = ValidationError;

    fn try_from(raw: VibrateCmdRaw) -> Result<Self, Self::Error> {
        Self::new(raw.id, raw.device_index, raw.speeds)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct RotationSubcommand {
    pub index: u32,
    pub speed: f64,
    pub clockwise: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", try_from = "RotateCmdRaw")]
pub struct RotateCmd {
    pub id: u32,
    pub device_index: u32,
    pub rotations: Vec<RotationSubcommand>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
struct RotateCmdRaw {
    id: u32,
    device_index: u32,
    rotations: Vec<RotationSubcommand>,
}

impl RotateCmd {
    /// # Errors
    ///
    /// Returns an error if `rotations` is empty, repeats a feature index, or
    /// holds a speed outside `0.0..=1.0`.
    pub fn new(
        id: u32,
        device_index: u32,
        rotations: Vec<RotationSubcommand>,
    ) -> Result<Self, ValidationError> {
        if rotations.is_empty() {
            return Err(ValidationError::Empty("Rotations"));
        }
        for sub in &rotations {
            check_unit_range("Speed", sub.speed)?;
        }
        check_unique_indices(rotations.iter().map(|r| r.index))?;
        Ok(Self {
            id,
            device_index,
            rotations,
        })
    }
}

impl TryFrom<RotateCmdRaw> for RotateCmd {
    type Error = ValidationError;

    fn try_from(raw: RotateCmdRaw) -> Result<Self, Self::Error> {
        Self::new(raw.id, raw.device_index, raw.rotations)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct VectorSubcommand {
    pub index: u32,
    /// Milliseconds to reach `position`.
    pub duration: u32,
    pub position: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", try_from = "LinearCmdRaw")]
pub struct LinearCmd {
    pub id: u32,
    pub device_index: u32,
    pub vectors: Vec<VectorSubcommand>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
struct LinearCmdRaw {
    id: u32,
    device_index: u32,
    vectors: Vec<VectorSubcommand>,
}

impl LinearCmd {
    /// # Errors
    ///
    /// Returns an error if `vectors` is empty, repeats a feature index, or
    /// holds a position outside `0.0..=1.0`.
    pub fn new(
        id: u32,
        device_index: u32,
        vectors: Vec<VectorSubcommand>,
    ) -> Result<Self, ValidationError> {
        if vectors.is_empty() {
            return Err(ValidationError::Empty("Vectors"));
        }
        for sub in &vectors {
            check_unit_range("Position", sub.position)?;
        }
        check_unique_indices(vectors.iter().map(|v| v.index))?;
        Ok(Self {
            id,
            device_index,
            vectors,
        })
    }
}

impl TryFrom<LinearCmdRaw> for LinearCmd {
    type Error = ValidationError;

    fn try_from(raw: LinearCmdRaw) -> Result<Self, Self::Error> {
        Self::new(raw.id, raw.device_index, raw.vectors)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct BatteryLevelCmd {
    pub id: u32,
    pub device_index: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", try_from = "BatteryLevelReadingRaw")]
pub struct BatteryLevelReading {
    pub id: u32,
    pub device_index: u32,
    pub battery_level: f64,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
struct BatteryLevelReadingRaw {
    id: u32,
    device_index: u32,
    battery_level: f64,
}

impl BatteryLevelReading {
    /// # Errors
    ///
    /// Returns an error if `battery_level` is outside `0.0..=1.0`.
    pub fn new(id: u32, device_index: u32, battery_level: f64) -> Result<Self, ValidationError> {
        check_unit_range("BatteryLevel", battery_level)?;
        Ok(Self {
            id,
            device_index,
            battery_level,
        })
    }
}

impl TryFrom<BatteryLevelReadingRaw> for BatteryLevelReading {
    type Error = ValidationError;

    fn try_from(raw: BatteryLevelReadingRaw) -> Result<Self, Self::Error> {
        Self::new(raw.id, raw.device_index, raw.battery_level)
    }
}

/// Tag `RSSILevelCmd`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct RssiLevelCmd {
    pub id: u32,
    pub device_index: u32,
}

/// Tag `RSSILevelReading`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct RssiLevelReading {
    pub id: u32,
    pub device_index: u32,
    #[serde(rename = "RSSILevel")]
    pub rssi_level: i32,
}

/// A message addressed to a single device.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCommand {
    Stop(StopDeviceCmd),
    SingleMotorVibrate(SingleMotorVibrateCmd),
    Vibrate(VibrateCmd),
    Rotate(RotateCmd),
    Linear(LinearCmd),
    BatteryLevel(BatteryLevelCmd),
    RssiLevel(RssiLevelCmd),
}

impl DeviceCommand {
    #[must_use]
    pub fn id(&self) -> u32 {
        match self {
            DeviceCommand::Stop(c) => c.id,
            DeviceCommand::SingleMotorVibrate(c) => c.id,
            DeviceCommand::Vibrate(c) => c.id,
            DeviceCommand::Rotate(c) => c.id,
            DeviceCommand::Linear(c) => c.id,
            DeviceCommand::BatteryLevel(c) => c.id,
            DeviceCommand::RssiLevel(c) => c.id,
        }
    }

    #[must_use]
    pub fn device_index(&self) -> u32 {
        match self {
            DeviceCommand::Stop(c) => c.device_index,
            DeviceCommand::SingleMotorVibrate(c) => c.device_index,
            DeviceCommand::Vibrate(c) => c.device_index,
            DeviceCommand::Rotate(c) => c.device_index,
            DeviceCommand::Linear(c) => c.device_index,
            DeviceCommand::BatteryLevel(c) => c.device_index,
            DeviceCommand::RssiLevel(c) => c.device_index,
        }
    }

    #[must_use]
    pub fn kind(&self) -> MessageKind {
        match self {
            DeviceCommand::Stop(_) => MessageKind::StopDeviceCmd,
            DeviceCommand::SingleMotorVibrate(_) => MessageKind::SingleMotorVibrateCmd,
            DeviceCommand::Vibrate(_) => MessageKind::VibrateCmd,
            DeviceCommand::Rotate(_) => MessageKind::RotateCmd,
            DeviceCommand::Linear(_) => MessageKind::LinearCmd,
            DeviceCommand::BatteryLevel(_) => MessageKind::BatteryLevelCmd,
            DeviceCommand::RssiLevel(_) => MessageKind::RssiLevelCmd,
        }
    }

    #[must_use]
    pub fn tag(&self) -> &'static str {
        self.kind().tag()
    }

    /// Feature indices addressed by per-feature commands.
    #[must_use]
    pub fn feature_indices(&self) -> Vec<u32> {
        match self {
            DeviceCommand::Vibrate(c) => c.speeds.iter().map(|s| s.index).collect(),
            DeviceCommand::Rotate(c) => c.rotations.iter().map(|r| r.index).collect(),
            DeviceCommand::Linear(c) => c.vectors.iter().map(|v| v.index).collect(),
            _ => Vec::new(),
        }
    }
}

impl TryFrom<Message> for DeviceCommand {
    type Error = Message;

    fn try_from(message: Message) -> Result<Self, Self::Error> {
        match message {
            Message::StopDeviceCmd(c) => Ok(DeviceCommand::Stop(c)),
            Message::SingleMotorVibrateCmd(c) => Ok(DeviceCommand::SingleMotorVibrate(c)),
            Message::VibrateCmd(c) => Ok(DeviceCommand::Vibrate(c)),
            Message::RotateCmd(c) => Ok(DeviceCommand::Rotate(c)),
            Message::LinearCmd(c) => Ok(DeviceCommand::Linear(c)),
            Message::BatteryLevelCmd(c) => Ok(DeviceCommand::BatteryLevel(c)),
            Message::RssiLevelCmd(c) => Ok(DeviceCommand::RssiLevel(c)),
            other => Err(other),
        }
    }
}

impl From<DeviceCommand> for Message {
    fn from(command: DeviceCommand) -> Self {
        match command {
            DeviceCommand::Stop(c) => Message::StopDeviceCmd(c),
            DeviceCommand::SingleMotorVibrate(c) => Message::SingleMotorVibrateCmd(c),
            DeviceCommand::Vibrate(c) => Message::VibrateCmd(c),
            DeviceCommand::Rotate(c) => Message::RotateCmd(c),
            DeviceCommand::Linear(c) => Message::LinearCmd(c),
            DeviceCommand::BatteryLevel(c) => Message::BatteryLevelCmd(c),
            DeviceCommand::RssiLevel(c) => Message::RssiLevelCmd(c),
        }
    }
}
