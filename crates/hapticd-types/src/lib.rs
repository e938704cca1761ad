//! Protocol message types for the hapticd device hub.
//!
//! Every message shape that ever existed on the wire is its own immutable
//! struct. A wire tag such as `DeviceAdded` may have several shapes, one per
//! schema version that changed it; the shapes are distinct [`MessageKind`]s
//! and the pure conversions between them live in [`convert`].
//!
//! All field names are PascalCase on the wire and unknown fields are rejected.

use serde::{Deserialize, Serialize};

pub mod commands;
pub mod convert;
pub mod device;
pub mod status;

pub use commands::{
    BatteryLevelCmd, BatteryLevelReading, DeviceCommand, LinearCmd, RotateCmd, RotationSubcommand,
    RssiLevelCmd, RssiLevelReading, SingleMotorVibrateCmd, SpeedSubcommand, StopAllDevices,
    StopDeviceCmd, VectorSubcommand, VibrateCmd,
};
pub use device::{
    DeviceAdded, DeviceAddedV0, DeviceAddedV1, DeviceInfo, DeviceInfoV0, DeviceInfoV1, DeviceList,
    DeviceListV0, DeviceListV1, DeviceMessages, DeviceRemoved, MessageAttributes,
};
pub use status::{
    ErrorMessage, Log, OkResponse, Ping, RequestDeviceList, RequestLog, RequestServerInfo,
    RequestServerInfoV0, ScanningFinished, ServerInfo, StartScanning, StopScanning, Test,
};

/// Correlation id reserved for unsolicited server messages.
pub const SYSTEM_MESSAGE_ID: u32 = 0;

/// Errors raised when a message is constructed with invalid field values.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("{field} must be between 0.0 and 1.0, got {value}")]
    OutOfRange { field: &'static str, value: f64 },

    #[error("{0} must contain at least one entry")]
    Empty(&'static str),

    #[error("Duplicate feature index {0}")]
    DuplicateIndex(u32),

    #[error("Unknown error code {0}")]
    UnknownErrorCode(u8),
}

/// Check a normalized actuator value.
pub(crate) fn check_unit_range(field: &'static str, value: f64) -> Result<(), ValidationError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ValidationError::OutOfRange { field, value })
    }
}

/// Error classes a client can rely on. Serialized as an integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum ErrorCode {
    Unknown = 0,
    Init = 1,
    Ping = 2,
    Msg = 3,
    Device = 4,
}

impl From<ErrorCode> for u8 {
    fn from(code: ErrorCode) -> Self {
        code as u8
    }
}

impl TryFrom<u8> for ErrorCode {
    type Error = ValidationError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ErrorCode::Unknown),
            1 => Ok(ErrorCode::Init),
            2 => Ok(ErrorCode::Ping),
            3 => Ok(ErrorCode::Msg),
            4 => Ok(ErrorCode::Device),
            other => Err(ValidationError::UnknownErrorCode(other)),
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorCode::Unknown => "ERROR_UNKNOWN",
            ErrorCode::Init => "ERROR_INIT",
            ErrorCode::Ping => "ERROR_PING",
            ErrorCode::Msg => "ERROR_MSG",
            ErrorCode::Device => "ERROR_DEVICE",
        };
        f.write_str(name)
    }
}

/// Log verbosity, ordered from quietest to most verbose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LogLevel {
    Off,
    Fatal,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Whether a record at `level` passes a filter set to `self`.
    #[must_use]
    pub fn allows(self, level: LogLevel) -> bool {
        self != LogLevel::Off && level != LogLevel::Off && level <= self
    }
}

macro_rules! define_messages {
    ($($variant:ident($ty:ty) => $tag:literal),+ $(,)?) => {
        /// One entry per message shape, including superseded versions.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum MessageKind {
            $($variant),+
        }

        impl MessageKind {
            pub const ALL: &'static [MessageKind] = &[$(MessageKind::$variant),+];

            /// Wire tag. Several kinds can share one tag.
            #[must_use]
            pub const fn tag(self) -> &'static str {
                match self {
                    $(MessageKind::$variant => $tag),+
                }
            }
        }

        /// A protocol message of any kind and version.
        #[derive(Debug, Clone, PartialEq)]
        pub enum Message {
            $($variant($ty)),+
        }

        impl Message {
            #[must_use]
            pub fn kind(&self) -> MessageKind {
                match self {
                    $(Message::$variant(_) => MessageKind::$variant),+
                }
            }

            #[must_use]
            pub fn id(&self) -> u32 {
                match self {
                    $(Message::$variant(m) => m.id),+
                }
            }

            pub fn set_id(&mut self, id: u32) {
                match self {
                    $(Message::$variant(m) => m.id = id),+
                }
            }

            /// Serialize the message body (without the tag wrapper).
            ///
            /// # Errors
            ///
            /// Returns an error if a field cannot be represented as JSON.
            pub fn to_fields(&self) -> Result<serde_json::Value, serde_json::Error> {
                match self {
                    $(Message::$variant(m) => serde_json::to_value(m)),+
                }
            }

            /// Build a message of `kind` from its body.
            ///
            /// # Errors
            ///
            /// Returns an error if the body does not match the shape of `kind`
            /// or fails the shape's validation.
            pub fn from_fields(
                kind: MessageKind,
                fields: serde_json::Value,
            ) -> Result<Self, serde_json::Error> {
                match kind {
                    $(MessageKind::$variant => {
                        serde_json::from_value::<$ty>(fields).map(Message::$variant)
                    }),+
                }
            }
        }

        $(
            impl From<$ty> for Message {
                fn from(m: $ty) -> Self {
                    Message::$variant(m)
                }
            }
        )+
    };
}

define_messages! {
    Ok(OkResponse) => "Ok",
    Error(ErrorMessage) => "Error",
    Ping(Ping) => "Ping",
    Test(Test) => "Test",
    RequestLog(RequestLog) => "RequestLog",
    Log(Log) => "Log",
    RequestServerInfoV0(RequestServerInfoV0) => "RequestServerInfo",
    RequestServerInfo(RequestServerInfo) => "RequestServerInfo",
    ServerInfo(ServerInfo) => "ServerInfo",
    StartScanning(StartScanning) => "StartScanning",
    StopScanning(StopScanning) => "StopScanning",
    ScanningFinished(ScanningFinished) => "ScanningFinished",
    RequestDeviceList(RequestDeviceList) => "RequestDeviceList",
    DeviceListV0(DeviceListV0) => "DeviceList",
    DeviceListV1(DeviceListV1) => "DeviceList",
    DeviceList(DeviceList) => "DeviceList",
    DeviceAddedV0(DeviceAddedV0) => "DeviceAdded",
    DeviceAddedV1(DeviceAddedV1) => "DeviceAdded",
    DeviceAdded(DeviceAdded) => "DeviceAdded",
    DeviceRemoved(DeviceRemoved) => "DeviceRemoved",
    StopDeviceCmd(StopDeviceCmd) => "StopDeviceCmd",
    StopAllDevices(StopAllDevices) => "StopAllDevices",
    SingleMotorVibrateCmd(SingleMotorVibrateCmd) => "SingleMotorVibrateCmd",
    VibrateCmd(VibrateCmd) => "VibrateCmd",
    RotateCmd(RotateCmd) => "RotateCmd",
    LinearCmd(LinearCmd) => "LinearCmd",
    BatteryLevelCmd(BatteryLevelCmd) => "BatteryLevelCmd",
    BatteryLevelReading(BatteryLevelReading) => "BatteryLevelReading",
    RssiLevelCmd(RssiLevelCmd) => "RSSILevelCmd",
    RssiLevelReading(RssiLevelReading) => "RSSILevelReading",
}

impl Message {
    /// Target device for device-addressed messages.
    #[must_use]
    pub fn device_index(&self) -> Option<u32> {
        match self {
            Message::StopDeviceCmd(m) => Some(m.device_index),
            Message::SingleMotorVibrateCmd(m) => Some(m.device_index),
            Message::VibrateCmd(m) => Some(m.device_index),
            Message::RotateCmd(m) => Some(m.device_index),
            Message::LinearCmd(m) => Some(m.device_index),
            Message::BatteryLevelCmd(m) => Some(m.device_index),
            Message::BatteryLevelReading(m) => Some(m.device_index),
            Message::RssiLevelCmd(m) => Some(m.device_index),
            Message::RssiLevelReading(m) => Some(m.device_index),
            Message::DeviceRemoved(m) => Some(m.device_index),
            Message::DeviceAddedV0(m) => Some(m.device_index),
            Message::DeviceAddedV1(m) => Some(m.device_index),
            Message::DeviceAdded(m) => Some(m.device_index),
            _ => None,
        }
    }

    #[must_use]
    pub fn tag(&self) -> &'static str {
        self.kind().tag()
    }

    #[must_use]
    pub fn ok(id: u32) -> Self {
        Message::Ok(OkResponse { id })
    }

    #[must_use]
    pub fn error(id: u32, code: ErrorCode, message: impl Into<String>) -> Self {
        Message::Error(ErrorMessage {
            id,
            error_message: message.into(),
            error_code: code,
        })
    }

    #[must_use]
    pub fn is_error(&self) -> bool {
        matches!(self, Message::Error(_))
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}
