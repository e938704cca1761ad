//! Device directory messages: device lists and add/remove notifications.
//!
//! | Version | Shape of `DeviceMessages` |
//! |---------|---------------------------|
//! | 0 | list of command tags |
//! | 1 | map of command tag to attributes |
//! | 3 | v1 plus `DeviceDisplayName` and `DeviceMessageTimingGap` |

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Per-command attributes advertised for a device.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct MessageAttributes {
    /// Number of independently addressable actuators for this command.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_count: Option<u32>,
}

impl MessageAttributes {
    #[must_use]
    pub fn with_features(count: u32) -> Self {
        Self {
            feature_count: Some(count),
        }
    }
}

/// Capability set: command tag to attributes, ordered by tag.
pub type DeviceMessages = BTreeMap<String, MessageAttributes>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct DeviceInfoV0 {
    pub device_name: String,
    pub device_index: u32,
    pub device_messages: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct DeviceInfoV1 {
    pub device_name: String,
    pub device_index: u32,
    pub device_messages: DeviceMessages,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct DeviceInfo {
    pub device_name: String,
    pub device_index: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_display_name: Option<String>,
    /// Minimum milliseconds between commands the device can absorb.
    pub device_message_timing_gap: u32,
    pub device_messages: DeviceMessages,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct DeviceListV0 {
    pub id: u32,
    pub devices: Vec<DeviceInfoV0>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct DeviceListV1 {
    pub id: u32,
    pub devices: Vec<DeviceInfoV1>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct DeviceList {
    pub id: u32,
    pub devices: Vec<DeviceInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct DeviceAddedV0 {
    pub id: u32,
    pub device_name: String,
    pub device_index: u32,
    pub device_messages: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct DeviceAddedV1 {
    pub id: u32,
    pub device_name: String,
    pub device_index: u32,
    pub device_messages: DeviceMessages,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct DeviceAdded {
    pub id: u32,
    pub device_name: String,
    pub device_index: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_display_name: Option<String>,
    pub device_message_timing_gap: u32,
    pub device_messages: DeviceMessages,
}

impl DeviceAdded {
    #[must_use]
    pub fn from_info(id: u32, info: DeviceInfo) -> Self {
        Self {
            id,
            device_name: info.device_name,
            device_index: info.device_index,
            device_display_name: info.device_display_name,
            device_message_timing_gap: info.device_message_timing_gap,
            device_messages: info.device_messages,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct DeviceRemoved {
    pub id: u32,
    pub device_index: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_messages() -> DeviceMessages {
        let mut messages = DeviceMessages::new();
        messages.insert("StopDeviceCmd".to_string(), MessageAttributes::default());
        messages.insert("VibrateCmd".to_string(), MessageAttributes::with_features(1));
        messages
    }

    #[test]
    fn test_attributes_omit_missing_feature_count() {
        let json = serde_json::to_string(&sample_messages()).unwrap();
        assert_eq!(
            json,
            r#"{"StopDeviceCmd":{},"VibrateCmd":{"FeatureCount":1}}"#
        );
    }

    #[test]
    fn test_device_added_v3_requires_timing_gap() {
        let json = r#"{"Id":0,"DeviceName":"D","DeviceIndex":1,"DeviceMessages":{}}"#;
        assert!(serde_json::from_str::<DeviceAdded>(json).is_err());
        assert!(serde_json::from_str::<DeviceAddedV1>(json).is_ok());
    }

    #[test]
    fn test_device_added_v0_rejects_attribute_map() {
        let json = r#"{"Id":0,"DeviceName":"D","DeviceIndex":1,"DeviceMessages":{"VibrateCmd":{}}}"#;
        assert!(serde_json::from_str::<DeviceAddedV0>(json).is_err());
    }

    #[test]
    fn test_display_name_skipped_when_absent() {
        let added = DeviceAdded {
            id: 0,
            device_name: "D".to_string(),
            device_index: 2,
            device_display_name: None,
            device_message_timing_gap: 0,
            device_messages: sample_messages(),
        };
        let json = serde_json::to_string(&added).unwrap();
        assert!(!json.contains("DeviceDisplayName"));
        assert!(json.contains("\"DeviceMessageTimingGap\":0"));
    }

    #[test]
    fn test_device_added_from_info() {
        let info = DeviceInfo {
            device_name: "D".to_string(),
            device_index: 4,
            device_display_name: Some("Desk".to_string()),
            device_message_timing_gap: 50,
            device_messages: sample_messages(),
        };
        let added = DeviceAdded::from_info(0, info);
        assert_eq!(added.device_index, 4);
        assert_eq!(added.device_display_name.as_deref(), Some("Desk"));
        assert_eq!(added.device_message_timing_gap, 50);
    }

    #[test]
    fn test_attributes_reject_unknown_field() {
        let json = r#"{"FeatureCount":1,"StepCount":[20]}"#;
        assert!(serde_json::from_str::<MessageAttributes>(json).is_err());
    }
}
