use hapticd_proto::registry;
use hapticd_types::{DeviceInfo, DeviceMessages};

use super::DeviceIdentity;

/// Registry view of one device. Indices are never reused.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceRecord {
    pub index: u32,
    pub identity: DeviceIdentity,
    pub name: String,
    pub display_name: Option<String>,
    pub message_timing_gap_ms: u32,
    pub capabilities: DeviceMessages,
    pub connected: bool,
}

impl DeviceRecord {
    #[must_use]
    pub fn supports(&self, tag: &str) -> bool {
        self.capabilities.contains_key(tag)
    }

    #[must_use]
    pub fn feature_count(&self, tag: &str) -> Option<u32> {
        self.capabilities.get(tag).and_then(|attrs| attrs.feature_count)
    }

    /// Copy of this record without commands newer than `version`.
    ///
    /// A command's version is that of the first schema that defined its tag;
    /// tags the registry does not know are dropped.
    #[must_use]
    pub fn filtered_for(&self, version: u32) -> Self {
        let reg = registry();
        let capabilities = self
            .capabilities
            .iter()
            .filter(|(tag, _)| {
                reg.shapes(tag)
                    .last()
                    .and_then(|kind| reg.metadata(*kind))
                    .is_some_and(|meta| meta.schema_version <= version)
            })
            .map(|(tag, attrs)| (tag.clone(), attrs.clone()))
            .collect();

        Self {
            capabilities,
            ..self.clone()
        }
    }

    #[must_use]
    pub fn to_info(&self) -> DeviceInfo {
        DeviceInfo {
            device_name: self.name.clone(),
            device_index: self.index,
            device_display_name: self.display_name.clone(),
            device_message_timing_gap: self.message_timing_gap_ms,
            device_messages: self.capabilities.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hapticd_types::MessageAttributes;

    fn record() -> DeviceRecord {
        let mut capabilities = DeviceMessages::new();
        capabilities.insert("StopDeviceCmd".to_string(), MessageAttributes::default());
        capabilities.insert("SingleMotorVibrateCmd".to_string(), MessageAttributes::default());
        capabilities.insert("VibrateCmd".to_string(), MessageAttributes::with_features(2));
        capabilities.insert("BatteryLevelCmd".to_string(), MessageAttributes::default());
        capabilities.insert("KiirooCmd".to_string(), MessageAttributes::default());
        DeviceRecord {
            index: 3,
            identity: DeviceIdentity::new("aa:bb"),
            name: "Wand".to_string(),
            display_name: Some("Bedside".to_string()),
            message_timing_gap_ms: 20,
            capabilities,
            connected: true,
        }
    }

    #[test]
    fn test_filtered_for_v0() {
        let filtered = record().filtered_for(0);
        let tags: Vec<_> = filtered.capabilities.keys().cloned().collect();
        assert_eq!(tags, vec!["SingleMotorVibrateCmd", "StopDeviceCmd"]);
    }

    #[test]
    fn test_filtered_for_v1_keeps_generic_commands() {
        let filtered = record().filtered_for(1);
        assert!(filtered.supports("VibrateCmd"));
        assert!(!filtered.supports("BatteryLevelCmd"));
    }

    #[test]
    fn test_filtered_for_current_drops_only_unknown_tags() {
        let filtered = record().filtered_for(3);
        assert_eq!(filtered.capabilities.len(), 4);
        assert!(!filtered.supports("KiirooCmd"));
        assert_eq!(filtered.index, 3);
    }

    #[test]
    fn test_to_info() {
        let info = record().to_info();
        assert_eq!(info.device_index, 3);
        assert_eq!(info.device_display_name.as_deref(), Some("Bedside"));
        assert_eq!(info.device_message_timing_gap, 20);
        assert_eq!(info.device_messages.len(), 5);
    }

    #[test]
    fn test_feature_count() {
        let record = record();
        assert_eq!(record.feature_count("VibrateCmd"), Some(2));
        assert_eq!(record.feature_count("StopDeviceCmd"), None);
        assert_eq!(record.feature_count("RotateCmd"), None);
    }
}
