//! Status, handshake, logging and scanning messages.

use serde::{Deserialize, Serialize};

use crate::{ErrorCode, LogLevel};

/// Generic success reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct OkResponse {
    pub id: u32,
}

/// Failure reply. Tag `Error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct ErrorMessage {
    pub id: u32,
    pub error_message: String,
    pub error_code: ErrorCode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct Ping {
    pub id: u32,
}

/// Echo request; the server replies with the same string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct Test {
    pub id: u32,
    pub test_string: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct RequestLog {
    pub id: u32,
    pub log_level: LogLevel,
}

/// Unsolicited log record forwarded to clients that asked for one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct Log {
    pub id: u32,
    pub log_level: LogLevel,
    pub log_message: String,
}

/// Schema 0 handshake: no version field, the client speaks version 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct RequestServerInfoV0 {
    pub id: u32,
    pub client_name: String,
}

/// Handshake request carrying the client's schema version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct RequestServerInfo {
    pub id: u32,
    pub client_name: String,
    pub message_version: u32,
}

/// Handshake reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct ServerInfo {
    pub id: u32,
    pub server_name: String,
    pub major_version: u32,
    pub minor_version: u32,
    pub build_version: u32,
    pub message_version: u32,
    /// Milliseconds; 0 means the ping watchdog is disabled.
    pub max_ping_time: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct StartScanning {
    pub id: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct StopScanning {
    pub id: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct ScanningFinished {
    pub id: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct RequestDeviceList {
    pub id: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_info_wire_shape() {
        let info = ServerInfo {
            id: 1,
            server_name: "Hub".to_string(),
            major_version: 2,
            minor_version: 0,
            build_version: 0,
            message_version: 3,
            max_ping_time: 1000,
        };
        let value = serde_json::to_value(&info).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "Id": 1,
                "ServerName": "Hub",
                "MajorVersion": 2,
                "MinorVersion": 0,
                "BuildVersion": 0,
                "MessageVersion": 3,
                "MaxPingTime": 1000
            })
        );
    }

    #[test]
    fn test_request_server_info_v0_rejects_version_field() {
        let json = r#"{"ClientName":"C","Id":1,"MessageVersion":1}"#;
        assert!(serde_json::from_str::<RequestServerInfoV0>(json).is_err());
        assert!(serde_json::from_str::<RequestServerInfo>(json).is_ok());
    }

    #[test]
    fn test_request_server_info_requires_version() {
        let json = r#"{"ClientName":"C","Id":1}"#;
        assert!(serde_json::from_str::<RequestServerInfo>(json).is_err());
        let v0: RequestServerInfoV0 = serde_json::from_str(json).unwrap();
        assert_eq!(v0.client_name, "C");
    }

    #[test]
    fn test_error_message_parses() {
        let json = r#"{"Id":5,"ErrorMessage":"nope","ErrorCode":1}"#;
        let err: ErrorMessage = serde_json::from_str(json).unwrap();
        assert_eq!(err.error_code, ErrorCode::Init);
        assert_eq!(err.id, 5);
    }

    #[test]
    fn test_request_log_rejects_bad_level() {
        let json = r#"{"Id":1,"LogLevel":"Loud"}"#;
        assert!(serde_json::from_str::<RequestLog>(json).is_err());
    }
}
