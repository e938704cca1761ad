//! Tests for handshake gating, version negotiation and message validation

use super::fixtures::{handshake, ready_server, test_config};
use crate::config::ServerConfig;
use crate::events::ServerEvent;
use crate::server::HapticServer;
use hapticd_proto::CURRENT_SCHEMA_VERSION;

#[tokio::test]
async fn test_every_message_before_handshake_is_rejected() {
    let server = HapticServer::new(test_config(0));

    for text in [
        r#"[{"Ping":{"Id":2}}]"#,
        r#"[{"RequestDeviceList":{"Id":3}}]"#,
        r#"[{"StopAllDevices":{"Id":4}}]"#,
        r#"[{"VibrateCmd":{"Id":5,"DeviceIndex":0,"Speeds":[{"Index":0,"Speed":0.5}]}}]"#,
    ] {
        let reply = server.process_text(text).await;
        assert!(reply.contains(r#""ErrorCode":1"#), "{text} -> {reply}");
    }
    assert!(!server.is_ready());
}

#[tokio::test]
async fn test_handshake_without_version_gets_current_schema() {
    let server = HapticServer::new(test_config(0));

    let reply = server
        .process_text(r#"[{"RequestServerInfo":{"ClientName":"Foo","Id":1}}]"#)
        .await;
    assert!(reply.contains(&format!(r#""MessageVersion":{CURRENT_SCHEMA_VERSION}"#)));
    assert!(reply.contains(r#""ServerName":"Test Hub""#));
    assert_eq!(server.negotiated_version(), Some(CURRENT_SCHEMA_VERSION));

    let reply = server
        .process_text(r#"[{"RequestDeviceList":{"Id":2}}]"#)
        .await;
    assert_eq!(reply, r#"[{"DeviceList":{"Devices":[],"Id":2}}]"#);
}

#[tokio::test]
async fn test_explicit_v0_request_negotiates_v0() {
    let server = HapticServer::new(test_config(0));
    let reply = server.process_text(&handshake(1, 0)).await;

    assert!(reply.contains(r#""MessageVersion":0"#));
    assert_eq!(server.negotiated_version(), Some(0));
}

#[tokio::test]
async fn test_newer_client_gets_current_schema() {
    let server = HapticServer::new(test_config(0));
    let reply = server.process_text(&handshake(1, 42)).await;

    assert!(reply.contains(&format!(r#""MessageVersion":{CURRENT_SCHEMA_VERSION}"#)));
    assert_eq!(server.negotiated_version(), Some(CURRENT_SCHEMA_VERSION));
}

#[tokio::test]
async fn test_handshake_below_minimum_version() {
    let config = ServerConfig {
        min_schema_version: 2,
        ..test_config(0)
    };
    let server = HapticServer::new(config);

    let reply = server.process_text(&handshake(1, 1)).await;
    assert!(reply.contains(r#""ErrorCode":1"#));
    assert!(!server.is_ready());

    let reply = server.process_text(&handshake(2, 3)).await;
    assert!(reply.contains("ServerInfo"));
}

#[tokio::test]
async fn test_repeated_handshake_is_init_error() {
    let server = ready_server(3, 0).await;
    let reply = server.process_text(&handshake(7, 3)).await;
    assert!(reply.contains(r#""ErrorCode":1"#));
    assert!(reply.contains(r#""Id":7"#));
    assert!(server.is_ready());
}

#[tokio::test]
async fn test_handshake_emits_client_connected() {
    let server = HapticServer::new(test_config(0));
    let mut events = server.subscribe();

    server.process_text(&handshake(1, 2)).await;

    let mut connected = None;
    while let Ok(event) = events.try_recv() {
        if let ServerEvent::ClientConnected {
            client_name,
            schema_version,
        } = event
        {
            connected = Some((client_name, schema_version));
        }
    }
    assert_eq!(connected, Some(("Tester".to_string(), 2)));
}

#[tokio::test]
async fn test_reserved_id_is_msg_error() {
    let server = ready_server(3, 0).await;
    let reply = server.process_text(r#"[{"Ping":{"Id":0}}]"#).await;
    assert!(reply.contains(r#""ErrorCode":3"#));
}

#[tokio::test]
async fn test_server_to_client_message_is_rejected() {
    let server = ready_server(3, 0).await;
    let reply = server
        .process_text(r#"[{"DeviceRemoved":{"Id":3,"DeviceIndex":0}}]"#)
        .await;
    assert!(reply.contains(r#""ErrorCode":3"#));
    assert!(reply.contains(r#""Id":3"#));
}

#[tokio::test]
async fn test_unknown_and_malformed_elements_keep_batch_order() {
    let server = ready_server(3, 0).await;
    let reply = server
        .process_text(r#"[{"Ping":{"Id":2}},{"Bogus":{"Id":3}},{"Ping":{"Id":"four"}},{"Ping":{"Id":5}}]"#)
        .await;

    let value: serde_json::Value = serde_json::from_str(&reply).unwrap();
    let elements = value.as_array().unwrap();
    assert_eq!(elements.len(), 4);
    assert_eq!(elements[0]["Ok"]["Id"], 2);
    assert_eq!(elements[1]["Error"]["ErrorCode"], 3);
    assert_eq!(elements[1]["Error"]["Id"], 3);
    assert_eq!(elements[2]["Error"]["ErrorCode"], 3);
    assert_eq!(elements[2]["Error"]["Id"], 0);
    assert_eq!(elements[3]["Ok"]["Id"], 5);
}

#[tokio::test]
async fn test_codec_errors_are_raised_as_events() {
    let server = ready_server(3, 0).await;
    let mut events = server.subscribe();

    server.process_text(r#"[{"Bogus":{"Id":3}}]"#).await;

    let raised = std::iter::from_fn(|| events.try_recv().ok())
        .filter(|e| matches!(e, ServerEvent::ErrorRaised { .. }))
        .count();
    assert_eq!(raised, 1);
}

#[tokio::test]
async fn test_test_message_echoes() {
    let server = ready_server(3, 0).await;
    let reply = server
        .process_text(r#"[{"Test":{"Id":9,"TestString":"echo me"}}]"#)
        .await;
    assert_eq!(reply, r#"[{"Test":{"Id":9,"TestString":"echo me"}}]"#);
}
