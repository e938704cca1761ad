//! Integration tests for the hapticd socket server
//!
//! Each test starts `serve` on a socket in a temp dir and talks to it with
//! the same frame codec a client would use.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use hapticd_core::config::{ServerConfig, SimulatedDeviceConfig, SimulationConfig};
use hapticd_daemon::{DaemonOptions, serve};
use hapticd_proto::JsonArrayCodec;
use serde_json::Value;
use tokio::net::{UnixListener, UnixStream};
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;

type Client = Framed<UnixStream, JsonArrayCodec>;

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

fn options(max_ping_time_ms: u32, simulate: bool) -> DaemonOptions {
    let mut vibrator = SimulatedDeviceConfig::new("sim-1", "Sim Vibrator");
    vibrator.vibrators = 2;
    DaemonOptions {
        socket_path: PathBuf::new(),
        server: ServerConfig {
            server_name: "Integration Hub".to_string(),
            max_ping_time_ms,
            ..ServerConfig::default()
        },
        simulation: simulate.then(|| SimulationConfig {
            devices: vec![vibrator],
        }),
    }
}

async fn start(options: DaemonOptions) -> (Client, CancellationToken, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hapticd.sock");
    let listener = UnixListener::bind(&path).unwrap();
    let cancel = CancellationToken::new();

    let options = Arc::new(DaemonOptions {
        socket_path: path.clone(),
        ..options
    });
    tokio::spawn(serve(listener, options, cancel.clone()));

    let stream = UnixStream::connect(&path).await.unwrap();
    (Framed::new(stream, JsonArrayCodec::new()), cancel, dir)
}

async fn send(client: &mut Client, text: &str) {
    client.send(text.to_string()).await.unwrap();
}

/// Next message element, unwrapping the array frames arrive in.
async fn recv_all(client: &mut Client) -> Vec<Value> {
    let frame = tokio::time::timeout(RECV_TIMEOUT, client.next())
        .await
        .expect("timed out waiting for frame")
        .expect("connection closed")
        .unwrap();
    let value: Value = serde_json::from_str(&frame).unwrap();
    value.as_array().unwrap().clone()
}

/// Read frames into `seen` until some element satisfies `pred`.
///
/// Replies and pushed events travel on the same socket, so their relative
/// order is not fixed.
async fn recv_matching(client: &mut Client, seen: &mut Vec<Value>, pred: impl Fn(&Value) -> bool) {
    while !seen.iter().any(&pred) {
        seen.extend(recv_all(client).await);
    }
}

async fn recv_until(client: &mut Client, tag: &str) -> Vec<Value> {
    let mut seen = Vec::new();
    recv_matching(client, &mut seen, |e| e.get(tag).is_some()).await;
    seen
}

async fn handshake(client: &mut Client, version: u32) -> Value {
    send(
        client,
        &format!(
            r#"[{{"RequestServerInfo":{{"ClientName":"itest","Id":1,"MessageVersion":{version}}}}}]"#
        ),
    )
    .await;
    let mut reply = recv_all(client).await;
    reply.remove(0)
}

#[tokio::test]
async fn test_handshake_over_socket() {
    let (mut client, cancel, _dir) = start(options(0, false)).await;

    let info = handshake(&mut client, 3).await;
    assert_eq!(info["ServerInfo"]["ServerName"], "Integration Hub");
    assert_eq!(info["ServerInfo"]["MessageVersion"], 3);
    assert_eq!(info["ServerInfo"]["Id"], 1);

    cancel.cancel();
}

#[tokio::test]
async fn test_message_before_handshake() {
    let (mut client, cancel, _dir) = start(options(0, false)).await;

    send(&mut client, r#"[{"RequestDeviceList":{"Id":2}}]"#).await;
    let reply = recv_all(&mut client).await;
    assert_eq!(reply[0]["Error"]["ErrorCode"], 1);
    assert_eq!(reply[0]["Error"]["Id"], 2);

    cancel.cancel();
}

#[tokio::test]
async fn test_empty_device_list_wire_shape() {
    let (mut client, cancel, _dir) = start(options(0, false)).await;

    send(
        &mut client,
        r#"[{"RequestServerInfo":{"ClientName":"Foo","Id":1}}]"#,
    )
    .await;
    recv_all(&mut client).await;

    send(&mut client, r#"[{"RequestDeviceList":{"Id":2}}]"#).await;
    let frame = tokio::time::timeout(RECV_TIMEOUT, client.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(frame, r#"[{"DeviceList":{"Devices":[],"Id":2}}]"#);

    cancel.cancel();
}

#[tokio::test]
async fn test_simulated_scan_and_command() {
    let (mut client, cancel, _dir) = start(options(0, true)).await;
    handshake(&mut client, 3).await;

    send(&mut client, r#"[{"StartScanning":{"Id":2}}]"#).await;
    let mut seen = Vec::new();
    recv_matching(&mut client, &mut seen, |e| e["Ok"]["Id"] == 2).await;
    recv_matching(&mut client, &mut seen, |e| e.get("ScanningFinished").is_some()).await;

    let added = seen
        .iter()
        .find_map(|e| e.get("DeviceAdded"))
        .expect("device announced");
    assert_eq!(added["DeviceName"], "Sim Vibrator");
    assert_eq!(added["Id"], 0);
    let index = added["DeviceIndex"].as_u64().unwrap();

    send(
        &mut client,
        &format!(
            r#"[{{"VibrateCmd":{{"Id":3,"DeviceIndex":{index},"Speeds":[{{"Index":1,"Speed":0.5}}]}}}}]"#
        ),
    )
    .await;
    let mut seen = Vec::new();
    recv_matching(&mut client, &mut seen, |e| e.get("Ok").is_some()).await;
    assert_eq!(seen.last().unwrap()["Ok"]["Id"], 3);

    cancel.cancel();
}

#[tokio::test]
async fn test_batched_messages_reply_in_order() {
    let (mut client, cancel, _dir) = start(options(0, false)).await;
    handshake(&mut client, 3).await;

    send(
        &mut client,
        r#"[{"Ping":{"Id":2}},{"Test":{"Id":3,"TestString":"x"}},{"Ping":{"Id":0}}]"#,
    )
    .await;
    let reply = recv_all(&mut client).await;

    assert_eq!(reply.len(), 3);
    assert_eq!(reply[0]["Ok"]["Id"], 2);
    assert_eq!(reply[1]["Test"]["TestString"], "x");
    assert_eq!(reply[2]["Error"]["ErrorCode"], 3);

    cancel.cancel();
}

#[tokio::test]
async fn test_ping_timeout_is_pushed_then_connection_closes() {
    let (mut client, cancel, _dir) = start(options(100, false)).await;
    handshake(&mut client, 3).await;

    let pushed = recv_until(&mut client, "Error").await;
    let error = pushed.last().unwrap();
    assert_eq!(error["Error"]["ErrorCode"], 2);
    assert_eq!(error["Error"]["Id"], 0);

    let closed = tokio::time::timeout(RECV_TIMEOUT, async {
        while let Some(frame) = client.next().await {
            frame.unwrap();
        }
    })
    .await;
    assert!(closed.is_ok(), "server kept the connection open");

    cancel.cancel();
}

#[tokio::test]
async fn test_connections_are_independent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hapticd.sock");
    let listener = UnixListener::bind(&path).unwrap();
    let cancel = CancellationToken::new();
    let options = DaemonOptions {
        socket_path: path.clone(),
        ..options(0, false)
    };
    tokio::spawn(serve(listener, Arc::new(options), cancel.clone()));

    let mut first = Framed::new(UnixStream::connect(&path).await.unwrap(), JsonArrayCodec::new());
    let mut second = Framed::new(UnixStream::connect(&path).await.unwrap(), JsonArrayCodec::new());

    handshake(&mut first, 3).await;

    send(&mut second, r#"[{"Ping":{"Id":2}}]"#).await;
    let reply = recv_all(&mut second).await;
    assert_eq!(reply[0]["Error"]["ErrorCode"], 1);

    send(&mut first, r#"[{"Ping":{"Id":2}}]"#).await;
    let reply = recv_all(&mut first).await;
    assert_eq!(reply[0]["Ok"]["Id"], 2);

    cancel.cancel();
}
