//! Test fixtures and helpers

use std::sync::Arc;

use crate::config::ServerConfig;
use crate::events::{EventReceiver, ServerEvent};
use crate::server::HapticServer;
use crate::simulated::{SimulatedBackend, SimulatedDevice};

pub fn test_config(max_ping_time_ms: u32) -> ServerConfig {
    ServerConfig {
        server_name: "Test Hub".to_string(),
        max_ping_time_ms,
        ..ServerConfig::default()
    }
}

pub fn handshake(id: u32, version: u32) -> String {
    format!(
        r#"[{{"RequestServerInfo":{{"ClientName":"Tester","Id":{id},"MessageVersion":{version}}}}}]"#
    )
}

/// Server that has completed the handshake at `version`.
pub async fn ready_server(version: u32, max_ping_time_ms: u32) -> HapticServer {
    let server = HapticServer::new(test_config(max_ping_time_ms));
    let reply = server.process_text(&handshake(1, version)).await;
    assert!(reply.contains("ServerInfo"), "handshake failed: {reply}");
    server
}

/// One vibrator with two motors, battery and RSSI readings.
pub fn vibrator() -> Arc<SimulatedDevice> {
    Arc::new(
        SimulatedDevice::new("Test Vibrator")
            .with_vibrators(2)
            .with_battery(0.75)
            .with_rssi(-42),
    )
}

/// Attach `device` directly, bypassing discovery. Returns its index.
pub fn attach(server: &HapticServer, identity: &str, device: Arc<SimulatedDevice>) -> u32 {
    server.devices().add_device(identity.into(), device)
}

pub fn backend_with(devices: &[(&str, Arc<SimulatedDevice>)]) -> Arc<SimulatedBackend> {
    let backend = devices
        .iter()
        .fold(SimulatedBackend::new("sim"), |backend, (identity, device)| {
            backend.with_device(identity, Arc::clone(device))
        });
    Arc::new(backend)
}

/// Drain queued events without waiting.
pub fn drain(events: &mut EventReceiver) -> Vec<ServerEvent> {
    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    seen
}

/// Wait for the next event matching `pred`, discarding others.
pub async fn wait_for(events: &mut EventReceiver, pred: impl Fn(&ServerEvent) -> bool) -> ServerEvent {
    loop {
        match events.recv().await {
            Some(event) if pred(&event) => return event,
            Some(_) => {}
            None => panic!("event bus closed"),
        }
    }
}
