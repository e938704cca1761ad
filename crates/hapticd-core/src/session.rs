//! Per-connection handshake state.

use hapticd_proto::CURRENT_SCHEMA_VERSION;
use hapticd_types::{LogLevel, ServerInfo};

use crate::config::ServerConfig;
use crate::error::{Error, HandshakeError, Result};

/// Why a session stopped accepting messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeardownReason {
    PingTimeout,
    Shutdown,
}

impl TeardownReason {
    fn error(self) -> Error {
        match self {
            TeardownReason::PingTimeout => Error::PingTimeout,
            TeardownReason::Shutdown => Error::ShutDown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    AwaitingHandshake,
    Ready,
    TornDown(TeardownReason),
}

#[derive(Debug, Clone)]
pub struct Session {
    state: HandshakeState,
    client_name: Option<String>,
    negotiated: Option<u32>,
    log_level: LogLevel,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

fn crate_version(part: &str) -> u32 {
    part.parse().unwrap_or(0)
}

impl Session {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: HandshakeState::AwaitingHandshake,
            client_name: None,
            negotiated: None,
            log_level: LogLevel::Off,
        }
    }

    #[must_use]
    pub fn state(&self) -> HandshakeState {
        self.state
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.state == HandshakeState::Ready
    }

    #[must_use]
    pub fn client_name(&self) -> Option<&str> {
        self.client_name.as_deref()
    }

    /// Schema version agreed at handshake.
    #[must_use]
    pub fn negotiated_version(&self) -> Option<u32> {
        self.negotiated
    }

    /// Version replies are encoded at; schema 0 until the handshake succeeds.
    #[must_use]
    pub fn wire_version(&self) -> u32 {
        self.negotiated.unwrap_or(0)
    }

    #[must_use]
    pub fn log_level(&self) -> LogLevel {
        self.log_level
    }

    pub fn set_log_level(&mut self, level: LogLevel) {
        self.log_level = level;
    }

    /// # Errors
    ///
    /// Returns the teardown error once the session is torn down.
    pub fn check_open(&self) -> Result<()> {
        match self.state {
            HandshakeState::TornDown(reason) => Err(reason.error()),
            _ => Ok(()),
        }
    }

    /// # Errors
    ///
    /// Returns [`HandshakeError::NotCompleted`] before the handshake, or the
    /// teardown error after teardown.
    pub fn require_ready(&self) -> Result<()> {
        self.check_open()?;
        if self.is_ready() {
            Ok(())
        } else {
            Err(HandshakeError::NotCompleted.into())
        }
    }

    /// Negotiate a schema version and move to `Ready`.
    ///
    /// On failure the state is unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`HandshakeError::AlreadyCompleted`] for a repeated handshake
    /// and [`HandshakeError::IncompatibleVersion`] when the negotiated version
    /// is below the configured minimum.
    pub fn handshake(
        &mut self,
        id: u32,
        client_name: &str,
        requested: u32,
        config: &ServerConfig,
    ) -> Result<ServerInfo> {
        self.check_open()?;
        if self.is_ready() {
            return Err(HandshakeError::AlreadyCompleted.into());
        }

        let negotiated = requested.min(CURRENT_SCHEMA_VERSION);
        if negotiated < config.min_schema_version {
            return Err(HandshakeError::IncompatibleVersion {
                requested,
                minimum: config.min_schema_version,
            }
            .into());
        }

        self.state = HandshakeState::Ready;
        self.client_name = Some(client_name.to_string());
        self.negotiated = Some(negotiated);

        Ok(ServerInfo {
            id,
            server_name: config.server_name.clone(),
            major_version: crate_version(env!("CARGO_PKG_VERSION_MAJOR")),
            minor_version: crate_version(env!("CARGO_PKG_VERSION_MINOR")),
            build_version: crate_version(env!("CARGO_PKG_VERSION_PATCH")),
            message_version: negotiated,
            max_ping_time: config.max_ping_time_ms,
        })
    }

    /// Returns false if the session was already torn down.
    pub fn tear_down(&mut self, reason: TeardownReason) -> bool {
        if matches!(self.state, HandshakeState::TornDown(_)) {
            return false;
        }
        self.state = HandshakeState::TornDown(reason);
        true
    }
}
