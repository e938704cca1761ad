//! Schema registry: one immutable entry per message shape.
//!
//! The table is built once from [`STANDARD_REGISTRATIONS`] and shared for the
//! life of the process. Construction checks the table for programming errors
//! and panics on any of them, so a bad registration never reaches a client.

use std::collections::HashMap;
use std::sync::OnceLock;

use hapticd_types::MessageKind;

use crate::error::CodecError;

/// Newest schema version this server speaks.
pub const CURRENT_SCHEMA_VERSION: u32 = 3;

/// Who is allowed to send a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    ClientToServer,
    ServerToClient,
    Both,
}

impl Direction {
    #[must_use]
    pub fn accepts_from_client(self) -> bool {
        matches!(self, Direction::ClientToServer | Direction::Both)
    }
}

/// Registry entry for a single message shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageMetadata {
    pub kind: MessageKind,
    pub tag: &'static str,
    pub schema_version: u32,
    pub predecessor: Option<MessageKind>,
    pub direction: Direction,
}

/// One line of the registration table.
#[derive(Debug, Clone, Copy)]
pub struct Registration {
    kind: MessageKind,
    schema_version: u32,
    predecessor: Option<MessageKind>,
    direction: Direction,
}

impl Registration {
    #[must_use]
    pub const fn new(kind: MessageKind, schema_version: u32, direction: Direction) -> Self {
        Self {
            kind,
            schema_version,
            predecessor: None,
            direction,
        }
    }

    /// Mark the older shape this one replaced.
    #[must_use]
    pub const fn supersedes(mut self, predecessor: MessageKind) -> Self {
        self.predecessor = Some(predecessor);
        self
    }
}

use Direction::{Both, ClientToServer, ServerToClient};
use MessageKind as K;

pub const STANDARD_REGISTRATIONS: &[Registration] = &[
    // Status
    Registration::new(K::Ok, 0, ServerToClient),
    Registration::new(K::Error, 0, ServerToClient),
    Registration::new(K::Ping, 0, ClientToServer),
    Registration::new(K::Test, 0, Both),
    Registration::new(K::RequestLog, 0, ClientToServer),
    Registration::new(K::Log, 0, ServerToClient),
    // Handshake
    Registration::new(K::RequestServerInfoV0, 0, ClientToServer),
    Registration::new(K::RequestServerInfo, 1, ClientToServer).supersedes(K::RequestServerInfoV0),
    Registration::new(K::ServerInfo, 0, ServerToClient),
    // Enumeration
    Registration::new(K::StartScanning, 0, ClientToServer),
    Registration::new(K::StopScanning, 0, ClientToServer),
    Registration::new(K::ScanningFinished, 0, ServerToClient),
    Registration::new(K::RequestDeviceList, 0, ClientToServer),
    Registration::new(K::DeviceListV0, 0, ServerToClient),
    Registration::new(K::DeviceListV1, 1, ServerToClient).supersedes(K::DeviceListV0),
    Registration::new(K::DeviceList, 3, ServerToClient).supersedes(K::DeviceListV1),
    Registration::new(K::DeviceAddedV0, 0, ServerToClient),
    Registration::new(K::DeviceAddedV1, 1, ServerToClient).supersedes(K::DeviceAddedV0),
    Registration::new(K::DeviceAdded, 3, ServerToClient).supersedes(K::DeviceAddedV1),
    Registration::new(K::DeviceRemoved, 0, ServerToClient),
    // Device commands
    Registration::new(K::StopDeviceCmd, 0, ClientToServer),
    Registration::new(K::StopAllDevices, 0, ClientToServer),
    Registration::new(K::SingleMotorVibrateCmd, 0, ClientToServer),
    Registration::new(K::VibrateCmd, 1, ClientToServer),
    Registration::new(K::RotateCmd, 1, ClientToServer),
    Registration::new(K::LinearCmd, 1, ClientToServer),
    Registration::new(K::BatteryLevelCmd, 2, ClientToServer),
    Registration::new(K::BatteryLevelReading, 2, ServerToClient),
    Registration::new(K::RssiLevelCmd, 2, ClientToServer),
    Registration::new(K::RssiLevelReading, 2, ServerToClient),
];

/// Lookup table over message shapes.
#[derive(Debug)]
pub struct SchemaRegistry {
    by_kind: HashMap<MessageKind, MessageMetadata>,
    /// Shapes per tag, newest schema version first.
    by_tag: HashMap<&'static str, Vec<MessageKind>>,
}

impl SchemaRegistry {
    /// Build a registry from an explicit registration list.
    ///
    /// # Panics
    ///
    /// Panics if a kind is registered twice, if two shapes of one tag share a
    /// schema version, or if a predecessor is not an already registered,
    /// older shape of the same tag.
    #[must_use]
    pub fn new(registrations: &[Registration]) -> Self {
        let mut by_kind: HashMap<MessageKind, MessageMetadata> = HashMap::new();
        let mut by_tag: HashMap<&'static str, Vec<MessageKind>> = HashMap::new();

        for reg in registrations {
            let tag = reg.kind.tag();
            assert!(
                !by_kind.contains_key(&reg.kind),
                "message kind {} registered twice",
                reg.kind
            );

            let shapes = by_tag.entry(tag).or_default();
            for existing in shapes.iter() {
                assert!(
                    by_kind[existing].schema_version != reg.schema_version,
                    "tag {tag} has two shapes at schema version {}",
                    reg.schema_version
                );
            }

            if let Some(pred) = reg.predecessor {
                let Some(pred_meta) = by_kind.get(&pred) else {
                    panic!("predecessor {pred} of {} is not registered", reg.kind);
                };
                assert!(
                    pred_meta.tag == tag,
                    "predecessor {pred} of {} has a different tag",
                    reg.kind
                );
                assert!(
                    pred_meta.schema_version < reg.schema_version,
                    "predecessor {pred} of {} is not older",
                    reg.kind
                );
            }

            shapes.push(reg.kind);
            by_kind.insert(
                reg.kind,
                MessageMetadata {
                    kind: reg.kind,
                    tag,
                    schema_version: reg.schema_version,
                    predecessor: reg.predecessor,
                    direction: reg.direction,
                },
            );
        }

        for shapes in by_tag.values_mut() {
            shapes.sort_by_key(|kind| std::cmp::Reverse(by_kind[kind].schema_version));
        }

        Self { by_kind, by_tag }
    }

    /// The full table for every [`MessageKind`].
    ///
    /// # Panics
    ///
    /// Panics if a message kind has no registration.
    #[must_use]
    pub fn standard() -> Self {
        let registry = Self::new(STANDARD_REGISTRATIONS);
        for kind in MessageKind::ALL {
            assert!(
                registry.by_kind.contains_key(kind),
                "message kind {kind} has no registration"
            );
        }
        registry
    }

    /// Newest shape registered for `tag`.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::UnknownMessage`] if the tag is not registered.
    pub fn lookup(&self, tag: &str) -> Result<&MessageMetadata, CodecError> {
        self.shapes(tag)
            .first()
            .and_then(|kind| self.by_kind.get(kind))
            .ok_or_else(|| CodecError::UnknownMessage {
                id: None,
                tag: tag.to_string(),
            })
    }

    #[must_use]
    pub fn metadata(&self, kind: MessageKind) -> Option<&MessageMetadata> {
        self.by_kind.get(&kind)
    }

    /// All shapes for `tag`, newest first. Empty for unknown tags.
    #[must_use]
    pub fn shapes(&self, tag: &str) -> &[MessageKind] {
        self.by_tag.get(tag).map_or(&[], Vec::as_slice)
    }

    /// Schema version of `kind`, or the current version for unregistered kinds.
    #[must_use]
    pub fn schema_version(&self, kind: MessageKind) -> u32 {
        self.metadata(kind)
            .map_or(CURRENT_SCHEMA_VERSION, |meta| meta.schema_version)
    }

    pub fn iter(&self) -> impl Iterator<Item = &MessageMetadata> {
        self.by_kind.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_kind.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_kind.is_empty()
    }
}

static REGISTRY: OnceLock<SchemaRegistry> = OnceLock::new();

/// Process-wide registry, built on first use.
///
/// Servers call this while starting up so a bad table panics there rather
/// than inside a connection task.
pub fn registry() -> &'static SchemaRegistry {
    REGISTRY.get_or_init(SchemaRegistry::standard)
}

/// Whether the process-wide registry has been built yet.
#[must_use]
pub fn is_loaded() -> bool {
    REGISTRY.get().is_some()
}
