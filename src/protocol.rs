use crate::error::{NuvoError, Result};
use crate::types::{
    BalancePosition, NativeValue, SourceConfiguration, SourceId, Target, ZoneConfiguration,
    ZoneEqStatus, ZoneId, ZoneStatus, ZoneVolumeConfiguration,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Kinds of push messages the amplifier delivers
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    ZoneStatus,
    ZoneConfiguration,
    ZoneEqStatus,
    ZoneVolumeConfiguration,
    SourceConfiguration,
}

/// Push message as delivered to every subscriber of its type
///
/// The payload is raw JSON of the shape `{"event": {...}}`; subscribers parse
/// it into a [`DeviceEvent`] themselves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub message_type: MessageType,
    pub payload: Value,
}

impl Notification {
    /// Wrap a typed event into a notification
    pub fn new(message_type: MessageType, event: &impl Serialize) -> Result<Self> {
        Ok(Self {
            message_type,
            payload: json!({ "event": serde_json::to_value(event)? }),
        })
    }

    /// Build a notification from a typed event
    pub fn from_event(event: &DeviceEvent) -> Result<Self> {
        match event {
            DeviceEvent::ZoneStatus(e) => Self::new(MessageType::ZoneStatus, e),
            DeviceEvent::ZoneConfiguration(e) => Self::new(MessageType::ZoneConfiguration, e),
            DeviceEvent::ZoneEqStatus(e) => Self::new(MessageType::ZoneEqStatus, e),
            DeviceEvent::ZoneVolumeConfiguration(e) => Self::new(MessageType::ZoneVolumeConfiguration, e),
            DeviceEvent::SourceConfiguration(e) => Self::new(MessageType::SourceConfiguration, e),
        }
    }

    /// Parse the payload into a typed event
    pub fn event(&self) -> Result<DeviceEvent> {
        DeviceEvent::parse(self.message_type, &self.payload)
    }
}

/// Typed event carried by a push message
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceEvent {
    ZoneStatus(ZoneStatus),
    ZoneConfiguration(ZoneConfiguration),
    ZoneEqStatus(ZoneEqStatus),
    ZoneVolumeConfiguration(ZoneVolumeConfiguration),
    SourceConfiguration(SourceConfiguration),
}

impl DeviceEvent {
    /// Parse a `{"event": {...}}` payload for the given message type
    pub fn parse(message_type: MessageType, payload: &Value) -> Result<Self> {
        let event = payload
            .get("event")
            .ok_or_else(|| NuvoError::MalformedMessage("missing event payload".to_string()))?
            .clone();

        let parsed = match message_type {
            MessageType::ZoneStatus => serde_json::from_value(event).map(DeviceEvent::ZoneStatus),
            MessageType::ZoneConfiguration => {
                serde_json::from_value(event).map(DeviceEvent::ZoneConfiguration)
            }
            MessageType::ZoneEqStatus => serde_json::from_value(event).map(DeviceEvent::ZoneEqStatus),
            MessageType::ZoneVolumeConfiguration => {
                serde_json::from_value(event).map(DeviceEvent::ZoneVolumeConfiguration)
            }
            MessageType::SourceConfiguration => {
                serde_json::from_value(event).map(DeviceEvent::SourceConfiguration)
            }
        };

        parsed.map_err(|e| NuvoError::MalformedMessage(format!("{:?}: {}", message_type, e)))
    }

    pub fn message_type(&self) -> MessageType {
        match self {
            DeviceEvent::ZoneStatus(_) => MessageType::ZoneStatus,
            DeviceEvent::ZoneConfiguration(_) => MessageType::ZoneConfiguration,
            DeviceEvent::ZoneEqStatus(_) => MessageType::ZoneEqStatus,
            DeviceEvent::ZoneVolumeConfiguration(_) => MessageType::ZoneVolumeConfiguration,
            DeviceEvent::SourceConfiguration(_) => MessageType::SourceConfiguration,
        }
    }

    /// The zone or source this event pertains to
    pub fn origin(&self) -> Target {
        match self {
            DeviceEvent::ZoneStatus(e) => Target::zone(e.zone),
            DeviceEvent::ZoneConfiguration(e) => Target::zone(e.zone),
            DeviceEvent::ZoneEqStatus(e) => Target::zone(e.zone),
            DeviceEvent::ZoneVolumeConfiguration(e) => Target::zone(e.zone),
            DeviceEvent::SourceConfiguration(e) => Target::source(e.source),
        }
    }
}

/// Commands sent to the amplifier; none of them return the resulting state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    SetPower { zone: ZoneId, on: bool },
    SetVolume { zone: ZoneId, volume: NativeValue },
    SetMute { zone: ZoneId, mute: bool },
    SetSource { zone: ZoneId, source: SourceId },
    SetBass { zone: ZoneId, bass: NativeValue },
    SetTreble { zone: ZoneId, treble: NativeValue },
    SetBalance { zone: ZoneId, position: BalancePosition, balance: NativeValue },
    SetLoudnessComp { zone: ZoneId, enabled: bool },
    SetSourceGain { source: SourceId, gain: NativeValue },
    ZoneVolumeMax { zone: ZoneId, volume: NativeValue },
    ZoneVolumeInitial { zone: ZoneId, volume: NativeValue },
    ZoneVolumePage { zone: ZoneId, volume: NativeValue },
    ZoneVolumeParty { zone: ZoneId, volume: NativeValue },
    PageOn,
    PageOff,
}

/// On-demand queries; the answer arrives as a push message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "query", rename_all = "snake_case")]
pub enum Query {
    ZoneStatus { zone: ZoneId },
    ZoneConfiguration { zone: ZoneId },
    ZoneEqStatus { zone: ZoneId },
    ZoneVolumeConfiguration { zone: ZoneId },
    SourceConfiguration { source: SourceId },
}

impl Query {
    /// Message type the answer will be pushed as
    pub fn message_type(&self) -> MessageType {
        match self {
            Query::ZoneStatus { .. } => MessageType::ZoneStatus,
            Query::ZoneConfiguration { .. } => MessageType::ZoneConfiguration,
            Query::ZoneEqStatus { .. } => MessageType::ZoneEqStatus,
            Query::ZoneVolumeConfiguration { .. } => MessageType::ZoneVolumeConfiguration,
            Query::SourceConfiguration { .. } => MessageType::SourceConfiguration,
        }
    }

    /// Zone or source being asked about
    pub fn target(&self) -> Target {
        match *self {
            Query::ZoneStatus { zone }
            | Query::ZoneConfiguration { zone }
            | Query::ZoneEqStatus { zone }
            | Query::ZoneVolumeConfiguration { zone } => Target::zone(zone),
            Query::SourceConfiguration { source } => Target::source(source),
        }
    }
}

/// Outbound request handed to the serial library
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Request {
    Command(Command),
    Query(Query),
}
