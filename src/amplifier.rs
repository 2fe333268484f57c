//! The device-connection contract consumed by entities
//!
//! An [`Amplifier`] multiplexes one physical push stream to many subscribers
//! and accepts commands and queries. It owns serialization of the physical
//! link; callers never assume exclusivity over it.

use crate::error::{NuvoError, Result};
use crate::protocol::{Command, DeviceEvent, MessageType, Query};
use crate::subscription::{Callback, SubscriptionId};
use crate::types::{
    BalancePosition, NativeValue, SourceConfiguration, SourceId, ZoneConfiguration, ZoneEqStatus, ZoneId,
    ZoneStatus, ZoneVolumeConfiguration,
};
use async_trait::async_trait;

/// Connection to one configured amplifier
#[async_trait]
pub trait Amplifier: Send + Sync {
    /// Register interest in a message type
    fn add_subscriber(&self, message_type: MessageType, callback: Callback) -> SubscriptionId;

    /// Deregister a callback; returns whether it was registered
    fn remove_subscriber(&self, message_type: MessageType, id: SubscriptionId) -> bool;

    /// Send a command; resolves once it is handed to the link
    async fn send(&self, command: Command) -> Result<()>;

    /// Issue a query whose answer is only delivered through the push stream
    async fn request(&self, query: Query) -> Result<()>;

    /// Issue a query and wait for the push message answering it
    async fn query(&self, query: Query) -> Result<DeviceEvent>;

    // ========== Queries ==========

    async fn zone_status(&self, zone: ZoneId) -> Result<ZoneStatus> {
        match self.query(Query::ZoneStatus { zone }).await? {
            DeviceEvent::ZoneStatus(status) => Ok(status),
            other => Err(unexpected(MessageType::ZoneStatus, &other)),
        }
    }

    async fn zone_configuration(&self, zone: ZoneId) -> Result<ZoneConfiguration> {
        match self.query(Query::ZoneConfiguration { zone }).await? {
            DeviceEvent::ZoneConfiguration(cfg) => Ok(cfg),
            other => Err(unexpected(MessageType::ZoneConfiguration, &other)),
        }
    }

    async fn zone_eq_status(&self, zone: ZoneId) -> Result<ZoneEqStatus> {
        match self.query(Query::ZoneEqStatus { zone }).await? {
            DeviceEvent::ZoneEqStatus(eq) => Ok(eq),
            other => Err(unexpected(MessageType::ZoneEqStatus, &other)),
        }
    }

    async fn zone_volume_configuration(&self, zone: ZoneId) -> Result<ZoneVolumeConfiguration> {
        match self.query(Query::ZoneVolumeConfiguration { zone }).await? {
            DeviceEvent::ZoneVolumeConfiguration(cfg) => Ok(cfg),
            other => Err(unexpected(MessageType::ZoneVolumeConfiguration, &other)),
        }
    }

    async fn source_configuration(&self, source: SourceId) -> Result<SourceConfiguration> {
        match self.query(Query::SourceConfiguration { source }).await? {
            DeviceEvent::SourceConfiguration(cfg) => Ok(cfg),
            other => Err(unexpected(MessageType::SourceConfiguration, &other)),
        }
    }

    // ========== Commands ==========

    async fn set_power(&self, zone: ZoneId, on: bool) -> Result<()> {
        self.send(Command::SetPower { zone, on }).await
    }

    async fn set_volume(&self, zone: ZoneId, volume: NativeValue) -> Result<()> {
        self.send(Command::SetVolume { zone, volume }).await
    }

    async fn set_mute(&self, zone: ZoneId, mute: bool) -> Result<()> {
        self.send(Command::SetMute { zone, mute }).await
    }

    async fn set_source(&self, zone: ZoneId, source: SourceId) -> Result<()> {
        self.send(Command::SetSource { zone, source }).await
    }

    async fn set_bass(&self, zone: ZoneId, bass: NativeValue) -> Result<()> {
        self.send(Command::SetBass { zone, bass }).await
    }

    async fn set_treble(&self, zone: ZoneId, treble: NativeValue) -> Result<()> {
        self.send(Command::SetTreble { zone, treble }).await
    }

    async fn set_balance(
        &self,
        zone: ZoneId,
        position: BalancePosition,
        balance: NativeValue,
    ) -> Result<()> {
        self.send(Command::SetBalance {
            zone,
            position,
            balance,
        })
        .await
    }

    async fn set_loudness_comp(&self, zone: ZoneId, enabled: bool) -> Result<()> {
        self.send(Command::SetLoudnessComp { zone, enabled }).await
    }

    async fn set_source_gain(&self, source: SourceId, gain: NativeValue) -> Result<()> {
        self.send(Command::SetSourceGain { source, gain }).await
    }

    async fn zone_volume_max(&self, zone: ZoneId, volume: NativeValue) -> Result<()> {
        self.send(Command::ZoneVolumeMax { zone, volume }).await
    }

    async fn zone_volume_initial(&self, zone: ZoneId, volume: NativeValue) -> Result<()> {
        self.send(Command::ZoneVolumeInitial { zone, volume }).await
    }

    async fn zone_volume_page(&self, zone: ZoneId, volume: NativeValue) -> Result<()> {
        self.send(Command::ZoneVolumePage { zone, volume }).await
    }

    async fn zone_volume_party(&self, zone: ZoneId, volume: NativeValue) -> Result<()> {
        self.send(Command::ZoneVolumeParty { zone, volume }).await
    }

    async fn set_page_on(&self) -> Result<()> {
        self.send(Command::PageOn).await
    }

    async fn set_page_off(&self) -> Result<()> {
        self.send(Command::PageOff).await
    }
}

fn unexpected(expected: MessageType, got: &DeviceEvent) -> NuvoError {
    NuvoError::UnexpectedEvent(format!(
        "expected {:?}, got {:?}",
        expected,
        got.message_type()
    ))
}
