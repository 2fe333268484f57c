use crate::amplifier::Amplifier;
use crate::config::SourceMap;
use crate::convert;
use crate::dispatcher::{Dispatcher, Lifecycle, Tracker};
use crate::entity::{DeviceInfo, Entity, EntityId};
use crate::error::{NuvoError, Result};
use crate::models::ModelSpec;
use crate::protocol::{DeviceEvent, MessageType, Query};
use crate::types::{HostValue, NativeValue, Target, ZoneId, ZoneStatus};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::json;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::broadcast;

/// Media-player feature bits as understood by the host
pub mod features {
    pub const VOLUME_SET: u32 = 4;
    pub const VOLUME_MUTE: u32 = 8;
    pub const TURN_ON: u32 = 128;
    pub const TURN_OFF: u32 = 256;
    pub const VOLUME_STEP: u32 = 1024;
    pub const SELECT_SOURCE: u32 = 2048;
}

const SUPPORTED_FEATURES: u32 = features::VOLUME_MUTE
    | features::VOLUME_SET
    | features::VOLUME_STEP
    | features::TURN_ON
    | features::TURN_OFF
    | features::SELECT_SOURCE;

const MESSAGE_TYPES: [MessageType; 3] = [
    MessageType::ZoneStatus,
    MessageType::ZoneConfiguration,
    MessageType::ZoneEqStatus,
];

/// Zone state snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ZoneState {
    pub power: Option<bool>,

    // Host volume 0..1, kept from the last unmuted reading
    pub volume: Option<HostValue>,

    pub mute: Option<bool>,

    // Name of the selected source
    pub source: Option<String>,

    // Sources this zone may select, by name
    pub source_list: Vec<String>,

    // Tone levels normalized to 0..1, plus the native readings
    pub bass: Option<HostValue>,
    pub bass_native: Option<NativeValue>,
    pub treble: Option<HostValue>,
    pub treble_native: Option<NativeValue>,

    // Signed balance, negative = left
    pub balance: Option<HostValue>,

    pub loudness_compensation: Option<bool>,
}

struct ZoneTracker {
    state: ZoneState,
    sources: SourceMap,
    model: &'static ModelSpec,
}

impl ZoneTracker {
    fn apply_status(&mut self, status: &ZoneStatus) -> Result<()> {
        if !status.power {
            self.state.power = Some(false);
            return Ok(());
        }

        let volume = match status.volume {
            Some(native) if !status.mute => Some(convert::to_host_volume(native, &self.model.volume)?),
            _ => None,
        };

        self.state.power = Some(true);
        self.state.mute = Some(status.mute);
        if volume.is_some() {
            self.state.volume = volume;
        }
        self.state.source = status
            .source
            .and_then(|id| self.sources.name(id))
            .map(str::to_string);
        Ok(())
    }
}

impl Tracker for ZoneTracker {
    fn apply(&mut self, event: &DeviceEvent) -> Result<()> {
        match event {
            DeviceEvent::ZoneStatus(status) => self.apply_status(status),
            DeviceEvent::ZoneConfiguration(cfg) => {
                // A permitted source may not be among the configured ones
                self.state.source_list = cfg
                    .source_ids()
                    .into_iter()
                    .filter_map(|id| self.sources.name(id))
                    .map(str::to_string)
                    .collect();
                Ok(())
            }
            DeviceEvent::ZoneEqStatus(eq) => {
                let bass = convert::to_host_eq(eq.bass, &self.model.bass)?;
                let treble = convert::to_host_eq(eq.treble, &self.model.treble)?;
                self.state.bass = Some(bass);
                self.state.bass_native = Some(eq.bass);
                self.state.treble = Some(treble);
                self.state.treble_native = Some(eq.treble);
                self.state.balance = Some(convert::to_host_balance(eq.balance_position, eq.balance));
                self.state.loudness_compensation = Some(eq.loudcmp);
                Ok(())
            }
            other => Err(NuvoError::MalformedMessage(format!(
                "zone cannot use {:?}",
                other.message_type()
            ))),
        }
    }
}

/// Media-player entity for one amplifier zone
///
/// State changes only through the amplifier's push messages; every command
/// returns once it is sent and the confirming push updates the state.
pub struct ZonePlayer {
    zone: ZoneId,
    name: String,
    model: &'static ModelSpec,
    sources: SourceMap,
    volume_step: NativeValue,
    device: DeviceInfo,
    snapshot: Mutex<Option<ZoneStatus>>,
    dispatcher: Dispatcher<ZoneTracker>,
}

impl ZonePlayer {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        amplifier: Arc<dyn Amplifier>,
        model: &'static ModelSpec,
        namespace: &str,
        zone: ZoneId,
        zone_name: &str,
        sources: SourceMap,
        volume_step: NativeValue,
        refresh: broadcast::Sender<EntityId>,
    ) -> Self {
        let state = ZoneState {
            source_list: sources.names(),
            ..ZoneState::default()
        };
        let tracker = ZoneTracker {
            state,
            sources: sources.clone(),
            model,
        };

        Self {
            zone,
            name: zone_name.to_string(),
            model,
            sources,
            volume_step,
            device: DeviceInfo::new(namespace, model),
            snapshot: Mutex::new(None),
            dispatcher: Dispatcher::new(
                EntityId::new(namespace, Target::zone(zone), "zone"),
                &MESSAGE_TYPES,
                amplifier,
                tracker,
                refresh,
            ),
        }
    }

    pub fn zone_id(&self) -> ZoneId {
        self.zone
    }

    /// Get a snapshot of the complete zone state for rendering
    pub fn state_snapshot(&self) -> ZoneState {
        self.dispatcher.read(|t| t.state.clone())
    }

    pub fn is_on(&self) -> Option<bool> {
        self.dispatcher.read(|t| t.state.power)
    }

    /// Volume level of the media player (0..1)
    pub fn volume_level(&self) -> Option<HostValue> {
        self.dispatcher.read(|t| t.state.volume)
    }

    pub fn is_volume_muted(&self) -> Option<bool> {
        self.dispatcher.read(|t| t.state.mute)
    }

    pub fn source(&self) -> Option<String> {
        self.dispatcher.read(|t| t.state.source.clone())
    }

    pub fn source_list(&self) -> Vec<String> {
        self.dispatcher.read(|t| t.state.source_list.clone())
    }

    pub fn supported_features(&self) -> u32 {
        SUPPORTED_FEATURES
    }

    fn amplifier(&self) -> Result<Arc<dyn Amplifier>> {
        self.dispatcher.amplifier()
    }

    // ========== Power ==========

    pub async fn turn_on(&self) -> Result<()> {
        self.amplifier()?.set_power(self.zone, true).await
    }

    pub async fn turn_off(&self) -> Result<()> {
        self.amplifier()?.set_power(self.zone, false).await
    }

    // ========== Volume Control ==========

    /// Set volume level, range 0..1
    pub async fn set_volume_level(&self, volume: HostValue) -> Result<()> {
        let native = convert::to_device_volume(volume, &self.model.volume)?;
        self.amplifier()?.set_volume(self.zone, native).await
    }

    /// Step one `volume_step` louder; does nothing while the volume is unknown
    pub async fn volume_up(&self) -> Result<()> {
        let Some(volume) = self.volume_level() else {
            return Ok(());
        };
        let scale = &self.model.volume;
        let current = convert::to_device_volume(volume, scale)?;
        let target = current.saturating_sub(self.volume_step).max(scale.lower());
        self.amplifier()?.set_volume(self.zone, target).await
    }

    /// Step one `volume_step` quieter; does nothing while the volume is unknown
    pub async fn volume_down(&self) -> Result<()> {
        let Some(volume) = self.volume_level() else {
            return Ok(());
        };
        let scale = &self.model.volume;
        let current = convert::to_device_volume(volume, scale)?;
        let target = current.saturating_add(self.volume_step).min(scale.upper());
        self.amplifier()?.set_volume(self.zone, target).await
    }

    pub async fn mute_volume(&self, mute: bool) -> Result<()> {
        self.amplifier()?.set_mute(self.zone, mute).await
    }

    // ========== Input Selection ==========

    pub async fn select_source(&self, source: &str) -> Result<()> {
        let Some(id) = self.sources.id(source) else {
            tracing::warn!("Zone {}: unknown source {:?}", self.zone, source);
            return Err(NuvoError::UnknownSource(source.to_string()));
        };
        self.amplifier()?.set_source(self.zone, id).await
    }

    // ========== Tone Control ==========

    /// Set bass from a normalized 0..1 level, or from a native level when `native` is set
    pub async fn set_bass(&self, bass: HostValue, native: bool) -> Result<()> {
        let value = if native {
            convert::to_device_signed(bass, &self.model.bass)?
        } else {
            convert::to_device_eq(bass, &self.model.bass)?
        };
        self.amplifier()?.set_bass(self.zone, value).await
    }

    /// Set treble from a normalized 0..1 level
    pub async fn set_treble(&self, treble: HostValue) -> Result<()> {
        let value = convert::to_device_eq(treble, &self.model.treble)?;
        self.amplifier()?.set_treble(self.zone, value).await
    }

    /// Set balance from a signed value, negative = left
    pub async fn set_balance(&self, balance: HostValue) -> Result<()> {
        let (position, magnitude) = convert::to_device_balance(balance, &self.model.balance)?;
        self.amplifier()?
            .set_balance(self.zone, position, magnitude)
            .await
    }

    pub async fn set_loudness_comp(&self, enabled: bool) -> Result<()> {
        tracing::info!("Zone {}: loudness compensation {}", self.zone, enabled);
        self.amplifier()?.set_loudness_comp(self.zone, enabled).await
    }

    /// Flip loudness compensation; an unknown state counts as off
    pub async fn toggle_loudness_comp(&self) -> Result<()> {
        let current = self
            .dispatcher
            .read(|t| t.state.loudness_compensation)
            .unwrap_or(false);
        self.set_loudness_comp(!current).await
    }

    /// Ask the amplifier to push this zone's EQ status
    pub async fn eq_request(&self) -> Result<()> {
        self.amplifier()?
            .request(Query::ZoneEqStatus { zone: self.zone })
            .await
    }

    // ========== Paging ==========

    pub async fn page_on(&self) -> Result<()> {
        self.amplifier()?.set_page_on().await
    }

    pub async fn page_off(&self) -> Result<()> {
        self.amplifier()?.set_page_off().await
    }

    // ========== Snapshot / Restore ==========

    /// Save the zone's current status as reported by the amplifier
    pub async fn snapshot(&self) -> Result<()> {
        let status = self.amplifier()?.zone_status(self.zone).await?;
        tracing::debug!("Zone {}: snapshot {:?}", self.zone, status);
        *self.snapshot.lock().unwrap_or_else(PoisonError::into_inner) = Some(status);
        Ok(())
    }

    /// Re-issue power, source, volume and mute from the saved snapshot
    ///
    /// Does nothing when no snapshot was taken.
    pub async fn restore(&self) -> Result<()> {
        let saved = self
            .snapshot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let Some(status) = saved else {
            return Ok(());
        };

        let amplifier = self.amplifier()?;
        amplifier.set_power(self.zone, status.power).await?;
        if status.power {
            if let Some(source) = status.source {
                amplifier.set_source(self.zone, source).await?;
            }
            if let Some(volume) = status.volume {
                amplifier.set_volume(self.zone, volume).await?;
            }
            amplifier.set_mute(self.zone, status.mute).await?;
        }
        amplifier.request(Query::ZoneStatus { zone: self.zone }).await
    }
}

#[async_trait]
impl Entity for ZonePlayer {
    fn entity_id(&self) -> &EntityId {
        self.dispatcher.id()
    }

    fn name(&self) -> String {
        self.name.clone()
    }

    fn device_info(&self) -> DeviceInfo {
        self.device.clone()
    }

    fn available(&self) -> bool {
        self.dispatcher.available()
    }

    fn lifecycle(&self) -> Lifecycle {
        self.dispatcher.lifecycle()
    }

    fn state_json(&self) -> serde_json::Value {
        let state = self.state_snapshot();
        let power = match state.power {
            Some(true) => "on",
            Some(false) => "off",
            None => "unknown",
        };
        json!({
            "state": power,
            "volume_level": state.volume,
            "is_volume_muted": state.mute,
            "source": state.source,
            "media_title": state.source,
            "source_list": state.source_list,
            "supported_features": SUPPORTED_FEATURES,
            "loudness_compensation": state.loudness_compensation,
            "bass_level": state.bass,
            "bass_level_native": state.bass_native,
            "treble_level": state.treble,
        })
    }

    async fn on_attach(&self) -> Result<()> {
        let amplifier = self.dispatcher.attach()?;
        amplifier.request(Query::ZoneStatus { zone: self.zone }).await?;
        amplifier
            .request(Query::ZoneConfiguration { zone: self.zone })
            .await?;
        amplifier.request(Query::ZoneEqStatus { zone: self.zone }).await
    }

    fn on_detach(&self) {
        self.dispatcher.detach();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Connection;
    use crate::models;
    use crate::protocol::{Command, Notification, Request};
    use crate::types::{BalancePosition, ZoneConfiguration, ZoneEqStatus};
    use std::collections::BTreeMap;
    use tokio::sync::mpsc;

    fn player(zone: ZoneId) -> (Arc<Connection>, mpsc::UnboundedReceiver<Request>, ZonePlayer) {
        player_with_step(zone, 1)
    }

    fn player_with_step(
        zone: ZoneId,
        volume_step: NativeValue,
    ) -> (Arc<Connection>, mpsc::UnboundedReceiver<Request>, ZonePlayer) {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
        let (connection, outbox) = Connection::new();
        let connection = Arc::new(connection);
        let (refresh, _) = broadcast::channel(16);
        let sources = SourceMap::new(&BTreeMap::from([
            (1, "Sonos".to_string()),
            (2, "Tuner".to_string()),
            (4, "Turntable".to_string()),
        ]));
        let model = models::lookup("Grand_Concerto").unwrap();
        let player = ZonePlayer::new(
            connection.clone(),
            model,
            "entry",
            zone,
            "Kitchen",
            sources,
            volume_step,
            refresh,
        );
        (connection, outbox, player)
    }

    fn drain(outbox: &mut mpsc::UnboundedReceiver<Request>) -> Vec<Request> {
        let mut requests = Vec::new();
        while let Ok(request) = outbox.try_recv() {
            requests.push(request);
        }
        requests
    }

    fn status(zone: ZoneId, power: bool, volume: Option<i32>, mute: bool) -> Notification {
        Notification::new(
            MessageType::ZoneStatus,
            &ZoneStatus {
                zone,
                power,
                source: Some(2),
                volume,
                mute,
            },
        )
        .unwrap()
    }

    #[tokio::test]
    async fn attach_requests_status_configuration_and_eq() {
        let (connection, mut outbox, player) = player(3);
        player.on_attach().await.unwrap();

        assert_eq!(
            drain(&mut outbox),
            vec![
                Request::Query(Query::ZoneStatus { zone: 3 }),
                Request::Query(Query::ZoneConfiguration { zone: 3 }),
                Request::Query(Query::ZoneEqStatus { zone: 3 }),
            ]
        );
        for message_type in MESSAGE_TYPES {
            assert_eq!(connection.subscriber_count(message_type), 1);
        }
        assert_eq!(player.unique_id(), "entry_zone_3_zone");
        assert_eq!(player.source_list(), vec!["Sonos", "Tuner", "Turntable"]);
    }

    #[tokio::test]
    async fn status_updates_volume_and_source() {
        let (connection, _outbox, player) = player(3);
        player.on_attach().await.unwrap();

        connection.deliver(status(3, true, Some(40), false));
        let volume = player.volume_level().unwrap();
        assert!((volume - (1.0 - 40.0 / 79.0)).abs() < 1e-12);
        assert_eq!(player.source().as_deref(), Some("Tuner"));
        assert_eq!(player.is_on(), Some(true));

        // Muted readings keep the last audible volume
        connection.deliver(status(3, true, None, true));
        assert_eq!(player.volume_level(), Some(volume));
        assert_eq!(player.is_volume_muted(), Some(true));

        connection.deliver(status(3, false, None, false));
        assert_eq!(player.is_on(), Some(false));
        assert_eq!(player.state_json()["state"], "off");
    }

    #[tokio::test]
    async fn zone_configuration_limits_source_list() {
        let (connection, _outbox, player) = player(2);
        player.on_attach().await.unwrap();
        connection.deliver(Notification::new(
            MessageType::ZoneConfiguration,
            &ZoneConfiguration {
                zone: 2,
                enabled: true,
                name: "Den".to_string(),
                sources: vec!["SOURCE1".into(), "SOURCE3".into(), "SOURCE4".into()],
            },
        )
        .unwrap());
        assert_eq!(player.source_list(), vec!["Sonos", "Turntable"]);
    }

    #[tokio::test]
    async fn eq_status_is_normalized() {
        let (connection, _outbox, player) = player(2);
        player.on_attach().await.unwrap();
        connection.deliver(Notification::new(
            MessageType::ZoneEqStatus,
            &ZoneEqStatus {
                zone: 2,
                bass: 0,
                treble: 18,
                loudcmp: true,
                balance_position: BalancePosition::Right,
                balance: 4,
            },
        )
        .unwrap());
        let state = player.state_snapshot();
        assert_eq!(state.bass, Some(0.5));
        assert_eq!(state.bass_native, Some(0));
        assert_eq!(state.treble, Some(1.0));
        assert_eq!(state.balance, Some(4.0));
        assert_eq!(state.loudness_compensation, Some(true));
    }

    #[tokio::test]
    async fn volume_commands() {
        let (connection, mut outbox, player) = player(1);
        player.on_attach().await.unwrap();
        drain(&mut outbox);

        // Unknown volume: stepping is a no-op
        player.volume_up().await.unwrap();
        assert!(drain(&mut outbox).is_empty());

        player.set_volume_level(0.4937).await.unwrap();
        connection.deliver(status(1, true, Some(40), false));
        player.volume_up().await.unwrap();
        player.volume_down().await.unwrap();
        assert_eq!(
            drain(&mut outbox),
            vec![
                Request::Command(Command::SetVolume { zone: 1, volume: 40 }),
                Request::Command(Command::SetVolume { zone: 1, volume: 39 }),
                Request::Command(Command::SetVolume { zone: 1, volume: 41 }),
            ]
        );

        connection.deliver(status(1, true, Some(0), false));
        player.volume_up().await.unwrap();
        assert_eq!(
            drain(&mut outbox),
            vec![Request::Command(Command::SetVolume { zone: 1, volume: 0 })]
        );
    }

    #[tokio::test]
    async fn oversized_volume_step_stops_at_scale_ends() {
        let (connection, mut outbox, player) = player_with_step(1, NativeValue::MAX);
        player.on_attach().await.unwrap();
        drain(&mut outbox);

        connection.deliver(status(1, true, Some(40), false));
        player.volume_down().await.unwrap();
        player.volume_up().await.unwrap();
        assert_eq!(
            drain(&mut outbox),
            vec![
                Request::Command(Command::SetVolume { zone: 1, volume: 79 }),
                Request::Command(Command::SetVolume { zone: 1, volume: 0 }),
            ]
        );
    }

    #[tokio::test]
    async fn tone_and_source_commands() {
        let (_connection, mut outbox, player) = player(1);
        player.on_attach().await.unwrap();
        drain(&mut outbox);

        player.set_bass(0.75, false).await.unwrap();
        player.set_bass(-6.0, true).await.unwrap();
        player.set_treble(0.0).await.unwrap();
        player.set_balance(-5.0).await.unwrap();
        player.select_source("Turntable").await.unwrap();
        assert!(matches!(
            player.select_source("Radio").await,
            Err(NuvoError::UnknownSource(_))
        ));
        player.toggle_loudness_comp().await.unwrap();

        assert_eq!(
            drain(&mut outbox),
            vec![
                Request::Command(Command::SetBass { zone: 1, bass: 8 }),
                Request::Command(Command::SetBass { zone: 1, bass: -6 }),
                Request::Command(Command::SetTreble { zone: 1, treble: -18 }),
                Request::Command(Command::SetBalance {
                    zone: 1,
                    position: BalancePosition::Left,
                    balance: 5
                }),
                Request::Command(Command::SetSource { zone: 1, source: 4 }),
                Request::Command(Command::SetLoudnessComp { zone: 1, enabled: true }),
            ]
        );
    }

    #[tokio::test]
    async fn snapshot_and_restore() {
        let (connection, mut outbox, player) = player(6);
        let player = Arc::new(player);
        player.on_attach().await.unwrap();
        drain(&mut outbox);

        // Nothing saved yet
        player.restore().await.unwrap();
        assert!(drain(&mut outbox).is_empty());

        let device = connection.clone();
        let answer = tokio::spawn(async move {
            while let Some(request) = outbox.recv().await {
                if request == Request::Query(Query::ZoneStatus { zone: 6 }) {
                    device.deliver(status(6, true, Some(30), false));
                    break;
                }
            }
            outbox
        });
        player.snapshot().await.unwrap();
        let mut outbox = answer.await.unwrap();

        player.restore().await.unwrap();
        assert_eq!(
            drain(&mut outbox),
            vec![
                Request::Command(Command::SetPower { zone: 6, on: true }),
                Request::Command(Command::SetSource { zone: 6, source: 2 }),
                Request::Command(Command::SetVolume { zone: 6, volume: 30 }),
                Request::Command(Command::SetMute { zone: 6, mute: false }),
                Request::Query(Query::ZoneStatus { zone: 6 }),
            ]
        );
    }

    #[tokio::test]
    async fn detach_stops_updates() {
        let (connection, _outbox, player) = player(3);
        player.on_attach().await.unwrap();
        connection.deliver(status(3, true, Some(10), false));
        player.on_detach();

        for message_type in MESSAGE_TYPES {
            assert_eq!(connection.subscriber_count(message_type), 0);
        }
        connection.deliver(status(3, true, Some(70), false));
        assert_eq!(player.source().as_deref(), Some("Tuner"));
        assert!((player.volume_level().unwrap() - (1.0 - 10.0 / 79.0)).abs() < 1e-12);
        assert!(matches!(player.turn_on().await, Err(NuvoError::ConnectionUnavailable)));
    }
}
