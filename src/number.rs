use crate::amplifier::Amplifier;
use crate::convert;
use crate::dispatcher::{Dispatcher, Lifecycle, Tracker};
use crate::entity::{DeviceInfo, Entity, EntityId};
use crate::error::{NuvoError, Result};
use crate::models::ModelSpec;
use crate::protocol::{Command, DeviceEvent, MessageType, Query};
use crate::types::{ControlKind, ControlScale, EntityKind, HostValue, Target};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::broadcast;

/// The numeric controls exposed per zone or source
///
/// Each variant carries its own getter ([`NumberKind::read`]) and setter
/// ([`NumberKind::command`]) between device events and host values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NumberKind {
    Bass,
    Treble,
    Balance,
    SourceGain,
    VolumeMax,
    VolumeInitial,
    VolumePage,
    VolumeParty,
}

impl NumberKind {
    /// Controls created for every zone
    pub const ZONE_CONTROLS: [NumberKind; 7] = [
        NumberKind::Bass,
        NumberKind::Treble,
        NumberKind::Balance,
        NumberKind::VolumeMax,
        NumberKind::VolumeInitial,
        NumberKind::VolumePage,
        NumberKind::VolumeParty,
    ];

    /// Controls created for every source
    pub const SOURCE_CONTROLS: [NumberKind; 1] = [NumberKind::SourceGain];

    pub fn control_name(&self) -> &'static str {
        match self {
            NumberKind::Bass => "bass",
            NumberKind::Treble => "treble",
            NumberKind::Balance => "balance",
            NumberKind::SourceGain => "gain",
            NumberKind::VolumeMax => "max_vol",
            NumberKind::VolumeInitial => "ini_vol",
            NumberKind::VolumePage => "page_vol",
            NumberKind::VolumeParty => "party_vol",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            NumberKind::Bass => "Bass",
            NumberKind::Treble => "Treble",
            NumberKind::Balance => "Balance",
            NumberKind::SourceGain => "Gain",
            NumberKind::VolumeMax => "Volume Max",
            NumberKind::VolumeInitial => "Volume Initial",
            NumberKind::VolumePage => "Volume Page",
            NumberKind::VolumeParty => "Volume Party",
        }
    }

    pub fn entity_kind(&self) -> EntityKind {
        match self {
            NumberKind::SourceGain => EntityKind::Source,
            _ => EntityKind::Zone,
        }
    }

    /// Which scale in the model table applies
    pub fn control_kind(&self) -> ControlKind {
        match self {
            NumberKind::Bass => ControlKind::Bass,
            NumberKind::Treble => ControlKind::Treble,
            NumberKind::Balance => ControlKind::Balance,
            NumberKind::SourceGain => ControlKind::Gain,
            NumberKind::VolumeMax
            | NumberKind::VolumeInitial
            | NumberKind::VolumePage
            | NumberKind::VolumeParty => ControlKind::Volume,
        }
    }

    pub fn message_type(&self) -> MessageType {
        match self {
            NumberKind::Bass | NumberKind::Treble | NumberKind::Balance => MessageType::ZoneEqStatus,
            NumberKind::SourceGain => MessageType::SourceConfiguration,
            _ => MessageType::ZoneVolumeConfiguration,
        }
    }

    fn is_volume(&self) -> bool {
        self.control_kind() == ControlKind::Volume
    }

    /// Query answering with this control's current value
    pub fn query(&self, id: u8) -> Query {
        match self.message_type() {
            MessageType::ZoneEqStatus => Query::ZoneEqStatus { zone: id },
            MessageType::SourceConfiguration => Query::SourceConfiguration { source: id },
            _ => Query::ZoneVolumeConfiguration { zone: id },
        }
    }

    /// Extract this control's host value from a device event
    pub fn read(&self, event: &DeviceEvent, scale: &ControlScale) -> Result<HostValue> {
        match (self, event) {
            (NumberKind::Bass, DeviceEvent::ZoneEqStatus(eq)) => convert::to_host_signed(eq.bass, scale),
            (NumberKind::Treble, DeviceEvent::ZoneEqStatus(eq)) => {
                convert::to_host_signed(eq.treble, scale)
            }
            (NumberKind::Balance, DeviceEvent::ZoneEqStatus(eq)) => {
                scale.validate()?;
                Ok(convert::to_host_balance(eq.balance_position, eq.balance))
            }
            (NumberKind::SourceGain, DeviceEvent::SourceConfiguration(src)) => {
                convert::to_host_signed(src.gain, scale)
            }
            (NumberKind::VolumeMax, DeviceEvent::ZoneVolumeConfiguration(v)) => {
                convert::to_host_attenuation(v.max_vol, scale)
            }
            (NumberKind::VolumeInitial, DeviceEvent::ZoneVolumeConfiguration(v)) => {
                convert::to_host_attenuation(v.ini_vol, scale)
            }
            (NumberKind::VolumePage, DeviceEvent::ZoneVolumeConfiguration(v)) => {
                convert::to_host_attenuation(v.page_vol, scale)
            }
            (NumberKind::VolumeParty, DeviceEvent::ZoneVolumeConfiguration(v)) => {
                convert::to_host_attenuation(v.party_vol, scale)
            }
            (kind, other) => Err(NuvoError::MalformedMessage(format!(
                "{} cannot be read from {:?}",
                kind.control_name(),
                other.message_type()
            ))),
        }
    }

    /// Build the command setting this control to a host value
    pub fn command(&self, id: u8, host: HostValue, scale: &ControlScale) -> Result<Command> {
        let command = match self {
            NumberKind::Bass => Command::SetBass {
                zone: id,
                bass: convert::to_device_signed(host, scale)?,
            },
            NumberKind::Treble => Command::SetTreble {
                zone: id,
                treble: convert::to_device_signed(host, scale)?,
            },
            NumberKind::Balance => {
                let (position, balance) = convert::to_device_balance(host, scale)?;
                Command::SetBalance {
                    zone: id,
                    position,
                    balance,
                }
            }
            NumberKind::SourceGain => Command::SetSourceGain {
                source: id,
                gain: convert::to_device_signed(host, scale)?,
            },
            NumberKind::VolumeMax => Command::ZoneVolumeMax {
                zone: id,
                volume: convert::to_device_attenuation(host, scale)?,
            },
            NumberKind::VolumeInitial => Command::ZoneVolumeInitial {
                zone: id,
                volume: convert::to_device_attenuation(host, scale)?,
            },
            NumberKind::VolumePage => Command::ZoneVolumePage {
                zone: id,
                volume: convert::to_device_attenuation(host, scale)?,
            },
            NumberKind::VolumeParty => Command::ZoneVolumeParty {
                zone: id,
                volume: convert::to_device_attenuation(host, scale)?,
            },
        };
        Ok(command)
    }

    /// Host-side (min, max) for a scale
    pub fn host_range(&self, scale: &ControlScale) -> (HostValue, HostValue) {
        let (lower, upper) = (scale.lower(), scale.upper());
        let (min, max) = match self {
            NumberKind::Balance => (-upper, upper),
            _ if self.is_volume() => (-upper, -lower),
            _ => (lower, upper),
        };
        (f64::from(min), f64::from(max))
    }
}

struct NumberTracker {
    kind: NumberKind,
    scale: ControlScale,
    value: Option<HostValue>,
}

impl Tracker for NumberTracker {
    fn apply(&mut self, event: &DeviceEvent) -> Result<()> {
        self.value = Some(self.kind.read(event, &self.scale)?);
        Ok(())
    }
}

/// A numeric control entity for one zone or source
pub struct NumberControl {
    kind: NumberKind,
    name: String,
    scale: ControlScale,
    device: DeviceInfo,
    dispatcher: Dispatcher<NumberTracker>,
}

impl NumberControl {
    pub fn new(
        amplifier: Arc<dyn Amplifier>,
        model: &ModelSpec,
        namespace: &str,
        id: u8,
        entity_name: &str,
        kind: NumberKind,
        refresh: broadcast::Sender<EntityId>,
    ) -> Self {
        let target = Target {
            kind: kind.entity_kind(),
            id,
        };
        let scale = model.scale(kind.control_kind());
        let dispatcher = Dispatcher::new(
            EntityId::new(namespace, target, kind.control_name()),
            &[kind.message_type()],
            amplifier,
            NumberTracker {
                kind,
                scale,
                value: None,
            },
            refresh,
        );

        Self {
            kind,
            name: format!("{} {}", entity_name, kind.label()),
            scale,
            device: DeviceInfo::new(namespace, model),
            dispatcher,
        }
    }

    pub fn kind(&self) -> NumberKind {
        self.kind
    }

    /// Last confirmed value, `None` until the amplifier reports one
    pub fn value(&self) -> Option<HostValue> {
        self.dispatcher.read(|t| t.value)
    }

    pub fn min_value(&self) -> HostValue {
        self.kind.host_range(&self.scale).0
    }

    pub fn max_value(&self) -> HostValue {
        self.kind.host_range(&self.scale).1
    }

    pub fn step(&self) -> HostValue {
        f64::from(self.scale.step)
    }

    pub fn unit_of_measurement(&self) -> Option<&'static str> {
        self.kind.is_volume().then_some("dB")
    }

    /// Send a new value; the displayed value changes only once the amplifier confirms it
    pub async fn set_value(&self, value: HostValue) -> Result<()> {
        let command = self
            .kind
            .command(self.dispatcher.id().target.id, value, &self.scale)?;
        self.dispatcher.amplifier()?.send(command).await
    }
}

#[async_trait]
impl Entity for NumberControl {
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
        let target = self.dispatcher.id().target;
        let mut state = json!({
            "value": self.value(),
            "min": self.min_value(),
            "max": self.max_value(),
            "step": self.step(),
            "unit_of_measurement": self.unit_of_measurement(),
        });
        state[format!("{}_id", target.kind)] = json!(target.id);
        state
    }

    async fn on_attach(&self) -> Result<()> {
        let amplifier = self.dispatcher.attach()?;
        amplifier
            .request(self.kind.query(self.dispatcher.id().target.id))
            .await
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
    use crate::protocol::{Notification, Request};
    use crate::types::{BalancePosition, SourceConfiguration, ZoneEqStatus, ZoneVolumeConfiguration};
    use tokio::sync::mpsc;

    fn control(
        kind: NumberKind,
        id: u8,
    ) -> (Arc<Connection>, mpsc::UnboundedReceiver<Request>, NumberControl) {
        let (connection, outbox) = Connection::new();
        let connection = Arc::new(connection);
        let (refresh, _) = broadcast::channel(16);
        let model = models::lookup("Grand_Concerto").unwrap();
        let control = NumberControl::new(connection.clone(), model, "entry", id, "Kitchen", kind, refresh);
        (connection, outbox, control)
    }

    fn eq(zone: u8, position: BalancePosition, balance: i32) -> Notification {
        Notification::new(
            MessageType::ZoneEqStatus,
            &ZoneEqStatus {
                zone,
                bass: 6,
                treble: -4,
                loudcmp: true,
                balance_position: position,
                balance,
            },
        )
        .unwrap()
    }

    #[tokio::test]
    async fn attach_subscribes_and_requests_initial_value() {
        let (connection, mut outbox, bass) = control(NumberKind::Bass, 5);
        bass.on_attach().await.unwrap();

        assert_eq!(bass.lifecycle(), Lifecycle::Subscribed);
        assert_eq!(connection.subscriber_count(MessageType::ZoneEqStatus), 1);
        assert_eq!(
            outbox.try_recv().unwrap(),
            Request::Query(Query::ZoneEqStatus { zone: 5 })
        );
        assert_eq!(bass.value(), None);

        connection.deliver(eq(5, BalancePosition::Center, 0));
        assert_eq!(bass.value(), Some(6.0));
        assert!(bass.available());
        assert_eq!(bass.lifecycle(), Lifecycle::Live);
    }

    #[tokio::test]
    async fn balance_left_is_negative() {
        let (connection, _outbox, balance) = control(NumberKind::Balance, 2);
        balance.on_attach().await.unwrap();
        connection.deliver(eq(2, BalancePosition::Left, 8));
        assert_eq!(balance.value(), Some(-8.0));
        connection.deliver(eq(2, BalancePosition::Right, 4));
        assert_eq!(balance.value(), Some(4.0));
        assert_eq!(balance.min_value(), -18.0);
        assert_eq!(balance.max_value(), 18.0);
    }

    #[tokio::test]
    async fn zone_five_ignores_zone_three() {
        let (connection, _outbox, treble) = control(NumberKind::Treble, 5);
        treble.on_attach().await.unwrap();
        connection.deliver(eq(5, BalancePosition::Center, 0));
        let before = treble.value();
        connection.deliver(Notification::new(
            MessageType::ZoneEqStatus,
            &ZoneEqStatus {
                zone: 3,
                bass: 0,
                treble: 12,
                loudcmp: false,
                balance_position: BalancePosition::Center,
                balance: 0,
            },
        )
        .unwrap());
        assert_eq!(treble.value(), before);
    }

    #[tokio::test]
    async fn set_value_issues_commands_without_touching_state() {
        let (connection, mut outbox, balance) = control(NumberKind::Balance, 4);
        balance.on_attach().await.unwrap();
        let _ = outbox.try_recv();

        balance.set_value(-5.0).await.unwrap();
        assert_eq!(
            outbox.try_recv().unwrap(),
            Request::Command(Command::SetBalance {
                zone: 4,
                position: BalancePosition::Left,
                balance: 5
            })
        );
        balance.set_value(0.0).await.unwrap();
        assert_eq!(
            outbox.try_recv().unwrap(),
            Request::Command(Command::SetBalance {
                zone: 4,
                position: BalancePosition::Center,
                balance: 0
            })
        );
        // Only a confirming push updates the value
        assert_eq!(balance.value(), None);
        connection.deliver(eq(4, BalancePosition::Left, 5));
        assert_eq!(balance.value(), Some(-5.0));
    }

    #[tokio::test]
    async fn volume_presets_are_negated_both_ways() {
        let (connection, mut outbox, max_vol) = control(NumberKind::VolumeMax, 1);
        max_vol.on_attach().await.unwrap();
        assert_eq!(
            outbox.try_recv().unwrap(),
            Request::Query(Query::ZoneVolumeConfiguration { zone: 1 })
        );

        connection.deliver(Notification::new(
            MessageType::ZoneVolumeConfiguration,
            &ZoneVolumeConfiguration {
                zone: 1,
                max_vol: 10,
                ini_vol: 40,
                page_vol: 30,
                party_vol: 35,
                vol_rst: false,
            },
        )
        .unwrap());
        assert_eq!(max_vol.value(), Some(-10.0));
        assert_eq!(max_vol.min_value(), -79.0);
        assert_eq!(max_vol.max_value(), 0.0);
        assert_eq!(max_vol.unit_of_measurement(), Some("dB"));

        max_vol.set_value(-20.0).await.unwrap();
        assert_eq!(
            outbox.try_recv().unwrap(),
            Request::Command(Command::ZoneVolumeMax { zone: 1, volume: 20 })
        );
    }

    #[tokio::test]
    async fn source_gain_follows_source_configuration() {
        let (connection, mut outbox, gain) = control(NumberKind::SourceGain, 3);
        gain.on_attach().await.unwrap();
        assert_eq!(
            outbox.try_recv().unwrap(),
            Request::Query(Query::SourceConfiguration { source: 3 })
        );
        assert_eq!(gain.unique_id(), "entry_source_3_gain");

        connection.deliver(Notification::new(
            MessageType::SourceConfiguration,
            &SourceConfiguration {
                source: 3,
                enabled: true,
                name: "Tuner".to_string(),
                gain: 7,
            },
        )
        .unwrap());
        assert_eq!(gain.value(), Some(7.0));
        assert_eq!(gain.state_json()["source_id"], 3);

        gain.set_value(20.0).await.unwrap();
        assert_eq!(
            outbox.try_recv().unwrap(),
            Request::Command(Command::SetSourceGain { source: 3, gain: 14 })
        );
    }

    #[tokio::test]
    async fn detached_control_reports_connection_unavailable() {
        let (connection, _outbox, bass) = control(NumberKind::Bass, 5);
        bass.on_attach().await.unwrap();
        bass.on_detach();
        assert_eq!(connection.subscriber_count(MessageType::ZoneEqStatus), 0);
        assert!(matches!(
            bass.set_value(2.0).await,
            Err(NuvoError::ConnectionUnavailable)
        ));
    }

    #[test]
    fn bass_command_snaps_to_step() {
        let scale = ControlScale::new(-18, 18, 2);
        assert_eq!(
            NumberKind::Bass.command(2, 7.0, &scale).unwrap(),
            Command::SetBass { zone: 2, bass: 6 }
        );
        assert_eq!(
            NumberKind::Bass.command(2, 7.2, &scale).unwrap(),
            Command::SetBass { zone: 2, bass: 8 }
        );
    }

    #[test]
    fn out_of_range_values_clamp_instead_of_overflowing() {
        let model = models::lookup("Grand_Concerto").unwrap();
        let eq = model.scale(ControlKind::Bass);
        let gain = model.scale(ControlKind::Gain);
        assert_eq!(
            NumberKind::Bass.command(1, 1e10, &eq).unwrap(),
            Command::SetBass { zone: 1, bass: 18 }
        );
        assert_eq!(
            NumberKind::Treble.command(1, -1e9, &eq).unwrap(),
            Command::SetTreble { zone: 1, treble: -18 }
        );
        assert_eq!(
            NumberKind::SourceGain.command(3, 1e10, &gain).unwrap(),
            Command::SetSourceGain { source: 3, gain: 14 }
        );
    }
}
