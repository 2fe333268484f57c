//! Drives a simulated amplifier through a `NuvoClient` and prints every state refresh

use nuvo_zones::{
    AmplifierConfig, BalancePosition, Command, Connection, Entity, MessageType, Notification, NuvoClient, Query,
    Request, SourceConfiguration, ZoneConfiguration, ZoneEqStatus, ZoneStatus, ZoneVolumeConfiguration,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

const CONFIG: &str = r#"{
    "port": "/dev/ttyUSB0",
    "type": "Grand_Concerto",
    "entry_id": "demo",
    "zones": { "1": "Kitchen", "2": "Patio" },
    "sources": { "1": "Sonos", "2": "Tuner" }
}"#;

/// In-memory amplifier answering the outbound queue like the serial link would
struct SimulatedAmplifier {
    status: BTreeMap<u8, ZoneStatus>,
    eq: BTreeMap<u8, ZoneEqStatus>,
}

impl SimulatedAmplifier {
    fn new() -> Self {
        let mut status = BTreeMap::new();
        let mut eq = BTreeMap::new();
        for zone in 1..=2 {
            status.insert(
                zone,
                ZoneStatus {
                    zone,
                    power: true,
                    source: Some(1),
                    volume: Some(40),
                    mute: false,
                },
            );
            eq.insert(
                zone,
                ZoneEqStatus {
                    zone,
                    bass: 0,
                    treble: 0,
                    loudcmp: false,
                    balance_position: BalancePosition::Center,
                    balance: 0,
                },
            );
        }
        Self { status, eq }
    }

    fn status(&self, zone: u8) -> Option<Notification> {
        let status = self.status.get(&zone)?;
        Notification::new(MessageType::ZoneStatus, status).ok()
    }

    fn eq(&self, zone: u8) -> Option<Notification> {
        let eq = self.eq.get(&zone)?;
        Notification::new(MessageType::ZoneEqStatus, eq).ok()
    }

    fn answer(&self, query: Query) -> Option<Notification> {
        match query {
            Query::ZoneStatus { zone } => self.status(zone),
            Query::ZoneEqStatus { zone } => self.eq(zone),
            Query::ZoneConfiguration { zone } => Notification::new(
                MessageType::ZoneConfiguration,
                &ZoneConfiguration {
                    zone,
                    enabled: true,
                    name: format!("Zone {}", zone),
                    sources: vec!["SOURCE1".to_string(), "SOURCE2".to_string()],
                },
            )
            .ok(),
            Query::ZoneVolumeConfiguration { zone } => Notification::new(
                MessageType::ZoneVolumeConfiguration,
                &ZoneVolumeConfiguration {
                    zone,
                    max_vol: 0,
                    ini_vol: 40,
                    page_vol: 30,
                    party_vol: 35,
                    vol_rst: false,
                },
            )
            .ok(),
            Query::SourceConfiguration { source } => Notification::new(
                MessageType::SourceConfiguration,
                &SourceConfiguration {
                    source,
                    enabled: true,
                    name: format!("Source {}", source),
                    gain: 4,
                },
            )
            .ok(),
        }
    }

    fn apply(&mut self, command: Command) -> Option<Notification> {
        match command {
            Command::SetVolume { zone, volume } => {
                let status = self.status.get_mut(&zone)?;
                status.volume = Some(volume);
                self.status(zone)
            }
            Command::SetMute { zone, mute } => {
                let status = self.status.get_mut(&zone)?;
                status.mute = mute;
                self.status(zone)
            }
            Command::SetSource { zone, source } => {
                let status = self.status.get_mut(&zone)?;
                status.source = Some(source);
                self.status(zone)
            }
            Command::SetBass { zone, bass } => {
                self.eq.get_mut(&zone)?.bass = bass;
                self.eq(zone)
            }
            Command::SetLoudnessComp { zone, enabled } => {
                self.eq.get_mut(&zone)?.loudcmp = enabled;
                self.eq(zone)
            }
            other => {
                tracing::info!("Simulated amplifier ignores {:?}", other);
                None
            }
        }
    }
}

async fn run_amplifier(connection: Arc<Connection>, mut outbox: mpsc::UnboundedReceiver<Request>) {
    let mut amplifier = SimulatedAmplifier::new();
    while let Some(request) = outbox.recv().await {
        let reply = match request {
            Request::Query(query) => amplifier.answer(query),
            Request::Command(command) => amplifier.apply(command),
        };
        if let Some(notification) = reply {
            // Serial round trip
            tokio::time::sleep(Duration::from_millis(20)).await;
            connection.deliver(notification);
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = AmplifierConfig::from_json_str(CONFIG)?;
    let (connection, outbox) = Connection::new();
    let connection = Arc::new(connection);
    tokio::spawn(run_amplifier(connection.clone(), outbox));

    let client = NuvoClient::new(connection.clone(), config)?;
    let mut refresh = client.subscribe_refresh();
    client.attach_all().await?;

    if let Some(kitchen) = client.zone(1) {
        kitchen.snapshot().await?;
        kitchen.select_source("Tuner").await?;
        kitchen.set_volume_level(0.75).await?;
        kitchen.set_bass(0.75, false).await?;
        kitchen.toggle_loudness_comp().await?;
        tokio::time::sleep(Duration::from_millis(200)).await;
        kitchen.restore().await?;
    }

    let entities = client.entities();
    let deadline = tokio::time::sleep(Duration::from_secs(1));
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            _ = &mut deadline => break,
            changed = refresh.recv() => {
                let id = changed?;
                if let Some(entity) = entities.iter().find(|e| *e.entity_id() == id) {
                    println!("{:<40} {}", entity.name(), entity.state_json());
                }
            }
        }
    }

    client.detach_all();
    connection.close();
    Ok(())
}
