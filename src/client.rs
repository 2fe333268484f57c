use crate::amplifier::Amplifier;
use crate::config::{AmplifierConfig, SourceMap};
use crate::entity::{Entity, EntityId};
use crate::error::Result;
use crate::models::ModelSpec;
use crate::number::{NumberControl, NumberKind};
use crate::subscription::RefreshReceiver;
use crate::switch::LoudnessSwitch;
use crate::types::ZoneId;
use crate::zone::ZonePlayer;
use futures_util::future::join_all;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Every entity of one configured amplifier
///
/// The `NuvoClient` builds a media player, a loudness switch and the numeric
/// controls for each configured zone, plus a gain control for each configured
/// source. All of them share one amplifier connection and one refresh channel.
pub struct NuvoClient {
    config: AmplifierConfig,
    model: &'static ModelSpec,
    refresh: broadcast::Sender<EntityId>,
    zones: Vec<Arc<ZonePlayer>>,
    switches: Vec<Arc<LoudnessSwitch>>,
    numbers: Vec<Arc<NumberControl>>,
}

impl NuvoClient {
    /// Build the entities for a validated configuration
    ///
    /// # Example
    ///
    /// ```no_run
    /// use nuvo_zones::{AmplifierConfig, Connection, NuvoClient};
    /// use std::sync::Arc;
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), Box<dyn std::error::Error>> {
    ///     let config = AmplifierConfig::from_path("nuvo.json")?;
    ///     let (connection, _outbox) = Connection::new();
    ///     let client = NuvoClient::new(Arc::new(connection), config)?;
    ///     client.attach_all().await?;
    ///
    ///     if let Some(zone) = client.zone(1) {
    ///         zone.set_volume_level(0.5).await?;
    ///     }
    ///     Ok(())
    /// }
    /// ```
    pub fn new(amplifier: Arc<dyn Amplifier>, config: AmplifierConfig) -> Result<Self> {
        config.validate()?;
        let model = config.model_spec()?;
        let (refresh, _) = broadcast::channel(100);
        let namespace = config.entry_id.as_str();
        let sources = SourceMap::new(config.effective_sources());

        let mut zones = Vec::new();
        let mut switches = Vec::new();
        let mut numbers = Vec::new();

        for (&zone, name) in config.effective_zones() {
            zones.push(Arc::new(ZonePlayer::new(
                amplifier.clone(),
                model,
                namespace,
                zone,
                name,
                sources.clone(),
                config.volume_step,
                refresh.clone(),
            )));
            switches.push(Arc::new(LoudnessSwitch::new(
                amplifier.clone(),
                model,
                namespace,
                zone,
                name,
                refresh.clone(),
            )));
            for kind in NumberKind::ZONE_CONTROLS {
                numbers.push(Arc::new(NumberControl::new(
                    amplifier.clone(),
                    model,
                    namespace,
                    zone,
                    name,
                    kind,
                    refresh.clone(),
                )));
            }
        }

        for (&source, name) in config.effective_sources() {
            for kind in NumberKind::SOURCE_CONTROLS {
                numbers.push(Arc::new(NumberControl::new(
                    amplifier.clone(),
                    model,
                    namespace,
                    source,
                    name,
                    kind,
                    refresh.clone(),
                )));
            }
        }

        tracing::info!(
            "{}: {} zones, {} sources, {} numeric controls",
            model.display_name(),
            zones.len(),
            config.effective_sources().len(),
            numbers.len()
        );

        Ok(Self {
            config,
            model,
            refresh,
            zones,
            switches,
            numbers,
        })
    }

    pub fn config(&self) -> &AmplifierConfig {
        &self.config
    }

    pub fn model(&self) -> &'static ModelSpec {
        self.model
    }

    pub fn zones(&self) -> &[Arc<ZonePlayer>] {
        &self.zones
    }

    pub fn zone(&self, zone: ZoneId) -> Option<&Arc<ZonePlayer>> {
        self.zones.iter().find(|z| z.zone_id() == zone)
    }

    pub fn switches(&self) -> &[Arc<LoudnessSwitch>] {
        &self.switches
    }

    pub fn numbers(&self) -> &[Arc<NumberControl>] {
        &self.numbers
    }

    /// Every entity, zones first
    pub fn entities(&self) -> Vec<Arc<dyn Entity>> {
        let mut entities: Vec<Arc<dyn Entity>> = Vec::new();
        entities.extend(self.zones.iter().map(|e| e.clone() as Arc<dyn Entity>));
        entities.extend(self.switches.iter().map(|e| e.clone() as Arc<dyn Entity>));
        entities.extend(self.numbers.iter().map(|e| e.clone() as Arc<dyn Entity>));
        entities
    }

    /// Subscribe to refresh signals from every entity
    ///
    /// A signal carries the id of the entity whose state just changed.
    pub fn subscribe_refresh(&self) -> RefreshReceiver {
        RefreshReceiver::new(self.refresh.subscribe())
    }

    /// Attach every entity and issue its initial queries concurrently
    ///
    /// Returns the first error; entities that attached stay attached.
    pub async fn attach_all(&self) -> Result<()> {
        let entities = self.entities();
        let results = join_all(entities.iter().map(|e| e.on_attach())).await;
        results.into_iter().collect()
    }

    /// Detach every entity
    pub fn detach_all(&self) {
        for entity in self.entities() {
            entity.on_detach();
        }
    }

    fn selected(&self, zones: &[ZoneId]) -> Vec<Arc<ZonePlayer>> {
        self.zones
            .iter()
            .filter(|z| zones.contains(&z.zone_id()))
            .cloned()
            .collect()
    }

    /// Snapshot the given zones
    pub async fn snapshot(&self, zones: &[ZoneId]) -> Result<()> {
        let selected = self.selected(zones);
        let results = join_all(selected.iter().map(|z| z.snapshot())).await;
        results.into_iter().collect()
    }

    /// Restore the given zones from their snapshots
    pub async fn restore(&self, zones: &[ZoneId]) -> Result<()> {
        let selected = self.selected(zones);
        let results = join_all(selected.iter().map(|z| z.restore())).await;
        results.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Connection;
    use crate::dispatcher::Lifecycle;
    use crate::protocol::{MessageType, Notification, Query, Request};
    use crate::types::{SourceConfiguration, Target};

    const CONFIG: &str = r#"{
        "port": "/dev/ttyUSB0",
        "type": "Essentia_G",
        "entry_id": "abc",
        "zones": { "1": "Kitchen", "4": "Den" },
        "sources": { "2": "Tuner" }
    }"#;

    fn client() -> (Arc<Connection>, tokio::sync::mpsc::UnboundedReceiver<Request>, NuvoClient) {
        let (connection, outbox) = Connection::new();
        let connection = Arc::new(connection);
        let config = AmplifierConfig::from_json_str(CONFIG).unwrap();
        let client = NuvoClient::new(connection.clone(), config).unwrap();
        (connection, outbox, client)
    }

    #[test]
    fn builds_entities_for_configured_zones_and_sources() {
        let (_connection, _outbox, client) = client();
        assert_eq!(client.zones().len(), 2);
        assert_eq!(client.switches().len(), 2);
        assert_eq!(client.numbers().len(), 2 * NumberKind::ZONE_CONTROLS.len() + 1);
        assert_eq!(client.entities().len(), 4 + 15);
        assert!(client.zone(4).is_some());
        assert!(client.zone(2).is_none());

        let ids: Vec<String> = client.entities().iter().map(|e| e.unique_id()).collect();
        assert!(ids.contains(&"abc_zone_1_zone".to_string()));
        assert!(ids.contains(&"abc_zone_4_loudcmp".to_string()));
        assert!(ids.contains(&"abc_source_2_gain".to_string()));
    }

    #[tokio::test]
    async fn attach_all_subscribes_and_queries() {
        let (connection, mut outbox, client) = client();
        client.attach_all().await.unwrap();

        assert!(client
            .entities()
            .iter()
            .all(|e| e.lifecycle() == Lifecycle::Subscribed));
        assert_eq!(connection.subscriber_count(MessageType::SourceConfiguration), 1);

        let mut requests = Vec::new();
        while let Ok(request) = outbox.try_recv() {
            requests.push(request);
        }
        assert!(requests.contains(&Request::Query(Query::SourceConfiguration { source: 2 })));
        assert!(requests.contains(&Request::Query(Query::ZoneEqStatus { zone: 4 })));

        let mut refresh = client.subscribe_refresh();
        connection.deliver(
            Notification::new(
                MessageType::SourceConfiguration,
                &SourceConfiguration {
                    source: 2,
                    enabled: true,
                    name: "Tuner".to_string(),
                    gain: 6,
                },
            )
            .unwrap(),
        );
        let id = refresh.try_recv().unwrap().unwrap();
        assert_eq!(id.target, Target::source(2));

        client.detach_all();
        assert_eq!(connection.subscriber_count(MessageType::SourceConfiguration), 0);
        assert_eq!(connection.subscriber_count(MessageType::ZoneStatus), 0);
    }

    #[test]
    fn rejects_invalid_configuration() {
        let (connection, _outbox) = Connection::new();
        let mut config = AmplifierConfig::from_json_str(CONFIG).unwrap();
        config.zones.insert(13, "Attic".to_string());
        assert!(NuvoClient::new(Arc::new(connection), config).is_err());
    }
}
