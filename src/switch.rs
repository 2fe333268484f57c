use crate::amplifier::Amplifier;
use crate::dispatcher::{Dispatcher, Lifecycle, Tracker};
use crate::entity::{DeviceInfo, Entity, EntityId};
use crate::error::{NuvoError, Result};
use crate::models::ModelSpec;
use crate::protocol::{DeviceEvent, MessageType, Query};
use crate::types::{Target, ZoneId};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::broadcast;

#[derive(Default)]
struct LoudnessTracker {
    enabled: Option<bool>,
}

impl Tracker for LoudnessTracker {
    fn apply(&mut self, event: &DeviceEvent) -> Result<()> {
        match event {
            DeviceEvent::ZoneEqStatus(eq) => {
                self.enabled = Some(eq.loudcmp);
                Ok(())
            }
            other => Err(NuvoError::MalformedMessage(format!(
                "loudcmp cannot be read from {:?}",
                other.message_type()
            ))),
        }
    }
}

/// Loudness compensation switch for one zone
pub struct LoudnessSwitch {
    zone: ZoneId,
    name: String,
    device: DeviceInfo,
    dispatcher: Dispatcher<LoudnessTracker>,
}

impl LoudnessSwitch {
    pub fn new(
        amplifier: Arc<dyn Amplifier>,
        model: &ModelSpec,
        namespace: &str,
        zone: ZoneId,
        zone_name: &str,
        refresh: broadcast::Sender<EntityId>,
    ) -> Self {
        Self {
            zone,
            name: format!("{} Loudness Compensation", zone_name),
            device: DeviceInfo::new(namespace, model),
            dispatcher: Dispatcher::new(
                EntityId::new(namespace, Target::zone(zone), "loudcmp"),
                &[MessageType::ZoneEqStatus],
                amplifier,
                LoudnessTracker::default(),
                refresh,
            ),
        }
    }

    /// Last confirmed state, `None` until the amplifier reports one
    pub fn is_on(&self) -> Option<bool> {
        self.dispatcher.read(|t| t.enabled)
    }

    pub async fn set_value(&self, enabled: bool) -> Result<()> {
        self.dispatcher
            .amplifier()?
            .set_loudness_comp(self.zone, enabled)
            .await
    }

    pub async fn turn_on(&self) -> Result<()> {
        self.set_value(true).await
    }

    pub async fn turn_off(&self) -> Result<()> {
        self.set_value(false).await
    }
}

#[async_trait]
impl Entity for LoudnessSwitch {
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
        let state = match self.is_on() {
            Some(true) => "on",
            Some(false) => "off",
            None => "unknown",
        };
        json!({ "state": state, "zone_id": self.zone })
    }

    async fn on_attach(&self) -> Result<()> {
        let amplifier = self.dispatcher.attach()?;
        amplifier.request(Query::ZoneEqStatus { zone: self.zone }).await
    }

    fn on_detach(&self) {
        self.dispatcher.detach();
    }
}
