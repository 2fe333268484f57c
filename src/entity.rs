use crate::dispatcher::Lifecycle;
use crate::error::Result;
use crate::models::ModelSpec;
use crate::types::Target;
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;

/// Integration domain used in device identifiers
pub const DOMAIN: &str = "nuvo_serial";

/// Identity of a host entity: which integration, which zone or source, which control
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityId {
    /// Config entry id of the integration instance
    pub namespace: String,
    pub target: Target,
    pub control: String,
}

impl EntityId {
    pub fn new(namespace: impl Into<String>, target: Target, control: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            target,
            control: control.into(),
        }
    }

    /// Stable unique id as registered with the host
    pub fn unique_id(&self) -> String {
        format!(
            "{}_{}_{}_{}",
            self.namespace, self.target.kind, self.target.id, self.control
        )
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.unique_id())
    }
}

/// Device grouping metadata shared by every entity of one amplifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    pub identifiers: (String, String),
    pub name: String,
    pub manufacturer: String,
    pub model: String,
}

impl DeviceInfo {
    pub fn new(namespace: &str, model: &ModelSpec) -> Self {
        Self {
            identifiers: (DOMAIN.to_string(), namespace.to_string()),
            name: model.display_name(),
            manufacturer: "Nuvo".to_string(),
            model: model.name.to_string(),
        }
    }
}

/// Capabilities every entity exposes to the host
#[async_trait]
pub trait Entity: Send + Sync {
    fn entity_id(&self) -> &EntityId;

    fn unique_id(&self) -> String {
        self.entity_id().unique_id()
    }

    fn name(&self) -> String;

    fn device_info(&self) -> DeviceInfo;

    /// Whether a confirmed reading has been received from the amplifier
    fn available(&self) -> bool;

    fn lifecycle(&self) -> Lifecycle;

    /// Current state for the host's state store
    fn state_json(&self) -> serde_json::Value;

    /// Subscribe to push messages and request the initial state
    async fn on_attach(&self) -> Result<()>;

    /// Unsubscribe and release the connection
    fn on_detach(&self);
}
