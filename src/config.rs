use crate::error::{NuvoError, Result};
use crate::models::{self, ModelSpec};
use crate::types::{SourceId, ZoneId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

fn default_volume_step() -> i32 {
    1
}

fn new_entry_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Overrides applied on top of the base configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigOptions {
    #[serde(default)]
    pub port: Option<String>,

    #[serde(default)]
    pub zones: Option<BTreeMap<ZoneId, String>>,

    #[serde(default)]
    pub sources: Option<BTreeMap<SourceId, String>>,
}

/// Configuration of one amplifier integration instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AmplifierConfig {
    /// Serial port the amplifier is attached to
    pub port: String,

    /// Model string from the model table
    #[serde(rename = "type")]
    pub model: String,

    /// Configured zones, id → display name
    #[serde(default)]
    pub zones: BTreeMap<ZoneId, String>,

    /// Configured sources, id → display name
    #[serde(default)]
    pub sources: BTreeMap<SourceId, String>,

    /// Native steps moved by volume up/down
    #[serde(default = "default_volume_step")]
    pub volume_step: i32,

    /// Namespace for unique ids
    #[serde(default = "new_entry_id")]
    pub entry_id: String,

    #[serde(default)]
    pub options: ConfigOptions,
}

impl AmplifierConfig {
    pub fn new(port: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            model: model.into(),
            zones: BTreeMap::new(),
            sources: BTreeMap::new(),
            volume_step: default_volume_step(),
            entry_id: new_entry_id(),
            options: ConfigOptions::default(),
        }
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Port, preferring the options override
    pub fn effective_port(&self) -> &str {
        self.options.port.as_deref().unwrap_or(&self.port)
    }

    /// Zones, preferring the options override
    pub fn effective_zones(&self) -> &BTreeMap<ZoneId, String> {
        self.options.zones.as_ref().unwrap_or(&self.zones)
    }

    /// Sources, preferring the options override
    pub fn effective_sources(&self) -> &BTreeMap<SourceId, String> {
        self.options.sources.as_ref().unwrap_or(&self.sources)
    }

    pub fn model_spec(&self) -> Result<&'static ModelSpec> {
        models::lookup(&self.model)
    }

    /// Check the configuration against the model table
    pub fn validate(&self) -> Result<()> {
        let model = self.model_spec()?;

        if self.effective_port().trim().is_empty() {
            return Err(NuvoError::Config("port must not be empty".to_string()));
        }
        let volume_width = model.volume.upper() - model.volume.lower();
        if self.volume_step <= 0 || self.volume_step > volume_width {
            return Err(NuvoError::Config(format!(
                "volume_step must be within 1..={}, got {}",
                volume_width, self.volume_step
            )));
        }
        if let Some(zone) = self
            .effective_zones()
            .keys()
            .find(|z| **z == 0 || **z > model.zones)
        {
            return Err(NuvoError::Config(format!(
                "zone {} out of range for {} (1..={})",
                zone, model.name, model.zones
            )));
        }
        if let Some(source) = self
            .effective_sources()
            .keys()
            .find(|s| **s == 0 || **s > model.sources)
        {
            return Err(NuvoError::Config(format!(
                "source {} out of range for {} (1..={})",
                source, model.name, model.sources
            )));
        }
        Ok(())
    }
}

/// Turn wizard input keyed `zone_<n>` / `source_<n>` into numeric ids with trimmed names
pub fn parse_indexed(input: &BTreeMap<String, String>) -> Result<BTreeMap<u8, String>> {
    input
        .iter()
        .map(|(key, name)| {
            let id = key
                .split_once('_')
                .and_then(|(_, n)| n.parse::<u8>().ok())
                .ok_or_else(|| NuvoError::Config(format!("invalid key: {}", key)))?;
            Ok((id, name.trim().to_string()))
        })
        .collect()
}

/// Bidirectional source id ↔ name lookup
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceMap {
    by_id: BTreeMap<SourceId, String>,
    by_name: HashMap<String, SourceId>,
}

impl SourceMap {
    pub fn new(sources: &BTreeMap<SourceId, String>) -> Self {
        Self {
            by_id: sources.clone(),
            by_name: sources.iter().map(|(id, name)| (name.clone(), *id)).collect(),
        }
    }

    pub fn name(&self, id: SourceId) -> Option<&str> {
        self.by_id.get(&id).map(String::as_str)
    }

    pub fn id(&self, name: &str) -> Option<SourceId> {
        self.by_name.get(name).copied()
    }

    /// All names ordered by source id
    pub fn names(&self) -> Vec<String> {
        self.by_id.values().cloned().collect()
    }
}
