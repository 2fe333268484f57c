use crate::error::{NuvoError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Physical zone number (1-based, as the amplifier numbers them)
pub type ZoneId = u8;

/// Physical source (input) number (1-based)
pub type SourceId = u8;

/// A number in the amplifier's own protocol units
pub type NativeValue = i32;

/// A number in the host's entity-state units
pub type HostValue = f64;

/// Whether an entity represents a zone or a source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Zone,
    Source,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Zone => "zone",
            EntityKind::Source => "source",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The physical zone or source a message or entity pertains to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Target {
    pub kind: EntityKind,
    pub id: u8,
}

impl Target {
    pub fn zone(id: ZoneId) -> Self {
        Self {
            kind: EntityKind::Zone,
            id,
        }
    }

    pub fn source(id: SourceId) -> Self {
        Self {
            kind: EntityKind::Source,
            id,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.id)
    }
}

/// Balance position flag as reported by the amplifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BalancePosition {
    #[serde(rename = "L")]
    Left,
    #[serde(rename = "C")]
    Center,
    #[serde(rename = "R")]
    Right,
}

impl BalancePosition {
    pub fn as_str(&self) -> &'static str {
        match self {
            BalancePosition::Left => "L",
            BalancePosition::Center => "C",
            BalancePosition::Right => "R",
        }
    }
}

/// Control kinds that carry a native numeric scale in the model table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlKind {
    Volume,
    Bass,
    Treble,
    Balance,
    Gain,
}

impl ControlKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ControlKind::Volume => "volume",
            ControlKind::Bass => "bass",
            ControlKind::Treble => "treble",
            ControlKind::Balance => "balance",
            ControlKind::Gain => "gain",
        }
    }
}

/// Native scale bounds for one control kind on one amplifier model
///
/// For volume the amplifier counts attenuation steps, so `min` names the
/// quietest native number (the largest) and `max` the loudest (0).
/// [`ControlScale::lower`] and [`ControlScale::upper`] give the numeric bounds
/// regardless of that orientation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlScale {
    pub min: NativeValue,
    pub max: NativeValue,
    pub step: NativeValue,
}

impl ControlScale {
    pub const fn new(min: NativeValue, max: NativeValue, step: NativeValue) -> Self {
        Self { min, max, step }
    }

    /// Check that the step is positive and the scale has a non-zero width
    pub fn validate(&self) -> Result<()> {
        if self.step <= 0 {
            return Err(NuvoError::InvalidRange(format!(
                "step must be positive, got {}",
                self.step
            )));
        }
        if self.min == self.max {
            return Err(NuvoError::InvalidRange(format!(
                "zero-width scale at {}",
                self.min
            )));
        }
        Ok(())
    }

    /// Smallest native number on the scale
    pub fn lower(&self) -> NativeValue {
        self.min.min(self.max)
    }

    /// Largest native number on the scale
    pub fn upper(&self) -> NativeValue {
        self.min.max(self.max)
    }

    pub fn clamp(&self, native: NativeValue) -> NativeValue {
        native.clamp(self.lower(), self.upper())
    }
}

// ========== Device event payloads ==========

/// Power, volume, mute and source of one zone
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneStatus {
    pub zone: ZoneId,
    pub power: bool,

    /// Selected source, absent while the zone is off
    #[serde(default)]
    pub source: Option<SourceId>,

    /// Native attenuation, absent while the zone is off or muted
    #[serde(default)]
    pub volume: Option<NativeValue>,

    #[serde(default)]
    pub mute: bool,
}

/// Name, enablement and permitted sources of one zone
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneConfiguration {
    pub zone: ZoneId,
    pub enabled: bool,
    pub name: String,

    /// Permitted sources as the amplifier spells them ("SOURCE1", "SOURCE4", ...)
    #[serde(default)]
    pub sources: Vec<String>,
}

impl ZoneConfiguration {
    /// Numeric ids of the permitted sources, skipping entries that do not parse
    pub fn source_ids(&self) -> Vec<SourceId> {
        self.sources
            .iter()
            .filter_map(|s| s.strip_prefix("SOURCE"))
            .filter_map(|n| n.parse().ok())
            .collect()
    }
}

/// Tone controls of one zone
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneEqStatus {
    pub zone: ZoneId,
    pub bass: NativeValue,
    pub treble: NativeValue,
    pub loudcmp: bool,
    pub balance_position: BalancePosition,
    pub balance: NativeValue,
}

/// Name, enablement and input gain of one source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfiguration {
    pub source: SourceId,
    pub enabled: bool,
    pub name: String,
    pub gain: NativeValue,
}

/// Volume presets of one zone, all as native attenuation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneVolumeConfiguration {
    pub zone: ZoneId,
    pub max_vol: NativeValue,
    pub ini_vol: NativeValue,
    pub page_vol: NativeValue,
    pub party_vol: NativeValue,
    #[serde(default)]
    pub vol_rst: bool,
}
