//! Rust library exposing Nuvo multi-zone amplifiers as home-automation entities
//!
//! This library turns the push messages of a Nuvo Grand Concerto or Essentia G
//! amplifier into live entity state and entity commands into amplifier
//! requests. It supports:
//!
//! - Conversion between native control scales and host values
//! - Zone media players (power, volume, mute, source, tone)
//! - Numeric controls for bass, treble, balance, source gain and volume presets
//! - Loudness compensation switches
//! - Snapshot and restore of zone state
//! - Scanning an amplifier for its enabled zones and sources
//!
//! # Quick Start
//!
//! ```no_run
//! use nuvo_zones::{AmplifierConfig, Connection, NuvoClient};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AmplifierConfig::from_json_str(r#"{
//!         "port": "/dev/ttyUSB0",
//!         "type": "Grand_Concerto",
//!         "zones": { "1": "Kitchen" },
//!         "sources": { "1": "Sonos" }
//!     }"#)?;
//!
//!     // The receiving end of the outbound queue belongs to the serial link
//!     let (connection, _outbox) = Connection::new();
//!     let client = NuvoClient::new(Arc::new(connection), config)?;
//!     client.attach_all().await?;
//!
//!     if let Some(zone) = client.zone(1) {
//!         zone.select_source("Sonos").await?;
//!         zone.set_volume_level(0.4).await?;
//!     }
//!
//!     // Re-render whatever the amplifier reports
//!     let mut refresh = client.subscribe_refresh();
//!     while let Ok(id) = refresh.recv().await {
//!         println!("{} changed", id);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - **Convert**: pure unit conversion between native and host scales
//! - **Connection**: outbound request queue and inbound push fan-out
//! - **Dispatcher**: per-entity subscription lifecycle and self-filtering
//! - **Entities**: zone players, number controls and switches
//! - **Client**: builds and attaches every entity of one amplifier
//! - **Protocol**: message types, push payloads, commands and queries

pub mod amplifier;
mod client;
mod config;
mod connection;
pub mod convert;
pub mod discovery;
pub mod dispatcher;
pub mod entity;
mod error;
pub mod models;
pub mod number;
pub mod protocol;
mod subscription;
pub mod switch;
pub mod types;
pub mod zone;

// Public exports
pub use amplifier::Amplifier;
pub use client::NuvoClient;
pub use config::{parse_indexed, AmplifierConfig, ConfigOptions, SourceMap};
pub use connection::Connection;
pub use discovery::DiscoveredAmplifier;
pub use dispatcher::{Delivery, Dispatcher, Lifecycle, Tracker};
pub use entity::{DeviceInfo, Entity, EntityId};
pub use error::{NuvoError, Result};
pub use models::ModelSpec;
pub use number::{NumberControl, NumberKind};
pub use protocol::{Command, DeviceEvent, MessageType, Notification, Query, Request};
pub use subscription::{Callback, RefreshReceiver, SubscriberHub, SubscriptionId};
pub use switch::LoudnessSwitch;
pub use types::{
    BalancePosition, ControlKind, ControlScale, EntityKind, HostValue, NativeValue, SourceConfiguration,
    SourceId, Target, ZoneConfiguration, ZoneEqStatus, ZoneId, ZoneStatus, ZoneVolumeConfiguration,
};
pub use zone::{ZonePlayer, ZoneState};
