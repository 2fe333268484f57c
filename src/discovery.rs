use crate::amplifier::Amplifier;
use crate::error::{NuvoError, Result};
use crate::models::ModelSpec;
use crate::types::{SourceId, ZoneId};
use std::collections::BTreeMap;

/// Zones and sources reported enabled by an amplifier, with their names
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiscoveredAmplifier {
    pub zones: BTreeMap<ZoneId, String>,
    pub sources: BTreeMap<SourceId, String>,
}

/// Query every physical zone and source of a model and keep the enabled ones
///
/// Used to seed a new configuration with the names stored in the amplifier.
/// A zone or source that does not answer in time is skipped.
///
/// # Example
///
/// ```no_run
/// use nuvo_zones::{discovery, models, Connection};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let (connection, _outbox) = Connection::new();
///     let model = models::lookup("Grand_Concerto")?;
///     let found = discovery::scan(&connection, model).await?;
///     for (zone, name) in &found.zones {
///         println!("Zone {}: {}", zone, name);
///     }
///     Ok(())
/// }
/// ```
pub async fn scan(amplifier: &dyn Amplifier, model: &ModelSpec) -> Result<DiscoveredAmplifier> {
    tracing::info!("Scanning {} for enabled zones and sources", model.display_name());
    let mut found = DiscoveredAmplifier::default();

    for zone in 1..=model.zones {
        match amplifier.zone_configuration(zone).await {
            Ok(cfg) if cfg.enabled => {
                found.zones.insert(zone, cfg.name.trim().to_string());
            }
            Ok(_) => tracing::debug!("Zone {} is disabled", zone),
            Err(NuvoError::Timeout) => tracing::warn!("Zone {} did not answer", zone),
            Err(e) => return Err(e),
        }
    }

    for source in 1..=model.sources {
        match amplifier.source_configuration(source).await {
            Ok(cfg) if cfg.enabled => {
                found.sources.insert(source, cfg.name.trim().to_string());
            }
            Ok(_) => tracing::debug!("Source {} is disabled", source),
            Err(NuvoError::Timeout) => tracing::warn!("Source {} did not answer", source),
            Err(e) => return Err(e),
        }
    }

    tracing::info!(
        "Scan complete: {} zones, {} sources enabled",
        found.zones.len(),
        found.sources.len()
    );
    Ok(found)
}
