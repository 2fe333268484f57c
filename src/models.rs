use crate::error::{NuvoError, Result};
use crate::types::{ControlKind, ControlScale};

/// Static description of one amplifier model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSpec {
    /// Model string as configured ("Grand_Concerto")
    pub name: &'static str,

    /// Number of physical zones
    pub zones: u8,

    /// Number of sources
    pub sources: u8,

    pub volume: ControlScale,
    pub bass: ControlScale,
    pub treble: ControlScale,
    pub balance: ControlScale,
    pub gain: ControlScale,
}

impl ModelSpec {
    /// Native scale for a control kind
    pub fn scale(&self, kind: ControlKind) -> ControlScale {
        match kind {
            ControlKind::Volume => self.volume,
            ControlKind::Bass => self.bass,
            ControlKind::Treble => self.treble,
            ControlKind::Balance => self.balance,
            ControlKind::Gain => self.gain,
        }
    }

    /// Human readable model name ("Grand Concerto")
    pub fn display_name(&self) -> String {
        self.name.split('_').collect::<Vec<_>>().join(" ")
    }
}

static MODELS: [ModelSpec; 2] = [
    ModelSpec {
        name: "Grand_Concerto",
        zones: 20,
        sources: 6,
        volume: ControlScale::new(79, 0, 1),
        bass: ControlScale::new(-18, 18, 2),
        treble: ControlScale::new(-18, 18, 2),
        balance: ControlScale::new(0, 18, 2),
        gain: ControlScale::new(0, 14, 1),
    },
    ModelSpec {
        name: "Essentia_G",
        zones: 12,
        sources: 6,
        volume: ControlScale::new(79, 0, 1),
        bass: ControlScale::new(-12, 12, 2),
        treble: ControlScale::new(-12, 12, 2),
        balance: ControlScale::new(0, 18, 2),
        gain: ControlScale::new(0, 14, 1),
    },
];

/// Look up a model by its configured name
pub fn lookup(model: &str) -> Result<&'static ModelSpec> {
    MODELS
        .iter()
        .find(|m| m.name == model)
        .ok_or_else(|| NuvoError::UnknownModel(model.to_string()))
}

/// All known models
pub fn all() -> &'static [ModelSpec] {
    &MODELS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grand_concerto_scales() {
        let gc = lookup("Grand_Concerto").unwrap();
        assert_eq!(gc.scale(ControlKind::Volume), ControlScale::new(79, 0, 1));
        assert_eq!(gc.scale(ControlKind::Bass), ControlScale::new(-18, 18, 2));
        assert_eq!(gc.display_name(), "Grand Concerto");
    }

    #[test]
    fn every_builtin_scale_is_valid() {
        let kinds = [
            ControlKind::Volume,
            ControlKind::Bass,
            ControlKind::Treble,
            ControlKind::Balance,
            ControlKind::Gain,
        ];
        for model in all() {
            for kind in kinds {
                assert!(model.scale(kind).validate().is_ok(), "{} {:?}", model.name, kind);
            }
        }
    }

    #[test]
    fn unknown_model() {
        assert!(matches!(lookup("Simplese"), Err(NuvoError::UnknownModel(m)) if m == "Simplese"));
    }
}
