use crate::config::PipelineConfig;
use crate::error::{NrError, NrResult};
use once_cell::sync::Lazy;
use std::collections::BTreeMap;

// =============================================================================
// FACTORY PIPELINE PRESETS
// =============================================================================

/// Baked-in presets, parsed on first use.
pub static PRESETS: Lazy<PresetManager> = Lazy::new(PresetManager::new);

#[derive(Debug)]
pub struct PresetManager {
    presets: BTreeMap<String, PipelineConfig>,
}

impl PresetManager {
    /// Load presets from baked-in JSON. This is fallible but non-fatal.
    /// Returns a manager holding only "passthrough" if parsing fails.
    pub fn new() -> Self {
        let presets_str = include_str!("../presets.json");
        match Self::from_json(presets_str) {
            Ok(manager) => manager,
            Err(e) => {
                log::error!("baked-in presets rejected: {e}");
                Self::default()
            }
        }
    }

    /// Parse and validate a name -> pipeline map.
    pub fn from_json(json: &str) -> NrResult<Self> {
        let presets: BTreeMap<String, PipelineConfig> =
            serde_json::from_str(json).map_err(|e| NrError::InvalidConfig(e.to_string()))?;
        for (name, cfg) in &presets {
            cfg.validate().map_err(|e| match e {
                NrError::InvalidConfig(msg) => {
                    NrError::InvalidConfig(format!("preset '{name}': {msg}"))
                }
                other => other,
            })?;
        }
        Ok(Self { presets })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.presets.keys().map(String::as_str)
    }

    pub fn get(&self, name: &str) -> NrResult<&PipelineConfig> {
        self.presets
            .get(name)
            .ok_or_else(|| NrError::UnknownPreset(name.to_string()))
    }
}

impl Default for PresetManager {
    fn default() -> Self {
        let mut presets = BTreeMap::new();
        presets.insert("passthrough".to_string(), PipelineConfig::default());
        Self { presets }
    }
}
