//! Serializable stage and pipeline descriptions.
//!
//! A stage is tagged by its `"engine"` field:
//!
//! ```json
//! { "stages": [
//!     { "engine": "blanker", "threshold": 4.0 },
//!     { "engine": "anr", "variant": "denoise", "taps": 64, "delay": 16 },
//!     { "engine": "fir", "transition_bandwidth": 0.05, "cutoff": 0.2,
//!       "stopband_attenuation_db": 60 }
//! ] }
//! ```
//!
//! Omitted engine fields take their defaults.

use crate::dsp::{
    AdaptiveNoiseReducer, Agc, AgcConfig, AnrConfig, BlankerConfig, BlockProcessor, FirConfig,
    FirFilter, NoiseBlanker, SpectralConfig, SpectralNoiseReducer,
};
use crate::error::{NrError, NrResult};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "engine", rename_all = "snake_case")]
pub enum StageConfig {
    Fir(FirConfig),
    Anr(AnrConfig),
    Blanker(BlankerConfig),
    Spectral(SpectralConfig),
    Agc(AgcConfig),
}

impl StageConfig {
    pub fn engine_name(&self) -> &'static str {
        match self {
            StageConfig::Fir(_) => "fir",
            StageConfig::Anr(_) => "anr",
            StageConfig::Blanker(_) => "blanker",
            StageConfig::Spectral(_) => "spectral",
            StageConfig::Agc(_) => "agc",
        }
    }

    pub fn validate(&self) -> NrResult<()> {
        match self {
            StageConfig::Fir(c) => c.coefficients().map(|_| ()),
            StageConfig::Anr(c) => c.validate(),
            StageConfig::Blanker(c) => c.validate(),
            StageConfig::Spectral(c) => c.validate(),
            StageConfig::Agc(c) => c.validate(),
        }
    }

    /// Construct the engine this stage describes.
    pub fn build(&self) -> NrResult<Box<dyn BlockProcessor>> {
        Ok(match self {
            StageConfig::Fir(c) => Box::new(FirFilter::new(c.coefficients()?)),
            StageConfig::Anr(c) => Box::new(AdaptiveNoiseReducer::new(*c)?),
            StageConfig::Blanker(c) => Box::new(NoiseBlanker::new(*c)?),
            StageConfig::Spectral(c) => Box::new(SpectralNoiseReducer::new(*c)?),
            StageConfig::Agc(c) => Box::new(Agc::new(*c)?),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub stages: Vec<StageConfig>,
}

impl PipelineConfig {
    pub fn from_json(json: &str) -> NrResult<Self> {
        let cfg: Self =
            serde_json::from_str(json).map_err(|e| NrError::InvalidConfig(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn to_json(&self) -> NrResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| NrError::InvalidConfig(e.to_string()))
    }

    pub fn validate(&self) -> NrResult<()> {
        for (i, stage) in self.stages.iter().enumerate() {
            stage.validate().map_err(|e| match e {
                NrError::InvalidConfig(msg) => {
                    NrError::InvalidConfig(format!("stage {i} ({}): {msg}", stage.engine_name()))
                }
                other => other,
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::AnrVariant;

    #[test]
    fn test_parse_tagged_stages_with_defaults() {
        let cfg = PipelineConfig::from_json(
            r#"{
                "stages": [
                    { "engine": "blanker", "threshold": 5.0 },
                    { "engine": "anr", "variant": "notch" },
                    { "engine": "fir", "taps": [0.25, 0.5, 0.25] },
                    { "engine": "spectral", "sample_rate": 8000 },
                    { "engine": "agc" }
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(cfg.stages.len(), 5);
        match &cfg.stages[0] {
            StageConfig::Blanker(b) => {
                assert_eq!(b.threshold, 5.0);
                assert_eq!(b.taps, BlankerConfig::default().taps);
            }
            other => panic!("unexpected stage {other:?}"),
        }
        match &cfg.stages[1] {
            StageConfig::Anr(a) => assert_eq!(a.variant, AnrVariant::Notch),
            other => panic!("unexpected stage {other:?}"),
        }
        assert_eq!(cfg.stages[4], StageConfig::Agc(AgcConfig::default()));
    }

    #[test]
    fn test_unknown_engine_rejected() {
        let err = PipelineConfig::from_json(r#"{"stages": [{"engine": "reverb"}]}"#);
        assert!(matches!(err, Err(NrError::InvalidConfig(_))));
    }

    #[test]
    fn test_degenerate_fir_design_rejected_from_json() {
        let err = PipelineConfig::from_json(
            r#"{"stages": [{"engine": "fir", "transition_bandwidth": 1e-30,
                "cutoff": 0.2, "stopband_attenuation_db": 60}]}"#,
        );
        assert!(matches!(err, Err(NrError::InvalidDesignParameters(_))));
    }

    #[test]
    fn test_invalid_stage_names_its_position() {
        let err = PipelineConfig::from_json(
            r#"{"stages": [{"engine": "agc"}, {"engine": "anr", "taps": 0}]}"#,
        )
        .unwrap_err();
        match err {
            NrError::InvalidConfig(msg) => assert!(msg.starts_with("stage 1 (anr)"), "{msg}"),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_json_roundtrip() {
        let cfg = PipelineConfig {
            description: Some("test".into()),
            stages: vec![
                StageConfig::Blanker(BlankerConfig::default()),
                StageConfig::Anr(AnrConfig::default()),
            ],
        };
        let back = PipelineConfig::from_json(&cfg.to_json().unwrap()).unwrap();
        assert_eq!(back, cfg);
    }

    #[test]
    fn test_build_produces_named_engines() {
        let stage = StageConfig::Spectral(SpectralConfig::default());
        let engine = stage.build().unwrap();
        assert_eq!(engine.name(), "spectral");
        assert!(engine.latency() > 0);
    }
}
