//! Handle-based boundary for callers that cannot hold engine objects
//! directly (foreign hosts, scripting bridges).
//!
//! The registry owns every engine it creates. Handles are never reused, so a
//! destroyed or unknown handle is always reported as `UseAfterFree`.

use crate::config::{PipelineConfig, StageConfig};
use crate::dsp::BlockProcessor;
use crate::error::{NrError, NrResult};
use crate::pipeline::Pipeline;
use std::collections::HashMap;
use std::fmt;

const REGISTRY: &str = "registry";

/// Opaque engine handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EngineHandle(u64);

impl EngineHandle {
    pub fn raw(self) -> u64 {
        self.0
    }

    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for EngineHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Default)]
pub struct EngineRegistry {
    engines: HashMap<EngineHandle, Box<dyn BlockProcessor>>,
    next_id: u64,
}

impl EngineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.engines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }

    fn insert(&mut self, engine: Box<dyn BlockProcessor>) -> EngineHandle {
        self.next_id += 1;
        let handle = EngineHandle(self.next_id);
        log::debug!("{REGISTRY}: {} registered as {handle}", engine.name());
        self.engines.insert(handle, engine);
        handle
    }

    fn missing(handle: EngineHandle) -> NrError {
        log::error!("{REGISTRY}: handle {handle} is not live");
        NrError::UseAfterFree { engine: REGISTRY }
    }

    /// Build one engine. Parameter errors surface before a handle exists.
    pub fn create(&mut self, cfg: &StageConfig) -> NrResult<EngineHandle> {
        let engine = cfg.build()?;
        Ok(self.insert(engine))
    }

    pub fn create_pipeline(&mut self, cfg: &PipelineConfig) -> NrResult<EngineHandle> {
        let pipeline = Pipeline::from_config(cfg)?;
        Ok(self.insert(Box::new(pipeline)))
    }

    /// Process `block` in place with the engine behind `handle`.
    pub fn filter(&mut self, handle: EngineHandle, block: &mut [f32]) -> NrResult<()> {
        match self.engines.get_mut(&handle) {
            Some(engine) => engine.process_block(block),
            None => Err(Self::missing(handle)),
        }
    }

    pub fn latency(&self, handle: EngineHandle) -> NrResult<usize> {
        self.engines
            .get(&handle)
            .map(|e| e.latency())
            .ok_or_else(|| Self::missing(handle))
    }

    /// Release the engine. A second release of the same handle fails.
    pub fn destroy(&mut self, handle: EngineHandle) -> NrResult<()> {
        match self.engines.remove(&handle) {
            Some(mut engine) => engine.destroy(),
            None => Err(Self::missing(handle)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::{AnrConfig, BlankerConfig, FilterCoefficients, FirConfig};
    use crate::presets::PRESETS;

    #[test]
    fn test_create_filter_destroy() {
        let mut reg = EngineRegistry::new();
        let h = reg
            .create(&StageConfig::Fir(FirConfig::Taps {
                taps: FilterCoefficients::new(vec![1.0, 2.0, 3.0]).unwrap(),
            }))
            .unwrap();
        let mut a = [1.0f32, 0.0];
        reg.filter(h, &mut a).unwrap();
        assert_eq!(a, [1.0, 2.0]);
        let mut b = [0.0f32, 0.0];
        reg.filter(h, &mut b).unwrap();
        assert_eq!(b, [3.0, 0.0]);
        reg.destroy(h).unwrap();
        assert!(reg.is_empty());
    }

    #[test]
    fn test_double_destroy_is_reported() {
        let mut reg = EngineRegistry::new();
        let h = reg.create(&StageConfig::Anr(AnrConfig::default())).unwrap();
        reg.destroy(h).unwrap();
        assert_eq!(
            reg.destroy(h),
            Err(NrError::UseAfterFree { engine: "registry" })
        );
        let mut block = [0.0f32; 4];
        assert!(reg.filter(h, &mut block).is_err());
        assert!(reg.latency(h).is_err());
    }

    #[test]
    fn test_handles_are_not_reused() {
        let mut reg = EngineRegistry::new();
        let cfg = StageConfig::Blanker(BlankerConfig::default());
        let a = reg.create(&cfg).unwrap();
        reg.destroy(a).unwrap();
        let b = reg.create(&cfg).unwrap();
        assert_ne!(a, b);
        assert!(reg.destroy(a).is_err());
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_invalid_parameters_create_nothing() {
        let mut reg = EngineRegistry::new();
        let bad = StageConfig::Anr(AnrConfig {
            taps: 0,
            ..AnrConfig::default()
        });
        assert!(matches!(reg.create(&bad), Err(NrError::InvalidConfig(_))));
        assert!(reg.is_empty());
    }

    #[test]
    fn test_preset_pipeline_handle() {
        let mut reg = EngineRegistry::new();
        let h = reg
            .create_pipeline(PRESETS.get("ssb_spectral").unwrap())
            .unwrap();
        assert!(reg.latency(h).unwrap() > 0);
        let mut block = vec![0.0f32; 1024];
        reg.filter(h, &mut block).unwrap();
        assert_eq!(block.len(), 1024);
        reg.destroy(h).unwrap();
    }
}
