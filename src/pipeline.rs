//! Ordered chain of block engines.
//!
//! Each block runs through every stage in order, in place. Latency is the
//! sum of stage latencies. If a stage fails the block is left partially
//! processed and the pipeline should be destroyed and rebuilt.

use crate::config::PipelineConfig;
use crate::dsp::utils::check_block_len;
use crate::dsp::{BlockProcessor, EngineState, Lifecycle};
use crate::error::NrResult;

const ENGINE: &str = "pipeline";

pub struct Pipeline {
    stages: Vec<Box<dyn BlockProcessor>>,
    lifecycle: Lifecycle,
}

impl Pipeline {
    pub fn new() -> Self {
        Self {
            stages: Vec::new(),
            lifecycle: Lifecycle::new(ENGINE),
        }
    }

    pub fn from_config(cfg: &PipelineConfig) -> NrResult<Self> {
        let mut pipeline = Self::new();
        for stage in &cfg.stages {
            pipeline.push(stage.build()?);
        }
        log::debug!(
            "{ENGINE}: built [{}], latency {} samples",
            pipeline.stage_names().join(" -> "),
            pipeline.latency()
        );
        Ok(pipeline)
    }

    pub fn push(&mut self, stage: Box<dyn BlockProcessor>) -> &mut Self {
        self.stages.push(stage);
        self
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockProcessor for Pipeline {
    fn name(&self) -> &'static str {
        ENGINE
    }

    fn process_block(&mut self, block: &mut [f32]) -> NrResult<()> {
        self.lifecycle.enter_block()?;
        check_block_len(block.len())?;
        for stage in &mut self.stages {
            stage.process_block(block)?;
        }
        Ok(())
    }

    fn latency(&self) -> usize {
        self.stages.iter().map(|s| s.latency()).sum()
    }

    fn state(&self) -> EngineState {
        self.lifecycle.state()
    }

    /// Destroys every stage, reporting the first failure.
    fn destroy(&mut self) -> NrResult<()> {
        self.lifecycle.destroy()?;
        let mut first_err = None;
        for stage in &mut self.stages {
            if let Err(e) = stage.destroy() {
                first_err.get_or_insert(e);
            }
        }
        self.stages = Vec::new();
        first_err.map_or(Ok(()), Err)
    }
}
