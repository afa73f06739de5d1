pub mod agc;
pub mod anr;
pub mod blanker;
pub mod fir;
pub mod resampler;
pub mod ring;
pub mod spectral;
pub mod utils;

pub use agc::{Agc, AgcConfig};
pub use anr::{AdaptiveNoiseReducer, AnrConfig, AnrVariant};
pub use blanker::{BlankerConfig, NoiseBlanker};
pub use fir::{design_kaiser, estimate_req_filter_len, FilterCoefficients, FirConfig, FirFilter};
pub use resampler::Resampler;
pub use ring::RingSampleBuffer;
pub use spectral::{SpectralConfig, SpectralNoiseReducer};

use crate::error::{NrError, NrResult};

/// Engine lifecycle: `Created -> Running -> Destroyed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Created,
    Running,
    Destroyed,
}

/// Lifecycle tracker embedded in every engine.
#[derive(Debug)]
pub struct Lifecycle {
    engine: &'static str,
    state: EngineState,
}

impl Lifecycle {
    pub fn new(engine: &'static str) -> Self {
        Self {
            engine,
            state: EngineState::Created,
        }
    }

    #[inline]
    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Called at the top of every block. Fails once destroyed.
    #[inline]
    pub fn enter_block(&mut self) -> NrResult<()> {
        if self.state == EngineState::Destroyed {
            return Err(NrError::UseAfterFree {
                engine: self.engine,
            });
        }
        self.state = EngineState::Running;
        Ok(())
    }

    /// Mark destroyed. A second call is a use-after-free.
    pub fn destroy(&mut self) -> NrResult<()> {
        if self.state == EngineState::Destroyed {
            return Err(NrError::UseAfterFree {
                engine: self.engine,
            });
        }
        self.state = EngineState::Destroyed;
        log::info!("{}: destroyed", self.engine);
        Ok(())
    }
}

/// An engine that turns a block of N samples into N samples in place,
/// carrying its state into the next call.
pub trait BlockProcessor: Send {
    fn name(&self) -> &'static str;

    /// Process `block` in place. Blocks longer than `MAX_BLOCK_LEN` fail with
    /// `BlockTooLarge`; an empty block is a no-op.
    fn process_block(&mut self, block: &mut [f32]) -> NrResult<()>;

    /// Samples of delay between input and output.
    fn latency(&self) -> usize {
        0
    }

    fn state(&self) -> EngineState;

    /// Release engine storage. Fails with `UseAfterFree` when repeated.
    fn destroy(&mut self) -> NrResult<()>;
}
