//! Streaming noise reduction and block filtering for narrowband audio.
//!
//! Engines (`dsp`) each own their persistent state and process caller
//! buffers in place, one block at a time, so the output never depends on how
//! the stream is cut into blocks. `Pipeline` chains them, `config` and
//! `presets` describe them in JSON, and `host` hands them out behind opaque
//! handles for foreign callers.
//!
//! ```no_run
//! use blocknr::{BlockProcessor, Pipeline, PRESETS};
//!
//! let mut pipeline = Pipeline::from_config(PRESETS.get("ssb_lms")?)?;
//! let mut block = vec![0.0f32; 1024];
//! pipeline.process_block(&mut block)?;
//! # Ok::<(), blocknr::NrError>(())
//! ```

pub mod codec;
pub mod config;
pub mod dsp;
pub mod error;
pub mod host;
pub mod pipeline;
pub mod presets;

/// Largest block accepted by any engine in one call.
pub const MAX_BLOCK_LEN: usize = 16384;

pub use config::{PipelineConfig, StageConfig};
pub use dsp::{BlockProcessor, EngineState};
pub use error::{Instability, NrError, NrResult};
pub use host::{EngineHandle, EngineRegistry};
pub use pipeline::Pipeline;
pub use presets::{PresetManager, PRESETS};
