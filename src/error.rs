//! Error types for block processing

use std::fmt;
use thiserror::Error;

/// Why a block was rejected as numerically unstable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instability {
    /// Input carried NaN or Inf at this index. Engine state was not touched.
    NonFiniteInput { index: usize },
    /// The engine produced NaN or Inf at this index.
    NonFiniteOutput { index: usize },
    /// An adaptive coefficient left the bounded range.
    CoefficientOverflow { tap: usize },
}

impl fmt::Display for Instability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instability::NonFiniteInput { index } => write!(f, "non-finite input at sample {index}"),
            Instability::NonFiniteOutput { index } => {
                write!(f, "non-finite output at sample {index}")
            }
            Instability::CoefficientOverflow { tap } => {
                write!(f, "coefficient {tap} out of bounds")
            }
        }
    }
}

/// Engine error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NrError {
    /// Filter design inputs cannot produce a filter
    #[error("Invalid design parameters: {0}")]
    InvalidDesignParameters(String),

    /// Engine configuration rejected at construction
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Block exceeds the fixed per-call capacity
    #[error("Block too large: {len} samples (max {max})")]
    BlockTooLarge { len: usize, max: usize },

    /// Operation on an engine that was already destroyed
    #[error("Use after free: {engine} was already destroyed")]
    UseAfterFree { engine: &'static str },

    /// NaN/Inf detected in or produced by an engine
    #[error("Numeric instability in {engine}: {cause}")]
    NumericInstability {
        engine: &'static str,
        cause: Instability,
    },

    /// Ring buffer read outside the retained samples
    #[error("Read out of range: offset {offset} + len {len} exceeds {available} samples")]
    OutOfRange {
        offset: usize,
        len: usize,
        available: usize,
    },

    /// Named preset does not exist
    #[error("Unknown preset: {0}")]
    UnknownPreset(String),
}

/// Result type for engine operations
pub type NrResult<T> = Result<T, NrError>;
