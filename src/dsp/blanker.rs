//! Impulse Noise Blanker
//!
//! Detects isolated spikes (ignition noise, static crashes, clicks) against a
//! running baseline and replaces them with the baseline mean.
//!
//! # Detection
//! - Baseline: mean and standard deviation of the last `taps` *output*
//!   samples, so a blanked spike never inflates the statistic.
//! - A sample is an impulse when `|x - mean| > threshold * sigma`.
//!   `threshold` is in standard deviations, not raw amplitude.
//! - Nothing is flagged until `taps` samples have been seen.
//!
//! # Level Changes
//! An impulse lasts at most `MAX_IMPULSE_LEN` samples. Samples are held for
//! that long before they are committed; a run of more than `MAX_IMPULSE_LEN`
//! consecutive flags is a level change (signal onset after squelch, a new
//! carrier), not an impulse. The whole run is passed through and the baseline
//! is reseeded from the new level. Latency is `MAX_IMPULSE_LEN` samples.
//!
//! # Bound
//! At most `max(1, floor(samples * MAX_BLANK_FRACTION))` samples are blanked in
//! each analysis window of `samples` consecutive samples. Windows are counted
//! on the stream, not per call, so the result does not depend on block size.
//! Pathological all-impulse input therefore degrades to pass-through instead
//! of silence.
//!
//! Unflagged samples leave the engine bit-exact.

use crate::dsp::ring::RingSampleBuffer;
use crate::dsp::utils::{check_block_len, check_finite_input, check_finite_output};
use crate::dsp::{BlockProcessor, EngineState, Lifecycle};
use crate::error::{NrError, NrResult};
use crate::MAX_BLOCK_LEN;
use serde::{Deserialize, Serialize};

const ENGINE: &str = "blanker";

/// Largest share of an analysis window that may be blanked.
pub const MAX_BLANK_FRACTION: f32 = 0.25;
/// Longest flagged run still treated as an impulse (samples). Also the
/// engine latency.
pub const MAX_IMPULSE_LEN: usize = 8;
// Flags of the held samples plus the incoming one, newest in bit 0.
const FLAG_MASK: u32 = (1 << (MAX_IMPULSE_LEN + 1)) - 1;
// Keeps digital silence from flagging every sample.
const SIGMA_FLOOR: f64 = 1e-9;
// Recompute running sums from the history this often (samples).
const RESYNC_INTERVAL: u64 = 1 << 16;

/// Configuration for the impulse blanker
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlankerConfig {
    /// Detection threshold in standard deviations above the baseline.
    pub threshold: f32,
    /// Statistic window length.
    pub taps: usize,
    /// Analysis window length for the blanking bound.
    pub samples: usize,
}

impl Default for BlankerConfig {
    fn default() -> Self {
        Self {
            threshold: 4.0,
            taps: 64,
            samples: 128,
        }
    }
}

impl BlankerConfig {
    pub fn validate(&self) -> NrResult<()> {
        if !(self.threshold > 0.0 && self.threshold.is_finite()) {
            return Err(NrError::InvalidConfig(format!(
                "blanker threshold {} must be finite and > 0",
                self.threshold
            )));
        }
        if !(2..=MAX_BLOCK_LEN).contains(&self.taps) {
            return Err(NrError::InvalidConfig(format!(
                "blanker taps {} outside 2..={MAX_BLOCK_LEN}",
                self.taps
            )));
        }
        if !(1..=MAX_BLOCK_LEN).contains(&self.samples) {
            return Err(NrError::InvalidConfig(format!(
                "blanker samples {} outside 1..={MAX_BLOCK_LEN}",
                self.samples
            )));
        }
        Ok(())
    }

    /// Blanked-sample budget per analysis window.
    pub fn max_blanked_per_window(&self) -> usize {
        ((self.samples as f32 * MAX_BLANK_FRACTION).floor() as usize).max(1)
    }
}

pub struct NoiseBlanker {
    cfg: BlankerConfig,
    history: RingSampleBuffer,
    sum: f64,
    sum_sq: f64,
    since_resync: u64,

    // Samples awaiting a decision, oldest first.
    pending: RingSampleBuffer,
    flags: u32,

    window_pos: usize,
    window_blanked: usize,
    max_blanked: usize,
    total_blanked: u64,
    level_changes: u64,

    lifecycle: Lifecycle,
}

impl NoiseBlanker {
    pub fn new(cfg: BlankerConfig) -> NrResult<Self> {
        cfg.validate()?;
        log::debug!(
            "{ENGINE}: created threshold={} sigma taps={} samples={}",
            cfg.threshold,
            cfg.taps,
            cfg.samples
        );
        Ok(Self {
            cfg,
            history: RingSampleBuffer::new(cfg.taps),
            sum: 0.0,
            sum_sq: 0.0,
            since_resync: 0,
            pending: RingSampleBuffer::new(MAX_IMPULSE_LEN),
            flags: 0,
            window_pos: 0,
            window_blanked: 0,
            max_blanked: cfg.max_blanked_per_window(),
            total_blanked: 0,
            level_changes: 0,
            lifecycle: Lifecycle::new(ENGINE),
        })
    }

    pub fn config(&self) -> &BlankerConfig {
        &self.cfg
    }

    /// Samples blanked since construction.
    pub fn total_blanked(&self) -> u64 {
        self.total_blanked
    }

    /// Flag runs passed through as level changes since construction.
    pub fn level_changes(&self) -> u64 {
        self.level_changes
    }

    fn resync(&mut self) {
        self.sum = 0.0;
        self.sum_sq = 0.0;
        if let Ok((a, b)) = self.history.read(0, self.history.len()) {
            for &v in a.iter().chain(b) {
                let v = v as f64;
                self.sum += v;
                self.sum_sq += v * v;
            }
        }
        self.since_resync = 0;
    }

    /// Forget the baseline; detection resumes once `taps` new samples are in.
    fn reseed(&mut self) {
        self.history.clear();
        self.sum = 0.0;
        self.sum_sq = 0.0;
        self.since_resync = 0;
        self.level_changes += 1;
    }

    #[inline]
    fn mean(&self) -> f64 {
        self.sum / self.history.len().max(1) as f64
    }

    #[inline]
    fn is_impulse(&self, x: f32) -> bool {
        if !self.history.is_full() {
            return false;
        }
        let n = self.history.len() as f64;
        let mean = self.sum / n;
        let var = (self.sum_sq / n - mean * mean).max(0.0);
        let sigma = var.sqrt().max(SIGMA_FLOOR);
        (x as f64 - mean).abs() > self.cfg.threshold as f64 * sigma
    }

    /// Decide the oldest held sample and feed the result into the baseline.
    fn commit(&mut self, x: f32, flagged: bool) -> f32 {
        let mut out = x;
        if flagged && self.window_blanked < self.max_blanked {
            out = self.mean() as f32;
            self.window_blanked += 1;
            self.total_blanked += 1;
        }

        let v = out as f64;
        if let Some(old) = self.history.push_sample(out) {
            let old = old as f64;
            self.sum -= old;
            self.sum_sq -= old * old;
        }
        self.sum += v;
        self.sum_sq += v * v;

        self.window_pos += 1;
        if self.window_pos == self.cfg.samples {
            self.window_pos = 0;
            self.window_blanked = 0;
        }

        self.since_resync += 1;
        if self.since_resync >= RESYNC_INTERVAL {
            self.resync();
        }
        out
    }

    /// Blank impulses in `block` in place. Output lags input by
    /// `MAX_IMPULSE_LEN` samples.
    pub fn blank(&mut self, block: &mut [f32]) -> NrResult<()> {
        self.lifecycle.enter_block()?;
        check_block_len(block.len())?;
        check_finite_input(ENGINE, block)?;

        for x in block.iter_mut() {
            let flagged = self.is_impulse(*x);
            self.flags = ((self.flags << 1) | flagged as u32) & FLAG_MASK;
            if self.flags.trailing_ones() as usize > MAX_IMPULSE_LEN {
                self.flags = 0;
                self.reseed();
            }

            let oldest_flagged = (self.flags >> MAX_IMPULSE_LEN) & 1 == 1;
            *x = match self.pending.push_sample(*x) {
                Some(oldest) => self.commit(oldest, oldest_flagged),
                None => 0.0,
            };
        }

        check_finite_output(ENGINE, block)
    }
}

impl BlockProcessor for NoiseBlanker {
    fn name(&self) -> &'static str {
        ENGINE
    }

    fn process_block(&mut self, block: &mut [f32]) -> NrResult<()> {
        self.blank(block)
    }

    fn latency(&self) -> usize {
        MAX_IMPULSE_LEN
    }

    fn state(&self) -> EngineState {
        self.lifecycle.state()
    }

    fn destroy(&mut self) -> NrResult<()> {
        self.lifecycle.destroy()?;
        self.history = RingSampleBuffer::new(1);
        self.pending = RingSampleBuffer::new(1);
        Ok(())
    }
}
