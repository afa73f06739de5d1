//! Adaptive Noise Reduction (variable-leak LMS)
//!
//! # Model
//! A normalized LMS predictor looks at a delayed copy of the signal and
//! predicts the current sample. Whatever is correlated across the delay
//! (carriers, tones, voiced speech) is predictable; broadband noise is not.
//!
//! - **Notch**: output is the prediction error, removing correlated tones.
//! - **Denoise**: output is the (scaled) prediction, keeping the correlated
//!   part and dropping uncorrelated noise.
//!
//! # Leakage
//! Coefficients are multiplied by `1 - gain * gamma_eff` every sample.
//! `gamma_eff = leakage * lidx^4 * 6.25e-10`, where the leak index `lidx`
//! walks between 120 and 200: it rises when a leaky update would have
//! produced a smaller error than a plain one, and falls otherwise.
//! Leakage keeps the coefficients bounded on long runs; a block that still
//! drives them past `COEFF_LIMIT` is reported as numerically unstable.
//!
//! # Lifecycle
//! `Created -> Running -> Destroyed`. No mid-stream reset.

use crate::dsp::utils::{check_block_len, check_finite_input, check_finite_output};
use crate::dsp::{BlockProcessor, EngineState, Lifecycle};
use crate::error::{Instability, NrError, NrResult};
use serde::{Deserialize, Serialize};

const ENGINE: &str = "anr";

// Delay line length. Must be a power of two.
pub const ANR_DLINE_SIZE: usize = 512;
const ANR_MASK: usize = ANR_DLINE_SIZE - 1;
// Leak index walk.
const LIDX_MIN: f32 = 120.0;
const LIDX_MAX: f32 = 200.0;
const LIDX_INCR: f32 = 1.0;
const LIDX_DECR: f32 = 3.0;
const NGAMMA_INIT: f32 = 0.001;
const DEN_MULT: f32 = 6.25e-10;
// Guards the normalization when the delay line is silent.
const SIGMA_EPS: f32 = 1e-10;
// Output makeup for the denoise variant.
const DENOISE_OUTPUT_SCALE: f32 = 4.0;
// Any coefficient beyond this magnitude means the predictor has diverged.
pub const COEFF_LIMIT: f32 = 1e4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnrVariant {
    /// Output the prediction error.
    Notch,
    /// Output the prediction.
    #[default]
    Denoise,
}

/// Configuration for the adaptive noise reducer
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnrConfig {
    pub variant: AnrVariant,
    pub taps: usize,
    pub delay: usize,
    /// Adaptation step (2 * mu).
    pub gain: f32,
    /// Leakage factor (gamma).
    pub leakage: f32,
}

impl Default for AnrConfig {
    fn default() -> Self {
        Self {
            variant: AnrVariant::Denoise,
            taps: 64,
            delay: 16,
            gain: 1e-4,
            leakage: 0.1,
        }
    }
}

impl AnrConfig {
    pub fn validate(&self) -> NrResult<()> {
        if self.taps == 0 || self.delay == 0 {
            return Err(NrError::InvalidConfig(format!(
                "anr taps ({}) and delay ({}) must be >= 1",
                self.taps, self.delay
            )));
        }
        if self.taps + self.delay > ANR_DLINE_SIZE {
            return Err(NrError::InvalidConfig(format!(
                "anr taps + delay ({}) exceeds delay line of {ANR_DLINE_SIZE}",
                self.taps + self.delay
            )));
        }
        if !(self.gain > 0.0 && self.gain.is_finite()) {
            return Err(NrError::InvalidConfig(format!(
                "anr gain {} must be finite and > 0",
                self.gain
            )));
        }
        if !(self.leakage >= 0.0 && self.leakage.is_finite()) {
            return Err(NrError::InvalidConfig(format!(
                "anr leakage {} must be finite and >= 0",
                self.leakage
            )));
        }
        Ok(())
    }
}

pub struct AdaptiveNoiseReducer {
    cfg: AnrConfig,
    // Signal history, written backwards from `in_idx`.
    d: Vec<f32>,
    // Adaptive coefficients, one per tap.
    w: Vec<f32>,
    in_idx: usize,
    lidx: f32,
    ngamma: f32,
    lifecycle: Lifecycle,
}

impl AdaptiveNoiseReducer {
    pub fn new(cfg: AnrConfig) -> NrResult<Self> {
        cfg.validate()?;
        log::debug!(
            "{ENGINE}: created {:?} taps={} delay={} gain={} leakage={}",
            cfg.variant,
            cfg.taps,
            cfg.delay,
            cfg.gain,
            cfg.leakage
        );
        Ok(Self {
            cfg,
            d: vec![0.0; ANR_DLINE_SIZE],
            w: vec![0.0; cfg.taps],
            in_idx: 0,
            lidx: LIDX_MIN,
            ngamma: NGAMMA_INIT,
            lifecycle: Lifecycle::new(ENGINE),
        })
    }

    pub fn config(&self) -> &AnrConfig {
        &self.cfg
    }

    pub fn coefficients(&self) -> &[f32] {
        &self.w
    }

    /// Denoise `block` in place.
    pub fn filter(&mut self, block: &mut [f32]) -> NrResult<()> {
        self.lifecycle.enter_block()?;
        check_block_len(block.len())?;
        check_finite_input(ENGINE, block)?;

        let taps = self.cfg.taps;
        let delay = self.cfg.delay;
        let two_mu = self.cfg.gain;
        let gamma = self.cfg.leakage;

        for x in block.iter_mut() {
            self.d[self.in_idx] = *x;

            let mut y = 0.0f32;
            let mut sigma = 0.0f32;
            for j in 0..taps {
                let v = self.d[(self.in_idx + j + delay) & ANR_MASK];
                y += self.w[j] * v;
                sigma += v * v;
            }

            let inv_sigp = 1.0 / (sigma + SIGMA_EPS);
            let error = *x - y;

            *x = match self.cfg.variant {
                AnrVariant::Notch => error,
                AnrVariant::Denoise => y * DENOISE_OUTPUT_SCALE,
            };

            // Compare plain vs leaky a-posteriori error to steer the leak.
            let nel = (error * (1.0 - two_mu * sigma * inv_sigp)).abs();
            let nev = (self.d[self.in_idx]
                - (1.0 - two_mu * self.ngamma) * y
                - two_mu * error * sigma * inv_sigp)
                .abs();
            if nev < nel {
                self.lidx = (self.lidx + LIDX_INCR).min(LIDX_MAX);
            } else {
                self.lidx = (self.lidx - LIDX_DECR).max(LIDX_MIN);
            }
            let l2 = self.lidx * self.lidx;
            self.ngamma = gamma * l2 * l2 * DEN_MULT;

            let c0 = 1.0 - two_mu * self.ngamma;
            let c1 = two_mu * error * inv_sigp;
            for j in 0..taps {
                let v = self.d[(self.in_idx + j + delay) & ANR_MASK];
                self.w[j] = c0 * self.w[j] + c1 * v;
            }

            self.in_idx = (self.in_idx + ANR_MASK) & ANR_MASK;
        }

        if let Some(tap) = self
            .w
            .iter()
            .position(|c| !c.is_finite() || c.abs() > COEFF_LIMIT)
        {
            log::warn!("{ENGINE}: coefficient {tap} diverged");
            return Err(NrError::NumericInstability {
                engine: ENGINE,
                cause: Instability::CoefficientOverflow { tap },
            });
        }
        check_finite_output(ENGINE, block)
    }
}

impl BlockProcessor for AdaptiveNoiseReducer {
    fn name(&self) -> &'static str {
        ENGINE
    }

    fn process_block(&mut self, block: &mut [f32]) -> NrResult<()> {
        self.filter(block)
    }

    fn state(&self) -> EngineState {
        self.lifecycle.state()
    }

    fn destroy(&mut self) -> NrResult<()> {
        self.lifecycle.destroy()?;
        self.d = Vec::new();
        self.w = Vec::new();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::utils::frame_rms;
    use std::f32::consts::PI;

    fn sine(n: usize, freq: f32, amp: f32) -> Vec<f32> {
        (0..n).map(|i| amp * (2.0 * PI * freq * i as f32).sin()).collect()
    }

    fn tone_cfg(variant: AnrVariant) -> AnrConfig {
        AnrConfig {
            variant,
            taps: 32,
            delay: 4,
            gain: 0.05,
            leakage: 0.001,
        }
    }

    #[test]
    fn test_zero_input_stays_zero() {
        let mut anr = AdaptiveNoiseReducer::new(AnrConfig::default()).unwrap();
        for _ in 0..20 {
            let mut block = vec![0.0f32; 256];
            anr.filter(&mut block).unwrap();
            assert!(block.iter().all(|&v| v == 0.0));
        }
        assert!(anr.coefficients().iter().all(|&c| c == 0.0));
        assert_eq!(anr.state(), EngineState::Running);
    }

    #[test]
    fn test_notch_removes_steady_tone() {
        let mut anr = AdaptiveNoiseReducer::new(tone_cfg(AnrVariant::Notch)).unwrap();
        let input = sine(8192, 0.05, 0.5);
        let mut out = input.clone();
        for block in out.chunks_mut(512) {
            anr.filter(block).unwrap();
        }
        let tail_in = frame_rms(&input[6144..]);
        let tail_out = frame_rms(&out[6144..]);
        assert!(tail_out < 0.2 * tail_in, "in {tail_in} out {tail_out}");
    }

    #[test]
    fn test_denoise_keeps_tone_with_makeup_gain() {
        let mut anr = AdaptiveNoiseReducer::new(tone_cfg(AnrVariant::Denoise)).unwrap();
        let input = sine(8192, 0.05, 0.5);
        let mut out = input.clone();
        for block in out.chunks_mut(512) {
            anr.filter(block).unwrap();
        }
        let ratio = frame_rms(&out[6144..]) / frame_rms(&input[6144..]);
        assert!(ratio > 3.0 && ratio < 4.2, "ratio {ratio}");
    }

    #[test]
    fn test_block_partition_invariance() {
        let input: Vec<f32> = sine(3000, 0.031, 0.4)
            .iter()
            .zip(sine(3000, 0.17, 0.1))
            .map(|(a, b)| a + b)
            .collect();

        let mut whole = input.clone();
        let mut anr = AdaptiveNoiseReducer::new(tone_cfg(AnrVariant::Notch)).unwrap();
        anr.filter(&mut whole).unwrap();

        let mut pieces = input.clone();
        let mut anr = AdaptiveNoiseReducer::new(tone_cfg(AnrVariant::Notch)).unwrap();
        for block in pieces.chunks_mut(37) {
            anr.filter(block).unwrap();
        }
        assert_eq!(whole, pieces);
    }

    #[test]
    fn test_divergence_is_reported() {
        let cfg = AnrConfig {
            variant: AnrVariant::Notch,
            taps: 32,
            delay: 1,
            gain: 50.0,
            leakage: 0.0,
        };
        let mut anr = AdaptiveNoiseReducer::new(cfg).unwrap();
        let mut block: Vec<f32> = sine(4096, 0.013, 0.5)
            .iter()
            .zip(sine(4096, 0.21, 0.3))
            .map(|(a, b)| a + b)
            .collect();
        let result = anr.filter(&mut block);
        assert!(matches!(
            result,
            Err(NrError::NumericInstability { engine: "anr", .. })
        ));
    }

    #[test]
    fn test_non_finite_input_leaves_state_untouched() {
        let mut anr = AdaptiveNoiseReducer::new(AnrConfig::default()).unwrap();
        let mut bad = [0.1, f32::NAN, 0.2];
        assert_eq!(
            anr.filter(&mut bad),
            Err(NrError::NumericInstability {
                engine: "anr",
                cause: Instability::NonFiniteInput { index: 1 },
            })
        );
        let mut zeros = [0.0f32; 64];
        anr.filter(&mut zeros).unwrap();
        assert!(zeros.iter().all(|&v| v == 0.0));
        assert!(anr.coefficients().iter().all(|&c| c == 0.0));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut cfg = AnrConfig::default();
        cfg.taps = 0;
        assert!(matches!(
            AdaptiveNoiseReducer::new(cfg),
            Err(NrError::InvalidConfig(_))
        ));
        let cfg = AnrConfig {
            taps: 400,
            delay: 200,
            ..AnrConfig::default()
        };
        assert!(AdaptiveNoiseReducer::new(cfg).is_err());
        let cfg = AnrConfig {
            gain: 0.0,
            ..AnrConfig::default()
        };
        assert!(AdaptiveNoiseReducer::new(cfg).is_err());
    }

    #[test]
    fn test_every_block_length_preserved() {
        let mut anr = AdaptiveNoiseReducer::new(AnrConfig::default()).unwrap();
        for len in [0usize, 1, 2, 3, 63, 64, 1000, crate::MAX_BLOCK_LEN] {
            let mut block = sine(len, 0.03, 0.2);
            anr.filter(&mut block).unwrap();
            assert_eq!(block.len(), len);
        }
        let mut too_big = vec![0.0; crate::MAX_BLOCK_LEN + 1];
        assert_eq!(
            anr.filter(&mut too_big),
            Err(NrError::BlockTooLarge {
                len: crate::MAX_BLOCK_LEN + 1,
                max: crate::MAX_BLOCK_LEN
            })
        );
        assert_eq!(anr.state(), EngineState::Running);
    }

    #[test]
    fn test_destroyed_engine_rejects_blocks() {
        let mut anr = AdaptiveNoiseReducer::new(AnrConfig::default()).unwrap();
        anr.destroy().unwrap();
        let mut block = [0.0f32; 4];
        assert_eq!(
            anr.filter(&mut block),
            Err(NrError::UseAfterFree { engine: "anr" })
        );
        assert!(anr.destroy().is_err());
    }
}
