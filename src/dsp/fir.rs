//! FIR Filter Engine (Kaiser design + block convolution)
//!
//! # Design
//! - `estimate_req_filter_len` turns a transition bandwidth / stopband
//!   attenuation pair into a tap count with Kaiser's empirical formula:
//!   `N = ceil((As - 7.95) / (14.26 * ft)) + 1`.
//! - `firdes_kaiser` builds a windowed-sinc lowpass of explicit length,
//!   optionally shifted by a fractional sample offset `mu`.
//! - All frequencies are normalized to the sample rate (0.5 = Nyquist).
//!
//! # Block Convolution
//! `FirFilter` keeps a delay line of `taps - 1` samples. Each call lays the
//! delay line in front of the new block and slides the reversed coefficient
//! vector across that window, so the output does not depend on how the
//! stream is cut into blocks.
//!
//! # Measured Attenuation
//! A `design_kaiser` filter reaches between `As - 3 dB` and `As + 6 dB` of
//! attenuation beyond `fc + ft / 2`.

use crate::dsp::utils::{bessel_i0, check_block_len, check_finite_input, check_finite_output, sinc};
use crate::dsp::{BlockProcessor, EngineState, Lifecycle};
use crate::error::{NrError, NrResult};
use crate::MAX_BLOCK_LEN;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

const ENGINE: &str = "fir";

// Kaiser length estimator constants.
const KAISER_LEN_OFFSET_DB: f32 = 7.95;
const KAISER_LEN_SLOPE: f32 = 14.26;
// Upper bound on designed filter length.
pub const MAX_FILTER_LEN: usize = 1 << 16;

/// Estimate the tap count required for transition bandwidth `ft` (normalized,
/// in `(0, 0.5]`) and stopband attenuation `as_db`.
pub fn estimate_req_filter_len(ft: f32, as_db: f32) -> NrResult<usize> {
    if !(ft > 0.0 && ft <= 0.5) {
        return Err(NrError::InvalidDesignParameters(format!(
            "transition bandwidth {ft} outside (0, 0.5]"
        )));
    }
    if !(as_db > 0.0 && as_db.is_finite()) {
        return Err(NrError::InvalidDesignParameters(format!(
            "stopband attenuation {as_db} dB must be positive"
        )));
    }
    let est = (as_db - KAISER_LEN_OFFSET_DB) / (KAISER_LEN_SLOPE * ft);
    if !(est > 0.0) {
        return Err(NrError::InvalidDesignParameters(format!(
            "attenuation {as_db} dB with bandwidth {ft} yields a non-positive tap count"
        )));
    }
    // Bound before the cast: a tiny bandwidth drives `est` towards infinity.
    if !est.is_finite() || est.ceil() + 1.0 > MAX_FILTER_LEN as f32 {
        return Err(NrError::InvalidDesignParameters(format!(
            "bandwidth {ft} at {as_db} dB needs more than {MAX_FILTER_LEN} taps"
        )));
    }
    Ok(est.ceil() as usize + 1)
}

/// Kaiser window shape parameter for a given stopband attenuation.
pub fn kaiser_beta(as_db: f32) -> f32 {
    let a = as_db.abs();
    if a > 50.0 {
        0.1102 * (a - 8.7)
    } else if a > 21.0 {
        0.5842 * (a - 21.0).powf(0.4) + 0.07886 * (a - 21.0)
    } else {
        0.0
    }
}

/// Windowed-sinc lowpass of explicit length `n`, cutoff `fc`, attenuation
/// `as_db`, fractional sample offset `mu`. Unity DC gain.
pub fn firdes_kaiser(n: usize, fc: f32, as_db: f32, mu: f32) -> NrResult<Vec<f32>> {
    if n == 0 || n > MAX_FILTER_LEN {
        return Err(NrError::InvalidDesignParameters(format!(
            "filter length {n} outside 1..={MAX_FILTER_LEN}"
        )));
    }
    if !(fc > 0.0 && fc < 0.5) {
        return Err(NrError::InvalidDesignParameters(format!(
            "cutoff {fc} outside (0, 0.5)"
        )));
    }
    if !(as_db > 0.0 && as_db.is_finite()) {
        return Err(NrError::InvalidDesignParameters(format!(
            "stopband attenuation {as_db} dB must be positive"
        )));
    }
    if !(-0.5..=0.5).contains(&mu) {
        return Err(NrError::InvalidDesignParameters(format!(
            "fractional offset {mu} outside [-0.5, 0.5]"
        )));
    }

    let beta = kaiser_beta(as_db) as f64;
    let i0_beta = bessel_i0(beta);
    let fc = fc as f64;
    let half = (n as f64 - 1.0) * 0.5;

    let mut h: Vec<f64> = (0..n)
        .map(|i| {
            let t = i as f64 - half + mu as f64;
            let r = if n > 1 {
                (t / half).clamp(-1.0, 1.0)
            } else {
                0.0
            };
            let w = bessel_i0(beta * (1.0 - r * r).sqrt()) / i0_beta;
            2.0 * fc * sinc(2.0 * fc * t) * w
        })
        .collect();

    let dc: f64 = h.iter().sum();
    if dc.abs() > 1e-12 {
        for v in &mut h {
            *v /= dc;
        }
    }
    Ok(h.into_iter().map(|v| v as f32).collect())
}

/// Kaiser lowpass sized from its transition bandwidth.
pub fn design_kaiser(
    transition_bandwidth: f32,
    cutoff: f32,
    stopband_attenuation_db: f32,
    fractional_offset: f32,
) -> NrResult<FilterCoefficients> {
    let n = estimate_req_filter_len(transition_bandwidth, stopband_attenuation_db)?;
    let taps = firdes_kaiser(n, cutoff, stopband_attenuation_db, fractional_offset)?;
    FilterCoefficients::new(taps)
}

/// Ordered filter taps. Non-empty and finite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f32>", into = "Vec<f32>")]
pub struct FilterCoefficients {
    taps: Vec<f32>,
}

impl FilterCoefficients {
    pub fn new(taps: Vec<f32>) -> NrResult<Self> {
        if taps.is_empty() {
            return Err(NrError::InvalidDesignParameters(
                "coefficient vector is empty".into(),
            ));
        }
        if taps.len() > MAX_FILTER_LEN {
            return Err(NrError::InvalidDesignParameters(format!(
                "{} taps exceeds {MAX_FILTER_LEN}",
                taps.len()
            )));
        }
        if let Some(i) = taps.iter().position(|t| !t.is_finite()) {
            return Err(NrError::InvalidDesignParameters(format!(
                "coefficient {i} is not finite"
            )));
        }
        Ok(Self { taps })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.taps.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.taps.is_empty()
    }

    #[inline]
    pub fn as_slice(&self) -> &[f32] {
        &self.taps
    }

    /// Magnitude response at normalized frequency `f` (0.5 = Nyquist).
    pub fn magnitude_at(&self, f: f64) -> f64 {
        let mut re = 0.0f64;
        let mut im = 0.0f64;
        for (k, &h) in self.taps.iter().enumerate() {
            let ph = -2.0 * PI * f * k as f64;
            re += h as f64 * ph.cos();
            im += h as f64 * ph.sin();
        }
        (re * re + im * im).sqrt()
    }
}

impl TryFrom<Vec<f32>> for FilterCoefficients {
    type Error = NrError;

    fn try_from(taps: Vec<f32>) -> NrResult<Self> {
        Self::new(taps)
    }
}

impl From<FilterCoefficients> for Vec<f32> {
    fn from(c: FilterCoefficients) -> Self {
        c.taps
    }
}

/// FIR stage description: explicit taps, or Kaiser design parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FirConfig {
    Taps {
        taps: FilterCoefficients,
    },
    Design {
        transition_bandwidth: f32,
        cutoff: f32,
        stopband_attenuation_db: f32,
        #[serde(default)]
        fractional_offset: f32,
    },
}

impl FirConfig {
    pub fn coefficients(&self) -> NrResult<FilterCoefficients> {
        match self {
            FirConfig::Taps { taps } => Ok(taps.clone()),
            FirConfig::Design {
                transition_bandwidth,
                cutoff,
                stopband_attenuation_db,
                fractional_offset,
            } => design_kaiser(
                *transition_bandwidth,
                *cutoff,
                *stopband_attenuation_db,
                *fractional_offset,
            ),
        }
    }
}

/// Streaming FIR filter with persistent delay line.
pub struct FirFilter {
    coeffs: FilterCoefficients,
    // Coefficients reversed so each output is a forward dot product.
    reversed: Vec<f32>,
    // Last `taps - 1` input samples.
    delay: Vec<f32>,
    // Delay line followed by the current block; capacity fixed at creation.
    window: Vec<f32>,
    lifecycle: Lifecycle,
}

impl FirFilter {
    pub fn new(coeffs: FilterCoefficients) -> Self {
        let n = coeffs.len();
        let reversed: Vec<f32> = coeffs.as_slice().iter().rev().copied().collect();
        log::debug!("{ENGINE}: created with {n} taps");
        Self {
            coeffs,
            reversed,
            delay: vec![0.0; n - 1],
            window: Vec::with_capacity(n - 1 + MAX_BLOCK_LEN),
            lifecycle: Lifecycle::new(ENGINE),
        }
    }

    pub fn coefficients(&self) -> &FilterCoefficients {
        &self.coeffs
    }

    /// Delay-line contents, oldest first.
    pub fn delay_line(&self) -> &[f32] {
        &self.delay
    }

    /// Clear the delay line without touching the coefficients.
    pub fn reset(&mut self) {
        self.delay.fill(0.0);
    }

    /// Convolve `block` in place, carrying the delay line into the next call.
    pub fn execute_block(&mut self, block: &mut [f32]) -> NrResult<()> {
        self.lifecycle.enter_block()?;
        check_block_len(block.len())?;
        check_finite_input(ENGINE, block)?;
        if block.is_empty() {
            return Ok(());
        }

        let n = self.reversed.len();
        let hist = n - 1;

        self.window.clear();
        self.window.extend_from_slice(&self.delay);
        self.window.extend_from_slice(block);

        for (i, out) in block.iter_mut().enumerate() {
            let frame = &self.window[i..i + n];
            let mut acc = 0.0f32;
            for (h, x) in self.reversed.iter().zip(frame) {
                acc += h * x;
            }
            *out = acc;
        }

        let tail = self.window.len() - hist;
        self.delay.copy_from_slice(&self.window[tail..]);

        check_finite_output(ENGINE, block)
    }
}

impl BlockProcessor for FirFilter {
    fn name(&self) -> &'static str {
        ENGINE
    }

    fn process_block(&mut self, block: &mut [f32]) -> NrResult<()> {
        self.execute_block(block)
    }

    fn state(&self) -> EngineState {
        self.lifecycle.state()
    }

    fn destroy(&mut self) -> NrResult<()> {
        self.lifecycle.destroy()?;
        self.reversed = Vec::new();
        self.delay = Vec::new();
        self.window = Vec::new();
        Ok(())
    }
}
