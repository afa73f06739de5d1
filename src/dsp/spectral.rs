//! Spectral Noise Reduction (STFT Wiener gain + overlap-add)
//!
//! # Per Frame
//! 1. **Window**: sqrt-Hann analysis window, 50% overlap.
//! 2. **Transform**: forward FFT, per-bin power.
//! 3. **Noise Floor**: exponential moving average controlled by `alpha`.
//!    Bins above `NOISE_GATE` times the floor are treated as signal and the
//!    floor only creeps towards them. The first frame seeds the floor.
//! 4. **Gain**: Wiener curve `xi / (1 + xi)` on the instantaneous SNR
//!    estimate `xi = max(P / N - 1, 0)`, floored at `10^(-asnr / 20)`.
//! 5. **Reconstruct**: inverse FFT, sqrt-Hann synthesis window, weighted
//!    overlap-add with the previous frame's tail, scaled by `gain`.
//!
//! # Latency
//! The output queue is primed with one frame of zeros, so output lags input
//! by exactly `frame_len` samples. This is expected behavior: the first
//! `frame_len` samples out of a fresh engine are silence.
//!
//! # Assumptions
//! - Background noise is stationary or slowly varying.
//! - Impulse noise is not modeled; run the blanker first.

use crate::dsp::utils::{
    check_block_len, check_finite_input, check_finite_output, db_to_gain, make_sqrt_hann_window,
    MAG_FLOOR,
};
use crate::dsp::{BlockProcessor, EngineState, Lifecycle};
use crate::error::{NrError, NrResult};
use ringbuf::{Consumer, Producer, RingBuffer};
use rustfft::{num_complex::Complex, Fft, FftPlanner};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const ENGINE: &str = "spectral";

// Default frame duration when no explicit length is configured.
const FRAME_SECONDS: f32 = 0.016;
pub const MIN_FRAME_LEN: usize = 64;
pub const MAX_FRAME_LEN: usize = 4096;
const SAMPLE_RATE_MIN: f32 = 1000.0;
const SAMPLE_RATE_MAX: f32 = 384_000.0;
// Ring buffer capacity multiplier relative to frame length.
const RINGBUF_CAP_MULT: usize = 4;
// Power above this multiple of the floor counts as signal.
const NOISE_GATE: f32 = 4.0;
// Floor rise rate above the gate, relative to (1 - alpha).
const NOISE_RISE_SCALE: f32 = 0.05;
// OLA normalization floor.
const OLA_NORM_EPS: f32 = 1e-6;

/// Configuration for the spectral noise reducer
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpectralConfig {
    pub sample_rate: f32,
    /// Output level scale.
    pub gain: f32,
    /// Noise floor smoothing, 0..1 (closer to 1 = slower).
    pub alpha: f32,
    /// Maximum attenuation in dB.
    pub asnr: f32,
    /// FFT length override (power of two).
    pub frame_len: Option<usize>,
}

impl Default for SpectralConfig {
    fn default() -> Self {
        Self {
            sample_rate: 12_000.0,
            gain: 1.0,
            alpha: 0.95,
            asnr: 20.0,
            frame_len: None,
        }
    }
}

impl SpectralConfig {
    pub fn validate(&self) -> NrResult<()> {
        if !(SAMPLE_RATE_MIN..=SAMPLE_RATE_MAX).contains(&self.sample_rate) {
            return Err(NrError::InvalidConfig(format!(
                "spectral sample rate {} outside {SAMPLE_RATE_MIN}..={SAMPLE_RATE_MAX}",
                self.sample_rate
            )));
        }
        if !(self.gain >= 0.0 && self.gain.is_finite()) {
            return Err(NrError::InvalidConfig(format!(
                "spectral gain {} must be finite and >= 0",
                self.gain
            )));
        }
        if !(0.0..1.0).contains(&self.alpha) {
            return Err(NrError::InvalidConfig(format!(
                "spectral alpha {} outside [0, 1)",
                self.alpha
            )));
        }
        if !(self.asnr >= 0.0 && self.asnr.is_finite()) {
            return Err(NrError::InvalidConfig(format!(
                "spectral asnr {} dB must be finite and >= 0",
                self.asnr
            )));
        }
        if let Some(n) = self.frame_len {
            if !n.is_power_of_two() || !(MIN_FRAME_LEN..=MAX_FRAME_LEN).contains(&n) {
                return Err(NrError::InvalidConfig(format!(
                    "spectral frame length {n} must be a power of two in {MIN_FRAME_LEN}..={MAX_FRAME_LEN}"
                )));
            }
        }
        Ok(())
    }

    /// FFT length actually used.
    pub fn resolved_frame_len(&self) -> usize {
        self.frame_len.unwrap_or_else(|| {
            ((self.sample_rate * FRAME_SECONDS).ceil() as usize)
                .next_power_of_two()
                .clamp(MIN_FRAME_LEN, MAX_FRAME_LEN)
        })
    }
}

pub struct SpectralNoiseReducer {
    cfg: SpectralConfig,
    fft: Arc<dyn Fft<f32>>,
    ifft: Arc<dyn Fft<f32>>,
    win_size: usize,
    hop_size: usize,
    window: Vec<f32>,

    scratch: Vec<Complex<f32>>,
    fft_scratch: Vec<Complex<f32>>,
    ifft_scratch: Vec<Complex<f32>>,

    noise_floor: Vec<f32>,
    gains: Vec<f32>,
    noise_seeded: bool,
    gain_floor: f32,

    overlap: Vec<f32>,
    ola_norm: Vec<f32>,
    input_producer: Producer<f32>,
    input_consumer: Consumer<f32>,
    output_producer: Producer<f32>,
    output_consumer: Consumer<f32>,

    frames: u64,
    lifecycle: Lifecycle,
}

impl SpectralNoiseReducer {
    pub fn new(cfg: SpectralConfig) -> NrResult<Self> {
        cfg.validate()?;
        let win_size = cfg.resolved_frame_len();
        let hop_size = win_size / 2;
        let nyq = win_size / 2;

        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(win_size);
        let ifft = planner.plan_fft_inverse(win_size);
        let fft_scratch_len = fft.get_inplace_scratch_len();
        let ifft_scratch_len = ifft.get_inplace_scratch_len();

        let buf_cap = win_size * RINGBUF_CAP_MULT;
        let (in_prod, in_cons) = RingBuffer::<f32>::new(buf_cap).split();
        let (out_prod, out_cons) = RingBuffer::<f32>::new(buf_cap).split();
        let mut initialized_out_prod = out_prod;
        // Prime output with one frame of zeros so pops never underflow.
        for _ in 0..win_size {
            let _ = initialized_out_prod.push(0.0);
        }

        log::debug!(
            "{ENGINE}: created sr={} frame={win_size} gain={} alpha={} asnr={}dB",
            cfg.sample_rate,
            cfg.gain,
            cfg.alpha,
            cfg.asnr
        );

        Ok(Self {
            cfg,
            fft,
            ifft,
            win_size,
            hop_size,
            window: make_sqrt_hann_window(win_size),
            scratch: vec![Complex::new(0.0, 0.0); win_size],
            fft_scratch: vec![Complex::new(0.0, 0.0); fft_scratch_len],
            ifft_scratch: vec![Complex::new(0.0, 0.0); ifft_scratch_len],
            noise_floor: vec![MAG_FLOOR; nyq + 1],
            gains: vec![1.0; nyq + 1],
            noise_seeded: false,
            gain_floor: db_to_gain(-cfg.asnr),
            overlap: vec![0.0; win_size],
            ola_norm: vec![0.0; win_size],
            input_producer: in_prod,
            input_consumer: in_cons,
            output_producer: initialized_out_prod,
            output_consumer: out_cons,
            frames: 0,
            lifecycle: Lifecycle::new(ENGINE),
        })
    }

    pub fn config(&self) -> &SpectralConfig {
        &self.cfg
    }

    pub fn frame_len(&self) -> usize {
        self.win_size
    }

    /// Frames transformed since construction.
    pub fn frames_processed(&self) -> u64 {
        self.frames
    }

    /// Current per-bin noise power estimate (`frame_len / 2 + 1` bins).
    pub fn noise_floor(&self) -> &[f32] {
        &self.noise_floor
    }

    /// Denoise `block` in place. Output lags input by `frame_len` samples.
    pub fn process(&mut self, block: &mut [f32]) -> NrResult<()> {
        self.lifecycle.enter_block()?;
        check_block_len(block.len())?;
        check_finite_input(ENGINE, block)?;

        for x in block.iter_mut() {
            let _ = self.input_producer.push(*x);
            if self.input_consumer.len() >= self.win_size {
                self.process_frame();
                self.input_consumer.discard(self.hop_size);
            }
            *x = self.output_consumer.pop().unwrap_or(0.0);
        }

        check_finite_output(ENGINE, block)
    }

    fn update_gains(&mut self) {
        let nyq = self.win_size / 2;
        let alpha = self.cfg.alpha;
        let rise = 1.0 - (1.0 - alpha) * NOISE_RISE_SCALE;

        for i in 0..=nyq {
            let p = self.scratch[i].norm_sqr().max(MAG_FLOOR);
            let nf = self.noise_floor[i];

            let next = if !self.noise_seeded {
                p
            } else if p <= NOISE_GATE * nf {
                alpha * nf + (1.0 - alpha) * p
            } else {
                rise * nf + (1.0 - rise) * p
            };
            self.noise_floor[i] = next.max(MAG_FLOOR);

            let xi = (p / self.noise_floor[i] - 1.0).max(0.0);
            self.gains[i] = (xi / (1.0 + xi)).max(self.gain_floor);
        }
        self.noise_seeded = true;
    }

    fn process_frame(&mut self) {
        let n = self.win_size;
        let nyq = n / 2;

        for (i, val) in self.input_consumer.iter().take(n).enumerate() {
            self.scratch[i] = Complex::new(*val * self.window[i], 0.0);
        }
        #[cfg(feature = "assert_process_allocs")]
        assert_no_alloc::assert_no_alloc(|| {
            self.fft
                .process_with_scratch(&mut self.scratch, &mut self.fft_scratch);
        });
        #[cfg(not(feature = "assert_process_allocs"))]
        self.fft
            .process_with_scratch(&mut self.scratch, &mut self.fft_scratch);

        self.update_gains();

        for i in 0..=nyq {
            self.scratch[i] *= self.gains[i];
        }
        // Restore conjugate symmetry for a real inverse transform.
        self.scratch[0].im = 0.0;
        self.scratch[nyq].im = 0.0;
        for k in 1..nyq {
            let a = self.scratch[k];
            self.scratch[n - k] = a.conj();
        }

        #[cfg(feature = "assert_process_allocs")]
        assert_no_alloc::assert_no_alloc(|| {
            self.ifft
                .process_with_scratch(&mut self.scratch, &mut self.ifft_scratch);
        });
        #[cfg(not(feature = "assert_process_allocs"))]
        self.ifft
            .process_with_scratch(&mut self.scratch, &mut self.ifft_scratch);

        let norm = 1.0 / n as f32;
        for i in 0..n {
            let w = self.window[i];
            self.overlap[i] += self.scratch[i].re * norm * w;
            self.ola_norm[i] += w * w;
        }
        for i in 0..self.hop_size {
            let y = self.overlap[i] / self.ola_norm[i].max(OLA_NORM_EPS) * self.cfg.gain;
            let _ = self.output_producer.push(y);
        }
        self.overlap.copy_within(self.hop_size..n, 0);
        self.ola_norm.copy_within(self.hop_size..n, 0);
        for i in (n - self.hop_size)..n {
            self.overlap[i] = 0.0;
            self.ola_norm[i] = 0.0;
        }
        self.frames += 1;
    }
}

impl BlockProcessor for SpectralNoiseReducer {
    fn name(&self) -> &'static str {
        ENGINE
    }

    fn process_block(&mut self, block: &mut [f32]) -> NrResult<()> {
        self.process(block)
    }

    fn latency(&self) -> usize {
        self.win_size
    }

    fn state(&self) -> EngineState {
        self.lifecycle.state()
    }

    fn destroy(&mut self) -> NrResult<()> {
        self.lifecycle.destroy()?;
        self.window = Vec::new();
        self.scratch = Vec::new();
        self.fft_scratch = Vec::new();
        self.ifft_scratch = Vec::new();
        self.noise_floor = Vec::new();
        self.gains = Vec::new();
        self.overlap = Vec::new();
        self.ola_norm = Vec::new();
        let (ip, ic) = RingBuffer::<f32>::new(1).split();
        let (op, oc) = RingBuffer::<f32>::new(1).split();
        self.input_producer = ip;
        self.input_consumer = ic;
        self.output_producer = op;
        self.output_consumer = oc;
        Ok(())
    }
}
