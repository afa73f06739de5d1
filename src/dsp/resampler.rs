//! Polyphase Arbitrary-Rate Resampler
//!
//! A Kaiser prototype of `2·m·npfb + 1` taps is split into `npfb + 1`
//! branches, one per fractional phase. Each output sample evaluates the two
//! branches bracketing its phase against the last `2·m + 1` inputs and
//! interpolates linearly between them.
//!
//! Output length varies per call (about `len · rate`), so this engine does
//! not implement `BlockProcessor`; callers append into a reusable `Vec`.
//! Group delay is `m` input samples.

use crate::dsp::fir::firdes_kaiser;
use crate::dsp::ring::RingSampleBuffer;
use crate::dsp::utils::{check_block_len, check_finite_input, check_finite_output, lerp};
use crate::dsp::{EngineState, Lifecycle};
use crate::error::{NrError, NrResult};
use crate::MAX_BLOCK_LEN;

const ENGINE: &str = "resampler";

const RATE_MIN: f32 = 0.01;
const RATE_MAX: f32 = 100.0;
const MAX_SEMI_LEN: usize = 64;
const MAX_BRANCHES: usize = 1024;

pub struct Resampler {
    rate: f32,
    m: usize,
    npfb: usize,
    step: f64,
    tau: f64,
    // Branch q, reversed so that tap i multiplies delay line sample i.
    branches: Vec<Vec<f32>>,
    delay: RingSampleBuffer,
    lifecycle: Lifecycle,
}

impl Resampler {
    /// `rate` = output / input, `m` = filter semi-length in input samples,
    /// `fc` = prototype cutoff (normalized to the input rate), `as_db` =
    /// stopband attenuation, `npfb` = number of filterbank phases.
    pub fn new(rate: f32, m: usize, fc: f32, as_db: f32, npfb: usize) -> NrResult<Self> {
        if !(RATE_MIN..=RATE_MAX).contains(&rate) {
            return Err(NrError::InvalidDesignParameters(format!(
                "resampling rate {rate} outside {RATE_MIN}..={RATE_MAX}"
            )));
        }
        if !(1..=MAX_SEMI_LEN).contains(&m) {
            return Err(NrError::InvalidDesignParameters(format!(
                "filter semi-length {m} outside 1..={MAX_SEMI_LEN}"
            )));
        }
        if !(2..=MAX_BRANCHES).contains(&npfb) {
            return Err(NrError::InvalidDesignParameters(format!(
                "filterbank size {npfb} outside 2..={MAX_BRANCHES}"
            )));
        }
        if !(fc > 0.0 && fc < 0.5) {
            return Err(NrError::InvalidDesignParameters(format!(
                "cutoff {fc} outside (0, 0.5)"
            )));
        }

        let proto_len = 2 * m * npfb + 1;
        let mut proto = firdes_kaiser(proto_len, fc / npfb as f32, as_db, 0.0)?;
        for v in &mut proto {
            *v *= npfb as f32;
        }

        let taps = 2 * m + 1;
        let branches = (0..=npfb)
            .map(|q| {
                (0..taps)
                    .map(|i| {
                        let k = taps - 1 - i;
                        proto.get(k * npfb + q).copied().unwrap_or(0.0)
                    })
                    .collect()
            })
            .collect();

        let mut delay = RingSampleBuffer::new(taps);
        for _ in 0..taps {
            delay.push_sample(0.0);
        }

        log::debug!(
            "{ENGINE}: created rate={rate} m={m} fc={fc} As={as_db}dB npfb={npfb} proto_len={proto_len}"
        );

        Ok(Self {
            rate,
            m,
            npfb,
            step: 1.0 / rate as f64,
            tau: 0.0,
            branches,
            delay,
            lifecycle: Lifecycle::new(ENGINE),
        })
    }

    pub fn rate(&self) -> f32 {
        self.rate
    }

    /// Group delay in input samples.
    pub fn latency(&self) -> usize {
        self.m
    }

    pub fn state(&self) -> EngineState {
        self.lifecycle.state()
    }

    /// Upper bound on samples produced for `input_len` inputs.
    pub fn max_output_len(&self, input_len: usize) -> usize {
        (input_len as f64 * self.rate as f64).ceil() as usize + 1
    }

    pub fn reset(&mut self) {
        self.tau = 0.0;
        self.delay.clear();
        for _ in 0..self.delay.capacity() {
            self.delay.push_sample(0.0);
        }
    }

    #[inline]
    fn branch_output(&self, q: usize) -> f32 {
        let taps = &self.branches[q];
        let Ok((a, b)) = self.delay.read(0, taps.len()) else {
            return 0.0;
        };
        let (ta, tb) = taps.split_at(a.len());
        let mut acc = 0.0f32;
        for (c, x) in ta.iter().zip(a) {
            acc += c * x;
        }
        for (c, x) in tb.iter().zip(b) {
            acc += c * x;
        }
        acc
    }

    /// Resample `input`, appending to `output`. Returns the number of samples
    /// appended. Reserve `max_output_len` on `output` to stay allocation-free.
    pub fn execute(&mut self, input: &[f32], output: &mut Vec<f32>) -> NrResult<usize> {
        self.lifecycle.enter_block()?;
        check_block_len(input.len())?;
        let projected = self.max_output_len(input.len());
        if projected > MAX_BLOCK_LEN {
            return Err(NrError::BlockTooLarge {
                len: projected,
                max: MAX_BLOCK_LEN,
            });
        }
        check_finite_input(ENGINE, input)?;

        let start = output.len();
        for &x in input {
            self.delay.push_sample(x);
            while self.tau < 1.0 {
                let phase = self.tau * self.npfb as f64;
                let q = (phase.floor() as usize).min(self.npfb - 1);
                let frac = (phase - q as f64) as f32;
                let y0 = self.branch_output(q);
                let y1 = self.branch_output(q + 1);
                output.push(lerp(y0, y1, frac));
                self.tau += self.step;
            }
            self.tau -= 1.0;
        }

        check_finite_output(ENGINE, &output[start..])?;
        Ok(output.len() - start)
    }

    pub fn destroy(&mut self) -> NrResult<()> {
        self.lifecycle.destroy()?;
        self.branches = Vec::new();
        self.delay = RingSampleBuffer::new(1);
        Ok(())
    }
}
