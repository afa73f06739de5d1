//! Look-Ahead Automatic Gain Control
//!
//! Normalizes the peak level of the stream towards `desired_level`.
//!
//! - Peak detector: running maximum of `|x|` over the look-ahead window,
//!   kept as a monotonic deque so each sample costs amortized O(1).
//! - Target gain `desired_level / peak`, capped at `max_gain` so silence
//!   does not wind the gain up without bound.
//! - Falling targets follow the attack time, rising targets the release time.
//! - Output is zero until the look-ahead window has filled. Latency is
//!   `look_ahead - 1` samples.

use crate::dsp::ring::RingSampleBuffer;
use crate::dsp::utils::{
    check_block_len, check_finite_input, check_finite_output, time_constant_coeff,
};
use crate::dsp::{BlockProcessor, EngineState, Lifecycle};
use crate::error::{NrError, NrResult};
use crate::MAX_BLOCK_LEN;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

const ENGINE: &str = "agc";
const PEAK_EPS: f32 = 1e-15;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgcConfig {
    /// Target peak level (linear, full scale = 1).
    pub desired_level: f32,
    pub attack_ms: f32,
    pub release_ms: f32,
    pub look_ahead_ms: f32,
    pub sample_rate: f32,
    /// Upper bound on applied gain (linear).
    pub max_gain: f32,
}

impl Default for AgcConfig {
    fn default() -> Self {
        Self {
            desired_level: 0.1,
            attack_ms: 50.0,
            release_ms: 300.0,
            look_ahead_ms: 10.0,
            sample_rate: 44_100.0,
            max_gain: 1000.0,
        }
    }
}

impl AgcConfig {
    pub fn look_ahead_samples(&self) -> usize {
        (self.look_ahead_ms * self.sample_rate / 1000.0) as usize
    }

    pub fn validate(&self) -> NrResult<()> {
        let positive = [
            ("desired_level", self.desired_level),
            ("attack_ms", self.attack_ms),
            ("release_ms", self.release_ms),
            ("look_ahead_ms", self.look_ahead_ms),
            ("sample_rate", self.sample_rate),
            ("max_gain", self.max_gain),
        ];
        for (name, v) in positive {
            if !(v > 0.0 && v.is_finite()) {
                return Err(NrError::InvalidConfig(format!(
                    "agc {name} {v} must be finite and > 0"
                )));
            }
        }
        let la = self.look_ahead_samples();
        if !(1..=MAX_BLOCK_LEN).contains(&la) {
            return Err(NrError::InvalidConfig(format!(
                "agc look-ahead of {la} samples outside 1..={MAX_BLOCK_LEN}"
            )));
        }
        Ok(())
    }
}

pub struct Agc {
    cfg: AgcConfig,
    look_ahead: usize,
    attack_coeff: f32,
    release_coeff: f32,
    gain: f32,

    delay: RingSampleBuffer,
    // (sample index, |x|), magnitudes strictly decreasing front to back.
    peaks: VecDeque<(u64, f32)>,
    index: u64,

    lifecycle: Lifecycle,
}

impl Agc {
    pub fn new(cfg: AgcConfig) -> NrResult<Self> {
        cfg.validate()?;
        let look_ahead = cfg.look_ahead_samples();
        log::debug!(
            "{ENGINE}: created level={} attack={}ms release={}ms look_ahead={} samples max_gain={}",
            cfg.desired_level,
            cfg.attack_ms,
            cfg.release_ms,
            look_ahead,
            cfg.max_gain
        );
        Ok(Self {
            cfg,
            look_ahead,
            attack_coeff: time_constant_coeff(cfg.attack_ms, cfg.sample_rate),
            release_coeff: time_constant_coeff(cfg.release_ms, cfg.sample_rate),
            gain: 0.0,
            delay: RingSampleBuffer::new(look_ahead),
            peaks: VecDeque::with_capacity(look_ahead + 1),
            index: 0,
            lifecycle: Lifecycle::new(ENGINE),
        })
    }

    pub fn config(&self) -> &AgcConfig {
        &self.cfg
    }

    /// Currently applied gain (linear).
    pub fn gain(&self) -> f32 {
        self.gain
    }

    pub fn reset(&mut self) {
        self.gain = 0.0;
        self.delay.clear();
        self.peaks.clear();
        self.index = 0;
    }

    #[inline]
    fn track_peak(&mut self, x: f32) {
        let mag = x.abs();
        while self.peaks.back().is_some_and(|&(_, m)| m <= mag) {
            self.peaks.pop_back();
        }
        self.peaks.push_back((self.index, mag));
        let window_start = (self.index + 1).saturating_sub(self.look_ahead as u64);
        while self.peaks.front().is_some_and(|&(i, _)| i < window_start) {
            self.peaks.pop_front();
        }
        self.index += 1;
    }

    pub fn process(&mut self, block: &mut [f32]) -> NrResult<()> {
        self.lifecycle.enter_block()?;
        check_block_len(block.len())?;
        check_finite_input(ENGINE, block)?;

        for x in block.iter_mut() {
            self.delay.push_sample(*x);
            self.track_peak(*x);

            if !self.delay.is_full() {
                *x = 0.0;
                continue;
            }

            let peak = self.peaks.front().map_or(0.0, |&(_, m)| m);
            let target = (self.cfg.desired_level / (peak + PEAK_EPS)).min(self.cfg.max_gain);
            let coeff = if target < self.gain {
                self.attack_coeff
            } else {
                self.release_coeff
            };
            self.gain = coeff * self.gain + (1.0 - coeff) * target;
            *x = self.delay.get(0).unwrap_or(0.0) * self.gain;
        }

        check_finite_output(ENGINE, block)
    }
}

impl BlockProcessor for Agc {
    fn name(&self) -> &'static str {
        ENGINE
    }

    fn process_block(&mut self, block: &mut [f32]) -> NrResult<()> {
        self.process(block)
    }

    fn latency(&self) -> usize {
        self.look_ahead - 1
    }

    fn state(&self) -> EngineState {
        self.lifecycle.state()
    }

    fn destroy(&mut self) -> NrResult<()> {
        self.lifecycle.destroy()?;
        self.delay = RingSampleBuffer::new(1);
        self.peaks = VecDeque::new();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn cfg_8k() -> AgcConfig {
        AgcConfig {
            sample_rate: 8000.0,
            ..AgcConfig::default()
        }
    }

    #[test]
    fn test_quiet_tone_converges_to_target() {
        let mut agc = Agc::new(cfg_8k()).unwrap();
        let sr = 8000.0;
        let mut signal: Vec<f32> = (0..24_000)
            .map(|i| 0.01 * (2.0 * PI * 200.0 * i as f32 / sr).sin())
            .collect();
        for block in signal.chunks_mut(512) {
            agc.process(block).unwrap();
        }
        let peak = signal[20_000..].iter().fold(0.0f32, |m, v| m.max(v.abs()));
        assert!((0.095..=0.105).contains(&peak), "peak {peak}");
    }

    #[test]
    fn test_silence_stays_silent_with_bounded_gain() {
        let mut agc = Agc::new(cfg_8k()).unwrap();
        let mut block = vec![0.0f32; 4000];
        agc.process(&mut block).unwrap();
        assert!(block.iter().all(|&v| v == 0.0));
        assert!(agc.gain() <= 1000.0);
    }

    #[test]
    fn test_output_zero_until_look_ahead_primed() {
        let mut agc = Agc::new(cfg_8k()).unwrap();
        let latency = agc.latency();
        assert_eq!(latency, 79);
        let mut block = vec![0.05f32; 200];
        agc.process(&mut block).unwrap();
        assert!(block[..latency].iter().all(|&v| v == 0.0));
        assert!(block[latency] > 0.0);
    }

    #[test]
    fn test_loud_burst_is_pulled_down() {
        let mut agc = Agc::new(cfg_8k()).unwrap();
        let mut signal = vec![0.01f32; 8000];
        signal.extend(std::iter::repeat(0.5).take(4000));
        let mut out = signal.clone();
        agc.process(&mut out).unwrap();
        let tail = out[11_000..].iter().fold(0.0f32, |m, v| m.max(v.abs()));
        assert!(tail < 0.2, "tail {tail}");
    }

    #[test]
    fn test_block_partition_invariance() {
        let signal: Vec<f32> = (0..5000)
            .map(|i| 0.2 * (i as f32 * 0.05).sin() * (i as f32 * 0.001).cos())
            .collect();
        let mut whole = signal.clone();
        Agc::new(cfg_8k()).unwrap().process(&mut whole).unwrap();
        let mut pieces = signal.clone();
        let mut agc = Agc::new(cfg_8k()).unwrap();
        for block in pieces.chunks_mut(33) {
            agc.process(block).unwrap();
        }
        assert_eq!(whole, pieces);
    }

    #[test]
    fn test_every_block_length_preserved() {
        let mut agc = Agc::new(cfg_8k()).unwrap();
        for len in [0usize, 1, 2, 3, 78, 79, 80, 1000, MAX_BLOCK_LEN] {
            let mut block = vec![0.05f32; len];
            agc.process(&mut block).unwrap();
            assert_eq!(block.len(), len);
        }
        let mut too_big = vec![0.0; MAX_BLOCK_LEN + 1];
        assert_eq!(
            agc.process(&mut too_big),
            Err(NrError::BlockTooLarge {
                len: MAX_BLOCK_LEN + 1,
                max: MAX_BLOCK_LEN
            })
        );
    }

    #[test]
    fn test_sub_sample_look_ahead_rejected() {
        let cfg = AgcConfig {
            look_ahead_ms: 0.01,
            ..cfg_8k()
        };
        assert!(matches!(Agc::new(cfg), Err(NrError::InvalidConfig(_))));
    }
}
