use crate::error::{Instability, NrError, NrResult};
use crate::MAX_BLOCK_LEN;
use std::f64::consts::PI;

// Smallest magnitude/power kept in spectral state.
pub const MAG_FLOOR: f32 = 1e-12;

pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t.clamp(0.0, 1.0)
}

pub fn db_to_gain(db: f32) -> f32 {
    (10.0f32).powf(db / 20.0)
}

pub fn gain_to_db(gain: f32) -> f32 {
    20.0 * gain.max(MAG_FLOOR).log10()
}

/// One-pole retention coefficient for a time constant in milliseconds.
#[inline]
pub fn time_constant_coeff(ms: f32, sample_rate: f32) -> f32 {
    let samples = ms * 0.001 * sample_rate;
    if samples <= 0.0 {
        0.0
    } else {
        (-1.0 / samples).exp()
    }
}

pub fn frame_rms(x: &[f32]) -> f32 {
    let mut s = 0.0f32;
    for &v in x {
        s += v * v;
    }
    (s / (x.len().max(1) as f32)).sqrt()
}

/// Periodic Hann window.
pub fn make_hann_window(n: usize) -> Vec<f32> {
    (0..n)
        .map(|i| (0.5 * (1.0 - (2.0 * PI * i as f64 / n as f64).cos())) as f32)
        .collect()
}

/// Square root of the periodic Hann window. Applied on both analysis and
/// synthesis so the product sums to one at 50% overlap.
pub fn make_sqrt_hann_window(n: usize) -> Vec<f32> {
    make_hann_window(n).into_iter().map(|w| w.sqrt()).collect()
}

/// Zeroth-order modified Bessel function of the first kind (power series).
pub fn bessel_i0(x: f64) -> f64 {
    let half = x * 0.5;
    let mut term = 1.0f64;
    let mut sum = 1.0f64;
    let mut k = 1.0f64;
    while term > sum * 1e-16 {
        let t = half / k;
        term *= t * t;
        sum += term;
        k += 1.0;
        if k > 500.0 {
            break;
        }
    }
    sum
}

/// Normalized sinc: sin(pi x) / (pi x).
pub fn sinc(x: f64) -> f64 {
    if x.abs() < 1e-9 {
        1.0
    } else {
        (PI * x).sin() / (PI * x)
    }
}

/// Reject blocks above the fixed per-call capacity.
#[inline]
pub fn check_block_len(len: usize) -> NrResult<()> {
    if len > MAX_BLOCK_LEN {
        return Err(NrError::BlockTooLarge {
            len,
            max: MAX_BLOCK_LEN,
        });
    }
    Ok(())
}

/// Reject NaN/Inf input before any engine state is touched.
#[inline]
pub fn check_finite_input(engine: &'static str, block: &[f32]) -> NrResult<()> {
    match block.iter().position(|v| !v.is_finite()) {
        Some(index) => Err(NrError::NumericInstability {
            engine,
            cause: Instability::NonFiniteInput { index },
        }),
        None => Ok(()),
    }
}

#[inline]
pub fn check_finite_output(engine: &'static str, block: &[f32]) -> NrResult<()> {
    match block.iter().position(|v| !v.is_finite()) {
        Some(index) => {
            log::warn!("{engine}: non-finite output at sample {index}");
            Err(NrError::NumericInstability {
                engine,
                cause: Instability::NonFiniteOutput { index },
            })
        }
        None => Ok(()),
    }
}
