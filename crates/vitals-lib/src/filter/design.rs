//! Frequency-sampled high-pass FIR design.
//!
//! The target magnitude is laid out on an analysis window of `window_len`
//! frequency bins: unity at and above the cutoff, a linear ramp `|f| / fc`
//! below it. The ramp avoids the ringing of a brick-wall response. The
//! inverse real FFT of that target is a zero-phase circular impulse
//! response; rotating it by half the tap count, truncating and applying a
//! Hamming taper yields a causal linear-phase FIR.
use crate::error::{check_sample_rate, Result, VitalsError};
use realfft::num_complex::Complex;
use realfft::RealFftPlanner;
use std::f64::consts::PI;
use std::sync::Arc;

/// Analysis window used by [`design_highpass_fir`] (10 s of bins at 500 Hz).
pub const DEFAULT_DESIGN_WINDOW: usize = 5000;

/// Immutable FIR coefficients, cheap to clone and share between filters.
#[derive(Debug, Clone, PartialEq)]
pub struct ImpulseResponse {
    coeffs: Arc<[f64]>,
}

impl ImpulseResponse {
    /// Wrap externally designed taps.
    pub fn from_coefficients(coeffs: Vec<f64>) -> Result<Self> {
        if coeffs.is_empty() {
            return Err(VitalsError::EmptyFilter);
        }
        Ok(Self {
            coeffs: coeffs.into(),
        })
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.coeffs
    }

    pub fn len(&self) -> usize {
        self.coeffs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coeffs.is_empty()
    }

    /// Output lag in samples of the causal filter.
    pub fn group_delay(&self) -> usize {
        self.coeffs.len() / 2
    }

    /// Response to a constant input (sum of taps).
    pub fn dc_gain(&self) -> f64 {
        self.coeffs.iter().sum()
    }

    /// Magnitude response at `freq_hz`.
    pub fn gain_at(&self, freq_hz: f64, sample_rate: f64) -> f64 {
        let w = 2.0 * PI * freq_hz / sample_rate;
        let (re, im) = self
            .coeffs
            .iter()
            .enumerate()
            .fold((0.0, 0.0), |(re, im), (k, &h)| {
                let phase = w * k as f64;
                (re + h * phase.cos(), im - h * phase.sin())
            });
        re.hypot(im)
    }
}

/// Design a `length`-tap high-pass FIR on the default analysis window.
pub fn design_highpass_fir(
    cutoff_hz: f64,
    sample_rate: f64,
    length: usize,
) -> Result<ImpulseResponse> {
    design_highpass_fir_with_window(cutoff_hz, sample_rate, length, DEFAULT_DESIGN_WINDOW)
}

/// Design a `length`-tap high-pass FIR from a `window_len`-bin target spectrum.
///
/// `length` must be even and no longer than `window_len`.
pub fn design_highpass_fir_with_window(
    cutoff_hz: f64,
    sample_rate: f64,
    length: usize,
    window_len: usize,
) -> Result<ImpulseResponse> {
    check_sample_rate(sample_rate)?;
    if length == 0 || length % 2 != 0 || length > window_len {
        return Err(VitalsError::InvalidFilterLength {
            length,
            window: window_len,
        });
    }
    let nyquist_hz = sample_rate / 2.0;
    if !(cutoff_hz > 0.0 && cutoff_hz < nyquist_hz) {
        return Err(VitalsError::InvalidCutoff {
            cutoff_hz,
            nyquist_hz,
        });
    }

    let mut planner = RealFftPlanner::<f64>::new();
    let c2r = planner.plan_fft_inverse(window_len);
    let mut spectrum = c2r.make_input_vec();
    let bin_hz = sample_rate / window_len as f64;
    for (k, bin) in spectrum.iter_mut().enumerate() {
        *bin = Complex::new(target_magnitude(k as f64 * bin_hz, cutoff_hz), 0.0);
    }
    let mut circular = c2r.make_output_vec();
    c2r.process(&mut spectrum, &mut circular)?;
    let scale = 1.0 / window_len as f64;

    let half = length / 2;
    let taper = hamming(length);
    let coeffs: Vec<f64> = (0..length)
        .map(|i| circular[(i + window_len - half) % window_len] * scale * taper[i])
        .collect();
    Ok(ImpulseResponse {
        coeffs: Arc::from(coeffs),
    })
}

/// Pass band at and above the cutoff, linear ramp from DC below it.
fn target_magnitude(freq_hz: f64, cutoff_hz: f64) -> f64 {
    let f = freq_hz.abs();
    if f >= cutoff_hz {
        1.0
    } else {
        f / cutoff_hz
    }
}

/// Symmetric Hamming window of length `n`.
pub fn hamming(n: usize) -> Vec<f64> {
    if n == 1 {
        return vec![1.0];
    }
    (0..n)
        .map(|i| 0.54 - 0.46 * (2.0 * PI * i as f64 / (n - 1) as f64).cos())
        .collect()
}
