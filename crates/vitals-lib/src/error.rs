use thiserror::Error;

/// Errors raised by the signal core.
///
/// Short windows, missing beats and degenerate pressure cycles are not
/// errors: those paths return empty results.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum VitalsError {
    #[error("filter length {length} must be even, non-zero and at most the design window ({window} bins)")]
    InvalidFilterLength { length: usize, window: usize },
    #[error("filter has no coefficients")]
    EmptyFilter,
    #[error("sample rate must be positive and finite, got {0}")]
    InvalidSampleRate(f64),
    #[error("cutoff {cutoff_hz} Hz must lie strictly between 0 and the Nyquist frequency ({nyquist_hz} Hz)")]
    InvalidCutoff { cutoff_hz: f64, nyquist_hz: f64 },
    #[error("timestamps must be finite and strictly increasing (violated at sample {index})")]
    NonMonotonicTimestamps { index: usize },
    #[error("{what} has {actual} samples, expected {expected}")]
    LengthMismatch {
        what: &'static str,
        actual: usize,
        expected: usize,
    },
    #[error("channel `{0}` is not present in the table")]
    MissingChannel(String),
    #[error("FFT failed: {0}")]
    Fft(String),
}

impl From<realfft::FftError> for VitalsError {
    fn from(err: realfft::FftError) -> Self {
        VitalsError::Fft(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, VitalsError>;

pub(crate) fn check_sample_rate(sample_rate: f64) -> Result<()> {
    if sample_rate.is_finite() && sample_rate > 0.0 {
        Ok(())
    } else {
        Err(VitalsError::InvalidSampleRate(sample_rate))
    }
}
