use crate::error::{check_sample_rate, Result, VitalsError};
use serde::{Deserialize, Serialize};

/// Uniformly sampled trace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeSeries {
    /// Uniform sampling frequency in Hz
    pub fs: f64,
    /// Samples, NaN marks a gap
    pub data: Vec<f64>,
}

impl TimeSeries {
    pub fn len(&self) -> usize {
        self.data.len()
    }
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
    pub fn duration(&self) -> f64 {
        self.data.len() as f64 / self.fs
    }
    /// Timestamps `i / fs`, one per sample.
    pub fn timestamps(&self) -> Vec<f64> {
        (0..self.data.len()).map(|i| i as f64 / self.fs).collect()
    }
}

/// One physiological channel as `(timestamp, value)` pairs.
///
/// Timestamps are finite and strictly increasing; values may be NaN where the
/// source had no reading.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawChannelSeries")]
pub struct ChannelSeries {
    timestamps: Vec<f64>,
    values: Vec<f64>,
}

/// Unchecked wire form; deserialization goes through [`ChannelSeries::new`].
#[derive(Deserialize)]
struct RawChannelSeries {
    timestamps: Vec<f64>,
    values: Vec<f64>,
}

impl TryFrom<RawChannelSeries> for ChannelSeries {
    type Error = VitalsError;

    fn try_from(raw: RawChannelSeries) -> Result<Self> {
        ChannelSeries::new(raw.timestamps, raw.values)
    }
}

impl ChannelSeries {
    pub fn new(timestamps: Vec<f64>, values: Vec<f64>) -> Result<Self> {
        if timestamps.len() != values.len() {
            return Err(VitalsError::LengthMismatch {
                what: "channel values",
                actual: values.len(),
                expected: timestamps.len(),
            });
        }
        for (i, t) in timestamps.iter().enumerate() {
            if !t.is_finite() || (i > 0 && *t <= timestamps[i - 1]) {
                return Err(VitalsError::NonMonotonicTimestamps { index: i });
            }
        }
        Ok(Self { timestamps, values })
    }

    /// Channel sampled at `sample_rate` starting at t = 0.
    ///
    /// Timestamps are computed as `i / sample_rate` rather than accumulated,
    /// so channels at commensurate rates (500 Hz and 62.5 Hz, say) land on
    /// bit-identical timestamps where their grids coincide.
    pub fn uniform(sample_rate: f64, values: Vec<f64>) -> Result<Self> {
        check_sample_rate(sample_rate)?;
        let timestamps = (0..values.len()).map(|i| i as f64 / sample_rate).collect();
        Ok(Self { timestamps, values })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn timestamps(&self) -> &[f64] {
        &self.timestamps
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn iter(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.timestamps.iter().copied().zip(self.values.iter().copied())
    }
}
