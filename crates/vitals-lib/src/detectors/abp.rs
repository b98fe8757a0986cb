//! Arterial pressure cycle segmentation.
//!
//! The trace is clamped to a physiologic range and smoothed with a trailing
//! mean. The dominant cardiac period comes from the spectral peak inside a
//! plausible band. The walk then hops from one diastolic minimum to the next
//! using that period as the search window. Boundaries are located on the
//! smoothed trace and refined on the clamped raw trace, and per-cycle
//! features are measured on the raw values.
use realfft::RealFftPlanner;
use serde::{Deserialize, Serialize};

/// Tuning of [`segment_waveforms_with_config`]. The defaults come from
/// adult invasive ABP at 500 Hz and are domain calibration, not algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmenterConfig {
    /// Values outside `[min, max]` (mmHg) are clamped.
    pub pressure_range: [f64; 2],
    /// Trailing moving-average length (seconds).
    pub smoothing_window_s: f64,
    /// Spectral band searched for the cardiac fundamental (Hz).
    pub min_frequency_hz: f64,
    pub max_frequency_hz: f64,
    /// Search window = period × margin.
    pub period_margin: f64,
    /// Fraction of a period skipped after a boundary before searching again.
    pub skip_fraction: f64,
    /// Cycles with systolic − diastolic below this (mmHg) are not emitted.
    pub min_amplitude: f64,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            pressure_range: [0.0, 300.0],
            smoothing_window_s: 0.02,
            min_frequency_hz: 0.2,
            max_frequency_hz: 1.5,
            period_margin: 1.1,
            skip_fraction: 0.2,
            min_amplitude: 10.0,
        }
    }
}

impl SegmenterConfig {
    fn smoothing_len(&self, sample_rate: f64) -> usize {
        ((self.smoothing_window_s * sample_rate).round() as usize).max(1)
    }

    fn clamp(&self, value: f64) -> f64 {
        value.max(self.pressure_range[0]).min(self.pressure_range[1])
    }
}

/// One cardiac cycle. Indices refer to the pressure slice given to the
/// segmenter, gaps included.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WaveRecord {
    pub start_index: usize,
    /// Diastolic pressure at the cycle start.
    pub start_value: f64,
    pub max_index: usize,
    /// Systolic pressure.
    pub max_value: f64,
    /// Mean arterial pressure (time-weighted over the cycle).
    pub mean_value: f64,
    /// Cycle length in samples.
    pub wave_length: usize,
}

impl WaveRecord {
    pub fn pulse_pressure(&self) -> f64 {
        self.max_value - self.start_value
    }

    pub fn rate_bpm(&self, sample_rate: f64) -> f64 {
        60.0 * sample_rate / self.wave_length as f64
    }
}

/// Segment with [`SegmenterConfig::default`].
pub fn segment_waveforms(pressure: &[f64], sample_rate: f64) -> Vec<WaveRecord> {
    segment_waveforms_with_config(pressure, sample_rate, &SegmenterConfig::default())
}

/// Split `pressure` into cardiac cycles and measure each one.
///
/// Non-finite samples are skipped. Traces shorter than one estimated period,
/// or without a spectral peak in band, give an empty result.
pub fn segment_waveforms_with_config(
    pressure: &[f64],
    sample_rate: f64,
    cfg: &SegmenterConfig,
) -> Vec<WaveRecord> {
    if !(sample_rate.is_finite() && sample_rate > 0.0) {
        log::warn!("segmentation skipped: invalid sample rate {sample_rate}");
        return Vec::new();
    }
    let (rows, clamped) = clamp_real(pressure, cfg);
    let smooth_len = cfg.smoothing_len(sample_rate);
    let smoothed = trailing_mean(&clamped, smooth_len);
    let Some(period) = dominant_period(&smoothed, sample_rate, cfg) else {
        log::debug!("segmentation skipped: no cardiac period in {} samples", clamped.len());
        return Vec::new();
    };
    if clamped.len() < period {
        log::debug!("segmentation skipped: {} samples < period {period}", clamped.len());
        return Vec::new();
    }

    walk_cycles(&clamped, &smoothed, period, smooth_len, cfg)
        .into_iter()
        .map(|mut wave| {
            let end = rows[wave.start_index + wave.wave_length];
            wave.start_index = rows[wave.start_index];
            wave.max_index = rows[wave.max_index];
            wave.wave_length = end - wave.start_index;
            wave
        })
        .collect()
}

/// Dominant cardiac period of `pressure` in samples, as used by the walk.
pub fn estimate_period(pressure: &[f64], sample_rate: f64, cfg: &SegmenterConfig) -> Option<usize> {
    if !(sample_rate.is_finite() && sample_rate > 0.0) {
        return None;
    }
    let (_, clamped) = clamp_real(pressure, cfg);
    let smoothed = trailing_mean(&clamped, cfg.smoothing_len(sample_rate));
    dominant_period(&smoothed, sample_rate, cfg)
}

fn clamp_real(pressure: &[f64], cfg: &SegmenterConfig) -> (Vec<usize>, Vec<f64>) {
    pressure
        .iter()
        .enumerate()
        .filter(|(_, v)| v.is_finite())
        .map(|(i, &v)| (i, cfg.clamp(v)))
        .unzip()
}

/// Trailing mean over `win` samples; the first samples average what is
/// available so far.
fn trailing_mean(data: &[f64], win: usize) -> Vec<f64> {
    let mut out = Vec::with_capacity(data.len());
    let mut acc = 0.0;
    for (i, &sample) in data.iter().enumerate() {
        acc += sample;
        if i >= win {
            acc -= data[i - win];
        }
        out.push(acc / (i + 1).min(win) as f64);
    }
    out
}

fn dominant_period(smoothed: &[f64], sample_rate: f64, cfg: &SegmenterConfig) -> Option<usize> {
    let n = smoothed.len();
    if n < 4 {
        return None;
    }
    let mean = smoothed.iter().sum::<f64>() / n as f64;
    let mut buffer: Vec<f64> = smoothed.iter().map(|v| v - mean).collect();

    let mut planner = RealFftPlanner::<f64>::new();
    let r2c = planner.plan_fft_forward(n);
    let mut spectrum = r2c.make_output_vec();
    if let Err(err) = r2c.process(&mut buffer, &mut spectrum) {
        log::warn!("period estimation failed: {err}");
        return None;
    }

    let bin_hz = sample_rate / n as f64;
    let (best_bin, best_power) = spectrum
        .iter()
        .enumerate()
        .skip(1)
        .filter(|(k, _)| {
            let f = *k as f64 * bin_hz;
            f >= cfg.min_frequency_hz && f <= cfg.max_frequency_hz
        })
        .map(|(k, c)| (k, c.norm_sqr()))
        .fold((0, 0.0), |best, cur| if cur.1 > best.1 { cur } else { best });
    if best_bin == 0 || best_power <= f64::EPSILON {
        return None;
    }
    let period = (sample_rate / (best_bin as f64 * bin_hz)).round() as usize;
    (period >= 2).then_some(period)
}

fn argmin(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, v) in values.iter().enumerate() {
        if *v < values[best] {
            best = i;
        }
    }
    best
}

fn walk_cycles(
    raw: &[f64],
    smoothed: &[f64],
    period: usize,
    smooth_len: usize,
    cfg: &SegmenterConfig,
) -> Vec<WaveRecord> {
    let n = smoothed.len();
    let window = ((period as f64 * cfg.period_margin).ceil() as usize).max(period);
    let skip = ((period as f64 * cfg.skip_fraction).round() as usize)
        .max(smooth_len)
        .max(1);
    // The trailing mean lags the raw trace, so the true minimum lies inside
    // the smoothing window that ends at the smoothed minimum.
    let refine = |i: usize| {
        let lo = i.saturating_sub(smooth_len - 1);
        lo + argmin(&raw[lo..=i])
    };

    let mut start = argmin(&smoothed[..=window.min(n - 1)]);
    let mut start_raw = refine(start);
    let mut waves = Vec::new();
    while start + period <= n {
        let lo = start + skip;
        let hi = (start + window).min(n - 1);
        if lo > hi {
            break;
        }
        let next = lo + argmin(&smoothed[lo..=hi]);
        if next == n - 1 && start + window > n - 1 {
            // the trace ends while still falling; boundary not observed
            break;
        }
        let next_raw = refine(next);
        match measure_cycle(raw, start_raw, next_raw) {
            Some(wave) if wave.pulse_pressure() >= cfg.min_amplitude => waves.push(wave),
            _ => log::debug!("degenerate cycle at {start_raw}..{next_raw} merged forward"),
        }
        start = next;
        start_raw = next_raw;
    }
    waves
}

fn measure_cycle(raw: &[f64], start: usize, end: usize) -> Option<WaveRecord> {
    if end <= start {
        return None;
    }
    let cycle = &raw[start..=end];
    let (max_offset, max_value) = cycle
        .iter()
        .copied()
        .enumerate()
        .fold((0, f64::MIN), |best, cur| if cur.1 > best.1 { cur } else { best });
    let area: f64 = cycle.windows(2).map(|w| 0.5 * (w[0] + w[1])).sum();
    let wave_length = end - start;
    Some(WaveRecord {
        start_index: start,
        start_value: raw[start],
        max_index: start + max_offset,
        max_value,
        mean_value: area / wave_length as f64,
        wave_length,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    const FS: f64 = 500.0;

    fn sine_pressure(seconds: usize) -> Vec<f64> {
        (0..seconds * 500)
            .map(|i| 100.0 + 20.0 * (2.0 * PI * i as f64 / FS).sin())
            .collect()
    }

    fn sawtooth(peaks: &[f64]) -> Vec<f64> {
        let mut out = Vec::with_capacity(peaks.len() * 500);
        for &peak in peaks {
            for j in 0..500 {
                out.push(80.0 + (peak - 80.0) * j as f64 / 499.0);
            }
        }
        out
    }

    fn assert_close(a: f64, b: f64, tol: f64) {
        assert!((a - b).abs() <= tol, "{a} vs {b} (tol {tol})");
    }

    #[test]
    fn sine_period_is_one_second() {
        let p = sine_pressure(10);
        let period = estimate_period(&p, FS, &SegmenterConfig::default()).unwrap();
        assert!(period.abs_diff(500) <= 1, "period = {period}");
    }

    #[test]
    fn sine_yields_one_wave_per_second() {
        let waves = segment_waveforms(&sine_pressure(10), FS);
        assert_eq!(waves.len(), 9);
        for (k, w) in waves.iter().enumerate() {
            assert!(w.start_index.abs_diff(375 + 500 * k) <= 1, "{w:?}");
            assert!(w.wave_length.abs_diff(500) <= 1);
            assert_close(w.start_value, 80.0, 1e-3);
            assert_close(w.max_value, 120.0, 1e-3);
            assert_close(w.mean_value, 100.0, 1e-3);
            assert_close(w.rate_bpm(FS), 60.0, 0.2);
        }
    }

    #[test]
    fn sawtooth_boundaries_and_peaks_are_recovered() {
        let peaks = [120.0, 125.0, 118.0, 130.0, 122.0, 127.0, 119.0, 124.0, 121.0, 126.0];
        let waves = segment_waveforms(&sawtooth(&peaks), FS);
        assert_eq!(waves.len(), peaks.len() - 1);
        for (k, w) in waves.iter().enumerate() {
            assert_eq!(w.start_index, 500 * k);
            assert_eq!(w.wave_length, 500);
            assert_eq!(w.max_index, 500 * k + 499);
            assert_close(w.start_value, 80.0, 1e-9);
            assert_close(w.max_value, peaks[k], 1e-9);
            assert!(w.max_value >= w.start_value);
        }
        assert!(waves.windows(2).all(|w| w[0].start_index + w[0].wave_length <= w[1].start_index));
    }

    #[test]
    fn degenerate_cycle_is_not_emitted() {
        let peaks = [120.0, 125.0, 118.0, 85.0, 122.0, 127.0, 119.0, 124.0, 121.0, 126.0];
        let waves = segment_waveforms(&sawtooth(&peaks), FS);
        let starts: Vec<usize> = waves.iter().map(|w| w.start_index).collect();
        assert_eq!(starts, vec![0, 500, 1000, 2000, 2500, 3000, 3500, 4000]);
    }

    #[test]
    fn amplitude_threshold_is_configurable() {
        let peaks = [120.0, 125.0, 118.0, 85.0, 122.0, 127.0, 119.0, 124.0, 121.0, 126.0];
        let cfg = SegmenterConfig {
            min_amplitude: 2.0,
            ..SegmenterConfig::default()
        };
        let waves = segment_waveforms_with_config(&sawtooth(&peaks), FS, &cfg);
        assert_eq!(waves.len(), 9);
    }

    #[test]
    fn out_of_range_values_are_clamped_in_place() {
        let peaks = [120.0, 125.0, 118.0, 130.0, 122.0, 127.0, 119.0, 124.0, 121.0, 126.0];
        let mut p = sawtooth(&peaks);
        p[250] = 1000.0;
        let waves = segment_waveforms(&p, FS);
        assert_eq!(waves[0].start_index, 0);
        assert_eq!(waves[0].max_index, 250);
        assert_close(waves[0].max_value, 300.0, 1e-9);
        assert_eq!(waves[1].start_index, 500);
    }

    #[test]
    fn gaps_are_skipped_and_indices_stay_on_the_input_axis() {
        let mut p = sine_pressure(10);
        for v in &mut p[100..110] {
            *v = f64::NAN;
        }
        let waves = segment_waveforms(&p, FS);
        assert_eq!(waves.len(), 9);
        for (k, w) in waves.iter().enumerate() {
            assert!(w.start_index.abs_diff(375 + 500 * k) <= 1, "{w:?}");
            assert!(w.max_value.is_finite() && w.mean_value.is_finite());
        }
    }

    #[test]
    fn short_or_flat_traces_give_nothing() {
        assert!(segment_waveforms(&sine_pressure(10)[..250], FS).is_empty());
        assert!(segment_waveforms(&vec![90.0; 5000], FS).is_empty());
        assert!(segment_waveforms(&[], FS).is_empty());
        assert!(segment_waveforms(&sine_pressure(10), 0.0).is_empty());
    }

    #[test]
    fn trailing_mean_averages_available_head() {
        assert_eq!(trailing_mean(&[2.0, 4.0, 6.0, 8.0], 2), vec![2.0, 3.0, 5.0, 7.0]);
    }
}
