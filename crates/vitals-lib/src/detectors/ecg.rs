use serde::{Deserialize, Serialize};

/// Beat-localization capability consumed by the heartbeat extractor.
///
/// Implementations return ascending sample indices into `signal`. Any
/// `Fn(&[f64], f64) -> Vec<usize>` closure qualifies, so precomputed
/// annotations or a third-party detector can be plugged in directly.
pub trait PeakDetector {
    fn detect_peaks(&self, signal: &[f64], sample_rate: f64) -> Vec<usize>;
}

impl<F> PeakDetector for F
where
    F: Fn(&[f64], f64) -> Vec<usize>,
{
    fn detect_peaks(&self, signal: &[f64], sample_rate: f64) -> Vec<usize> {
        self(signal, sample_rate)
    }
}

/// Tuning of the Pan–Tompkins style R-peak detector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EcgDetectorConfig {
    /// Lower cutoff for the single-pole high-pass filter (Hz).
    pub lowcut_hz: f64,
    /// Upper cutoff for the single-pole low-pass filter (Hz).
    pub highcut_hz: f64,
    /// Moving window integration length (seconds).
    pub integration_window_s: f64,
    /// Minimum physiological RR distance / refractory period (seconds).
    pub min_rr_s: f64,
    /// Scale between noise and signal envelopes for the adaptive threshold.
    pub threshold_scale: f64,
    /// Half width (seconds) of the window around a detection searched for
    /// the precise R-peak.
    pub search_back_s: f64,
}

impl Default for EcgDetectorConfig {
    fn default() -> Self {
        Self {
            lowcut_hz: 5.0,
            highcut_hz: 15.0,
            integration_window_s: 0.150,
            min_rr_s: 0.280,
            threshold_scale: 0.6,
            search_back_s: 0.150,
        }
    }
}

/// Band-pass → derivative → square → moving-window integration, then an
/// adaptive threshold with refractory period and search-back refinement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PanTompkins {
    pub config: EcgDetectorConfig,
}

impl PanTompkins {
    pub fn new(config: EcgDetectorConfig) -> Self {
        Self { config }
    }
}

impl PeakDetector for PanTompkins {
    fn detect_peaks(&self, signal: &[f64], sample_rate: f64) -> Vec<usize> {
        if signal.is_empty() || !(sample_rate > 0.0) {
            return Vec::new();
        }
        let cfg = &self.config;
        let (bandpassed, integrated) = envelope(signal, sample_rate, cfg);
        let peaks = pick_peaks(&bandpassed, &integrated, sample_rate, cfg);
        if peaks.len() < 2 {
            // The adaptive threshold never settled; use the local-maximum picker.
            log::debug!("adaptive detector found {} peak(s), using fallback", peaks.len());
            return fallback_peak_picker(signal, sample_rate, cfg);
        }
        peaks
    }
}

fn envelope(data: &[f64], fs: f64, cfg: &EcgDetectorConfig) -> (Vec<f64>, Vec<f64>) {
    let fs = fs.max(1.0);
    let bandpassed = bandpass(data, fs, cfg.lowcut_hz, cfg.highcut_hz);
    let squared: Vec<f64> = derivative(&bandpassed).iter().map(|x| x * x).collect();
    let win = ((cfg.integration_window_s * fs).round() as usize).max(1);
    (bandpassed, moving_average(&squared, win))
}

fn bandpass(data: &[f64], fs: f64, low: f64, high: f64) -> Vec<f64> {
    let hp = if low > 0.0 {
        single_pole_highpass(data, fs, low)
    } else {
        data.to_vec()
    };
    if high <= 0.0 || high >= fs * 0.5 {
        hp
    } else {
        single_pole_lowpass(&hp, fs, high)
    }
}

fn single_pole_highpass(data: &[f64], fs: f64, cutoff: f64) -> Vec<f64> {
    let Some(&first) = data.first() else {
        return Vec::new();
    };
    let dt = 1.0 / fs;
    let rc = 1.0 / (2.0 * std::f64::consts::PI * cutoff.max(0.01));
    let alpha = rc / (rc + dt);
    let mut prev_y = first;
    let mut prev_x = first;
    data.iter()
        .map(|&x| {
            let y = alpha * (prev_y + x - prev_x);
            prev_y = y;
            prev_x = x;
            y
        })
        .collect()
}

fn single_pole_lowpass(data: &[f64], fs: f64, cutoff: f64) -> Vec<f64> {
    let Some(&first) = data.first() else {
        return Vec::new();
    };
    let dt = 1.0 / fs;
    let rc = 1.0 / (2.0 * std::f64::consts::PI * cutoff.max(0.01));
    let alpha = dt / (rc + dt);
    let mut prev = first;
    data.iter()
        .map(|&x| {
            prev += alpha * (x - prev);
            prev
        })
        .collect()
}

fn derivative(data: &[f64]) -> Vec<f64> {
    let mut out = vec![0.0; data.len()];
    for i in 1..data.len() {
        out[i] = data[i] - data[i - 1];
    }
    out
}

fn moving_average(data: &[f64], win: usize) -> Vec<f64> {
    if win <= 1 {
        return data.to_vec();
    }
    let mut out = vec![0.0; data.len()];
    let mut acc = 0.0;
    for (i, &sample) in data.iter().enumerate() {
        acc += sample;
        if i >= win {
            acc -= data[i - win];
        }
        out[i] = acc / win as f64;
    }
    out
}

fn pick_peaks(
    bandpassed: &[f64],
    envelope: &[f64],
    fs: f64,
    cfg: &EcgDetectorConfig,
) -> Vec<usize> {
    if bandpassed.is_empty() || envelope.is_empty() {
        return Vec::new();
    }

    let refractory = (cfg.min_rr_s * fs).round().max(1.0) as usize;
    let search = (cfg.search_back_s * fs).round().max(1.0) as usize;

    let init = envelope.len().min((fs as usize).max(1));
    let avg = envelope[..init].iter().sum::<f64>() / init as f64;
    let mut signal_level = avg;
    let mut noise_level = avg * 0.5;
    let mut threshold = noise_level + cfg.threshold_scale * (signal_level - noise_level).max(0.0);
    let mut last_peak_sample = 0usize;
    let mut peaks = Vec::new();

    for (i, &sample) in envelope.iter().enumerate() {
        let refractory_ok = peaks.is_empty() || i - last_peak_sample >= refractory;
        if sample >= threshold && refractory_ok {
            // The trailing integrator can cross before the R wave arrives.
            let start = i.saturating_sub(search);
            let end = (i + search).min(bandpassed.len() - 1);
            let mut idx = start;
            let mut max_val = f64::MIN;
            for (j, &v) in bandpassed.iter().enumerate().take(end + 1).skip(start) {
                if v > max_val {
                    max_val = v;
                    idx = j;
                }
            }
            peaks.push(idx);
            last_peak_sample = i;
            signal_level = 0.125 * sample + 0.875 * signal_level;
        } else {
            noise_level = 0.125 * sample + 0.875 * noise_level;
        }
        threshold = noise_level + cfg.threshold_scale * (signal_level - noise_level).max(0.0);
    }

    peaks.sort_unstable();
    peaks.dedup();
    peaks
}

fn fallback_peak_picker(data: &[f64], fs: f64, cfg: &EcgDetectorConfig) -> Vec<usize> {
    if data.len() < 3 {
        return Vec::new();
    }
    let min_gap = (cfg.min_rr_s * fs).max(1.0) as usize;
    let win = ((0.150 * fs) as usize).max(1);
    let baseline = moving_average(data, win);
    let detrended: Vec<f64> = data.iter().zip(&baseline).map(|(x, m)| x - m).collect();

    let mut peaks = Vec::new();
    let mut last_idx = 0usize;
    for i in 1..detrended.len() - 1 {
        let y = detrended[i];
        let is_local_max = y > 0.0 && y > detrended[i - 1] && y > detrended[i + 1];
        if is_local_max && (peaks.is_empty() || i - last_idx >= min_gap) {
            peaks.push(i);
            last_idx = i;
        }
    }
    peaks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_regular_beats() {
        let fs = 250.0;
        let rr = [0.82, 0.78, 0.8, 0.79, 0.81, 0.77, 0.84, 0.88];
        let data = synthetic_ecg(fs, &rr);
        let peaks = PanTompkins::default().detect_peaks(&data, fs);
        assert_eq!(peaks.len(), rr.len() + 1);
        assert!(peaks.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn closure_is_a_detector() {
        let fixed = |_: &[f64], _: f64| vec![3usize, 7];
        assert_eq!(fixed.detect_peaks(&[0.0; 10], 100.0), vec![3, 7]);
    }

    #[test]
    fn empty_signal_has_no_peaks() {
        assert!(PanTompkins::default().detect_peaks(&[], 500.0).is_empty());
    }

    #[test]
    fn moving_average_divides_by_full_window() {
        let out = moving_average(&[2.0, 2.0, 2.0, 2.0], 2);
        assert_eq!(out, vec![1.0, 2.0, 2.0, 2.0]);
    }

    fn synthetic_ecg(fs: f64, rr: &[f64]) -> Vec<f64> {
        use std::f64::consts::PI;
        let mut beats = Vec::with_capacity(rr.len() + 1);
        let mut t = 0.5;
        beats.push(t);
        for &interval in rr {
            t += interval;
            beats.push(t);
        }
        let duration = beats.last().copied().unwrap_or(1.0) + 1.0;
        let samples = (duration * fs) as usize;
        (0..samples)
            .map(|i| {
                let time = i as f64 / fs;
                let mut v = 0.05 * (2.0 * PI * time).sin();
                for &bt in &beats {
                    v += 1.2 * (-0.5 * ((time - bt) / 0.02).powi(2)).exp();
                }
                v
            })
            .collect()
    }
}
