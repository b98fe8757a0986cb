//! Heartbeat timestamps and instantaneous heart rate from a filtered ECG.
use super::ecg::PeakDetector;
use crate::error::{check_sample_rate, Result, VitalsError};
use serde::{Deserialize, Serialize};

/// Consecutive real samples further apart than this many sample periods
/// belong to different runs.
const RUN_BREAK_PERIODS: f64 = 1.5;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PeakRecord {
    pub timestamp: f64,
    /// Row on the dense axis passed to [`extract_peaks_and_hr`].
    pub index: usize,
    /// Filtered ECG value at the peak.
    pub amplitude: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeartRateSample {
    pub timestamp: f64,
    pub bpm: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HeartbeatAnalysis {
    pub peaks: Vec<PeakRecord>,
    pub heart_rate: Vec<HeartRateSample>,
}

impl HeartbeatAnalysis {
    /// Beats whose filtered amplitude stays below `threshold`; on a clean
    /// trace these are the irregular, low-voltage complexes worth a look.
    pub fn low_amplitude_peaks(&self, threshold: f64) -> Vec<PeakRecord> {
        self.peaks
            .iter()
            .filter(|p| p.amplitude < threshold)
            .copied()
            .collect()
    }

    /// Heart-rate samples above `threshold_bpm`.
    pub fn tachycardic(&self, threshold_bpm: f64) -> Vec<HeartRateSample> {
        self.heart_rate
            .iter()
            .filter(|hr| hr.bpm > threshold_bpm)
            .copied()
            .collect()
    }

    pub fn mean_bpm(&self) -> Option<f64> {
        if self.heart_rate.is_empty() {
            return None;
        }
        Some(self.heart_rate.iter().map(|hr| hr.bpm).sum::<f64>() / self.heart_rate.len() as f64)
    }
}

/// Locate heartbeats in `filtered_ecg` and derive beat-to-beat heart rate.
///
/// Rows holding a non-finite value are gaps: they are removed before the
/// detector runs and the detected indices are mapped back onto the dense
/// axis. The first beat of every contiguous run has no heart rate.
pub fn extract_peaks_and_hr<D>(
    filtered_ecg: &[f64],
    timestamps: &[f64],
    sample_rate: f64,
    detector: &D,
) -> Result<HeartbeatAnalysis>
where
    D: PeakDetector + ?Sized,
{
    check_sample_rate(sample_rate)?;
    if filtered_ecg.len() != timestamps.len() {
        return Err(VitalsError::LengthMismatch {
            what: "filtered ECG",
            actual: filtered_ecg.len(),
            expected: timestamps.len(),
        });
    }

    let (rows, compact): (Vec<usize>, Vec<f64>) = filtered_ecg
        .iter()
        .enumerate()
        .filter(|(_, v)| v.is_finite())
        .map(|(i, &v)| (i, v))
        .unzip();
    if compact.len() < 2 {
        log::debug!("heartbeat extraction skipped: {} real samples", compact.len());
        return Ok(HeartbeatAnalysis::default());
    }

    let mut indices = detector.detect_peaks(&compact, sample_rate);
    indices.sort_unstable();
    indices.dedup();
    let before = indices.len();
    indices.retain(|&i| i < compact.len());
    if indices.len() < before {
        log::warn!(
            "detector returned {} out-of-range peak indices",
            before - indices.len()
        );
    }

    let max_step = RUN_BREAK_PERIODS / sample_rate;
    let mut peaks = Vec::with_capacity(indices.len());
    let mut heart_rate = Vec::with_capacity(indices.len().saturating_sub(1));
    let mut previous: Option<usize> = None;
    for &i in &indices {
        let row = rows[i];
        let timestamp = timestamps[row];
        peaks.push(PeakRecord {
            timestamp,
            index: row,
            amplitude: compact[i],
        });
        if let Some(prev) = previous {
            let dt = timestamp - timestamps[rows[prev]];
            if dt > 0.0 && same_run(&rows[prev..=i], timestamps, max_step) {
                heart_rate.push(HeartRateSample {
                    timestamp,
                    bpm: 60.0 / dt,
                });
            }
        }
        previous = Some(i);
    }
    if peaks.len() < 2 {
        log::debug!("fewer than two beats detected; no heart rate");
    }
    Ok(HeartbeatAnalysis { peaks, heart_rate })
}

fn same_run(rows: &[usize], timestamps: &[f64], max_step: f64) -> bool {
    rows.windows(2)
        .all(|w| timestamps[w[1]] - timestamps[w[0]] <= max_step)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn axis(n: usize, fs: f64) -> Vec<f64> {
        (0..n).map(|i| i as f64 / fs).collect()
    }

    #[test]
    fn one_second_spacing_is_sixty_bpm() {
        let fs = 500.0;
        let ts = axis(2500, fs);
        let ecg = vec![0.1; ts.len()];
        let detector = |_: &[f64], _: f64| vec![0usize, 500, 1000, 1500, 2000];
        let out = extract_peaks_and_hr(&ecg, &ts, fs, &detector).unwrap();
        assert_eq!(out.peaks.len(), 5);
        assert_eq!(out.heart_rate.len(), 4);
        for hr in &out.heart_rate {
            assert!((hr.bpm - 60.0).abs() < 1e-9, "bpm = {}", hr.bpm);
        }
        assert_eq!(out.heart_rate[0].timestamp, 1.0);
        assert_eq!(out.mean_bpm(), Some(60.0));
    }

    #[test]
    fn single_peak_yields_no_heart_rate() {
        let ts = axis(100, 100.0);
        let ecg = vec![0.0; 100];
        let out = extract_peaks_and_hr(&ecg, &ts, 100.0, &|_: &[f64], _: f64| vec![10usize])
            .unwrap();
        assert_eq!(out.peaks.len(), 1);
        assert!(out.heart_rate.is_empty());
    }

    #[test]
    fn gap_rows_are_excluded_and_indices_remapped() {
        // Dense axis at 100 Hz with an extra foreign row every 4th position:
        // the ECG is absent there, but the ECG grid itself is unbroken.
        let mut ts = Vec::new();
        let mut ecg = Vec::new();
        for i in 0..300 {
            let t = i as f64 / 100.0;
            ts.push(t);
            ecg.push(if i % 50 == 0 { 1.0 } else { 0.0 });
            if i % 4 == 0 {
                ts.push(t + 0.004);
                ecg.push(f64::NAN);
            }
        }
        let detector = |signal: &[f64], _: f64| {
            assert!(signal.iter().all(|v| v.is_finite()));
            signal
                .iter()
                .enumerate()
                .filter(|(_, v)| **v > 0.5)
                .map(|(i, _)| i)
                .collect::<Vec<_>>()
        };
        let out = extract_peaks_and_hr(&ecg, &ts, 100.0, &detector).unwrap();
        assert_eq!(out.peaks.len(), 6);
        for p in &out.peaks {
            assert_eq!(ecg[p.index], 1.0);
            assert_eq!(p.amplitude, 1.0);
        }
        assert_eq!(out.heart_rate.len(), 5);
        assert!(out.heart_rate.iter().all(|hr| (hr.bpm - 120.0).abs() < 1e-6));
    }

    #[test]
    fn heart_rate_is_not_bridged_across_a_gap() {
        let fs = 100.0;
        let ts = axis(1000, fs);
        let mut ecg = vec![0.0; 1000];
        for v in &mut ecg[400..600] {
            *v = f64::NAN;
        }
        let detector = |_: &[f64], _: f64| vec![100usize, 200, 300, 500, 600];
        let out = extract_peaks_and_hr(&ecg, &ts, fs, &detector).unwrap();
        // compact index 500 is dense row 700, 600 is row 800
        let rows: Vec<usize> = out.peaks.iter().map(|p| p.index).collect();
        assert_eq!(rows, vec![100, 200, 300, 700, 800]);
        let stamps: Vec<f64> = out.heart_rate.iter().map(|hr| hr.timestamp).collect();
        assert_eq!(stamps, vec![2.0, 3.0, 8.0]);
    }

    #[test]
    fn out_of_range_indices_are_dropped() {
        let ts = axis(10, 10.0);
        let ecg = vec![0.0; 10];
        let out =
            extract_peaks_and_hr(&ecg, &ts, 10.0, &|_: &[f64], _: f64| vec![5usize, 2, 2, 42])
                .unwrap();
        let rows: Vec<usize> = out.peaks.iter().map(|p| p.index).collect();
        assert_eq!(rows, vec![2, 5]);
    }

    #[test]
    fn length_mismatch_is_an_error() {
        let err = extract_peaks_and_hr(&[0.0; 3], &[0.0; 4], 10.0, &|_: &[f64], _: f64| {
            Vec::new()
        })
        .unwrap_err();
        assert!(matches!(err, VitalsError::LengthMismatch { .. }));
    }

    #[test]
    fn flags_low_amplitude_and_fast_beats() {
        let analysis = HeartbeatAnalysis {
            peaks: vec![
                PeakRecord {
                    timestamp: 0.0,
                    index: 0,
                    amplitude: 0.9,
                },
                PeakRecord {
                    timestamp: 0.5,
                    index: 250,
                    amplitude: 0.2,
                },
            ],
            heart_rate: vec![HeartRateSample {
                timestamp: 0.5,
                bpm: 120.0,
            }],
        };
        assert_eq!(analysis.low_amplitude_peaks(0.4).len(), 1);
        assert_eq!(analysis.tachycardic(100.0).len(), 1);
        assert!(analysis.tachycardic(130.0).is_empty());
    }
}
