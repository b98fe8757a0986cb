//! Synthetic multi-rate case: ECG and ABP at 500 Hz, CO2 at 62.5 Hz and a
//! monitor heart rate every 2 s, on the same channel layout as a recorded
//! case. Deterministic for a given seed.
use crate::signal::ChannelSeries;
use crate::timebase::Channels;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaseProfile {
    pub duration_s: f64,
    pub heart_rate_bpm: f64,
    /// Beat-to-beat interval jitter, uniform in `±rr_jitter_s`.
    pub rr_jitter_s: f64,
    pub ecg_rate: f64,
    pub abp_rate: f64,
    pub co2_rate: f64,
    /// Seconds between monitor heart-rate readings.
    pub hr_interval_s: f64,
    pub systolic_mmhg: f64,
    pub diastolic_mmhg: f64,
    /// ECG beat to arterial upstroke (seconds).
    pub pulse_transit_s: f64,
    pub breaths_per_min: f64,
    pub end_tidal_co2: f64,
    /// Peak-to-peak amplitude of the uniform ECG noise (mV).
    pub ecg_noise_mv: f64,
    pub abp_noise_mmhg: f64,
}

impl Default for CaseProfile {
    fn default() -> Self {
        Self {
            duration_s: 60.0,
            heart_rate_bpm: 72.0,
            rr_jitter_s: 0.02,
            ecg_rate: 500.0,
            abp_rate: 500.0,
            co2_rate: 62.5,
            hr_interval_s: 2.0,
            systolic_mmhg: 120.0,
            diastolic_mmhg: 80.0,
            pulse_transit_s: 0.2,
            breaths_per_min: 12.0,
            end_tidal_co2: 38.0,
            ecg_noise_mv: 0.02,
            abp_noise_mmhg: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimulatedCase {
    pub ecg: ChannelSeries,
    pub abp: ChannelSeries,
    pub co2: ChannelSeries,
    pub hr: ChannelSeries,
    /// R-wave times used to drive every channel.
    pub beat_times: Vec<f64>,
}

impl SimulatedCase {
    /// Channels under the names a case export uses.
    pub fn channels(&self) -> Channels {
        Channels::from([
            ("ECG".to_string(), self.ecg.clone()),
            ("ABP".to_string(), self.abp.clone()),
            ("co2".to_string(), self.co2.clone()),
            ("Hr".to_string(), self.hr.clone()),
        ])
    }
}

/// Build a case from `profile`; the same seed gives the same samples.
pub fn simulate_case(profile: &CaseProfile, seed: u64) -> SimulatedCase {
    let mut rng = StdRng::seed_from_u64(seed);
    let beat_times = schedule_beats(profile, &mut rng);

    let ecg = sample(profile.ecg_rate, profile.duration_s, |t| {
        ecg_at(t, &beat_times) + noise(&mut rng, profile.ecg_noise_mv)
    });
    let abp = sample(profile.abp_rate, profile.duration_s, |t| {
        abp_at(t, &beat_times, profile) + noise(&mut rng, profile.abp_noise_mmhg)
    });
    let co2 = sample(profile.co2_rate, profile.duration_s, |t| co2_at(t, profile));
    let hr = sample(profile.hr_interval_s.recip(), profile.duration_s, |t| {
        monitor_rate(t, &beat_times).unwrap_or(f64::NAN)
    });

    SimulatedCase {
        ecg,
        abp,
        co2,
        hr,
        beat_times,
    }
}

fn schedule_beats(profile: &CaseProfile, rng: &mut StdRng) -> Vec<f64> {
    let rr = 60.0 / profile.heart_rate_bpm.max(1.0);
    let jitter = profile.rr_jitter_s.abs().min(rr * 0.5);
    let mut beats = Vec::new();
    let mut t = 0.3;
    while t < profile.duration_s {
        beats.push(t);
        t += rr + if jitter > 0.0 { rng.gen_range(-jitter..=jitter) } else { 0.0 };
    }
    beats
}

fn sample(rate: f64, duration_s: f64, mut at: impl FnMut(f64) -> f64) -> ChannelSeries {
    let n = if rate.is_finite() && rate > 0.0 {
        (duration_s * rate).floor().max(0.0) as usize
    } else {
        0
    };
    let values: Vec<f64> = (0..n).map(|i| at(i as f64 / rate)).collect();
    ChannelSeries::uniform(rate, values).unwrap_or_default()
}

fn noise(rng: &mut StdRng, peak_to_peak: f64) -> f64 {
    if peak_to_peak > 0.0 {
        rng.gen_range(-0.5..0.5) * peak_to_peak
    } else {
        0.0
    }
}

fn gauss(t: f64, centre: f64, width: f64, amplitude: f64) -> f64 {
    amplitude * (-0.5 * ((t - centre) / width).powi(2)).exp()
}

/// P-QRS-T complex around every beat plus slow baseline wander.
fn ecg_at(t: f64, beats: &[f64]) -> f64 {
    let mut v = 0.05 * (2.0 * PI * 0.25 * t).sin();
    for &b in beats {
        if (t - b).abs() > 0.6 {
            continue;
        }
        v += gauss(t, b - 0.16, 0.02, 0.12)
            + gauss(t, b - 0.025, 0.008, -0.1)
            + gauss(t, b, 0.008, 1.0)
            + gauss(t, b + 0.025, 0.008, -0.2)
            + gauss(t, b + 0.25, 0.05, 0.3);
    }
    v
}

/// Sharp upstroke to systole, then an exponential run-off that meets the
/// diastolic level at the next upstroke.
fn abp_at(t: f64, beats: &[f64], profile: &CaseProfile) -> f64 {
    let pulse = profile.systolic_mmhg - profile.diastolic_mmhg;
    let idx = beats.partition_point(|b| b + profile.pulse_transit_s <= t);
    if idx == 0 || idx >= beats.len() {
        return profile.diastolic_mmhg;
    }
    let start = beats[idx - 1] + profile.pulse_transit_s;
    let period = beats[idx] - beats[idx - 1];
    let phase = ((t - start) / period).clamp(0.0, 1.0);
    let shape = if phase < 0.15 {
        (0.5 * PI * phase / 0.15).sin()
    } else {
        let floor = (-3.0_f64 * 0.85).exp();
        ((-3.0 * (phase - 0.15)).exp() - floor) / (1.0 - floor)
    };
    profile.diastolic_mmhg + pulse * shape
}

/// Capnogram: flat during inspiration, plateau at end-tidal during
/// expiration, smoothed edges.
fn co2_at(t: f64, profile: &CaseProfile) -> f64 {
    let breath = 60.0 / profile.breaths_per_min.max(1.0);
    let phase = (t % breath) / breath;
    let rise = 1.0 / (1.0 + (-(phase - 0.45) * 60.0).exp());
    let fall = 1.0 / (1.0 + (-(phase - 0.95) * 60.0).exp());
    profile.end_tidal_co2 * (rise - fall).max(0.0)
}

/// Rate from the last two beats before `t`, rounded like a monitor display.
fn monitor_rate(t: f64, beats: &[f64]) -> Option<f64> {
    let idx = beats.partition_point(|b| *b <= t);
    if idx < 2 {
        return None;
    }
    Some((60.0 / (beats[idx - 1] - beats[idx - 2])).round())
}
