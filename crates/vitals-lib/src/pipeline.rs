//! Window analysis over a merged case table.
//!
//! ECG → artifact zeroing → high-pass FIR → heartbeat extraction, and ABP →
//! cycle segmentation. The derived traces are merged back onto the table's
//! time base as new channels.
use crate::detectors::{
    extract_peaks_and_hr, segment_waveforms_with_config, EcgDetectorConfig, HeartbeatAnalysis,
    PeakDetector, SegmenterConfig, WaveRecord,
};
use crate::error::{check_sample_rate, Result};
use crate::filter::{apply_fir, design_highpass_fir_with_window, ImpulseResponse};
use crate::signal::ChannelSeries;
use crate::timebase::{Channels, MergedTable};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Names of the derived channels added by [`analyze`].
pub mod columns {
    pub const FILTERED_ECG: &str = "ECG_f";
    pub const PEAK: &str = "peak";
    pub const HEART_RATE: &str = "hr";
    pub const SYSTOLIC: &str = "sbp";
    pub const DIASTOLIC: &str = "dbp";
    pub const MEAN_PRESSURE: &str = "map";

    /// Point-event columns: one value per detected beat, never interpolated.
    pub const MARKERS: &[&str] = &[PEAK];
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EcgChannelConfig {
    pub channel: String,
    pub sample_rate: f64,
    /// Raw values outside `[low, high]` (mV) are treated as artifacts and
    /// set to zero before filtering.
    pub artifact_range: [f64; 2],
}

impl Default for EcgChannelConfig {
    fn default() -> Self {
        Self {
            channel: "ECG".into(),
            sample_rate: 500.0,
            artifact_range: [-0.4, 1.4],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub cutoff_hz: f64,
    /// Number of taps; must be even.
    pub length: usize,
    /// Frequency bins used for the design.
    pub design_window: usize,
    /// Shift the filtered trace back by the group delay so beats line up
    /// with the raw ECG.
    pub compensate_delay: bool,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            cutoff_hz: 20.0,
            length: 100,
            design_window: crate::filter::DEFAULT_DESIGN_WINDOW,
            compensate_delay: true,
        }
    }
}

impl FilterConfig {
    pub fn design(&self, sample_rate: f64) -> Result<ImpulseResponse> {
        design_highpass_fir_with_window(
            self.cutoff_hz,
            sample_rate,
            self.length,
            self.design_window,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AbpChannelConfig {
    pub channel: String,
    pub sample_rate: f64,
}

impl Default for AbpChannelConfig {
    fn default() -> Self {
        Self {
            channel: "ABP".into(),
            sample_rate: 500.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// Heart rate above this is reported as tachycardic (bpm).
    pub tachycardia_bpm: f64,
    /// Beats whose filtered amplitude is below this are flagged (mV).
    pub low_amplitude_peak: f64,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            tachycardia_bpm: 100.0,
            low_amplitude_peak: 0.4,
        }
    }
}

/// Everything [`analyze`] needs, loadable from a TOML file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub ecg: EcgChannelConfig,
    pub filter: FilterConfig,
    pub detector: EcgDetectorConfig,
    pub abp: AbpChannelConfig,
    pub segmenter: SegmenterConfig,
    pub alerts: AlertConfig,
    /// Named case events, seconds from case start.
    pub events: BTreeMap<String, f64>,
    /// Half width of the analysis window centred on an event (seconds).
    pub window_half_width_s: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            ecg: EcgChannelConfig::default(),
            filter: FilterConfig::default(),
            detector: EcgDetectorConfig::default(),
            abp: AbpChannelConfig::default(),
            segmenter: SegmenterConfig::default(),
            alerts: AlertConfig::default(),
            events: BTreeMap::new(),
            window_half_width_s: 20.0,
        }
    }
}

impl PipelineConfig {
    /// `[t - w, t + w)` around the named event, clipped at the case start.
    pub fn event_window(&self, name: &str) -> Option<(f64, f64)> {
        let t = *self.events.get(name)?;
        let w = self.window_half_width_s;
        Some(((t - w).max(0.0), t + w))
    }
}

/// A pressure cycle placed on the table's time base.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimedWave {
    /// Time of the cycle start (diastolic minimum).
    pub timestamp: f64,
    /// Time of the systolic maximum.
    pub max_timestamp: f64,
    /// Indices are rows of the analysed table.
    #[serde(flatten)]
    pub record: WaveRecord,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Analysis {
    /// Input table plus the derived channels.
    #[serde(skip)]
    pub table: MergedTable,
    /// Peak indices are rows of `table`.
    pub heartbeat: HeartbeatAnalysis,
    pub waves: Vec<TimedWave>,
    /// Lag still present in `ECG_f` (zero when compensated).
    pub filter_delay_s: f64,
}

impl Analysis {
    /// Table with gaps interpolated, for dense playback only. Beat markers
    /// keep their own rows.
    pub fn playback_table(&self) -> MergedTable {
        self.table.fill_gaps(columns::MARKERS)
    }
}

/// Run the ECG and ABP chains over `table` and merge the results back in.
pub fn analyze(
    table: &MergedTable,
    config: &PipelineConfig,
    detector: &dyn PeakDetector,
) -> Result<Analysis> {
    let mut derived = Channels::new();
    let (heartbeat, filter_delay_s) = analyze_ecg(table, config, detector, &mut derived)?;
    let waves = analyze_abp(table, config, &mut derived)?;
    Ok(Analysis {
        table: table.merge(&derived),
        heartbeat,
        waves,
        filter_delay_s,
    })
}

fn analyze_ecg(
    table: &MergedTable,
    config: &PipelineConfig,
    detector: &dyn PeakDetector,
    derived: &mut Channels,
) -> Result<(HeartbeatAnalysis, f64)> {
    let fs = config.ecg.sample_rate;
    check_sample_rate(fs)?;
    let (rows, raw) = table.present(&config.ecg.channel)?;
    let taps = config.filter.design(fs)?;
    if raw.len() < taps.len() {
        log::debug!(
            "ECG window has {} samples, fewer than {} taps; not filtered",
            raw.len(),
            taps.len()
        );
        return Ok((HeartbeatAnalysis::default(), 0.0));
    }

    let [low, high] = config.ecg.artifact_range;
    let cleaned: Vec<f64> = raw
        .iter()
        .map(|&v| if v > low && v < high { v } else { 0.0 })
        .collect();
    let filtered = apply_fir(&cleaned, &taps);

    // Output j belongs to input j - shift.
    let shift = if config.filter.compensate_delay {
        taps.group_delay()
    } else {
        0
    };
    let out_rows = &rows[..rows.len() - shift];
    let out_values = &filtered[shift..];
    let timestamps: Vec<f64> = out_rows.iter().map(|&r| table.timestamps()[r]).collect();

    let mut heartbeat = extract_peaks_and_hr(out_values, &timestamps, fs, detector)?;
    for peak in &mut heartbeat.peaks {
        peak.index = out_rows[peak.index];
    }
    log::debug!(
        "ECG: {} samples filtered, {} beats, mean HR {:?}",
        out_values.len(),
        heartbeat.peaks.len(),
        heartbeat.mean_bpm()
    );

    derived.insert(
        columns::FILTERED_ECG.into(),
        ChannelSeries::new(timestamps, out_values.to_vec())?,
    );
    derived.insert(
        columns::PEAK.into(),
        ChannelSeries::new(
            heartbeat.peaks.iter().map(|p| p.timestamp).collect(),
            heartbeat.peaks.iter().map(|p| p.amplitude).collect(),
        )?,
    );
    derived.insert(
        columns::HEART_RATE.into(),
        ChannelSeries::new(
            heartbeat.heart_rate.iter().map(|hr| hr.timestamp).collect(),
            heartbeat.heart_rate.iter().map(|hr| hr.bpm).collect(),
        )?,
    );

    let lag = if config.filter.compensate_delay {
        0.0
    } else {
        taps.group_delay() as f64 / fs
    };
    Ok((heartbeat, lag))
}

fn analyze_abp(
    table: &MergedTable,
    config: &PipelineConfig,
    derived: &mut Channels,
) -> Result<Vec<TimedWave>> {
    if table.column(&config.abp.channel).is_none() {
        log::debug!("no `{}` channel; pressure segmentation skipped", config.abp.channel);
        return Ok(Vec::new());
    }
    let fs = config.abp.sample_rate;
    check_sample_rate(fs)?;
    let (rows, pressure) = table.present(&config.abp.channel)?;
    let ts = table.timestamps();

    let waves: Vec<TimedWave> = segment_waveforms_with_config(&pressure, fs, &config.segmenter)
        .into_iter()
        .map(|mut record| {
            record.start_index = rows[record.start_index];
            record.max_index = rows[record.max_index];
            TimedWave {
                timestamp: ts[record.start_index],
                max_timestamp: ts[record.max_index],
                record,
            }
        })
        .collect();
    log::debug!("ABP: {} cycles from {} samples", waves.len(), pressure.len());

    let starts: Vec<f64> = waves.iter().map(|w| w.timestamp).collect();
    derived.insert(
        columns::SYSTOLIC.into(),
        ChannelSeries::new(
            waves.iter().map(|w| w.max_timestamp).collect(),
            waves.iter().map(|w| w.record.max_value).collect(),
        )?,
    );
    derived.insert(
        columns::DIASTOLIC.into(),
        ChannelSeries::new(
            starts.clone(),
            waves.iter().map(|w| w.record.start_value).collect(),
        )?,
    );
    derived.insert(
        columns::MEAN_PRESSURE.into(),
        ChannelSeries::new(starts, waves.iter().map(|w| w.record.mean_value).collect())?,
    );
    Ok(waves)
}
