pub mod abp;
pub mod ecg;
pub mod heartbeat;

pub use abp::{
    estimate_period, segment_waveforms, segment_waveforms_with_config, SegmenterConfig, WaveRecord,
};
pub use ecg::{EcgDetectorConfig, PanTompkins, PeakDetector};
pub use heartbeat::{extract_peaks_and_hr, HeartRateSample, HeartbeatAnalysis, PeakRecord};
