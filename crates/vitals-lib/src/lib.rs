pub mod detectors;
pub mod error;
pub mod filter;
pub mod io;
pub mod pipeline;
pub mod signal;
pub mod synth;
pub mod timebase;

pub use detectors::*;
pub use error::{Result, VitalsError};
pub use filter::*;
pub use pipeline::{analyze, Analysis, PipelineConfig, TimedWave};
pub use signal::*;
pub use timebase::{align, Channels, MergedTable};
