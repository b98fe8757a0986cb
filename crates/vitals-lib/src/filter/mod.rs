//! FIR high-pass design and application.
//!
//! - [`design`]: frequency-sampled high-pass design with a Hamming taper.
//! - [`fir`]: causal streaming filter and its batch form.

pub mod design;
pub mod fir;

pub use design::{
    design_highpass_fir, design_highpass_fir_with_window, hamming, ImpulseResponse,
    DEFAULT_DESIGN_WINDOW,
};
pub use fir::{apply_fir, FirIter, StreamingFir};
