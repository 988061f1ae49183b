//! Peak fitting and energy calibration for single-channel-analyzer spectra.

pub mod analysis;
pub mod color;
pub mod config;
pub mod data;
pub mod error;
pub mod figure;
pub mod session;

pub use analysis::calibration::{calibrate_two_peaks, channel_to_kev, channels_to_kev, Calibration};
pub use analysis::fit::{fit_peaks, InitialGuess, PeakGuesses};
pub use data::model::{ReferencePeaks, Spectrum, SpectrumSource};
pub use data::reader::{DataLayout, ReadOptions, TextEncoding};
