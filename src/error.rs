use std::path::PathBuf;

use thiserror::Error;

// ---------------------------------------------------------------------------
// Reader errors
// ---------------------------------------------------------------------------

/// Failures while turning a text export into numbers.
#[derive(Debug, Error)]
pub enum ReadError {
    #[error("reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path} is not valid {encoding}")]
    Encoding { path: PathBuf, encoding: &'static str },

    #[error("could not find marker line '{marker}' in {path}")]
    MarkerNotFound { path: PathBuf, marker: String },

    #[error("no data lines between the markers in {path}")]
    NoData { path: PathBuf },

    #[error("line {line}: '{text}' is not a number")]
    Parse { line: usize, text: String },

    #[error("line {line}: expected 2 fields separated by '{delimiter}', found {found}")]
    FieldCount {
        line: usize,
        delimiter: String,
        found: usize,
    },
}

// ---------------------------------------------------------------------------
// Model / numeric domain errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, PartialEq)]
pub enum DomainError {
    #[error("standard deviation must be positive and finite, got {0}")]
    InvalidStd(f64),

    #[error("gaussian parameters come in triples, got {0} values")]
    ParamCount(usize),

    #[error("{name} must be finite, got {value}")]
    NonFinite { name: &'static str, value: f64 },
}

// ---------------------------------------------------------------------------
// Fitting errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum FitError {
    #[error("at least one peak guess is required")]
    NoPeaks,

    #[error("{what} guess has {found} entries but there are {expected} peaks")]
    GuessLength {
        what: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("x has {x} values but y has {y}")]
    LengthMismatch { x: usize, y: usize },

    #[error("{points} data points cannot determine {parameters} parameters")]
    InsufficientData { points: usize, parameters: usize },

    #[error("optimal parameters not found after {evaluations} evaluations: {reason}")]
    NotConverged { reason: String, evaluations: usize },

    #[error(transparent)]
    Domain(#[from] DomainError),
}

// ---------------------------------------------------------------------------
// Calibration errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, PartialEq)]
pub enum CalibrationError {
    #[error("two reference peaks are needed, got {found}")]
    TooFewPeaks { found: usize },

    #[error("{channels} peak channels but {energies} peak energies")]
    LengthMismatch { channels: usize, energies: usize },

    #[error("both reference peaks sit at channel {0}")]
    IdenticalChannels(f64),

    #[error("both reference peaks have energy {0} keV")]
    IdenticalEnergies(f64),

    #[error("reference peak values must be finite")]
    NonFinite,
}

// ---------------------------------------------------------------------------
// Spectrum record errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum SpectrumError {
    #[error(transparent)]
    Read(#[from] ReadError),

    #[error(transparent)]
    Fit(#[from] FitError),

    #[error(transparent)]
    Calibration(#[from] CalibrationError),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("counts must be non-negative with a positive maximum ({0})")]
    InvalidCounts(String),

    #[error("peak lists disagree in length: {0}")]
    PeakListMismatch(String),

    #[error("'{0}' has no {1}")]
    Missing(String, &'static str),

    #[error("spectrum '{name}' is not calibrated")]
    NotCalibrated { name: String },

    #[error("'{known}' has {expected} channels but the new spectrum has {found}")]
    ChannelCountMismatch {
        known: String,
        expected: usize,
        found: usize,
    },

    #[error("spectrum '{name}' already has a {what}")]
    AlreadySet { name: String, what: &'static str },

    #[error("record field '{field}' has {found} values, expected {expected}")]
    FieldLength {
        field: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("I/O on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV: {0}")]
    Csv(#[from] csv::Error),
}
