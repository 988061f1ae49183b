use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::analysis::fit::{InitialGuess, PeakGuesses};
use crate::data::model::{ReferencePeaks, SpectrumSource};
use crate::data::reader::{DataLayout, ReadOptions, TextEncoding};
use crate::error::SpectrumError;

// ---------------------------------------------------------------------------
// Analysis configuration file
// ---------------------------------------------------------------------------

/// One spectrum to analyse, as written in a JSON configuration file:
///
/// ```json
/// {
///   "name": "Am-241 reference",
///   "filepath": "data/am241.mca",
///   "start_str": "<<DATA>>",
///   "stop_str": "<<END>>",
///   "line_endings": "\n",
///   "peaks_keV": [13.95, 59.54],
///   "peaks_names": ["Np L-alpha", "Am-241 gamma"],
///   "peaks_channel": [1365, 5920],
///   "guessed_std": 20
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AnalysisConfig {
    pub name: String,
    pub filepath: PathBuf,
    pub start_str: String,
    pub stop_str: String,
    #[serde(default)]
    pub line_endings: Option<String>,
    /// Present for two-column exports, absent for one count per line.
    #[serde(default)]
    pub delimiter: Option<String>,
    #[serde(default)]
    pub encoding: TextEncoding,

    #[serde(default, rename = "peaks_keV")]
    pub peaks_kev: Option<Vec<f64>>,
    #[serde(default)]
    pub peaks_names: Option<Vec<String>>,
    /// Guessed peak channels; they seed the fit.
    #[serde(default)]
    pub peaks_channel: Option<Vec<f64>>,
    #[serde(default)]
    pub guessed_std: InitialGuess,
    #[serde(default)]
    pub guessed_amp: InitialGuess,

    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default)]
    pub export_csv: bool,
    #[serde(default)]
    pub export_figure: bool,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("calibrated")
}

impl AnalysisConfig {
    /// Load a configuration; relative data paths are resolved against the
    /// directory of the configuration file.
    pub fn load(path: &Path) -> Result<Self, SpectrumError> {
        let text = std::fs::read_to_string(path).map_err(|source| SpectrumError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: AnalysisConfig = serde_json::from_str(&text)?;

        if let Some(base) = path.parent() {
            if config.filepath.is_relative() {
                config.filepath = base.join(&config.filepath);
            }
            if config.output_dir.is_relative() {
                config.output_dir = base.join(&config.output_dir);
            }
        }
        log::debug!("Loaded configuration {config:?}");
        Ok(config)
    }

    pub fn read_options(&self) -> ReadOptions {
        ReadOptions {
            start_marker: self.start_str.clone(),
            stop_marker: self.stop_str.clone(),
            line_endings: self.line_endings.clone(),
            layout: DataLayout::from_delimiter(self.delimiter.clone()),
            encoding: self.encoding,
        }
    }

    pub fn source(&self) -> SpectrumSource {
        SpectrumSource {
            name: self.name.clone(),
            filepath: self.filepath.clone(),
            read: self.read_options(),
            peaks: ReferencePeaks {
                kev: self.peaks_kev.clone(),
                names: self.peaks_names.clone(),
                channel: self.peaks_channel.clone(),
            },
        }
    }

    /// Fit seeds, if peak channels were given.
    pub fn guesses(&self) -> Option<PeakGuesses> {
        let centers = self.peaks_channel.as_deref()?;
        Some(
            PeakGuesses::at(centers)
                .with_std(self.guessed_std.clone())
                .with_amplitude(self.guessed_amp.clone()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn minimal_config_uses_defaults() {
        let config: AnalysisConfig = serde_json::from_str(
            r#"{"name": "bg", "filepath": "bg.mca", "start_str": "<<DATA>>", "stop_str": "<<END>>"}"#,
        )
        .unwrap();

        assert_eq!(config.encoding, TextEncoding::Windows1252);
        assert_eq!(config.guessed_std, InitialGuess::Scalar(1.0));
        assert_eq!(config.read_options().layout, DataLayout::SingleColumn);
        assert!(config.guesses().is_none());
        assert!(!config.export_csv);
    }

    #[test]
    fn guesses_accept_numbers_or_lists() {
        let config: AnalysisConfig = serde_json::from_str(
            r##"{
                "name": "Fe-55", "filepath": "fe.msa",
                "start_str": "#SPECTRUM", "stop_str": "#ENDOFDATA",
                "delimiter": ",", "encoding": "utf-8",
                "peaks_keV": [5.9, 6.49], "peaks_channel": [590, 649],
                "guessed_std": [4, 5], "guessed_amp": 0.5
            }"##,
        )
        .unwrap();

        assert_eq!(
            config.read_options().layout,
            DataLayout::Paired {
                delimiter: ",".into()
            }
        );
        let params = config.guesses().unwrap().initial_params().unwrap();
        assert_eq!(params, vec![0.5, 590.0, 4.0, 0.5, 649.0, 5.0]);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = serde_json::from_str::<AnalysisConfig>(
            r#"{"name": "x", "filepath": "x", "start_str": "a", "stop_str": "b", "peaks_kev": [1]}"#,
        );
        assert!(err.is_err());
    }

    #[test]
    fn relative_paths_follow_the_config_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("run.json");
        std::fs::write(
            &path,
            r#"{"name": "x", "filepath": "data/x.mca", "start_str": "a", "stop_str": "b"}"#,
        )
        .unwrap();

        let config = AnalysisConfig::load(&path).unwrap();
        assert_eq!(config.filepath, dir.path().join("data/x.mca"));
        assert_eq!(config.output_dir, dir.path().join("calibrated"));
    }
}
