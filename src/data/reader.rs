use std::borrow::Cow;
use std::path::Path;

use encoding_rs::{UTF_8, WINDOWS_1252};
use serde::{Deserialize, Serialize};

use crate::error::ReadError;

// ---------------------------------------------------------------------------
// Reader options
// ---------------------------------------------------------------------------

/// How the numbers between the markers are laid out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DataLayout {
    /// `x<delimiter>counts` on every line (e.g. `.emsa` exports).
    Paired { delimiter: String },
    /// One count per line (e.g. `.mca` exports); x is the line index.
    SingleColumn,
}

impl DataLayout {
    pub fn delimiter(&self) -> Option<&str> {
        match self {
            DataLayout::Paired { delimiter } => Some(delimiter),
            DataLayout::SingleColumn => None,
        }
    }

    pub fn from_delimiter(delimiter: Option<String>) -> Self {
        match delimiter {
            Some(delimiter) if !delimiter.is_empty() => DataLayout::Paired { delimiter },
            _ => DataLayout::SingleColumn,
        }
    }
}

/// Text encoding of the export.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TextEncoding {
    #[serde(rename = "utf-8")]
    Utf8,
    /// Code page used by most MCA software.
    #[default]
    #[serde(rename = "cp1252")]
    Windows1252,
}

impl TextEncoding {
    fn label(self) -> &'static str {
        match self {
            TextEncoding::Utf8 => "utf-8",
            TextEncoding::Windows1252 => "cp1252",
        }
    }
}

/// Everything needed to (re-)parse a file of a given export format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadOptions {
    /// The line right above the data.
    pub start_marker: String,
    /// The line right after the data.
    pub stop_marker: String,
    /// Characters stripped from the end of every line, `None` strips whitespace.
    ///
    /// Lines are split on `\n` and `\r\n` alike, so a trailing `\r` never
    /// needs to be listed here.
    pub line_endings: Option<String>,
    pub layout: DataLayout,
    pub encoding: TextEncoding,
}

impl ReadOptions {
    pub fn single_column(start_marker: &str, stop_marker: &str) -> Self {
        Self {
            start_marker: start_marker.to_string(),
            stop_marker: stop_marker.to_string(),
            line_endings: None,
            layout: DataLayout::SingleColumn,
            encoding: TextEncoding::default(),
        }
    }

    pub fn paired(start_marker: &str, stop_marker: &str, delimiter: &str) -> Self {
        Self {
            layout: DataLayout::Paired {
                delimiter: delimiter.to_string(),
            },
            ..Self::single_column(start_marker, stop_marker)
        }
    }

    pub fn with_line_endings(mut self, line_endings: &str) -> Self {
        self.line_endings = Some(line_endings.to_string());
        self
    }

    pub fn with_encoding(mut self, encoding: TextEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    fn strip_line_ending<'a>(&self, line: &'a str) -> &'a str {
        match &self.line_endings {
            Some(chars) => line.trim_end_matches(|c: char| chars.contains(c)),
            None => line.trim_end(),
        }
    }
}

// ---------------------------------------------------------------------------
// Raw data
// ---------------------------------------------------------------------------

/// Numbers read from one file, before any normalisation.
#[derive(Debug, Clone, PartialEq)]
pub struct RawData {
    /// First column for paired files, 0-based index otherwise.
    pub x: Vec<f64>,
    pub counts: Vec<f64>,
}

impl RawData {
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

/// Data lines together with their 1-based line number in the file.
#[derive(Debug, Clone, PartialEq)]
pub struct DataLines {
    /// Line number of the first data line.
    pub first_line: usize,
    pub lines: Vec<String>,
}

impl DataLines {
    fn numbered(&self) -> impl Iterator<Item = (usize, &str)> {
        self.lines
            .iter()
            .enumerate()
            .map(move |(i, l)| (self.first_line + i, l.as_str()))
    }
}

// ---------------------------------------------------------------------------
// Public entry-points
// ---------------------------------------------------------------------------

/// Read a file and dispatch on the configured [`DataLayout`].
pub fn read_data(path: &Path, options: &ReadOptions) -> Result<RawData, ReadError> {
    match &options.layout {
        DataLayout::Paired { delimiter } => read_xy_data(path, options, delimiter),
        DataLayout::SingleColumn => read_only_y_data(path, options),
    }
}

/// Return the lines strictly between the start and stop markers.
///
/// Markers are compared to whole lines after the line endings are stripped.
/// The stop marker is searched for after the start marker.
pub fn read_lines(path: &Path, options: &ReadOptions) -> Result<DataLines, ReadError> {
    let bytes = std::fs::read(path).map_err(|source| ReadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let text = decode(&bytes, options.encoding).ok_or_else(|| ReadError::Encoding {
        path: path.to_path_buf(),
        encoding: options.encoding.label(),
    })?;

    log::info!("Reading {}", path.display());
    if let Some(first) = text.lines().next() {
        log::debug!("The first line looks like this: {first:?}");
    }

    let lines: Vec<&str> = text
        .lines()
        .map(|l| options.strip_line_ending(l))
        .collect();

    let not_found = |marker: &str| ReadError::MarkerNotFound {
        path: path.to_path_buf(),
        marker: marker.to_string(),
    };
    let start = lines
        .iter()
        .position(|l| *l == options.start_marker)
        .ok_or_else(|| not_found(&options.start_marker))?;
    let stop = lines[start + 1..]
        .iter()
        .position(|l| *l == options.stop_marker)
        .map(|offset| start + 1 + offset)
        .ok_or_else(|| not_found(&options.stop_marker))?;

    log::debug!("Reading from line {start} to {stop}");

    if stop == start + 1 {
        return Err(ReadError::NoData {
            path: path.to_path_buf(),
        });
    }

    Ok(DataLines {
        first_line: start + 2,
        lines: lines[start + 1..stop].iter().map(|l| l.to_string()).collect(),
    })
}

/// Two columns split on `delimiter`: the file's x values and the counts.
pub fn read_xy_data(
    path: &Path,
    options: &ReadOptions,
    delimiter: &str,
) -> Result<RawData, ReadError> {
    let data = read_lines(path, options)?;

    let mut x = Vec::with_capacity(data.lines.len());
    let mut counts = Vec::with_capacity(data.lines.len());

    for (line_no, line) in data.numbered() {
        let fields: Vec<&str> = line.split(delimiter).collect();
        if fields.len() != 2 {
            return Err(ReadError::FieldCount {
                line: line_no,
                delimiter: delimiter.to_string(),
                found: fields.len(),
            });
        }
        x.push(parse_field(fields[0], line_no)?);
        counts.push(parse_field(fields[1], line_no)?);
    }

    let raw = RawData { x, counts };
    log_summary(&raw);
    Ok(raw)
}

/// One count per line; x is synthesised as the 0-based index.
pub fn read_only_y_data(path: &Path, options: &ReadOptions) -> Result<RawData, ReadError> {
    let data = read_lines(path, options)?;

    let counts = data
        .numbered()
        .map(|(line_no, line)| parse_field(line, line_no))
        .collect::<Result<Vec<f64>, ReadError>>()?;
    let x = (0..counts.len()).map(|i| i as f64).collect();

    let raw = RawData { x, counts };
    log_summary(&raw);
    Ok(raw)
}

// -- helpers --

fn decode(bytes: &[u8], encoding: TextEncoding) -> Option<Cow<'_, str>> {
    match encoding {
        TextEncoding::Utf8 => UTF_8.decode_without_bom_handling_and_without_replacement(bytes),
        // Every byte maps to a character in cp1252.
        TextEncoding::Windows1252 => Some(WINDOWS_1252.decode_without_bom_handling(bytes).0),
    }
}

fn parse_field(field: &str, line: usize) -> Result<f64, ReadError> {
    field.trim().parse::<f64>().map_err(|_| ReadError::Parse {
        line,
        text: field.to_string(),
    })
}

fn log_summary(raw: &RawData) {
    let n = raw.len();
    if n == 0 {
        return;
    }
    log::info!(
        "{n} data points, first entry = [{}, {}], last entry = [{}, {}]",
        raw.x[0],
        raw.counts[0],
        raw.x[n - 1],
        raw.counts[n - 1]
    );
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
