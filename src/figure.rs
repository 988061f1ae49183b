use serde::{Deserialize, Serialize};

use crate::analysis::area::area_under_peak;
use crate::analysis::gaussian::peaks_from_params;
use crate::color::{generate_palette, Rgb};
use crate::data::model::Spectrum;
use crate::error::DomainError;

// ---------------------------------------------------------------------------
// Figure description
// ---------------------------------------------------------------------------

/// How a trace is drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Lines,
    LinesMarkers,
    LinesText,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dash {
    Solid,
    Dot,
}

/// One line of a figure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    pub name: String,
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub mode: Mode,
    pub dash: Dash,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<Rgb>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    /// Per-point labels, used by marker lines.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub text: Vec<String>,
}

impl Trace {
    fn line(name: impl Into<String>, x: &[f64], y: &[f64], mode: Mode) -> Self {
        let n = x.len().min(y.len());
        Self {
            name: name.into(),
            x: x[..n].to_vec(),
            y: y[..n].to_vec(),
            mode,
            dash: Dash::Solid,
            color: None,
            width: None,
            text: Vec::new(),
        }
    }
}

/// Renderer-agnostic figure: whatever draws it only has to map traces to lines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Figure {
    pub title: String,
    pub x_title: String,
    pub y_title: String,
    pub legend_title: Option<String>,
    pub traces: Vec<Trace>,
}

impl Figure {
    pub fn new(title: &str, x_title: &str, y_title: &str) -> Self {
        Self {
            title: title.to_string(),
            x_title: x_title.to_string(),
            y_title: y_title.to_string(),
            legend_title: None,
            traces: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Spectrum plot
// ---------------------------------------------------------------------------

/// What to put on a spectrum figure besides the x axis.
#[derive(Debug, Clone)]
pub struct PlotOptions<'a> {
    /// Raw data.
    pub y: Option<&'a [f64]>,
    /// Fitted curve.
    pub y_fit: Option<&'a [f64]>,
    /// Any other named curve.
    pub y_named: Option<(&'a [f64], &'a str)>,
    /// Positions of dotted vertical marker lines.
    pub vlines: &'a [f64],
    pub vline_names: Option<&'a [String]>,
    /// `[amp, mu, std, …]`; each peak gets its own trace.
    pub fit_params: Option<&'a [f64]>,
    /// Crop window in points.
    pub start: usize,
    pub stop: usize,
    pub title: &'a str,
    pub x_title: &'a str,
    pub y_title: &'a str,
}

impl Default for PlotOptions<'_> {
    fn default() -> Self {
        Self {
            y: None,
            y_fit: None,
            y_named: None,
            vlines: &[],
            vline_names: None,
            fit_params: None,
            start: 0,
            stop: 2048,
            title: "Untitled",
            x_title: "Channel number [~10eV]",
            y_title: "Relative intensity",
        }
    }
}

fn crop(values: &[f64], start: usize, stop: usize) -> &[f64] {
    let stop = stop.min(values.len());
    let start = start.min(stop);
    &values[start..stop]
}

/// Data, fit, markers and individual peaks on one figure.
pub fn spectrum_figure(x: &[f64], opts: &PlotOptions<'_>) -> Result<Figure, DomainError> {
    let mut fig = Figure::new(opts.title, opts.x_title, opts.y_title);
    fig.legend_title = Some("Legend".to_string());

    let x = crop(x, opts.start, opts.stop);
    let cropped = |v: &[f64]| crop(v, opts.start, opts.stop).to_vec();

    if let Some(y) = opts.y {
        fig.traces
            .push(Trace::line("raw data", x, &cropped(y), Mode::LinesMarkers));
    }
    if let Some(y_fit) = opts.y_fit {
        fig.traces
            .push(Trace::line("gaussian fit", x, &cropped(y_fit), Mode::Lines));
    }
    if let Some((y, name)) = opts.y_named {
        fig.traces.push(Trace::line(name, x, &cropped(y), Mode::Lines));
    }

    for (i, &v) in opts.vlines.iter().enumerate() {
        let label = match opts.vline_names.and_then(|names| names.get(i)) {
            Some(name) => format!("{name}: {v:.4}"),
            None => format!("{v:.4}"),
        };
        fig.traces.push(Trace {
            name: label.clone(),
            x: vec![v, v],
            y: vec![-0.05, 1.0],
            mode: Mode::LinesText,
            dash: Dash::Dot,
            color: Some(Rgb::BLACK),
            width: Some(1.0),
            text: vec![label.clone(), label],
        });
    }

    if let Some(params) = opts.fit_params {
        let peaks = peaks_from_params(params)?;
        let colors = generate_palette(peaks.len());
        for (peak, color) in peaks.iter().zip(colors) {
            let area = area_under_peak(peak.mean, peak.std.abs(), peak.amplitude)?;
            let name = format!(
                "a={:.2}, mu={:.2}, std={:.2}, area={area:.3}",
                peak.amplitude, peak.mean, peak.std
            );
            let mut trace = Trace::line(name, x, &peak.evaluate(x), Mode::Lines);
            trace.color = Some(color);
            fig.traces.push(trace);
        }
    }

    Ok(fig)
}

/// Standard figure of a spectrum: energy axis once calibrated, channels before.
pub fn figure_for_spectrum(spectrum: &Spectrum, start: usize, stop: usize) -> Result<Figure, DomainError> {
    let (x, x_title, markers) = match (spectrum.kev_calibrated(), spectrum.calibration()) {
        (Some(kev), Some(cal)) => (
            kev.to_vec(),
            "Energy [keV]",
            spectrum
                .peaks
                .channel
                .as_deref()
                .map(|c| cal.to_kev_all(c, true))
                .unwrap_or_default(),
        ),
        _ => (
            spectrum.channel_axis(),
            "Channel number [~10eV]",
            spectrum.peaks.channel.clone().unwrap_or_default(),
        ),
    };

    let fit = spectrum.fit();
    // Fitted parameters live on the channel axis; widths are not shifted.
    let fit_params = fit.map(|f| match spectrum.calibration() {
        Some(cal) => f
            .params
            .chunks_exact(3)
            .flat_map(|t| [t[0], cal.to_kev(t[1], true), cal.to_kev(t[2], false)])
            .collect(),
        None => f.params.clone(),
    });

    let opts = PlotOptions {
        y: Some(spectrum.intensity()),
        y_fit: fit.map(|f| f.intensity_fit.as_slice()),
        vlines: &markers,
        vline_names: spectrum.peaks.names.as_deref(),
        fit_params: fit_params.as_deref(),
        start,
        stop,
        title: spectrum.name(),
        x_title,
        ..Default::default()
    };
    spectrum_figure(&x, &opts)
}

// ---------------------------------------------------------------------------
// Several lines on one axis
// ---------------------------------------------------------------------------

/// One trace per entry of `ys`; names fall back to `line i` when missing or
/// when their count does not match.
pub fn line_figure(
    x: &[f64],
    ys: &[Vec<f64>],
    names: Option<&[String]>,
    title: &str,
    x_title: &str,
    y_title: &str,
) -> Figure {
    let mut fig = Figure::new(title, x_title, y_title);
    let names: Vec<String> = match names {
        Some(names) if names.len() == ys.len() => names.to_vec(),
        _ => (0..ys.len()).map(|i| format!("line {i}")).collect(),
    };
    let colors = generate_palette(ys.len());

    for ((y, name), color) in ys.iter().zip(names).zip(colors) {
        let mut trace = Trace::line(name, x, y, Mode::Lines);
        trace.color = Some(color);
        fig.traces.push(trace);
    }
    fig
}

#[cfg(test)]
mod tests {
    use super::*;

    fn axis(n: usize) -> Vec<f64> {
        (0..n).map(|i| i as f64).collect()
    }

    #[test]
    fn full_figure_has_every_trace() {
        let x = axis(100);
        let y = vec![0.5; 100];
        let names = vec!["Cu Ka".to_string()];
        let params = [1.0, 40.0, 2.0, 0.5, 60.0, 3.0];
        let opts = PlotOptions {
            y: Some(y.as_slice()),
            y_fit: Some(y.as_slice()),
            y_named: Some((y.as_slice(), "background")),
            vlines: &[40.0, 60.0],
            vline_names: Some(names.as_slice()),
            fit_params: Some(&params[..]),
            start: 10,
            stop: 90,
            ..Default::default()
        };
        let fig = spectrum_figure(&x, &opts).unwrap();

        let trace_names: Vec<&str> = fig.traces.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(&trace_names[..3], &["raw data", "gaussian fit", "background"]);
        assert_eq!(trace_names[3], "Cu Ka: 40.0000");
        // No name for the second marker.
        assert_eq!(trace_names[4], "60.0000");
        assert!(trace_names[5].starts_with("a=1.00, mu=40.00, std=2.00, area=0.997"));
        assert_eq!(fig.traces.len(), 7);

        assert_eq!(fig.traces[0].x.len(), 80);
        assert_eq!(fig.traces[0].x[0], 10.0);
        assert_eq!(fig.traces[5].y.len(), 80);
        assert_eq!(fig.traces[3].dash, Dash::Dot);
    }

    #[test]
    fn crop_past_the_end_is_clamped() {
        let x = axis(10);
        let opts = PlotOptions {
            y: Some(x.as_slice()),
            ..Default::default()
        };
        let fig = spectrum_figure(&x, &opts).unwrap();
        assert_eq!(fig.traces[0].x.len(), 10);
    }

    #[test]
    fn bad_fit_params_are_reported() {
        let x = axis(10);
        let opts = PlotOptions {
            fit_params: Some(&[1.0, 2.0][..]),
            ..Default::default()
        };
        assert_eq!(
            spectrum_figure(&x, &opts),
            Err(DomainError::ParamCount(2))
        );
    }

    #[test]
    fn line_names_fall_back_to_index() {
        let x = axis(3);
        let ys = vec![vec![1.0; 3], vec![2.0; 3]];
        let names = vec!["only one".to_string()];
        let fig = line_figure(&x, &ys, Some(names.as_slice()), "t", "x", "y");
        assert_eq!(fig.traces[0].name, "line 0");
        assert_eq!(fig.traces[1].name, "line 1");
        assert_ne!(fig.traces[0].color, fig.traces[1].color);
    }

    #[test]
    fn figure_serialises_colours_as_hex() {
        let x = axis(3);
        let fig = line_figure(&x, &[vec![0.0; 3]], None, "t", "x", "y");
        let json = serde_json::to_value(&fig).unwrap();
        assert!(json["traces"][0]["color"].as_str().unwrap().starts_with('#'));
        let back: Figure = serde_json::from_value(json).unwrap();
        assert_eq!(back, fig);
    }
}
