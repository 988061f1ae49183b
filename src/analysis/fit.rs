use levenberg_marquardt::{LeastSquaresProblem, LevenbergMarquardt};
use nalgebra::storage::Owned;
use nalgebra::{DMatrix, DVector, Dyn};
use serde::{Deserialize, Serialize};

use super::gaussian::{peaks_from_params, Peak};
use crate::error::{DomainError, FitError};

/// Relative tolerance on the sum of squares and on the parameters,
/// the MINPACK defaults (√ε).
pub const DEFAULT_TOLERANCE: f64 = 1.490_116_119_384_765_6e-8;

/// Evaluation budget factor: at most `PATIENCE · (n + 1)` model evaluations.
pub const PATIENCE: usize = 200;

// ---------------------------------------------------------------------------
// Initial guesses
// ---------------------------------------------------------------------------

/// Starting value for the amplitude or width of every peak.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InitialGuess {
    /// Same value for every peak.
    Scalar(f64),
    /// One value per peak, in the order of the centers.
    PerPeak(Vec<f64>),
}

impl Default for InitialGuess {
    fn default() -> Self {
        InitialGuess::Scalar(1.0)
    }
}

impl InitialGuess {
    fn expand(&self, what: &'static str, n: usize) -> Result<Vec<f64>, FitError> {
        match self {
            InitialGuess::Scalar(v) => Ok(vec![*v; n]),
            InitialGuess::PerPeak(values) if values.len() == n => Ok(values.clone()),
            InitialGuess::PerPeak(values) => Err(FitError::GuessLength {
                what,
                expected: n,
                found: values.len(),
            }),
        }
    }
}

/// Where to start looking for peaks.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PeakGuesses {
    pub centers: Vec<f64>,
    pub std: InitialGuess,
    pub amplitude: InitialGuess,
}

impl PeakGuesses {
    pub fn at(centers: &[f64]) -> Self {
        Self {
            centers: centers.to_vec(),
            ..Default::default()
        }
    }

    pub fn with_std(mut self, std: InitialGuess) -> Self {
        self.std = std;
        self
    }

    pub fn with_amplitude(mut self, amplitude: InitialGuess) -> Self {
        self.amplitude = amplitude;
        self
    }

    /// Flat `[amp, mu, std, …]` starting point.
    pub fn initial_params(&self) -> Result<Vec<f64>, FitError> {
        let n = self.centers.len();
        if n == 0 {
            return Err(FitError::NoPeaks);
        }
        let amps = self.amplitude.expand("amplitude", n)?;
        let stds = self.std.expand("std", n)?;

        Ok(self
            .centers
            .iter()
            .zip(amps.iter().zip(&stds))
            .flat_map(|(&mu, (&amp, &std))| [amp, mu, std])
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Fit result
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct PeakFitResult {
    /// `[amp1, mu1, std1, amp2, …]`.
    pub params: Vec<f64>,
    /// Estimated covariance of `params` (3k × 3k).
    pub covariance: DMatrix<f64>,
    pub evaluations: usize,
}

impl PeakFitResult {
    pub fn peaks(&self) -> Result<Vec<Peak>, DomainError> {
        peaks_from_params(&self.params)
    }

    /// One-sigma uncertainties, the square roots of the covariance diagonal.
    pub fn std_errors(&self) -> Vec<f64> {
        self.covariance.diagonal().iter().map(|v| v.sqrt()).collect()
    }
}

// ---------------------------------------------------------------------------
// Least-squares problem
// ---------------------------------------------------------------------------

/// Residuals `model(x) − y` of a sum of gaussians.
struct GaussianSum<'a> {
    x: &'a [f64],
    y: &'a [f64],
    params: DVector<f64>,
}

impl GaussianSum<'_> {
    fn triples(&self) -> Option<Vec<[f64; 3]>> {
        let triples: Vec<[f64; 3]> = self
            .params
            .as_slice()
            .chunks_exact(3)
            .map(|t| [t[0], t[1], t[2]])
            .collect();
        // A collapsed width makes the model undefined; let the solver stop.
        if triples.iter().any(|t| t[2] == 0.0 || !t.iter().all(|v| v.is_finite())) {
            return None;
        }
        Some(triples)
    }
}

impl LeastSquaresProblem<f64, Dyn, Dyn> for GaussianSum<'_> {
    type ResidualStorage = Owned<f64, Dyn>;
    type JacobianStorage = Owned<f64, Dyn, Dyn>;
    type ParameterStorage = Owned<f64, Dyn>;

    fn set_params(&mut self, params: &DVector<f64>) {
        self.params.copy_from(params);
    }

    fn params(&self) -> DVector<f64> {
        self.params.clone()
    }

    fn residuals(&self) -> Option<DVector<f64>> {
        let triples = self.triples()?;
        let residuals = self.x.iter().zip(self.y).map(|(&x, &y)| {
            let model: f64 = triples
                .iter()
                .map(|&[amp, mu, std]| {
                    let d = x - mu;
                    amp * (-(d * d) / (2.0 * std * std)).exp()
                })
                .sum();
            model - y
        });
        Some(DVector::from_iterator(self.x.len(), residuals))
    }

    fn jacobian(&self) -> Option<DMatrix<f64>> {
        let triples = self.triples()?;
        let mut jac = DMatrix::zeros(self.x.len(), self.params.len());

        for (row, &x) in self.x.iter().enumerate() {
            for (k, &[amp, mu, std]) in triples.iter().enumerate() {
                let d = x - mu;
                let var = std * std;
                let e = (-(d * d) / (2.0 * var)).exp();
                jac[(row, 3 * k)] = e;
                jac[(row, 3 * k + 1)] = amp * e * d / var;
                jac[(row, 3 * k + 2)] = amp * e * d * d / (var * std);
            }
        }
        Some(jac)
    }
}

// ---------------------------------------------------------------------------
// Public entry-points
// ---------------------------------------------------------------------------

/// Fit one gaussian per guessed center to `(x, y)` by non-linear least squares.
///
/// Parameters are unconstrained; a peak may come back with a negative width,
/// which describes the same curve as its absolute value.
pub fn fit_peaks(x: &[f64], y: &[f64], guesses: &PeakGuesses) -> Result<PeakFitResult, FitError> {
    if x.len() != y.len() {
        return Err(FitError::LengthMismatch {
            x: x.len(),
            y: y.len(),
        });
    }
    let initial = guesses.initial_params()?;
    // Validates the starting widths.
    peaks_from_params(&initial)?;

    let (m, n) = (x.len(), initial.len());
    if m <= n {
        return Err(FitError::InsufficientData {
            points: m,
            parameters: n,
        });
    }

    log::debug!("Fitting {} peaks to {m} points from {initial:?}", n / 3);

    let problem = GaussianSum {
        x,
        y,
        params: DVector::from_vec(initial),
    };
    let (problem, report) = LevenbergMarquardt::new()
        .with_ftol(DEFAULT_TOLERANCE)
        .with_xtol(DEFAULT_TOLERANCE)
        .with_patience(PATIENCE)
        .minimize(problem);

    if !report.termination.was_successful() {
        return Err(FitError::NotConverged {
            reason: format!("{:?}", report.termination),
            evaluations: report.number_of_evaluations,
        });
    }

    let params: Vec<f64> = problem.params.iter().copied().collect();
    let (Some(residuals), Some(jacobian)) = (problem.residuals(), problem.jacobian()) else {
        return Err(FitError::NotConverged {
            reason: format!("model undefined at the solution {params:?}"),
            evaluations: report.number_of_evaluations,
        });
    };

    let ssr = residuals.norm_squared();
    let covariance = covariance(jacobian, ssr / (m - n) as f64);

    log::info!(
        "Fitted {} peaks in {} evaluations, sum of squares {ssr:.3e}",
        n / 3,
        report.number_of_evaluations
    );

    Ok(PeakFitResult {
        params,
        covariance,
        evaluations: report.number_of_evaluations,
    })
}

/// `pinv(JᵀJ) · s²` from the SVD of the Jacobian at the solution.
fn covariance(jacobian: DMatrix<f64>, residual_variance: f64) -> DMatrix<f64> {
    let (m, n) = jacobian.shape();
    let svd = jacobian.svd(false, true);
    let Some(v_t) = svd.v_t else {
        log::warn!("Covariance of the parameters could not be estimated");
        return DMatrix::from_element(n, n, f64::INFINITY);
    };

    let singular = &svd.singular_values;
    let largest = singular.iter().copied().fold(0.0, f64::max);
    let threshold = f64::EPSILON * m.max(n) as f64 * largest;

    let mut weighted = v_t.clone();
    let mut dropped = 0;
    for (k, &s) in singular.iter().enumerate() {
        let w = if s > threshold {
            1.0 / (s * s)
        } else {
            dropped += 1;
            0.0
        };
        for j in 0..n {
            weighted[(k, j)] *= w;
        }
    }
    if dropped > 0 {
        log::warn!("Covariance is rank deficient: {dropped} of {n} directions undetermined");
    }

    (v_t.transpose() * weighted) * residual_variance
}

/// Root mean square of `y − y_fit`.
pub fn rms_error(y: &[f64], y_fit: &[f64]) -> Result<f64, FitError> {
    if y.len() != y_fit.len() {
        return Err(FitError::LengthMismatch {
            x: y.len(),
            y: y_fit.len(),
        });
    }
    if y.is_empty() {
        return Err(FitError::InsufficientData {
            points: 0,
            parameters: 0,
        });
    }
    let sum: f64 = y.iter().zip(y_fit).map(|(a, b)| (a - b).powi(2)).sum();
    Ok((sum / y.len() as f64).sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::gaussian::sum_of_gaussians;

    fn axis(n: usize) -> Vec<f64> {
        (0..n).map(|i| i as f64).collect()
    }

    fn close(a: f64, b: f64, tol: f64) -> bool {
        (a - b).abs() <= tol
    }

    #[test]
    fn scalar_guesses_are_broadcast() {
        let params = PeakGuesses::at(&[10.0, 20.0]).initial_params().unwrap();
        assert_eq!(params, vec![1.0, 10.0, 1.0, 1.0, 20.0, 1.0]);
    }

    #[test]
    fn per_peak_guesses_must_match() {
        let guesses = PeakGuesses::at(&[10.0, 20.0]).with_std(InitialGuess::PerPeak(vec![2.0]));
        assert!(matches!(
            guesses.initial_params(),
            Err(FitError::GuessLength { what: "std", expected: 2, found: 1 })
        ));

        let guesses = PeakGuesses::at(&[10.0, 20.0])
            .with_std(InitialGuess::PerPeak(vec![2.0, 3.0]))
            .with_amplitude(InitialGuess::Scalar(0.5));
        assert_eq!(
            guesses.initial_params().unwrap(),
            vec![0.5, 10.0, 2.0, 0.5, 20.0, 3.0]
        );
    }

    #[test]
    fn empty_guess_list_fails() {
        let x = axis(10);
        assert!(matches!(
            fit_peaks(&x, &x, &PeakGuesses::default()),
            Err(FitError::NoPeaks)
        ));
    }

    #[test]
    fn too_few_points_fails() {
        let x = axis(3);
        let y = vec![0.0, 1.0, 0.0];
        assert!(matches!(
            fit_peaks(&x, &y, &PeakGuesses::at(&[1.0])),
            Err(FitError::InsufficientData { points: 3, parameters: 3 })
        ));
    }

    #[test]
    fn zero_width_guess_fails() {
        let x = axis(10);
        let guesses = PeakGuesses::at(&[5.0]).with_std(InitialGuess::Scalar(0.0));
        assert!(matches!(
            fit_peaks(&x, &x, &guesses),
            Err(FitError::Domain(DomainError::InvalidStd(_)))
        ));
    }

    #[test]
    fn recovers_single_peak() {
        let x = axis(40);
        let y = sum_of_gaussians(&x, &[0.8, 20.3, 2.5]).unwrap();

        let fit = fit_peaks(&x, &y, &PeakGuesses::at(&[19.0])).unwrap();
        let peak = fit.peaks().unwrap()[0];
        assert!(close(peak.amplitude, 0.8, 1e-6), "{peak:?}");
        assert!(close(peak.mean, 20.3, 1e-6), "{peak:?}");
        assert!(close(peak.std.abs(), 2.5, 1e-6), "{peak:?}");
        assert_eq!(fit.covariance.shape(), (3, 3));
    }

    #[test]
    fn recovers_two_separated_peaks() {
        let x = axis(120);
        let truth = [1.0, 30.0, 3.0, 0.4, 85.0, 5.0];
        let y = sum_of_gaussians(&x, &truth).unwrap();

        let guesses = PeakGuesses::at(&[28.0, 88.0]).with_std(InitialGuess::Scalar(3.0));
        let fit = fit_peaks(&x, &y, &guesses).unwrap();
        let peaks = fit.peaks().unwrap();

        assert!(close(peaks[0].mean, 30.0, 1e-5));
        assert!(close(peaks[1].mean, 85.0, 1e-5));
        assert!(close(peaks[1].amplitude, 0.4, 1e-5));
        assert_eq!(fit.covariance.shape(), (6, 6));
    }

    #[test]
    fn noisy_peak_has_positive_variances() {
        let x = axis(60);
        let mut y = sum_of_gaussians(&x, &[1.0, 25.0, 4.0]).unwrap();
        for (i, v) in y.iter_mut().enumerate() {
            *v += if i % 2 == 0 { 0.01 } else { -0.01 };
        }

        let fit = fit_peaks(&x, &y, &PeakGuesses::at(&[24.0])).unwrap();
        assert!(close(fit.params[1], 25.0, 0.05));
        assert!(fit.std_errors().iter().all(|e| e.is_finite() && *e > 0.0));
    }

    #[test]
    fn narrow_spike_fits_and_calibrates() {
        let x = axis(5);
        let y = [0.0, 0.0, 1.0, 0.0, 0.0];

        let fit = fit_peaks(&x, &y, &PeakGuesses::at(&[2.0])).unwrap();
        let peak = fit.peaks().unwrap()[0];
        assert!(close(peak.mean, 2.0, 1e-6), "{peak:?}");
        assert!(close(peak.amplitude, 1.0, 1e-6), "{peak:?}");

        let cal = crate::analysis::calibration::calibrate_two_peaks(&[peak.mean, 6.0], &[10.0, 30.0]).unwrap();
        assert!(close(cal.dispersion, 5.0, 1e-5), "{cal:?}");
        assert!(close(cal.offset, 0.0, 1e-5), "{cal:?}");
    }

    #[test]
    fn rms_of_identical_curves_is_zero() {
        assert_eq!(rms_error(&[1.0, 2.0], &[1.0, 2.0]).unwrap(), 0.0);
        assert!(close(rms_error(&[0.0, 0.0], &[3.0, 4.0]).unwrap(), 12.5f64.sqrt(), 1e-12));
        assert!(rms_error(&[1.0], &[]).is_err());
    }
}
