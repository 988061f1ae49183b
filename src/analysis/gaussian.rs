use serde::{Deserialize, Serialize};

use crate::error::DomainError;

// ---------------------------------------------------------------------------
// Peak – one gaussian triple
// ---------------------------------------------------------------------------

/// A single gaussian line `amplitude · exp(−(x−mean)² / (2·std²))`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Peak {
    pub amplitude: f64,
    pub mean: f64,
    pub std: f64,
}

impl Peak {
    /// Build a peak, rejecting a zero or non-finite width.
    pub fn new(amplitude: f64, mean: f64, std: f64) -> Result<Self, DomainError> {
        check_std(std)?;
        Ok(Self {
            amplitude,
            mean,
            std,
        })
    }

    #[inline]
    pub fn value_at(&self, x: f64) -> f64 {
        let d = x - self.mean;
        self.amplitude * (-(d * d) / (2.0 * self.std * self.std)).exp()
    }

    pub fn evaluate(&self, x: &[f64]) -> Vec<f64> {
        x.iter().map(|&xi| self.value_at(xi)).collect()
    }

    /// Back to the flat `[amp, mu, std]` layout used by the fitter.
    pub fn to_triple(self) -> [f64; 3] {
        [self.amplitude, self.mean, self.std]
    }
}

/// Split a flat `[amp1, mu1, std1, amp2, …]` sequence into peaks.
pub fn peaks_from_params(params: &[f64]) -> Result<Vec<Peak>, DomainError> {
    if params.len() % 3 != 0 {
        return Err(DomainError::ParamCount(params.len()));
    }
    params
        .chunks_exact(3)
        .map(|t| Peak::new(t[0], t[1], t[2]))
        .collect()
}

/// Gaussian evaluated element-wise over `x`.
pub fn gaussian(x: &[f64], amplitude: f64, mean: f64, std: f64) -> Result<Vec<f64>, DomainError> {
    Ok(Peak::new(amplitude, mean, std)?.evaluate(x))
}

/// Element-wise sum of one gaussian per parameter triple.
pub fn sum_of_gaussians(x: &[f64], params: &[f64]) -> Result<Vec<f64>, DomainError> {
    let peaks = peaks_from_params(params)?;
    Ok(x.iter()
        .map(|&xi| peaks.iter().map(|p| p.value_at(xi)).sum())
        .collect())
}

// Negative widths are accepted: the model only sees std².
fn check_std(std: f64) -> Result<(), DomainError> {
    if std == 0.0 || !std.is_finite() {
        return Err(DomainError::InvalidStd(std));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peak_value_at_mean_is_amplitude() {
        let y = gaussian(&[3.5], 0.42, 3.5, 1.7).unwrap();
        assert!((y[0] - 0.42).abs() < 1e-15);
    }

    #[test]
    fn value_one_sigma_away() {
        let y = gaussian(&[1.0, 3.0], 2.0, 2.0, 1.0).unwrap();
        let expected = 2.0 * (-0.5f64).exp();
        assert!((y[0] - expected).abs() < 1e-12);
        assert!((y[1] - expected).abs() < 1e-12);
    }

    #[test]
    fn zero_width_is_rejected() {
        assert_eq!(
            gaussian(&[0.0], 1.0, 0.0, 0.0),
            Err(DomainError::InvalidStd(0.0))
        );
        assert!(gaussian(&[0.0], 1.0, 0.0, f64::NAN).is_err());
    }

    #[test]
    fn single_triple_sum_matches_gaussian() {
        let x: Vec<f64> = (0..50).map(|i| i as f64 * 0.3).collect();
        let single = gaussian(&x, 0.8, 7.2, 1.3).unwrap();
        let summed = sum_of_gaussians(&x, &[0.8, 7.2, 1.3]).unwrap();
        assert_eq!(single, summed);
    }

    #[test]
    fn sum_adds_components() {
        let x = [0.0, 5.0, 10.0];
        let y = sum_of_gaussians(&x, &[1.0, 0.0, 1.0, 0.5, 10.0, 2.0]).unwrap();
        let a = gaussian(&x, 1.0, 0.0, 1.0).unwrap();
        let b = gaussian(&x, 0.5, 10.0, 2.0).unwrap();
        for i in 0..3 {
            assert!((y[i] - (a[i] + b[i])).abs() < 1e-15);
        }
    }

    #[test]
    fn params_must_come_in_triples() {
        assert_eq!(
            sum_of_gaussians(&[1.0], &[1.0, 2.0]),
            Err(DomainError::ParamCount(2))
        );
        assert_eq!(peaks_from_params(&[]).unwrap(), Vec::<Peak>::new());
    }
}
