use statrs::distribution::{ContinuousCDF, Normal};

use crate::error::DomainError;

/// Half-width of the integration window, in standard deviations.
pub const AREA_WINDOW_SIGMAS: f64 = 3.0;

/// Area of a peak between `mean ± 3·std`, scaled by the peak height.
///
/// The normal CDF describes a unit-area curve, so the result is the covered
/// fraction (≈ 0.9973) times `amplitude`.
pub fn area_under_peak(mean: f64, std: f64, amplitude: f64) -> Result<f64, DomainError> {
    if !(std.is_finite() && std > 0.0) {
        return Err(DomainError::InvalidStd(std));
    }
    for (name, value) in [("mean", mean), ("amplitude", amplitude)] {
        if !value.is_finite() {
            return Err(DomainError::NonFinite { name, value });
        }
    }

    let normal = Normal::new(mean, std).map_err(|_| DomainError::InvalidStd(std))?;
    let half = AREA_WINDOW_SIGMAS * std;
    Ok(amplitude * (normal.cdf(mean + half) - normal.cdf(mean - half)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_peak_covers_three_sigma() {
        let area = area_under_peak(0.0, 1.0, 1.0).unwrap();
        assert!((area - 0.9973).abs() < 1e-4, "{area}");
    }

    #[test]
    fn area_scales_with_amplitude_not_position() {
        let a = area_under_peak(512.0, 4.0, 0.25).unwrap();
        let b = area_under_peak(-3.0, 0.1, 0.25).unwrap();
        assert!((a - b).abs() < 1e-9);
        assert!((a - 0.25 * 0.997_300_2).abs() < 1e-6);
    }

    #[test]
    fn non_positive_width_is_rejected() {
        assert_eq!(
            area_under_peak(1.0, 0.0, 1.0),
            Err(DomainError::InvalidStd(0.0))
        );
        assert_eq!(
            area_under_peak(1.0, -2.0, 1.0),
            Err(DomainError::InvalidStd(-2.0))
        );
    }

    #[test]
    fn non_finite_amplitude_is_rejected() {
        assert!(matches!(
            area_under_peak(1.0, 1.0, f64::INFINITY),
            Err(DomainError::NonFinite { name: "amplitude", .. })
        ));
    }
}
