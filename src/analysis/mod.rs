/// Numerical layer: peak model, fitting, calibration and areas.
///
/// ```text
///   intensity + guessed centers
///        │
///        ▼
///   ┌──────────┐
///   │   fit     │  Levenberg–Marquardt on a sum of gaussians
///   └──────────┘
///        │  [amp, mu, std, …] + covariance
///        ▼
///   ┌─────────────┐      ┌──────────┐
///   │ calibration  │      │   area    │  ±3σ normal CDF
///   └─────────────┘      └──────────┘
/// ```

pub mod area;
pub mod calibration;
pub mod fit;
pub mod gaussian;
