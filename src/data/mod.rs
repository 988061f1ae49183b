/// Data layer: reading exports, the spectrum record, and persistence.
///
/// Architecture:
/// ```text
///  .mca / .emsa / .txt
///        │
///        ▼
///   ┌──────────┐
///   │  reader   │  markers + layout → RawData
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  model    │  Spectrum: counts, intensity, calibration, fit
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  store    │  flat JSON record, CSV export
///   └──────────┘
/// ```

pub mod model;
pub mod reader;
pub mod store;
