//! Progress reporting (ambient UX, driven by the `ProgressReporter`
//! port consumed by `turnloop_application`).

pub mod reporter;

pub use reporter::IndicatifProgressReporter;
