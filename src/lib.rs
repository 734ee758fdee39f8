//! Exploratory analysis of pressure-clamp electrophysiology recordings.
//!
//! The pipeline: parse a HEKA ascii sweep export into a sweep-indexed table,
//! baseline-subtract each sweep against a reference window, reduce sweeps to
//! dose-response points, fit a Boltzmann sigmoid, and decompose
//! current-amplitude histograms into Gaussian mixtures. Rendering helpers in
//! [`plot`] turn the resulting tables into PNGs.

pub mod baseline;
pub mod error;
pub mod fit;
pub mod histogram;
pub mod parse;
pub mod plot;
pub mod recording;
pub mod summary;

pub use error::AnalysisError;
pub use fit::{
    decompose, fit_dose_response, initial_guesses, FitOptions, GaussComponent, MixtureFit,
    SigmoidFit,
};
pub use histogram::{density_histogram, freedman_diaconis_bins, DensityHistogram};
pub use parse::{load_file, parse_str};
pub use recording::{Recording, SweepView, TimeWindow};
pub use summary::{summarize, SummaryOptions, SummaryStat, SweepSummary};
