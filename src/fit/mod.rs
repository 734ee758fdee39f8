pub mod gaussian;
pub mod leastsq;
pub mod sigmoid;

pub use gaussian::{decompose, initial_guesses, mixture, GaussComponent, MixtureFit};
pub use leastsq::{curve_fit, leastsq, FitOptions, FitSolution};
pub use sigmoid::{fit_dose_response, fit_dose_response_from, sigmoid, SigmoidFit};
