//! Time-series exposure simulator for a slitless near-infrared spectrograph.
//!
//! The pipeline runs in stages:
//!
//! 1. [`trace`] maps every detector pixel to a wavelength and a distance from
//!    the spectral trace of each order.
//! 2. [`lightcurve::lambda_lightcurve`] produces the flux time series of one
//!    pixel, weighted by the [`psf`] and optionally dimmed by a [`transit`].
//! 3. [`dispatch`] evaluates all pixels of an order on a worker pool and
//!    [`tso::Tso`] sums the orders into an exposure cube.
//! 4. [`noise`] builds correlated dark ramps, [`compose::add_signal`] lays the
//!    Poisson-sampled science signal on top, and [`postprocess`] applies
//!    non-linearity and the pedestal.

pub mod compose;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod exposure;
pub mod lightcurve;
pub mod noise;
pub mod postprocess;
pub mod psf;
pub mod spectrum;
pub mod trace;
pub mod transit;
pub mod tso;

pub use compose::{add_signal, make_photon_yield, SignalOptions};
pub use config::SimulationConfig;
pub use dispatch::{simulate_order, DispatchOptions, FailurePolicy, OrderResult, PixelBatch};
pub use error::{SimError, SimResult};
pub use exposure::{get_frame_times, Exposure, Subarray};
pub use lightcurve::{lambda_lightcurve, LightCurveInputs, PixelError, PixelSample};
pub use noise::{make_exposure, CorrelatedNoiseSource, HxrgNoise, NoiseParams};
pub use postprocess::{add_pedestal, non_linearity};
pub use psf::CrossDispersionPsf;
pub use spectrum::{PlanetSpectrum, SpectralResponse, StellarSpectrum};
pub use transit::{LightCurveModel, LimbDarkeningLaw, NumericalTransitModel, TransitParams};
pub use tso::{DarkRampSettings, OrderMaps, Tso, TsoSnapshot};
