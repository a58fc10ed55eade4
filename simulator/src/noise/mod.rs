//! Detector noise ramps.
//!
//! A [`CorrelatedNoiseSource`] produces one integration of correlated detector
//! noise in detector coordinates. [`make_exposure`] drives it integration by
//! integration, reorients the result to science coordinates and adds
//! accumulated dark current.

pub mod hxrg;
pub mod ramp;

use ndarray::Array3;
use serde::{Deserialize, Serialize};

use crate::error::SimResult;

pub use hxrg::HxrgNoise;
pub use ramp::{add_dark_current, make_exposure};

/// Size of one generated integration in detector coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoiseDims {
    /// Fast readout axis
    pub naxis1: usize,
    /// Slow readout axis
    pub naxis2: usize,
    /// Groups
    pub naxis3: usize,
}

/// Amplitudes of every noise component, in electrons unless noted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoiseParams {
    /// Frame-to-frame pedestal drift
    pub pedestal: f64,
    /// Correlated 1/f noise shared by all outputs
    pub c_pink: f64,
    /// Uncorrelated 1/f noise per output
    pub u_pink: f64,
    /// Alternating column noise
    pub acn: f64,
    /// Amplitude of the bias pattern
    pub bias_amp: f64,
    /// Constant bias level
    pub bias_offset: f64,
    /// Amplitude of the PCA-0 (kTC) pattern
    pub pca0_amp: f64,
    /// White read noise
    pub rd_noise: f64,
    /// Dark current per frame
    pub dark_current: f64,
    /// Electrons per count; the generated ramp is divided by it
    pub gain: f64,
}

impl Default for NoiseParams {
    fn default() -> Self {
        Self {
            pedestal: 18.30,
            c_pink: 9.6,
            u_pink: 3.2,
            acn: 2.0,
            bias_amp: 0.0,
            bias_offset: 0.0,
            pca0_amp: 0.0,
            rd_noise: 12.95,
            dark_current: 0.0,
            gain: 1.0,
        }
    }
}

impl NoiseParams {
    /// All components off.
    pub fn quiet() -> Self {
        Self {
            pedestal: 0.0,
            c_pink: 0.0,
            u_pink: 0.0,
            acn: 0.0,
            rd_noise: 0.0,
            ..Self::default()
        }
    }
}

/// Generator of correlated detector noise.
pub trait CorrelatedNoiseSource {
    /// One integration of noise, `[naxis3, naxis2, naxis1]`.
    ///
    /// `noise_seed` drives every stochastic component except dark current,
    /// which is drawn from `dc_seed`.
    fn make_noise(
        &self,
        dims: NoiseDims,
        params: &NoiseParams,
        noise_seed: u64,
        dc_seed: u64,
    ) -> SimResult<Array3<f32>>;
}
