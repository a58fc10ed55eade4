//! Per-pixel flux time series.
//!
//! [`lambda_lightcurve`] turns one detector pixel into a noisy flux sequence,
//! one value per frame of the exposure. Pixels far from the trace or bluer
//! than the stellar spectrum are pure background; everything else follows the
//! stellar spectrum at the pixel's wavelength, optionally dimmed by a transit,
//! then converted to counts by the spectral response and PSF weight.
//!
//! The function has no hidden state. All randomness comes from the generator
//! passed in, and the transit parameters are taken by value so parallel
//! callers never share them.

use rand::Rng;
use shared::image_proc::normal_sample;
use thiserror::Error;

use crate::psf::CrossDispersionPsf;
use crate::spectrum::{PlanetSpectrum, StellarSpectrum};
use crate::transit::{LightCurveModel, LimbDarkeningLaw, TransitError, TransitParams};

/// Why a single pixel could not be evaluated.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PixelError {
    #[error("spectral response {0} cannot convert flux to counts")]
    InvalidResponse(f64),

    #[error("stellar flux {0} is negative or not finite")]
    InvalidFlux(f64),

    #[error("transit model returned {got} samples for {expected} frames")]
    ModelOutput { expected: usize, got: usize },

    #[error("transit model failed: {0}")]
    Transit(#[from] TransitError),
}

/// Everything known about one pixel of one order.
#[derive(Debug, Clone, Copy)]
pub struct PixelSample<'a> {
    /// Wavelength in microns, zero if the order does not cover this pixel
    pub wavelength: f64,
    /// Spectral response at `wavelength`, flux units per count
    pub response: f64,
    /// Distance to the trace centre in pixels
    pub distance: f64,
    /// Limb darkening coefficients at `wavelength`
    pub ld_coeffs: &'a [f64],
}

/// Inputs shared by every pixel of an exposure.
#[derive(Debug, Clone, Copy)]
pub struct LightCurveInputs<'a> {
    pub star: &'a StellarSpectrum,
    pub planet: Option<&'a PlanetSpectrum>,
    pub time: &'a [f64],
    pub ld_profile: LimbDarkeningLaw,
    /// Half width of the illuminated trace, pixels
    pub trace_radius: f64,
    pub snr: f64,
    /// Mean count level of unilluminated pixels
    pub floor: f64,
    pub psf: &'a CrossDispersionPsf,
}

impl LightCurveInputs<'_> {
    /// Whether a pixel lies outside the illuminated region of its order.
    pub fn is_background(&self, pixel: &PixelSample<'_>) -> bool {
        pixel.distance > self.trace_radius + self.psf.extend() as f64
            || pixel.wavelength < self.star.min_wavelength()
    }
}

/// `n` samples of unilluminated detector, `|N(floor, 1)|`.
pub fn background_noise<R: Rng + ?Sized>(n: usize, floor: f64, rng: &mut R) -> Vec<f64> {
    (0..n).map(|_| normal_sample(floor, 1.0, rng).abs()).collect()
}

/// Simulate the flux of one pixel at every time of `inputs.time`.
///
/// `params` is overwritten with this pixel's limb darkening law, coefficients
/// and radius ratio before the transit model is evaluated.
pub fn lambda_lightcurve<M, R>(
    pixel: &PixelSample<'_>,
    inputs: &LightCurveInputs<'_>,
    mut params: TransitParams,
    model: &M,
    rng: &mut R,
) -> Result<Vec<f64>, PixelError>
where
    M: LightCurveModel + ?Sized,
    R: Rng + ?Sized,
{
    let n = inputs.time.len();

    if inputs.is_background(pixel) {
        return Ok(background_noise(n, inputs.floor, rng));
    }

    let baseline = inputs.star.flux_at(pixel.wavelength);
    if !(baseline.is_finite() && baseline >= 0.0) {
        return Err(PixelError::InvalidFlux(baseline));
    }
    if !(pixel.response.is_finite() && pixel.response != 0.0) {
        return Err(PixelError::InvalidResponse(pixel.response));
    }

    let sigma = baseline / inputs.snr;
    let mut flux: Vec<f64> = (0..n)
        .map(|_| normal_sample(baseline, sigma, rng).abs())
        .collect();

    if let Some(planet) = inputs.planet {
        params.limb_dark = inputs.ld_profile;
        params.u = pixel.ld_coeffs.to_vec();
        params.rp = planet.radius_ratio_at(pixel.wavelength);

        let transit = model.light_curve(&params, inputs.time)?;
        if transit.len() != n {
            return Err(PixelError::ModelOutput {
                expected: n,
                got: transit.len(),
            });
        }
        flux.iter_mut().zip(&transit).for_each(|(f, t)| *f *= t);
    }

    let scale = inputs.psf.weight(pixel.distance) / pixel.response;
    for f in flux.iter_mut() {
        *f *= scale;
        if *f < inputs.floor {
            *f = normal_sample(inputs.floor, 1.0, rng);
        }
    }

    Ok(flux)
}
