//! Time-series observation driver.
//!
//! [`Tso`] owns an exposure, the target description and the accumulating
//! `[frames, rows, cols]` cube. Orders are simulated one at a time and summed
//! into the cube; a dark ramp is added separately. State can be saved to and
//! restored from a versioned JSON snapshot.

use std::collections::HashSet;
use std::path::Path;

use log::{info, warn};
use ndarray::{Array2, Array3, ArrayView2, Axis, Zip};
use serde::{Deserialize, Serialize};
use shared::image_proc::seeded_rng;

use crate::config::SimulationConfig;
use crate::dispatch::{combine_orders, simulate_order, OrderResult, PixelBatch};
use crate::error::{SimError, SimResult};
use crate::exposure::Exposure;
use crate::lightcurve::LightCurveInputs;
use crate::noise::{make_exposure, CorrelatedNoiseSource};
use crate::psf::CrossDispersionPsf;
use crate::spectrum::{PlanetSpectrum, SpectralResponse, StellarSpectrum};
use crate::transit::{LightCurveModel, LimbDarkeningLaw, TransitParams};

/// Current [`TsoSnapshot`] layout.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Orders with calibrated maps.
pub const SUPPORTED_ORDERS: [usize; 2] = [1, 2];

/// Full-well depth used for saturation maps, counts.
pub const FULL_WELL: f64 = 65536.0;

/// Per-order detector maps.
#[derive(Debug, Clone)]
pub struct OrderMaps {
    pub order: usize,
    /// Wavelength of every pixel, microns
    pub wavelength: Array2<f64>,
    /// Distance of every pixel to the trace centre
    pub distance: Array2<f64>,
    /// Limb darkening coefficients, `[rows, cols, coefficient]`. Only needed
    /// with a planet.
    pub ld_coeffs: Option<Array3<f64>>,
    pub response: SpectralResponse,
}

/// Random seeds and detector constants for a dark ramp.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DarkRampSettings {
    pub gain: f64,
    pub noise_seed: Option<u64>,
    pub dark_seed: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct Tso {
    pub exposure: Exposure,
    pub star: StellarSpectrum,
    pub planet: Option<PlanetSpectrum>,
    pub params: TransitParams,
    pub ld_profile: LimbDarkeningLaw,
    pub config: SimulationConfig,
    psf: CrossDispersionPsf,
    tso: Array3<f64>,
}

impl Tso {
    pub fn new(
        exposure: Exposure,
        star: StellarSpectrum,
        planet: Option<PlanetSpectrum>,
        params: TransitParams,
        ld_profile: LimbDarkeningLaw,
        config: SimulationConfig,
    ) -> SimResult<Self> {
        exposure.validate()?;
        config.validate()?;
        let psf = CrossDispersionPsf::new(config.psf_extend, &mut seeded_rng(config.psf_seed));
        let tso = Array3::zeros(exposure.cube_shape());
        Ok(Self {
            exposure,
            star,
            planet,
            params,
            ld_profile,
            config,
            psf,
            tso,
        })
    }

    /// The accumulated exposure cube.
    pub fn cube(&self) -> &Array3<f64> {
        &self.tso
    }

    pub fn psf(&self) -> &CrossDispersionPsf {
        &self.psf
    }

    /// Simulate every order in `orders` and add it to the cube.
    ///
    /// Only orders 1 and 2 are accepted; a repeated order is simulated once.
    pub fn run_simulation<M: LightCurveModel + ?Sized>(
        &mut self,
        orders: &[OrderMaps],
        model: &M,
    ) -> SimResult<Vec<OrderResult>> {
        if let Some(bad) = orders.iter().find(|m| !SUPPORTED_ORDERS.contains(&m.order)) {
            return Err(SimError::Configuration(format!(
                "order {} is not supported, expected one of {SUPPORTED_ORDERS:?}",
                bad.order
            )));
        }

        let window = (self.exposure.nrows, self.exposure.ncols);
        let options = self.config.dispatch_options();
        let mut seen = HashSet::new();
        let mut results = Vec::with_capacity(orders.len());

        for maps in orders {
            if !seen.insert(maps.order) {
                warn!("Order {} given more than once, skipping repeat", maps.order);
                continue;
            }
            if maps.wavelength.dim() != window {
                let (r, c) = maps.wavelength.dim();
                return Err(SimError::shape(
                    "order wavelength map",
                    &[window.0, window.1],
                    &[r, c],
                ));
            }

            let ld_coeffs = match (&maps.ld_coeffs, &self.planet) {
                (Some(ld), _) => ld.clone(),
                (None, None) => {
                    Array3::zeros((window.0, window.1, self.ld_profile.coefficient_count()))
                }
                (None, Some(_)) => {
                    return Err(SimError::Configuration(format!(
                        "order {} needs limb darkening coefficients to model a transit",
                        maps.order
                    )))
                }
            };

            let batch = PixelBatch::from_maps(
                maps.wavelength.view(),
                maps.distance.view(),
                ld_coeffs.view(),
                &maps.response,
                self.config.response_divisor(maps.order),
            )?;

            let inputs = LightCurveInputs {
                star: &self.star,
                planet: self.planet.as_ref(),
                time: &self.exposure.time,
                ld_profile: self.ld_profile,
                trace_radius: self.config.trace_radius,
                snr: self.config.snr,
                floor: self.config.noise_floor,
                psf: &self.psf,
            };

            let result = simulate_order(maps.order, &batch, &inputs, &self.params, model, &options)?;
            combine_orders(&mut self.tso, &result.cube)?;
            results.push(result);
        }

        Ok(results)
    }

    /// Simulate a dark ramp matching this exposure.
    ///
    /// Returns `None` for an exposure without frames.
    pub fn simulate_dark_ramp<G: CorrelatedNoiseSource + ?Sized>(
        &self,
        generator: &G,
        darksignal: ArrayView2<f64>,
        settings: &DarkRampSettings,
    ) -> SimResult<Option<Array3<f32>>> {
        let window = (self.exposure.nrows, self.exposure.ncols);
        if darksignal.dim() != window {
            let (r, c) = darksignal.dim();
            return Err(SimError::shape("dark signal", &[window.0, window.1], &[r, c]));
        }
        make_exposure(
            self.exposure.nints,
            self.exposure.ngrps,
            darksignal,
            settings.gain,
            generator,
            &self.config.noise,
            settings.noise_seed,
            settings.dark_seed,
            self.config.pedestal_offset,
        )
    }

    /// Add a dark ramp to the cube.
    pub fn add_dark_ramp(&mut self, ramp: &Array3<f32>) -> SimResult<()> {
        if ramp.dim() != self.tso.dim() {
            return Err(SimError::shape("dark ramp", self.tso.shape(), ramp.shape()));
        }
        Zip::from(&mut self.tso)
            .and(ramp)
            .par_for_each(|t, &r| *t += r as f64);
        info!("Added dark ramp to {} frames", ramp.len_of(Axis(0)));
        Ok(())
    }

    /// Flux of one column summed over rows, per frame, normalised to its peak.
    pub fn column_light_curve(&self, col: usize) -> SimResult<Vec<f64>> {
        if col >= self.exposure.ncols {
            return Err(SimError::Configuration(format!(
                "column {col} outside 0..{}",
                self.exposure.ncols
            )));
        }
        let sums: Vec<f64> = self
            .tso
            .axis_iter(Axis(0))
            .map(|frame| frame.column(col).iter().filter(|v| !v.is_nan()).sum())
            .collect();
        let peak = sums.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        if peak.is_nan() || peak <= 0.0 {
            return Ok(sums);
        }
        Ok(sums.into_iter().map(|s| s / peak).collect())
    }

    /// Per-pixel signal-to-noise of one frame, `√counts`.
    pub fn snr_map(&self, frame: usize) -> SimResult<Array2<f64>> {
        Ok(self.frame(frame)?.mapv(|v| v.max(0.0).sqrt()))
    }

    /// Pixels of one frame above `percent` of full well.
    pub fn saturation_map(&self, frame: usize, percent: f64) -> SimResult<Array2<bool>> {
        let limit = percent / 100.0 * FULL_WELL;
        Ok(self.frame(frame)?.mapv(|v| v > limit))
    }

    fn frame(&self, frame: usize) -> SimResult<ArrayView2<'_, f64>> {
        let nframes = self.tso.len_of(Axis(0));
        if frame >= nframes {
            return Err(SimError::Configuration(format!(
                "frame {frame} outside 0..{nframes}"
            )));
        }
        Ok(self.tso.index_axis(Axis(0), frame))
    }

    pub fn snapshot(&self) -> TsoSnapshot {
        TsoSnapshot {
            schema_version: SNAPSHOT_VERSION,
            exposure: self.exposure.clone(),
            star: self.star.clone(),
            planet: self.planet.clone(),
            params: self.params.clone(),
            ld_profile: self.ld_profile,
            config: self.config.clone(),
            psf: self.psf.clone(),
            tso: self.tso.clone(),
        }
    }

    /// Rebuild from a snapshot after checking its version and shapes.
    pub fn from_snapshot(snapshot: TsoSnapshot) -> SimResult<Self> {
        snapshot.validate()?;
        let TsoSnapshot {
            exposure,
            star,
            planet,
            params,
            ld_profile,
            config,
            psf,
            tso,
            ..
        } = snapshot;
        Ok(Self {
            exposure,
            star,
            planet,
            params,
            ld_profile,
            config,
            psf,
            tso,
        })
    }

    pub fn save(&self, path: &Path) -> SimResult<()> {
        info!("Saving TSO to {}", path.display());
        std::fs::write(path, serde_json::to_string(&self.snapshot())?)?;
        Ok(())
    }

    pub fn load(path: &Path) -> SimResult<Self> {
        info!("Loading TSO from {}", path.display());
        let text = std::fs::read_to_string(path)?;
        Self::from_snapshot(serde_json::from_str(&text)?)
    }
}

/// Serialised state of a [`Tso`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TsoSnapshot {
    pub schema_version: u32,
    pub exposure: Exposure,
    pub star: StellarSpectrum,
    pub planet: Option<PlanetSpectrum>,
    pub params: TransitParams,
    pub ld_profile: LimbDarkeningLaw,
    pub config: SimulationConfig,
    pub psf: CrossDispersionPsf,
    pub tso: Array3<f64>,
}

impl TsoSnapshot {
    pub fn validate(&self) -> SimResult<()> {
        if self.schema_version != SNAPSHOT_VERSION {
            return Err(SimError::Configuration(format!(
                "unsupported snapshot version {}, expected {SNAPSHOT_VERSION}",
                self.schema_version
            )));
        }
        self.exposure.validate()?;
        self.config.validate()?;
        self.star.validate()?;
        if let Some(planet) = &self.planet {
            planet.validate()?;
        }
        self.psf.validate()?;
        let (f, r, c) = self.exposure.cube_shape();
        if self.tso.dim() != (f, r, c) {
            return Err(SimError::shape("snapshot cube", &[f, r, c], self.tso.shape()));
        }
        Ok(())
    }
}
