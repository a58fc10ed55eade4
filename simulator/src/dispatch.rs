//! Fan the per-pixel light-curve generator out over a worker pool.
//!
//! Every pixel of an order is evaluated independently on a dedicated rayon
//! pool. Each evaluation gets its own clone of the transit parameters and its
//! own random generator; results are collected in pixel order and reshaped to
//! a `[frames, rows, cols]` cube.

use std::time::Instant;

use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info, warn};
use ndarray::{Array2, Array3, ArrayView2, ArrayView3, Zip};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use shared::image_proc::seeded_rng;

use crate::error::{SimError, SimResult};
use crate::lightcurve::{
    background_noise, lambda_lightcurve, LightCurveInputs, PixelError, PixelSample,
};
use crate::spectrum::SpectralResponse;
use crate::transit::{LightCurveModel, TransitParams};

/// Default size of the light-curve worker pool.
pub const DEFAULT_WORKERS: usize = 8;

/// What to do with a pixel whose light curve could not be evaluated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Fail the whole order with [`SimError::WorkerEvaluation`].
    #[default]
    Propagate,
    /// Fill the pixel with background noise and record it in
    /// [`OrderResult::failures`].
    SubstituteNoiseFloor,
}

/// A pixel that failed evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelFailure {
    /// Flattened row-major pixel index
    pub pixel: usize,
    pub reason: PixelError,
}

/// Cube of one order plus any pixels that were substituted.
#[derive(Debug, Clone)]
pub struct OrderResult {
    pub order: usize,
    pub cube: Array3<f64>,
    pub failures: Vec<PixelFailure>,
}

/// Worker pool settings.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchOptions {
    pub workers: usize,
    pub policy: FailurePolicy,
    /// Base seed for per-pixel generators. `None` draws fresh entropy per pixel.
    pub seed: Option<u64>,
    pub show_progress: bool,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            policy: FailurePolicy::default(),
            seed: None,
            show_progress: false,
        }
    }
}

/// Flattened per-pixel inputs of one order.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelBatch {
    nrows: usize,
    ncols: usize,
    wavelength: Vec<f64>,
    response: Vec<f64>,
    distance: Vec<f64>,
    /// Row-major `[pixel, coefficient]`
    ld_coeffs: Vec<f64>,
    ncoef: usize,
}

impl PixelBatch {
    /// Build from already flattened arrays; every array must hold
    /// `nrows × ncols` entries.
    pub fn new(
        (nrows, ncols): (usize, usize),
        wavelength: Vec<f64>,
        response: Vec<f64>,
        distance: Vec<f64>,
        ld_coeffs: Array2<f64>,
    ) -> SimResult<Self> {
        let npix = nrows * ncols;
        for (context, len) in [
            ("pixel wavelengths", wavelength.len()),
            ("pixel responses", response.len()),
            ("pixel distances", distance.len()),
            ("pixel limb darkening coefficients", ld_coeffs.nrows()),
        ] {
            if len != npix {
                return Err(SimError::shape(context, &[npix], &[len]));
            }
        }
        let ncoef = ld_coeffs.ncols();
        // Logical order, whatever the memory layout of the input
        let ld_coeffs = ld_coeffs.iter().copied().collect();
        Ok(Self {
            nrows,
            ncols,
            wavelength,
            response,
            distance,
            ld_coeffs,
            ncoef,
        })
    }

    /// Flatten per-order maps.
    ///
    /// `ld_coeffs` is `[rows, cols, coefficient]`. The pixel response is the
    /// order's response at the pixel wavelength divided by `divisor`.
    pub fn from_maps(
        wavelength: ArrayView2<f64>,
        distance: ArrayView2<f64>,
        ld_coeffs: ArrayView3<f64>,
        response: &SpectralResponse,
        divisor: f64,
    ) -> SimResult<Self> {
        let (nrows, ncols) = wavelength.dim();
        if distance.dim() != (nrows, ncols) {
            let (fr, fc) = distance.dim();
            return Err(SimError::shape("distance map", &[nrows, ncols], &[fr, fc]));
        }
        let (lr, lc, ncoef) = ld_coeffs.dim();
        if (lr, lc) != (nrows, ncols) {
            return Err(SimError::shape(
                "limb darkening coefficient map",
                &[nrows, ncols, ncoef],
                &[lr, lc, ncoef],
            ));
        }

        let wave: Vec<f64> = wavelength.iter().copied().collect();
        let resp = response.sample(&wave, divisor);
        let ld = Array2::from_shape_vec((nrows * ncols, ncoef), ld_coeffs.iter().copied().collect())
            .map_err(|e| SimError::Configuration(format!("limb darkening reshape: {e}")))?;

        Self::new(
            (nrows, ncols),
            wave,
            resp,
            distance.iter().copied().collect(),
            ld,
        )
    }

    pub fn dim(&self) -> (usize, usize) {
        (self.nrows, self.ncols)
    }

    pub fn len(&self) -> usize {
        self.wavelength.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wavelength.is_empty()
    }

    pub fn pixel(&self, idx: usize) -> PixelSample<'_> {
        PixelSample {
            wavelength: self.wavelength[idx],
            response: self.response[idx],
            distance: self.distance[idx],
            ld_coeffs: &self.ld_coeffs[idx * self.ncoef..(idx + 1) * self.ncoef],
        }
    }
}

fn progress_bar(len: usize, order: usize) -> ProgressBar {
    let pb = ProgressBar::new(len as u64);
    let style = ProgressStyle::default_bar()
        .template("{msg} [{bar:40.cyan/blue}] {pos}/{len} ({per_sec}) ETA: {eta}")
        .map(|s| s.progress_chars("█▉▊▋▌▍▎▏ "))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    pb.set_style(style);
    pb.set_message(format!("Order {order}"));
    pb
}

/// Simulate every pixel of one order.
///
/// Pixels are processed on a pool of `options.workers` threads. The returned
/// cube is `[frames, rows, cols]` with frames following `inputs.time`.
pub fn simulate_order<M: LightCurveModel + ?Sized>(
    order: usize,
    batch: &PixelBatch,
    inputs: &LightCurveInputs<'_>,
    params: &TransitParams,
    model: &M,
    options: &DispatchOptions,
) -> SimResult<OrderResult> {
    let npix = batch.len();
    let nframes = inputs.time.len();
    let (nrows, ncols) = batch.dim();

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(options.workers.max(1))
        .build()
        .map_err(|e| SimError::Configuration(format!("failed to build worker pool: {e}")))?;

    info!(
        "Simulating order {order}: {npix} pixels x {nframes} frames on {} workers",
        options.workers.max(1)
    );
    let start = Instant::now();
    let progress = options.show_progress.then(|| progress_bar(npix, order));

    let results: Vec<Result<Vec<f64>, PixelError>> = pool.install(|| {
        (0..npix)
            .into_par_iter()
            .map(|idx| {
                let mut rng = seeded_rng(options.seed.map(|s| s.wrapping_add(idx as u64)));
                let result =
                    lambda_lightcurve(&batch.pixel(idx), inputs, params.clone(), model, &mut rng);
                if let Some(pb) = &progress {
                    pb.inc(1);
                }
                result
            })
            .collect()
    });

    if let Some(pb) = progress {
        pb.finish_with_message(format!("Order {order} done"));
    }

    let mut cube = Array3::<f64>::zeros((nframes, nrows, ncols));
    let mut failures = Vec::new();
    for (idx, result) in results.into_iter().enumerate() {
        let series = match result {
            Ok(series) => series,
            Err(reason) => {
                failures.push(PixelFailure { pixel: idx, reason });
                match options.policy {
                    FailurePolicy::Propagate => continue,
                    FailurePolicy::SubstituteNoiseFloor => {
                        let mut rng = seeded_rng(options.seed.map(|s| s.wrapping_add(idx as u64)));
                        background_noise(nframes, inputs.floor, &mut rng)
                    }
                }
            }
        };
        let (row, col) = (idx / ncols, idx % ncols);
        for (frame, value) in series.into_iter().enumerate() {
            cube[[frame, row, col]] = value;
        }
    }

    if let Some(first) = failures.first() {
        match options.policy {
            FailurePolicy::Propagate => {
                return Err(SimError::WorkerEvaluation {
                    order,
                    failed: failures.len(),
                    first_pixel: first.pixel,
                    first_reason: first.reason.to_string(),
                });
            }
            FailurePolicy::SubstituteNoiseFloor => warn!(
                "Order {order}: {} pixel(s) substituted with background noise, first at {}: {}",
                failures.len(),
                first.pixel,
                first.reason
            ),
        }
    }

    info!(
        "Order {order} finished in {:.2} s",
        start.elapsed().as_secs_f64()
    );
    Ok(OrderResult {
        order,
        cube,
        failures,
    })
}

/// Add an order's cube onto the exposure cube.
///
/// Orders overlap on the detector, so the running sum is made non-negative
/// with an absolute value after each addition.
pub fn combine_orders(total: &mut Array3<f64>, order_cube: &Array3<f64>) -> SimResult<()> {
    if total.dim() != order_cube.dim() {
        return Err(SimError::shape(
            "order cube",
            total.shape(),
            order_cube.shape(),
        ));
    }
    debug!("Combining order cube of shape {:?}", order_cube.shape());
    Zip::from(total)
        .and(order_cube)
        .par_for_each(|t, &o| *t = (*t + o).abs());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::psf::CrossDispersionPsf;
    use crate::spectrum::{PlanetSpectrum, StellarSpectrum};
    use crate::transit::{LimbDarkeningLaw, NumericalTransitModel, TransitError};
    use ndarray::ShapeBuilder;

    struct Scene {
        star: StellarSpectrum,
        planet: PlanetSpectrum,
        psf: CrossDispersionPsf,
        time: Vec<f64>,
    }

    impl Scene {
        fn new() -> Self {
            Self {
                star: StellarSpectrum::new(vec![0.8, 3.0], vec![500.0, 500.0]).unwrap(),
                planet: PlanetSpectrum::flat(0.5, 3.0, 0.01).unwrap(),
                psf: CrossDispersionPsf::new(5, &mut seeded_rng(Some(1))),
                time: (0..6).map(|k| -0.05 + 0.02 * k as f64).collect(),
            }
        }

        fn inputs(&self) -> LightCurveInputs<'_> {
            LightCurveInputs {
                star: &self.star,
                planet: Some(&self.planet),
                time: &self.time,
                ld_profile: LimbDarkeningLaw::Quadratic,
                trace_radius: 1.0,
                snr: 700.0,
                floor: 2.0,
                psf: &self.psf,
            }
        }
    }

    /// 4 x 5 window with a horizontal trace on row 1.
    fn batch(ld: Array2<f64>) -> PixelBatch {
        let (rows, cols) = (4, 5);
        let distance: Vec<f64> = (0..rows * cols)
            .map(|i| ((i / cols) as f64 - 1.0).abs() * 7.0)
            .collect();
        PixelBatch::new(
            (rows, cols),
            vec![1.2; rows * cols],
            vec![1.0; rows * cols],
            distance,
            ld,
        )
        .unwrap()
    }

    fn params() -> TransitParams {
        TransitParams::circular(0.0, 3.0, 0.1, 10.0, 90.0)
    }

    fn options(seed: u64, policy: FailurePolicy) -> DispatchOptions {
        DispatchOptions {
            workers: 3,
            policy,
            seed: Some(seed),
            show_progress: false,
        }
    }

    #[test]
    fn test_cube_layout_and_pixel_order() {
        let scene = Scene::new();
        let model = NumericalTransitModel::default();
        let result = simulate_order(
            1,
            &batch(Array2::from_elem((20, 2), 0.2)),
            &scene.inputs(),
            &params(),
            &model,
            &options(9, FailurePolicy::Propagate),
        )
        .unwrap();

        assert_eq!(result.cube.dim(), (6, 4, 5));
        assert!(result.failures.is_empty());

        // Row 1 is on the trace and far brighter than the background rows
        for frame in 0..6 {
            for col in 0..5 {
                assert!(result.cube[[frame, 1, col]] > 5.0);
                assert!(result.cube[[frame, 3, col]] < 8.0);
            }
        }
    }

    #[test]
    fn test_seeded_dispatch_is_reproducible_across_pool_sizes() {
        let scene = Scene::new();
        let model = NumericalTransitModel::default();
        let b = batch(Array2::from_elem((20, 2), 0.2));
        let seeded = options(4, FailurePolicy::Propagate);
        let a = simulate_order(1, &b, &scene.inputs(), &params(), &model, &seeded).unwrap();

        let single = DispatchOptions {
            workers: 1,
            ..seeded
        };
        let c = simulate_order(1, &b, &scene.inputs(), &params(), &model, &single).unwrap();
        assert_eq!(a.cube, c.cube);
    }

    #[test]
    fn test_failures_propagate_by_default() {
        let scene = Scene::new();
        // Quadratic law needs two coefficients
        let b = batch(Array2::from_elem((20, 1), 0.2));
        let err = simulate_order(
            2,
            &b,
            &scene.inputs(),
            &params(),
            &NumericalTransitModel::default(),
            &options(1, FailurePolicy::Propagate),
        )
        .unwrap_err();

        match err {
            SimError::WorkerEvaluation {
                order,
                failed,
                first_pixel,
                ..
            } => {
                assert_eq!(order, 2);
                // Only the five trace pixels reach the transit model
                assert_eq!(failed, 5);
                assert_eq!(first_pixel, 5);
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn test_failures_can_be_substituted() {
        let scene = Scene::new();
        let b = batch(Array2::from_elem((20, 1), 0.2));
        let result = simulate_order(
            1,
            &b,
            &scene.inputs(),
            &params(),
            &NumericalTransitModel::default(),
            &options(1, FailurePolicy::SubstituteNoiseFloor),
        )
        .unwrap();

        assert_eq!(result.failures.len(), 5);
        assert!(matches!(
            result.failures[0].reason,
            PixelError::Transit(TransitError::CoefficientCount { .. })
        ));
        // Substituted pixels look like background
        for frame in 0..6 {
            assert!(result.cube[[frame, 1, 2]] < 8.0);
        }
    }

    #[test]
    fn test_column_major_coefficients_reach_every_pixel() {
        let standard = Array2::from_shape_fn((20, 2), |(i, k)| 0.1 + 0.01 * i as f64 + 0.2 * k as f64);
        let mut fortran = Array2::<f64>::zeros((20, 2).f());
        fortran.assign(&standard);
        assert!(!fortran.is_standard_layout());

        let b = batch(fortran);
        for idx in [0, 7, 19] {
            assert_eq!(b.pixel(idx).ld_coeffs, standard.row(idx).to_vec().as_slice());
        }

        let scene = Scene::new();
        let result = simulate_order(
            1,
            &b,
            &scene.inputs(),
            &params(),
            &NumericalTransitModel::default(),
            &options(3, FailurePolicy::Propagate),
        )
        .unwrap();
        assert!(result.failures.is_empty());
        assert_eq!(
            result.cube,
            simulate_order(
                1,
                &batch(standard),
                &scene.inputs(),
                &params(),
                &NumericalTransitModel::default(),
                &options(3, FailurePolicy::Propagate),
            )
            .unwrap()
            .cube
        );
    }

    #[test]
    fn test_batch_length_checks() {
        assert!(matches!(
            PixelBatch::new((2, 2), vec![1.0; 4], vec![1.0; 3], vec![0.0; 4], Array2::zeros((4, 2))),
            Err(SimError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_batch_from_maps_flattens_row_major() {
        let wave = Array2::from_shape_fn((2, 3), |(r, c)| 1.0 + r as f64 + 0.1 * c as f64);
        let dist = Array2::from_shape_fn((2, 3), |(r, c)| (r * 3 + c) as f64);
        let ld = Array3::from_shape_fn((2, 3, 2), |(r, c, k)| (r * 3 + c) as f64 + 0.5 * k as f64);
        let response = SpectralResponse::new(vec![0.5, 3.0], vec![2.0, 2.0]).unwrap();

        let b = PixelBatch::from_maps(wave.view(), dist.view(), ld.view(), &response, 4.0).unwrap();
        assert_eq!(b.len(), 6);
        let p = b.pixel(4);
        assert_eq!(p.distance, 4.0);
        assert!((p.wavelength - 2.1).abs() < 1e-12);
        assert_eq!(p.response, 0.5);
        assert_eq!(p.ld_coeffs, &[4.0, 4.5]);

        let bad = Array2::zeros((3, 3));
        assert!(PixelBatch::from_maps(wave.view(), bad.view(), ld.view(), &response, 1.0).is_err());
    }

    #[test]
    fn test_combine_orders_takes_absolute_sum() {
        let mut total = Array3::from_elem((2, 2, 2), 1.0);
        let order = Array3::from_elem((2, 2, 2), -3.0);
        combine_orders(&mut total, &order).unwrap();
        assert!(total.iter().all(|&v| v == 2.0));

        let wrong = Array3::zeros((1, 2, 2));
        assert!(matches!(
            combine_orders(&mut total, &wrong),
            Err(SimError::ShapeMismatch { .. })
        ));
    }
}
