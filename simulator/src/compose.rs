//! Combine science signal with a dark ramp.
//!
//! Science frames carry a count rate per frame. They are converted to
//! electrons, Poisson sampled together with the zodiacal background and
//! accumulated frame over frame, so the final ramp rises monotonically on top
//! of the dark ramp.

use log::debug;
use ndarray::{Array2, Array3, ArrayView2, ArrayView3, Axis, Zip};
use rand::Rng;
use serde::{Deserialize, Serialize};
use shared::image_proc::poisson_sample;

use crate::error::{SimError, SimResult};

/// Per-pixel photon yield averaged over the orders illuminating it.
///
/// Both inputs are `[order, rows, cols]`. Pixels with no signal in any order
/// get a yield of 1.
pub fn make_photon_yield(
    photon_yield: ArrayView3<f64>,
    orders: ArrayView3<f64>,
) -> SimResult<Array2<f64>> {
    if photon_yield.dim() != orders.dim() {
        return Err(SimError::shape(
            "photon yield",
            orders.shape(),
            photon_yield.shape(),
        ));
    }
    let (_, rows, cols) = orders.dim();
    let mut weighted = Array2::<f64>::zeros((rows, cols));
    let mut total = Array2::<f64>::zeros((rows, cols));
    for (py, order) in photon_yield.outer_iter().zip(orders.outer_iter()) {
        weighted += &(&py * &order);
        total += &order;
    }

    Ok(Zip::from(&weighted)
        .and(&total)
        .map_collect(|&w, &t| if t == 0.0 { 1.0 } else { w / t }))
}

/// Detector and background settings for [`add_signal`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalOptions {
    /// Seconds per frame
    pub frame_time: f64,
    /// Electrons per count
    pub gain: f64,
    /// Multiplier on the zodiacal background image
    pub zodi_scale: f64,
    /// Model extra electrons from photon yield explicitly
    pub photon_yield: bool,
    /// Restart accumulation every this many frames. `None` accumulates across
    /// the whole cube.
    pub groups_per_integration: Option<usize>,
}

impl Default for SignalOptions {
    fn default() -> Self {
        Self {
            frame_time: 5.491,
            gain: 1.61,
            zodi_scale: 1.0,
            photon_yield: false,
            groups_per_integration: None,
        }
    }
}

/// Add Poisson-sampled science signal and background to a dark ramp.
///
/// `signals` and `cube` are `[frames, rows, cols]` and must match exactly.
/// `pyimage` and `zodi` (electrons per second per pixel) are `[rows, cols]`.
///
/// # Panics
/// If any expected electron count is negative or not finite.
pub fn add_signal<R: Rng + ?Sized>(
    signals: ArrayView3<f64>,
    cube: ArrayView3<f32>,
    pyimage: ArrayView2<f64>,
    zodi: ArrayView2<f64>,
    options: &SignalOptions,
    rng: &mut R,
) -> SimResult<Array3<f64>> {
    if signals.dim() != cube.dim() {
        return Err(SimError::shape(
            "science signal vs dark ramp",
            cube.shape(),
            signals.shape(),
        ));
    }
    let (nframes, rows, cols) = cube.dim();
    for (context, (r, c)) in [
        ("photon yield image", pyimage.dim()),
        ("zodiacal background", zodi.dim()),
    ] {
        if (r, c) != (rows, cols) {
            return Err(SimError::shape(context, &[rows, cols], &[r, c]));
        }
    }
    if !(options.gain.is_finite() && options.gain > 0.0) {
        return Err(SimError::Configuration(format!(
            "detector gain must be positive, got {}",
            options.gain
        )));
    }
    debug!(
        "Adding signal to {nframes} frames, photon yield {}",
        options.photon_yield
    );

    let background = &zodi * (options.zodi_scale * options.frame_time);
    let electrons_per_count = options.gain * options.frame_time;

    let mut accumulated = Array3::<f64>::zeros((nframes, rows, cols));
    let mut running = Array2::<f64>::zeros((rows, cols));

    for (n, frame) in signals.axis_iter(Axis(0)).enumerate() {
        let mut new_values = Array2::<f64>::zeros((rows, cols));

        if options.photon_yield {
            Zip::from(&mut new_values)
                .and(&frame)
                .and(&pyimage)
                .and(&background)
                .for_each(|v, &s, &py, &bg| {
                    let detected = poisson_sample(s * electrons_per_count, rng);
                    let extra_rate = py - 1.0;
                    // n draws of Poisson(λ) sum to Poisson(nλ)
                    let extra = if extra_rate > 0.0 {
                        poisson_sample(detected * extra_rate, rng)
                    } else {
                        0.0
                    };
                    *v = detected + extra + poisson_sample(bg, rng);
                });
        } else {
            Zip::from(&mut new_values)
                .and(&frame)
                .and(&pyimage)
                .and(&background)
                .for_each(|v, &s, &py, &bg| {
                    *v = poisson_sample(s * electrons_per_count * py + bg, rng);
                });
        }

        let restart = match options.groups_per_integration {
            Some(g) if g > 0 => n % g == 0,
            _ => n == 0,
        };
        if restart {
            running.assign(&new_values);
        } else {
            running += &new_values;
        }
        accumulated.index_axis_mut(Axis(0), n).assign(&running);
    }

    let gain = options.gain;
    Ok(Zip::from(&cube)
        .and(&accumulated)
        .map_collect(|&c, &a| c as f64 + a / gain))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array3};
    use shared::image_proc::seeded_rng;

    fn dark_ramp() -> Array3<f32> {
        Array3::from_shape_fn((4, 3, 5), |(z, r, c)| (100 + 10 * z + r + c) as f32)
    }

    #[test]
    fn test_photon_yield_map() {
        let py = Array3::from_shape_vec((2, 1, 3), vec![2.0, 2.0, 2.0, 4.0, 4.0, 4.0]).unwrap();
        let orders =
            Array3::from_shape_vec((2, 1, 3), vec![1.0, 3.0, 0.0, 1.0, 1.0, 0.0]).unwrap();
        let map = make_photon_yield(py.view(), orders.view()).unwrap();
        assert_eq!(map, array![[3.0, 2.5, 1.0]]);

        let bad = Array3::zeros((1, 1, 3));
        assert!(make_photon_yield(bad.view(), orders.view()).is_err());
    }

    #[test]
    fn test_zero_signal_leaves_dark_ramp_unchanged() {
        let dark = dark_ramp();
        let signal = Array3::<f64>::zeros(dark.dim());
        let py = Array2::<f64>::ones((3, 5));
        let zodi = Array2::<f64>::from_elem((3, 5), 0.7);
        let options = SignalOptions {
            zodi_scale: 0.0,
            ..SignalOptions::default()
        };
        let out = add_signal(
            signal.view(),
            dark.view(),
            py.view(),
            zodi.view(),
            &options,
            &mut seeded_rng(Some(1)),
        )
        .unwrap();
        assert!(out.iter().zip(dark.iter()).all(|(&o, &d)| o == d as f64));
    }

    #[test]
    fn test_shape_mismatch_is_fatal() {
        let dark = dark_ramp();
        let signal = Array3::<f64>::zeros((3, 3, 5));
        let py = Array2::<f64>::ones((3, 5));
        let result = add_signal(
            signal.view(),
            dark.view(),
            py.view(),
            py.view(),
            &SignalOptions::default(),
            &mut seeded_rng(Some(2)),
        );
        assert!(matches!(result, Err(SimError::ShapeMismatch { .. })));

        let signal = Array3::<f64>::zeros(dark.dim());
        let small = Array2::<f64>::ones((2, 5));
        let result = add_signal(
            signal.view(),
            dark.view(),
            small.view(),
            py.view(),
            &SignalOptions::default(),
            &mut seeded_rng(Some(2)),
        );
        assert!(matches!(result, Err(SimError::ShapeMismatch { .. })));

        let result = add_signal(
            signal.view(),
            dark.view(),
            py.view(),
            small.view(),
            &SignalOptions::default(),
            &mut seeded_rng(Some(2)),
        );
        assert!(matches!(
            result,
            Err(SimError::ShapeMismatch { context: "zodiacal background", .. })
        ));
    }

    #[test]
    fn test_ramp_is_non_decreasing() {
        let dark = Array3::<f32>::zeros((6, 4, 4));
        let signal = Array3::<f64>::from_elem(dark.dim(), 3.0);
        let zodi = Array2::<f64>::from_elem((4, 4), 0.2);
        for photon_yield in [false, true] {
            let py = Array2::<f64>::from_elem((4, 4), 1.3);
            let options = SignalOptions {
                photon_yield,
                ..SignalOptions::default()
            };
            let out = add_signal(
                signal.view(),
                dark.view(),
                py.view(),
                zodi.view(),
                &options,
                &mut seeded_rng(Some(3)),
            )
            .unwrap();
            for z in 1..6 {
                let prev = out.index_axis(Axis(0), z - 1);
                let this = out.index_axis(Axis(0), z);
                assert!(this.iter().zip(prev.iter()).all(|(a, b)| a >= b));
            }
        }
    }

    #[test]
    fn test_mean_accumulated_counts() {
        let dark = Array3::<f32>::zeros((5, 20, 20));
        let signal = Array3::<f64>::from_elem(dark.dim(), 2.0);
        let py = Array2::<f64>::ones((20, 20));
        let zodi = Array2::<f64>::zeros((20, 20));
        let options = SignalOptions {
            frame_time: 1.0,
            gain: 2.0,
            ..SignalOptions::default()
        };
        let out = add_signal(
            signal.view(),
            dark.view(),
            py.view(),
            zodi.view(),
            &options,
            &mut seeded_rng(Some(4)),
        )
        .unwrap();
        // 4 electrons per frame, divided back by gain: 2 counts per frame
        let last = out.index_axis(Axis(0), 4);
        let mean = last.sum() / last.len() as f64;
        assert!((mean - 10.0).abs() < 0.5, "mean {mean}");
    }

    fn last_frame_mean(
        nframes: usize,
        rate: f64,
        py: f64,
        zodi: f64,
        options: &SignalOptions,
        seed: u64,
    ) -> f64 {
        let dark = Array3::<f32>::zeros((nframes, 30, 30));
        let signal = Array3::<f64>::from_elem(dark.dim(), rate);
        let pyimage = Array2::<f64>::from_elem((30, 30), py);
        let zodi = Array2::<f64>::from_elem((30, 30), zodi);
        let out = add_signal(
            signal.view(),
            dark.view(),
            pyimage.view(),
            zodi.view(),
            options,
            &mut seeded_rng(Some(seed)),
        )
        .unwrap();
        let last = out.index_axis(Axis(0), nframes - 1);
        last.sum() / last.len() as f64
    }

    #[test]
    fn test_photon_yield_scales_detected_counts() {
        let unit = SignalOptions {
            frame_time: 1.0,
            gain: 1.0,
            zodi_scale: 0.0,
            ..SignalOptions::default()
        };
        // Yield folded into a single Poisson rate
        let mean = last_frame_mean(1, 5.0, 2.0, 0.0, &unit, 7);
        assert!((mean - 10.0).abs() < 0.5, "mean {mean}");

        // Extra electrons drawn per detected photon
        let per_photon = SignalOptions {
            photon_yield: true,
            ..unit.clone()
        };
        let mean = last_frame_mean(1, 5.0, 2.0, 0.0, &per_photon, 8);
        assert!((mean - 10.0).abs() < 0.6, "mean {mean}");

        let mean = last_frame_mean(1, 5.0, 1.0, 0.0, &per_photon, 9);
        assert!((mean - 5.0).abs() < 0.4, "mean {mean}");
    }

    #[test]
    fn test_zodiacal_background_adds_expected_counts() {
        let options = SignalOptions {
            frame_time: 1.5,
            gain: 1.5,
            zodi_scale: 2.0,
            ..SignalOptions::default()
        };
        // 3 e/s x 2 x 1.5 s = 9 e per frame, 6 counts, over two frames
        let mean = last_frame_mean(2, 0.0, 1.0, 3.0, &options, 10);
        assert!((mean - 12.0).abs() < 0.5, "mean {mean}");

        let dark_only = SignalOptions {
            zodi_scale: 0.0,
            ..options
        };
        assert_eq!(last_frame_mean(2, 0.0, 1.0, 3.0, &dark_only, 10), 0.0);
    }

    #[test]
    fn test_accumulation_restarts_each_integration() {
        let dark = Array3::<f32>::zeros((4, 2, 2));
        let signal = Array3::<f64>::from_elem(dark.dim(), 50.0);
        let py = Array2::<f64>::ones((2, 2));
        let zodi = Array2::<f64>::zeros((2, 2));
        let options = SignalOptions {
            frame_time: 1.0,
            gain: 1.0,
            groups_per_integration: Some(2),
            ..SignalOptions::default()
        };
        let out = add_signal(
            signal.view(),
            dark.view(),
            py.view(),
            zodi.view(),
            &options,
            &mut seeded_rng(Some(5)),
        )
        .unwrap();
        // Frame 2 starts a new integration and drops back to a single frame
        for (&second, &third) in out
            .index_axis(Axis(0), 1)
            .iter()
            .zip(out.index_axis(Axis(0), 2).iter())
        {
            assert!(third < second);
        }
    }

    #[test]
    #[should_panic(expected = "non-negative")]
    fn test_negative_rate_is_a_contract_violation() {
        let dark = Array3::<f32>::zeros((1, 1, 1));
        let signal = Array3::<f64>::from_elem((1, 1, 1), -5.0);
        let py = Array2::<f64>::ones((1, 1));
        let zodi = Array2::<f64>::zeros((1, 1));
        let _ = add_signal(
            signal.view(),
            dark.view(),
            py.view(),
            zodi.view(),
            &SignalOptions::default(),
            &mut seeded_rng(Some(6)),
        );
    }
}
