//! Dark exposure ramps.

use log::debug;
use ndarray::{s, Array2, Array3, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::image_proc::poisson_array;

use super::{CorrelatedNoiseSource, NoiseDims, NoiseParams};
use crate::error::{SimError, SimResult};

/// Seed stride between consecutive integrations.
const INTEGRATION_SEED_STRIDE: u64 = 24;

/// Add accumulated Poisson dark current to a ramp in place.
///
/// Frame `n` receives the sum of `n + 1` independent draws of
/// `poisson(darksignal) / gain`. The generator is reseeded from `seed` on
/// every call.
pub fn add_dark_current(
    ramp: &mut Array3<f32>,
    seed: u64,
    gain: f64,
    darksignal: ArrayView2<f64>,
) -> SimResult<()> {
    let (_, rows, cols) = ramp.dim();
    if darksignal.dim() != (rows, cols) {
        let (dr, dc) = darksignal.dim();
        return Err(SimError::shape("dark signal", &[rows, cols], &[dr, dc]));
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut total = Array2::<f64>::zeros((rows, cols));
    for mut frame in ramp.axis_iter_mut(Axis(0)) {
        total += &(poisson_array(darksignal, &mut rng) / gain);
        frame.zip_mut_with(&total, |f, &t| *f += t as f32);
    }
    Ok(())
}

/// Simulate a dark exposure of `nints` integrations of `ngrps` groups.
///
/// Returns `[nints × ngrps, rows, cols]` with the shape of `darksignal`, or
/// `None` when either count is zero. Each integration is generated by
/// `generator` in detector coordinates, turned into science orientation
/// (transposed, then flipped along both axes) and given accumulated dark
/// current. Missing seeds are drawn from the thread generator; the noise seed
/// advances by a fixed stride per integration while the dark-current seed is
/// the same for every integration.
#[allow(clippy::too_many_arguments)]
pub fn make_exposure<G: CorrelatedNoiseSource + ?Sized>(
    nints: usize,
    ngrps: usize,
    darksignal: ArrayView2<f64>,
    gain: f64,
    generator: &G,
    params: &NoiseParams,
    noise_seed: Option<u64>,
    dark_seed: Option<u64>,
    offset: f64,
) -> SimResult<Option<Array3<f32>>> {
    if nints < 1 || ngrps < 1 {
        return Ok(None);
    }
    if !(gain.is_finite() && gain > 0.0) {
        return Err(SimError::Configuration(format!(
            "detector gain must be positive, got {gain}"
        )));
    }

    let mut entropy = rand::rng();
    let noise_seed =
        noise_seed.unwrap_or_else(|| 7 + (entropy.random::<f64>() * 4_000_000_000.0) as u64);
    let dark_seed =
        dark_seed.unwrap_or_else(|| 5 + (entropy.random::<f64>() * 4_000_000_000.0) as u64);
    debug!("Dark exposure seeds: noise {noise_seed}, dark {dark_seed}");

    let (nrows, ncols) = darksignal.dim();
    let params = NoiseParams {
        bias_offset: offset * gain,
        gain,
        ..params.clone()
    };
    // Detector coordinates are transposed with respect to the science frame
    let dims = NoiseDims {
        naxis1: nrows,
        naxis2: ncols,
        naxis3: ngrps,
    };

    let mut data = Array3::<f32>::zeros((nints * ngrps, nrows, ncols));
    for int in 0..nints {
        let seed = noise_seed.wrapping_add(INTEGRATION_SEED_STRIDE * int as u64);
        let raw = generator.make_noise(dims, &params, seed, dark_seed)?;
        if raw.dim() != (ngrps, ncols, nrows) {
            return Err(SimError::shape(
                "generated noise ramp",
                &[ngrps, ncols, nrows],
                raw.shape(),
            ));
        }

        let mut ramp = raw.permuted_axes([0, 2, 1]);
        ramp.invert_axis(Axis(1));
        ramp.invert_axis(Axis(2));
        add_dark_current(&mut ramp, dark_seed, gain, darksignal)?;

        data.slice_mut(s![int * ngrps..(int + 1) * ngrps, .., ..])
            .assign(&ramp);
    }

    Ok(Some(data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::noise::HxrgNoise;

    /// Generator that encodes pixel position so orientation can be checked.
    struct Ramp;

    impl CorrelatedNoiseSource for Ramp {
        fn make_noise(
            &self,
            dims: NoiseDims,
            _params: &NoiseParams,
            noise_seed: u64,
            _dc_seed: u64,
        ) -> SimResult<Array3<f32>> {
            Ok(Array3::from_shape_fn(
                (dims.naxis3, dims.naxis2, dims.naxis1),
                |(z, y, x)| (noise_seed as usize * 10000 + z * 1000 + y * 10 + x) as f32,
            ))
        }
    }

    #[test]
    fn test_no_integrations_is_a_no_op() {
        let dark = Array2::<f64>::zeros((4, 6));
        let hx = HxrgNoise::default();
        let params = NoiseParams::default();
        for (nints, ngrps) in [(0, 5), (3, 0), (0, 0)] {
            let out = make_exposure(nints, ngrps, dark.view(), 1.6, &hx, &params, None, None, 500.0)
                .unwrap();
            assert!(out.is_none());
        }
    }

    #[test]
    fn test_reorientation_and_seed_stride() {
        let dark = Array2::<f64>::zeros((3, 4));
        let out = make_exposure(
            2,
            2,
            dark.view(),
            1.0,
            &Ramp,
            &NoiseParams::quiet(),
            Some(1),
            Some(1),
            0.0,
        )
        .unwrap()
        .unwrap();
        assert_eq!(out.dim(), (4, 3, 4));

        // Science (r, c) comes from detector (y = ncols-1-c, x = nrows-1-r)
        let expect = |seed: usize, z: usize, r: usize, c: usize| {
            (seed * 10000 + z * 1000 + (3 - c) * 10 + (2 - r)) as f32
        };
        assert_eq!(out[[0, 0, 0]], expect(1, 0, 0, 0));
        assert_eq!(out[[1, 2, 1]], expect(1, 1, 2, 1));
        // Second integration uses noise_seed + 24
        assert_eq!(out[[2, 1, 3]], expect(25, 0, 1, 3));
    }

    #[test]
    fn test_dark_current_is_cumulative_and_repeats_per_integration() {
        let dark = Array2::<f64>::from_elem((5, 8), 3.0);
        let out = make_exposure(
            2,
            3,
            dark.view(),
            1.5,
            &HxrgNoise::default(),
            &NoiseParams::quiet(),
            Some(11),
            Some(12),
            0.0,
        )
        .unwrap()
        .unwrap();
        assert_eq!(out.dim(), (6, 5, 8));

        for int in 0..2 {
            for g in 1..3 {
                let z = int * 3 + g;
                let prev = out.index_axis(Axis(0), z - 1);
                let this = out.index_axis(Axis(0), z);
                assert!(this.iter().zip(prev.iter()).all(|(a, b)| a >= b));
            }
        }
        // Same dark seed each integration: quiet noise makes them identical
        assert_eq!(
            out.slice(s![0..3, .., ..]),
            out.slice(s![3..6, .., ..])
        );
    }

    #[test]
    fn test_bias_offset_follows_pedestal_offset() {
        let dark = Array2::<f64>::zeros((4, 4));
        let out = make_exposure(
            1,
            2,
            dark.view(),
            2.0,
            &HxrgNoise::default(),
            &NoiseParams::quiet(),
            Some(3),
            Some(4),
            500.0,
        )
        .unwrap()
        .unwrap();
        // bias = offset × gain electrons, divided back by gain
        assert!(out.iter().all(|&v| v == 500.0));
    }

    #[test]
    fn test_explicit_seeds_reproduce() {
        let dark = Array2::<f64>::from_elem((4, 8), 0.5);
        let hx = HxrgNoise::default();
        let params = NoiseParams::default();
        let run = || {
            make_exposure(2, 2, dark.view(), 1.6, &hx, &params, Some(42), Some(43), 500.0)
                .unwrap()
                .unwrap()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_dark_signal_shape_is_checked() {
        let mut ramp = Array3::<f32>::zeros((2, 3, 3));
        let dark = Array2::<f64>::zeros((3, 4));
        assert!(matches!(
            add_dark_current(&mut ramp, 1, 1.0, dark.view()),
            Err(SimError::ShapeMismatch { .. })
        ));
    }
}
