//! HxRG detector noise model.
//!
//! Simulates the readout of a multi-output HgCdTe array as a single time
//! stream: each output reads `xsize` pixels plus `nroh` overhead pixels per
//! row, and `nfoh` overhead rows per frame. Odd outputs read their columns in
//! reverse. Components:
//! - constant bias plus an optional bias pattern
//! - per-frame pedestal drift
//! - white read noise
//! - correlated 1/f noise, identical time stream in every output
//! - uncorrelated 1/f noise, one stream per output
//! - alternating column noise, separate 1/f streams for even and odd samples
//! - optional PCA-0 pattern
//! - cumulative Poisson dark current
//!
//! 1/f streams are white Gaussian noise shaped in the frequency domain with
//! `rustfft` and renormalised to unit standard deviation.

use ndarray::{s, Array2, Array3};
use num_complex::Complex64;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rustfft::FftPlanner;
use shared::image_proc::{normal_sample, poisson_sample};

use super::{CorrelatedNoiseSource, NoiseDims, NoiseParams};
use crate::error::{SimError, SimResult};

/// Layout of the simulated detector readout.
#[derive(Debug, Clone, PartialEq)]
pub struct HxrgNoise {
    /// Number of parallel outputs
    pub n_out: usize,
    /// Overhead pixels clocked at the end of each row
    pub nroh: usize,
    /// Overhead rows clocked at the end of each frame
    pub nfoh: usize,
    /// Window origin on the full detector
    pub x0: usize,
    pub y0: usize,
    /// Side of the full square detector; the window must fit inside it
    pub det_size: usize,
    /// Full-detector PCA-0 pattern, `[det_size, det_size]`
    pub pca0: Option<Array2<f64>>,
}

impl Default for HxrgNoise {
    fn default() -> Self {
        Self {
            n_out: 4,
            nroh: 12,
            nfoh: 1,
            x0: 0,
            y0: 0,
            det_size: 2048,
            pca0: None,
        }
    }
}

impl HxrgNoise {
    pub fn with_pca0(mut self, pca0: Array2<f64>) -> Self {
        self.pca0 = Some(pca0);
        self
    }

    /// Outputs used for a window `naxis1` pixels wide. Windows that do not
    /// split evenly are read through a single output.
    fn outputs_for(&self, naxis1: usize) -> usize {
        if self.n_out > 0 && naxis1 % self.n_out == 0 {
            self.n_out
        } else {
            1
        }
    }

    fn check_window(&self, dims: NoiseDims) -> SimResult<()> {
        let (y1, x1) = (self.y0 + dims.naxis2, self.x0 + dims.naxis1);
        if y1 > self.det_size || x1 > self.det_size {
            return Err(SimError::shape(
                "detector window",
                &[self.det_size, self.det_size],
                &[y1, x1],
            ));
        }
        Ok(())
    }

    fn pca0_window(&self, dims: NoiseDims) -> SimResult<Option<Array2<f64>>> {
        let Some(pca0) = &self.pca0 else {
            return Ok(None);
        };
        let (rows, cols) = pca0.dim();
        let (y1, x1) = (self.y0 + dims.naxis2, self.x0 + dims.naxis1);
        if y1 > rows || x1 > cols {
            return Err(SimError::shape("PCA-0 pattern", &[y1, x1], &[rows, cols]));
        }
        Ok(Some(
            pca0.slice(s![self.y0..y1, self.x0..x1]).to_owned(),
        ))
    }
}

/// Readout geometry of one integration.
struct Timing {
    n_out: usize,
    xsize: usize,
    row_len: usize,
    frame_len: usize,
    nstep: usize,
}

impl Timing {
    fn new(hx: &HxrgNoise, dims: NoiseDims) -> Self {
        let n_out = hx.outputs_for(dims.naxis1);
        let xsize = dims.naxis1 / n_out;
        let row_len = xsize + hx.nroh;
        let frame_len = row_len * (dims.naxis2 + hx.nfoh);
        Self {
            n_out,
            xsize,
            row_len,
            frame_len,
            nstep: frame_len * dims.naxis3,
        }
    }

    /// Add `scale × stream` to every pixel read by `output`.
    fn add_stream(&self, cube: &mut Array3<f64>, output: usize, stream: &[f64], scale: f64) {
        let (nz, ny, _) = cube.dim();
        for z in 0..nz {
            for y in 0..ny {
                let base = z * self.frame_len + y * self.row_len;
                for xl in 0..self.xsize {
                    let x = if output % 2 == 1 {
                        output * self.xsize + self.xsize - 1 - xl
                    } else {
                        output * self.xsize + xl
                    };
                    cube[[z, y, x]] += scale * stream[base + xl];
                }
            }
        }
    }
}

/// Unit-variance 1/f noise of length `n`.
pub fn pink_noise<R: Rng + ?Sized>(n: usize, rng: &mut R) -> Vec<f64> {
    if n == 0 {
        return Vec::new();
    }
    let nfft = (2 * n).next_power_of_two();
    let mut spectrum: Vec<Complex64> = (0..nfft)
        .map(|_| Complex64::new(normal_sample(0.0, 1.0, rng), 0.0))
        .collect();

    let mut planner = FftPlanner::new();
    planner.plan_fft_forward(nfft).process(&mut spectrum);

    // Amplitude ∝ f^-1/2 gives power ∝ 1/f; symmetric so the result stays real
    spectrum[0] = Complex64::new(0.0, 0.0);
    for (k, bin) in spectrum.iter_mut().enumerate().skip(1) {
        let f = k.min(nfft - k) as f64 / nfft as f64;
        *bin /= f.sqrt();
    }
    planner.plan_fft_inverse(nfft).process(&mut spectrum);

    let mut out: Vec<f64> = spectrum[..n].iter().map(|c| c.re).collect();
    let mean = out.iter().sum::<f64>() / n as f64;
    let var = out.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n as f64;
    let std = var.sqrt();
    for v in out.iter_mut() {
        *v = if std > 0.0 { (*v - mean) / std } else { 0.0 };
    }
    out
}

impl CorrelatedNoiseSource for HxrgNoise {
    fn make_noise(
        &self,
        dims: NoiseDims,
        params: &NoiseParams,
        noise_seed: u64,
        dc_seed: u64,
    ) -> SimResult<Array3<f32>> {
        if !(params.gain.is_finite() && params.gain > 0.0) {
            return Err(SimError::Configuration(format!(
                "detector gain must be positive, got {}",
                params.gain
            )));
        }
        self.check_window(dims)?;

        let timing = Timing::new(self, dims);
        let mut rng = StdRng::seed_from_u64(noise_seed);
        let mut cube = Array3::<f64>::from_elem(
            (dims.naxis3, dims.naxis2, dims.naxis1),
            params.bias_offset,
        );

        let pca0 = self.pca0_window(dims)?;
        if let Some(pattern) = &pca0 {
            if params.bias_amp != 0.0 {
                for mut frame in cube.outer_iter_mut() {
                    frame.scaled_add(params.bias_amp, pattern);
                }
            }
        }

        if params.pedestal != 0.0 {
            for mut frame in cube.outer_iter_mut() {
                let drift = params.pedestal * normal_sample(0.0, 1.0, &mut rng);
                frame += drift;
            }
        }

        if params.rd_noise != 0.0 {
            let rd = params.rd_noise.abs();
            cube.mapv_inplace(|v| v + normal_sample(0.0, rd, &mut rng));
        }

        if params.c_pink != 0.0 {
            let stream = pink_noise(timing.nstep, &mut rng);
            for output in 0..timing.n_out {
                timing.add_stream(&mut cube, output, &stream, params.c_pink);
            }
        }

        if params.u_pink != 0.0 {
            for output in 0..timing.n_out {
                let stream = pink_noise(timing.nstep, &mut rng);
                timing.add_stream(&mut cube, output, &stream, params.u_pink);
            }
        }

        if params.acn != 0.0 {
            let half = timing.nstep.div_ceil(2);
            for output in 0..timing.n_out {
                let even = pink_noise(half, &mut rng);
                let odd = pink_noise(half, &mut rng);
                let stream: Vec<f64> = (0..timing.nstep)
                    .map(|t| if t % 2 == 0 { even[t / 2] } else { odd[t / 2] })
                    .collect();
                timing.add_stream(&mut cube, output, &stream, params.acn);
            }
        }

        if let Some(pattern) = &pca0 {
            if params.pca0_amp != 0.0 {
                for mut frame in cube.outer_iter_mut() {
                    frame.scaled_add(params.pca0_amp, pattern);
                }
            }
        }

        if params.dark_current > 0.0 {
            let mut dc_rng = StdRng::seed_from_u64(dc_seed);
            let mut total = Array2::<f64>::zeros((dims.naxis2, dims.naxis1));
            for mut frame in cube.outer_iter_mut() {
                total.mapv_inplace(|t| t + poisson_sample(params.dark_current, &mut dc_rng));
                frame += &total;
            }
        }

        let gain = params.gain;
        Ok(cube.mapv(|v| (v / gain) as f32))
    }
}
