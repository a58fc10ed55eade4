//! Final detector effects: non-linearity and pedestal.

use ndarray::{Array3, ArrayView2, ArrayView3, Axis, Zip};

use crate::error::{SimError, SimResult};

/// Default pedestal offset; `add_pedestal` with this offset adds the pedestal
/// image unchanged.
pub const DEFAULT_PEDESTAL_OFFSET: f64 = 500.0;

/// Apply a per-pixel polynomial non-linearity to every frame.
///
/// With `x = frame − offset`, each pixel becomes
/// `x · (1 + Σₙ coeffs[n] · x^(n+1)) + offset`, where `coeffs` is
/// `[ncoeff, rows, cols]`.
pub fn non_linearity(
    cube: ArrayView3<f64>,
    coeffs: ArrayView3<f64>,
    offset: f64,
) -> SimResult<Array3<f64>> {
    let (_, rows, cols) = cube.dim();
    let (ncoeff, crow, ccol) = coeffs.dim();
    if (crow, ccol) != (rows, cols) {
        return Err(SimError::shape(
            "non-linearity coefficients",
            &[ncoeff, rows, cols],
            coeffs.shape(),
        ));
    }

    let mut out = cube.to_owned();
    for mut frame in out.axis_iter_mut(Axis(0)) {
        frame.indexed_iter_mut().for_each(|((r, c), v)| {
            let x = *v - offset;
            let mut correction = 0.0;
            let mut power = x;
            for n in 0..ncoeff {
                correction += coeffs[[n, r, c]] * power;
                power *= x;
            }
            *v = x * (1.0 + correction) + offset;
        });
    }
    Ok(out)
}

/// Add a pedestal image to every frame and quantise to detector counts.
///
/// The pedestal is shifted by `offset − 500`. Values are truncated toward
/// zero; negative values saturate at 0.
pub fn add_pedestal(
    cube: ArrayView3<f64>,
    pedestal: ArrayView2<f64>,
    offset: f64,
) -> SimResult<Array3<u32>> {
    let (_, rows, cols) = cube.dim();
    if pedestal.dim() != (rows, cols) {
        return Err(SimError::shape("pedestal", &[rows, cols], pedestal.shape()));
    }

    let shifted = &pedestal + (offset - DEFAULT_PEDESTAL_OFFSET);
    let mut out = Array3::<u32>::zeros(cube.dim());
    for (mut dst, src) in out.axis_iter_mut(Axis(0)).zip(cube.axis_iter(Axis(0))) {
        Zip::from(&mut dst)
            .and(&src)
            .and(&shifted)
            .for_each(|d, &s, &p| *d = (s + p) as u32);
    }
    Ok(out)
}
