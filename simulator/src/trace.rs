//! Per-order wavelength and trace-distance maps.
//!
//! Every spectral order has two images the size of the readout window:
//! - a wavelength map (microns, zero where the order has no coverage)
//! - a distance map (pixels from the order's trace centre line)
//!
//! Wavelength solutions are loaded once per run. Distance maps are expensive,
//! O(rows × cols × samples), so they are generated on request and cached on
//! disk; a normal run only reads the cache.

use std::path::{Path, PathBuf};

use log::{debug, info};
use ndarray::{s, Array2, Array3, ArrayView2, Zip};
use serde::{Deserialize, Serialize};
use shared::algo::{polyfit, polyval};

use crate::error::{SimError, SimResult};
use crate::exposure::Subarray;

/// Degree of the trace centre polynomial.
pub const DEFAULT_TRACE_DEGREE: usize = 4;
/// First column used to fit and sample the trace.
pub const DEFAULT_TRACE_START: usize = 4;
/// Column (exclusive) at which the fit stops using mask pixels.
pub const DEFAULT_TRACE_END: usize = 2040;

/// Trace centre line sampled at every integer column.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceCurve {
    pub columns: Vec<f64>,
    pub rows: Vec<f64>,
}

impl TraceCurve {
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Fit the trace centre of one order.
///
/// `mask` is `[rows, cols]` with `true` on pixels illuminated by the order.
/// Row indices of in-trace pixels are fitted against their column for columns
/// in `start..end`, and the resulting polynomial is sampled at every column
/// from `start` to the last column of the mask.
pub fn trace_polynomial(
    mask: &Array2<bool>,
    start: usize,
    end: usize,
    degree: usize,
) -> SimResult<TraceCurve> {
    let (_, ncols) = mask.dim();
    let end = end.min(ncols);

    let mut x = Vec::new();
    let mut y = Vec::new();
    for col in start..end {
        for (row, &lit) in mask.column(col).iter().enumerate() {
            if lit {
                x.push(col as f64);
                y.push(row as f64);
            }
        }
    }

    let coeffs = polyfit(&x, &y, degree)?;
    debug!("Trace polynomial from {} mask pixels: {coeffs:?}", x.len());

    let columns: Vec<f64> = (start..ncols).map(|c| c as f64).collect();
    let rows = columns.iter().map(|&c| polyval(&coeffs, c)).collect();
    Ok(TraceCurve { columns, rows })
}

/// Distance from every pixel of a `[rows, cols]` window to the nearest sample
/// of `curve`.
pub fn compute_distance_map(shape: (usize, usize), curve: &TraceCurve) -> Array2<f64> {
    let mut map = Array2::<f64>::zeros(shape);
    if curve.is_empty() {
        map.fill(f64::INFINITY);
        return map;
    }

    Zip::indexed(&mut map).par_for_each(|(row, col), d| {
        let (r, c) = (row as f64, col as f64);
        *d = curve
            .rows
            .iter()
            .zip(&curve.columns)
            .map(|(&yr, &xc)| ((r - yr).powi(2) + (c - xc).powi(2)).sqrt())
            .fold(f64::INFINITY, f64::min);
    });
    map
}

/// On-disk cache of per-order distance maps.
#[derive(Debug, Clone)]
pub struct DistanceMapCache {
    dir: PathBuf,
    start: usize,
    end: usize,
    degree: usize,
}

impl DistanceMapCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            start: DEFAULT_TRACE_START,
            end: DEFAULT_TRACE_END,
            degree: DEFAULT_TRACE_DEGREE,
        }
    }

    /// Override the trace fit window and polynomial degree.
    pub fn with_fit(mut self, start: usize, end: usize, degree: usize) -> Self {
        self.start = start;
        self.end = end;
        self.degree = degree;
        self
    }

    pub fn path(&self, order: usize) -> PathBuf {
        self.dir.join(format!("order_{order}_distance_map.json"))
    }

    /// Read a cached map, `None` if the order has never been generated.
    pub fn load(&self, order: usize) -> SimResult<Option<Array2<f64>>> {
        let path = self.path(order);
        if !path.exists() {
            return Ok(None);
        }
        let text = std::fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&text)?))
    }

    pub fn store(&self, order: usize, map: &Array2<f64>) -> SimResult<()> {
        std::fs::create_dir_all(&self.dir)?;
        std::fs::write(self.path(order), serde_json::to_string(map)?)?;
        Ok(())
    }

    /// Return the cached map for `order`, fitting and storing it first when
    /// `regenerate` is set or nothing is cached yet.
    pub fn load_or_generate(
        &self,
        order: usize,
        mask: &Array2<bool>,
        regenerate: bool,
    ) -> SimResult<Array2<f64>> {
        if !regenerate {
            if let Some(map) = self.load(order)? {
                if map.dim() != mask.dim() {
                    let (er, ec) = mask.dim();
                    let (fr, fc) = map.dim();
                    return Err(SimError::shape("cached distance map", &[er, ec], &[fr, fc]));
                }
                debug!("Loaded order {order} distance map from {}", self.path(order).display());
                return Ok(map);
            }
        }

        info!("Generating order {order} distance map");
        let curve = trace_polynomial(mask, self.start, self.end, self.degree)?;
        let map = compute_distance_map(mask.dim(), &curve);
        self.store(order, &map)?;
        Ok(map)
    }
}

/// Wavelength maps for all orders, `[order, rows, cols]`, orders numbered from 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WavelengthSolutions {
    maps: Array3<f64>,
}

impl WavelengthSolutions {
    pub fn new(maps: Array3<f64>) -> Self {
        Self { maps }
    }

    pub fn from_orders(orders: &[Array2<f64>]) -> SimResult<Self> {
        let Some(first) = orders.first() else {
            return Err(SimError::Configuration(
                "wavelength solutions need at least one order".to_string(),
            ));
        };
        let (rows, cols) = first.dim();
        let mut maps = Array3::zeros((orders.len(), rows, cols));
        for (k, map) in orders.iter().enumerate() {
            if map.dim() != (rows, cols) {
                let (fr, fc) = map.dim();
                return Err(SimError::shape("wavelength solution order", &[rows, cols], &[fr, fc]));
            }
            maps.slice_mut(s![k, .., ..]).assign(map);
        }
        Ok(Self { maps })
    }

    pub fn load(path: &Path) -> SimResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn save(&self, path: &Path) -> SimResult<()> {
        std::fs::write(path, serde_json::to_string(self)?)?;
        Ok(())
    }

    pub fn n_orders(&self) -> usize {
        self.maps.dim().0
    }

    /// `(rows, cols)` of every map.
    pub fn window(&self) -> (usize, usize) {
        let (_, rows, cols) = self.maps.dim();
        (rows, cols)
    }

    /// Crop full-frame solutions to the rows read by `subarray`.
    pub fn for_subarray(&self, subarray: Subarray) -> SimResult<Self> {
        let (rows, cols) = self.window();
        if rows < subarray.rows() || cols < subarray.columns() {
            return Err(SimError::Configuration(format!(
                "wavelength solutions are {rows}x{cols}, too small for {subarray}"
            )));
        }
        Ok(Self {
            maps: self
                .maps
                .slice(s![.., ..subarray.rows(), ..subarray.columns()])
                .to_owned(),
        })
    }

    /// Wavelength map of `order` (1-based).
    pub fn order(&self, order: usize) -> SimResult<ArrayView2<'_, f64>> {
        if order == 0 || order > self.n_orders() {
            return Err(SimError::Configuration(format!(
                "order {order} not in wavelength solutions (1..={})",
                self.n_orders()
            )));
        }
        Ok(self.maps.slice(s![order - 1, .., ..]))
    }
}

/// Analytic stand-in for a measured order: a gently curved trace with a
/// linear wavelength solution.
///
/// Returns the in-trace mask and wavelength map for a `[nrows, ncols]`
/// window. Used by the demo binary and tests in place of calibration files.
pub fn analytic_order(order: usize, nrows: usize, ncols: usize) -> (Array2<bool>, Array2<f64>) {
    // (centre row fraction, curvature, blue edge µm, red edge µm, half width px)
    let (centre, curvature, blue, red, half_width) = match order {
        1 => (0.35, 0.12, 0.9, 2.8, 12.0),
        2 => (0.65, -0.10, 0.6, 1.4, 10.0),
        _ => (0.85, 0.05, 0.6, 0.95, 8.0),
    };
    let width = ncols.max(2) as f64 - 1.0;
    let height = nrows as f64;

    let centre_row = |col: usize| {
        let u = col as f64 / width;
        height * (centre + curvature * (u - 0.5).powi(2))
    };

    let mask = Array2::from_shape_fn((nrows, ncols), |(r, c)| {
        (r as f64 - centre_row(c)).abs() <= half_width
    });
    let wave = Array2::from_shape_fn((nrows, ncols), |(r, c)| {
        if (r as f64 - centre_row(c)).abs() <= 4.0 * half_width {
            red - (red - blue) * c as f64 / width
        } else {
            0.0
        }
    });
    (mask, wave)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn straight_mask(rows: usize, cols: usize, centre: usize, half: usize) -> Array2<bool> {
        Array2::from_shape_fn((rows, cols), |(r, _)| r.abs_diff(centre) <= half)
    }

    #[test]
    fn test_trace_polynomial_recovers_straight_trace() {
        let mask = straight_mask(40, 60, 20, 3);
        let curve = trace_polynomial(&mask, 4, 60, 2).unwrap();
        assert_eq!(curve.len(), 56);
        assert_eq!(curve.columns[0], 4.0);
        for &y in &curve.rows {
            assert_relative_eq!(y, 20.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_trace_polynomial_without_pixels_fails() {
        let mask = Array2::from_elem((10, 10), false);
        assert!(matches!(
            trace_polynomial(&mask, 0, 10, 2),
            Err(SimError::PolyFit(_))
        ));
    }

    #[test]
    fn test_distance_map_of_straight_trace() {
        let mask = straight_mask(30, 40, 10, 2);
        let curve = trace_polynomial(&mask, 0, 40, 1).unwrap();
        let map = compute_distance_map(mask.dim(), &curve);
        assert_relative_eq!(map[[10, 20]], 0.0, epsilon = 1e-6);
        assert_relative_eq!(map[[17, 20]], 7.0, epsilon = 1e-6);
        assert_relative_eq!(map[[0, 5]], 10.0, epsilon = 1e-6);
        assert!(map.iter().all(|&d| d >= 0.0));
    }

    #[test]
    fn test_distance_cache_round_trip_and_regenerate() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DistanceMapCache::new(dir.path()).with_fit(0, 40, 1);
        let mask = straight_mask(20, 40, 8, 2);

        assert!(cache.load(1).unwrap().is_none());
        let generated = cache.load_or_generate(1, &mask, false).unwrap();
        assert!(cache.path(1).exists());

        // Different mask, but the cache wins unless regeneration is requested
        let moved = straight_mask(20, 40, 12, 2);
        let cached = cache.load_or_generate(1, &moved, false).unwrap();
        assert_eq!(cached, generated);

        let fresh = cache.load_or_generate(1, &moved, true).unwrap();
        assert_relative_eq!(fresh[[12, 10]], 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_cached_map_shape_is_checked() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DistanceMapCache::new(dir.path());
        cache.store(2, &Array2::zeros((5, 5))).unwrap();
        let mask = straight_mask(6, 6, 3, 1);
        assert!(matches!(
            cache.load_or_generate(2, &mask, false),
            Err(SimError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_wavelength_solutions_crop_and_order_lookup() {
        let full = WavelengthSolutions::new(Array3::from_elem((2, 100, 2048), 1.5));
        let sub = full.for_subarray(Subarray::Substrip96).unwrap();
        assert_eq!(sub.window(), (96, 2048));
        assert_eq!(sub.order(2).unwrap().dim(), (96, 2048));
        assert!(matches!(sub.order(3), Err(SimError::Configuration(_))));
        assert!(matches!(sub.order(0), Err(SimError::Configuration(_))));

        let small = WavelengthSolutions::new(Array3::zeros((1, 50, 2048)));
        assert!(small.for_subarray(Subarray::Substrip96).is_err());
    }

    #[test]
    fn test_wavelength_solutions_persist() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wave.json");
        let (_, w1) = analytic_order(1, 16, 32);
        let (_, w2) = analytic_order(2, 16, 32);
        let sol = WavelengthSolutions::from_orders(&[w1, w2]).unwrap();
        sol.save(&path).unwrap();
        assert_eq!(WavelengthSolutions::load(&path).unwrap(), sol);
    }

    #[test]
    fn test_analytic_order_is_dispersed() {
        let (mask, wave) = analytic_order(1, 64, 128);
        assert!(mask.iter().any(|&m| m));
        // Red end on the left, blue on the right, like the real order 1
        let row = (0..64).find(|&r| mask[[r, 0]]).unwrap();
        assert!(wave[[row, 0]] > wave[[row, 127]]);
    }
}
