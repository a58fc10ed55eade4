//! End-to-end time-series exposure simulation on a detector window.
//!
//! Builds analytic trace and wavelength maps for orders 1 and 2, simulates a
//! flat-spectrum star with an optional transiting planet, and runs the full
//! detector chain: dark ramp, Poisson signal, non-linearity and pedestal.
//!
//! # Usage
//!
//! ```bash
//! # Quick look at a 64x256 window with a 1% transit
//! cargo run --release --bin tso_demo -- --rows 64 --cols 256 --depth 0.01
//!
//! # Reproducible run with a config file, saving the exposure state
//! cargo run --release --bin tso_demo -- --config sim.json --seed 42 --snapshot tso.json
//! ```

use std::path::PathBuf;
use std::time::Instant;

use clap::Parser;
use log::info;
use ndarray::{Array2, Array3, Axis};
use shared::image_proc::seeded_rng;
use soss_simulator::trace::{analytic_order, DistanceMapCache};
use soss_simulator::tso::DarkRampSettings;
use soss_simulator::{
    add_pedestal, add_signal, non_linearity, Exposure, HxrgNoise, LimbDarkeningLaw,
    NumericalTransitModel, OrderMaps, PlanetSpectrum, SignalOptions, SimulationConfig,
    SpectralResponse, StellarSpectrum, Subarray, TransitParams, Tso,
};

/// Wavelength range covered by the synthetic spectra, microns
const BAND: (f64, f64) = (0.5, 3.0);

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Readout subarray: SUBSTRIP96, SUBSTRIP256 or FULL
    #[arg(long, default_value = "SUBSTRIP256")]
    subarray: Subarray,

    /// Rows of the simulated window
    #[arg(long, default_value_t = 64)]
    rows: usize,

    /// Columns of the simulated window
    #[arg(long, default_value_t = 128)]
    cols: usize,

    /// Groups per integration
    #[arg(long, default_value_t = 3)]
    ngrps: usize,

    /// Integrations
    #[arg(long, default_value_t = 10)]
    nints: usize,

    /// Transit depth; no planet when omitted
    #[arg(long)]
    depth: Option<f64>,

    /// Stellar flux density, same units as the response
    #[arg(long, default_value_t = 1e-9)]
    flux: f64,

    /// JSON simulation config; defaults are used when omitted
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory for cached distance maps
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Refit distance maps even when cached
    #[arg(long, default_value_t = false)]
    regenerate: bool,

    /// Seed for every random stage
    #[arg(long)]
    seed: Option<u64>,

    /// Write the simulated exposure state here
    #[arg(long)]
    snapshot: Option<PathBuf>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => SimulationConfig::load(path)?,
        None => SimulationConfig::default(),
    };
    if args.seed.is_some() {
        config.pixel_seed = args.seed;
        config.psf_seed = args.seed;
    }
    config.show_progress = true;

    let exposure =
        Exposure::new(args.subarray, args.ngrps, args.nints, 0.0).with_window(args.rows, args.cols);
    info!(
        "{} window {}x{}, {} frames of {:.3}s",
        exposure.subarray,
        exposure.nrows,
        exposure.ncols,
        exposure.nframes(),
        exposure.frame_time
    );

    let cache_dir = args
        .cache_dir
        .clone()
        .unwrap_or_else(|| std::env::temp_dir().join("soss_distance_maps"));
    let cache = DistanceMapCache::new(cache_dir).with_fit(0, args.cols, 2);

    let ld_profile = LimbDarkeningLaw::Quadratic;
    let mut orders = Vec::new();
    for order in [1, 2] {
        let (mask, wavelength) = analytic_order(order, args.rows, args.cols);
        let distance = cache.load_or_generate(order, &mask, args.regenerate)?;
        orders.push(OrderMaps {
            order,
            wavelength,
            distance,
            ld_coeffs: Some(Array3::from_shape_fn(
                (args.rows, args.cols, ld_profile.coefficient_count()),
                |(_, _, k)| if k == 0 { 0.1 } else { 0.3 },
            )),
            response: SpectralResponse::new(vec![BAND.0, BAND.1], vec![1e-13, 1e-13])?,
        });
    }

    let star = StellarSpectrum::new(vec![BAND.0, BAND.1], vec![args.flux, args.flux])?;
    let planet = args
        .depth
        .map(|d| PlanetSpectrum::flat(BAND.0, BAND.1, d))
        .transpose()?;

    // Centre the transit in the exposure
    let mid = exposure.time.iter().sum::<f64>() / exposure.nframes().max(1) as f64;
    let params = TransitParams::circular(mid, 3_600.0, 0.1, 12.0, 90.0);

    let mut tso = Tso::new(exposure, star, planet, params, ld_profile, config)?;

    let start = Instant::now();
    let results = tso.run_simulation(&orders, &NumericalTransitModel::default())?;
    for result in &results {
        info!(
            "Order {}: {} substituted pixels",
            result.order,
            result.failures.len()
        );
    }
    info!("Light curves done in {:.2?}", start.elapsed());

    let (nrows, ncols) = (tso.exposure.nrows, tso.exposure.ncols);
    let darksignal = Array2::<f64>::from_elem((nrows, ncols), 0.05);
    let options = SignalOptions {
        frame_time: tso.exposure.frame_time,
        groups_per_integration: Some(tso.exposure.ngrps),
        ..SignalOptions::default()
    };
    let settings = DarkRampSettings {
        gain: options.gain,
        noise_seed: args.seed,
        dark_seed: args.seed.map(|s| s.wrapping_add(1)),
    };

    let Some(dark) = tso.simulate_dark_ramp(&HxrgNoise::default(), darksignal.view(), &settings)?
    else {
        info!("Exposure has no frames, nothing to read out");
        return Ok(());
    };

    let pyimage = Array2::<f64>::ones((nrows, ncols));
    let zodi = Array2::<f64>::from_elem((nrows, ncols), 0.3);
    let mut rng = seeded_rng(args.seed);
    let ramp = add_signal(
        tso.cube().view(),
        dark.view(),
        pyimage.view(),
        zodi.view(),
        &options,
        &mut rng,
    )?;

    let coeffs = Array3::from_shape_fn((2, nrows, ncols), |(n, _, _)| {
        if n == 0 {
            -2e-6
        } else {
            1e-11
        }
    });
    let pedestal_offset = tso.config.pedestal_offset;
    let ramp = non_linearity(ramp.view(), coeffs.view(), pedestal_offset)?;
    let pedestal = Array2::<f64>::from_elem((nrows, ncols), 10_000.0);
    let counts = add_pedestal(ramp.view(), pedestal.view(), pedestal_offset)?;

    let last = counts.index_axis(Axis(0), counts.len_of(Axis(0)) - 1);
    let max = last.iter().copied().max().unwrap_or(0);
    let mean = last.iter().map(|&v| v as f64).sum::<f64>() / last.len() as f64;
    info!("Final frame: mean {mean:.1} counts, max {max} counts");

    let column = ncols / 2;
    let curve = tso.column_light_curve(column)?;
    let dip = curve.iter().copied().fold(f64::INFINITY, f64::min);
    info!("Column {column} light curve minimum {dip:.5}");

    let saturated = tso
        .saturation_map(0, 80.0)?
        .iter()
        .filter(|&&s| s)
        .count();
    info!("{saturated} pixels above 80% full well in the first frame");

    if let Some(path) = &args.snapshot {
        tso.save(path)?;
    }

    Ok(())
}
