//! Numerical algorithms: interpolation, polynomial fits and integration.

pub mod interp;
pub mod polyfit;
pub mod trapezoid;

pub use interp::{interp_clamped, interp_or, validate_table, InterpError};
pub use polyfit::{polyfit, polyval, PolyFitError};
pub use trapezoid::trapz_unit;
