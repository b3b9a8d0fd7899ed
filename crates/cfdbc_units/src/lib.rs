pub mod dimensioned;
pub mod units;

pub use dimensioned::{Dimensioned, DimensionError};
pub use units::{si, DimensionSet, Exponent};
