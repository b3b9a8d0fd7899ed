//! Physical dimensions with rational exponents.
//!
//! Re-exports the dimension system of the `cfdbc_units` crate so solver code
//! can name it through `cfdbc::solver::dimensions`.
//!
//! ```
//! use cfdbc::solver::dimensions::{si, Dimensioned};
//!
//! let u = Dimensioned::new("U", si::VELOCITY, 2.0);
//! let t = Dimensioned::new("t", si::TIME, 3.0);
//! assert_eq!((u * t).dimensions(), si::LENGTH);
//! ```

pub use cfdbc_units::{si, DimensionError, DimensionSet, Dimensioned, Exponent};
