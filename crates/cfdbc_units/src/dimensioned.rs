use std::fmt;
use std::ops::{Add, Div, Mul, Neg, Sub};

use serde::{Deserialize, Serialize};

use crate::units::DimensionSet;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DimensionError {
    #[error("dimensions of {lhs_name} {lhs} and {rhs_name} {rhs} differ in operation '{op}'")]
    Mismatch {
        op: &'static str,
        lhs_name: String,
        lhs: DimensionSet,
        rhs_name: String,
        rhs: DimensionSet,
    },
    #[error("argument of {op} must be dimensionless, {name} has dimensions {dimensions}")]
    NotDimensionless {
        op: &'static str,
        name: String,
        dimensions: DimensionSet,
    },
}

/// A named value of type `T` carrying its physical dimensions.
///
/// `+` and `-` require identical dimensions and abort on mismatch; use
/// [`Dimensioned::checked_add`] / [`Dimensioned::checked_sub`] to get the error
/// instead. `*` and `/` combine the dimension sets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dimensioned<T> {
    name: String,
    dimensions: DimensionSet,
    value: T,
}

impl<T> Dimensioned<T> {
    pub fn new(name: impl Into<String>, dimensions: DimensionSet, value: T) -> Self {
        Self {
            name: name.into(),
            dimensions,
            value,
        }
    }

    pub fn dimensionless(name: impl Into<String>, value: T) -> Self {
        Self::new(name, DimensionSet::dimensionless(), value)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dimensions(&self) -> DimensionSet {
        self.dimensions
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn into_value(self) -> T {
        self.value
    }

    pub fn rename(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn check_same_dimensions(&self, other: &Self, op: &'static str) -> Result<(), DimensionError> {
        if self.dimensions == other.dimensions {
            Ok(())
        } else {
            Err(DimensionError::Mismatch {
                op,
                lhs_name: self.name.clone(),
                lhs: self.dimensions,
                rhs_name: other.name.clone(),
                rhs: other.dimensions,
            })
        }
    }
}

impl<T: Add<Output = T>> Dimensioned<T> {
    pub fn checked_add(self, rhs: Self) -> Result<Self, DimensionError> {
        self.check_same_dimensions(&rhs, "+")?;
        Ok(Self {
            name: format!("({}+{})", self.name, rhs.name),
            dimensions: self.dimensions,
            value: self.value + rhs.value,
        })
    }
}

impl<T: Sub<Output = T>> Dimensioned<T> {
    pub fn checked_sub(self, rhs: Self) -> Result<Self, DimensionError> {
        self.check_same_dimensions(&rhs, "-")?;
        Ok(Self {
            name: format!("({}-{})", self.name, rhs.name),
            dimensions: self.dimensions,
            value: self.value - rhs.value,
        })
    }
}

impl Dimensioned<f64> {
    pub fn sqrt(&self) -> Self {
        Self {
            name: format!("sqrt({})", self.name),
            dimensions: self.dimensions.sqrt(),
            value: self.value.sqrt(),
        }
    }

    pub fn powi(&self, exp: i32) -> Self {
        Self {
            name: format!("pow({},{exp})", self.name),
            dimensions: self.dimensions.powi(exp),
            value: self.value.powi(exp),
        }
    }

    /// Transcendental functions only accept dimensionless arguments.
    pub fn exp(&self) -> Result<Self, DimensionError> {
        if !self.dimensions.is_dimensionless() {
            return Err(DimensionError::NotDimensionless {
                op: "exp",
                name: self.name.clone(),
                dimensions: self.dimensions,
            });
        }
        Ok(Self::dimensionless(format!("exp({})", self.name), self.value.exp()))
    }
}

impl<T: Add<Output = T>> Add for Dimensioned<T> {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        match self.checked_add(rhs) {
            Ok(sum) => sum,
            Err(err) => panic!("{err}"),
        }
    }
}

impl<T: Sub<Output = T>> Sub for Dimensioned<T> {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        match self.checked_sub(rhs) {
            Ok(diff) => diff,
            Err(err) => panic!("{err}"),
        }
    }
}

impl<T: Neg<Output = T>> Neg for Dimensioned<T> {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Self {
            name: format!("-{}", self.name),
            dimensions: self.dimensions,
            value: -self.value,
        }
    }
}

impl<T: Mul<f64, Output = T>> Mul<Dimensioned<f64>> for Dimensioned<T> {
    type Output = Self;

    fn mul(self, rhs: Dimensioned<f64>) -> Self::Output {
        Self {
            name: format!("({}*{})", self.name, rhs.name),
            dimensions: self.dimensions * rhs.dimensions,
            value: self.value * rhs.value,
        }
    }
}

impl<T: Mul<f64, Output = T>> Div<Dimensioned<f64>> for Dimensioned<T> {
    type Output = Self;

    fn div(self, rhs: Dimensioned<f64>) -> Self::Output {
        Self {
            name: format!("({}|{})", self.name, rhs.name),
            dimensions: self.dimensions / rhs.dimensions,
            value: self.value * rhs.value.recip(),
        }
    }
}

impl<T: fmt::Debug> fmt::Display for Dimensioned<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {:?}", self.name, self.dimensions, self.value)
    }
}
