use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Rational exponent of one base quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Exponent {
    num: i32,
    den: i32,
}

impl Exponent {
    pub const fn zero() -> Self {
        Self { num: 0, den: 1 }
    }

    pub const fn from_i32(value: i32) -> Self {
        Self { num: value, den: 1 }
    }

    pub const fn new(num: i32, den: i32) -> Self {
        assert!(den != 0, "dimension exponent denominator must be non-zero");
        if num == 0 {
            return Self::zero();
        }

        let (mut num, mut den) = (num, den);
        if den < 0 {
            num = -num;
            den = -den;
        }

        let gcd = gcd_i32(abs_i32(num), den);
        Self {
            num: num / gcd,
            den: den / gcd,
        }
    }

    pub const fn numerator(self) -> i32 {
        self.num
    }

    pub const fn denominator(self) -> i32 {
        self.den
    }

    pub const fn is_zero(self) -> bool {
        self.num == 0
    }

    pub const fn is_integer(self) -> bool {
        self.den == 1
    }

    pub fn as_f64(self) -> f64 {
        self.num as f64 / self.den as f64
    }

    pub const fn add_exp(self, rhs: Self) -> Self {
        if self.num == 0 {
            return rhs;
        }
        if rhs.num == 0 {
            return self;
        }

        let num = (self.num as i64) * (rhs.den as i64) + (rhs.num as i64) * (self.den as i64);
        let den = (self.den as i64) * (rhs.den as i64);
        Self::new(i64_to_i32_checked(num), i64_to_i32_checked(den))
    }

    pub const fn sub_exp(self, rhs: Self) -> Self {
        self.add_exp(Self {
            num: -rhs.num,
            den: rhs.den,
        })
    }

    pub const fn mul_exp(self, rhs: Self) -> Self {
        if self.num == 0 || rhs.num == 0 {
            return Self::zero();
        }
        let num = (self.num as i64) * (rhs.num as i64);
        let den = (self.den as i64) * (rhs.den as i64);
        Self::new(i64_to_i32_checked(num), i64_to_i32_checked(den))
    }

    /// Closest exponent with a denominator up to 12, if `value` is representable.
    fn from_f64(value: f64) -> Option<Self> {
        if !value.is_finite() {
            return None;
        }
        (1..=12).find_map(|den| {
            let scaled = value * den as f64;
            let rounded = scaled.round();
            if (scaled - rounded).abs() < 1e-9 && rounded.abs() < i32::MAX as f64 {
                Some(Self::new(rounded as i32, den))
            } else {
                None
            }
        })
    }
}

impl fmt::Display for Exponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.den == 1 {
            write!(f, "{}", self.num)
        } else {
            write!(f, "{}/{}", self.num, self.den)
        }
    }
}

impl std::str::FromStr for Exponent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s.split_once('/') {
            Some((num, den)) => {
                let num: i32 = num.trim().parse().map_err(|_| format!("bad exponent '{s}'"))?;
                let den: i32 = den.trim().parse().map_err(|_| format!("bad exponent '{s}'"))?;
                if den == 0 {
                    return Err(format!("zero denominator in exponent '{s}'"));
                }
                Ok(Self::new(num, den))
            }
            None => s
                .parse::<f64>()
                .ok()
                .and_then(Self::from_f64)
                .ok_or_else(|| format!("bad exponent '{s}'")),
        }
    }
}

const fn i64_to_i32_checked(value: i64) -> i32 {
    if value < i32::MIN as i64 || value > i32::MAX as i64 {
        panic!("dimension exponent overflow");
    }
    value as i32
}

const fn abs_i32(value: i32) -> i32 {
    if value < 0 {
        -value
    } else {
        value
    }
}

const fn gcd_i32(mut a: i32, mut b: i32) -> i32 {
    while b != 0 {
        let r = a % b;
        a = b;
        b = r;
    }
    let a = abs_i32(a);
    if a == 0 {
        1
    } else {
        a
    }
}

pub const N_BASE_DIMENSIONS: usize = 7;

const SYMBOLS: [&str; N_BASE_DIMENSIONS] = ["kg", "m", "s", "K", "mol", "A", "cd"];

/// Physical dimension exponents over the seven SI base quantities.
///
/// Order: mass, length, time, temperature, moles, current, luminous intensity.
/// Exponents are rational so that `sqrt` of an area stays exact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DimensionSet {
    exps: [Exponent; N_BASE_DIMENSIONS],
}

impl DimensionSet {
    pub const MASS: usize = 0;
    pub const LENGTH: usize = 1;
    pub const TIME: usize = 2;
    pub const TEMPERATURE: usize = 3;
    pub const MOLES: usize = 4;
    pub const CURRENT: usize = 5;
    pub const LUMINOUS_INTENSITY: usize = 6;

    /// Integer exponents for mass, length, time, temperature and moles.
    pub const fn new(mass: i8, length: i8, time: i8, temperature: i8, moles: i8) -> Self {
        Self::new_full(mass, length, time, temperature, moles, 0, 0)
    }

    pub const fn new_full(
        mass: i8,
        length: i8,
        time: i8,
        temperature: i8,
        moles: i8,
        current: i8,
        luminous_intensity: i8,
    ) -> Self {
        Self {
            exps: [
                Exponent::from_i32(mass as i32),
                Exponent::from_i32(length as i32),
                Exponent::from_i32(time as i32),
                Exponent::from_i32(temperature as i32),
                Exponent::from_i32(moles as i32),
                Exponent::from_i32(current as i32),
                Exponent::from_i32(luminous_intensity as i32),
            ],
        }
    }

    pub const fn from_exponents(exps: [Exponent; N_BASE_DIMENSIONS]) -> Self {
        Self { exps }
    }

    pub const fn dimensionless() -> Self {
        Self {
            exps: [Exponent::zero(); N_BASE_DIMENSIONS],
        }
    }

    pub const fn exponent(&self, index: usize) -> Exponent {
        self.exps[index]
    }

    pub const fn exponents(&self) -> [Exponent; N_BASE_DIMENSIONS] {
        self.exps
    }

    pub const fn is_dimensionless(&self) -> bool {
        let mut i = 0;
        while i < N_BASE_DIMENSIONS {
            if !self.exps[i].is_zero() {
                return false;
            }
            i += 1;
        }
        true
    }

    pub const fn mul_dim(self, rhs: Self) -> Self {
        let mut exps = self.exps;
        let mut i = 0;
        while i < N_BASE_DIMENSIONS {
            exps[i] = self.exps[i].add_exp(rhs.exps[i]);
            i += 1;
        }
        Self { exps }
    }

    pub const fn div_dim(self, rhs: Self) -> Self {
        let mut exps = self.exps;
        let mut i = 0;
        while i < N_BASE_DIMENSIONS {
            exps[i] = self.exps[i].sub_exp(rhs.exps[i]);
            i += 1;
        }
        Self { exps }
    }

    pub const fn pow_ratio(self, num: i32, den: i32) -> Self {
        let exp = Exponent::new(num, den);
        let mut exps = self.exps;
        let mut i = 0;
        while i < N_BASE_DIMENSIONS {
            exps[i] = self.exps[i].mul_exp(exp);
            i += 1;
        }
        Self { exps }
    }

    pub const fn powi(self, exp: i32) -> Self {
        self.pow_ratio(exp, 1)
    }

    pub const fn sqrt(self) -> Self {
        self.pow_ratio(1, 2)
    }
}

impl Default for DimensionSet {
    fn default() -> Self {
        Self::dimensionless()
    }
}

impl std::ops::Mul for DimensionSet {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self::Output {
        self.mul_dim(rhs)
    }
}

impl std::ops::Div for DimensionSet {
    type Output = Self;

    fn div(self, rhs: Self) -> Self::Output {
        self.div_dim(rhs)
    }
}

impl fmt::Display for DimensionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_dimensionless() {
            return write!(f, "[]");
        }

        let parts: Vec<String> = SYMBOLS
            .iter()
            .zip(self.exps.iter())
            .filter(|(_, exp)| !exp.is_zero())
            .map(|(name, exp)| {
                if exp.is_integer() {
                    format!("{name}^{}", exp.num)
                } else {
                    format!("{name}^({exp})")
                }
            })
            .collect();
        write!(f, "[{}]", parts.join(" "))
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum ExponentRepr {
    Int(i64),
    Float(f64),
    Ratio(String),
}

impl Serialize for DimensionSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let reprs: Vec<ExponentRepr> = self
            .exps
            .iter()
            .map(|exp| {
                if exp.is_integer() {
                    ExponentRepr::Int(exp.num as i64)
                } else {
                    ExponentRepr::Ratio(exp.to_string())
                }
            })
            .collect();
        reprs.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for DimensionSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        use serde::de::Error;

        let reprs = Vec::<ExponentRepr>::deserialize(deserializer)?;
        if reprs.len() != 5 && reprs.len() != N_BASE_DIMENSIONS {
            return Err(D::Error::custom(format!(
                "dimension set needs 5 or 7 exponents, got {}",
                reprs.len()
            )));
        }

        let mut exps = [Exponent::zero(); N_BASE_DIMENSIONS];
        for (slot, repr) in exps.iter_mut().zip(reprs) {
            *slot = match repr {
                ExponentRepr::Int(v) => {
                    let v = i32::try_from(v).map_err(D::Error::custom)?;
                    Exponent::from_i32(v)
                }
                ExponentRepr::Float(v) => Exponent::from_f64(v)
                    .ok_or_else(|| D::Error::custom(format!("bad dimension exponent {v}")))?,
                ExponentRepr::Ratio(s) => s.parse().map_err(D::Error::custom)?,
            };
        }
        Ok(Self { exps })
    }
}

pub mod si {
    use super::DimensionSet;

    pub const DIMENSIONLESS: DimensionSet = DimensionSet::dimensionless();

    pub const MASS: DimensionSet = DimensionSet::new(1, 0, 0, 0, 0);
    pub const LENGTH: DimensionSet = DimensionSet::new(0, 1, 0, 0, 0);
    pub const TIME: DimensionSet = DimensionSet::new(0, 0, 1, 0, 0);
    pub const TEMPERATURE: DimensionSet = DimensionSet::new(0, 0, 0, 1, 0);
    pub const MOLES: DimensionSet = DimensionSet::new(0, 0, 0, 0, 1);
    pub const CURRENT: DimensionSet = DimensionSet::new_full(0, 0, 0, 0, 0, 1, 0);
    pub const LUMINOUS_INTENSITY: DimensionSet = DimensionSet::new_full(0, 0, 0, 0, 0, 0, 1);

    pub const AREA: DimensionSet = LENGTH.powi(2);
    pub const VOLUME: DimensionSet = AREA.mul_dim(LENGTH);
    pub const INV_TIME: DimensionSet = TIME.powi(-1);

    pub const DENSITY: DimensionSet = MASS.div_dim(VOLUME);
    pub const VELOCITY: DimensionSet = LENGTH.div_dim(TIME);
    pub const ACCELERATION: DimensionSet = VELOCITY.div_dim(TIME);

    pub const FORCE: DimensionSet = MASS.mul_dim(ACCELERATION);
    pub const PRESSURE: DimensionSet = FORCE.div_dim(AREA);
    // p/rho, the pressure of incompressible solvers
    pub const KINEMATIC_PRESSURE: DimensionSet = PRESSURE.div_dim(DENSITY);
    pub const DYNAMIC_VISCOSITY: DimensionSet = PRESSURE.mul_dim(TIME);
    pub const KINEMATIC_VISCOSITY: DimensionSet = AREA.div_dim(TIME);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sqrt_halves_exponents() {
        let area = si::AREA;
        assert_eq!(area.sqrt(), si::LENGTH);

        let sqrt_length = si::LENGTH.sqrt();
        assert_eq!(sqrt_length * sqrt_length, si::LENGTH);
        assert!(!sqrt_length.exponent(DimensionSet::LENGTH).is_integer());
    }

    #[test]
    fn derived_units_match_expected_exponents() {
        assert_eq!(si::VOLUME, DimensionSet::new(0, 3, 0, 0, 0));
        assert_eq!(si::DENSITY, DimensionSet::new(1, -3, 0, 0, 0));
        assert_eq!(si::PRESSURE, DimensionSet::new(1, -1, -2, 0, 0));
        assert_eq!(si::KINEMATIC_PRESSURE, DimensionSet::new(0, 2, -2, 0, 0));
        assert_eq!(si::KINEMATIC_VISCOSITY, DimensionSet::new(0, 2, -1, 0, 0));
        assert_eq!(si::CURRENT.exponent(DimensionSet::CURRENT), Exponent::from_i32(1));
    }

    #[test]
    fn display_lists_nonzero_exponents() {
        assert_eq!(si::DIMENSIONLESS.to_string(), "[]");
        assert_eq!(si::PRESSURE.to_string(), "[kg^1 m^-1 s^-2]");
        assert_eq!(si::LENGTH.sqrt().to_string(), "[m^(1/2)]");
    }

    #[test]
    fn deserializes_short_and_rational_forms() {
        let short: DimensionSet = serde_json::from_str("[0, 1, -1, 0, 0]").unwrap();
        assert_eq!(short, si::VELOCITY);

        let full: DimensionSet = serde_json::from_str("[0, \"1/2\", 0, 0, 0, 0, 0]").unwrap();
        assert_eq!(full, si::LENGTH.sqrt());

        let float: DimensionSet = serde_json::from_str("[0, 0.5, 0, 0, 0]").unwrap();
        assert_eq!(float, si::LENGTH.sqrt());

        assert!(serde_json::from_str::<DimensionSet>("[0, 1, 2]").is_err());
    }

    #[test]
    fn serializes_back_to_exponent_array() {
        let text = serde_json::to_string(&si::LENGTH.sqrt()).unwrap();
        assert_eq!(text, "[0,\"1/2\",0,0,0,0,0]");
        let back: DimensionSet = serde_json::from_str(&text).unwrap();
        assert_eq!(back, si::LENGTH.sqrt());
    }
}
