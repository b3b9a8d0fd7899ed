use std::fmt;

use super::ExprError;
use crate::solver::primitives::{FieldElement, SymmTensor, Tensor, Vector};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExprKind {
    Scalar,
    Vector,
    SymmTensor,
    Tensor,
    Logical,
}

impl fmt::Display for ExprKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExprKind::Scalar => "scalar",
            ExprKind::Vector => "vector",
            ExprKind::SymmTensor => "symmTensor",
            ExprKind::Tensor => "tensor",
            ExprKind::Logical => "logical",
        };
        f.write_str(name)
    }
}

/// Per-face result of an expression.
#[derive(Debug, Clone, PartialEq)]
pub enum ExprValue {
    Scalar(Vec<f64>),
    Vector(Vec<Vector>),
    SymmTensor(Vec<SymmTensor>),
    Tensor(Vec<Tensor>),
    Logical(Vec<bool>),
}

fn zip_map<A: Copy, B: Copy, C>(a: &[A], b: &[B], f: impl Fn(A, B) -> C) -> Vec<C> {
    a.iter().zip(b).map(|(&x, &y)| f(x, y)).collect()
}

fn map<A: Copy, C>(a: &[A], f: impl Fn(A) -> C) -> Vec<C> {
    a.iter().map(|&x| f(x)).collect()
}

impl ExprValue {
    pub fn kind(&self) -> ExprKind {
        match self {
            ExprValue::Scalar(_) => ExprKind::Scalar,
            ExprValue::Vector(_) => ExprKind::Vector,
            ExprValue::SymmTensor(_) => ExprKind::SymmTensor,
            ExprValue::Tensor(_) => ExprKind::Tensor,
            ExprValue::Logical(_) => ExprKind::Logical,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ExprValue::Scalar(v) => v.len(),
            ExprValue::Vector(v) => v.len(),
            ExprValue::SymmTensor(v) => v.len(),
            ExprValue::Tensor(v) => v.len(),
            ExprValue::Logical(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn uniform_scalar(value: f64, n: usize) -> Self {
        ExprValue::Scalar(vec![value; n])
    }

    /// Wraps a typed field, selecting the variant from the element rank.
    pub fn from_field<T: FieldElement>(values: &[T]) -> Self {
        fn convert<T: FieldElement, U: FieldElement>(values: &[T]) -> Vec<U> {
            values
                .iter()
                .map(|v| U::from_components(&v.to_components()))
                .collect()
        }
        match (T::RANK, T::N_COMPONENTS) {
            (0, _) => ExprValue::Scalar(convert(values)),
            (1, _) => ExprValue::Vector(convert(values)),
            (_, 6) => ExprValue::SymmTensor(convert(values)),
            _ => ExprValue::Tensor(convert(values)),
        }
    }

    /// Converts to a typed field; the rank must match exactly.
    pub fn into_field<T: FieldElement>(self) -> Result<Vec<T>, ExprError> {
        let expected = match (T::RANK, T::N_COMPONENTS) {
            (0, _) => ExprKind::Scalar,
            (1, _) => ExprKind::Vector,
            (_, 6) => ExprKind::SymmTensor,
            _ => ExprKind::Tensor,
        };
        if self.kind() != expected {
            return Err(ExprError::RankMismatch {
                expected: T::TYPE_NAME,
                actual: self.kind(),
            });
        }
        fn convert<U: FieldElement, T: FieldElement>(values: &[U]) -> Vec<T> {
            values
                .iter()
                .map(|v| T::from_components(&FieldElement::to_components(v)))
                .collect()
        }
        Ok(match &self {
            ExprValue::Scalar(v) => convert(v),
            ExprValue::Vector(v) => convert(v),
            ExprValue::SymmTensor(v) => convert(v),
            ExprValue::Tensor(v) => convert(v),
            ExprValue::Logical(_) => Vec::new(),
        })
    }

    pub fn as_scalar(&self, op: &str) -> Result<&[f64], ExprError> {
        match self {
            ExprValue::Scalar(v) => Ok(v),
            other => Err(ExprError::InvalidOperand {
                op: op.to_string(),
                kind: other.kind(),
            }),
        }
    }

    pub fn as_logical(&self, op: &str) -> Result<&[bool], ExprError> {
        match self {
            ExprValue::Logical(v) => Ok(v),
            other => Err(ExprError::InvalidOperand {
                op: op.to_string(),
                kind: other.kind(),
            }),
        }
    }

    fn mismatch(op: &str, lhs: &ExprValue, rhs: &ExprValue) -> ExprError {
        ExprError::TypeMismatch {
            op: op.to_string(),
            lhs: lhs.kind(),
            rhs: rhs.kind(),
        }
    }

    fn invalid(op: &str, value: &ExprValue) -> ExprError {
        ExprError::InvalidOperand {
            op: op.to_string(),
            kind: value.kind(),
        }
    }

    pub fn add(&self, rhs: &ExprValue) -> Result<ExprValue, ExprError> {
        use ExprValue::*;
        Ok(match (self, rhs) {
            (Scalar(a), Scalar(b)) => Scalar(zip_map(a, b, |x, y| x + y)),
            (Vector(a), Vector(b)) => Vector(zip_map(a, b, |x, y| x + y)),
            (SymmTensor(a), SymmTensor(b)) => SymmTensor(zip_map(a, b, |x, y| x + y)),
            (Tensor(a), Tensor(b)) => Tensor(zip_map(a, b, |x, y| x + y)),
            (SymmTensor(a), Tensor(b)) => Tensor(zip_map(a, b, |x, y| x.to_tensor() + y)),
            (Tensor(a), SymmTensor(b)) => Tensor(zip_map(a, b, |x, y| x + y.to_tensor())),
            _ => return Err(Self::mismatch("+", self, rhs)),
        })
    }

    pub fn sub(&self, rhs: &ExprValue) -> Result<ExprValue, ExprError> {
        self.add(&rhs.negate().map_err(|_| Self::mismatch("-", self, rhs))?)
            .map_err(|_| Self::mismatch("-", self, rhs))
    }

    pub fn negate(&self) -> Result<ExprValue, ExprError> {
        use ExprValue::*;
        Ok(match self {
            Scalar(a) => Scalar(map(a, |x| -x)),
            Vector(a) => Vector(map(a, |x| -x)),
            SymmTensor(a) => SymmTensor(map(a, |x| -x)),
            Tensor(a) => Tensor(map(a, |x| -x)),
            Logical(_) => return Err(Self::invalid("-", self)),
        })
    }

    pub fn scale(&self, s: &[f64]) -> Result<ExprValue, ExprError> {
        use ExprValue::*;
        Ok(match self {
            Scalar(a) => Scalar(zip_map(a, s, |x, y| x * y)),
            Vector(a) => Vector(zip_map(a, s, |x, y| x * y)),
            SymmTensor(a) => SymmTensor(zip_map(a, s, |x, y| x * y)),
            Tensor(a) => Tensor(zip_map(a, s, |x, y| x * y)),
            Logical(_) => return Err(Self::invalid("*", self)),
        })
    }

    pub fn mul(&self, rhs: &ExprValue) -> Result<ExprValue, ExprError> {
        use ExprValue::*;
        match (self, rhs) {
            (Scalar(s), other) | (other, Scalar(s)) if other.kind() != ExprKind::Logical => {
                other.scale(s)
            }
            // outer product
            (Vector(a), Vector(b)) => Ok(Tensor(zip_map(a, b, |x, y| x * y.transpose()))),
            _ => Err(Self::mismatch("*", self, rhs)),
        }
    }

    pub fn div(&self, rhs: &ExprValue) -> Result<ExprValue, ExprError> {
        match rhs {
            ExprValue::Scalar(s) => self
                .scale(&map(s, f64::recip))
                .map_err(|_| Self::mismatch("/", self, rhs)),
            _ => Err(Self::mismatch("/", self, rhs)),
        }
    }

    pub fn inner(&self, rhs: &ExprValue) -> Result<ExprValue, ExprError> {
        use ExprValue::*;
        Ok(match (self, rhs) {
            (Vector(a), Vector(b)) => Scalar(zip_map(a, b, |x, y| x.dot(&y))),
            (Tensor(a), Vector(b)) => Vector(zip_map(a, b, |x, y| x * y)),
            (SymmTensor(a), Vector(b)) => Vector(zip_map(a, b, |x, y| x.dot(&y))),
            (Vector(a), Tensor(b)) => Vector(zip_map(a, b, |x, y| y.transpose() * x)),
            (Vector(a), SymmTensor(b)) => Vector(zip_map(a, b, |x, y| y.dot(&x))),
            (Tensor(a), Tensor(b)) => Tensor(zip_map(a, b, |x, y| x * y)),
            _ => return Err(Self::mismatch("&", self, rhs)),
        })
    }

    pub fn cross(&self, rhs: &ExprValue) -> Result<ExprValue, ExprError> {
        match (self, rhs) {
            (ExprValue::Vector(a), ExprValue::Vector(b)) => {
                Ok(ExprValue::Vector(zip_map(a, b, |x, y| x.cross(&y))))
            }
            _ => Err(Self::mismatch("^", self, rhs)),
        }
    }

    pub fn compare(&self, rhs: &ExprValue, op: &str, f: impl Fn(f64, f64) -> bool) -> Result<ExprValue, ExprError> {
        match (self, rhs) {
            (ExprValue::Scalar(a), ExprValue::Scalar(b)) => {
                Ok(ExprValue::Logical(zip_map(a, b, f)))
            }
            _ => Err(Self::mismatch(op, self, rhs)),
        }
    }

    pub fn logical(&self, rhs: &ExprValue, op: &str, f: impl Fn(bool, bool) -> bool) -> Result<ExprValue, ExprError> {
        match (self, rhs) {
            (ExprValue::Logical(a), ExprValue::Logical(b)) => {
                Ok(ExprValue::Logical(zip_map(a, b, f)))
            }
            _ => Err(Self::mismatch(op, self, rhs)),
        }
    }

    /// Face-wise selection between two values of the same kind.
    pub fn select(cond: &[bool], a: &ExprValue, b: &ExprValue) -> Result<ExprValue, ExprError> {
        use ExprValue::*;
        fn pick<T: Copy>(c: &[bool], a: &[T], b: &[T]) -> Vec<T> {
            c.iter()
                .zip(a.iter().zip(b))
                .map(|(&c, (&x, &y))| if c { x } else { y })
                .collect()
        }
        Ok(match (a, b) {
            (Scalar(x), Scalar(y)) => Scalar(pick(cond, x, y)),
            (Vector(x), Vector(y)) => Vector(pick(cond, x, y)),
            (SymmTensor(x), SymmTensor(y)) => SymmTensor(pick(cond, x, y)),
            (Tensor(x), Tensor(y)) => Tensor(pick(cond, x, y)),
            (Logical(x), Logical(y)) => Logical(pick(cond, x, y)),
            _ => return Err(Self::mismatch("?:", a, b)),
        })
    }

    pub fn component(&self, name: &str) -> Result<ExprValue, ExprError> {
        let unknown = || ExprError::UnknownComponent {
            component: name.to_string(),
            kind: self.kind(),
        };
        fn axis(c: char) -> Option<usize> {
            match c {
                'x' => Some(0),
                'y' => Some(1),
                'z' => Some(2),
                _ => None,
            }
        }
        let indices: Option<Vec<usize>> = name.chars().map(axis).collect();
        let indices = indices.ok_or_else(unknown)?;
        let tensor_index = || match indices.as_slice() {
            &[r, c] => Some((r, c)),
            _ => None,
        };
        match self {
            ExprValue::Vector(v) => {
                let d = match indices.as_slice() {
                    &[d] => d,
                    _ => return Err(unknown()),
                };
                Ok(ExprValue::Scalar(map(v, |x| x[d])))
            }
            ExprValue::Tensor(t) => {
                let (r, c) = tensor_index().ok_or_else(unknown)?;
                Ok(ExprValue::Scalar(map(t, |x| x[(r, c)])))
            }
            ExprValue::SymmTensor(t) => {
                let (r, c) = tensor_index().ok_or_else(unknown)?;
                Ok(ExprValue::Scalar(map(t, |x| x.to_tensor()[(r, c)])))
            }
            _ => Err(unknown()),
        }
    }

    pub fn mag(&self) -> Result<ExprValue, ExprError> {
        use ExprValue::*;
        Ok(Scalar(match self {
            Scalar(a) => map(a, f64::abs),
            Vector(a) => map(a, |x| x.norm()),
            SymmTensor(a) => map(a, |x| FieldElement::mag(&x)),
            Tensor(a) => map(a, |x| x.norm()),
            Logical(_) => return Err(Self::invalid("mag", self)),
        }))
    }

    /// Reduces to a single value broadcast back over the faces.
    pub fn reduce_scalar(&self, op: &str, f: impl Fn(&[f64]) -> f64) -> Result<ExprValue, ExprError> {
        let values = self.as_scalar(op)?;
        Ok(ExprValue::Scalar(vec![f(values); values.len()]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_conversion_checks_rank() {
        let v = ExprValue::Scalar(vec![1.0, 2.0]);
        assert_eq!(v.clone().into_field::<f64>().unwrap(), vec![1.0, 2.0]);
        let err = v.into_field::<Vector>().unwrap_err();
        assert_eq!(
            err,
            ExprError::RankMismatch {
                expected: "vector",
                actual: ExprKind::Scalar
            }
        );
    }

    #[test]
    fn round_trips_symm_tensor_fields() {
        let s = vec![SymmTensor::identity(), SymmTensor::zero()];
        let value = ExprValue::from_field(&s);
        assert_eq!(value.kind(), ExprKind::SymmTensor);
        assert_eq!(value.into_field::<SymmTensor>().unwrap(), s);
    }

    #[test]
    fn arithmetic_follows_tensor_algebra() {
        let a = ExprValue::Vector(vec![Vector::new(1.0, 2.0, 3.0)]);
        let b = ExprValue::Vector(vec![Vector::new(0.0, 1.0, 0.0)]);
        assert_eq!(a.inner(&b).unwrap(), ExprValue::Scalar(vec![2.0]));
        assert_eq!(
            a.cross(&b).unwrap(),
            ExprValue::Vector(vec![Vector::new(-3.0, 0.0, 1.0)])
        );
        let two = ExprValue::Scalar(vec![2.0]);
        assert_eq!(
            two.mul(&a).unwrap(),
            ExprValue::Vector(vec![Vector::new(2.0, 4.0, 6.0)])
        );
        assert!(a.add(&two).is_err());
        assert_eq!(a.component("z").unwrap(), ExprValue::Scalar(vec![3.0]));
        assert!(a.component("w").is_err());
    }
}
