use std::fmt::Debug;
use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};
use std::sync::OnceLock;

use nalgebra::{Matrix3, Vector3};
use num_traits::Zero;

use crate::solver::fields::registry::PatchFieldRegistry;

pub type Scalar = f64;
pub type Vector = Vector3<f64>;
pub type Tensor = Matrix3<f64>;

/// Symmetric second-rank tensor stored as its six independent components.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SymmTensor {
    pub xx: f64,
    pub xy: f64,
    pub xz: f64,
    pub yy: f64,
    pub yz: f64,
    pub zz: f64,
}

impl SymmTensor {
    pub const fn new(xx: f64, xy: f64, xz: f64, yy: f64, yz: f64, zz: f64) -> Self {
        Self {
            xx,
            xy,
            xz,
            yy,
            yz,
            zz,
        }
    }

    pub const fn identity() -> Self {
        Self::new(1.0, 0.0, 0.0, 1.0, 0.0, 1.0)
    }

    pub const fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0, 0.0, 0.0, 0.0)
    }

    pub fn diagonal(d: f64) -> Self {
        Self::new(d, 0.0, 0.0, d, 0.0, d)
    }

    /// Outer product `v v^T`.
    pub fn sqr(v: &Vector) -> Self {
        Self::new(
            v.x * v.x,
            v.x * v.y,
            v.x * v.z,
            v.y * v.y,
            v.y * v.z,
            v.z * v.z,
        )
    }

    /// Symmetric part of a full tensor.
    pub fn symm(t: &Tensor) -> Self {
        Self::new(
            t[(0, 0)],
            0.5 * (t[(0, 1)] + t[(1, 0)]),
            0.5 * (t[(0, 2)] + t[(2, 0)]),
            t[(1, 1)],
            0.5 * (t[(1, 2)] + t[(2, 1)]),
            t[(2, 2)],
        )
    }

    pub fn to_tensor(&self) -> Tensor {
        Tensor::new(
            self.xx, self.xy, self.xz, self.xy, self.yy, self.yz, self.xz, self.yz, self.zz,
        )
    }

    pub fn diag(&self) -> Vector {
        Vector::new(self.xx, self.yy, self.zz)
    }

    pub fn trace(&self) -> f64 {
        self.xx + self.yy + self.zz
    }

    pub fn dot(&self, v: &Vector) -> Vector {
        self.to_tensor() * v
    }

    fn components(&self) -> [f64; 6] {
        [self.xx, self.xy, self.xz, self.yy, self.yz, self.zz]
    }

    fn map2(self, rhs: Self, f: impl Fn(f64, f64) -> f64) -> Self {
        Self::new(
            f(self.xx, rhs.xx),
            f(self.xy, rhs.xy),
            f(self.xz, rhs.xz),
            f(self.yy, rhs.yy),
            f(self.yz, rhs.yz),
            f(self.zz, rhs.zz),
        )
    }
}

impl Add for SymmTensor {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        self.map2(rhs, |a, b| a + b)
    }
}

impl Sub for SymmTensor {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        self.map2(rhs, |a, b| a - b)
    }
}

impl Neg for SymmTensor {
    type Output = Self;

    fn neg(self) -> Self {
        self * -1.0
    }
}

impl Mul<f64> for SymmTensor {
    type Output = Self;

    fn mul(self, rhs: f64) -> Self {
        Self::new(
            self.xx * rhs,
            self.xy * rhs,
            self.xz * rhs,
            self.yy * rhs,
            self.yz * rhs,
            self.zz * rhs,
        )
    }
}

impl AddAssign for SymmTensor {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl SubAssign for SymmTensor {
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}

/// Element type of a field: scalar, vector, symmetric tensor or tensor.
///
/// Rank-generic boundary algebra (`transform`, component-wise products and the
/// per-axis masks used by the implicit coefficients) is expressed through this
/// trait so that every patch-field policy is written once.
pub trait FieldElement:
    Copy
    + Debug
    + PartialEq
    + Send
    + Sync
    + 'static
    + Add<Output = Self>
    + Sub<Output = Self>
    + Neg<Output = Self>
    + Mul<f64, Output = Self>
    + AddAssign
    + SubAssign
{
    const RANK: u8;
    const N_COMPONENTS: usize;
    const TYPE_NAME: &'static str;

    fn zero() -> Self;

    /// All components equal to one.
    fn one() -> Self;

    fn component(&self, d: usize) -> f64;

    /// Builds an element from exactly `N_COMPONENTS` values.
    fn from_components(c: &[f64]) -> Self;

    /// `tr . v` generalised to the element rank: scalars scale by the isotropic
    /// part `tr(t)/3`, vectors take `t v`, tensors take `t A t^T`.
    fn transform(t: &Tensor, v: Self) -> Self;

    /// Per-axis diagonal weights raised to the element rank.
    fn transform_mask(diag: &Vector) -> Self;

    /// Table of built-in patch-field constructors for this element type.
    fn registry() -> &'static PatchFieldRegistry<Self>;

    fn cmpt_multiply(self, rhs: Self) -> Self {
        let c: Vec<f64> = (0..Self::N_COMPONENTS)
            .map(|d| self.component(d) * rhs.component(d))
            .collect();
        Self::from_components(&c)
    }

    fn mag_sqr(&self) -> f64 {
        (0..Self::N_COMPONENTS)
            .map(|d| self.component(d) * self.component(d))
            .sum()
    }

    fn mag(&self) -> f64 {
        self.mag_sqr().sqrt()
    }

    fn to_components(&self) -> Vec<f64> {
        (0..Self::N_COMPONENTS).map(|d| self.component(d)).collect()
    }
}

impl FieldElement for f64 {
    const RANK: u8 = 0;
    const N_COMPONENTS: usize = 1;
    const TYPE_NAME: &'static str = "scalar";

    fn zero() -> Self {
        0.0
    }

    fn one() -> Self {
        1.0
    }

    fn component(&self, _d: usize) -> f64 {
        *self
    }

    fn from_components(c: &[f64]) -> Self {
        c[0]
    }

    fn transform(t: &Tensor, v: Self) -> Self {
        v * t.trace() / 3.0
    }

    fn transform_mask(diag: &Vector) -> Self {
        diag.sum() / 3.0
    }

    fn registry() -> &'static PatchFieldRegistry<Self> {
        static REGISTRY: OnceLock<PatchFieldRegistry<f64>> = OnceLock::new();
        REGISTRY.get_or_init(PatchFieldRegistry::builtin)
    }

    fn cmpt_multiply(self, rhs: Self) -> Self {
        self * rhs
    }

    fn mag(&self) -> f64 {
        self.abs()
    }
}

impl FieldElement for Vector {
    const RANK: u8 = 1;
    const N_COMPONENTS: usize = 3;
    const TYPE_NAME: &'static str = "vector";

    fn zero() -> Self {
        <Vector as Zero>::zero()
    }

    fn one() -> Self {
        Vector::repeat(1.0)
    }

    fn component(&self, d: usize) -> f64 {
        self[d]
    }

    fn from_components(c: &[f64]) -> Self {
        Vector::new(c[0], c[1], c[2])
    }

    fn transform(t: &Tensor, v: Self) -> Self {
        t * v
    }

    fn transform_mask(diag: &Vector) -> Self {
        *diag
    }

    fn registry() -> &'static PatchFieldRegistry<Self> {
        static REGISTRY: OnceLock<PatchFieldRegistry<Vector>> = OnceLock::new();
        REGISTRY.get_or_init(PatchFieldRegistry::builtin)
    }

    fn cmpt_multiply(self, rhs: Self) -> Self {
        self.component_mul(&rhs)
    }

    fn mag(&self) -> f64 {
        self.norm()
    }
}

impl FieldElement for SymmTensor {
    const RANK: u8 = 2;
    const N_COMPONENTS: usize = 6;
    const TYPE_NAME: &'static str = "symmTensor";

    fn zero() -> Self {
        SymmTensor::zero()
    }

    fn one() -> Self {
        SymmTensor::new(1.0, 1.0, 1.0, 1.0, 1.0, 1.0)
    }

    fn component(&self, d: usize) -> f64 {
        self.components()[d]
    }

    fn from_components(c: &[f64]) -> Self {
        SymmTensor::new(c[0], c[1], c[2], c[3], c[4], c[5])
    }

    fn transform(t: &Tensor, v: Self) -> Self {
        SymmTensor::symm(&(t * v.to_tensor() * t.transpose()))
    }

    fn transform_mask(diag: &Vector) -> Self {
        SymmTensor::sqr(diag)
    }

    fn registry() -> &'static PatchFieldRegistry<Self> {
        static REGISTRY: OnceLock<PatchFieldRegistry<SymmTensor>> = OnceLock::new();
        REGISTRY.get_or_init(PatchFieldRegistry::builtin)
    }

    fn cmpt_multiply(self, rhs: Self) -> Self {
        self.map2(rhs, |a, b| a * b)
    }
}

impl FieldElement for Tensor {
    const RANK: u8 = 2;
    const N_COMPONENTS: usize = 9;
    const TYPE_NAME: &'static str = "tensor";

    fn zero() -> Self {
        <Tensor as Zero>::zero()
    }

    fn one() -> Self {
        Tensor::repeat(1.0)
    }

    fn component(&self, d: usize) -> f64 {
        self[(d / 3, d % 3)]
    }

    fn from_components(c: &[f64]) -> Self {
        Tensor::from_row_slice(&c[..9])
    }

    fn transform(t: &Tensor, v: Self) -> Self {
        t * v * t.transpose()
    }

    fn transform_mask(diag: &Vector) -> Self {
        diag * diag.transpose()
    }

    fn registry() -> &'static PatchFieldRegistry<Self> {
        static REGISTRY: OnceLock<PatchFieldRegistry<Tensor>> = OnceLock::new();
        REGISTRY.get_or_init(PatchFieldRegistry::builtin)
    }

    fn cmpt_multiply(self, rhs: Self) -> Self {
        self.component_mul(&rhs)
    }
}

/// `I - n n^T`, the projection onto the plane normal to `n`.
pub fn tangential_projector(n: &Vector) -> Tensor {
    Tensor::identity() - n * n.transpose()
}

pub fn outer(a: &Vector, b: &Vector) -> Tensor {
    a * b.transpose()
}

pub fn abs_components(v: &Vector) -> Vector {
    v.abs()
}
