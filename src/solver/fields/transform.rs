//! Patch fields whose value is a tensor-weighted blend of a prescribed value
//! and an extrapolated one: direction-mixed, the slip conditions and the
//! symmetry plane.
//!
//! They share one set of coefficients built from `snGradTransformDiag`, the
//! per-axis implicit weight of the patch-normal gradient:
//!
//! ```text
//! valueInternalCoeffs    = 1 - diag
//! valueBoundaryCoeffs    = value - valueInternalCoeffs . internal
//! gradientInternalCoeffs = -deltaCoeffs * diag
//! gradientBoundaryCoeffs = snGrad - gradientInternalCoeffs . internal
//! ```

use super::patch_field::patch_field_boilerplate;
use super::{PatchContext, PatchField, PatchFieldCore, PatchFieldMapper};
use crate::solver::comms::CommsType;
use crate::solver::dictionary::Dictionary;
use crate::solver::error::{FieldError, FieldResult};
use crate::solver::primitives::{tangential_projector, FieldElement, SymmTensor, Tensor, Vector};

fn diag_masks<T: FieldElement>(diag: &[Vector]) -> Vec<T> {
    diag.iter().map(T::transform_mask).collect()
}

fn value_internal<T: FieldElement>(diag: &[Vector]) -> Vec<T> {
    diag_masks::<T>(diag)
        .into_iter()
        .map(|m| T::one() - m)
        .collect()
}

fn value_boundary<T: FieldElement>(values: &[T], diag: &[Vector], pif: &[T]) -> Vec<T> {
    values
        .iter()
        .zip(value_internal::<T>(diag))
        .zip(pif)
        .map(|((&v, vic), &i)| v - vic.cmpt_multiply(i))
        .collect()
}

fn gradient_internal<T: FieldElement>(diag: &[Vector], delta: &[f64]) -> Vec<T> {
    diag_masks::<T>(diag)
        .into_iter()
        .zip(delta)
        .map(|(m, &dc)| -(m * dc))
        .collect()
}

fn gradient_boundary<T: FieldElement>(sn_grad: &[T], diag: &[Vector], delta: &[f64], pif: &[T]) -> Vec<T> {
    sn_grad
        .iter()
        .zip(gradient_internal::<T>(diag, delta))
        .zip(pif)
        .map(|((&g, gic), &i)| g - gic.cmpt_multiply(i))
        .collect()
}

fn normal_slip_values<T: FieldElement>(pif: &[T], normals: &[Vector]) -> Vec<T> {
    pif.iter()
        .zip(normals)
        .map(|(&i, n)| T::transform(&tangential_projector(n), i))
        .collect()
}

fn abs_normals(ctx_normals: &[Vector]) -> Vec<Vector> {
    ctx_normals.iter().map(|n| n.abs()).collect()
}

fn require_rank<T: FieldElement>(
    ctx: &PatchContext<'_, T>,
    type_name: &'static str,
    min_rank: u8,
) -> FieldResult<()> {
    if T::RANK >= min_rank {
        Ok(())
    } else {
        Err(FieldError::UnsupportedRank {
            type_name,
            min_rank,
            element: T::TYPE_NAME,
            field: ctx.field_name.to_string(),
        })
    }
}

/// Implements the four coefficient functions from a variant's
/// `sn_grad_transform_diag`.
macro_rules! transform_coefficients {
    () => {
        fn value_internal_coeffs(&self, ctx: &PatchContext<'_, T>, _w: &[f64]) -> FieldResult<Vec<T>> {
            Ok(value_internal::<T>(&self.sn_grad_transform_diag(ctx)))
        }

        fn value_boundary_coeffs(&self, ctx: &PatchContext<'_, T>, _w: &[f64]) -> FieldResult<Vec<T>> {
            let pif = ctx.patch_internal_field();
            Ok(value_boundary(
                &self.core.values,
                &self.sn_grad_transform_diag(ctx),
                &pif,
            ))
        }

        fn gradient_internal_coeffs(&self, ctx: &PatchContext<'_, T>) -> FieldResult<Vec<T>> {
            Ok(gradient_internal::<T>(
                &self.sn_grad_transform_diag(ctx),
                ctx.patch().delta_coeffs(),
            ))
        }

        fn gradient_boundary_coeffs(&self, ctx: &PatchContext<'_, T>) -> FieldResult<Vec<T>> {
            let pif = ctx.patch_internal_field();
            Ok(gradient_boundary(
                &self.sn_grad(ctx)?,
                &self.sn_grad_transform_diag(ctx),
                ctx.patch().delta_coeffs(),
                &pif,
            ))
        }

        fn assignable(&self) -> bool {
            false
        }
    };
}

/// Per-face symmetric tensor `valueFraction` F:
/// `value = F.refValue + (I - F).(internal + refGrad/deltaCoeffs)`.
#[derive(Debug, Clone)]
pub struct DirectionMixedPatchField<T> {
    core: PatchFieldCore<T>,
    ref_value: Vec<T>,
    ref_grad: Vec<T>,
    value_fraction: Vec<SymmTensor>,
}

impl<T: FieldElement> DirectionMixedPatchField<T> {
    pub const TYPE_NAME: &'static str = "directionMixed";

    pub fn new(ctx: &PatchContext<'_, T>) -> Self {
        let n = ctx.patch().face_count();
        Self {
            core: PatchFieldCore::zeroed(ctx),
            ref_value: vec![T::zero(); n],
            ref_grad: vec![T::zero(); n],
            value_fraction: vec![SymmTensor::zero(); n],
        }
    }

    pub fn from_dict(ctx: &PatchContext<'_, T>, dict: &Dictionary) -> FieldResult<Self> {
        let core = PatchFieldCore::zeroed(ctx).with_dict(dict)?;
        let mut field = Self {
            ref_value: core.read_field(dict, "refValue")?,
            ref_grad: core.read_field(dict, "refGradient")?,
            value_fraction: core.read_field(dict, "valueFraction")?,
            core,
        };
        field.evaluate(ctx, CommsType::Blocking)?;
        Ok(field)
    }

    pub fn ref_value(&self) -> &[T] {
        &self.ref_value
    }

    pub fn ref_grad(&self) -> &[T] {
        &self.ref_grad
    }

    pub fn value_fraction(&self) -> &[SymmTensor] {
        &self.value_fraction
    }

    pub fn set_ref_value(&mut self, values: Vec<T>) -> FieldResult<()> {
        self.core.check_size("refValue", values.len())?;
        self.ref_value = values;
        Ok(())
    }

    pub fn set_ref_grad(&mut self, values: Vec<T>) -> FieldResult<()> {
        self.core.check_size("refGradient", values.len())?;
        self.ref_grad = values;
        Ok(())
    }

    pub fn set_value_fraction(&mut self, values: Vec<SymmTensor>) -> FieldResult<()> {
        self.core.check_size("valueFraction", values.len())?;
        self.value_fraction = values;
        Ok(())
    }

    fn blended(&self, ctx: &PatchContext<'_, T>) -> Vec<T> {
        let pif = ctx.patch_internal_field();
        self.value_fraction
            .iter()
            .zip(&self.ref_value)
            .zip(&self.ref_grad)
            .zip(ctx.patch().delta_coeffs())
            .zip(pif)
            .map(|((((f, &r), &g), &dc), i)| {
                let f = f.to_tensor();
                let normal_value = T::transform(&f, r);
                let gradient_value = i + g * dc.recip();
                normal_value + T::transform(&(Tensor::identity() - f), gradient_value)
            })
            .collect()
    }

    fn sn_grad_transform_diag(&self, _ctx: &PatchContext<'_, T>) -> Vec<Vector> {
        self.value_fraction
            .iter()
            .map(|f| f.diag().map(|d| d.abs().sqrt()))
            .collect()
    }
}

impl<T: FieldElement> PatchField<T> for DirectionMixedPatchField<T> {
    patch_field_boilerplate!(Self::TYPE_NAME);

    transform_coefficients!();

    fn compute_values(&mut self, ctx: &PatchContext<'_, T>, _comms: CommsType) -> FieldResult<()> {
        self.core.values = self.blended(ctx);
        Ok(())
    }

    fn sn_grad(&self, ctx: &PatchContext<'_, T>) -> FieldResult<Vec<T>> {
        let pif = ctx.patch_internal_field();
        Ok(self
            .blended(ctx)
            .into_iter()
            .zip(pif)
            .zip(ctx.patch().delta_coeffs())
            .map(|((v, i), &dc)| (v - i) * dc)
            .collect())
    }

    fn map_slots(&mut self, mapper: &PatchFieldMapper, pif: &[T]) {
        self.ref_value = mapper.map(&self.ref_value, pif);
        self.ref_grad = mapper.map_or(&self.ref_grad, T::zero());
        self.value_fraction = mapper.map_or(&self.value_fraction, SymmTensor::zero());
    }

    fn write_entries(&self, dict: &mut Dictionary) {
        dict.write_field("refValue", &self.ref_value);
        dict.write_field("refGradient", &self.ref_grad);
        dict.write_field("valueFraction", &self.value_fraction);
    }
}

/// Prescribes the normal component and extrapolates the tangential part:
/// `value = (n n).fixedValue + (I - n n).internal`.
#[derive(Debug, Clone)]
pub struct FixedNormalSlipPatchField<T> {
    core: PatchFieldCore<T>,
    fixed_value: Vec<T>,
}

impl<T: FieldElement> FixedNormalSlipPatchField<T> {
    pub const TYPE_NAME: &'static str = "fixedNormalSlip";

    pub fn new(ctx: &PatchContext<'_, T>) -> FieldResult<Self> {
        require_rank(ctx, Self::TYPE_NAME, 1)?;
        Ok(Self {
            core: PatchFieldCore::zeroed(ctx),
            fixed_value: vec![T::zero(); ctx.patch().face_count()],
        })
    }

    pub fn from_dict(ctx: &PatchContext<'_, T>, dict: &Dictionary) -> FieldResult<Self> {
        require_rank(ctx, Self::TYPE_NAME, 1)?;
        let core = PatchFieldCore::zeroed(ctx).with_dict(dict)?;
        let mut field = Self {
            fixed_value: core.read_field(dict, "fixedValue")?,
            core,
        };
        field.evaluate(ctx, CommsType::Blocking)?;
        Ok(field)
    }

    pub fn fixed_value(&self) -> &[T] {
        &self.fixed_value
    }

    pub fn set_fixed_value(&mut self, values: Vec<T>) -> FieldResult<()> {
        self.core.check_size("fixedValue", values.len())?;
        self.fixed_value = values;
        Ok(())
    }

    fn blended(&self, ctx: &PatchContext<'_, T>) -> Vec<T> {
        let normals = ctx.patch().nf();
        let tangential = normal_slip_values(&ctx.patch_internal_field(), normals);
        self.fixed_value
            .iter()
            .zip(normals)
            .zip(tangential)
            .map(|((&fv, n), t)| T::transform(&(n * n.transpose()), fv) + t)
            .collect()
    }

    fn sn_grad_transform_diag(&self, ctx: &PatchContext<'_, T>) -> Vec<Vector> {
        abs_normals(ctx.patch().nf())
    }
}

impl<T: FieldElement> PatchField<T> for FixedNormalSlipPatchField<T> {
    patch_field_boilerplate!(Self::TYPE_NAME);

    transform_coefficients!();

    fn compute_values(&mut self, ctx: &PatchContext<'_, T>, _comms: CommsType) -> FieldResult<()> {
        self.core.values = self.blended(ctx);
        Ok(())
    }

    fn sn_grad(&self, ctx: &PatchContext<'_, T>) -> FieldResult<Vec<T>> {
        let pif = ctx.patch_internal_field();
        Ok(self
            .blended(ctx)
            .into_iter()
            .zip(pif)
            .zip(ctx.patch().delta_coeffs())
            .map(|((v, i), &dc)| (v - i) * dc)
            .collect())
    }

    fn map_slots(&mut self, mapper: &PatchFieldMapper, _pif: &[T]) {
        self.fixed_value = mapper.map_or(&self.fixed_value, T::zero());
    }

    fn write_entries(&self, dict: &mut Dictionary) {
        dict.write_field("fixedValue", &self.fixed_value);
    }
}

/// Scalar blend between a fixed value and slip:
/// `value = f refValue + (1 - f)(I - n n).internal`.
#[derive(Debug, Clone)]
pub struct MixedFixedValueSlipPatchField<T> {
    core: PatchFieldCore<T>,
    ref_value: Vec<T>,
    value_fraction: Vec<f64>,
}

impl<T: FieldElement> MixedFixedValueSlipPatchField<T> {
    pub const TYPE_NAME: &'static str = "mixedFixedValueSlip";

    pub fn new(ctx: &PatchContext<'_, T>) -> FieldResult<Self> {
        require_rank(ctx, Self::TYPE_NAME, 1)?;
        let n = ctx.patch().face_count();
        Ok(Self {
            core: PatchFieldCore::zeroed(ctx),
            ref_value: vec![T::zero(); n],
            value_fraction: vec![1.0; n],
        })
    }

    pub fn from_dict(ctx: &PatchContext<'_, T>, dict: &Dictionary) -> FieldResult<Self> {
        require_rank(ctx, Self::TYPE_NAME, 1)?;
        let core = PatchFieldCore::zeroed(ctx).with_dict(dict)?;
        let mut field = Self {
            ref_value: core.read_field(dict, "refValue")?,
            value_fraction: core.read_field(dict, "valueFraction")?,
            core,
        };
        field.evaluate(ctx, CommsType::Blocking)?;
        Ok(field)
    }

    pub fn ref_value(&self) -> &[T] {
        &self.ref_value
    }

    pub fn value_fraction(&self) -> &[f64] {
        &self.value_fraction
    }

    pub fn set_ref_value(&mut self, values: Vec<T>) -> FieldResult<()> {
        self.core.check_size("refValue", values.len())?;
        self.ref_value = values;
        Ok(())
    }

    pub fn set_value_fraction(&mut self, values: Vec<f64>) -> FieldResult<()> {
        self.core.check_size("valueFraction", values.len())?;
        self.value_fraction = values;
        Ok(())
    }

    fn blended(&self, ctx: &PatchContext<'_, T>) -> Vec<T> {
        let slip = normal_slip_values(&ctx.patch_internal_field(), ctx.patch().nf());
        self.value_fraction
            .iter()
            .zip(&self.ref_value)
            .zip(slip)
            .map(|((&f, &r), s)| r * f + s * (1.0 - f))
            .collect()
    }

    fn sn_grad_transform_diag(&self, ctx: &PatchContext<'_, T>) -> Vec<Vector> {
        abs_normals(ctx.patch().nf())
            .into_iter()
            .zip(&self.value_fraction)
            .map(|(n, &f)| n.map(|c| f + (1.0 - f) * c))
            .collect()
    }
}

impl<T: FieldElement> PatchField<T> for MixedFixedValueSlipPatchField<T> {
    patch_field_boilerplate!(Self::TYPE_NAME);

    transform_coefficients!();

    fn compute_values(&mut self, ctx: &PatchContext<'_, T>, _comms: CommsType) -> FieldResult<()> {
        self.core.values = self.blended(ctx);
        Ok(())
    }

    fn sn_grad(&self, ctx: &PatchContext<'_, T>) -> FieldResult<Vec<T>> {
        let pif = ctx.patch_internal_field();
        Ok(self
            .blended(ctx)
            .into_iter()
            .zip(pif)
            .zip(ctx.patch().delta_coeffs())
            .map(|((v, i), &dc)| (v - i) * dc)
            .collect())
    }

    fn map_slots(&mut self, mapper: &PatchFieldMapper, pif: &[T]) {
        self.ref_value = mapper.map(&self.ref_value, pif);
        self.value_fraction = mapper.map_or(&self.value_fraction, 0.0);
    }

    fn write_entries(&self, dict: &mut Dictionary) {
        dict.write_field("refValue", &self.ref_value);
        dict.write_field("valueFraction", &self.value_fraction);
    }
}

/// Mirror condition on a `symmetryPlane` patch:
/// `value = (internal + R.internal)/2` with `R = I - 2 n n`.
///
/// Scalars are invariant under reflection, so a scalar field reduces to
/// zero gradient.
#[derive(Debug, Clone)]
pub struct SymmetryPlanePatchField<T> {
    core: PatchFieldCore<T>,
}

impl<T: FieldElement> SymmetryPlanePatchField<T> {
    pub const TYPE_NAME: &'static str = "symmetryPlane";

    pub fn new(ctx: &PatchContext<'_, T>) -> Self {
        Self {
            core: PatchFieldCore::new(ctx, ctx.patch_internal_field()),
        }
    }

    pub fn from_dict(ctx: &PatchContext<'_, T>, dict: &Dictionary) -> FieldResult<Self> {
        let mut field = Self {
            core: PatchFieldCore::zeroed(ctx).with_dict(dict)?,
        };
        field.evaluate(ctx, CommsType::Blocking)?;
        Ok(field)
    }

    /// `(R.internal - internal)/2` per face.
    fn half_reflection_jump(ctx: &PatchContext<'_, T>) -> Vec<T> {
        ctx.patch_internal_field()
            .into_iter()
            .zip(ctx.patch().nf())
            .map(|(i, n)| {
                if T::RANK == 0 {
                    return T::zero();
                }
                let reflect = Tensor::identity() - n * n.transpose() * 2.0;
                (T::transform(&reflect, i) - i) * 0.5
            })
            .collect()
    }

    fn sn_grad_transform_diag(&self, ctx: &PatchContext<'_, T>) -> Vec<Vector> {
        if T::RANK == 0 {
            vec![Vector::zeros(); ctx.patch().face_count()]
        } else {
            abs_normals(ctx.patch().nf())
        }
    }
}

impl<T: FieldElement> PatchField<T> for SymmetryPlanePatchField<T> {
    patch_field_boilerplate!(Self::TYPE_NAME);

    transform_coefficients!();

    fn constraint_type(&self) -> Option<&'static str> {
        Some(Self::TYPE_NAME)
    }

    fn compute_values(&mut self, ctx: &PatchContext<'_, T>, _comms: CommsType) -> FieldResult<()> {
        self.core.values = ctx
            .patch_internal_field()
            .into_iter()
            .zip(Self::half_reflection_jump(ctx))
            .map(|(i, j)| i + j)
            .collect();
        Ok(())
    }

    fn sn_grad(&self, ctx: &PatchContext<'_, T>) -> FieldResult<Vec<T>> {
        Ok(Self::half_reflection_jump(ctx)
            .into_iter()
            .zip(ctx.patch().delta_coeffs())
            .map(|(j, &dc)| j * dc)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::mesh::{FvPatch, Mesh, PatchKind};
    use approx::assert_relative_eq;
    use std::sync::Arc;

    fn wall_mesh(kind: PatchKind, normal: Vector) -> Arc<Mesh> {
        Mesh::builder(2)
            .patch(
                FvPatch::new("wall", kind, vec![0, 1])
                    .with_uniform_delta_coeffs(2.0)
                    .with_uniform_normal(normal),
            )
            .build()
            .unwrap()
    }

    #[test]
    fn direction_mixed_identity_fraction_gives_ref_value() {
        let mesh = wall_mesh(PatchKind::Wall, Vector::x());
        let internal = vec![Vector::new(1.0, 2.0, 3.0); 2];
        let ctx = PatchContext::new(&mesh, 0, &internal, "U");
        let mut pf = DirectionMixedPatchField::new(&ctx);
        let r = Vector::new(5.0, 0.0, -1.0);
        pf.set_ref_value(vec![r; 2]).unwrap();
        pf.set_value_fraction(vec![SymmTensor::identity(); 2]).unwrap();
        pf.evaluate(&ctx, CommsType::Blocking).unwrap();
        assert_eq!(pf.values(), &[r, r]);
        let vic = pf.value_internal_coeffs(&ctx, &[1.0, 1.0]).unwrap();
        assert_eq!(vic[0], Vector::zeros());
    }

    #[test]
    fn fixed_normal_slip_keeps_tangential_part() {
        let mesh = wall_mesh(PatchKind::Wall, Vector::y());
        let internal = vec![Vector::new(1.0, 2.0, 3.0); 2];
        let ctx = PatchContext::new(&mesh, 0, &internal, "U");
        let mut pf = FixedNormalSlipPatchField::new(&ctx).unwrap();
        pf.set_fixed_value(vec![Vector::new(9.0, -4.0, 9.0); 2]).unwrap();
        pf.evaluate(&ctx, CommsType::Blocking).unwrap();
        assert_eq!(pf.values()[0], Vector::new(1.0, -4.0, 3.0));
        let g = pf.sn_grad(&ctx).unwrap();
        assert_relative_eq!(g[1].y, -12.0);
        assert_relative_eq!(g[1].x, 0.0);
    }

    #[test]
    fn slip_conditions_reject_scalar_fields() {
        let mesh = wall_mesh(PatchKind::Wall, Vector::y());
        let internal = vec![0.0; 2];
        let ctx = PatchContext::new(&mesh, 0, &internal, "p");
        assert!(matches!(
            FixedNormalSlipPatchField::new(&ctx),
            Err(FieldError::UnsupportedRank { min_rank: 1, .. })
        ));
        assert!(MixedFixedValueSlipPatchField::new(&ctx).is_err());
    }

    #[test]
    fn symmetry_plane_mirrors_normal_component() {
        let mesh = wall_mesh(PatchKind::SymmetryPlane, Vector::z());
        let internal = vec![Vector::new(1.0, 2.0, 3.0); 2];
        let ctx = PatchContext::new(&mesh, 0, &internal, "U");
        let mut pf = SymmetryPlanePatchField::new(&ctx);
        pf.evaluate(&ctx, CommsType::Blocking).unwrap();
        assert_eq!(pf.values()[0], Vector::new(1.0, 2.0, 0.0));
        assert!(!pf.assignable());

        let scalars = vec![4.0, 5.0];
        let sctx = PatchContext::new(&mesh, 0, &scalars, "p");
        let mut ps = SymmetryPlanePatchField::new(&sctx);
        ps.evaluate(&sctx, CommsType::Blocking).unwrap();
        assert_eq!(ps.values(), &[4.0, 5.0]);
        assert_eq!(ps.value_internal_coeffs(&sctx, &[1.0; 2]).unwrap(), vec![1.0, 1.0]);
    }
}
