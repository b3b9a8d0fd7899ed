//! Non-coupled patch fields: calculated, fixed value, zero and fixed
//! gradient, and the scalar-weighted mixed condition.

use log::warn;

use super::patch_field::{patch_field_boilerplate, scaled, uniform_scaled};
use super::{PatchContext, PatchField, PatchFieldCore, PatchFieldMapper};
use crate::solver::comms::CommsType;
use crate::solver::dictionary::Dictionary;
use crate::solver::error::{FieldError, FieldResult};
use crate::solver::primitives::FieldElement;

/// Value set externally; has no coefficients.
#[derive(Debug, Clone)]
pub struct CalculatedPatchField<T> {
    core: PatchFieldCore<T>,
}

impl<T: FieldElement> CalculatedPatchField<T> {
    pub const TYPE_NAME: &'static str = "calculated";

    pub fn new(ctx: &PatchContext<'_, T>) -> Self {
        Self {
            core: PatchFieldCore::zeroed(ctx),
        }
    }

    pub fn from_dict(ctx: &PatchContext<'_, T>, dict: &Dictionary) -> FieldResult<Self> {
        let mut core = PatchFieldCore::zeroed(ctx).with_dict(dict)?;
        match core.read_optional(dict, "value")? {
            Some(values) => core.values = values,
            None => warn!(
                "no 'value' for calculated patch {} of field {} in {}, using zero",
                core.patch_name,
                core.field_name,
                dict.path()
            ),
        }
        Ok(Self { core })
    }

    fn unavailable(&self, op: &'static str) -> FieldError {
        FieldError::CalculatedCoefficients {
            op,
            patch: self.core.patch_name.clone(),
            field: self.core.field_name.clone(),
        }
    }
}

impl<T: FieldElement> PatchField<T> for CalculatedPatchField<T> {
    patch_field_boilerplate!(Self::TYPE_NAME);

    fn value_internal_coeffs(&self, _ctx: &PatchContext<'_, T>, _w: &[f64]) -> FieldResult<Vec<T>> {
        Err(self.unavailable("valueInternalCoeffs"))
    }

    fn value_boundary_coeffs(&self, _ctx: &PatchContext<'_, T>, _w: &[f64]) -> FieldResult<Vec<T>> {
        Err(self.unavailable("valueBoundaryCoeffs"))
    }

    fn gradient_internal_coeffs(&self, _ctx: &PatchContext<'_, T>) -> FieldResult<Vec<T>> {
        Err(self.unavailable("gradientInternalCoeffs"))
    }

    fn gradient_boundary_coeffs(&self, _ctx: &PatchContext<'_, T>) -> FieldResult<Vec<T>> {
        Err(self.unavailable("gradientBoundaryCoeffs"))
    }
}

#[derive(Debug, Clone)]
pub struct FixedValuePatchField<T> {
    core: PatchFieldCore<T>,
}

impl<T: FieldElement> FixedValuePatchField<T> {
    pub const TYPE_NAME: &'static str = "fixedValue";

    pub fn new(ctx: &PatchContext<'_, T>) -> Self {
        Self {
            core: PatchFieldCore::zeroed(ctx),
        }
    }

    pub fn from_dict(ctx: &PatchContext<'_, T>, dict: &Dictionary) -> FieldResult<Self> {
        let mut core = PatchFieldCore::zeroed(ctx).with_dict(dict)?;
        core.values = core.read_field(dict, "value")?;
        Ok(Self { core })
    }
}

impl<T: FieldElement> PatchField<T> for FixedValuePatchField<T> {
    patch_field_boilerplate!(Self::TYPE_NAME);

    fn fixes_value(&self) -> bool {
        true
    }

    fn value_internal_coeffs(&self, _ctx: &PatchContext<'_, T>, _w: &[f64]) -> FieldResult<Vec<T>> {
        Ok(vec![T::zero(); self.size()])
    }

    fn value_boundary_coeffs(&self, _ctx: &PatchContext<'_, T>, _w: &[f64]) -> FieldResult<Vec<T>> {
        Ok(self.core.values.clone())
    }

    fn gradient_internal_coeffs(&self, ctx: &PatchContext<'_, T>) -> FieldResult<Vec<T>> {
        Ok(uniform_scaled(-T::one(), ctx.patch().delta_coeffs()))
    }

    fn gradient_boundary_coeffs(&self, ctx: &PatchContext<'_, T>) -> FieldResult<Vec<T>> {
        Ok(scaled(&self.core.values, ctx.patch().delta_coeffs()))
    }
}

/// Copies the adjacent cell values onto the patch.
#[derive(Debug, Clone)]
pub struct ZeroGradientPatchField<T> {
    core: PatchFieldCore<T>,
}

impl<T: FieldElement> ZeroGradientPatchField<T> {
    pub const TYPE_NAME: &'static str = "zeroGradient";

    pub fn new(ctx: &PatchContext<'_, T>) -> Self {
        Self {
            core: PatchFieldCore::new(ctx, ctx.patch_internal_field()),
        }
    }

    pub fn from_dict(ctx: &PatchContext<'_, T>, dict: &Dictionary) -> FieldResult<Self> {
        let core = PatchFieldCore::new(ctx, ctx.patch_internal_field()).with_dict(dict)?;
        Ok(Self { core })
    }
}

impl<T: FieldElement> PatchField<T> for ZeroGradientPatchField<T> {
    patch_field_boilerplate!(Self::TYPE_NAME);

    fn compute_values(&mut self, ctx: &PatchContext<'_, T>, _comms: CommsType) -> FieldResult<()> {
        self.core.values = ctx.patch_internal_field();
        Ok(())
    }

    fn sn_grad(&self, _ctx: &PatchContext<'_, T>) -> FieldResult<Vec<T>> {
        Ok(vec![T::zero(); self.size()])
    }

    fn value_internal_coeffs(&self, _ctx: &PatchContext<'_, T>, _w: &[f64]) -> FieldResult<Vec<T>> {
        Ok(vec![T::one(); self.size()])
    }

    fn value_boundary_coeffs(&self, _ctx: &PatchContext<'_, T>, _w: &[f64]) -> FieldResult<Vec<T>> {
        Ok(vec![T::zero(); self.size()])
    }

    fn gradient_internal_coeffs(&self, _ctx: &PatchContext<'_, T>) -> FieldResult<Vec<T>> {
        Ok(vec![T::zero(); self.size()])
    }

    fn gradient_boundary_coeffs(&self, _ctx: &PatchContext<'_, T>) -> FieldResult<Vec<T>> {
        Ok(vec![T::zero(); self.size()])
    }
}

#[derive(Debug, Clone)]
pub struct FixedGradientPatchField<T> {
    core: PatchFieldCore<T>,
    gradient: Vec<T>,
}

impl<T: FieldElement> FixedGradientPatchField<T> {
    pub const TYPE_NAME: &'static str = "fixedGradient";

    pub fn new(ctx: &PatchContext<'_, T>) -> Self {
        Self {
            core: PatchFieldCore::new(ctx, ctx.patch_internal_field()),
            gradient: vec![T::zero(); ctx.patch().face_count()],
        }
    }

    pub fn from_dict(ctx: &PatchContext<'_, T>, dict: &Dictionary) -> FieldResult<Self> {
        let core = PatchFieldCore::zeroed(ctx).with_dict(dict)?;
        let gradient = core.read_field(dict, "gradient")?;
        let mut field = Self { core, gradient };
        field.evaluate(ctx, CommsType::Blocking)?;
        Ok(field)
    }

    pub fn gradient(&self) -> &[T] {
        &self.gradient
    }

    pub fn set_gradient(&mut self, gradient: Vec<T>) -> FieldResult<()> {
        self.core.check_size("gradient", gradient.len())?;
        self.gradient = gradient;
        Ok(())
    }

    fn gradient_over_delta(&self, ctx: &PatchContext<'_, T>) -> Vec<T> {
        self.gradient
            .iter()
            .zip(ctx.patch().delta_coeffs())
            .map(|(&g, &dc)| g * dc.recip())
            .collect()
    }
}

impl<T: FieldElement> PatchField<T> for FixedGradientPatchField<T> {
    patch_field_boilerplate!(Self::TYPE_NAME);

    fn fixes_gradient(&self) -> bool {
        true
    }

    fn compute_values(&mut self, ctx: &PatchContext<'_, T>, _comms: CommsType) -> FieldResult<()> {
        let pif = ctx.patch_internal_field();
        self.core.values = pif
            .into_iter()
            .zip(self.gradient_over_delta(ctx))
            .map(|(i, g)| i + g)
            .collect();
        Ok(())
    }

    fn sn_grad(&self, _ctx: &PatchContext<'_, T>) -> FieldResult<Vec<T>> {
        Ok(self.gradient.clone())
    }

    fn value_internal_coeffs(&self, _ctx: &PatchContext<'_, T>, _w: &[f64]) -> FieldResult<Vec<T>> {
        Ok(vec![T::one(); self.size()])
    }

    fn value_boundary_coeffs(&self, ctx: &PatchContext<'_, T>, _w: &[f64]) -> FieldResult<Vec<T>> {
        Ok(self.gradient_over_delta(ctx))
    }

    fn gradient_internal_coeffs(&self, _ctx: &PatchContext<'_, T>) -> FieldResult<Vec<T>> {
        Ok(vec![T::zero(); self.size()])
    }

    fn gradient_boundary_coeffs(&self, _ctx: &PatchContext<'_, T>) -> FieldResult<Vec<T>> {
        Ok(self.gradient.clone())
    }

    fn map_slots(&mut self, mapper: &PatchFieldMapper, _pif: &[T]) {
        self.gradient = mapper.map_or(&self.gradient, T::zero());
    }

    fn write_entries(&self, dict: &mut Dictionary) {
        dict.write_field("gradient", &self.gradient);
    }
}

/// Blend of a fixed value and a fixed gradient weighted by a scalar
/// `valueFraction` per face.
#[derive(Debug, Clone)]
pub struct MixedPatchField<T> {
    core: PatchFieldCore<T>,
    ref_value: Vec<T>,
    ref_grad: Vec<T>,
    value_fraction: Vec<f64>,
}

impl<T: FieldElement> MixedPatchField<T> {
    pub const TYPE_NAME: &'static str = "mixed";

    pub fn new(ctx: &PatchContext<'_, T>) -> Self {
        let n = ctx.patch().face_count();
        Self {
            core: PatchFieldCore::zeroed(ctx),
            ref_value: vec![T::zero(); n],
            ref_grad: vec![T::zero(); n],
            value_fraction: vec![0.0; n],
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

    pub fn value_fraction(&self) -> &[f64] {
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

    pub fn set_value_fraction(&mut self, values: Vec<f64>) -> FieldResult<()> {
        self.core.check_size("valueFraction", values.len())?;
        self.value_fraction = values;
        Ok(())
    }

    /// Per face: `(f, refValue, refGrad, deltaCoeff)`.
    fn faces<'s>(&'s self, ctx: &PatchContext<'s, T>) -> impl Iterator<Item = (f64, T, T, f64)> + 's {
        self.value_fraction
            .iter()
            .zip(&self.ref_value)
            .zip(&self.ref_grad)
            .zip(ctx.patch().delta_coeffs())
            .map(|(((&f, &r), &g), &dc)| (f, r, g, dc))
    }
}

impl<T: FieldElement> PatchField<T> for MixedPatchField<T> {
    patch_field_boilerplate!(Self::TYPE_NAME);

    fn compute_values(&mut self, ctx: &PatchContext<'_, T>, _comms: CommsType) -> FieldResult<()> {
        let pif = ctx.patch_internal_field();
        let values = self
            .faces(ctx)
            .zip(pif)
            .map(|((f, r, g, dc), i)| r * f + (i + g * dc.recip()) * (1.0 - f))
            .collect();
        self.core.values = values;
        Ok(())
    }

    fn sn_grad(&self, ctx: &PatchContext<'_, T>) -> FieldResult<Vec<T>> {
        let pif = ctx.patch_internal_field();
        Ok(self
            .faces(ctx)
            .zip(pif)
            .map(|((f, r, g, dc), i)| (r - i) * (f * dc) + g * (1.0 - f))
            .collect())
    }

    fn value_internal_coeffs(&self, _ctx: &PatchContext<'_, T>, _w: &[f64]) -> FieldResult<Vec<T>> {
        Ok(self
            .value_fraction
            .iter()
            .map(|&f| T::one() * (1.0 - f))
            .collect())
    }

    fn value_boundary_coeffs(&self, ctx: &PatchContext<'_, T>, _w: &[f64]) -> FieldResult<Vec<T>> {
        Ok(self
            .faces(ctx)
            .map(|(f, r, g, dc)| r * f + g * ((1.0 - f) / dc))
            .collect())
    }

    fn gradient_internal_coeffs(&self, ctx: &PatchContext<'_, T>) -> FieldResult<Vec<T>> {
        Ok(self
            .faces(ctx)
            .map(|(f, _, _, dc)| -T::one() * (f * dc))
            .collect())
    }

    fn gradient_boundary_coeffs(&self, ctx: &PatchContext<'_, T>) -> FieldResult<Vec<T>> {
        Ok(self
            .faces(ctx)
            .map(|(f, r, g, dc)| r * (f * dc) + g * (1.0 - f))
            .collect())
    }

    fn map_slots(&mut self, mapper: &PatchFieldMapper, pif: &[T]) {
        self.ref_value = mapper.map(&self.ref_value, pif);
        self.ref_grad = mapper.map_or(&self.ref_grad, T::zero());
        self.value_fraction = mapper.map_or(&self.value_fraction, 0.0);
    }

    fn write_entries(&self, dict: &mut Dictionary) {
        dict.write_field("refValue", &self.ref_value);
        dict.write_field("refGradient", &self.ref_grad);
        dict.write_field("valueFraction", &self.value_fraction);
    }
}
