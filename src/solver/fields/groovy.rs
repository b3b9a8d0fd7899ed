//! Expression-driven boundary conditions.
//!
//! [`GroovyBc`] wraps a base patch field and, on every coefficient update,
//! fills the base field's value, gradient and fraction slots from
//! expressions before delegating to the base update.

use log::{debug, warn};

use super::basic::{FixedValuePatchField, MixedPatchField};
use super::transform::DirectionMixedPatchField;
use super::{PatchContext, PatchField, PatchFieldCore, PatchFieldMapper};
use crate::solver::comms::CommsType;
use crate::solver::dictionary::Dictionary;
use crate::solver::error::{FieldError, FieldResult};
use crate::solver::expr::{ExprError, ExprValue, PatchEnvironment, PatchExpressionDriver};
use crate::solver::matrix::FvMatrix;
use crate::solver::primitives::{FieldElement, SymmTensor};

/// A base patch field that can be driven by expressions.
pub trait GroovyPolicy<T: FieldElement>: PatchField<T> + Clone + Sized + 'static {
    /// Element type of the blend slot.
    type Fraction: FieldElement;

    const GROOVY_NAME: &'static str;
    const HAS_GRADIENT: bool;
    const HAS_FRACTION: bool;
    const REQUIRES_VALUE_EXPRESSION: bool;
    const DEFAULT_FRACTION: &'static str;

    /// Builds the base field with its slots seeded from the optional
    /// `refValue`, `refGradient`, `valueFraction` and `value` entries.
    fn seeded(ctx: &PatchContext<'_, T>, dict: &Dictionary) -> FieldResult<Self>;

    fn set_ref_value(&mut self, values: Vec<T>) -> FieldResult<()>;

    fn set_ref_grad(&mut self, _values: Vec<T>) -> FieldResult<()> {
        Ok(())
    }

    fn set_fraction(&mut self, _values: Vec<Self::Fraction>) -> FieldResult<()> {
        Ok(())
    }
}

fn seed_value<T: FieldElement>(
    core: &PatchFieldCore<T>,
    dict: &Dictionary,
    fallback: &[T],
) -> FieldResult<Vec<T>> {
    match core.read_optional(dict, "value")? {
        Some(values) => Ok(values),
        None => {
            warn!(
                "no value defined for patch {} of field {} in {}, using the reference value",
                core.patch_name,
                core.field_name,
                dict.path()
            );
            Ok(fallback.to_vec())
        }
    }
}

impl<T: FieldElement> GroovyPolicy<T> for FixedValuePatchField<T> {
    type Fraction = f64;

    const GROOVY_NAME: &'static str = "groovyBCFixedValue";
    const HAS_GRADIENT: bool = false;
    const HAS_FRACTION: bool = false;
    const REQUIRES_VALUE_EXPRESSION: bool = true;
    const DEFAULT_FRACTION: &'static str = "1";

    fn seeded(ctx: &PatchContext<'_, T>, dict: &Dictionary) -> FieldResult<Self> {
        let mut field = Self::new(ctx);
        let values = seed_value(field.core(), dict, &ctx.patch_internal_field())?;
        field.force_assign(&values)?;
        Ok(field)
    }

    fn set_ref_value(&mut self, values: Vec<T>) -> FieldResult<()> {
        self.force_assign(&values)
    }
}

impl<T: FieldElement> GroovyPolicy<T> for MixedPatchField<T> {
    type Fraction = f64;

    const GROOVY_NAME: &'static str = "groovyBC";
    const HAS_GRADIENT: bool = true;
    const HAS_FRACTION: bool = true;
    const REQUIRES_VALUE_EXPRESSION: bool = false;
    const DEFAULT_FRACTION: &'static str = "1";

    fn seeded(ctx: &PatchContext<'_, T>, dict: &Dictionary) -> FieldResult<Self> {
        let mut field = Self::new(ctx);
        let n = field.size();
        let core = field.core().clone();
        let ref_value = core
            .read_optional(dict, "refValue")?
            .unwrap_or_else(|| ctx.patch_internal_field());
        let ref_grad = core
            .read_optional(dict, "refGradient")?
            .unwrap_or_else(|| vec![T::zero(); n]);
        let fraction = core
            .read_optional(dict, "valueFraction")?
            .unwrap_or_else(|| vec![1.0; n]);
        let values = seed_value(&core, dict, &ref_value)?;
        field.set_ref_value(ref_value)?;
        field.set_ref_grad(ref_grad)?;
        field.set_value_fraction(fraction)?;
        field.force_assign(&values)?;
        Ok(field)
    }

    fn set_ref_value(&mut self, values: Vec<T>) -> FieldResult<()> {
        MixedPatchField::set_ref_value(self, values)
    }

    fn set_ref_grad(&mut self, values: Vec<T>) -> FieldResult<()> {
        MixedPatchField::set_ref_grad(self, values)
    }

    fn set_fraction(&mut self, values: Vec<f64>) -> FieldResult<()> {
        self.set_value_fraction(values)
    }
}

impl<T: FieldElement> GroovyPolicy<T> for DirectionMixedPatchField<T> {
    type Fraction = SymmTensor;

    const GROOVY_NAME: &'static str = "groovyBCDirection";
    const HAS_GRADIENT: bool = true;
    const HAS_FRACTION: bool = true;
    const REQUIRES_VALUE_EXPRESSION: bool = false;
    const DEFAULT_FRACTION: &'static str = "symmTensor(1,0,0,1,0,1)";

    fn seeded(ctx: &PatchContext<'_, T>, dict: &Dictionary) -> FieldResult<Self> {
        let mut field = Self::new(ctx);
        let n = field.size();
        let core = field.core().clone();
        let ref_value = core
            .read_optional(dict, "refValue")?
            .unwrap_or_else(|| ctx.patch_internal_field());
        let ref_grad = core
            .read_optional(dict, "refGradient")?
            .unwrap_or_else(|| vec![T::zero(); n]);
        let fraction = core
            .read_optional(dict, "valueFraction")?
            .unwrap_or_else(|| vec![SymmTensor::identity(); n]);
        let values = seed_value(&core, dict, &ref_value)?;
        field.set_ref_value(ref_value)?;
        field.set_ref_grad(ref_grad)?;
        field.set_value_fraction(fraction)?;
        field.force_assign(&values)?;
        Ok(field)
    }

    fn set_ref_value(&mut self, values: Vec<T>) -> FieldResult<()> {
        DirectionMixedPatchField::set_ref_value(self, values)
    }

    fn set_ref_grad(&mut self, values: Vec<T>) -> FieldResult<()> {
        DirectionMixedPatchField::set_ref_grad(self, values)
    }

    fn set_fraction(&mut self, values: Vec<SymmTensor>) -> FieldResult<()> {
        self.set_value_fraction(values)
    }
}

/// Literal for the zero element of `T`, the default value and gradient
/// expression.
fn zero_expression<T: FieldElement>() -> String {
    let constructor = match (T::RANK, T::N_COMPONENTS) {
        (0, _) => return "0".to_string(),
        (1, _) => "vector",
        (_, 6) => "symmTensor",
        _ => "tensor",
    };
    format!("{constructor}({})", vec!["0"; T::N_COMPONENTS].join(","))
}

#[derive(Debug, Clone)]
pub struct GroovyBc<T, P> {
    base: P,
    driver: PatchExpressionDriver,
    value_expression: String,
    gradient_expression: String,
    fraction_expression: String,
    evaluate_during_construction: bool,
    _element: std::marker::PhantomData<T>,
}

pub type GroovyBcFixedValue<T> = GroovyBc<T, FixedValuePatchField<T>>;
pub type GroovyBcMixed<T> = GroovyBc<T, MixedPatchField<T>>;
pub type GroovyBcDirection<T> = GroovyBc<T, DirectionMixedPatchField<T>>;

impl<T: FieldElement, P: GroovyPolicy<T>> GroovyBc<T, P> {
    pub fn new(ctx: &PatchContext<'_, T>) -> FieldResult<Self> {
        let empty = Dictionary::new(format!("{}/{}", ctx.field_name, ctx.patch().name()));
        Ok(Self {
            base: P::seeded(ctx, &empty)?,
            driver: PatchExpressionDriver::new(),
            value_expression: zero_expression::<T>(),
            gradient_expression: zero_expression::<T>(),
            fraction_expression: P::DEFAULT_FRACTION.to_string(),
            evaluate_during_construction: false,
            _element: std::marker::PhantomData,
        })
    }

    pub fn from_dict(ctx: &PatchContext<'_, T>, dict: &Dictionary) -> FieldResult<Self> {
        let base = P::seeded(ctx, dict)?;
        let value_expression = if P::REQUIRES_VALUE_EXPRESSION && !dict.found("valueExpression") {
            return Err(base.core().missing("valueExpression", dict));
        } else {
            dict.lookup_or_default("valueExpression", zero_expression::<T>())?
        };
        let driver = PatchExpressionDriver::read_variables_and_tables(dict).map_err(|source| {
            FieldError::Expression {
                expression: "variables".to_string(),
                patch: base.core().patch_name.clone(),
                field: base.core().field_name.clone(),
                source,
            }
        })?;
        let mut field = Self {
            base,
            driver,
            value_expression,
            gradient_expression: dict.lookup_or_default("gradientExpression", zero_expression::<T>())?,
            fraction_expression: dict
                .lookup_or_default("fractionExpression", P::DEFAULT_FRACTION.to_string())?,
            evaluate_during_construction: dict
                .lookup_or_default("evaluateDuringConstruction", false)?,
            _element: std::marker::PhantomData,
        };
        if field.evaluate_during_construction {
            field.evaluate(ctx, ctx.comms().default_comms_type())?;
        } else {
            field.base.evaluate(ctx, ctx.comms().default_comms_type())?;
        }
        Ok(field)
    }

    pub fn base(&self) -> &P {
        &self.base
    }

    pub fn driver(&self) -> &PatchExpressionDriver {
        &self.driver
    }

    pub fn value_expression(&self) -> &str {
        &self.value_expression
    }

    pub fn set_value_expression(&mut self, expression: impl Into<String>) {
        self.value_expression = expression.into();
    }

    pub fn set_gradient_expression(&mut self, expression: impl Into<String>) {
        self.gradient_expression = expression.into();
    }

    pub fn set_fraction_expression(&mut self, expression: impl Into<String>) {
        self.fraction_expression = expression.into();
    }

    fn environment<'c>(&self, ctx: &PatchContext<'c, T>) -> PatchEnvironment<'c> {
        let patch = ctx.patch();
        let time = ctx.time().state();
        PatchEnvironment {
            n_faces: patch.face_count(),
            time: time.value,
            delta_t: time.delta_t,
            face_centres: patch.face_centres(),
            normals: patch.nf(),
            mag_sf: patch.mag_sf(),
            delta_coeffs: patch.delta_coeffs(),
            field_name: ctx.field_name,
            patch_values: ExprValue::from_field(self.base.values()),
            internal_values: ExprValue::from_field(&ctx.patch_internal_field()),
        }
    }

    fn expression_error(&self, expression: &str, source: ExprError) -> FieldError {
        FieldError::Expression {
            expression: expression.to_string(),
            patch: self.base.core().patch_name.clone(),
            field: self.base.core().field_name.clone(),
            source,
        }
    }
}

impl<T: FieldElement, P: GroovyPolicy<T>> PatchField<T> for GroovyBc<T, P> {
    fn core(&self) -> &PatchFieldCore<T> {
        self.base.core()
    }

    fn core_mut(&mut self) -> &mut PatchFieldCore<T> {
        self.base.core_mut()
    }

    fn type_name(&self) -> &'static str {
        P::GROOVY_NAME
    }

    fn clone_box(&self) -> Box<dyn PatchField<T>> {
        Box::new(self.clone())
    }

    fn fixes_value(&self) -> bool {
        self.base.fixes_value()
    }

    fn fixes_gradient(&self) -> bool {
        self.base.fixes_gradient()
    }

    fn assignable(&self) -> bool {
        self.base.assignable()
    }

    fn compute_coeffs(&mut self, ctx: &PatchContext<'_, T>) -> FieldResult<()> {
        self.driver.clear_variables();
        let env = self.environment(ctx);

        let value = self
            .driver
            .evaluate::<T>(&self.value_expression, &env)
            .map_err(|e| self.expression_error(&self.value_expression, e))?;
        self.base.set_ref_value(value)?;

        if P::HAS_GRADIENT {
            let gradient = self
                .driver
                .evaluate::<T>(&self.gradient_expression, &env)
                .map_err(|e| self.expression_error(&self.gradient_expression, e))?;
            self.base.set_ref_grad(gradient)?;
        }

        if P::HAS_FRACTION {
            let fraction = self
                .driver
                .evaluate::<P::Fraction>(&self.fraction_expression, &env)
                .map_err(|e| self.expression_error(&self.fraction_expression, e))?;
            self.base.set_fraction(fraction)?;
        }

        debug!(
            "{} on patch {} of {}: updated from expressions at t = {}",
            P::GROOVY_NAME,
            self.base.core().patch_name,
            self.base.core().field_name,
            env.time
        );
        self.base.compute_coeffs(ctx)
    }

    fn compute_values(&mut self, ctx: &PatchContext<'_, T>, comms: CommsType) -> FieldResult<()> {
        self.base.compute_values(ctx, comms)
    }

    fn sn_grad(&self, ctx: &PatchContext<'_, T>) -> FieldResult<Vec<T>> {
        self.base.sn_grad(ctx)
    }

    fn value_internal_coeffs(&self, ctx: &PatchContext<'_, T>, weights: &[f64]) -> FieldResult<Vec<T>> {
        self.base.value_internal_coeffs(ctx, weights)
    }

    fn value_boundary_coeffs(&self, ctx: &PatchContext<'_, T>, weights: &[f64]) -> FieldResult<Vec<T>> {
        self.base.value_boundary_coeffs(ctx, weights)
    }

    fn gradient_internal_coeffs(&self, ctx: &PatchContext<'_, T>) -> FieldResult<Vec<T>> {
        self.base.gradient_internal_coeffs(ctx)
    }

    fn gradient_boundary_coeffs(&self, ctx: &PatchContext<'_, T>) -> FieldResult<Vec<T>> {
        self.base.gradient_boundary_coeffs(ctx)
    }

    fn manipulate_matrix(&mut self, matrix: &mut FvMatrix<T>) -> FieldResult<()> {
        self.base.manipulate_matrix(matrix)
    }

    fn map_slots(&mut self, mapper: &PatchFieldMapper, pif: &[T]) {
        self.base.map_slots(mapper, pif)
    }

    fn write_entries(&self, dict: &mut Dictionary) {
        self.base.write_entries(dict);
        dict.set_value("valueExpression", self.value_expression.as_str().into());
        if P::HAS_GRADIENT {
            dict.set_value("gradientExpression", self.gradient_expression.as_str().into());
        }
        if P::HAS_FRACTION {
            dict.set_value("fractionExpression", self.fraction_expression.as_str().into());
        }
        dict.set_value(
            "evaluateDuringConstruction",
            self.evaluate_during_construction.into(),
        );
        self.driver.write(dict);
    }
}
