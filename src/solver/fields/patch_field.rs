use std::fmt::Debug;

use crate::solver::comms::{CommsType, Pstream};
use crate::solver::dictionary::Dictionary;
use crate::solver::error::{FieldError, FieldResult};
use crate::solver::matrix::FvMatrix;
use crate::solver::mesh::{FvPatch, Mesh};
use crate::solver::primitives::FieldElement;
use crate::solver::time::Time;

/// Everything a patch field may read while it updates or evaluates: the
/// mesh, its own patch and the internal field it bounds.
#[derive(Debug)]
pub struct PatchContext<'a, T> {
    pub mesh: &'a Mesh,
    pub patch_index: usize,
    pub internal: &'a [T],
    pub field_name: &'a str,
}

impl<T> Clone for PatchContext<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for PatchContext<'_, T> {}

impl<'a, T: FieldElement> PatchContext<'a, T> {
    pub fn new(mesh: &'a Mesh, patch_index: usize, internal: &'a [T], field_name: &'a str) -> Self {
        Self {
            mesh,
            patch_index,
            internal,
            field_name,
        }
    }

    pub fn patch(&self) -> &'a FvPatch {
        self.mesh.patch(self.patch_index)
    }

    pub fn patch_internal_field(&self) -> Vec<T> {
        self.patch().patch_internal_field(self.internal)
    }

    pub fn time(&self) -> &'a Time {
        self.mesh.time()
    }

    pub fn comms(&self) -> &'a Pstream {
        self.mesh.comms()
    }
}

/// State shared by every patch-field variant.
#[derive(Debug, Clone, PartialEq)]
pub struct PatchFieldCore<T> {
    pub patch_name: String,
    pub field_name: String,
    pub values: Vec<T>,
    pub updated: bool,
    pub manipulated_matrix: bool,
    /// Optional `patchType` override read from the dictionary.
    pub patch_type: Option<String>,
}

impl<T: FieldElement> PatchFieldCore<T> {
    pub fn new(ctx: &PatchContext<'_, T>, values: Vec<T>) -> Self {
        Self {
            patch_name: ctx.patch().name().to_string(),
            field_name: ctx.field_name.to_string(),
            values,
            updated: false,
            manipulated_matrix: false,
            patch_type: None,
        }
    }

    pub fn zeroed(ctx: &PatchContext<'_, T>) -> Self {
        Self::new(ctx, vec![T::zero(); ctx.patch().face_count()])
    }

    /// Reads the optional `patchType` entry.
    pub fn with_dict(mut self, dict: &Dictionary) -> FieldResult<Self> {
        if dict.found("patchType") {
            self.patch_type = Some(dict.lookup("patchType")?);
        }
        Ok(self)
    }

    pub fn missing(&self, entry: &str, dict: &Dictionary) -> FieldError {
        FieldError::MissingEntry {
            entry: entry.to_string(),
            patch: self.patch_name.clone(),
            field: self.field_name.clone(),
            path: dict.path().to_string(),
        }
    }

    /// Reads an essential per-face entry sized to this patch.
    pub fn read_field<V: FieldElement>(&self, dict: &Dictionary, key: &str) -> FieldResult<Vec<V>> {
        if !dict.found(key) {
            return Err(self.missing(key, dict));
        }
        Ok(dict.read_field(key, self.values.len())?)
    }

    pub fn read_optional<V: FieldElement>(
        &self,
        dict: &Dictionary,
        key: &str,
    ) -> FieldResult<Option<Vec<V>>> {
        if dict.found(key) {
            self.read_field(dict, key).map(Some)
        } else {
            Ok(None)
        }
    }

    pub fn check_size(&self, what: &str, actual: usize) -> FieldResult<()> {
        if actual == self.values.len() {
            Ok(())
        } else {
            Err(FieldError::SizeMismatch {
                what: what.to_string(),
                field: format!("{} on patch {}", self.field_name, self.patch_name),
                expected: self.values.len(),
                actual,
            })
        }
    }
}

/// Maps patch data from an old face ordering onto a new one.
///
/// `addressing[new_face]` names the old face providing the value, `None`
/// marks a face with no source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchFieldMapper {
    addressing: Vec<Option<usize>>,
}

impl PatchFieldMapper {
    pub fn new(addressing: Vec<Option<usize>>) -> Self {
        Self { addressing }
    }

    pub fn identity(size: usize) -> Self {
        Self::new((0..size).map(Some).collect())
    }

    pub fn size(&self) -> usize {
        self.addressing.len()
    }

    /// Fails unless the mapper addresses every face of the target patch.
    pub fn check_face_count<T: FieldElement>(&self, ctx: &PatchContext<'_, T>) -> FieldResult<()> {
        let expected = ctx.patch().face_count();
        if self.size() != expected {
            return Err(FieldError::SizeMismatch {
                what: "patch field mapper".to_string(),
                field: format!("{} on patch {}", ctx.field_name, ctx.patch().name()),
                expected,
                actual: self.size(),
            });
        }
        Ok(())
    }

    pub fn has_unmapped(&self) -> bool {
        self.addressing.iter().any(Option::is_none)
    }

    /// Maps `old`; unmapped (or out-of-range) faces take `fallback[face]`.
    pub fn map<V: Copy>(&self, old: &[V], fallback: &[V]) -> Vec<V> {
        self.addressing
            .iter()
            .zip(fallback)
            .map(|(source, &fb)| source.and_then(|i| old.get(i).copied()).unwrap_or(fb))
            .collect()
    }

    /// Maps `old`; unmapped faces take `default`.
    pub fn map_or<V: Copy>(&self, old: &[V], default: V) -> Vec<V> {
        self.addressing
            .iter()
            .map(|source| source.and_then(|i| old.get(i).copied()).unwrap_or(default))
            .collect()
    }
}

/// A boundary condition for one patch of a field of `T`.
///
/// The update/evaluate cycle is driven by the provided methods:
/// [`update_coeffs`](Self::update_coeffs) runs [`compute_coeffs`](Self::compute_coeffs)
/// at most once per cycle and [`evaluate`](Self::evaluate) runs
/// [`compute_values`](Self::compute_values) then marks the patch stale again.
/// Variants override the hooks, not the drivers.
pub trait PatchField<T: FieldElement>: Debug + Send + Sync {
    fn core(&self) -> &PatchFieldCore<T>;

    fn core_mut(&mut self) -> &mut PatchFieldCore<T>;

    fn type_name(&self) -> &'static str;

    fn clone_box(&self) -> Box<dyn PatchField<T>>;

    /// Patch type this field is bound to, if it is a constraint field.
    fn constraint_type(&self) -> Option<&'static str> {
        None
    }

    fn values(&self) -> &[T] {
        &self.core().values
    }

    fn size(&self) -> usize {
        self.core().values.len()
    }

    fn patch_name(&self) -> &str {
        &self.core().patch_name
    }

    fn updated(&self) -> bool {
        self.core().updated
    }

    fn manipulated_matrix(&self) -> bool {
        self.core().manipulated_matrix
    }

    fn fixes_value(&self) -> bool {
        false
    }

    fn fixes_gradient(&self) -> bool {
        false
    }

    fn coupled(&self) -> bool {
        false
    }

    fn assignable(&self) -> bool {
        true
    }

    /// Refreshes coefficient data; called once per update cycle.
    fn compute_coeffs(&mut self, _ctx: &PatchContext<'_, T>) -> FieldResult<()> {
        Ok(())
    }

    /// Writes the new face values during [`evaluate`](Self::evaluate).
    fn compute_values(&mut self, _ctx: &PatchContext<'_, T>, _comms: CommsType) -> FieldResult<()> {
        Ok(())
    }

    fn update_coeffs(&mut self, ctx: &PatchContext<'_, T>) -> FieldResult<()> {
        if self.updated() {
            return Ok(());
        }
        self.compute_coeffs(ctx)?;
        self.core_mut().updated = true;
        Ok(())
    }

    /// First half of a coupled evaluation: posts sends and receives.
    fn init_evaluate(&mut self, _ctx: &PatchContext<'_, T>, _comms: CommsType) -> FieldResult<()> {
        Ok(())
    }

    fn evaluate(&mut self, ctx: &PatchContext<'_, T>, comms: CommsType) -> FieldResult<()> {
        if !self.updated() {
            self.update_coeffs(ctx)?;
        }
        self.compute_values(ctx, comms)?;
        let core = self.core_mut();
        core.updated = false;
        core.manipulated_matrix = false;
        Ok(())
    }

    fn sn_grad(&self, ctx: &PatchContext<'_, T>) -> FieldResult<Vec<T>> {
        let pif = ctx.patch_internal_field();
        Ok(self
            .values()
            .iter()
            .zip(&pif)
            .zip(ctx.patch().delta_coeffs())
            .map(|((&v, &i), &dc)| (v - i) * dc)
            .collect())
    }

    fn patch_neighbour_field(&self, _ctx: &PatchContext<'_, T>) -> FieldResult<Vec<T>> {
        Err(FieldError::NotCoupled {
            patch: self.core().patch_name.clone(),
            field: self.core().field_name.clone(),
        })
    }

    fn value_internal_coeffs(&self, ctx: &PatchContext<'_, T>, weights: &[f64]) -> FieldResult<Vec<T>>;

    fn value_boundary_coeffs(&self, ctx: &PatchContext<'_, T>, weights: &[f64]) -> FieldResult<Vec<T>>;

    fn gradient_internal_coeffs(&self, ctx: &PatchContext<'_, T>) -> FieldResult<Vec<T>>;

    fn gradient_boundary_coeffs(&self, ctx: &PatchContext<'_, T>) -> FieldResult<Vec<T>>;

    fn manipulate_matrix(&mut self, _matrix: &mut FvMatrix<T>) -> FieldResult<()> {
        self.core_mut().manipulated_matrix = true;
        Ok(())
    }

    /// Assignment from the solver; ignored by non-assignable fields.
    fn assign(&mut self, values: &[T]) -> FieldResult<()> {
        if self.assignable() {
            self.force_assign(values)
        } else {
            Ok(())
        }
    }

    fn force_assign(&mut self, values: &[T]) -> FieldResult<()> {
        let core = self.core_mut();
        core.check_size("assigned values", values.len())?;
        core.values.copy_from_slice(values);
        Ok(())
    }

    /// Remaps the values onto new face addressing, then any extra slots.
    fn auto_map(&mut self, mapper: &PatchFieldMapper, ctx: &PatchContext<'_, T>) -> FieldResult<()> {
        mapper.check_face_count(ctx)?;
        let pif = ctx.patch_internal_field();
        let core = self.core_mut();
        core.values = mapper.map(&core.values, &pif);
        self.map_slots(mapper, &pif);
        Ok(())
    }

    /// Remaps variant-specific per-face data; unmapped faces fall back to
    /// zero-gradient behaviour.
    fn map_slots(&mut self, _mapper: &PatchFieldMapper, _pif: &[T]) {}

    /// Writes variant-specific entries.
    fn write_entries(&self, _dict: &mut Dictionary) {}

    fn write(&self, dict: &mut Dictionary) {
        dict.set_value("type", self.type_name().into());
        if let Some(patch_type) = &self.core().patch_type {
            dict.set_value("patchType", patch_type.as_str().into());
        }
        self.write_entries(dict);
        dict.write_field("value", self.values());
    }
}

impl<T: FieldElement> Clone for Box<dyn PatchField<T>> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// Implements the accessor boilerplate of [`PatchField`] for a struct with
/// a `core` field.
macro_rules! patch_field_boilerplate {
    ($type_name:expr) => {
        fn core(&self) -> &$crate::solver::fields::PatchFieldCore<T> {
            &self.core
        }

        fn core_mut(&mut self) -> &mut $crate::solver::fields::PatchFieldCore<T> {
            &mut self.core
        }

        fn type_name(&self) -> &'static str {
            $type_name
        }

        fn clone_box(&self) -> Box<dyn $crate::solver::fields::PatchField<T>> {
            Box::new(self.clone())
        }
    };
}

pub(crate) use patch_field_boilerplate;

/// `value * s` per face.
pub(crate) fn scaled<T: FieldElement>(values: &[T], s: &[f64]) -> Vec<T> {
    values.iter().zip(s).map(|(&v, &s)| v * s).collect()
}

/// `value * s` with a uniform element.
pub(crate) fn uniform_scaled<T: FieldElement>(value: T, s: &[f64]) -> Vec<T> {
    s.iter().map(|&s| value * s).collect()
}
