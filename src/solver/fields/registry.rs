use std::collections::BTreeMap;

use log::debug;

use super::basic::{
    CalculatedPatchField, FixedGradientPatchField, FixedValuePatchField, MixedPatchField,
    ZeroGradientPatchField,
};
use super::constraint::{CyclicPatchField, EmptyPatchField, ProcessorPatchField};
use super::groovy::{GroovyBc, GroovyPolicy};
use super::transform::{
    DirectionMixedPatchField, FixedNormalSlipPatchField, MixedFixedValueSlipPatchField,
    SymmetryPlanePatchField,
};
use super::{PatchContext, PatchField, PatchFieldMapper};
use crate::solver::dictionary::Dictionary;
use crate::solver::error::{FieldError, FieldResult};
use crate::solver::primitives::FieldElement;

pub type NewPatchField<T> = fn(&PatchContext<'_, T>) -> FieldResult<Box<dyn PatchField<T>>>;
pub type ReadPatchField<T> =
    fn(&PatchContext<'_, T>, &Dictionary) -> FieldResult<Box<dyn PatchField<T>>>;

/// The two ways of building one patch-field type.
pub struct PatchFieldConstructors<T> {
    pub from_patch: NewPatchField<T>,
    pub from_dict: ReadPatchField<T>,
}

impl<T> Clone for PatchFieldConstructors<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for PatchFieldConstructors<T> {}

/// Run-time selection table from `type` names to constructors, one per
/// element type. [`FieldElement::registry`] holds the built-in table.
pub struct PatchFieldRegistry<T> {
    constructors: BTreeMap<String, PatchFieldConstructors<T>>,
}

impl<T> std::fmt::Debug for PatchFieldRegistry<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PatchFieldRegistry")
            .field("types", &self.constructors.keys().collect::<Vec<_>>())
            .finish()
    }
}

macro_rules! constructors {
    ($ty:ty) => {
        PatchFieldConstructors {
            from_patch: |ctx| Ok(Box::new(<$ty>::new(ctx)) as Box<dyn PatchField<T>>),
            from_dict: |ctx, dict| Ok(Box::new(<$ty>::from_dict(ctx, dict)?) as Box<dyn PatchField<T>>),
        }
    };
    ($ty:ty, fallible) => {
        PatchFieldConstructors {
            from_patch: |ctx| Ok(Box::new(<$ty>::new(ctx)?) as Box<dyn PatchField<T>>),
            from_dict: |ctx, dict| Ok(Box::new(<$ty>::from_dict(ctx, dict)?) as Box<dyn PatchField<T>>),
        }
    };
}

impl<T: FieldElement> PatchFieldRegistry<T> {
    pub fn empty() -> Self {
        Self {
            constructors: BTreeMap::new(),
        }
    }

    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register(CalculatedPatchField::<T>::TYPE_NAME, constructors!(CalculatedPatchField<T>));
        registry.register(FixedValuePatchField::<T>::TYPE_NAME, constructors!(FixedValuePatchField<T>));
        registry.register(
            ZeroGradientPatchField::<T>::TYPE_NAME,
            constructors!(ZeroGradientPatchField<T>),
        );
        registry.register(
            FixedGradientPatchField::<T>::TYPE_NAME,
            constructors!(FixedGradientPatchField<T>),
        );
        registry.register(MixedPatchField::<T>::TYPE_NAME, constructors!(MixedPatchField<T>));
        registry.register(
            DirectionMixedPatchField::<T>::TYPE_NAME,
            constructors!(DirectionMixedPatchField<T>),
        );
        registry.register(
            FixedNormalSlipPatchField::<T>::TYPE_NAME,
            constructors!(FixedNormalSlipPatchField<T>, fallible),
        );
        registry.register(
            MixedFixedValueSlipPatchField::<T>::TYPE_NAME,
            constructors!(MixedFixedValueSlipPatchField<T>, fallible),
        );
        registry.register(
            SymmetryPlanePatchField::<T>::TYPE_NAME,
            constructors!(SymmetryPlanePatchField<T>),
        );
        registry.register(EmptyPatchField::<T>::TYPE_NAME, constructors!(EmptyPatchField<T>));
        registry.register(CyclicPatchField::<T>::TYPE_NAME, constructors!(CyclicPatchField<T>));
        registry.register(ProcessorPatchField::<T>::TYPE_NAME, constructors!(ProcessorPatchField<T>));
        registry.register(
            <FixedValuePatchField<T> as GroovyPolicy<T>>::GROOVY_NAME,
            constructors!(GroovyBc<T, FixedValuePatchField<T>>, fallible),
        );
        registry.register(
            <MixedPatchField<T> as GroovyPolicy<T>>::GROOVY_NAME,
            constructors!(GroovyBc<T, MixedPatchField<T>>, fallible),
        );
        registry.register(
            <DirectionMixedPatchField<T> as GroovyPolicy<T>>::GROOVY_NAME,
            constructors!(GroovyBc<T, DirectionMixedPatchField<T>>, fallible),
        );
        registry
    }

    /// Adds a type. Registering a name twice keeps the first entry and
    /// returns `false`.
    pub fn register(&mut self, type_name: &str, constructors: PatchFieldConstructors<T>) -> bool {
        if self.constructors.contains_key(type_name) {
            return false;
        }
        self.constructors.insert(type_name.to_string(), constructors);
        true
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.constructors.contains_key(type_name)
    }

    pub fn valid_types(&self) -> Vec<String> {
        self.constructors.keys().cloned().collect()
    }

    fn lookup(&self, type_name: &str, ctx: &PatchContext<'_, T>) -> FieldResult<PatchFieldConstructors<T>> {
        self.constructors
            .get(type_name)
            .copied()
            .ok_or_else(|| FieldError::UnknownPatchFieldType {
                type_name: type_name.to_string(),
                element: T::TYPE_NAME,
                patch: ctx.patch().name().to_string(),
                field: ctx.field_name.to_string(),
                valid: self.valid_types(),
            })
    }

    fn mismatch(&self, field_type: &str, ctx: &PatchContext<'_, T>) -> FieldError {
        FieldError::ConstraintMismatch {
            field_type: field_type.to_string(),
            patch_type: ctx.patch().patch_type().to_string(),
            patch: ctx.patch().name().to_string(),
            field: ctx.field_name.to_string(),
        }
    }

    /// Builds a field of `type_name`; a constraint patch replaces a
    /// mismatched request with its own patch field type.
    pub fn new_patch_field(
        &self,
        type_name: &str,
        ctx: &PatchContext<'_, T>,
    ) -> FieldResult<Box<dyn PatchField<T>>> {
        let field = (self.lookup(type_name, ctx)?.from_patch)(ctx)?;
        let patch = ctx.patch();
        if field.constraint_type() == patch.constraint_type() {
            return Ok(field);
        }
        match self.constructors.get(patch.patch_type()) {
            Some(constructors) => {
                debug!(
                    "patch {} of {} is {}: using its constraint field instead of {type_name}",
                    patch.name(),
                    ctx.field_name,
                    patch.patch_type()
                );
                (constructors.from_patch)(ctx)
            }
            None => Err(self.mismatch(type_name, ctx)),
        }
    }

    /// Builds a field of `type_name` filled with `value`.
    pub fn new_patch_field_with_value(
        &self,
        type_name: &str,
        ctx: &PatchContext<'_, T>,
        value: T,
    ) -> FieldResult<Box<dyn PatchField<T>>> {
        let mut field = self.new_patch_field(type_name, ctx)?;
        let values = vec![value; field.size()];
        field.force_assign(&values)?;
        Ok(field)
    }

    /// Builds the field selected by the dictionary's `type` entry.
    pub fn from_dict(
        &self,
        ctx: &PatchContext<'_, T>,
        dict: &Dictionary,
    ) -> FieldResult<Box<dyn PatchField<T>>> {
        if !dict.found("type") {
            return Err(FieldError::MissingEntry {
                entry: "type".to_string(),
                patch: ctx.patch().name().to_string(),
                field: ctx.field_name.to_string(),
                path: dict.path().to_string(),
            });
        }
        let type_name: String = dict.lookup("type")?;
        let constructors = self.lookup(&type_name, ctx)?;

        let patch = ctx.patch();
        let patch_type_override = dict
            .lookup_or_default::<Option<String>>("patchType", None)?
            .is_some_and(|t| t == patch.patch_type());
        if !patch_type_override && type_name != patch.patch_type() && self.contains(patch.patch_type()) {
            return Err(self.mismatch(&type_name, ctx));
        }

        let field = (constructors.from_dict)(ctx, dict)?;
        match field.constraint_type() {
            Some(constraint) if patch.constraint_type() != Some(constraint) => {
                Err(self.mismatch(&type_name, ctx))
            }
            _ => Ok(field),
        }
    }

    /// Copies `field` onto the face ordering given by `mapper`.
    pub fn map_patch_field(
        &self,
        field: &dyn PatchField<T>,
        ctx: &PatchContext<'_, T>,
        mapper: &PatchFieldMapper,
    ) -> FieldResult<Box<dyn PatchField<T>>> {
        let empty = field.constraint_type() == Some("empty");
        if !empty {
            mapper.check_face_count(ctx)?;
        }
        let mut mapped = field.clone_box();
        mapped.auto_map(mapper, ctx)?;
        let expected = if empty { 0 } else { ctx.patch().face_count() };
        if mapped.size() != expected {
            return Err(FieldError::SizeMismatch {
                what: "mapped patch field".to_string(),
                field: format!("{} on patch {}", ctx.field_name, ctx.patch().name()),
                expected,
                actual: mapped.size(),
            });
        }
        Ok(mapped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::mesh::{FvPatch, Mesh, PatchKind};
    use crate::solver::primitives::Vector;
    use serde_json::json;

    fn mesh() -> std::sync::Arc<Mesh> {
        Mesh::builder(2)
            .patch(FvPatch::new("wall", PatchKind::Wall, vec![0]))
            .patch(FvPatch::new("frontAndBack", PatchKind::Empty, vec![0, 1]))
            .build()
            .unwrap()
    }

    #[test]
    fn builtin_tables_cover_every_rank() {
        for name in ["calculated", "fixedValue", "mixed", "directionMixed", "groovyBC", "cyclic"] {
            assert!(f64::registry().contains(name));
            assert!(Vector::registry().contains(name));
        }
        let mut registry = PatchFieldRegistry::<f64>::builtin();
        let calculated = registry.constructors["calculated"];
        assert!(!registry.register("fixedValue", calculated));
        assert!(registry.register("myCalculated", calculated));
    }

    #[test]
    fn constraint_patch_overrides_requested_type() {
        let mesh = mesh();
        let internal = vec![0.0; 2];
        let ctx = PatchContext::new(&mesh, 1, &internal, "p");
        let field = f64::registry().new_patch_field("calculated", &ctx).unwrap();
        assert_eq!(field.type_name(), "empty");
        assert_eq!(field.size(), 0);
    }

    #[test]
    fn dictionary_selection_reports_bad_types() {
        let mesh = mesh();
        let internal = vec![0.0; 2];
        let wall = PatchContext::new(&mesh, 0, &internal, "p");
        let dict = Dictionary::from_value("p/boundaryField/wall", json!({ "type": "bogus" })).unwrap();
        match f64::registry().from_dict(&wall, &dict).unwrap_err() {
            FieldError::UnknownPatchFieldType { valid, patch, .. } => {
                assert_eq!(patch, "wall");
                assert!(valid.contains(&"zeroGradient".to_string()));
            }
            other => panic!("unexpected error {other}"),
        }

        let dict = Dictionary::from_value("d", json!({ "type": "cyclic" })).unwrap();
        assert!(matches!(
            f64::registry().from_dict(&wall, &dict),
            Err(FieldError::ConstraintMismatch { .. })
        ));

        let empty = PatchContext::new(&mesh, 1, &internal, "p");
        let dict = Dictionary::from_value("d", json!({ "type": "zeroGradient" })).unwrap();
        assert!(matches!(
            f64::registry().from_dict(&empty, &dict),
            Err(FieldError::ConstraintMismatch { .. })
        ));

        let dict = Dictionary::from_value("d", json!({ "type": "fixedValue" })).unwrap();
        assert!(matches!(
            f64::registry().from_dict(&wall, &dict),
            Err(FieldError::MissingEntry { ref entry, .. }) if entry == "value"
        ));
    }

    #[test]
    fn remap_fills_unmapped_faces_from_internal_field() {
        let mesh = Mesh::builder(3)
            .patch(FvPatch::new("outlet", PatchKind::Patch, vec![0, 1, 2]))
            .build()
            .unwrap();
        let internal = vec![1.0, 2.0, 3.0];
        let ctx = PatchContext::new(&mesh, 0, &internal, "T");
        let field = f64::registry()
            .new_patch_field_with_value("fixedValue", &ctx, 9.0)
            .unwrap();
        let mapper = PatchFieldMapper::new(vec![Some(2), None, Some(0)]);
        let mapped = f64::registry().map_patch_field(field.as_ref(), &ctx, &mapper).unwrap();
        assert_eq!(mapped.values(), &[9.0, 2.0, 9.0]);
    }
}
