//! Patch fields, boundary fields and geometric fields.
//!
//! A [`GeometricField`] owns its internal values and a [`BoundaryField`] with
//! one boxed [`PatchField`] per mesh patch. Patch-field variants are built by
//! name through the per-element [`PatchFieldRegistry`].

pub mod basic;
pub mod boundary_field;
pub mod constraint;
pub mod geometric_field;
pub mod groovy;
pub mod patch_field;
pub mod registry;
pub mod transform;

pub use basic::{
    CalculatedPatchField, FixedGradientPatchField, FixedValuePatchField, MixedPatchField,
    ZeroGradientPatchField,
};
pub use boundary_field::BoundaryField;
pub use constraint::{CyclicPatchField, EmptyPatchField, ProcessorPatchField};
pub use geometric_field::{FieldParts, GeometricField};
pub use groovy::{GroovyBc, GroovyBcDirection, GroovyBcFixedValue, GroovyBcMixed, GroovyPolicy};
pub use patch_field::{PatchContext, PatchField, PatchFieldCore, PatchFieldMapper};
pub use registry::{PatchFieldConstructors, PatchFieldRegistry};
pub use transform::{
    DirectionMixedPatchField, FixedNormalSlipPatchField, MixedFixedValueSlipPatchField,
    SymmetryPlanePatchField,
};
