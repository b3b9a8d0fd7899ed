use cfdbc_units::DimensionError;

use crate::solver::comms::CommsError;
use crate::solver::dictionary::DictionaryError;
use crate::solver::expr::ExprError;

pub type FieldResult<T> = Result<T, FieldError>;

/// Errors raised while building or evaluating fields and boundary conditions.
///
/// Every variant is fatal for the run: callers propagate it with `?` and abort.
#[derive(Debug, thiserror::Error)]
pub enum FieldError {
    #[error("essential entry '{entry}' missing for patch {patch} of field {field} in {path}")]
    MissingEntry {
        entry: String,
        patch: String,
        field: String,
        path: String,
    },
    #[error("unknown patchField type '{type_name}' for patch {patch} of field {field}; valid {element} patchField types are {valid:?}")]
    UnknownPatchFieldType {
        type_name: String,
        element: &'static str,
        patch: String,
        field: String,
        valid: Vec<String>,
    },
    #[error("patchField type '{field_type}' is inconsistent with patch type '{patch_type}' for patch {patch} of field {field}")]
    ConstraintMismatch {
        field_type: String,
        patch_type: String,
        patch: String,
        field: String,
    },
    #[error("cannot find patchField entry for patch {patch} of field {field} in {path}")]
    MissingPatchEntry {
        patch: String,
        field: String,
        path: String,
    },
    #[error("'{op}' cannot be called for a calculated patch field on patch {patch} of field {field}; you are probably trying to solve for a field with a default boundary condition")]
    CalculatedCoefficients {
        op: &'static str,
        patch: String,
        field: String,
    },
    #[error("patchField type '{type_name}' requires a field of rank >= {min_rank}, {field} is a {element} field")]
    UnsupportedRank {
        type_name: &'static str,
        min_rank: u8,
        element: &'static str,
        field: String,
    },
    #[error("size mismatch for {what} of {field}: expected {expected}, got {actual}")]
    SizeMismatch {
        what: String,
        field: String,
        expected: usize,
        actual: usize,
    },
    #[error("incorrect number of patch types for {field}: given {given}, mesh has {expected} patches")]
    PatchCountMismatch {
        field: String,
        given: usize,
        expected: usize,
    },
    #[error("different mesh for fields {lhs} and {rhs} during operation '{op}'")]
    DifferentMesh {
        lhs: String,
        rhs: String,
        op: &'static str,
    },
    #[error("patch {patch} of field {field} is not coupled and has no neighbour field")]
    NotCoupled { patch: String, field: String },
    #[error(transparent)]
    Dimension(#[from] DimensionError),
    #[error("previous iteration field of {field} not stored; use store_prev_iter() at the start of the iteration")]
    PrevIterNotStored { field: String },
    #[error("invalid patch schedule: {reason}")]
    InvalidSchedule { reason: String },
    #[error("expression '{expression}' for patch {patch} of field {field}: {source}")]
    Expression {
        expression: String,
        patch: String,
        field: String,
        #[source]
        source: ExprError,
    },
    #[error(transparent)]
    Dictionary(#[from] DictionaryError),
    #[error(transparent)]
    Comms(#[from] CommsError),
    #[error("{0}")]
    InvalidMesh(String),
}
