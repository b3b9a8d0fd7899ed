pub mod comms;
pub mod dictionary;
pub mod dimensions;
pub mod error;
pub mod expr;
pub mod fields;
pub mod matrix;
pub mod mesh;
pub mod primitives;
pub mod time;

pub use comms::{CommsType, Pstream};
pub use dictionary::Dictionary;
pub use error::{FieldError, FieldResult};
pub use fields::{BoundaryField, GeometricField, PatchContext, PatchField, PatchFieldRegistry};
pub use matrix::{FvMatrix, SolverControls, SolverPerformance};
pub use mesh::{FvPatch, Mesh, MeshBuilder, PatchKind};
pub use primitives::{FieldElement, Scalar, SymmTensor, Tensor, Vector};
pub use time::Time;
