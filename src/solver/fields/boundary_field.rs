use log::debug;

use super::{PatchContext, PatchField, PatchFieldMapper};
use crate::solver::comms::CommsType;
use crate::solver::dictionary::Dictionary;
use crate::solver::error::{FieldError, FieldResult};
use crate::solver::matrix::FvMatrix;
use crate::solver::mesh::{Mesh, PatchKind};
use crate::solver::primitives::FieldElement;

/// One patch field per mesh patch, index-aligned with `Mesh::boundary`.
///
/// The boundary does not own the internal field; every operation that needs
/// it takes the mesh, the internal values and the field name.
#[derive(Debug, Clone)]
pub struct BoundaryField<T: FieldElement> {
    patches: Vec<Box<dyn PatchField<T>>>,
}

impl<T: FieldElement> BoundaryField<T> {
    /// Every patch gets `type_name`, subject to constraint overrides.
    pub fn new(mesh: &Mesh, internal: &[T], field_name: &str, type_name: &str) -> FieldResult<Self> {
        let types = vec![type_name; mesh.boundary().len()];
        Self::with_patch_types(mesh, internal, field_name, &types)
    }

    pub fn with_patch_types(
        mesh: &Mesh,
        internal: &[T],
        field_name: &str,
        types: &[&str],
    ) -> FieldResult<Self> {
        if types.len() != mesh.boundary().len() {
            return Err(FieldError::PatchCountMismatch {
                field: field_name.to_string(),
                given: types.len(),
                expected: mesh.boundary().len(),
            });
        }
        let registry = T::registry();
        let patches = types
            .iter()
            .enumerate()
            .map(|(patchi, type_name)| {
                let ctx = PatchContext::new(mesh, patchi, internal, field_name);
                registry.new_patch_field(type_name, &ctx)
            })
            .collect::<FieldResult<Vec<_>>>()?;
        Ok(Self { patches })
    }

    /// Reads one sub-dictionary per patch, keyed by patch name. Empty patches
    /// may be omitted.
    pub fn from_dict(
        mesh: &Mesh,
        internal: &[T],
        field_name: &str,
        dict: &Dictionary,
    ) -> FieldResult<Self> {
        let registry = T::registry();
        let mut patches = Vec::with_capacity(mesh.boundary().len());
        for (patchi, patch) in mesh.boundary().iter().enumerate() {
            let ctx = PatchContext::new(mesh, patchi, internal, field_name);
            let field = if dict.found(patch.name()) {
                registry.from_dict(&ctx, &dict.sub_dict(patch.name())?)?
            } else if patch.kind() == PatchKind::Empty {
                registry.new_patch_field("empty", &ctx)?
            } else {
                return Err(FieldError::MissingPatchEntry {
                    patch: patch.name().to_string(),
                    field: field_name.to_string(),
                    path: dict.path().to_string(),
                });
            };
            patches.push(field);
        }
        Ok(Self { patches })
    }

    pub fn len(&self) -> usize {
        self.patches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patches.is_empty()
    }

    pub fn patch(&self, patchi: usize) -> &dyn PatchField<T> {
        self.patches[patchi].as_ref()
    }

    pub fn patch_mut(&mut self, patchi: usize) -> &mut dyn PatchField<T> {
        self.patches[patchi].as_mut()
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn PatchField<T>> {
        self.patches.iter().map(|p| p.as_ref())
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Box<dyn PatchField<T>>> {
        self.patches.iter_mut()
    }

    /// Replaces a patch field, e.g. with one built by the registry.
    pub fn set_patch(&mut self, patchi: usize, field: Box<dyn PatchField<T>>) {
        self.patches[patchi] = field;
    }

    pub fn types(&self) -> Vec<&'static str> {
        self.patches.iter().map(|p| p.type_name()).collect()
    }

    pub fn values(&self) -> Vec<Vec<T>> {
        self.patches.iter().map(|p| p.values().to_vec()).collect()
    }

    pub fn boundary_internal_field(mesh: &Mesh, internal: &[T]) -> Vec<Vec<T>> {
        mesh.boundary()
            .iter()
            .map(|patch| patch.patch_internal_field(internal))
            .collect()
    }

    pub fn update_coeffs(&mut self, mesh: &Mesh, internal: &[T], field_name: &str) -> FieldResult<()> {
        for (patchi, patch) in self.patches.iter_mut().enumerate() {
            patch.update_coeffs(&PatchContext::new(mesh, patchi, internal, field_name))?;
        }
        Ok(())
    }

    /// Evaluates every patch with the partition's default discipline.
    pub fn evaluate(&mut self, mesh: &Mesh, internal: &[T], field_name: &str) -> FieldResult<()> {
        self.evaluate_with(mesh, internal, field_name, mesh.comms().default_comms_type())
    }

    pub fn evaluate_with(
        &mut self,
        mesh: &Mesh,
        internal: &[T],
        field_name: &str,
        comms_type: CommsType,
    ) -> FieldResult<()> {
        let ctx = |patchi| PatchContext::new(mesh, patchi, internal, field_name);
        debug!("evaluating boundary of {field_name} ({comms_type})");
        match comms_type {
            CommsType::Blocking => {
                for (patchi, patch) in self.patches.iter_mut().enumerate() {
                    patch.init_evaluate(&ctx(patchi), comms_type)?;
                    patch.evaluate(&ctx(patchi), comms_type)?;
                }
            }
            CommsType::NonBlocking => {
                let pstream = mesh.comms();
                let n_requests = pstream.n_requests();
                for (patchi, patch) in self.patches.iter_mut().enumerate() {
                    patch.init_evaluate(&ctx(patchi), comms_type)?;
                }
                if pstream.par_run() {
                    pstream.wait_requests(n_requests)?;
                }
                for (patchi, patch) in self.patches.iter_mut().enumerate() {
                    patch.evaluate(&ctx(patchi), comms_type)?;
                }
            }
            CommsType::Scheduled => {
                for entry in mesh.patch_schedule() {
                    let patch = self.patches.get_mut(entry.patch).ok_or_else(|| {
                        FieldError::InvalidSchedule {
                            reason: format!(
                                "entry refers to patch {} of {field_name} which has {} patches",
                                entry.patch,
                                mesh.boundary().len()
                            ),
                        }
                    })?;
                    if entry.init {
                        patch.init_evaluate(&ctx(entry.patch), comms_type)?;
                    } else {
                        patch.evaluate(&ctx(entry.patch), comms_type)?;
                    }
                }
            }
        }
        Ok(())
    }

    pub fn manipulate_matrix(&mut self, matrix: &mut FvMatrix<T>) -> FieldResult<()> {
        for patch in &mut self.patches {
            patch.manipulate_matrix(matrix)?;
        }
        Ok(())
    }

    /// Patch-wise assignment respecting each field's assignability.
    pub fn assign(&mut self, values: &[Vec<T>]) -> FieldResult<()> {
        for (patch, values) in self.patches.iter_mut().zip(values) {
            patch.assign(values)?;
        }
        Ok(())
    }

    pub fn force_assign(&mut self, values: &[Vec<T>]) -> FieldResult<()> {
        for (patch, values) in self.patches.iter_mut().zip(values) {
            patch.force_assign(values)?;
        }
        Ok(())
    }

    /// Remaps every patch; `mappers` is index-aligned with the patches.
    pub fn auto_map(
        &mut self,
        mesh: &Mesh,
        internal: &[T],
        field_name: &str,
        mappers: &[PatchFieldMapper],
    ) -> FieldResult<()> {
        if mappers.len() != self.patches.len() {
            return Err(FieldError::PatchCountMismatch {
                field: field_name.to_string(),
                given: mappers.len(),
                expected: self.patches.len(),
            });
        }
        let registry = T::registry();
        for (patchi, (patch, mapper)) in self.patches.iter_mut().zip(mappers).enumerate() {
            let ctx = PatchContext::new(mesh, patchi, internal, field_name);
            *patch = registry.map_patch_field(patch.as_ref(), &ctx, mapper)?;
        }
        Ok(())
    }

    pub fn write(&self, mesh: &Mesh, dict: &mut Dictionary) {
        for (patch, field) in mesh.boundary().iter().zip(&self.patches) {
            let mut entry = Dictionary::new(format!("{}/{}", dict.path(), patch.name()));
            field.write(&mut entry);
            dict.set_sub_dict(patch.name(), entry);
        }
    }
}
