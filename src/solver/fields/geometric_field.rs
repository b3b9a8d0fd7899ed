use std::sync::Arc;

use cfdbc_units::{DimensionError, DimensionSet, Dimensioned};
use log::debug;

use super::{BoundaryField, PatchContext, PatchField, PatchFieldMapper};
use crate::solver::dictionary::Dictionary;
use crate::solver::error::{FieldError, FieldResult};
use crate::solver::mesh::Mesh;
use crate::solver::primitives::FieldElement;

/// Mutable view handed out by [`GeometricField::advance_and_get_mut`].
pub struct FieldParts<'a, T: FieldElement> {
    pub mesh: &'a Mesh,
    pub name: &'a str,
    pub internal: &'a mut [T],
    pub boundary: &'a mut BoundaryField<T>,
}

/// A cell field with its boundary, dimensions and time history.
///
/// Old-time levels form a chain of boxed snapshots. The first level is
/// allocated on the first [`old_time`](Self::old_time) request; from then on
/// every mutable access checks the mesh clock and pushes the chain down one
/// level when the time index has advanced.
#[derive(Debug, Clone)]
pub struct GeometricField<T: FieldElement> {
    mesh: Arc<Mesh>,
    name: String,
    dimensions: DimensionSet,
    internal: Vec<T>,
    boundary: BoundaryField<T>,
    time_index: i64,
    old_time: Option<Box<GeometricField<T>>>,
    prev_iter: Option<Box<GeometricField<T>>>,
    is_old_time: bool,
}

impl<T: FieldElement> GeometricField<T> {
    /// Zero field with `calculated` patches.
    pub fn new(name: impl Into<String>, mesh: Arc<Mesh>, dimensions: DimensionSet) -> FieldResult<Self> {
        let internal = vec![T::zero(); mesh.n_cells()];
        let types = vec!["calculated"; mesh.boundary().len()];
        Self::with_patch_types(name, mesh, dimensions, internal, &types)
    }

    /// Uniform field; every patch gets `patch_type` and is set to the value.
    pub fn with_value(
        mesh: Arc<Mesh>,
        value: &Dimensioned<T>,
        patch_type: &str,
    ) -> FieldResult<Self> {
        let internal = vec![*value.value(); mesh.n_cells()];
        let types = vec![patch_type; mesh.boundary().len()];
        let mut field = Self::with_patch_types(value.name(), mesh, value.dimensions(), internal, &types)?;
        for patch in field.boundary.iter_mut() {
            let uniform = vec![*value.value(); patch.size()];
            patch.force_assign(&uniform)?;
        }
        Ok(field)
    }

    pub fn with_patch_types(
        name: impl Into<String>,
        mesh: Arc<Mesh>,
        dimensions: DimensionSet,
        internal: Vec<T>,
        types: &[&str],
    ) -> FieldResult<Self> {
        let name = name.into();
        check_cell_count(&mesh, &name, internal.len())?;
        let boundary = BoundaryField::with_patch_types(&mesh, &internal, &name, types)?;
        Ok(Self::assemble(name, mesh, dimensions, internal, boundary))
    }

    /// Reads `dimensions`, `internalField`, `boundaryField` and the optional
    /// `referenceLevel`, which is added to every internal and boundary value.
    pub fn from_dict(name: impl Into<String>, mesh: Arc<Mesh>, dict: &Dictionary) -> FieldResult<Self> {
        let name = name.into();
        let dimensions: DimensionSet = dict.lookup("dimensions")?;
        if let Some(len) = dict.list_len::<T>("internalField") {
            check_cell_count(&mesh, &name, len)?;
        }
        let mut internal: Vec<T> = dict.read_field("internalField", mesh.n_cells())?;
        let mut boundary =
            BoundaryField::from_dict(&mesh, &internal, &name, &dict.sub_dict("boundaryField")?)?;

        if dict.found("referenceLevel") {
            let level: T = dict.read_element("referenceLevel")?;
            debug!("adding reference level {level:?} to {name}");
            for v in &mut internal {
                *v += level;
            }
            for patch in boundary.iter_mut() {
                let shifted: Vec<T> = patch.values().iter().map(|&v| v + level).collect();
                patch.force_assign(&shifted)?;
            }
        }

        Ok(Self::assemble(name, mesh, dimensions, internal, boundary))
    }

    fn assemble(
        name: String,
        mesh: Arc<Mesh>,
        dimensions: DimensionSet,
        internal: Vec<T>,
        boundary: BoundaryField<T>,
    ) -> Self {
        let time_index = mesh.time().time_index();
        Self {
            mesh,
            name,
            dimensions,
            internal,
            boundary,
            time_index,
            old_time: None,
            prev_iter: None,
            is_old_time: false,
        }
    }

    /// Copy of the current state without history.
    fn snapshot(&self, name: String, time_index: i64, is_old_time: bool) -> Self {
        Self {
            mesh: self.mesh.clone(),
            name,
            dimensions: self.dimensions,
            internal: self.internal.clone(),
            boundary: self.boundary.clone(),
            time_index,
            old_time: None,
            prev_iter: None,
            is_old_time,
        }
    }

    pub fn write(&self, dict: &mut Dictionary) -> FieldResult<()> {
        dict.set("dimensions", self.dimensions)?;
        dict.write_field("internalField", &self.internal);
        let mut boundary = Dictionary::new(format!("{}/boundaryField", dict.path()));
        self.boundary.write(&self.mesh, &mut boundary);
        dict.set_sub_dict("boundaryField", boundary);
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mesh(&self) -> &Arc<Mesh> {
        &self.mesh
    }

    pub fn dimensions(&self) -> DimensionSet {
        self.dimensions
    }

    pub fn internal(&self) -> &[T] {
        &self.internal
    }

    pub fn boundary(&self) -> &BoundaryField<T> {
        &self.boundary
    }

    pub fn time_index(&self) -> i64 {
        self.time_index
    }

    pub fn is_old_time(&self) -> bool {
        self.is_old_time
    }

    pub fn types(&self) -> Vec<&'static str> {
        self.boundary.types()
    }

    pub fn boundary_internal_field(&self) -> Vec<Vec<T>> {
        BoundaryField::boundary_internal_field(&self.mesh, &self.internal)
    }

    /// Context for calling patch-field methods on patch `patchi` directly.
    pub fn patch_context(&self, patchi: usize) -> PatchContext<'_, T> {
        PatchContext::new(&self.mesh, patchi, &self.internal, &self.name)
    }

    pub fn sn_grad(&self, patchi: usize) -> FieldResult<Vec<T>> {
        self.boundary.patch(patchi).sn_grad(&self.patch_context(patchi))
    }

    /// Stores old times if the clock advanced, then returns mutable access to
    /// the internal and boundary values.
    pub fn advance_and_get_mut(&mut self) -> FieldParts<'_, T> {
        self.store_old_times();
        FieldParts {
            mesh: &self.mesh,
            name: &self.name,
            internal: &mut self.internal,
            boundary: &mut self.boundary,
        }
    }

    pub fn internal_mut(&mut self) -> &mut [T] {
        self.advance_and_get_mut().internal
    }

    pub fn boundary_mut(&mut self) -> &mut BoundaryField<T> {
        self.advance_and_get_mut().boundary
    }

    /// Pushes the old-time chain down if the time index advanced since the
    /// last store. Old-time snapshots never store for themselves.
    pub fn store_old_times(&mut self) {
        if self.is_old_time {
            return;
        }
        let current = self.mesh.time().time_index();
        if self.old_time.is_some() && self.time_index != current {
            debug!(
                "storing old time of {} (index {} -> {current})",
                self.name, self.time_index
            );
            self.store_old_time();
        }
        self.time_index = current;
    }

    /// Copies the current state one level down, deepest level first. Only
    /// existing levels are touched.
    pub fn store_old_time(&mut self) {
        if let Some(old) = self.old_time.as_mut() {
            old.store_old_time();
            old.internal.clone_from(&self.internal);
            old.boundary = self.boundary.clone();
            old.time_index = self.time_index;
        }
    }

    /// Previous time level, allocated on first use.
    pub fn old_time(&mut self) -> &GeometricField<T> {
        self.old_time_mut()
    }

    /// Mutable previous time level; calling `old_time` on it reaches deeper levels.
    pub fn old_time_mut(&mut self) -> &mut GeometricField<T> {
        self.store_old_times();
        let old = match self.old_time.take() {
            Some(old) => old,
            None => {
                debug!("allocating old-time level of {}", self.name);
                Box::new(self.snapshot(format!("{}_0", self.name), self.time_index - 1, true))
            }
        };
        self.old_time.insert(old)
    }

    pub fn has_old_time(&self) -> bool {
        self.old_time.is_some()
    }

    /// Depth of the stored old-time chain.
    pub fn n_old_times(&self) -> usize {
        self.old_time
            .as_deref()
            .map_or(0, |old| 1 + old.n_old_times())
    }

    pub fn store_prev_iter(&mut self) {
        debug!("storing previous iteration of {}", self.name);
        match self.prev_iter.as_mut() {
            Some(prev) => {
                prev.internal.clone_from(&self.internal);
                prev.boundary = self.boundary.clone();
                prev.time_index = self.time_index;
            }
            None => {
                let prev = self.snapshot(format!("{}PrevIter", self.name), self.time_index, false);
                self.prev_iter = Some(Box::new(prev));
            }
        }
    }

    pub fn prev_iter(&self) -> FieldResult<&GeometricField<T>> {
        self.prev_iter
            .as_deref()
            .ok_or_else(|| FieldError::PrevIterNotStored {
                field: self.name.clone(),
            })
    }

    /// `value = prev + alpha (value - prev)` on internal and boundary values.
    pub fn relax(&mut self, alpha: f64) -> FieldResult<()> {
        self.prev_iter()?;
        if alpha == 1.0 {
            return Ok(());
        }
        self.store_old_times();
        debug!("relaxing {} by {alpha}", self.name);

        if let Some(prev) = self.prev_iter.as_deref() {
            for (v, &p) in self.internal.iter_mut().zip(&prev.internal) {
                *v = p + (*v - p) * alpha;
            }
            for (patch, prev_patch) in self.boundary.iter_mut().zip(prev.boundary.iter()) {
                let relaxed: Vec<T> = patch
                    .values()
                    .iter()
                    .zip(prev_patch.values())
                    .map(|(&v, &p)| p + (v - p) * alpha)
                    .collect();
                patch.force_assign(&relaxed)?;
            }
        }
        Ok(())
    }

    /// Relaxes by the factor configured for this field in the
    /// `relaxationFactors` entry of `solution`, using `<name>Final` on the
    /// final iteration. Returns whether a factor was found.
    pub fn relax_from(&mut self, solution: &Dictionary, final_iter: bool) -> FieldResult<bool> {
        let factors = solution.sub_dict_or_empty("relaxationFactors")?;
        let factors = if factors.found("fields") {
            factors.sub_dict("fields")?
        } else {
            factors
        };
        let key = if final_iter {
            format!("{}Final", self.name)
        } else {
            self.name.clone()
        };
        if !factors.found(&key) {
            return Ok(false);
        }
        let alpha: f64 = factors.lookup(&key)?;
        self.relax(alpha)?;
        Ok(true)
    }

    /// Re-evaluates the boundary after storing old times if needed.
    pub fn correct_boundary_conditions(&mut self) -> FieldResult<()> {
        self.store_old_times();
        self.boundary.evaluate(&self.mesh, &self.internal, &self.name)
    }

    pub fn update_coeffs(&mut self) -> FieldResult<()> {
        self.boundary
            .update_coeffs(&self.mesh, &self.internal, &self.name)
    }

    /// True unless some patch fixes the value on any partition.
    pub fn need_reference(&self) -> FieldResult<bool> {
        let need_ref = !self.boundary.iter().any(|patch| patch.fixes_value());
        Ok(self.mesh.comms().reduce_and(need_ref)?)
    }

    pub fn auto_map(&mut self, mappers: &[PatchFieldMapper]) -> FieldResult<()> {
        if mappers.len() != self.boundary.len() {
            return Err(FieldError::PatchCountMismatch {
                field: self.name.clone(),
                given: mappers.len(),
                expected: self.boundary.len(),
            });
        }
        self.store_old_times();
        self.boundary
            .auto_map(&self.mesh, &self.internal, &self.name, mappers)
    }

    fn check_compatible(&self, other: &Self, op: &'static str) -> FieldResult<()> {
        if !Arc::ptr_eq(&self.mesh, &other.mesh) {
            return Err(FieldError::DifferentMesh {
                lhs: self.name.clone(),
                rhs: other.name.clone(),
                op,
            });
        }
        if self.dimensions != other.dimensions {
            return Err(DimensionError::Mismatch {
                op,
                lhs_name: self.name.clone(),
                lhs: self.dimensions,
                rhs_name: other.name.clone(),
                rhs: other.dimensions,
            }
            .into());
        }
        Ok(())
    }

    /// Copies values from `other`; non-assignable patches keep theirs.
    pub fn assign(&mut self, other: &Self) -> FieldResult<()> {
        self.check_compatible(other, "=")?;
        self.store_old_times();
        self.internal.clone_from(&other.internal);
        self.boundary.assign(&other.boundary.values())
    }

    /// Copies values from `other` into every patch, assignable or not.
    pub fn force_assign(&mut self, other: &Self) -> FieldResult<()> {
        self.check_compatible(other, "==")?;
        self.store_old_times();
        self.internal.clone_from(&other.internal);
        self.boundary.force_assign(&other.boundary.values())
    }

    pub fn try_add_assign(&mut self, other: &Self) -> FieldResult<()> {
        self.check_compatible(other, "+=")?;
        self.store_old_times();
        for (v, &o) in self.internal.iter_mut().zip(&other.internal) {
            *v += o;
        }
        for (patch, other_patch) in self.boundary.iter_mut().zip(other.boundary.iter()) {
            let sum: Vec<T> = patch
                .values()
                .iter()
                .zip(other_patch.values())
                .map(|(&a, &b)| a + b)
                .collect();
            patch.force_assign(&sum)?;
        }
        Ok(())
    }

    /// Multiplies every value by `factor` and combines the dimensions.
    pub fn scale(&mut self, factor: &Dimensioned<f64>) -> FieldResult<()> {
        self.store_old_times();
        let s = *factor.value();
        for v in &mut self.internal {
            *v = *v * s;
        }
        for patch in self.boundary.iter_mut() {
            let scaled: Vec<T> = patch.values().iter().map(|&v| v * s).collect();
            patch.force_assign(&scaled)?;
        }
        self.dimensions = self.dimensions * factor.dimensions();
        Ok(())
    }
}

fn check_cell_count(mesh: &Mesh, name: &str, actual: usize) -> FieldResult<()> {
    if actual == mesh.n_cells() {
        Ok(())
    } else {
        Err(FieldError::SizeMismatch {
            what: "internal field".to_string(),
            field: name.to_string(),
            expected: mesh.n_cells(),
            actual,
        })
    }
}
