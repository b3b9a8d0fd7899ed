use std::fmt;
use std::sync::Arc;

use crate::solver::comms::Pstream;
use crate::solver::error::{FieldError, FieldResult};
use crate::solver::primitives::Vector;
use crate::solver::time::Time;

/// Geometric type of a patch. Constraint kinds force a matching patch field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PatchKind {
    Patch,
    Wall,
    Empty,
    SymmetryPlane,
    Cyclic {
        neighbour_patch: usize,
    },
    /// Interface to another partition; both sides use the same `tag`.
    Processor {
        my_proc: usize,
        neighb_proc: usize,
        tag: usize,
    },
}

impl PatchKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            PatchKind::Patch => "patch",
            PatchKind::Wall => "wall",
            PatchKind::Empty => "empty",
            PatchKind::SymmetryPlane => "symmetryPlane",
            PatchKind::Cyclic { .. } => "cyclic",
            PatchKind::Processor { .. } => "processor",
        }
    }

    pub fn constraint_type(&self) -> Option<&'static str> {
        match self {
            PatchKind::Patch | PatchKind::Wall => None,
            other => Some(other.type_name()),
        }
    }

    pub fn coupled(&self) -> bool {
        matches!(self, PatchKind::Cyclic { .. } | PatchKind::Processor { .. })
    }
}

impl fmt::Display for PatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

/// Face geometry of one boundary patch.
#[derive(Clone, Debug)]
pub struct FvPatch {
    name: String,
    kind: PatchKind,
    face_cells: Vec<usize>,
    face_centres: Vec<Vector>,
    nf: Vec<Vector>,
    mag_sf: Vec<f64>,
    delta_coeffs: Vec<f64>,
    weights: Vec<f64>,
}

impl FvPatch {
    /// Unit-area faces with normal +x and unit delta coefficients.
    pub fn new(name: impl Into<String>, kind: PatchKind, face_cells: Vec<usize>) -> Self {
        let n = face_cells.len();
        let weight = if kind.coupled() { 0.5 } else { 1.0 };
        Self {
            name: name.into(),
            kind,
            face_cells,
            face_centres: vec![Vector::zeros(); n],
            nf: vec![Vector::x(); n],
            mag_sf: vec![1.0; n],
            delta_coeffs: vec![1.0; n],
            weights: vec![weight; n],
        }
    }

    pub fn with_delta_coeffs(mut self, delta_coeffs: Vec<f64>) -> Self {
        self.delta_coeffs = delta_coeffs;
        self
    }

    pub fn with_uniform_delta_coeffs(mut self, delta: f64) -> Self {
        self.delta_coeffs = vec![delta; self.face_cells.len()];
        self
    }

    /// Normals are normalised on the way in.
    pub fn with_normals(mut self, normals: Vec<Vector>) -> Self {
        self.nf = normals.into_iter().map(|n| n.normalize()).collect();
        self
    }

    pub fn with_uniform_normal(mut self, normal: Vector) -> Self {
        self.nf = vec![normal.normalize(); self.face_cells.len()];
        self
    }

    pub fn with_face_centres(mut self, centres: Vec<Vector>) -> Self {
        self.face_centres = centres;
        self
    }

    pub fn with_mag_sf(mut self, mag_sf: Vec<f64>) -> Self {
        self.mag_sf = mag_sf;
        self
    }

    pub fn with_weights(mut self, weights: Vec<f64>) -> Self {
        self.weights = weights;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> PatchKind {
        self.kind
    }

    pub fn patch_type(&self) -> &'static str {
        self.kind.type_name()
    }

    pub fn constraint_type(&self) -> Option<&'static str> {
        self.kind.constraint_type()
    }

    pub fn coupled(&self) -> bool {
        self.kind.coupled()
    }

    pub fn face_count(&self) -> usize {
        self.face_cells.len()
    }

    pub fn face_cells(&self) -> &[usize] {
        &self.face_cells
    }

    pub fn face_centres(&self) -> &[Vector] {
        &self.face_centres
    }

    /// Unit face normals, pointing out of the domain.
    pub fn nf(&self) -> &[Vector] {
        &self.nf
    }

    pub fn mag_sf(&self) -> &[f64] {
        &self.mag_sf
    }

    /// Inverse owner-centre to face distance.
    pub fn delta_coeffs(&self) -> &[f64] {
        &self.delta_coeffs
    }

    /// Interpolation weight of the owner cell.
    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// Gathers owner-cell values onto the patch faces.
    pub fn patch_internal_field<T: Copy>(&self, internal: &[T]) -> Vec<T> {
        self.face_cells.iter().map(|&cell| internal[cell]).collect()
    }

    fn validate(&self, n_cells: usize) -> FieldResult<()> {
        let n = self.face_count();
        let sizes = [
            ("faceCentres", self.face_centres.len()),
            ("nf", self.nf.len()),
            ("magSf", self.mag_sf.len()),
            ("deltaCoeffs", self.delta_coeffs.len()),
            ("weights", self.weights.len()),
        ];
        for (what, actual) in sizes {
            if actual != n {
                return Err(FieldError::SizeMismatch {
                    what: what.to_string(),
                    field: format!("patch {}", self.name),
                    expected: n,
                    actual,
                });
            }
        }
        if let Some(&cell) = self.face_cells.iter().find(|&&cell| cell >= n_cells) {
            return Err(FieldError::InvalidMesh(format!(
                "patch {} addresses cell {cell} but the mesh has {n_cells} cells",
                self.name
            )));
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct InternalFace {
    pub owner: usize,
    pub neighbour: usize,
    pub delta_coeff: f64,
    pub mag_sf: f64,
}

/// One step of an externally supplied patch evaluation order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PatchScheduleEntry {
    pub patch: usize,
    pub init: bool,
}

/// The mesh as seen by fields: cell count, internal faces, boundary patches,
/// the shared clock and the partition's communicator.
#[derive(Debug)]
pub struct Mesh {
    n_cells: usize,
    cell_centres: Vec<Vector>,
    internal_faces: Vec<InternalFace>,
    patches: Vec<FvPatch>,
    patch_schedule: Vec<PatchScheduleEntry>,
    time: Arc<Time>,
    comms: Arc<Pstream>,
}

impl Mesh {
    pub fn builder(n_cells: usize) -> MeshBuilder {
        MeshBuilder::new(n_cells)
    }

    pub fn n_cells(&self) -> usize {
        self.n_cells
    }

    pub fn cell_centres(&self) -> &[Vector] {
        &self.cell_centres
    }

    pub fn internal_faces(&self) -> &[InternalFace] {
        &self.internal_faces
    }

    pub fn boundary(&self) -> &[FvPatch] {
        &self.patches
    }

    pub fn patch(&self, index: usize) -> &FvPatch {
        &self.patches[index]
    }

    pub fn find_patch(&self, name: &str) -> Option<usize> {
        self.patches.iter().position(|p| p.name() == name)
    }

    pub fn patch_schedule(&self) -> &[PatchScheduleEntry] {
        &self.patch_schedule
    }

    pub fn time(&self) -> &Time {
        &self.time
    }

    pub fn time_handle(&self) -> Arc<Time> {
        self.time.clone()
    }

    pub fn comms(&self) -> &Pstream {
        &self.comms
    }

    /// All inits in patch order, then all evaluates.
    pub fn default_patch_schedule(n_patches: usize) -> Vec<PatchScheduleEntry> {
        (0..n_patches)
            .map(|patch| PatchScheduleEntry { patch, init: true })
            .chain((0..n_patches).map(|patch| PatchScheduleEntry { patch, init: false }))
            .collect()
    }
}

pub struct MeshBuilder {
    n_cells: usize,
    cell_centres: Option<Vec<Vector>>,
    internal_faces: Vec<InternalFace>,
    patches: Vec<FvPatch>,
    patch_schedule: Option<Vec<PatchScheduleEntry>>,
    time: Option<Arc<Time>>,
    comms: Option<Arc<Pstream>>,
}

impl MeshBuilder {
    pub fn new(n_cells: usize) -> Self {
        Self {
            n_cells,
            cell_centres: None,
            internal_faces: Vec::new(),
            patches: Vec::new(),
            patch_schedule: None,
            time: None,
            comms: None,
        }
    }

    /// Uniform 1D column of `n_cells` along x with `left` and `right` patches
    /// of the given kinds.
    pub fn line(n_cells: usize, length: f64, left: PatchKind, right: PatchKind) -> Self {
        let h = length / n_cells as f64;
        let mut builder = Self::new(n_cells).cell_centres(
            (0..n_cells)
                .map(|i| Vector::new((i as f64 + 0.5) * h, 0.0, 0.0))
                .collect(),
        );
        for i in 1..n_cells {
            builder = builder.internal_face(InternalFace {
                owner: i - 1,
                neighbour: i,
                delta_coeff: 1.0 / h,
                mag_sf: 1.0,
            });
        }
        let last = n_cells.saturating_sub(1);
        builder
            .patch(
                FvPatch::new("left", left, vec![0])
                    .with_uniform_delta_coeffs(2.0 / h)
                    .with_uniform_normal(-Vector::x())
                    .with_face_centres(vec![Vector::zeros()]),
            )
            .patch(
                FvPatch::new("right", right, vec![last])
                    .with_uniform_delta_coeffs(2.0 / h)
                    .with_uniform_normal(Vector::x())
                    .with_face_centres(vec![Vector::new(length, 0.0, 0.0)]),
            )
    }

    pub fn cell_centres(mut self, centres: Vec<Vector>) -> Self {
        self.cell_centres = Some(centres);
        self
    }

    pub fn internal_face(mut self, face: InternalFace) -> Self {
        self.internal_faces.push(face);
        self
    }

    pub fn patch(mut self, patch: FvPatch) -> Self {
        self.patches.push(patch);
        self
    }

    pub fn patch_schedule(mut self, schedule: Vec<PatchScheduleEntry>) -> Self {
        self.patch_schedule = Some(schedule);
        self
    }

    pub fn time(mut self, time: Arc<Time>) -> Self {
        self.time = Some(time);
        self
    }

    pub fn comms(mut self, comms: Pstream) -> Self {
        self.comms = Some(Arc::new(comms));
        self
    }

    pub fn build(self) -> FieldResult<Arc<Mesh>> {
        let n_cells = self.n_cells;
        let comms = self.comms.unwrap_or_else(|| Arc::new(Pstream::serial()));

        for patch in &self.patches {
            patch.validate(n_cells)?;
            match patch.kind() {
                PatchKind::Cyclic { neighbour_patch } => {
                    let neighbour = self.patches.get(neighbour_patch).ok_or_else(|| {
                        FieldError::InvalidMesh(format!(
                            "cyclic patch {} refers to missing patch {neighbour_patch}",
                            patch.name()
                        ))
                    })?;
                    if neighbour.face_count() != patch.face_count() {
                        return Err(FieldError::SizeMismatch {
                            what: format!("cyclic partner {}", neighbour.name()),
                            field: format!("patch {}", patch.name()),
                            expected: patch.face_count(),
                            actual: neighbour.face_count(),
                        });
                    }
                }
                PatchKind::Processor {
                    my_proc,
                    neighb_proc,
                    ..
                } => {
                    let bad_peer = comms.par_run()
                        && (neighb_proc >= comms.n_procs() || neighb_proc == my_proc);
                    if my_proc != comms.rank() || bad_peer {
                        return Err(FieldError::InvalidMesh(format!(
                            "processor patch {} connects {my_proc} to {neighb_proc} on rank {} of {}",
                            patch.name(),
                            comms.rank(),
                            comms.n_procs()
                        )));
                    }
                }
                _ => {}
            }
        }

        for face in &self.internal_faces {
            if face.owner >= n_cells || face.neighbour >= n_cells {
                return Err(FieldError::InvalidMesh(format!(
                    "internal face {}-{} outside {n_cells} cells",
                    face.owner, face.neighbour
                )));
            }
        }

        let patch_schedule = self
            .patch_schedule
            .unwrap_or_else(|| Mesh::default_patch_schedule(self.patches.len()));
        if let Some(entry) = patch_schedule
            .iter()
            .find(|entry| entry.patch >= self.patches.len())
        {
            return Err(FieldError::InvalidSchedule {
                reason: format!(
                    "entry refers to patch {} but the mesh has {} patches",
                    entry.patch,
                    self.patches.len()
                ),
            });
        }

        let cell_centres = self
            .cell_centres
            .unwrap_or_else(|| vec![Vector::zeros(); n_cells]);
        if cell_centres.len() != n_cells {
            return Err(FieldError::SizeMismatch {
                what: "cell centres".to_string(),
                field: "mesh".to_string(),
                expected: n_cells,
                actual: cell_centres.len(),
            });
        }

        Ok(Arc::new(Mesh {
            n_cells,
            cell_centres,
            internal_faces: self.internal_faces,
            patches: self.patches,
            patch_schedule,
            time: self.time.unwrap_or_default(),
            comms,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_mesh_has_two_boundary_patches() {
        let mesh = MeshBuilder::line(4, 1.0, PatchKind::Patch, PatchKind::Wall)
            .build()
            .unwrap();
        assert_eq!(mesh.n_cells(), 4);
        assert_eq!(mesh.internal_faces().len(), 3);
        assert_eq!(mesh.boundary().len(), 2);
        assert_eq!(mesh.patch(1).face_cells(), &[3]);
        assert_eq!(mesh.patch(0).delta_coeffs(), &[8.0]);
        assert_eq!(mesh.patch(1).patch_type(), "wall");
        assert_eq!(mesh.patch_schedule().len(), 4);
    }

    #[test]
    fn patch_internal_field_gathers_owner_values() {
        let patch = FvPatch::new("p", PatchKind::Patch, vec![2, 0]);
        assert_eq!(patch.patch_internal_field(&[1.0, 2.0, 3.0]), vec![3.0, 1.0]);
    }

    #[test]
    fn build_rejects_out_of_range_addressing() {
        let result = Mesh::builder(2)
            .patch(FvPatch::new("p", PatchKind::Patch, vec![5]))
            .build();
        assert!(matches!(result, Err(FieldError::InvalidMesh(_))));
    }

    #[test]
    fn build_rejects_schedule_for_missing_patch() {
        let result = Mesh::builder(1)
            .patch(FvPatch::new("p", PatchKind::Patch, vec![0]))
            .patch_schedule(vec![PatchScheduleEntry {
                patch: 3,
                init: true,
            }])
            .build();
        assert!(matches!(result, Err(FieldError::InvalidSchedule { .. })));
    }

    #[test]
    fn constraint_types_follow_kind() {
        assert_eq!(PatchKind::Wall.constraint_type(), None);
        assert_eq!(PatchKind::Empty.constraint_type(), Some("empty"));
        assert!(PatchKind::Cyclic { neighbour_patch: 0 }.coupled());
    }
}
