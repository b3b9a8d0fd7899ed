//! Minimal finite-volume matrix: receives the boundary coefficient
//! contributions of a field's patches and solves the assembled system.

use log::{debug, info, warn};
use wide::f64x4;

use crate::solver::dictionary::Dictionary;
use crate::solver::error::FieldResult;
use crate::solver::fields::GeometricField;
use crate::solver::mesh::PatchKind;
use crate::solver::primitives::FieldElement;

/// Compressed sparse row matrix.
#[derive(Clone, Debug)]
pub struct SparseMatrix {
    pub values: Vec<f64>,
    pub col_indices: Vec<usize>,
    pub row_offsets: Vec<usize>,
    pub n_rows: usize,
    pub n_cols: usize,
}

impl SparseMatrix {
    /// Builds the matrix from `(row, col, value)` entries. Repeated positions
    /// are kept as separate entries and sum under multiplication.
    pub fn from_triplets(n_rows: usize, n_cols: usize, triplets: &[(usize, usize, f64)]) -> Self {
        let mut row_offsets = vec![0; n_rows + 1];
        for &(r, _, _) in triplets {
            row_offsets[r + 1] += 1;
        }
        for i in 0..n_rows {
            row_offsets[i + 1] += row_offsets[i];
        }

        let mut values = vec![0.0; triplets.len()];
        let mut col_indices = vec![0; triplets.len()];
        let mut next = row_offsets.clone();
        for &(r, c, v) in triplets {
            values[next[r]] = v;
            col_indices[next[r]] = c;
            next[r] += 1;
        }

        Self {
            values,
            col_indices,
            row_offsets,
            n_rows,
            n_cols,
        }
    }

    pub fn mat_vec_mul(&self, x: &[f64], y: &mut [f64]) {
        debug_assert_eq!(x.len(), self.n_cols);
        debug_assert_eq!(y.len(), self.n_rows);
        for (i, yi) in y.iter_mut().enumerate() {
            let row = self.row_offsets[i]..self.row_offsets[i + 1];
            *yi = self.values[row.clone()]
                .iter()
                .zip(&self.col_indices[row])
                .map(|(v, &c)| v * x[c])
                .sum();
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SolverPerformance {
    pub iterations: usize,
    pub initial_residual: f64,
    pub final_residual: f64,
    pub converged: bool,
}

/// `out = a + s * b`, four lanes at a time.
fn axpy_into(out: &mut [f64], a: &[f64], s: f64, b: &[f64]) {
    let n = out.len();
    let vs = f64x4::splat(s);
    let mut i = 0;
    while i + 4 <= n {
        let res = f64x4::from(&a[i..i + 4]) + vs * f64x4::from(&b[i..i + 4]);
        let res: [f64; 4] = res.into();
        out[i..i + 4].copy_from_slice(&res);
        i += 4;
    }
    while i < n {
        out[i] = a[i] + s * b[i];
        i += 1;
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    let n = a.len();
    let mut sum = f64x4::splat(0.0);
    let mut i = 0;
    while i + 4 <= n {
        sum += f64x4::from(&a[i..i + 4]) * f64x4::from(&b[i..i + 4]);
        i += 4;
    }
    let mut s = sum.reduce_add();
    while i < n {
        s += a[i] * b[i];
        i += 1;
    }
    s
}

fn norm(a: &[f64]) -> f64 {
    dot(a, a).sqrt()
}

/// Stabilised bi-conjugate gradient solve of `a x = b`, starting from `x`.
pub fn solve_bicgstab(
    a: &SparseMatrix,
    b: &[f64],
    x: &mut [f64],
    max_iter: usize,
    tol: f64,
) -> SolverPerformance {
    let n = b.len();
    let mut ax = vec![0.0; n];
    a.mat_vec_mul(x, &mut ax);
    let mut r = vec![0.0; n];
    axpy_into(&mut r, b, -1.0, &ax);

    let initial_residual = norm(&r);
    let mut perf = SolverPerformance {
        iterations: 0,
        initial_residual,
        final_residual: initial_residual,
        converged: initial_residual < tol,
    };
    if perf.converged {
        return perf;
    }

    let r0 = r.clone();
    let (mut rho_old, mut alpha, mut omega) = (1.0, 1.0, 1.0);
    let mut v = vec![0.0; n];
    let mut p = vec![0.0; n];
    let mut s = vec![0.0; n];
    let mut t = vec![0.0; n];
    let mut tmp = vec![0.0; n];

    for iter in 0..max_iter {
        perf.iterations = iter + 1;
        let rho = dot(&r0, &r);
        if rho.is_nan() || rho.abs() < 1e-300 {
            warn!("BiCGStab breakdown at iteration {iter}: rho = {rho}");
            break;
        }

        if iter == 0 {
            p.copy_from_slice(&r);
        } else {
            let beta = (rho / rho_old) * (alpha / omega);
            // p = r + beta (p - omega v)
            axpy_into(&mut tmp, &p, -omega, &v);
            axpy_into(&mut p, &r, beta, &tmp);
        }

        a.mat_vec_mul(&p, &mut v);
        let r0_v = dot(&r0, &v);
        if r0_v.abs() < 1e-300 {
            break;
        }
        alpha = rho / r0_v;
        axpy_into(&mut s, &r, -alpha, &v);

        if norm(&s) < tol {
            axpy_into(&mut tmp, x, alpha, &p);
            x.copy_from_slice(&tmp);
            perf.final_residual = norm(&s);
            perf.converged = true;
            return perf;
        }

        a.mat_vec_mul(&s, &mut t);
        let t_t = dot(&t, &t);
        omega = if t_t.abs() < 1e-300 { 0.0 } else { dot(&t, &s) / t_t };

        axpy_into(&mut tmp, x, alpha, &p);
        axpy_into(x, &tmp, omega, &s);
        axpy_into(&mut r, &s, -omega, &t);

        perf.final_residual = norm(&r);
        if perf.final_residual < tol {
            perf.converged = true;
            return perf;
        }
        if perf.final_residual > 1e10 * initial_residual.max(1.0) {
            warn!("BiCGStab diverging at iteration {iter}: residual {}", perf.final_residual);
            return perf;
        }
        if omega.abs() < 1e-300 {
            break;
        }
        rho_old = rho;
    }

    perf
}

/// Tolerance and iteration limit for one field, read from the `solvers`
/// entry of a solution dictionary.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SolverControls {
    pub tolerance: f64,
    pub max_iter: usize,
}

impl Default for SolverControls {
    fn default() -> Self {
        Self {
            tolerance: 1e-10,
            max_iter: 1000,
        }
    }
}

impl SolverControls {
    pub fn from_dict(solution: &Dictionary, field_name: &str) -> FieldResult<Self> {
        let solvers = solution.sub_dict_or_empty("solvers")?;
        let controls = solvers.sub_dict_or_empty(field_name)?;
        let defaults = Self::default();
        Ok(Self {
            tolerance: controls.lookup_or_default("tolerance", defaults.tolerance)?,
            max_iter: controls.lookup_or_default("maxIter", defaults.max_iter)?,
        })
    }
}

/// Off-diagonal coupling through a cyclic patch: cell `owner` sees cell
/// `neighbour` with coefficient `coeff` per component.
#[derive(Clone, Debug)]
struct CoupledCoeff<T> {
    owner: usize,
    neighbour: usize,
    coeff: T,
}

/// LDU-style matrix for a field of `T`, solved component by component.
///
/// `upper`/`lower` hold one coefficient per internal face. Patch
/// contributions are kept per patch: `internal_coeffs` add to the diagonal of
/// the face cells and `boundary_coeffs` add to the source (or couple to the
/// partner cells of coupled patches).
#[derive(Clone, Debug)]
pub struct FvMatrix<T: FieldElement> {
    field_name: String,
    diag: Vec<f64>,
    upper: Vec<f64>,
    lower: Vec<f64>,
    source: Vec<T>,
    internal_coeffs: Vec<Vec<T>>,
    boundary_coeffs: Vec<Vec<T>>,
}

impl<T: FieldElement> FvMatrix<T> {
    /// Empty matrix for `field`. Patch coefficients are refreshed first.
    pub fn new(field: &mut GeometricField<T>) -> FieldResult<Self> {
        field.update_coeffs()?;
        let mesh = field.mesh();
        let n_faces = mesh.internal_faces().len();
        Ok(Self {
            field_name: field.name().to_string(),
            diag: vec![0.0; mesh.n_cells()],
            upper: vec![0.0; n_faces],
            lower: vec![0.0; n_faces],
            source: vec![T::zero(); mesh.n_cells()],
            internal_coeffs: mesh
                .boundary()
                .iter()
                .map(|p| vec![T::zero(); p.face_count()])
                .collect(),
            boundary_coeffs: mesh
                .boundary()
                .iter()
                .map(|p| vec![T::zero(); p.face_count()])
                .collect(),
        })
    }

    /// Implicit Laplacian of `field` with uniform diffusivity `gamma`.
    pub fn laplacian(field: &mut GeometricField<T>, gamma: f64) -> FieldResult<Self> {
        let mut matrix = Self::new(field)?;
        let mesh = field.mesh().clone();

        for (facei, face) in mesh.internal_faces().iter().enumerate() {
            let coeff = gamma * face.mag_sf * face.delta_coeff;
            matrix.upper[facei] = coeff;
            matrix.lower[facei] = coeff;
            matrix.diag[face.owner] -= coeff;
            matrix.diag[face.neighbour] -= coeff;
        }

        for (patchi, patch) in mesh.boundary().iter().enumerate() {
            let pf = field.boundary().patch(patchi);
            if pf.size() == 0 {
                continue;
            }
            let ctx = field.patch_context(patchi);
            let gic = pf.gradient_internal_coeffs(&ctx)?;
            let gbc = pf.gradient_boundary_coeffs(&ctx)?;
            let p_gamma: Vec<f64> = patch.mag_sf().iter().map(|&s| gamma * s).collect();
            matrix.internal_coeffs[patchi] =
                gic.iter().zip(&p_gamma).map(|(&c, &g)| c * g).collect();
            matrix.boundary_coeffs[patchi] =
                gbc.iter().zip(&p_gamma).map(|(&c, &g)| -(c * g)).collect();
        }

        debug!("assembled laplacian({gamma}, {})", matrix.field_name);
        Ok(matrix)
    }

    pub fn field_name(&self) -> &str {
        &self.field_name
    }

    pub fn diag(&self) -> &[f64] {
        &self.diag
    }

    pub fn diag_mut(&mut self) -> &mut [f64] {
        &mut self.diag
    }

    pub fn upper(&self) -> &[f64] {
        &self.upper
    }

    pub fn lower(&self) -> &[f64] {
        &self.lower
    }

    pub fn source(&self) -> &[T] {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut [T] {
        &mut self.source
    }

    pub fn internal_coeffs(&self, patchi: usize) -> &[T] {
        &self.internal_coeffs[patchi]
    }

    pub fn internal_coeffs_mut(&mut self, patchi: usize) -> &mut [T] {
        &mut self.internal_coeffs[patchi]
    }

    pub fn boundary_coeffs(&self, patchi: usize) -> &[T] {
        &self.boundary_coeffs[patchi]
    }

    pub fn boundary_coeffs_mut(&mut self, patchi: usize) -> &mut [T] {
        &mut self.boundary_coeffs[patchi]
    }

    /// Sets the value of `cell` by replacing its equation with `x = value`.
    pub fn set_reference(&mut self, cell: usize, value: T) {
        self.source[cell] += value * self.diag[cell];
        self.diag[cell] += self.diag[cell];
    }

    /// Lets the patches adjust the matrix, solves for `field` and corrects its
    /// boundary conditions. Returns the performance of the worst component.
    pub fn solve(
        &mut self,
        field: &mut GeometricField<T>,
        controls: &SolverControls,
    ) -> FieldResult<SolverPerformance> {
        field.boundary_mut().manipulate_matrix(self)?;

        let mesh = field.mesh().clone();
        let n_cells = mesh.n_cells();
        let mut coupled = Vec::new();
        let mut boundary_source = self.source.clone();
        let mut diag_cmpt: Vec<Vec<f64>> = vec![self.diag.clone(); T::N_COMPONENTS];

        for (patchi, patch) in mesh.boundary().iter().enumerate() {
            let pf = field.boundary().patch(patchi);
            for (facei, &cell) in patch.face_cells().iter().enumerate() {
                let ic = self.internal_coeffs[patchi][facei];
                for (d, diag) in diag_cmpt.iter_mut().enumerate() {
                    diag[cell] += ic.component(d);
                }
            }
            match patch.kind() {
                PatchKind::Cyclic { neighbour_patch } => {
                    let partner = mesh.patch(neighbour_patch);
                    for (facei, (&owner, &neighbour)) in
                        patch.face_cells().iter().zip(partner.face_cells()).enumerate()
                    {
                        coupled.push(CoupledCoeff {
                            owner,
                            neighbour,
                            coeff: self.boundary_coeffs[patchi][facei],
                        });
                    }
                }
                _ if pf.coupled() => {
                    // Other partitions are coupled explicitly through the
                    // current neighbour values.
                    let pnf = pf.patch_neighbour_field(&field.patch_context(patchi))?;
                    for (facei, &cell) in patch.face_cells().iter().enumerate() {
                        let bc = self.boundary_coeffs[patchi][facei];
                        boundary_source[cell] += bc.cmpt_multiply(pnf[facei]);
                    }
                }
                _ => {
                    for (facei, &cell) in patch.face_cells().iter().enumerate() {
                        boundary_source[cell] += self.boundary_coeffs[patchi][facei];
                    }
                }
            }
        }

        let mut worst: Option<SolverPerformance> = None;
        let mut solution: Vec<Vec<f64>> = Vec::with_capacity(T::N_COMPONENTS);
        for (d, diag) in diag_cmpt.iter().enumerate() {
            let mut triplets: Vec<(usize, usize, f64)> = diag
                .iter()
                .enumerate()
                .map(|(cell, &a)| (cell, cell, a))
                .collect();
            for (facei, face) in mesh.internal_faces().iter().enumerate() {
                triplets.push((face.owner, face.neighbour, self.upper[facei]));
                triplets.push((face.neighbour, face.owner, self.lower[facei]));
            }
            for c in &coupled {
                triplets.push((c.owner, c.neighbour, -c.coeff.component(d)));
            }
            let a = SparseMatrix::from_triplets(n_cells, n_cells, &triplets);
            let b: Vec<f64> = boundary_source.iter().map(|s| s.component(d)).collect();
            let mut x: Vec<f64> = field.internal().iter().map(|v| v.component(d)).collect();

            let perf = solve_bicgstab(&a, &b, &mut x, controls.max_iter, controls.tolerance);
            info!(
                "BiCGStab: Solving for {}[{d}], Initial residual = {:e}, Final residual = {:e}, No Iterations {}",
                self.field_name, perf.initial_residual, perf.final_residual, perf.iterations
            );
            if worst.map_or(true, |w| perf.final_residual > w.final_residual) {
                worst = Some(perf);
            }
            solution.push(x);
        }

        let internal = field.internal_mut();
        for (cell, v) in internal.iter_mut().enumerate() {
            let c: Vec<f64> = solution.iter().map(|x| x[cell]).collect();
            *v = T::from_components(&c);
        }
        field.correct_boundary_conditions()?;

        Ok(worst.unwrap_or(SolverPerformance {
            iterations: 0,
            initial_residual: 0.0,
            final_residual: 0.0,
            converged: true,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn bicgstab_solves_small_nonsymmetric_system() {
        let a = SparseMatrix::from_triplets(
            3,
            3,
            &[
                (0, 0, 4.0),
                (0, 1, 1.0),
                (1, 0, 2.0),
                (1, 1, 5.0),
                (1, 2, 1.0),
                (2, 1, 1.0),
                (2, 2, 3.0),
            ],
        );
        let expected = [1.0, -2.0, 3.0];
        let mut b = vec![0.0; 3];
        a.mat_vec_mul(&expected, &mut b);

        let mut x = vec![0.0; 3];
        let perf = solve_bicgstab(&a, &b, &mut x, 100, 1e-12);
        assert!(perf.converged);
        for (xi, ei) in x.iter().zip(expected) {
            assert_relative_eq!(*xi, ei, epsilon = 1e-9);
        }
    }

    #[test]
    fn repeated_triplets_accumulate() {
        let a = SparseMatrix::from_triplets(1, 1, &[(0, 0, 1.0), (0, 0, 2.0)]);
        let mut y = [0.0];
        a.mat_vec_mul(&[2.0], &mut y);
        assert_eq!(y, [6.0]);
    }
}
