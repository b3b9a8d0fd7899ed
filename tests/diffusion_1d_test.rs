// Steady 1D diffusion through the patch coefficients: the implicit
// Laplacian must reproduce the linear profile set by the end conditions.

use std::sync::Arc;

use approx::assert_relative_eq;
use cfdbc::solver::error::FieldError;
use cfdbc::solver::{
    Dictionary, FvMatrix, GeometricField, MeshBuilder, PatchKind, SolverControls, Vector,
};
use serde_json::{json, Value};

const N_CELLS: usize = 10;

fn column<T: cfdbc::solver::FieldElement>(
    name: &str,
    left: Value,
    right: Value,
    internal: Value,
) -> GeometricField<T> {
    let mesh = MeshBuilder::line(N_CELLS, 1.0, PatchKind::Patch, PatchKind::Wall)
        .build()
        .unwrap();
    GeometricField::from_dict(
        name,
        mesh,
        &Dictionary::from_value(
            name,
            json!({
                "dimensions": [0, 0, 0, 1, 0, 0, 0],
                "internalField": internal,
                "boundaryField": { "left": left, "right": right }
            }),
        )
        .unwrap(),
    )
    .unwrap()
}

fn centres() -> impl Iterator<Item = f64> {
    let h = 1.0 / N_CELLS as f64;
    (0..N_CELLS).map(move |i| (i as f64 + 0.5) * h)
}

#[test]
fn fixed_values_give_a_linear_profile() {
    let mut t = column::<f64>(
        "T",
        json!({ "type": "fixedValue", "value": 0.0 }),
        json!({ "type": "fixedValue", "value": 1.0 }),
        json!(0.5),
    );
    let mut matrix = FvMatrix::laplacian(&mut t, 0.1).unwrap();
    let perf = matrix.solve(&mut t, &SolverControls::default()).unwrap();
    assert!(perf.converged);

    for (value, x) in t.internal().iter().zip(centres()) {
        assert_relative_eq!(*value, x, epsilon = 1e-8);
    }
    assert_relative_eq!(t.sn_grad(1).unwrap()[0], 1.0, epsilon = 1e-7);
}

#[test]
fn gradient_end_is_honoured() {
    let mut t = column::<f64>(
        "T",
        json!({ "type": "fixedValue", "value": 2.0 }),
        json!({ "type": "fixedGradient", "gradient": 3.0 }),
        json!(0.0),
    );
    let mut matrix = FvMatrix::laplacian(&mut t, 1.0).unwrap();
    matrix.solve(&mut t, &SolverControls::default()).unwrap();

    for (value, x) in t.internal().iter().zip(centres()) {
        assert_relative_eq!(*value, 2.0 + 3.0 * x, epsilon = 1e-8);
    }
    assert_relative_eq!(t.boundary().patch(1).values()[0], 5.0, epsilon = 1e-8);
}

#[test]
fn slip_wall_fixes_only_the_normal_component() {
    let mut u = column::<Vector>(
        "U",
        json!({ "type": "fixedValue", "value": [1.0, 2.0, 0.0] }),
        json!({ "type": "fixedNormalSlip", "fixedValue": [0.0, 0.0, 0.0] }),
        json!([0.0, 0.0, 0.0]),
    );
    let mut matrix = FvMatrix::laplacian(&mut u, 1.0).unwrap();
    matrix.solve(&mut u, &SolverControls::default()).unwrap();

    for (value, x) in u.internal().iter().zip(centres()) {
        assert_relative_eq!(value.x, 1.0 - x, epsilon = 1e-8);
        assert_relative_eq!(value.y, 2.0, epsilon = 1e-8);
        assert_relative_eq!(value.z, 0.0, epsilon = 1e-8);
    }
    let wall = u.boundary().patch(1).values()[0];
    assert_relative_eq!(wall.x, 0.0, epsilon = 1e-8);
    assert_relative_eq!(wall.y, 2.0, epsilon = 1e-8);
}

#[test]
fn calculated_patches_cannot_be_solved_for() {
    let mesh = MeshBuilder::line(3, 1.0, PatchKind::Patch, PatchKind::Patch)
        .build()
        .unwrap();
    let mut t = GeometricField::<f64>::new("T", Arc::clone(&mesh), cfdbc::solver::dimensions::si::TEMPERATURE)
        .unwrap();
    let err = FvMatrix::laplacian(&mut t, 1.0).unwrap_err();
    assert!(matches!(err, FieldError::CalculatedCoefficients { ref field, .. } if field == "T"));
}

#[test]
fn solver_controls_come_from_the_solution_dictionary() {
    let solution = Dictionary::from_value(
        "fvSolution",
        json!({ "solvers": { "T": { "tolerance": 1e-6, "maxIter": 20 } } }),
    )
    .unwrap();
    let controls = SolverControls::from_dict(&solution, "T").unwrap();
    assert_eq!(controls.tolerance, 1e-6);
    assert_eq!(controls.max_iter, 20);
    assert_eq!(
        SolverControls::from_dict(&solution, "U").unwrap(),
        SolverControls::default()
    );
}
