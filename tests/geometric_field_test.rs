// Field-level behaviour: old-time storage, relaxation, dictionary
// construction and round trips.

use std::sync::Arc;

use approx::assert_relative_eq;
use cfdbc::solver::dimensions::{si, DimensionError, Dimensioned};
use cfdbc::solver::error::FieldError;
use cfdbc::solver::fields::PatchFieldMapper;
use cfdbc::solver::{Dictionary, GeometricField, Mesh, MeshBuilder, PatchKind, Time, Vector};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::{json, Value};

fn line(n: usize, time: Arc<Time>) -> Arc<Mesh> {
    MeshBuilder::line(n, n as f64, PatchKind::Patch, PatchKind::Wall)
        .time(time)
        .build()
        .unwrap()
}

fn dict(value: Value) -> Dictionary {
    Dictionary::from_value("T", value).unwrap()
}

fn temperature(mesh: Arc<Mesh>, left: Value, right: Value) -> Result<GeometricField<f64>, FieldError> {
    GeometricField::from_dict(
        "T",
        mesh,
        &dict(json!({
            "dimensions": [0, 0, 0, 1, 0, 0, 0],
            "internalField": { "uniform": 300.0 },
            "boundaryField": { "left": left, "right": right }
        })),
    )
}

#[test]
fn old_time_chain_follows_the_clock() {
    let time = Arc::new(Time::new(0.0, 1.0));
    let mut field = GeometricField::<f64>::new("T", line(3, time.clone()), si::TEMPERATURE).unwrap();
    field.internal_mut().copy_from_slice(&[1.0, 2.0, 3.0]);

    assert!(!field.has_old_time());
    let old = field.old_time();
    assert!(old.is_old_time());
    assert_eq!(old.name(), "T_0");
    assert_eq!(old.time_index(), -1);
    assert_eq!(old.internal(), &[1.0, 2.0, 3.0]);

    // Repeated requests in the same step reuse the stored level.
    field.old_time();
    assert_eq!(field.n_old_times(), 1);

    time.increment();
    field.internal_mut().copy_from_slice(&[4.0, 5.0, 6.0]);
    assert_eq!(field.time_index(), 1);
    assert_eq!(field.old_time().internal(), &[1.0, 2.0, 3.0]);
    assert_eq!(field.old_time().time_index(), 0);

    // A second level is only allocated on request.
    let old_old = field.old_time_mut().old_time();
    assert_eq!(old_old.name(), "T_0_0");
    assert_eq!(field.n_old_times(), 2);

    time.increment();
    field.internal_mut().copy_from_slice(&[7.0, 8.0, 9.0]);
    assert_eq!(field.old_time().internal(), &[4.0, 5.0, 6.0]);
    assert_eq!(field.old_time_mut().old_time().internal(), &[1.0, 2.0, 3.0]);
    assert_eq!(field.n_old_times(), 2);
}

#[test]
fn old_time_levels_do_not_store_for_themselves() {
    let time = Arc::new(Time::new(0.0, 1.0));
    let mut field = GeometricField::<f64>::new("T", line(2, time.clone()), si::TEMPERATURE).unwrap();
    field.old_time();
    time.increment();

    let old = field.old_time_mut();
    old.store_old_times();
    assert!(!old.has_old_time());
    assert_eq!(field.n_old_times(), 1);
}

#[test]
fn relaxation_bounds_reproduce_the_end_states() {
    let mut rng = StdRng::seed_from_u64(5);
    let mesh = line(5, Arc::new(Time::default()));
    let mut field = temperature(
        mesh,
        json!({ "type": "zeroGradient" }),
        json!({ "type": "zeroGradient" }),
    )
    .unwrap();

    let previous: Vec<f64> = (0..5).map(|_| rng.gen_range(0.0..1.0)).collect();
    field.internal_mut().copy_from_slice(&previous);
    field.correct_boundary_conditions().unwrap();
    field.store_prev_iter();
    let previous_boundary = field.boundary().values();

    let current: Vec<f64> = (0..5).map(|_| rng.gen_range(1.0..2.0)).collect();
    field.internal_mut().copy_from_slice(&current);
    field.correct_boundary_conditions().unwrap();
    let current_boundary = field.boundary().values();

    field.relax(1.0).unwrap();
    assert_eq!(field.internal(), current.as_slice());
    assert_eq!(field.boundary().values(), current_boundary);

    let mut restored = field.clone();
    restored.relax(0.0).unwrap();
    assert_eq!(restored.internal(), previous.as_slice());
    assert_eq!(restored.boundary().values(), previous_boundary);

    field.relax(0.25).unwrap();
    for ((&v, &p), &c) in field.internal().iter().zip(&previous).zip(&current) {
        assert_relative_eq!(v, p + 0.25 * (c - p), epsilon = 1e-14);
    }
}

#[test]
fn relax_from_reads_the_configured_factor() {
    let mesh = line(2, Arc::new(Time::default()));
    let mut field = temperature(
        mesh,
        json!({ "type": "zeroGradient" }),
        json!({ "type": "zeroGradient" }),
    )
    .unwrap();
    field.store_prev_iter();
    field.internal_mut().copy_from_slice(&[310.0, 320.0]);

    let solution = dict(json!({ "relaxationFactors": { "fields": { "T": 0.5 } } }));
    assert!(!field.relax_from(&solution, true).unwrap());
    assert_eq!(field.internal(), &[310.0, 320.0]);
    assert!(field.relax_from(&solution, false).unwrap());
    assert_eq!(field.internal(), &[305.0, 310.0]);
}

#[test]
fn dictionary_errors_name_what_is_wrong() {
    let time = Arc::new(Time::default());

    let err = temperature(
        line(2, time.clone()),
        json!({ "type": "fixedValue" }),
        json!({ "type": "zeroGradient" }),
    )
    .unwrap_err();
    assert!(matches!(err, FieldError::MissingEntry { ref entry, ref patch, .. } if entry == "value" && patch == "left"));

    let err = temperature(
        line(2, time.clone()),
        json!({ "type": "fixedValu", "value": 1.0 }),
        json!({ "type": "zeroGradient" }),
    )
    .unwrap_err();
    match err {
        FieldError::UnknownPatchFieldType { type_name, valid, .. } => {
            assert_eq!(type_name, "fixedValu");
            assert!(valid.iter().any(|t| t == "fixedValue"));
            assert!(valid.iter().any(|t| t == "groovyBC"));
        }
        other => panic!("unexpected error {other}"),
    }

    let err = temperature(
        line(2, time.clone()),
        json!({ "type": "zeroGradient" }),
        json!({ "type": "symmetryPlane" }),
    )
    .unwrap_err();
    assert!(matches!(err, FieldError::ConstraintMismatch { ref patch, .. } if patch == "right"));

    let err = GeometricField::<f64>::from_dict(
        "T",
        line(2, time.clone()),
        &dict(json!({
            "dimensions": [0, 0, 0, 1, 0, 0, 0],
            "internalField": [1.0, 2.0, 3.0],
            "boundaryField": {}
        })),
    )
    .unwrap_err();
    assert!(matches!(err, FieldError::SizeMismatch { expected: 2, actual: 3, .. }));

    let err = GeometricField::<f64>::from_dict(
        "T",
        line(2, time),
        &dict(json!({
            "dimensions": [0, 0, 0, 1, 0, 0, 0],
            "internalField": 1.0,
            "boundaryField": { "left": { "type": "zeroGradient" } }
        })),
    )
    .unwrap_err();
    assert!(matches!(err, FieldError::MissingPatchEntry { ref patch, .. } if patch == "right"));
}

#[test]
fn constraint_patches_pick_their_own_field_type() {
    let mesh = MeshBuilder::line(3, 1.0, PatchKind::Empty, PatchKind::SymmetryPlane)
        .build()
        .unwrap();

    let field = GeometricField::<Vector>::with_patch_types(
        "U",
        mesh.clone(),
        si::VELOCITY,
        vec![Vector::x(); 3],
        &["zeroGradient", "zeroGradient"],
    )
    .unwrap();
    assert_eq!(field.types(), vec!["empty", "symmetryPlane"]);
    assert!(field.boundary().patch(0).values().is_empty());

    // An empty patch may be left out of the dictionary.
    let field = GeometricField::<f64>::from_dict(
        "p",
        mesh,
        &dict(json!({
            "dimensions": [0, 2, -2, 0, 0, 0, 0],
            "internalField": 0.0,
            "boundaryField": { "right": { "type": "symmetryPlane" } }
        })),
    )
    .unwrap();
    assert_eq!(field.types(), vec!["empty", "symmetryPlane"]);
}

#[test]
fn written_field_reads_back_identically() {
    let time = Arc::new(Time::new(0.0, 0.5));
    let mesh = line(3, time);
    let mut field = GeometricField::<f64>::from_dict(
        "T",
        mesh.clone(),
        &dict(json!({
            "dimensions": [0, 0, 0, 1, 0, 0, 0],
            "internalField": [1.0, 2.0, 3.0],
            "boundaryField": {
                "left": {
                    "type": "groovyBC",
                    "valueExpression": "100 + time",
                    "gradientExpression": "0",
                    "fractionExpression": "1",
                    "variables": "a=2;",
                    "value": 1.0
                },
                "right": {
                    "type": "mixed",
                    "refValue": 4.0,
                    "refGradient": 0.0,
                    "valueFraction": 0.5,
                    "patchType": "wall"
                }
            }
        })),
    )
    .unwrap();
    field.correct_boundary_conditions().unwrap();

    let mut written = Dictionary::new("T");
    field.write(&mut written).unwrap();
    let right = written.sub_dict("boundaryField").unwrap().sub_dict("right").unwrap();
    assert_eq!(right.lookup::<String>("patchType").unwrap(), "wall");

    let reread = GeometricField::<f64>::from_dict("T", mesh, &written).unwrap();
    assert_eq!(reread.types(), field.types());
    assert_eq!(reread.internal(), field.internal());
    assert_eq!(reread.dimensions(), field.dimensions());
    assert_eq!(reread.boundary().values(), field.boundary().values());

    let mut rewritten = Dictionary::new("T");
    reread.write(&mut rewritten).unwrap();
    assert_eq!(rewritten.to_value(), written.to_value());
}

#[test]
fn reference_level_shifts_internal_and_boundary_values() {
    let field = GeometricField::<f64>::from_dict(
        "p",
        line(2, Arc::new(Time::default())),
        &dict(json!({
            "dimensions": [0, 2, -2, 0, 0, 0, 0],
            "internalField": [1.0, 2.0],
            "referenceLevel": 1e5,
            "boundaryField": {
                "left": { "type": "fixedValue", "value": 0.0 },
                "right": { "type": "zeroGradient" }
            }
        })),
    )
    .unwrap();
    assert_eq!(field.internal(), &[100001.0, 100002.0]);
    assert_eq!(field.boundary().patch(0).values(), &[1e5]);
}

#[test]
fn need_reference_depends_on_fixed_values() {
    let mesh = line(2, Arc::new(Time::default()));
    let floating = temperature(
        mesh.clone(),
        json!({ "type": "zeroGradient" }),
        json!({ "type": "fixedGradient", "gradient": 1.0 }),
    )
    .unwrap();
    assert!(floating.need_reference().unwrap());

    let pinned = temperature(
        mesh,
        json!({ "type": "fixedValue", "value": 1.0 }),
        json!({ "type": "zeroGradient" }),
    )
    .unwrap();
    assert!(!pinned.need_reference().unwrap());
}

#[test]
fn assignment_checks_mesh_and_dimensions() {
    let time = Arc::new(Time::default());
    let mesh = line(2, time.clone());
    let mut t = GeometricField::<f64>::new("T", mesh.clone(), si::TEMPERATURE).unwrap();
    let p = GeometricField::<f64>::new("p", mesh, si::PRESSURE).unwrap();
    let err = t.assign(&p).unwrap_err();
    assert!(matches!(err, FieldError::Dimension(DimensionError::Mismatch { .. })));

    let other = GeometricField::<f64>::new("T", line(2, time), si::TEMPERATURE).unwrap();
    assert!(matches!(t.assign(&other).unwrap_err(), FieldError::DifferentMesh { .. }));
}

#[test]
fn uniform_field_and_scaling_carry_dimensions() {
    let mesh = line(3, Arc::new(Time::default()));
    let value = Dimensioned::new("U", si::VELOCITY, Vector::new(1.0, 2.0, 0.0));
    let mut u = GeometricField::with_value(mesh, &value, "fixedValue").unwrap();
    assert_eq!(u.boundary().patch(1).values(), &[Vector::new(1.0, 2.0, 0.0)]);

    u.scale(&Dimensioned::new("dt", si::TIME, 2.0)).unwrap();
    assert_eq!(u.dimensions(), si::LENGTH);
    assert_eq!(u.internal()[0], Vector::new(2.0, 4.0, 0.0));
    assert_eq!(u.boundary().patch(0).values(), &[Vector::new(2.0, 4.0, 0.0)]);
}

#[test]
fn remapping_keeps_mapped_faces_and_extrapolates_the_rest() {
    let mesh = Mesh::builder(3)
        .patch(cfdbc::solver::FvPatch::new("wall", PatchKind::Wall, vec![0, 1, 2]))
        .build()
        .unwrap();
    let mut field = GeometricField::<f64>::from_dict(
        "T",
        mesh,
        &dict(json!({
            "dimensions": [0, 0, 0, 1, 0, 0, 0],
            "internalField": [1.0, 2.0, 3.0],
            "boundaryField": { "wall": { "type": "fixedValue", "value": [7.0, 8.0, 9.0] } }
        })),
    )
    .unwrap();
    field
        .auto_map(&[PatchFieldMapper::new(vec![Some(2), None, Some(0)])])
        .unwrap();
    assert_eq!(field.boundary().patch(0).values(), &[9.0, 2.0, 7.0]);
}

#[test]
fn remapping_needs_one_mapper_per_patch() {
    let time = Arc::new(Time::new(0.0, 1.0));
    let mut field = GeometricField::<f64>::new("T", line(2, time.clone()), si::TEMPERATURE).unwrap();
    field.old_time();
    time.increment();

    let err = field
        .auto_map(&[PatchFieldMapper::new(vec![None])])
        .unwrap_err();
    assert!(matches!(
        err,
        FieldError::PatchCountMismatch { ref field, given: 1, expected: 2 } if field == "T"
    ));
    // Rejected before any old-time bookkeeping.
    assert_eq!(field.time_index(), 0);
    assert_eq!(field.n_old_times(), 1);
    assert_eq!(field.boundary().patch(0).values().len(), 1);
    assert_eq!(field.boundary().patch(1).values().len(), 1);
}

#[test]
fn remapping_rejects_a_mapper_of_the_wrong_size() {
    let mesh = line(2, Arc::new(Time::default()));
    let mut field = GeometricField::<f64>::new("T", mesh, si::TEMPERATURE).unwrap();
    let err = field
        .auto_map(&[PatchFieldMapper::identity(1), PatchFieldMapper::identity(3)])
        .unwrap_err();
    assert!(matches!(
        err,
        FieldError::SizeMismatch { expected: 1, actual: 3, .. }
    ));
}
