// Coefficient consistency of the built-in patch fields: after evaluate, the
// value and gradient coefficients must reproduce the face values and the
// normal gradient from the adjacent cell values.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use approx::assert_relative_eq;
use cfdbc::solver::comms::CommsType;
use cfdbc::solver::error::{FieldError, FieldResult};
use cfdbc::solver::fields::{
    CyclicPatchField, DirectionMixedPatchField, FixedGradientPatchField, FixedNormalSlipPatchField,
    FixedValuePatchField, MixedFixedValueSlipPatchField, MixedPatchField, PatchContext, PatchField,
    PatchFieldCore, PatchFieldMapper, SymmetryPlanePatchField, ZeroGradientPatchField,
};
use cfdbc::solver::mesh::{FvPatch, Mesh, PatchKind};
use cfdbc::solver::primitives::{FieldElement, SymmTensor, Vector};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const N_FACES: usize = 6;

fn random_element<T: FieldElement>(rng: &mut StdRng) -> T {
    let c: Vec<f64> = (0..T::N_COMPONENTS)
        .map(|_| rng.gen_range(-2.0..2.0))
        .collect();
    T::from_components(&c)
}

fn random_field<T: FieldElement>(rng: &mut StdRng, n: usize) -> Vec<T> {
    (0..n).map(|_| random_element(rng)).collect()
}

fn random_unit(rng: &mut StdRng) -> Vector {
    loop {
        let v = Vector::new(
            rng.gen_range(-1.0..1.0),
            rng.gen_range(-1.0..1.0),
            rng.gen_range(-1.0..1.0),
        );
        if v.norm() > 0.1 {
            return v.normalize();
        }
    }
}

/// One patch of `N_FACES` faces over `N_FACES` cells with random geometry.
fn random_mesh(rng: &mut StdRng, kind: PatchKind) -> Arc<Mesh> {
    let normals = (0..N_FACES).map(|_| random_unit(rng)).collect();
    let delta = (0..N_FACES).map(|_| rng.gen_range(0.5..4.0)).collect();
    Mesh::builder(N_FACES)
        .patch(
            FvPatch::new("wall", kind, (0..N_FACES).collect())
                .with_normals(normals)
                .with_delta_coeffs(delta),
        )
        .build()
        .unwrap()
}

fn assert_close<T: FieldElement>(actual: &[T], expected: &[T]) {
    assert_eq!(actual.len(), expected.len());
    for (a, e) in actual.iter().zip(expected) {
        for d in 0..T::N_COMPONENTS {
            assert_relative_eq!(a.component(d), e.component(d), epsilon = 1e-10, max_relative = 1e-10);
        }
    }
}

/// Evaluates `pf`, then checks `value = vic * pif + vbc` and
/// `snGrad = gic * pif + gbc` face by face.
fn check_consistency<T: FieldElement>(pf: &mut dyn PatchField<T>, ctx: &PatchContext<'_, T>) {
    pf.evaluate(ctx, CommsType::Blocking).unwrap();
    let pif = ctx.patch_internal_field();
    let weights = ctx.patch().weights();

    let vic = pf.value_internal_coeffs(ctx, weights).unwrap();
    let vbc = pf.value_boundary_coeffs(ctx, weights).unwrap();
    let from_value_coeffs: Vec<T> = vic
        .iter()
        .zip(&vbc)
        .zip(&pif)
        .map(|((&a, &b), &i)| a.cmpt_multiply(i) + b)
        .collect();
    assert_close(pf.values(), &from_value_coeffs);

    let gic = pf.gradient_internal_coeffs(ctx).unwrap();
    let gbc = pf.gradient_boundary_coeffs(ctx).unwrap();
    let from_gradient_coeffs: Vec<T> = gic
        .iter()
        .zip(&gbc)
        .zip(&pif)
        .map(|((&a, &b), &i)| a.cmpt_multiply(i) + b)
        .collect();
    assert_close(&pf.sn_grad(ctx).unwrap(), &from_gradient_coeffs);
}

fn check_basic_family<T: FieldElement>(seed: u64) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mesh = random_mesh(&mut rng, PatchKind::Wall);
    let internal: Vec<T> = random_field(&mut rng, N_FACES);
    let ctx = PatchContext::new(&mesh, 0, &internal, "psi");

    let mut fixed = FixedValuePatchField::new(&ctx);
    fixed.force_assign(&random_field::<T>(&mut rng, N_FACES)).unwrap();
    check_consistency(&mut fixed, &ctx);

    let mut zero_gradient = ZeroGradientPatchField::new(&ctx);
    check_consistency(&mut zero_gradient, &ctx);
    assert_close(zero_gradient.values(), &ctx.patch_internal_field());

    let mut fixed_gradient = FixedGradientPatchField::new(&ctx);
    fixed_gradient
        .set_gradient(random_field(&mut rng, N_FACES))
        .unwrap();
    check_consistency(&mut fixed_gradient, &ctx);
    assert_close(&fixed_gradient.sn_grad(&ctx).unwrap(), &fixed_gradient.gradient().to_vec());

    let mut mixed = MixedPatchField::new(&ctx);
    mixed.set_ref_value(random_field(&mut rng, N_FACES)).unwrap();
    mixed.set_ref_grad(random_field(&mut rng, N_FACES)).unwrap();
    mixed
        .set_value_fraction((0..N_FACES).map(|_| rng.gen_range(0.0..=1.0)).collect())
        .unwrap();
    check_consistency(&mut mixed, &ctx);

    let mut direction = DirectionMixedPatchField::new(&ctx);
    direction.set_ref_value(random_field(&mut rng, N_FACES)).unwrap();
    direction.set_ref_grad(random_field(&mut rng, N_FACES)).unwrap();
    direction
        .set_value_fraction(random_field::<SymmTensor>(&mut rng, N_FACES))
        .unwrap();
    check_consistency(&mut direction, &ctx);
}

#[test]
fn basic_and_direction_mixed_scalar_coefficients_are_consistent() {
    for seed in 0..8 {
        check_basic_family::<f64>(seed);
    }
}

#[test]
fn basic_and_direction_mixed_vector_coefficients_are_consistent() {
    for seed in 0..8 {
        check_basic_family::<Vector>(seed);
    }
}

#[test]
fn tensor_fields_keep_consistent_coefficients() {
    check_basic_family::<SymmTensor>(11);
    check_basic_family::<cfdbc::solver::primitives::Tensor>(12);
}

#[test]
fn slip_and_symmetry_coefficients_are_consistent() {
    for seed in 0..8 {
        let mut rng = StdRng::seed_from_u64(100 + seed);
        let mesh = random_mesh(&mut rng, PatchKind::Wall);
        let internal: Vec<Vector> = random_field(&mut rng, N_FACES);
        let ctx = PatchContext::new(&mesh, 0, &internal, "U");

        let mut slip = FixedNormalSlipPatchField::new(&ctx).unwrap();
        slip.set_fixed_value(random_field(&mut rng, N_FACES)).unwrap();
        check_consistency(&mut slip, &ctx);

        let mut mixed_slip = MixedFixedValueSlipPatchField::new(&ctx).unwrap();
        mixed_slip.set_ref_value(random_field(&mut rng, N_FACES)).unwrap();
        mixed_slip
            .set_value_fraction((0..N_FACES).map(|_| rng.gen_range(0.0..=1.0)).collect())
            .unwrap();
        check_consistency(&mut mixed_slip, &ctx);

        let mut symmetry = SymmetryPlanePatchField::new(&ctx);
        check_consistency(&mut symmetry, &ctx);

        let scalar_internal: Vec<f64> = random_field(&mut rng, N_FACES);
        let scalar_ctx = PatchContext::new(&mesh, 0, &scalar_internal, "p");
        let mut scalar_symmetry = SymmetryPlanePatchField::new(&scalar_ctx);
        check_consistency(&mut scalar_symmetry, &scalar_ctx);
        assert_close(scalar_symmetry.values(), &scalar_internal);
    }
}

#[test]
fn slip_conditions_reject_scalar_fields() {
    let mut rng = StdRng::seed_from_u64(7);
    let mesh = random_mesh(&mut rng, PatchKind::Wall);
    let internal = vec![0.0; N_FACES];
    let ctx = PatchContext::new(&mesh, 0, &internal, "p");
    assert!(FixedNormalSlipPatchField::<f64>::new(&ctx).is_err());
    assert!(MixedFixedValueSlipPatchField::<f64>::new(&ctx).is_err());
}

#[test]
fn cyclic_coefficients_combine_owner_and_neighbour_cells() {
    let mut rng = StdRng::seed_from_u64(21);
    let weights: Vec<f64> = (0..3).map(|_| rng.gen_range(0.2..0.8)).collect();
    let mesh = Mesh::builder(6)
        .patch(
            FvPatch::new("front", PatchKind::Cyclic { neighbour_patch: 1 }, vec![0, 1, 2])
                .with_weights(weights.clone())
                .with_uniform_delta_coeffs(3.0),
        )
        .patch(
            FvPatch::new("back", PatchKind::Cyclic { neighbour_patch: 0 }, vec![3, 4, 5])
                .with_weights(weights.iter().map(|w| 1.0 - w).collect())
                .with_uniform_delta_coeffs(3.0),
        )
        .build()
        .unwrap();
    let internal: Vec<Vector> = random_field(&mut rng, 6);
    let ctx = PatchContext::new(&mesh, 0, &internal, "U");

    let mut cyclic = CyclicPatchField::new(&ctx);
    cyclic.evaluate(&ctx, CommsType::Blocking).unwrap();
    let pif = ctx.patch_internal_field();
    let pnf = cyclic.patch_neighbour_field(&ctx).unwrap();

    let vic = cyclic.value_internal_coeffs(&ctx, &weights).unwrap();
    let vbc = cyclic.value_boundary_coeffs(&ctx, &weights).unwrap();
    let expected: Vec<Vector> = (0..3)
        .map(|f| vic[f].cmpt_multiply(pif[f]) + vbc[f].cmpt_multiply(pnf[f]))
        .collect();
    assert_close(cyclic.values(), &expected);

    let gic = cyclic.gradient_internal_coeffs(&ctx).unwrap();
    let gbc = cyclic.gradient_boundary_coeffs(&ctx).unwrap();
    let expected: Vec<Vector> = (0..3)
        .map(|f| gic[f].cmpt_multiply(pif[f]) + gbc[f].cmpt_multiply(pnf[f]))
        .collect();
    assert_close(&cyclic.sn_grad(&ctx).unwrap(), &expected);
}

#[test]
fn direction_mixed_full_blend_on_four_faces() {
    let mesh = Mesh::builder(4)
        .patch(FvPatch::new("inlet", PatchKind::Patch, vec![0, 1, 2, 3]).with_uniform_delta_coeffs(2.0))
        .build()
        .unwrap();
    let internal = vec![0.0; 4];
    let ctx = PatchContext::new(&mesh, 0, &internal, "T");

    let mut pf = DirectionMixedPatchField::new(&ctx);
    pf.set_ref_value(vec![1.0; 4]).unwrap();
    pf.set_ref_grad(vec![0.0; 4]).unwrap();
    pf.set_value_fraction(vec![SymmTensor::identity(); 4]).unwrap();
    pf.evaluate(&ctx, CommsType::Blocking).unwrap();

    assert_eq!(pf.values(), &[1.0, 1.0, 1.0, 1.0]);
    assert_eq!(pf.sn_grad(&ctx).unwrap(), vec![2.0, 2.0, 2.0, 2.0]);
}

#[test]
fn direction_mixed_without_fraction_extrapolates_the_gradient() {
    let mut rng = StdRng::seed_from_u64(3);
    let mesh = random_mesh(&mut rng, PatchKind::Patch);
    let internal: Vec<Vector> = random_field(&mut rng, N_FACES);
    let ctx = PatchContext::new(&mesh, 0, &internal, "U");

    let ref_grad: Vec<Vector> = random_field(&mut rng, N_FACES);
    let mut pf = DirectionMixedPatchField::new(&ctx);
    pf.set_ref_value(random_field(&mut rng, N_FACES)).unwrap();
    pf.set_ref_grad(ref_grad.clone()).unwrap();
    pf.set_value_fraction(vec![SymmTensor::zero(); N_FACES]).unwrap();
    pf.evaluate(&ctx, CommsType::Blocking).unwrap();

    let expected: Vec<Vector> = internal
        .iter()
        .zip(&ref_grad)
        .zip(ctx.patch().delta_coeffs())
        .map(|((&i, &g), &dc)| i + g / dc)
        .collect();
    assert_close(pf.values(), &expected);
}

#[test]
fn fixed_normal_slip_keeps_tangential_part_of_the_cell_value() {
    let mut rng = StdRng::seed_from_u64(42);
    let mesh = random_mesh(&mut rng, PatchKind::Wall);
    let internal: Vec<Vector> = random_field(&mut rng, N_FACES);
    let ctx = PatchContext::new(&mesh, 0, &internal, "U");

    let fixed: Vec<Vector> = random_field(&mut rng, N_FACES);
    let mut pf = FixedNormalSlipPatchField::new(&ctx).unwrap();
    pf.set_fixed_value(fixed.clone()).unwrap();
    pf.evaluate(&ctx, CommsType::Blocking).unwrap();

    for (f, n) in ctx.patch().nf().iter().enumerate() {
        let value = pf.values()[f];
        assert_relative_eq!(value.dot(n), fixed[f].dot(n), epsilon = 1e-12);
        let tangential = value - n * value.dot(n);
        let expected = internal[f] - n * internal[f].dot(n);
        assert_relative_eq!(tangential, expected, epsilon = 1e-12);
    }
}

#[test]
fn remapping_fills_unmapped_faces_from_the_cells() {
    let mesh = Mesh::builder(3)
        .patch(FvPatch::new("outlet", PatchKind::Patch, vec![0, 1, 2]))
        .build()
        .unwrap();
    let internal = vec![10.0, 20.0, 30.0];
    let ctx = PatchContext::new(&mesh, 0, &internal, "T");

    let mut pf = MixedPatchField::new(&ctx);
    pf.set_ref_value(vec![1.0, 2.0, 3.0]).unwrap();
    pf.set_value_fraction(vec![1.0; 3]).unwrap();
    pf.evaluate(&ctx, CommsType::Blocking).unwrap();

    let mapper = PatchFieldMapper::new(vec![Some(2), None, Some(0)]);
    pf.auto_map(&mapper, &ctx).unwrap();
    assert_eq!(pf.values(), &[3.0, 20.0, 1.0]);
    assert_eq!(pf.ref_value(), &[3.0, 20.0, 1.0]);
    assert_eq!(pf.value_fraction(), &[1.0, 0.0, 1.0]);

    // The unmapped face now behaves as zero gradient.
    pf.evaluate(&ctx, CommsType::Blocking).unwrap();
    assert_eq!(pf.values()[1], 20.0);
}

#[test]
fn remapping_rejects_a_mapper_of_the_wrong_size() {
    let mesh = Mesh::builder(3)
        .patch(FvPatch::new("outlet", PatchKind::Patch, vec![0, 1, 2]))
        .build()
        .unwrap();
    let internal = vec![10.0, 20.0, 30.0];
    let ctx = PatchContext::new(&mesh, 0, &internal, "T");

    let mut pf = MixedPatchField::new(&ctx);
    pf.set_ref_value(vec![1.0, 2.0, 3.0]).unwrap();
    pf.set_value_fraction(vec![0.5; 3]).unwrap();

    for size in [2, 5] {
        let err = pf
            .auto_map(&PatchFieldMapper::new(vec![Some(0); size]), &ctx)
            .unwrap_err();
        assert!(matches!(
            err,
            FieldError::SizeMismatch { expected: 3, actual, .. } if actual == size
        ));
    }
    // Every per-face slot keeps the patch size.
    assert_eq!(pf.values().len(), 3);
    assert_eq!(pf.ref_value(), &[1.0, 2.0, 3.0]);
    assert_eq!(pf.value_fraction(), &[0.5; 3]);
}

/// Zero-gradient field that counts how often its coefficients are computed.
#[derive(Debug, Clone)]
struct CountingPatchField {
    core: PatchFieldCore<f64>,
    computations: Arc<AtomicUsize>,
}

impl PatchField<f64> for CountingPatchField {
    fn core(&self) -> &PatchFieldCore<f64> {
        &self.core
    }

    fn core_mut(&mut self) -> &mut PatchFieldCore<f64> {
        &mut self.core
    }

    fn type_name(&self) -> &'static str {
        "counting"
    }

    fn clone_box(&self) -> Box<dyn PatchField<f64>> {
        Box::new(self.clone())
    }

    fn compute_coeffs(&mut self, ctx: &PatchContext<'_, f64>) -> FieldResult<()> {
        self.computations.fetch_add(1, Ordering::SeqCst);
        self.core.values = ctx.patch_internal_field();
        Ok(())
    }

    fn value_internal_coeffs(&self, _ctx: &PatchContext<'_, f64>, w: &[f64]) -> FieldResult<Vec<f64>> {
        Ok(vec![1.0; w.len()])
    }

    fn value_boundary_coeffs(&self, _ctx: &PatchContext<'_, f64>, w: &[f64]) -> FieldResult<Vec<f64>> {
        Ok(vec![0.0; w.len()])
    }

    fn gradient_internal_coeffs(&self, _ctx: &PatchContext<'_, f64>) -> FieldResult<Vec<f64>> {
        Ok(vec![0.0; self.size()])
    }

    fn gradient_boundary_coeffs(&self, _ctx: &PatchContext<'_, f64>) -> FieldResult<Vec<f64>> {
        Ok(vec![0.0; self.size()])
    }
}

#[test]
fn update_coeffs_runs_once_per_evaluation_cycle() {
    let mesh = Mesh::builder(2)
        .patch(FvPatch::new("wall", PatchKind::Wall, vec![0, 1]))
        .build()
        .unwrap();
    let internal = vec![4.0, 5.0];
    let ctx = PatchContext::new(&mesh, 0, &internal, "T");
    let computations = Arc::new(AtomicUsize::new(0));
    let mut pf = CountingPatchField {
        core: PatchFieldCore::zeroed(&ctx),
        computations: computations.clone(),
    };

    pf.update_coeffs(&ctx).unwrap();
    pf.update_coeffs(&ctx).unwrap();
    assert!(pf.updated());
    assert_eq!(computations.load(Ordering::SeqCst), 1);

    pf.evaluate(&ctx, CommsType::Blocking).unwrap();
    assert!(!pf.updated());
    assert!(!pf.manipulated_matrix());
    assert_eq!(computations.load(Ordering::SeqCst), 1);
    assert_eq!(pf.values(), &[4.0, 5.0]);

    pf.evaluate(&ctx, CommsType::Blocking).unwrap();
    assert_eq!(computations.load(Ordering::SeqCst), 2);
}
