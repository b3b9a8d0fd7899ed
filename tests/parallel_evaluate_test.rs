// Boundary evaluation across two partitions joined by processor patches,
// one thread per partition.

use std::sync::Arc;
use std::thread;

use cfdbc::solver::comms::{CommsError, CommsType};
use cfdbc::solver::error::FieldError;
use cfdbc::solver::mesh::PatchScheduleEntry;
use cfdbc::solver::{Dictionary, FvPatch, GeometricField, Mesh, PatchKind, Pstream};
use serde_json::json;

/// Two cells per rank; rank 0 owns cells 0-1 and rank 1 cells 2-3 of a
/// four-cell line. The processor patch comes first, the outer wall second.
fn partition(comms: Pstream, schedule: Option<Vec<PatchScheduleEntry>>) -> Result<Arc<Mesh>, FieldError> {
    let rank = comms.rank();
    let neighbour = 1 - rank;
    let (proc_cell, wall_cell) = if rank == 0 { (1, 0) } else { (0, 1) };
    let mut builder = Mesh::builder(2)
        .patch(FvPatch::new(
            format!("procBoundary{rank}to{neighbour}"),
            PatchKind::Processor {
                my_proc: rank,
                neighb_proc: neighbour,
                tag: 0,
            },
            vec![proc_cell],
        ))
        .patch(FvPatch::new("wall", PatchKind::Wall, vec![wall_cell]))
        .comms(comms);
    if let Some(schedule) = schedule {
        builder = builder.patch_schedule(schedule);
    }
    builder.build()
}

fn field(mesh: Arc<Mesh>, wall: serde_json::Value) -> GeometricField<f64> {
    let rank = mesh.comms().rank();
    let internal = if rank == 0 { [1.0, 2.0] } else { [3.0, 4.0] };
    let proc_name = format!("procBoundary{rank}to{}", 1 - rank);
    let mut boundary = serde_json::Map::new();
    boundary.insert(proc_name, json!({ "type": "processor" }));
    boundary.insert("wall".to_string(), wall);
    GeometricField::from_dict(
        "T",
        mesh,
        &Dictionary::from_value(
            "T",
            json!({
                "dimensions": [0, 0, 0, 1, 0, 0, 0],
                "internalField": internal,
                "boundaryField": boundary
            }),
        )
        .unwrap(),
    )
    .unwrap()
}

/// Runs `body` on both ranks and returns their results in rank order.
fn on_two_ranks<R: Send>(body: impl Fn(Pstream) -> R + Sync) -> Vec<R> {
    let body = &body;
    thread::scope(|scope| {
        let handles: Vec<_> = Pstream::connected(2)
            .into_iter()
            .map(|comms| scope.spawn(move || body(comms)))
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .collect()
    })
}

#[test]
fn all_disciplines_exchange_the_same_neighbour_values() {
    let results = on_two_ranks(|comms| {
        let mesh = partition(comms, None).unwrap();
        let mut t = field(mesh.clone(), json!({ "type": "zeroGradient" }));
        CommsType::NAMES
            .iter()
            .map(|name| {
                mesh.comms().set_default_comms_type(name.parse().unwrap());
                t.correct_boundary_conditions().unwrap();
                t.boundary().values()
            })
            .collect::<Vec<_>>()
    });

    for per_discipline in &results[0] {
        assert_eq!(per_discipline, &vec![vec![3.0], vec![1.0]]);
    }
    for per_discipline in &results[1] {
        assert_eq!(per_discipline, &vec![vec![2.0], vec![4.0]]);
    }
}

#[test]
fn explicit_schedule_orders_sends_before_receives() {
    let schedule = vec![
        PatchScheduleEntry { patch: 1, init: true },
        PatchScheduleEntry { patch: 0, init: true },
        PatchScheduleEntry { patch: 1, init: false },
        PatchScheduleEntry { patch: 0, init: false },
    ];
    let results = on_two_ranks(|comms| {
        let mesh = partition(comms.with_comms_type(CommsType::Scheduled), Some(schedule.clone())).unwrap();
        let mut t = field(mesh, json!({ "type": "fixedValue", "value": 9.0 }));
        t.correct_boundary_conditions().unwrap();
        (t.boundary().values(), t.sn_grad(0).unwrap())
    });
    assert_eq!(results[0].0, vec![vec![3.0], vec![9.0]]);
    assert_eq!(results[1].0, vec![vec![2.0], vec![9.0]]);
    assert_eq!(results[0].1, vec![1.0]);
    assert_eq!(results[1].1, vec![-1.0]);
}

#[test]
fn need_reference_is_reduced_over_partitions() {
    let results = on_two_ranks(|comms| {
        let rank = comms.rank();
        let mesh = partition(comms, None).unwrap();
        let wall = if rank == 0 {
            json!({ "type": "fixedValue", "value": 0.0 })
        } else {
            json!({ "type": "zeroGradient" })
        };
        field(mesh, wall).need_reference().unwrap()
    });
    assert_eq!(results, vec![false, false]);
}

#[test]
fn unknown_discipline_names_are_rejected() {
    let err = "fullyBlocking".parse::<CommsType>().unwrap_err();
    assert_eq!(
        err,
        CommsError::UnsupportedCommsType {
            name: "fullyBlocking".to_string()
        }
    );
    for name in CommsType::NAMES {
        assert_eq!(name.parse::<CommsType>().unwrap().name(), name);
    }
}

#[test]
fn schedule_must_address_existing_patches() {
    let schedule = vec![PatchScheduleEntry { patch: 2, init: true }];
    let err = partition(Pstream::serial(), Some(schedule)).unwrap_err();
    assert!(matches!(err, FieldError::InvalidSchedule { .. }));
}
