use std::path::Path;
use std::sync::Arc;

use cfdbc::solver::dictionary::Dictionary;
use cfdbc::solver::error::FieldResult;
use cfdbc::solver::matrix::{FvMatrix, SolverControls};
use cfdbc::solver::{CommsType, FieldElement, GeometricField, Mesh, MeshBuilder, PatchKind, Pstream, Time, Vector};
use log::info;

fn usage() -> &'static str {
    "Usage:
  cfdbc_eval <case.json> [--steps N]

The case file holds:
  mesh                  {nCells, length, left, right} for a 1D line mesh; patch
                        kinds are patch, wall, empty or symmetryPlane
  time                  {startTime, deltaT}
  optimisationSwitches  {commsType: blocking | nonBlocking | scheduled}
  fields                {<name>: {class: scalar | vector, dimensions,
                         internalField, boundaryField, laplacian?}}
  solution              {solvers, relaxationFactors}

Each step advances the clock, solves every field that names a laplacian
diffusivity, corrects its boundary conditions and prints the field."
}

fn patch_kind(name: &str) -> Result<PatchKind, String> {
    match name {
        "patch" => Ok(PatchKind::Patch),
        "wall" => Ok(PatchKind::Wall),
        "empty" => Ok(PatchKind::Empty),
        "symmetryPlane" => Ok(PatchKind::SymmetryPlane),
        other => Err(format!(
            "unsupported patch kind '{other}' for a line mesh, expected patch, wall, empty or symmetryPlane"
        )),
    }
}

fn build_mesh(case: &Dictionary) -> Result<Arc<Mesh>, String> {
    let mesh = case.sub_dict("mesh").map_err(|e| e.to_string())?;
    let time = case.sub_dict_or_empty("time").map_err(|e| e.to_string())?;
    let switches = case
        .sub_dict_or_empty("optimisationSwitches")
        .map_err(|e| e.to_string())?;

    let n_cells: usize = mesh.lookup("nCells").map_err(|e| e.to_string())?;
    let length: f64 = mesh.lookup_or_default("length", 1.0).map_err(|e| e.to_string())?;
    let left: String = mesh
        .lookup_or_default("left", "patch".to_string())
        .map_err(|e| e.to_string())?;
    let right: String = mesh
        .lookup_or_default("right", "patch".to_string())
        .map_err(|e| e.to_string())?;

    let start: f64 = time.lookup_or_default("startTime", 0.0).map_err(|e| e.to_string())?;
    let delta_t: f64 = time.lookup_or_default("deltaT", 1.0).map_err(|e| e.to_string())?;

    let mut comms = Pstream::serial();
    if switches.found("commsType") {
        let name: String = switches.lookup("commsType").map_err(|e| e.to_string())?;
        let comms_type: CommsType = name.parse().map_err(|e: cfdbc::solver::comms::CommsError| e.to_string())?;
        comms = comms.with_comms_type(comms_type);
    }

    MeshBuilder::line(n_cells, length, patch_kind(&left)?, patch_kind(&right)?)
        .time(Arc::new(Time::new(start, delta_t)))
        .comms(comms)
        .build()
        .map_err(|e| e.to_string())
}

/// One field of the case together with its optional diffusivity.
struct CaseField<T: FieldElement> {
    field: GeometricField<T>,
    laplacian: Option<f64>,
}

impl<T: FieldElement> CaseField<T> {
    fn read(name: &str, mesh: &Arc<Mesh>, dict: &Dictionary) -> FieldResult<Self> {
        let laplacian = dict.lookup_or_default::<Option<f64>>("laplacian", None)?;
        let mut field = GeometricField::from_dict(name, mesh.clone(), dict)?;
        field.correct_boundary_conditions()?;
        Ok(Self { field, laplacian })
    }

    fn step(&mut self, solution: &Dictionary) -> FieldResult<()> {
        match self.laplacian {
            Some(gamma) => {
                let controls = SolverControls::from_dict(solution, self.field.name())?;
                self.field.store_prev_iter();
                let mut matrix = FvMatrix::laplacian(&mut self.field, gamma)?;
                let perf = matrix.solve(&mut self.field, &controls)?;
                if !perf.converged {
                    log::warn!("{} did not converge in {} iterations", self.field.name(), perf.iterations);
                }
                self.field.relax_from(solution, true)?;
            }
            None => self.field.correct_boundary_conditions()?,
        }
        Ok(())
    }

    fn print(&self) -> FieldResult<()> {
        let mut out = Dictionary::new(self.field.name());
        self.field.write(&mut out)?;
        println!("{}: {}", self.field.name(), out.to_value());
        Ok(())
    }
}

enum AnyField {
    Scalar(CaseField<f64>),
    Vector(CaseField<Vector>),
}

impl AnyField {
    fn step(&mut self, solution: &Dictionary) -> FieldResult<()> {
        match self {
            AnyField::Scalar(f) => f.step(solution),
            AnyField::Vector(f) => f.step(solution),
        }
    }

    fn print(&self) -> FieldResult<()> {
        match self {
            AnyField::Scalar(f) => f.print(),
            AnyField::Vector(f) => f.print(),
        }
    }
}

fn run(path: &str, steps: usize) -> Result<(), String> {
    let case = Dictionary::read(Path::new(path)).map_err(|e| e.to_string())?;
    let mesh = build_mesh(&case)?;
    info!(
        "case {path}: {} cells, {} patches, comms {}",
        mesh.n_cells(),
        mesh.boundary().len(),
        mesh.comms().default_comms_type()
    );

    let solution = case.sub_dict_or_empty("solution").map_err(|e| e.to_string())?;
    let fields_dict = case.sub_dict("fields").map_err(|e| e.to_string())?;
    let mut fields = Vec::new();
    for name in fields_dict.keys() {
        let dict = fields_dict.sub_dict(name).map_err(|e| e.to_string())?;
        let class: String = dict
            .lookup_or_default("class", "scalar".to_string())
            .map_err(|e| e.to_string())?;
        let field = match class.as_str() {
            "scalar" => AnyField::Scalar(CaseField::read(name, &mesh, &dict).map_err(|e| e.to_string())?),
            "vector" => AnyField::Vector(CaseField::read(name, &mesh, &dict).map_err(|e| e.to_string())?),
            other => return Err(format!("field {name}: unsupported class '{other}'")),
        };
        fields.push(field);
    }

    for _ in 0..steps {
        let state = mesh.time().increment();
        info!("Time = {}", state.value);
        for field in &mut fields {
            field.step(&solution).map_err(|e| e.to_string())?;
        }
    }
    for field in &fields {
        field.print().map_err(|e| e.to_string())?;
    }
    Ok(())
}

fn parse_args(args: &[String]) -> Result<(String, usize), String> {
    let mut path = None;
    let mut steps = 1;
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--steps" => {
                let value = iter.next().ok_or("--steps needs a value")?;
                steps = value
                    .parse()
                    .map_err(|err| format!("invalid --steps '{value}': {err}"))?;
            }
            other if path.is_none() => path = Some(other.to_string()),
            other => return Err(format!("unexpected argument '{other}'")),
        }
    }
    let path = path.ok_or_else(|| usage().to_string())?;
    Ok((path, steps))
}

fn main() {
    env_logger::init();
    let args: Vec<String> = std::env::args().skip(1).collect();
    let result = parse_args(&args).and_then(|(path, steps)| run(&path, steps));
    if let Err(err) = result {
        eprintln!("[cfdbc_eval] {err}");
        std::process::exit(1);
    }
}
