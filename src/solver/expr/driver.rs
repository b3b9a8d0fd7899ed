use std::collections::{BTreeMap, HashMap};
use std::f64::consts::PI;

use serde_json::{json, Value};

use super::parser::{BinaryOp, Expr, UnaryOp};
use super::value::{ExprKind, ExprValue};
use super::ExprError;
use crate::solver::dictionary::Dictionary;
use crate::solver::primitives::{FieldElement, SymmTensor, Tensor, Vector};

/// Piecewise-linear function of time, clamped outside its range.
#[derive(Debug, Clone, PartialEq)]
pub struct Timeline {
    name: String,
    points: Vec<(f64, f64)>,
}

impl Timeline {
    pub fn new(name: impl Into<String>, mut points: Vec<(f64, f64)>) -> Result<Self, ExprError> {
        let name = name.into();
        if points.is_empty() {
            return Err(ExprError::BadTimeline {
                name,
                reason: "no data points".to_string(),
            });
        }
        points.sort_by(|a, b| a.0.total_cmp(&b.0));
        Ok(Self { name, points })
    }

    fn from_value(value: &Value) -> Result<Self, ExprError> {
        let bad = |name: &str, reason: &str| ExprError::BadTimeline {
            name: name.to_string(),
            reason: reason.to_string(),
        };
        let name = value
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| bad("?", "missing 'name'"))?;
        let data = value
            .get("data")
            .and_then(Value::as_array)
            .ok_or_else(|| bad(name, "missing 'data' list"))?;
        let points = data
            .iter()
            .map(|pair| match pair.as_array().map(Vec::as_slice) {
                Some([t, v]) => t
                    .as_f64()
                    .zip(v.as_f64())
                    .ok_or_else(|| bad(name, "data entries must be numbers")),
                _ => Err(bad(name, "data entries must be [time, value] pairs")),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(name, points)
    }

    fn to_value(&self) -> Value {
        let data: Vec<Value> = self.points.iter().map(|(t, v)| json!([t, v])).collect();
        json!({ "name": self.name, "data": data })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value_at(&self, t: f64) -> f64 {
        let (first, last) = (self.points[0], self.points[self.points.len() - 1]);
        if t <= first.0 {
            return first.1;
        }
        if t >= last.0 {
            return last.1;
        }
        let upper = self.points.partition_point(|p| p.0 <= t);
        let (t0, v0) = self.points[upper - 1];
        let (t1, v1) = self.points[upper];
        if t1 == t0 {
            return v1;
        }
        v0 + (v1 - v0) * (t - t0) / (t1 - t0)
    }
}

/// Patch geometry and field data visible to an expression.
#[derive(Debug, Clone)]
pub struct PatchEnvironment<'a> {
    pub n_faces: usize,
    pub time: f64,
    pub delta_t: f64,
    pub face_centres: &'a [Vector],
    pub normals: &'a [Vector],
    pub mag_sf: &'a [f64],
    pub delta_coeffs: &'a [f64],
    pub field_name: &'a str,
    /// Current patch values of the field being evaluated.
    pub patch_values: ExprValue,
    /// Internal-cell values adjacent to the patch faces.
    pub internal_values: ExprValue,
}

/// Holds the variable definitions and timelines of one expression-driven
/// patch and evaluates expressions against a [`PatchEnvironment`].
///
/// Variables are re-parsed and evaluated lazily in definition order, and
/// their values are cached until [`clear_variables`](Self::clear_variables)
/// is called. No parsed expression outlives one evaluation.
#[derive(Debug, Clone, Default)]
pub struct PatchExpressionDriver {
    variables: Vec<(String, String)>,
    timelines: BTreeMap<String, Timeline>,
    cache: HashMap<String, ExprValue>,
    evaluated: bool,
}

impl PatchExpressionDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads `variables` (a `;`-separated string or a list of strings) and
    /// `timelines` (a list of `{name, data}` entries).
    pub fn read_variables_and_tables(dict: &Dictionary) -> Result<Self, ExprError> {
        let mut driver = Self::new();
        match dict.entry("variables") {
            None => {}
            Some(Value::String(text)) => driver.add_definitions(text)?,
            Some(Value::Array(items)) => {
                for item in items {
                    let text = item
                        .as_str()
                        .ok_or_else(|| ExprError::BadDefinition(item.to_string()))?;
                    driver.add_definitions(text)?;
                }
            }
            Some(other) => return Err(ExprError::BadDefinition(other.to_string())),
        }
        if let Some(entry) = dict.entry("timelines") {
            let items = entry.as_array().ok_or_else(|| ExprError::BadTimeline {
                name: "timelines".to_string(),
                reason: "expected a list".to_string(),
            })?;
            for item in items {
                driver.add_timeline(Timeline::from_value(item)?);
            }
        }
        Ok(driver)
    }

    fn add_definitions(&mut self, text: &str) -> Result<(), ExprError> {
        for definition in text.split(';').map(str::trim).filter(|d| !d.is_empty()) {
            let (name, body) = definition
                .split_once('=')
                .ok_or_else(|| ExprError::BadDefinition(definition.to_string()))?;
            let name = name.trim();
            let valid_name = name
                .chars()
                .next()
                .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
                && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
            if !valid_name {
                return Err(ExprError::BadDefinition(definition.to_string()));
            }
            // Syntax errors surface at read time; the tree is rebuilt per update.
            Expr::parse(body)?;
            self.variables.push((name.to_string(), body.trim().to_string()));
        }
        self.evaluated = false;
        Ok(())
    }

    pub fn add_timeline(&mut self, timeline: Timeline) {
        self.timelines.insert(timeline.name.clone(), timeline);
    }

    pub fn timeline(&self, name: &str) -> Option<&Timeline> {
        self.timelines.get(name)
    }

    pub fn has_variables(&self) -> bool {
        !self.variables.is_empty()
    }

    /// Drops cached variable values so the next evaluation recomputes them.
    pub fn clear_variables(&mut self) {
        self.cache.clear();
        self.evaluated = false;
    }

    pub fn evaluate<T: FieldElement>(
        &mut self,
        expression: &str,
        env: &PatchEnvironment<'_>,
    ) -> Result<Vec<T>, ExprError> {
        let expr = Expr::parse(expression)?;
        self.evaluate_variables(env)?;
        let value = Evaluator {
            env,
            variables: &self.cache,
            timelines: &self.timelines,
        }
        .eval(&expr)?;
        value.into_field()
    }

    /// Evaluates an expression that must yield a logical or scalar field.
    pub fn evaluate_logical(
        &mut self,
        expression: &str,
        env: &PatchEnvironment<'_>,
    ) -> Result<Vec<bool>, ExprError> {
        let expr = Expr::parse(expression)?;
        self.evaluate_variables(env)?;
        let value = Evaluator {
            env,
            variables: &self.cache,
            timelines: &self.timelines,
        }
        .eval(&expr)?;
        match value {
            ExprValue::Logical(v) => Ok(v),
            ExprValue::Scalar(v) => Ok(v.into_iter().map(|x| x != 0.0).collect()),
            other => Err(ExprError::RankMismatch {
                expected: "logical",
                actual: other.kind(),
            }),
        }
    }

    fn evaluate_variables(&mut self, env: &PatchEnvironment<'_>) -> Result<(), ExprError> {
        if self.evaluated {
            return Ok(());
        }
        self.cache.clear();
        for (name, body) in &self.variables {
            let expr = Expr::parse(body)?;
            let value = Evaluator {
                env,
                variables: &self.cache,
                timelines: &self.timelines,
            }
            .eval(&expr)?;
            self.cache.insert(name.clone(), value);
        }
        self.evaluated = true;
        Ok(())
    }

    pub fn write(&self, dict: &mut Dictionary) {
        if !self.variables.is_empty() {
            let definitions: Vec<String> = self
                .variables
                .iter()
                .map(|(name, body)| format!("{name}={body};"))
                .collect();
            dict.set_value("variables", json!(definitions));
        }
        if !self.timelines.is_empty() {
            let timelines: Vec<Value> = self.timelines.values().map(Timeline::to_value).collect();
            dict.set_value("timelines", Value::Array(timelines));
        }
    }
}

struct Evaluator<'d, 'e> {
    env: &'d PatchEnvironment<'e>,
    variables: &'d HashMap<String, ExprValue>,
    timelines: &'d BTreeMap<String, Timeline>,
}

impl Evaluator<'_, '_> {
    fn uniform(&self, value: f64) -> ExprValue {
        ExprValue::uniform_scalar(value, self.env.n_faces)
    }

    fn eval(&self, expr: &Expr) -> Result<ExprValue, ExprError> {
        match expr {
            Expr::Number(value) => Ok(self.uniform(*value)),
            Expr::Bool(value) => Ok(ExprValue::Logical(vec![*value; self.env.n_faces])),
            Expr::Ident(name) => self.identifier(name),
            Expr::Component(inner, component) => self.eval(inner)?.component(component),
            Expr::Call { name, args } => self.call(name, args),
            Expr::Unary { op, expr } => {
                let value = self.eval(expr)?;
                match op {
                    UnaryOp::Negate => value.negate(),
                    UnaryOp::Not => Ok(ExprValue::Logical(
                        value.as_logical("!")?.iter().map(|b| !b).collect(),
                    )),
                }
            }
            Expr::Binary { left, op, right } => {
                let lhs = self.eval(left)?;
                let rhs = self.eval(right)?;
                binary(&lhs, *op, &rhs)
            }
            Expr::Conditional {
                cond,
                then,
                otherwise,
            } => {
                let cond = self.eval(cond)?;
                let cond = cond.as_logical("?:")?;
                ExprValue::select(cond, &self.eval(then)?, &self.eval(otherwise)?)
            }
        }
    }

    fn identifier(&self, name: &str) -> Result<ExprValue, ExprError> {
        if let Some(value) = self.variables.get(name) {
            return Ok(value.clone());
        }
        if name == self.env.field_name {
            return Ok(self.env.patch_values.clone());
        }
        if let Some(timeline) = self.timelines.get(name) {
            return Ok(self.uniform(timeline.value_at(self.env.time)));
        }
        match name {
            "time" => Ok(self.uniform(self.env.time)),
            "deltaT" => Ok(self.uniform(self.env.delta_t)),
            "pi" => Ok(self.uniform(PI)),
            _ => Err(ExprError::UnknownVariable(name.to_string())),
        }
    }

    fn args(&self, name: &str, args: &[Expr], expected: usize) -> Result<Vec<ExprValue>, ExprError> {
        if args.len() != expected {
            return Err(ExprError::Arity {
                name: name.to_string(),
                expected,
                got: args.len(),
            });
        }
        args.iter().map(|a| self.eval(a)).collect()
    }

    fn scalar_fn(&self, name: &str, args: &[Expr], f: fn(f64) -> f64) -> Result<ExprValue, ExprError> {
        let arg = self.args(name, args, 1)?;
        Ok(ExprValue::Scalar(arg[0].as_scalar(name)?.iter().map(|&x| f(x)).collect()))
    }

    fn call(&self, name: &str, args: &[Expr]) -> Result<ExprValue, ExprError> {
        let env = self.env;
        match name {
            "pos" => self.args(name, args, 0).map(|_| ExprValue::Vector(env.face_centres.to_vec())),
            "normal" => self.args(name, args, 0).map(|_| ExprValue::Vector(env.normals.to_vec())),
            "area" => self.args(name, args, 0).map(|_| ExprValue::Scalar(env.mag_sf.to_vec())),
            "deltaCoeffs" => self
                .args(name, args, 0)
                .map(|_| ExprValue::Scalar(env.delta_coeffs.to_vec())),
            "time" => self.args(name, args, 0).map(|_| self.uniform(env.time)),
            "deltaT" => self.args(name, args, 0).map(|_| self.uniform(env.delta_t)),
            "internalField" => match args {
                [Expr::Ident(field)] if field == env.field_name => Ok(env.internal_values.clone()),
                [Expr::Ident(field)] => Err(ExprError::UnknownVariable(field.clone())),
                _ => Err(ExprError::Arity {
                    name: name.to_string(),
                    expected: 1,
                    got: args.len(),
                }),
            },
            "sin" => self.scalar_fn(name, args, f64::sin),
            "cos" => self.scalar_fn(name, args, f64::cos),
            "tan" => self.scalar_fn(name, args, f64::tan),
            "asin" => self.scalar_fn(name, args, f64::asin),
            "acos" => self.scalar_fn(name, args, f64::acos),
            "atan" => self.scalar_fn(name, args, f64::atan),
            "exp" => self.scalar_fn(name, args, f64::exp),
            "log" => self.scalar_fn(name, args, f64::ln),
            "sqrt" => self.scalar_fn(name, args, f64::sqrt),
            "abs" => self.scalar_fn(name, args, f64::abs),
            "sign" => self.scalar_fn(name, args, |x| if x < 0.0 { -1.0 } else { 1.0 }),
            "mag" => self.args(name, args, 1)?[0].mag(),
            "magSqr" => {
                let mag = self.args(name, args, 1)?[0].mag()?;
                Ok(ExprValue::Scalar(mag.as_scalar(name)?.iter().map(|m| m * m).collect()))
            }
            "pow" => {
                let a = self.args(name, args, 2)?;
                let (base, exponent) = (a[0].as_scalar(name)?, a[1].as_scalar(name)?);
                Ok(ExprValue::Scalar(
                    base.iter().zip(exponent).map(|(b, e)| b.powf(*e)).collect(),
                ))
            }
            "min" | "max" => {
                let pick: fn(f64, f64) -> f64 = if name == "min" { f64::min } else { f64::max };
                match args.len() {
                    1 => {
                        let init = if name == "min" {
                            f64::INFINITY
                        } else {
                            f64::NEG_INFINITY
                        };
                        self.eval(&args[0])?
                            .reduce_scalar(name, |v| v.iter().copied().fold(init, pick))
                    }
                    _ => {
                        let a = self.args(name, args, 2)?;
                        let (x, y) = (a[0].as_scalar(name)?, a[1].as_scalar(name)?);
                        Ok(ExprValue::Scalar(
                            x.iter().zip(y).map(|(x, y)| pick(*x, *y)).collect(),
                        ))
                    }
                }
            }
            "sum" | "average" => {
                let value = self.args(name, args, 1)?.remove(0);
                let n = value.len();
                let scale = if name == "average" && n > 0 {
                    1.0 / n as f64
                } else {
                    1.0
                };
                match value {
                    ExprValue::Scalar(v) => Ok(ExprValue::Scalar(vec![v.iter().sum::<f64>() * scale; n])),
                    ExprValue::Vector(v) => {
                        let total = v.iter().fold(<Vector as FieldElement>::zero(), |acc, x| acc + x);
                        Ok(ExprValue::Vector(vec![total * scale; n]))
                    }
                    other => Err(ExprError::InvalidOperand {
                        op: name.to_string(),
                        kind: other.kind(),
                    }),
                }
            }
            "tr" => match self.args(name, args, 1)?.remove(0) {
                ExprValue::Tensor(t) => Ok(ExprValue::Scalar(t.iter().map(|x| x.trace()).collect())),
                ExprValue::SymmTensor(t) => {
                    Ok(ExprValue::Scalar(t.iter().map(SymmTensor::trace).collect()))
                }
                other => Err(ExprError::InvalidOperand {
                    op: name.to_string(),
                    kind: other.kind(),
                }),
            },
            "vector" => self.construct::<Vector>(name, args).map(ExprValue::Vector),
            "symmTensor" => self.construct::<SymmTensor>(name, args).map(ExprValue::SymmTensor),
            "tensor" => self.construct::<Tensor>(name, args).map(ExprValue::Tensor),
            _ => match self.timelines.get(name) {
                Some(timeline) => {
                    let at = self.args(name, args, 1)?;
                    let times = at[0].as_scalar(name)?;
                    Ok(ExprValue::Scalar(
                        times.iter().map(|&t| timeline.value_at(t)).collect(),
                    ))
                }
                None => Err(ExprError::UnknownFunction(name.to_string())),
            },
        }
    }

    fn construct<T: FieldElement>(&self, name: &str, args: &[Expr]) -> Result<Vec<T>, ExprError> {
        let values = self.args(name, args, T::N_COMPONENTS)?;
        let columns = values
            .iter()
            .map(|v| v.as_scalar(name))
            .collect::<Result<Vec<_>, _>>()?;
        Ok((0..self.env.n_faces)
            .map(|face| {
                let c: Vec<f64> = columns.iter().map(|col| col[face]).collect();
                T::from_components(&c)
            })
            .collect())
    }
}

fn binary(lhs: &ExprValue, op: BinaryOp, rhs: &ExprValue) -> Result<ExprValue, ExprError> {
    let symbol = op.to_string();
    match op {
        BinaryOp::Add => lhs.add(rhs),
        BinaryOp::Sub => lhs.sub(rhs),
        BinaryOp::Mul => lhs.mul(rhs),
        BinaryOp::Div => lhs.div(rhs),
        BinaryOp::Inner => lhs.inner(rhs),
        BinaryOp::Cross => lhs.cross(rhs),
        BinaryOp::Less => lhs.compare(rhs, &symbol, |a, b| a < b),
        BinaryOp::LessEq => lhs.compare(rhs, &symbol, |a, b| a <= b),
        BinaryOp::Greater => lhs.compare(rhs, &symbol, |a, b| a > b),
        BinaryOp::GreaterEq => lhs.compare(rhs, &symbol, |a, b| a >= b),
        BinaryOp::Equal => match (lhs.kind(), rhs.kind()) {
            (ExprKind::Logical, ExprKind::Logical) => lhs.logical(rhs, &symbol, |a, b| a == b),
            _ => lhs.compare(rhs, &symbol, |a, b| a == b),
        },
        BinaryOp::NotEqual => match (lhs.kind(), rhs.kind()) {
            (ExprKind::Logical, ExprKind::Logical) => lhs.logical(rhs, &symbol, |a, b| a != b),
            _ => lhs.compare(rhs, &symbol, |a, b| a != b),
        },
        BinaryOp::And => lhs.logical(rhs, &symbol, |a, b| a && b),
        BinaryOp::Or => lhs.logical(rhs, &symbol, |a, b| a || b),
    }
}
