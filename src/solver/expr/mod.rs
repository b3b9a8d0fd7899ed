//! Patch expression language used by the expression-driven boundary conditions.
//!
//! Expressions are parsed by a small Pratt parser and evaluated face by face
//! against a [`PatchEnvironment`]. Every value is a per-face field; literals and
//! reductions are broadcast to the face count.

mod driver;
mod parser;
mod value;

pub use driver::{PatchEnvironment, PatchExpressionDriver, Timeline};
pub use parser::{BinaryOp, Expr, UnaryOp};
pub use value::{ExprKind, ExprValue};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExprError {
    #[error("unexpected token '{0}'")]
    UnexpectedToken(String),
    #[error("unexpected end of input")]
    UnexpectedEof,
    #[error("invalid expression '{0}'")]
    InvalidExpression(String),
    #[error("unknown variable '{0}'")]
    UnknownVariable(String),
    #[error("unknown function '{0}'")]
    UnknownFunction(String),
    #[error("function '{name}' expects {expected} argument(s), got {got}")]
    Arity {
        name: String,
        expected: usize,
        got: usize,
    },
    #[error("type mismatch in '{op}': {lhs} and {rhs}")]
    TypeMismatch {
        op: String,
        lhs: ExprKind,
        rhs: ExprKind,
    },
    #[error("'{op}' is not defined for a {kind} operand")]
    InvalidOperand { op: String, kind: ExprKind },
    #[error("no component '{component}' in a {kind}")]
    UnknownComponent { component: String, kind: ExprKind },
    #[error("expression yields a {actual} field, expected {expected}")]
    RankMismatch {
        expected: &'static str,
        actual: ExprKind,
    },
    #[error("bad variable definition '{0}', expected 'name=expression'")]
    BadDefinition(String),
    #[error("bad timeline '{name}': {reason}")]
    BadTimeline { name: String, reason: String },
}
