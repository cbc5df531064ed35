//! Error types for Adam core.

use adam_engine::engine::{EvalError, Name, ParseError};
use thiserror::Error;

use crate::sheet::{CellKind, LinePosition};

/// Errors that can occur while building or solving a sheet
#[derive(Error, Debug)]
pub enum AdamError {
    #[error("{position}: duplicate cell name '{name}'")]
    DuplicateCellName { name: Name, position: LinePosition },

    #[error("Circular dependency detected: {}", join_names(.cells))]
    CircularDependency { cells: Vec<Name> },

    #[error("{position}: {referenced_by} references undeclared cell '{name}'")]
    UnknownCellReference {
        name: Name,
        referenced_by: String,
        position: LinePosition,
    },

    #[error("{position}: invalid relation: {message}")]
    InvalidRelation {
        position: LinePosition,
        message: String,
    },

    #[error("{position}: {kind} cell '{name}' needs an expression")]
    MissingExpression {
        name: Name,
        kind: CellKind,
        position: LinePosition,
    },

    #[error("Unknown cell '{0}'")]
    UnknownCell(Name),

    #[error("Cell '{name}' is {kind} and cannot be set")]
    NotSettable { name: Name, kind: CellKind },

    #[error("{position}: error evaluating {subject}: {source}")]
    Evaluation {
        subject: String,
        position: LinePosition,
        #[source]
        source: EvalError,
    },

    #[error(
        "Update did not settle after {iterations} sweeps (still pending: {})",
        join_names(.pending)
    )]
    NonConvergent { iterations: usize, pending: Vec<Name> },

    #[error("{position}: {message}")]
    Parse {
        position: LinePosition,
        message: String,
    },

    #[error("Expression error: {0}")]
    Compile(#[from] ParseError),

    #[error("Evaluation error: {0}")]
    Eval(#[from] EvalError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AdamError {
    /// Whether the error was raised while evaluating an expression.
    pub fn is_evaluation(&self) -> bool {
        matches!(self, AdamError::Evaluation { .. } | AdamError::Eval(_))
    }
}

fn join_names(names: &[Name]) -> String {
    names
        .iter()
        .map(Name::as_str)
        .collect::<Vec<_>>()
        .join(" -> ")
}

pub type Result<T> = std::result::Result<T, AdamError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_message_lists_cells() {
        let err = AdamError::CircularDependency {
            cells: vec![Name::new("x"), Name::new("y")],
        };
        assert_eq!(err.to_string(), "Circular dependency detected: x -> y");
    }

    #[test]
    fn test_position_prefixes_message() {
        let err = AdamError::DuplicateCellName {
            name: Name::new("a"),
            position: LinePosition::new(Some("s.adm"), 4, 1),
        };
        assert_eq!(err.to_string(), "s.adm:4:1: duplicate cell name 'a'");
    }
}
