//! Cell records.
//!
//! - [`CellKind`] - What a cell is for and how its value is produced
//! - [`CellState`] - Where a cell is in the `clean → dirty → evaluating` cycle
//! - [`Cell`] - The record the sheet keeps per declared name
//! - [`LinePosition`] - Where a declaration came from, for diagnostics

use adam_engine::engine::{Expression, Name, Value};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Source location of a declaration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct LinePosition {
    pub file: Option<Arc<str>>,
    /// 1-based; 0 when unknown.
    pub line: usize,
    /// 1-based; 0 when unknown.
    pub column: usize,
}

impl LinePosition {
    pub fn new(file: Option<&str>, line: usize, column: usize) -> Self {
        LinePosition {
            file: file.map(Arc::from),
            line,
            column,
        }
    }

    /// A position with only a line number.
    pub fn line(line: usize) -> Self {
        LinePosition {
            file: None,
            line,
            column: 0,
        }
    }
}

impl fmt::Display for LinePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let file = self.file.as_deref().unwrap_or("<input>");
        match (self.line, self.column) {
            (0, _) => write!(f, "{}", file),
            (line, 0) => write!(f, "{}:{}", file, line),
            (line, column) => write!(f, "{}:{}:{}", file, line, column),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CellKind {
    Input,
    Output,
    Constant,
    Logic,
    Invariant,
    Interface { linked: bool },
    External,
}

impl CellKind {
    /// Kinds whose value the host may assign with `set`.
    pub fn is_settable(self) -> bool {
        matches!(
            self,
            CellKind::Input | CellKind::Interface { .. } | CellKind::External
        )
    }

    /// Kinds whose value is recomputed from an expression by the solver.
    pub fn is_computed(self) -> bool {
        matches!(
            self,
            CellKind::Output
                | CellKind::Logic
                | CellKind::Invariant
                | CellKind::Interface { linked: true }
        )
    }

    /// Kinds that hold a value supplied from outside the expression graph and
    /// so make up contributing sets.
    pub fn is_storage(self) -> bool {
        self.is_settable()
    }

    /// Kinds a relation may solve for.
    pub fn is_relatable(self) -> bool {
        matches!(self, CellKind::Input | CellKind::Interface { linked: false })
    }

    pub fn label(self) -> &'static str {
        match self {
            CellKind::Input => "input",
            CellKind::Output => "output",
            CellKind::Constant => "constant",
            CellKind::Logic => "logic",
            CellKind::Invariant => "invariant",
            CellKind::Interface { linked: true } => "linked interface",
            CellKind::Interface { linked: false } => "interface",
            CellKind::External => "external",
        }
    }
}

impl fmt::Display for CellKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CellState {
    Clean,
    Dirty,
    Evaluating,
    Error,
}

/// A declared cell.
#[derive(Clone, Debug)]
pub struct Cell {
    pub name: Name,
    pub kind: CellKind,
    pub value: Value,
    /// Seed for input, constant and interface cells.
    pub initializer: Option<Expression>,
    /// Recompute rule for computed cells.
    pub expression: Option<Expression>,
    pub position: LinePosition,
    /// Position of `expression` when it differs from the declaration's.
    pub expression_position: LinePosition,
    /// Size of the contributing set (see [`crate::Sheet::contributing`]).
    pub priority: usize,
    pub state: CellState,
    /// Declaration sequence, shared with relations.
    pub(crate) sequence: usize,
    /// Value before the first `set` of the current batch.
    pub(crate) prior: Option<Value>,
}

impl Cell {
    pub(crate) fn new(name: Name, kind: CellKind, position: LinePosition, sequence: usize) -> Cell {
        Cell {
            name,
            kind,
            value: Value::Undefined,
            initializer: None,
            expression: None,
            expression_position: position.clone(),
            position,
            priority: 0,
            state: CellState::Clean,
            sequence,
            prior: None,
        }
    }

    /// Whether the solver still has work to do for this cell.
    pub(crate) fn needs_update(&self) -> bool {
        let stale = self.kind.is_computed()
            && matches!(self.state, CellState::Dirty | CellState::Error);
        stale || self.prior.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_capabilities() {
        assert!(CellKind::Input.is_settable());
        assert!(CellKind::External.is_settable());
        assert!(CellKind::Interface { linked: true }.is_settable());
        assert!(!CellKind::Constant.is_settable());
        assert!(!CellKind::Output.is_settable());

        assert!(CellKind::Interface { linked: true }.is_computed());
        assert!(!CellKind::Interface { linked: false }.is_computed());
        assert!(CellKind::Invariant.is_computed());

        assert!(CellKind::Input.is_relatable());
        assert!(!CellKind::Interface { linked: true }.is_relatable());
        assert!(!CellKind::External.is_relatable());
    }

    #[test]
    fn test_position_display() {
        assert_eq!(LinePosition::new(Some("a.adm"), 3, 7).to_string(), "a.adm:3:7");
        assert_eq!(LinePosition::line(3).to_string(), "<input>:3");
        assert_eq!(LinePosition::default().to_string(), "<input>");
    }
}
