//! Multi-directional relations.
//!
//! A relation lists two or more terms, each of which can produce values for
//! some of its member cells from the others. Each update picks one term (the
//! unknown) and writes its result into that term's cells.

use adam_engine::engine::{Expression, Name, Value};

use super::cell::LinePosition;

/// One `names <== expression` term of a relation as declared by the host.
#[derive(Clone, Debug)]
pub struct RelateTerm {
    pub names: Vec<Name>,
    pub expression: Expression,
}

impl RelateTerm {
    pub fn new(name: impl Into<Name>, expression: Expression) -> Self {
        RelateTerm {
            names: vec![name.into()],
            expression,
        }
    }

    /// A term that assigns the elements of an array result to several cells.
    pub fn multi(names: Vec<Name>, expression: Expression) -> Self {
        RelateTerm { names, expression }
    }
}

/// A term with its targets resolved to cell indices.
#[derive(Clone, Debug)]
pub(crate) struct Term {
    pub targets: Vec<usize>,
    pub expression: Expression,
}

impl Term {
    /// Split a term result into one value per target.
    pub fn distribute(&self, result: Value) -> Result<Vec<Value>, String> {
        if self.targets.len() == 1 {
            return Ok(vec![result]);
        }
        match result.as_array() {
            Some(items) if items.len() == self.targets.len() => Ok(items.to_vec()),
            Some(items) => Err(format!(
                "term assigns {} cells but produced {} values",
                self.targets.len(),
                items.len()
            )),
            None => Err(format!(
                "term assigns {} cells and needs an array, got {}",
                self.targets.len(),
                result.type_name()
            )),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Relation {
    pub position: LinePosition,
    pub guard: Option<Expression>,
    pub(crate) terms: Vec<Term>,
    /// Every member cell, in term order.
    pub(crate) members: Vec<usize>,
    pub priority: usize,
    pub(crate) sequence: usize,
    pub(crate) dirty: bool,
}

impl Relation {
    pub(crate) fn contains(&self, cell: usize) -> bool {
        self.members.contains(&cell)
    }

    pub fn term_count(&self) -> usize {
        self.terms.len()
    }

    /// Human-readable label used in diagnostics.
    pub(crate) fn label(&self, names: impl Fn(usize) -> Name) -> String {
        let members: Vec<&str> = self.members.iter().map(|&id| names(id).as_str()).collect();
        format!("relation {{{}}}", members.join(", "))
    }
}
