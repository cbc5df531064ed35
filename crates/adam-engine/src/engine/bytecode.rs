//! Compiled expression form.
//!
//! An [`Expression`] is a flat instruction array in stack order. Jump targets
//! are absolute instruction indices.

use std::fmt;
use std::sync::Arc;

use super::ast::{BinaryOp, UnaryOp};
use super::name::Name;
use super::value::Value;

#[derive(Clone, Debug, PartialEq)]
pub enum Op {
    /// Push a literal.
    Push(Value),
    /// Resolve a free variable through the scope chain and push it.
    Load(Name),
    Unary(UnaryOp),
    Binary(BinaryOp),
    /// Pop index then target, push `target[index]`.
    Index,
    /// Pop a dictionary, push its entry for the name.
    Member(Name),
    /// Pop `n` values, push them as an array (first pushed is first element).
    MakeArray(usize),
    /// Pop one value per key, push a dictionary.
    MakeDictionary(Arc<[Name]>),
    /// Pop `argc` values and call the function positionally.
    Call { function: Name, argc: usize },
    /// Pop one value per key and call the function with a dictionary argument.
    CallNamed { function: Name, keys: Arc<[Name]> },
    /// Short-circuit `&&`: if the top is `false`, leave it and jump; otherwise pop it.
    JumpIfFalseOrPop(usize),
    /// Short-circuit `||`: if the top is `true`, leave it and jump; otherwise pop it.
    JumpIfTrueOrPop(usize),
    /// Pop a boolean and jump when it is `false`.
    JumpUnless(usize),
    Jump(usize),
}

/// An immutable, cheaply clonable compiled expression.
#[derive(Clone, PartialEq)]
pub struct Expression {
    ops: Arc<[Op]>,
    source: Option<Arc<str>>,
}

impl Expression {
    pub fn new(ops: Vec<Op>) -> Self {
        Expression {
            ops: ops.into(),
            source: None,
        }
    }

    pub(crate) fn with_source(ops: Vec<Op>, source: &str) -> Self {
        Expression {
            ops: ops.into(),
            source: Some(Arc::from(source.trim())),
        }
    }

    /// An expression that evaluates to a constant.
    pub fn literal(value: impl Into<Value>) -> Self {
        Expression::new(vec![Op::Push(value.into())])
    }

    pub fn ops(&self) -> &[Op] {
        &self.ops
    }

    /// The text this expression was compiled from, if known.
    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    /// The value of the expression if it is a single literal.
    pub fn as_literal(&self) -> Option<&Value> {
        match &*self.ops {
            [Op::Push(value)] => Some(value),
            _ => None,
        }
    }
}

impl fmt::Debug for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            Some(source) => write!(f, "Expression({:?})", source),
            None => f.debug_tuple("Expression").field(&self.ops).finish(),
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            Some(source) => f.write_str(source),
            None => write!(f, "<{} ops>", self.ops.len()),
        }
    }
}
