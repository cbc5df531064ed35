//! Dependency extraction from compiled expressions.
//!
//! Scans bytecode for `Load` instructions to find every free variable an
//! expression reads. This is used to build the sheet's dependency graph for
//! dirty propagation and cycle detection.
//!
//! Function names, member names and dictionary keys are not variables and are
//! never reported. Literal-only sub-expressions were folded by the compiler,
//! so they contribute nothing either.

use std::collections::HashSet;

use super::bytecode::{Expression, Op};
use super::name::Name;

/// Extract the distinct variables an expression reads, in first-read order.
pub fn extract_dependencies(expression: &Expression) -> Vec<Name> {
    let mut seen = HashSet::new();
    expression
        .ops()
        .iter()
        .filter_map(|op| match op {
            Op::Load(name) => Some(*name),
            _ => None,
        })
        .filter(|name| seen.insert(*name))
        .collect()
}
