use adam_engine::engine::{
    EvalResult, Expression, Name, ScopeChain, Value, evaluate, extract_dependencies,
};
use tracing::debug;

use super::cell::{Cell, CellKind, CellState, LinePosition};
use super::relation::{RelateTerm, Relation, Term};
use super::Sheet;
use crate::error::{AdamError, Result};

impl Sheet {
    pub fn add_input(
        &mut self,
        name: &str,
        position: LinePosition,
        initializer: Expression,
    ) -> Result<()> {
        self.add_storage(name, CellKind::Input, position, Some(initializer))
    }

    pub fn add_constant(
        &mut self,
        name: &str,
        position: LinePosition,
        initializer: Expression,
    ) -> Result<()> {
        self.add_storage(name, CellKind::Constant, position, Some(initializer))
    }

    pub fn add_output(
        &mut self,
        name: &str,
        position: LinePosition,
        expression: Expression,
    ) -> Result<()> {
        self.add_computed(name, CellKind::Output, position, expression)
    }

    pub fn add_logic(
        &mut self,
        name: &str,
        position: LinePosition,
        expression: Expression,
    ) -> Result<()> {
        self.add_computed(name, CellKind::Logic, position, expression)
    }

    /// Declare a boolean cell that is reported when it evaluates to `false`.
    pub fn add_invariant(
        &mut self,
        name: &str,
        position: LinePosition,
        expression: Expression,
    ) -> Result<()> {
        self.add_computed(name, CellKind::Invariant, position, expression)
    }

    /// Declare a cell whose value is set only by the host.
    pub fn add_external(&mut self, name: &str, position: LinePosition) -> Result<()> {
        self.add_storage(name, CellKind::External, position, None)
    }

    /// Generic form of the `add_*` methods. `expression` is the initializer
    /// for storage kinds and the defining expression for computed ones.
    pub fn add_cell(
        &mut self,
        kind: CellKind,
        name: &str,
        position: LinePosition,
        expression: Option<Expression>,
    ) -> Result<()> {
        match kind {
            CellKind::Input | CellKind::Constant | CellKind::External => {
                self.add_storage(name, kind, position, expression)
            }
            CellKind::Interface { linked: false } => {
                self.add_interface(name, false, position.clone(), expression, position, None)
            }
            CellKind::Interface { linked: true } => {
                self.add_interface(name, true, position.clone(), None, position, expression)
            }
            CellKind::Output | CellKind::Logic | CellKind::Invariant => {
                let expression = expression.ok_or_else(|| AdamError::MissingExpression {
                    name: Name::new(name),
                    kind,
                    position: position.clone(),
                })?;
                self.add_computed(name, kind, position, expression)
            }
        }
    }

    /// Declare an interface cell.
    ///
    /// A linked interface is recomputed from `expression` like a logic cell,
    /// but the host may still `set` it; the assigned value stands until one
    /// of its dependencies changes. An unlinked interface behaves like an
    /// input and `expression` is kept only for reference.
    pub fn add_interface(
        &mut self,
        name: &str,
        linked: bool,
        init_position: LinePosition,
        initializer: Option<Expression>,
        expr_position: LinePosition,
        expression: Option<Expression>,
    ) -> Result<()> {
        let kind = CellKind::Interface { linked };
        if linked && expression.is_none() {
            return Err(AdamError::MissingExpression {
                name: Name::new(name),
                kind,
                position: expr_position,
            });
        }
        let value = match &initializer {
            Some(init) => self.seed_value(name, kind, &init_position, init)?,
            None => Value::Undefined,
        };
        let id = self.declare(name, kind, init_position)?;
        let cell = &mut self.cells[id];
        cell.value = value;
        cell.initializer = initializer;
        cell.expression = expression;
        cell.expression_position = expr_position;
        if linked {
            cell.state = CellState::Dirty;
        }
        Ok(())
    }

    /// Declare a relation between two or more terms.
    ///
    /// Every name on the left of a term must already be declared as an
    /// input or unlinked interface, and may appear in only one term.
    pub fn add_relation(
        &mut self,
        position: LinePosition,
        guard: Option<Expression>,
        terms: Vec<RelateTerm>,
    ) -> Result<()> {
        if terms.len() < 2 {
            return Err(AdamError::InvalidRelation {
                position,
                message: format!("needs at least two terms, found {}", terms.len()),
            });
        }

        let mut members = Vec::new();
        let mut resolved = Vec::with_capacity(terms.len());
        for term in terms {
            if term.names.is_empty() {
                return Err(AdamError::InvalidRelation {
                    position,
                    message: "term assigns no cells".to_string(),
                });
            }
            let mut targets = Vec::with_capacity(term.names.len());
            for name in term.names {
                let Some(&id) = self.index.get(&name) else {
                    return Err(AdamError::UnknownCellReference {
                        name,
                        referenced_by: "relation".to_string(),
                        position,
                    });
                };
                let kind = self.cells[id].kind;
                if !kind.is_relatable() {
                    return Err(AdamError::InvalidRelation {
                        position,
                        message: format!(
                            "'{}' is {} and cannot be solved by a relation",
                            name, kind
                        ),
                    });
                }
                if members.contains(&id) {
                    return Err(AdamError::InvalidRelation {
                        position,
                        message: format!("'{}' appears in more than one term", name),
                    });
                }
                members.push(id);
                targets.push(id);
            }
            resolved.push(Term {
                targets,
                expression: term.expression,
            });
        }

        let sequence = self.next_sequence();
        debug!(%position, terms = resolved.len(), "relation declared");
        self.relations.push(Relation {
            position,
            guard,
            terms: resolved,
            members,
            priority: 0,
            sequence,
            dirty: true,
        });
        self.graph = None;
        Ok(())
    }

    fn add_storage(
        &mut self,
        name: &str,
        kind: CellKind,
        position: LinePosition,
        initializer: Option<Expression>,
    ) -> Result<()> {
        let value = match &initializer {
            Some(init) => self.seed_value(name, kind, &position, init)?,
            None => Value::Undefined,
        };
        let id = self.declare(name, kind, position)?;
        let cell = &mut self.cells[id];
        cell.value = value;
        cell.initializer = initializer;
        Ok(())
    }

    fn add_computed(
        &mut self,
        name: &str,
        kind: CellKind,
        position: LinePosition,
        expression: Expression,
    ) -> Result<()> {
        let id = self.declare(name, kind, position)?;
        let cell = &mut self.cells[id];
        cell.expression = Some(expression);
        cell.state = CellState::Dirty;
        Ok(())
    }

    fn declare(&mut self, name: &str, kind: CellKind, position: LinePosition) -> Result<usize> {
        let name = Name::new(name);
        if self.index.contains_key(&name) {
            return Err(AdamError::DuplicateCellName { name, position });
        }
        let sequence = self.next_sequence();
        let id = self.cells.len();
        debug!(cell = %name, kind = %kind, "cell declared");
        self.cells.push(Cell::new(name, kind, position, sequence));
        self.index.insert(name, id);
        self.graph = None;
        Ok(id)
    }

    /// Evaluate an initializer against the cells declared so far.
    fn seed_value(
        &self,
        name: &str,
        kind: CellKind,
        position: &LinePosition,
        initializer: &Expression,
    ) -> Result<Value> {
        for dep in extract_dependencies(initializer) {
            if !self.index.contains_key(&dep) {
                return Err(AdamError::UnknownCellReference {
                    name: dep,
                    referenced_by: format!("{} '{}'", kind, name),
                    position: position.clone(),
                });
            }
        }
        self.evaluate_expression(initializer)
            .map_err(|source| AdamError::Evaluation {
                subject: format!("initializer of '{}'", name),
                position: position.clone(),
                source,
            })
    }

    pub(crate) fn evaluate_expression(&self, expression: &Expression) -> EvalResult<Value> {
        let cells = |name: Name| {
            self.index
                .get(&name)
                .map(|&id| self.cells[id].value.clone())
        };
        evaluate(expression, &ScopeChain::new().with(&cells), &self.functions)
    }

    fn next_sequence(&mut self) -> usize {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        sequence
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adam_engine::engine::compile;

    fn expr(source: &str) -> Expression {
        compile(source).unwrap()
    }

    #[test]
    fn test_initializer_sees_earlier_cells() {
        let mut sheet = Sheet::new();
        sheet.add_constant("k", LinePosition::line(1), expr("10")).unwrap();
        sheet.add_input("a", LinePosition::line(2), expr("k * 2")).unwrap();
        assert_eq!(sheet.get("a").unwrap(), Value::from(20));
    }

    #[test]
    fn test_initializer_cannot_read_later_cells() {
        let mut sheet = Sheet::new();
        let err = sheet.add_input("a", LinePosition::line(1), expr("b")).unwrap_err();
        assert!(matches!(
            err,
            AdamError::UnknownCellReference { name, .. } if name.as_str() == "b"
        ));
        assert!(sheet.names().is_empty());
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut sheet = Sheet::new();
        sheet.add_input("a", LinePosition::line(1), expr("1")).unwrap();
        let err = sheet
            .add_logic("a", LinePosition::line(2), expr("2"))
            .unwrap_err();
        match err {
            AdamError::DuplicateCellName { name, position } => {
                assert_eq!(name.as_str(), "a");
                assert_eq!(position.line, 2);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_generic_add_cell_requires_expression_for_computed() {
        let mut sheet = Sheet::new();
        let err = sheet
            .add_cell(CellKind::Output, "o", LinePosition::line(1), None)
            .unwrap_err();
        assert!(matches!(err, AdamError::MissingExpression { .. }));
        sheet
            .add_cell(CellKind::Input, "i", LinePosition::line(2), None)
            .unwrap();
        assert_eq!(sheet.get("i").unwrap(), Value::Undefined);
    }

    #[test]
    fn test_relation_validation() {
        let mut sheet = Sheet::new();
        sheet.add_input("a", LinePosition::line(1), expr("1")).unwrap();
        sheet.add_input("b", LinePosition::line(2), expr("2")).unwrap();
        sheet.add_output("o", LinePosition::line(3), expr("a + b")).unwrap();

        let one_term = sheet.add_relation(
            LinePosition::line(4),
            None,
            vec![RelateTerm::new("a", expr("b"))],
        );
        assert!(matches!(one_term, Err(AdamError::InvalidRelation { .. })));

        let computed_member = sheet.add_relation(
            LinePosition::line(5),
            None,
            vec![RelateTerm::new("a", expr("o")), RelateTerm::new("o", expr("a"))],
        );
        assert!(matches!(computed_member, Err(AdamError::InvalidRelation { .. })));

        let repeated = sheet.add_relation(
            LinePosition::line(6),
            None,
            vec![
                RelateTerm::new("a", expr("b")),
                RelateTerm::multi(vec![Name::new("a"), Name::new("b")], expr("[1, 2]")),
            ],
        );
        assert!(matches!(repeated, Err(AdamError::InvalidRelation { .. })));

        let undeclared = sheet.add_relation(
            LinePosition::line(7),
            None,
            vec![RelateTerm::new("a", expr("z")), RelateTerm::new("z", expr("a"))],
        );
        assert!(matches!(undeclared, Err(AdamError::UnknownCellReference { .. })));
    }

    #[test]
    fn test_linked_interface_requires_expression() {
        let mut sheet = Sheet::new();
        let err = sheet
            .add_interface("w", true, LinePosition::line(1), None, LinePosition::line(1), None)
            .unwrap_err();
        assert!(matches!(err, AdamError::MissingExpression { .. }));
    }
}
