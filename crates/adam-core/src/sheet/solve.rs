//! Incremental solver.
//!
//! `set` records host assignments and marks what they can affect. `update`
//! then sweeps the graph order until nothing is dirty: computed cells are
//! re-evaluated, relations solve their unknown term, and monitor callbacks
//! fire for every value that actually changed.

use std::collections::HashSet;
use std::sync::Arc;

use adam_engine::engine::{EvalError, Name, Value};
use serde::Serialize;
use tracing::{debug, trace, warn};

use super::cell::{CellKind, CellState, LinePosition};
use super::graph::{Graph, Node};
use super::relation::{Relation, Term};
use super::Sheet;
use crate::error::{AdamError, Result};

/// An invariant cell that evaluated to `false`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct InvariantViolation {
    pub name: Name,
    pub position: LinePosition,
    /// Source text of the invariant expression, when known.
    pub expression: Option<String>,
}

/// What one call to [`Sheet::update`] did.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct UpdateReport {
    /// Cells evaluated or solved, in order.
    pub recomputed: Vec<Name>,
    /// Cells whose value differs from before the update, in order.
    pub changed: Vec<Name>,
    pub violations: Vec<InvariantViolation>,
    pub sweeps: usize,
}

impl UpdateReport {
    pub fn is_consistent(&self) -> bool {
        self.violations.is_empty()
    }
}

/// The plan for one call to `update`.
struct Pass {
    /// Per relation: the term it solves during this update.
    unknowns: Vec<usize>,
    /// Per relation: cells its guard and chosen term read, minus the term's
    /// targets.
    reads: Vec<Vec<usize>>,
    order: Vec<Node>,
}

impl Pass {
    fn targets<'a>(&self, relations: &'a [Relation], r: usize) -> &'a [usize] {
        &relations[r].terms[self.unknowns[r]].targets
    }
}

impl Sheet {
    /// Build the dependency graph and compute every cell.
    pub fn build(&mut self) -> Result<UpdateReport> {
        self.graph = None;
        self.update()
    }

    /// Assign a value to an input, interface or external cell.
    ///
    /// Dependents are marked dirty; nothing is recomputed until [`update`].
    ///
    /// [`update`]: Sheet::update
    pub fn set(&mut self, name: impl Into<Name>, value: impl Into<Value>) -> Result<()> {
        let name = name.into();
        let id = self.cell_id(name)?;
        let cell = &mut self.cells[id];
        if !cell.kind.is_settable() {
            return Err(AdamError::NotSettable {
                name,
                kind: cell.kind,
            });
        }
        let value = value.into();
        let old = std::mem::replace(&mut cell.value, value);
        if cell.prior.is_none() {
            cell.prior = Some(old);
        }
        // A linked interface keeps the assigned value until a dependency
        // changes.
        cell.state = if cell.kind.is_computed() {
            CellState::Clean
        } else {
            CellState::Dirty
        };
        if !self.set_log.contains(&id) {
            self.set_log.push(id);
        }
        if let Some(graph) = self.graph.clone() {
            self.mark_dependents_dirty(&graph, id);
        }
        debug!(cell = %name, "set");
        Ok(())
    }

    /// Bring every cell up to date with the sets made since the last update.
    pub fn update(&mut self) -> Result<UpdateReport> {
        let graph = self.ensure_graph()?;
        let mut report = UpdateReport::default();
        let mut pass = self.plan(&graph, vec![None; self.relations.len()])?;

        loop {
            let queued = self.pending.drain();
            if !queued.is_empty() {
                // A queued set on a relation member re-opens that relation's
                // choice of term.
                let mut unknowns: Vec<Option<usize>> =
                    pass.unknowns.iter().copied().map(Some).collect();
                let mut reopened = false;
                for (name, value) in queued {
                    self.set(name, value)?;
                    let id = self.cell_id(name)?;
                    for &r in &graph.member_of[id] {
                        unknowns[r] = None;
                        reopened = true;
                    }
                }
                if reopened {
                    pass = self.plan(&graph, unknowns)?;
                }
            }
            if !self.has_pending_work() {
                break;
            }
            if report.sweeps >= self.config.max_iterations {
                let pending = self.pending_names();
                warn!(
                    sweeps = report.sweeps,
                    pending = pending.len(),
                    "update did not converge"
                );
                return Err(AdamError::NonConvergent {
                    iterations: report.sweeps,
                    pending,
                });
            }
            report.sweeps += 1;
            for &node in &pass.order {
                match node {
                    Node::Cell(id) => self.process_cell(&graph, &pass, id, &mut report)?,
                    Node::Relation(r) => self.process_relation(&graph, &pass, r, &mut report)?,
                }
            }
        }

        self.set_log.clear();
        report.violations = self.violations();
        debug!(
            sweeps = report.sweeps,
            recomputed = report.recomputed.len(),
            changed = report.changed.len(),
            violations = report.violations.len(),
            "update finished"
        );
        Ok(report)
    }

    /// Every invariant currently holding `false`.
    pub fn violations(&self) -> Vec<InvariantViolation> {
        self.cells
            .iter()
            .filter(|cell| cell.kind == CellKind::Invariant && cell.value == Value::Bool(false))
            .map(|cell| InvariantViolation {
                name: cell.name,
                position: cell.expression_position.clone(),
                expression: cell
                    .expression
                    .as_ref()
                    .and_then(|e| e.source())
                    .map(str::to_string),
            })
            .collect()
    }

    pub(crate) fn cell_id(&self, name: Name) -> Result<usize> {
        self.index
            .get(&name)
            .copied()
            .ok_or(AdamError::UnknownCell(name))
    }

    /// Return the current graph, rebuilding it (and dirtying everything) if
    /// declarations changed since it was built.
    fn ensure_graph(&mut self) -> Result<Arc<Graph>> {
        if let Some(graph) = &self.graph {
            return Ok(Arc::clone(graph));
        }
        let graph = Arc::new(Graph::build(&self.cells, &self.relations, &self.index)?);
        for (id, cell) in self.cells.iter_mut().enumerate() {
            cell.priority = graph.contributing[id].len();
            if cell.kind.is_computed() && cell.prior.is_none() {
                cell.state = CellState::Dirty;
            }
        }
        for (r, relation) in self.relations.iter_mut().enumerate() {
            relation.priority = graph.relation_priority[r];
            relation.dirty = true;
        }
        self.graph = Some(Arc::clone(&graph));
        Ok(graph)
    }

    /// Choose the term each relation solves and order the graph for it.
    ///
    /// Entries of `unknowns` that are already `Some` are kept. The rest are
    /// chosen with dirty relations first, by (priority, declaration order);
    /// cells claimed by an earlier choice count as determined for later ones.
    fn plan(&self, graph: &Graph, mut unknowns: Vec<Option<usize>>) -> Result<Pass> {
        let mut claimed: HashSet<usize> = HashSet::new();
        for (r, unknown) in unknowns.iter().enumerate() {
            if let Some(term) = unknown {
                claimed.extend(self.relations[r].terms[*term].targets.iter().copied());
            }
        }
        let mut open: Vec<usize> = (0..self.relations.len())
            .filter(|&r| unknowns[r].is_none())
            .collect();
        open.sort_by_key(|&r| {
            let relation = &self.relations[r];
            (!relation.dirty, relation.priority, relation.sequence)
        });
        for r in open {
            let term = self.choose_unknown(r, &claimed);
            claimed.extend(self.relations[r].terms[term].targets.iter().copied());
            unknowns[r] = Some(term);
        }

        let unknowns: Vec<usize> = unknowns.into_iter().map(|u| u.unwrap_or(0)).collect();
        let reads: Vec<Vec<usize>> = self
            .relations
            .iter()
            .enumerate()
            .map(|(r, relation)| graph.solve_reads(relation, r, unknowns[r]))
            .collect();
        let order = graph.schedule(&self.cells, &self.relations, &unknowns, &reads)?;
        Ok(Pass {
            unknowns,
            reads,
            order,
        })
    }

    fn has_pending_work(&self) -> bool {
        self.cells.iter().any(|cell| cell.needs_update())
            || self.relations.iter().any(|relation| relation.dirty)
    }

    fn pending_names(&self) -> Vec<Name> {
        let mut ids: Vec<usize> = self
            .cells
            .iter()
            .enumerate()
            .filter(|(_, cell)| cell.needs_update())
            .map(|(id, _)| id)
            .collect();
        for relation in self.relations.iter().filter(|r| r.dirty) {
            ids.extend(relation.members.iter().copied());
        }
        ids.sort_unstable();
        ids.dedup();
        ids.into_iter().map(|id| self.cells[id].name).collect()
    }

    /// Mark everything reachable from `changed` dirty, plus the relations it
    /// is a member of. Relations are marked but not traversed.
    fn mark_dependents_dirty(&mut self, graph: &Graph, changed: usize) {
        for &r in &graph.member_of[changed] {
            self.relations[r].dirty = true;
        }
        let mut to_process = vec![changed];
        let mut visited = HashSet::new();
        while let Some(id) = to_process.pop() {
            if !visited.insert(id) {
                continue;
            }
            for &dependent in &graph.dependents[id] {
                match dependent {
                    Node::Cell(dep) => {
                        self.cells[dep].state = CellState::Dirty;
                        to_process.push(dep);
                    }
                    Node::Relation(r) => self.relations[r].dirty = true,
                }
            }
        }
    }

    fn process_cell(
        &mut self,
        graph: &Graph,
        pass: &Pass,
        id: usize,
        report: &mut UpdateReport,
    ) -> Result<()> {
        let cell = &self.cells[id];
        if cell.kind.is_computed() && matches!(cell.state, CellState::Dirty | CellState::Error) {
            return self.recompute(graph, pass, id, report);
        }
        if cell.prior.is_some() {
            let value = cell.value.clone();
            self.commit(graph, pass, id, value, None, report);
        }
        Ok(())
    }

    fn recompute(
        &mut self,
        graph: &Graph,
        pass: &Pass,
        id: usize,
        report: &mut UpdateReport,
    ) -> Result<()> {
        let cell = &mut self.cells[id];
        let Some(expression) = cell.expression.clone() else {
            cell.state = CellState::Clean;
            return Ok(());
        };
        cell.state = CellState::Evaluating;
        let (name, kind) = (cell.name, cell.kind);
        trace!(cell = %name, "recompute");

        let result = self.evaluate_expression(&expression).and_then(|value| {
            if kind == CellKind::Invariant && value.as_bool().is_none() {
                return Err(EvalError::TypeMismatch(format!(
                    "invariant must be bool, got {}",
                    value.type_name()
                )));
            }
            Ok(value)
        });
        match result {
            Ok(value) => {
                report.recomputed.push(name);
                self.commit(graph, pass, id, value, None, report);
                Ok(())
            }
            Err(source) => {
                let cell = &mut self.cells[id];
                cell.state = CellState::Error;
                Err(AdamError::Evaluation {
                    subject: format!("{} '{}'", kind, name),
                    position: cell.expression_position.clone(),
                    source,
                })
            }
        }
    }

    fn process_relation(
        &mut self,
        graph: &Graph,
        pass: &Pass,
        r: usize,
        report: &mut UpdateReport,
    ) -> Result<()> {
        if !self.relations[r].dirty {
            return Ok(());
        }
        self.relations[r].dirty = false;
        let result = self.solve_relation(graph, pass, r, report);
        if result.is_err() {
            self.relations[r].dirty = true;
        }
        result
    }

    fn solve_relation(
        &mut self,
        graph: &Graph,
        pass: &Pass,
        r: usize,
        report: &mut UpdateReport,
    ) -> Result<()> {
        let relation = &self.relations[r];
        let subject = relation.label(|id| self.cells[id].name);
        let position = relation.position.clone();
        let fail = |source: EvalError| AdamError::Evaluation {
            subject: subject.clone(),
            position: position.clone(),
            source,
        };

        if let Some(guard) = &relation.guard {
            match self.evaluate_expression(guard).map_err(fail)? {
                Value::Bool(true) => {}
                Value::Bool(false) => {
                    trace!(%position, "relation guard is false");
                    return Ok(());
                }
                other => {
                    return Err(fail(EvalError::TypeMismatch(format!(
                        "relation guard must be bool, got {}",
                        other.type_name()
                    ))));
                }
            }
        }

        let term: Term = self.relations[r].terms[pass.unknowns[r]].clone();
        let result = self.evaluate_expression(&term.expression).map_err(fail)?;
        let values = term
            .distribute(result)
            .map_err(|message| fail(EvalError::TypeMismatch(message)))?;
        for (&target, value) in term.targets.iter().zip(values) {
            report.recomputed.push(self.cells[target].name);
            self.commit(graph, pass, target, value, Some(r), report);
        }
        Ok(())
    }

    /// Pick the term a relation solves for in this update: one with no
    /// member assigned by `set` in the current batch or claimed by another
    /// relation's choice, or every term when all have one; among those, the
    /// term whose earliest member was declared first.
    fn choose_unknown(&self, r: usize, claimed: &HashSet<usize>) -> usize {
        let relation = &self.relations[r];
        let earliest = |term: &Term| {
            term.targets
                .iter()
                .map(|&id| self.cells[id].sequence)
                .min()
                .unwrap_or(usize::MAX)
        };
        let untouched = relation
            .terms
            .iter()
            .enumerate()
            .filter(|(_, term)| {
                term.targets
                    .iter()
                    .all(|id| !self.set_log.contains(id) && !claimed.contains(id))
            })
            .min_by_key(|(_, term)| earliest(term));
        let chosen = untouched
            .or_else(|| {
                relation
                    .terms
                    .iter()
                    .enumerate()
                    .min_by_key(|(_, term)| earliest(term))
            })
            .map_or(0, |(index, _)| index);
        debug!(
            relation = %relation.position,
            unknown = %self.cells[relation.terms[chosen].targets[0]].name,
            "relation unknown chosen"
        );
        chosen
    }

    /// Store a freshly computed value. If it differs from the value the cell
    /// had when the update (or batch) started, mark direct dependents dirty
    /// and notify monitors. A relation is only dirtied when its chosen term
    /// reads the cell or, for a solved value, also solves for it.
    fn commit(
        &mut self,
        graph: &Graph,
        pass: &Pass,
        id: usize,
        value: Value,
        writer: Option<usize>,
        report: &mut UpdateReport,
    ) {
        let cell = &mut self.cells[id];
        let baseline = cell.prior.take().unwrap_or_else(|| cell.value.clone());
        cell.value = value;
        cell.state = CellState::Clean;
        if cell.value.is_identical(&baseline) {
            return;
        }
        let name = cell.name;
        let value = cell.value.clone();
        report.changed.push(name);

        for &dependent in &graph.dependents[id] {
            match dependent {
                Node::Cell(dep) => self.cells[dep].state = CellState::Dirty,
                Node::Relation(other) if pass.reads[other].contains(&id) => {
                    self.relations[other].dirty = true;
                }
                Node::Relation(_) => {}
            }
        }
        // Host assignments already dirtied member relations in `set`.
        if let Some(writer) = writer {
            for &other in &graph.member_of[id] {
                if other != writer && pass.targets(&self.relations, other).contains(&id) {
                    self.relations[other].dirty = true;
                }
            }
        }

        let notified = self.monitors.notify(name, &value, &mut self.pending);
        if notified > 0 {
            trace!(cell = %name, callbacks = notified, "monitors notified");
        }
    }
}
