//! Dependency graph construction.
//!
//! Nodes are cells and relations. A computed cell depends on the cells its
//! expression reads. Relation edges depend on which term each relation solves
//! in the current update: the relation waits for the cells its guard and that
//! term read (other than the term's own targets), and the targets wait for the
//! relation. [`Graph::build`] records the static reads once; [`Graph::schedule`]
//! sorts the nodes with Kahn's algorithm for one set of chosen terms. Cycles
//! that still pass through a relation (a term reading a cell computed from its
//! own target) are broken by scheduling the earliest declared relation on the
//! cycle first. Cycles made only of cells are errors.

use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap, HashMap};

use adam_engine::engine::{Expression, Name, extract_dependencies};
use tracing::debug;

use super::cell::{Cell, CellKind, LinePosition};
use super::relation::Relation;
use crate::error::{AdamError, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) enum Node {
    Cell(usize),
    Relation(usize),
}

#[derive(Debug, Default)]
pub(crate) struct Graph {
    /// Per cell: non-constant cells its expression reads.
    pub reads: Vec<Vec<usize>>,
    /// Per cell: computed cells and relations that read it.
    pub dependents: Vec<Vec<Node>>,
    /// Per relation: non-constant cells its guard reads.
    pub guard_reads: Vec<Vec<usize>>,
    /// Per relation, per term: non-constant cells the term expression reads.
    pub term_reads: Vec<Vec<Vec<usize>>>,
    /// Per cell: relations it is a member of.
    pub member_of: Vec<Vec<usize>>,
    /// Per cell: storage cells whose values flow into it, by declaration order.
    pub contributing: Vec<Vec<usize>>,
    /// Per relation: size of the union of the contributing sets of the
    /// non-member cells it reads.
    pub relation_priority: Vec<usize>,
}

impl Graph {
    /// Build the graph for the given declarations.
    pub fn build(
        cells: &[Cell],
        relations: &[Relation],
        index: &HashMap<Name, usize>,
    ) -> Result<Graph> {
        let mut graph = Graph {
            reads: vec![Vec::new(); cells.len()],
            dependents: vec![Vec::new(); cells.len()],
            member_of: vec![Vec::new(); cells.len()],
            ..Graph::default()
        };

        for (id, cell) in cells.iter().enumerate() {
            if !cell.kind.is_computed() {
                continue;
            }
            let Some(expression) = &cell.expression else {
                continue;
            };
            let referenced_by = format!("{} '{}'", cell.kind, cell.name);
            graph.reads[id] = cell_reads(
                cells,
                index,
                expression,
                &referenced_by,
                &cell.expression_position,
            )?;
            for &dep in &graph.reads[id] {
                graph.dependents[dep].push(Node::Cell(id));
            }
        }

        for (r, relation) in relations.iter().enumerate() {
            let referenced_by = relation.label(|id| cells[id].name);
            let read = |expression: &Expression| {
                cell_reads(cells, index, expression, &referenced_by, &relation.position)
            };
            let guard_reads = match &relation.guard {
                Some(guard) => read(guard)?,
                None => Vec::new(),
            };
            let mut term_reads = Vec::with_capacity(relation.terms.len());
            for term in &relation.terms {
                term_reads.push(read(&term.expression)?);
            }

            let all: BTreeSet<usize> = guard_reads
                .iter()
                .chain(term_reads.iter().flatten())
                .copied()
                .collect();
            for &dep in &all {
                graph.dependents[dep].push(Node::Relation(r));
            }
            for &member in &relation.members {
                graph.member_of[member].push(r);
            }
            graph.guard_reads.push(guard_reads);
            graph.term_reads.push(term_reads);
        }

        graph.compute_contributing(cells);
        graph.relation_priority = relations
            .iter()
            .enumerate()
            .map(|(r, relation)| {
                graph.guard_reads[r]
                    .iter()
                    .chain(graph.term_reads[r].iter().flatten())
                    .filter(|&&dep| !relation.contains(dep))
                    .flat_map(|&dep| graph.contributing[dep].iter().copied())
                    .collect::<BTreeSet<_>>()
                    .len()
            })
            .collect();

        debug!(
            cells = cells.len(),
            relations = relations.len(),
            "dependency graph built"
        );
        Ok(graph)
    }

    fn compute_contributing(&mut self, cells: &[Cell]) {
        let mut memo: Vec<Option<BTreeSet<usize>>> = vec![None; cells.len()];
        let mut visiting = vec![false; cells.len()];
        for id in 0..cells.len() {
            contributing_dfs(id, cells, &self.reads, &mut memo, &mut visiting);
        }
        self.contributing = memo
            .into_iter()
            .map(|set| set.map(|s| s.into_iter().collect()).unwrap_or_default())
            .collect();
    }

    /// Cells relation `r` waits for when it solves term `unknown`: those read
    /// by its guard and by that term, minus the term's own targets.
    pub fn solve_reads(&self, relation: &Relation, r: usize, unknown: usize) -> Vec<usize> {
        let targets = &relation.terms[unknown].targets;
        self.guard_reads[r]
            .iter()
            .chain(&self.term_reads[r][unknown])
            .copied()
            .filter(|dep| !targets.contains(dep))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Nodes a node waits for before it can be evaluated.
    fn dependencies_of(
        &self,
        node: Node,
        cells: &[Cell],
        relations: &[Relation],
        unknowns: &[usize],
        solve_reads: &[Vec<usize>],
    ) -> Vec<Node> {
        match node {
            Node::Cell(id) if cells[id].kind.is_computed() => {
                self.reads[id].iter().map(|&dep| Node::Cell(dep)).collect()
            }
            Node::Cell(id) => self.member_of[id]
                .iter()
                .filter(|&&r| relations[r].terms[unknowns[r]].targets.contains(&id))
                .map(|&r| Node::Relation(r))
                .collect(),
            Node::Relation(r) => solve_reads[r].iter().map(|&dep| Node::Cell(dep)).collect(),
        }
    }

    /// Evaluation order for one update, given the term each relation solves
    /// (`unknowns`) and the cells each relation waits for (`solve_reads`).
    pub fn schedule(
        &self,
        cells: &[Cell],
        relations: &[Relation],
        unknowns: &[usize],
        solve_reads: &[Vec<usize>],
    ) -> Result<Vec<Node>> {
        let total = cells.len() + relations.len();
        let slot = |node: Node| match node {
            Node::Cell(id) => id,
            Node::Relation(r) => cells.len() + r,
        };
        let node_at = |slot: usize| {
            if slot < cells.len() {
                Node::Cell(slot)
            } else {
                Node::Relation(slot - cells.len())
            }
        };
        // Ready nodes are taken by (relation priority, declaration order);
        // cells rank as priority 0.
        let key = |node: Node| match node {
            Node::Cell(id) => (0, cells[id].sequence, slot(node)),
            Node::Relation(r) => (self.relation_priority[r], relations[r].sequence, slot(node)),
        };

        let mut deps: Vec<Vec<Node>> = Vec::with_capacity(total);
        let mut successors: Vec<Vec<Node>> = vec![Vec::new(); total];
        for s in 0..total {
            let node = node_at(s);
            let node_deps = self.dependencies_of(node, cells, relations, unknowns, solve_reads);
            for &dep in &node_deps {
                successors[slot(dep)].push(node);
            }
            deps.push(node_deps);
        }
        let mut in_degree: Vec<usize> = deps.iter().map(Vec::len).collect();
        let mut scheduled = vec![false; total];
        let mut ready = BinaryHeap::new();
        for s in 0..total {
            if in_degree[s] == 0 {
                scheduled[s] = true;
                ready.push(Reverse(key(node_at(s))));
            }
        }

        let mut order = Vec::with_capacity(total);
        while order.len() < total {
            if let Some(Reverse((_, _, s))) = ready.pop() {
                let node = node_at(s);
                order.push(node);
                for &next in &successors[s] {
                    let n = slot(next);
                    in_degree[n] -= 1;
                    if in_degree[n] == 0 && !scheduled[n] {
                        scheduled[n] = true;
                        ready.push(Reverse(key(next)));
                    }
                }
                continue;
            }

            let cycle = find_cycle(&deps, &scheduled, slot, node_at, |s| key(node_at(s)).1);
            let breaker = cycle
                .iter()
                .filter_map(|&node| match node {
                    Node::Relation(r) => Some(r),
                    Node::Cell(_) => None,
                })
                .min_by_key(|&r| relations[r].sequence);
            match breaker {
                Some(r) => {
                    debug!(
                        relation = %relations[r].position,
                        "breaking dependency cycle at relation"
                    );
                    let s = slot(Node::Relation(r));
                    scheduled[s] = true;
                    ready.push(Reverse(key(Node::Relation(r))));
                }
                None => {
                    let mut members: Vec<usize> = cycle
                        .into_iter()
                        .filter_map(|node| match node {
                            Node::Cell(id) => Some(id),
                            Node::Relation(_) => None,
                        })
                        .collect();
                    members.sort_by_key(|&id| cells[id].sequence);
                    return Err(AdamError::CircularDependency {
                        cells: members.into_iter().map(|id| cells[id].name).collect(),
                    });
                }
            }
        }
        Ok(order)
    }
}

fn resolve(
    index: &HashMap<Name, usize>,
    name: Name,
    referenced_by: &str,
    position: &LinePosition,
) -> Result<usize> {
    index
        .get(&name)
        .copied()
        .ok_or_else(|| AdamError::UnknownCellReference {
            name,
            referenced_by: referenced_by.to_string(),
            position: position.clone(),
        })
}

/// Non-constant cells `expression` reads, each once, in first-read order.
fn cell_reads(
    cells: &[Cell],
    index: &HashMap<Name, usize>,
    expression: &Expression,
    referenced_by: &str,
    position: &LinePosition,
) -> Result<Vec<usize>> {
    let mut reads = Vec::new();
    for name in extract_dependencies(expression) {
        let dep = resolve(index, name, referenced_by, position)?;
        if cells[dep].kind != CellKind::Constant && !reads.contains(&dep) {
            reads.push(dep);
        }
    }
    Ok(reads)
}

fn contributing_dfs(
    id: usize,
    cells: &[Cell],
    reads: &[Vec<usize>],
    memo: &mut [Option<BTreeSet<usize>>],
    visiting: &mut [bool],
) -> BTreeSet<usize> {
    if let Some(set) = &memo[id] {
        return set.clone();
    }
    // Cell-only cycles are reported by the sort.
    if visiting[id] {
        return BTreeSet::new();
    }
    let kind = cells[id].kind;
    let set = if kind.is_storage() && !kind.is_computed() {
        BTreeSet::from([id])
    } else if kind.is_computed() {
        visiting[id] = true;
        let mut set = BTreeSet::new();
        for &dep in &reads[id] {
            set.extend(contributing_dfs(dep, cells, reads, memo, visiting));
        }
        visiting[id] = false;
        set
    } else {
        BTreeSet::new()
    };
    memo[id] = Some(set.clone());
    set
}

/// Walk unscheduled dependencies from the earliest declared stuck node until
/// a node repeats. Every unscheduled node still waits on another unscheduled
/// node, so the walk always closes a cycle.
fn find_cycle(
    deps: &[Vec<Node>],
    scheduled: &[bool],
    slot: impl Fn(Node) -> usize,
    node_at: impl Fn(usize) -> Node,
    sequence: impl Fn(usize) -> usize,
) -> Vec<Node> {
    let mut current = (0..deps.len())
        .filter(|&s| !scheduled[s])
        .min_by_key(|&s| sequence(s));
    let mut path: Vec<usize> = Vec::new();
    while let Some(s) = current {
        if let Some(start) = path.iter().position(|&p| p == s) {
            return path[start..].iter().map(|&p| node_at(p)).collect();
        }
        path.push(s);
        current = deps[s]
            .iter()
            .map(|&dep| slot(dep))
            .filter(|&d| !scheduled[d])
            .min_by_key(|&d| sequence(d));
    }
    path.into_iter().map(node_at).collect()
}
