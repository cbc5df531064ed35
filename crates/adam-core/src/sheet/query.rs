use adam_engine::engine::{Expression, Name, Value, compile, extract_dependencies};

use super::cell::{Cell, CellKind, CellState};
use super::monitor::{MonitorId, Pending};
use super::relation::Relation;
use super::Sheet;
use crate::error::Result;

impl Sheet {
    pub fn get(&self, name: impl Into<Name>) -> Result<Value> {
        self.cell_value(name).cloned()
    }

    pub fn cell_value(&self, name: impl Into<Name>) -> Result<&Value> {
        let id = self.cell_id(name.into())?;
        Ok(&self.cells[id].value)
    }

    pub fn cell(&self, name: impl Into<Name>) -> Result<&Cell> {
        let id = self.cell_id(name.into())?;
        Ok(&self.cells[id])
    }

    /// Cells in declaration order.
    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn relations(&self) -> &[Relation] {
        &self.relations
    }

    pub fn names(&self) -> Vec<Name> {
        self.cells.iter().map(|cell| cell.name).collect()
    }

    pub fn kind(&self, name: impl Into<Name>) -> Result<CellKind> {
        Ok(self.cell(name)?.kind)
    }

    pub fn state(&self, name: impl Into<Name>) -> Result<CellState> {
        Ok(self.cell(name)?.state)
    }

    /// Size of the cell's contributing set. Zero until the sheet is built.
    pub fn priority(&self, name: impl Into<Name>) -> Result<usize> {
        Ok(self.cell(name)?.priority)
    }

    /// Input, interface and external cells whose values flow into `name`,
    /// in declaration order. Empty until the sheet is built.
    pub fn contributing(&self, name: impl Into<Name>) -> Result<Vec<Name>> {
        let id = self.cell_id(name.into())?;
        Ok(self
            .graph
            .as_ref()
            .map(|graph| {
                graph.contributing[id]
                    .iter()
                    .map(|&dep| self.cells[dep].name)
                    .collect()
            })
            .unwrap_or_default())
    }

    /// Non-constant cells the cell's defining expression reads.
    pub fn dependencies(&self, name: impl Into<Name>) -> Result<Vec<Name>> {
        let id = self.cell_id(name.into())?;
        if let Some(graph) = &self.graph {
            return Ok(graph.reads[id].iter().map(|&dep| self.cells[dep].name).collect());
        }
        let cell = &self.cells[id];
        let Some(expression) = cell.expression.as_ref().filter(|_| cell.kind.is_computed()) else {
            return Ok(Vec::new());
        };
        Ok(extract_dependencies(expression)
            .into_iter()
            .filter(|dep| {
                self.index
                    .get(dep)
                    .is_some_and(|&d| self.cells[d].kind != CellKind::Constant)
            })
            .collect())
    }

    /// Every cell's current value, in declaration order.
    pub fn snapshot(&self) -> Vec<(Name, Value)> {
        self.cells
            .iter()
            .map(|cell| (cell.name, cell.value.clone()))
            .collect()
    }

    /// Evaluate an ad hoc expression against the current cell values.
    pub fn inspect(&self, source: &str) -> Result<Value> {
        let expression = compile(source)?;
        self.inspect_expression(&expression)
    }

    pub fn inspect_expression(&self, expression: &Expression) -> Result<Value> {
        Ok(self.evaluate_expression(expression)?)
    }

    /// Call `callback` with the new value whenever `name` changes during an
    /// update. Registration does not invoke it.
    pub fn monitor_value<F>(&mut self, name: impl Into<Name>, callback: F) -> Result<MonitorId>
    where
        F: FnMut(&Value, &mut Pending) + Send + 'static,
    {
        let name = name.into();
        self.cell_id(name)?;
        Ok(self.monitors.register(name, Box::new(callback)))
    }

    /// Remove a monitor. Returns whether it was registered.
    pub fn unmonitor(&mut self, id: MonitorId) -> bool {
        self.monitors.remove(id)
    }

    /// Number of monitors watching `name`.
    pub fn monitor_count(&self, name: impl Into<Name>) -> usize {
        self.monitors.count(name.into())
    }
}
