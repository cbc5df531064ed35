//! Sheet state and solver (UI-agnostic).
//!
//! A [`Sheet`] owns every cell and relation, the dependency graph built from
//! them, the function table expressions call into and the monitors watching
//! cell values. Hosts declare cells through the builder methods in
//! `build.rs`, then drive it with [`Sheet::set`] and [`Sheet::update`].

mod build;
mod cell;
mod graph;
mod monitor;
mod query;
mod relation;
mod solve;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use adam_engine::engine::{FunctionTable, Name};

use crate::config::SolverConfig;

pub use cell::{Cell, CellKind, CellState, LinePosition};
pub use monitor::{MonitorCallback, MonitorId, Pending};
pub use relation::{RelateTerm, Relation};
pub use solve::{InvariantViolation, UpdateReport};

use graph::Graph;
use monitor::MonitorRegistry;

pub struct Sheet {
    /// Cell arena in declaration order.
    pub(crate) cells: Vec<Cell>,
    pub(crate) index: HashMap<Name, usize>,
    pub(crate) relations: Vec<Relation>,
    /// `None` until built, and again whenever a declaration is added.
    pub(crate) graph: Option<Arc<Graph>>,
    pub(crate) monitors: MonitorRegistry,
    /// Sets queued by monitor callbacks during an update.
    pub(crate) pending: Pending,
    pub(crate) functions: FunctionTable,
    pub(crate) config: SolverConfig,
    /// Cells assigned with `set` since the last successful update, in order.
    pub(crate) set_log: Vec<usize>,
    /// Next declaration sequence number, shared by cells and relations.
    pub(crate) next_sequence: usize,
}

impl Sheet {
    /// Create an empty sheet with the built-in functions registered.
    pub fn new() -> Self {
        Sheet {
            cells: Vec::new(),
            index: HashMap::new(),
            relations: Vec::new(),
            graph: None,
            monitors: MonitorRegistry::default(),
            pending: Pending::default(),
            functions: FunctionTable::with_builtins(),
            config: SolverConfig::default(),
            set_log: Vec::new(),
            next_sequence: 0,
        }
    }

    pub fn with_config(config: SolverConfig) -> Self {
        Sheet {
            config,
            ..Sheet::new()
        }
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: SolverConfig) {
        self.config = config;
    }

    /// Native functions available to every expression in the sheet.
    pub fn functions(&self) -> &FunctionTable {
        &self.functions
    }

    pub fn functions_mut(&mut self) -> &mut FunctionTable {
        &mut self.functions
    }

    /// Whether the dependency graph is current for the declarations.
    pub fn is_built(&self) -> bool {
        self.graph.is_some()
    }
}

impl Default for Sheet {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Sheet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sheet")
            .field("cells", &self.cells.len())
            .field("relations", &self.relations.len())
            .field("built", &self.is_built())
            .field("config", &self.config)
            .finish()
    }
}
