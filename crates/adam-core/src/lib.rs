//! adam-core - Property-model sheet: cells, relations, solver and loader.

pub mod config;
pub mod error;
pub mod sheet;
pub mod storage;

pub use config::SolverConfig;
pub use error::{AdamError, Result};
pub use sheet::{
    Cell, CellKind, CellState, InvariantViolation, LinePosition, MonitorId, Pending, RelateTerm,
    Relation, Sheet, UpdateReport,
};

pub use adam_engine::engine::{Expression, Name, Value, compile};
