//! adam_engine - Expression values, compiler and bytecode VM for Adam sheets.

pub(crate) mod builtins;
pub mod engine;

pub use builtins::{BUILTINS, Builtin};
