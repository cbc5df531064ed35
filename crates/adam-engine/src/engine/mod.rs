//! Expression engine API.
//!
//! This module provides everything needed to turn expression text into values:
//!
//! - [`Name`] - Interned identifiers
//! - [`Value`] - The dynamically typed value every cell holds
//! - [`compile`] - Parse and compile text into an [`Expression`]
//! - [`evaluate`] - Run an [`Expression`] against a [`ScopeChain`]
//! - [`FunctionTable`] - Native functions callable from expressions
//! - [`extract_dependencies`] - Free variables an expression reads
//! - [`format_value`] - Format values for display

mod ast;
mod bytecode;
mod compile;
mod deps;
mod error;
mod format;
mod functions;
mod lexer;
mod name;
mod parser;
mod value;
mod vm;

pub use ast::{Arguments, BinaryOp, Expr, UnaryOp};
pub use bytecode::{Expression, Op};
pub use compile::{compile, compile_ast};
pub use deps::extract_dependencies;
pub use error::{EvalError, EvalResult, ParseError};
pub use format::{format_number, format_value};
pub use functions::{CallArgs, FunctionTable, NativeFunction};
pub use lexer::{Token, tokenize};
pub use name::Name;
pub use parser::parse_expression;
pub use value::{Array, Dictionary, Value};
pub use vm::{ScopeChain, VariableLookup, evaluate};
