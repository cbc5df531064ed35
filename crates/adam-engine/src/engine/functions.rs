//! Native function registry.
//!
//! Host code registers Rust closures by name; the VM resolves every call
//! instruction against this table. Built-ins are registered through the same
//! path (see [`crate::builtins::register_builtins`]).

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use super::error::{EvalError, EvalResult};
use super::name::Name;
use super::value::Value;

/// Arguments passed to a native function.
#[derive(Clone, Debug, PartialEq)]
pub enum CallArgs {
    Positional(Vec<Value>),
    Named(BTreeMap<Name, Value>),
}

impl CallArgs {
    /// Positional arguments, or an error naming `function` for a named call.
    pub fn positional(&self, function: Name) -> EvalResult<&[Value]> {
        match self {
            CallArgs::Positional(args) => Ok(args),
            CallArgs::Named(_) => Err(EvalError::InvalidArgument {
                function,
                message: "expects positional arguments".to_string(),
            }),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            CallArgs::Positional(args) => args.len(),
            CallArgs::Named(args) => args.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub type NativeFunction = Arc<dyn Fn(&CallArgs) -> EvalResult<Value> + Send + Sync>;

/// Name to native function table.
#[derive(Clone, Default)]
pub struct FunctionTable {
    functions: HashMap<Name, NativeFunction>,
}

impl FunctionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// A table with every built-in function registered.
    pub fn with_builtins() -> Self {
        let mut table = Self::new();
        crate::builtins::register_builtins(&mut table);
        table
    }

    /// Register (or replace) a function.
    pub fn register<F>(&mut self, name: &str, function: F)
    where
        F: Fn(&CallArgs) -> EvalResult<Value> + Send + Sync + 'static,
    {
        self.functions.insert(Name::new(name), Arc::new(function));
    }

    pub fn unregister(&mut self, name: &str) -> bool {
        self.functions.remove(&Name::new(name)).is_some()
    }

    pub fn contains(&self, name: Name) -> bool {
        self.functions.contains_key(&name)
    }

    pub fn call(&self, name: Name, args: &CallArgs) -> EvalResult<Value> {
        let function = self
            .functions
            .get(&name)
            .ok_or(EvalError::UnknownFunction(name))?;
        tracing::trace!(function = %name, argc = args.len(), "native call");
        function(args)
    }
}

impl fmt::Debug for FunctionTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.functions.keys().map(|n| n.as_str()).collect();
        names.sort_unstable();
        f.debug_struct("FunctionTable").field("functions", &names).finish()
    }
}
