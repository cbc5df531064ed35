//! Built-in expression functions and their metadata.
//!
//! Conventions:
//! - Built-ins are lower case and take positional arguments.
//! - If you add a built-in, list it in `BUILTINS` and register its
//!   implementation in `register_builtins`.

use crate::engine::{CallArgs, EvalError, EvalResult, FunctionTable, Name, Value, format_value};

pub struct Builtin {
    pub name: &'static str,
    pub description: &'static str,
}

pub const BUILTINS: &[Builtin] = &[
    Builtin {
        name: "typeof",
        description: "Name of the argument's type, e.g. @number",
    },
    Builtin {
        name: "min",
        description: "Smallest of one or more numbers (or of a single array)",
    },
    Builtin {
        name: "max",
        description: "Largest of one or more numbers (or of a single array)",
    },
    Builtin {
        name: "abs",
        description: "Absolute value",
    },
    Builtin {
        name: "round",
        description: "Round half away from zero",
    },
    Builtin {
        name: "floor",
        description: "Round toward negative infinity",
    },
    Builtin {
        name: "ceil",
        description: "Round toward positive infinity",
    },
    Builtin {
        name: "sqrt",
        description: "Square root of a non-negative number",
    },
    Builtin {
        name: "pow",
        description: "First argument raised to the second",
    },
    Builtin {
        name: "size",
        description: "Element count of an array, dictionary or string",
    },
    Builtin {
        name: "has_key",
        description: "Whether a dictionary contains a key",
    },
    Builtin {
        name: "join",
        description: "Concatenate array elements with a separator",
    },
];

fn invalid_arg(function: &str, message: impl Into<String>) -> EvalError {
    EvalError::InvalidArgument {
        function: Name::new(function),
        message: message.into(),
    }
}

fn exact<'a>(function: &str, args: &'a CallArgs, count: usize) -> EvalResult<&'a [Value]> {
    let values = args.positional(Name::new(function))?;
    if values.len() != count {
        return Err(invalid_arg(
            function,
            format!("expects {} argument(s), got {}", count, values.len()),
        ));
    }
    Ok(values)
}

fn number(function: &str, value: &Value) -> EvalResult<f64> {
    value
        .as_number()
        .ok_or_else(|| {
            invalid_arg(
                function,
                format!("expects a number, got {}", value.type_name()),
            )
        })
}

fn unary_math(table: &mut FunctionTable, name: &'static str, f: fn(f64) -> f64) {
    table.register(name, move |args| {
        let values = exact(name, args, 1)?;
        Ok(Value::Number(f(number(name, &values[0])?)))
    });
}

/// Numbers to compare for `min`/`max`: either the arguments themselves or the
/// elements of a single array argument.
fn extremum_operands<'a>(function: &str, args: &'a CallArgs) -> EvalResult<Vec<f64>> {
    let values = args.positional(Name::new(function))?;
    let items: &'a [Value] = match values {
        [Value::Array(items)] => items.as_slice(),
        _ => values,
    };
    if items.is_empty() {
        return Err(invalid_arg(function, "expects at least one number"));
    }
    items.iter().map(|v| number(function, v)).collect()
}

/// Register all built-in functions.
pub fn register_builtins(table: &mut FunctionTable) {
    table.register("typeof", |args| {
        let values = exact("typeof", args, 1)?;
        Ok(Value::Name(Name::new(values[0].type_name())))
    });

    table.register("min", |args| {
        let numbers = extremum_operands("min", args)?;
        Ok(Value::Number(numbers.into_iter().fold(f64::INFINITY, f64::min)))
    });

    table.register("max", |args| {
        let numbers = extremum_operands("max", args)?;
        Ok(Value::Number(numbers.into_iter().fold(f64::NEG_INFINITY, f64::max)))
    });

    unary_math(table, "abs", f64::abs);
    unary_math(table, "round", f64::round);
    unary_math(table, "floor", f64::floor);
    unary_math(table, "ceil", f64::ceil);

    table.register("sqrt", |args| {
        let values = exact("sqrt", args, 1)?;
        let n = number("sqrt", &values[0])?;
        if n < 0.0 {
            return Err(invalid_arg("sqrt", "argument must be non-negative"));
        }
        Ok(Value::Number(n.sqrt()))
    });

    table.register("pow", |args| {
        let values = exact("pow", args, 2)?;
        let base = number("pow", &values[0])?;
        let exponent = number("pow", &values[1])?;
        Ok(Value::Number(base.powf(exponent)))
    });

    table.register("size", |args| {
        let values = exact("size", args, 1)?;
        let size = match &values[0] {
            Value::Array(items) => items.len(),
            Value::Dictionary(entries) => entries.len(),
            Value::String(s) => s.chars().count(),
            other => {
                return Err(invalid_arg(
                    "size",
                    format!("expects an array, dictionary or string, got {}", other.type_name()),
                ));
            }
        };
        Ok(Value::Number(size as f64))
    });

    table.register("has_key", |args| {
        let values = exact("has_key", args, 2)?;
        let Value::Dictionary(entries) = &values[0] else {
            return Err(invalid_arg("has_key", "first argument must be a dictionary"));
        };
        let key = match &values[1] {
            Value::Name(n) => *n,
            Value::String(s) => Name::new(s),
            _ => return Err(invalid_arg("has_key", "key must be a name or string")),
        };
        Ok(Value::Bool(entries.contains_key(&key)))
    });

    table.register("join", |args| {
        let values = exact("join", args, 2)?;
        let Value::Array(items) = &values[0] else {
            return Err(invalid_arg("join", "first argument must be an array"));
        };
        let Some(separator) = values[1].as_str() else {
            return Err(invalid_arg("join", "separator must be a string"));
        };
        let parts: Vec<String> = items
            .iter()
            .map(|item| match item {
                Value::String(s) => s.to_string(),
                other => format_value(other),
            })
            .collect();
        Ok(Value::from(parts.join(separator)))
    });
}
