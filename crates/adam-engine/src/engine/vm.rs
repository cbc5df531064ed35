//! Stack-based bytecode interpreter.
//!
//! Evaluation is synchronous and self-contained: each call to [`evaluate`]
//! owns its stack, borrows the scope chain and function table for the
//! duration of the call, and either produces one value or an error.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use super::ast::{BinaryOp, UnaryOp};
use super::bytecode::{Expression, Op};
use super::error::{EvalError, EvalResult};
use super::format::format_number;
use super::functions::{CallArgs, FunctionTable};
use super::name::Name;
use super::value::Value;

/// A source of variable values consulted by `Load` instructions.
pub trait VariableLookup {
    fn lookup(&self, name: Name) -> Option<Value>;
}

impl<F> VariableLookup for F
where
    F: Fn(Name) -> Option<Value>,
{
    fn lookup(&self, name: Name) -> Option<Value> {
        self(name)
    }
}

impl VariableLookup for HashMap<Name, Value> {
    fn lookup(&self, name: Name) -> Option<Value> {
        self.get(&name).cloned()
    }
}

impl VariableLookup for BTreeMap<Name, Value> {
    fn lookup(&self, name: Name) -> Option<Value> {
        self.get(&name).cloned()
    }
}

/// Ordered list of lookups; the first frame that knows a name wins.
#[derive(Default)]
pub struct ScopeChain<'a> {
    frames: Vec<&'a dyn VariableLookup>,
}

impl<'a> ScopeChain<'a> {
    pub fn new() -> Self {
        ScopeChain { frames: Vec::new() }
    }

    /// Append a frame behind the existing ones (add innermost first).
    pub fn with(mut self, frame: &'a dyn VariableLookup) -> Self {
        self.frames.push(frame);
        self
    }

    /// Insert a frame in front of the existing ones.
    pub fn push_inner(&mut self, frame: &'a dyn VariableLookup) {
        self.frames.insert(0, frame);
    }

    pub fn resolve(&self, name: Name) -> Option<Value> {
        self.frames.iter().find_map(|frame| frame.lookup(name))
    }
}

/// Execute `expression` and return the single value it leaves on the stack.
pub fn evaluate(
    expression: &Expression,
    scope: &ScopeChain<'_>,
    functions: &FunctionTable,
) -> EvalResult<Value> {
    let ops = expression.ops();
    let mut stack: Vec<Value> = Vec::with_capacity(8);
    let mut pc = 0;

    while pc < ops.len() {
        let op = &ops[pc];
        pc += 1;
        match op {
            Op::Push(value) => stack.push(value.clone()),
            Op::Load(name) => {
                let value = scope
                    .resolve(*name)
                    .ok_or(EvalError::UndefinedVariable(*name))?;
                stack.push(value);
            }
            Op::Unary(op) => {
                let operand = pop(&mut stack)?;
                stack.push(apply_unary(*op, &operand)?);
            }
            Op::Binary(op) => {
                let right = pop(&mut stack)?;
                let left = pop(&mut stack)?;
                stack.push(apply_binary(*op, &left, &right)?);
            }
            Op::Index => {
                let index = pop(&mut stack)?;
                let target = pop(&mut stack)?;
                stack.push(index_value(&target, &index)?);
            }
            Op::Member(name) => {
                let target = pop(&mut stack)?;
                stack.push(member_value(&target, *name)?);
            }
            Op::MakeArray(count) => {
                let items = pop_n(&mut stack, *count)?;
                stack.push(Value::array(items));
            }
            Op::MakeDictionary(keys) => {
                let values = pop_n(&mut stack, keys.len())?;
                stack.push(Value::dictionary(keys.iter().copied().zip(values)));
            }
            Op::Call { function, argc } => {
                let args = CallArgs::Positional(pop_n(&mut stack, *argc)?);
                stack.push(functions.call(*function, &args)?);
            }
            Op::CallNamed { function, keys } => {
                let values = pop_n(&mut stack, keys.len())?;
                let args = CallArgs::Named(keys.iter().copied().zip(values).collect());
                stack.push(functions.call(*function, &args)?);
            }
            Op::JumpIfFalseOrPop(target) => {
                if condition(peek(&stack)?, "&&")? {
                    stack.pop();
                } else {
                    pc = jump(*target, ops.len())?;
                }
            }
            Op::JumpIfTrueOrPop(target) => {
                if condition(peek(&stack)?, "||")? {
                    pc = jump(*target, ops.len())?;
                } else {
                    stack.pop();
                }
            }
            Op::JumpUnless(target) => {
                let value = pop(&mut stack)?;
                if !condition(&value, "?:")? {
                    pc = jump(*target, ops.len())?;
                }
            }
            Op::Jump(target) => pc = jump(*target, ops.len())?,
        }
    }

    let result = pop(&mut stack)?;
    if !stack.is_empty() {
        return Err(EvalError::MalformedBytecode(format!(
            "{} values left on the stack",
            stack.len()
        )));
    }
    Ok(result)
}

fn pop(stack: &mut Vec<Value>) -> EvalResult<Value> {
    stack
        .pop()
        .ok_or_else(|| EvalError::MalformedBytecode("stack underflow".to_string()))
}

fn peek(stack: &[Value]) -> EvalResult<&Value> {
    stack
        .last()
        .ok_or_else(|| EvalError::MalformedBytecode("stack underflow".to_string()))
}

fn pop_n(stack: &mut Vec<Value>, count: usize) -> EvalResult<Vec<Value>> {
    if stack.len() < count {
        return Err(EvalError::MalformedBytecode("stack underflow".to_string()));
    }
    Ok(stack.split_off(stack.len() - count))
}

fn jump(target: usize, len: usize) -> EvalResult<usize> {
    if target > len {
        return Err(EvalError::MalformedBytecode(format!(
            "jump to {} past end {}",
            target, len
        )));
    }
    Ok(target)
}

fn condition(value: &Value, operator: &str) -> EvalResult<bool> {
    value.as_bool().ok_or_else(|| {
        EvalError::mismatch(format!(
            "condition of '{}' must be bool, found {}",
            operator,
            value.type_name()
        ))
    })
}

fn integral(value: &Value, operator: &str) -> EvalResult<i64> {
    value.as_integer().ok_or_else(|| {
        EvalError::mismatch(format!(
            "operands of '{}' must be integral numbers, found {}",
            operator,
            describe(value)
        ))
    })
}

fn describe(value: &Value) -> String {
    match value {
        Value::Number(n) => format!("number {}", format_number(*n)),
        other => other.type_name().to_string(),
    }
}

pub(crate) fn apply_unary(op: UnaryOp, operand: &Value) -> EvalResult<Value> {
    match (op, operand) {
        (UnaryOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
        (UnaryOp::Negate, Value::Number(n)) => Ok(Value::Number(-n)),
        (UnaryOp::Plus, Value::Number(n)) => Ok(Value::Number(*n)),
        (UnaryOp::BitNot, value) => Ok(Value::Number(!integral(value, "~")? as f64)),
        (op, value) => {
            let symbol = match op {
                UnaryOp::Not => "!",
                UnaryOp::Negate => "-",
                UnaryOp::Plus => "+",
                UnaryOp::BitNot => "~",
            };
            Err(EvalError::mismatch(format!(
                "cannot apply unary '{}' to {}",
                symbol,
                value.type_name()
            )))
        }
    }
}

pub(crate) fn apply_binary(op: BinaryOp, left: &Value, right: &Value) -> EvalResult<Value> {
    use Value::*;

    let result = match (op, left, right) {
        (BinaryOp::Equal, l, r) => Bool(l == r),
        (BinaryOp::NotEqual, l, r) => Bool(l != r),

        (BinaryOp::Add, Number(l), Number(r)) => Number(l + r),
        (BinaryOp::Add, String(l), String(r)) => {
            let mut joined = l.to_string();
            joined.push_str(r);
            Value::from(joined)
        }
        (BinaryOp::Add, Array(l), Array(r)) => {
            let mut items = Vec::with_capacity(l.len() + r.len());
            items.extend(l.iter().cloned());
            items.extend(r.iter().cloned());
            Value::array(items)
        }
        (BinaryOp::Add, Dictionary(l), Dictionary(r)) => {
            let mut merged = (**l).clone();
            merged.extend(r.iter().map(|(k, v)| (*k, v.clone())));
            Dictionary(Arc::new(merged))
        }
        (BinaryOp::Sub, Number(l), Number(r)) => Number(l - r),
        (BinaryOp::Mul, Number(l), Number(r)) => Number(l * r),
        (BinaryOp::Div, Number(l), Number(r)) => Number(l / r),
        (BinaryOp::Mod, Number(l), Number(r)) => Number(l % r),

        (BinaryOp::Less, Number(l), Number(r)) => Bool(l < r),
        (BinaryOp::LessEqual, Number(l), Number(r)) => Bool(l <= r),
        (BinaryOp::Greater, Number(l), Number(r)) => Bool(l > r),
        (BinaryOp::GreaterEqual, Number(l), Number(r)) => Bool(l >= r),
        (BinaryOp::Less, String(l), String(r)) => Bool(l < r),
        (BinaryOp::LessEqual, String(l), String(r)) => Bool(l <= r),
        (BinaryOp::Greater, String(l), String(r)) => Bool(l > r),
        (BinaryOp::GreaterEqual, String(l), String(r)) => Bool(l >= r),

        (BinaryOp::BitAnd | BinaryOp::BitOr | BinaryOp::BitXor, l, r) => {
            let symbol = op.symbol();
            let (l, r) = (integral(l, symbol)?, integral(r, symbol)?);
            let bits = match op {
                BinaryOp::BitAnd => l & r,
                BinaryOp::BitOr => l | r,
                _ => l ^ r,
            };
            Number(bits as f64)
        }
        (BinaryOp::ShiftLeft | BinaryOp::ShiftRight, l, r) => {
            let symbol = op.symbol();
            let (l, r) = (integral(l, symbol)?, integral(r, symbol)?);
            let count = u32::try_from(r)
                .ok()
                .filter(|c| *c < 64)
                .ok_or_else(|| {
                    EvalError::mismatch(format!("shift count {} out of range 0..64", r))
                })?;
            let bits = if op == BinaryOp::ShiftLeft {
                l << count
            } else {
                l >> count
            };
            Number(bits as f64)
        }

        (op, l, r) => {
            return Err(EvalError::mismatch(format!(
                "cannot apply '{}' to {} and {}",
                op.symbol(),
                l.type_name(),
                r.type_name()
            )));
        }
    };
    Ok(result)
}

pub(crate) fn index_value(target: &Value, index: &Value) -> EvalResult<Value> {
    match (target, index) {
        (Value::Array(items), Value::Number(n)) => {
            let position = checked_position(*n, items.len(), "array")?;
            Ok(items[position].clone())
        }
        (Value::String(text), Value::Number(n)) => {
            let count = text.chars().count();
            let position = checked_position(*n, count, "string")?;
            let ch: String = text.chars().skip(position).take(1).collect();
            Ok(Value::from(ch))
        }
        (Value::Dictionary(_), Value::Name(key)) => member_value(target, *key),
        (Value::Dictionary(_), Value::String(key)) => member_value(target, Name::new(key)),
        (target, index) => Err(EvalError::mismatch(format!(
            "cannot index {} with {}",
            target.type_name(),
            index.type_name()
        ))),
    }
}

fn checked_position(n: f64, len: usize, kind: &str) -> EvalResult<usize> {
    if n != n.trunc() || !n.is_finite() {
        return Err(EvalError::mismatch(format!(
            "{} index must be integral, found {}",
            kind,
            format_number(n)
        )));
    }
    if n < 0.0 || n >= len as f64 {
        return Err(EvalError::IndexOutOfRange {
            index: format_number(n),
            target: format!("{} of length {}", kind, len),
        });
    }
    Ok(n as usize)
}

pub(crate) fn member_value(target: &Value, member: Name) -> EvalResult<Value> {
    match target {
        Value::Dictionary(entries) => {
            entries
                .get(&member)
                .cloned()
                .ok_or_else(|| EvalError::IndexOutOfRange {
                    index: member.to_string(),
                    target: "dictionary".to_string(),
                })
        }
        other => Err(EvalError::mismatch(format!(
            "cannot read member '{}' of {}",
            member,
            other.type_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::compile;
    use std::cell::Cell;

    fn eval(source: &str) -> EvalResult<Value> {
        let expr = compile(source).unwrap();
        evaluate(&expr, &ScopeChain::new(), &FunctionTable::with_builtins())
    }

    fn eval_with(source: &str, vars: &HashMap<Name, Value>) -> EvalResult<Value> {
        let expr = compile(source).unwrap();
        evaluate(
            &expr,
            &ScopeChain::new().with(vars),
            &FunctionTable::with_builtins(),
        )
    }

    fn vars(entries: &[(&str, Value)]) -> HashMap<Name, Value> {
        entries
            .iter()
            .map(|(k, v)| (Name::new(k), v.clone()))
            .collect()
    }

    #[test]
    fn test_arithmetic_with_variables() {
        let scope = vars(&[("a", Value::from(5)), ("b", Value::from(2))]);
        assert_eq!(eval_with("a + b * 3", &scope), Ok(Value::from(11)));
        assert_eq!(eval_with("a / b", &scope), Ok(Value::from(2.5)));
        assert_eq!(eval_with("a % b", &scope), Ok(Value::from(1)));
        assert_eq!(eval_with("-a", &scope), Ok(Value::from(-5)));
    }

    #[test]
    fn test_division_by_zero_is_ieee() {
        let scope = vars(&[("zero", Value::from(0))]);
        assert_eq!(eval_with("1 / zero", &scope), Ok(Value::Number(f64::INFINITY)));
    }

    #[test]
    fn test_undefined_variable() {
        assert_eq!(
            eval_with("missing + 1", &HashMap::new()),
            Err(EvalError::UndefinedVariable(Name::new("missing")))
        );
    }

    #[test]
    fn test_scope_chain_innermost_first() {
        let inner = vars(&[("x", Value::from(1))]);
        let outer = vars(&[("x", Value::from(2)), ("y", Value::from(3))]);
        let expr = compile("x * 10 + y").unwrap();
        let scope = ScopeChain::new().with(&inner).with(&outer);
        assert_eq!(
            evaluate(&expr, &scope, &FunctionTable::new()),
            Ok(Value::from(13))
        );
    }

    #[test]
    fn test_closure_lookup() {
        let lookup = |name: Name| (name.as_str() == "answer").then(|| Value::from(42));
        let expr = compile("answer").unwrap();
        let scope = ScopeChain::new().with(&lookup);
        assert_eq!(evaluate(&expr, &scope, &FunctionTable::new()), Ok(Value::from(42)));
    }

    #[test]
    fn test_short_circuit_skips_right_operand() {
        let calls = Cell::new(0);
        let lookup = |name: Name| {
            calls.set(calls.get() + 1);
            match name.as_str() {
                "f" => Some(Value::from(false)),
                "t" => Some(Value::from(true)),
                _ => None,
            }
        };
        let scope = ScopeChain::new().with(&lookup);
        let functions = FunctionTable::new();

        let and = compile("f && never_defined").unwrap();
        assert_eq!(evaluate(&and, &scope, &functions), Ok(Value::from(false)));
        let or = compile("t || never_defined").unwrap();
        assert_eq!(evaluate(&or, &scope, &functions), Ok(Value::from(true)));
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn test_logical_requires_bool() {
        let scope = vars(&[("n", Value::from(1))]);
        assert!(matches!(
            eval_with("n && true", &scope),
            Err(EvalError::TypeMismatch(_))
        ));
        assert!(matches!(
            eval_with("n ? 1 : 2", &scope),
            Err(EvalError::TypeMismatch(_))
        ));
    }

    #[test]
    fn test_conditional() {
        let scope = vars(&[("wide", Value::from(true))]);
        assert_eq!(eval_with("wide ? 'w' : 'n'", &scope), Ok(Value::from("w")));
    }

    #[test]
    fn test_comparisons() {
        assert_eq!(eval("2 <= 2"), Ok(Value::from(true)));
        assert_eq!(eval("'abc' < 'abd'"), Ok(Value::from(true)));
        assert_eq!(eval("[1, [2]] == [1, [2]]"), Ok(Value::from(true)));
        assert_eq!(eval("@a != @b"), Ok(Value::from(true)));
        assert!(matches!(eval("1 < 'a'"), Err(EvalError::TypeMismatch(_))));
    }

    #[test]
    fn test_bitwise() {
        assert_eq!(eval("6 & 3"), Ok(Value::from(2)));
        assert_eq!(eval("6 | 3"), Ok(Value::from(7)));
        assert_eq!(eval("6 ^ 3"), Ok(Value::from(5)));
        assert_eq!(eval("~0"), Ok(Value::from(-1)));
        assert_eq!(eval("1 << 4"), Ok(Value::from(16)));
        assert_eq!(eval("-16 >> 2"), Ok(Value::from(-4)));
        assert!(matches!(eval("1.5 & 1"), Err(EvalError::TypeMismatch(_))));
        assert!(matches!(eval("1 << 64"), Err(EvalError::TypeMismatch(_))));
    }

    #[test]
    fn test_concatenation() {
        assert_eq!(eval("'ab' + 'cd'"), Ok(Value::from("abcd")));
        assert_eq!(
            eval("[1] + [2, 3]"),
            Ok(Value::array(vec![Value::from(1), Value::from(2), Value::from(3)]))
        );
        assert_eq!(eval("({a: 1, b: 2} + {b: 3}).b"), Ok(Value::from(3)));
    }

    #[test]
    fn test_indexing() {
        let scope = vars(&[(
            "list",
            Value::array(vec![Value::from(10), Value::from(20)]),
        )]);
        assert_eq!(eval_with("list[1]", &scope), Ok(Value::from(20)));
        assert!(matches!(
            eval_with("list[2]", &scope),
            Err(EvalError::IndexOutOfRange { .. })
        ));
        assert!(matches!(
            eval_with("list[-1]", &scope),
            Err(EvalError::IndexOutOfRange { .. })
        ));
        assert!(matches!(
            eval_with("list[0.5]", &scope),
            Err(EvalError::TypeMismatch(_))
        ));
        assert_eq!(eval("'hello'[1]"), Ok(Value::from("e")));
    }

    #[test]
    fn test_dictionary_access() {
        let scope = vars(&[(
            "d",
            Value::dictionary([(Name::new("width"), Value::from(4))]),
        )]);
        assert_eq!(eval_with("d.width", &scope), Ok(Value::from(4)));
        assert_eq!(eval_with("d[@width]", &scope), Ok(Value::from(4)));
        assert_eq!(eval_with("d['width']", &scope), Ok(Value::from(4)));
        assert!(matches!(
            eval_with("d.height", &scope),
            Err(EvalError::IndexOutOfRange { .. })
        ));
        assert!(matches!(eval("(1).x"), Err(EvalError::TypeMismatch(_))));
    }

    #[test]
    fn test_unknown_function() {
        assert_eq!(
            eval("nope(1)"),
            Err(EvalError::UnknownFunction(Name::new("nope")))
        );
    }

    #[test]
    fn test_host_function_named_call() {
        let mut functions = FunctionTable::new();
        functions.register("area", |args: &CallArgs| match args {
            CallArgs::Named(named) => {
                let w = named.get(&Name::new("w")).and_then(Value::as_number).unwrap_or(0.0);
                let h = named.get(&Name::new("h")).and_then(Value::as_number).unwrap_or(0.0);
                Ok(Value::from(w * h))
            }
            CallArgs::Positional(_) => Ok(Value::Undefined),
        });
        let expr = compile("area(w: 3, h: 4)").unwrap();
        assert_eq!(
            evaluate(&expr, &ScopeChain::new(), &functions),
            Ok(Value::from(12))
        );
    }

    #[test]
    fn test_malformed_bytecode() {
        let bad = Expression::new(vec![Op::Binary(BinaryOp::Add)]);
        assert!(matches!(
            evaluate(&bad, &ScopeChain::new(), &FunctionTable::new()),
            Err(EvalError::MalformedBytecode(_))
        ));
        let leftover = Expression::new(vec![Op::Push(Value::from(1)), Op::Push(Value::from(2))]);
        assert!(matches!(
            evaluate(&leftover, &ScopeChain::new(), &FunctionTable::new()),
            Err(EvalError::MalformedBytecode(_))
        ));
        let far = Expression::new(vec![Op::Jump(9)]);
        assert!(matches!(
            evaluate(&far, &ScopeChain::new(), &FunctionTable::new()),
            Err(EvalError::MalformedBytecode(_))
        ));
    }
}
