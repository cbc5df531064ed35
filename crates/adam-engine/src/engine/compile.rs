//! Syntax tree to bytecode.
//!
//! Sub-expressions made only of literals are folded before emission, so a
//! folded expression never contains a `Load` for them. Function calls are
//! never folded: the host may replace a function between evaluations.

use std::sync::Arc;

use super::ast::{Arguments, Expr};
use super::bytecode::{Expression, Op};
use super::error::ParseError;
use super::parser::parse_expression;
use super::value::Value;
use super::vm::{apply_binary, apply_unary, index_value, member_value};

/// Compile expression text.
pub fn compile(source: &str) -> Result<Expression, ParseError> {
    let expr = parse_expression(source)?;
    let mut emitter = Emitter { ops: Vec::new() };
    emitter.emit(&fold(expr));
    Ok(Expression::with_source(emitter.ops, source))
}

/// Compile an already parsed syntax tree.
pub fn compile_ast(expr: Expr) -> Expression {
    let mut emitter = Emitter { ops: Vec::new() };
    emitter.emit(&fold(expr));
    Expression::new(emitter.ops)
}

fn literal(expr: &Expr) -> Option<&Value> {
    match expr {
        Expr::Literal(value) => Some(value),
        _ => None,
    }
}

/// Fold literal-only sub-expressions. Folding that would raise an error is
/// skipped so the error surfaces at evaluation time instead.
fn fold(expr: Expr) -> Expr {
    match expr {
        Expr::Unary { op, operand } => {
            let operand = fold(*operand);
            if let Some(value) = literal(&operand)
                && let Ok(folded) = apply_unary(op, value)
            {
                return Expr::Literal(folded);
            }
            Expr::Unary {
                op,
                operand: Box::new(operand),
            }
        }
        Expr::Binary { op, left, right } => {
            let left = fold(*left);
            let right = fold(*right);
            if let (Some(l), Some(r)) = (literal(&left), literal(&right))
                && let Ok(folded) = apply_binary(op, l, r)
            {
                return Expr::Literal(folded);
            }
            Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            }
        }
        Expr::And(left, right) => {
            let left = fold(*left);
            let right = fold(*right);
            match literal(&left) {
                Some(Value::Bool(false)) => left,
                Some(Value::Bool(true)) => right,
                _ => Expr::And(Box::new(left), Box::new(right)),
            }
        }
        Expr::Or(left, right) => {
            let left = fold(*left);
            let right = fold(*right);
            match literal(&left) {
                Some(Value::Bool(true)) => left,
                Some(Value::Bool(false)) => right,
                _ => Expr::Or(Box::new(left), Box::new(right)),
            }
        }
        Expr::Conditional {
            condition,
            then,
            otherwise,
        } => {
            let condition = fold(*condition);
            let then = fold(*then);
            let otherwise = fold(*otherwise);
            match literal(&condition) {
                Some(Value::Bool(true)) => then,
                Some(Value::Bool(false)) => otherwise,
                _ => Expr::Conditional {
                    condition: Box::new(condition),
                    then: Box::new(then),
                    otherwise: Box::new(otherwise),
                },
            }
        }
        Expr::Index { target, index } => {
            let target = fold(*target);
            let index = fold(*index);
            if let (Some(t), Some(i)) = (literal(&target), literal(&index))
                && let Ok(folded) = index_value(t, i)
            {
                return Expr::Literal(folded);
            }
            Expr::Index {
                target: Box::new(target),
                index: Box::new(index),
            }
        }
        Expr::Member { target, member } => {
            let target = fold(*target);
            if let Some(t) = literal(&target)
                && let Ok(folded) = member_value(t, member)
            {
                return Expr::Literal(folded);
            }
            Expr::Member {
                target: Box::new(target),
                member,
            }
        }
        Expr::Array(items) => {
            let items: Vec<Expr> = items.into_iter().map(fold).collect();
            if items.iter().all(|item| literal(item).is_some()) {
                let values = items.iter().filter_map(literal).cloned().collect();
                return Expr::Literal(Value::array(values));
            }
            Expr::Array(items)
        }
        Expr::Dictionary(entries) => {
            let entries: Vec<_> = entries.into_iter().map(|(k, v)| (k, fold(v))).collect();
            if entries.iter().all(|(_, v)| literal(v).is_some()) {
                let values = entries
                    .iter()
                    .filter_map(|(k, v)| literal(v).map(|v| (*k, v.clone())));
                return Expr::Literal(Value::dictionary(values));
            }
            Expr::Dictionary(entries)
        }
        Expr::Call {
            function,
            arguments,
        } => {
            let arguments = match arguments {
                Arguments::Positional(args) => {
                    Arguments::Positional(args.into_iter().map(fold).collect())
                }
                Arguments::Named(args) => {
                    Arguments::Named(args.into_iter().map(|(k, v)| (k, fold(v))).collect())
                }
            };
            Expr::Call {
                function,
                arguments,
            }
        }
        other => other,
    }
}

struct Emitter {
    ops: Vec<Op>,
}

impl Emitter {
    fn placeholder(&mut self, op: Op) -> usize {
        self.ops.push(op);
        self.ops.len() - 1
    }

    fn patch(&mut self, at: usize) {
        let target = self.ops.len();
        match &mut self.ops[at] {
            Op::JumpIfFalseOrPop(t) | Op::JumpIfTrueOrPop(t) | Op::JumpUnless(t) | Op::Jump(t) => {
                *t = target
            }
            _ => unreachable!("patching a non-jump instruction"),
        }
    }

    fn emit(&mut self, expr: &Expr) {
        match expr {
            Expr::Literal(value) => self.ops.push(Op::Push(value.clone())),
            Expr::Variable(name) => self.ops.push(Op::Load(*name)),
            Expr::Unary { op, operand } => {
                self.emit(operand);
                self.ops.push(Op::Unary(*op));
            }
            Expr::Binary { op, left, right } => {
                self.emit(left);
                self.emit(right);
                self.ops.push(Op::Binary(*op));
            }
            Expr::And(left, right) => {
                self.emit(left);
                let jump = self.placeholder(Op::JumpIfFalseOrPop(0));
                self.emit(right);
                self.patch(jump);
            }
            Expr::Or(left, right) => {
                self.emit(left);
                let jump = self.placeholder(Op::JumpIfTrueOrPop(0));
                self.emit(right);
                self.patch(jump);
            }
            Expr::Conditional {
                condition,
                then,
                otherwise,
            } => {
                self.emit(condition);
                let skip_then = self.placeholder(Op::JumpUnless(0));
                self.emit(then);
                let skip_otherwise = self.placeholder(Op::Jump(0));
                self.patch(skip_then);
                self.emit(otherwise);
                self.patch(skip_otherwise);
            }
            Expr::Index { target, index } => {
                self.emit(target);
                self.emit(index);
                self.ops.push(Op::Index);
            }
            Expr::Member { target, member } => {
                self.emit(target);
                self.ops.push(Op::Member(*member));
            }
            Expr::Array(items) => {
                for item in items {
                    self.emit(item);
                }
                self.ops.push(Op::MakeArray(items.len()));
            }
            Expr::Dictionary(entries) => {
                for (_, value) in entries {
                    self.emit(value);
                }
                let keys: Arc<[_]> = entries.iter().map(|(k, _)| *k).collect();
                self.ops.push(Op::MakeDictionary(keys));
            }
            Expr::Call {
                function,
                arguments: Arguments::Positional(args),
            } => {
                for arg in args {
                    self.emit(arg);
                }
                self.ops.push(Op::Call {
                    function: *function,
                    argc: args.len(),
                });
            }
            Expr::Call {
                function,
                arguments: Arguments::Named(args),
            } => {
                for (_, value) in args {
                    self.emit(value);
                }
                let keys: Arc<[_]> = args.iter().map(|(k, _)| *k).collect();
                self.ops.push(Op::CallNamed {
                    function: *function,
                    keys,
                });
            }
        }
    }
}
