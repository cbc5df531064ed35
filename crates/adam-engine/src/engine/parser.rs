//! Recursive-descent parser for the expression language.
//!
//! Precedence, lowest first:
//!
//! ```text
//! conditional := or ("?" conditional ":" conditional)?
//! or          := and ("||" and)*
//! and         := bitor ("&&" bitor)*
//! bitor       := bitxor ("|" bitxor)*
//! bitxor      := bitand ("^" bitand)*
//! bitand      := equality ("&" equality)*
//! equality    := relational (("==" | "!=") relational)*
//! relational  := shift (("<" | "<=" | ">" | ">=") shift)*
//! shift       := additive (("<<" | ">>") additive)*
//! additive    := term (("+" | "-") term)*
//! term        := unary (("*" | "/" | "%") unary)*
//! unary       := ("!" | "-" | "+" | "~") unary | postfix
//! postfix     := primary ("[" conditional "]" | "." identifier)*
//! ```

use std::ops::Range;

use super::ast::{Arguments, BinaryOp, Expr, UnaryOp};
use super::error::ParseError;
use super::lexer::{Token, tokenize};
use super::name::Name;
use super::value::Value;

/// Number of precedence levels handled by [`binary_op`].
const BINARY_LEVELS: usize = 8;

/// Binary operators from `|` (level 0) up to `*` (level 7). `||` and `&&` are
/// parsed separately because they compile to jumps.
fn binary_op(level: usize, token: &Token) -> Option<BinaryOp> {
    let op = match (level, token) {
        (0, Token::Pipe) => BinaryOp::BitOr,
        (1, Token::Caret) => BinaryOp::BitXor,
        (2, Token::Ampersand) => BinaryOp::BitAnd,
        (3, Token::EqualEqual) => BinaryOp::Equal,
        (3, Token::NotEqual) => BinaryOp::NotEqual,
        (4, Token::Less) => BinaryOp::Less,
        (4, Token::LessEqual) => BinaryOp::LessEqual,
        (4, Token::Greater) => BinaryOp::Greater,
        (4, Token::GreaterEqual) => BinaryOp::GreaterEqual,
        (5, Token::ShiftLeft) => BinaryOp::ShiftLeft,
        (5, Token::ShiftRight) => BinaryOp::ShiftRight,
        (6, Token::Plus) => BinaryOp::Add,
        (6, Token::Minus) => BinaryOp::Sub,
        (7, Token::Star) => BinaryOp::Mul,
        (7, Token::Slash) => BinaryOp::Div,
        (7, Token::Percent) => BinaryOp::Mod,
        _ => return None,
    };
    Some(op)
}

/// Parse expression text into a syntax tree.
pub fn parse_expression(source: &str) -> Result<Expr, ParseError> {
    let tokens = tokenize(source)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        end: source.len(),
    };
    let expr = parser.conditional()?;
    if let Some((token, span)) = parser.tokens.get(parser.pos) {
        return Err(ParseError::new(
            format!("unexpected {:?} after expression", token),
            span.start,
        ));
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<(Token, Range<usize>)>,
    pos: usize,
    end: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn peek_at(&self, ahead: usize) -> Option<&Token> {
        self.tokens.get(self.pos + ahead).map(|(t, _)| t)
    }

    fn offset(&self) -> usize {
        self.tokens
            .get(self.pos)
            .map(|(_, span)| span.start)
            .unwrap_or(self.end)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|(t, _)| t.clone());
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: &Token, what: &str) -> Result<(), ParseError> {
        if self.eat(expected) {
            Ok(())
        } else {
            Err(self.error(format!("expected {}", what)))
        }
    }

    fn error(&self, message: String) -> ParseError {
        match self.peek() {
            Some(token) => {
                ParseError::new(format!("{}, found {:?}", message, token), self.offset())
            }
            None => ParseError::new(format!("{}, found end of input", message), self.offset()),
        }
    }

    fn conditional(&mut self) -> Result<Expr, ParseError> {
        let condition = self.or()?;
        if !self.eat(&Token::Question) {
            return Ok(condition);
        }
        let then = self.conditional()?;
        self.expect(&Token::Colon, "':' in conditional")?;
        let otherwise = self.conditional()?;
        Ok(Expr::Conditional {
            condition: Box::new(condition),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        })
    }

    fn or(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.and()?;
        while self.eat(&Token::OrOr) {
            let right = self.and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.binary(0)?;
        while self.eat(&Token::AndAnd) {
            let right = self.binary(0)?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn binary(&mut self, level: usize) -> Result<Expr, ParseError> {
        if level == BINARY_LEVELS {
            return self.unary();
        }
        let mut left = self.binary(level + 1)?;
        while let Some(op) = self.peek().and_then(|token| binary_op(level, token)) {
            self.pos += 1;
            let right = self.binary(level + 1)?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Expr, ParseError> {
        let op = match self.peek() {
            Some(Token::Bang) => UnaryOp::Not,
            Some(Token::Minus) => UnaryOp::Negate,
            Some(Token::Plus) => UnaryOp::Plus,
            Some(Token::Tilde) => UnaryOp::BitNot,
            _ => return self.postfix(),
        };
        self.pos += 1;
        let operand = self.unary()?;
        Ok(Expr::Unary {
            op,
            operand: Box::new(operand),
        })
    }

    fn postfix(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.primary()?;
        loop {
            if self.eat(&Token::LBracket) {
                let index = self.conditional()?;
                self.expect(&Token::RBracket, "']'")?;
                expr = Expr::Index {
                    target: Box::new(expr),
                    index: Box::new(index),
                };
            } else if self.eat(&Token::Dot) {
                let member = self.identifier("member name after '.'")?;
                expr = Expr::Member {
                    target: Box::new(expr),
                    member,
                };
            } else {
                return Ok(expr);
            }
        }
    }

    fn identifier(&mut self, what: &str) -> Result<Name, ParseError> {
        match self.peek() {
            Some(Token::Identifier(id)) => {
                let name = Name::new(id);
                self.pos += 1;
                Ok(name)
            }
            _ => Err(self.error(format!("expected {}", what))),
        }
    }

    fn primary(&mut self) -> Result<Expr, ParseError> {
        let offset = self.offset();
        let Some(token) = self.advance() else {
            return Err(ParseError::new("unexpected end of input", offset));
        };
        match token {
            Token::Number(n) => Ok(Expr::Literal(Value::Number(n))),
            Token::String(s) => Ok(Expr::Literal(Value::from(s))),
            Token::Bool(b) => Ok(Expr::Literal(Value::Bool(b))),
            Token::Empty => Ok(Expr::Literal(Value::Undefined)),
            Token::NameLiteral(n) => Ok(Expr::Literal(Value::Name(Name::new(&n)))),
            Token::Identifier(id) => {
                let name = Name::new(&id);
                if self.eat(&Token::LParen) {
                    let arguments = self.arguments()?;
                    Ok(Expr::Call {
                        function: name,
                        arguments,
                    })
                } else {
                    Ok(Expr::Variable(name))
                }
            }
            Token::LParen => {
                let inner = self.conditional()?;
                self.expect(&Token::RParen, "')'")?;
                Ok(inner)
            }
            Token::LBracket => {
                let mut items = Vec::new();
                if !self.eat(&Token::RBracket) {
                    loop {
                        items.push(self.conditional()?);
                        if self.eat(&Token::RBracket) {
                            break;
                        }
                        self.expect(&Token::Comma, "',' or ']' in array")?;
                    }
                }
                Ok(Expr::Array(items))
            }
            Token::LBrace => {
                let mut entries = Vec::new();
                if !self.eat(&Token::RBrace) {
                    loop {
                        let key = self.dictionary_key()?;
                        self.expect(&Token::Colon, "':' after dictionary key")?;
                        entries.push((key, self.conditional()?));
                        if self.eat(&Token::RBrace) {
                            break;
                        }
                        self.expect(&Token::Comma, "',' or '}' in dictionary")?;
                    }
                }
                Ok(Expr::Dictionary(entries))
            }
            other => Err(ParseError::new(format!("unexpected {:?}", other), offset)),
        }
    }

    fn dictionary_key(&mut self) -> Result<Name, ParseError> {
        match self.peek() {
            Some(Token::Identifier(id) | Token::NameLiteral(id) | Token::String(id)) => {
                let name = Name::new(id);
                self.pos += 1;
                Ok(name)
            }
            _ => Err(self.error("expected dictionary key".to_string())),
        }
    }

    /// Arguments after the opening parenthesis. `f(a: 1)` makes a named call.
    fn arguments(&mut self) -> Result<Arguments, ParseError> {
        if self.eat(&Token::RParen) {
            return Ok(Arguments::Positional(Vec::new()));
        }
        let named = matches!(self.peek(), Some(Token::Identifier(_)))
            && self.peek_at(1) == Some(&Token::Colon);
        if named {
            let mut entries = Vec::new();
            loop {
                let key = self.identifier("argument name")?;
                self.expect(&Token::Colon, "':' after argument name")?;
                entries.push((key, self.conditional()?));
                if self.eat(&Token::RParen) {
                    return Ok(Arguments::Named(entries));
                }
                self.expect(&Token::Comma, "',' or ')' in argument list")?;
            }
        }
        let mut items = Vec::new();
        loop {
            items.push(self.conditional()?);
            if self.eat(&Token::RParen) {
                return Ok(Arguments::Positional(items));
            }
            self.expect(&Token::Comma, "',' or ')' in argument list")?;
        }
    }
}
