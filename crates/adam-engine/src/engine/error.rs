//! Error types for expression compilation and evaluation.

use thiserror::Error;

use super::name::Name;

/// Errors raised while turning expression text into bytecode.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message} at offset {offset}")]
pub struct ParseError {
    pub message: String,
    /// Byte offset into the expression text.
    pub offset: usize,
}

impl ParseError {
    pub(crate) fn new(message: impl Into<String>, offset: usize) -> Self {
        ParseError {
            message: message.into(),
            offset,
        }
    }
}

/// Errors that abort a single evaluation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    #[error("undefined variable '{0}'")]
    UndefinedVariable(Name),

    #[error("unknown function '{0}'")]
    UnknownFunction(Name),

    #[error("index {index} out of range for {target}")]
    IndexOutOfRange { index: String, target: String },

    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    #[error("invalid argument to '{function}': {message}")]
    InvalidArgument { function: Name, message: String },

    #[error("malformed bytecode: {0}")]
    MalformedBytecode(String),
}

impl EvalError {
    pub(crate) fn mismatch(message: impl Into<String>) -> Self {
        EvalError::TypeMismatch(message.into())
    }
}

pub type EvalResult<T> = std::result::Result<T, EvalError>;
