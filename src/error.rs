use thiserror::Error;

use crate::core::{ExpressionId, TaskId};

/// Reasons an expression string is rejected before it becomes an expression.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("empty expression")]
    Empty,

    #[error("unexpected end of expression")]
    UnexpectedEnd,

    #[error("unexpected character: {0:?}")]
    UnexpectedCharacter(char),

    #[error("invalid number: {0}")]
    InvalidNumber(String),

    #[error("unexpected token: {0}")]
    UnexpectedToken(String),

    #[error("expected closing parenthesis")]
    UnclosedParenthesis,

    #[error("unexpected trailing tokens: {0}")]
    TrailingTokens(String),
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid expression: {0}")]
    Parse(#[from] ParseError),

    #[error("Expression not found: {id}")]
    ExpressionNotFound { id: ExpressionId },

    #[error("Task not found: {id}")]
    TaskNotFound { id: TaskId },

    #[error("division by zero")]
    DivisionByZero,

    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Orchestrator error: {0}")]
    Orchestrator(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("No home directory")]
    NoHomeDir,
}

pub type Result<T> = std::result::Result<T, Error>;
