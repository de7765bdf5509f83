use std::path::PathBuf;

use thiserror::Error;

use crate::executor::Value;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("line {line}: unexpected '{found}'")]
    Unexpected { line: u32, found: String },

    #[error("line {line}: expected {expected}")]
    Expected { line: u32, expected: &'static str },

    #[error("unexpected end of input, expected {expected}")]
    UnexpectedEof { expected: &'static str },

    #[error("line {line}: invalid token")]
    InvalidToken { line: u32 },

    #[error("line {line}: invalid assignment target")]
    InvalidAssignment { line: u32 },

    #[error("line {line}: expression nested too deeply")]
    TooDeep { line: u32 },
}

/// An error condition raised by evaluated code (`stop()`, type errors, ...).
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message}")]
pub struct RuntimeError {
    pub message: String,
}

impl RuntimeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Every way evaluation can leave an expression other than producing a value.
#[derive(Error, Debug, Clone)]
pub enum Unwind {
    #[error(transparent)]
    Error(#[from] RuntimeError),

    #[error("no function to return from, jumping to top level")]
    Return(Value),

    #[error("no loop for break/next, jumping to top level")]
    Break,

    #[error("no loop for break/next, jumping to top level")]
    Next,

    #[error("interrupted")]
    Interrupt,
}

impl Unwind {
    pub fn error(message: impl Into<String>) -> Self {
        Unwind::Error(RuntimeError::new(message))
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Error: {0}")]
    Runtime(RuntimeError),

    #[error("interrupted")]
    Interrupted,

    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid launch configuration: {0}")]
    Config(#[from] serde_json::Error),
}

impl Error {
    /// Convert an unwind that escaped to the top level. A stray `return()`
    /// simply yields its value.
    pub fn from_unwind(unwind: Unwind) -> Result<Value, Error> {
        match unwind {
            Unwind::Return(value) => Ok(value),
            Unwind::Error(err) => Err(Error::Runtime(err)),
            Unwind::Interrupt => Err(Error::Interrupted),
            other @ (Unwind::Break | Unwind::Next) => {
                Err(Error::Runtime(RuntimeError::new(other.to_string())))
            }
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
