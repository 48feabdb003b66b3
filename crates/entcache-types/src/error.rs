use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("invalid entity key {0:?}: expected `Type:id`")]
    InvalidKey(String),
}
