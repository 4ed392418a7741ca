// src/errors.rs

//! Crate-wide error type and result alias.
//!
//! Errors here are the *hard* failures: wrong argument kinds, malformed
//! cardinality strings, unknown targets, irreconcilable shapes. Soft problems
//! found during an update round never become a `PlanError`; they are stored
//! as `valid = false` plus messages on the affected object.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlanError {
    #[error("Type error: {0}")]
    Type(String),

    #[error("Value error: {0}")]
    Value(String),

    #[error("Index error: {0}")]
    Index(String),

    #[error("Key error: {0}")]
    Key(String),

    #[error("Not a valid cardinality description string ({0})")]
    CardinalityFormat(String),

    #[error("Cardinality error: {0}")]
    Cardinality(String),

    #[error("Size mismatch: {0}")]
    SizeMismatch(String),

    #[error("Unsupported cardinality shape: {0}")]
    UnsupportedShape(String),

    #[error("Cannot link objects that belong to different graphs: {0}")]
    ForeignGraph(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Graph is not ready:\n{}", .0.join("\n"))]
    NotReady(Vec<String>),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlWrite(#[from] toml::ser::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, PlanError>;
