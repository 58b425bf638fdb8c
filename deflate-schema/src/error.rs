//! Error types for schema compilation.

use alloc::string::String;
use core::fmt::{self, Display};

use deflate_core::{ArenaError, SchemaError};

/// Error type for compiling a text schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    /// The schema arena is exhausted. Schemas are compiled ahead of time,
    /// so this is never worth retrying with the same configuration.
    OutOfSchemaMemory(ArenaError),
    /// Building or arranging the types failed.
    Schema(SchemaError),
    /// The text schema is malformed or uses an unsupported construct.
    InvalidSchema {
        /// JSON pointer of the offending node.
        pointer: String,
        /// What is wrong with it.
        message: String,
    },
}

impl CompileError {
    /// Stable error code.
    pub const fn code(&self) -> &'static str {
        match self {
            CompileError::OutOfSchemaMemory(_) => "compile::out_of_schema_memory",
            CompileError::Schema(_) => "compile::schema",
            CompileError::InvalidSchema { .. } => "compile::invalid_schema",
        }
    }

    pub(crate) fn invalid(pointer: &str, message: impl Into<String>) -> Self {
        CompileError::InvalidSchema {
            pointer: if pointer.is_empty() { "/".into() } else { pointer.into() },
            message: message.into(),
        }
    }
}

impl Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileError::OutOfSchemaMemory(e) => write!(f, "out of schema memory: {e}"),
            CompileError::Schema(e) => write!(f, "{e}"),
            CompileError::InvalidSchema { pointer, message } => {
                write!(f, "invalid schema at {pointer}: {message}")
            }
        }
    }
}

impl core::error::Error for CompileError {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            CompileError::OutOfSchemaMemory(e) => Some(e),
            CompileError::Schema(e) => Some(e),
            CompileError::InvalidSchema { .. } => None,
        }
    }
}

impl From<SchemaError> for CompileError {
    fn from(e: SchemaError) -> Self {
        match e {
            SchemaError::Arena(e) => CompileError::OutOfSchemaMemory(e),
            e => CompileError::Schema(e),
        }
    }
}

impl From<ArenaError> for CompileError {
    fn from(e: ArenaError) -> Self {
        CompileError::OutOfSchemaMemory(e)
    }
}
