//! Error types for deflating JSON.

use alloc::string::String;
use core::fmt::{self, Display};

use deflate_core::{ArenaError, ContainerError, SchemaError};

use crate::JsonPath;

/// A JSON document that does not satisfy the schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// What is wrong.
    pub kind: ViolationKind,
    /// Where in the document.
    pub path: JsonPath,
}

/// The ways a document can violate a schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViolationKind {
    /// A value of the wrong JSON kind.
    TypeMismatch {
        /// Kind the schema asks for.
        expected: &'static str,
        /// Kind found in the document.
        got: &'static str,
    },
    /// A required member is absent.
    MissingField {
        /// JSON name of the member.
        field: String,
    },
    /// A number that does not fit the type it is stored as.
    NumberOutOfRange {
        /// The number as written in the document.
        value: String,
        /// The type it had to fit.
        target_type: &'static str,
    },
    /// Nesting deeper than the configured limit.
    TooDeep {
        /// The limit.
        max_depth: usize,
    },
    /// The subtree the schema root applies to is absent.
    MissingSlice,
}

impl Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path = &self.path;
        match &self.kind {
            ViolationKind::TypeMismatch { expected, got } => {
                write!(f, "Expected {expected} but found {got} at {path}")
            }
            ViolationKind::MissingField { field } => {
                write!(f, "Missing required field \"{field}\" at {path}")
            }
            ViolationKind::NumberOutOfRange { value, target_type } => {
                write!(f, "Number {value} does not fit {target_type} at {path}")
            }
            ViolationKind::TooDeep { max_depth } => {
                write!(f, "Nesting deeper than {max_depth} levels at {path}")
            }
            ViolationKind::MissingSlice => write!(f, "Missing document slice at {path}"),
        }
    }
}

/// C-like status code handed to the transport layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DeflateStatus {
    /// The instance was written.
    Ok = 0,
    /// The input is not JSON.
    InvalidJson = 1,
    /// The schema blob is not a readable container.
    InvalidBinaryLayout = 2,
    /// The destination ran out of space; retry with a larger buffer.
    OutOfTargetMemory = 3,
    /// The schema is not the one the caller was built against.
    SchemaMismatch = 4,
    /// The document does not satisfy the schema.
    ValidationError = 5,
    /// The compiled schema is unusable.
    SchemaError = 6,
    /// The destination cannot hold an instance at all, e.g. it is read-only.
    InvalidDestination = 7,
}

/// Error type for deflating a JSON document.
#[derive(Debug)]
pub enum DeflateError {
    /// The input could not be parsed as JSON.
    InvalidJson(serde_json::Error),
    /// The schema blob has a bad header or version.
    InvalidBinaryLayout(ContainerError),
    /// The data area is exhausted.
    OutOfTargetMemory(ArenaError),
    /// The data area was misused: read-only, uninitialized, or addressed
    /// outside its written region. A larger buffer does not help.
    DataArea(ArenaError),
    /// The caller's expected size or schema hash does not match the schema.
    SchemaMismatch {
        /// What differs.
        what: &'static str,
        /// The caller's value.
        expected: u64,
        /// The schema's value.
        actual: u64,
    },
    /// The document does not satisfy the schema.
    Validation(Violation),
    /// The compiled schema is malformed or has no representation for the input.
    Schema(SchemaError),
}

impl DeflateError {
    /// Stable error code.
    pub const fn code(&self) -> &'static str {
        match self {
            DeflateError::InvalidJson(_) => "deflate::invalid_json",
            DeflateError::InvalidBinaryLayout(_) => "deflate::invalid_binary_layout",
            DeflateError::OutOfTargetMemory(_) => "deflate::out_of_target_memory",
            DeflateError::DataArea(_) => "deflate::data_area",
            DeflateError::SchemaMismatch { .. } => "deflate::schema_mismatch",
            DeflateError::Validation(_) => "deflate::validation",
            DeflateError::Schema(_) => "deflate::schema",
        }
    }

    /// The status code for this error.
    pub const fn status(&self) -> DeflateStatus {
        match self {
            DeflateError::InvalidJson(_) => DeflateStatus::InvalidJson,
            DeflateError::InvalidBinaryLayout(_) => DeflateStatus::InvalidBinaryLayout,
            DeflateError::OutOfTargetMemory(_) => DeflateStatus::OutOfTargetMemory,
            DeflateError::DataArea(_) => DeflateStatus::InvalidDestination,
            DeflateError::SchemaMismatch { .. } => DeflateStatus::SchemaMismatch,
            DeflateError::Validation(_) => DeflateStatus::ValidationError,
            DeflateError::Schema(_) => DeflateStatus::SchemaError,
        }
    }

    /// Whether the call can succeed if repeated with a larger destination.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, DeflateError::OutOfTargetMemory(_))
    }

    /// The violation, for validation errors.
    pub fn violation(&self) -> Option<&Violation> {
        match self {
            DeflateError::Validation(v) => Some(v),
            _ => None,
        }
    }

    pub(crate) fn validation(kind: ViolationKind, path: &JsonPath) -> Self {
        DeflateError::Validation(Violation {
            kind,
            path: path.clone(),
        })
    }
}

impl Display for DeflateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeflateError::InvalidJson(e) => write!(f, "invalid JSON: {e}"),
            DeflateError::InvalidBinaryLayout(e) => write!(f, "invalid schema blob: {e}"),
            DeflateError::OutOfTargetMemory(e) => write!(f, "out of target memory: {e}"),
            DeflateError::DataArea(e) => write!(f, "unusable data area: {e}"),
            DeflateError::SchemaMismatch {
                what,
                expected,
                actual,
            } => write!(f, "{what} mismatch: expected {expected:#x}, schema has {actual:#x}"),
            DeflateError::Validation(v) => write!(f, "{v}"),
            DeflateError::Schema(e) => write!(f, "{e}"),
        }
    }
}

impl core::error::Error for DeflateError {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            DeflateError::InvalidJson(e) => Some(e),
            DeflateError::InvalidBinaryLayout(e) => Some(e),
            DeflateError::OutOfTargetMemory(e) | DeflateError::DataArea(e) => Some(e),
            DeflateError::Schema(e) => Some(e),
            _ => None,
        }
    }
}

impl From<SchemaError> for DeflateError {
    fn from(e: SchemaError) -> Self {
        DeflateError::Schema(e)
    }
}

/// Exhaustion is reported as [`DeflateError::OutOfTargetMemory`]; any other
/// arena failure is [`DeflateError::DataArea`].
impl From<ArenaError> for DeflateError {
    fn from(e: ArenaError) -> Self {
        match e {
            ArenaError::Exhausted { .. }
            | ArenaError::HostOutOfMemory { .. }
            | ArenaError::TooLarge { .. } => DeflateError::OutOfTargetMemory(e),
            _ => DeflateError::DataArea(e),
        }
    }
}

impl From<ContainerError> for DeflateError {
    fn from(e: ContainerError) -> Self {
        DeflateError::InvalidBinaryLayout(e)
    }
}

impl From<serde_json::Error> for DeflateError {
    fn from(e: serde_json::Error) -> Self {
        DeflateError::InvalidJson(e)
    }
}

/// Short name of a JSON value's kind, as used in messages.
pub(crate) fn kind_of(value: &serde_json::Value) -> &'static str {
    use serde_json::Value;
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
