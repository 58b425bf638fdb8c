use alloc::string::String;
use core::fmt;

use crate::{ArenaError, Offset};

/// A compiled schema violates its own contract.
///
/// These are build-time failures (a stale, corrupt or incomplete schema),
/// never a property of the data being processed, and retrying never helps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    /// Reading or writing the schema arena failed.
    Arena(ArenaError),
    /// A type record carries a class byte this version does not know.
    UnknownClass {
        /// The type record.
        at: Offset,
        /// The raw class byte.
        class: u8,
    },
    /// A reference points at the null offset or outside the schema arena.
    DanglingType {
        /// The offending reference.
        at: Offset,
    },
    /// A field still refers to the parameter of a generic type constructor.
    UnboundParameter {
        /// The type owning the field.
        type_name: String,
    },
    /// A string stored in the schema is not valid UTF-8.
    InvalidUtf8 {
        /// Where the string lives.
        at: Offset,
    },
    /// A type contains itself inline.
    InfiniteSize {
        /// The type that recursed.
        type_name: String,
    },
    /// A variant has no alternative for the JSON shape at hand.
    NoVariantCandidate {
        /// The variant type.
        type_name: String,
        /// Kind of the JSON value that had no alternative.
        kind: &'static str,
    },
    /// A type does not have the shape its class requires.
    Malformed {
        /// The type at fault.
        type_name: String,
        /// What is wrong with it.
        message: String,
    },
}

impl SchemaError {
    /// Stable error code.
    pub const fn code(&self) -> &'static str {
        match self {
            SchemaError::Arena(_) => "schema::arena",
            SchemaError::UnknownClass { .. } => "schema::unknown_class",
            SchemaError::DanglingType { .. } => "schema::dangling_type",
            SchemaError::UnboundParameter { .. } => "schema::unbound_parameter",
            SchemaError::InvalidUtf8 { .. } => "schema::invalid_utf8",
            SchemaError::InfiniteSize { .. } => "schema::infinite_size",
            SchemaError::NoVariantCandidate { .. } => "schema::no_variant_candidate",
            SchemaError::Malformed { .. } => "schema::malformed",
        }
    }
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaError::Arena(e) => write!(f, "schema arena: {e}"),
            SchemaError::UnknownClass { at, class } => {
                write!(f, "type record at {at} has unknown class {class}")
            }
            SchemaError::DanglingType { at } => write!(f, "dangling type reference {at}"),
            SchemaError::UnboundParameter { type_name } => {
                write!(f, "type `{type_name}` still refers to a generic parameter")
            }
            SchemaError::InvalidUtf8 { at } => write!(f, "schema string at {at} is not UTF-8"),
            SchemaError::InfiniteSize { type_name } => write!(
                f,
                "type `{type_name}` contains itself inline; store it by reference"
            ),
            SchemaError::NoVariantCandidate { type_name, kind } => {
                write!(f, "variant `{type_name}` has no alternative accepting {kind}")
            }
            SchemaError::Malformed { type_name, message } => {
                write!(f, "type `{type_name}` is malformed: {message}")
            }
        }
    }
}

impl core::error::Error for SchemaError {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            SchemaError::Arena(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ArenaError> for SchemaError {
    fn from(e: ArenaError) -> Self {
        SchemaError::Arena(e)
    }
}
