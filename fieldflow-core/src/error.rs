//! Error Types
//!
//! Structural failures (bad wiring, access violations, stale ids) are
//! reported as [`FieldError`] at the call that caused them. Rendering
//! failures have their own [`RenderError`] and never leave the cache layer.

use thiserror::Error;

use crate::field::{AccessType, FieldId, NodeId};

/// Errors raised by graph operations.
#[derive(Debug, Error)]
pub enum FieldError {
    /// The id does not name a live field (never created or already removed).
    #[error("unknown field {0}")]
    UnknownField(FieldId),

    /// The id does not name a live node.
    #[error("unknown node {0}")]
    UnknownNode(NodeId),

    /// A route was attempted between incompatible field types.
    #[error("cannot route {from} into {to}: input {index} expects {expected}, got {found}")]
    TypeMismatch {
        from: String,
        to: String,
        index: usize,
        expected: String,
        found: String,
    },

    /// The destination's input rule has no slot for another route.
    #[error("{to} accepts at most {max} input routes")]
    TooManyInputs { to: String, max: usize },

    /// An operation violated the field's access kind.
    #[error("{field} is {access}: {reason}")]
    AccessViolation {
        field: String,
        access: AccessType,
        reason: &'static str,
    },

    /// A typed read or write used the wrong value type for an erased id.
    #[error("{field} holds {actual}, not {requested}")]
    WrongValueType {
        field: String,
        actual: String,
        requested: &'static str,
    },

    /// Scene-wide fields (time, cache broadcast, event sink) live as long
    /// as the graph.
    #[error("{0} is scene-wide and cannot be removed")]
    BuiltinField(String),

    /// A cache operation was invoked on a plain value field.
    #[error("{0} is not a display cache")]
    NotACache(String),

    /// Positional access past the end of a multi-valued field.
    #[error("index {index} out of range for {field} (len {len})")]
    IndexOutOfRange {
        field: String,
        index: usize,
        len: usize,
    },

    /// A route references a field that no longer exists, or is only
    /// recorded on one of its endpoints.
    #[error("dangling route {from} -> {to}")]
    DanglingRoute { from: FieldId, to: FieldId },
}

/// Errors reported by a render backend while drawing or compiling.
#[derive(Debug, Error)]
pub enum RenderError {
    /// The backend refused to record or keep a command list.
    #[error("backend rejected command list: {0}")]
    Rejected(String),

    /// Drawing (cached or immediate) failed.
    #[error("draw failed: {0}")]
    Draw(String),
}

/// Errors loading an [`EngineConfig`](crate::config::EngineConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading config: {0}")]
    Io(#[from] std::io::Error),

    #[error("parsing config: {0}")]
    Parse(#[from] serde_json::Error),
}

pub type Result<T, E = FieldError> = std::result::Result<T, E>;
