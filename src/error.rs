//! # Error Taxonomy
//!
//! Typed errors for the consolidation core. Shape and identity problems are
//! fatal and fail fast; transient storage failures are the task layer's
//! problem and never appear here.

use crate::model::SegId;
use thiserror::Error;

/// Fatal errors raised by the consolidation core.
#[derive(Debug, Error)]
pub enum CoreError {
    /// An input array or box has invalid dimensions.
    #[error("shape error: {0}")]
    Shape(String),

    /// An id was referenced that was never issued, or a map that must cover
    /// an id space is missing entries.
    #[error("unknown id {id} ({context})")]
    Identity { id: SegId, context: String },

    /// A chunk grid is missing cells; global stages must not run over it.
    #[error("incomplete chunk grid: {missing} of {expected} chunks missing")]
    IncompleteGrid { missing: usize, expected: usize },

    /// A chunk tag string does not round-trip to a bounding box.
    #[error("malformed chunk tag {0:?}")]
    Tag(String),
}

impl CoreError {
    pub fn shape(msg: impl Into<String>) -> Self {
        CoreError::Shape(msg.into())
    }

    pub fn identity(id: SegId, context: impl Into<String>) -> Self {
        CoreError::Identity {
            id,
            context: context.into(),
        }
    }
}

/// Result alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
