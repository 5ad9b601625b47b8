//! Crate error taxonomy.
//!
//! The rule pipeline (extract → decide → plan → govern) never fails for
//! business-logic reasons; those outcomes are folded into the loss score or
//! the verdict instead. Errors here cover the edges that can actually fail:
//! state transitions, durable writes, configuration, and the external
//! language-generation call.

use thiserror::Error;

use crate::session::SessionState;
use crate::store::StoreError;

/// Unified error type for the assessment pipeline.
#[derive(Debug, Error)]
pub enum AssessError {
    /// A session transition was requested along an edge the table does not
    /// declare. The session state is unchanged.
    #[error("Illegal session transition: {from} → {to}")]
    IllegalTransition { from: SessionState, to: SessionState },

    /// A transition guard rejected an otherwise-declared edge.
    #[error("Transition guard rejected {from} → {to}: {reason}")]
    GuardRejected {
        from: SessionState,
        to: SessionState,
        reason: String,
    },

    /// A durable write failed after the configured retries. Round commits and
    /// verdict finalization surface this; snapshot writes never do.
    #[error("Durable write failed: {0}")]
    Store(#[from] StoreError),

    /// The external language-generation call failed. The caller receives a
    /// fallback response; this variant exists for observability.
    #[error("Generation failure: {0}")]
    Generation(String),

    /// Configuration is invalid or missing required fields.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The session referenced by id is not known to this handle.
    #[error("Unknown session: {0}")]
    UnknownSession(String),
}

impl AssessError {
    /// Whether the operation that produced this error may be retried as-is.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::Store(_) | Self::Generation(_))
    }
}
