//! Error types for board document operations.

use thiserror::Error;

use super::sexpr::NodeId;

/// Result type for document operations.
pub type DocumentResult<T> = Result<T, DocumentError>;

/// Errors that can occur while parsing or mutating a board document.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DocumentError {
    /// Malformed document text.
    #[error("Syntax error at offset {offset}: {message}")]
    Syntax {
        /// Byte offset where the error was detected.
        offset: usize,
        /// Description of what's wrong.
        message: String,
    },

    /// A node id that does not belong to (or is no longer attached to) the
    /// target document.
    #[error("Node {node} is not owned by document {document}")]
    Ownership {
        /// The offending node id.
        node: NodeId,
        /// Id of the document the operation was applied to.
        document: u64,
    },

    /// The node exists but cannot take part in the requested mutation.
    #[error("Invalid mutation target {node}: {message}")]
    InvalidTarget {
        /// The offending node id.
        node: NodeId,
        /// Description of what's wrong.
        message: String,
    },
}

impl DocumentError {
    /// Creates a syntax error.
    pub fn syntax(offset: usize, message: impl Into<String>) -> Self {
        Self::Syntax {
            offset,
            message: message.into(),
        }
    }

    /// Creates an ownership error.
    #[must_use]
    pub const fn ownership(node: NodeId, document: u64) -> Self {
        Self::Ownership { node, document }
    }

    /// Creates an invalid target error.
    pub fn invalid_target(node: NodeId, message: impl Into<String>) -> Self {
        Self::InvalidTarget {
            node,
            message: message.into(),
        }
    }
}
