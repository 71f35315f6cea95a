use thiserror::Error;

use crate::types::{Name, NodeId};

pub type Result<T, E = RuleError> = std::result::Result<T, E>;

/// Failures surfaced by reads, assignments and construction.
///
/// Errors are `Clone` because a deferred value's outcome is shared by every
/// reader awaiting it.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuleError {
    #[error("cannot construct unregistered type {name}")]
    UnregisteredType { name: Name },

    #[error("cyclic evaluation of {property} on {node}")]
    CyclicEvaluation { node: NodeId, property: Name },

    #[error("node {node} has been released")]
    StaleNode { node: NodeId },

    #[error("evaluation depth exceeded {limit} while computing {property}")]
    DepthExceeded { limit: usize, property: Name },

    #[error("{property}: expected {expected}, found {found}")]
    TypeMismatch {
        property: Name,
        expected: &'static str,
        found: &'static str,
    },

    #[error("{class} has no method {name}")]
    UnknownMethod { class: Name, name: Name },

    #[error("{property}: {message}")]
    Computation { property: Name, message: Name },

    #[error("deferred value was dropped before it resolved")]
    Cancelled,
}

impl RuleError {
    /// Failure raised by a rule body.
    #[must_use]
    pub fn computation(property: &str, message: impl AsRef<str>) -> Self {
        Self::Computation {
            property: property.into(),
            message: message.as_ref().into(),
        }
    }

    /// Whether retrying the same read could succeed once inputs change.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::StaleNode { .. } | Self::UnregisteredType { .. })
    }
}
