//! Invocation results.

use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, GatewayError};
use crate::value::FieldMap;

/// The single structured response to one tool call.
///
/// Exactly one of these is produced per invocation; a raw fault never
/// crosses the boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum InvocationResult {
    /// The tool completed; `payload` holds its JSON-safe result fields.
    Success {
        /// Result fields, keyed by stable names.
        payload: FieldMap,
    },

    /// The tool failed with a kind from the closed taxonomy.
    Failure {
        /// Taxonomy discriminant.
        kind: ErrorKind,
        /// Human-readable description.
        message: String,
        /// Structured context (offending element, path, reason code).
        #[serde(default, skip_serializing_if = "FieldMap::is_empty")]
        context: FieldMap,
    },
}

impl InvocationResult {
    /// Wraps a payload as a success.
    #[must_use]
    pub const fn success(payload: FieldMap) -> Self {
        Self::Success { payload }
    }

    /// Builds the failure response for a gateway error.
    #[must_use]
    pub fn failure(err: &GatewayError) -> Self {
        Self::Failure {
            kind: err.kind(),
            message: err.to_string(),
            context: err.context(),
        }
    }

    /// Returns true for [`InvocationResult::Success`].
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Returns the failure kind, if this is a failure.
    #[must_use]
    pub const fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Failure { kind, .. } => Some(*kind),
            Self::Success { .. } => None,
        }
    }

    /// Returns the payload, if this is a success.
    #[must_use]
    pub const fn payload(&self) -> Option<&FieldMap> {
        match self {
            Self::Success { payload } => Some(payload),
            Self::Failure { .. } => None,
        }
    }
}
