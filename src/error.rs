//! Error types for gridgate.
//!
//! Every failure a caller can observe is strongly typed with thiserror and
//! maps onto a closed [`ErrorKind`] taxonomy. The gateway never lets a raw
//! backend fault cross the invocation boundary: engine faults are translated
//! into [`GatewayError`] exactly once, at the seam defined by the
//! `From<EngineFault>` impl below.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::engine::EngineFault;
use crate::value::Value;

/// The closed set of failure kinds returned to callers.
///
/// This enum is part of the wire contract: a `Failure` response always
/// carries exactly one of these discriminants, and no invocation may produce
/// anything outside the set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Referenced case, file, or run does not exist.
    NotFound,
    /// Input is structurally invalid for the engine.
    ParseError,
    /// A required tool argument was not supplied.
    MissingArgument,
    /// A tool argument has the wrong semantic type.
    TypeMismatch,
    /// The requested tool is not in the catalog.
    UnknownTool,
    /// The mutation target does not resolve to a case element.
    UnknownElement,
    /// A value violates a declared domain constraint.
    InvalidValue,
    /// The tool was invoked in a session state that forbids it.
    PreconditionError,
    /// The engine ran to completion without finding a valid solution.
    ConvergenceError,
    /// Opaque backend failure with the original message preserved.
    EngineError,
    /// Artifact read or write failure.
    IoError,
    /// An invocation is already in flight and the call was rejected.
    SessionBusy,
}

impl ErrorKind {
    /// Returns the wire name of this kind.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::ParseError => "parse_error",
            Self::MissingArgument => "missing_argument",
            Self::TypeMismatch => "type_mismatch",
            Self::UnknownTool => "unknown_tool",
            Self::UnknownElement => "unknown_element",
            Self::InvalidValue => "invalid_value",
            Self::PreconditionError => "precondition_error",
            Self::ConvergenceError => "convergence_error",
            Self::EngineError => "engine_error",
            Self::IoError => "io_error",
            Self::SessionBusy => "session_busy",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Top-level error type for gateway operations.
///
/// Variants carry enough context (offending element, path, numeric reason
/// code) for the caller to act without consulting engine-internal logs.
/// Stack traces and backend internals never ride along.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// A referenced case source, artifact, or run directory does not exist.
    #[error("not found: {path}")]
    NotFound {
        /// The path or identifier that failed to resolve.
        path: String,
    },

    /// The engine rejected the input as structurally invalid.
    #[error("failed to parse '{path}': {detail}")]
    Parse {
        /// Source being parsed.
        path: String,
        /// What was wrong with it.
        detail: String,
    },

    /// A required tool argument is missing.
    #[error("tool '{tool}' requires argument '{name}'")]
    MissingArgument {
        /// The tool being invoked.
        tool: String,
        /// The missing parameter name.
        name: String,
    },

    /// A tool argument has the wrong semantic type.
    #[error("argument '{name}' of tool '{tool}' expects {expected}, got {actual}")]
    TypeMismatch {
        /// The tool being invoked.
        tool: String,
        /// The offending parameter name.
        name: String,
        /// The declared parameter type.
        expected: &'static str,
        /// The type actually supplied.
        actual: String,
    },

    /// An argument was supplied that the tool does not declare.
    #[error("tool '{tool}' has no parameter '{name}'")]
    UnknownArgument {
        /// The tool being invoked.
        tool: String,
        /// The undeclared argument name.
        name: String,
    },

    /// The requested tool is not in the catalog.
    #[error("unknown tool: {name}")]
    UnknownTool {
        /// The requested tool name.
        name: String,
    },

    /// A mutation target does not resolve to an element of the loaded case.
    #[error("unknown element: {target}")]
    UnknownElement {
        /// The unresolved target identifier.
        target: String,
    },

    /// A value violates a declared domain constraint.
    #[error("invalid value for '{field}' on '{target}': {reason}")]
    InvalidValue {
        /// The element being changed.
        target: String,
        /// The field the value was destined for.
        field: String,
        /// Why the value is outside the declared domain.
        reason: String,
    },

    /// The tool was invoked in a session state that forbids it.
    #[error("'{operation}' requires a {required} session, but the session is {status}")]
    Precondition {
        /// The operation that was refused.
        operation: String,
        /// The state the operation requires.
        required: &'static str,
        /// The session state at the time of the call.
        status: String,
    },

    /// The solve ran to completion without converging. Recoverable: the
    /// caller may retry with different parameters.
    #[error("solution did not converge after {iterations} iterations (max mismatch {max_mismatch_pu:.3e} pu)")]
    Convergence {
        /// Iterations performed before giving up.
        iterations: usize,
        /// Largest remaining power mismatch in per-unit.
        max_mismatch_pu: f64,
    },

    /// Opaque backend failure. The original message is preserved verbatim.
    #[error("engine failure: {message}")]
    Engine {
        /// The backend's own message.
        message: String,
        /// Numeric reason code, when the backend provides one.
        code: Option<i32>,
    },

    /// An artifact read or write failed.
    #[error("i/o failure on '{path}': {message}")]
    Io {
        /// The file or directory involved.
        path: String,
        /// The underlying OS error message.
        message: String,
    },

    /// An invocation is already in flight; nothing is queued.
    #[error("an invocation is already in flight; retry after it completes")]
    Busy,
}

impl GatewayError {
    /// Builds an i/o error with path context from a raw OS error.
    pub fn io(path: impl Into<String>, err: &std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            message: err.to_string(),
        }
    }

    /// Builds an opaque engine error from a message.
    pub fn engine(message: impl Into<String>) -> Self {
        Self::Engine {
            message: message.into(),
            code: None,
        }
    }

    /// Returns the taxonomy kind of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Parse { .. } => ErrorKind::ParseError,
            Self::MissingArgument { .. } => ErrorKind::MissingArgument,
            Self::TypeMismatch { .. } | Self::UnknownArgument { .. } => ErrorKind::TypeMismatch,
            Self::UnknownTool { .. } => ErrorKind::UnknownTool,
            Self::UnknownElement { .. } => ErrorKind::UnknownElement,
            Self::InvalidValue { .. } => ErrorKind::InvalidValue,
            Self::Precondition { .. } => ErrorKind::PreconditionError,
            Self::Convergence { .. } => ErrorKind::ConvergenceError,
            Self::Engine { .. } => ErrorKind::EngineError,
            Self::Io { .. } => ErrorKind::IoError,
            Self::Busy => ErrorKind::SessionBusy,
        }
    }

    /// Returns true if the caller may retry the same call and plausibly
    /// succeed without changing the session first.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Convergence { .. } | Self::Busy)
    }

    /// Structured context for the failure response, keyed by stable names.
    #[must_use]
    pub fn context(&self) -> BTreeMap<String, Value> {
        let mut ctx = BTreeMap::new();
        match self {
            Self::NotFound { path } | Self::Io { path, .. } => {
                ctx.insert("path".to_string(), Value::from(path.as_str()));
            }
            Self::Parse { path, .. } => {
                ctx.insert("path".to_string(), Value::from(path.as_str()));
            }
            Self::MissingArgument { name, .. }
            | Self::TypeMismatch { name, .. }
            | Self::UnknownArgument { name, .. } => {
                ctx.insert("argument".to_string(), Value::from(name.as_str()));
            }
            Self::UnknownTool { name } => {
                ctx.insert("tool".to_string(), Value::from(name.as_str()));
            }
            Self::UnknownElement { target } => {
                ctx.insert("target".to_string(), Value::from(target.as_str()));
            }
            Self::InvalidValue { target, field, .. } => {
                ctx.insert("target".to_string(), Value::from(target.as_str()));
                ctx.insert("field".to_string(), Value::from(field.as_str()));
            }
            Self::Precondition { status, .. } => {
                ctx.insert("status".to_string(), Value::from(status.as_str()));
            }
            Self::Convergence {
                iterations,
                max_mismatch_pu,
            } => {
                ctx.insert("iterations".to_string(), Value::from(*iterations as i64));
                ctx.insert("max_mismatch_pu".to_string(), Value::from(*max_mismatch_pu));
            }
            Self::Engine { code, .. } => {
                if let Some(code) = code {
                    ctx.insert("code".to_string(), Value::from(i64::from(*code)));
                }
            }
            Self::Busy => {}
        }
        ctx
    }
}

/// The Error Translator: every backend fault becomes a typed gateway error
/// here, and nowhere else.
impl From<EngineFault> for GatewayError {
    fn from(fault: EngineFault) -> Self {
        match fault {
            EngineFault::SourceMissing { path } => Self::NotFound { path },
            EngineFault::Malformed { path, detail } => Self::Parse { path, detail },
            EngineFault::UnknownElement { target } => Self::UnknownElement { target },
            EngineFault::InvalidValue {
                target,
                field,
                reason,
            } => Self::InvalidValue {
                target,
                field,
                reason,
            },
            EngineFault::Backend { message, code } => Self::Engine { message, code },
        }
    }
}

/// Result type alias for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;
