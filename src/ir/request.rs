//! Tool request envelope.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::value::{FieldMap, Value};

/// One tool invocation as it crosses the boundary.
///
/// The envelope provides protocol versioning, a unique request id for
/// tracing, and a creation timestamp for audit logs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolRequest {
    /// Protocol version (e.g. "1.0").
    pub version: String,

    /// Unique identifier for this request.
    pub request_id: Uuid,

    /// When this request was created.
    pub timestamp: DateTime<Utc>,

    /// The tool to invoke.
    pub tool: String,

    /// Arguments, keyed by parameter name.
    #[serde(default)]
    pub arguments: FieldMap,
}

impl ToolRequest {
    /// Current protocol version.
    pub const CURRENT_VERSION: &'static str = "1.0";

    /// Creates a request for the named tool with no arguments.
    pub fn new(tool: impl Into<String>) -> Self {
        Self {
            version: Self::CURRENT_VERSION.to_string(),
            request_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            tool: tool.into(),
            arguments: FieldMap::new(),
        }
    }

    /// Adds one argument, builder style.
    #[must_use]
    pub fn with_argument(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.arguments.insert(name.into(), value.into());
        self
    }

    /// Sets a custom request id (useful for correlation).
    #[must_use]
    pub fn with_request_id(mut self, request_id: Uuid) -> Self {
        self.request_id = request_id;
        self
    }
}
