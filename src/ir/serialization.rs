//! JSON helpers for requests and results.
//!
//! Deserialization failures surface as `ParseError` so a malformed request
//! line still produces a taxonomy-conformant failure response.

use serde::Serialize;

use crate::error::{GatewayError, GatewayResult};
use crate::ir::{InvocationResult, ToolRequest};

/// Serializes a request or result to compact JSON.
pub fn to_json<T: Serialize>(value: &T) -> GatewayResult<String> {
    serde_json::to_string(value).map_err(|e| GatewayError::Parse {
        path: "<serialize>".to_string(),
        detail: e.to_string(),
    })
}

/// Serializes a request or result to pretty-printed JSON.
pub fn to_json_pretty<T: Serialize>(value: &T) -> GatewayResult<String> {
    serde_json::to_string_pretty(value).map_err(|e| GatewayError::Parse {
        path: "<serialize>".to_string(),
        detail: e.to_string(),
    })
}

/// Parses a [`ToolRequest`] from JSON.
pub fn request_from_json(json: &str) -> GatewayResult<ToolRequest> {
    serde_json::from_str(json).map_err(|e| GatewayError::Parse {
        path: "<request>".to_string(),
        detail: e.to_string(),
    })
}

/// Parses an [`InvocationResult`] from JSON.
pub fn result_from_json(json: &str) -> GatewayResult<InvocationResult> {
    serde_json::from_str(json).map_err(|e| GatewayError::Parse {
        path: "<response>".to_string(),
        detail: e.to_string(),
    })
}
