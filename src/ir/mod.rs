//! Wire representation of tool invocations.
//!
//! A [`ToolRequest`] carries one named tool call with its arguments; an
//! [`InvocationResult`] carries the single structured response. Both are
//! fully serializable so the invocation boundary can live in any transport.

mod request;
mod response;
mod serialization;

pub use request::ToolRequest;
pub use response::InvocationResult;
pub use serialization::{request_from_json, result_from_json, to_json, to_json_pretty};
