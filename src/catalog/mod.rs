//! The tool catalog: static descriptors and argument validation.
//!
//! Every exposed operation is one data-declared [`ToolDescriptor`] — name,
//! ordered parameter list, return-shape documentation, and a side-effect
//! class. The catalog is built once at process start and never changes.
//! Validation turns a caller's raw argument map into a checked [`ToolArgs`];
//! defaults are applied here and nothing else is coerced.

use serde::Serialize;

use crate::error::{GatewayError, GatewayResult};
use crate::value::{FieldMap, Value};

/// Semantic parameter types a tool can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamKind {
    /// `true` / `false`.
    Bool,
    /// A whole number.
    Integer,
    /// Any number; integers are accepted.
    Number,
    /// A UTF-8 string.
    String,
    /// An ordered sequence.
    List,
    /// A nested mapping.
    Object,
}

impl ParamKind {
    /// The name used in type-mismatch messages.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::String => "string",
            Self::List => "list",
            Self::Object => "object",
        }
    }

    /// Whether a supplied value satisfies this kind. A JSON integer
    /// satisfies `Number`; nothing else widens.
    #[must_use]
    pub const fn admits(&self, value: &Value) -> bool {
        match self {
            Self::Bool => matches!(value, Value::Bool(_)),
            Self::Integer => matches!(value, Value::Int(_)),
            Self::Number => matches!(value, Value::Int(_) | Value::Float(_)),
            Self::String => matches!(value, Value::String(_)),
            Self::List => matches!(value, Value::List(_)),
            Self::Object => matches!(value, Value::Map(_)),
        }
    }
}

/// How a tool interacts with session state. Documentation and
/// observability only; the serialized runtime enforces exclusivity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SideEffect {
    /// Inspects state without changing it.
    ReadOnly,
    /// Changes the session (load, solve, mutate, release).
    MutatesSession,
    /// Writes files into a run directory.
    ProducesArtifacts,
}

impl SideEffect {
    /// The wire name of this class.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ReadOnly => "read_only",
            Self::MutatesSession => "mutates_session",
            Self::ProducesArtifacts => "produces_artifacts",
        }
    }
}

/// One declared parameter.
#[derive(Debug, Clone, Serialize)]
pub struct ParamSpec {
    /// Parameter name.
    pub name: &'static str,
    /// Semantic type.
    pub kind: ParamKind,
    /// Whether a caller must supply it.
    pub required: bool,
    /// Default applied when an optional parameter is absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    /// One-line description.
    pub doc: &'static str,
}

impl ParamSpec {
    /// Declares a required parameter.
    #[must_use]
    pub const fn required(name: &'static str, kind: ParamKind, doc: &'static str) -> Self {
        Self {
            name,
            kind,
            required: true,
            default: None,
            doc,
        }
    }

    /// Declares an optional parameter without a default.
    #[must_use]
    pub const fn optional(name: &'static str, kind: ParamKind, doc: &'static str) -> Self {
        Self {
            name,
            kind,
            required: false,
            default: None,
            doc,
        }
    }

    /// Declares an optional parameter with a default value.
    #[must_use]
    pub const fn with_default(
        name: &'static str,
        kind: ParamKind,
        default: Value,
        doc: &'static str,
    ) -> Self {
        Self {
            name,
            kind,
            required: false,
            default: Some(default),
            doc,
        }
    }
}

/// Static metadata for one exposed tool.
#[derive(Debug, Clone, Serialize)]
pub struct ToolDescriptor {
    /// Tool name as invoked by callers.
    pub name: &'static str,
    /// One-line description.
    pub doc: &'static str,
    /// Ordered parameter list.
    pub params: Vec<ParamSpec>,
    /// Human-readable return shape.
    pub returns: &'static str,
    /// Side-effect class.
    pub side_effect: SideEffect,
}

impl ToolDescriptor {
    /// Validates raw arguments against this descriptor.
    ///
    /// Checks, in order: no undeclared argument names, every required
    /// parameter present, every supplied value of the declared kind.
    /// Defaults are filled in for absent optional parameters. Values are
    /// never otherwise coerced.
    pub fn validate(&self, arguments: &FieldMap) -> GatewayResult<ToolArgs> {
        for name in arguments.keys() {
            if !self.params.iter().any(|p| p.name == name.as_str()) {
                return Err(GatewayError::UnknownArgument {
                    tool: self.name.to_string(),
                    name: name.clone(),
                });
            }
        }

        let mut checked = FieldMap::new();
        for param in &self.params {
            match arguments.get(param.name) {
                Some(value) => {
                    if !param.kind.admits(value) {
                        return Err(GatewayError::TypeMismatch {
                            tool: self.name.to_string(),
                            name: param.name.to_string(),
                            expected: param.kind.as_str(),
                            actual: value.type_name().to_string(),
                        });
                    }
                    checked.insert(param.name.to_string(), value.clone());
                }
                None if param.required => {
                    return Err(GatewayError::MissingArgument {
                        tool: self.name.to_string(),
                        name: param.name.to_string(),
                    });
                }
                None => {
                    if let Some(default) = &param.default {
                        checked.insert(param.name.to_string(), default.clone());
                    }
                }
            }
        }

        Ok(ToolArgs {
            tool: self.name,
            values: checked,
        })
    }
}

/// An immutable, ordered collection of tool descriptors.
#[derive(Debug, Clone, Serialize)]
pub struct ToolCatalog {
    tools: Vec<ToolDescriptor>,
}

impl ToolCatalog {
    /// Builds a catalog from an ordered descriptor list.
    #[must_use]
    pub fn new(tools: Vec<ToolDescriptor>) -> Self {
        Self { tools }
    }

    /// Looks up a descriptor by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools.iter().find(|t| t.name == name)
    }

    /// All descriptors, in catalog order.
    #[must_use]
    pub fn descriptors(&self) -> &[ToolDescriptor] {
        &self.tools
    }

    /// All tool names, in catalog order.
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.tools.iter().map(|t| t.name).collect()
    }
}

/// Arguments that passed validation, with typed accessors.
///
/// Accessors return errors only if a handler asks for a parameter its own
/// descriptor never declared; with a consistent catalog they cannot fail.
#[derive(Debug, Clone)]
pub struct ToolArgs {
    tool: &'static str,
    values: FieldMap,
}

impl ToolArgs {
    /// Raw access to a validated value.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    fn missing(&self, name: &str) -> GatewayError {
        GatewayError::MissingArgument {
            tool: self.tool.to_string(),
            name: name.to_string(),
        }
    }

    /// A required or defaulted string argument.
    pub fn str_arg(&self, name: &str) -> GatewayResult<&str> {
        self.values
            .get(name)
            .and_then(Value::as_str)
            .ok_or_else(|| self.missing(name))
    }

    /// A required or defaulted numeric argument.
    pub fn f64_arg(&self, name: &str) -> GatewayResult<f64> {
        self.values
            .get(name)
            .and_then(Value::as_float)
            .ok_or_else(|| self.missing(name))
    }

    /// A required or defaulted integer argument, as usize.
    pub fn usize_arg(&self, name: &str) -> GatewayResult<usize> {
        let raw = self
            .values
            .get(name)
            .and_then(Value::as_int)
            .ok_or_else(|| self.missing(name))?;
        usize::try_from(raw).map_err(|_| GatewayError::InvalidValue {
            target: self.tool.to_string(),
            field: name.to_string(),
            reason: "must be non-negative".to_string(),
        })
    }

    /// A required or defaulted boolean argument.
    pub fn bool_arg(&self, name: &str) -> GatewayResult<bool> {
        self.values
            .get(name)
            .and_then(Value::as_bool)
            .ok_or_else(|| self.missing(name))
    }

    /// A required or defaulted list argument.
    pub fn list_arg(&self, name: &str) -> GatewayResult<&[Value]> {
        self.values
            .get(name)
            .and_then(Value::as_list)
            .ok_or_else(|| self.missing(name))
    }

    /// A required or defaulted object argument.
    pub fn map_arg(&self, name: &str) -> GatewayResult<&FieldMap> {
        self.values
            .get(name)
            .and_then(Value::as_map)
            .ok_or_else(|| self.missing(name))
    }

    /// An optional argument that may be absent.
    #[must_use]
    pub fn opt(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }
}
