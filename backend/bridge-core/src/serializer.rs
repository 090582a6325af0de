//! Wire JSON ⇄ typed values.
//!
//! A command declares its parameters as an ordered list of [`ParamSpec`]s.
//! Incoming arguments are checked against that plan before the handler runs,
//! so shape mismatches surface as a decoding failure naming the parameter
//! instead of a failed cast deep inside the handler.

use crate::command::cancellation::CancellationFlag;
use crate::error::command::InvokeError;

use std::fmt::{Display, Formatter, Result as FormatResult};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Semantic type of a parameter or return value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    String,
    Integer,
    Float,
    Boolean,
    /// A JSON object decoded into a typed struct.
    Record,
    /// A JSON object kept as an untyped key-value map.
    Map,
    Array,
    Null,
    Any,
}

impl ValueKind {
    pub fn accepts(self, value: &Value) -> bool {
        match self {
            ValueKind::String => value.is_string(),
            ValueKind::Integer => value.is_i64() || value.is_u64(),
            ValueKind::Float => value.is_number(),
            ValueKind::Boolean => value.is_boolean(),
            ValueKind::Record | ValueKind::Map => value.is_object(),
            ValueKind::Array => value.is_array(),
            ValueKind::Null => value.is_null(),
            ValueKind::Any => true,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            ValueKind::String => "string",
            ValueKind::Integer => "integer",
            ValueKind::Float => "float",
            ValueKind::Boolean => "boolean",
            ValueKind::Record => "record",
            ValueKind::Map => "map",
            ValueKind::Array => "array",
            ValueKind::Null => "null",
            ValueKind::Any => "any",
        }
    }
}

impl Display for ValueKind {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> FormatResult {
        formatter.write_str(self.as_str())
    }
}

/// Name of the JSON type of `value`, for error messages.
pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(number) if number.is_f64() => "float",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParamSpec {
    pub name: String,
    pub kind: ValueKind,
    pub required: bool,
}

/// Declaration of one command: its name, parameter plan and result kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandSpec {
    name: String,
    params: Vec<ParamSpec>,
    returns: ValueKind,
}

impl CommandSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            returns: ValueKind::Any,
        }
    }

    /// Appends a required parameter.
    pub fn param(mut self, name: impl Into<String>, kind: ValueKind) -> Self {
        self.params.push(ParamSpec {
            name: name.into(),
            kind,
            required: true,
        });
        self
    }

    /// Appends an optional parameter. Missing and `null` both decode to `None`.
    pub fn optional(mut self, name: impl Into<String>, kind: ValueKind) -> Self {
        self.params.push(ParamSpec {
            name: name.into(),
            kind,
            required: false,
        });
        self
    }

    pub fn returns(mut self, kind: ValueKind) -> Self {
        self.returns = kind;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &[ParamSpec] {
        &self.params
    }

    pub fn return_kind(&self) -> ValueKind {
        self.returns
    }

    /// Checks `raw` against the parameter plan and collects the declared values.
    ///
    /// `raw` may be `null` (no arguments), an object (by name) or an array
    /// (by position). Keys that the plan does not declare are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`InvokeError::Decoding`] naming the first parameter that is
    /// missing or has the wrong shape.
    pub fn decode(&self, raw: &Value) -> Result<Args, InvokeError> {
        let mut values = Map::new();

        match raw {
            Value::Null => {
                for param in &self.params {
                    check_param(param, None)?;
                }
            }
            Value::Object(object) => {
                for param in &self.params {
                    let value = object.get(&param.name);
                    if let Some(value) = check_param(param, value)? {
                        values.insert(param.name.clone(), value.clone());
                    }
                }
            }
            Value::Array(items) => {
                if items.len() > self.params.len() {
                    return Err(InvokeError::decoding(
                        format!("#{}", self.params.len()),
                        format!(
                            "expected at most {} positional arguments, got {}",
                            self.params.len(),
                            items.len()
                        ),
                    ));
                }
                for (index, param) in self.params.iter().enumerate() {
                    if let Some(value) = check_param(param, items.get(index))? {
                        values.insert(param.name.clone(), value.clone());
                    }
                }
            }
            other => {
                return Err(InvokeError::decoding(
                    "args",
                    format!(
                        "expected an object or array of arguments, got {}",
                        json_type_name(other)
                    ),
                ));
            }
        }

        Ok(Args {
            values,
            cancellation: CancellationFlag::default(),
        })
    }

    /// Serializes a handler result and checks it against the declared kind.
    ///
    /// # Errors
    ///
    /// Returns [`InvokeError::Encoding`] when serialization fails or the value
    /// does not match [`CommandSpec::return_kind`].
    #[track_caller]
    pub fn encode<R: Serialize>(&self, result: R) -> Result<Value, InvokeError> {
        encode_as(self.returns, result)
    }
}

#[track_caller]
pub(crate) fn encode_as<R: Serialize>(kind: ValueKind, result: R) -> Result<Value, InvokeError> {
    let location = common::ErrorLocation::caller();
    let value = serde_json::to_value(result).map_err(|e| InvokeError::Encoding {
        message: e.to_string(),
        location,
    })?;

    if !kind.accepts(&value) {
        return Err(InvokeError::Encoding {
            message: format!(
                "declared {kind} result but handler produced {}",
                json_type_name(&value)
            ),
            location,
        });
    }

    Ok(value)
}

fn check_param<'a>(
    param: &ParamSpec,
    value: Option<&'a Value>,
) -> Result<Option<&'a Value>, InvokeError> {
    match value {
        None | Some(Value::Null) if param.required && param.kind != ValueKind::Null => Err(
            InvokeError::decoding(&param.name, "missing required value"),
        ),
        None => Ok(None),
        Some(Value::Null) if param.kind != ValueKind::Null && param.kind != ValueKind::Any => {
            Ok(None)
        }
        Some(value) if param.kind.accepts(value) => Ok(Some(value)),
        Some(value) => Err(InvokeError::decoding(
            &param.name,
            format!("expected {}, got {}", param.kind, json_type_name(value)),
        )),
    }
}

/// Arguments of one call, already checked against the command's plan.
#[derive(Debug, Clone, Default)]
pub struct Args {
    values: Map<String, Value>,
    cancellation: CancellationFlag,
}

impl Args {
    /// Decodes a required parameter into `T`.
    ///
    /// # Errors
    ///
    /// Returns [`InvokeError::Decoding`] if the value is absent or does not
    /// fit `T` (for example an integer out of range).
    #[track_caller]
    pub fn get<T: DeserializeOwned>(&self, name: &str) -> Result<T, InvokeError> {
        match self.get_optional(name)? {
            Some(value) => Ok(value),
            None => Err(InvokeError::decoding(name, "missing required value")),
        }
    }

    /// Decodes an optional parameter into `T`.
    ///
    /// # Errors
    ///
    /// Returns [`InvokeError::Decoding`] if the value is present but does not fit `T`.
    #[track_caller]
    pub fn get_optional<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>, InvokeError> {
        self.values
            .get(name)
            .map(|value| {
                serde_json::from_value(value.clone())
                    .map_err(|e| InvokeError::decoding(name, e.to_string()))
            })
            .transpose()
    }

    /// Returns a `map` parameter as an untyped object.
    ///
    /// # Errors
    ///
    /// Returns [`InvokeError::Decoding`] if the value is absent or not an object.
    #[track_caller]
    pub fn map(&self, name: &str) -> Result<Map<String, Value>, InvokeError> {
        match self.values.get(name) {
            Some(Value::Object(object)) => Ok(object.clone()),
            Some(other) => Err(InvokeError::decoding(
                name,
                format!("expected map, got {}", json_type_name(other)),
            )),
            None => Err(InvokeError::decoding(name, "missing required value")),
        }
    }

    pub fn raw(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Cooperative cancellation flag of the request these arguments belong to.
    pub fn cancellation(&self) -> &CancellationFlag {
        &self.cancellation
    }

    pub(crate) fn with_cancellation(mut self, flag: CancellationFlag) -> Self {
        self.cancellation = flag;
        self
    }
}
