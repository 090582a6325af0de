//! Wire format between the dispatch loop and the UI surface.
//!
//! Requests arrive as `{"cmd": <string>, "args": <object|array|null>}` with the
//! correlation id supplied by the transport. Responses and events leave as
//! script text, because `eval` is the only outbound primitive a bridge offers.

use crate::error::dispatch::DispatchError;
use crate::event::Event;

use std::fmt::{Display, Formatter, Result as FormatResult};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Hook name the dispatch loop binds on the bridge.
pub const INVOKE_HOOK: &str = "__bridge_invoke";

/// UI function that receives every [`Response`].
pub const RESPONSE_CALLBACK: &str = "window.__BRIDGE__.resolve";

/// UI function that receives every pushed event.
pub const EVENT_CALLBACK: &str = "window.__BRIDGE__.emit";

/// Opaque id chosen by the caller; echoed back untouched.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for CorrelationId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> FormatResult {
        formatter.write_str(&self.0)
    }
}

impl From<String> for CorrelationId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for CorrelationId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<u64> for CorrelationId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

/// A parsed request, before its command is resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub command: String,
    pub args: Value,
}

impl Request {
    /// # Errors
    ///
    /// Returns [`DispatchError::Protocol`] if `raw` is not JSON, is not an
    /// object, lacks a non-empty string `cmd`, or carries `args` that are not
    /// an object, an array or null.
    #[track_caller]
    pub fn parse(raw: &str) -> Result<Self, DispatchError> {
        let value: Value = serde_json::from_str(raw)
            .map_err(|e| DispatchError::protocol(format!("malformed request: {e}")))?;

        let Value::Object(mut object) = value else {
            return Err(DispatchError::protocol("malformed request: expected a JSON object"));
        };

        let command = match object.remove("cmd") {
            Some(Value::String(command)) if !command.trim().is_empty() => command,
            Some(Value::String(_)) => {
                return Err(DispatchError::protocol("malformed request: 'cmd' is empty"));
            }
            Some(_) => {
                return Err(DispatchError::protocol(
                    "malformed request: 'cmd' must be a string",
                ));
            }
            None => return Err(DispatchError::protocol("malformed request: missing 'cmd'")),
        };

        let args = match object.remove("args") {
            None | Some(Value::Null) => Value::Null,
            Some(args @ (Value::Object(_) | Value::Array(_))) => args,
            Some(_) => {
                return Err(DispatchError::protocol(
                    "malformed request: 'args' must be an object, an array or null",
                ));
            }
        };

        Ok(Self { command, args })
    }

    /// Request JSON as a UI would send it.
    pub fn to_json(&self) -> String {
        let mut object = Map::new();
        object.insert(String::from("cmd"), Value::String(self.command.clone()));
        object.insert(String::from("args"), self.args.clone());
        Value::Object(object).to_string()
    }
}

/// Failure category carried by a failed [`Response`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    #[serde(rename = "ProtocolError")]
    Protocol,
    #[serde(rename = "UnknownCommandError")]
    UnknownCommand,
    #[serde(rename = "DecodingError")]
    Decoding,
    #[serde(rename = "HandlerError")]
    Handler,
}

/// Outcome of one request, tagged with the request's correlation id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub correlation_id: CorrelationId,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

impl Response {
    pub fn success(correlation_id: CorrelationId, result: Value) -> Self {
        Self {
            correlation_id,
            success: true,
            result: Some(result),
            error: None,
            error_kind: None,
        }
    }

    pub fn failure(correlation_id: CorrelationId, error: &DispatchError) -> Self {
        Self {
            correlation_id,
            success: false,
            result: None,
            error: Some(error.wire_message()),
            error_kind: Some(error.kind()),
        }
    }

    pub fn from_outcome(
        correlation_id: CorrelationId,
        outcome: &Result<Value, DispatchError>,
    ) -> Self {
        match outcome {
            Ok(value) => Self::success(correlation_id, value.clone()),
            Err(error) => Self::failure(correlation_id, error),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub payload: Value,
    pub timestamp: u64,
}

/// `window.__BRIDGE__.resolve({...})`
///
/// # Errors
///
/// Returns the serializer error if the response cannot be rendered.
pub fn response_script(response: &Response) -> Result<String, serde_json::Error> {
    let body = serde_json::to_string(response)?;
    Ok(format!("{RESPONSE_CALLBACK}({body})"))
}

/// `window.__BRIDGE__.emit("name", {"payload": ..., "timestamp": ...})`
///
/// # Errors
///
/// Returns the serializer error if the payload cannot be rendered.
pub fn event_script(event: &Event) -> Result<String, serde_json::Error> {
    let name = serde_json::to_string(event.name())?;
    let envelope = serde_json::to_string(&event.envelope())?;
    Ok(format!("{EVENT_CALLBACK}({name}, {envelope})"))
}

/// Recovers the [`Response`] from a script produced by [`response_script`].
pub fn parse_response_script(script: &str) -> Option<Response> {
    let body = call_arguments(script, RESPONSE_CALLBACK)?;
    serde_json::from_str(body).ok()
}

/// Recovers `(event name, envelope)` from a script produced by [`event_script`].
pub fn parse_event_script(script: &str) -> Option<(String, EventEnvelope)> {
    let arguments = call_arguments(script, EVENT_CALLBACK)?;
    serde_json::from_str(&format!("[{arguments}]")).ok()
}

fn call_arguments<'a>(script: &'a str, callback: &str) -> Option<&'a str> {
    script
        .trim()
        .strip_prefix(callback)?
        .strip_prefix('(')?
        .strip_suffix(')')
}
