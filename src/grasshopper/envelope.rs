//! Wire envelopes exchanged with the Grasshopper component.
//!
//! Two request/response shapes exist on the socket:
//!
//! - **Legacy**: `{"type": <command>, "parameters": {...}}` out,
//!   `{"success": bool, "data"|"result": ..., "error": ...}` back.
//! - **JSON-RPC 2.0**: `{"jsonrpc": "2.0", "id": <uuid>, "method": <command>, "params": {...}}`
//!   out, `{"jsonrpc": "2.0", "id": <uuid>, "result"|"error": ...}` back.
//!
//! The outbound shape is chosen by [`WireProtocol`]. Inbound documents are classified by
//! the presence of the `jsonrpc` tag and normalised straight away into a [`HostResult`],
//! so nothing past this module needs to know which shape arrived.

use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::{Serialize, Serializer};
use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::grasshopper::error::HostError;

/// JSON-RPC protocol tag value.
pub const JSONRPC_VERSION: &str = "2.0";

/// Parameter mapping of a command, kept in insertion order.
pub type Parameters = IndexMap<String, Value>;

/// Envelope shape used for outbound requests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WireProtocol {
    /// `{"type", "parameters"}` requests.
    #[default]
    Legacy,
    /// JSON-RPC 2.0 requests with a UUID correlation id.
    JsonRpc,
}

impl WireProtocol {
    /// Returns the configuration spelling of this protocol.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Legacy => "legacy",
            Self::JsonRpc => "jsonrpc",
        }
    }
}

impl fmt::Display for WireProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WireProtocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "legacy" => Ok(Self::Legacy),
            "jsonrpc" | "json-rpc" | "jsonrpc2" => Ok(Self::JsonRpc),
            other => Err(format!(
                "Unsupported protocol '{other}' (expected legacy|jsonrpc)"
            )),
        }
    }
}

impl<'de> serde::Deserialize<'de> for WireProtocol {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Commands understood by the Grasshopper component.
///
/// Each MCP tool maps onto the command of the same name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostCommand {
    AddComponent,
    DeleteComponent,
    MoveComponent,
    ClearDocument,
    SaveDocument,
    LoadDocument,
    GetDocumentInfo,
    ConnectComponents,
    CreatePattern,
    GetAvailablePatterns,
    GetComponentInfo,
    SetComponentValue,
    GetAllComponents,
    GetConnections,
    SearchComponents,
    GetComponentParameters,
    ValidateConnection,
    ExecutePreview,
    ExecuteScript,
    CreateMacro,
    RunMacro,
    Snapshot,
    RevertSnapshot,
    GetGeometry,
    RunGhPython,
}

impl HostCommand {
    /// Every command, in tool-list order.
    pub const ALL: [Self; 25] = [
        Self::AddComponent,
        Self::DeleteComponent,
        Self::MoveComponent,
        Self::ClearDocument,
        Self::SaveDocument,
        Self::LoadDocument,
        Self::GetDocumentInfo,
        Self::ConnectComponents,
        Self::CreatePattern,
        Self::GetAvailablePatterns,
        Self::GetComponentInfo,
        Self::SetComponentValue,
        Self::GetAllComponents,
        Self::GetConnections,
        Self::SearchComponents,
        Self::GetComponentParameters,
        Self::ValidateConnection,
        Self::ExecutePreview,
        Self::ExecuteScript,
        Self::CreateMacro,
        Self::RunMacro,
        Self::Snapshot,
        Self::RevertSnapshot,
        Self::GetGeometry,
        Self::RunGhPython,
    ];

    /// Returns the wire name of this command.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AddComponent => "add_component",
            Self::DeleteComponent => "delete_component",
            Self::MoveComponent => "move_component",
            Self::ClearDocument => "clear_document",
            Self::SaveDocument => "save_document",
            Self::LoadDocument => "load_document",
            Self::GetDocumentInfo => "get_document_info",
            Self::ConnectComponents => "connect_components",
            Self::CreatePattern => "create_pattern",
            Self::GetAvailablePatterns => "get_available_patterns",
            Self::GetComponentInfo => "get_component_info",
            Self::SetComponentValue => "set_component_value",
            Self::GetAllComponents => "get_all_components",
            Self::GetConnections => "get_connections",
            Self::SearchComponents => "search_components",
            Self::GetComponentParameters => "get_component_parameters",
            Self::ValidateConnection => "validate_connection",
            Self::ExecutePreview => "execute_preview",
            Self::ExecuteScript => "execute_script",
            Self::CreateMacro => "create_macro",
            Self::RunMacro => "run_macro",
            Self::Snapshot => "snapshot",
            Self::RevertSnapshot => "revert_snapshot",
            Self::GetGeometry => "get_geometry",
            Self::RunGhPython => "run_gh_python",
        }
    }
}

impl fmt::Display for HostCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HostCommand {
    type Err = HostError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|command| command.as_str() == s)
            .ok_or_else(|| HostError::UnknownCommand {
                name: s.to_string(),
            })
    }
}

/// A single outbound command.
#[derive(Debug, Clone, PartialEq)]
pub struct HostRequest {
    /// Correlation id, present only for JSON-RPC requests.
    pub id: Option<String>,
    /// The command to run.
    pub command: HostCommand,
    /// Command parameters.
    pub params: Parameters,
}

#[derive(Serialize)]
struct LegacyRequest<'a> {
    #[serde(rename = "type")]
    command: &'static str,
    parameters: &'a Parameters,
}

#[derive(Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    id: &'a str,
    method: &'static str,
    params: &'a Parameters,
}

/// Uniform in-memory result of any host response.
///
/// Carries a success flag and the response body. For failures the body always has
/// an `error` entry; for successes the most specific payload is reachable through
/// [`HostResult::payload`].
#[derive(Debug, Clone, PartialEq)]
pub struct HostResult {
    success: bool,
    body: Value,
    /// `true` when `body` is a whole legacy envelope rather than a bare JSON-RPC result.
    enveloped: bool,
}

impl HostResult {
    /// Creates a failure result with the given error text.
    pub fn failure(message: impl Into<String>) -> Self {
        Self::failure_value(Value::String(message.into()))
    }

    /// Creates a failure result carrying an arbitrary error value.
    #[must_use]
    pub fn failure_value(error: Value) -> Self {
        Self {
            success: false,
            body: json!({ "success": false, "error": error }),
            enveloped: true,
        }
    }

    /// Wraps a legacy `{"success": ...}` body.
    ///
    /// A missing or non-boolean `success` field counts as failure.
    #[must_use]
    pub fn from_legacy(body: Value) -> Self {
        let success = body
            .get("success")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        Self {
            success,
            body,
            enveloped: true,
        }
    }

    /// Wraps the `result` member of a JSON-RPC response.
    ///
    /// The result is successful unless it explicitly says `"success": false`. Its
    /// payload is the result itself, whatever fields it carries.
    #[must_use]
    pub fn from_rpc_result(result: Value) -> Self {
        let success = result
            .get("success")
            .and_then(Value::as_bool)
            .unwrap_or(true);
        Self {
            success,
            body: result,
            enveloped: false,
        }
    }

    /// Returns whether the host reported success.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.success
    }

    /// Returns the full response body.
    #[must_use]
    pub const fn body(&self) -> &Value {
        &self.body
    }

    /// Consumes the result and returns the full response body.
    #[must_use]
    pub fn into_value(self) -> Value {
        self.body
    }

    /// Returns the host's error text, or `None` for successful results.
    ///
    /// Falls back to the `message` field and then to a generic text.
    #[must_use]
    pub fn error_message(&self) -> Option<String> {
        if self.success {
            return None;
        }
        let text = ["error", "message"]
            .iter()
            .filter_map(|key| self.body.get(*key))
            .find_map(describe_error)
            .unwrap_or_else(|| "Unknown error".to_string());
        Some(text)
    }

    /// Returns the most specific payload.
    ///
    /// For legacy envelopes this is `result`, else `data`, else the whole body. A
    /// JSON-RPC result is its own payload.
    #[must_use]
    pub fn payload(&self) -> &Value {
        match self.payload_key() {
            Some(key) => &self.body[key],
            None => &self.body,
        }
    }

    /// Mutable access to the payload chosen by [`HostResult::payload`].
    pub fn payload_mut(&mut self) -> &mut Value {
        match self.payload_key() {
            Some(key) => &mut self.body[key],
            None => &mut self.body,
        }
    }

    /// Consumes the result and returns its payload.
    #[must_use]
    pub fn into_payload(mut self) -> Value {
        match self.payload_key() {
            Some(key) => self.body[key].take(),
            None => self.body,
        }
    }

    fn payload_key(&self) -> Option<&'static str> {
        if !self.enveloped {
            return None;
        }
        let object = self.body.as_object()?;
        ["result", "data"]
            .into_iter()
            .find(|key| object.get(*key).is_some_and(|v| !v.is_null()))
    }
}

impl Serialize for HostResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.body.serialize(serializer)
    }
}

fn describe_error(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Object(obj) => obj
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| Some(value.to_string())),
        other => Some(other.to_string()),
    }
}

/// Outcome carried by a JSON-RPC response.
#[derive(Debug, Clone, PartialEq)]
pub enum RpcOutcome {
    /// The `result` member.
    Result(Value),
    /// The `error` member.
    Error(Value),
}

/// A response document, classified by shape.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseEnvelope {
    /// A document without a `jsonrpc` tag.
    Legacy(Value),
    /// A JSON-RPC 2.0 response.
    JsonRpc {
        /// The correlation id echoed by the host.
        id: Option<Value>,
        /// Result or error member.
        outcome: RpcOutcome,
    },
}

impl ResponseEnvelope {
    /// Parses raw response bytes and classifies the envelope.
    ///
    /// A UTF-8 byte-order mark and surrounding whitespace (including the line
    /// terminator) are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not UTF-8, not JSON, not a JSON object, or a
    /// JSON-RPC document carrying neither `result` nor `error`.
    pub fn parse(raw: &[u8]) -> Result<Self, HostError> {
        let mut object = parse_object(raw)?;

        let Some(tag) = object.get("jsonrpc") else {
            return Ok(Self::Legacy(Value::Object(object)));
        };
        if tag.as_str() != Some(JSONRPC_VERSION) {
            return Err(HostError::malformed(format!(
                "unsupported jsonrpc version {tag}"
            )));
        }

        let id = object.remove("id");
        let outcome = if let Some(result) = object.remove("result") {
            RpcOutcome::Result(result)
        } else if let Some(error) = object.remove("error") {
            RpcOutcome::Error(error)
        } else {
            return Err(HostError::malformed(
                "JSON-RPC response carries neither result nor error",
            ));
        };

        Ok(Self::JsonRpc { id, outcome })
    }

    /// Returns the correlation id of a JSON-RPC response.
    #[must_use]
    pub const fn correlation_id(&self) -> Option<&Value> {
        match self {
            Self::Legacy(_) => None,
            Self::JsonRpc { id, .. } => id.as_ref(),
        }
    }

    /// Normalises the envelope into a [`HostResult`].
    #[must_use]
    pub fn into_result(self) -> HostResult {
        match self {
            Self::Legacy(body) => HostResult::from_legacy(body),
            Self::JsonRpc {
                outcome: RpcOutcome::Result(result),
                ..
            } => HostResult::from_rpc_result(result),
            Self::JsonRpc {
                outcome: RpcOutcome::Error(error),
                ..
            } => HostResult::failure_value(error),
        }
    }
}

/// Encodes requests and decodes responses for one [`WireProtocol`].
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvelopeCodec {
    protocol: WireProtocol,
}

impl EnvelopeCodec {
    /// Creates a codec producing the given request shape.
    #[must_use]
    pub const fn new(protocol: WireProtocol) -> Self {
        Self { protocol }
    }

    /// Returns the outbound protocol.
    #[must_use]
    pub const fn protocol(&self) -> WireProtocol {
        self.protocol
    }

    /// Builds a request, assigning a fresh correlation id for JSON-RPC.
    #[must_use]
    pub fn request(&self, command: HostCommand, params: Parameters) -> HostRequest {
        let id = match self.protocol {
            WireProtocol::Legacy => None,
            WireProtocol::JsonRpc => Some(Uuid::new_v4().to_string()),
        };
        HostRequest {
            id,
            command,
            params,
        }
    }

    /// Serialises a request into one JSON line (without the terminator).
    ///
    /// # Errors
    ///
    /// Returns an error if a parameter value cannot be serialised.
    pub fn encode(&self, request: &HostRequest) -> Result<Vec<u8>, HostError> {
        let encoded = match self.protocol {
            WireProtocol::Legacy => serde_json::to_vec(&LegacyRequest {
                command: request.command.as_str(),
                parameters: &request.params,
            }),
            WireProtocol::JsonRpc => {
                let fresh;
                let id = if let Some(id) = request.id.as_deref() {
                    id
                } else {
                    fresh = Uuid::new_v4().to_string();
                    &fresh
                };
                serde_json::to_vec(&JsonRpcRequest {
                    jsonrpc: JSONRPC_VERSION,
                    id,
                    method: request.command.as_str(),
                    params: &request.params,
                })
            }
        };
        encoded.map_err(|source| HostError::InvalidJson { source })
    }

    /// Decodes raw response bytes into the uniform result.
    ///
    /// # Errors
    ///
    /// See [`ResponseEnvelope::parse`].
    pub fn decode(raw: &[u8]) -> Result<HostResult, HostError> {
        ResponseEnvelope::parse(raw).map(ResponseEnvelope::into_result)
    }

    /// Decodes a request line in either shape.
    ///
    /// This is the host-side view of [`EnvelopeCodec::encode`].
    ///
    /// # Errors
    ///
    /// Returns an error if the line is not a JSON object, names an unknown command, or
    /// carries parameters that are not an object.
    pub fn decode_request(raw: &[u8]) -> Result<HostRequest, HostError> {
        let mut object = parse_object(raw)?;

        let (id, name_key, params_key) = if object.contains_key("jsonrpc") {
            let id = match object.remove("id") {
                Some(Value::String(s)) => Some(s),
                Some(Value::Null) | None => None,
                Some(other) => Some(other.to_string()),
            };
            (id, "method", "params")
        } else {
            (None, "type", "parameters")
        };

        let name = object
            .get(name_key)
            .and_then(Value::as_str)
            .ok_or_else(|| HostError::malformed(format!("request is missing '{name_key}'")))?;
        let command: HostCommand = name.parse()?;

        let params = match object.remove(params_key) {
            None | Some(Value::Null) => Parameters::new(),
            Some(Value::Object(map)) => map.into_iter().collect(),
            Some(_) => {
                return Err(HostError::malformed(format!(
                    "'{params_key}' must be an object"
                )))
            }
        };

        Ok(HostRequest {
            id,
            command,
            params,
        })
    }
}

fn parse_object(raw: &[u8]) -> Result<Map<String, Value>, HostError> {
    let (text, had_errors) = encoding_rs::UTF_8.decode_with_bom_removal(raw);
    if had_errors {
        return Err(HostError::InvalidEncoding);
    }

    let value: Value =
        serde_json::from_str(text.trim()).map_err(|source| HostError::InvalidJson { source })?;

    match value {
        Value::Object(object) => Ok(object),
        _ => Err(HostError::malformed("expected a JSON object")),
    }
}
