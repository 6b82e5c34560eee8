//! MCP server exposing Grasshopper as tools and resources.
//!
//! This module implements the MCP server lifecycle:
//!
//! 1. **Initialisation**: Capability negotiation and version agreement
//! 2. **Operation**: Handling tool calls, resource reads and other requests
//! 3. **Shutdown**: EOF on stdin or a termination signal
//!
//! Every tool call becomes one or more requests to the Grasshopper component
//! through [`CommandDispatcher`]. An unreachable Grasshopper is not a protocol
//! error: the tool result carries `{"success": false, "error": ...}`.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::grasshopper::{CommandDispatcher, ConnectRequest, PortRef};
use crate::mcp::protocol::{
    ErrorCode, IncomingMessage, JsonRpcError, JsonRpcErrorData, JsonRpcNotification,
    JsonRpcRequest, JsonRpcResponse, RequestId, MCP_PROTOCOL_VERSION, SERVER_NAME,
};
use crate::mcp::transport::{LineTransport, StdioTransport};

/// URI of the live status snapshot.
pub const STATUS_URI: &str = "grasshopper://status";
/// URI of the component guide.
pub const COMPONENT_GUIDE_URI: &str = "grasshopper://component_guide";
/// URI of the component library.
pub const COMPONENT_LIBRARY_URI: &str = "grasshopper://component_library";
/// URI of the component hints.
pub const COMPONENT_HINTS_URI: &str = "grasshopper://component_hints";

const JSON_MIME_TYPE: &str = "application/json";

/// Server state in the MCP lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Waiting for initialize request.
    AwaitingInit,
    /// Initialize received, waiting for initialized notification.
    Initialising,
    /// Ready for normal operation.
    Running,
    /// Shutdown in progress.
    ShuttingDown,
}

/// Server capabilities advertised during initialisation.
#[derive(Debug, Clone, Serialize)]
pub struct ServerCapabilities {
    /// Tool-related capabilities.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<ToolCapabilities>,
    /// Resource-related capabilities.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceCapabilities>,
}

impl Default for ServerCapabilities {
    fn default() -> Self {
        Self {
            tools: Some(ToolCapabilities::default()),
            resources: Some(ResourceCapabilities::default()),
        }
    }
}

/// Tool-specific capabilities.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ToolCapabilities {
    /// Whether the tool list can change during the session.
    #[serde(rename = "listChanged", skip_serializing_if = "is_false")]
    pub list_changed: bool,
}

/// Resource-specific capabilities.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResourceCapabilities {
    /// Whether clients may subscribe to resource updates.
    #[serde(skip_serializing_if = "is_false")]
    pub subscribe: bool,
    /// Whether the resource list can change during the session.
    #[serde(rename = "listChanged", skip_serializing_if = "is_false")]
    pub list_changed: bool,
}

#[allow(clippy::trivially_copy_pass_by_ref)] // serde's skip_serializing_if requires a predicate fn(&T) -> bool, so we must take &bool here
const fn is_false(b: &bool) -> bool {
    !*b
}

/// Server information for initialisation response.
#[derive(Debug, Clone, Serialize)]
pub struct ServerInfo {
    /// Server name.
    pub name: String,
    /// Server version.
    pub version: String,
}

impl Default for ServerInfo {
    fn default() -> Self {
        Self {
            name: SERVER_NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Client information received during initialisation.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientInfo {
    /// Client name.
    pub name: String,
    /// Client version.
    #[serde(default)]
    pub version: Option<String>,
}

/// Parameters for the initialize request.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    /// Protocol version requested by client.
    pub protocol_version: String,
    /// Client capabilities.
    #[serde(default)]
    pub capabilities: Value,
    /// Client information.
    #[serde(default)]
    pub client_info: Option<ClientInfo>,
}

/// A tool definition for tools/list response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    /// Unique tool name.
    pub name: String,
    /// Human-readable description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON Schema for the tool's input parameters.
    pub input_schema: Value,
}

/// A resource definition for resources/list response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDefinition {
    /// Resource URI.
    pub uri: &'static str,
    /// Short display name.
    pub name: &'static str,
    /// Human-readable description.
    pub description: &'static str,
    /// MIME type of the contents.
    pub mime_type: &'static str,
}

/// Parameters for tools/call request.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolCallParams {
    /// Name of the tool to call.
    pub name: String,
    /// Arguments for the tool.
    #[serde(default)]
    pub arguments: Value,
}

/// Parameters for resources/read request.
#[derive(Debug, Clone, Deserialize)]
pub struct ResourceReadParams {
    /// URI of the resource to read.
    pub uri: String,
}

/// Content item in a tool call response.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ToolContent {
    /// Text content.
    Text {
        /// The text content.
        text: String,
    },
}

/// Result of a tool call.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallResult {
    /// Content returned by the tool.
    pub content: Vec<ToolContent>,
    /// Whether the tool call resulted in an error.
    #[serde(skip_serializing_if = "is_false")]
    pub is_error: bool,
}

impl ToolCallResult {
    /// Creates a successful text result.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text { text: text.into() }],
            is_error: false,
        }
    }

    /// Creates an error text result.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text {
                text: message.into(),
            }],
            is_error: true,
        }
    }

    /// Creates a successful result holding pretty-printed JSON.
    pub fn json(value: &impl Serialize) -> Self {
        Self::text(pretty_json(value))
    }
}

fn pretty_json(value: &impl Serialize) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|e| {
        tracing::error!(error = %e, "Failed to serialise tool output");
        json!({ "success": false, "error": e.to_string() }).to_string()
    })
}

// ==================== Argument access ====================

fn required_str<'a>(arguments: &'a Value, key: &str) -> Result<&'a str, String> {
    arguments
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| format!("Missing required parameter: {key}"))
}

fn optional_str<'a>(arguments: &'a Value, key: &str) -> Result<Option<&'a str>, String> {
    match arguments.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(_) => Err(format!("Parameter {key} must be a string")),
    }
}

fn required_f64(arguments: &Value, key: &str) -> Result<f64, String> {
    let value = arguments
        .get(key)
        .ok_or_else(|| format!("Missing required parameter: {key}"))?;
    value
        .as_f64()
        .filter(|v| v.is_finite())
        .ok_or_else(|| format!("Parameter {key} must be a finite number"))
}

fn optional_index(arguments: &Value, key: &str) -> Result<Option<u32>, String> {
    match arguments.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_u64()
            .and_then(|v| u32::try_from(v).ok())
            .map(Some)
            .ok_or_else(|| format!("Parameter {key} must be a non-negative integer")),
    }
}

/// Reads one side of a connection: `{side}_param` wins over `{side}_param_index`.
fn port_argument(arguments: &Value, side: &str) -> Result<Option<PortRef>, String> {
    let name = optional_str(arguments, &format!("{side}_param"))?.map(str::to_string);
    let index = optional_index(arguments, &format!("{side}_param_index"))?;
    Ok(PortRef::from_parts(name, index))
}

/// The MCP server for Grasshopper.
pub struct McpServer<R = tokio::io::Stdin, W = tokio::io::Stdout> {
    /// Current server state.
    state: ServerState,
    /// The transport layer.
    transport: LineTransport<R, W>,
    /// Negotiated protocol version (set after initialisation).
    protocol_version: Option<String>,
    /// Executes tools against Grasshopper.
    dispatcher: CommandDispatcher,
}

impl McpServer {
    /// Creates a server on stdin/stdout.
    #[must_use]
    pub fn new(dispatcher: CommandDispatcher) -> Self {
        Self::with_transport(dispatcher, StdioTransport::stdio())
    }

    /// Runs the MCP server main loop with graceful shutdown handling.
    ///
    /// # Errors
    ///
    /// Returns an error if transport I/O fails.
    pub async fn run(&mut self) -> std::io::Result<()> {
        self.run_with_shutdown().await
    }

    /// Runs the main loop and handles shutdown.
    #[cfg(unix)]
    async fn run_with_shutdown(&mut self) -> std::io::Result<()> {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigint = signal(SignalKind::interrupt()).map_err(std::io::Error::other)?;
        let mut sigterm = signal(SignalKind::terminate()).map_err(std::io::Error::other)?;

        loop {
            tokio::select! {
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT, initiating graceful shutdown");
                    self.state = ServerState::ShuttingDown;
                    return Ok(());
                }

                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM, initiating graceful shutdown");
                    self.state = ServerState::ShuttingDown;
                    return Ok(());
                }

                line_result = self.transport.read_line() => {
                    if self.handle_transport_result(line_result).await? {
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Runs the main loop and handles shutdown.
    #[cfg(windows)]
    async fn run_with_shutdown(&mut self) -> std::io::Result<()> {
        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);

        loop {
            tokio::select! {
                _ = &mut ctrl_c => {
                    tracing::info!("Received Ctrl+C, initiating graceful shutdown");
                    self.state = ServerState::ShuttingDown;
                    return Ok(());
                }

                line_result = self.transport.read_line() => {
                    if self.handle_transport_result(line_result).await? {
                        return Ok(());
                    }
                }
            }
        }
    }
}

impl<R, W> McpServer<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Creates a server over an arbitrary transport.
    pub fn with_transport(dispatcher: CommandDispatcher, transport: LineTransport<R, W>) -> Self {
        Self {
            state: ServerState::AwaitingInit,
            transport,
            protocol_version: None,
            dispatcher,
        }
    }

    /// Returns the current server state.
    #[must_use]
    pub const fn state(&self) -> ServerState {
        self.state
    }

    /// Returns the negotiated protocol version, once initialised.
    #[must_use]
    pub fn protocol_version(&self) -> Option<&str> {
        self.protocol_version.as_deref()
    }

    /// Processes messages until the input closes, without signal handling.
    ///
    /// # Errors
    ///
    /// Returns an error if transport I/O fails.
    pub async fn serve(&mut self) -> std::io::Result<()> {
        loop {
            let line_result = self.transport.read_line().await;
            if self.handle_transport_result(line_result).await? {
                return Ok(());
            }
        }
    }

    /// Handles the result from transport read.
    ///
    /// Returns `true` if the server should shut down.
    async fn handle_transport_result(
        &mut self,
        line_result: std::io::Result<Option<String>>,
    ) -> std::io::Result<bool> {
        let Some(line) = line_result? else {
            tracing::debug!("Input closed, shutting down");
            self.state = ServerState::ShuttingDown;
            return Ok(true);
        };

        if line.trim().is_empty() {
            return Ok(false);
        }

        self.handle_line(&line).await?;

        Ok(self.state == ServerState::ShuttingDown)
    }

    /// Handles a single line of input.
    async fn handle_line(&mut self, line: &str) -> std::io::Result<()> {
        use crate::mcp::protocol::parse_message;

        match parse_message(line) {
            Ok(msg) => self.handle_message(msg).await,
            Err(error) => {
                tracing::debug!(code = error.error.code, "Rejected malformed message");
                self.transport.write_error(&error).await
            }
        }
    }

    /// Handles a parsed incoming message.
    async fn handle_message(&mut self, msg: IncomingMessage) -> std::io::Result<()> {
        match msg {
            IncomingMessage::Request(req) => self.handle_request(req).await,
            IncomingMessage::Notification(ref notif) => {
                self.handle_notification(notif);
                Ok(())
            }
        }
    }

    /// Handles an incoming request.
    async fn handle_request(&mut self, req: JsonRpcRequest) -> std::io::Result<()> {
        tracing::debug!(id = %req.id, method = %req.method, "Handling request");

        let response = match req.method.as_str() {
            "initialize" => self.handle_initialize(&req),
            "tools/list" => self.handle_tools_list(&req),
            "tools/call" => self.handle_tools_call(&req).await,
            "resources/list" => self.handle_resources_list(&req),
            "resources/read" => self.handle_resources_read(&req).await,
            "ping" => Ok(Self::handle_ping(&req)),
            _ => Err(JsonRpcError::method_not_found(req.id.clone(), &req.method)),
        };

        match response {
            Ok(resp) => self.transport.write_response(&resp).await,
            Err(error) => self.transport.write_error(&error).await,
        }
    }

    /// Handles an incoming notification.
    fn handle_notification(&mut self, notif: &JsonRpcNotification) {
        if notif.method == "notifications/initialized" && self.state == ServerState::Initialising {
            tracing::info!("Client initialised, server running");
            self.state = ServerState::Running;
        }
    }

    /// Handles the initialize request.
    fn handle_initialize(&mut self, req: &JsonRpcRequest) -> Result<JsonRpcResponse, JsonRpcError> {
        if self.state != ServerState::AwaitingInit {
            return Err(JsonRpcError::new(
                Some(req.id.clone()),
                JsonRpcErrorData::with_message(
                    ErrorCode::InvalidRequest,
                    "Server already initialised",
                ),
            ));
        }

        let params: InitializeParams = parse_params(req, "initialize")?;
        if let Some(client) = &params.client_info {
            tracing::info!(
                client = %client.name,
                version = client.version.as_deref().unwrap_or("unknown"),
                requested = %params.protocol_version,
                "Initialising MCP session"
            );
        }

        let negotiated_version = MCP_PROTOCOL_VERSION.to_string();

        self.protocol_version = Some(negotiated_version.clone());
        self.state = ServerState::Initialising;

        let result = json!({
            "protocolVersion": negotiated_version,
            "capabilities": ServerCapabilities::default(),
            "serverInfo": ServerInfo::default(),
        });

        Ok(JsonRpcResponse::success(req.id.clone(), result))
    }

    /// Handles the tools/list request.
    fn handle_tools_list(&self, req: &JsonRpcRequest) -> Result<JsonRpcResponse, JsonRpcError> {
        self.require_running(&req.id)?;

        let result = json!({
            "tools": tool_definitions(),
        });

        Ok(JsonRpcResponse::success(req.id.clone(), result))
    }

    /// Handles the tools/call request.
    async fn handle_tools_call(&self, req: &JsonRpcRequest) -> Result<JsonRpcResponse, JsonRpcError> {
        self.require_running(&req.id)?;

        let params: ToolCallParams = parse_params(req, "tool call")?;
        tracing::debug!(tool = %params.name, "Calling tool");

        let result = match self.call_tool(&params.name, &params.arguments).await {
            Ok(result) => result,
            Err(message) => {
                tracing::debug!(tool = %params.name, error = %message, "Tool call rejected");
                ToolCallResult::error(message)
            }
        };

        let result_value = serde_json::to_value(&result).map_err(|e| {
            tracing::error!(error = %e, "Failed to serialise tool call result");
            JsonRpcError::internal_error(
                req.id.clone(),
                "Internal error: failed to serialise result",
            )
        })?;

        Ok(JsonRpcResponse::success(req.id.clone(), result_value))
    }

    /// Handles the resources/list request.
    fn handle_resources_list(&self, req: &JsonRpcRequest) -> Result<JsonRpcResponse, JsonRpcError> {
        self.require_running(&req.id)?;

        let result = json!({
            "resources": resource_definitions(),
        });

        Ok(JsonRpcResponse::success(req.id.clone(), result))
    }

    /// Handles the resources/read request.
    async fn handle_resources_read(
        &self,
        req: &JsonRpcRequest,
    ) -> Result<JsonRpcResponse, JsonRpcError> {
        self.require_running(&req.id)?;

        let params: ResourceReadParams = parse_params(req, "resource read")?;

        let contents = match params.uri.as_str() {
            STATUS_URI => Ok(self.dispatcher.status_snapshot().await),
            COMPONENT_GUIDE_URI => self.dispatcher.component_guide().await,
            COMPONENT_LIBRARY_URI => self.dispatcher.component_library().await,
            COMPONENT_HINTS_URI => self.dispatcher.component_hints().await,
            other => return Err(JsonRpcError::resource_not_found(req.id.clone(), other)),
        }
        .map_err(|e| {
            tracing::error!(uri = %params.uri, error = %e, "Failed to read resource");
            JsonRpcError::internal_error(req.id.clone(), e.to_string())
        })?;

        let result = json!({
            "contents": [{
                "uri": params.uri,
                "mimeType": JSON_MIME_TYPE,
                "text": pretty_json(&contents),
            }],
        });

        Ok(JsonRpcResponse::success(req.id.clone(), result))
    }

    /// Handles the ping request.
    fn handle_ping(req: &JsonRpcRequest) -> JsonRpcResponse {
        JsonRpcResponse::success(req.id.clone(), json!({}))
    }

    /// Ensures the server is in the Running state.
    fn require_running(&self, id: &RequestId) -> Result<(), JsonRpcError> {
        if self.state != ServerState::Running {
            return Err(JsonRpcError::new(
                Some(id.clone()),
                JsonRpcErrorData::with_message(ErrorCode::InvalidRequest, "Server not initialised"),
            ));
        }
        Ok(())
    }

    /// Runs one tool. `Err` carries an argument error for the caller.
    #[allow(clippy::too_many_lines)]
    async fn call_tool(&self, name: &str, arguments: &Value) -> Result<ToolCallResult, String> {
        let gh = &self.dispatcher;

        let result = match name {
            // Document
            "add_component" => {
                let component_type = required_str(arguments, "component_type")?;
                let x = required_f64(arguments, "x")?;
                let y = required_f64(arguments, "y")?;
                gh.add_component(component_type, x, y).await
            }
            "delete_component" => {
                gh.delete_component(required_str(arguments, "component_id")?)
                    .await
            }
            "move_component" => {
                let id = required_str(arguments, "component_id")?;
                let x = required_f64(arguments, "x")?;
                let y = required_f64(arguments, "y")?;
                gh.move_component(id, x, y).await
            }
            "clear_document" => gh.clear_document().await,
            "save_document" => {
                let path = required_str(arguments, "path")?;
                return Ok(match gh.save_document(path).await {
                    Ok(payload) => ToolCallResult::json(&payload),
                    Err(e) => ToolCallResult::error(e.to_string()),
                });
            }
            "load_document" => {
                let path = required_str(arguments, "path")?;
                return Ok(match gh.load_document(path).await {
                    Ok(payload) => ToolCallResult::json(&payload),
                    Err(e) => ToolCallResult::error(e.to_string()),
                });
            }
            "get_document_info" => gh.get_document_info().await,

            // Connections
            "connect_components" => {
                let request = ConnectRequest {
                    source_id: required_str(arguments, "source_id")?.to_string(),
                    target_id: required_str(arguments, "target_id")?.to_string(),
                    source_port: port_argument(arguments, "source")?,
                    target_port: port_argument(arguments, "target")?,
                };
                gh.connect_components(request).await
            }
            "get_connections" => gh.get_connections().await,
            "validate_connection" => {
                let source_id = required_str(arguments, "source_id")?;
                let target_id = required_str(arguments, "target_id")?;
                let source_param = optional_str(arguments, "source_param")?.map(str::to_string);
                let target_param = optional_str(arguments, "target_param")?.map(str::to_string);
                gh.validate_connection(source_id, target_id, source_param, target_param)
                    .await
            }

            // Patterns
            "create_pattern" => gh.create_pattern(required_str(arguments, "description")?).await,
            "get_available_patterns" => {
                gh.get_available_patterns(required_str(arguments, "query")?)
                    .await
            }

            // Components
            "get_component_info" => {
                gh.get_component_info(required_str(arguments, "component_id")?)
                    .await
            }
            "set_component_value" => {
                let id = required_str(arguments, "component_id")?;
                let value = arguments
                    .get("value")
                    .cloned()
                    .ok_or_else(|| "Missing required parameter: value".to_string())?;
                gh.set_component_value(id, value).await
            }
            "get_all_components" => gh.get_all_components().await,
            "search_components" => gh.search_components(required_str(arguments, "query")?).await,
            "get_component_parameters" => {
                gh.get_component_parameters(required_str(arguments, "component_type")?)
                    .await
            }
            "get_geometry" => gh.get_geometry(required_str(arguments, "component_id")?).await,

            // Scripting
            "execute_preview" => gh.execute_preview().await,
            "execute_script" => gh.execute_script(required_str(arguments, "script")?).await,
            "create_macro" => {
                let name = required_str(arguments, "name")?;
                let macro_text = required_str(arguments, "macro")?;
                gh.create_macro(name, macro_text).await
            }
            "run_macro" => {
                let name = optional_str(arguments, "name")?;
                let macro_text = optional_str(arguments, "macro")?;
                if name.is_none() && macro_text.is_none() {
                    return Err("Either name or macro is required".to_string());
                }
                gh.run_macro(name, macro_text).await
            }
            "snapshot" => gh.snapshot(optional_str(arguments, "name")?).await,
            "revert_snapshot" => gh.revert_snapshot(required_str(arguments, "name")?).await,
            "run_gh_python" => gh.run_gh_python(required_str(arguments, "script")?).await,

            _ => return Ok(ToolCallResult::error(format!("Unknown tool: {name}"))),
        };

        Ok(ToolCallResult::json(&result))
    }
}

/// Deserialises request params, mapping failures to invalid-params errors.
fn parse_params<T: serde::de::DeserializeOwned>(
    req: &JsonRpcRequest,
    what: &str,
) -> Result<T, JsonRpcError> {
    req.params
        .as_ref()
        .map(|p| serde_json::from_value(p.clone()))
        .transpose()
        .map_err(|e| JsonRpcError::invalid_params(req.id.clone(), format!("Invalid {what} params: {e}")))?
        .ok_or_else(|| JsonRpcError::invalid_params(req.id.clone(), format!("Missing {what} params")))
}

/// Returns the resources served by this server.
#[must_use]
pub fn resource_definitions() -> Vec<ResourceDefinition> {
    vec![
        ResourceDefinition {
            uri: STATUS_URI,
            name: "Grasshopper status",
            description: "Document info, components with their settings and connections, \
                          and usage recommendations for the current canvas",
            mime_type: JSON_MIME_TYPE,
        },
        ResourceDefinition {
            uri: COMPONENT_GUIDE_URI,
            name: "Component guide",
            description: "How to use common components and how to connect them",
            mime_type: JSON_MIME_TYPE,
        },
        ResourceDefinition {
            uri: COMPONENT_LIBRARY_URI,
            name: "Component library",
            description: "Catalog of Grasshopper components grouped by category, with inputs and outputs",
            mime_type: JSON_MIME_TYPE,
        },
        ResourceDefinition {
            uri: COMPONENT_HINTS_URI,
            name: "Component hints",
            description: "Short hints that tell easily confused components apart",
            mime_type: JSON_MIME_TYPE,
        },
    ]
}

fn tool(name: &str, description: &str, input_schema: Value) -> ToolDefinition {
    ToolDefinition {
        name: name.to_string(),
        description: Some(description.to_string()),
        input_schema,
    }
}

fn no_arguments() -> Value {
    json!({ "type": "object", "properties": {} })
}

fn string_property(description: &str) -> Value {
    json!({ "type": "string", "description": description })
}

/// Returns the list of available tools.
#[allow(clippy::too_many_lines)]
#[must_use]
pub fn tool_definitions() -> Vec<ToolDefinition> {
    let component_id = string_property("ID of the component");

    vec![
        // === Document ===
        tool(
            "add_component",
            "Add a component to the Grasshopper canvas. Common names are normalised, \
             e.g. 'slider' becomes 'Number Slider' and 'plus' becomes 'Addition'. \
             Use 'Number Slider' for single numeric values and 'MD Slider' only for vectors.",
            json!({
                "type": "object",
                "properties": {
                    "component_type": string_property(
                        "Type of component to add (e.g. 'Number Slider', 'Addition', 'Panel', 'Circle')"
                    ),
                    "x": { "type": "number", "description": "X coordinate on the canvas" },
                    "y": { "type": "number", "description": "Y coordinate on the canvas" }
                },
                "required": ["component_type", "x", "y"]
            }),
        ),
        tool(
            "delete_component",
            "Remove a component from the canvas.",
            json!({
                "type": "object",
                "properties": { "component_id": component_id },
                "required": ["component_id"]
            }),
        ),
        tool(
            "move_component",
            "Move a component to a new canvas position.",
            json!({
                "type": "object",
                "properties": {
                    "component_id": component_id,
                    "x": { "type": "number", "description": "New X coordinate" },
                    "y": { "type": "number", "description": "New Y coordinate" }
                },
                "required": ["component_id", "x", "y"]
            }),
        ),
        tool(
            "clear_document",
            "Remove every component from the current Grasshopper document.",
            no_arguments(),
        ),
        tool(
            "save_document",
            "Save the current Grasshopper document. Fails with the host's message if the save fails.",
            json!({
                "type": "object",
                "properties": { "path": string_property("Path where the .gh document is saved") },
                "required": ["path"]
            }),
        ),
        tool(
            "load_document",
            "Load a Grasshopper document. Fails with the host's message if the load fails.",
            json!({
                "type": "object",
                "properties": { "path": string_property("Path of the .gh document to load") },
                "required": ["path"]
            }),
        ),
        tool(
            "get_document_info",
            "Get information about the current Grasshopper document.",
            no_arguments(),
        ),
        // === Connections ===
        tool(
            "connect_components",
            "Connect an output of one component to an input of another. Ports may be given by \
             name or index; the name wins when both are given. Without a target port, \
             connections into Addition, Subtraction, Multiplication, Division and Math go to \
             input A, or to B when A is already connected.",
            json!({
                "type": "object",
                "properties": {
                    "source_id": string_property("ID of the source component (output)"),
                    "target_id": string_property("ID of the target component (input)"),
                    "source_param": string_property("Name of the source parameter"),
                    "target_param": string_property("Name of the target parameter"),
                    "source_param_index": {
                        "type": "integer",
                        "minimum": 0,
                        "description": "Index of the source parameter, used if source_param is not given"
                    },
                    "target_param_index": {
                        "type": "integer",
                        "minimum": 0,
                        "description": "Index of the target parameter, used if target_param is not given"
                    }
                },
                "required": ["source_id", "target_id"]
            }),
        ),
        tool(
            "get_connections",
            "List every connection between components in the current document.",
            no_arguments(),
        ),
        tool(
            "validate_connection",
            "Check whether a connection between two components is possible.",
            json!({
                "type": "object",
                "properties": {
                    "source_id": string_property("ID of the source component (output)"),
                    "target_id": string_property("ID of the target component (input)"),
                    "source_param": string_property("Name of the source parameter"),
                    "target_param": string_property("Name of the target parameter")
                },
                "required": ["source_id", "target_id"]
            }),
        ),
        // === Patterns ===
        tool(
            "create_pattern",
            "Create a group of components from a high-level description, e.g. '3D voronoi cube'.",
            json!({
                "type": "object",
                "properties": { "description": string_property("What to create") },
                "required": ["description"]
            }),
        ),
        tool(
            "get_available_patterns",
            "List the patterns that match a query.",
            json!({
                "type": "object",
                "properties": { "query": string_property("Query to search for patterns") },
                "required": ["query"]
            }),
        ),
        // === Components ===
        tool(
            "get_component_info",
            "Get detailed information about a component: inputs, outputs, current values, \
             catalog details and its connections.",
            json!({
                "type": "object",
                "properties": { "component_id": component_id },
                "required": ["component_id"]
            }),
        ),
        tool(
            "set_component_value",
            "Set the value of a component such as a Number Slider or Panel.",
            json!({
                "type": "object",
                "properties": {
                    "component_id": component_id,
                    "value": { "description": "New value (number, string or object)" }
                },
                "required": ["component_id", "value"]
            }),
        ),
        tool(
            "get_all_components",
            "List every component in the document with ID, type, position, catalog details, \
             slider settings and connections.",
            no_arguments(),
        ),
        tool(
            "search_components",
            "Search the installed Grasshopper components by name or category.",
            json!({
                "type": "object",
                "properties": { "query": string_property("Search query") },
                "required": ["query"]
            }),
        ),
        tool(
            "get_component_parameters",
            "List the input and output parameters of a component type.",
            json!({
                "type": "object",
                "properties": { "component_type": string_property("Component type name") },
                "required": ["component_type"]
            }),
        ),
        tool(
            "get_geometry",
            "Get the preview data produced by each output of a component.",
            json!({
                "type": "object",
                "properties": { "component_id": component_id },
                "required": ["component_id"]
            }),
        ),
        // === Scripting ===
        tool(
            "execute_preview",
            "Recompute the Grasshopper solution and refresh the Rhino preview.",
            no_arguments(),
        ),
        tool(
            "execute_script",
            "Run a Rhino command script.",
            json!({
                "type": "object",
                "properties": { "script": string_property("Rhino command script") },
                "required": ["script"]
            }),
        ),
        tool(
            "create_macro",
            "Store a Rhino command macro under a name for later use with run_macro.",
            json!({
                "type": "object",
                "properties": {
                    "name": string_property("Macro name"),
                    "macro": string_property("Rhino command macro text")
                },
                "required": ["name", "macro"]
            }),
        ),
        tool(
            "run_macro",
            "Run a stored macro by name, or inline macro text. A stored macro wins when both are given.",
            json!({
                "type": "object",
                "properties": {
                    "name": string_property("Name of a stored macro"),
                    "macro": string_property("Inline macro text")
                }
            }),
        ),
        tool(
            "snapshot",
            "Save a snapshot of the current document that can be restored with revert_snapshot.",
            json!({
                "type": "object",
                "properties": {
                    "name": string_property("Snapshot name; generated if omitted")
                }
            }),
        ),
        tool(
            "revert_snapshot",
            "Restore the document from a named snapshot.",
            json!({
                "type": "object",
                "properties": { "name": string_property("Snapshot name") },
                "required": ["name"]
            }),
        ),
        tool(
            "run_gh_python",
            "Run a Python script inside Rhino.",
            json!({
                "type": "object",
                "properties": { "script": string_property("Python source") },
                "required": ["script"]
            }),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grasshopper::{
        GrasshopperClient, HostCommand, KnowledgeBaseAccessor, TcpTransport, WireProtocol,
    };
    use std::sync::Arc;
    use std::time::Duration;

    fn dispatcher() -> CommandDispatcher {
        let transport = TcpTransport::new("127.0.0.1", 9, Duration::from_millis(100));
        CommandDispatcher::new(
            GrasshopperClient::new(transport, WireProtocol::Legacy),
            Arc::new(KnowledgeBaseAccessor::default()),
        )
    }

    #[test]
    fn server_initial_state() {
        let server = McpServer::with_transport(
            dispatcher(),
            LineTransport::new(tokio::io::empty(), tokio::io::sink()),
        );
        assert_eq!(server.state(), ServerState::AwaitingInit);
        assert!(server.protocol_version().is_none());
    }

    #[test]
    fn tool_definitions_valid() {
        let tools = tool_definitions();
        assert_eq!(tools.len(), HostCommand::ALL.len());

        for tool in &tools {
            assert!(!tool.name.is_empty());
            assert!(tool.input_schema.is_object());
        }
    }

    #[test]
    fn every_command_has_a_tool() {
        let tools = tool_definitions();
        for command in HostCommand::ALL {
            assert!(
                tools.iter().any(|t| t.name == command.as_str()),
                "no tool for {command}"
            );
        }
    }

    #[test]
    fn resources_are_json() {
        let resources = resource_definitions();
        assert_eq!(resources.len(), 4);
        assert!(resources.iter().all(|r| r.mime_type == "application/json"));
        assert!(resources.iter().all(|r| r.uri.starts_with("grasshopper://")));
    }

    #[test]
    fn tool_call_result_text() {
        let result = ToolCallResult::text("Hello, world!");
        assert!(!result.is_error);
        assert_eq!(result.content.len(), 1);

        match &result.content[0] {
            ToolContent::Text { text } => assert_eq!(text, "Hello, world!"),
        }
    }

    #[test]
    fn tool_call_result_error() {
        let result = ToolCallResult::error("Something went wrong");
        assert!(result.is_error);
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["isError"], true);
    }

    #[test]
    fn port_name_beats_index() {
        let args = json!({"target_param": "B", "target_param_index": 0});
        assert_eq!(
            port_argument(&args, "target").unwrap(),
            Some(PortRef::Name("B".into()))
        );

        let args = json!({"source_param_index": 2});
        assert_eq!(port_argument(&args, "source").unwrap(), Some(PortRef::Index(2)));
        assert_eq!(port_argument(&args, "target").unwrap(), None);
    }

    #[test]
    fn zero_index_is_distinct_from_absent() {
        let args = json!({"target_param_index": 0});
        assert_eq!(port_argument(&args, "target").unwrap(), Some(PortRef::Index(0)));
    }

    #[test]
    fn argument_type_errors() {
        let args = json!({"x": "left", "target_param_index": -1, "name": 5});
        assert!(required_f64(&args, "x").unwrap_err().contains("finite number"));
        assert!(required_f64(&args, "y").unwrap_err().contains("Missing"));
        assert!(optional_index(&args, "target_param_index").is_err());
        assert!(optional_str(&args, "name").is_err());
        assert_eq!(optional_str(&args, "absent").unwrap(), None);
    }

    #[tokio::test]
    async fn missing_arguments_are_tool_errors() {
        let server = McpServer::with_transport(
            dispatcher(),
            LineTransport::new(tokio::io::empty(), tokio::io::sink()),
        );
        let err = server.call_tool("add_component", &json!({"x": 0, "y": 0})).await.unwrap_err();
        assert_eq!(err, "Missing required parameter: component_type");

        let err = server.call_tool("run_macro", &json!({})).await.unwrap_err();
        assert!(err.contains("name or macro"));

        let result = server.call_tool("draw_unicorn", &json!({})).await.unwrap();
        assert!(result.is_error);
    }
}
