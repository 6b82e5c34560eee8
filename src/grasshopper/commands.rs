//! The tool surface exposed to MCP clients.
//!
//! Most tools only build a parameter map and forward it. The exceptions:
//!
//! - `add_component` normalises the component type name
//! - `connect_components` picks an input port for binary arithmetic components
//! - `get_component_info` / `get_all_components` enrich descriptors from the knowledge base
//! - `save_document` / `load_document` turn a remote failure into an error
//!
//! The status resource aggregates several calls into one snapshot.

use std::sync::Arc;

use serde_json::{json, Map, Value};

use crate::grasshopper::client::{payload_list, GrasshopperClient};
use crate::grasshopper::envelope::{HostCommand, HostResult, Parameters};
use crate::grasshopper::error::CommandError;
use crate::grasshopper::heuristics::{
    attach_connections, ensure_slider_settings, is_binary_input_type, is_number_slider,
    merge_library_details, normalize_component_type, select_target_port, slider_settings,
    PortRef,
};
use crate::grasshopper::knowledge::{KnowledgeBase, KnowledgeBaseAccessor};

/// Usage advice included in every status snapshot.
const RECOMMENDATIONS: [&str; 4] = [
    "When needing a simple numeric input control, ALWAYS use 'Number Slider', not MD Slider",
    "For vector inputs (like 3D points), use 'MD Slider' or 'Construct Point' with multiple Number Sliders",
    "Use 'Panel' to display outputs and debug values",
    "When connecting multiple sliders to Addition, first slider goes to input A, second to input B",
];

/// A connection to create between two components.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    /// Component providing the output.
    pub source_id: String,
    /// Component receiving the input.
    pub target_id: String,
    /// Output port, if the caller chose one.
    pub source_port: Option<PortRef>,
    /// Input port, if the caller chose one.
    pub target_port: Option<PortRef>,
}

impl ConnectRequest {
    /// Creates a request that leaves both ports unspecified.
    pub fn new(source_id: impl Into<String>, target_id: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            target_id: target_id.into(),
            source_port: None,
            target_port: None,
        }
    }
}

/// Builds a parameter map from fixed entries.
fn params<const N: usize>(entries: [(&str, Value); N]) -> Parameters {
    entries
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect()
}

/// Adds `{side}Param` or `{side}ParamIndex` for a chosen port.
fn insert_port(params: &mut Parameters, side: &str, port: Option<PortRef>) {
    match port {
        Some(PortRef::Name(name)) => {
            params.insert(format!("{side}Param"), Value::String(name));
        }
        Some(PortRef::Index(index)) => {
            params.insert(format!("{side}ParamIndex"), json!(index));
        }
        None => {}
    }
}

fn component_id(id: &str) -> Parameters {
    params([("componentId", json!(id))])
}

/// Executes tools and resources against a Grasshopper instance.
#[derive(Debug, Clone)]
pub struct CommandDispatcher {
    client: GrasshopperClient,
    knowledge: Arc<KnowledgeBaseAccessor>,
}

impl CommandDispatcher {
    /// Creates a dispatcher.
    #[must_use]
    pub const fn new(client: GrasshopperClient, knowledge: Arc<KnowledgeBaseAccessor>) -> Self {
        Self { client, knowledge }
    }

    /// Returns the underlying client.
    #[must_use]
    pub const fn client(&self) -> &GrasshopperClient {
        &self.client
    }

    /// Returns the knowledge base accessor.
    #[must_use]
    pub fn knowledge(&self) -> &KnowledgeBaseAccessor {
        &self.knowledge
    }

    /// Loads the knowledge base, logging instead of failing.
    async fn knowledge_best_effort(&self) -> Option<Arc<KnowledgeBase>> {
        match self.knowledge.get().await {
            Ok(knowledge) => Some(knowledge),
            Err(e) => {
                tracing::warn!(error = %e, "Knowledge base unavailable, skipping enrichment");
                None
            }
        }
    }

    // ==================== Document ====================

    /// Adds a component at the given canvas position.
    ///
    /// The type name goes through the synonym table first, so `"slider"` becomes
    /// `"Number Slider"`.
    pub async fn add_component(&self, component_type: &str, x: f64, y: f64) -> HostResult {
        let normalized = normalize_component_type(component_type);
        if normalized != component_type {
            tracing::debug!(requested = component_type, normalized = %normalized, "Normalised component type");
        }
        let params = params([
            ("type", Value::String(normalized)),
            ("x", json!(x)),
            ("y", json!(y)),
        ]);
        self.client.send(HostCommand::AddComponent, params).await
    }

    /// Removes a component.
    pub async fn delete_component(&self, id: &str) -> HostResult {
        self.client
            .send(HostCommand::DeleteComponent, component_id(id))
            .await
    }

    /// Moves a component to a new canvas position.
    pub async fn move_component(&self, id: &str, x: f64, y: f64) -> HostResult {
        let params = params([("componentId", json!(id)), ("x", json!(x)), ("y", json!(y))]);
        self.client.send(HostCommand::MoveComponent, params).await
    }

    /// Removes every component from the document.
    pub async fn clear_document(&self) -> HostResult {
        self.client.send_empty(HostCommand::ClearDocument).await
    }

    /// Saves the document to `path`.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::Remote`] if Grasshopper reports failure.
    pub async fn save_document(&self, path: &str) -> Result<Value, CommandError> {
        let result = self
            .client
            .send(HostCommand::SaveDocument, params([("path", json!(path))]))
            .await;
        surface_failure("save document", result)
    }

    /// Loads the document at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::Remote`] if Grasshopper reports failure.
    pub async fn load_document(&self, path: &str) -> Result<Value, CommandError> {
        let result = self
            .client
            .send(HostCommand::LoadDocument, params([("path", json!(path))]))
            .await;
        surface_failure("load document", result)
    }

    /// Returns information about the open document.
    pub async fn get_document_info(&self) -> HostResult {
        self.client.send_empty(HostCommand::GetDocumentInfo).await
    }

    // ==================== Connections ====================

    /// Connects an output of one component to an input of another.
    ///
    /// Without an explicit target port, connections into binary arithmetic components
    /// bind to input `A`, or to `B` when `A` is already taken. The lookup is best
    /// effort; if it fails the request goes out without a target port.
    pub async fn connect_components(&self, request: ConnectRequest) -> HostResult {
        let target_port = match request.target_port {
            Some(port) => Some(port),
            None => self.infer_target_port(&request.target_id).await,
        };

        let mut params = params([
            ("sourceId", json!(request.source_id)),
            ("targetId", json!(request.target_id)),
        ]);
        insert_port(&mut params, "source", request.source_port);
        insert_port(&mut params, "target", target_port);

        self.client.send(HostCommand::ConnectComponents, params).await
    }

    async fn infer_target_port(&self, target_id: &str) -> Option<PortRef> {
        let info = self
            .client
            .send(HostCommand::GetComponentInfo, component_id(target_id))
            .await;
        if !info.is_success() {
            tracing::debug!(target_id, "Target lookup failed, leaving port to Grasshopper");
            return None;
        }
        let target_type = info.payload().get("type").and_then(Value::as_str)?;
        if !is_binary_input_type(target_type) {
            return None;
        }

        let connections = self.client.send_empty(HostCommand::GetConnections).await;
        if !connections.is_success() {
            tracing::debug!(target_id, "Connection lookup failed, leaving port to Grasshopper");
            return None;
        }

        let port = select_target_port(target_type, target_id, &payload_list(&connections));
        tracing::debug!(target_id, target_type, port = ?port, "Selected target port");
        port
    }

    /// Returns every connection in the document.
    pub async fn get_connections(&self) -> HostResult {
        self.client.send_empty(HostCommand::GetConnections).await
    }

    /// Asks Grasshopper whether a connection would be valid.
    pub async fn validate_connection(
        &self,
        source_id: &str,
        target_id: &str,
        source_param: Option<String>,
        target_param: Option<String>,
    ) -> HostResult {
        let mut params = params([("sourceId", json!(source_id)), ("targetId", json!(target_id))]);
        insert_port(&mut params, "source", source_param.map(PortRef::Name));
        insert_port(&mut params, "target", target_param.map(PortRef::Name));
        self.client.send(HostCommand::ValidateConnection, params).await
    }

    // ==================== Patterns ====================

    /// Creates a group of components from a high-level description.
    pub async fn create_pattern(&self, description: &str) -> HostResult {
        self.client
            .send(HostCommand::CreatePattern, params([("description", json!(description))]))
            .await
    }

    /// Lists the patterns matching `query`.
    pub async fn get_available_patterns(&self, query: &str) -> HostResult {
        self.client
            .send(HostCommand::GetAvailablePatterns, params([("query", json!(query))]))
            .await
    }

    // ==================== Components ====================

    /// Returns one component, enriched with catalog details, slider settings and
    /// its connections.
    pub async fn get_component_info(&self, id: &str) -> HostResult {
        let mut result = self
            .client
            .send(HostCommand::GetComponentInfo, component_id(id))
            .await;
        if !result.is_success() {
            return result;
        }

        let Some(component) = result.payload_mut().as_object_mut() else {
            return result;
        };
        if !component.contains_key("type") {
            return result;
        }

        if let Some(knowledge) = self.knowledge_best_effort().await {
            merge_library_details(component, &knowledge);
        }
        ensure_slider_settings(component, None);

        let connections = self.client.send_empty(HostCommand::GetConnections).await;
        if connections.is_success() {
            attach_connections(component, id, &payload_list(&connections));
        }

        result
    }

    /// Returns every component, each enriched like [`Self::get_component_info`].
    ///
    /// Slider settings come from a fresh per-slider info lookup when it succeeds.
    pub async fn get_all_components(&self) -> HostResult {
        let mut result = self.client.send_empty(HostCommand::GetAllComponents).await;
        if !result.is_success() {
            return result;
        }
        let Some(components) = result.payload_mut().as_array_mut() else {
            return result;
        };

        let knowledge = self.knowledge_best_effort().await;
        let connections = payload_list(&self.client.send_empty(HostCommand::GetConnections).await);

        for component in components.iter_mut().filter_map(Value::as_object_mut) {
            let Some(id) = component.get("id").and_then(Value::as_str).map(str::to_string) else {
                continue;
            };
            if !component.contains_key("type") {
                continue;
            }

            if let Some(knowledge) = &knowledge {
                merge_library_details(component, knowledge);
            }
            attach_connections(component, &id, &connections);

            if is_number_slider(component) {
                let info = self
                    .client
                    .send(HostCommand::GetComponentInfo, component_id(&id))
                    .await;
                let info = info
                    .is_success()
                    .then(|| info.payload().as_object().cloned())
                    .flatten();
                ensure_slider_settings(component, info.as_ref());
            }
        }

        result
    }

    /// Sets the value of an input component such as a slider or panel.
    pub async fn set_component_value(&self, id: &str, value: Value) -> HostResult {
        let params = params([("componentId", json!(id)), ("value", value)]);
        self.client.send(HostCommand::SetComponentValue, params).await
    }

    /// Searches the component catalog of the running Grasshopper.
    pub async fn search_components(&self, query: &str) -> HostResult {
        self.client
            .send(HostCommand::SearchComponents, params([("query", json!(query))]))
            .await
    }

    /// Lists the inputs and outputs of a component type.
    pub async fn get_component_parameters(&self, component_type: &str) -> HostResult {
        self.client
            .send(
                HostCommand::GetComponentParameters,
                params([("componentType", json!(component_type))]),
            )
            .await
    }

    /// Returns the preview data of a component's outputs.
    pub async fn get_geometry(&self, id: &str) -> HostResult {
        self.client.send(HostCommand::GetGeometry, component_id(id)).await
    }

    // ==================== Scripting ====================

    /// Recomputes the solution and refreshes the preview.
    pub async fn execute_preview(&self) -> HostResult {
        self.client.send_empty(HostCommand::ExecutePreview).await
    }

    /// Runs a Rhino command script.
    pub async fn execute_script(&self, script: &str) -> HostResult {
        self.client
            .send(HostCommand::ExecuteScript, params([("script", json!(script))]))
            .await
    }

    /// Stores a Rhino command macro under `name`.
    pub async fn create_macro(&self, name: &str, macro_text: &str) -> HostResult {
        let params = params([("name", json!(name)), ("macro", json!(macro_text))]);
        self.client.send(HostCommand::CreateMacro, params).await
    }

    /// Runs a stored macro by name, or inline macro text.
    pub async fn run_macro(&self, name: Option<&str>, macro_text: Option<&str>) -> HostResult {
        let mut params = Parameters::new();
        if let Some(name) = name {
            params.insert("name".to_string(), json!(name));
        }
        if let Some(macro_text) = macro_text {
            params.insert("macro".to_string(), json!(macro_text));
        }
        self.client.send(HostCommand::RunMacro, params).await
    }

    /// Saves a snapshot of the document; Grasshopper picks a name if none is given.
    pub async fn snapshot(&self, name: Option<&str>) -> HostResult {
        let mut params = Parameters::new();
        if let Some(name) = name {
            params.insert("name".to_string(), json!(name));
        }
        self.client.send(HostCommand::Snapshot, params).await
    }

    /// Restores a named snapshot.
    pub async fn revert_snapshot(&self, name: &str) -> HostResult {
        self.client
            .send(HostCommand::RevertSnapshot, params([("name", json!(name))]))
            .await
    }

    /// Runs a GhPython script inside Rhino.
    pub async fn run_gh_python(&self, script: &str) -> HostResult {
        self.client
            .send(HostCommand::RunGhPython, params([("script", json!(script))]))
            .await
    }

    // ==================== Resources ====================

    /// Builds the status snapshot.
    ///
    /// Never fails: if the document, component or connection lookup fails the
    /// snapshot carries the first error text and empty collections.
    pub async fn status_snapshot(&self) -> Value {
        let document = self.get_document_info().await;
        if let Some(message) = document.error_message() {
            return degraded_snapshot(&message);
        }
        let components = self.get_all_components().await;
        if let Some(message) = components.error_message() {
            return degraded_snapshot(&message);
        }
        let connections = self.get_connections().await;
        if let Some(message) = connections.error_message() {
            return degraded_snapshot(&message);
        }

        let components = payload_list(&components);
        let connections = payload_list(&connections);

        let summaries: Vec<Value> = components
            .iter()
            .filter_map(Value::as_object)
            .map(summarize_component)
            .collect();

        let hints = match self.knowledge_best_effort().await {
            Some(knowledge) => knowledge.component_hints.clone(),
            None => json!({}),
        };

        let canvas_summary = format!(
            "Current canvas has {} components and {} connections",
            summaries.len(),
            connections.len()
        );

        json!({
            "status": "Connected to Grasshopper",
            "document": document.into_payload(),
            "components": summaries,
            "connections": connections,
            "component_hints": hints,
            "recommendations": RECOMMENDATIONS,
            "canvas_summary": canvas_summary,
        })
    }

    /// Returns the component guide.
    ///
    /// # Errors
    ///
    /// Returns an error if the knowledge base cannot be loaded.
    pub async fn component_guide(&self) -> Result<Value, CommandError> {
        Ok(self.knowledge.get().await?.component_guide.clone())
    }

    /// Returns the component library.
    ///
    /// # Errors
    ///
    /// Returns an error if the knowledge base cannot be loaded.
    pub async fn component_library(&self) -> Result<Value, CommandError> {
        Ok(self.knowledge.get().await?.component_library.clone())
    }

    /// Returns the component hints.
    ///
    /// # Errors
    ///
    /// Returns an error if the knowledge base cannot be loaded.
    pub async fn component_hints(&self) -> Result<Value, CommandError> {
        Ok(self.knowledge.get().await?.component_hints.clone())
    }
}

/// Converts a failed result into [`CommandError::Remote`], or returns its payload.
fn surface_failure(operation: &'static str, result: HostResult) -> Result<Value, CommandError> {
    match result.error_message() {
        Some(message) => Err(CommandError::Remote { operation, message }),
        None => Ok(result.into_payload()),
    }
}

fn degraded_snapshot(message: &str) -> Value {
    tracing::warn!(error = %message, "Failed to get Grasshopper status");
    json!({
        "status": format!("Error: {message}"),
        "document": {},
        "components": [],
        "connections": [],
    })
}

/// Condenses an enriched component into its status entry.
fn summarize_component(component: &Map<String, Value>) -> Value {
    let field = |key: &str, default: Value| component.get(key).cloned().unwrap_or(default);
    let id = component.get("id").and_then(Value::as_str).unwrap_or_default();

    let mut summary = Map::new();
    summary.insert("id".to_string(), json!(id));
    summary.insert("type".to_string(), field("type", json!("")));
    summary.insert(
        "position".to_string(),
        json!({ "x": field("x", json!(0)), "y": field("y", json!(0)) }),
    );

    if let Some(settings) = component.get("currentSettings") {
        summary.insert("settings".to_string(), settings.clone());
    } else if is_number_slider(component) {
        summary.insert("settings".to_string(), slider_settings(&[component]));
    }

    let connections: Vec<Value> = component
        .get("connections")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .map(|conn| {
            let text = |key: &str| conn.get(key).cloned().unwrap_or_else(|| json!(""));
            if conn.get("sourceId").and_then(Value::as_str) == Some(id) {
                json!({
                    "type": "output",
                    "to": text("targetId"),
                    "sourceParam": text("sourceParam"),
                    "targetParam": text("targetParam"),
                })
            } else {
                json!({
                    "type": "input",
                    "from": text("sourceId"),
                    "sourceParam": text("sourceParam"),
                    "targetParam": text("targetParam"),
                })
            }
        })
        .collect();
    if !connections.is_empty() {
        summary.insert("connections".to_string(), Value::Array(connections));
    }

    Value::Object(summary)
}
