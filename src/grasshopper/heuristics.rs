//! Request-shaping and response-enrichment rules.
//!
//! Everything here is pure: the dispatcher fetches whatever the rules need from
//! Grasshopper and the knowledge base, then applies them.

use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::grasshopper::knowledge::KnowledgeBase;

/// Canonical type name of the single-value slider.
pub const NUMBER_SLIDER: &str = "Number Slider";

/// Conventional name of the first input of a binary arithmetic component.
pub const FIRST_INPUT: &str = "A";

/// Conventional name of the second input of a binary arithmetic component.
pub const SECOND_INPUT: &str = "B";

/// Component types with exactly two numeric inputs named `A` and `B`.
pub const BINARY_INPUT_TYPES: [&str; 5] =
    ["Addition", "Subtraction", "Multiplication", "Division", "Math"];

/// Lower-cased synonyms and the canonical component type they stand for.
const COMPONENT_SYNONYMS: &[(&str, &str)] = &[
    ("number slider", NUMBER_SLIDER),
    ("numeric slider", NUMBER_SLIDER),
    ("num slider", NUMBER_SLIDER),
    ("slider", NUMBER_SLIDER),
    ("md slider", "MD Slider"),
    ("multidimensional slider", "MD Slider"),
    ("multi-dimensional slider", "MD Slider"),
    ("graph mapper", "Graph Mapper"),
    ("add", "Addition"),
    ("addition", "Addition"),
    ("plus", "Addition"),
    ("sum", "Addition"),
    ("subtract", "Subtraction"),
    ("subtraction", "Subtraction"),
    ("minus", "Subtraction"),
    ("difference", "Subtraction"),
    ("multiply", "Multiplication"),
    ("multiplication", "Multiplication"),
    ("times", "Multiplication"),
    ("product", "Multiplication"),
    ("divide", "Division"),
    ("division", "Division"),
    ("panel", "Panel"),
    ("text panel", "Panel"),
    ("output panel", "Panel"),
    ("display", "Panel"),
];

/// Slider settings and the values used when a field is missing.
const SLIDER_DEFAULTS: [(&str, f64); 4] = [
    ("min", 0.0),
    ("max", 10.0),
    ("value", 5.0),
    ("rounding", 0.1),
];

/// Knowledge base fields merged into component descriptors, with their output names.
const LIBRARY_DETAILS: [(&str, &str); 5] = [
    ("settings", "availableSettings"),
    ("inputs", "inputDetails"),
    ("outputs", "outputDetails"),
    ("usage_examples", "usageExamples"),
    ("common_issues", "commonIssues"),
];

/// Maps a user-supplied component name to its canonical type.
///
/// Lookup is case-insensitive; unknown names are returned unchanged, case preserved.
#[must_use]
pub fn normalize_component_type(requested: &str) -> String {
    let lowered = requested.to_lowercase();
    COMPONENT_SYNONYMS
        .iter()
        .find(|(synonym, _)| *synonym == lowered)
        .map_or_else(|| requested.to_string(), |(_, canonical)| (*canonical).to_string())
}

/// A port on one side of a connection, by name or by position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortRef {
    /// Port name, e.g. `"A"`.
    Name(String),
    /// Zero-based port index.
    Index(u32),
}

impl PortRef {
    /// Combines the optional name and index arguments of a tool call.
    ///
    /// The name wins when both are given.
    #[must_use]
    pub fn from_parts(name: Option<String>, index: Option<u32>) -> Option<Self> {
        name.map(Self::Name).or_else(|| index.map(Self::Index))
    }
}

/// Typed view of a connection as reported by Grasshopper.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConnectionDescriptor {
    /// Source component id.
    pub source_id: Option<String>,
    /// Target component id.
    pub target_id: Option<String>,
    /// Source port name.
    pub source_param: Option<String>,
    /// Target port name.
    pub target_param: Option<String>,
    /// Source port index.
    pub source_param_index: Option<i64>,
    /// Target port index.
    pub target_param_index: Option<i64>,
}

impl ConnectionDescriptor {
    /// Reads a connection, or `None` if the value is not a connection object.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        if !value.is_object() {
            return None;
        }
        Self::deserialize(value).ok()
    }

    /// Returns `true` if the connection touches `component_id` on either side.
    #[must_use]
    pub fn involves(&self, component_id: &str) -> bool {
        self.source_id.as_deref() == Some(component_id)
            || self.target_id.as_deref() == Some(component_id)
    }

    /// Returns `true` if the connection occupies the first input of its target.
    #[must_use]
    pub fn occupies_first_input(&self) -> bool {
        self.target_param.as_deref() == Some(FIRST_INPUT) || self.target_param_index == Some(0)
    }
}

/// Returns `true` for component types that get automatic input selection.
#[must_use]
pub fn is_binary_input_type(type_name: &str) -> bool {
    BINARY_INPUT_TYPES.contains(&type_name)
}

/// Chooses the input a new connection into `target_id` should bind to.
///
/// Returns `None` when `target_type` is not a binary arithmetic component, leaving
/// the choice to Grasshopper. Otherwise binds to the second input if an existing
/// connection already occupies the first, and to the first input if not.
#[must_use]
pub fn select_target_port(target_type: &str, target_id: &str, connections: &[Value]) -> Option<PortRef> {
    if !is_binary_input_type(target_type) {
        return None;
    }

    let first_taken = connections
        .iter()
        .filter_map(ConnectionDescriptor::from_value)
        .filter(|conn| conn.target_id.as_deref() == Some(target_id))
        .any(|conn| conn.occupies_first_input());

    let port = if first_taken { SECOND_INPUT } else { FIRST_INPUT };
    Some(PortRef::Name(port.to_string()))
}

/// Returns the connections that touch `component_id` as source or target.
#[must_use]
pub fn related_connections(component_id: &str, connections: &[Value]) -> Vec<Value> {
    connections
        .iter()
        .filter(|value| {
            ConnectionDescriptor::from_value(value).is_some_and(|conn| conn.involves(component_id))
        })
        .cloned()
        .collect()
}

/// Adds a `connections` list to `component` when any connection touches `component_id`.
pub fn attach_connections(component: &mut Map<String, Value>, component_id: &str, connections: &[Value]) {
    let related = related_connections(component_id, connections);
    if !related.is_empty() {
        component.insert("connections".to_string(), Value::Array(related));
    }
}

/// Merges catalog details for the component's type from the knowledge base.
///
/// Returns `true` if a catalog entry matched.
pub fn merge_library_details(component: &mut Map<String, Value>, knowledge: &KnowledgeBase) -> bool {
    let Some(type_name) = component.get("type").and_then(Value::as_str) else {
        return false;
    };
    let Some(entry) = knowledge.find_component(type_name) else {
        return false;
    };

    for (source, target) in LIBRARY_DETAILS {
        if let Some(value) = entry.get(source) {
            component.insert(target.to_string(), value.clone());
        }
    }
    true
}

/// Returns `true` if the descriptor is a Number Slider.
#[must_use]
pub fn is_number_slider(component: &Map<String, Value>) -> bool {
    component.get("type").and_then(Value::as_str) == Some(NUMBER_SLIDER)
}

/// Builds slider settings, taking each field from the first source that has it.
#[must_use]
pub fn slider_settings(sources: &[&Map<String, Value>]) -> Value {
    let settings: Map<String, Value> = SLIDER_DEFAULTS
        .iter()
        .map(|(key, default)| {
            let value = sources
                .iter()
                .find_map(|source| source.get(*key).filter(|v| !v.is_null()))
                .cloned()
                .unwrap_or_else(|| json!(default));
            ((*key).to_string(), value)
        })
        .collect();
    Value::Object(settings)
}

/// Ensures a Number Slider carries a `currentSettings` object.
///
/// Existing settings are left alone. Fields come from `info` first (a fresher
/// descriptor, when one was fetched), then from the component itself, then defaults.
pub fn ensure_slider_settings(component: &mut Map<String, Value>, info: Option<&Map<String, Value>>) {
    if !is_number_slider(component) || component.contains_key("currentSettings") {
        return;
    }
    let settings = match info {
        Some(info) => slider_settings(&[info, &*component]),
        None => slider_settings(&[&*component]),
    };
    component.insert("currentSettings".to_string(), settings);
}
