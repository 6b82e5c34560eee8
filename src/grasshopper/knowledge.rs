//! Component knowledge base.
//!
//! A static JSON document with three sections:
//!
//! - `componentGuide` - how-to notes, connection rules and tips
//! - `componentLibrary` - component catalog grouped by category
//! - `componentHints` - short disambiguation hints per component type
//!
//! The document is read once, on first use, and shared for the rest of the process.
//! By default the copy compiled into the binary is used; a file path from the
//! configuration replaces it.

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::OnceCell;

use crate::grasshopper::error::KnowledgeError;

/// The knowledge base shipped with the bridge.
const EMBEDDED_KNOWLEDGE_BASE: &str = include_str!("../../data/knowledge_base.json");

/// Parsed knowledge base document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeBase {
    /// Guide section.
    #[serde(default)]
    pub component_guide: Value,
    /// Catalog section.
    #[serde(default)]
    pub component_library: Value,
    /// Hints section.
    #[serde(default)]
    pub component_hints: Value,
}

impl KnowledgeBase {
    /// Parses a knowledge base document.
    ///
    /// # Errors
    ///
    /// Returns an error if `raw` is not a JSON object of the expected shape.
    pub fn from_json(raw: &str, origin: impl Into<String>) -> Result<Self, KnowledgeError> {
        serde_json::from_str(raw).map_err(|source| KnowledgeError::Parse {
            origin: origin.into(),
            source,
        })
    }

    /// Parses the document compiled into the binary.
    ///
    /// # Errors
    ///
    /// Returns an error if the embedded document is malformed.
    pub fn embedded() -> Result<Self, KnowledgeError> {
        Self::from_json(EMBEDDED_KNOWLEDGE_BASE, "<embedded>")
    }

    /// Iterates over every catalog entry.
    ///
    /// Covers the library's flat `components` list, each `categories[].components`
    /// list, and the guide's `components` list, in that order.
    pub fn catalog(&self) -> impl Iterator<Item = &Map<String, Value>> + '_ {
        let categorised = self
            .component_library
            .get("categories")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .flat_map(|category| component_list(category));

        component_list(&self.component_library)
            .chain(categorised)
            .chain(component_list(&self.component_guide))
    }

    /// Finds the first catalog entry whose `name` or `fullName` equals `type_name`.
    #[must_use]
    pub fn find_component(&self, type_name: &str) -> Option<&Map<String, Value>> {
        self.catalog().find(|entry| {
            ["name", "fullName"]
                .iter()
                .any(|key| entry.get(*key).and_then(Value::as_str) == Some(type_name))
        })
    }
}

fn component_list(section: &Value) -> impl Iterator<Item = &Map<String, Value>> + '_ {
    section
        .get("components")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_object)
}

/// Where the knowledge base document comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KnowledgeSource {
    /// The copy compiled into the binary.
    Embedded,
    /// A JSON file on disk.
    File(PathBuf),
}

/// Lazily loaded, process-lifetime knowledge base.
///
/// Concurrent first accesses wait on a single load. A failed load is not cached,
/// so a later call retries; a successful one is never invalidated.
#[derive(Debug)]
pub struct KnowledgeBaseAccessor {
    source: KnowledgeSource,
    cell: OnceCell<Arc<KnowledgeBase>>,
}

impl KnowledgeBaseAccessor {
    /// Creates an accessor that loads from `source` on first use.
    #[must_use]
    pub fn new(source: KnowledgeSource) -> Self {
        Self {
            source,
            cell: OnceCell::new(),
        }
    }

    /// Creates an accessor over an already parsed document.
    #[must_use]
    pub fn preloaded(knowledge: KnowledgeBase) -> Self {
        Self {
            source: KnowledgeSource::Embedded,
            cell: OnceCell::new_with(Some(Arc::new(knowledge))),
        }
    }

    /// Returns the configured source.
    #[must_use]
    pub const fn source(&self) -> &KnowledgeSource {
        &self.source
    }

    /// Returns `true` once the document has been loaded.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.cell.initialized()
    }

    /// Returns the knowledge base, loading it on first call.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be read or parsed.
    pub async fn get(&self) -> Result<Arc<KnowledgeBase>, KnowledgeError> {
        self.cell.get_or_try_init(|| self.load()).await.cloned()
    }

    async fn load(&self) -> Result<Arc<KnowledgeBase>, KnowledgeError> {
        let knowledge = match &self.source {
            KnowledgeSource::Embedded => KnowledgeBase::embedded()?,
            KnowledgeSource::File(path) => {
                let raw = tokio::fs::read_to_string(path).await.map_err(|source| {
                    KnowledgeError::Read {
                        path: path.clone(),
                        source,
                    }
                })?;
                KnowledgeBase::from_json(&raw, path.display().to_string())?
            }
        };
        tracing::debug!(source = ?self.source, "Knowledge base loaded");
        Ok(Arc::new(knowledge))
    }
}

impl Default for KnowledgeBaseAccessor {
    fn default() -> Self {
        Self::new(KnowledgeSource::Embedded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn embedded_document_parses() {
        let knowledge = KnowledgeBase::embedded().unwrap();
        assert!(knowledge.component_guide.is_object());
        assert!(knowledge.component_library.is_object());
        assert!(knowledge.component_hints.get("Number Slider").is_some());
    }

    #[test]
    fn find_by_name_or_full_name() {
        let knowledge = KnowledgeBase::embedded().unwrap();

        let slider = knowledge.find_component("Number Slider").unwrap();
        assert!(slider.contains_key("settings"));

        let math = knowledge.find_component("Mathematics").unwrap();
        assert_eq!(math["name"], "Math");

        assert!(knowledge.find_component("number slider").is_none());
        assert!(knowledge.find_component("Nonexistent").is_none());
    }

    #[test]
    fn catalog_covers_flat_categorised_and_guide_lists() {
        let knowledge = KnowledgeBase {
            component_guide: json!({"components": [{"name": "FromGuide"}]}),
            component_library: json!({
                "components": [{"name": "Flat"}],
                "categories": [{"name": "C", "components": [{"name": "Nested"}]}]
            }),
            component_hints: json!({}),
        };

        let names: Vec<&str> = knowledge
            .catalog()
            .filter_map(|entry| entry.get("name").and_then(Value::as_str))
            .collect();
        assert_eq!(names, ["Flat", "Nested", "FromGuide"]);
    }

    #[test]
    fn missing_sections_default_to_null() {
        let knowledge = KnowledgeBase::from_json("{}", "test").unwrap();
        assert!(knowledge.component_hints.is_null());
        assert_eq!(knowledge.catalog().count(), 0);
    }

    #[test]
    fn malformed_document_reports_origin() {
        let err = KnowledgeBase::from_json("not json", "kb.json").unwrap_err();
        assert!(err.to_string().contains("kb.json"));
    }

    #[tokio::test]
    async fn concurrent_first_access_shares_one_load() {
        let accessor = Arc::new(KnowledgeBaseAccessor::default());
        assert!(!accessor.is_loaded());

        let (a, b) = tokio::join!(accessor.get(), accessor.get());
        let (a, b) = (a.unwrap(), b.unwrap());
        assert!(Arc::ptr_eq(&a, &b));
        assert!(accessor.is_loaded());
    }

    #[tokio::test]
    async fn failed_file_load_is_retried() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kb.json");
        let accessor = KnowledgeBaseAccessor::new(KnowledgeSource::File(path.clone()));

        let err = accessor.get().await.unwrap_err();
        assert!(matches!(err, KnowledgeError::Read { .. }));
        assert!(!accessor.is_loaded());

        std::fs::write(&path, r#"{"componentHints": {"Panel": {}}}"#).unwrap();
        let knowledge = accessor.get().await.unwrap();
        assert!(knowledge.component_hints.get("Panel").is_some());
    }

    #[test]
    fn preloaded_accessor_skips_loading() {
        let accessor = KnowledgeBaseAccessor::preloaded(KnowledgeBase::default());
        assert!(accessor.is_loaded());
        let knowledge = tokio_test::block_on(accessor.get()).unwrap();
        assert!(knowledge.component_guide.is_null());
    }
}
