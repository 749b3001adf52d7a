//! Parsed documents
//!
//! A [`Document`] is the read-only result of parsing one XML file of either
//! dialect. It is consumed by the populator and then dropped.

use crate::unit::{PortalType, UnitMetadata};
use serde::{Deserialize, Serialize};
use std::path::{Component, Path};

/// The two XML dialects found in a complete zip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dialect {
    /// `collection.xml` (collxml)
    Collection,
    /// `index_auto_generated.cnxml` (cnxml with embedded metadata)
    Module,
}

impl Dialect {
    pub fn portal_type(&self) -> PortalType {
        match self {
            Self::Collection => PortalType::Collection,
            Self::Module => PortalType::Module,
        }
    }
}

/// A file embedded in a module (figure, download, ...), relative to the module directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceRef {
    pub filename: String,
    pub mimetype: String,
}

impl ResourceRef {
    pub fn new(filename: impl Into<String>, mimetype: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            mimetype: mimetype.into(),
        }
    }
}

/// True for a non-empty relative path made only of plain components
/// (no `..`, `.`, root or drive prefix).
pub fn is_enclosed_path(path: &str) -> bool {
    let mut components = Path::new(path).components().peekable();
    components.peek().is_some() && components.all(|c| matches!(c, Component::Normal(_)))
}

/// Dialect-specific child references.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DocumentBody {
    /// Linked module legacy ids, in manifest order.
    Collection { modules: Vec<String> },
    /// Embedded resources, first occurrence of each filename.
    Module { resources: Vec<ResourceRef> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub abstract_text: String,
    pub license_url: String,
    pub metadata: UnitMetadata,
    /// In source order, not deduplicated.
    pub keywords: Vec<String>,
    /// In source order, not deduplicated.
    pub subjects: Vec<String>,
    pub body: DocumentBody,
}

impl Document {
    pub fn dialect(&self) -> Dialect {
        match self.body {
            DocumentBody::Collection { .. } => Dialect::Collection,
            DocumentBody::Module { .. } => Dialect::Module,
        }
    }

    pub fn legacy_id(&self) -> &str {
        &self.metadata.legacy_id
    }

    /// Module legacy ids for a collection; empty for a module.
    pub fn module_ids(&self) -> &[String] {
        match &self.body {
            DocumentBody::Collection { modules } => modules,
            DocumentBody::Module { .. } => &[],
        }
    }

    /// Embedded resources for a module; empty for a collection.
    pub fn resources(&self) -> &[ResourceRef] {
        match &self.body {
            DocumentBody::Module { resources } => resources,
            DocumentBody::Collection { .. } => &[],
        }
    }
}
