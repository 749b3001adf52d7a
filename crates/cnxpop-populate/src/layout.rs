//! On-disk layout of an extracted complete zip

use std::path::{Path, PathBuf};

pub const COLLECTION_XML: &str = "collection.xml";
/// Module content with embedded metadata.
pub const MODULE_METADATA_XML: &str = "index_auto_generated.cnxml";
/// Raw module content, no metadata.
pub const MODULE_CONTENT_XML: &str = "index.cnxml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompleteZip {
    root: PathBuf,
}

impl CompleteZip {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The extracted directory for `collection_id` at `version` under `output_dir`.
    pub fn locate(output_dir: &Path, collection_id: &str, version: &str) -> Self {
        Self::new(output_dir.join(Self::directory_name(collection_id, version)))
    }

    pub fn directory_name(collection_id: &str, version: &str) -> String {
        format!("{collection_id}_{version}_complete")
    }

    pub fn zip_name(collection_id: &str, version: &str) -> String {
        format!("{collection_id}-{version}.complete.zip")
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn exists(&self) -> bool {
        self.root.is_dir()
    }

    pub fn collection_xml(&self) -> PathBuf {
        self.root.join(COLLECTION_XML)
    }

    pub fn module_dir(&self, module_id: &str) -> PathBuf {
        self.root.join(module_id)
    }

    pub fn module_metadata_xml(&self, module_id: &str) -> PathBuf {
        self.module_dir(module_id).join(MODULE_METADATA_XML)
    }

    pub fn module_content_xml(&self, module_id: &str) -> PathBuf {
        self.module_dir(module_id).join(MODULE_CONTENT_XML)
    }
}
