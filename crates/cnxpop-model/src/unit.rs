//! Unit metadata (the columns of a `modules` row that come from the source XML)

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which kind of content unit a row describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PortalType {
    Collection,
    Module,
}

impl PortalType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Collection => "Collection",
            Self::Module => "Module",
        }
    }
}

impl fmt::Display for PortalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Role lists attached to a unit. Each entry is a legacy user id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roles {
    pub authors: Vec<String>,
    pub maintainers: Vec<String>,
    pub licensors: Vec<String>,
}

impl Roles {
    /// Append the ids of one `md:role` element, routed by its `type` attribute.
    ///
    /// Unrecognised role types (e.g. `translator`) are ignored.
    pub fn extend_role(&mut self, role_type: &str, ids: impl IntoIterator<Item = String>) {
        let target = match role_type {
            "author" => &mut self.authors,
            "maintainer" => &mut self.maintainers,
            "licensor" => &mut self.licensors,
            _ => return,
        };
        target.extend(ids);
    }
}

/// Metadata shared by collections and modules.
///
/// Every field maps to a named column of the destination `modules` table;
/// identity and foreign-key columns are resolved later and live elsewhere.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitMetadata {
    pub portal_type: PortalType,
    /// Legacy content id (`md:content-id`), e.g. `col11496` or `m42955`.
    pub legacy_id: String,
    pub version: String,
    pub title: String,
    pub language: String,
    pub created: Option<String>,
    pub revised: Option<String>,
    /// Not null in the destination schema, unused by legacy content.
    pub doctype: String,
    pub submitter: String,
    pub submitlog: String,
    pub roles: Roles,
}

impl UnitMetadata {
    pub fn new(
        portal_type: PortalType,
        legacy_id: impl Into<String>,
        version: impl Into<String>,
        title: impl Into<String>,
        language: impl Into<String>,
    ) -> Self {
        Self {
            portal_type,
            legacy_id: legacy_id.into(),
            version: version.into(),
            title: title.into(),
            language: language.into(),
            created: None,
            revised: None,
            doctype: String::new(),
            submitter: String::new(),
            submitlog: String::new(),
            roles: Roles::default(),
        }
    }
}
