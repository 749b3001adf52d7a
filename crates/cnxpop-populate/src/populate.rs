//! Relational population of one unit
//!
//! Writes are issued in foreign-key order: abstract, license lookup, unit
//! row, files and their associations, tags, keywords. The caller owns the
//! transaction and decides when to commit.

use crate::layout::{COLLECTION_XML, MODULE_CONTENT_XML, MODULE_METADATA_XML};
use cnxpop_model::{is_enclosed_path, Document, DocumentBody, PortalType, ResolvedIdentity};
use cnxpop_storage::{ArchiveWriter, NewUnit, StoreError};
use std::collections::HashSet;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

pub const XML_MIMETYPE: &str = "text/xml";

#[derive(Debug, thiserror::Error)]
pub enum PopulateError {
    #[error("no license in the store matches `{url}`")]
    UnknownLicense { url: String },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// A file to store and associate with a unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub path: PathBuf,
    pub filename: String,
    pub mimetype: String,
    /// A missing required file is an error; anything else is skipped with a warning.
    pub required: bool,
}

impl Attachment {
    fn new(dir: &Path, filename: &str, mimetype: &str, required: bool) -> Self {
        Self {
            path: dir.join(filename),
            filename: filename.to_string(),
            mimetype: mimetype.to_string(),
            required,
        }
    }
}

/// A referenced file that was not present in the archive, or whose path
/// points outside the unit's directory and so was never read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingResource {
    pub legacy_id: String,
    pub filename: String,
    pub path: PathBuf,
}

impl fmt::Display for MissingResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: resource `{}` not stored from {}",
            self.legacy_id,
            self.filename,
            self.path.display()
        )
    }
}

/// What was written for one unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PopulatedUnit {
    pub legacy_id: String,
    pub portal_type: PortalType,
    pub uuid: Uuid,
    pub ident: i64,
    pub abstract_id: Option<i64>,
    pub license_id: i64,
    pub files_attached: usize,
    pub tags: usize,
    pub keywords: usize,
    pub missing: Vec<MissingResource>,
}

/// Files to attach for a unit whose XML lives in `dir`.
///
/// A collection attaches its manifest. A module attaches its
/// content-with-metadata document, its raw content document and every
/// parsed resource, in that order.
pub fn attachments(document: &Document, dir: &Path) -> Vec<Attachment> {
    match &document.body {
        DocumentBody::Collection { .. } => {
            vec![Attachment::new(dir, COLLECTION_XML, XML_MIMETYPE, true)]
        }
        DocumentBody::Module { resources } => {
            let mut files = Vec::with_capacity(resources.len() + 2);
            files.push(Attachment::new(dir, MODULE_METADATA_XML, XML_MIMETYPE, true));
            files.push(Attachment::new(dir, MODULE_CONTENT_XML, XML_MIMETYPE, false));
            files.extend(
                resources
                    .iter()
                    .map(|r| Attachment::new(dir, &r.filename, &r.mimetype, false)),
            );
            files
        }
    }
}

/// Write every record for `document` and return the unit's local identity
/// along with what was attached.
pub fn populate_unit<W: ArchiveWriter + ?Sized>(
    writer: &mut W,
    document: &Document,
    identity: &ResolvedIdentity,
    dir: &Path,
) -> Result<PopulatedUnit, PopulateError> {
    let legacy_id = document.legacy_id();

    let abstract_id = if document.abstract_text.is_empty() {
        None
    } else {
        Some(writer.insert_abstract(&document.abstract_text)?)
    };

    let license_id = writer.find_license(&document.license_url)?.ok_or_else(|| {
        PopulateError::UnknownLicense {
            url: document.license_url.clone(),
        }
    })?;

    let ident = writer.insert_unit(&NewUnit {
        metadata: &document.metadata,
        uuid: identity.uuid,
        ident: identity.ident,
        abstract_id,
        license_id,
    })?;

    let mut files_attached = 0;
    let mut missing = Vec::new();
    for attachment in attachments(document, dir) {
        if !is_enclosed_path(&attachment.filename) {
            warn!(
                legacy_id = %legacy_id,
                filename = %attachment.filename,
                "resource path leaves the module directory; not reading it"
            );
            missing.push(MissingResource {
                legacy_id: legacy_id.to_string(),
                filename: attachment.filename,
                path: attachment.path,
            });
            continue;
        }
        let bytes = match std::fs::read(&attachment.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound && !attachment.required => {
                warn!(
                    legacy_id = %legacy_id,
                    filename = %attachment.filename,
                    path = %attachment.path.display(),
                    "resource file missing from archive; skipping"
                );
                missing.push(MissingResource {
                    legacy_id: legacy_id.to_string(),
                    filename: attachment.filename,
                    path: attachment.path,
                });
                continue;
            }
            Err(source) => {
                return Err(PopulateError::Io {
                    path: attachment.path,
                    source,
                })
            }
        };

        let file_id = writer.insert_file(&bytes)?;
        writer.insert_file_association(ident, file_id, &attachment.filename, &attachment.mimetype)?;
        debug!(
            legacy_id = %legacy_id,
            filename = %attachment.filename,
            bytes = bytes.len(),
            "attached file"
        );
        files_attached += 1;
    }

    let mut tags = 0;
    let mut seen_subjects = HashSet::new();
    for subject in &document.subjects {
        if !seen_subjects.insert(subject.as_str()) {
            continue;
        }
        match writer.find_tag(subject)? {
            Some(tag_id) => {
                writer.insert_unit_tag(ident, tag_id)?;
                tags += 1;
            }
            None => {
                warn!(legacy_id = %legacy_id, subject = %subject, "no tag row for subject; skipping");
            }
        }
    }

    let mut seen = HashSet::new();
    for word in &document.keywords {
        if !seen.insert(word.as_str()) {
            continue;
        }
        let keyword_id = match writer.find_keyword(word)? {
            Some(id) => id,
            None => {
                let id = writer.insert_keyword(word)?;
                debug!(keyword = %word, keyword_id = id, "created keyword");
                id
            }
        };
        writer.insert_unit_keyword(ident, keyword_id)?;
    }

    Ok(PopulatedUnit {
        legacy_id: legacy_id.to_string(),
        portal_type: document.metadata.portal_type,
        uuid: identity.uuid,
        ident,
        abstract_id,
        license_id,
        files_attached,
        tags,
        keywords: seen.len(),
        missing,
    })
}
