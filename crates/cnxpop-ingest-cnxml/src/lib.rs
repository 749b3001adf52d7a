//! collxml / cnxml ingestion (boundary adapter)
//!
//! Parses the two XML dialects of a legacy complete zip into a
//! [`cnxpop_model::Document`]:
//!
//! - `collection.xml` (collxml): shared metadata plus the ordered list of
//!   linked module ids (`col:module/@document`).
//! - `index_auto_generated.cnxml` (cnxml): shared metadata plus the embedded
//!   resource descriptors (`image`, `download`, ... with `src`/`mime-type`).
//!
//! Both dialects carry their metadata in the `mdml` namespace, so one
//! extractor handles the common fields; a [`Namespaces`] value selects the
//! dialect's content namespace and root element. Elements are matched by
//! namespace URI, never by prefix.

mod parser;

use cnxpop_model::{Dialect, Document};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

pub use parser::RESOURCE_ELEMENTS;

/// Metadata namespace shared by both dialects. Older documents append a
/// version (`http://cnx.rice.edu/mdml/0.4`), which is accepted too.
pub const MDML_NAMESPACE: &str = "http://cnx.rice.edu/mdml";
pub const COLLXML_NAMESPACE: &str = "http://cnx.rice.edu/collxml";
pub const CNXML_NAMESPACE: &str = "http://cnx.rice.edu/cnxml";

/// MIME type used for resources that do not declare one.
pub const DEFAULT_MIMETYPE: &str = "application/octet-stream";

/// Namespace dictionary for one dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Namespaces {
    /// Namespace of the root element and the dialect's child references.
    pub content: &'static str,
    /// Namespace of the shared `md:*` metadata elements.
    pub metadata: &'static str,
    /// Local name of the root element.
    pub root: &'static str,
}

impl Namespaces {
    pub const COLLXML: Namespaces = Namespaces {
        content: COLLXML_NAMESPACE,
        metadata: MDML_NAMESPACE,
        root: "collection",
    };

    pub const CNXML: Namespaces = Namespaces {
        content: CNXML_NAMESPACE,
        metadata: MDML_NAMESPACE,
        root: "document",
    };

    pub fn for_dialect(dialect: Dialect) -> Self {
        match dialect {
            Dialect::Collection => Self::COLLXML,
            Dialect::Module => Self::CNXML,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("malformed document: {0}")]
    MalformedDocument(String),
    #[error("missing required field `{0}`")]
    MissingField(&'static str),
    #[error("failed to open {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Parse one document of the given dialect from a buffered reader.
///
/// No partial document is returned: any malformed input or absent required
/// field fails the whole parse.
pub fn parse_document<R: BufRead>(
    reader: R,
    namespaces: &Namespaces,
    dialect: Dialect,
) -> Result<Document, ParseError> {
    parser::DocumentParser::new(namespaces, dialect).parse(reader)
}

/// Parse a file on disk with the dialect's default namespaces.
pub fn parse_file(path: &Path, dialect: Dialect) -> Result<Document, ParseError> {
    let file = File::open(path).map_err(|source| ParseError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_document(
        BufReader::new(file),
        &Namespaces::for_dialect(dialect),
        dialect,
    )
}

/// Parse a collxml manifest (`collection.xml`).
pub fn parse_collection_xml(path: &Path) -> Result<Document, ParseError> {
    parse_file(path, Dialect::Collection)
}

/// Parse a module's content-with-metadata document (`index_auto_generated.cnxml`).
pub fn parse_module_xml(path: &Path) -> Result<Document, ParseError> {
    parse_file(path, Dialect::Module)
}

/// Parse an in-memory document.
pub fn parse_str(xml: &str, dialect: Dialect) -> Result<Document, ParseError> {
    parse_document(xml.as_bytes(), &Namespaces::for_dialect(dialect), dialect)
}
