//! Streaming extractor over `quick_xml`'s namespace-resolving reader.

use crate::{Namespaces, ParseError, DEFAULT_MIMETYPE};
use cnxpop_model::{
    is_enclosed_path, Dialect, Document, DocumentBody, ResourceRef, Roles, UnitMetadata,
};
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::{Namespace, ResolveResult};
use quick_xml::reader::NsReader;
use std::collections::HashSet;
use std::io::BufRead;
use tracing::warn;

/// URL schemes whose targets live outside the archive.
const REMOTE_SCHEMES: &[&str] = &["http", "https", "ftp", "mailto", "file", "data"];

/// cnxml elements whose `src` names a file shipped alongside the module.
pub const RESOURCE_ELEMENTS: &[&str] = &["image", "download", "video", "audio", "flash", "object"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NsKind {
    Content,
    Metadata,
    Other,
}

/// Text-valued fields collected from `md:*` elements.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Field {
    Abstract,
    ContentId,
    Version,
    Title,
    Language,
    Created,
    Revised,
    Role(String),
    Keyword,
    Subject,
}

#[derive(Debug)]
struct Capture {
    field: Field,
    depth: usize,
    text: String,
}

#[derive(Debug, Default)]
struct PartialDocument {
    abstract_text: Option<String>,
    license_url: Option<String>,
    content_id: Option<String>,
    version: Option<String>,
    title: Option<String>,
    language: Option<String>,
    created: Option<String>,
    revised: Option<String>,
    roles: Roles,
    keywords: Vec<String>,
    subjects: Vec<String>,
    modules: Vec<String>,
    resources: Vec<ResourceRef>,
    seen_resources: HashSet<String>,
}

pub(crate) struct DocumentParser<'a> {
    namespaces: &'a Namespaces,
    dialect: Dialect,
    partial: PartialDocument,
    capture: Option<Capture>,
    depth: usize,
    root_seen: bool,
}

impl<'a> DocumentParser<'a> {
    pub(crate) fn new(namespaces: &'a Namespaces, dialect: Dialect) -> Self {
        Self {
            namespaces,
            dialect,
            partial: PartialDocument::default(),
            capture: None,
            depth: 0,
            root_seen: false,
        }
    }

    pub(crate) fn parse<R: BufRead>(mut self, input: R) -> Result<Document, ParseError> {
        let mut reader = NsReader::from_reader(input);
        let mut buf = Vec::with_capacity(4096);

        loop {
            let position = reader.buffer_position();
            let (kind, event) = match reader.read_resolved_event_into(&mut buf) {
                Ok((ns, event)) => (self.classify(&ns), event),
                Err(err) => {
                    return Err(ParseError::MalformedDocument(format!(
                        "{err} (near byte {position})"
                    )))
                }
            };

            match event {
                Event::Start(ref e) => {
                    self.depth += 1;
                    self.start_element(kind, e, false)?;
                }
                Event::Empty(ref e) => {
                    self.start_element(kind, e, true)?;
                }
                Event::End(_) => {
                    if self.depth == 0 {
                        return Err(ParseError::MalformedDocument(format!(
                            "unexpected closing tag near byte {position}"
                        )));
                    }
                    if self.capture.as_ref().is_some_and(|c| c.depth == self.depth) {
                        if let Some(capture) = self.capture.take() {
                            self.finish_capture(capture.field, capture.text);
                        }
                    }
                    self.depth -= 1;
                }
                Event::Text(ref e) => {
                    if let Some(capture) = self.capture.as_mut() {
                        let text = e
                            .unescape()
                            .map_err(|err| ParseError::MalformedDocument(err.to_string()))?;
                        capture.text.push_str(&text);
                    }
                }
                Event::CData(ref e) => {
                    if let Some(capture) = self.capture.as_mut() {
                        capture.text.push_str(&String::from_utf8_lossy(e));
                    }
                }
                Event::Eof => break,
                _ => {}
            }

            buf.clear();
        }

        if !self.root_seen {
            return Err(ParseError::MalformedDocument(
                "document has no root element".to_string(),
            ));
        }
        if self.depth != 0 {
            return Err(ParseError::MalformedDocument(format!(
                "unexpected end of document with {} unclosed element(s)",
                self.depth
            )));
        }

        self.finish()
    }

    fn classify(&self, ns: &ResolveResult<'_>) -> NsKind {
        match ns {
            ResolveResult::Bound(Namespace(uri)) => {
                if *uri == self.namespaces.content.as_bytes() {
                    NsKind::Content
                } else if uri.starts_with(self.namespaces.metadata.as_bytes()) {
                    NsKind::Metadata
                } else {
                    NsKind::Other
                }
            }
            _ => NsKind::Other,
        }
    }

    fn start_element(
        &mut self,
        kind: NsKind,
        e: &BytesStart<'_>,
        empty: bool,
    ) -> Result<(), ParseError> {
        let local = e.local_name();
        let local = local.as_ref();

        if !self.root_seen {
            self.root_seen = true;
            if kind != NsKind::Content || local != self.namespaces.root.as_bytes() {
                return Err(ParseError::MalformedDocument(format!(
                    "expected root element `{}` in namespace {}, found `{}`",
                    self.namespaces.root,
                    self.namespaces.content,
                    String::from_utf8_lossy(local)
                )));
            }
        }

        // Markup nested inside a captured field only contributes its text.
        if self.capture.is_some() {
            return Ok(());
        }

        let field = match kind {
            NsKind::Metadata => self.metadata_field(local, e)?,
            NsKind::Content => {
                self.content_element(local, e)?;
                None
            }
            NsKind::Other => None,
        };

        if let Some(field) = field {
            if empty {
                self.finish_capture(field, String::new());
            } else {
                self.capture = Some(Capture {
                    field,
                    depth: self.depth,
                    text: String::new(),
                });
            }
        }
        Ok(())
    }

    fn metadata_field(
        &mut self,
        local: &[u8],
        e: &BytesStart<'_>,
    ) -> Result<Option<Field>, ParseError> {
        let p = &self.partial;
        let field = match local {
            b"abstract" if p.abstract_text.is_none() => Field::Abstract,
            b"content-id" if p.content_id.is_none() => Field::ContentId,
            b"version" if p.version.is_none() => Field::Version,
            b"title" if p.title.is_none() => Field::Title,
            b"language" if p.language.is_none() => Field::Language,
            b"created" if p.created.is_none() => Field::Created,
            b"revised" if p.revised.is_none() => Field::Revised,
            b"role" => Field::Role(attribute(e, b"type")?.unwrap_or_default()),
            b"keyword" => Field::Keyword,
            b"subject" => Field::Subject,
            b"license" => {
                if self.partial.license_url.is_none() {
                    if let Some(url) = attribute(e, b"url")? {
                        let url = url.trim();
                        if !url.is_empty() {
                            self.partial.license_url = Some(url.to_string());
                        }
                    }
                }
                return Ok(None);
            }
            _ => return Ok(None),
        };
        Ok(Some(field))
    }

    fn content_element(&mut self, local: &[u8], e: &BytesStart<'_>) -> Result<(), ParseError> {
        match self.dialect {
            Dialect::Collection => {
                if local == b"module" {
                    if let Some(document) = attribute(e, b"document")? {
                        let document = document.trim();
                        if !document.is_empty() {
                            self.partial.modules.push(document.to_string());
                        }
                    }
                }
            }
            Dialect::Module => {
                if RESOURCE_ELEMENTS.iter().any(|name| name.as_bytes() == local) {
                    if let Some(src) = attribute(e, b"src")? {
                        let src = src.trim();
                        if src.is_empty() || is_remote(src) {
                            return Ok(());
                        }
                        if !is_enclosed_path(src) {
                            warn!(src = %src, "resource source leaves the module directory; ignoring");
                            return Ok(());
                        }
                        if self.partial.seen_resources.insert(src.to_string()) {
                            let mimetype = attribute(e, b"mime-type")?
                                .map(|m| m.trim().to_string())
                                .filter(|m| !m.is_empty())
                                .unwrap_or_else(|| DEFAULT_MIMETYPE.to_string());
                            self.partial.resources.push(ResourceRef::new(src, mimetype));
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn finish_capture(&mut self, field: Field, text: String) {
        let p = &mut self.partial;
        let trimmed = text.trim().to_string();
        match field {
            Field::Abstract => p.abstract_text = Some(trimmed),
            Field::ContentId => p.content_id = Some(trimmed),
            Field::Version => p.version = Some(trimmed),
            Field::Title => p.title = Some(trimmed),
            Field::Language => p.language = Some(trimmed),
            Field::Created => p.created = Some(trimmed).filter(|s| !s.is_empty()),
            Field::Revised => p.revised = Some(trimmed).filter(|s| !s.is_empty()),
            Field::Role(role_type) => {
                p.roles
                    .extend_role(&role_type, text.split_whitespace().map(str::to_string));
            }
            Field::Keyword => {
                if !trimmed.is_empty() {
                    p.keywords.push(trimmed);
                }
            }
            Field::Subject => {
                if !trimmed.is_empty() {
                    p.subjects.push(trimmed);
                }
            }
        }
    }

    fn finish(self) -> Result<Document, ParseError> {
        let p = self.partial;

        let abstract_text = p.abstract_text.ok_or(ParseError::MissingField("abstract"))?;
        let license_url = p.license_url.ok_or(ParseError::MissingField("license"))?;
        let legacy_id = required(p.content_id, "content-id")?;
        let version = required(p.version, "version")?;
        let title = required(p.title, "title")?;
        let language = required(p.language, "language")?;

        let mut metadata = UnitMetadata::new(
            self.dialect.portal_type(),
            legacy_id,
            version,
            title,
            language,
        );
        metadata.created = p.created;
        metadata.revised = p.revised;
        metadata.roles = p.roles;

        let body = match self.dialect {
            Dialect::Collection => DocumentBody::Collection { modules: p.modules },
            Dialect::Module => DocumentBody::Module {
                resources: p.resources,
            },
        };

        Ok(Document {
            abstract_text,
            license_url,
            metadata,
            keywords: p.keywords,
            subjects: p.subjects,
            body,
        })
    }
}

/// A source pointing at a remote resource rather than a file in the archive.
/// Relative names containing a colon (`Figure:1.png`) are not remote.
fn is_remote(src: &str) -> bool {
    match url::Url::parse(src) {
        Ok(url) => url.has_host() || REMOTE_SCHEMES.contains(&url.scheme()),
        Err(_) => false,
    }
}

fn required(value: Option<String>, field: &'static str) -> Result<String, ParseError> {
    value
        .filter(|v| !v.is_empty())
        .ok_or(ParseError::MissingField(field))
}

fn attribute(e: &BytesStart<'_>, name: &[u8]) -> Result<Option<String>, ParseError> {
    for attr in e.attributes() {
        let attr = attr.map_err(|err| ParseError::MalformedDocument(err.to_string()))?;
        if attr.key.as_ref() == name {
            let value = attr
                .unescape_value()
                .map_err(|err| ParseError::MalformedDocument(err.to_string()))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}
