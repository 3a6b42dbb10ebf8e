use std::borrow::Cow;
use std::io::{Cursor, Read, Seek};

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde_json::json;
use zip::result::ZipError;
use zip::ZipArchive;

use crate::error::ParseError;
use crate::parser::{BookFormat, BookMetadata, BookParser, CoverImage, ParsedDocument};

const CONTAINER_PATH: &str = "META-INF/container.xml";
const OPF_MEDIA_TYPE: &str = "application/oebps-package+xml";

#[derive(Debug, Clone, Copy, Default)]
pub struct EpubParser;

impl EpubParser {
    pub fn new() -> Self {
        Self
    }
}

impl BookParser for EpubParser {
    fn format(&self) -> BookFormat {
        BookFormat::Epub
    }

    fn parse(&self, bytes: &[u8]) -> Result<ParsedDocument, ParseError> {
        let _span = tracing::info_span!("parser.epub", size = bytes.len()).entered();

        let mut archive = ZipArchive::new(Cursor::new(bytes))
            .map_err(|e| corrupt(format!("not a readable ZIP archive: {}", e)))?;

        let container = read_entry(&mut archive, CONTAINER_PATH)?
            .ok_or_else(|| corrupt(format!("missing {}", CONTAINER_PATH)))?;
        let opf_path = rootfile_path(&String::from_utf8_lossy(&container))
            .map_err(|e| corrupt(format!("malformed {}: {}", CONTAINER_PATH, e)))?
            .ok_or_else(|| corrupt("container declares no package document"))?;

        let opf = read_entry(&mut archive, &opf_path)?
            .ok_or_else(|| corrupt(format!("package document '{}' missing", opf_path)))?;
        let package = Package::parse(&String::from_utf8_lossy(&opf))
            .map_err(|e| corrupt(format!("malformed package document: {}", e)))?;

        let mut parsed = ParsedDocument::new(BookFormat::Epub);
        parsed.metadata = package.metadata();
        parsed.cover = package
            .cover_item()
            .and_then(|item| load_cover(&mut archive, &opf_path, item));

        tracing::debug!(
            fields = parsed.metadata.len(),
            has_cover = parsed.cover.is_some(),
            "parsed EPUB"
        );

        Ok(parsed)
    }
}

fn corrupt(reason: impl Into<String>) -> ParseError {
    ParseError::corrupt(BookFormat::Epub, reason)
}

/// `Ok(None)` when the entry does not exist.
fn read_entry<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
) -> Result<Option<Vec<u8>>, ParseError> {
    let mut entry = match archive.by_name(name) {
        Ok(entry) => entry,
        Err(ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(corrupt(format!("cannot open '{}': {}", name, e))),
    };

    let mut data = Vec::with_capacity(entry.size() as usize);
    entry
        .read_to_end(&mut data)
        .map_err(|e| corrupt(format!("cannot read '{}': {}", name, e)))?;
    Ok(Some(data))
}

fn load_cover<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    opf_path: &str,
    item: &ManifestItem,
) -> Option<CoverImage> {
    let path = resolve_href(opf_path, &item.href);
    match read_entry(archive, &path) {
        Ok(Some(data)) => Some(CoverImage {
            data,
            media_type: item.media_type.clone(),
        }),
        Ok(None) => {
            tracing::warn!(entry = %path, "declared cover image missing from archive");
            None
        }
        Err(e) => {
            tracing::warn!(entry = %path, error = %e, "declared cover image unreadable");
            None
        }
    }
}

fn rootfile_path(container_xml: &str) -> Result<Option<String>, quick_xml::Error> {
    let mut reader = Reader::from_str(container_xml);
    reader.config_mut().trim_text(true);

    let mut fallback = None;
    loop {
        match reader.read_event()? {
            Event::Start(ref e) | Event::Empty(ref e) if e.local_name().as_ref() == b"rootfile" => {
                let full_path = attribute(e, b"full-path");
                let media_type = attribute(e, b"media-type");
                match full_path {
                    Some(path) if media_type.as_deref() == Some(OPF_MEDIA_TYPE) => {
                        return Ok(Some(path))
                    }
                    Some(path) if fallback.is_none() => fallback = Some(path),
                    _ => {}
                }
            }
            Event::Eof => return Ok(fallback),
            _ => {}
        }
    }
}

fn attribute(element: &BytesStart<'_>, name: &[u8]) -> Option<String> {
    element
        .attributes()
        .flatten()
        .find(|attr| attr.key.local_name().as_ref() == name)
        .and_then(|attr| attr.unescape_value().ok().map(Cow::into_owned))
}

#[derive(Debug, Clone)]
struct ManifestItem {
    id: String,
    href: String,
    media_type: Option<String>,
    properties: Vec<String>,
}

#[derive(Debug)]
struct DcEntry {
    element: String,
    value: String,
    scheme: Option<String>,
}

#[derive(Debug, Default)]
struct Package {
    dc: Vec<DcEntry>,
    manifest: Vec<ManifestItem>,
    cover_id: Option<String>,
}

impl Package {
    fn parse(opf: &str) -> Result<Self, quick_xml::Error> {
        let mut reader = Reader::from_str(opf);
        reader.config_mut().trim_text(true);

        let mut package = Package::default();
        let mut in_metadata = false;
        let mut open: Option<DcEntry> = None;

        loop {
            match reader.read_event()? {
                Event::Start(ref e) => match e.local_name().as_ref() {
                    b"metadata" => in_metadata = true,
                    b"item" => package.push_item(e),
                    b"meta" => package.read_meta(e),
                    name if in_metadata && is_dc_element(name) => {
                        open = Some(DcEntry {
                            element: String::from_utf8_lossy(name).into_owned(),
                            value: String::new(),
                            scheme: attribute(e, b"scheme"),
                        });
                    }
                    _ => {}
                },
                Event::Empty(ref e) => match e.local_name().as_ref() {
                    b"item" => package.push_item(e),
                    b"meta" => package.read_meta(e),
                    _ => {}
                },
                Event::Text(ref t) => {
                    if let Some(entry) = open.as_mut() {
                        let text = t
                            .unescape()
                            .unwrap_or_else(|_| String::from_utf8_lossy(t));
                        entry.value.push_str(&text);
                    }
                }
                Event::CData(ref c) => {
                    if let Some(entry) = open.as_mut() {
                        entry.value.push_str(&String::from_utf8_lossy(c));
                    }
                }
                Event::End(ref e) => match e.local_name().as_ref() {
                    b"metadata" => in_metadata = false,
                    name => {
                        if let Some(entry) = open.take() {
                            if entry.element.as_bytes() == name {
                                package.dc.push(entry);
                            } else {
                                open = Some(entry);
                            }
                        }
                    }
                },
                Event::Eof => break,
                _ => {}
            }
        }

        Ok(package)
    }

    fn push_item(&mut self, e: &BytesStart<'_>) {
        let (Some(id), Some(href)) = (attribute(e, b"id"), attribute(e, b"href")) else {
            return;
        };
        self.manifest.push(ManifestItem {
            id,
            href,
            media_type: attribute(e, b"media-type"),
            properties: attribute(e, b"properties")
                .map(|p| p.split_whitespace().map(str::to_string).collect())
                .unwrap_or_default(),
        });
    }

    fn read_meta(&mut self, e: &BytesStart<'_>) {
        if self.cover_id.is_none() && attribute(e, b"name").as_deref() == Some("cover") {
            self.cover_id = attribute(e, b"content");
        }
    }

    fn values(&self, element: &str) -> impl Iterator<Item = &DcEntry> {
        let element = element.to_string();
        self.dc.iter().filter(move |entry| entry.element == element)
    }

    fn first(&self, element: &str) -> Option<&str> {
        self.values(element)
            .map(|entry| entry.value.trim())
            .find(|value| !value.is_empty())
    }

    fn metadata(&self) -> BookMetadata {
        let mut metadata = BookMetadata::new();

        if let Some(title) = self.first("title") {
            metadata.set_text("title", title);
        }
        metadata.set_list("authors", self.values("creator").map(|e| e.value.as_str()));
        if let Some(language) = self.first("language") {
            metadata.set_text("language", language);
        }

        let identifiers: Vec<_> = self
            .values("identifier")
            .filter(|e| !e.value.trim().is_empty())
            .map(|e| {
                let (kind, value) = classify_identifier(e.scheme.as_deref(), e.value.trim());
                json!({ "type": kind, "value": value })
            })
            .collect();
        metadata.set_value("identifiers", serde_json::Value::Array(identifiers));

        if let Some(publisher) = self.first("publisher") {
            metadata.set_text("publisher", publisher);
        }
        if let Some(date) = self.first("date") {
            metadata.set_text("publication_date", date);
        }
        if let Some(description) = self.first("description") {
            metadata.set_text("description", &strip_markup(description));
        }
        metadata.set_list("tags", self.values("subject").map(|e| e.value.as_str()));

        metadata
    }

    /// EPUB 3 `cover-image` property first, then the EPUB 2 `<meta name="cover">`.
    fn cover_item(&self) -> Option<&ManifestItem> {
        self.manifest
            .iter()
            .find(|item| item.properties.iter().any(|p| p == "cover-image"))
            .or_else(|| {
                let id = self.cover_id.as_deref()?;
                self.manifest.iter().find(|item| item.id == id)
            })
    }
}

fn is_dc_element(name: &[u8]) -> bool {
    matches!(
        name,
        b"title"
            | b"creator"
            | b"language"
            | b"identifier"
            | b"publisher"
            | b"date"
            | b"description"
            | b"subject"
    )
}

/// ISBNs become `ISBN_10` / `ISBN_13` with separators removed; other schemes
/// keep their uppercased name, or `UNKNOWN`.
fn classify_identifier(scheme: Option<&str>, value: &str) -> (String, String) {
    let (scheme, value) = match value.get(..9) {
        Some(prefix) if prefix.eq_ignore_ascii_case("urn:isbn:") => {
            ("ISBN".to_string(), &value[9..])
        }
        _ => (
            scheme
                .map(|s| s.trim().to_uppercase())
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "UNKNOWN".to_string()),
            value,
        ),
    };

    if scheme.contains("ISBN") {
        let cleaned: String = value.chars().filter(|c| c.is_ascii_alphanumeric()).collect();
        match cleaned.len() {
            10 => return ("ISBN_10".to_string(), cleaned),
            13 => return ("ISBN_13".to_string(), cleaned),
            _ => {}
        }
    }

    (scheme, value.to_string())
}

/// Manifest hrefs are relative to the package document and may be percent-encoded.
fn resolve_href(opf_path: &str, href: &str) -> String {
    let href = href.split('#').next().unwrap_or(href);
    // Undecodable escapes are kept as written.
    let href = urlencoding::decode(href).unwrap_or(Cow::Borrowed(href));

    let mut segments: Vec<&str> = match opf_path.rfind('/') {
        Some(idx) => opf_path[..idx].split('/').collect(),
        None => Vec::new(),
    };

    for segment in href.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }

    segments.join("/")
}

/// Drops tags and collapses whitespace. Descriptions are often escaped XHTML.
fn strip_markup(html: &str) -> String {
    let mut text = String::with_capacity(html.len());
    let mut in_tag = false;

    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => text.push(c),
            _ => {}
        }
    }

    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
