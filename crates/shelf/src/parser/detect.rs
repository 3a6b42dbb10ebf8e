use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ParseError;

/// Number of leading bytes inspected for a signature.
pub const SIGNATURE_LEN: usize = 64;

const PDF_MAGIC: &[u8] = b"%PDF-";
const ZIP_LOCAL_HEADER: &[u8] = b"PK\x03\x04";
const ZIP_NAME_OFFSET: usize = 30;
const EPUB_MIMETYPE_ENTRY: &[u8] = b"mimetype";
const EPUB_MEDIA_TYPE: &[u8] = b"application/epub+zip";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookFormat {
    Pdf,
    Epub,
}

impl BookFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            BookFormat::Pdf => "pdf",
            BookFormat::Epub => "epub",
        }
    }

    pub fn extension(self) -> &'static str {
        self.as_str()
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "pdf" => Some(BookFormat::Pdf),
            "epub" => Some(BookFormat::Epub),
            _ => None,
        }
    }
}

impl fmt::Display for BookFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BookFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BookFormat::from_extension(s).ok_or_else(|| format!("unknown book format '{}'", s))
    }
}

/// What the leading bytes say about a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signature {
    Pdf,
    Epub,
    /// A ZIP archive without the EPUB `mimetype` marker.
    Zip,
    Unknown,
}

/// Classifies a file by its first [`SIGNATURE_LEN`] bytes. Longer input is truncated.
pub fn sniff(header: &[u8]) -> Signature {
    let header = &header[..header.len().min(SIGNATURE_LEN)];

    if header.starts_with(PDF_MAGIC) {
        return Signature::Pdf;
    }

    if header.starts_with(ZIP_LOCAL_HEADER) {
        if is_epub_container(header) {
            return Signature::Epub;
        }
        return Signature::Zip;
    }

    Signature::Unknown
}

/// The OCF container puts an uncompressed `mimetype` entry first, so its name
/// and content sit at fixed offsets in the first local file header.
fn is_epub_container(header: &[u8]) -> bool {
    if header.len() < ZIP_NAME_OFFSET {
        return false;
    }

    let name_len = u16::from_le_bytes([header[26], header[27]]) as usize;
    let extra_len = u16::from_le_bytes([header[28], header[29]]) as usize;

    let name_end = ZIP_NAME_OFFSET + name_len;
    if header.get(ZIP_NAME_OFFSET..name_end) != Some(EPUB_MIMETYPE_ENTRY) {
        return false;
    }

    let content_start = name_end + extra_len;
    if content_start >= header.len() {
        // Marker entry present but its content lies beyond the window.
        return true;
    }

    let available = &header[content_start..];
    let compared = available.len().min(EPUB_MEDIA_TYPE.len());
    available[..compared] == EPUB_MEDIA_TYPE[..compared]
}

/// Decides the format of an upload from its leading bytes.
///
/// The signature decides. The filename hint only settles a ZIP archive
/// that lacks the EPUB marker. No recognizable signature is
/// `UnsupportedFormat` whatever the hint says.
pub fn detect_format(header: &[u8], filename_hint: Option<&str>) -> Result<BookFormat, ParseError> {
    match sniff(header) {
        Signature::Pdf => Ok(BookFormat::Pdf),
        Signature::Epub => Ok(BookFormat::Epub),
        Signature::Zip if hint_extension(filename_hint) == Some(BookFormat::Epub) => {
            Ok(BookFormat::Epub)
        }
        Signature::Zip => Err(ParseError::UnsupportedFormat(
            "ZIP archive without EPUB marker".to_string(),
        )),
        Signature::Unknown if header.is_empty() => {
            Err(ParseError::UnsupportedFormat("empty file".to_string()))
        }
        Signature::Unknown => Err(ParseError::UnsupportedFormat(
            "unrecognized file signature".to_string(),
        )),
    }
}

fn hint_extension(filename_hint: Option<&str>) -> Option<BookFormat> {
    filename_hint
        .and_then(|name| std::path::Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .and_then(BookFormat::from_extension)
}
