use std::io::Cursor;

use lopdf::{Dictionary, Document, Object, ObjectId, Stream};

use crate::error::ParseError;
use crate::parser::render::PageRenderer;
use crate::parser::{BookFormat, BookMetadata, BookParser, CoverImage, ParsedDocument};

/// Guards against cyclic `/Parent` chains in malformed page trees.
const MAX_PAGE_TREE_DEPTH: usize = 32;

#[derive(Debug, Clone, Default)]
pub struct PdfParser {
    renderer: Option<PageRenderer>,
}

impl PdfParser {
    pub fn new(renderer: Option<PageRenderer>) -> Self {
        Self { renderer }
    }
}

impl BookParser for PdfParser {
    fn format(&self) -> BookFormat {
        BookFormat::Pdf
    }

    fn parse(&self, bytes: &[u8]) -> Result<ParsedDocument, ParseError> {
        let _span = tracing::info_span!("parser.pdf", size = bytes.len()).entered();

        let doc = Document::load_mem(bytes).map_err(|e| {
            ParseError::corrupt(BookFormat::Pdf, format!("failed to load PDF: {}", e))
        })?;
        doc.catalog().map_err(|e| {
            ParseError::corrupt(BookFormat::Pdf, format!("missing document catalog: {}", e))
        })?;

        let pages = doc.get_pages();
        let mut parsed = ParsedDocument::new(BookFormat::Pdf);
        parsed.metadata = read_info_metadata(&doc);
        parsed.page_count = Some(pages.len() as u32);

        parsed.cover = pages
            .values()
            .next()
            .and_then(|&page_id| first_page_image(&doc, page_id));

        if parsed.cover.is_none() && !pages.is_empty() {
            if let Some(renderer) = &self.renderer {
                match renderer.render_first_page(bytes) {
                    Ok(png) => {
                        parsed.cover = Some(CoverImage {
                            data: png,
                            media_type: Some("image/png".to_string()),
                        })
                    }
                    Err(e) => tracing::warn!(error = %e, "first page render failed; no cover"),
                }
            }
        }

        tracing::debug!(
            fields = parsed.metadata.len(),
            pages = pages.len(),
            has_cover = parsed.cover.is_some(),
            "parsed PDF"
        );

        Ok(parsed)
    }
}

fn read_info_metadata(doc: &Document) -> BookMetadata {
    let mut metadata = BookMetadata::new();

    let info = match doc
        .trailer
        .get(b"Info")
        .ok()
        .and_then(|obj| resolve(doc, obj))
        .and_then(|obj| obj.as_dict().ok())
    {
        Some(info) => info,
        None => return metadata,
    };

    if let Some(title) = info_text(doc, info, b"Title") {
        metadata.set_text("title", &title);
    }
    if let Some(author) = info_text(doc, info, b"Author") {
        metadata.set_list("authors", author.split(';'));
    }
    if let Some(subject) = info_text(doc, info, b"Subject") {
        metadata.set_text("subject", &subject);
    }
    if let Some(keywords) = info_text(doc, info, b"Keywords") {
        metadata.set_list("tags", keywords.split(','));
    }
    if let Some(date) = info_text(doc, info, b"CreationDate").and_then(|d| parse_pdf_date(&d)) {
        metadata.set_text("publication_date", &date);
    }

    metadata
}

fn info_text(doc: &Document, info: &Dictionary, key: &[u8]) -> Option<String> {
    match resolve(doc, info.get(key).ok()?)? {
        Object::String(bytes, _) => Some(decode_text_string(bytes)),
        _ => None,
    }
}

fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Object> {
    match obj {
        Object::Reference(id) => doc.get_object(*id).ok(),
        other => Some(other),
    }
}

/// PDF text strings are UTF-16BE with a BOM, UTF-8 with a BOM (PDF 2.0),
/// or PDFDocEncoding, which agrees with Latin-1 for printable text.
pub(crate) fn decode_text_string(bytes: &[u8]) -> String {
    if let Some(rest) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = rest
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }

    if let Some(rest) = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]) {
        return String::from_utf8_lossy(rest).into_owned();
    }

    bytes.iter().map(|&b| char::from(b)).collect()
}

/// `D:YYYYMMDDHHmmSSOHH'mm` to `YYYY-MM-DD`, or `YYYY` when only a year is given.
pub(crate) fn parse_pdf_date(raw: &str) -> Option<String> {
    let raw = raw.trim();
    let raw = raw.strip_prefix("D:").unwrap_or(raw);
    let digits: String = raw.chars().take_while(|c| c.is_ascii_digit()).collect();

    match digits.len() {
        n if n >= 8 => {
            let (year, month, day) = (&digits[0..4], &digits[4..6], &digits[6..8]);
            let valid_month = matches!(month.parse::<u32>(), Ok(1..=12));
            let valid_day = matches!(day.parse::<u32>(), Ok(1..=31));
            if valid_month && valid_day {
                Some(format!("{}-{}-{}", year, month, day))
            } else {
                Some(year.to_string())
            }
        }
        n if n >= 4 => Some(digits[0..4].to_string()),
        _ => None,
    }
}

fn page_resources(doc: &Document, page_id: ObjectId) -> Option<&Dictionary> {
    let mut node = doc.get_object(page_id).ok()?.as_dict().ok()?;

    for _ in 0..MAX_PAGE_TREE_DEPTH {
        if let Ok(resources) = node.get(b"Resources") {
            return resolve(doc, resources)?.as_dict().ok();
        }
        let parent = node.get(b"Parent").ok()?.as_reference().ok()?;
        node = doc.get_object(parent).ok()?.as_dict().ok()?;
    }

    None
}

/// The first image XObject on the page that can be turned into a standalone image.
fn first_page_image(doc: &Document, page_id: ObjectId) -> Option<CoverImage> {
    let resources = page_resources(doc, page_id)?;
    let xobjects = resolve(doc, resources.get(b"XObject").ok()?)?
        .as_dict()
        .ok()?;

    xobjects.iter().find_map(|(_, obj)| {
        let stream = resolve(doc, obj)?.as_stream().ok()?;
        let subtype = stream.dict.get(b"Subtype").ok()?.as_name().ok()?;
        if subtype != b"Image" {
            return None;
        }
        image_from_stream(doc, stream)
    })
}

fn image_from_stream(doc: &Document, stream: &Stream) -> Option<CoverImage> {
    let filters = stream_filters(doc, &stream.dict);
    let filters: Vec<&[u8]> = filters.iter().map(Vec::as_slice).collect();

    match filters.as_slice() {
        [b"DCTDecode"] => Some(CoverImage {
            data: stream.content.clone(),
            media_type: Some("image/jpeg".to_string()),
        }),
        [] => raw_pixels_to_png(doc, &stream.dict, stream.content.clone()),
        [b"FlateDecode"] => {
            let pixels = stream.decompressed_content().ok()?;
            raw_pixels_to_png(doc, &stream.dict, pixels)
        }
        _ => None,
    }
}

fn stream_filters(doc: &Document, dict: &Dictionary) -> Vec<Vec<u8>> {
    let filter = match dict.get(b"Filter").ok().and_then(|f| resolve(doc, f)) {
        Some(filter) => filter,
        None => return Vec::new(),
    };

    match filter {
        Object::Name(name) => vec![name.clone()],
        Object::Array(items) => items
            .iter()
            .filter_map(|item| item.as_name().ok().map(<[u8]>::to_vec))
            .collect(),
        _ => Vec::new(),
    }
}

/// Re-encodes 8-bit DeviceRGB / DeviceGray samples as PNG.
fn raw_pixels_to_png(doc: &Document, dict: &Dictionary, pixels: Vec<u8>) -> Option<CoverImage> {
    let width = u32::try_from(dict.get(b"Width").ok()?.as_i64().ok()?).ok()?;
    let height = u32::try_from(dict.get(b"Height").ok()?.as_i64().ok()?).ok()?;
    let bits = dict.get(b"BitsPerComponent").ok()?.as_i64().ok()?;
    if bits != 8 || width == 0 || height == 0 {
        return None;
    }

    let color_space = resolve(doc, dict.get(b"ColorSpace").ok()?)?.as_name().ok()?;
    let channels: usize = match color_space {
        b"DeviceRGB" => 3,
        b"DeviceGray" => 1,
        _ => return None,
    };

    let expected = (width as usize)
        .checked_mul(height as usize)?
        .checked_mul(channels)?;
    if pixels.len() < expected {
        return None;
    }
    let mut pixels = pixels;
    pixels.truncate(expected);

    let image = if channels == 3 {
        image::DynamicImage::ImageRgb8(image::RgbImage::from_raw(width, height, pixels)?)
    } else {
        image::DynamicImage::ImageLuma8(image::GrayImage::from_raw(width, height, pixels)?)
    };

    let mut png = Cursor::new(Vec::new());
    image.write_to(&mut png, image::ImageFormat::Png).ok()?;

    Some(CoverImage {
        data: png.into_inner(),
        media_type: Some("image/png".to_string()),
    })
}
