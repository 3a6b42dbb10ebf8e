//! Synthetic book fixtures.

#![allow(dead_code)]

use std::io::{Cursor, Write};

use lopdf::{dictionary, Dictionary, Document, Object, Stream};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// A small opaque PNG suitable as a cover.
pub fn png_cover(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    });
    let mut out = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut out, image::ImageFormat::Png)
        .unwrap();
    out.into_inner()
}

/// Page 1 image: width, height, samples and stream filter.
type PageImage = (u32, u32, Vec<u8>, Option<&'static str>);

/// Single-page PDF, optionally with an info dictionary and an image on page 1.
pub struct PdfBuilder {
    info: Option<Dictionary>,
    image: Option<PageImage>,
}

impl PdfBuilder {
    pub fn new() -> Self {
        Self {
            info: None,
            image: None,
        }
    }

    pub fn title(self, title: &str) -> Self {
        self.info(dictionary! {
            "Title" => Object::string_literal(title),
        })
    }

    pub fn info(mut self, info: Dictionary) -> Self {
        self.info = Some(info);
        self
    }

    pub fn jpeg_cover(mut self, width: u32, height: u32) -> Self {
        let img = image::RgbImage::from_pixel(width, height, image::Rgb([20, 90, 160]));
        let mut out = Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut out, image::ImageFormat::Jpeg)
            .unwrap();
        self.image = Some((width, height, out.into_inner(), Some("DCTDecode")));
        self
    }

    /// Unfiltered RGB noise, which the parser has to re-encode as PNG.
    pub fn raw_rgb_cover(mut self, width: u32, height: u32) -> Self {
        let mut state: u32 = 0x9E37_79B9;
        let samples = (0..width as usize * height as usize * 3)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                (state >> 24) as u8
            })
            .collect();
        self.image = Some((width, height, samples, None));
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let page_id = doc.new_object_id();

        let mut resources = Dictionary::new();
        if let Some((width, height, data, filter)) = self.image {
            let mut dict = dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => width as i64,
                "Height" => height as i64,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8,
            };
            if let Some(filter) = filter {
                dict.set("Filter", Object::Name(filter.as_bytes().to_vec()));
            }
            let image_id = doc.add_object(Stream::new(dict, data));
            resources.set("XObject", dictionary! { "Im1" => image_id });
        }
        let resources_id = doc.add_object(resources);

        doc.objects.insert(
            page_id,
            Object::Dictionary(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
                "Resources" => resources_id,
            }),
        );
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        if let Some(info) = self.info {
            let info_id = doc.add_object(info);
            doc.trailer.set("Info", info_id);
        }

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();
        bytes
    }
}

const CONTAINER: &str = r#"<?xml version="1.0"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>"#;

/// EPUB 3 package with optional title, author and cover image.
pub struct EpubBuilder {
    title: Option<String>,
    author: Option<String>,
    cover: Option<Vec<u8>>,
    mimetype_entry: bool,
}

impl EpubBuilder {
    pub fn new() -> Self {
        Self {
            title: None,
            author: None,
            cover: None,
            mimetype_entry: true,
        }
    }

    pub fn title(mut self, title: &str) -> Self {
        self.title = Some(title.to_string());
        self
    }

    pub fn author(mut self, author: &str) -> Self {
        self.author = Some(author.to_string());
        self
    }

    pub fn cover(mut self, png: Vec<u8>) -> Self {
        self.cover = Some(png);
        self
    }

    /// Omits the leading `mimetype` entry, leaving a plain ZIP signature.
    pub fn without_mimetype(mut self) -> Self {
        self.mimetype_entry = false;
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut metadata = String::new();
        if let Some(title) = &self.title {
            metadata.push_str(&format!("<dc:title>{}</dc:title>", title));
        }
        if let Some(author) = &self.author {
            metadata.push_str(&format!("<dc:creator>{}</dc:creator>", author));
        }
        metadata.push_str("<dc:language>en</dc:language>");

        let manifest = if self.cover.is_some() {
            r#"<item id="cover-img" href="images/cover.png" media-type="image/png" properties="cover-image"/>"#
        } else {
            ""
        };

        let package = format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="3.0" unique-identifier="uid">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">{}</metadata>
  <manifest>
    <item id="text" href="text.xhtml" media-type="application/xhtml+xml"/>
    {}
  </manifest>
</package>"#,
            metadata, manifest
        );

        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        if self.mimetype_entry {
            let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
            zip.start_file("mimetype", stored).unwrap();
            zip.write_all(b"application/epub+zip").unwrap();
        }

        let options = SimpleFileOptions::default();
        zip.start_file("META-INF/container.xml", options).unwrap();
        zip.write_all(CONTAINER.as_bytes()).unwrap();
        zip.start_file("OEBPS/content.opf", options).unwrap();
        zip.write_all(package.as_bytes()).unwrap();
        zip.start_file("OEBPS/text.xhtml", options).unwrap();
        zip.write_all(b"<html><body><p>Chapter one.</p></body></html>")
            .unwrap();
        if let Some(cover) = &self.cover {
            zip.start_file("OEBPS/images/cover.png", options).unwrap();
            zip.write_all(cover).unwrap();
        }

        zip.finish().unwrap().into_inner()
    }
}
