//! Cover normalization: every stored cover is an RGB JPEG plus a bounded thumbnail.

use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;

use crate::config::CoversConfig;

#[derive(Debug, thiserror::Error)]
pub enum CoverError {
    #[error("Cover image could not be decoded: {0}")]
    Decode(#[source] image::ImageError),

    #[error("Cover image could not be encoded: {0}")]
    Encode(#[source] image::ImageError),
}

#[derive(Debug, Clone)]
pub struct NormalizedCover {
    pub image: Vec<u8>,
    pub thumbnail: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

pub const COVER_MEDIA_TYPE: &str = "image/jpeg";

pub fn normalize_cover(raw: &[u8], config: &CoversConfig) -> Result<NormalizedCover, CoverError> {
    let decoded = image::load_from_memory(raw).map_err(CoverError::Decode)?;

    let image = encode_jpeg(&decoded, config.jpeg_quality)?;
    // `thumbnail` keeps the aspect ratio within the bounding box.
    let thumb = decoded.thumbnail(config.thumbnail_width, config.thumbnail_height);
    let thumbnail = encode_jpeg(&thumb, config.jpeg_quality)?;

    Ok(NormalizedCover {
        image,
        thumbnail,
        width: decoded.width(),
        height: decoded.height(),
    })
}

fn encode_jpeg(image: &DynamicImage, quality: u8) -> Result<Vec<u8>, CoverError> {
    let rgb = image.to_rgb8();
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, quality)
        .encode_image(&rgb)
        .map_err(CoverError::Encode)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbaImage::from_pixel(width, height, image::Rgba([10, 120, 200, 128]));
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(img)
            .write_to(&mut out, image::ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    #[test]
    fn test_png_becomes_jpeg_with_bounded_thumbnail() {
        let config = CoversConfig::default();
        let cover = normalize_cover(&png(600, 900), &config).unwrap();

        assert_eq!((cover.width, cover.height), (600, 900));
        assert_eq!(
            image::guess_format(&cover.image).unwrap(),
            image::ImageFormat::Jpeg
        );

        let thumb = image::load_from_memory(&cover.thumbnail).unwrap();
        assert!(thumb.width() <= config.thumbnail_width);
        assert!(thumb.height() <= config.thumbnail_height);
        assert_eq!(thumb.height(), 200);
    }

    #[test]
    fn test_small_cover_is_not_enlarged_beyond_box() {
        let config = CoversConfig::default();
        let cover = normalize_cover(&png(40, 30), &config).unwrap();
        let thumb = image::load_from_memory(&cover.thumbnail).unwrap();
        assert!(thumb.width() <= config.thumbnail_width);
        assert!(thumb.height() <= config.thumbnail_height);
    }

    #[test]
    fn test_garbage_is_decode_error() {
        let err = normalize_cover(b"definitely not an image", &CoversConfig::default()).unwrap_err();
        assert!(matches!(err, CoverError::Decode(_)));
    }
}
