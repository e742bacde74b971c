//! Local-file decoder built on the `image` crate

use image::DynamicImage;
use lumen_core::{DecodedImage, Error, Locator, PixelFormat, Result};
use lumen_loader::Decoder;
use std::path::PathBuf;
use url::Url;

/// Decodes files named by a path or a `file://` URL
pub struct ImageFileDecoder;

impl Decoder for ImageFileDecoder {
    fn decode(&self, locator: &Locator) -> Result<DecodedImage> {
        let path = local_path(locator).ok_or_else(|| {
            Error::decode_failure(locator.as_str(), "only local files can be decoded")
        })?;

        let decoded = image::open(&path).map_err(|e| {
            Error::decode_failure_with_source(locator.as_str(), "could not decode image", e)
        })?;

        let (width, height) = (decoded.width(), decoded.height());
        let (format, pixels) = match decoded {
            DynamicImage::ImageLuma8(buffer) => (PixelFormat::Gray8, buffer.into_raw()),
            DynamicImage::ImageLumaA8(buffer) => (PixelFormat::GrayAlpha8, buffer.into_raw()),
            DynamicImage::ImageRgb8(buffer) => (PixelFormat::Rgb8, buffer.into_raw()),
            other => (PixelFormat::Rgba8, other.to_rgba8().into_raw()),
        };

        tracing::trace!(%locator, width, height, ?format, "Decoded image");
        DecodedImage::new(width, height, format, pixels)
    }
}

fn local_path(locator: &Locator) -> Option<PathBuf> {
    let raw = locator.as_str().trim();
    match Url::parse(raw) {
        Ok(url) if url.scheme() == "file" => url.to_file_path().ok(),
        // Single-letter schemes are Windows drive letters
        Ok(url) if url.scheme().len() > 1 => None,
        _ => Some(PathBuf::from(raw)),
    }
}
