//! Domain types shared across the pipeline

mod image;
mod locator;

pub use image::{DecodedImage, PixelFormat};
pub use locator::{CacheKey, Locator};
