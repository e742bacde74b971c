//! Cache entries

use lumen_core::{CacheKey, DecodedImage};
use std::sync::Arc;

/// A decoded image together with its key and eviction weight
///
/// Cloning an entry shares the pixel buffer; the weight is the decoded byte
/// count and is never below 1, so every entry counts against the budget.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    key: CacheKey,
    image: Arc<DecodedImage>,
    weight: u64,
}

impl CacheEntry {
    /// Take ownership of a decoded image
    pub fn new(key: CacheKey, image: DecodedImage) -> Self {
        Self::from_shared(key, Arc::new(image))
    }

    pub fn from_shared(key: CacheKey, image: Arc<DecodedImage>) -> Self {
        let weight = (image.byte_len() as u64).max(1);
        Self { key, image, weight }
    }

    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    pub fn image(&self) -> &Arc<DecodedImage> {
        &self.image
    }

    pub fn weight(&self) -> u64 {
        self.weight
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_core::PixelFormat;

    #[test]
    fn test_weight_is_byte_count_with_floor_of_one() {
        let image = DecodedImage::new(2, 3, PixelFormat::Rgba8, vec![0; 24]).unwrap();
        assert_eq!(CacheEntry::new(CacheKey::new("a"), image).weight(), 24);

        let empty = DecodedImage::new(0, 0, PixelFormat::Rgba8, Vec::new()).unwrap();
        assert_eq!(CacheEntry::new(CacheKey::new("b"), empty).weight(), 1);
    }
}
