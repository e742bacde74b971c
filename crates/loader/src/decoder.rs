//! Decoder seam

use lumen_core::{DecodedImage, Locator, Result};

/// Turns a locator into pixels
///
/// Runs on the blocking pool, so implementations may do synchronous I/O.
/// Any error ends the load as an absence delivery.
pub trait Decoder: Send + Sync + 'static {
    fn decode(&self, locator: &Locator) -> Result<DecodedImage>;
}

impl<F> Decoder for F
where
    F: Fn(&Locator) -> Result<DecodedImage> + Send + Sync + 'static,
{
    fn decode(&self, locator: &Locator) -> Result<DecodedImage> {
        self(locator)
    }
}
