//! Post-processing applied to a decoded image before delivery

use lumen_core::DecodedImage;
use std::sync::Arc;
use std::time::Duration;

/// Renderable wrapper around a decoded image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Drawable {
    image: Arc<DecodedImage>,
}

impl Drawable {
    pub fn new(image: Arc<DecodedImage>) -> Self {
        Self { image }
    }

    pub fn image(&self) -> &Arc<DecodedImage> {
        &self.image
    }
}

/// One side of a cross-fade
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Layer {
    Transparent,
}

/// Declarative fade from `from` to `to`; the renderer plays it back
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FadeTransition {
    pub from: Layer,
    pub to: Drawable,
    pub duration: Duration,
}

/// What a receiver is handed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessedImage {
    Plain(Arc<DecodedImage>),
    Drawable(Drawable),
    Transition(FadeTransition),
}

impl ProcessedImage {
    /// The decoded image that ends up on screen
    pub fn image(&self) -> &Arc<DecodedImage> {
        match self {
            Self::Plain(image) => image,
            Self::Drawable(drawable) => drawable.image(),
            Self::Transition(transition) => transition.to.image(),
        }
    }

    pub fn is_transition(&self) -> bool {
        matches!(self, Self::Transition(_))
    }
}

/// Post-processor variants, selected per receiver
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ImageCreator {
    /// Hand the decoded image through untouched
    #[default]
    Identity,
    /// Wrap in a drawable, fading in on first appearance
    CompositeFade,
}

impl ImageCreator {
    pub fn create_image(&self, image: Option<Arc<DecodedImage>>) -> Option<ProcessedImage> {
        image.map(|image| self.wrap(image))
    }

    fn wrap(&self, image: Arc<DecodedImage>) -> ProcessedImage {
        match self {
            Self::Identity => ProcessedImage::Plain(image),
            Self::CompositeFade => ProcessedImage::Drawable(Drawable::new(image)),
        }
    }

    pub fn create_image_fading_in(
        &self,
        image: Arc<DecodedImage>,
        duration: Duration,
    ) -> ProcessedImage {
        match self {
            Self::Identity => ProcessedImage::Plain(image),
            Self::CompositeFade => ProcessedImage::Transition(FadeTransition {
                from: Layer::Transparent,
                to: Drawable::new(image),
                duration,
            }),
        }
    }

    /// Fade only when the image is appearing for the first time, i.e. it did
    /// not come straight out of the memory tier.
    pub(crate) fn prepare(
        &self,
        image: Arc<DecodedImage>,
        first_appearance: bool,
        fade: Duration,
    ) -> ProcessedImage {
        if first_appearance {
            self.create_image_fading_in(image, fade)
        } else {
            self.wrap(image)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_core::PixelFormat;

    fn image() -> Arc<DecodedImage> {
        Arc::new(DecodedImage::new(1, 1, PixelFormat::Rgba8, vec![1, 2, 3, 4]).unwrap())
    }

    #[test]
    fn test_absent_input_stays_absent() {
        assert!(ImageCreator::Identity.create_image(None).is_none());
        assert!(ImageCreator::CompositeFade.create_image(None).is_none());
    }

    #[test]
    fn test_identity_passes_through() {
        let img = image();
        assert_eq!(
            ImageCreator::Identity.create_image(Some(img.clone())),
            Some(ProcessedImage::Plain(img.clone()))
        );
        assert_eq!(
            ImageCreator::Identity.create_image_fading_in(img.clone(), Duration::from_millis(300)),
            ProcessedImage::Plain(img)
        );
    }

    #[test]
    fn test_composite_fade_builds_transition_from_transparent() {
        let img = image();
        let processed = ImageCreator::CompositeFade
            .create_image_fading_in(img.clone(), Duration::from_millis(250));

        match processed {
            ProcessedImage::Transition(transition) => {
                assert_eq!(transition.from, Layer::Transparent);
                assert_eq!(transition.to, Drawable::new(img));
                assert_eq!(transition.duration, Duration::from_millis(250));
            }
            other => panic!("expected transition, got {other:?}"),
        }
    }

    #[test]
    fn test_prepare_fades_only_on_first_appearance() {
        let fade = Duration::from_millis(100);
        assert!(ImageCreator::CompositeFade
            .prepare(image(), true, fade)
            .is_transition());
        assert!(matches!(
            ImageCreator::CompositeFade.prepare(image(), false, fade),
            ProcessedImage::Drawable(_)
        ));
        assert_eq!(
            ImageCreator::Identity.prepare(image(), true, fade).image(),
            &image()
        );
    }

    #[test]
    fn test_prepare_without_fade_matches_create_image() {
        let fade = Duration::from_millis(100);
        for creator in [ImageCreator::Identity, ImageCreator::CompositeFade] {
            assert_eq!(
                Some(creator.prepare(image(), false, fade)),
                creator.create_image(Some(image()))
            );
        }
    }
}
