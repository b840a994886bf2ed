use super::CacheError;
use image::{DynamicImage, GenericImageView, Rgba, RgbaImage};
use std::sync::Arc;

/// Decoded image shared between the cache and its callers.
#[derive(Clone)]
pub struct Image {
    inner: Arc<DynamicImage>,
}

impl Image {
    pub fn decode(bytes: &[u8], location: &str) -> Result<Self, CacheError> {
        let decoded = image::load_from_memory(bytes).map_err(|source| CacheError::Decode {
            location: location.to_string(),
            source,
        })?;
        Ok(Self::from_dynamic(decoded))
    }

    pub fn from_dynamic(image: DynamicImage) -> Self {
        Self {
            inner: Arc::new(image),
        }
    }

    /// Stand-in drawn when an image cannot be loaded: a grey frame with a
    /// red cross.
    pub fn placeholder() -> Self {
        const SIZE: u32 = 32;
        let img = RgbaImage::from_fn(SIZE, SIZE, |x, y| {
            let edge = x == 0 || y == 0 || x == SIZE - 1 || y == SIZE - 1;
            let diagonal = x == y || x + y == SIZE - 1;
            if edge {
                Rgba([128, 128, 128, 255])
            } else if diagonal {
                Rgba([220, 40, 40, 255])
            } else {
                Rgba([255, 255, 255, 255])
            }
        });
        Self::from_dynamic(DynamicImage::ImageRgba8(img))
    }

    pub fn width(&self) -> u32 {
        self.inner.width()
    }

    pub fn height(&self) -> u32 {
        self.inner.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.inner.dimensions()
    }

    /// Bytes held by the decoded pixel buffer.
    pub fn byte_size(&self) -> usize {
        self.inner.as_bytes().len()
    }

    pub fn as_dynamic(&self) -> &DynamicImage {
        &self.inner
    }

    pub fn ptr_eq(&self, other: &Image) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl std::fmt::Debug for Image {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Image")
            .field("width", &self.width())
            .field("height", &self.height())
            .field("bytes", &self.byte_size())
            .finish()
    }
}
