//! Upstream images and the compute callback that fills their regions.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use super::{Rect, Region};
use crate::error::SourceError;

// =============================================================================
// Image Description
// =============================================================================

/// Storage format of a single band sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum BandFormat {
    UChar,
    UShort,
    Float,
}

impl BandFormat {
    /// Size of one sample in bytes.
    pub const fn size(self) -> usize {
        match self {
            BandFormat::UChar => 1,
            BandFormat::UShort => 2,
            BandFormat::Float => 4,
        }
    }
}

/// Dimensions and pixel format of an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ImageInfo {
    /// Width in pixels
    pub width: i32,

    /// Height in pixels
    pub height: i32,

    /// Samples per pixel
    pub bands: u8,

    /// Sample format
    pub format: BandFormat,
}

impl ImageInfo {
    pub const fn new(width: i32, height: i32, bands: u8, format: BandFormat) -> Self {
        Self {
            width,
            height,
            bands,
            format,
        }
    }

    /// The rectangle covering the whole image.
    pub const fn bounds(&self) -> Rect {
        Rect::new(0, 0, self.width, self.height)
    }

    pub const fn bytes_per_pixel(&self) -> usize {
        self.bands as usize * self.format.size()
    }

    /// A one-band 8-bit image with the same dimensions, used for validity masks.
    pub const fn mask(&self) -> ImageInfo {
        ImageInfo::new(self.width, self.height, 1, BandFormat::UChar)
    }
}

// =============================================================================
// Source Trait
// =============================================================================

/// The compute callback of an image: fills a region with pixels.
///
/// This is where the upstream pipeline (convolution, resampling, arithmetic,
/// ...) plugs in. The region is already buffered; implementations write every
/// pixel of [`Region::valid`]. Sources must tolerate concurrent calls for
/// different regions.
#[async_trait]
pub trait Source: Send + Sync {
    /// Compute the pixels for `region.valid()` into `region`.
    async fn generate(&self, region: &mut Region) -> Result<(), SourceError>;
}

// =============================================================================
// Image
// =============================================================================

/// An image: a description plus the source that computes its pixels.
///
/// Images carry an invalidation generation. [`Image::invalidate`] bumps it,
/// which marks every region computed earlier as stale.
pub struct Image {
    info: ImageInfo,
    source: Box<dyn Source>,
    generation: Arc<AtomicU64>,
}

impl Image {
    /// Wrap a source as a shareable image.
    pub fn new(info: ImageInfo, source: impl Source + 'static) -> Arc<Self> {
        Arc::new(Self {
            info,
            source: Box::new(source),
            generation: Arc::new(AtomicU64::new(0)),
        })
    }

    pub fn info(&self) -> ImageInfo {
        self.info
    }

    pub fn bounds(&self) -> Rect {
        self.info.bounds()
    }

    /// Current invalidation generation.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Mark all previously computed pixels of this image as stale.
    pub fn invalidate(&self) {
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        debug!(generation, "image invalidated");
    }

    /// A new, unbuffered region tied to this image's invalidation state.
    pub fn region(&self) -> Region {
        Region::with_generation(self.info, self.generation.clone())
    }

    /// Compute the pixels for `region.valid()` and stamp the region.
    ///
    /// The generation is sampled before computing, so an invalidation that
    /// races with the computation leaves the region invalid.
    pub async fn prepare_to(&self, region: &mut Region) -> Result<(), SourceError> {
        let generation = self.generation();
        self.source.generate(region).await?;
        region.stamp(generation);
        Ok(())
    }
}

impl fmt::Debug for Image {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Image")
            .field("info", &self.info)
            .field("generation", &self.generation())
            .finish_non_exhaustive()
    }
}
