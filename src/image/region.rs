//! Pixel regions: addressable buffers covering a rectangle of an image.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::{Bytes, BytesMut};

use super::{ImageInfo, Rect};
use crate::error::RegionError;

/// Largest buffer a single region may allocate: 1GB.
pub const MAX_REGION_BYTES: u64 = 1024 * 1024 * 1024;

/// A 2-D pixel buffer covering part of an image.
///
/// The buffer is (re)allocated with [`Region::buffer`], which clips the
/// requested rectangle to the image bounds. The clipped rectangle is
/// [`Region::valid`]. Pixels are packed, row-major, with no padding between
/// rows.
///
/// Regions created by an [`Image`](super::Image) share its invalidation
/// generation. Once the region has been computed, invalidating the image makes
/// [`Region::is_invalid`] report `true` until the region is recomputed.
#[derive(Debug)]
pub struct Region {
    bounds: Rect,
    bytes_per_pixel: usize,
    valid: Rect,
    data: BytesMut,
    generation: Arc<AtomicU64>,
    /// Generation the contents were computed at, `None` if never computed
    stamp: Option<u64>,
}

impl Region {
    /// Create an unbuffered region for an image described by `info`.
    ///
    /// The region has its own generation counter, so it never becomes invalid.
    /// This is what consumers use for output buffers.
    pub fn new(info: ImageInfo) -> Self {
        Self::with_generation(info, Arc::new(AtomicU64::new(0)))
    }

    pub(crate) fn with_generation(info: ImageInfo, generation: Arc<AtomicU64>) -> Self {
        Self {
            bounds: info.bounds(),
            bytes_per_pixel: info.bytes_per_pixel(),
            valid: Rect::default(),
            data: BytesMut::new(),
            generation,
            stamp: None,
        }
    }

    /// Size the buffer to hold `rect` clipped to the image bounds.
    ///
    /// Existing contents are discarded and the buffer is zeroed. The previous
    /// allocation is reused when it is large enough. On error the region is
    /// left unchanged.
    pub fn buffer(&mut self, rect: Rect) -> Result<(), RegionError> {
        let clipped = rect.intersect(&self.bounds);
        if clipped.is_empty() {
            return Err(RegionError::OutsideImage {
                rect,
                bounds: self.bounds,
            });
        }

        let requested = clipped.area() * self.bytes_per_pixel as u64;
        if requested > MAX_REGION_BYTES {
            return Err(RegionError::TooLarge {
                requested,
                limit: MAX_REGION_BYTES,
            });
        }

        self.data.clear();
        self.data.resize(requested as usize, 0);
        self.valid = clipped;
        self.stamp = None;

        Ok(())
    }

    /// The rectangle this region currently holds pixels for.
    pub fn valid(&self) -> Rect {
        self.valid
    }

    /// The bounds of the image this region belongs to.
    pub fn bounds(&self) -> Rect {
        self.bounds
    }

    pub fn bytes_per_pixel(&self) -> usize {
        self.bytes_per_pixel
    }

    /// Bytes between the starts of consecutive rows.
    pub fn stride(&self) -> usize {
        self.valid.width as usize * self.bytes_per_pixel
    }

    /// Byte offset of pixel (x, y) in the buffer.
    ///
    /// # Panics
    /// Panics if (x, y) lies outside [`Region::valid`].
    #[inline]
    pub fn offset(&self, x: i32, y: i32) -> usize {
        assert!(
            self.valid.contains(x, y),
            "pixel ({x}, {y}) outside region {}",
            self.valid
        );
        let dx = (x - self.valid.left) as usize;
        let dy = (y - self.valid.top) as usize;
        dy * self.stride() + dx * self.bytes_per_pixel
    }

    /// `width` pixels of row `y`, starting at column `x`.
    pub fn row(&self, x: i32, y: i32, width: i32) -> &[u8] {
        let start = self.offset(x, y);
        let len = width as usize * self.bytes_per_pixel;
        &self.data[start..start + len]
    }

    /// Mutable access to `width` pixels of row `y`, starting at column `x`.
    pub fn row_mut(&mut self, x: i32, y: i32, width: i32) -> &mut [u8] {
        let start = self.offset(x, y);
        let len = width as usize * self.bytes_per_pixel;
        &mut self.data[start..start + len]
    }

    /// The bytes of a single pixel.
    pub fn pixel(&self, x: i32, y: i32) -> &[u8] {
        self.row(x, y, 1)
    }

    /// Set every byte of the pixels in `rect` (clipped to this region) to `value`.
    pub fn paint(&mut self, rect: Rect, value: u8) {
        let area = rect.intersect(&self.valid);
        if area.is_empty() {
            return;
        }

        for y in area.top..area.bottom() {
            self.row_mut(area.left, y, area.width).fill(value);
        }
    }

    /// Copy the pixels of `rect` from `src` into this region, row by row.
    ///
    /// `rect` is clipped to both regions. Both regions must share a pixel size.
    pub fn copy_from(&mut self, src: &Region, rect: Rect) {
        debug_assert_eq!(self.bytes_per_pixel, src.bytes_per_pixel);

        let area = rect.intersect(&self.valid).intersect(&src.valid);
        if area.is_empty() {
            return;
        }

        for y in area.top..area.bottom() {
            let from = src.row(area.left, y, area.width);
            self.row_mut(area.left, y, area.width).copy_from_slice(from);
        }
    }

    /// True when the image was invalidated after these pixels were computed.
    ///
    /// A region that has never been computed is not invalid: it simply holds
    /// no pixels yet.
    pub fn is_invalid(&self) -> bool {
        self.stamp
            .is_some_and(|stamp| stamp != self.generation.load(Ordering::Acquire))
    }

    /// Record that the contents were computed at image generation `generation`.
    pub(crate) fn stamp(&mut self, generation: u64) {
        self.stamp = Some(generation);
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Copy the pixels out into an immutable buffer.
    pub fn to_bytes(&self) -> Bytes {
        Bytes::copy_from_slice(&self.data)
    }
}
