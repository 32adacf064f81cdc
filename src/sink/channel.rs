//! Consumer-facing outputs of a sink.
//!
//! A sink has a data channel, which serves pixels and computes what is
//! missing, and optionally a mask channel, which reports which cells are
//! cached. Each channel holds one attachment to the shared render and
//! releases it when dropped; the render is torn down with the last one.

use std::fmt;
use std::sync::Arc;

use super::render::{Render, SinkStats, TileProbe};
use crate::error::RegionError;
use crate::image::{ImageInfo, Rect, Region};

// =============================================================================
// Data Channel
// =============================================================================

/// Pixel output of a sink.
pub struct DataChannel {
    render: Arc<Render>,
}

impl DataChannel {
    /// Wrap the render's initial attachment.
    pub(crate) fn new(render: Arc<Render>) -> Self {
        Self { render }
    }

    /// Dimensions and pixel format of the output.
    pub fn info(&self) -> ImageInfo {
        self.render.info()
    }

    /// A new, unbuffered region suitable for [`DataChannel::pull`].
    pub fn region(&self) -> Region {
        Region::new(self.render.info())
    }

    /// Fill `out` with the pixels of `rect` (clipped to the image).
    ///
    /// Cells already cached are copied, missing cells are computed first. Any
    /// cell that cannot be supplied (computation failed, allocation failed,
    /// every tile busy, or in background mode not painted yet) reads as zero.
    ///
    /// # Errors
    ///
    /// Returns an error only if `out` itself cannot be buffered for `rect`.
    pub async fn pull(&self, rect: Rect, out: &mut Region) -> Result<(), RegionError> {
        out.buffer(rect)?;
        self.render.fill_data(out).await;
        Ok(())
    }

    /// Inspect the tile owning the grid cell that contains (x, y).
    ///
    /// Does not count as a use of the tile.
    pub fn probe(&self, x: i32, y: i32) -> Option<TileProbe> {
        self.render.probe(x, y)
    }

    /// Every indexed tile, most recently used first.
    pub fn tiles(&self) -> Vec<TileProbe> {
        self.render.tiles()
    }

    pub fn stats(&self) -> SinkStats {
        self.render.stats()
    }
}

impl Drop for DataChannel {
    fn drop(&mut self) {
        self.render.detach();
    }
}

impl fmt::Debug for DataChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataChannel")
            .field("info", &self.render.info())
            .field("closed", &self.render.is_closed())
            .finish()
    }
}

// =============================================================================
// Mask Channel
// =============================================================================

/// Validity output of a sink: 255 where pixels are cached, 0 elsewhere.
///
/// The mask has the image's dimensions, one 8-bit band, and is constant over
/// each grid cell.
pub struct MaskChannel {
    render: Arc<Render>,
}

impl MaskChannel {
    /// Take a second attachment on `render`.
    pub(crate) fn attach(render: &Arc<Render>) -> Self {
        render.attach();
        Self {
            render: Arc::clone(render),
        }
    }

    /// Dimensions and pixel format of the mask.
    pub fn info(&self) -> ImageInfo {
        self.render.info().mask()
    }

    /// A new, unbuffered region suitable for [`MaskChannel::pull`].
    pub fn region(&self) -> Region {
        Region::new(self.info())
    }

    /// Fill `out` with the cache state over `rect` (clipped to the image).
    ///
    /// Never triggers computation or eviction.
    ///
    /// # Errors
    ///
    /// Returns an error only if `out` itself cannot be buffered for `rect`.
    pub fn pull(&self, rect: Rect, out: &mut Region) -> Result<(), RegionError> {
        out.buffer(rect)?;
        self.render.fill_mask(out);
        Ok(())
    }

    pub fn stats(&self) -> SinkStats {
        self.render.stats()
    }
}

impl Drop for MaskChannel {
    fn drop(&mut self) {
        self.render.detach();
    }
}

impl fmt::Debug for MaskChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MaskChannel")
            .field("info", &self.info())
            .field("closed", &self.render.is_closed())
            .finish()
    }
}
