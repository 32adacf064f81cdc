//! Cache entries.

use serde::Serialize;

use crate::error::RegionError;
use crate::image::{Image, Rect, Region};

/// Index of a tile in its render's tile list. Tiles are never freed before
/// the render, so ids stay stable.
pub(crate) type TileId = usize;

/// Paint state of a tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TileState {
    /// No valid pixels for the current area: new, relocated, or last compute failed
    Blank,

    /// A task is computing the pixels; the buffer is checked out to it
    Computing,

    /// The buffer holds fully computed pixels for the current area
    Painted,
}

/// One cache entry: a grid cell's worth of computed pixels.
#[derive(Debug)]
pub(crate) struct Tile {
    /// Placement in output coordinates (unclipped, always one grid cell)
    area: Rect,

    /// Pixels for `area` clipped to the image. `None` while computing.
    region: Option<Region>,

    state: TileState,

    /// LRU tick of the last lookup or compute
    ticks: u64,
}

impl Tile {
    /// Allocate a tile covering `area`.
    pub(crate) fn new(image: &Image, area: Rect) -> Result<Self, RegionError> {
        let mut region = image.region();
        region.buffer(area)?;

        Ok(Self {
            area,
            region: Some(region),
            state: TileState::Blank,
            ticks: 0,
        })
    }

    pub(crate) fn area(&self) -> Rect {
        self.area
    }

    pub(crate) fn state(&self) -> TileState {
        self.state
    }

    pub(crate) fn ticks(&self) -> u64 {
        self.ticks
    }

    pub(crate) fn is_painted(&self) -> bool {
        self.state == TileState::Painted
    }

    /// True when the image was invalidated after this tile was painted.
    pub(crate) fn is_invalid(&self) -> bool {
        self.region.as_ref().is_some_and(Region::is_invalid)
    }

    /// Painted, and the pixels are still current.
    pub(crate) fn is_valid(&self) -> bool {
        self.is_painted() && !self.is_invalid()
    }

    /// Move the tile to a new grid cell, discarding its pixels.
    ///
    /// If the buffer cannot be reallocated the tile is left untouched.
    pub(crate) fn relocate(&mut self, area: Rect) -> Result<(), RegionError> {
        debug_assert_ne!(self.state, TileState::Computing);

        if let Some(region) = self.region.as_mut() {
            region.buffer(area)?;
        }
        self.area = area;
        self.state = TileState::Blank;

        Ok(())
    }

    /// Stamp with the current LRU clock and advance it.
    pub(crate) fn touch(&mut self, clock: &mut u64) {
        self.ticks = *clock;
        *clock += 1;
    }

    /// Hand the buffer to a computing task. `None` if it is already out.
    pub(crate) fn checkout(&mut self) -> Option<Region> {
        let region = self.region.take()?;
        self.state = TileState::Computing;
        Some(region)
    }

    /// Take the buffer back from a computing task.
    pub(crate) fn checkin(&mut self, region: Region, painted: bool) {
        debug_assert_eq!(self.state, TileState::Computing);

        self.region = Some(region);
        self.state = if painted {
            TileState::Painted
        } else {
            TileState::Blank
        };
    }

    /// Copy the overlap with `out` into `out`, or zero it if there is nothing
    /// valid to copy. Returns whether pixels were copied.
    pub(crate) fn copy_to(&self, out: &mut Region) -> bool {
        let overlap = self.area.intersect(&out.valid());

        match self.region.as_ref() {
            Some(region) if self.is_valid() => {
                out.copy_from(region, overlap);
                true
            }
            _ => {
                out.paint(overlap, 0);
                false
            }
        }
    }
}
