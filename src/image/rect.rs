//! Axis-aligned rectangles and tile-grid decomposition.

use std::fmt;

use serde::Serialize;

/// An axis-aligned rectangle in image coordinates.
///
/// A rectangle with non-positive width or height is empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub const fn new(left: i32, top: i32, width: i32, height: i32) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    /// One past the rightmost column, saturating at `i32::MAX`.
    #[inline]
    pub const fn right(&self) -> i32 {
        self.left.saturating_add(self.width)
    }

    /// One past the bottom row, saturating at `i32::MAX`.
    #[inline]
    pub const fn bottom(&self) -> i32 {
        self.top.saturating_add(self.height)
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    /// Number of pixels covered, zero for empty rectangles.
    pub fn area(&self) -> u64 {
        if self.is_empty() {
            0
        } else {
            self.width as u64 * self.height as u64
        }
    }

    pub const fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.left && x < self.right() && y >= self.top && y < self.bottom()
    }

    /// True when `other` lies entirely inside `self`.
    pub fn includes(&self, other: &Rect) -> bool {
        other.is_empty()
            || (other.left >= self.left
                && other.top >= self.top
                && other.right() <= self.right()
                && other.bottom() <= self.bottom())
    }

    /// The overlap of two rectangles. Disjoint rectangles give an empty result.
    pub fn intersect(&self, other: &Rect) -> Rect {
        let left = self.left.max(other.left);
        let top = self.top.max(other.top);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());

        Rect {
            left,
            top,
            width: span(left, right),
            height: span(top, bottom),
        }
    }

    /// Iterate the `tile_width` x `tile_height` grid cells that `self` touches.
    ///
    /// The first cell's origin is `self`'s origin rounded down to a multiple of
    /// the tile size. Cells are yielded row by row, left to right.
    pub fn grid_cells(&self, tile_width: i32, tile_height: i32) -> GridCells {
        debug_assert!(tile_width > 0 && tile_height > 0);

        let start_x = self.left.div_euclid(tile_width) * tile_width;
        let start_y = self.top.div_euclid(tile_height) * tile_height;

        GridCells {
            bounds: *self,
            tile_width,
            tile_height,
            start_x,
            x: start_x,
            y: start_y,
        }
    }
}

/// Length of `start..end`, zero when reversed.
fn span(start: i32, end: i32) -> i32 {
    let len = (i64::from(end) - i64::from(start)).clamp(0, i64::from(i32::MAX));
    len as i32
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}x{}+{}+{}",
            self.width, self.height, self.left, self.top
        )
    }
}

/// Iterator over the grid cells covering a rectangle. See [`Rect::grid_cells`].
#[derive(Debug, Clone)]
pub struct GridCells {
    bounds: Rect,
    tile_width: i32,
    tile_height: i32,
    start_x: i32,
    x: i32,
    y: i32,
}

impl Iterator for GridCells {
    type Item = Rect;

    fn next(&mut self) -> Option<Rect> {
        if self.bounds.is_empty() || self.y >= self.bounds.bottom() {
            return None;
        }

        let cell = Rect::new(self.x, self.y, self.tile_width, self.tile_height);

        match self.x.checked_add(self.tile_width) {
            Some(x) if x < self.bounds.right() => self.x = x,
            _ => {
                self.x = self.start_x;
                self.y = self.y.saturating_add(self.tile_height);
            }
        }

        Some(cell)
    }
}
