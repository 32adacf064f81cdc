//! Image and region layer.
//!
//! This module provides the pixel capability the screen sink is built on:
//!
//! - [`Rect`]: rectangle arithmetic and tile-grid decomposition
//! - [`Region`]: a buffer of pixels covering a rectangle of an image, with
//!   invalidation tracking
//! - [`Image`]: an image description plus the [`Source`] that computes its
//!   pixels on demand
//! - [`Pattern`]: a synthetic source for demos and tests
//!
//! The sink never touches pixel math. It asks an [`Image`] to prepare regions
//! and copies bytes between regions.

mod pattern;
mod rect;
mod region;
mod source;

pub use pattern::Pattern;
pub use rect::{GridCells, Rect};
pub use region::{Region, MAX_REGION_BYTES};
pub use source::{BandFormat, Image, ImageInfo, Source};
