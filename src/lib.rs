//! # Screen Sink
//!
//! An asynchronous tile cache that sits between a slow image pipeline and an
//! interactive consumer such as a viewer.
//!
//! The consumer asks for rectangles of an image. The sink answers from a
//! bounded cache of fixed-size tiles aligned to a grid, computes missing tiles
//! on demand, reuses the least recently used idle tile when the cache is
//! full, and never blocks on a tile someone else is already computing: those
//! pixels read as zero until they land. A companion mask channel reports
//! which parts of the image are currently cached.
//!
//! ## Features
//!
//! - **Bounded LRU tile cache**: a tile budget with recency-ordered reuse
//! - **Non-blocking degradation**: failed, busy or unallocatable tiles read as zeros
//! - **Validity mask**: a 0/255 map of cached cells that never triggers work
//! - **Background painting**: optionally compute tiles on spawned tasks and
//!   get notified as each one lands
//! - **Invalidation**: bumping an image's generation marks cached tiles stale
//!
//! ## Architecture
//!
//! - [`image`] - rectangles, pixel regions, images and their sources
//! - [`sink`] - the tile cache and its data and mask channels
//! - [`error`] - error types
//! - [`config`] - CLI configuration for the demo binary
//!
//! ## Example
//!
//! ```rust
//! use screen_sink::{create_sink, BandFormat, Image, ImageInfo, Pattern, Rect};
//!
//! #[tokio::main]
//! async fn main() {
//!     let image = Image::new(ImageInfo::new(2048, 2048, 3, BandFormat::UChar), Pattern::new());
//!     let (data, mask) = create_sink(image, 128, 128, 64, 0).unwrap();
//!
//!     let mut view = data.region();
//!     data.pull(Rect::new(100, 100, 640, 480), &mut view).await.unwrap();
//!
//!     let stats = mask.stats();
//!     assert_eq!(stats.computes, 30);
//! }
//! ```

pub mod config;
pub mod error;
pub mod image;
pub mod sink;

// Re-export commonly used types
pub use crate::image::{
    BandFormat, Image, ImageInfo, Pattern, Rect, Region, Source, MAX_REGION_BYTES,
};
pub use config::{Cli, Command, PanConfig, RenderConfig, StatsFormat};
pub use error::{RegionError, SinkError, SourceError};
pub use sink::{
    create_sink, live_renders, DataChannel, MaskChannel, MaxTiles, PaintNotify, RenderMode,
    SinkConfig, SinkStats, TileProbe, TileState, DEFAULT_MAX_TILES, DEFAULT_TILE_SIZE,
};
