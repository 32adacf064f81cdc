//! Screen sink: an on-demand tile cache between a pipeline and its consumer.
//!
//! A sink wraps an [`Image`](crate::image::Image) and serves rectangles of it
//! through two channels. The data channel answers with whatever is cached and
//! computes missing tiles on demand; the mask channel says which parts are
//! cached without computing anything.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────┐        ┌───────────────┐
//! │  DataChannel  │        │  MaskChannel  │
//! └───────┬───────┘        └───────┬───────┘
//!         │ attach                 │ attach
//!         ▼                        ▼
//! ┌─────────────────────────────────────────┐
//! │                 Render                  │
//! │  ┌───────────┐  ┌────────────────────┐  │
//! │  │ TileTable │  │ tiles (≤ max_tiles)│  │
//! │  │ (by cell, │  │ area, buffer,      │  │
//! │  │  LRU)     │  │ state, last_used   │  │
//! │  └───────────┘  └────────────────────┘  │
//! └────────────────────┬────────────────────┘
//!                      │ prepare_to (unlocked)
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │            Image / Source               │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Components
//!
//! - [`create_sink`] / [`SinkConfig`]: install a sink on an image
//! - [`DataChannel`]: pull pixels, computing missing tiles
//! - [`MaskChannel`]: pull a 0/255 map of cached cells
//! - [`SinkStats`], [`TileProbe`]: cache introspection
//!
//! # Example
//!
//! ```
//! use screen_sink::image::{BandFormat, Image, ImageInfo, Pattern, Rect};
//! use screen_sink::sink::create_sink;
//!
//! #[tokio::main]
//! async fn main() {
//!     let image = Image::new(ImageInfo::new(512, 512, 3, BandFormat::UChar), Pattern::new());
//!     let (data, mask) = create_sink(image, 64, 64, 16, 0).unwrap();
//!
//!     let mut pixels = data.region();
//!     data.pull(Rect::new(0, 0, 100, 100), &mut pixels).await.unwrap();
//!
//!     let mut coverage = mask.region();
//!     mask.pull(Rect::new(0, 0, 512, 512), &mut coverage).unwrap();
//!     assert_eq!(coverage.pixel(10, 10), &[255]);
//!     assert_eq!(coverage.pixel(300, 300), &[0]);
//! }
//! ```

mod channel;
mod config;
mod render;
mod table;
mod tile;

pub use channel::{DataChannel, MaskChannel};
pub use config::{
    create_sink, MaxTiles, PaintNotify, RenderMode, SinkConfig, DEFAULT_MAX_TILES,
    DEFAULT_TILE_SIZE,
};
pub use render::{live_renders, SinkStats, TileProbe};
pub use tile::TileState;
