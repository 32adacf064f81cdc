//! Sink construction parameters.

use std::fmt;
use std::num::NonZeroUsize;
use std::sync::Arc;

use serde::Serialize;

use super::channel::{DataChannel, MaskChannel};
use super::render::Render;
use crate::error::SinkError;
use crate::image::{Image, Rect};

/// Default tile edge length in pixels.
pub const DEFAULT_TILE_SIZE: i32 = 128;

/// Default tile budget.
pub const DEFAULT_MAX_TILES: i64 = 256;

/// Callback invoked with a tile's area after it is painted in the background.
pub type PaintNotify = Arc<dyn Fn(Rect) + Send + Sync>;

/// How missing tiles get computed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum RenderMode {
    /// The pulling task computes missing tiles before returning
    #[default]
    Synchronous,

    /// Missing tiles are computed on spawned tasks; pulls return at once with
    /// those cells zeroed, and the paint notification fires when they land
    Background,
}

/// Tile budget of a render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaxTiles {
    Unbounded,
    Bounded(NonZeroUsize),
}

impl MaxTiles {
    /// Interpret a raw count: `-1` is unbounded, `0` allows a single tile.
    pub fn from_count(count: i64) -> Result<Self, SinkError> {
        match count {
            -1 => Ok(MaxTiles::Unbounded),
            n if n < -1 => Err(SinkError::InvalidMaxTiles(n)),
            n => {
                let n = usize::try_from(n).map_err(|_| SinkError::InvalidMaxTiles(n))?;
                Ok(MaxTiles::Bounded(NonZeroUsize::new(n).unwrap_or(NonZeroUsize::MIN)))
            }
        }
    }

    /// Whether a render holding `allocated` tiles may allocate another.
    pub fn allows(self, allocated: usize) -> bool {
        match self {
            MaxTiles::Unbounded => true,
            MaxTiles::Bounded(max) => allocated < max.get(),
        }
    }

    pub fn limit(self) -> Option<usize> {
        match self {
            MaxTiles::Unbounded => None,
            MaxTiles::Bounded(max) => Some(max.get()),
        }
    }
}

/// Configuration for a screen sink.
///
/// # Example
///
/// ```
/// use screen_sink::image::{BandFormat, Image, ImageInfo, Pattern};
/// use screen_sink::sink::SinkConfig;
///
/// let image = Image::new(ImageInfo::new(1024, 1024, 3, BandFormat::UChar), Pattern::new());
/// let (data, mask) = SinkConfig::new(64, 64)
///     .with_max_tiles(100)
///     .with_priority(1)
///     .build(image)
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct SinkConfig {
    /// Grid cell width in pixels
    pub tile_width: i32,

    /// Grid cell height in pixels
    pub tile_height: i32,

    /// Tile budget, `-1` for unbounded
    pub max_tiles: i64,

    /// Scheduling hint. Recorded and reported, never acted on.
    pub priority: i32,

    pub mode: RenderMode,

    notify: Option<PaintNotify>,
}

impl SinkConfig {
    /// Unbounded synchronous sink with the given tile size.
    pub fn new(tile_width: i32, tile_height: i32) -> Self {
        Self {
            tile_width,
            tile_height,
            max_tiles: -1,
            priority: 0,
            mode: RenderMode::Synchronous,
            notify: None,
        }
    }

    pub fn with_max_tiles(mut self, max_tiles: i64) -> Self {
        self.max_tiles = max_tiles;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_mode(mut self, mode: RenderMode) -> Self {
        self.mode = mode;
        self
    }

    /// Compute missing tiles on background tasks.
    pub fn with_background(self) -> Self {
        self.with_mode(RenderMode::Background)
    }

    /// Call `notify` with each tile area painted by a background task.
    pub fn with_notify(mut self, notify: impl Fn(Rect) + Send + Sync + 'static) -> Self {
        self.notify = Some(Arc::new(notify));
        self
    }

    pub(crate) fn notify(&self) -> Option<PaintNotify> {
        self.notify.clone()
    }

    /// Check the geometry and resolve the tile budget.
    pub fn validate(&self) -> Result<MaxTiles, SinkError> {
        if self.tile_width <= 0 || self.tile_height <= 0 {
            return Err(SinkError::InvalidTileSize {
                width: self.tile_width,
                height: self.tile_height,
            });
        }

        MaxTiles::from_count(self.max_tiles)
    }

    /// Install a sink on `image` with both a data and a mask channel.
    pub fn build(&self, image: Arc<Image>) -> Result<(DataChannel, MaskChannel), SinkError> {
        let render = Arc::new(Render::new(image, self)?);
        let mask = MaskChannel::attach(&render);
        Ok((DataChannel::new(render), mask))
    }

    /// Install a sink on `image` with only a data channel.
    pub fn build_data(&self, image: Arc<Image>) -> Result<DataChannel, SinkError> {
        let render = Arc::new(Render::new(image, self)?);
        Ok(DataChannel::new(render))
    }
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self::new(DEFAULT_TILE_SIZE, DEFAULT_TILE_SIZE).with_max_tiles(DEFAULT_MAX_TILES)
    }
}

impl fmt::Debug for SinkConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SinkConfig")
            .field("tile_width", &self.tile_width)
            .field("tile_height", &self.tile_height)
            .field("max_tiles", &self.max_tiles)
            .field("priority", &self.priority)
            .field("mode", &self.mode)
            .field("notify", &self.notify.is_some())
            .finish()
    }
}

/// Install a sink on `image`: the entry point for most callers.
///
/// `max_tiles` of `-1` means unbounded. `priority` is accepted for
/// compatibility with schedulers but has no effect.
///
/// # Errors
///
/// Returns an error if the tile size is not positive or `max_tiles < -1`.
pub fn create_sink(
    image: Arc<Image>,
    tile_width: i32,
    tile_height: i32,
    max_tiles: i64,
    priority: i32,
) -> Result<(DataChannel, MaskChannel), SinkError> {
    SinkConfig::new(tile_width, tile_height)
        .with_max_tiles(max_tiles)
        .with_priority(priority)
        .build(image)
}
