//! Configuration for the `screen-sink` demo binary.
//!
//! The binary installs a sink on a synthetic [`Pattern`](crate::image::Pattern)
//! image and drives it from the command line:
//!
//! - `render` pulls one viewport and writes it out as a JPEG
//! - `pan` runs several concurrent viewers panning across the image and
//!   reports the cache statistics
//!
//! # Environment Variables
//!
//! Sink and image options can also be set via environment variables with the
//! `SINK_` prefix:
//!
//! - `SINK_WIDTH`, `SINK_HEIGHT` - Image size (default: 4096 x 4096)
//! - `SINK_BANDS` - Samples per pixel, 1 or 3 (default: 3)
//! - `SINK_DELAY_MS` - Simulated compute time per tile (default: 0)
//! - `SINK_TILE_WIDTH`, `SINK_TILE_HEIGHT` - Tile size (default: 128)
//! - `SINK_MAX_TILES` - Tile budget, -1 for unbounded (default: 256)
//! - `SINK_PRIORITY` - Scheduling hint (default: 0)
//! - `SINK_BACKGROUND` - Compute tiles on background tasks (default: false)

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::image::{BandFormat, ImageInfo, Rect};
use crate::sink::{SinkConfig, DEFAULT_MAX_TILES, DEFAULT_TILE_SIZE};

// =============================================================================
// Default Values
// =============================================================================

/// Default image edge length.
pub const DEFAULT_IMAGE_SIZE: i32 = 4096;

/// Default samples per pixel.
pub const DEFAULT_BANDS: u8 = 3;

/// Default JPEG quality for `render`.
pub const DEFAULT_JPEG_QUALITY: u8 = 80;

/// Default viewport edge length.
pub const DEFAULT_VIEWPORT: i32 = 512;

/// Default number of concurrent viewers for `pan`.
pub const DEFAULT_WORKERS: usize = 4;

/// Default number of viewport moves per viewer.
pub const DEFAULT_STEPS: usize = 64;

/// Default distance a viewport moves per step.
pub const DEFAULT_STEP: i32 = 96;

// =============================================================================
// CLI Arguments
// =============================================================================

/// Screen sink - an on-demand tile cache for slow image pipelines.
#[derive(Parser, Debug, Clone)]
#[command(name = "screen-sink")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging (debug level).
    #[arg(short, long, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Pull one viewport through a sink and write it as a JPEG
    Render(RenderConfig),

    /// Pan concurrent viewports across the image and report cache statistics
    Pan(PanConfig),
}

// =============================================================================
// Shared Arguments
// =============================================================================

/// The synthetic image being cached.
#[derive(Args, Debug, Clone)]
pub struct ImageArgs {
    /// Image width in pixels.
    #[arg(long, default_value_t = DEFAULT_IMAGE_SIZE, env = "SINK_WIDTH")]
    pub width: i32,

    /// Image height in pixels.
    #[arg(long, default_value_t = DEFAULT_IMAGE_SIZE, env = "SINK_HEIGHT")]
    pub height: i32,

    /// Samples per pixel (1 = grey, 3 = RGB).
    #[arg(long, default_value_t = DEFAULT_BANDS, env = "SINK_BANDS")]
    pub bands: u8,

    /// Simulated computation time per tile, in milliseconds.
    #[arg(long, default_value_t = 0, env = "SINK_DELAY_MS")]
    pub delay_ms: u64,
}

impl ImageArgs {
    pub fn info(&self) -> ImageInfo {
        ImageInfo::new(self.width, self.height, self.bands, BandFormat::UChar)
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.width <= 0 || self.height <= 0 {
            return Err("image width and height must be greater than 0".to_string());
        }
        if self.bands != 1 && self.bands != 3 {
            return Err("bands must be 1 or 3".to_string());
        }
        Ok(())
    }
}

/// Sink parameters.
#[derive(Args, Debug, Clone)]
pub struct SinkArgs {
    /// Tile width in pixels.
    #[arg(long, default_value_t = DEFAULT_TILE_SIZE, env = "SINK_TILE_WIDTH")]
    pub tile_width: i32,

    /// Tile height in pixels.
    #[arg(long, default_value_t = DEFAULT_TILE_SIZE, env = "SINK_TILE_HEIGHT")]
    pub tile_height: i32,

    /// Maximum number of tiles to keep, -1 for unbounded.
    #[arg(
        long,
        default_value_t = DEFAULT_MAX_TILES,
        env = "SINK_MAX_TILES",
        allow_negative_numbers = true
    )]
    pub max_tiles: i64,

    /// Scheduling hint, recorded in the statistics.
    #[arg(long, default_value_t = 0, env = "SINK_PRIORITY", allow_negative_numbers = true)]
    pub priority: i32,

    /// Compute missing tiles on background tasks.
    #[arg(long, default_value_t = false, env = "SINK_BACKGROUND")]
    pub background: bool,
}

impl SinkArgs {
    /// The sink configuration these arguments describe, without a notify hook.
    pub fn to_sink_config(&self) -> SinkConfig {
        let config = SinkConfig::new(self.tile_width, self.tile_height)
            .with_max_tiles(self.max_tiles)
            .with_priority(self.priority);

        if self.background {
            config.with_background()
        } else {
            config
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        self.to_sink_config()
            .validate()
            .map(|_| ())
            .map_err(|e| e.to_string())
    }
}

// =============================================================================
// Render Command
// =============================================================================

/// Arguments for `screen-sink render`.
#[derive(Args, Debug, Clone)]
pub struct RenderConfig {
    #[command(flatten)]
    pub image: ImageArgs,

    #[command(flatten)]
    pub sink: SinkArgs,

    /// Output JPEG path.
    #[arg(short, long, default_value = "viewport.jpg")]
    pub output: PathBuf,

    /// JPEG quality (1-100).
    #[arg(long, default_value_t = DEFAULT_JPEG_QUALITY)]
    pub quality: u8,

    /// Viewport as left,top,width,height. Defaults to the whole image.
    #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
    pub rect: Option<Vec<i32>>,

    /// In background mode, give up waiting for tiles after this many seconds.
    #[arg(long, default_value_t = 30)]
    pub timeout_secs: u64,
}

impl RenderConfig {
    /// The rectangle to pull.
    pub fn viewport(&self) -> Rect {
        match self.rect.as_deref() {
            Some(&[left, top, width, height]) => Rect::new(left, top, width, height),
            _ => self.image.info().bounds(),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        self.image.validate()?;
        self.sink.validate()?;

        if self.quality == 0 || self.quality > 100 {
            return Err("quality must be between 1 and 100".to_string());
        }

        if let Some(rect) = &self.rect {
            if rect.len() != 4 {
                return Err("rect must be left,top,width,height".to_string());
            }
        }

        let viewport = self.viewport();
        if viewport.intersect(&self.image.info().bounds()).is_empty() {
            return Err(format!("viewport {viewport} does not overlap the image"));
        }

        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

// =============================================================================
// Pan Command
// =============================================================================

/// Output format for `pan` statistics.
#[derive(ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StatsFormat {
    /// Human-readable summary
    #[default]
    Text,

    /// Full statistics as JSON
    Json,
}

/// Arguments for `screen-sink pan`.
#[derive(Args, Debug, Clone)]
pub struct PanConfig {
    #[command(flatten)]
    pub image: ImageArgs,

    #[command(flatten)]
    pub sink: SinkArgs,

    /// Number of concurrent viewers.
    #[arg(long, default_value_t = DEFAULT_WORKERS)]
    pub workers: usize,

    /// Viewport moves per viewer.
    #[arg(long, default_value_t = DEFAULT_STEPS)]
    pub steps: usize,

    /// Viewport edge length in pixels.
    #[arg(long, default_value_t = DEFAULT_VIEWPORT)]
    pub viewport: i32,

    /// Distance the viewport moves per step.
    #[arg(long, default_value_t = DEFAULT_STEP)]
    pub step: i32,

    /// Statistics output format.
    #[arg(long, value_enum, default_value_t = StatsFormat::Text)]
    pub format: StatsFormat,
}

impl PanConfig {
    pub fn validate(&self) -> Result<(), String> {
        self.image.validate()?;
        self.sink.validate()?;

        if self.workers == 0 {
            return Err("workers must be greater than 0".to_string());
        }
        if self.viewport <= 0 {
            return Err("viewport must be greater than 0".to_string());
        }
        if self.step <= 0 {
            return Err("step must be greater than 0".to_string());
        }

        Ok(())
    }

    /// Viewport of `worker` after `step` moves.
    ///
    /// Each worker starts on its own diagonal offset and walks right, wrapping
    /// at the image edges, moving down a row of viewports on each wrap.
    pub fn viewport_at(&self, worker: usize, step: usize) -> Rect {
        let info = self.image.info();
        let span_x = (info.width - self.viewport).max(1) as i64;
        let span_y = (info.height - self.viewport).max(1) as i64;

        let travel = (worker as i64 * self.viewport as i64) + step as i64 * self.step as i64;
        let left = travel % span_x;
        let top = (worker as i64 * self.viewport as i64 + (travel / span_x) * self.step as i64)
            % span_y;

        Rect::new(left as i32, top as i32, self.viewport, self.viewport)
    }
}

// =============================================================================
// Tests
// =============================================================================
