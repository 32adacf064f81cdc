use thiserror::Error;

use crate::image::Rect;

/// Errors raised when a region buffer cannot be sized or allocated
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegionError {
    /// The requested rectangle lies entirely outside the image
    #[error("Region {rect} does not intersect image bounds {bounds}")]
    OutsideImage { rect: Rect, bounds: Rect },

    /// The buffer for the requested rectangle would exceed the allocation limit
    #[error("Region buffer too large: {requested} bytes requested, limit is {limit} bytes")]
    TooLarge { requested: u64, limit: u64 },
}

/// Errors returned by an upstream pixel source while computing a rectangle
#[derive(Debug, Clone, Error)]
pub enum SourceError {
    /// The destination region could not be prepared
    #[error("Region error: {0}")]
    Region(#[from] RegionError),

    /// The pixel computation itself failed
    #[error("Computation failed for {rect}: {message}")]
    Compute { rect: Rect, message: String },
}

impl SourceError {
    /// Convenience constructor for compute failures.
    pub fn compute(rect: Rect, message: impl Into<String>) -> Self {
        SourceError::Compute {
            rect,
            message: message.into(),
        }
    }
}

/// Errors that can occur when installing a screen sink.
///
/// These are the only hard failures the sink reports. Everything that goes
/// wrong while pixels are being pulled degrades to zero-filled output.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SinkError {
    /// Tile width and height must both be positive
    #[error("Invalid tile size {width}x{height}: tile dimensions must be positive")]
    InvalidTileSize { width: i32, height: i32 },

    /// max_tiles must be -1 (unbounded) or non-negative
    #[error("Invalid max_tiles {0}: expected -1 (unbounded) or a non-negative count")]
    InvalidMaxTiles(i64),

    /// Background rendering needs a runtime to spawn paint tasks on
    #[error("Background rendering requires a running Tokio runtime")]
    NoRuntime,
}
