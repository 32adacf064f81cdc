//! A synthetic test pattern source.
//!
//! Stands in for a real pipeline in the demo binary and in tests. Every byte
//! of the pattern is non-zero, so a zero byte in sink output always means
//! "not computed".

use std::time::Duration;

use async_trait::async_trait;

use super::{Region, Source};
use crate::error::SourceError;

/// Deterministic pattern, optionally slowed down to mimic an expensive pipeline.
#[derive(Debug, Clone, Default)]
pub struct Pattern {
    delay: Duration,
}

impl Pattern {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep for `delay` before computing each region.
    pub fn with_delay(delay: Duration) -> Self {
        Self { delay }
    }

    /// The byte at offset `byte` within pixel (x, y). Always in `1..=255`.
    #[inline]
    pub fn value(x: i32, y: i32, byte: usize) -> u8 {
        let mixed = (x.wrapping_mul(3) ^ y.wrapping_mul(5)) as u32;
        let mixed = mixed.wrapping_add(byte as u32 * 85);
        (1 + mixed % 255) as u8
    }
}

#[async_trait]
impl Source for Pattern {
    async fn generate(&self, region: &mut Region) -> Result<(), SourceError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let area = region.valid();
        let bytes_per_pixel = region.bytes_per_pixel();

        for y in area.top..area.bottom() {
            let row = region.row_mut(area.left, y, area.width);
            for (i, byte) in row.iter_mut().enumerate() {
                let x = area.left + (i / bytes_per_pixel) as i32;
                *byte = Pattern::value(x, y, i % bytes_per_pixel);
            }
        }

        Ok(())
    }
}
