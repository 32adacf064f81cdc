//! Invalidation integration tests.
//!
//! Tests verify:
//! - Invalidating an image makes cached tiles report invalid in the mask
//! - The next data pull recomputes invalid tiles in place
//! - Invalid tiles can still be chosen for reuse

use screen_sink::image::Rect;
use screen_sink::sink::{create_sink, TileState};

use super::test_utils::{assert_pattern, assert_zero, cell, gray_image, TrackingSource};

#[tokio::test]
async fn test_invalidate_clears_mask_and_recomputes() {
    let source = TrackingSource::new();
    let counters = source.counters();
    let image = gray_image(source);
    let (data, mask) = create_sink(image.clone(), 64, 64, -1, 0).unwrap();
    let mut out = data.region();
    let mut coverage = mask.region();
    let rect = Rect::new(0, 0, 128, 64);

    data.pull(rect, &mut out).await.unwrap();
    mask.pull(rect, &mut coverage).unwrap();
    assert!(coverage.as_bytes().iter().all(|&b| b == 255));
    assert_eq!(counters.generated(), 2);

    image.invalidate();

    mask.pull(rect, &mut coverage).unwrap();
    assert_zero(&coverage, rect);

    let probe = data.probe(0, 0).unwrap();
    assert_eq!(probe.state, TileState::Painted);
    assert!(!probe.valid);

    // Invalidated tiles still count as painted; only the mask drops them
    assert_eq!(data.stats().painted, 2);

    // Mask pulls alone never recompute
    assert_eq!(counters.generated(), 2);

    data.pull(rect, &mut out).await.unwrap();
    assert_pattern(&out, rect);
    assert_eq!(counters.generated(), 4);

    let stats = data.stats();
    assert_eq!(stats.tiles, 2, "invalid tiles are recomputed in place");
    assert_eq!(stats.computes, 4);
    assert_eq!(stats.hits, 0);

    mask.pull(rect, &mut coverage).unwrap();
    assert!(coverage.as_bytes().iter().all(|&b| b == 255));
}

#[tokio::test]
async fn test_invalidate_touches_only_pulled_cells() {
    let source = TrackingSource::new();
    let counters = source.counters();
    let image = gray_image(source);
    let (data, mask) = create_sink(image.clone(), 64, 64, -1, 0).unwrap();
    let mut out = data.region();

    data.pull(Rect::new(0, 0, 192, 64), &mut out).await.unwrap();
    image.invalidate();

    data.pull(cell(1, 0), &mut out).await.unwrap();
    assert_eq!(counters.generated(), 4);

    let mut coverage = mask.region();
    mask.pull(Rect::new(0, 0, 192, 64), &mut coverage).unwrap();
    assert_eq!(coverage.pixel(0, 0), &[0]);
    assert_eq!(coverage.pixel(64, 0), &[255]);
    assert_eq!(coverage.pixel(128, 0), &[0]);
}

#[tokio::test]
async fn test_invalid_tile_can_be_reused() {
    let image = gray_image(TrackingSource::new());
    let (data, _mask) = create_sink(image.clone(), 64, 64, 1, 0).unwrap();
    let mut out = data.region();

    data.pull(cell(0, 0), &mut out).await.unwrap();
    image.invalidate();

    data.pull(cell(3, 3), &mut out).await.unwrap();
    assert_pattern(&out, cell(3, 3));

    let stats = data.stats();
    assert_eq!(stats.tiles, 1);
    assert_eq!(stats.evictions, 1);
    assert!(data.probe(192, 192).unwrap().valid);
}
