//! End-to-end sink scenarios.
//!
//! Tests verify:
//! - A full cache evicts its least recently touched tile
//! - A single-tile cache follows the viewer
//! - Multi-cell pulls match stitched single-cell pulls
//! - Failed and unallocatable tiles degrade to zeros
//! - A failed tile does not take a slot out of a bounded cache
//! - Channels keep the render alive until the last one is dropped

use std::sync::Arc;

use screen_sink::image::{BandFormat, Image, ImageInfo, Rect};
use screen_sink::sink::{create_sink, SinkConfig, TileState};

use super::test_utils::{
    assert_pattern, assert_zero, cell, gray_image, rgb_image, TrackingSource,
};

// =============================================================================
// Eviction
// =============================================================================

#[tokio::test]
async fn test_full_cache_evicts_least_recent() {
    let (data, _mask) = create_sink(gray_image(TrackingSource::new()), 64, 64, 4, 0).unwrap();
    let mut out = data.region();

    for col in 0..4 {
        data.pull(cell(col, 0), &mut out).await.unwrap();
    }

    let stats = data.stats();
    assert_eq!(stats.tiles, 4);
    assert_eq!(stats.computes, 4);
    assert_eq!(stats.evictions, 0);

    data.pull(cell(0, 5), &mut out).await.unwrap();

    let stats = data.stats();
    assert_eq!(stats.tiles, 4);
    assert_eq!(stats.evictions, 1);
    assert!(data.probe(0, 0).is_none(), "least recent tile should be evicted");
    for col in 1..4 {
        assert!(data.probe(col * 64, 0).is_some());
    }
    assert_pattern(&out, cell(0, 5));
}

#[tokio::test]
async fn test_touch_protects_from_eviction() {
    let (data, _mask) = create_sink(gray_image(TrackingSource::new()), 64, 64, 4, 0).unwrap();
    let mut out = data.region();

    for col in 0..4 {
        data.pull(cell(col, 0), &mut out).await.unwrap();
    }
    // Touch the oldest two again
    data.pull(cell(0, 0), &mut out).await.unwrap();
    data.pull(cell(1, 0), &mut out).await.unwrap();

    data.pull(cell(7, 7), &mut out).await.unwrap();

    assert!(data.probe(0, 0).is_some());
    assert!(data.probe(64, 0).is_some());
    assert!(data.probe(128, 0).is_none());
    assert!(data.probe(192, 0).is_some());
}

#[tokio::test]
async fn test_single_tile_follows_viewer() {
    let (data, mask) = create_sink(gray_image(TrackingSource::new()), 64, 64, 1, 0).unwrap();
    let r1 = Rect::new(10, 10, 20, 20);
    let r2 = Rect::new(150, 80, 20, 20);

    let mut out = data.region();
    data.pull(r1, &mut out).await.unwrap();
    assert_pattern(&out, r1);
    data.pull(r2, &mut out).await.unwrap();
    assert_pattern(&out, r2);

    let tiles = data.tiles();
    assert_eq!(tiles.len(), 1);
    assert_eq!(tiles[0].area, cell(2, 1));

    let mut coverage = mask.region();
    mask.pull(r1, &mut coverage).unwrap();
    assert_zero(&coverage, r1);
    mask.pull(r2, &mut coverage).unwrap();
    assert!(coverage.as_bytes().iter().all(|&b| b == 255));
}

#[tokio::test]
async fn test_zero_max_tiles_allows_one_tile() {
    let (data, _mask) = create_sink(gray_image(TrackingSource::new()), 64, 64, 0, 0).unwrap();
    let mut out = data.region();

    data.pull(cell(0, 0), &mut out).await.unwrap();
    assert_pattern(&out, cell(0, 0));
    data.pull(cell(1, 0), &mut out).await.unwrap();
    assert_pattern(&out, cell(1, 0));

    assert_eq!(data.stats().tiles, 1);
    assert_eq!(data.stats().max_tiles, Some(1));
}

// =============================================================================
// Stitching
// =============================================================================

#[tokio::test]
async fn test_multi_cell_pull_matches_single_cells() {
    let rect = Rect::new(10, 10, 170, 100);
    assert_eq!(rect.grid_cells(64, 64).count(), 6);

    let (data, _mask) = create_sink(rgb_image(TrackingSource::new()), 64, 64, -1, 0).unwrap();
    let mut whole = data.region();
    data.pull(rect, &mut whole).await.unwrap();
    assert_eq!(data.stats().computes, 6);

    // Same rectangle assembled from six separate pulls on a fresh sink
    let (data, _mask) = create_sink(rgb_image(TrackingSource::new()), 64, 64, -1, 0).unwrap();
    let mut stitched = data.region();
    stitched.buffer(rect).unwrap();
    let mut part = data.region();
    for grid_cell in rect.grid_cells(64, 64) {
        let piece = grid_cell.intersect(&rect);
        data.pull(piece, &mut part).await.unwrap();
        stitched.copy_from(&part, piece);
    }

    assert_eq!(whole.as_bytes(), stitched.as_bytes());
    assert_pattern(&whole, rect);
}

#[tokio::test]
async fn test_partial_edge_tiles() {
    let image = Image::new(
        ImageInfo::new(100, 70, 1, BandFormat::UChar),
        TrackingSource::new(),
    );
    let (data, _mask) = create_sink(image, 64, 64, -1, 0).unwrap();
    let mut out = data.region();

    data.pull(Rect::new(0, 0, 1000, 1000), &mut out).await.unwrap();

    assert_eq!(out.valid(), Rect::new(0, 0, 100, 70));
    assert_pattern(&out, out.valid());
    assert_eq!(data.stats().tiles, 4);
}

// =============================================================================
// Failures
// =============================================================================

#[tokio::test]
async fn test_failed_cell_is_zero_neighbour_is_correct() {
    let source = TrackingSource::new().failing_at(cell(1, 0));
    let counters = source.counters();
    let (data, _mask) = create_sink(rgb_image(source), 64, 64, -1, 0).unwrap();
    let mut out = data.region();

    data.pull(Rect::new(0, 0, 128, 64), &mut out).await.unwrap();

    assert_pattern(&out, cell(0, 0));
    assert_zero(&out, cell(1, 0));

    let failed = data.probe(64, 0).unwrap();
    assert_ne!(failed.state, TileState::Painted);
    assert!(!failed.valid);

    let stats = data.stats();
    assert_eq!(stats.compute_failures, 1);
    assert_eq!(stats.zero_filled_cells, 1);
    assert_eq!(counters.failed(), 1);

    // Failed tiles are retried on the next pull
    data.pull(Rect::new(0, 0, 128, 64), &mut out).await.unwrap();
    assert_zero(&out, cell(1, 0));
    assert_eq!(counters.failed(), 2);
    assert_eq!(data.stats().tiles, 2);
}

#[tokio::test]
async fn test_bounded_cache_reuses_failed_tile() {
    let source = TrackingSource::new().failing_at(cell(0, 0));
    let counters = source.counters();
    let (data, mask) = create_sink(gray_image(source), 64, 64, 1, 0).unwrap();
    let mut out = data.region();

    data.pull(cell(0, 0), &mut out).await.unwrap();
    assert_zero(&out, cell(0, 0));
    assert_eq!(data.probe(0, 0).unwrap().state, TileState::Blank);

    for _ in 0..3 {
        data.pull(cell(2, 2), &mut out).await.unwrap();
        assert_pattern(&out, cell(2, 2));
    }

    let stats = data.stats();
    assert_eq!(stats.tiles, 1);
    assert_eq!(stats.painted, 1);
    assert_eq!(stats.evictions, 1);
    assert_eq!(stats.exhausted, 0);
    assert_eq!(stats.hits, 2);
    assert_eq!(counters.failed(), 1);

    let mut coverage = mask.region();
    mask.pull(cell(2, 2), &mut coverage).unwrap();
    assert!(coverage.as_bytes().iter().all(|&b| b == 255));
}

#[tokio::test]
async fn test_unallocatable_tile_is_zero() {
    // Each tile would need 20000 * 20000 * 12 bytes, over the region limit
    let image = Image::new(
        ImageInfo::new(40_000, 40_000, 3, BandFormat::Float),
        TrackingSource::new(),
    );
    let (data, _mask) = create_sink(image, 20_000, 20_000, -1, 0).unwrap();
    let mut out = data.region();

    data.pull(Rect::new(0, 0, 10, 10), &mut out).await.unwrap();

    assert!(out.as_bytes().iter().all(|&b| b == 0));
    let stats = data.stats();
    assert_eq!(stats.tiles, 0);
    assert_eq!(stats.allocation_failures, 1);
    assert_eq!(stats.zero_filled_cells, 1);
}

// =============================================================================
// Lifecycle
// =============================================================================

#[tokio::test]
async fn test_mask_drop_keeps_render_alive() {
    let source = TrackingSource::new();
    let counters = source.counters();
    let image = gray_image(source);
    let weak = Arc::downgrade(&image);

    let (data, mask) = create_sink(image, 64, 64, 4, 0).unwrap();
    let mut out = data.region();
    data.pull(cell(0, 0), &mut out).await.unwrap();

    drop(mask);
    assert!(weak.upgrade().is_some());
    assert_eq!(counters.dropped(), 0);

    // The data channel still works
    data.pull(cell(1, 0), &mut out).await.unwrap();
    assert_pattern(&out, cell(1, 0));

    let stats = data.stats();
    assert_eq!(stats.attached, 1);
    assert!(!stats.closed);
    assert_eq!(stats.tiles, 2);

    drop(data);
    assert!(weak.upgrade().is_none());
    assert_eq!(counters.dropped(), 1);
}

#[tokio::test]
async fn test_data_drop_first_keeps_render_alive() {
    let source = TrackingSource::new();
    let counters = source.counters();
    let image = gray_image(source);
    let weak = Arc::downgrade(&image);

    let (data, mask) = create_sink(image, 64, 64, 4, 0).unwrap();
    let mut out = data.region();
    data.pull(cell(0, 0), &mut out).await.unwrap();

    drop(data);
    assert!(weak.upgrade().is_some());

    let mut coverage = mask.region();
    mask.pull(cell(0, 0), &mut coverage).unwrap();
    assert_eq!(coverage.pixel(0, 0), &[255]);

    drop(mask);
    assert!(weak.upgrade().is_none());
    assert_eq!(counters.dropped(), 1);
}

#[tokio::test]
async fn test_data_only_sink_frees_on_drop() {
    let source = TrackingSource::new();
    let counters = source.counters();
    let data = SinkConfig::new(64, 64)
        .with_max_tiles(2)
        .build_data(gray_image(source))
        .unwrap();

    let mut out = data.region();
    data.pull(cell(0, 0), &mut out).await.unwrap();
    assert_eq!(data.stats().attached, 1);

    drop(data);
    assert_eq!(counters.dropped(), 1);
}
