//! Background rendering integration tests.
//!
//! Tests verify:
//! - Pulls in background mode return at once with missing cells zeroed
//! - The paint notification fires once per painted tile
//! - A re-pull after notification returns computed pixels
//! - Failed background computations do not notify

use std::time::Duration;

use tokio::sync::mpsc;

use screen_sink::image::Rect;
use screen_sink::sink::{RenderMode, SinkConfig, TileState};

use super::test_utils::{assert_pattern, assert_zero, cell, gray_image, rgb_image, TrackingSource};

const WAIT: Duration = Duration::from_secs(5);

fn notifying_config(max_tiles: i64) -> (SinkConfig, mpsc::UnboundedReceiver<Rect>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let config = SinkConfig::new(64, 64)
        .with_max_tiles(max_tiles)
        .with_background()
        .with_notify(move |area| {
            let _ = tx.send(area);
        });
    (config, rx)
}

#[tokio::test]
async fn test_background_pull_zero_fills_then_notifies() {
    let source = TrackingSource::new().with_delay(Duration::from_millis(5));
    let counters = source.counters();
    let (config, mut painted) = notifying_config(-1);
    let (data, mask) = config.build(rgb_image(source)).unwrap();
    assert_eq!(data.stats().mode, RenderMode::Background);

    let mut out = data.region();
    data.pull(cell(1, 1), &mut out).await.unwrap();
    assert_zero(&out, cell(1, 1));
    assert_eq!(data.stats().zero_filled_cells, 1);

    let area = tokio::time::timeout(WAIT, painted.recv())
        .await
        .expect("tile was not painted in time")
        .expect("notify channel closed");
    assert_eq!(area, cell(1, 1));

    let mut coverage = mask.region();
    mask.pull(cell(1, 1), &mut coverage).unwrap();
    assert!(coverage.as_bytes().iter().all(|&b| b == 255));

    data.pull(cell(1, 1), &mut out).await.unwrap();
    assert_pattern(&out, cell(1, 1));

    let stats = data.stats();
    assert_eq!(stats.computes, 1);
    assert_eq!(stats.hits, 1);
    assert_eq!(counters.generated(), 1);
}

#[tokio::test]
async fn test_background_notifies_each_tile() {
    let (config, mut painted) = notifying_config(-1);
    let data = config.build_data(gray_image(TrackingSource::new())).unwrap();
    let rect = Rect::new(0, 0, 128, 128);

    let mut out = data.region();
    data.pull(rect, &mut out).await.unwrap();
    assert_zero(&out, rect);

    let mut areas = Vec::new();
    for _ in 0..4 {
        let area = tokio::time::timeout(WAIT, painted.recv())
            .await
            .unwrap()
            .unwrap();
        areas.push(area);
    }
    areas.sort_by_key(|a| (a.top, a.left));
    assert_eq!(areas, vec![cell(0, 0), cell(1, 0), cell(0, 1), cell(1, 1)]);

    data.pull(rect, &mut out).await.unwrap();
    assert_pattern(&out, rect);
}

#[tokio::test]
async fn test_background_repull_while_painting_does_not_duplicate() {
    let source = TrackingSource::new().with_delay(Duration::from_millis(20));
    let counters = source.counters();
    let (config, mut painted) = notifying_config(-1);
    let data = config.build_data(gray_image(source)).unwrap();

    let mut out = data.region();
    data.pull(cell(0, 0), &mut out).await.unwrap();
    data.pull(cell(0, 0), &mut out).await.unwrap();
    assert_zero(&out, cell(0, 0));
    assert_eq!(data.probe(0, 0).unwrap().state, TileState::Computing);

    tokio::time::timeout(WAIT, painted.recv()).await.unwrap().unwrap();
    assert_eq!(counters.generated(), 1);
    assert_eq!(data.stats().computes, 1);
}

#[tokio::test]
async fn test_background_failure_does_not_notify() {
    let source = TrackingSource::new().failing_at(cell(0, 0));
    let counters = source.counters();
    let (config, mut painted) = notifying_config(-1);
    let data = config.build_data(gray_image(source)).unwrap();

    let mut out = data.region();
    data.pull(Rect::new(0, 0, 128, 64), &mut out).await.unwrap();

    // Only the working neighbour is announced
    let area = tokio::time::timeout(WAIT, painted.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(area, cell(1, 0));

    tokio::task::yield_now().await;
    assert!(painted.try_recv().is_err());
    assert_eq!(counters.failed(), 1);
    assert_eq!(data.stats().compute_failures, 1);
    assert_ne!(data.probe(0, 0).unwrap().state, TileState::Painted);
}

#[tokio::test]
async fn test_background_without_notify() {
    let data = SinkConfig::new(64, 64)
        .with_background()
        .build_data(gray_image(TrackingSource::new()))
        .unwrap();
    let mut out = data.region();

    data.pull(cell(2, 2), &mut out).await.unwrap();

    let painted = async {
        while data.probe(128, 128).map(|p| p.state) != Some(TileState::Painted) {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    };
    tokio::time::timeout(WAIT, painted).await.unwrap();

    data.pull(cell(2, 2), &mut out).await.unwrap();
    assert_pattern(&out, cell(2, 2));
}

#[tokio::test]
async fn test_background_task_outlives_sink() {
    let source = TrackingSource::new().with_delay(Duration::from_millis(10));
    let counters = source.counters();
    let (config, _painted) = notifying_config(-1);
    let data = config.build_data(gray_image(source)).unwrap();

    let mut out = data.region();
    data.pull(cell(0, 0), &mut out).await.unwrap();
    drop(data);

    // The paint task holds the image until it finishes, then everything goes
    let released = async {
        while counters.dropped() == 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    };
    tokio::time::timeout(WAIT, released).await.unwrap();
    assert_eq!(counters.dropped(), 1);
}
