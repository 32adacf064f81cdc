//! Screen sink demo binary.
//!
//! Installs a sink on a synthetic pattern image and either renders one
//! viewport to a JPEG or pans concurrent viewports across it.

use clap::Parser;
use std::fs::File;
use std::io::BufWriter;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use screen_sink::{
    config::{Cli, Command, PanConfig, RenderConfig, StatsFormat},
    image::{Image, Pattern, Region},
    sink::{live_renders, DataChannel, RenderMode, SinkStats},
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let code = match cli.command {
        Command::Render(config) => run_render(config).await,
        Command::Pan(config) => run_pan(config).await,
    };

    let leaked = live_renders();
    if leaked != 0 {
        warn!("{} render(s) still alive at exit", leaked);
    }

    code
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "screen_sink=debug"
    } else {
        "screen_sink=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

// =============================================================================
// Render Command
// =============================================================================

async fn run_render(config: RenderConfig) -> ExitCode {
    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let image = Image::new(config.image.info(), Pattern::with_delay(config.image.delay()));
    let painted = Arc::new(Notify::new());

    let mut sink_config = config.sink.to_sink_config();
    if sink_config.mode == RenderMode::Background {
        let painted = Arc::clone(&painted);
        sink_config = sink_config.with_notify(move |area| {
            debug!(%area, "tile painted");
            painted.notify_one();
        });
    }

    let data = match sink_config.build_data(image) {
        Ok(data) => data,
        Err(e) => {
            error!("Failed to create sink: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let viewport = config.viewport();
    info!("Rendering {} at {}", viewport, config.output.display());

    let started = Instant::now();
    let mut out = data.region();
    let deadline = tokio::time::Instant::now() + config.timeout();
    let mut passes = 0;

    loop {
        let before = data.stats().zero_filled_cells;
        if let Err(e) = data.pull(viewport, &mut out).await {
            error!("Pull failed: {}", e);
            return ExitCode::FAILURE;
        }
        passes += 1;

        let missing = data.stats().zero_filled_cells - before;
        if missing == 0 {
            break;
        }

        if sink_config.mode == RenderMode::Synchronous {
            warn!("{} cell(s) could not be computed", missing);
            break;
        }

        debug!(missing, passes, "waiting for background tiles");
        if tokio::time::timeout_at(deadline, painted.notified())
            .await
            .is_err()
        {
            warn!("Timed out with {} cell(s) still missing", missing);
            break;
        }
    }

    info!(
        "Pulled {} in {} pass(es), {:.1?}",
        out.valid(),
        passes,
        started.elapsed()
    );

    if let Err(e) = write_jpeg(&config, &out) {
        error!("Failed to write {}: {}", config.output.display(), e);
        return ExitCode::FAILURE;
    }

    log_stats(&data.stats());
    info!("Wrote {}", config.output.display());

    ExitCode::SUCCESS
}

fn write_jpeg(config: &RenderConfig, out: &Region) -> Result<(), image::ImageError> {
    let valid = out.valid();
    let color = if out.bytes_per_pixel() == 1 {
        ExtendedColorType::L8
    } else {
        ExtendedColorType::Rgb8
    };

    let file = File::create(&config.output)?;
    let mut encoder = JpegEncoder::new_with_quality(BufWriter::new(file), config.quality);
    encoder.encode(
        out.as_bytes(),
        valid.width as u32,
        valid.height as u32,
        color,
    )
}

fn log_stats(stats: &SinkStats) {
    info!(
        "  Tiles: {} allocated, {} painted, limit {}",
        stats.tiles,
        stats.painted,
        stats
            .max_tiles
            .map_or_else(|| "unbounded".to_string(), |n| n.to_string())
    );
    info!(
        "  Lookups: {} hits, {} computes, {} evictions",
        stats.hits, stats.computes, stats.evictions
    );
    if stats.compute_failures + stats.allocation_failures + stats.exhausted > 0 {
        warn!(
            "  Misses: {} failed, {} unallocated, {} exhausted",
            stats.compute_failures, stats.allocation_failures, stats.exhausted
        );
    }
}

// =============================================================================
// Pan Command
// =============================================================================

async fn run_pan(config: PanConfig) -> ExitCode {
    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let image = Image::new(config.image.info(), Pattern::with_delay(config.image.delay()));
    let (data, mask) = match config.sink.to_sink_config().build(image) {
        Ok(channels) => channels,
        Err(e) => {
            error!("Failed to create sink: {}", e);
            return ExitCode::FAILURE;
        }
    };

    info!(
        "Panning {} viewer(s) x {} step(s) over {}",
        config.workers,
        config.steps,
        config.image.info().bounds()
    );

    let data = Arc::new(data);
    let config = Arc::new(config);
    let started = Instant::now();

    let mut handles = Vec::with_capacity(config.workers);
    for worker in 0..config.workers {
        handles.push(tokio::spawn(pan_worker(
            Arc::clone(&data),
            Arc::clone(&config),
            worker,
        )));
    }

    let mut pulled = 0usize;
    for handle in handles {
        match handle.await {
            Ok(Ok(count)) => pulled += count,
            Ok(Err(e)) => {
                error!("Viewer failed: {}", e);
                return ExitCode::FAILURE;
            }
            Err(e) => {
                error!("Viewer panicked: {}", e);
                return ExitCode::FAILURE;
            }
        }
    }
    let elapsed = started.elapsed();

    let mut coverage = mask.region();
    let coverage = match mask.pull(config.image.info().bounds(), &mut coverage) {
        Ok(()) => {
            let cached = coverage.as_bytes().iter().filter(|&&b| b == 255).count();
            cached as f64 / coverage.as_bytes().len().max(1) as f64
        }
        Err(e) => {
            error!("Mask pull failed: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let stats = data.stats();
    match config.format {
        StatsFormat::Text => print_stats(&stats, pulled, coverage, elapsed),
        StatsFormat::Json => {
            let json = serde_json::json!({
                "viewports": pulled,
                "elapsed_ms": elapsed.as_millis() as u64,
                "coverage": coverage,
                "stats": stats,
            });
            match serde_json::to_string_pretty(&json) {
                Ok(s) => println!("{}", s),
                Err(e) => {
                    error!("Failed to serialize statistics: {}", e);
                    return ExitCode::FAILURE;
                }
            }
        }
    }

    ExitCode::SUCCESS
}

/// Pull `config.steps` viewports for one viewer. Returns the number pulled.
async fn pan_worker(
    data: Arc<DataChannel>,
    config: Arc<PanConfig>,
    worker: usize,
) -> Result<usize, screen_sink::error::RegionError> {
    let mut out = data.region();

    for step in 0..config.steps {
        let viewport = config.viewport_at(worker, step);
        data.pull(viewport, &mut out).await?;
    }

    debug!(worker, steps = config.steps, "viewer finished");
    Ok(config.steps)
}

fn print_stats(stats: &SinkStats, pulled: usize, coverage: f64, elapsed: std::time::Duration) {
    println!("Screen Sink Statistics");
    println!("══════════════════════");
    println!();
    println!("Viewports pulled:   {} in {:.1?}", pulled, elapsed);
    println!(
        "Tile size:          {}x{}",
        stats.tile_width, stats.tile_height
    );
    println!(
        "Tile limit:         {}",
        stats
            .max_tiles
            .map_or_else(|| "unbounded".to_string(), |n| n.to_string())
    );
    println!("Mode:               {:?}", stats.mode);
    println!();
    println!("Tiles allocated:    {}", stats.tiles);
    println!("Tiles painted:      {}", stats.painted);
    println!("Image cached:       {:.1}%", coverage * 100.0);
    println!();
    println!("Hits:               {}", stats.hits);
    println!("Computes:           {}", stats.computes);
    println!("Evictions:          {}", stats.evictions);
    println!("Zero-filled cells:  {}", stats.zero_filled_cells);

    if stats.compute_failures + stats.allocation_failures + stats.exhausted > 0 {
        println!();
        println!("Compute failures:   {}", stats.compute_failures);
        println!("Alloc failures:     {}", stats.allocation_failures);
        println!("Exhausted:          {}", stats.exhausted);
    }
}
