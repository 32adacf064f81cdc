//! The shared render context behind a sink's channels.
//!
//! A [`Render`] owns every tile of one sink, the position index over them and
//! the LRU clock, all behind a single mutex. The mutex is held for bookkeeping
//! only: when a tile needs computing, its buffer is checked out of the tile,
//! the lock is released while the source runs, and the buffer is checked back
//! in afterwards.
//!
//! # Tile acquisition
//!
//! ```text
//!   lookup(cell) ──hit, painted──────────────────────────▶ copy
//!        │
//!        ├─hit, computing elsewhere ─────────────────────▶ zero-fill
//!        ├─hit, invalidated or failed ──┐
//!        │                              ▼
//!        └─miss ─▶ allocate ──────────▶ compute ─unlocked─▶ copy
//!                  (or relocate LRU          │
//!                   idle tile)               └─failed─────▶ zero-fill
//! ```
//!
//! A tile is only ever copied from while painted and never relocated while
//! computing, so a tile being computed is never read or moved by anyone else.
//! Computations run on their own task: a pull that is dropped midway leaves
//! the tile to finish painting for whoever asks next.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tokio::runtime::Handle;
use tracing::{debug, error, warn};

use super::config::{MaxTiles, PaintNotify, RenderMode, SinkConfig};
use super::table::TileTable;
use super::tile::{Tile, TileId, TileState};
use crate::error::{SinkError, SourceError};
use crate::image::{Image, ImageInfo, Rect, Region};

/// Renders created and not yet torn down, process wide.
static LIVE_RENDERS: AtomicUsize = AtomicUsize::new(0);

/// Number of renders that are still attached to at least one channel.
///
/// A non-zero count once every sink has been dropped indicates a leak.
pub fn live_renders() -> usize {
    LIVE_RENDERS.load(Ordering::Acquire)
}

// =============================================================================
// Statistics
// =============================================================================

/// Snapshot of a sink's cache state and counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SinkStats {
    pub tile_width: i32,
    pub tile_height: i32,

    /// Tile budget, `None` when unbounded
    pub max_tiles: Option<usize>,

    /// Scheduling hint the sink was created with
    pub priority: i32,

    pub mode: RenderMode,

    /// Tiles allocated
    pub tiles: usize,

    /// Tiles registered in the position index
    pub indexed: usize,

    /// Tiles in the painted state, including ones invalidated since
    pub painted: usize,

    /// Channels still attached
    pub attached: usize,

    /// Lookups answered from a painted tile
    pub hits: u64,

    /// Tile computations started
    pub computes: u64,

    /// Tiles relocated to a new cell
    pub evictions: u64,

    /// Computations that returned an error
    pub compute_failures: u64,

    /// Tile buffers that could not be allocated
    pub allocation_failures: u64,

    /// Acquisitions that found every tile mid-computation
    pub exhausted: u64,

    /// Cells answered with zeros by the data channel
    pub zero_filled_cells: u64,

    /// The render has been torn down
    pub closed: bool,
}

/// Where a tile currently is, as seen by [`DataChannel::probe`](super::DataChannel::probe).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TileProbe {
    pub area: Rect,
    pub state: TileState,

    /// Painted and not invalidated
    pub valid: bool,

    /// LRU tick of the last lookup or compute
    pub last_used: u64,
}

impl TileProbe {
    fn of(tile: &Tile) -> Self {
        Self {
            area: tile.area(),
            state: tile.state(),
            valid: tile.is_valid(),
            last_used: tile.ticks(),
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    hits: u64,
    computes: u64,
    evictions: u64,
    compute_failures: u64,
    allocation_failures: u64,
    exhausted: u64,
}

// =============================================================================
// Render State
// =============================================================================

/// Everything guarded by the render lock.
struct RenderState {
    /// The image being cached. `None` once torn down.
    image: Option<Arc<Image>>,

    /// Every tile ever allocated
    tiles: Vec<Tile>,

    /// Tiles by grid cell, in recency order
    index: TileTable,

    /// Next LRU tick
    clock: u64,

    counters: Counters,
}

/// A tile computation in progress: the checked-out buffer and what to fill it from.
struct Job {
    id: TileId,
    area: Rect,
    region: Region,
    image: Arc<Image>,
}

enum Acquired {
    /// Use this tile as it is (painted, or being computed elsewhere)
    Ready(TileId),

    /// This tile needs computing; the caller owns the job
    Compute(Job),

    /// No tile could be found or made for the cell
    Unavailable,
}

impl RenderState {
    fn touch(&mut self, id: TileId) {
        let tile = &mut self.tiles[id];
        tile.touch(&mut self.clock);
        self.index.touch(tile.area());
    }

    /// Steps 1-4 of a request: find, allocate or evict a tile for `area`.
    fn acquire(&mut self, area: Rect, max_tiles: MaxTiles) -> Acquired {
        let Some(image) = self.image.clone() else {
            return Acquired::Unavailable;
        };

        if let Some(id) = self.index.lookup(area) {
            let (state, invalid) = (self.tiles[id].state(), self.tiles[id].is_invalid());

            return match state {
                TileState::Painted if !invalid => {
                    self.counters.hits += 1;
                    self.touch(id);
                    Acquired::Ready(id)
                }
                TileState::Computing => {
                    self.touch(id);
                    Acquired::Ready(id)
                }
                _ => {
                    debug!(%area, invalid, "repainting tile in place");
                    self.start(id, image)
                }
            };
        }

        let id = if max_tiles.allows(self.tiles.len()) {
            match Tile::new(&image, area) {
                Ok(tile) => {
                    let id = self.tiles.len();
                    self.tiles.push(tile);
                    self.index.insert(area, id);
                    id
                }
                Err(err) => {
                    self.counters.allocation_failures += 1;
                    debug!(%area, error = %err, "tile allocation failed");
                    return Acquired::Unavailable;
                }
            }
        } else {
            // Blank tiles left by failed computations are fair game too
            let tiles = &self.tiles;
            let Some(id) = self
                .index
                .least_recent(|id| tiles[id].state() != TileState::Computing)
            else {
                self.counters.exhausted += 1;
                debug!(%area, "every tile is being computed");
                return Acquired::Unavailable;
            };

            let from = self.tiles[id].area();
            if let Err(err) = self.tiles[id].relocate(area) {
                self.counters.allocation_failures += 1;
                debug!(%area, error = %err, "tile reallocation failed");
                return Acquired::Unavailable;
            }
            self.index.move_to(from, area);
            self.counters.evictions += 1;
            debug!(%from, to = %area, "reusing tile");
            id
        };

        self.start(id, image)
    }

    /// Step 5, locked half: clear painted, touch, hand out the buffer.
    fn start(&mut self, id: TileId, image: Arc<Image>) -> Acquired {
        self.touch(id);

        match self.tiles[id].checkout() {
            Some(region) => {
                self.counters.computes += 1;
                Acquired::Compute(Job {
                    id,
                    area: self.tiles[id].area(),
                    region,
                    image,
                })
            }
            None => Acquired::Ready(id),
        }
    }

    /// Check a computed buffer back in. `None` if the render was torn down.
    fn complete(&mut self, job: Job, result: Result<(), SourceError>) -> Option<TileId> {
        self.image.as_ref()?;

        let Job {
            id, area, region, ..
        } = job;

        let painted = match result {
            Ok(()) => true,
            Err(err) => {
                self.counters.compute_failures += 1;
                warn!(%area, error = %err, "tile computation failed");
                false
            }
        };

        self.tiles[id].checkin(region, painted);
        if painted {
            self.touch(id);
        }

        Some(id)
    }

    /// Check a buffer back in unpainted after its computation was dropped.
    fn abandon(&mut self, job: Job) {
        if self.image.is_none() {
            return;
        }

        debug!(area = %job.area, "tile computation abandoned");
        self.tiles[job.id].checkin(job.region, false);
    }
}

/// Owns a job while its computation runs unlocked.
///
/// If the computing task is dropped before finishing (the runtime shutting
/// down, or the source panicking), the buffer goes back to the tile unpainted.
struct PendingJob<'a> {
    render: &'a Render,
    job: Option<Job>,
}

impl<'a> PendingJob<'a> {
    fn new(render: &'a Render, job: Job) -> Self {
        Self {
            render,
            job: Some(job),
        }
    }

    async fn run(&mut self) -> Result<(), SourceError> {
        match self.job.as_mut() {
            Some(job) => job.image.prepare_to(&mut job.region).await,
            None => Ok(()),
        }
    }

    /// Step 5, locked half: relock and check the buffer back in.
    fn finish(
        mut self,
        result: Result<(), SourceError>,
    ) -> (MutexGuard<'a, RenderState>, Option<TileId>) {
        let mut state = self.render.lock();
        let id = self.job.take().and_then(|job| state.complete(job, result));
        (state, id)
    }
}

impl Drop for PendingJob<'_> {
    fn drop(&mut self) {
        if let Some(job) = self.job.take() {
            self.render.lock().abandon(job);
        }
    }
}

// =============================================================================
// Render
// =============================================================================

enum Execution {
    Inline,
    Spawn {
        runtime: Handle,
        notify: Option<PaintNotify>,
    },
}

/// Shared, reference-counted cache context for one sink.
pub(crate) struct Render {
    info: ImageInfo,
    tile_width: i32,
    tile_height: i32,
    max_tiles: MaxTiles,
    priority: i32,
    mode: RenderMode,
    execution: Execution,

    /// Attached channels. The render is torn down when this reaches zero.
    attached: AtomicUsize,

    zero_filled_cells: AtomicU64,

    state: Mutex<RenderState>,
}

impl Render {
    /// Create a render with one attached channel.
    pub(crate) fn new(image: Arc<Image>, config: &SinkConfig) -> Result<Self, SinkError> {
        let max_tiles = config.validate()?;

        let execution = match config.mode {
            RenderMode::Synchronous => Execution::Inline,
            RenderMode::Background => Execution::Spawn {
                runtime: Handle::try_current().map_err(|_| SinkError::NoRuntime)?,
                notify: config.notify(),
            },
        };

        let info = image.info();
        LIVE_RENDERS.fetch_add(1, Ordering::AcqRel);
        debug!(
            tile_width = config.tile_width,
            tile_height = config.tile_height,
            max_tiles = config.max_tiles,
            priority = config.priority,
            mode = ?config.mode,
            "render created"
        );

        Ok(Self {
            info,
            tile_width: config.tile_width,
            tile_height: config.tile_height,
            max_tiles,
            priority: config.priority,
            mode: config.mode,
            execution,
            attached: AtomicUsize::new(1),
            zero_filled_cells: AtomicU64::new(0),
            state: Mutex::new(RenderState {
                image: Some(image),
                tiles: Vec::new(),
                index: TileTable::new(),
                clock: 0,
                counters: Counters::default(),
            }),
        })
    }

    pub(crate) fn info(&self) -> ImageInfo {
        self.info
    }

    fn lock(&self) -> MutexGuard<'_, RenderState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // -------------------------------------------------------------------------
    // Attachment
    // -------------------------------------------------------------------------

    pub(crate) fn attach(&self) {
        let previous = self.attached.fetch_add(1, Ordering::AcqRel);
        debug_assert!(previous > 0, "attach to a render that was torn down");
    }

    /// Drop one attachment, tearing the render down on the last.
    pub(crate) fn detach(&self) {
        let result = self
            .attached
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
        debug_assert!(result.is_ok(), "render detached more often than attached");

        match result {
            Ok(1) => self.teardown(),
            Ok(_) => {}
            Err(_) => error!("render detached more often than attached"),
        }
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.attached.load(Ordering::Acquire) == 0
    }

    /// Release the source and every tile.
    fn teardown(&self) {
        let mut state = self.lock();
        let tiles = state.tiles.len();

        state.image = None;
        state.tiles.clear();
        state.index.clear();
        drop(state);

        LIVE_RENDERS.fetch_sub(1, Ordering::AcqRel);
        debug!(tiles, "render freed");
    }

    // -------------------------------------------------------------------------
    // Requests
    // -------------------------------------------------------------------------

    /// Acquire the tile for grid cell `area`, computing it if needed, and hand
    /// it to `with_tile` under the lock.
    ///
    /// `with_tile` gets `None` when no tile could be had (allocation failure,
    /// every tile busy, render closed). In background mode a cell that needs
    /// computing is handed over still unpainted.
    ///
    /// The computation is spawned onto the current runtime and awaited, so
    /// dropping the returned future does not stop the tile being painted.
    pub(crate) async fn request<R>(
        self: &Arc<Self>,
        area: Rect,
        with_tile: impl FnOnce(Option<&Tile>) -> R,
    ) -> R {
        let job = {
            let mut state = self.lock();
            let acquired = state.acquire(area, self.max_tiles);
            match acquired {
                Acquired::Ready(id) => return with_tile(state.tiles.get(id)),
                Acquired::Unavailable => return with_tile(None),
                Acquired::Compute(job) => match &self.execution {
                    Execution::Inline => job,
                    Execution::Spawn { runtime, notify } => {
                        let id = job.id;
                        runtime.spawn(Arc::clone(self).paint_in_background(job, notify.clone()));
                        return with_tile(state.tiles.get(id));
                    }
                },
            }
        };

        let id = job.id;
        let painted = match Handle::try_current() {
            Ok(runtime) => match runtime.spawn(Arc::clone(self).paint(job)).await {
                Ok(painted) => painted,
                Err(err) => {
                    error!(%area, error = %err, "tile computation task failed");
                    false
                }
            },
            Err(_) => Arc::clone(self).paint(job).await,
        };

        // The tile may have been reused for another cell since it was painted
        let state = self.lock();
        let tile = state
            .tiles
            .get(id)
            .filter(|tile| painted && tile.area() == area);
        with_tile(tile)
    }

    /// Compute a job unlocked and check it back in. True if the tile was painted.
    async fn paint(self: Arc<Self>, job: Job) -> bool {
        let mut pending = PendingJob::new(&self, job);
        let result = pending.run().await;
        let (state, id) = pending.finish(result);
        let painted = id.is_some_and(|id| state.tiles[id].is_painted());
        drop(state);

        painted
    }

    async fn paint_in_background(self: Arc<Self>, job: Job, notify: Option<PaintNotify>) {
        let area = job.area;

        if self.paint(job).await {
            if let Some(notify) = notify {
                notify(area);
            }
        }
    }

    // -------------------------------------------------------------------------
    // Fill
    // -------------------------------------------------------------------------

    /// Fill `out.valid()` from the cache, computing missing tiles.
    ///
    /// Each pixel ends up either a computed pixel or zero.
    pub(crate) async fn fill_data(self: &Arc<Self>, out: &mut Region) {
        let valid = out.valid();

        for cell in valid.grid_cells(self.tile_width, self.tile_height) {
            let copied = self
                .request(cell, |tile| match tile {
                    Some(tile) => tile.copy_to(out),
                    None => {
                        out.paint(cell, 0);
                        false
                    }
                })
                .await;

            if !copied {
                self.zero_filled_cells.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Write 255 over cells holding valid pixels and 0 elsewhere.
    ///
    /// Read-only: never computes, evicts, or changes recency.
    pub(crate) fn fill_mask(&self, out: &mut Region) {
        let state = self.lock();

        for cell in out.valid().grid_cells(self.tile_width, self.tile_height) {
            let valid = state
                .index
                .lookup(cell)
                .is_some_and(|id| state.tiles[id].is_valid());

            out.paint(cell, if valid { 255 } else { 0 });
        }
    }

    // -------------------------------------------------------------------------
    // Introspection
    // -------------------------------------------------------------------------

    /// The tile owning the grid cell containing (x, y), if any.
    pub(crate) fn probe(&self, x: i32, y: i32) -> Option<TileProbe> {
        let cell = Rect::new(
            x.div_euclid(self.tile_width) * self.tile_width,
            y.div_euclid(self.tile_height) * self.tile_height,
            self.tile_width,
            self.tile_height,
        );

        let state = self.lock();
        state
            .index
            .lookup(cell)
            .map(|id| TileProbe::of(&state.tiles[id]))
    }

    /// All indexed tiles, most recently used first.
    pub(crate) fn tiles(&self) -> Vec<TileProbe> {
        let state = self.lock();
        state
            .index
            .ids()
            .map(|id| TileProbe::of(&state.tiles[id]))
            .collect()
    }

    pub(crate) fn stats(&self) -> SinkStats {
        let state = self.lock();

        SinkStats {
            tile_width: self.tile_width,
            tile_height: self.tile_height,
            max_tiles: self.max_tiles.limit(),
            priority: self.priority,
            mode: self.mode,
            tiles: state.tiles.len(),
            indexed: state.index.len(),
            painted: state.tiles.iter().filter(|tile| tile.is_painted()).count(),
            attached: self.attached.load(Ordering::Acquire),
            hits: state.counters.hits,
            computes: state.counters.computes,
            evictions: state.counters.evictions,
            compute_failures: state.counters.compute_failures,
            allocation_failures: state.counters.allocation_failures,
            exhausted: state.counters.exhausted,
            zero_filled_cells: self.zero_filled_cells.load(Ordering::Relaxed),
            closed: state.image.is_none(),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
