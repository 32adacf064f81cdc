//! Position index over tiles.
//!
//! The table maps a grid cell origin to the tile that currently owns it. It is
//! backed by an unbounded [`LruCache`], which gives O(1) lookup and keeps the
//! entries in recency order, so the eviction scan walks from the least
//! recently used cell instead of ranking every tile. Capacity is enforced by
//! the render, not here.

use lru::LruCache;

use super::tile::TileId;
use crate::image::Rect;

/// Table key: a grid cell origin.
///
/// All tiles of a render share one grid, so left/top identify a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct TileKey {
    left: i32,
    top: i32,
}

impl From<Rect> for TileKey {
    fn from(area: Rect) -> Self {
        Self {
            left: area.left,
            top: area.top,
        }
    }
}

pub(crate) struct TileTable {
    entries: LruCache<TileKey, TileId>,
}

impl TileTable {
    pub(crate) fn new() -> Self {
        Self {
            entries: LruCache::unbounded(),
        }
    }

    /// Find the tile at `area`'s origin without changing recency.
    pub(crate) fn lookup(&self, area: Rect) -> Option<TileId> {
        self.entries.peek(&TileKey::from(area)).copied()
    }

    /// Register `id` at `area`. The cell must be free.
    pub(crate) fn insert(&mut self, area: Rect, id: TileId) {
        let previous = self.entries.put(TileKey::from(area), id);
        debug_assert!(previous.is_none(), "cell {area} already owned");
    }

    /// Unregister the tile at `area`. The cell must be owned.
    pub(crate) fn remove(&mut self, area: Rect) -> Option<TileId> {
        let removed = self.entries.pop(&TileKey::from(area));
        debug_assert!(removed.is_some(), "cell {area} not owned");
        removed
    }

    /// Re-key the tile at `from` to `to`, making it the most recently used.
    ///
    /// A no-op when both name the same cell.
    pub(crate) fn move_to(&mut self, from: Rect, to: Rect) {
        let (from_key, to_key) = (TileKey::from(from), TileKey::from(to));
        if from_key == to_key {
            return;
        }

        debug_assert!(!self.entries.contains(&to_key), "cell {to} already owned");
        if let Some(id) = self.remove(from) {
            self.entries.put(to_key, id);
        }
    }

    /// Mark the cell at `area` as most recently used.
    pub(crate) fn touch(&mut self, area: Rect) {
        self.entries.promote(&TileKey::from(area));
    }

    /// The least recently used tile matching `pred`.
    pub(crate) fn least_recent(&self, mut pred: impl FnMut(TileId) -> bool) -> Option<TileId> {
        self.entries
            .iter()
            .rev()
            .map(|(_, &id)| id)
            .find(|&id| pred(id))
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Tile ids, most recently used first.
    pub(crate) fn ids(&self) -> impl Iterator<Item = TileId> + '_ {
        self.entries.iter().map(|(_, &id)| id)
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }
}
