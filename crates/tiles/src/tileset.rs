//! Sector-wide point tile set
//!
//! Owns the grid of point tiles and, when a buffer size is configured, a
//! sliding window of resident point payloads. The serpentine cursor of
//! [`PointTileSet::next_tile`] yields each declared tile exactly once and
//! guarantees that the yielded tile and its eight grid neighbours are
//! resident before the caller touches any point.

use crate::til::{CloudAccess, PointTile};
use amrel_core::{serpentine, Error, Result};
use std::path::Path;
use tracing::debug;

/// Grid-ordered collection of point tiles with an optional sliding buffer.
#[derive(Debug, Default)]
pub struct PointTileSet {
    /// Buffer window in tiles; 0 keeps every tile resident
    buf_size: usize,
    /// Tiles as declared, before `create` arranges them
    pending: Vec<PointTile>,
    /// Grid slots, row 0 south
    slots: Vec<Option<PointTile>>,
    cols: usize,
    rows: usize,
    xref: i64,
    yref: i64,
    /// Tile span in micrometres
    span_x: i64,
    span_y: i64,
    /// Serpentine visit order, fixed at buffer creation
    order: Vec<usize>,
    cursor: usize,
    buffers_created: bool,
    total_points: u64,
}

impl PointTileSet {
    /// `buf_size` must be 0 (all resident) or positive odd.
    pub fn new(buf_size: usize) -> Self {
        Self {
            buf_size,
            ..Self::default()
        }
    }

    /// Appends a tile descriptor; with `load_now` the payload is read
    /// immediately. The header must agree with previously added tiles.
    pub fn add_tile(&mut self, path: impl AsRef<Path>, load_now: bool) -> Result<()> {
        let mut tile = PointTile::open(&path)?;
        if let Some(first) = self.pending.first() {
            let (a, b) = (first.header(), tile.header());
            if a.access != b.access
                || a.cols != b.cols
                || a.rows != b.rows
                || a.cell_size != b.cell_size
            {
                return Err(Error::format(
                    path,
                    "tile header inconsistent with the rest of the set",
                ));
            }
        }
        if load_now {
            tile.load()?;
        }
        self.pending.push(tile);
        Ok(())
    }

    /// Appends an already built tile (importer and test path).
    pub fn insert_tile(&mut self, tile: PointTile) {
        self.pending.push(tile);
    }

    /// Verifies consistency, computes the sector's south-west reference
    /// corner and arranges the tiles on the grid.
    pub fn create(&mut self) -> Result<()> {
        let first = self.pending.first().ok_or(Error::EmptySector)?;
        let span_x = first.header().span_x();
        let span_y = first.header().span_y();
        let xref = self.pending.iter().map(|t| t.header().xref).min().unwrap();
        let yref = self.pending.iter().map(|t| t.header().yref).min().unwrap();
        let xmax = self.pending.iter().map(|t| t.header().xref).max().unwrap();
        let ymax = self.pending.iter().map(|t| t.header().yref).max().unwrap();
        let cols = ((xmax - xref) / span_x + 1) as usize;
        let rows = ((ymax - yref) / span_y + 1) as usize;

        let mut slots: Vec<Option<PointTile>> = (0..cols * rows).map(|_| None).collect();
        let mut total = 0u64;
        for tile in self.pending.drain(..) {
            let h = tile.header();
            if (h.xref - xref) % span_x != 0 || (h.yref - yref) % span_y != 0 {
                return Err(Error::GeometryMismatch {
                    path: tile.path().to_path_buf(),
                });
            }
            let gx = ((h.xref - xref) / span_x) as usize;
            let gy = ((h.yref - yref) / span_y) as usize;
            let slot = gy * cols + gx;
            if slots[slot].is_some() {
                return Err(Error::GeometryMismatch {
                    path: tile.path().to_path_buf(),
                });
            }
            total += h.count as u64;
            slots[slot] = Some(tile);
        }

        self.slots = slots;
        self.cols = cols;
        self.rows = rows;
        self.xref = xref;
        self.yref = yref;
        self.span_x = span_x;
        self.span_y = span_y;
        self.total_points = total;
        debug!(cols, rows, total, "point tile set created");
        Ok(())
    }

    pub fn columns_of_tiles(&self) -> usize {
        self.cols
    }

    pub fn rows_of_tiles(&self) -> usize {
        self.rows
    }

    /// World x of the sector's west edge, micrometres.
    pub fn xref(&self) -> i64 {
        self.xref
    }

    /// World y of the sector's south edge, micrometres.
    pub fn yref(&self) -> i64 {
        self.yref
    }

    /// Sector width in metres.
    pub fn xm_spread(&self) -> f32 {
        (self.cols as i64 * self.span_x) as f32 / 1e6
    }

    /// Total point count over all declared tiles.
    pub fn size(&self) -> u64 {
        self.total_points
    }

    /// Point cell size in micrometres.
    pub fn pt_cell_size(&self) -> i32 {
        self.any_tile().map(|t| t.header().cell_size).unwrap_or(0)
    }

    /// Point cells per tile along x.
    pub fn cells_per_tile_x(&self) -> usize {
        self.any_tile().map(|t| t.header().cols as usize).unwrap_or(0)
    }

    /// Point cells per tile along y.
    pub fn cells_per_tile_y(&self) -> usize {
        self.any_tile().map(|t| t.header().rows as usize).unwrap_or(0)
    }

    /// Resolution class of the set.
    pub fn access(&self) -> CloudAccess {
        self.any_tile()
            .and_then(|t| CloudAccess::from_divisor(t.header().access))
            .unwrap_or_default()
    }

    fn any_tile(&self) -> Option<&PointTile> {
        self.slots.iter().flatten().next()
    }

    /// Whether a tile is declared at linear grid index `k`.
    pub fn is_declared(&self, k: usize) -> bool {
        self.slots.get(k).is_some_and(|s| s.is_some())
    }

    /// Whether the tile at `k` has its points resident.
    pub fn is_loaded(&self, k: usize) -> bool {
        self.slots
            .get(k)
            .and_then(|s| s.as_ref())
            .is_some_and(|t| t.is_loaded())
    }

    /// The tile at grid index `k`.
    pub fn tile(&self, k: usize) -> Option<&PointTile> {
        self.slots.get(k).and_then(|s| s.as_ref())
    }

    /// Force-loads every declared tile (buffer size 0 mode).
    pub fn load_points(&mut self) -> Result<()> {
        for slot in self.slots.iter_mut().flatten() {
            slot.load()?;
        }
        Ok(())
    }

    /// Allocates the sliding buffer and resets the serpentine cursor.
    /// Call exactly once per run before [`PointTileSet::next_tile`].
    pub fn create_buffers(&mut self) {
        self.order = serpentine(self.cols, self.rows).collect();
        self.cursor = 0;
        self.buffers_created = true;
    }

    /// Yields the next declared tile index in serpentine order, with the
    /// tile and every declared 8-neighbour resident. Returns `None` when
    /// the iteration is exhausted.
    pub fn next_tile(&mut self) -> Result<Option<usize>> {
        debug_assert!(self.buffers_created, "create_buffers() not called");
        while let Some(&k) = self.order.get(self.cursor) {
            self.cursor += 1;
            if !self.is_declared(k) {
                continue;
            }
            self.slide_window_to(k)?;
            return Ok(Some(k));
        }
        Ok(None)
    }

    /// Loads the 3x3 neighbourhood of `k` and evicts resident tiles that
    /// fall outside the window.
    fn slide_window_to(&mut self, k: usize) -> Result<()> {
        let (tx, ty) = (k % self.cols, k / self.cols);
        // neighbour residency beats the configured radius
        let keep = ((self.buf_size.saturating_sub(1)) / 2).max(1) as isize;
        for (slot, tile) in self.slots.iter_mut().enumerate() {
            let Some(tile) = tile else { continue };
            let dx = (slot % self.cols) as isize - tx as isize;
            let dy = (slot / self.cols) as isize - ty as isize;
            let cheb = dx.abs().max(dy.abs());
            if cheb <= 1 {
                tile.load()?;
            } else if cheb > keep && tile.is_loaded() {
                debug!(slot, "evicting tile from sliding buffer");
                tile.release_points();
            }
        }
        Ok(())
    }

    /// Appends the points of global point cell `(cx, cy)` (cells counted
    /// from the sector's south-west corner) as metres relative to that
    /// corner. Returns `false` when the cell lies outside every resident
    /// tile.
    pub fn collect_cell_points_m(&self, cx: i64, cy: i64, out: &mut Vec<[f64; 3]>) -> bool {
        let (cpx, cpy) = (self.cells_per_tile_x() as i64, self.cells_per_tile_y() as i64);
        if cpx == 0 || cx < 0 || cy < 0 || cx >= cpx * self.cols as i64 || cy >= cpy * self.rows as i64
        {
            return false;
        }
        let k = (cy / cpy) as usize * self.cols + (cx / cpx) as usize;
        let Some(tile) = self.tile(k) else {
            return false;
        };
        if !tile.is_loaded() {
            return false;
        }
        let h = *tile.header();
        let (tile_dx, tile_dy) = (h.xref - self.xref, h.yref - self.yref);
        for p in tile.cell_points((cx % cpx) as usize, (cy % cpy) as usize) {
            out.push([
                (tile_dx + p[0] as i64) as f64 / 1e6,
                (tile_dy + p[1] as i64) as f64 / 1e6,
                (h.zref + p[2] as i64) as f64 / 1e6,
            ]);
        }
        true
    }
}
