//! Assembled digital terrain model
//!
//! A `TerrainMap` positions the declared normal-map tiles on the sector
//! grid and serves shaded byte rasters from them, either for the whole
//! sector or pad by pad for the sawing scheduler.

use crate::nvm::NormalMap;
use amrel_core::{Error, Raster, Result, TileGeometry};
use rayon::prelude::*;
use std::path::Path;
use tracing::debug;

/// Shading mode applied when reading the terrain as an 8-bit raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShadingMode {
    /// Lambertian shade with a fixed north-west light
    Hill,
    /// Surface tilt mapped monotonically to intensity
    Slope,
    /// Slope compressed then stretched over the full dynamic range; used
    /// when the RORPO stage is skipped
    ExpandedSlope,
}

/// Fixed light direction for hill shading: azimuth 315°, altitude 45°.
const LIGHT: [f32; 3] = [-0.5, 0.5, 0.707_106_77];

/// Shade of a unit surface normal under `mode`.
pub fn shade(normal: [f32; 3], mode: ShadingMode) -> u8 {
    let [nx, ny, nz] = normal;
    match mode {
        ShadingMode::Hill => {
            let dot = nx * LIGHT[0] + ny * LIGHT[1] + nz * LIGHT[2];
            (dot.clamp(0.0, 1.0) * 255.0).round() as u8
        }
        ShadingMode::Slope => {
            let s = (nx * nx + ny * ny).sqrt() / nz.max(1e-6);
            (255.0 * s / (1.0 + s)).round() as u8
        }
        ShadingMode::ExpandedSlope => {
            let s = (nx * nx + ny * ny).sqrt() / nz.max(1e-6);
            (255.0 * (s / (1.0 + s)).sqrt()).round() as u8
        }
    }
}

/// The assembled DTM of a sector.
#[derive(Debug, Default)]
pub struct TerrainMap {
    tiles: Vec<NormalMap>,
    /// Grid slots (row 0 south) to indices into `tiles`
    grid: Vec<Option<usize>>,
    cols_of_tiles: usize,
    rows_of_tiles: usize,
    tile_width: usize,
    tile_height: usize,
    /// DTM cell size in micrometres
    cell_size: i32,
    /// Sector south-west corner, micrometres
    xref: i64,
    yref: i64,

    pad_size: usize,
    pad_width: usize,
    pad_height: usize,
    /// Pad origins (kx, ky) in serpentine order
    pad_origins: Vec<(usize, usize)>,
    pad_cursor: usize,
}

impl TerrainMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a normal-map tile file; only the header is read here.
    pub fn add_normal_map_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        self.tiles.push(NormalMap::open(path)?);
        Ok(())
    }

    /// Declares an in-memory tile (importer and test path).
    pub fn add_normal_map(&mut self, map: NormalMap) {
        self.tiles.push(map);
    }

    /// Positions every declared tile on a `cols x rows` grid anchored at
    /// the sector's south-west corner `(xref, yref)` (micrometres).
    ///
    /// Fails with a positioning error when a tile has a different cell
    /// geometry or does not sit on the grid. With `load_normals` the
    /// whole payload is read at once; otherwise tiles load lazily per
    /// pad.
    pub fn assemble(
        &mut self,
        cols: usize,
        rows: usize,
        xref: i64,
        yref: i64,
        load_normals: bool,
    ) -> Result<()> {
        let first = self.tiles.first().ok_or(Error::EmptySector)?;
        let (tw, th, csize) = {
            let h = first.header();
            (h.cols as usize, h.rows as usize, h.cell_size)
        };
        let span_x = tw as i64 * csize as i64;
        let span_y = th as i64 * csize as i64;

        self.grid = vec![None; cols * rows];
        for (n, tile) in self.tiles.iter().enumerate() {
            let h = tile.header();
            let misfit = h.cols as usize != tw
                || h.rows as usize != th
                || h.cell_size != csize
                || (h.xmin - xref) % span_x != 0
                || (h.ymin - yref) % span_y != 0;
            if misfit {
                return Err(Error::GeometryMismatch {
                    path: tile.path().to_path_buf(),
                });
            }
            let gx = (h.xmin - xref) / span_x;
            let gy = (h.ymin - yref) / span_y;
            if gx < 0 || gy < 0 || gx as usize >= cols || gy as usize >= rows {
                return Err(Error::GeometryMismatch {
                    path: tile.path().to_path_buf(),
                });
            }
            let slot = gy as usize * cols + gx as usize;
            if self.grid[slot].is_some() {
                return Err(Error::GeometryMismatch {
                    path: tile.path().to_path_buf(),
                });
            }
            self.grid[slot] = Some(n);
        }

        self.cols_of_tiles = cols;
        self.rows_of_tiles = rows;
        self.tile_width = tw;
        self.tile_height = th;
        self.cell_size = csize;
        self.xref = xref;
        self.yref = yref;

        if load_normals {
            for tile in &mut self.tiles {
                tile.load()?;
            }
        }
        debug!(cols, rows, tw, th, "terrain map assembled");
        Ok(())
    }

    pub fn width(&self) -> usize {
        self.cols_of_tiles * self.tile_width
    }

    pub fn height(&self) -> usize {
        self.rows_of_tiles * self.tile_height
    }

    pub fn tile_width(&self) -> usize {
        self.tile_width
    }

    pub fn tile_height(&self) -> usize {
        self.tile_height
    }

    /// DTM cell size in micrometres.
    pub fn cell_size(&self) -> i32 {
        self.cell_size
    }

    /// Raster geometry of the assembled sector.
    pub fn geometry(&self) -> TileGeometry {
        TileGeometry {
            cols_of_tiles: self.cols_of_tiles,
            rows_of_tiles: self.rows_of_tiles,
            tile_width: self.tile_width,
            tile_height: self.tile_height,
            cell_size: self.cell_size as i64,
            x0: self.xref,
            y0: self.yref,
        }
    }

    /// Shaded value of sector cell `(i, j)`, `j` being the north-down
    /// row. Cells of undeclared or unloaded tiles read as 0.
    pub fn get(&self, i: usize, j: usize, mode: ShadingMode) -> u8 {
        let gx = i / self.tile_width;
        let gy = self.rows_of_tiles - 1 - j / self.tile_height;
        match self.grid[gy * self.cols_of_tiles + gx] {
            Some(n) if self.tiles[n].is_loaded() => shade(
                self.tiles[n].normal(i % self.tile_width, j % self.tile_height),
                mode,
            ),
            _ => 0,
        }
    }

    /// Shades the whole sector into a fresh raster, row-parallel.
    pub fn shade_sector(&self, mode: ShadingMode) -> Raster<u8> {
        let (w, h) = (self.width(), self.height());
        let data: Vec<u8> = (0..h)
            .into_par_iter()
            .flat_map(|j| (0..w).map(|i| self.get(i, j, mode)).collect::<Vec<u8>>())
            .collect();
        Raster::from_vec(data, h, w).expect("shaded sector dimensions")
    }

    // Pad iteration for the sawing scheduler

    /// Requested pad size in tiles; must be positive and odd.
    pub fn set_pad_size(&mut self, size: usize) {
        self.pad_size = size;
    }

    /// Snaps the pad rectangle to the sector and lays out the pad origins
    /// in serpentine order. Must run after [`TerrainMap::assemble`].
    pub fn adjust_pad_size(&mut self) {
        self.pad_width = self.pad_size.min(self.cols_of_tiles).max(1);
        self.pad_height = self.pad_size.min(self.rows_of_tiles).max(1);
        let xs = stride_positions(self.cols_of_tiles, self.pad_width);
        let ys = stride_positions(self.rows_of_tiles, self.pad_height);
        self.pad_origins.clear();
        for (jy, &ky) in ys.iter().enumerate() {
            if jy % 2 == 0 {
                for &kx in xs.iter() {
                    self.pad_origins.push((kx, ky));
                }
            } else {
                for &kx in xs.iter().rev() {
                    self.pad_origins.push((kx, ky));
                }
            }
        }
        self.pad_cursor = 0;
    }

    /// Pad width in tiles after adjustment.
    pub fn pad_width(&self) -> usize {
        self.pad_width
    }

    /// Pad height in tiles after adjustment.
    pub fn pad_height(&self) -> usize {
        self.pad_height
    }

    /// Writes the current pad's slope-shaded raster
    /// (`pad_width*Tw x pad_height*Th`, rows north-down) into `dst` and
    /// advances the pad cursor. Returns the linear index of the pad's
    /// south-west tile, or `None` when the iteration is exhausted.
    ///
    /// Only the pad's tiles are kept resident; everything else is
    /// released.
    pub fn next_pad(&mut self, dst: &mut [u8]) -> Result<Option<usize>> {
        let Some(&(kx, ky)) = self.pad_origins.get(self.pad_cursor) else {
            return Ok(None);
        };
        self.pad_cursor += 1;

        let mut resident = vec![false; self.tiles.len()];
        for gy in ky..ky + self.pad_height {
            for gx in kx..kx + self.pad_width {
                if let Some(n) = self.grid[gy * self.cols_of_tiles + gx] {
                    resident[n] = true;
                }
            }
        }
        for (n, tile) in self.tiles.iter_mut().enumerate() {
            if resident[n] {
                tile.load()?;
            } else {
                tile.release();
            }
        }

        let pw = self.pad_width * self.tile_width;
        let ph = self.pad_height * self.tile_height;
        debug_assert_eq!(dst.len(), pw * ph);
        let j0 = (self.rows_of_tiles - ky - self.pad_height) * self.tile_height;
        let i0 = kx * self.tile_width;
        for jj in 0..ph {
            for ii in 0..pw {
                dst[jj * pw + ii] = self.get(i0 + ii, j0 + jj, ShadingMode::Slope);
            }
        }
        Ok(Some(ky * self.cols_of_tiles + kx))
    }
}

/// Origins covering `[0, total)` with rectangles of size `pad`: stride by
/// `pad`, the last origin clamped so the final rectangle stays inside.
fn stride_positions(total: usize, pad: usize) -> Vec<usize> {
    if pad >= total {
        return vec![0];
    }
    let mut xs = Vec::new();
    let mut s = 0;
    while s + pad <= total {
        xs.push(s);
        s += pad;
    }
    if xs.last() != Some(&(total - pad)) {
        xs.push(total - pad);
    }
    xs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nvm::NormalMapHeader;

    const CSIZE: i32 = 500_000;

    fn tilted_tile(gx: i64, gy: i64, tw: i32, th: i32) -> NormalMap {
        let header = NormalMapHeader {
            cols: tw,
            rows: th,
            cell_size: CSIZE,
            xmin: gx * tw as i64 * CSIZE as i64,
            ymin: gy * th as i64 * CSIZE as i64,
        };
        // 30° tilt facing east
        let n = [-0.5, 0.0, 0.866_025_4];
        NormalMap::from_normals(header, vec![n; (tw * th) as usize]).unwrap()
    }

    #[test]
    fn test_shade_flat_is_dark_in_slope_mode() {
        assert_eq!(shade([0.0, 0.0, 1.0], ShadingMode::Slope), 0);
        assert_eq!(shade([0.0, 0.0, 1.0], ShadingMode::ExpandedSlope), 0);
    }

    #[test]
    fn test_shade_expansion_stretches_low_slopes() {
        let gentle = [0.1, 0.0, 0.994_987_4];
        let s = shade(gentle, ShadingMode::Slope);
        let e = shade(gentle, ShadingMode::ExpandedSlope);
        assert!(e > s, "expanded shade {e} should exceed plain shade {s}");
    }

    #[test]
    fn test_assemble_and_get() {
        let mut tm = TerrainMap::new();
        tm.add_normal_map(tilted_tile(0, 0, 4, 4));
        tm.add_normal_map(tilted_tile(1, 0, 4, 4));
        tm.assemble(2, 1, 0, 0, true).unwrap();
        assert_eq!(tm.width(), 8);
        assert_eq!(tm.height(), 4);
        let g = tm.geometry();
        assert_eq!(g.width(), 8);
        assert_eq!(g.cell_size, CSIZE as i64);
        let v = tm.get(5, 2, ShadingMode::Slope);
        assert!(v > 0);
    }

    #[test]
    fn test_assemble_rejects_misaligned_tile() {
        let mut tm = TerrainMap::new();
        tm.add_normal_map(tilted_tile(0, 0, 4, 4));
        let mut off = tilted_tile(1, 0, 4, 4);
        // shift the second tile east by half a tile
        off = {
            let mut h = *off.header();
            h.xmin += 2 * CSIZE as i64;
            NormalMap::from_normals(h, vec![[0.0, 0.0, 1.0]; 16]).unwrap()
        };
        tm.add_normal_map(off);
        assert!(matches!(
            tm.assemble(2, 1, 0, 0, true),
            Err(Error::GeometryMismatch { .. })
        ));
    }

    #[test]
    fn test_assemble_empty_sector() {
        let mut tm = TerrainMap::new();
        assert!(matches!(
            tm.assemble(1, 1, 0, 0, true),
            Err(Error::EmptySector)
        ));
    }

    #[test]
    fn test_stride_positions_cover_and_clamp() {
        assert_eq!(stride_positions(4, 4), vec![0]);
        assert_eq!(stride_positions(4, 5), vec![0]);
        assert_eq!(stride_positions(5, 3), vec![0, 2]);
        assert_eq!(stride_positions(9, 3), vec![0, 3, 6]);
    }

    #[test]
    fn test_pad_iteration_covers_sector() {
        let mut tm = TerrainMap::new();
        for gy in 0..2 {
            for gx in 0..3 {
                tm.add_normal_map(tilted_tile(gx, gy, 4, 4));
            }
        }
        tm.assemble(3, 2, 0, 0, false).unwrap();
        tm.set_pad_size(1);
        tm.adjust_pad_size();
        let mut dst = vec![0u8; 16];
        let mut seen = Vec::new();
        while let Some(k) = tm.next_pad(&mut dst).unwrap() {
            seen.push(k);
            assert!(dst.iter().all(|&v| v > 0));
        }
        // serpentine over the 3x2 pad grid
        assert_eq!(seen, vec![0, 1, 2, 5, 4, 3]);
    }

    #[test]
    fn test_pad_matches_full_sector_shading() {
        let mut tm = TerrainMap::new();
        for gy in 0..2 {
            for gx in 0..2 {
                tm.add_normal_map(tilted_tile(gx, gy, 3, 3));
            }
        }
        tm.assemble(2, 2, 0, 0, false).unwrap();
        tm.set_pad_size(3);
        tm.adjust_pad_size();
        assert_eq!(tm.pad_width(), 2);
        assert_eq!(tm.pad_height(), 2);
        let mut dst = vec![0u8; 36];
        assert_eq!(tm.next_pad(&mut dst).unwrap(), Some(0));
        let full = tm.shade_sector(ShadingMode::Slope);
        assert_eq!(dst, full.as_slice());
        assert_eq!(tm.next_pad(&mut dst).unwrap(), None);
    }
}
