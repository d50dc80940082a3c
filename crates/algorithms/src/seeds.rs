//! Seed generation
//!
//! Samples each retained digital straight segment at a regular spacing
//! and lays an oriented pixel pair across it at every sample. Seeds are
//! bucketed by the tile holding their midpoint; the buckets feed the
//! track detector tile by tile.

use amrel_core::{DigitalStraightSegment, Pt2i};
use tracing::debug;

/// Offset of a pad inside the sector, in tiles from the south-west.
#[derive(Debug, Clone, Copy)]
pub struct PadRef {
    pub kx: usize,
    pub ky: usize,
    /// Pad height in tiles
    pub pad_height: usize,
}

/// Counters reported after one seed-generation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedStats {
    /// Seeds appended to the buckets
    pub seeds: usize,
    /// Segments below the length filter
    pub rejected_segments: usize,
    /// Seeds skipped for leaving the sector or an undeclared tile
    pub out_of_sector: usize,
}

/// Seed generation parameters, clamped to their floors on set.
#[derive(Debug, Clone, Copy)]
pub struct SeedBuilder {
    min_bs_length: i32,
    seed_shift: i32,
    seed_width: i32,
}

impl Default for SeedBuilder {
    fn default() -> Self {
        Self {
            min_bs_length: 80,
            seed_shift: 24,
            seed_width: 40,
        }
    }
}

impl SeedBuilder {
    pub fn new(min_bs_length: i32, seed_shift: i32, seed_width: i32) -> Self {
        Self {
            min_bs_length: min_bs_length.max(0),
            seed_shift: seed_shift.max(10),
            seed_width: seed_width.max(10),
        }
    }

    /// Halves every knob (half-size seeds mode).
    pub fn halved(self) -> Self {
        Self {
            min_bs_length: self.min_bs_length / 2,
            seed_shift: (self.seed_shift / 2).max(1),
            seed_width: (self.seed_width / 2).max(1),
        }
    }

    pub fn seed_shift(&self) -> i32 {
        self.seed_shift
    }

    pub fn seed_width(&self) -> i32 {
        self.seed_width
    }

    pub fn min_bs_length(&self) -> i32 {
        self.min_bs_length
    }

    /// Emits seeds for every long-enough segment into the per-tile
    /// buckets of `out` (`tile_cols * tile_rows` entries). Segment
    /// endpoints are in pad or sector image coordinates (rows
    /// north-down); seeds come out in sector coordinates with y counted
    /// from the south.
    ///
    /// `declared(k)` tells whether the grid holds a tile at index `k`.
    #[allow(clippy::too_many_arguments)]
    pub fn build(
        &self,
        dss: &[DigitalStraightSegment],
        tile_cols: usize,
        tile_rows: usize,
        tile_w: usize,
        tile_h: usize,
        pad: Option<PadRef>,
        declared: &dyn Fn(usize) -> bool,
        out: &mut [Vec<(Pt2i, Pt2i)>],
    ) -> SeedStats {
        debug_assert_eq!(out.len(), tile_cols * tile_rows);
        let (tw, th) = (tile_w as i32, tile_h as i32);
        let (tsw, tsh) = (tile_cols as i32, tile_rows as i32);
        let (kx, ky, pim_h) = match pad {
            Some(p) => (p.kx as i32, p.ky as i32, (p.pad_height * tile_h) as i32),
            None => (0, 0, (tile_rows * tile_h) as i32),
        };
        let skx = kx * tw;
        let sky = ky * th + pim_h - 1;
        let mbsl2 = self.min_bs_length as i64 * self.min_bs_length as i64;
        let sshift = self.seed_shift as f32;
        let sw2 = (self.seed_width / 2) as f32;

        let mut stats = SeedStats::default();
        for seg in dss {
            if seg.length2() < mbsl2 {
                stats.rejected_segments += 1;
                continue;
            }
            let (a, b) = seg.naive_line();
            let (x1, y1) = a.to_f32();
            let (x2, y2) = b.to_f32();
            let ln = ((x2 - x1) * (x2 - x1) + (y2 - y1) * (y2 - y1)).sqrt();
            let dx = (x2 - x1) / ln;
            let dy = (y2 - y1) / ln;
            let mut pos = 0.0f32;
            while pos <= ln {
                // truncating rounding, as the reference casts (v + 0.5f)
                let p1 = Pt2i::new(
                    skx + (x1 + pos * dx - sw2 * dy + 0.5) as i32,
                    sky - (y1 + pos * dy + sw2 * dx + 0.5) as i32,
                );
                let p2 = Pt2i::new(
                    skx + (x1 + pos * dx + sw2 * dy + 0.5) as i32,
                    sky - (y1 + pos * dy - sw2 * dx + 0.5) as i32,
                );
                pos += sshift;
                if p1.x < 0
                    || p1.x >= tsw * tw
                    || p1.y < 0
                    || p1.y >= tsh * th
                    || p2.x < 0
                    || p2.x >= tsw * tw
                    || p2.y < 0
                    || p2.y >= tsh * th
                {
                    stats.out_of_sector += 1;
                    continue;
                }
                let tilex = (((p1.x + p2.x) / 2) / tw).clamp(0, tsw - 1);
                let tiley = (((p1.y + p2.y) / 2) / th).clamp(0, tsh - 1);
                let k = (tiley * tsw + tilex) as usize;
                if declared(k) {
                    out[k].push((p1, p2));
                    stats.seeds += 1;
                } else {
                    stats.out_of_sector += 1;
                }
            }
        }
        debug!(
            seeds = stats.seeds,
            rejected = stats.rejected_segments,
            "seed generation done"
        );
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn horizontal_segment(y: f32, x0: f32, x1: f32) -> DigitalStraightSegment {
        DigitalStraightSegment::from_subpixel((x0, y), (x1, y), 512)
    }

    #[test]
    fn test_seeds_straddle_the_segment() {
        let b = SeedBuilder::new(0, 10, 10);
        let seg = horizontal_segment(50.0, 10.0, 90.0);
        let mut out = vec![Vec::new()];
        let stats = b.build(&[seg], 1, 1, 100, 100, None, &|_| true, &mut out);
        assert!(stats.seeds > 0);
        for &(p1, p2) in &out[0] {
            // seeds lie orthogonal to the segment: same x, y straddles it
            assert_eq!(p1.x, p2.x);
            let mid = Pt2i::midpoint(p1, p2);
            assert_eq!(mid.y, 99 - 50); // flipped segment row
            assert_eq!((p1.y - p2.y).abs(), 10);
        }
    }

    #[test]
    fn test_short_segments_are_rejected() {
        let b = SeedBuilder::new(40, 10, 10);
        let seg = horizontal_segment(10.0, 0.0, 20.0);
        let mut out = vec![Vec::new()];
        let stats = b.build(&[seg], 1, 1, 64, 64, None, &|_| true, &mut out);
        assert_eq!(stats.seeds, 0);
        assert_eq!(stats.rejected_segments, 1);
    }

    #[test]
    fn test_out_of_sector_seeds_are_skipped() {
        let b = SeedBuilder::new(0, 10, 10);
        // segment hugging the top image row: flipped seeds leave the sector
        let seg = horizontal_segment(1.0, 0.0, 63.0);
        let mut out = vec![Vec::new()];
        let stats = b.build(&[seg], 1, 1, 64, 64, None, &|_| true, &mut out);
        assert!(stats.out_of_sector > 0);
    }

    #[test]
    fn test_pad_offset_lands_in_the_right_tile() {
        let b = SeedBuilder::new(0, 10, 10);
        let seg = horizontal_segment(32.0, 8.0, 56.0);
        let mut out = vec![Vec::new(); 9];
        // single-tile pad at grid position (1, 1) of a 3x3 sector
        let pad = PadRef {
            kx: 1,
            ky: 1,
            pad_height: 1,
        };
        let stats = b.build(&[seg], 3, 3, 64, 64, Some(pad), &|_| true, &mut out);
        assert!(stats.seeds > 0);
        assert!(out[4].len() == stats.seeds, "all seeds in center tile");
        for &(p1, _) in &out[4] {
            assert!(p1.x >= 64 && p1.x < 128);
            assert!(p1.y >= 64 && p1.y < 128);
        }
    }

    #[test]
    fn test_floors_are_enforced() {
        let b = SeedBuilder::new(-5, 3, 4);
        assert_eq!(b.min_bs_length(), 0);
        assert_eq!(b.seed_shift(), 10);
        assert_eq!(b.seed_width(), 10);
    }

    #[test]
    fn test_undeclared_tile_drops_seed() {
        let b = SeedBuilder::new(0, 10, 10);
        let seg = horizontal_segment(32.0, 4.0, 60.0);
        let mut out = vec![Vec::new()];
        let stats = b.build(&[seg], 1, 1, 64, 64, None, &|_| false, &mut out);
        assert_eq!(stats.seeds, 0);
        assert!(stats.out_of_sector > 0);
    }
}
