//! Carriage track detection
//!
//! Grows one road section from a seed pixel pair: the seed cross-section
//! is scanned for a plateau in the raw point cloud, then the scan is
//! swept both ways along the track, re-detecting the plateau under drift
//! tolerances until too many consecutive scans fail.

mod plateau;
mod track;

pub use plateau::{find_plateau, Plateau, PlateauModel};
pub use track::{CarriageTrack, TrackScan};

use amrel_core::Pt2i;
use amrel_tiles::PointTileSet;
use std::collections::BTreeSet;
use tracing::trace;

/// Hard cap on scans per side, a backstop against runaway sweeps.
const MAX_SCANS_PER_SIDE: i32 = 1000;

/// Detector for carriage tracks over a tiled point cloud.
#[derive(Debug, Clone)]
pub struct CTrackDetector {
    plateau_lack_tolerance: u32,
    max_shift_length: f64,
    initial_detection: bool,
    plateau_min_length: f64,
    plateau_max_length: f64,
    plateau_thickness_tolerance: f64,
    slope_tolerance: f64,
    side_shift_tolerance: f64,
    plateau_max_tilt: i32,
    tail_min_size: Option<u32>,
    automatic: bool,

    /// Sector raster width in pixels
    vm_width: i32,
    /// Sector raster height in pixels
    vm_height: i32,
    /// Point cells per DTM cell
    sub_div: i32,
    /// Metres per pixel
    csize: f64,
    /// Point requests that fell outside the resident grid
    outs: u32,
}

impl Default for CTrackDetector {
    fn default() -> Self {
        Self {
            plateau_lack_tolerance: 5,
            max_shift_length: 0.5,
            initial_detection: false,
            plateau_min_length: 2.0,
            plateau_max_length: 6.0,
            plateau_thickness_tolerance: 0.25,
            slope_tolerance: 0.10,
            side_shift_tolerance: 0.5,
            plateau_max_tilt: 10,
            tail_min_size: None,
            automatic: false,
            vm_width: 0,
            vm_height: 0,
            sub_div: 1,
            csize: 0.5,
            outs: 0,
        }
    }
}

impl CTrackDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_plateau_lack_tolerance(&mut self, v: u32) {
        self.plateau_lack_tolerance = v;
    }

    pub fn plateau_lack_tolerance(&self) -> u32 {
        self.plateau_lack_tolerance
    }

    pub fn set_max_shift_length(&mut self, v: f64) {
        self.max_shift_length = v;
    }

    pub fn max_shift_length(&self) -> f64 {
        self.max_shift_length
    }

    pub fn set_initial_detection(&mut self, on: bool) {
        self.initial_detection = on;
    }

    pub fn is_initial_detection_on(&self) -> bool {
        self.initial_detection
    }

    pub fn set_min_length(&mut self, v: f64) {
        self.plateau_min_length = v;
    }

    pub fn min_length(&self) -> f64 {
        self.plateau_min_length
    }

    pub fn set_max_length(&mut self, v: f64) {
        self.plateau_max_length = v;
    }

    pub fn max_length(&self) -> f64 {
        self.plateau_max_length
    }

    pub fn set_thickness_tolerance(&mut self, v: f64) {
        self.plateau_thickness_tolerance = v;
    }

    pub fn thickness_tolerance(&self) -> f64 {
        self.plateau_thickness_tolerance
    }

    pub fn set_slope_tolerance(&mut self, v: f64) {
        self.slope_tolerance = v;
    }

    pub fn slope_tolerance(&self) -> f64 {
        self.slope_tolerance
    }

    pub fn set_side_shift_tolerance(&mut self, v: f64) {
        self.side_shift_tolerance = v;
    }

    pub fn side_shift_tolerance(&self) -> f64 {
        self.side_shift_tolerance
    }

    pub fn set_max_tilt(&mut self, degrees: i32) {
        self.plateau_max_tilt = degrees;
    }

    pub fn max_tilt(&self) -> i32 {
        self.plateau_max_tilt
    }

    pub fn set_tail_min_size(&mut self, v: u32) {
        self.tail_min_size = Some(v);
    }

    pub fn tail_min_size(&self) -> Option<u32> {
        self.tail_min_size
    }

    pub fn set_automatic(&mut self, on: bool) {
        self.automatic = on;
    }

    pub fn is_automatic(&self) -> bool {
        self.automatic
    }

    /// Point cells per DTM cell.
    pub fn sub_div(&self) -> i32 {
        self.sub_div
    }

    /// Binds the detector to the sector raster: dimensions in pixels,
    /// sub-division of DTM cells into point cells, metres per pixel.
    pub fn set_points_grid(&mut self, width: i32, height: i32, sub_div: i32, csize: f64) {
        self.vm_width = width;
        self.vm_height = height;
        self.sub_div = sub_div.max(1);
        self.csize = csize;
    }

    /// Point requests that fell outside the resident grid since the last
    /// reset.
    pub fn outs(&self) -> u32 {
        self.outs
    }

    pub fn reset_outs(&mut self) {
        self.outs = 0;
    }

    fn model(&self) -> PlateauModel {
        PlateauModel {
            min_length: self.plateau_min_length,
            max_length: self.plateau_max_length,
            thickness_tolerance: self.plateau_thickness_tolerance,
            max_tilt_tan: (self.plateau_max_tilt as f64).to_radians().tan(),
        }
    }

    /// Detects the track crossed by the seed `(p1, p2)` (sector pixels,
    /// y from the south). Returns `None` when the seed cross-section
    /// holds no plateau.
    pub fn detect(&mut self, pts: &PointTileSet, p1: Pt2i, p2: Pt2i) -> Option<CarriageTrack> {
        if self.vm_width > 0 {
            for p in [p1, p2] {
                if p.x < 0 || p.x >= self.vm_width || p.y < 0 || p.y >= self.vm_height {
                    self.outs += 1;
                    return None;
                }
            }
        }
        let cs = self.csize;
        let origin = [(p1.x as f64 + 0.5) * cs, (p1.y as f64 + 0.5) * cs];
        let tip = [(p2.x as f64 + 0.5) * cs, (p2.y as f64 + 0.5) * cs];
        let len = ((tip[0] - origin[0]).powi(2) + (tip[1] - origin[1]).powi(2)).sqrt();
        if len < 1e-9 {
            return None;
        }
        let u = [(tip[0] - origin[0]) / len, (tip[1] - origin[1]) / len];
        let v = [-u[1], u[0]];

        let model = self.model();
        let mut samples = self.scan_samples(pts, origin, u, v, len, 0);
        let seed_plateau = find_plateau(&mut samples.heights, &model, None)?;
        let seed_scan = TrackScan {
            num: 0,
            plateau: Some(seed_plateau),
            points: samples.pixels_within(&seed_plateau, cs),
        };
        trace!(?seed_plateau, "seed plateau accepted");

        let fore = self.sweep(pts, origin, u, v, len, &seed_plateau, 1);
        let back = self.sweep(pts, origin, u, v, len, &seed_plateau, -1);

        let mut scans: Vec<TrackScan> = back.into_iter().rev().collect();
        let seed_index = scans.len();
        scans.push(seed_scan);
        scans.extend(fore);
        Some(CarriageTrack::new(scans, seed_index, origin, u, v, cs))
    }

    /// Sweeps away from the seed in one direction, absorbing up to the
    /// lack tolerance of consecutive scan failures. Tails shorter than
    /// the configured minimum are pruned whole.
    fn sweep(
        &mut self,
        pts: &PointTileSet,
        origin: [f64; 2],
        u: [f64; 2],
        v: [f64; 2],
        len: f64,
        seed: &Plateau,
        dir: i32,
    ) -> Vec<TrackScan> {
        let model = self.model();
        let mut scans: Vec<TrackScan> = Vec::new();
        let mut reference = *seed;
        let mut lacks = 0u32;
        let mut accepted = 0u32;
        for step in 1..=MAX_SCANS_PER_SIDE {
            if lacks > self.plateau_lack_tolerance {
                break;
            }
            let num = step * dir;
            let mut samples = self.scan_samples(pts, origin, u, v, len, num);
            let scale = (lacks + 1) as f64;
            let found = find_plateau(
                &mut samples.heights,
                &model,
                Some((reference.center, self.side_shift_tolerance * scale)),
            )
            .filter(|p| {
                (p.height - reference.height).abs() <= self.slope_tolerance * scale
                    && (p.start - reference.start).abs() <= self.max_shift_length * scale
                    && (p.end - reference.end).abs() <= self.max_shift_length * scale
            });
            match found {
                Some(p) => {
                    lacks = 0;
                    accepted += 1;
                    reference = p;
                    scans.push(TrackScan {
                        num,
                        plateau: Some(p),
                        points: samples.pixels_within(&p, self.csize),
                    });
                }
                None => {
                    lacks += 1;
                    scans.push(TrackScan {
                        num,
                        plateau: None,
                        points: Vec::new(),
                    });
                }
            }
        }
        // drop trailing failures
        while scans.last().is_some_and(|s| s.plateau.is_none()) {
            scans.pop();
        }
        if let Some(min) = self.tail_min_size {
            if accepted < min {
                scans.clear();
            }
        }
        scans
    }

    /// Gathers the points of one scan strip: positions along the
    /// cross-section axis with heights, plus their sector pixels.
    fn scan_samples(
        &mut self,
        pts: &PointTileSet,
        origin: [f64; 2],
        u: [f64; 2],
        v: [f64; 2],
        len: f64,
        num: i32,
    ) -> ScanSamples {
        let cs = self.csize;
        let d = num as f64 * cs;
        let ax = origin[0] + v[0] * d;
        let ay = origin[1] + v[1] * d;
        let ptc = pts.pt_cell_size() as f64 / 1e6;
        let mut out = ScanSamples::default();
        if ptc <= 0.0 {
            return out;
        }
        // cells crossed by the strip, padded enough to cover its width
        let radius = ((cs / 2.0) / ptc).ceil() as i64;
        let mut cells: BTreeSet<(i64, i64)> = BTreeSet::new();
        let steps = (len / (ptc / 2.0)).ceil() as i64;
        for s in 0..=steps {
            let t = len * s as f64 / steps as f64;
            let cx = ((ax + u[0] * t) / ptc).floor() as i64;
            let cy = ((ay + u[1] * t) / ptc).floor() as i64;
            for jy in -radius..=radius {
                for jx in -radius..=radius {
                    cells.insert((cx + jx, cy + jy));
                }
            }
        }
        let mut raw = Vec::new();
        for (cx, cy) in cells {
            if !pts.collect_cell_points_m(cx, cy, &mut raw) {
                self.outs += 1;
            }
        }
        for p in raw {
            let (dx, dy) = (p[0] - ax, p[1] - ay);
            let t = dx * u[0] + dy * u[1];
            let side = dx * v[0] + dy * v[1];
            if t < 0.0 || t > len || side.abs() > cs / 2.0 {
                continue;
            }
            out.heights.push((t, p[2]));
            out.raw.push((t, p[0], p[1]));
        }
        out
    }
}

/// Samples of one scan strip.
#[derive(Debug, Default)]
struct ScanSamples {
    /// (position along the scan axis, height) pairs
    heights: Vec<(f64, f64)>,
    /// (position, world x, world y) of each sample, metres
    raw: Vec<(f64, f64, f64)>,
}

impl ScanSamples {
    /// Pixels of the samples lying inside the plateau bounds.
    fn pixels_within(&self, p: &Plateau, csize: f64) -> Vec<Pt2i> {
        let mut px: Vec<Pt2i> = self
            .raw
            .iter()
            .filter(|(t, _, _)| *t >= p.start && *t <= p.end)
            .map(|(_, x, y)| Pt2i::new((x / csize).floor() as i32, (y / csize).floor() as i32))
            .collect();
        px.sort_by_key(|q| (q.y, q.x));
        px.dedup();
        px
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use amrel_tiles::{CloudAccess, PointTile};

    /// A 10x10 m tile sampled every 0.2 m: hillside rising away from a
    /// flat 3 m road corridor running west-east at y = 5.
    fn road_tile(road: bool) -> PointTile {
        let mut pts = Vec::new();
        for iy in 0..50 {
            for ix in 0..50 {
                let x = 0.1 + ix as f64 * 0.2;
                let y = 0.1 + iy as f64 * 0.2;
                let z = if road {
                    100.0 + ((y - 5.0).abs() - 1.5).max(0.0) * 0.8
                } else {
                    100.0 + y * 0.8
                };
                pts.push((
                    (x * 1e6) as i64,
                    (y * 1e6) as i64,
                    (z * 1e6) as i64,
                ));
            }
        }
        let mut tile = PointTile::for_dtm_tile(CloudAccess::Mid, 20, 20, 500_000, 0, 0, 0);
        tile.set_points(&pts);
        tile
    }

    fn tile_set(road: bool) -> PointTileSet {
        let mut set = PointTileSet::new(0);
        set.insert_tile(road_tile(road));
        set.create().unwrap();
        set.load_points().unwrap();
        set
    }

    fn detector() -> CTrackDetector {
        let mut det = CTrackDetector::new();
        det.set_points_grid(20, 20, 5, 0.5);
        det.set_automatic(true);
        det
    }

    #[test]
    fn test_detects_a_straight_road() {
        let set = tile_set(true);
        let mut det = detector();
        let ct = det
            .detect(&set, Pt2i::new(10, 2), Pt2i::new(10, 18))
            .expect("road under the seed");
        let seed = ct.plateau(0).expect("seed plateau");
        assert!((seed.height - 100.0).abs() < 0.2, "height {seed:?}");
        assert!(seed.length() >= 2.0);
        // the road crosses the whole tile, the sweep should follow it
        assert!(ct.plateau_count() >= 10, "only {} scans", ct.plateau_count());
        let strips = ct.connected_points(20, 20);
        assert!(!strips.is_empty());
        assert!(strips.iter().all(|s| !s.is_empty()));
        // centerline stays near the corridor axis
        for (_, y) in ct.centerline() {
            assert!((y - 5.0).abs() < 1.0, "centerline strayed to y = {y}");
        }
    }

    #[test]
    fn test_bare_hillside_yields_nothing() {
        let set = tile_set(false);
        let mut det = detector();
        assert!(det.detect(&set, Pt2i::new(10, 2), Pt2i::new(10, 18)).is_none());
    }

    #[test]
    fn test_out_of_raster_seed_is_counted() {
        let set = tile_set(true);
        let mut det = detector();
        assert!(det.detect(&set, Pt2i::new(-3, 2), Pt2i::new(-3, 18)).is_none());
        assert_eq!(det.outs(), 1);
        det.reset_outs();
        assert_eq!(det.outs(), 0);
    }

    #[test]
    fn test_tail_pruning_drops_short_sides() {
        let set = tile_set(true);
        let mut det = detector();
        let free = det
            .detect(&set, Pt2i::new(10, 2), Pt2i::new(10, 18))
            .unwrap();
        det.set_tail_min_size(MAX_SCANS_PER_SIDE as u32);
        let pruned = det
            .detect(&set, Pt2i::new(10, 2), Pt2i::new(10, 18))
            .unwrap();
        // both tails fall short of the huge minimum: only the seed stays
        assert_eq!(pruned.plateau_count(), 1);
        assert!(free.plateau_count() > pruned.plateau_count());
    }

    #[test]
    fn test_detection_is_deterministic() {
        let set = tile_set(true);
        let mut det = detector();
        let a = det.detect(&set, Pt2i::new(10, 2), Pt2i::new(10, 18)).unwrap();
        let b = det.detect(&set, Pt2i::new(10, 2), Pt2i::new(10, 18)).unwrap();
        assert_eq!(a.plateau_count(), b.plateau_count());
        assert_eq!(a.connected_points(20, 20), b.connected_points(20, 20));
    }
}
