//! Detected carriage track
//!
//! A track is an ordered list of cross-section scans, each carrying its
//! plateau and the candidate pixels that supported it. Scan geometry maps
//! scan-axis positions back to sector pixels (y counted from the south).

use super::plateau::Plateau;
use amrel_core::Pt2i;

/// One cross-section scan of a track.
#[derive(Debug, Clone)]
pub struct TrackScan {
    /// Scan index relative to the seed (0 = seed scan)
    pub num: i32,
    pub plateau: Option<Plateau>,
    /// Pixels of the supporting points, deduplicated
    pub points: Vec<Pt2i>,
}

/// A road section grown from one seed.
#[derive(Debug, Clone)]
pub struct CarriageTrack {
    /// Scans ordered by `num`
    scans: Vec<TrackScan>,
    seed_index: usize,
    /// Scan origin (seed p1 centre) in metres from the sector south-west
    origin: [f64; 2],
    /// Unit vector along the cross-section axis
    u: [f64; 2],
    /// Unit vector along the track axis
    v: [f64; 2],
    /// Metres per pixel
    csize: f64,
}

impl CarriageTrack {
    pub(super) fn new(
        scans: Vec<TrackScan>,
        seed_index: usize,
        origin: [f64; 2],
        u: [f64; 2],
        v: [f64; 2],
        csize: f64,
    ) -> Self {
        debug_assert!(seed_index < scans.len());
        Self {
            scans,
            seed_index,
            origin,
            u,
            v,
            csize,
        }
    }

    /// Plateau of the scan `num` positions away from the seed.
    pub fn plateau(&self, num: i32) -> Option<&Plateau> {
        let idx = self.seed_index as i64 + num as i64;
        usize::try_from(idx)
            .ok()
            .and_then(|i| self.scans.get(i))
            .and_then(|s| s.plateau.as_ref())
    }

    pub fn scans(&self) -> &[TrackScan] {
        &self.scans
    }

    /// Count of scans with an accepted plateau.
    pub fn plateau_count(&self) -> usize {
        self.scans.iter().filter(|s| s.plateau.is_some()).count()
    }

    /// Sector pixel of scan-axis position `t` on scan `num`.
    fn pixel_at(&self, num: i32, t: f64) -> Pt2i {
        let d = num as f64 * self.csize;
        let x = self.origin[0] + self.u[0] * t + self.v[0] * d;
        let y = self.origin[1] + self.u[1] * t + self.v[1] * d;
        Pt2i::new(
            (x / self.csize).floor() as i32,
            (y / self.csize).floor() as i32,
        )
    }

    /// One connected pixel strip per plateau scan: the straight run of
    /// pixels between the plateau bounds, clipped to a `w x h` raster.
    pub fn connected_points(&self, w: i32, h: i32) -> Vec<Vec<Pt2i>> {
        self.scans
            .iter()
            .filter_map(|scan| {
                let p = scan.plateau.as_ref()?;
                let a = self.pixel_at(scan.num, p.start);
                let b = self.pixel_at(scan.num, p.end);
                let strip: Vec<Pt2i> = a
                    .draw_to(b)
                    .into_iter()
                    .filter(|q| q.x >= 0 && q.x < w && q.y >= 0 && q.y < h)
                    .collect();
                (!strip.is_empty()).then_some(strip)
            })
            .collect()
    }

    /// One loose pixel strip per plateau scan: the supporting point
    /// pixels themselves, clipped to a `w x h` raster.
    pub fn points(&self, w: i32, h: i32) -> Vec<Vec<Pt2i>> {
        self.scans
            .iter()
            .filter_map(|scan| {
                scan.plateau.as_ref()?;
                let strip: Vec<Pt2i> = scan
                    .points
                    .iter()
                    .copied()
                    .filter(|q| q.x >= 0 && q.x < w && q.y >= 0 && q.y < h)
                    .collect();
                (!strip.is_empty()).then_some(strip)
            })
            .collect()
    }

    /// Plateau centres in metres from the sector south-west, scan order.
    pub fn centerline(&self) -> Vec<(f64, f64)> {
        self.axis_points(|p| p.center)
    }

    /// Left and right plateau bounds in metres, scan order.
    pub fn side_bounds(&self) -> (Vec<(f64, f64)>, Vec<(f64, f64)>) {
        (self.axis_points(|p| p.start), self.axis_points(|p| p.end))
    }

    fn axis_points(&self, pick: impl Fn(&Plateau) -> f64) -> Vec<(f64, f64)> {
        self.scans
            .iter()
            .filter_map(|scan| {
                let p = scan.plateau.as_ref()?;
                let t = pick(p);
                let d = scan.num as f64 * self.csize;
                Some((
                    self.origin[0] + self.u[0] * t + self.v[0] * d,
                    self.origin[1] + self.u[1] * t + self.v[1] * d,
                ))
            })
            .collect()
    }
}
