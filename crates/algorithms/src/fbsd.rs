//! Blurred segment detection
//!
//! Extracts digital straight segments from a gradient map: strong
//! gradient pixels seed a region grown along the local edge orientation,
//! the region is fitted with a line, and regions thicker than the
//! assigned thickness are discarded. Scan order and thresholds are fixed,
//! so the segment set only depends on the input map.

use crate::gradient::GradientMap;
use amrel_core::DigitalStraightSegment;

/// Fixed denominator of the rational endpoints produced by the fit.
const ENDPOINT_DEN: i64 = 512;

/// Minimal region population considered for a fit.
const MIN_REGION: usize = 5;

/// Gradient orientation tolerance around the seed, radians.
const ANGLE_TOL: f32 = std::f32::consts::FRAC_PI_6;

const NEIGH_OFFSETS: [(isize, isize); 8] = [
    (-1, -1),
    (0, -1),
    (1, -1),
    (-1, 0),
    (1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];

/// Blurred segment detector over a gradient map.
#[derive(Debug, Clone)]
pub struct BsDetector {
    assigned_thickness: i32,
    single_edge: bool,
}

impl Default for BsDetector {
    fn default() -> Self {
        Self {
            assigned_thickness: 7,
            single_edge: false,
        }
    }
}

impl BsDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assigned thickness of the detected segments, clamped to at
    /// least 3.
    pub fn set_assigned_thickness(&mut self, t: i32) {
        self.assigned_thickness = t.max(3);
    }

    pub fn assigned_thickness(&self) -> i32 {
        self.assigned_thickness
    }

    pub fn set_single_edge(&mut self, on: bool) {
        self.single_edge = on;
    }

    pub fn is_single_edge_on(&self) -> bool {
        self.single_edge
    }

    /// Detects every segment of the map. Rerunning on the same map
    /// yields the same set in the same order.
    pub fn detect_all(&self, gmap: &GradientMap) -> Vec<DigitalStraightSegment> {
        Extractor::new(self, gmap).run()
    }
}

fn normalize_half_pi(angle: f32) -> f32 {
    angle.rem_euclid(std::f32::consts::PI)
}

fn angular_difference(a: f32, b: f32) -> f32 {
    let mut diff = (a - b).abs() % std::f32::consts::PI;
    if diff > std::f32::consts::FRAC_PI_2 {
        diff = std::f32::consts::PI - diff;
    }
    diff
}

struct Extractor<'a> {
    det: &'a BsDetector,
    gmap: &'a GradientMap,
    threshold2: i64,
    used: Vec<bool>,
    stack: Vec<usize>,
    region: Vec<usize>,
    segments: Vec<DigitalStraightSegment>,
}

impl<'a> Extractor<'a> {
    fn new(det: &'a BsDetector, gmap: &'a GradientMap) -> Self {
        let n = gmap.width() * gmap.height();
        // adaptive threshold: four times the mean squared magnitude
        let sum: i64 = (0..gmap.height())
            .flat_map(|j| (0..gmap.width()).map(move |i| (i, j)))
            .map(|(i, j)| gmap.sq_norm(i, j))
            .sum();
        let threshold2 = (sum / n.max(1) as i64 * 4).max(16);
        Self {
            det,
            gmap,
            threshold2,
            used: vec![false; n],
            stack: Vec::with_capacity(64),
            region: Vec::with_capacity(128),
            segments: Vec::new(),
        }
    }

    fn run(mut self) -> Vec<DigitalStraightSegment> {
        let n = self.gmap.width() * self.gmap.height();
        for idx in 0..n {
            self.process_seed(idx);
        }
        self.segments
    }

    fn angle_at(&self, idx: usize) -> f32 {
        let v = self.gmap.as_slice()[idx];
        normalize_half_pi((v.y as f32).atan2(v.x as f32))
    }

    fn process_seed(&mut self, idx: usize) {
        let w = self.gmap.width();
        if self.used[idx] {
            return;
        }
        let (x, y) = (idx % w, idx / w);
        if self.gmap.sq_norm(x, y) < self.threshold2 {
            return;
        }

        self.region.clear();
        self.stack.clear();
        let seed_angle = self.angle_at(idx);
        self.used[idx] = true;
        self.stack.push(idx);
        self.grow_region(seed_angle);

        if let Some(seg) = self.fit_segment() {
            self.segments.push(seg);
        } else {
            for &i in &self.region {
                self.used[i] = false;
            }
        }
    }

    fn grow_region(&mut self, seed_angle: f32) {
        let (w, h) = (self.gmap.width(), self.gmap.height());
        while let Some(idx) = self.stack.pop() {
            self.region.push(idx);
            let (x, y) = ((idx % w) as isize, (idx / w) as isize);
            for (dx, dy) in NEIGH_OFFSETS {
                let (nx, ny) = (x + dx, y + dy);
                if nx < 0 || ny < 0 || nx >= w as isize || ny >= h as isize {
                    continue;
                }
                let nidx = ny as usize * w + nx as usize;
                if self.used[nidx] {
                    continue;
                }
                if self.gmap.sq_norm(nx as usize, ny as usize) < self.threshold2 {
                    continue;
                }
                if angular_difference(self.angle_at(nidx), seed_angle) <= ANGLE_TOL {
                    self.used[nidx] = true;
                    self.stack.push(nidx);
                }
            }
        }
    }

    /// Least-squares line through the region; rejected when the point
    /// band is thicker than the assigned thickness.
    fn fit_segment(&self) -> Option<DigitalStraightSegment> {
        if self.region.len() < MIN_REGION {
            return None;
        }
        let w = self.gmap.width();
        let count = self.region.len() as f32;
        let (mut sx, mut sy, mut sxx, mut syy, mut sxy) = (0f32, 0f32, 0f32, 0f32, 0f32);
        for &idx in &self.region {
            let (x, y) = ((idx % w) as f32, (idx / w) as f32);
            sx += x;
            sy += y;
            sxx += x * x;
            syy += y * y;
            sxy += x * y;
        }
        let (cx, cy) = (sx / count, sy / count);
        let cxx = sxx / count - cx * cx;
        let cyy = syy / count - cy * cy;
        let cxy = sxy / count - cx * cy;
        // principal direction of the 2x2 covariance
        let theta = 0.5 * (2.0 * cxy).atan2(cxx - cyy);
        let (ty, tx) = theta.sin_cos();

        let (mut smin, mut smax) = (f32::INFINITY, f32::NEG_INFINITY);
        let (mut pmin, mut pmax) = (f32::INFINITY, f32::NEG_INFINITY);
        for &idx in &self.region {
            let (x, y) = ((idx % w) as f32 - cx, (idx / w) as f32 - cy);
            let s = x * tx + y * ty;
            let p = -x * ty + y * tx;
            smin = smin.min(s);
            smax = smax.max(s);
            pmin = pmin.min(p);
            pmax = pmax.max(p);
        }
        if pmax - pmin > self.det.assigned_thickness as f32 {
            return None;
        }
        let len = smax - smin;
        if len < MIN_REGION as f32 - 1.0 {
            return None;
        }
        let p0 = (cx + smin * tx, cy + smin * ty);
        let p1 = (cx + smax * tx, cy + smax * ty);
        Some(DigitalStraightSegment::from_subpixel(p0, p1, ENDPOINT_DEN))
    }
}
