//! Digital straight segments with rational endpoints
//!
//! The blurred-segment extractor fits a rational line through a band of
//! edge pixels; downstream stages only ever read the two endpoints of its
//! naive line and the squared length.

/// A point with rational coordinates (`num / den` per axis).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RationalPoint {
    pub x_num: i64,
    pub x_den: i64,
    pub y_num: i64,
    pub y_den: i64,
}

impl RationalPoint {
    pub fn new(x_num: i64, x_den: i64, y_num: i64, y_den: i64) -> Self {
        Self {
            x_num,
            x_den,
            y_num,
            y_den,
        }
    }

    /// Conversion to float coordinates: `num / (float) den`.
    pub fn to_f32(self) -> (f32, f32) {
        (
            self.x_num as f32 / self.x_den as f32,
            self.y_num as f32 / self.y_den as f32,
        )
    }
}

/// A digital straight segment in pixel coordinates of its pad or sector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DigitalStraightSegment {
    a: RationalPoint,
    b: RationalPoint,
    length2: i64,
}

impl DigitalStraightSegment {
    pub fn new(a: RationalPoint, b: RationalPoint, length2: i64) -> Self {
        Self { a, b, length2 }
    }

    /// Builds a segment from sub-pixel endpoints, quantized on a fixed
    /// denominator so that the stored form is exactly reproducible.
    pub fn from_subpixel(p0: (f32, f32), p1: (f32, f32), den: i64) -> Self {
        let q = |v: f32| (v * den as f32).round() as i64;
        let a = RationalPoint::new(q(p0.0), den, q(p0.1), den);
        let b = RationalPoint::new(q(p1.0), den, q(p1.1), den);
        let dx = (p1.0 - p0.0) as f64;
        let dy = (p1.1 - p0.1) as f64;
        Self {
            a,
            b,
            length2: (dx * dx + dy * dy).round() as i64,
        }
    }

    /// Squared length of the segment, in pixels.
    pub fn length2(&self) -> i64 {
        self.length2
    }

    /// Endpoints of the naive line through the segment.
    pub fn naive_line(&self) -> (RationalPoint, RationalPoint) {
        (self.a, self.b)
    }
}
