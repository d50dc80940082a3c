//! Sobel 5x5 gradient map

use amrel_core::{Raster, Vr2i};
use rayon::prelude::*;

/// Smoothing and derivative taps of the 5x5 Sobel operator.
const SMOOTH: [i32; 5] = [1, 4, 6, 4, 1];
const DERIVE: [i32; 5] = [-1, -2, 0, 2, 1];

/// Field of signed integer gradient vectors over a byte raster.
#[derive(Debug, Clone)]
pub struct GradientMap {
    width: usize,
    height: usize,
    vecs: Vec<Vr2i>,
}

impl GradientMap {
    /// Builds the map with the 5x5 Sobel kernels; the two outermost
    /// pixel rings keep a zero gradient.
    pub fn sobel5(src: &Raster<u8>) -> Self {
        let (h, w) = (src.rows(), src.cols());
        let v = src.as_slice();
        let vecs: Vec<Vr2i> = (0..h)
            .into_par_iter()
            .flat_map(|j| {
                let mut row = vec![Vr2i::default(); w];
                if w >= 5 && j >= 2 && j + 2 < h {
                    for i in 2..w - 2 {
                        let mut dx = 0i32;
                        let mut dy = 0i32;
                        for (kj, (&sj, &dj)) in SMOOTH.iter().zip(DERIVE.iter()).enumerate() {
                            for (ki, (&si, &di)) in SMOOTH.iter().zip(DERIVE.iter()).enumerate() {
                                let p = v[(j + kj - 2) * w + (i + ki - 2)] as i32;
                                dx += sj * di * p;
                                dy += dj * si * p;
                            }
                        }
                        row[i] = Vr2i::new(dx, dy);
                    }
                }
                row
            })
            .collect();
        Self {
            width: w,
            height: h,
            vecs,
        }
    }

    /// Rebuilds a map from stored vectors (step-store load path).
    pub fn from_raw(width: usize, height: usize, vecs: Vec<Vr2i>) -> Self {
        assert_eq!(vecs.len(), width * height);
        Self {
            width,
            height,
            vecs,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Gradient vector at `(i, j)`, `j` being the north-down row.
    pub fn vec_at(&self, i: usize, j: usize) -> Vr2i {
        self.vecs[j * self.width + i]
    }

    /// Squared gradient magnitude at `(i, j)`.
    pub fn sq_norm(&self, i: usize, j: usize) -> i64 {
        self.vecs[j * self.width + i].sq_norm()
    }

    pub fn as_slice(&self) -> &[Vr2i] {
        &self.vecs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step_raster(w: usize, h: usize, split: usize) -> Raster<u8> {
        let mut data = vec![0u8; w * h];
        for j in 0..h {
            for i in split..w {
                data[j * w + i] = 100;
            }
        }
        Raster::from_vec(data, h, w).unwrap()
    }

    #[test]
    fn test_vertical_edge_has_horizontal_gradient() {
        let g = GradientMap::sobel5(&step_raster(16, 16, 8));
        let v = g.vec_at(8, 8);
        assert!(v.x > 0, "gradient should point east, got {v:?}");
        assert_eq!(v.y, 0);
        assert!(g.sq_norm(8, 8) > 0);
    }

    #[test]
    fn test_flat_region_is_zero() {
        let g = GradientMap::sobel5(&step_raster(16, 16, 8));
        assert_eq!(g.sq_norm(3, 8), 0);
        assert_eq!(g.sq_norm(13, 8), 0);
    }

    #[test]
    fn test_border_ring_is_zero() {
        let g = GradientMap::sobel5(&step_raster(16, 16, 8));
        for i in 0..16 {
            assert_eq!(g.sq_norm(i, 0), 0);
            assert_eq!(g.sq_norm(i, 1), 0);
            assert_eq!(g.sq_norm(0, i), 0);
        }
    }

    #[test]
    fn test_kernel_weights_on_impulse() {
        // single bright pixel: dx at (c-1, r) equals smooth[2]*derive[3]*p
        let mut data = vec![0u8; 11 * 11];
        data[5 * 11 + 5] = 1;
        let src = Raster::from_vec(data, 11, 11).unwrap();
        let g = GradientMap::sobel5(&src);
        assert_eq!(g.vec_at(4, 5).x, SMOOTH[2] * DERIVE[3]);
        assert_eq!(g.vec_at(5, 4).y, DERIVE[3] * SMOOTH[2]);
    }
}
